//! Process-level run id.
//!
//! Every process gets one ULID on first access; recommendation rows written
//! by this process can be traced back to it. Fresh ULIDs identify jobs.

use once_cell::sync::Lazy;
use ulid::Ulid;

static RUN_ID: Lazy<String> = Lazy::new(|| Ulid::new().to_string());

/// The id shared by everything this process does.
#[inline]
pub fn get() -> &'static str {
    &RUN_ID
}

/// A new, time-ordered ULID.
#[inline]
pub fn generate() -> String {
    Ulid::new().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_is_stable() {
        assert_eq!(get(), get());
        assert_eq!(get().len(), 26);
    }

    #[test]
    fn generate_is_unique_and_sortable() {
        let older = generate();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let newer = generate();
        assert_ne!(older, newer);
        assert!(older < newer);
    }
}
