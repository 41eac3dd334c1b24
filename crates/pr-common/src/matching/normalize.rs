//! Column-wise standardization of feature rows.
//!
//! Each column is rescaled to `(x - mean) / std` with the population standard
//! deviation. A column whose values are all identical has zero spread and
//! standardizes to `0.0` for every row.

/// Per-column mean and population standard deviation over a set of rows.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureNormalizer<const N: usize> {
    mean: [f64; N],
    std: [f64; N],
}

impl<const N: usize> FeatureNormalizer<N> {
    /// Computes column statistics. An empty input yields zero mean and spread.
    pub fn fit(rows: &[[f64; N]]) -> Self {
        let mut mean = [0.0; N];
        let mut std = [0.0; N];

        if rows.is_empty() {
            return Self { mean, std };
        }

        let n = rows.len() as f64;

        for (j, mean_j) in mean.iter_mut().enumerate() {
            *mean_j = rows.iter().map(|row| row[j]).sum::<f64>() / n;
        }

        for (j, std_j) in std.iter_mut().enumerate() {
            let sum_sq: f64 = rows
                .iter()
                .map(|row| {
                    let diff = row[j] - mean[j];
                    diff * diff
                })
                .sum();
            *std_j = (sum_sq / n).sqrt();
        }

        Self { mean, std }
    }

    pub fn mean(&self) -> &[f64; N] {
        &self.mean
    }

    pub fn std(&self) -> &[f64; N] {
        &self.std
    }

    pub fn transform_row(&self, row: &[f64; N]) -> [f64; N] {
        let mut out = [0.0; N];
        for (j, value) in out.iter_mut().enumerate() {
            *value = if self.std[j] > 0.0 {
                (row[j] - self.mean[j]) / self.std[j]
            } else {
                0.0
            };
        }
        out
    }

    pub fn transform(&self, rows: &[[f64; N]]) -> Vec<[f64; N]> {
        rows.iter().map(|row| self.transform_row(row)).collect()
    }

    pub fn fit_transform(rows: &[[f64; N]]) -> Vec<[f64; N]> {
        Self::fit(rows).transform(rows)
    }
}

/// Euclidean distance between two rows.
pub fn euclidean<const N: usize>(a: &[f64; N], b: &[f64; N]) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f64>()
        .sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn column(rows: &[[f64; 2]], j: usize) -> Vec<f64> {
        rows.iter().map(|row| row[j]).collect()
    }

    #[test]
    fn standardized_columns_have_zero_mean_and_unit_variance() {
        let rows = [[1.0, 100.0], [2.0, 200.0], [3.0, 300.0], [4.0, 400.0]];
        let scaled = FeatureNormalizer::fit_transform(&rows);

        for j in 0..2 {
            let values = column(&scaled, j);
            let mean = values.iter().sum::<f64>() / values.len() as f64;
            let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
            assert!(mean.abs() < 1e-12);
            assert!((var - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn uses_population_standard_deviation() {
        let normalizer = FeatureNormalizer::fit(&[[0.0], [2.0]]);
        assert_eq!(normalizer.mean(), &[1.0]);
        assert_eq!(normalizer.std(), &[1.0]);
    }

    #[test]
    fn constant_column_maps_to_zero() {
        let rows = [[5.0, 1.0], [5.0, 2.0], [5.0, 3.0]];
        let scaled = FeatureNormalizer::fit_transform(&rows);

        assert!(column(&scaled, 0).iter().all(|v| *v == 0.0));
        assert!(column(&scaled, 1).iter().all(|v| v.is_finite()));
    }

    #[test]
    fn single_row_is_all_zero() {
        let scaled = FeatureNormalizer::fit_transform(&[[-33.4, -70.6, 100_000.0]]);
        assert_eq!(scaled, vec![[0.0, 0.0, 0.0]]);
    }

    #[test]
    fn empty_input_is_empty_output() {
        let scaled = FeatureNormalizer::<3>::fit_transform(&[]);
        assert!(scaled.is_empty());
    }

    #[test]
    fn euclidean_distance() {
        assert_eq!(euclidean(&[0.0, 0.0], &[3.0, 4.0]), 5.0);
        assert_eq!(euclidean(&[1.0, 1.0, 1.0], &[1.0, 1.0, 1.0]), 0.0);
    }
}
