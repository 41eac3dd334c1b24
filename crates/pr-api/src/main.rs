#[tokio::main]
async fn main() {
    if let Err(err) = pr_api::run().await {
        tracing::error!(error = %err, "pr-api failed");
        std::process::exit(1);
    }
}
