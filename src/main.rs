#[tokio::main]
async fn main() {
    if let Err(e) = rxtract::run().await {
        tracing::error!("Fatal: {e}");
        std::process::exit(1);
    }
}
