//! Flowsync CLI entry point

#[tokio::main]
async fn main() {
    if let Err(e) = flowsync_runtime::cli::run().await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
