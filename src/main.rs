//! Self-evolving agent core — binary entry point.

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = agentcore::cli::run().await {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
    Ok(())
}
