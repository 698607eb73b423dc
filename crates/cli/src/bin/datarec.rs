use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    datarec_cli::main_entry().await
}
