#[tokio::main]
async fn main() -> anyhow::Result<()> {
    rollcalld::start_server().await
}
