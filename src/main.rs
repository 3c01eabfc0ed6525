#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().init();
    let config = tasklist_server::config::Config::from_env()?;
    tasklist_server::web::start_web_server(config).await
}
