use log::info;

use genproxy::ProxyConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()>
{   dotenvy::dotenv().ok();
    env_logger::Builder::from_env(
      env_logger::Env::default().default_filter_or("info")
    ).init();

    let config = ProxyConfig::from_env()?;
    info!(
      "Starting genproxy ({:?}, prompt limit {} chars)",
      config.environment, config.validation.max_prompt_chars
    );

    genproxy::server::serve(config).await
}
