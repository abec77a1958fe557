mod config;
mod main_lib;

use config::Config;
use main_lib::{build_display, init_tracing, run};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;
    init_tracing();
    let display = build_display(&config)?;
    tracing::info!(
        "Lobby display started for building {} against {}",
        config.building_id,
        config.api_base_url
    );
    run(display).await
}
