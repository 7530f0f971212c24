//! Binary entrypoint for the VEL API server.
use tracing_subscriber::EnvFilter;
use vel_api::run;
use vel_stages::Settings;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("vel=info,tower_http=info")),
        )
        .init();

    // VEL_CONFIG and VEL_* overrides, see `vel_stages::settings`
    let settings = Settings::load()?;
    run(settings).await
}
