use tracing::error;
use tracing_subscriber::EnvFilter;
use video_compressor::Config;

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt().with_env_filter(env_filter).init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = Config::load()?;
    video_compressor::run(config)
        .await
        .inspect_err(|error| error!(?error, "Server stopped"))
}
