use clap::Parser;
use leads::app;
use leads::config::Config;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Config::parse();
    log::info!(
        "Serving {} with snapshots in {}",
        config.data_file.display(),
        config.public_dir.display()
    );

    app::run(config).await?;

    Ok(())
}
