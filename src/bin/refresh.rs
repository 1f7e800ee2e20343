// Regenerates the JSON snapshots from the local workbook without starting the server.
use clap::Parser;
use leads::config::Config;
use leads::{dashboard, loader, saving};
use std::process::ExitCode;

fn main() -> ExitCode {
    // stderr is reserved for failures; the refresh endpoint treats any stderr output as one
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stdout)
        .init();

    let config = Config::parse();
    let result = loader::load_workbook(&config.data_file, config.retry_policy())
        .map(|workbook| dashboard::process_workbook(&workbook, &config.process_options()))
        .and_then(|data| saving::write_snapshots(&config.public_dir, &data));

    match result {
        Ok(paths) => {
            for path in paths {
                println!("{}", path.display());
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("{}", e);
            ExitCode::FAILURE
        }
    }
}
