//
// main.rs
//
// Entry point of the analysis-server binary
//

use std::env;
use std::path::PathBuf;

use analysis_server::config::ServerConfig;

fn print_usage() {
    println!(
        "analysis-server {}, an incremental analysis scheduling server.",
        env!("CARGO_PKG_VERSION")
    );
    print!(
        r#"
Usage: analysis-server [OPTIONS]

Available options:

--stdio                      Serve line-delimited JSON requests on stdio
--config <FILE>              Read server settings from a JSON file
--version                    Print the version
--help                       Print this help message

"#
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let mut argv = env::args();
    argv.next(); // skip executable name

    let mut use_stdio = false;
    let mut config_path: Option<PathBuf> = None;

    while let Some(arg) = argv.next() {
        match arg.as_str() {
            "--stdio" => use_stdio = true,
            "--config" => {
                let path = argv
                    .next()
                    .ok_or_else(|| anyhow::anyhow!("--config requires a file argument"))?;
                config_path = Some(PathBuf::from(path));
            }
            "--version" => {
                println!("analysis-server {}", env!("CARGO_PKG_VERSION"));
                return Ok(());
            }
            "--help" => {
                print_usage();
                return Ok(());
            }
            other => {
                return Err(anyhow::anyhow!("Unknown argument: '{other}'"));
            }
        }
    }

    if !use_stdio {
        print_usage();
        return Ok(());
    }

    env_logger::init();

    let config = match config_path {
        Some(path) => ServerConfig::load(&path)?,
        None => ServerConfig::default(),
    };
    log::info!("Starting analysis-server with {:?}", config);

    analysis_server::protocol::serve_stdio(config).await
}
