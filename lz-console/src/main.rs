//! LZ1AQ Logger Console
//!
//! Runs the radio and antenna tuner links without the logging GUI. Every
//! event is printed to stdout as one JSON object per line.
//!
//! ```text
//! lzlog                    run with the saved settings
//! lzlog <settings.json>    run with a settings file
//! lzlog init [path]        write default settings
//! lzlog ports              list serial ports
//! ```

mod ports;
mod session;
mod settings;

use std::path::{Path, PathBuf};

use anyhow::Context;
use settings::ConsoleSettings;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const USAGE: &str = "usage: lzlog [settings.json] | lzlog init [path] | lzlog ports";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "lzlog=info,lz_protocol=info,lz_engine=info,lz_sim=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.first().map(String::as_str) {
        Some("ports") => {
            for port in ports::list_ports()? {
                println!("{}\t{}", port.name, port.description);
            }
            Ok(())
        }
        Some("init") => {
            let path = args
                .get(1)
                .map(PathBuf::from)
                .or_else(settings::default_path)
                .context("Could not determine settings path")?;
            ConsoleSettings::default().save(&path)?;
            println!("Wrote default settings to {}", path.display());
            Ok(())
        }
        Some("-h" | "--help") => {
            println!("{}", USAGE);
            Ok(())
        }
        path => {
            tracing::info!("Starting LZ1AQ logger console");
            let settings = ConsoleSettings::load(path.map(Path::new));
            session::run(settings).await
        }
    }
}
