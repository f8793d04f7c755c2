use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use log::info;

use revstore::RevisionStore;
use revstore::cli::{Cli, Command};
use revstore::config::Config;

fn setup_logging() -> Result<()> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();
    Ok(())
}

fn main() -> Result<()> {
    setup_logging().context("Failed to setup logging")?;

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    let path = cli.file.unwrap_or(config.revisions_file);

    info!("revstore using {}", path.display());
    let store = RevisionStore::open(&path).context("Failed to open revision store")?;

    match cli.command {
        Command::List => {
            let marks = store.load()?;
            if marks.is_empty() {
                println!("No watermarks recorded in {}", path.display());
            } else {
                for (repo, revision) in marks {
                    println!("{} {}", repo.cyan(), revision);
                }
            }
        }
        Command::Get { repo } => {
            let revision = store.get(&repo)?;
            println!("{}", revision);
        }
        Command::Set { repo, revision } => {
            let previous = store.set(&repo, revision)?;
            match previous {
                Some(old) => println!("{} {}: r{} -> r{}", "✓".green(), repo.cyan(), old, revision),
                None => println!("{} {}: r{}", "✓".green(), repo.cyan(), revision),
            }
        }
        Command::Reset { repo } => match store.remove(&repo)? {
            Some(old) => println!("{} Reset {} (was r{})", "✓".green(), repo.cyan(), old),
            None => println!("{} has no watermark", repo.yellow()),
        },
    }

    Ok(())
}
