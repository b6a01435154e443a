use clap::Parser;
use colored::Colorize;
use darya::commands::{Args, Commands};
use std::process;

async fn run() -> anyhow::Result<()> {
    let args = Args::parse();

    match args.command {
        Commands::Download(args) => args.execute().await?,
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("{}: {}", "error".bold().red(), e);
        process::exit(1);
    }
}
