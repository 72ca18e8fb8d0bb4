use clap::Parser;
use tracing_subscriber::EnvFilter;

mod backend;
mod cli;
mod commands;
mod output;
mod upstream;

use cli::{Cli, Commands};
use output::OutputFormat;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("telegate=info".parse()?))
        .with_writer(std::io::stderr)
        .init();

    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Human
    };

    match cli.command {
        Some(Commands::Serve(args)) => commands::serve::run(&args).await,
        Some(Commands::Health(args)) => commands::health::run(&args).await,
        Some(Commands::Clients(args)) => commands::clients::run(&args, format).await,
        Some(Commands::Sign(args)) => commands::sign::run(&args, format),
        Some(Commands::Fetch(args)) => commands::fetch::run(&args, format).await,
        None => {
            let args = Cli::parse_from(["telegate", "serve"]);
            match args.command {
                Some(Commands::Serve(serve)) => commands::serve::run(&serve).await,
                _ => Ok(()),
            }
        }
    }
}
