use anyhow::Result;
use clap::Parser;

mod cli;
mod commands;

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Cli::parse();
    let command = args.get_command();

    // The server wires tracing into its own log service once config is loaded
    if !matches!(command, cli::Commands::Start) {
        opslog::init_cli_tracing();
    }

    match command {
        cli::Commands::Start => {
            commands::start::execute(&args.config).await?;
        }
        cli::Commands::Test => {
            commands::test::execute(&args.config)?;
        }
        cli::Commands::Config { action } => match action {
            cli::ConfigCommands::Show => commands::config::show(&args.config)?,
        },
        cli::Commands::Logs(logs_args) => {
            commands::logs::execute(logs_args).await?;
        }
        cli::Commands::Version => {
            println!("opslog v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
