//! Accessory session console.

use std::io::Write;

use accessory_cli::{Cli, CliError, Console, Reply, logging};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    logging::init_logging(cli.verbose);

    if let Err(err) = run(&cli).await {
        error!(error = %err, "console failed");
        std::process::exit(1);
    }
}

async fn run(cli: &Cli) -> Result<(), CliError> {
    let mut console = Console::from_cli(cli)?;
    info!(seed = cli.seed, "console ready, /help lists commands");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match console.run_line(&line) {
            Reply::Quit => break,
            Reply::Lines(reply) => {
                let mut stdout = std::io::stdout().lock();
                for text in reply {
                    writeln!(stdout, "{text}")?;
                }
                stdout.flush()?;
            },
        }
    }
    Ok(())
}
