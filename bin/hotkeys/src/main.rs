//! Command-line front-end for the stream aggregator.
//!
//! Reads `key [count]` lines from standard input and prints the approximate top-K keys every emission interval.

#![deny(warnings)]
#![deny(missing_docs)]

use anyhow::{Context as _, Error as GenericError};
use clap::Parser as _;
use hotkeys_aggregator::StreamAggregator;
use tokio::{io::BufReader, select, signal};
use tracing::{error, info};

mod config;
use self::config::{load_configuration, Cli};

mod input;
use self::input::{feed_lines, write_emission, write_remaining};

mod logging;
use self::logging::initialize_logging;

#[tokio::main]
async fn main() {
    initialize_logging();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => info!("hotkeys stopped."),
        Err(e) => {
            error!("{:?}", e);
            std::process::exit(1);
        }
    }
}

async fn run(cli: Cli) -> Result<(), GenericError> {
    let config = load_configuration(&cli)?;
    info!(
        top_k = config.top_k,
        emit_interval_ms = config.emit_interval_ms,
        reset_on_emit = config.reset_on_emit,
        "hotkeys starting..."
    );

    let mut aggregator = StreamAggregator::from_configuration(&config).context("Failed to create aggregator.")?;

    // Input is fed from a separate task so that emissions keep being consumed while producers wait on a full queue.
    let mut producer = tokio::spawn(feed_lines(BufReader::new(tokio::io::stdin()), aggregator.handle()));

    let interrupted = signal::ctrl_c();
    tokio::pin!(interrupted);

    let stdout = std::io::stdout();

    loop {
        select! {
            result = &mut producer => {
                let events = result.context("Input task failed.")??;
                info!(events, "Input exhausted.");
                break;
            },
            result = &mut interrupted => {
                result.context("Failed to listen for interrupt signal.")?;
                info!("Received interrupt. Stopping.");
                producer.abort();
                break;
            },
            Some(emission) = aggregator.next_emission() => {
                write_emission(&mut stdout.lock(), &emission).context("Failed to write emission.")?;
            },
        }
    }

    write_remaining(aggregator, &mut stdout.lock())
        .await
        .context("Failed to write final emissions.")?;

    Ok(())
}
