use std::io::Write;

use anyhow::{Context as _, Error as GenericError};
use hotkeys_aggregator::{AggregatorHandle, StreamAggregator, TopEntry};
use tokio::io::{AsyncBufRead, AsyncBufReadExt as _};
use tracing::{debug, warn};

/// Parses a single input line of the form `key [count]`.
///
/// The count defaults to 1. Blank lines and lines starting with `#` are skipped, returning `Ok(None)`.
pub fn parse_event(line: &str) -> Result<Option<(&str, u64)>, GenericError> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }

    let mut fields = line.split_whitespace();
    let key = match fields.next() {
        Some(key) => key,
        None => return Ok(None),
    };
    let count = match fields.next() {
        Some(raw) => raw
            .parse::<u64>()
            .with_context(|| format!("Invalid count '{}' for key '{}'.", raw, key))?,
        None => 1,
    };

    if let Some(extra) = fields.next() {
        anyhow::bail!("Unexpected field '{}' after count.", extra);
    }

    Ok(Some((key, count)))
}

/// Feeds every event read from `reader` into the aggregator, until the input is exhausted.
///
/// Malformed lines are logged and skipped. Returns the number of events fed.
pub async fn feed_lines<R>(reader: R, handle: AggregatorHandle) -> Result<u64, GenericError>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut line_number = 0u64;
    let mut events = 0u64;

    while let Some(line) = lines.next_line().await.context("Failed to read input.")? {
        line_number += 1;

        match parse_event(&line) {
            Ok(Some((key, count))) => {
                handle.receive(key, count).await?;
                events += 1;
            }
            Ok(None) => {}
            Err(e) => warn!(line_number, error = %e, "Skipping malformed input line."),
        }
    }

    debug!(lines = line_number, events, "Reached end of input.");
    Ok(events)
}

/// Writes an emission as a single line of space-separated `key:count` entries.
pub fn write_emission<W: Write>(writer: &mut W, emission: &[TopEntry]) -> std::io::Result<()> {
    let mut first = true;
    for entry in emission {
        if !first {
            writer.write_all(b" ")?;
        }
        write!(writer, "{}", entry)?;
        first = false;
    }
    writer.write_all(b"\n")?;
    writer.flush()
}

/// Shuts the aggregator down and writes every emission it had not handed out yet, ending with the current window.
pub async fn write_remaining<W: Write>(aggregator: StreamAggregator, writer: &mut W) -> std::io::Result<()> {
    for emission in aggregator.shutdown().await {
        write_emission(writer, &emission)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::time::sleep;

    use super::*;

    #[test]
    fn parse_event_lines() {
        assert_eq!(parse_event("example.com").unwrap(), Some(("example.com", 1)));
        assert_eq!(parse_event("  example.com   42 ").unwrap(), Some(("example.com", 42)));
        assert_eq!(parse_event("example.com\t0").unwrap(), Some(("example.com", 0)));
        assert_eq!(parse_event("").unwrap(), None);
        assert_eq!(parse_event("   ").unwrap(), None);
        assert_eq!(parse_event("# comment").unwrap(), None);

        assert!(parse_event("example.com -1").is_err());
        assert!(parse_event("example.com many").is_err());
        assert!(parse_event("example.com 1 2").is_err());
    }

    #[test]
    fn write_emission_lines() {
        let mut out = Vec::new();
        write_emission(&mut out, &[TopEntry::new("b.com", 2), TopEntry::new("a.com", 5)]).unwrap();
        write_emission(&mut out, &[]).unwrap();

        assert_eq!(String::from_utf8(out).unwrap(), "b.com:2 a.com:5\n\n");
    }

    #[tokio::test(start_paused = true)]
    async fn feed_lines_skips_malformed_input() {
        let aggregator = StreamAggregator::new(3, Duration::from_secs(60), true).unwrap();
        let input: &[u8] = b"a.com 3\nb.com\n\nbad line here\nb.com 3\n# c.com 100\nc.com x\n";

        let events = feed_lines(input, aggregator.handle()).await.unwrap();
        assert_eq!(events, 3);

        let remaining = aggregator.shutdown().await;
        assert_eq!(remaining, vec![vec![TopEntry::new("a.com", 3), TopEntry::new("b.com", 4)]]);
    }

    #[tokio::test(start_paused = true)]
    async fn published_window_survives_end_of_input() {
        let aggregator = StreamAggregator::new(10, Duration::from_millis(100), true).unwrap();

        feed_lines(b"a.com\n".as_slice(), aggregator.handle()).await.unwrap();
        sleep(Duration::from_millis(150)).await;
        feed_lines(b"b.com 2\n".as_slice(), aggregator.handle()).await.unwrap();

        let mut out = Vec::new();
        write_remaining(aggregator, &mut out).await.unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "a.com:1\nb.com:2\n");
    }
}
