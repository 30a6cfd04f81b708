use signal_hook::low_level::signal_name;
use signal_hook::{consts::SIGINT, consts::SIGTERM, iterator::Signals};
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::info;

/// Splits the arguments of a TLCP line on commas.
///
/// Commas nested in `{}` do not split, so JSON-like values travel as one argument. Arguments
/// are trimmed and empty ones are dropped: update lines, whose values may be empty, are split
/// by their own decoder. An unclosed `{` keeps the rest of the line in one argument.
pub(crate) fn parse_arguments(input: &str) -> Vec<&str> {
    let mut depth = 0usize;
    input
        .split(|c: char| match c {
            '{' => {
                depth += 1;
                false
            }
            '}' => {
                depth = depth.saturating_sub(1);
                false
            }
            ',' => depth == 0,
            _ => false,
        })
        .map(str::trim)
        .filter(|argument| !argument.is_empty())
        .collect()
}

/// Sets up a signal hook for SIGINT and SIGTERM.
///
/// Spawns a blocking task that waits for the first of those signals, logs it and wakes up whoever is
/// waiting on `shutdown_signal` (typically `LightstreamerClient::connect`).
///
/// # Errors
///
/// Returns an error if the signal iterator cannot be registered.
pub async fn setup_signal_hook(shutdown_signal: Arc<Notify>) -> std::io::Result<()> {
    let signals = &[SIGINT, SIGTERM];
    let mut signals_iterator = Signals::new(signals)?;

    // `forever()` blocks, so it gets a dedicated blocking thread.
    tokio::task::spawn_blocking(move || {
        if let Some(signal) = signals_iterator.forever().next() {
            info!(
                "Received signal: {}",
                signal_name(signal).unwrap_or("unknown")
            );
            shutdown_signal.notify_one();
        }
    });
    Ok(())
}
