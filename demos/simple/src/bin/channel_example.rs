use colored::*;
use lightstreamer_sdk::client::{LightstreamerClient, Transport};
use lightstreamer_sdk::subscription::{
    ChannelSubscriptionListener, ItemUpdate, MaxFrequency, Snapshot, Subscription,
    SubscriptionMode,
};
use lightstreamer_sdk::utils::{setup_logger, setup_signal_hook};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::{Mutex, Notify};
use tracing::{error, info};

/// Example demonstrating channel-based update processing.
///
/// This example shows how to use `ChannelSubscriptionListener` to receive
/// item updates through a tokio channel, enabling asynchronous processing
/// in a separate task.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    setup_logger();

    info!(
        "{}",
        "🚀 Starting Channel-based Subscription Example"
            .bright_green()
            .bold()
    );

    let (listener, mut update_receiver) = ChannelSubscriptionListener::create_channel();

    let processor_handle = tokio::spawn(async move {
        info!("{}", "📡 Update processor task started".bright_cyan());

        let mut update_count = 0u64;
        let mut items_seen = HashSet::new();

        while let Some(update) = update_receiver.recv().await {
            update_count += 1;
            if let Some(item_name) = update.get_item_name() {
                items_seen.insert(item_name.to_string());
            }
            process_update(&update, update_count);

            if update_count.is_multiple_of(10) {
                info!(
                    "{}",
                    format!(
                        "📊 Stats: {} updates processed, {} unique items",
                        update_count,
                        items_seen.len()
                    )
                    .bright_yellow()
                );
            }
        }

        info!(
            "{}",
            format!(
                "📈 Final Stats: {} total updates, {} unique items",
                update_count,
                items_seen.len()
            )
            .bright_yellow()
            .bold()
        );
    });

    let subscription = Subscription::new(
        SubscriptionMode::Merge,
        Some((1..=10).map(|i| format!("item{}", i)).collect()),
        Some(
            ["stock_name", "last_price", "time", "pct_change", "bid", "ask"]
                .iter()
                .map(|field| field.to_string())
                .collect(),
        ),
    )?;
    subscription.set_data_adapter(Some(String::from("QUOTE_ADAPTER")))?;
    subscription.set_requested_snapshot(Some(Snapshot::Yes))?;
    subscription.set_requested_max_frequency(Some(MaxFrequency::Limited(2.0)))?;
    subscription.add_listener(Box::new(listener));

    let mut client = LightstreamerClient::new(
        Some("http://push.lightstreamer.com"),
        Some("DEMO"),
        None,
        None,
    )?;
    client
        .connection_options
        .set_forced_transport(Some(Transport::WsStreaming));
    client.subscribe(&subscription)?;
    let client = Arc::new(Mutex::new(client));

    let shutdown_signal = Arc::new(Notify::new());
    setup_signal_hook(Arc::clone(&shutdown_signal)).await?;

    info!(
        "{}",
        "🔌 Connecting to Lightstreamer server...".bright_cyan()
    );
    if let Err(e) = LightstreamerClient::connect(client.clone(), shutdown_signal).await {
        error!("❌ Session ended with an error: {}", e);
    }

    client.lock().await.unsubscribe(&subscription)?;
    processor_handle.abort();

    info!(
        "{}",
        "✨ Channel-based subscription example completed!"
            .bright_green()
            .bold()
    );
    Ok(())
}

/// Process a single item update.
///
/// # Arguments
///
/// * `update` - The item update to process
/// * `count` - The sequential number of this update
fn process_update(update: &ItemUpdate, count: u64) {
    let item_name = update.get_item_name().unwrap_or("N/A");

    let mut output = String::new();
    for (field, value) in update.get_changed_fields() {
        output.push_str(&format!(
            "{}: {}, ",
            field,
            value.as_deref().unwrap_or("N/A").yellow()
        ));
    }

    info!(
        "[{}] {} - {}",
        format!("#{}", count).bright_blue(),
        item_name.bright_cyan(),
        output
    );
}
