/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 18/10/26
******************************************************************************/

//! Two-level COMMAND subscription through the channel API: the rows of the demo portfolio,
//! each enriched with the quote of its stock.

use lightstreamer_sdk::client::{ClientConfig, SimpleClient, SubscriptionParams};
use lightstreamer_sdk::subscription::SubscriptionMode;
use lightstreamer_sdk::utils::{setup_logger, setup_signal_hook};
use tracing::{error, info};

fn names(values: &[&str]) -> Vec<String> {
    values.iter().map(|value| value.to_string()).collect()
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    setup_logger();

    let client = SimpleClient::new(
        ClientConfig::new("http://push.lightstreamer.com")
            .adapter_set("DEMO")
            .stalled_timeout(3_000),
    )?;

    // The key of each row is the name of a QUOTE_ADAPTER item.
    let portfolio = SubscriptionParams::new(
        SubscriptionMode::Command,
        names(&["portfolio1"]),
        names(&["key", "command", "qty"]),
    )
    .data_adapter("PORTFOLIO_ADAPTER")
    .second_level(names(&["stock_name", "last_price"]), Some("QUOTE_ADAPTER"));
    let (subscription, mut rows) = client.subscribe_with_handle(portfolio).await?;

    tokio::spawn(async move {
        while let Some(row) = rows.recv().await {
            let value = |field: &str| row.get_value(field).ok().flatten().unwrap_or("-").to_string();
            info!(
                "{} {} qty={} {} @ {}",
                value("command"),
                value("key"),
                value("qty"),
                value("stock_name"),
                value("last_price")
            );
        }
    });

    setup_signal_hook(client.shutdown_signal()).await?;
    if let Err(e) = client.connect().await {
        error!("session ended with an error: {}", e);
    }

    info!(
        "portfolio subscription active after disconnection: {}",
        subscription.is_active()
    );
    client.unsubscribe(&subscription).await?;
    Ok(())
}
