use colored::*;
use lightstreamer_sdk::client::{ClientListener, ClientStatus, LightstreamerClient, Transport};
use lightstreamer_sdk::subscription::{
    ItemUpdate, Snapshot, Subscription, SubscriptionListener, SubscriptionMode,
};
use lightstreamer_sdk::utils::{setup_logger, setup_signal_hook};
use std::error::Error;
use std::sync::Arc;
use tokio::sync::{Mutex, Notify};
use tracing::{error, info, warn};

const FIELDS: [&str; 12] = [
    "stock_name",
    "last_price",
    "time",
    "pct_change",
    "bid_quantity",
    "bid",
    "ask",
    "ask_quantity",
    "min",
    "max",
    "ref_price",
    "open_price",
];

pub struct MySubscriptionListener {}

impl SubscriptionListener for MySubscriptionListener {
    fn on_item_update(&mut self, update: &ItemUpdate) {
        let item_name = update.get_item_name().unwrap_or("N/A");
        let mut output = String::new();
        for field in FIELDS {
            let value = update.get_value(field).ok().flatten().unwrap_or("N/A");
            let value_str = if update.is_value_changed(field).unwrap_or(false) {
                value.yellow().to_string()
            } else {
                value.to_string()
            };
            output.push_str(&format!("{}: {}, ", field, value_str));
        }
        info!("{}, {}", item_name, output);
    }

    fn on_subscription_error(&mut self, code: i32, message: Option<&str>) {
        error!("subscription refused: {} {:?}", code, message);
    }
}

pub struct MyClientListener {}

impl ClientListener for MyClientListener {
    fn on_status_change(&mut self, status: &ClientStatus) {
        info!("{}", format!("status: {}", status).bright_cyan());
    }

    fn on_server_error(&mut self, code: i32, message: &str) {
        warn!("server error {}: {}", code, message);
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    setup_logger();

    let items = (1..=10).map(|i| format!("item{}", i)).collect();
    let fields = FIELDS.iter().map(|field| field.to_string()).collect();
    let my_subscription = Subscription::new(SubscriptionMode::Merge, Some(items), Some(fields))?;
    my_subscription.set_data_adapter(Some(String::from("QUOTE_ADAPTER")))?;
    my_subscription.set_requested_snapshot(Some(Snapshot::Yes))?;
    my_subscription.add_listener(Box::new(MySubscriptionListener {}));

    let mut client = LightstreamerClient::new(
        Some("http://push.lightstreamer.com"),
        Some("DEMO"),
        None,
        None,
    )?;
    client.add_listener(Box::new(MyClientListener {}));
    client
        .connection_options
        .set_forced_transport(Some(Transport::WsStreaming));
    client.subscribe(&my_subscription)?;

    // Shared with the signal handler, which ends `connect` on SIGINT or SIGTERM.
    let client = Arc::new(Mutex::new(client));
    let shutdown_signal = Arc::new(Notify::new());
    setup_signal_hook(Arc::clone(&shutdown_signal)).await?;

    // Reconnections are handled by the client; `connect` only returns on shutdown or when
    // the server refuses the session.
    match LightstreamerClient::connect(client.clone(), shutdown_signal).await {
        Ok(()) => info!("Exiting orderly from Lightstreamer client..."),
        Err(e) => error!("Session ended with an error: {}", e),
    }

    Ok(())
}
