/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 18/10/26
******************************************************************************/

//! Push notification example: registers a Firebase device and asks the server to notify it
//! when the price of an item crosses a threshold.
//!
//! Usage: `mpn <device token> [application id]`

use colored::*;
use lightstreamer_sdk::client::LightstreamerClient;
use lightstreamer_sdk::mpn::{
    FirebaseMpnBuilder, MpnDevice, MpnDeviceListener, MpnDeviceStatus, MpnPlatform,
    MpnSubscription, MpnSubscriptionFilter, MpnSubscriptionListener, MpnSubscriptionStatus,
};
use lightstreamer_sdk::subscription::SubscriptionMode;
use lightstreamer_sdk::utils::{setup_logger, setup_signal_hook};
use std::sync::Arc;
use tokio::sync::{Mutex, Notify};
use tracing::{error, info, warn};

struct DeviceListener;

impl MpnDeviceListener for DeviceListener {
    fn on_registered(&mut self) {
        info!("{}", "📱 device registered".bright_green());
    }

    fn on_status_changed(&mut self, status: MpnDeviceStatus, timestamp: u64) {
        info!("device status {:?} at {}", status, timestamp);
    }

    fn on_registration_failed(&mut self, code: i32, message: Option<&str>) {
        error!("device registration failed: {} {:?}", code, message);
    }

    fn on_subscriptions_updated(&mut self) {
        info!("the MPN subscriptions of the device changed");
    }
}

struct AlertListener;

impl MpnSubscriptionListener for AlertListener {
    fn on_subscription(&mut self) {
        info!("{}", "🔔 alert active on the server".bright_green());
    }

    fn on_subscription_error(&mut self, code: i32, message: Option<&str>) {
        error!("alert refused: {} {:?}", code, message);
    }

    fn on_triggered(&mut self) {
        info!("{}", "🚨 alert triggered".bright_yellow().bold());
    }

    fn on_status_changed(&mut self, status: MpnSubscriptionStatus, timestamp: u64) {
        info!("alert status {:?} at {}", status, timestamp);
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    setup_logger();

    let mut args = std::env::args().skip(1);
    let Some(token) = args.next() else {
        warn!("usage: mpn <device token> [application id]");
        return Ok(());
    };
    let application_id = args.next().unwrap_or_else(|| "com.lightstreamer.demo".to_string());

    let device = MpnDevice::new(&token, &application_id, MpnPlatform::Google)?;
    device.add_listener(Box::new(DeviceListener));

    let alert = MpnSubscription::new(
        SubscriptionMode::Merge,
        Some(vec!["item1".to_string()]),
        Some(vec!["stock_name".to_string(), "last_price".to_string()]),
    )?;
    alert.set_data_adapter(Some("QUOTE_ADAPTER".to_string()))?;
    let format = FirebaseMpnBuilder::new()
        .set_title(Some("${stock_name}"))
        .set_body(Some("Price is now ${last_price}"))
        .build();
    alert.set_notification_format(&format)?;
    alert.set_trigger_expression(Some("Double.parseDouble(${last_price}) > 10.0"))?;
    alert.add_listener(Box::new(AlertListener));

    let mut client = LightstreamerClient::new(
        Some("http://push.lightstreamer.com"),
        Some("DEMO"),
        None,
        None,
    )?;
    client.register_for_mpn(&device);
    client.subscribe_mpn(&alert, true)?;
    let client = Arc::new(Mutex::new(client));

    let shutdown_signal = Arc::new(Notify::new());
    setup_signal_hook(Arc::clone(&shutdown_signal)).await?;

    if let Err(e) = LightstreamerClient::connect(client.clone(), shutdown_signal).await {
        error!("session ended with an error: {}", e);
    }

    for subscription in client
        .lock()
        .await
        .get_mpn_subscriptions(MpnSubscriptionFilter::All)
    {
        info!(
            "known MPN subscription {:?}: {:?}",
            subscription.get_subscription_id(),
            subscription.get_status()
        );
    }
    Ok(())
}
