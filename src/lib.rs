//! # Lightstreamer Rust SDK
//!
//! A client library for Lightstreamer Server speaking TLCP (the text based live connection
//! protocol) over WebSocket. It covers real-time subscriptions in every mode and mobile and
//! web push notifications (MPN).
//!
//! ## About Lightstreamer
//!
//! Lightstreamer is a real-time messaging server. Clients subscribe to *items* (a stock
//! quote, a chat room, an order book) and receive the values of their *fields* as the server
//! pushes them, filtered and throttled to what the client asked for and what the network can
//! carry.
//!
//! ## Features
//!
//! - **Connection management**: WebSocket streaming with the TLCP subprotocol, extra HTTP
//!   headers and cookies on the handshake, keepalive based stall detection and automatic
//!   reconnection with a fresh session, with every active subscription sent again.
//! - **Subscriptions**: MERGE, DISTINCT, COMMAND and RAW modes, item groups and field
//!   schemas, snapshots, buffer size and frequency limits (changeable while subscribed),
//!   selectors and two-level COMMAND subscriptions.
//! - **Item updates**: values by name or position, changed fields, snapshot flags, JSON
//!   Patch and TLCP-diff decoding, and per-key values for COMMAND items.
//! - **Mobile push notifications**: device registration, MPN subscriptions with triggers and
//!   notification formats, discovery of the subscriptions persisted on the server, and
//!   builders for Firebase and Safari payloads.
//! - **Events**: listener traits for the client, subscriptions, MPN devices and MPN
//!   subscriptions, plus a channel based subscription listener.
//!
//! HTTP streaming and polling transports are not implemented: forcing one of them makes
//! [`client::LightstreamerClient::connect`] fail.
//!
//! ## Installation
//!
//! ```toml
//! [dependencies]
//! lightstreamer-sdk = "0.2.0"
//! ```
//!
//! ## Usage
//!
//! ```ignore
//! use lightstreamer_sdk::client::{LightstreamerClient, Transport};
//! use lightstreamer_sdk::subscription::{ItemUpdate, Subscription, SubscriptionListener, SubscriptionMode};
//! use lightstreamer_sdk::utils::{setup_logger, setup_signal_hook};
//! use std::sync::Arc;
//! use tokio::sync::{Mutex, Notify};
//! use tracing::info;
//!
//! struct QuoteListener;
//!
//! impl SubscriptionListener for QuoteListener {
//!     fn on_item_update(&mut self, update: &ItemUpdate) {
//!         for (field, value) in update.get_changed_fields() {
//!             info!("{:?} {} = {:?}", update.get_item_name(), field, value);
//!         }
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     setup_logger();
//!
//!     let subscription = Subscription::new(
//!         SubscriptionMode::Merge,
//!         Some(vec!["item1".to_string(), "item2".to_string()]),
//!         Some(vec!["stock_name".to_string(), "last_price".to_string()]),
//!     )?;
//!     subscription.set_data_adapter(Some("QUOTE_ADAPTER".to_string()))?;
//!     subscription.add_listener(Box::new(QuoteListener));
//!
//!     let mut client = LightstreamerClient::new(
//!         Some("http://push.lightstreamer.com"),
//!         Some("DEMO"),
//!         None,
//!         None,
//!     )?;
//!     client.connection_options.set_forced_transport(Some(Transport::WsStreaming));
//!     client.subscribe(&subscription)?;
//!     let client = Arc::new(Mutex::new(client));
//!
//!     let shutdown = Arc::new(Notify::new());
//!     setup_signal_hook(shutdown.clone()).await?;
//!     LightstreamerClient::connect(client, shutdown).await?;
//!     Ok(())
//! }
//! ```
//!
//! ### Client events
//!
//! ```ignore
//! use lightstreamer_sdk::client::{ClientListener, ClientStatus};
//!
//! struct StatusListener;
//!
//! impl ClientListener for StatusListener {
//!     fn on_status_change(&mut self, status: &ClientStatus) {
//!         println!("status: {}", status);
//!     }
//!
//!     fn on_server_error(&mut self, code: i32, message: &str) {
//!         println!("server error {}: {}", code, message);
//!     }
//! }
//!
//! client.lock().await.add_listener(Box::new(StatusListener));
//! ```
//!
//! ### Push notifications
//!
//! ```ignore
//! use lightstreamer_sdk::mpn::{FirebaseMpnBuilder, MpnDevice, MpnPlatform, MpnSubscription};
//!
//! let device = MpnDevice::new("device-token", "com.example.app", MpnPlatform::Google)?;
//! let alert = MpnSubscription::new(
//!     SubscriptionMode::Merge,
//!     Some(vec!["item1".to_string()]),
//!     Some(vec!["last_price".to_string()]),
//! )?;
//! let format = FirebaseMpnBuilder::new()
//!     .set_title(Some("Price alert"))
//!     .set_body(Some("item1 is now ${last_price}"))
//!     .build();
//! alert.set_notification_format(&format)?;
//! alert.set_trigger_expression(Some("Double.parseDouble(${last_price}) > 10"))?;
//!
//! let mut guard = client.lock().await;
//! guard.register_for_mpn(&device);
//! guard.subscribe_mpn(&alert, false)?;
//! ```

/// Module containing subscription-related functionality.
///
/// This module provides the necessary types and functions to create and manage subscriptions
/// to Lightstreamer items. It includes the `Subscription` struct, subscription modes,
/// item updates, and subscription listeners.
pub mod subscription;

/// Module containing utility functions and error types.
///
/// This module provides the error type of the library, logging setup and signal handling.
pub mod utils;

/// Module containing client-related functionality.
///
/// This module provides the main `LightstreamerClient` type and related components for
/// connecting to Lightstreamer servers, managing sessions, and handling client events.
pub mod client;

/// Module containing connection-related functionality.
///
/// This module provides types for managing connection details and options.
pub mod connection;

/// Module containing mobile and web push notification functionality.
///
/// Devices, MPN subscriptions and the builders of their notification formats.
pub mod mpn;

/// TLCP wire format.
pub(crate) mod protocol;
