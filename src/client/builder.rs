/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 25/10/25
******************************************************************************/

//! Builder API for setting up a client and its subscriptions in a few calls.
//!
//! `ClientConfig` and `SubscriptionParams` collect settings and validate them when they are
//! built; `SimpleClient` ties a configured client to channel based subscriptions.

use crate::client::{ClientListener, ClientStatus, LightstreamerClient, Transport};
use crate::connection::MaxBandwidth;
use crate::subscription::{
    BufferSize, ChannelSubscriptionListener, ItemUpdate, MaxFrequency, Snapshot, Subscription,
    SubscriptionMode,
};
use crate::utils::LightstreamerError;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, Notify, mpsc};

/// Settings of a `LightstreamerClient`.
///
/// Only the server address is required. WebSocket streaming is forced unless another
/// transport is chosen. Timing values are in milliseconds.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server address, e.g. `https://push.lightstreamer.com`.
    pub server_address: String,
    pub adapter_set: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub transport: Option<Transport>,
    pub keepalive_interval: Option<u64>,
    /// Polling only; no effect on the WebSocket streaming transport.
    pub idle_timeout: Option<u64>,
    pub reconnect_timeout: Option<u64>,
    pub stalled_timeout: Option<u64>,
    /// Delay before a new session is attempted after a connection loss.
    pub retry_delay: Option<u64>,
    pub max_bandwidth: Option<MaxBandwidth>,
    /// Extra headers of the WebSocket handshake.
    pub http_headers: HashMap<String, String>,
}

impl ClientConfig {
    pub fn new(server_address: impl Into<String>) -> Self {
        Self {
            server_address: server_address.into(),
            adapter_set: None,
            username: None,
            password: None,
            transport: Some(Transport::WsStreaming),
            keepalive_interval: None,
            idle_timeout: None,
            reconnect_timeout: None,
            stalled_timeout: None,
            retry_delay: None,
            max_bandwidth: None,
            http_headers: HashMap::new(),
        }
    }

    #[must_use]
    pub fn adapter_set(mut self, adapter_set: impl Into<String>) -> Self {
        self.adapter_set = Some(adapter_set.into());
        self
    }

    #[must_use]
    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    #[must_use]
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Forces a transport. Only `Ws` and `WsStreaming` can connect.
    #[must_use]
    pub fn transport(mut self, transport: Transport) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Lets the client pick the transport.
    #[must_use]
    pub fn any_transport(mut self) -> Self {
        self.transport = None;
        self
    }

    #[must_use]
    pub fn keepalive_interval(mut self, interval: u64) -> Self {
        self.keepalive_interval = Some(interval);
        self
    }

    #[must_use]
    pub fn idle_timeout(mut self, timeout: u64) -> Self {
        self.idle_timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn reconnect_timeout(mut self, timeout: u64) -> Self {
        self.reconnect_timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn stalled_timeout(mut self, timeout: u64) -> Self {
        self.stalled_timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn retry_delay(mut self, delay: u64) -> Self {
        self.retry_delay = Some(delay);
        self
    }

    #[must_use]
    pub fn max_bandwidth(mut self, bandwidth: MaxBandwidth) -> Self {
        self.max_bandwidth = Some(bandwidth);
        self
    }

    #[must_use]
    pub fn http_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.http_headers.insert(name.into(), value.into());
        self
    }

    /// Creates a client with these settings.
    ///
    /// # Errors
    ///
    /// Illegal argument for an invalid server address or a timing value of zero where a
    /// positive one is required.
    pub fn build(&self) -> Result<LightstreamerClient, LightstreamerError> {
        let mut client = LightstreamerClient::new(
            Some(&self.server_address),
            self.adapter_set.as_deref(),
            self.username.as_deref(),
            self.password.as_deref(),
        )?;
        let options = &mut client.connection_options;
        options.set_forced_transport(self.transport);
        if let Some(interval) = self.keepalive_interval {
            options.set_keepalive_interval(interval);
        }
        if let Some(timeout) = self.idle_timeout {
            options.set_idle_timeout(timeout);
        }
        if let Some(timeout) = self.reconnect_timeout {
            options.set_reconnect_timeout(timeout)?;
        }
        if let Some(timeout) = self.stalled_timeout {
            options.set_stalled_timeout(timeout)?;
        }
        if let Some(delay) = self.retry_delay {
            options.set_retry_delay(delay)?;
        }
        if let Some(bandwidth) = self.max_bandwidth {
            options.set_requested_max_bandwidth(bandwidth)?;
        }
        if !self.http_headers.is_empty() {
            options.set_http_extra_headers(Some(self.http_headers.clone()));
        }
        Ok(client)
    }
}

/// Settings of a `Subscription`.
///
/// A snapshot is requested by default, except in RAW mode where none is available.
#[derive(Debug, Clone)]
pub struct SubscriptionParams {
    pub mode: SubscriptionMode,
    pub items: Vec<String>,
    pub fields: Vec<String>,
    pub data_adapter: Option<String>,
    pub snapshot: Option<Snapshot>,
    pub max_frequency: Option<MaxFrequency>,
    pub buffer_size: Option<BufferSize>,
    pub selector: Option<String>,
    /// Fields of the second-level items of a COMMAND subscription.
    pub second_level_fields: Option<Vec<String>>,
    pub second_level_data_adapter: Option<String>,
}

impl SubscriptionParams {
    pub fn new(mode: SubscriptionMode, items: Vec<String>, fields: Vec<String>) -> Self {
        let snapshot = (mode != SubscriptionMode::Raw).then_some(Snapshot::Yes);
        Self {
            mode,
            items,
            fields,
            data_adapter: None,
            snapshot,
            max_frequency: None,
            buffer_size: None,
            selector: None,
            second_level_fields: None,
            second_level_data_adapter: None,
        }
    }

    #[must_use]
    pub fn data_adapter(mut self, adapter: impl Into<String>) -> Self {
        self.data_adapter = Some(adapter.into());
        self
    }

    #[must_use]
    pub fn snapshot(mut self, snapshot: Snapshot) -> Self {
        self.snapshot = Some(snapshot);
        self
    }

    /// Asks the server for no snapshot. Leaving the snapshot unset would request one in every
    /// mode but RAW.
    #[must_use]
    pub fn no_snapshot(mut self) -> Self {
        self.snapshot = Some(Snapshot::No);
        self
    }

    #[must_use]
    pub fn max_frequency(mut self, frequency: MaxFrequency) -> Self {
        self.max_frequency = Some(frequency);
        self
    }

    #[must_use]
    pub fn buffer_size(mut self, size: BufferSize) -> Self {
        self.buffer_size = Some(size);
        self
    }

    #[must_use]
    pub fn selector(mut self, selector: impl Into<String>) -> Self {
        self.selector = Some(selector.into());
        self
    }

    /// Makes a COMMAND subscription two-level.
    #[must_use]
    pub fn second_level(
        mut self,
        fields: Vec<String>,
        data_adapter: Option<impl Into<String>>,
    ) -> Self {
        self.second_level_fields = Some(fields);
        self.second_level_data_adapter = data_adapter.map(Into::into);
        self
    }

    /// Creates an inactive subscription with these settings.
    ///
    /// # Errors
    ///
    /// Whatever the matching `Subscription` setter rejects: invalid names, a snapshot or
    /// second level the mode does not allow, non-positive limits.
    pub fn build(&self) -> Result<Subscription, LightstreamerError> {
        let subscription =
            Subscription::new(self.mode, Some(self.items.clone()), Some(self.fields.clone()))?;
        subscription.set_data_adapter(self.data_adapter.clone())?;
        subscription.set_requested_snapshot(self.snapshot)?;
        subscription.set_requested_max_frequency(self.max_frequency)?;
        subscription.set_requested_buffer_size(self.buffer_size)?;
        subscription.set_selector(self.selector.clone())?;
        if self.second_level_fields.is_some() {
            subscription.set_command_second_level_fields(self.second_level_fields.clone())?;
            subscription
                .set_command_second_level_data_adapter(self.second_level_data_adapter.clone())?;
        }
        Ok(subscription)
    }
}

/// A client whose subscriptions deliver their updates to channels.
///
/// Clones share the same client.
#[derive(Clone)]
pub struct SimpleClient {
    client: Arc<Mutex<LightstreamerClient>>,
    shutdown_signal: Arc<Notify>,
}

impl SimpleClient {
    /// # Errors
    ///
    /// See [`ClientConfig::build`].
    pub fn new(config: ClientConfig) -> Result<Self, LightstreamerError> {
        Ok(Self {
            client: Arc::new(Mutex::new(config.build()?)),
            shutdown_signal: Arc::new(Notify::new()),
        })
    }

    /// Subscribes and returns the receiver of the subscription's updates.
    ///
    /// # Errors
    ///
    /// See [`SubscriptionParams::build`].
    pub async fn subscribe(
        &self,
        params: SubscriptionParams,
    ) -> Result<mpsc::UnboundedReceiver<ItemUpdate>, LightstreamerError> {
        let (_, receiver) = self.subscribe_with_handle(params).await?;
        Ok(receiver)
    }

    /// Like `subscribe`, also returning the subscription for later reconfiguration or
    /// `unsubscribe`.
    ///
    /// # Errors
    ///
    /// See [`SubscriptionParams::build`].
    pub async fn subscribe_with_handle(
        &self,
        params: SubscriptionParams,
    ) -> Result<(Subscription, mpsc::UnboundedReceiver<ItemUpdate>), LightstreamerError> {
        let subscription = params.build()?;
        let (listener, receiver) = ChannelSubscriptionListener::create_channel();
        subscription.add_listener(Box::new(listener));
        self.client.lock().await.subscribe(&subscription)?;
        Ok((subscription, receiver))
    }

    /// # Errors
    ///
    /// Illegal state if the subscription is not active on this client.
    pub async fn unsubscribe(&self, subscription: &Subscription) -> Result<(), LightstreamerError> {
        self.client.lock().await.unsubscribe(subscription)
    }

    pub async fn add_listener(&self, listener: Box<dyn ClientListener>) {
        self.client.lock().await.add_listener(listener);
    }

    pub async fn get_status(&self) -> ClientStatus {
        self.client.lock().await.get_status()
    }

    /// Runs the connection until `disconnect`, `shutdown` or a fatal server error.
    ///
    /// # Errors
    ///
    /// See [`LightstreamerClient::connect`].
    pub async fn connect(&self) -> Result<(), LightstreamerError> {
        LightstreamerClient::connect(self.client.clone(), self.shutdown_signal.clone()).await
    }

    /// Closes the session; `connect` returns once it is closed.
    pub async fn disconnect(&self) {
        self.client.lock().await.disconnect();
    }

    /// The underlying client, for MPN and everything this API does not cover.
    pub fn client(&self) -> Arc<Mutex<LightstreamerClient>> {
        self.client.clone()
    }

    /// The signal `connect` listens to, e.g. for `setup_signal_hook`.
    pub fn shutdown_signal(&self) -> Arc<Notify> {
        self.shutdown_signal.clone()
    }

    pub fn shutdown(&self) {
        self.shutdown_signal.notify_one();
    }
}
