/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 18/10/26
******************************************************************************/

//! The client facade and its connection loop.

use crate::client::listener::{ClientEvent, ClientListener, SharedClientListener};
use crate::client::session::{Notice, Session};
use crate::client::utils::{cookie_header, cookie_host, parse_set_cookie, websocket_url};
use crate::client::{
    ClientStatus, ConnectionType, DisconnectionType, SubscriptionRequest, Transport,
};
use crate::connection::{ConnectionDetails, ConnectionOptions, MaxBandwidth};
use crate::mpn::{MpnDevice, MpnSubscription, MpnSubscriptionFilter};
use crate::protocol::{CLIENT_ID, CreateSession, ServerNotification, TLCP_SUBPROTOCOL};
use crate::subscription::Subscription;
use crate::utils::LightstreamerError;
use cookie::{Cookie, CookieJar};
use futures_util::{SinkExt, StreamExt};
use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::{Mutex, Notify};
use tokio::time::{Instant, sleep, sleep_until};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::header::{COOKIE, SEC_WEBSOCKET_PROTOCOL, SET_COOKIE};
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue};
use tracing::{debug, error, info, trace, warn};

/// Name of this client library, as reported to the server.
pub const LIB_NAME: &str = "rust_client";

/// Version of this client library.
pub const LIB_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Keepalive assumed until the server grants one with `CONOK`.
const DEFAULT_KEEPALIVE_MS: u64 = 5_000;

/// Stand-in for a deadline that does not fit in an `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// The instant `delay` from now, capped at [`FAR_FUTURE`] when the addition overflows.
fn deadline_after(delay: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(delay).unwrap_or_else(|| now + FAR_FUTURE)
}

/// What the connection loop does after an event.
#[derive(Debug)]
enum Flow {
    Continue,
    /// Drop the session and open a new one after the retry delay.
    Reconnect,
    /// Close the session and return.
    Stop,
    /// The server refused or closed the session for good.
    Fatal(LightstreamerError),
}

/// Facade class for the management of the communication to Lightstreamer Server.
///
/// Used to provide configuration settings, event handlers, operations for the control of the
/// connection lifecycle, `Subscription` handling and to offer some info about the connection.
/// An instance is shared with the connection loop as `Arc<tokio::sync::Mutex<_>>`:
///
/// ```ignore
/// let client = Arc::new(Mutex::new(LightstreamerClient::new(
///     Some("http://push.lightstreamer.com"),
///     Some("DEMO"),
///     None,
///     None,
/// )?));
/// client.lock().await.subscribe(&subscription)?;
/// LightstreamerClient::connect(client.clone(), shutdown).await?;
/// ```
pub struct LightstreamerClient {
    /// Server address, adapter set and credentials, plus what the server reports about the
    /// session.
    pub connection_details: ConnectionDetails,
    /// Policy settings read when a session is created.
    pub connection_options: ConnectionOptions,
    listeners: Vec<SharedClientListener>,
    status: ClientStatus,
    session: Session,
    cookies: HashMap<String, CookieJar>,
    request_sender: UnboundedSender<SubscriptionRequest>,
    request_receiver: Option<UnboundedReceiver<SubscriptionRequest>>,
    server_keepalive: Option<u64>,
}

impl LightstreamerClient {
    /// Creates a client. No connection is attempted until [`LightstreamerClient::connect`].
    ///
    /// # Errors
    ///
    /// Illegal argument if `server_address` is not a valid http, https, ws or wss URL.
    pub fn new(
        server_address: Option<&str>,
        adapter_set: Option<&str>,
        username: Option<&str>,
        password: Option<&str>,
    ) -> Result<Self, LightstreamerError> {
        let connection_details =
            ConnectionDetails::new(server_address, adapter_set, username, password)?;
        let (request_sender, request_receiver) = mpsc::unbounded_channel();
        Ok(LightstreamerClient {
            connection_details,
            connection_options: ConnectionOptions::new(),
            listeners: Vec::new(),
            status: ClientStatus::Disconnected(DisconnectionType::Stopped),
            session: Session::new(request_sender.clone()),
            cookies: HashMap::new(),
            request_sender,
            request_receiver: Some(request_receiver),
            server_keepalive: None,
        })
    }

    /// Adds a listener that will receive events from the client. `on_listen_start` is called
    /// on it right away.
    pub fn add_listener(&mut self, mut listener: Box<dyn ClientListener>) {
        listener.on_listen_start();
        self.listeners.push(Arc::new(StdMutex::new(listener)));
    }

    /// Removes the listener at `index` (in insertion order); `on_listen_end` is called on it.
    ///
    /// # Errors
    ///
    /// Illegal argument if there is no listener at `index`.
    pub fn remove_listener(&mut self, index: usize) -> Result<(), LightstreamerError> {
        if index >= self.listeners.len() {
            return Err(LightstreamerError::illegal_argument(format!(
                "no listener at index {}",
                index
            )));
        }
        let removed = self.listeners.remove(index);
        removed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .on_listen_end();
        Ok(())
    }

    /// Number of listeners currently attached.
    pub fn get_listeners(&self) -> usize {
        self.listeners.len()
    }

    /// Current status of the client.
    pub fn get_status(&self) -> ClientStatus {
        self.status
    }

    /// Operation method that adds a `Subscription` to the list of "active" subscriptions.
    ///
    /// The subscription is sent to the server as soon as a session is available, and again on
    /// every new session until it is unsubscribed. Its listeners are notified with
    /// `on_subscription` once the server accepts it.
    ///
    /// # Errors
    ///
    /// Illegal state if the subscription is already active; illegal argument if items or
    /// fields are missing.
    pub fn subscribe(&mut self, subscription: &Subscription) -> Result<(), LightstreamerError> {
        self.session.subscribe(subscription)
    }

    /// Operation method that removes a `Subscription` from the "active" ones.
    ///
    /// `on_unsubscription` is delivered before this call returns if the subscription was
    /// subscribed.
    ///
    /// # Errors
    ///
    /// Illegal state if the subscription is not active in this client.
    pub fn unsubscribe(&mut self, subscription: &Subscription) -> Result<(), LightstreamerError> {
        let notices = self.session.unsubscribe(subscription)?;
        self.dispatch(&notices);
        Ok(())
    }

    /// The subscriptions currently active in this client.
    pub fn get_subscriptions(&self) -> Vec<Subscription> {
        self.session.get_subscriptions()
    }

    /// Stores cookies to be sent to the server whose address is `uri`.
    ///
    /// # Errors
    ///
    /// Illegal argument if `uri` has no host.
    pub fn add_cookies(
        &mut self,
        uri: &str,
        cookies: Vec<Cookie<'static>>,
    ) -> Result<(), LightstreamerError> {
        let jar = self.cookies.entry(cookie_host(uri)?).or_default();
        for cookie in cookies {
            jar.add(cookie);
        }
        Ok(())
    }

    /// Cookies stored for `uri`, or every stored cookie when `uri` is `None`. Cookies set by
    /// the server on the WebSocket handshake are included.
    ///
    /// # Errors
    ///
    /// Illegal argument if `uri` has no host.
    pub fn get_cookies(&self, uri: Option<&str>) -> Result<Vec<Cookie<'static>>, LightstreamerError> {
        match uri {
            Some(uri) => Ok(self
                .cookies
                .get(&cookie_host(uri)?)
                .map(|jar| jar.iter().cloned().collect())
                .unwrap_or_default()),
            None => Ok(self
                .cookies
                .values()
                .flat_map(|jar| jar.iter().cloned())
                .collect()),
        }
    }

    /// Operation method that requests to close the session, if any. Subscriptions stay active
    /// and are sent again by the next [`LightstreamerClient::connect`].
    pub fn disconnect(&mut self) {
        if self.request_sender.send(SubscriptionRequest::Disconnect).is_err() {
            debug!("client loop not running");
        }
    }

    // ---- MPN ----

    /// Registers the device for push notifications on the current and on every following
    /// session. Replaces any previously registered device.
    pub fn register_for_mpn(&mut self, device: &MpnDevice) {
        self.session.register_for_mpn(device);
    }

    /// Activates an MPN subscription on the registered device. With `coalescing`, the server
    /// reuses an existing subscription with the same parameters instead of creating one.
    ///
    /// # Errors
    ///
    /// Illegal state without a registered device or if the subscription is already active;
    /// illegal argument if items, fields or the notification format are missing.
    pub fn subscribe_mpn(
        &mut self,
        subscription: &MpnSubscription,
        coalescing: bool,
    ) -> Result<(), LightstreamerError> {
        let notices = self.session.subscribe_mpn(subscription, coalescing)?;
        self.dispatch(&notices);
        Ok(())
    }

    /// Deactivates an MPN subscription.
    ///
    /// # Errors
    ///
    /// Illegal state if the subscription is not subscribed or the device is not registered
    /// on the current session.
    pub fn unsubscribe_mpn(&mut self, subscription: &MpnSubscription) -> Result<(), LightstreamerError> {
        let notices = self.session.unsubscribe_mpn(subscription)?;
        self.dispatch(&notices);
        Ok(())
    }

    /// Deactivates every MPN subscription of the device matching `filter`.
    ///
    /// # Errors
    ///
    /// Illegal state if the device is not registered on the current session.
    pub fn unsubscribe_mpn_subscriptions(
        &mut self,
        filter: MpnSubscriptionFilter,
    ) -> Result<(), LightstreamerError> {
        self.session.unsubscribe_mpn_subscriptions(filter)
    }

    /// MPN subscriptions known to the client, either activated here or found on the server.
    pub fn get_mpn_subscriptions(&self, filter: MpnSubscriptionFilter) -> Vec<MpnSubscription> {
        self.session.get_mpn_subscriptions(filter)
    }

    /// The MPN subscription with the given server-side id, if known.
    pub fn find_mpn_subscription(&self, subscription_id: &str) -> Option<MpnSubscription> {
        self.session.find_mpn_subscription(subscription_id)
    }

    // ---- connection ----

    /// Operation method that opens a session and keeps it alive until `shutdown` is notified,
    /// [`LightstreamerClient::disconnect`] is called or the server closes the session for
    /// good.
    ///
    /// Lost connections are retried after the retry delay, with status
    /// `DISCONNECTED:WILL-RETRY`, and every active subscription is sent again on the new
    /// session. All listener events of the client are dispatched from this loop.
    ///
    /// # Errors
    ///
    /// Illegal state if no server address is set or the client is already connected; illegal
    /// argument if an HTTP or polling transport is forced; a server error if the server
    /// refused or closed the session.
    pub async fn connect(
        client: Arc<Mutex<Self>>,
        shutdown: Arc<Notify>,
    ) -> Result<(), LightstreamerError> {
        let mut requests = {
            let mut guard = client.lock().await;
            guard.check_connectable()?;
            guard.request_receiver.take().ok_or_else(|| {
                LightstreamerError::illegal_state("client is already connected")
            })?
        };
        // Changes requested while disconnected wait on the session for the next bind; a stale
        // disconnection is dropped.
        let waiting: Vec<_> = std::iter::from_fn(|| requests.try_recv().ok())
            .filter(|request| !matches!(request, SubscriptionRequest::Disconnect))
            .collect();
        Self::with_client(&client, |this, _| {
            for request in waiting {
                this.handle_request(Some(request));
            }
        })
        .await;

        let result = Self::run(&client, &mut requests, &shutdown).await;

        Self::with_client(&client, |this, notices| {
            this.request_receiver = Some(requests);
            notices.extend(this.unbind());
            notices.extend(this.set_status(ClientStatus::Disconnected(DisconnectionType::Stopped)));
        })
        .await;
        info!("client disconnected");
        result
    }

    async fn run(
        client: &Arc<Mutex<Self>>,
        requests: &mut UnboundedReceiver<SubscriptionRequest>,
        shutdown: &Notify,
    ) -> Result<(), LightstreamerError> {
        loop {
            match Self::run_session(client, requests, shutdown).await {
                Ok(Flow::Stop) => return Ok(()),
                Ok(Flow::Fatal(error)) => return Err(error),
                Ok(flow) => debug!("session ended: {:?}", flow),
                Err(e) => warn!("connection failed: {}", e),
            }

            let delay = Self::with_client(client, |this, notices| {
                let established = this.connection_details.get_session_id().is_some();
                notices.extend(this.unbind());
                notices.extend(this.set_status(ClientStatus::Disconnected(DisconnectionType::WillRetry)));
                this.connection_options.retry_delay(established)
            })
            .await;
            info!("retrying in {} ms", delay.as_millis());

            let wait = sleep(delay);
            tokio::pin!(wait);
            loop {
                tokio::select! {
                    _ = &mut wait => break,
                    _ = shutdown.notified() => return Ok(()),
                    request = requests.recv() => match request {
                        Some(SubscriptionRequest::Disconnect) | None => return Ok(()),
                        Some(request) => {
                            Self::with_client(client, |this, _| this.handle_request(Some(request))).await;
                        }
                    },
                }
            }
        }
    }

    async fn run_session(
        client: &Arc<Mutex<Self>>,
        requests: &mut UnboundedReceiver<SubscriptionRequest>,
        shutdown: &Notify,
    ) -> Result<Flow, LightstreamerError> {
        let (request, create_session) = Self::with_client(client, |this, notices| {
            notices.extend(this.set_status(ClientStatus::Connecting));
            this.server_keepalive = None;
            Ok::<_, LightstreamerError>((this.handshake_request()?, this.create_session_request()))
        })
        .await?;
        let host = request.uri().host().map(str::to_lowercase);

        debug!("opening {}", request.uri());
        let (socket, response) = connect_async(request).await?;
        let set_cookies: Vec<Cookie<'static>> = response
            .headers()
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .filter_map(parse_set_cookie)
            .collect();
        Self::with_client(client, |this, notices| {
            if let Some(host) = host {
                let jar = this.cookies.entry(host).or_default();
                for cookie in set_cookies {
                    jar.add(cookie);
                }
            }
            if this.connection_options.get_forced_transport() != Some(&Transport::WsStreaming) {
                notices.extend(
                    this.set_status(ClientStatus::Connected(ConnectionType::StreamSensing)),
                );
            }
        })
        .await;

        let (mut write, mut read) = socket.split();
        write.send(Message::Text("wsok".into())).await?;
        trace!("sending create_session");
        write.send(Message::Text(create_session.to_message()?.into())).await?;

        let mut stalled = false;
        let mut deadline = deadline_after(Self::with_client(client, |this, _| this.stall_window()).await);
        loop {
            let flow = tokio::select! {
                _ = shutdown.notified() => {
                    Self::with_client(client, |this, _| this.handle_request(None)).await
                }
                _ = sleep_until(deadline) => {
                    if stalled {
                        warn!("no data from the server, dropping the connection");
                        Flow::Reconnect
                    } else {
                        stalled = true;
                        Self::with_client(client, |this, notices| {
                            warn!("connection stalled");
                            notices.extend(this.set_status(ClientStatus::Stalled));
                            deadline = deadline_after(this.connection_options.lost_after_stall());
                        })
                        .await;
                        Flow::Continue
                    }
                }
                request = requests.recv() => {
                    Self::with_client(client, |this, _| this.handle_request(request)).await
                }
                message = read.next() => match message {
                    Some(Ok(Message::Text(text))) => {
                        Self::with_client(client, |this, notices| {
                            if stalled {
                                stalled = false;
                                notices.extend(
                                    this.set_status(ClientStatus::Connected(ConnectionType::WsStreaming)),
                                );
                            }
                            let flow = this.process_text(text.as_str(), notices);
                            deadline = deadline_after(this.stall_window());
                            flow
                        })
                        .await
                    }
                    Some(Ok(Message::Close(frame))) => {
                        debug!("server closed the WebSocket: {:?}", frame);
                        Flow::Reconnect
                    }
                    Some(Ok(_)) => Flow::Continue,
                    Some(Err(e)) => return Err(e.into()),
                    None => Flow::Reconnect,
                }
            };

            let outbox = Self::with_client(client, |this, _| this.session.take_outbox()).await;
            for request in outbox {
                let message = request.to_message()?;
                trace!("sending {}", message);
                write.send(Message::Text(message.into())).await?;
            }

            if !matches!(flow, Flow::Continue) {
                if let Err(e) = write.close().await {
                    debug!("error closing the WebSocket: {}", e);
                }
                return Ok(flow);
            }
        }
    }

    /// Locks the client for `apply`, then dispatches the notices it produced once the lock is
    /// released.
    async fn with_client<T>(
        client: &Arc<Mutex<Self>>,
        apply: impl FnOnce(&mut Self, &mut Vec<Notice>) -> T,
    ) -> T {
        let (value, notices, listeners) = {
            let mut guard = client.lock().await;
            let mut notices = Vec::new();
            let value = apply(&mut guard, &mut notices);
            (value, notices, guard.listeners.clone())
        };
        for notice in &notices {
            notice.dispatch(&listeners);
        }
        value
    }

    fn dispatch(&self, notices: &[Notice]) {
        for notice in notices {
            notice.dispatch(&self.listeners);
        }
    }

    fn check_connectable(&self) -> Result<(), LightstreamerError> {
        if let Some(transport) = self.connection_options.get_forced_transport() {
            if !transport.is_supported() {
                return Err(LightstreamerError::illegal_argument(format!(
                    "transport {} is not supported",
                    transport
                )));
            }
        }
        let address = self
            .connection_details
            .get_server_address()
            .ok_or_else(|| LightstreamerError::illegal_state("server address not set"))?;
        websocket_url(address)?;
        Ok(())
    }

    fn set_status(&mut self, status: ClientStatus) -> Option<Notice> {
        if self.status == status {
            return None;
        }
        debug!("client status {} -> {}", self.status, status);
        self.status = status;
        Some(Notice::Client(ClientEvent::StatusChange(status)))
    }

    fn unbind(&mut self) -> Vec<Notice> {
        self.server_keepalive = None;
        let mut notices = self.session.unbind();
        if self.connection_details.get_session_id().is_some() {
            self.connection_details.set_session_id(None);
            notices.push(Notice::Client(ClientEvent::PropertyChange("sessionId")));
        }
        notices
    }

    fn stall_window(&self) -> Duration {
        self.connection_options
            .stall_after(self.server_keepalive.unwrap_or(DEFAULT_KEEPALIVE_MS))
    }

    /// WebSocket handshake request: TLCP subprotocol, extra headers and stored cookies.
    fn handshake_request(&self) -> Result<Request, LightstreamerError> {
        let address = self
            .connection_details
            .get_server_address()
            .ok_or_else(|| LightstreamerError::illegal_state("server address not set"))?;
        let url = websocket_url(address)?;
        let mut request = url.as_str().into_client_request()?;
        let headers = request.headers_mut();
        headers.insert(SEC_WEBSOCKET_PROTOCOL, HeaderValue::from_static(TLCP_SUBPROTOCOL));
        if let Some(extra) = self.connection_options.get_http_extra_headers() {
            for (name, value) in extra {
                let header = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
                    LightstreamerError::illegal_argument(format!("invalid header '{}': {}", name, e))
                })?;
                let value = HeaderValue::from_str(value).map_err(|e| {
                    LightstreamerError::illegal_argument(format!(
                        "invalid value for header '{}': {}",
                        name, e
                    ))
                })?;
                headers.insert(header, value);
            }
        }
        let cookies = url
            .host_str()
            .and_then(|host| self.cookies.get(&host.to_lowercase()))
            .and_then(cookie_header);
        if let Some(cookies) = cookies {
            let value = HeaderValue::from_str(&cookies)
                .map_err(|e| LightstreamerError::illegal_argument(format!("invalid cookie: {}", e)))?;
            headers.insert(COOKIE, value);
        }
        Ok(request)
    }

    fn create_session_request(&self) -> CreateSession {
        let positive = |value: u64| (value > 0).then_some(value);
        CreateSession {
            cid: CLIENT_ID,
            adapter_set: self.connection_details.get_adapter_set().cloned(),
            user: self.connection_details.get_user().cloned(),
            password: self.connection_details.get_password().cloned(),
            keepalive_millis: positive(self.connection_options.get_keepalive_interval()),
            inactivity_millis: positive(self.connection_options.get_reverse_heartbeat_interval()),
            requested_max_bandwidth: match self.connection_options.get_requested_max_bandwidth() {
                MaxBandwidth::Limited(kbps) => Some(kbps.to_string()),
                _ => None,
            },
        }
    }

    fn handle_request(&mut self, request: Option<SubscriptionRequest>) -> Flow {
        match request {
            Some(SubscriptionRequest::Flush) => Flow::Continue,
            Some(SubscriptionRequest::Reconfigure(id)) => {
                self.session.reconfigure(id);
                Flow::Continue
            }
            Some(SubscriptionRequest::ModifyMpn(id, property)) => {
                self.session.modify_mpn(&id, property);
                Flow::Continue
            }
            Some(SubscriptionRequest::Disconnect) | None => {
                info!("closing the session");
                self.session.destroy();
                Flow::Stop
            }
        }
    }

    /// Applies the lines of a WebSocket frame; stops at the first one that ends the session.
    fn process_text(&mut self, text: &str, notices: &mut Vec<Notice>) -> Flow {
        for line in text.lines().filter(|line| !line.is_empty()) {
            trace!("received {}", line);
            let notification = match ServerNotification::parse(line) {
                Ok(notification) => notification,
                Err(e) => {
                    warn!("ignoring '{}': {}", line, e);
                    continue;
                }
            };
            let flow = self.process(notification, notices);
            if !matches!(flow, Flow::Continue) {
                return flow;
            }
        }
        Flow::Continue
    }

    fn process(&mut self, notification: ServerNotification, notices: &mut Vec<Notice>) -> Flow {
        match notification {
            ServerNotification::ConOk {
                session_id,
                request_limit,
                keepalive_ms,
                control_link,
            } => {
                info!("session {} created", session_id);
                debug!("request limit {}, keepalive {} ms", request_limit, keepalive_ms);
                self.connection_details.set_session_id(Some(session_id));
                notices.push(Notice::Client(ClientEvent::PropertyChange("sessionId")));
                if let Some(link) = control_link {
                    if !self.connection_options.is_server_instance_address_ignored() {
                        self.connection_details.set_server_instance_address(Some(link));
                        notices.push(Notice::Client(ClientEvent::PropertyChange(
                            "serverInstanceAddress",
                        )));
                    }
                }
                self.server_keepalive = Some(keepalive_ms);
                notices.extend(self.set_status(ClientStatus::Connected(ConnectionType::WsStreaming)));
                self.session.bind();
                Flow::Continue
            }
            ServerNotification::ConErr { code, message }
            | ServerNotification::End { code, message }
            | ServerNotification::Error { code, message } => {
                error!("server error {}: {}", code, message);
                notices.push(Notice::Client(ClientEvent::ServerError {
                    code,
                    message: message.clone(),
                }));
                Flow::Fatal(LightstreamerError::Server { code, message })
            }
            ServerNotification::Loop { expected_delay_ms } => {
                debug!("server asked to rebind in {} ms", expected_delay_ms);
                Flow::Reconnect
            }
            ServerNotification::ServName(name) => {
                self.connection_details.set_server_socket_name(Some(name));
                notices.push(Notice::Client(ClientEvent::PropertyChange("serverSocketName")));
                Flow::Continue
            }
            ServerNotification::ClientIp(ip) => {
                self.connection_details.set_client_ip(Some(ip));
                notices.push(Notice::Client(ClientEvent::PropertyChange("clientIp")));
                Flow::Continue
            }
            ServerNotification::Cons(bandwidth) => {
                self.connection_options.set_real_max_bandwidth(Some(bandwidth));
                notices.push(Notice::Client(ClientEvent::PropertyChange("realMaxBandwidth")));
                Flow::Continue
            }
            ServerNotification::WsOk
            | ServerNotification::Probe
            | ServerNotification::Noop
            | ServerNotification::Sync(_)
            | ServerNotification::Prog(_) => Flow::Continue,
            other => match self.session.handle(other) {
                Ok(session_notices) => {
                    notices.extend(session_notices);
                    Flow::Continue
                }
                Err(e) => {
                    error!("cannot apply update: {}", e);
                    Flow::Reconnect
                }
            },
        }
    }
}
