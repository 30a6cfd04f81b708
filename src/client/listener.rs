/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 18/10/26
******************************************************************************/
use crate::client::ClientStatus;
use std::sync::{Arc, Mutex};

/// Interface to be implemented to listen to `LightstreamerClient` events comprehending
/// notifications of connection activity and errors.
///
/// Events for these listeners are dispatched by the client loop started by
/// `LightstreamerClient::connect`, never while the client or a subscription is locked.
/// Events caused by a call on the client itself, such as the `on_unsubscription` of a
/// subscription removed with `unsubscribe`, are delivered before that call returns.
pub trait ClientListener: Send {
    /// Called when the listener is added to the client.
    fn on_listen_start(&mut self) {}

    /// Called when the listener is removed from the client.
    fn on_listen_end(&mut self) {}

    /// The server refused or closed the session. The client will not reconnect.
    ///
    /// Notable codes: 1 user/password check failed; 2 requested adapter set not available;
    /// 7 licensed maximum number of sessions reached; 8 configured maximum number of sessions
    /// reached; 9 configured maximum server load reached; 10 new sessions temporarily blocked;
    /// 11 streaming not available because of the license; 21 bad request; 31 session closed
    /// by the administrator; 32 and 33 session closed by the server; 60 client version not
    /// supported; 61 and 62 server or license error; <= 0 refused by the Metadata Adapter.
    fn on_server_error(&mut self, _code: i32, _message: &str) {}

    /// The client status changed. See [`ClientStatus`] for the possible values.
    fn on_status_change(&mut self, _status: &ClientStatus) {}

    /// A property of `ConnectionDetails` or `ConnectionOptions` changed: `"sessionId"`,
    /// `"serverInstanceAddress"`, `"serverSocketName"`, `"clientIp"` or `"realMaxBandwidth"`.
    fn on_property_change(&mut self, _property: &str) {}
}

pub(crate) type SharedClientListener = Arc<Mutex<Box<dyn ClientListener>>>;

/// An event to be delivered to the client listeners.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum ClientEvent {
    StatusChange(ClientStatus),
    ServerError { code: i32, message: String },
    PropertyChange(&'static str),
}

impl ClientEvent {
    pub(crate) fn deliver(&self, listener: &mut dyn ClientListener) {
        match self {
            Self::StatusChange(status) => listener.on_status_change(status),
            Self::ServerError { code, message } => listener.on_server_error(*code, message),
            Self::PropertyChange(property) => listener.on_property_change(property),
        }
    }
}
