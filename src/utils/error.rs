/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 18/10/26
******************************************************************************/

//! Error types shared by the whole crate.
//!
//! Synchronous misuse of the API (a wrong argument, an operation attempted in the
//! wrong lifecycle state) is reported through [`IllegalArgumentException`] and
//! [`IllegalStateException`]. Everything that can go wrong is gathered in
//! [`LightstreamerError`], which is what the public operations return.
//!
//! Failures detected by the Server are never returned from a call: they are
//! delivered to the listeners together with their numeric code.

use thiserror::Error;

/// Raised when a method receives an argument it cannot accept.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("illegal argument: {0}")]
pub struct IllegalArgumentException(pub String);

impl IllegalArgumentException {
    /// Creates a new exception with the given description.
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Raised when a method is invoked while the object is in a state that does not allow it,
/// e.g. changing the items of a `Subscription` that is currently active.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("illegal state: {0}")]
pub struct IllegalStateException(pub String);

impl IllegalStateException {
    /// Creates a new exception with the given description.
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// General error type of the library.
#[derive(Debug, Error)]
pub enum LightstreamerError {
    /// Invalid argument passed to an operation.
    #[error(transparent)]
    IllegalArgument(#[from] IllegalArgumentException),
    /// Operation not allowed in the current state.
    #[error(transparent)]
    IllegalState(#[from] IllegalStateException),
    /// The server address or a derived URL could not be parsed.
    #[error("invalid url: {0}")]
    InvalidUrl(#[from] url::ParseError),
    /// Transport level failure.
    #[error("connection error: {0}")]
    Connection(String),
    /// A line received from the server does not follow the protocol.
    #[error("protocol error: {0}")]
    Protocol(String),
    /// The server refused or closed the session.
    #[error("server error {code}: {message}")]
    Server {
        /// Numeric code sent by the server.
        code: i32,
        /// Description sent by the server.
        message: String,
    },
    /// WebSocket failure.
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
    /// I/O failure (signal handling, sockets).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl LightstreamerError {
    /// Shorthand for an [`IllegalArgumentException`] wrapped in a `LightstreamerError`.
    pub fn illegal_argument(message: impl Into<String>) -> Self {
        Self::IllegalArgument(IllegalArgumentException::new(message))
    }

    /// Shorthand for an [`IllegalStateException`] wrapped in a `LightstreamerError`.
    pub fn illegal_state(message: impl Into<String>) -> Self {
        Self::IllegalState(IllegalStateException::new(message))
    }

    /// Shorthand for a protocol error.
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }

    /// Returns `true` for errors caused by an illegal argument.
    pub fn is_illegal_argument(&self) -> bool {
        matches!(self, Self::IllegalArgument(_))
    }

    /// Returns `true` for errors caused by an illegal state.
    pub fn is_illegal_state(&self) -> bool {
        matches!(self, Self::IllegalState(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        let err = IllegalArgumentException::new("bad field name");
        assert_eq!(err.to_string(), "illegal argument: bad field name");

        let err = LightstreamerError::illegal_state("subscription is active");
        assert_eq!(err.to_string(), "illegal state: subscription is active");

        let err = LightstreamerError::Server {
            code: 2,
            message: "Requested Adapter Set not available".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "server error 2: Requested Adapter Set not available"
        );
    }

    #[test]
    fn test_classification() {
        assert!(LightstreamerError::illegal_argument("x").is_illegal_argument());
        assert!(!LightstreamerError::illegal_argument("x").is_illegal_state());
        assert!(LightstreamerError::illegal_state("x").is_illegal_state());
        assert!(!LightstreamerError::protocol("x").is_illegal_state());
    }

    #[test]
    fn test_from_conversions() {
        let err: LightstreamerError = IllegalStateException::new("inactive").into();
        assert!(err.is_illegal_state());

        let parse_err = url::Url::parse("not a url").unwrap_err();
        let err: LightstreamerError = parse_err.into();
        assert!(matches!(err, LightstreamerError::InvalidUrl(_)));
    }
}
