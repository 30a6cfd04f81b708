/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 18/10/26
******************************************************************************/
use crate::client::Transport;
use crate::utils::LightstreamerError;
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

/// Bandwidth limit, requested by the client or granted by the server.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MaxBandwidth {
    /// No limit.
    Unlimited,
    /// The server does not manage bandwidth for this session. Only reported by the server.
    Unmanaged,
    /// Limit in kilobits per second.
    Limited(f64),
}

impl fmt::Display for MaxBandwidth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MaxBandwidth::Unlimited => write!(f, "unlimited"),
            MaxBandwidth::Unmanaged => write!(f, "unmanaged"),
            MaxBandwidth::Limited(kbps) => write!(f, "{}", kbps),
        }
    }
}

/// Used by `LightstreamerClient` to provide an extra connection properties data object.
///
/// Data object that contains the policy settings used to connect to a Lightstreamer Server.
/// An instance is available as the `connection_options` field of the client. Values are read
/// when a session is created, so changes apply to the next session.
///
/// Durations are expressed in milliseconds.
#[derive(Debug, Clone)]
pub struct ConnectionOptions {
    content_length: u64,
    first_retry_max_delay: u64,
    forced_transport: Option<Transport>,
    http_extra_headers: Option<HashMap<String, String>>,
    http_extra_headers_on_session_creation_only: bool,
    idle_timeout: u64,
    keepalive_interval: u64,
    polling_interval: u64,
    real_max_bandwidth: Option<MaxBandwidth>,
    reconnect_timeout: u64,
    requested_max_bandwidth: MaxBandwidth,
    retry_delay: u64,
    reverse_heartbeat_interval: u64,
    server_instance_address_ignored: bool,
    session_recovery_timeout: u64,
    slowing_enabled: bool,
    stalled_timeout: u64,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            content_length: 50_000_000,
            first_retry_max_delay: 100,
            forced_transport: None,
            http_extra_headers: None,
            http_extra_headers_on_session_creation_only: false,
            idle_timeout: 19_000,
            keepalive_interval: 0,
            polling_interval: 0,
            real_max_bandwidth: None,
            reconnect_timeout: 3_000,
            requested_max_bandwidth: MaxBandwidth::Unlimited,
            retry_delay: 4_000,
            reverse_heartbeat_interval: 0,
            server_instance_address_ignored: false,
            session_recovery_timeout: 15_000,
            slowing_enabled: false,
            stalled_timeout: 2_000,
        }
    }
}

fn positive(name: &str, value: u64) -> Result<u64, LightstreamerError> {
    if value == 0 {
        Err(LightstreamerError::illegal_argument(format!(
            "{} must be greater than zero",
            name
        )))
    } else {
        Ok(value)
    }
}

impl ConnectionOptions {
    /// Creates the options with their default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Length in bytes used for the response body of an HTTP streaming connection. Has no
    /// effect on the WebSocket transport.
    pub fn get_content_length(&self) -> u64 {
        self.content_length
    }

    /// Delay before the first reconnection attempt after an established session is lost,
    /// capped by the retry delay. Later attempts wait the retry delay.
    pub fn get_first_retry_max_delay(&self) -> u64 {
        self.first_retry_max_delay
    }

    /// Transport forced by the application, if any.
    pub fn get_forced_transport(&self) -> Option<&Transport> {
        self.forced_transport.as_ref()
    }

    /// Extra headers sent with the connection requests.
    pub fn get_http_extra_headers(&self) -> Option<&HashMap<String, String>> {
        self.http_extra_headers.as_ref()
    }

    /// Extra headers only go with the WebSocket handshake, so this flag has no effect on the
    /// WebSocket transport.
    pub fn is_http_extra_headers_on_session_creation_only(&self) -> bool {
        self.http_extra_headers_on_session_creation_only
    }

    /// Maximum time the server waits for data to send on a polling connection. Has no effect
    /// on the WebSocket streaming transport.
    pub fn get_idle_timeout(&self) -> u64 {
        self.idle_timeout
    }

    /// Keepalive interval requested to the server. `0` lets the server decide.
    pub fn get_keepalive_interval(&self) -> u64 {
        self.keepalive_interval
    }

    /// Interval between polling requests. Has no effect on the WebSocket streaming transport.
    pub fn get_polling_interval(&self) -> u64 {
        self.polling_interval
    }

    /// Bandwidth granted by the server for the current session, if known.
    pub fn get_real_max_bandwidth(&self) -> Option<MaxBandwidth> {
        self.real_max_bandwidth
    }

    /// Time without data, after the connection was declared stalled, before it is considered
    /// lost.
    pub fn get_reconnect_timeout(&self) -> u64 {
        self.reconnect_timeout
    }

    /// Bandwidth sent with the session creation. A change while connected applies to the next
    /// session.
    pub fn get_requested_max_bandwidth(&self) -> MaxBandwidth {
        self.requested_max_bandwidth
    }

    /// Minimum time between two connection attempts.
    pub fn get_retry_delay(&self) -> u64 {
        self.retry_delay
    }

    pub fn get_reverse_heartbeat_interval(&self) -> u64 {
        self.reverse_heartbeat_interval
    }

    /// Kept for configuration compatibility: a lost session is never recovered, a new one is
    /// created, so this has no effect.
    pub fn get_session_recovery_timeout(&self) -> u64 {
        self.session_recovery_timeout
    }

    /// Extra time, beyond the keepalive interval, after which a silent connection is stalled.
    pub fn get_stalled_timeout(&self) -> u64 {
        self.stalled_timeout
    }

    pub fn is_server_instance_address_ignored(&self) -> bool {
        self.server_instance_address_ignored
    }

    /// Kept for configuration compatibility: the WebSocket streaming transport never slows
    /// the update flow, so this has no effect.
    pub fn is_slowing_enabled(&self) -> bool {
        self.slowing_enabled
    }

    /// # Errors
    ///
    /// Illegal argument if `content_length` is zero.
    pub fn set_content_length(&mut self, content_length: u64) -> Result<(), LightstreamerError> {
        self.content_length = positive("content length", content_length)?;
        Ok(())
    }

    /// # Errors
    ///
    /// Illegal argument if `first_retry_max_delay` is zero.
    pub fn set_first_retry_max_delay(
        &mut self,
        first_retry_max_delay: u64,
    ) -> Result<(), LightstreamerError> {
        self.first_retry_max_delay = positive("first retry max delay", first_retry_max_delay)?;
        Ok(())
    }

    /// Forces a transport. Only the WebSocket streaming transports are implemented; forcing
    /// any other one makes `connect` fail.
    pub fn set_forced_transport(&mut self, forced_transport: Option<Transport>) {
        self.forced_transport = forced_transport;
    }

    pub fn set_http_extra_headers(&mut self, headers: Option<HashMap<String, String>>) {
        self.http_extra_headers = headers;
    }

    pub fn set_http_extra_headers_on_session_creation_only(&mut self, only: bool) {
        self.http_extra_headers_on_session_creation_only = only;
    }

    pub fn set_idle_timeout(&mut self, idle_timeout: u64) {
        self.idle_timeout = idle_timeout;
    }

    pub fn set_keepalive_interval(&mut self, keepalive_interval: u64) {
        self.keepalive_interval = keepalive_interval;
    }

    pub fn set_polling_interval(&mut self, polling_interval: u64) {
        self.polling_interval = polling_interval;
    }

    /// # Errors
    ///
    /// Illegal argument if `reconnect_timeout` is zero.
    pub fn set_reconnect_timeout(&mut self, reconnect_timeout: u64) -> Result<(), LightstreamerError> {
        self.reconnect_timeout = positive("reconnect timeout", reconnect_timeout)?;
        Ok(())
    }

    /// Sets the bandwidth requested to the server for the next session.
    ///
    /// # Errors
    ///
    /// Illegal argument for `Unmanaged` (a server-only value) or a limit that is not a
    /// positive number.
    pub fn set_requested_max_bandwidth(
        &mut self,
        max_bandwidth: MaxBandwidth,
    ) -> Result<(), LightstreamerError> {
        match max_bandwidth {
            MaxBandwidth::Unmanaged => {
                return Err(LightstreamerError::illegal_argument(
                    "unmanaged bandwidth cannot be requested",
                ));
            }
            MaxBandwidth::Limited(kbps) if !(kbps.is_finite() && kbps > 0.0) => {
                return Err(LightstreamerError::illegal_argument(format!(
                    "invalid bandwidth limit {}",
                    kbps
                )));
            }
            _ => {}
        }
        self.requested_max_bandwidth = max_bandwidth;
        Ok(())
    }

    /// # Errors
    ///
    /// Illegal argument if `retry_delay` is zero.
    pub fn set_retry_delay(&mut self, retry_delay: u64) -> Result<(), LightstreamerError> {
        self.retry_delay = positive("retry delay", retry_delay)?;
        Ok(())
    }

    pub fn set_reverse_heartbeat_interval(&mut self, interval: u64) {
        self.reverse_heartbeat_interval = interval;
    }

    pub fn set_server_instance_address_ignored(&mut self, ignored: bool) {
        self.server_instance_address_ignored = ignored;
    }

    pub fn set_session_recovery_timeout(&mut self, timeout: u64) {
        self.session_recovery_timeout = timeout;
    }

    pub fn set_slowing_enabled(&mut self, enabled: bool) {
        self.slowing_enabled = enabled;
    }

    /// # Errors
    ///
    /// Illegal argument if `stalled_timeout` is zero.
    pub fn set_stalled_timeout(&mut self, stalled_timeout: u64) -> Result<(), LightstreamerError> {
        self.stalled_timeout = positive("stalled timeout", stalled_timeout)?;
        Ok(())
    }

    pub(crate) fn set_real_max_bandwidth(&mut self, bandwidth: Option<MaxBandwidth>) {
        self.real_max_bandwidth = bandwidth;
    }

    /// Wait before the next connection attempt. `first` is the first attempt after an
    /// established session was lost.
    pub(crate) fn retry_delay(&self, first: bool) -> Duration {
        if first {
            Duration::from_millis(self.first_retry_max_delay.min(self.retry_delay))
        } else {
            Duration::from_millis(self.retry_delay)
        }
    }

    /// Silence after which the connection is declared stalled, given the keepalive the
    /// server granted.
    pub(crate) fn stall_after(&self, keepalive_ms: u64) -> Duration {
        Duration::from_millis(keepalive_ms.saturating_add(self.stalled_timeout))
    }

    pub(crate) fn lost_after_stall(&self) -> Duration {
        Duration::from_millis(self.reconnect_timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = ConnectionOptions::new();
        assert_eq!(options.get_content_length(), 50_000_000);
        assert_eq!(options.get_retry_delay(), 4_000);
        assert_eq!(options.get_stalled_timeout(), 2_000);
        assert_eq!(options.get_reconnect_timeout(), 3_000);
        assert_eq!(options.get_requested_max_bandwidth(), MaxBandwidth::Unlimited);
        assert_eq!(options.get_real_max_bandwidth(), None);
        assert!(options.get_forced_transport().is_none());
        assert!(!options.is_slowing_enabled());
    }

    #[test]
    fn test_positive_setters_reject_zero() {
        let mut options = ConnectionOptions::new();
        assert!(options.set_content_length(0).unwrap_err().is_illegal_argument());
        assert!(options.set_retry_delay(0).unwrap_err().is_illegal_argument());
        assert!(options.set_stalled_timeout(0).unwrap_err().is_illegal_argument());
        assert!(options.set_reconnect_timeout(0).unwrap_err().is_illegal_argument());
        assert_eq!(options.get_retry_delay(), 4_000);

        options.set_retry_delay(1_000).unwrap();
        assert_eq!(options.retry_delay(false), Duration::from_millis(1_000));
    }

    #[test]
    fn test_requested_max_bandwidth() {
        let mut options = ConnectionOptions::new();
        options
            .set_requested_max_bandwidth(MaxBandwidth::Limited(12.5))
            .unwrap();
        assert_eq!(options.get_requested_max_bandwidth().to_string(), "12.5");

        assert!(
            options
                .set_requested_max_bandwidth(MaxBandwidth::Limited(0.0))
                .is_err()
        );
        assert!(
            options
                .set_requested_max_bandwidth(MaxBandwidth::Unmanaged)
                .is_err()
        );
        assert_eq!(
            options.get_requested_max_bandwidth(),
            MaxBandwidth::Limited(12.5)
        );
    }

    #[test]
    fn test_stall_timings() {
        let mut options = ConnectionOptions::new();
        options.set_stalled_timeout(500).unwrap();
        assert_eq!(options.stall_after(5_000), Duration::from_millis(5_500));
        assert_eq!(options.lost_after_stall(), Duration::from_millis(3_000));
    }

    #[test]
    fn test_stall_timings_saturate() {
        let mut options = ConnectionOptions::new();
        options.set_stalled_timeout(u64::MAX).unwrap();
        assert_eq!(options.stall_after(5_000), Duration::from_millis(u64::MAX));
        assert_eq!(options.stall_after(u64::MAX), Duration::from_millis(u64::MAX));
    }

    #[test]
    fn test_retry_delays() {
        let mut options = ConnectionOptions::new();
        assert_eq!(options.retry_delay(false), Duration::from_millis(4_000));
        assert_eq!(options.retry_delay(true), Duration::from_millis(100));

        options.set_first_retry_max_delay(10_000).unwrap();
        assert_eq!(options.retry_delay(true), Duration::from_millis(4_000));
    }
}
