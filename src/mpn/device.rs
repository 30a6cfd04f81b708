/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 18/10/26
******************************************************************************/
use crate::mpn::listener::{MpnDeviceEvent, MpnDeviceListener};
use crate::mpn::{MpnDeviceStatus, MpnPlatform};
use crate::utils::LightstreamerError;
use std::fmt::{self, Debug, Formatter};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

type SharedListener = Arc<Mutex<Box<dyn MpnDeviceListener>>>;

pub(crate) struct MpnDeviceInner {
    platform: MpnPlatform,
    application_id: String,
    device_token: String,
    previous_device_token: Option<String>,
    status: MpnDeviceStatus,
    status_timestamp: u64,
    device_id: Option<String>,
    adapter_name: Option<String>,
    listeners: Vec<SharedListener>,
}

/// A device able to receive push notifications, registered on the server through
/// `LightstreamerClient::register_for_mpn`.
///
/// Like [`Subscription`](crate::subscription::Subscription), it is a handle: clones share the
/// same state.
#[derive(Clone)]
pub struct MpnDevice {
    inner: Arc<Mutex<MpnDeviceInner>>,
}

impl Debug for MpnDevice {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let inner = self.lock();
        f.debug_struct("MpnDevice")
            .field("platform", &inner.platform)
            .field("application_id", &inner.application_id)
            .field("status", &inner.status)
            .field("device_id", &inner.device_id)
            .finish()
    }
}

impl MpnDevice {
    /// Creates a device.
    ///
    /// - `device_token`: the token assigned by the push notification service.
    /// - `application_id`: the app package name (Google) or bundle id (Apple).
    /// - `platform`: the push notification service.
    ///
    /// # Errors
    ///
    /// Illegal argument for an empty token or application id.
    pub fn new(
        device_token: &str,
        application_id: &str,
        platform: MpnPlatform,
    ) -> Result<MpnDevice, LightstreamerError> {
        if device_token.is_empty() {
            return Err(LightstreamerError::illegal_argument("device token is empty"));
        }
        if application_id.is_empty() {
            return Err(LightstreamerError::illegal_argument("application id is empty"));
        }
        Ok(MpnDevice {
            inner: Arc::new(Mutex::new(MpnDeviceInner {
                platform,
                application_id: application_id.to_string(),
                device_token: device_token.to_string(),
                previous_device_token: None,
                status: MpnDeviceStatus::Unknown,
                status_timestamp: 0,
                device_id: None,
                adapter_name: None,
                listeners: Vec::new(),
            })),
        })
    }

    /// Creates a device whose token replaced `previous_device_token`. On registration the
    /// server moves the MPN subscriptions of the old token to the new one.
    pub fn with_previous_token(
        device_token: &str,
        previous_device_token: &str,
        application_id: &str,
        platform: MpnPlatform,
    ) -> Result<MpnDevice, LightstreamerError> {
        let device = Self::new(device_token, application_id, platform)?;
        if !previous_device_token.is_empty() && previous_device_token != device_token {
            device.lock().previous_device_token = Some(previous_device_token.to_string());
        }
        Ok(device)
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, MpnDeviceInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn ptr_eq(&self, other: &MpnDevice) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn add_listener(&self, mut listener: Box<dyn MpnDeviceListener>) {
        listener.on_listen_start();
        self.lock().listeners.push(Arc::new(Mutex::new(listener)));
    }

    /// # Errors
    ///
    /// Illegal argument if there is no listener at `index`.
    pub fn remove_listener(&self, index: usize) -> Result<(), LightstreamerError> {
        let removed = {
            let mut inner = self.lock();
            if index >= inner.listeners.len() {
                return Err(LightstreamerError::illegal_argument(format!(
                    "no listener at index {}",
                    index
                )));
            }
            inner.listeners.remove(index)
        };
        removed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .on_listen_end();
        Ok(())
    }

    pub fn get_listeners(&self) -> usize {
        self.lock().listeners.len()
    }

    pub fn get_platform(&self) -> MpnPlatform {
        self.lock().platform
    }

    pub fn get_application_id(&self) -> String {
        self.lock().application_id.clone()
    }

    pub fn get_device_token(&self) -> String {
        self.lock().device_token.clone()
    }

    pub fn get_previous_device_token(&self) -> Option<String> {
        self.lock().previous_device_token.clone()
    }

    pub fn get_status(&self) -> MpnDeviceStatus {
        self.lock().status
    }

    /// Server time of the last status change, in milliseconds since the epoch.
    pub fn get_status_timestamp(&self) -> u64 {
        self.lock().status_timestamp
    }

    /// Id assigned by the server on registration.
    pub fn get_device_id(&self) -> Option<String> {
        self.lock().device_id.clone()
    }

    /// Name of the Data Adapter publishing the MPN status items of this device.
    pub fn get_adapter_name(&self) -> Option<String> {
        self.lock().adapter_name.clone()
    }

    pub fn is_registered(&self) -> bool {
        self.lock().status != MpnDeviceStatus::Unknown
    }

    pub fn is_suspended(&self) -> bool {
        self.lock().status == MpnDeviceStatus::Suspended
    }

    pub(crate) fn register_parameters(&self) -> (String, String, String, Option<String>) {
        let inner = self.lock();
        (
            inner.platform.to_string(),
            inner.application_id.clone(),
            inner.previous_device_token.clone().unwrap_or_else(|| inner.device_token.clone()),
            inner
                .previous_device_token
                .as_ref()
                .map(|_| inner.device_token.clone()),
        )
    }

    /// `MPNREG` received.
    pub(crate) fn registered(&self, device_id: &str, adapter_name: &str) -> Vec<MpnDeviceEvent> {
        let mut inner = self.lock();
        inner.device_id = Some(device_id.to_string());
        inner.adapter_name = Some(adapter_name.to_string());
        // Once moved on the server, the old token is gone.
        inner.previous_device_token = None;
        if inner.status != MpnDeviceStatus::Unknown {
            return Vec::new();
        }
        inner.status = MpnDeviceStatus::Registered;
        vec![
            MpnDeviceEvent::Registered,
            MpnDeviceEvent::StatusChanged(MpnDeviceStatus::Registered, inner.status_timestamp),
        ]
    }

    /// Status published on the device status item: `ACTIVE` or `SUSPENDED`.
    pub(crate) fn server_status(&self, status: &str, timestamp: Option<u64>) -> Vec<MpnDeviceEvent> {
        let mut inner = self.lock();
        if let Some(timestamp) = timestamp {
            inner.status_timestamp = timestamp;
        }
        let next = match status {
            "ACTIVE" => MpnDeviceStatus::Registered,
            "SUSPENDED" => MpnDeviceStatus::Suspended,
            _ => return Vec::new(),
        };
        let previous = inner.status;
        if previous == next {
            return Vec::new();
        }
        inner.status = next;
        let transition = match (previous, next) {
            (_, MpnDeviceStatus::Suspended) => MpnDeviceEvent::Suspended,
            (MpnDeviceStatus::Suspended, _) => MpnDeviceEvent::Resumed,
            _ => MpnDeviceEvent::Registered,
        };
        vec![
            transition,
            MpnDeviceEvent::StatusChanged(next, inner.status_timestamp),
        ]
    }

    pub(crate) fn registration_failed(&self, code: i32, message: &str) -> Vec<MpnDeviceEvent> {
        let mut inner = self.lock();
        let was_known = inner.status != MpnDeviceStatus::Unknown;
        inner.status = MpnDeviceStatus::Unknown;
        inner.device_id = None;
        inner.adapter_name = None;
        let mut events = vec![MpnDeviceEvent::RegistrationFailed {
            code,
            message: (!message.is_empty()).then(|| message.to_string()),
        }];
        if was_known {
            events.push(MpnDeviceEvent::StatusChanged(
                MpnDeviceStatus::Unknown,
                inner.status_timestamp,
            ));
        }
        events
    }

    pub(crate) fn dispatch(&self, events: &[MpnDeviceEvent]) {
        if events.is_empty() {
            return;
        }
        let listeners = self.lock().listeners.clone();
        for event in events {
            for listener in &listeners {
                let mut listener = listener.lock().unwrap_or_else(PoisonError::into_inner);
                event.deliver(&mut **listener);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_validates_arguments() {
        assert!(MpnDevice::new("", "com.example", MpnPlatform::Google).unwrap_err().is_illegal_argument());
        assert!(MpnDevice::new("token", "", MpnPlatform::Apple).unwrap_err().is_illegal_argument());
        let device = MpnDevice::new("token", "com.example", MpnPlatform::Google).unwrap();
        assert_eq!(device.get_status(), MpnDeviceStatus::Unknown);
        assert!(!device.is_registered());
        assert_eq!(device.get_device_id(), None);
    }

    #[test]
    fn test_registration_and_suspension() {
        let device = MpnDevice::new("token", "com.example", MpnPlatform::Google).unwrap();
        let events = device.registered("dev-1", "MPN_ADAPTER");
        assert_eq!(
            events,
            vec![
                MpnDeviceEvent::Registered,
                MpnDeviceEvent::StatusChanged(MpnDeviceStatus::Registered, 0)
            ]
        );
        assert_eq!(device.get_device_id().as_deref(), Some("dev-1"));
        assert_eq!(device.get_adapter_name().as_deref(), Some("MPN_ADAPTER"));

        assert!(device.server_status("ACTIVE", Some(10)).is_empty());
        assert_eq!(device.get_status_timestamp(), 10);

        let events = device.server_status("SUSPENDED", Some(20));
        assert_eq!(events[0], MpnDeviceEvent::Suspended);
        assert!(device.is_suspended());

        let events = device.server_status("ACTIVE", Some(30));
        assert_eq!(
            events,
            vec![
                MpnDeviceEvent::Resumed,
                MpnDeviceEvent::StatusChanged(MpnDeviceStatus::Registered, 30)
            ]
        );
    }

    #[test]
    fn test_token_change() {
        let device =
            MpnDevice::with_previous_token("new", "old", "com.example", MpnPlatform::Apple).unwrap();
        let (platform, app, token, new_token) = device.register_parameters();
        assert_eq!(platform, "Apple");
        assert_eq!(app, "com.example");
        assert_eq!(token, "old");
        assert_eq!(new_token.as_deref(), Some("new"));

        device.registered("dev-1", "MPN");
        assert_eq!(device.get_previous_device_token(), None);
        let (_, _, token, new_token) = device.register_parameters();
        assert_eq!(token, "new");
        assert_eq!(new_token, None);
    }

    #[test]
    fn test_registration_failure() {
        let device = MpnDevice::new("token", "com.example", MpnPlatform::Google).unwrap();
        let events = device.registration_failed(43, "unknown app");
        assert_eq!(
            events,
            vec![MpnDeviceEvent::RegistrationFailed {
                code: 43,
                message: Some("unknown app".to_string())
            }]
        );
        assert!(!device.is_registered());
    }
}
