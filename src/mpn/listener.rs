/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 18/10/26
******************************************************************************/
use crate::mpn::{MpnDeviceStatus, MpnSubscriptionStatus};

/// Receives the events of an [`MpnDevice`](crate::mpn::MpnDevice). Every method has an empty
/// default implementation.
pub trait MpnDeviceListener: Send {
    fn on_listen_start(&mut self) {}

    fn on_listen_end(&mut self) {}

    /// The server accepted the registration of the device.
    fn on_registered(&mut self) {}

    /// The server suspended the device.
    fn on_suspended(&mut self) {}

    /// The device was suspended and is now active again.
    fn on_resumed(&mut self) {}

    /// Any status change, with the server timestamp in milliseconds (0 when not known).
    fn on_status_changed(&mut self, _status: MpnDeviceStatus, _timestamp: u64) {}

    /// The registration was refused. See [`MpnErrorCode`](crate::mpn::MpnErrorCode) for the codes.
    fn on_registration_failed(&mut self, _code: i32, _message: Option<&str>) {}

    /// The list of MPN subscriptions persisted for the device changed.
    fn on_subscriptions_updated(&mut self) {}
}

/// Receives the events of an [`MpnSubscription`](crate::mpn::MpnSubscription). Every method has
/// an empty default implementation.
pub trait MpnSubscriptionListener: Send {
    fn on_listen_start(&mut self) {}

    fn on_listen_end(&mut self) {}

    /// The server confirmed the activation.
    fn on_subscription(&mut self) {}

    /// The subscription was deactivated.
    fn on_unsubscription(&mut self) {}

    /// The activation was refused.
    fn on_subscription_error(&mut self, _code: i32, _message: Option<&str>) {}

    /// The deactivation was refused.
    fn on_unsubscription_error(&mut self, _code: i32, _message: Option<&str>) {}

    /// The trigger expression evaluated to true and the notification was sent.
    fn on_triggered(&mut self) {}

    /// Any status change, with the server timestamp in milliseconds (0 when not known).
    fn on_status_changed(&mut self, _status: MpnSubscriptionStatus, _timestamp: u64) {}

    /// A property changed on the server: `"notification_format"`, `"trigger"`, `"mode"`,
    /// `"group"`, `"schema"`, `"adapter"`, `"requested_buffer_size"` or
    /// `"requested_max_frequency"`.
    fn on_property_changed(&mut self, _property: &str) {}

    /// The change of `property` (`"notification_format"` or `"trigger"`) was refused.
    fn on_modification_error(&mut self, _code: i32, _message: Option<&str>, _property: &str) {}
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum MpnDeviceEvent {
    Registered,
    Suspended,
    Resumed,
    StatusChanged(MpnDeviceStatus, u64),
    RegistrationFailed { code: i32, message: Option<String> },
    SubscriptionsUpdated,
}

impl MpnDeviceEvent {
    pub(crate) fn deliver(&self, listener: &mut dyn MpnDeviceListener) {
        match self {
            Self::Registered => listener.on_registered(),
            Self::Suspended => listener.on_suspended(),
            Self::Resumed => listener.on_resumed(),
            Self::StatusChanged(status, timestamp) => listener.on_status_changed(*status, *timestamp),
            Self::RegistrationFailed { code, message } => {
                listener.on_registration_failed(*code, message.as_deref())
            }
            Self::SubscriptionsUpdated => listener.on_subscriptions_updated(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum MpnSubscriptionEvent {
    Subscription,
    Unsubscription,
    SubscriptionError {
        code: i32,
        message: Option<String>,
    },
    UnsubscriptionError {
        code: i32,
        message: Option<String>,
    },
    Triggered,
    StatusChanged(MpnSubscriptionStatus, u64),
    PropertyChanged(&'static str),
    ModificationError {
        code: i32,
        message: Option<String>,
        property: &'static str,
    },
}

impl MpnSubscriptionEvent {
    pub(crate) fn deliver(&self, listener: &mut dyn MpnSubscriptionListener) {
        match self {
            Self::Subscription => listener.on_subscription(),
            Self::Unsubscription => listener.on_unsubscription(),
            Self::SubscriptionError { code, message } => {
                listener.on_subscription_error(*code, message.as_deref())
            }
            Self::UnsubscriptionError { code, message } => {
                listener.on_unsubscription_error(*code, message.as_deref())
            }
            Self::Triggered => listener.on_triggered(),
            Self::StatusChanged(status, timestamp) => listener.on_status_changed(*status, *timestamp),
            Self::PropertyChanged(property) => listener.on_property_changed(property),
            Self::ModificationError {
                code,
                message,
                property,
            } => listener.on_modification_error(*code, message.as_deref(), property),
        }
    }
}
