/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 18/10/26
******************************************************************************/
use crate::utils::LightstreamerError;
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

/// Push notification service a device is registered with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MpnPlatform {
    /// Firebase Cloud Messaging.
    Google,
    /// Apple Push Notification service.
    Apple,
}

impl Display for MpnPlatform {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            MpnPlatform::Google => write!(f, "Google"),
            MpnPlatform::Apple => write!(f, "Apple"),
        }
    }
}

impl FromStr for MpnPlatform {
    type Err = LightstreamerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Google" => Ok(MpnPlatform::Google),
            "Apple" => Ok(MpnPlatform::Apple),
            other => Err(LightstreamerError::illegal_argument(format!(
                "unknown MPN platform '{}'",
                other
            ))),
        }
    }
}

/// Status of an MPN device as known by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MpnDeviceStatus {
    /// Not registered yet, or registration failed.
    Unknown,
    Registered,
    /// The server suspended the device, e.g. because the push service reported an expired token.
    Suspended,
}

impl Display for MpnDeviceStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            MpnDeviceStatus::Unknown => write!(f, "UNKNOWN"),
            MpnDeviceStatus::Registered => write!(f, "REGISTERED"),
            MpnDeviceStatus::Suspended => write!(f, "SUSPENDED"),
        }
    }
}

/// Status of an MPN subscription.
///
/// A subscription only moves forward, UNKNOWN, ACTIVE, SUBSCRIBED, TRIGGERED, one step at a
/// time, and goes back to UNKNOWN only when it is unsubscribed or its activation is refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MpnSubscriptionStatus {
    Unknown,
    /// Submitted to the server, not confirmed yet.
    Active,
    /// Confirmed by the server.
    Subscribed,
    /// The trigger expression evaluated to true and the notification was sent.
    Triggered,
}

impl MpnSubscriptionStatus {
    pub(crate) fn next(self) -> Option<Self> {
        match self {
            Self::Unknown => Some(Self::Active),
            Self::Active => Some(Self::Subscribed),
            Self::Subscribed => Some(Self::Triggered),
            Self::Triggered => None,
        }
    }

    /// Status reported by the server for a persisted subscription.
    pub(crate) fn from_server(status: &str) -> Option<Self> {
        match status {
            "ACTIVE" => Some(Self::Subscribed),
            "TRIGGERED" => Some(Self::Triggered),
            _ => None,
        }
    }
}

impl Display for MpnSubscriptionStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            MpnSubscriptionStatus::Unknown => write!(f, "UNKNOWN"),
            MpnSubscriptionStatus::Active => write!(f, "ACTIVE"),
            MpnSubscriptionStatus::Subscribed => write!(f, "SUBSCRIBED"),
            MpnSubscriptionStatus::Triggered => write!(f, "TRIGGERED"),
        }
    }
}

/// Selects MPN subscriptions by status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MpnSubscriptionFilter {
    All,
    Subscribed,
    Triggered,
}

impl MpnSubscriptionFilter {
    pub(crate) fn matches(&self, status: MpnSubscriptionStatus) -> bool {
        match self {
            MpnSubscriptionFilter::All => status != MpnSubscriptionStatus::Unknown,
            MpnSubscriptionFilter::Subscribed => status == MpnSubscriptionStatus::Subscribed,
            MpnSubscriptionFilter::Triggered => status == MpnSubscriptionStatus::Triggered,
        }
    }

    /// Value of `PN_subscriptionStatus` in a deactivation; `None` deactivates everything.
    pub(crate) fn server_status(&self) -> Option<&'static str> {
        match self {
            MpnSubscriptionFilter::All => None,
            MpnSubscriptionFilter::Subscribed => Some("ACTIVE"),
            MpnSubscriptionFilter::Triggered => Some("TRIGGERED"),
        }
    }
}

impl Display for MpnSubscriptionFilter {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            MpnSubscriptionFilter::All => write!(f, "ALL"),
            MpnSubscriptionFilter::Subscribed => write!(f, "SUBSCRIBED"),
            MpnSubscriptionFilter::Triggered => write!(f, "TRIGGERED"),
        }
    }
}

/// Error codes of MPN requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MpnErrorCode {
    /// 40: the MPN module is disabled by configuration or license.
    ModuleDisabled,
    /// 41: internal resource error, e.g. the database is unreachable.
    ResourceError,
    /// 43: invalid or unknown application id.
    UnknownApplication,
    /// 45: invalid or unknown device id.
    UnknownDevice,
    /// 46: invalid or unknown MPN subscription id.
    UnknownSubscription,
    /// 47: invalid argument name in the notification format or trigger expression.
    InvalidArgumentName,
    /// 48: the device is suspended.
    DeviceSuspended,
    /// 49: a subscription property exceeds its maximum size.
    PropertyTooLarge,
    /// 50: no items or fields specified.
    NoItemsOrFields,
    /// 52: the notification format is not valid JSON.
    InvalidFormat,
    /// 53: the notification format is empty.
    EmptyFormat,
    /// 66: the Metadata Adapter threw while authorizing the request.
    MetadataAdapterFailure,
    /// 68: internal server error.
    InternalServerError,
    /// `<= 0`: refused by the Metadata Adapter.
    RefusedByAdapter(i32),
    Other(i32),
}

impl MpnErrorCode {
    pub fn from_code(code: i32) -> Self {
        match code {
            40 => Self::ModuleDisabled,
            41 => Self::ResourceError,
            43 => Self::UnknownApplication,
            45 => Self::UnknownDevice,
            46 => Self::UnknownSubscription,
            47 => Self::InvalidArgumentName,
            48 => Self::DeviceSuspended,
            49 => Self::PropertyTooLarge,
            50 => Self::NoItemsOrFields,
            52 => Self::InvalidFormat,
            53 => Self::EmptyFormat,
            66 => Self::MetadataAdapterFailure,
            68 => Self::InternalServerError,
            code if code <= 0 => Self::RefusedByAdapter(code),
            code => Self::Other(code),
        }
    }

    pub fn code(&self) -> i32 {
        match self {
            Self::ModuleDisabled => 40,
            Self::ResourceError => 41,
            Self::UnknownApplication => 43,
            Self::UnknownDevice => 45,
            Self::UnknownSubscription => 46,
            Self::InvalidArgumentName => 47,
            Self::DeviceSuspended => 48,
            Self::PropertyTooLarge => 49,
            Self::NoItemsOrFields => 50,
            Self::InvalidFormat => 52,
            Self::EmptyFormat => 53,
            Self::MetadataAdapterFailure => 66,
            Self::InternalServerError => 68,
            Self::RefusedByAdapter(code) | Self::Other(code) => *code,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::ModuleDisabled => "the MPN module is disabled",
            Self::ResourceError => "internal resource error",
            Self::UnknownApplication => "invalid or unknown application id",
            Self::UnknownDevice => "invalid or unknown MPN device id",
            Self::UnknownSubscription => "invalid or unknown MPN subscription id",
            Self::InvalidArgumentName => "invalid argument name in format or trigger",
            Self::DeviceSuspended => "the MPN device is suspended",
            Self::PropertyTooLarge => "a subscription property exceeds its maximum size",
            Self::NoItemsOrFields => "no items or fields specified",
            Self::InvalidFormat => "the notification format is not valid JSON",
            Self::EmptyFormat => "the notification format is empty",
            Self::MetadataAdapterFailure => "unexpected exception in the Metadata Adapter",
            Self::InternalServerError => "internal server error",
            Self::RefusedByAdapter(_) => "refused by the Metadata Adapter",
            Self::Other(_) => "unknown error",
        }
    }
}

impl Display for MpnErrorCode {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.description(), self.code())
    }
}
