/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 18/10/26
******************************************************************************/
use std::fmt;

/// Error codes the server can attach to a refused subscription.
///
/// Listeners receive the raw numeric code; `from_code` classifies it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionErrorCode {
    /// 14: the key value is not a valid item name (second-level subscriptions, detected locally).
    InvalidSecondLevelKey,
    /// 15: "key" field missing from a COMMAND schema.
    MissingKeyField,
    /// 16: "command" field missing from a COMMAND schema.
    MissingCommandField,
    /// 17: bad Data Adapter name, or no default Data Adapter.
    BadDataAdapter,
    /// 21: bad Group name.
    BadGroup,
    /// 22: bad Group name for this Schema.
    BadGroupForSchema,
    /// 23: bad Schema name.
    BadSchema,
    /// 24: mode not allowed for an item.
    ModeNotAllowed,
    /// 25: bad Selector name.
    BadSelector,
    /// 26: unfiltered dispatching not allowed because of a frequency limit on the item.
    UnfilteredNotAllowed,
    /// 27: unfiltered dispatching not supported because of frequency prefiltering.
    UnfilteredNotSupported,
    /// 28: unfiltered dispatching not allowed by the license.
    UnfilteredNotLicensed,
    /// 29: RAW mode not allowed by the license.
    RawNotLicensed,
    /// 30: subscriptions not allowed by the license.
    SubscriptionsNotLicensed,
    /// 66: the Metadata Adapter threw while authorizing the request.
    MetadataAdapterFailure,
    /// 68: internal server error.
    InternalServerError,
    /// `<= 0`: refused by the Metadata Adapter with an adapter-specific code.
    RefusedByAdapter(i32),
    /// Any other code.
    Other(i32),
}

impl SubscriptionErrorCode {
    pub fn from_code(code: i32) -> Self {
        match code {
            14 => Self::InvalidSecondLevelKey,
            15 => Self::MissingKeyField,
            16 => Self::MissingCommandField,
            17 => Self::BadDataAdapter,
            21 => Self::BadGroup,
            22 => Self::BadGroupForSchema,
            23 => Self::BadSchema,
            24 => Self::ModeNotAllowed,
            25 => Self::BadSelector,
            26 => Self::UnfilteredNotAllowed,
            27 => Self::UnfilteredNotSupported,
            28 => Self::UnfilteredNotLicensed,
            29 => Self::RawNotLicensed,
            30 => Self::SubscriptionsNotLicensed,
            66 => Self::MetadataAdapterFailure,
            68 => Self::InternalServerError,
            code if code <= 0 => Self::RefusedByAdapter(code),
            code => Self::Other(code),
        }
    }

    pub fn code(&self) -> i32 {
        match self {
            Self::InvalidSecondLevelKey => 14,
            Self::MissingKeyField => 15,
            Self::MissingCommandField => 16,
            Self::BadDataAdapter => 17,
            Self::BadGroup => 21,
            Self::BadGroupForSchema => 22,
            Self::BadSchema => 23,
            Self::ModeNotAllowed => 24,
            Self::BadSelector => 25,
            Self::UnfilteredNotAllowed => 26,
            Self::UnfilteredNotSupported => 27,
            Self::UnfilteredNotLicensed => 28,
            Self::RawNotLicensed => 29,
            Self::SubscriptionsNotLicensed => 30,
            Self::MetadataAdapterFailure => 66,
            Self::InternalServerError => 68,
            Self::RefusedByAdapter(code) | Self::Other(code) => *code,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::InvalidSecondLevelKey => "the key value is not a valid name for the item",
            Self::MissingKeyField => "\"key\" field not specified in the schema",
            Self::MissingCommandField => "\"command\" field not specified in the schema",
            Self::BadDataAdapter => "bad Data Adapter name or default Data Adapter not defined",
            Self::BadGroup => "bad Group name",
            Self::BadGroupForSchema => "bad Group name for this Schema",
            Self::BadSchema => "bad Schema name",
            Self::ModeNotAllowed => "mode not allowed for an item",
            Self::BadSelector => "bad Selector name",
            Self::UnfilteredNotAllowed => "unfiltered dispatching not allowed for an item",
            Self::UnfilteredNotSupported => "unfiltered dispatching not supported for an item",
            Self::UnfilteredNotLicensed => "unfiltered dispatching not allowed by the license",
            Self::RawNotLicensed => "RAW mode not allowed by the license",
            Self::SubscriptionsNotLicensed => "subscriptions not allowed by the license",
            Self::MetadataAdapterFailure => "unexpected exception in the Metadata Adapter",
            Self::InternalServerError => "internal server error",
            Self::RefusedByAdapter(_) => "refused by the Metadata Adapter",
            Self::Other(_) => "unknown error",
        }
    }
}

impl fmt::Display for SubscriptionErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.description(), self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_codes() {
        for code in [14, 15, 16, 17, 21, 22, 23, 24, 25, 26, 27, 28, 29, 30, 66, 68] {
            let parsed = SubscriptionErrorCode::from_code(code);
            assert!(!matches!(
                parsed,
                SubscriptionErrorCode::Other(_) | SubscriptionErrorCode::RefusedByAdapter(_)
            ));
            assert_eq!(parsed.code(), code);
        }
    }

    #[test]
    fn test_adapter_and_unknown_codes() {
        assert_eq!(
            SubscriptionErrorCode::from_code(-3),
            SubscriptionErrorCode::RefusedByAdapter(-3)
        );
        assert_eq!(
            SubscriptionErrorCode::from_code(0),
            SubscriptionErrorCode::RefusedByAdapter(0)
        );
        assert_eq!(
            SubscriptionErrorCode::from_code(99),
            SubscriptionErrorCode::Other(99)
        );
        assert_eq!(
            SubscriptionErrorCode::from_code(21).to_string(),
            "bad Group name (21)"
        );
    }
}
