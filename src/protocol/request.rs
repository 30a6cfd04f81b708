/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 18/10/26
******************************************************************************/

//! Requests sent by the client on a TLCP session.
//!
//! Parameters are form-encoded with `serde_urlencoded`; optional parameters are
//! left out when unset so that the server applies its own defaults.

use crate::utils::LightstreamerError;
use serde::Serialize;

/// Client identifier sent on session creation.
pub(crate) const CLIENT_ID: &str = "mgQkwtwdysogQz2BJ4Ji kOj2Bg";

/// WebSocket subprotocol for TLCP.
pub(crate) const TLCP_SUBPROTOCOL: &str = "TLCP-2.5.0.lightstreamer.com";

fn encode<T: Serialize>(params: &T) -> Result<String, LightstreamerError> {
    serde_urlencoded::to_string(params)
        .map_err(|e| LightstreamerError::protocol(format!("cannot encode request: {}", e)))
}

/// Parameters of `create_session`.
#[derive(Debug, Clone, Default, Serialize)]
pub(crate) struct CreateSession {
    #[serde(rename = "LS_cid")]
    pub cid: &'static str,
    #[serde(rename = "LS_adapter_set", skip_serializing_if = "Option::is_none")]
    pub adapter_set: Option<String>,
    #[serde(rename = "LS_user", skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(rename = "LS_password", skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(rename = "LS_keepalive_millis", skip_serializing_if = "Option::is_none")]
    pub keepalive_millis: Option<u64>,
    #[serde(rename = "LS_inactivity_millis", skip_serializing_if = "Option::is_none")]
    pub inactivity_millis: Option<u64>,
    #[serde(
        rename = "LS_requested_max_bandwidth",
        skip_serializing_if = "Option::is_none"
    )]
    pub requested_max_bandwidth: Option<String>,
}

impl CreateSession {
    /// Full text of the `create_session` request.
    pub(crate) fn to_message(&self) -> Result<String, LightstreamerError> {
        Ok(format!("create_session\r\n{}", encode(self)?))
    }
}

/// Parameters of a subscription (`add`) request; also reused for MPN activation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub(crate) struct AddSubscription {
    #[serde(rename = "LS_subId")]
    pub subscription_id: usize,
    #[serde(rename = "LS_mode")]
    pub mode: String,
    #[serde(rename = "LS_group")]
    pub group: String,
    #[serde(rename = "LS_schema")]
    pub schema: String,
    #[serde(rename = "LS_data_adapter", skip_serializing_if = "Option::is_none")]
    pub data_adapter: Option<String>,
    #[serde(rename = "LS_selector", skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,
    #[serde(rename = "LS_snapshot", skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<String>,
    #[serde(
        rename = "LS_requested_max_frequency",
        skip_serializing_if = "Option::is_none"
    )]
    pub requested_max_frequency: Option<String>,
    #[serde(
        rename = "LS_requested_buffer_size",
        skip_serializing_if = "Option::is_none"
    )]
    pub requested_buffer_size: Option<String>,
}

/// Parameters of an MPN subscription activation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub(crate) struct ActivateMpn {
    #[serde(rename = "LS_subId")]
    pub subscription_id: usize,
    #[serde(rename = "LS_mode")]
    pub mode: String,
    #[serde(rename = "LS_group")]
    pub group: String,
    #[serde(rename = "LS_schema")]
    pub schema: String,
    #[serde(rename = "LS_data_adapter", skip_serializing_if = "Option::is_none")]
    pub data_adapter: Option<String>,
    #[serde(
        rename = "LS_requested_buffer_size",
        skip_serializing_if = "Option::is_none"
    )]
    pub requested_buffer_size: Option<String>,
    #[serde(
        rename = "LS_requested_max_frequency",
        skip_serializing_if = "Option::is_none"
    )]
    pub requested_max_frequency: Option<String>,
    #[serde(rename = "PN_deviceId")]
    pub device_id: String,
    #[serde(rename = "PN_notificationFormat")]
    pub notification_format: String,
    #[serde(rename = "PN_trigger", skip_serializing_if = "Option::is_none")]
    pub trigger: Option<String>,
    #[serde(rename = "PN_coalescing", skip_serializing_if = "std::ops::Not::not")]
    pub coalescing: bool,
}

/// The operation carried by a `control` request.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum ControlOperation {
    Add(AddSubscription),
    Delete {
        subscription_id: usize,
    },
    Reconf {
        subscription_id: usize,
        requested_max_frequency: String,
    },
    Destroy,
    MpnRegister {
        platform: String,
        app_id: String,
        device_token: String,
        new_device_token: Option<String>,
    },
    MpnActivate(ActivateMpn),
    MpnModify {
        device_id: String,
        mpn_subscription_id: String,
        notification_format: Option<String>,
        trigger: Option<String>,
    },
    MpnDeactivate {
        device_id: String,
        mpn_subscription_id: Option<String>,
        status_filter: Option<String>,
    },
}

impl ControlOperation {
    fn name(&self) -> &'static str {
        match self {
            Self::Add(_) => "add",
            Self::Delete { .. } => "delete",
            Self::Reconf { .. } => "reconf",
            Self::Destroy => "destroy",
            Self::MpnRegister { .. } => "register",
            Self::MpnActivate(_) => "activate",
            Self::MpnModify { .. } => "pn_reconf",
            Self::MpnDeactivate { .. } => "deactivate",
        }
    }

    fn parameters(&self) -> Result<String, LightstreamerError> {
        match self {
            Self::Add(add) => encode(add),
            Self::Delete { subscription_id } => encode(&[("LS_subId", subscription_id)]),
            Self::Reconf {
                subscription_id,
                requested_max_frequency,
            } => encode(&[
                ("LS_subId", subscription_id.to_string()),
                ("LS_requested_max_frequency", requested_max_frequency.clone()),
            ]),
            Self::Destroy => Ok(String::new()),
            Self::MpnRegister {
                platform,
                app_id,
                device_token,
                new_device_token,
            } => {
                let mut params = vec![
                    ("PN_type", platform.as_str()),
                    ("PN_appId", app_id.as_str()),
                    ("PN_deviceToken", device_token.as_str()),
                ];
                if let Some(token) = new_device_token {
                    params.push(("PN_newDeviceToken", token.as_str()));
                }
                encode(&params)
            }
            Self::MpnActivate(activate) => encode(activate),
            Self::MpnModify {
                device_id,
                mpn_subscription_id,
                notification_format,
                trigger,
            } => {
                let mut params = vec![
                    ("PN_deviceId", device_id.as_str()),
                    ("PN_subscriptionId", mpn_subscription_id.as_str()),
                ];
                if let Some(format) = notification_format {
                    params.push(("PN_notificationFormat", format.as_str()));
                }
                if let Some(trigger) = trigger {
                    params.push(("PN_trigger", trigger.as_str()));
                }
                encode(&params)
            }
            Self::MpnDeactivate {
                device_id,
                mpn_subscription_id,
                status_filter,
            } => {
                let mut params = vec![("PN_deviceId", device_id.as_str())];
                if let Some(id) = mpn_subscription_id {
                    params.push(("PN_subscriptionId", id.as_str()));
                }
                if let Some(filter) = status_filter {
                    params.push(("PN_subscriptionStatus", filter.as_str()));
                }
                encode(&params)
            }
        }
    }
}

/// A `control` request ready to be written on the WebSocket.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ControlRequest {
    pub request_id: u64,
    pub operation: ControlOperation,
}

impl ControlRequest {
    /// Full text of the request.
    pub(crate) fn to_message(&self) -> Result<String, LightstreamerError> {
        let header = encode(&[
            ("LS_reqId", self.request_id.to_string()),
            ("LS_op", self.operation.name().to_string()),
        ])?;
        let parameters = self.operation.parameters()?;
        if parameters.is_empty() {
            Ok(format!("control\r\n{}", header))
        } else {
            Ok(format!("control\r\n{}&{}", header, parameters))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn add_request() -> AddSubscription {
        AddSubscription {
            subscription_id: 3,
            mode: "MERGE".to_string(),
            group: "item1 item2".to_string(),
            schema: "last_price time".to_string(),
            data_adapter: Some("QUOTE_ADAPTER".to_string()),
            selector: None,
            snapshot: Some("true".to_string()),
            requested_max_frequency: None,
            requested_buffer_size: None,
        }
    }

    #[test]
    fn test_create_session_skips_unset_parameters() {
        let create = CreateSession {
            cid: CLIENT_ID,
            adapter_set: Some("DEMO".to_string()),
            ..Default::default()
        };
        assert_eq!(
            create.to_message().unwrap(),
            "create_session\r\nLS_cid=mgQkwtwdysogQz2BJ4Ji+kOj2Bg&LS_adapter_set=DEMO"
        );
    }

    #[test]
    fn test_add_request() {
        let request = ControlRequest {
            request_id: 1,
            operation: ControlOperation::Add(add_request()),
        };
        assert_eq!(
            request.to_message().unwrap(),
            "control\r\nLS_reqId=1&LS_op=add&LS_subId=3&LS_mode=MERGE&LS_group=item1+item2\
             &LS_schema=last_price+time&LS_data_adapter=QUOTE_ADAPTER&LS_snapshot=true"
        );
    }

    #[test]
    fn test_delete_and_destroy() {
        let delete = ControlRequest {
            request_id: 2,
            operation: ControlOperation::Delete { subscription_id: 3 },
        };
        assert_eq!(
            delete.to_message().unwrap(),
            "control\r\nLS_reqId=2&LS_op=delete&LS_subId=3"
        );

        let destroy = ControlRequest {
            request_id: 9,
            operation: ControlOperation::Destroy,
        };
        assert_eq!(
            destroy.to_message().unwrap(),
            "control\r\nLS_reqId=9&LS_op=destroy"
        );
    }

    #[test]
    fn test_reconf() {
        let reconf = ControlRequest {
            request_id: 4,
            operation: ControlOperation::Reconf {
                subscription_id: 3,
                requested_max_frequency: "2.5".to_string(),
            },
        };
        assert_eq!(
            reconf.to_message().unwrap(),
            "control\r\nLS_reqId=4&LS_op=reconf&LS_subId=3&LS_requested_max_frequency=2.5"
        );
    }

    #[test]
    fn test_mpn_activate_encodes_format() {
        let activate = ControlRequest {
            request_id: 5,
            operation: ControlOperation::MpnActivate(ActivateMpn {
                subscription_id: 7,
                mode: "MERGE".to_string(),
                group: "item1".to_string(),
                schema: "last_price".to_string(),
                data_adapter: None,
                requested_buffer_size: None,
                requested_max_frequency: None,
                device_id: "dev-1".to_string(),
                notification_format: r#"{"title":"${last_price}"}"#.to_string(),
                trigger: None,
                coalescing: false,
            }),
        };
        let message = activate.to_message().unwrap();
        assert!(message.starts_with("control\r\nLS_reqId=5&LS_op=activate&LS_subId=7"));
        assert!(message.contains("PN_deviceId=dev-1"));
        assert!(message.contains("PN_notificationFormat=%7B%22title%22%3A%22%24%7Blast_price%7D%22%7D"));
        assert!(!message.contains("PN_coalescing"));
    }

    #[test]
    fn test_mpn_deactivate_with_filter() {
        let deactivate = ControlRequest {
            request_id: 6,
            operation: ControlOperation::MpnDeactivate {
                device_id: "dev-1".to_string(),
                mpn_subscription_id: None,
                status_filter: Some("TRIGGERED".to_string()),
            },
        };
        assert_eq!(
            deactivate.to_message().unwrap(),
            "control\r\nLS_reqId=6&LS_op=deactivate&PN_deviceId=dev-1&PN_subscriptionStatus=TRIGGERED"
        );
    }
}
