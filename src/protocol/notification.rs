/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 18/10/26
******************************************************************************/

//! Parsing of the lines pushed by the server on a TLCP session.

use crate::connection::MaxBandwidth;
use crate::subscription::MaxFrequency;
use crate::utils::{LightstreamerError, parse_arguments};
use std::str::FromStr;

/// A single notification received from the server.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum ServerNotification {
    WsOk,
    ConOk {
        session_id: String,
        request_limit: u64,
        keepalive_ms: u64,
        control_link: Option<String>,
    },
    ConErr {
        code: i32,
        message: String,
    },
    End {
        code: i32,
        message: String,
    },
    Loop {
        expected_delay_ms: u64,
    },
    ServName(String),
    ClientIp(String),
    Cons(MaxBandwidth),
    Probe,
    Noop,
    Sync(u64),
    Prog(u64),
    ReqOk {
        request_id: u64,
    },
    ReqErr {
        request_id: u64,
        code: i32,
        message: String,
    },
    Error {
        code: i32,
        message: String,
    },
    SubOk {
        subscription_id: usize,
        items: usize,
        fields: usize,
    },
    SubCmd {
        subscription_id: usize,
        items: usize,
        fields: usize,
        key_pos: usize,
        command_pos: usize,
    },
    Update {
        subscription_id: usize,
        item_pos: usize,
        values: String,
    },
    EndOfSnapshot {
        subscription_id: usize,
        item_pos: usize,
    },
    ClearSnapshot {
        subscription_id: usize,
        item_pos: usize,
    },
    Overflow {
        subscription_id: usize,
        item_pos: usize,
        lost_updates: u32,
    },
    Conf {
        subscription_id: usize,
        frequency: MaxFrequency,
        filtered: bool,
    },
    Unsub {
        subscription_id: usize,
    },
    MpnReg {
        device_id: String,
        adapter_name: String,
    },
    MpnOk {
        subscription_id: usize,
        mpn_subscription_id: String,
    },
    MpnDel {
        mpn_subscription_id: String,
    },
    MpnZero {
        device_id: String,
    },
}

fn arg<'a>(args: &[&'a str], index: usize, command: &str) -> Result<&'a str, LightstreamerError> {
    args.get(index).copied().ok_or_else(|| {
        LightstreamerError::protocol(format!("{} is missing argument {}", command, index + 1))
    })
}

fn number<T: FromStr>(args: &[&str], index: usize, command: &str) -> Result<T, LightstreamerError> {
    let raw = arg(args, index, command)?;
    raw.parse().map_err(|_| {
        LightstreamerError::protocol(format!("{}: '{}' is not a valid number", command, raw))
    })
}

/// Error messages are percent-encoded and may be missing.
fn message(args: &[&str], index: usize) -> String {
    args.get(index)
        .map(|raw| {
            urlencoding::decode(raw)
                .map(|m| m.into_owned())
                .unwrap_or_else(|_| raw.to_string())
        })
        .unwrap_or_default()
}

impl ServerNotification {
    /// Parses one line (without the trailing CR LF).
    pub(crate) fn parse(line: &str) -> Result<Self, LightstreamerError> {
        let (command, rest) = line.split_once(',').unwrap_or((line, ""));

        // Values may legitimately be empty, so update lines are split by position.
        if command == "U" {
            let mut parts = rest.splitn(3, ',');
            let subscription_id = parts.next().unwrap_or_default();
            let item_pos = parts.next().unwrap_or_default();
            let values = parts
                .next()
                .ok_or_else(|| LightstreamerError::protocol("U is missing its values"))?;
            return Ok(Self::Update {
                subscription_id: number(&[subscription_id], 0, command)?,
                item_pos: number(&[item_pos], 0, command)?,
                values: values.to_string(),
            });
        }

        let args = parse_arguments(rest);
        let notification = match command {
            "WSOK" => Self::WsOk,
            "CONOK" => Self::ConOk {
                session_id: arg(&args, 0, command)?.to_string(),
                request_limit: number(&args, 1, command)?,
                keepalive_ms: number(&args, 2, command)?,
                control_link: args
                    .get(3)
                    .filter(|link| **link != "*")
                    .map(|link| link.to_string()),
            },
            "CONERR" => Self::ConErr {
                code: number(&args, 0, command)?,
                message: message(&args, 1),
            },
            "END" => Self::End {
                code: number(&args, 0, command)?,
                message: message(&args, 1),
            },
            "LOOP" => Self::Loop {
                expected_delay_ms: number(&args, 0, command)?,
            },
            "SERVNAME" => Self::ServName(message(&args, 0)),
            "CLIENTIP" => Self::ClientIp(arg(&args, 0, command)?.to_string()),
            "CONS" => Self::Cons(match arg(&args, 0, command)? {
                "unlimited" => MaxBandwidth::Unlimited,
                "unmanaged" => MaxBandwidth::Unmanaged,
                _ => MaxBandwidth::Limited(number(&args, 0, command)?),
            }),
            "PROBE" => Self::Probe,
            "NOOP" => Self::Noop,
            "SYNC" => Self::Sync(number(&args, 0, command)?),
            "PROG" => Self::Prog(number(&args, 0, command)?),
            "REQOK" => Self::ReqOk {
                request_id: number(&args, 0, command)?,
            },
            "REQERR" => Self::ReqErr {
                request_id: number(&args, 0, command)?,
                code: number(&args, 1, command)?,
                message: message(&args, 2),
            },
            "ERROR" => Self::Error {
                code: number(&args, 0, command)?,
                message: message(&args, 1),
            },
            "SUBOK" => Self::SubOk {
                subscription_id: number(&args, 0, command)?,
                items: number(&args, 1, command)?,
                fields: number(&args, 2, command)?,
            },
            "SUBCMD" => Self::SubCmd {
                subscription_id: number(&args, 0, command)?,
                items: number(&args, 1, command)?,
                fields: number(&args, 2, command)?,
                key_pos: number(&args, 3, command)?,
                command_pos: number(&args, 4, command)?,
            },
            "EOS" => Self::EndOfSnapshot {
                subscription_id: number(&args, 0, command)?,
                item_pos: number(&args, 1, command)?,
            },
            "CS" => Self::ClearSnapshot {
                subscription_id: number(&args, 0, command)?,
                item_pos: number(&args, 1, command)?,
            },
            "OV" => Self::Overflow {
                subscription_id: number(&args, 0, command)?,
                item_pos: number(&args, 1, command)?,
                lost_updates: number(&args, 2, command)?,
            },
            "CONF" => Self::Conf {
                subscription_id: number(&args, 0, command)?,
                frequency: match arg(&args, 1, command)? {
                    "unlimited" => MaxFrequency::Unlimited,
                    _ => MaxFrequency::Limited(number(&args, 1, command)?),
                },
                filtered: args.get(2).is_none_or(|mode| *mode == "filtered"),
            },
            "UNSUB" => Self::Unsub {
                subscription_id: number(&args, 0, command)?,
            },
            "MPNREG" => Self::MpnReg {
                device_id: arg(&args, 0, command)?.to_string(),
                adapter_name: arg(&args, 1, command)?.to_string(),
            },
            "MPNOK" => Self::MpnOk {
                subscription_id: number(&args, 0, command)?,
                mpn_subscription_id: arg(&args, 1, command)?.to_string(),
            },
            "MPNDEL" => Self::MpnDel {
                mpn_subscription_id: arg(&args, 0, command)?.to_string(),
            },
            "MPNZERO" => Self::MpnZero {
                device_id: arg(&args, 0, command)?.to_string(),
            },
            other => {
                return Err(LightstreamerError::protocol(format!(
                    "unknown notification '{}'",
                    other
                )));
            }
        };
        Ok(notification)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_conok() {
        let n = ServerNotification::parse("CONOK,S8f4aec42c3c14ad0,50000,5000,*").unwrap();
        assert_eq!(
            n,
            ServerNotification::ConOk {
                session_id: "S8f4aec42c3c14ad0".to_string(),
                request_limit: 50000,
                keepalive_ms: 5000,
                control_link: None,
            }
        );

        let n = ServerNotification::parse("CONOK,S1,100,2000,push.example.com").unwrap();
        assert!(matches!(
            n,
            ServerNotification::ConOk { control_link: Some(ref link), .. } if link == "push.example.com"
        ));
    }

    #[test]
    fn test_parse_errors_decode_message() {
        let n = ServerNotification::parse("CONERR,2,Requested%20Adapter%20Set%20not%20available")
            .unwrap();
        assert_eq!(
            n,
            ServerNotification::ConErr {
                code: 2,
                message: "Requested Adapter Set not available".to_string(),
            }
        );

        let n = ServerNotification::parse("REQERR,7,21,bad%20Group%20name").unwrap();
        assert_eq!(
            n,
            ServerNotification::ReqErr {
                request_id: 7,
                code: 21,
                message: "bad Group name".to_string(),
            }
        );

        let n = ServerNotification::parse("END,31").unwrap();
        assert_eq!(
            n,
            ServerNotification::End {
                code: 31,
                message: String::new(),
            }
        );
    }

    #[test]
    fn test_parse_update_keeps_empty_values() {
        let n = ServerNotification::parse("U,1,2,a||#").unwrap();
        assert_eq!(
            n,
            ServerNotification::Update {
                subscription_id: 1,
                item_pos: 2,
                values: "a||#".to_string(),
            }
        );

        let n = ServerNotification::parse("U,3,1,").unwrap();
        assert_eq!(
            n,
            ServerNotification::Update {
                subscription_id: 3,
                item_pos: 1,
                values: String::new(),
            }
        );

        assert!(ServerNotification::parse("U,3").is_err());
    }

    #[test]
    fn test_parse_subscription_notifications() {
        assert_eq!(
            ServerNotification::parse("SUBOK,1,2,3").unwrap(),
            ServerNotification::SubOk {
                subscription_id: 1,
                items: 2,
                fields: 3,
            }
        );
        assert_eq!(
            ServerNotification::parse("SUBCMD,4,1,5,1,2").unwrap(),
            ServerNotification::SubCmd {
                subscription_id: 4,
                items: 1,
                fields: 5,
                key_pos: 1,
                command_pos: 2,
            }
        );
        assert_eq!(
            ServerNotification::parse("OV,1,2,15").unwrap(),
            ServerNotification::Overflow {
                subscription_id: 1,
                item_pos: 2,
                lost_updates: 15,
            }
        );
        assert_eq!(
            ServerNotification::parse("CONF,1,unlimited,filtered").unwrap(),
            ServerNotification::Conf {
                subscription_id: 1,
                frequency: MaxFrequency::Unlimited,
                filtered: true,
            }
        );
        assert_eq!(
            ServerNotification::parse("CONF,1,2.5,unfiltered").unwrap(),
            ServerNotification::Conf {
                subscription_id: 1,
                frequency: MaxFrequency::Limited(2.5),
                filtered: false,
            }
        );
        assert_eq!(
            ServerNotification::parse("UNSUB,9").unwrap(),
            ServerNotification::Unsub { subscription_id: 9 }
        );
    }

    #[test]
    fn test_parse_connection_info() {
        assert_eq!(
            ServerNotification::parse("CONS,unlimited").unwrap(),
            ServerNotification::Cons(MaxBandwidth::Unlimited)
        );
        assert_eq!(
            ServerNotification::parse("CONS,40.5").unwrap(),
            ServerNotification::Cons(MaxBandwidth::Limited(40.5))
        );
        assert_eq!(
            ServerNotification::parse("SERVNAME,Lightstreamer%20HTTP%20Server").unwrap(),
            ServerNotification::ServName("Lightstreamer HTTP Server".to_string())
        );
        assert_eq!(
            ServerNotification::parse("PROBE").unwrap(),
            ServerNotification::Probe
        );
        assert_eq!(
            ServerNotification::parse("SYNC,12").unwrap(),
            ServerNotification::Sync(12)
        );
    }

    #[test]
    fn test_parse_mpn_notifications() {
        assert_eq!(
            ServerNotification::parse("MPNREG,dev-1,MPN_ADAPTER").unwrap(),
            ServerNotification::MpnReg {
                device_id: "dev-1".to_string(),
                adapter_name: "MPN_ADAPTER".to_string(),
            }
        );
        assert_eq!(
            ServerNotification::parse("MPNOK,3,mpn-sub-9").unwrap(),
            ServerNotification::MpnOk {
                subscription_id: 3,
                mpn_subscription_id: "mpn-sub-9".to_string(),
            }
        );
        assert_eq!(
            ServerNotification::parse("MPNDEL,mpn-sub-9").unwrap(),
            ServerNotification::MpnDel {
                mpn_subscription_id: "mpn-sub-9".to_string(),
            }
        );
    }

    #[test]
    fn test_parse_failures() {
        assert!(ServerNotification::parse("BOGUS,1").is_err());
        assert!(ServerNotification::parse("SUBOK,1,x,3").is_err());
        assert!(ServerNotification::parse("SUBOK,1").is_err());
        assert!(ServerNotification::parse("").is_err());
    }
}
