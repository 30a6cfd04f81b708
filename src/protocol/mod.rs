/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 18/10/26
******************************************************************************/

//! TLCP wire format: server notifications, control requests and update values.

pub(crate) mod notification;
pub(crate) mod request;
pub(crate) mod values;

pub(crate) use notification::ServerNotification;
pub(crate) use request::{
    ActivateMpn, AddSubscription, CLIENT_ID, ControlOperation, ControlRequest, CreateSession,
    TLCP_SUBPROTOCOL,
};
pub(crate) use values::{DecodedField, decode_update};
