/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 16/5/25
******************************************************************************/

mod builder;
mod implementation;
mod listener;
mod model;
mod request;
mod session;
mod utils;

pub use builder::{ClientConfig, SimpleClient, SubscriptionParams};
pub use implementation::{LIB_NAME, LIB_VERSION, LightstreamerClient};
pub use listener::ClientListener;
pub use model::{ClientStatus, ConnectionType, DisconnectionType, Transport};
pub(crate) use request::SubscriptionRequest;
