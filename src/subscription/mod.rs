/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 18/10/26
******************************************************************************/
mod error_code;
mod listener;
mod model;
mod state;

pub(crate) mod item_update;

pub use error_code::SubscriptionErrorCode;
pub use item_update::{ItemUpdate, Locator};
pub(crate) use listener::SubscriptionEvent;
pub use listener::{ChannelSubscriptionListener, SubscriptionListener};
pub(crate) use model::is_valid_item_name;
pub use model::{BufferSize, MaxFrequency, Snapshot, Subscription, SubscriptionMode};
pub(crate) use state::{Delivery, SecondLevelAction};
