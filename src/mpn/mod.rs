/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 18/10/26
******************************************************************************/

//! Mobile and web push notifications (MPN): devices registered with a push notification
//! service and subscriptions whose updates reach them as notifications.

mod builder;
mod device;
mod listener;
mod model;
mod subscription;

pub use builder::{FirebaseMpnBuilder, SafariMpnBuilder, placeholders};
pub use device::MpnDevice;
pub(crate) use listener::{MpnDeviceEvent, MpnSubscriptionEvent};
pub use listener::{MpnDeviceListener, MpnSubscriptionListener};
pub use model::{
    MpnDeviceStatus, MpnErrorCode, MpnPlatform, MpnSubscriptionFilter, MpnSubscriptionStatus,
};
pub use subscription::MpnSubscription;
