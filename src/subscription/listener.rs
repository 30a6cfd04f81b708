// Copyright (C) 2024 Joaquín Béjar García
// Portions of this file are derived from lightstreamer-client
// Copyright (C) 2024 Daniel López Azaña
// Original project: https://github.com/daniloaz/lightstreamer-client
//
// This file is part of lightstreamer-rs.
//
// lightstreamer-rs is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// lightstreamer-rs is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with lightstreamer-rs. If not, see <https://www.gnu.org/licenses/>.

use crate::subscription::{ItemUpdate, MaxFrequency};
use tokio::sync::mpsc;

/// Interface to be implemented to listen to Subscription events comprehending notifications
/// of subscription/unsubscription, updates, errors and others.
///
/// Every method has an empty default implementation, so a listener only overrides the events
/// it cares about.
///
/// All the notifications for a single `LightstreamerClient`, including those for
/// `ClientListener` and the MPN listeners, are dispatched in order by the task running
/// `LightstreamerClient::connect`, never while the subscription is locked. Upon reception of an
/// event the internal state of the client may already have moved on.
pub trait SubscriptionListener: Send {
    /// Called each time a request to clear the snapshot of an item has been received.
    ///
    /// - For an item in COMMAND mode the state of the item becomes empty; this is equivalent to
    ///   receiving a DELETE for each key currently in the table.
    /// - For an item in DISTINCT mode the previous updates should be considered obsolete.
    ///
    /// For two-level subscriptions the notification refers to the first-level item.
    ///
    /// # Parameters
    ///
    /// - `item_name`: name of the involved item, `None` if the subscription uses an item group.
    /// - `item_pos`: 1-based position of the item within the item list or group.
    fn on_clear_snapshot(&mut self, _item_name: Option<&str>, _item_pos: usize) {}

    /// Called when the server dropped one or more updates for a second-level item. Only possible
    /// when the subscription is unfiltered.
    ///
    /// # Parameters
    ///
    /// - `lost_updates`: number of consecutive updates dropped.
    /// - `key`: the key that identifies the second-level item.
    fn on_command_second_level_item_lost_updates(&mut self, _lost_updates: u32, _key: &str) {}

    /// Called when a second-level subscription failed.
    ///
    /// # Parameters
    ///
    /// - `code`: the error code. `14` means the key value is not a valid item name; only this
    ///   code is detected locally, before any request is sent. The other codes are the ones
    ///   listed in [`SubscriptionListener::on_subscription_error`].
    /// - `message`: description of the error, if any.
    /// - `key`: the key that identifies the second-level item.
    fn on_command_second_level_subscription_error(
        &mut self,
        _code: i32,
        _message: Option<&str>,
        _key: &str,
    ) {
    }

    /// Called when all the snapshot events for an item have been received, so that real time
    /// events follow. Only sent in DISTINCT and COMMAND mode when the snapshot was requested.
    ///
    /// For two-level subscriptions, second-level snapshot updates may arrive both before and
    /// after this notification.
    fn on_end_of_snapshot(&mut self, _item_name: Option<&str>, _item_pos: usize) {}

    /// Called when the server dropped one or more updates for an item because of internal
    /// resource limitations. Only sent for unfiltered deliveries: RAW mode, or MERGE, DISTINCT
    /// and COMMAND with unfiltered dispatching (COMMAND also reports lost ADD and DELETE events
    /// when filtered).
    fn on_item_lost_updates(
        &mut self,
        _item_name: Option<&str>,
        _item_pos: usize,
        _lost_updates: u32,
    ) {
    }

    /// Called for each update of an item of the subscription.
    fn on_item_update(&mut self, _update: &ItemUpdate) {}

    /// Called when the listener is removed through `Subscription::remove_listener`. This is the
    /// last event fired on the listener.
    fn on_listen_end(&mut self) {}

    /// Called when the listener is added through `Subscription::add_listener`. This is the first
    /// event fired on the listener.
    fn on_listen_start(&mut self) {}

    /// Called with the maximum update frequency granted by the server, right after the
    /// subscription is established and after each change requested through
    /// `Subscription::set_requested_max_frequency`. It may differ from the requested value.
    ///
    /// `None` is possible when the frequency can no longer be determined.
    fn on_real_max_frequency(&mut self, _frequency: Option<MaxFrequency>) {}

    /// Called when the subscription has been confirmed by the server. It is always the first
    /// notification for a subscription and invalidates the data received before; it is fired
    /// again after each resubscription, including the automatic one after a reconnection.
    ///
    /// Second-level subscriptions are not notified.
    fn on_subscription(&mut self) {}

    /// Called when the server refused the subscription. To try again, unsubscribe and
    /// subscribe again.
    ///
    /// # Parameters
    ///
    /// - `code`: the error code. See [`SubscriptionErrorCode`](crate::subscription::SubscriptionErrorCode)
    ///   for the known values; `<= 0` means the Metadata Adapter refused the request.
    /// - `message`: description of the error, if any.
    fn on_subscription_error(&mut self, _code: i32, _message: Option<&str>) {}

    /// Called when the subscription has been removed by the server, by an unsubscription or
    /// because the connection was lost. No more events follow until a new `on_subscription`.
    ///
    /// Second-level unsubscriptions are not notified.
    fn on_unsubscription(&mut self) {}
}

/// An event to be delivered to the listeners of a subscription.
#[derive(Debug, Clone)]
pub(crate) enum SubscriptionEvent {
    Subscription,
    Unsubscription,
    SubscriptionError {
        code: i32,
        message: Option<String>,
    },
    ItemUpdate(ItemUpdate),
    EndOfSnapshot {
        item_name: Option<String>,
        item_pos: usize,
    },
    ClearSnapshot {
        item_name: Option<String>,
        item_pos: usize,
    },
    ItemLostUpdates {
        item_name: Option<String>,
        item_pos: usize,
        lost_updates: u32,
    },
    SecondLevelLostUpdates {
        key: String,
        lost_updates: u32,
    },
    SecondLevelError {
        code: i32,
        message: Option<String>,
        key: String,
    },
    RealMaxFrequency(Option<MaxFrequency>),
}

impl SubscriptionEvent {
    pub(crate) fn deliver(&self, listener: &mut dyn SubscriptionListener) {
        match self {
            Self::Subscription => listener.on_subscription(),
            Self::Unsubscription => listener.on_unsubscription(),
            Self::SubscriptionError { code, message } => {
                listener.on_subscription_error(*code, message.as_deref())
            }
            Self::ItemUpdate(update) => listener.on_item_update(update),
            Self::EndOfSnapshot {
                item_name,
                item_pos,
            } => listener.on_end_of_snapshot(item_name.as_deref(), *item_pos),
            Self::ClearSnapshot {
                item_name,
                item_pos,
            } => listener.on_clear_snapshot(item_name.as_deref(), *item_pos),
            Self::ItemLostUpdates {
                item_name,
                item_pos,
                lost_updates,
            } => listener.on_item_lost_updates(item_name.as_deref(), *item_pos, *lost_updates),
            Self::SecondLevelLostUpdates { key, lost_updates } => {
                listener.on_command_second_level_item_lost_updates(*lost_updates, key)
            }
            Self::SecondLevelError { code, message, key } => {
                listener.on_command_second_level_subscription_error(*code, message.as_deref(), key)
            }
            Self::RealMaxFrequency(frequency) => listener.on_real_max_frequency(*frequency),
        }
    }
}

/// A subscription listener that forwards item updates to a tokio mpsc channel.
///
/// This listener decouples the reception of updates from their processing, so that they can
/// be consumed by another task.
///
/// # Examples
///
/// ```ignore
/// use lightstreamer_sdk::subscription::ChannelSubscriptionListener;
///
/// let (listener, mut rx) = ChannelSubscriptionListener::create_channel();
/// subscription.add_listener(Box::new(listener));
///
/// tokio::spawn(async move {
///     while let Some(update) = rx.recv().await {
///         println!("{:?}", update.get_changed_fields());
///     }
/// });
/// ```
pub struct ChannelSubscriptionListener {
    sender: mpsc::UnboundedSender<ItemUpdate>,
}

impl ChannelSubscriptionListener {
    /// Creates a listener forwarding to `sender`.
    pub fn new(sender: mpsc::UnboundedSender<ItemUpdate>) -> Self {
        Self { sender }
    }

    /// Creates a new channel and returns the listener together with the receiving end.
    pub fn create_channel() -> (Self, mpsc::UnboundedReceiver<ItemUpdate>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }
}

impl SubscriptionListener for ChannelSubscriptionListener {
    fn on_item_update(&mut self, update: &ItemUpdate) {
        // The receiver may have been dropped; updates are then discarded.
        let _ = self.sender.send(update.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subscription::item_update::FieldMap;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Recorded {
        events: Vec<String>,
        frequency: Option<MaxFrequency>,
    }

    struct RecordingListener(Arc<Mutex<Recorded>>);

    impl SubscriptionListener for RecordingListener {
        fn on_clear_snapshot(&mut self, item_name: Option<&str>, item_pos: usize) {
            self.0
                .lock()
                .unwrap()
                .events
                .push(format!("clear {:?} {}", item_name, item_pos));
        }

        fn on_end_of_snapshot(&mut self, item_name: Option<&str>, item_pos: usize) {
            self.0
                .lock()
                .unwrap()
                .events
                .push(format!("eos {:?} {}", item_name, item_pos));
        }

        fn on_item_update(&mut self, update: &ItemUpdate) {
            self.0
                .lock()
                .unwrap()
                .events
                .push(format!("update {}", update.get_item_pos()));
        }

        fn on_subscription(&mut self) {
            self.0.lock().unwrap().events.push("subscribed".to_string());
        }

        fn on_subscription_error(&mut self, code: i32, message: Option<&str>) {
            self.0
                .lock()
                .unwrap()
                .events
                .push(format!("error {} {:?}", code, message));
        }

        fn on_command_second_level_subscription_error(
            &mut self,
            code: i32,
            _message: Option<&str>,
            key: &str,
        ) {
            self.0
                .lock()
                .unwrap()
                .events
                .push(format!("second-level error {} {}", code, key));
        }

        fn on_real_max_frequency(&mut self, frequency: Option<MaxFrequency>) {
            self.0.lock().unwrap().frequency = frequency;
        }
    }

    fn update(item_pos: usize, value: &str) -> ItemUpdate {
        ItemUpdate {
            item_name: Some(format!("item{}", item_pos)),
            item_pos,
            fields: Arc::new(FieldMap::new(Some(&["field1".to_string()]), 1)),
            values: vec![Some(value.to_string())],
            changed: vec![true],
            patches: vec![None],
            is_snapshot: false,
        }
    }

    #[test]
    fn test_events_reach_the_matching_callbacks() {
        let recorded = Arc::new(Mutex::new(Recorded::default()));
        let mut listener = RecordingListener(recorded.clone());

        let events = [
            SubscriptionEvent::Subscription,
            SubscriptionEvent::ItemUpdate(update(2, "a")),
            SubscriptionEvent::EndOfSnapshot {
                item_name: Some("item2".to_string()),
                item_pos: 2,
            },
            SubscriptionEvent::ClearSnapshot {
                item_name: None,
                item_pos: 1,
            },
            SubscriptionEvent::SubscriptionError {
                code: 21,
                message: Some("bad Group name".to_string()),
            },
            SubscriptionEvent::SecondLevelError {
                code: 14,
                message: None,
                key: "bad key".to_string(),
            },
            SubscriptionEvent::RealMaxFrequency(Some(MaxFrequency::Limited(2.0))),
        ];
        for event in &events {
            event.deliver(&mut listener);
        }

        let recorded = recorded.lock().unwrap();
        assert_eq!(
            recorded.events,
            vec![
                "subscribed",
                "update 2",
                "eos Some(\"item2\") 2",
                "clear None 1",
                "error 21 Some(\"bad Group name\")",
                "second-level error 14 bad key",
            ]
        );
        assert_eq!(recorded.frequency, Some(MaxFrequency::Limited(2.0)));
    }

    #[test]
    fn test_default_callbacks_do_nothing() {
        struct MinimalListener;
        impl SubscriptionListener for MinimalListener {}

        let mut listener = MinimalListener;
        listener.on_clear_snapshot(Some("item"), 1);
        listener.on_command_second_level_item_lost_updates(5, "key");
        listener.on_command_second_level_subscription_error(14, None, "key");
        listener.on_end_of_snapshot(None, 1);
        listener.on_item_lost_updates(Some("item"), 1, 5);
        listener.on_item_update(&update(1, "x"));
        listener.on_real_max_frequency(None);
        listener.on_subscription_error(21, Some("error"));
    }

    #[tokio::test]
    async fn test_channel_subscription_listener_forwards_updates() {
        let (mut listener, mut rx) = ChannelSubscriptionListener::create_channel();

        for i in 1..=3 {
            listener.on_item_update(&update(i, &format!("value{}", i)));
        }

        for i in 1..=3 {
            let received = rx.recv().await.expect("Should receive update");
            assert_eq!(received.get_item_pos(), i);
            assert_eq!(
                received.get_value("field1").unwrap(),
                Some(format!("value{}", i).as_str())
            );
        }
    }

    #[tokio::test]
    async fn test_channel_subscription_listener_dropped_receiver() {
        let (mut listener, rx) = ChannelSubscriptionListener::create_channel();
        drop(rx);
        listener.on_item_update(&update(1, "value1"));
    }
}
