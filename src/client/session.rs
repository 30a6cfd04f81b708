/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 18/10/26
******************************************************************************/

//! Subscription and MPN tables of a client session.
//!
//! The session turns application calls and server notifications into control requests, queued
//! in an outbox, and into listener events, returned as [`Notice`]s. It never touches the
//! network and never calls a listener itself, so the client can dispatch the events after
//! releasing its own lock.

use crate::client::SubscriptionRequest;
use crate::client::listener::{ClientEvent, SharedClientListener};
use crate::mpn::{
    MpnDevice, MpnDeviceEvent, MpnSubscription, MpnSubscriptionEvent, MpnSubscriptionFilter,
};
use crate::protocol::{ControlOperation, ControlRequest, ServerNotification};
use crate::subscription::{
    Delivery, ItemUpdate, MaxFrequency, SecondLevelAction, Subscription, SubscriptionEvent,
    SubscriptionMode,
};
use crate::utils::LightstreamerError;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::PoisonError;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, trace, warn};

const DEVICE_STATUS_FIELDS: [&str; 2] = ["status", "status_timestamp"];
const SUBSCRIPTION_LIST_FIELDS: [&str; 2] = ["key", "command"];
const MPN_STATUS_FIELDS: [&str; 10] = [
    "status",
    "status_timestamp",
    "notification_format",
    "trigger",
    "group",
    "schema",
    "adapter",
    "mode",
    "requested_buffer_size",
    "requested_max_frequency",
];

/// Listener events produced by the session, to be dispatched by the client.
pub(crate) enum Notice {
    Client(ClientEvent),
    Subscription(Subscription, Vec<SubscriptionEvent>),
    Device(MpnDevice, Vec<MpnDeviceEvent>),
    Mpn(MpnSubscription, Vec<MpnSubscriptionEvent>),
}

impl Notice {
    fn subscription(subscription: &Subscription, events: Vec<SubscriptionEvent>) -> Option<Notice> {
        (!events.is_empty()).then(|| Notice::Subscription(subscription.clone(), events))
    }

    fn device(device: &MpnDevice, events: Vec<MpnDeviceEvent>) -> Option<Notice> {
        (!events.is_empty()).then(|| Notice::Device(device.clone(), events))
    }

    fn mpn(subscription: &MpnSubscription, events: Vec<MpnSubscriptionEvent>) -> Option<Notice> {
        (!events.is_empty()).then(|| Notice::Mpn(subscription.clone(), events))
    }

    pub(crate) fn dispatch(&self, client_listeners: &[SharedClientListener]) {
        match self {
            Notice::Client(event) => {
                for listener in client_listeners {
                    let mut listener = listener.lock().unwrap_or_else(PoisonError::into_inner);
                    event.deliver(&mut **listener);
                }
            }
            Notice::Subscription(subscription, events) => subscription.dispatch(events),
            Notice::Device(device, events) => device.dispatch(events),
            Notice::Mpn(subscription, events) => subscription.dispatch(events),
        }
    }
}

/// Status items published by the server for the registered MPN device.
#[derive(Debug, Clone, PartialEq)]
enum Feed {
    DeviceStatus,
    SubscriptionList,
    MpnStatus(String),
}

#[derive(Clone)]
enum Route {
    Subscription(Subscription),
    SecondLevel {
        parent: Subscription,
        item_pos: usize,
        key: String,
    },
    Feed(Feed, Subscription),
}

/// What a control request in flight was about.
#[derive(Debug)]
enum Pending {
    Add(usize),
    Delete,
    Reconf,
    Register,
    Activate(usize),
    Modify(String, &'static str),
    Deactivate(Option<String>),
    Destroy,
}

pub(crate) struct Session {
    binding: UnboundedSender<SubscriptionRequest>,
    bound: bool,
    next_subscription_id: usize,
    next_request_id: u64,
    subscriptions: Vec<Subscription>,
    routes: HashMap<usize, Route>,
    pending: HashMap<u64, Pending>,
    outbox: Vec<ControlRequest>,
    device: Option<MpnDevice>,
    device_ready: bool,
    device_feeds: Vec<usize>,
    subscriptions_listed: bool,
    mpn_waiting: Vec<(MpnSubscription, bool)>,
    mpn_activating: HashMap<usize, (MpnSubscription, bool)>,
    mpn_subscriptions: BTreeMap<String, MpnSubscription>,
    mpn_feeds: HashMap<String, usize>,
    /// Format or trigger changes waiting for a registered device, by MPN subscription id.
    mpn_modifications: BTreeMap<String, BTreeSet<&'static str>>,
}

impl Session {
    pub(crate) fn new(binding: UnboundedSender<SubscriptionRequest>) -> Self {
        Session {
            binding,
            bound: false,
            next_subscription_id: 0,
            next_request_id: 0,
            subscriptions: Vec::new(),
            routes: HashMap::new(),
            pending: HashMap::new(),
            outbox: Vec::new(),
            device: None,
            device_ready: false,
            device_feeds: Vec::new(),
            subscriptions_listed: false,
            mpn_waiting: Vec::new(),
            mpn_activating: HashMap::new(),
            mpn_subscriptions: BTreeMap::new(),
            mpn_feeds: HashMap::new(),
            mpn_modifications: BTreeMap::new(),
        }
    }

    pub(crate) fn is_bound(&self) -> bool {
        self.bound
    }

    /// Control requests queued since the last call.
    pub(crate) fn take_outbox(&mut self) -> Vec<ControlRequest> {
        std::mem::take(&mut self.outbox)
    }

    fn push(&mut self, operation: ControlOperation, pending: Pending) {
        self.next_request_id += 1;
        self.pending.insert(self.next_request_id, pending);
        self.outbox.push(ControlRequest {
            request_id: self.next_request_id,
            operation,
        });
    }

    /// Wakes up the client loop so that the outbox is written.
    fn wake(&self) {
        if self.bound && self.binding.send(SubscriptionRequest::Flush).is_err() {
            debug!("client loop not running");
        }
    }

    fn allocate_subscription_id(&mut self) -> usize {
        self.next_subscription_id += 1;
        self.next_subscription_id
    }

    // ---- real-time subscriptions ----

    pub(crate) fn subscribe(&mut self, subscription: &Subscription) -> Result<(), LightstreamerError> {
        subscription.activate(self.binding.clone())?;
        self.subscriptions.push(subscription.clone());
        if self.bound {
            self.send_add(subscription);
            self.wake();
        }
        Ok(())
    }

    pub(crate) fn unsubscribe(
        &mut self,
        subscription: &Subscription,
    ) -> Result<Vec<Notice>, LightstreamerError> {
        let index = self
            .subscriptions
            .iter()
            .position(|active| active.ptr_eq(subscription))
            .ok_or_else(|| {
                LightstreamerError::illegal_state("subscription not active in this client")
            })?;
        self.subscriptions.remove(index);

        let id = subscription.id();
        let (was_subscribed, second_levels) = subscription.deactivate();
        if let Some(id) = id {
            self.close_route(id);
        }
        for id in second_levels {
            self.close_route(id);
        }
        self.wake();

        let events = if was_subscribed {
            vec![SubscriptionEvent::Unsubscription]
        } else {
            Vec::new()
        };
        Ok(Notice::subscription(subscription, events).into_iter().collect())
    }

    pub(crate) fn get_subscriptions(&self) -> Vec<Subscription> {
        self.subscriptions.clone()
    }

    fn send_add(&mut self, subscription: &Subscription) {
        let id = self.allocate_subscription_id();
        subscription.set_id(Some(id));
        self.routes.insert(id, Route::Subscription(subscription.clone()));
        self.push(ControlOperation::Add(subscription.add_request(id)), Pending::Add(id));
    }

    fn close_route(&mut self, id: usize) {
        if self.routes.remove(&id).is_some() && self.bound {
            self.push(ControlOperation::Delete { subscription_id: id }, Pending::Delete);
        }
    }

    /// Sends the current requested max frequency of a subscription and of its second levels.
    pub(crate) fn reconfigure(&mut self, id: usize) {
        let Some(Route::Subscription(subscription)) = self.routes.get(&id).cloned() else {
            return;
        };
        let Some(frequency) = subscription.reconf_frequency() else {
            return;
        };
        let mut targets = vec![id];
        targets.extend(self.routes.iter().filter_map(|(second, route)| match route {
            Route::SecondLevel { parent, .. } if parent.ptr_eq(&subscription) => Some(*second),
            _ => None,
        }));
        for target in targets {
            self.push(
                ControlOperation::Reconf {
                    subscription_id: target,
                    requested_max_frequency: frequency.clone(),
                },
                Pending::Reconf,
            );
        }
    }

    fn deliver(&mut self, subscription: &Subscription, delivery: Delivery, notices: &mut Vec<Notice>) {
        notices.extend(Notice::subscription(subscription, delivery.events));
        for action in delivery.actions {
            match action {
                SecondLevelAction::Open { item_pos, key } => {
                    let id = self.allocate_subscription_id();
                    subscription.attach_second_level(item_pos, &key, id);
                    let request = subscription.second_level_request(id, &key);
                    self.routes.insert(
                        id,
                        Route::SecondLevel {
                            parent: subscription.clone(),
                            item_pos,
                            key,
                        },
                    );
                    self.push(ControlOperation::Add(request), Pending::Add(id));
                }
                SecondLevelAction::Close { subscription_id } => self.close_route(subscription_id),
            }
        }
    }

    // ---- session lifecycle ----

    /// A new session was created: every active subscription and the MPN device are sent again.
    pub(crate) fn bind(&mut self) {
        self.bound = true;
        for subscription in self.subscriptions.clone() {
            self.send_add(&subscription);
        }
        if let Some(device) = self.device.clone() {
            self.send_register(&device);
        }
    }

    /// The session is gone. Subscribed subscriptions go back to ACTIVE; nothing is forgotten.
    pub(crate) fn unbind(&mut self) -> Vec<Notice> {
        let mut notices = Vec::new();
        self.bound = false;
        for subscription in &self.subscriptions {
            let (events, _) = subscription.suspend();
            subscription.set_id(None);
            notices.extend(Notice::subscription(subscription, events));
        }
        self.routes.clear();
        for pending in std::mem::take(&mut self.pending).into_values() {
            if let Pending::Modify(mpn_id, property) = pending {
                self.mpn_modifications.entry(mpn_id).or_default().insert(property);
            }
        }
        self.outbox.clear();
        self.device_ready = false;
        self.device_feeds.clear();
        self.mpn_feeds.clear();
        self.subscriptions_listed = false;
        let activating: Vec<_> = self.mpn_activating.drain().map(|(_, waiting)| waiting).collect();
        self.mpn_waiting.extend(activating);
        notices
    }

    /// Asks the server to close the session.
    pub(crate) fn destroy(&mut self) {
        if self.bound {
            self.push(ControlOperation::Destroy, Pending::Destroy);
        }
    }

    // ---- notifications ----

    /// Applies a subscription or MPN notification.
    ///
    /// # Errors
    ///
    /// A protocol error when an update cannot be decoded; the values of the subscription are
    /// then unreliable and the session should be dropped.
    pub(crate) fn handle(
        &mut self,
        notification: ServerNotification,
    ) -> Result<Vec<Notice>, LightstreamerError> {
        let mut notices = Vec::new();
        match notification {
            ServerNotification::SubOk {
                subscription_id,
                items,
                fields,
            } => self.confirmed(subscription_id, items, fields, None, None, &mut notices),
            ServerNotification::SubCmd {
                subscription_id,
                items,
                fields,
                key_pos,
                command_pos,
            } => self.confirmed(
                subscription_id,
                items,
                fields,
                Some(key_pos),
                Some(command_pos),
                &mut notices,
            ),
            ServerNotification::Update {
                subscription_id,
                item_pos,
                values,
            } => self.update(subscription_id, item_pos, &values, &mut notices)?,
            ServerNotification::EndOfSnapshot {
                subscription_id,
                item_pos,
            } => match self.routes.get(&subscription_id).cloned() {
                Some(Route::Subscription(subscription)) => {
                    let events = subscription.end_of_snapshot(item_pos)?;
                    notices.extend(Notice::subscription(&subscription, events));
                }
                Some(Route::Feed(Feed::SubscriptionList, _)) => {
                    self.subscriptions_listed = true;
                    notices.extend(self.subscriptions_updated());
                }
                _ => {}
            },
            ServerNotification::ClearSnapshot {
                subscription_id,
                item_pos,
            } => {
                if let Some(Route::Subscription(subscription)) = self.routes.get(&subscription_id).cloned() {
                    let delivery = subscription.clear_snapshot(item_pos)?;
                    self.deliver(&subscription, delivery, &mut notices);
                }
            }
            ServerNotification::Overflow {
                subscription_id,
                item_pos,
                lost_updates,
            } => match self.routes.get(&subscription_id).cloned() {
                Some(Route::Subscription(subscription)) => {
                    let events = subscription.lost_updates(item_pos, lost_updates)?;
                    notices.extend(Notice::subscription(&subscription, events));
                }
                Some(Route::SecondLevel { parent, key, .. }) => {
                    let events = vec![SubscriptionEvent::SecondLevelLostUpdates { key, lost_updates }];
                    notices.extend(Notice::subscription(&parent, events));
                }
                Some(Route::Feed(feed, _)) => warn!("{} updates lost on {:?}", lost_updates, feed),
                None => {}
            },
            ServerNotification::Conf {
                subscription_id,
                frequency,
                filtered,
            } => {
                if let Some(Route::Subscription(subscription)) = self.routes.get(&subscription_id).cloned() {
                    let frequency = if filtered {
                        frequency
                    } else {
                        MaxFrequency::Unfiltered
                    };
                    notices.extend(Notice::subscription(
                        &subscription,
                        subscription.real_max_frequency(frequency),
                    ));
                }
            }
            ServerNotification::Unsub { subscription_id } => {
                match self.routes.remove(&subscription_id) {
                    Some(Route::Subscription(subscription)) => {
                        debug!("subscription {} dropped by the server", subscription_id);
                        let (events, second_levels) = subscription.suspend();
                        subscription.set_id(None);
                        for id in second_levels {
                            self.close_route(id);
                        }
                        notices.extend(Notice::subscription(&subscription, events));
                    }
                    Some(_) => debug!("internal subscription {} closed", subscription_id),
                    None => trace!("subscription {} closed", subscription_id),
                }
            }
            ServerNotification::ReqOk { request_id } => {
                if let Some(pending) = self.pending.remove(&request_id) {
                    trace!("request {} ({:?}) accepted", request_id, pending);
                }
            }
            ServerNotification::ReqErr {
                request_id,
                code,
                message,
            } => self.refused(request_id, code, &message, &mut notices),
            ServerNotification::MpnReg {
                device_id,
                adapter_name,
            } => self.device_registered(&device_id, &adapter_name, &mut notices),
            ServerNotification::MpnOk {
                subscription_id,
                mpn_subscription_id,
            } => self.mpn_confirmed(subscription_id, &mpn_subscription_id, &mut notices),
            ServerNotification::MpnDel {
                mpn_subscription_id,
            } => self.mpn_deleted(&mpn_subscription_id, &mut notices),
            ServerNotification::MpnZero { device_id } => {
                debug!("badge of MPN device {} reset", device_id)
            }
            other => trace!("not a session notification: {:?}", other),
        }
        Ok(notices)
    }

    fn confirmed(
        &mut self,
        id: usize,
        items: usize,
        fields: usize,
        key_pos: Option<usize>,
        command_pos: Option<usize>,
        notices: &mut Vec<Notice>,
    ) {
        match self.routes.get(&id).cloned() {
            Some(Route::Subscription(subscription)) => {
                let events = subscription.confirm(items, fields, key_pos, command_pos);
                notices.extend(Notice::subscription(&subscription, events));
            }
            Some(Route::SecondLevel { parent, .. }) => parent.second_level_confirmed(fields),
            Some(Route::Feed(_, subscription)) => {
                subscription.confirm(items, fields, key_pos, command_pos);
            }
            None => debug!("confirmation of unknown subscription {}", id),
        }
    }

    fn update(
        &mut self,
        id: usize,
        item_pos: usize,
        values: &str,
        notices: &mut Vec<Notice>,
    ) -> Result<(), LightstreamerError> {
        match self.routes.get(&id).cloned() {
            Some(Route::Subscription(subscription)) => {
                let delivery = subscription.process_update(item_pos, values)?;
                self.deliver(&subscription, delivery, notices);
            }
            Some(Route::SecondLevel {
                parent,
                item_pos: parent_pos,
                key,
            }) => {
                let events = parent.process_second_level_update(parent_pos, &key, values)?;
                notices.extend(Notice::subscription(&parent, events));
            }
            Some(Route::Feed(feed, subscription)) => {
                let delivery = subscription.process_update(item_pos, values)?;
                for event in delivery.events {
                    if let SubscriptionEvent::ItemUpdate(update) = event {
                        self.feed_update(&feed, &update, notices);
                    }
                }
            }
            None => trace!("update for unknown subscription {}", id),
        }
        Ok(())
    }

    fn refused(&mut self, request_id: u64, code: i32, message: &str, notices: &mut Vec<Notice>) {
        match self.pending.remove(&request_id) {
            Some(Pending::Add(id)) => match self.routes.remove(&id) {
                Some(Route::Subscription(subscription)) => {
                    notices.extend(Notice::subscription(&subscription, subscription.refuse(code, message)));
                }
                Some(Route::SecondLevel {
                    parent,
                    item_pos,
                    key,
                }) => {
                    let events = parent.second_level_refused(item_pos, &key, code, message);
                    notices.extend(Notice::subscription(&parent, events));
                }
                Some(Route::Feed(feed, _)) => {
                    warn!("MPN status item {:?} refused: {} {}", feed, code, message)
                }
                None => {}
            },
            Some(Pending::Register) => {
                self.device_ready = false;
                if let Some(device) = self.device.clone() {
                    notices.extend(Notice::device(&device, device.registration_failed(code, message)));
                }
            }
            Some(Pending::Activate(local)) => {
                if let Some((mpn, _)) = self.mpn_activating.remove(&local) {
                    notices.extend(Notice::mpn(&mpn, mpn.refuse(code, message)));
                }
            }
            Some(Pending::Modify(mpn_id, property)) => {
                if let Some(mpn) = self.mpn_subscriptions.get(&mpn_id).cloned() {
                    notices.extend(Notice::mpn(&mpn, mpn.modification_failed(property, code, message)));
                }
            }
            Some(Pending::Deactivate(Some(mpn_id))) => {
                if let Some(mpn) = self.mpn_subscriptions.get(&mpn_id).cloned() {
                    notices.extend(Notice::mpn(&mpn, mpn.unsubscription_failed(code, message)));
                }
            }
            Some(other) => warn!("request {:?} refused: {} {}", other, code, message),
            None => debug!("refusal of unknown request {}", request_id),
        }
    }

    // ---- MPN ----

    pub(crate) fn register_for_mpn(&mut self, device: &MpnDevice) {
        if let Some(current) = &self.device {
            if current.ptr_eq(device) && self.device_ready {
                return;
            }
        }
        for id in std::mem::take(&mut self.device_feeds) {
            self.close_route(id);
        }
        for (_, id) in std::mem::take(&mut self.mpn_feeds) {
            self.close_route(id);
        }
        self.mpn_subscriptions.clear();
        self.mpn_modifications.clear();
        self.subscriptions_listed = false;
        self.device_ready = false;
        self.device = Some(device.clone());
        if self.bound {
            self.send_register(device);
            self.wake();
        }
    }

    fn send_register(&mut self, device: &MpnDevice) {
        let (platform, app_id, device_token, new_device_token) = device.register_parameters();
        self.push(
            ControlOperation::MpnRegister {
                platform,
                app_id,
                device_token,
                new_device_token,
            },
            Pending::Register,
        );
    }

    fn ready_device_id(&self) -> Option<String> {
        if self.bound && self.device_ready {
            self.device.as_ref().and_then(MpnDevice::get_device_id)
        } else {
            None
        }
    }

    pub(crate) fn subscribe_mpn(
        &mut self,
        subscription: &MpnSubscription,
        coalescing: bool,
    ) -> Result<Vec<Notice>, LightstreamerError> {
        if self.device.is_none() {
            return Err(LightstreamerError::illegal_state(
                "no MPN device registered",
            ));
        }
        let events = subscription.activate(self.binding.clone())?;
        match self.ready_device_id() {
            Some(device_id) => {
                self.send_activate(subscription.clone(), coalescing, &device_id);
                self.wake();
            }
            None => self.mpn_waiting.push((subscription.clone(), coalescing)),
        }
        Ok(Notice::mpn(subscription, events).into_iter().collect())
    }

    fn send_activate(&mut self, subscription: MpnSubscription, coalescing: bool, device_id: &str) {
        let local = self.allocate_subscription_id();
        let request = subscription.activate_request(local, device_id, coalescing);
        self.push(ControlOperation::MpnActivate(request), Pending::Activate(local));
        self.mpn_activating.insert(local, (subscription, coalescing));
    }

    pub(crate) fn unsubscribe_mpn(
        &mut self,
        subscription: &MpnSubscription,
    ) -> Result<Vec<Notice>, LightstreamerError> {
        if let Some(index) = self
            .mpn_waiting
            .iter()
            .position(|(waiting, _)| waiting.ptr_eq(subscription))
        {
            self.mpn_waiting.remove(index);
            return Ok(Notice::mpn(subscription, subscription.reset()).into_iter().collect());
        }
        let mpn_id = subscription.get_subscription_id().ok_or_else(|| {
            LightstreamerError::illegal_state("MPN subscription not subscribed")
        })?;
        let device_id = self.ready_device_id().ok_or_else(|| {
            LightstreamerError::illegal_state("MPN device not registered on the current session")
        })?;
        self.push(
            ControlOperation::MpnDeactivate {
                device_id,
                mpn_subscription_id: Some(mpn_id.clone()),
                status_filter: None,
            },
            Pending::Deactivate(Some(mpn_id)),
        );
        self.wake();
        Ok(Vec::new())
    }

    pub(crate) fn unsubscribe_mpn_subscriptions(
        &mut self,
        filter: MpnSubscriptionFilter,
    ) -> Result<(), LightstreamerError> {
        let device_id = self.ready_device_id().ok_or_else(|| {
            LightstreamerError::illegal_state("MPN device not registered on the current session")
        })?;
        self.push(
            ControlOperation::MpnDeactivate {
                device_id,
                mpn_subscription_id: None,
                status_filter: filter.server_status().map(str::to_string),
            },
            Pending::Deactivate(None),
        );
        self.wake();
        Ok(())
    }

    pub(crate) fn get_mpn_subscriptions(&self, filter: MpnSubscriptionFilter) -> Vec<MpnSubscription> {
        self.mpn_subscriptions
            .values()
            .chain(self.mpn_activating.values().map(|(subscription, _)| subscription))
            .chain(self.mpn_waiting.iter().map(|(subscription, _)| subscription))
            .filter(|subscription| filter.matches(subscription.get_status()))
            .cloned()
            .collect()
    }

    pub(crate) fn find_mpn_subscription(&self, subscription_id: &str) -> Option<MpnSubscription> {
        self.mpn_subscriptions.get(subscription_id).cloned()
    }

    /// Sends the new notification format or trigger of a subscribed MPN subscription. Without
    /// a device registered on the current session the change waits for the registration.
    pub(crate) fn modify_mpn(&mut self, mpn_id: &str, property: &'static str) {
        let Some(subscription) = self.mpn_subscriptions.get(mpn_id).cloned() else {
            warn!("cannot change {} of unknown MPN subscription {}", property, mpn_id);
            return;
        };
        let Some(device_id) = self.ready_device_id() else {
            debug!("change of {} of MPN subscription {} deferred", property, mpn_id);
            self.mpn_modifications
                .entry(mpn_id.to_string())
                .or_default()
                .insert(property);
            return;
        };
        let (notification_format, trigger) = subscription.modification(property);
        self.push(
            ControlOperation::MpnModify {
                device_id,
                mpn_subscription_id: mpn_id.to_string(),
                notification_format,
                trigger,
            },
            Pending::Modify(mpn_id.to_string(), property),
        );
    }

    fn device_registered(&mut self, device_id: &str, adapter_name: &str, notices: &mut Vec<Notice>) {
        let Some(device) = self.device.clone() else {
            warn!("MPN registration without a device");
            return;
        };
        self.device_ready = true;
        notices.extend(Notice::device(&device, device.registered(device_id, adapter_name)));

        if self.device_feeds.is_empty() {
            let feeds = [
                self.open_feed(
                    Feed::DeviceStatus,
                    SubscriptionMode::Merge,
                    format!("DEV-{}", device_id),
                    &DEVICE_STATUS_FIELDS,
                ),
                self.open_feed(
                    Feed::SubscriptionList,
                    SubscriptionMode::Command,
                    format!("SUBS-{}", device_id),
                    &SUBSCRIPTION_LIST_FIELDS,
                ),
            ];
            self.device_feeds = feeds.into_iter().flatten().collect();
        }

        for (subscription, coalescing) in std::mem::take(&mut self.mpn_waiting) {
            self.send_activate(subscription, coalescing, device_id);
        }
        for (mpn_id, properties) in std::mem::take(&mut self.mpn_modifications) {
            for property in properties {
                self.modify_mpn(&mpn_id, property);
            }
        }
    }

    fn open_feed(
        &mut self,
        feed: Feed,
        mode: SubscriptionMode,
        item: String,
        fields: &[&str],
    ) -> Option<usize> {
        let adapter = self.device.as_ref().and_then(MpnDevice::get_adapter_name);
        let fields = fields.iter().map(|field| field.to_string()).collect();
        let subscription = Subscription::new(mode, Some(vec![item]), Some(fields))
            .and_then(|subscription| {
                subscription.set_data_adapter(adapter)?;
                subscription.activate(self.binding.clone())?;
                Ok(subscription)
            });
        let subscription = match subscription {
            Ok(subscription) => subscription,
            Err(e) => {
                warn!("cannot subscribe to MPN status item {:?}: {}", feed, e);
                return None;
            }
        };
        let id = self.allocate_subscription_id();
        subscription.set_id(Some(id));
        self.push(ControlOperation::Add(subscription.add_request(id)), Pending::Add(id));
        self.routes.insert(id, Route::Feed(feed, subscription));
        Some(id)
    }

    fn open_mpn_feed(&mut self, mpn_id: &str) {
        if self.mpn_feeds.contains_key(mpn_id) {
            return;
        }
        let Some(device_id) = self.ready_device_id() else {
            return;
        };
        let feed = self.open_feed(
            Feed::MpnStatus(mpn_id.to_string()),
            SubscriptionMode::Merge,
            format!("SUB-{}-{}", device_id, mpn_id),
            &MPN_STATUS_FIELDS,
        );
        if let Some(id) = feed {
            self.mpn_feeds.insert(mpn_id.to_string(), id);
        }
    }

    fn subscriptions_updated(&self) -> Option<Notice> {
        let device = self.device.as_ref()?;
        Notice::device(device, vec![MpnDeviceEvent::SubscriptionsUpdated])
    }

    fn feed_update(&mut self, feed: &Feed, update: &ItemUpdate, notices: &mut Vec<Notice>) {
        let value = |name: &str| update.get_value(name).ok().flatten().map(str::to_string);
        match feed {
            Feed::DeviceStatus => {
                let (Some(device), Some(status)) = (self.device.clone(), value("status")) else {
                    return;
                };
                let timestamp = value("status_timestamp").and_then(|t| t.parse().ok());
                notices.extend(Notice::device(&device, device.server_status(&status, timestamp)));
            }
            Feed::SubscriptionList => {
                let (Some(mpn_id), Some(command)) = (value("key"), value("command")) else {
                    return;
                };
                match command.as_str() {
                    "ADD" | "UPDATE" => {
                        if !self.mpn_subscriptions.contains_key(&mpn_id) {
                            let subscription = MpnSubscription::persisted(&mpn_id);
                            subscription.bind_persisted(self.binding.clone());
                            self.mpn_subscriptions.insert(mpn_id.clone(), subscription);
                        }
                        self.open_mpn_feed(&mpn_id);
                    }
                    "DELETE" => self.mpn_deleted(&mpn_id, notices),
                    other => debug!("unknown command {} on the MPN subscription list", other),
                }
                if self.subscriptions_listed {
                    notices.extend(self.subscriptions_updated());
                }
            }
            Feed::MpnStatus(mpn_id) => {
                if let Some(subscription) = self.mpn_subscriptions.get(mpn_id).cloned() {
                    let events = subscription.apply_server_state(&update.get_changed_fields());
                    notices.extend(Notice::mpn(&subscription, events));
                }
            }
        }
    }

    fn mpn_confirmed(&mut self, local: usize, mpn_id: &str, notices: &mut Vec<Notice>) {
        let Some((subscription, _)) = self.mpn_activating.remove(&local) else {
            debug!("confirmation of unknown MPN activation {}", local);
            return;
        };
        notices.extend(Notice::mpn(&subscription, subscription.confirm(mpn_id)));
        self.mpn_subscriptions.insert(mpn_id.to_string(), subscription.clone());

        let feed = self
            .mpn_feeds
            .get(mpn_id)
            .and_then(|id| self.routes.get(id))
            .cloned();
        match feed {
            // The status item may have been received before the confirmation.
            Some(Route::Feed(_, status)) => {
                let state = feed_state(&status);
                if !state.is_empty() {
                    notices.extend(Notice::mpn(&subscription, subscription.apply_server_state(&state)));
                }
            }
            _ => self.open_mpn_feed(mpn_id),
        }
    }

    fn mpn_deleted(&mut self, mpn_id: &str, notices: &mut Vec<Notice>) {
        if let Some(subscription) = self.mpn_subscriptions.remove(mpn_id) {
            notices.extend(Notice::mpn(&subscription, subscription.reset()));
        }
        if let Some(id) = self.mpn_feeds.remove(mpn_id) {
            self.close_route(id);
        }
    }
}

/// Current values of an MPN subscription status item.
fn feed_state(status: &Subscription) -> HashMap<String, Option<String>> {
    MPN_STATUS_FIELDS
        .iter()
        .filter_map(|field| {
            status
                .get_value(1usize, *field)
                .ok()
                .flatten()
                .map(|value| (field.to_string(), Some(value)))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mpn::{MpnDeviceStatus, MpnPlatform, MpnSubscriptionStatus};
    use tokio::sync::mpsc;

    fn strings(values: &[&str]) -> Option<Vec<String>> {
        Some(values.iter().map(|s| s.to_string()).collect())
    }

    fn session() -> (Session, mpsc::UnboundedReceiver<SubscriptionRequest>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Session::new(tx), rx)
    }

    fn receive(session: &mut Session, line: &str) -> Vec<Notice> {
        session
            .handle(ServerNotification::parse(line).unwrap())
            .unwrap()
    }

    fn subscription_events(notices: &[Notice]) -> Vec<SubscriptionEvent> {
        notices
            .iter()
            .flat_map(|notice| match notice {
                Notice::Subscription(_, events) => events.clone(),
                _ => Vec::new(),
            })
            .collect()
    }

    fn mpn_events(notices: &[Notice]) -> Vec<MpnSubscriptionEvent> {
        notices
            .iter()
            .flat_map(|notice| match notice {
                Notice::Mpn(_, events) => events.clone(),
                _ => Vec::new(),
            })
            .collect()
    }

    fn adds(outbox: &[ControlRequest]) -> Vec<(u64, usize, String)> {
        outbox
            .iter()
            .filter_map(|request| match &request.operation {
                ControlOperation::Add(add) => {
                    Some((request.request_id, add.subscription_id, add.group.clone()))
                }
                _ => None,
            })
            .collect()
    }

    fn quotes() -> Subscription {
        Subscription::new(
            SubscriptionMode::Merge,
            strings(&["item1", "item2"]),
            strings(&["last_price", "time"]),
        )
        .unwrap()
    }

    #[test]
    fn test_subscriptions_wait_for_the_session() {
        let (mut session, mut rx) = session();
        let subscription = quotes();
        session.subscribe(&subscription).unwrap();
        assert!(subscription.is_active());
        assert!(session.take_outbox().is_empty());
        assert!(rx.try_recv().is_err());

        session.bind();
        let outbox = session.take_outbox();
        assert_eq!(adds(&outbox), vec![(1, 1, "item1 item2".to_string())]);
        assert_eq!(subscription.id(), Some(1));

        let notices = receive(&mut session, "SUBOK,1,2,2");
        assert!(matches!(
            subscription_events(&notices).as_slice(),
            [SubscriptionEvent::Subscription]
        ));
        let notices = receive(&mut session, "U,1,1,10.5|12:00");
        assert!(matches!(
            subscription_events(&notices).as_slice(),
            [SubscriptionEvent::ItemUpdate(_)]
        ));
        assert_eq!(
            subscription.get_value("item1", "last_price").unwrap(),
            Some("10.5".to_string())
        );

        let second = quotes();
        session.subscribe(&second).unwrap();
        assert_eq!(rx.try_recv().unwrap(), SubscriptionRequest::Flush);
        assert_eq!(adds(&session.take_outbox()), vec![(2, 2, "item1 item2".to_string())]);
    }

    #[test]
    fn test_unsubscribe() {
        let (mut session, _rx) = session();
        let subscription = quotes();
        session.bind();
        session.subscribe(&subscription).unwrap();
        receive(&mut session, "SUBOK,1,2,2");
        session.take_outbox();

        let notices = session.unsubscribe(&subscription).unwrap();
        assert!(matches!(
            subscription_events(&notices).as_slice(),
            [SubscriptionEvent::Unsubscription]
        ));
        let outbox = session.take_outbox();
        assert_eq!(
            outbox[0].operation,
            ControlOperation::Delete { subscription_id: 1 }
        );
        assert!(!subscription.is_active());
        assert!(session.get_subscriptions().is_empty());

        // Late updates are ignored.
        assert!(receive(&mut session, "U,1,1,11|12:01").is_empty());
        assert!(matches!(session.unsubscribe(&subscription), Err(e) if e.is_illegal_state()));
    }

    #[test]
    fn test_refused_subscription() {
        let (mut session, _rx) = session();
        session.bind();
        let subscription = quotes();
        session.subscribe(&subscription).unwrap();
        let notices = receive(&mut session, "REQERR,1,21,Bad%20Group");
        match subscription_events(&notices).as_slice() {
            [SubscriptionEvent::SubscriptionError { code, message }] => {
                assert_eq!(*code, 21);
                assert_eq!(message.as_deref(), Some("Bad Group"));
            }
            other => panic!("unexpected events {:?}", other),
        }
        assert!(subscription.is_active());
        assert_eq!(subscription.id(), None);
    }

    #[test]
    fn test_session_loss_resubscribes() {
        let (mut session, _rx) = session();
        session.bind();
        let subscription = quotes();
        session.subscribe(&subscription).unwrap();
        receive(&mut session, "SUBOK,1,2,2");
        session.take_outbox();

        let notices = session.unbind();
        assert!(matches!(
            subscription_events(&notices).as_slice(),
            [SubscriptionEvent::Unsubscription]
        ));
        assert!(subscription.is_active());
        assert!(!subscription.is_subscribed());

        session.bind();
        assert_eq!(adds(&session.take_outbox()), vec![(2, 2, "item1 item2".to_string())]);
    }

    #[test]
    fn test_server_side_unsubscription_and_frequency() {
        let (mut session, _rx) = session();
        session.bind();
        let subscription = quotes();
        session.subscribe(&subscription).unwrap();
        receive(&mut session, "SUBOK,1,2,2");

        let notices = receive(&mut session, "CONF,1,2.5,filtered");
        assert!(matches!(
            subscription_events(&notices).as_slice(),
            [SubscriptionEvent::RealMaxFrequency(Some(MaxFrequency::Limited(_)))]
        ));
        assert_eq!(
            subscription.get_real_max_frequency(),
            Some(MaxFrequency::Limited(2.5))
        );

        let notices = receive(&mut session, "UNSUB,1");
        assert!(matches!(
            subscription_events(&notices).as_slice(),
            [SubscriptionEvent::Unsubscription]
        ));
        assert!(subscription.is_active());
    }

    #[test]
    fn test_reconfigure() {
        let (mut session, _rx) = session();
        session.bind();
        let subscription = quotes();
        session.subscribe(&subscription).unwrap();
        receive(&mut session, "SUBOK,1,2,2");
        session.take_outbox();

        subscription
            .set_requested_max_frequency(Some(MaxFrequency::Limited(3.0)))
            .unwrap();
        session.reconfigure(1);
        let outbox = session.take_outbox();
        assert_eq!(
            outbox[0].operation,
            ControlOperation::Reconf {
                subscription_id: 1,
                requested_max_frequency: "3".to_string()
            }
        );
    }

    #[test]
    fn test_decode_error_is_reported() {
        let (mut session, _rx) = session();
        session.bind();
        let subscription = quotes();
        session.subscribe(&subscription).unwrap();
        receive(&mut session, "SUBOK,1,2,2");
        let result = session.handle(ServerNotification::parse("U,1,5,a|b").unwrap());
        assert!(result.is_err());
    }

    #[test]
    fn test_two_level_command() {
        let (mut session, _rx) = session();
        session.bind();
        let portfolio = Subscription::new(
            SubscriptionMode::Command,
            strings(&["portfolio1"]),
            strings(&["key", "command", "qty"]),
        )
        .unwrap();
        portfolio
            .set_command_second_level_fields(strings(&["last_price"]))
            .unwrap();
        session.subscribe(&portfolio).unwrap();
        receive(&mut session, "SUBCMD,1,1,3,1,2");
        session.take_outbox();

        receive(&mut session, "U,1,1,item5|ADD|100");
        let outbox = session.take_outbox();
        assert_eq!(adds(&outbox), vec![(2, 2, "item5".to_string())]);

        receive(&mut session, "SUBOK,2,1,1");
        let notices = receive(&mut session, "U,2,1,20.5");
        match subscription_events(&notices).as_slice() {
            [SubscriptionEvent::ItemUpdate(update)] => {
                assert_eq!(update.get_value("last_price").unwrap(), Some("20.5"));
                assert_eq!(update.get_value("qty").unwrap(), Some("100"));
            }
            other => panic!("unexpected events {:?}", other),
        }

        let notices = receive(&mut session, "OV,2,1,3");
        assert!(matches!(
            subscription_events(&notices).as_slice(),
            [SubscriptionEvent::SecondLevelLostUpdates { lost_updates: 3, .. }]
        ));

        receive(&mut session, "U,1,1,item5|DELETE|");
        let outbox = session.take_outbox();
        assert_eq!(
            outbox[0].operation,
            ControlOperation::Delete { subscription_id: 2 }
        );
    }

    #[test]
    fn test_second_level_refused() {
        let (mut session, _rx) = session();
        session.bind();
        let portfolio = Subscription::new(
            SubscriptionMode::Command,
            strings(&["portfolio1"]),
            strings(&["key", "command", "qty"]),
        )
        .unwrap();
        portfolio
            .set_command_second_level_fields(strings(&["last_price"]))
            .unwrap();
        session.subscribe(&portfolio).unwrap();
        receive(&mut session, "SUBCMD,1,1,3,1,2");
        receive(&mut session, "U,1,1,item5|ADD|100");
        let notices = receive(&mut session, "REQERR,2,17,bad%20adapter");
        assert!(matches!(
            subscription_events(&notices).as_slice(),
            [SubscriptionEvent::SecondLevelError { code: 17, .. }]
        ));
    }

    fn device() -> MpnDevice {
        MpnDevice::new("token", "com.example.app", MpnPlatform::Google).unwrap()
    }

    fn alert() -> MpnSubscription {
        let mpn = MpnSubscription::new(
            SubscriptionMode::Merge,
            strings(&["item1"]),
            strings(&["last_price"]),
        )
        .unwrap();
        mpn.set_notification_format(r#"{"webpush":{"notification":{"body":"${last_price}"}}}"#)
            .unwrap();
        mpn
    }

    #[test]
    fn test_mpn_requires_a_device() {
        let (mut session, _rx) = session();
        assert!(matches!(session.subscribe_mpn(&alert(), false), Err(e) if e.is_illegal_state()));
        assert!(
            session
                .unsubscribe_mpn_subscriptions(MpnSubscriptionFilter::All)
                .unwrap_err()
                .is_illegal_state()
        );
    }

    #[test]
    fn test_mpn_registration_and_activation() {
        let (mut session, _rx) = session();
        let device = device();
        session.register_for_mpn(&device);
        let mpn = alert();
        let notices = session.subscribe_mpn(&mpn, true).unwrap();
        assert_eq!(
            mpn_events(&notices),
            vec![MpnSubscriptionEvent::StatusChanged(MpnSubscriptionStatus::Active, 0)]
        );
        assert_eq!(session.get_mpn_subscriptions(MpnSubscriptionFilter::All).len(), 1);

        session.bind();
        let outbox = session.take_outbox();
        assert!(matches!(
            outbox.as_slice(),
            [ControlRequest { operation: ControlOperation::MpnRegister { .. }, .. }]
        ));

        let notices = receive(&mut session, "MPNREG,dev-1,MPN_ADAPTER");
        assert!(notices.iter().any(|notice| matches!(notice, Notice::Device(_, _))));
        assert_eq!(device.get_status(), MpnDeviceStatus::Registered);
        let outbox = session.take_outbox();
        assert_eq!(
            adds(&outbox),
            vec![(2, 1, "DEV-dev-1".to_string()), (3, 2, "SUBS-dev-1".to_string())]
        );
        let activation = match &outbox[2].operation {
            ControlOperation::MpnActivate(activation) => activation.clone(),
            other => panic!("unexpected request {:?}", other),
        };
        assert_eq!(activation.device_id, "dev-1");
        assert!(activation.coalescing);

        let notices = receive(&mut session, &format!("MPNOK,{},SUB-A", activation.subscription_id));
        assert_eq!(mpn_events(&notices)[0], MpnSubscriptionEvent::Subscription);
        assert!(mpn.is_subscribed());
        assert!(session.find_mpn_subscription("SUB-A").unwrap().ptr_eq(&mpn));
        assert_eq!(
            adds(&session.take_outbox()),
            vec![(5, 4, "SUB-dev-1-SUB-A".to_string())]
        );

        // Status item of the subscription.
        receive(&mut session, "SUBOK,4,1,10");
        let notices = receive(&mut session, "U,4,1,TRIGGERED|1700000000000|#|#|#|#|#|#|#|#");
        assert!(mpn_events(&notices).contains(&MpnSubscriptionEvent::Triggered));
        assert!(mpn.is_triggered());
        assert_eq!(mpn.get_status_timestamp(), 1_700_000_000_000);
        assert_eq!(
            session.get_mpn_subscriptions(MpnSubscriptionFilter::Triggered).len(),
            1
        );

        session.unsubscribe_mpn(&mpn).unwrap();
        let outbox = session.take_outbox();
        assert_eq!(
            outbox[0].operation,
            ControlOperation::MpnDeactivate {
                device_id: "dev-1".to_string(),
                mpn_subscription_id: Some("SUB-A".to_string()),
                status_filter: None
            }
        );
        let notices = receive(&mut session, "MPNDEL,SUB-A");
        assert_eq!(mpn_events(&notices)[0], MpnSubscriptionEvent::Unsubscription);
        assert!(!mpn.is_active());
        assert!(session.find_mpn_subscription("SUB-A").is_none());
    }

    fn modifications(outbox: &[ControlRequest]) -> Vec<(Option<String>, Option<String>)> {
        outbox
            .iter()
            .filter_map(|request| match &request.operation {
                ControlOperation::MpnModify {
                    notification_format,
                    trigger,
                    ..
                } => Some((notification_format.clone(), trigger.clone())),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_mpn_format_change_survives_reconnection() {
        let (mut session, mut rx) = session();
        session.register_for_mpn(&device());
        session.bind();
        receive(&mut session, "MPNREG,dev-1,MPN_ADAPTER");
        session.take_outbox();

        let mpn = alert();
        session.subscribe_mpn(&mpn, false).unwrap();
        let activation = session.take_outbox()[0].request_id;
        receive(&mut session, &format!("MPNOK,{},SUB-A", activation));
        session.take_outbox();
        while rx.try_recv().is_ok() {}

        session.unbind();
        let format = r#"{"webpush":{"notification":{"body":"now ${last_price}"}}}"#;
        mpn.set_notification_format(format).unwrap();
        let Ok(SubscriptionRequest::ModifyMpn(mpn_id, property)) = rx.try_recv() else {
            panic!("format change not requested");
        };
        assert_eq!(mpn_id, "SUB-A");
        session.modify_mpn(&mpn_id, property);
        assert!(session.take_outbox().is_empty());

        session.bind();
        assert!(modifications(&session.take_outbox()).is_empty());
        receive(&mut session, "MPNREG,dev-1,MPN_ADAPTER");
        assert_eq!(
            modifications(&session.take_outbox()),
            vec![(Some(format.to_string()), None)]
        );
    }

    #[test]
    fn test_mpn_modification_in_flight_is_sent_again() {
        let (mut session, mut rx) = session();
        session.register_for_mpn(&device());
        session.bind();
        receive(&mut session, "MPNREG,dev-1,MPN_ADAPTER");
        session.take_outbox();

        let mpn = alert();
        session.subscribe_mpn(&mpn, false).unwrap();
        let activation = session.take_outbox()[0].request_id;
        receive(&mut session, &format!("MPNOK,{},SUB-A", activation));
        session.take_outbox();
        while rx.try_recv().is_ok() {}

        mpn.set_trigger_expression(Some("Double.parseDouble(${last_price}) > 10.0"))
            .unwrap();
        let Ok(SubscriptionRequest::ModifyMpn(mpn_id, property)) = rx.try_recv() else {
            panic!("trigger change not requested");
        };
        session.modify_mpn(&mpn_id, property);
        assert_eq!(modifications(&session.take_outbox()).len(), 1);

        // The session drops before the server answers.
        session.unbind();
        session.bind();
        receive(&mut session, "MPNREG,dev-1,MPN_ADAPTER");
        assert_eq!(
            modifications(&session.take_outbox()),
            vec![(None, Some("Double.parseDouble(${last_price}) > 10.0".to_string()))]
        );
    }

    #[test]
    fn test_mpn_activation_refused() {
        let (mut session, _rx) = session();
        session.register_for_mpn(&device());
        session.bind();
        receive(&mut session, "MPNREG,dev-1,MPN_ADAPTER");
        session.take_outbox();

        let mpn = alert();
        session.subscribe_mpn(&mpn, false).unwrap();
        let outbox = session.take_outbox();
        let request_id = outbox[0].request_id;
        let notices = receive(&mut session, &format!("REQERR,{},52,bad%20format", request_id));
        assert!(matches!(
            mpn_events(&notices).as_slice(),
            [MpnSubscriptionEvent::SubscriptionError { code: 52, .. }, MpnSubscriptionEvent::StatusChanged(MpnSubscriptionStatus::Unknown, _)]
        ));
        assert!(!mpn.is_active());
    }

    #[test]
    fn test_persisted_mpn_subscriptions_are_discovered() {
        let (mut session, _rx) = session();
        let device = device();
        session.register_for_mpn(&device);
        session.bind();
        receive(&mut session, "MPNREG,dev-1,MPN_ADAPTER");
        session.take_outbox();

        receive(&mut session, "SUBOK,1,1,2");
        receive(&mut session, "SUBCMD,2,1,2,1,2");
        receive(&mut session, "U,2,1,SUB-X|ADD");
        assert!(session.find_mpn_subscription("SUB-X").is_some());
        assert_eq!(
            adds(&session.take_outbox()),
            vec![(4, 3, "SUB-dev-1-SUB-X".to_string())]
        );

        let notices = receive(&mut session, "EOS,2,1");
        assert!(notices.iter().any(|notice| matches!(
            notice,
            Notice::Device(_, events) if events == &vec![MpnDeviceEvent::SubscriptionsUpdated]
        )));

        let notices = receive(&mut session, "U,1,1,SUSPENDED|1000");
        assert!(notices.iter().any(|notice| matches!(notice, Notice::Device(_, _))));
        assert!(device.is_suspended());

        receive(&mut session, "U,2,1,SUB-X|DELETE");
        assert!(session.find_mpn_subscription("SUB-X").is_none());
    }
}
