/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 18/10/26
******************************************************************************/
use crate::client::SubscriptionRequest;
use crate::mpn::builder::{check_placeholders, parse_format};
use crate::mpn::listener::{MpnSubscriptionEvent, MpnSubscriptionListener};
use crate::mpn::MpnSubscriptionStatus;
use crate::protocol::ActivateMpn;
use crate::subscription::{BufferSize, MaxFrequency, Subscription, SubscriptionMode, is_valid_item_name};
use crate::utils::LightstreamerError;
use std::collections::HashMap;
use std::fmt::{self, Debug, Formatter};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, warn};

type SharedListener = Arc<Mutex<Box<dyn MpnSubscriptionListener>>>;

const NOTIFICATION_FORMAT: &str = "notification_format";
const TRIGGER: &str = "trigger";

pub(crate) struct MpnSubscriptionInner {
    /// Unknown for a subscription found on the server until its status item reports it.
    mode: Option<SubscriptionMode>,
    items: Option<Vec<String>>,
    item_group: Option<String>,
    fields: Option<Vec<String>>,
    field_schema: Option<String>,
    data_adapter: Option<String>,
    requested_buffer_size: Option<BufferSize>,
    requested_max_frequency: Option<MaxFrequency>,
    notification_format: Option<String>,
    trigger_expression: Option<String>,
    actual_notification_format: Option<String>,
    actual_trigger_expression: Option<String>,
    status: MpnSubscriptionStatus,
    status_timestamp: u64,
    subscription_id: Option<String>,
    binding: Option<UnboundedSender<SubscriptionRequest>>,
    listeners: Vec<SharedListener>,
}

impl MpnSubscriptionInner {
    fn ensure_inactive(&self, property: &str) -> Result<(), LightstreamerError> {
        if self.status == MpnSubscriptionStatus::Unknown {
            Ok(())
        } else {
            Err(LightstreamerError::illegal_state(format!(
                "cannot change {} of an active MPN subscription",
                property
            )))
        }
    }

    fn group(&self) -> String {
        match (&self.items, &self.item_group) {
            (Some(items), _) => items.join(" "),
            (None, Some(group)) => group.clone(),
            (None, None) => String::new(),
        }
    }

    fn schema(&self) -> String {
        match (&self.fields, &self.field_schema) {
            (Some(fields), _) => fields.join(" "),
            (None, Some(schema)) => schema.clone(),
            (None, None) => String::new(),
        }
    }

    /// Moves forward to `target` one status at a time.
    fn advance(&mut self, target: MpnSubscriptionStatus, timestamp: u64) -> Vec<MpnSubscriptionEvent> {
        let mut events = Vec::new();
        while self.status < target {
            let Some(next) = self.status.next() else {
                break;
            };
            self.status = next;
            self.status_timestamp = timestamp;
            match next {
                MpnSubscriptionStatus::Subscribed => events.push(MpnSubscriptionEvent::Subscription),
                MpnSubscriptionStatus::Triggered => events.push(MpnSubscriptionEvent::Triggered),
                _ => {}
            }
            events.push(MpnSubscriptionEvent::StatusChanged(next, timestamp));
        }
        events
    }

    fn send(&self, request: SubscriptionRequest) {
        if let Some(binding) = &self.binding {
            if binding.send(request).is_err() {
                warn!("client loop not running, MPN modification dropped");
            }
        }
    }
}

/// A subscription whose updates are delivered as push notifications to an
/// [`MpnDevice`](crate::mpn::MpnDevice), even when the application is not connected.
///
/// It is persisted on the server: once subscribed it has a permanent id and survives the
/// session. Like [`Subscription`], it is a handle whose clones share the same state.
#[derive(Clone)]
pub struct MpnSubscription {
    inner: Arc<Mutex<MpnSubscriptionInner>>,
}

impl Debug for MpnSubscription {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let inner = self.lock();
        f.debug_struct("MpnSubscription")
            .field("mode", &inner.mode)
            .field("items", &inner.items)
            .field("item_group", &inner.item_group)
            .field("fields", &inner.fields)
            .field("field_schema", &inner.field_schema)
            .field("status", &inner.status)
            .field("subscription_id", &inner.subscription_id)
            .finish()
    }
}

fn validate_names(names: &[String], item: bool) -> Result<(), LightstreamerError> {
    if names.is_empty() {
        return Err(LightstreamerError::illegal_argument("name list is empty"));
    }
    let invalid = names.iter().find(|name| {
        if item {
            !is_valid_item_name(name)
        } else {
            name.is_empty() || name.chars().any(char::is_whitespace)
        }
    });
    match invalid {
        Some(name) => Err(LightstreamerError::illegal_argument(format!(
            "invalid name '{}'",
            name
        ))),
        None => Ok(()),
    }
}

impl MpnSubscription {
    /// Creates an MPN subscription.
    ///
    /// # Errors
    ///
    /// Illegal argument for a mode other than MERGE or DISTINCT, an empty list, or an invalid
    /// item or field name.
    pub fn new(
        mode: SubscriptionMode,
        items: Option<Vec<String>>,
        fields: Option<Vec<String>>,
    ) -> Result<MpnSubscription, LightstreamerError> {
        if !matches!(mode, SubscriptionMode::Merge | SubscriptionMode::Distinct) {
            return Err(LightstreamerError::illegal_argument(format!(
                "mode {} not available for MPN subscriptions",
                mode
            )));
        }
        if let Some(items) = &items {
            validate_names(items, true)?;
        }
        if let Some(fields) = &fields {
            validate_names(fields, false)?;
        }
        Ok(Self::with_inner(Some(mode), items, fields))
    }

    fn with_inner(
        mode: Option<SubscriptionMode>,
        items: Option<Vec<String>>,
        fields: Option<Vec<String>>,
    ) -> MpnSubscription {
        MpnSubscription {
            inner: Arc::new(Mutex::new(MpnSubscriptionInner {
                mode,
                items,
                item_group: None,
                fields,
                field_schema: None,
                data_adapter: None,
                requested_buffer_size: None,
                requested_max_frequency: None,
                notification_format: None,
                trigger_expression: None,
                actual_notification_format: None,
                actual_trigger_expression: None,
                status: MpnSubscriptionStatus::Unknown,
                status_timestamp: 0,
                subscription_id: None,
                binding: None,
                listeners: Vec::new(),
            })),
        }
    }

    /// Copies items, fields, data adapter, buffer size and frequency of a real-time
    /// subscription. An unfiltered frequency is not carried over.
    ///
    /// # Errors
    ///
    /// Illegal argument if the subscription mode is not MERGE or DISTINCT.
    pub fn from_subscription(subscription: &Subscription) -> Result<MpnSubscription, LightstreamerError> {
        let mpn = Self::new(subscription.get_mode(), None, None)?;
        {
            let mut inner = mpn.lock();
            inner.items = subscription.get_items().ok().flatten();
            inner.item_group = subscription.get_item_group().ok().flatten();
            inner.fields = subscription.get_fields().ok().flatten();
            inner.field_schema = subscription.get_field_schema().ok().flatten();
            inner.data_adapter = subscription.get_data_adapter();
            inner.requested_buffer_size = subscription.get_requested_buffer_size();
            inner.requested_max_frequency = subscription
                .get_requested_max_frequency()
                .filter(|frequency| *frequency != MaxFrequency::Unfiltered);
        }
        Ok(mpn)
    }

    /// A subscription found on the server, not created by this application.
    pub(crate) fn persisted(subscription_id: &str) -> MpnSubscription {
        let mpn = Self::with_inner(None, None, None);
        mpn.lock().subscription_id = Some(subscription_id.to_string());
        mpn
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, MpnSubscriptionInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn ptr_eq(&self, other: &MpnSubscription) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn add_listener(&self, mut listener: Box<dyn MpnSubscriptionListener>) {
        listener.on_listen_start();
        self.lock().listeners.push(Arc::new(Mutex::new(listener)));
    }

    /// # Errors
    ///
    /// Illegal argument if there is no listener at `index`.
    pub fn remove_listener(&self, index: usize) -> Result<(), LightstreamerError> {
        let removed = {
            let mut inner = self.lock();
            if index >= inner.listeners.len() {
                return Err(LightstreamerError::illegal_argument(format!(
                    "no listener at index {}",
                    index
                )));
            }
            inner.listeners.remove(index)
        };
        removed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .on_listen_end();
        Ok(())
    }

    pub fn get_listeners(&self) -> usize {
        self.lock().listeners.len()
    }

    /// `None` for a subscription found on the server whose mode was not reported yet.
    pub fn get_mode(&self) -> Option<SubscriptionMode> {
        self.lock().mode
    }

    pub fn get_items(&self) -> Option<Vec<String>> {
        self.lock().items.clone()
    }

    /// # Errors
    ///
    /// Illegal state while active; illegal argument for an empty list or an invalid name.
    pub fn set_items(&self, items: Option<Vec<String>>) -> Result<(), LightstreamerError> {
        let mut inner = self.lock();
        inner.ensure_inactive("items")?;
        if let Some(items) = &items {
            validate_names(items, true)?;
            inner.item_group = None;
        }
        inner.items = items;
        Ok(())
    }

    pub fn get_item_group(&self) -> Option<String> {
        self.lock().item_group.clone()
    }

    /// Sets the item group, replacing the item list.
    ///
    /// # Errors
    ///
    /// Illegal state while active.
    pub fn set_item_group(&self, group: Option<String>) -> Result<(), LightstreamerError> {
        let mut inner = self.lock();
        inner.ensure_inactive("item group")?;
        if group.is_some() {
            inner.items = None;
        }
        inner.item_group = group;
        Ok(())
    }

    pub fn get_fields(&self) -> Option<Vec<String>> {
        self.lock().fields.clone()
    }

    /// # Errors
    ///
    /// Illegal state while active; illegal argument for an empty list or an invalid name.
    pub fn set_fields(&self, fields: Option<Vec<String>>) -> Result<(), LightstreamerError> {
        let mut inner = self.lock();
        inner.ensure_inactive("fields")?;
        if let Some(fields) = &fields {
            validate_names(fields, false)?;
            inner.field_schema = None;
        }
        inner.fields = fields;
        Ok(())
    }

    pub fn get_field_schema(&self) -> Option<String> {
        self.lock().field_schema.clone()
    }

    /// Sets the field schema, replacing the field list.
    ///
    /// # Errors
    ///
    /// Illegal state while active.
    pub fn set_field_schema(&self, schema: Option<String>) -> Result<(), LightstreamerError> {
        let mut inner = self.lock();
        inner.ensure_inactive("field schema")?;
        if schema.is_some() {
            inner.fields = None;
        }
        inner.field_schema = schema;
        Ok(())
    }

    pub fn get_data_adapter(&self) -> Option<String> {
        self.lock().data_adapter.clone()
    }

    /// # Errors
    ///
    /// Illegal state while active.
    pub fn set_data_adapter(&self, data_adapter: Option<String>) -> Result<(), LightstreamerError> {
        let mut inner = self.lock();
        inner.ensure_inactive("data adapter")?;
        inner.data_adapter = data_adapter;
        Ok(())
    }

    pub fn get_requested_buffer_size(&self) -> Option<BufferSize> {
        self.lock().requested_buffer_size
    }

    /// # Errors
    ///
    /// Illegal state while active; illegal argument for a size of zero.
    pub fn set_requested_buffer_size(&self, size: Option<BufferSize>) -> Result<(), LightstreamerError> {
        let mut inner = self.lock();
        inner.ensure_inactive("requested buffer size")?;
        if size == Some(BufferSize::Size(0)) {
            return Err(LightstreamerError::illegal_argument(
                "buffer size must be greater than zero",
            ));
        }
        inner.requested_buffer_size = size;
        Ok(())
    }

    pub fn get_requested_max_frequency(&self) -> Option<MaxFrequency> {
        self.lock().requested_max_frequency
    }

    /// # Errors
    ///
    /// Illegal state while active; illegal argument for `Unfiltered` or a limit that is not a
    /// positive number.
    pub fn set_requested_max_frequency(
        &self,
        frequency: Option<MaxFrequency>,
    ) -> Result<(), LightstreamerError> {
        let mut inner = self.lock();
        inner.ensure_inactive("requested max frequency")?;
        match frequency {
            Some(MaxFrequency::Unfiltered) => {
                return Err(LightstreamerError::illegal_argument(
                    "unfiltered frequency not available for MPN subscriptions",
                ));
            }
            Some(MaxFrequency::Limited(limit)) if !(limit.is_finite() && limit > 0.0) => {
                return Err(LightstreamerError::illegal_argument(format!(
                    "invalid max frequency {}",
                    limit
                )));
            }
            _ => {}
        }
        inner.requested_max_frequency = frequency;
        Ok(())
    }

    /// The notification format requested by the application.
    pub fn get_notification_format(&self) -> Option<String> {
        self.lock().notification_format.clone()
    }

    /// Sets the JSON payload of the notifications. See [`FirebaseMpnBuilder`] and
    /// [`SafariMpnBuilder`] to write one.
    ///
    /// On a subscribed subscription the change is sent to the server; the actual format is
    /// updated once the server applies it.
    ///
    /// # Errors
    ///
    /// Illegal argument if the format is not a JSON object or references an unknown field;
    /// illegal state while the activation is pending.
    ///
    /// [`FirebaseMpnBuilder`]: crate::mpn::FirebaseMpnBuilder
    /// [`SafariMpnBuilder`]: crate::mpn::SafariMpnBuilder
    pub fn set_notification_format(&self, format: &str) -> Result<(), LightstreamerError> {
        let mut inner = self.lock();
        parse_format(format)?;
        check_placeholders(format, inner.fields.as_deref())?;
        self.apply_modification(&mut inner, NOTIFICATION_FORMAT, |inner| {
            inner.notification_format = Some(format.to_string())
        })
    }

    /// The trigger expression requested by the application.
    pub fn get_trigger_expression(&self) -> Option<String> {
        self.lock().trigger_expression.clone()
    }

    /// Sets the boolean expression, evaluated by the server on each update, that sends the
    /// notification once when true, e.g. `Double.parseDouble(${last_price}) > 10.0`. `None`
    /// sends a notification on every update.
    ///
    /// # Errors
    ///
    /// Illegal argument for an empty expression or one referencing an unknown field; illegal
    /// state while the activation is pending.
    pub fn set_trigger_expression(&self, trigger: Option<&str>) -> Result<(), LightstreamerError> {
        let mut inner = self.lock();
        if let Some(trigger) = trigger {
            if trigger.trim().is_empty() {
                return Err(LightstreamerError::illegal_argument("trigger expression is empty"));
            }
            check_placeholders(trigger, inner.fields.as_deref())?;
        }
        self.apply_modification(&mut inner, TRIGGER, |inner| {
            inner.trigger_expression = trigger.map(str::to_string)
        })
    }

    fn apply_modification(
        &self,
        inner: &mut MpnSubscriptionInner,
        property: &'static str,
        apply: impl FnOnce(&mut MpnSubscriptionInner),
    ) -> Result<(), LightstreamerError> {
        match (inner.status, inner.subscription_id.clone()) {
            (MpnSubscriptionStatus::Unknown, _) => {
                apply(inner);
                Ok(())
            }
            (MpnSubscriptionStatus::Active, _) | (_, None) => Err(LightstreamerError::illegal_state(
                format!("cannot change {} while the activation is pending", property),
            )),
            (_, Some(id)) => {
                apply(inner);
                debug!("requesting {} change for MPN subscription {}", property, id);
                inner.send(SubscriptionRequest::ModifyMpn(id, property));
                Ok(())
            }
        }
    }

    /// Notification format in use on the server.
    pub fn get_actual_notification_format(&self) -> Option<String> {
        self.lock().actual_notification_format.clone()
    }

    /// Trigger expression in use on the server.
    pub fn get_actual_trigger_expression(&self) -> Option<String> {
        self.lock().actual_trigger_expression.clone()
    }

    pub fn get_status(&self) -> MpnSubscriptionStatus {
        self.lock().status
    }

    /// Server time of the last status change, in milliseconds since the epoch.
    pub fn get_status_timestamp(&self) -> u64 {
        self.lock().status_timestamp
    }

    /// Permanent id assigned by the server.
    pub fn get_subscription_id(&self) -> Option<String> {
        self.lock().subscription_id.clone()
    }

    /// Whether the subscription was submitted and not unsubscribed.
    pub fn is_active(&self) -> bool {
        self.lock().status != MpnSubscriptionStatus::Unknown
    }

    /// Whether the server confirmed the subscription, triggered or not.
    pub fn is_subscribed(&self) -> bool {
        matches!(
            self.lock().status,
            MpnSubscriptionStatus::Subscribed | MpnSubscriptionStatus::Triggered
        )
    }

    pub fn is_triggered(&self) -> bool {
        self.lock().status == MpnSubscriptionStatus::Triggered
    }

    // ---- client side ----

    /// Checks what the server needs and moves to ACTIVE.
    pub(crate) fn activate(
        &self,
        binding: UnboundedSender<SubscriptionRequest>,
    ) -> Result<Vec<MpnSubscriptionEvent>, LightstreamerError> {
        let mut inner = self.lock();
        if inner.status != MpnSubscriptionStatus::Unknown {
            return Err(LightstreamerError::illegal_state(
                "MPN subscription is already active",
            ));
        }
        if inner.mode.is_none() {
            return Err(LightstreamerError::illegal_argument("mode is not known"));
        }
        if inner.items.is_none() && inner.item_group.is_none() {
            return Err(LightstreamerError::illegal_argument(
                "items or item group must be set",
            ));
        }
        if inner.fields.is_none() && inner.field_schema.is_none() {
            return Err(LightstreamerError::illegal_argument(
                "fields or field schema must be set",
            ));
        }
        if inner.notification_format.is_none() {
            return Err(LightstreamerError::illegal_argument(
                "notification format must be set",
            ));
        }
        inner.binding = Some(binding);
        Ok(inner.advance(MpnSubscriptionStatus::Active, 0))
    }

    pub(crate) fn activate_request(
        &self,
        local_id: usize,
        device_id: &str,
        coalescing: bool,
    ) -> ActivateMpn {
        let inner = self.lock();
        ActivateMpn {
            subscription_id: local_id,
            mode: inner.mode.map(|mode| mode.to_string()).unwrap_or_default(),
            group: inner.group(),
            schema: inner.schema(),
            data_adapter: inner.data_adapter.clone(),
            requested_buffer_size: inner.requested_buffer_size.map(|size| size.to_string()),
            requested_max_frequency: inner
                .requested_max_frequency
                .map(|frequency| frequency.to_string()),
            device_id: device_id.to_string(),
            notification_format: inner.notification_format.clone().unwrap_or_default(),
            trigger: inner.trigger_expression.clone(),
            coalescing,
        }
    }

    /// `MPNOK` received.
    pub(crate) fn confirm(&self, subscription_id: &str) -> Vec<MpnSubscriptionEvent> {
        let mut inner = self.lock();
        inner.subscription_id = Some(subscription_id.to_string());
        inner.actual_notification_format = inner.notification_format.clone();
        inner.actual_trigger_expression = inner.trigger_expression.clone();
        let timestamp = inner.status_timestamp;
        inner.advance(MpnSubscriptionStatus::Subscribed, timestamp)
    }

    /// The activation was refused.
    pub(crate) fn refuse(&self, code: i32, message: &str) -> Vec<MpnSubscriptionEvent> {
        let mut inner = self.lock();
        inner.binding = None;
        let mut events = vec![MpnSubscriptionEvent::SubscriptionError {
            code,
            message: (!message.is_empty()).then(|| message.to_string()),
        }];
        if inner.status != MpnSubscriptionStatus::Unknown {
            inner.status = MpnSubscriptionStatus::Unknown;
            events.push(MpnSubscriptionEvent::StatusChanged(
                MpnSubscriptionStatus::Unknown,
                inner.status_timestamp,
            ));
        }
        events
    }

    /// The subscription was deactivated on the server.
    pub(crate) fn reset(&self) -> Vec<MpnSubscriptionEvent> {
        let mut inner = self.lock();
        if inner.status == MpnSubscriptionStatus::Unknown {
            return Vec::new();
        }
        inner.status = MpnSubscriptionStatus::Unknown;
        inner.binding = None;
        inner.subscription_id = None;
        vec![
            MpnSubscriptionEvent::Unsubscription,
            MpnSubscriptionEvent::StatusChanged(MpnSubscriptionStatus::Unknown, inner.status_timestamp),
        ]
    }

    /// A persisted subscription found on the server starts directly from its server status.
    pub(crate) fn bind_persisted(&self, binding: UnboundedSender<SubscriptionRequest>) {
        self.lock().binding = Some(binding);
    }

    /// Applies the state published on the status item of the subscription.
    pub(crate) fn apply_server_state(
        &self,
        changed: &HashMap<String, Option<String>>,
    ) -> Vec<MpnSubscriptionEvent> {
        let mut inner = self.lock();
        let mut events = Vec::new();
        let value = |name: &str| changed.get(name).cloned().flatten();

        if let Some(timestamp) = value("status_timestamp").and_then(|t| t.parse::<u64>().ok()) {
            inner.status_timestamp = timestamp;
        }
        if let Some(mode) = value("mode").and_then(|m| m.parse::<SubscriptionMode>().ok()) {
            if inner.mode != Some(mode) {
                inner.mode = Some(mode);
                events.push(MpnSubscriptionEvent::PropertyChanged("mode"));
            }
        }
        if let Some(group) = value("group") {
            if inner.group() != group {
                inner.items = None;
                inner.item_group = Some(group);
                events.push(MpnSubscriptionEvent::PropertyChanged("group"));
            }
        }
        if let Some(schema) = value("schema") {
            if inner.schema() != schema {
                inner.fields = None;
                inner.field_schema = Some(schema);
                events.push(MpnSubscriptionEvent::PropertyChanged("schema"));
            }
        }
        if changed.contains_key("adapter") {
            let adapter = value("adapter");
            if inner.data_adapter != adapter {
                inner.data_adapter = adapter;
                events.push(MpnSubscriptionEvent::PropertyChanged("adapter"));
            }
        }
        if let Some(size) = value("requested_buffer_size") {
            let size = match size.as_str() {
                "unlimited" => Some(BufferSize::Unlimited),
                other => other.parse().ok().map(BufferSize::Size),
            };
            if size.is_some() && size != inner.requested_buffer_size {
                inner.requested_buffer_size = size;
                events.push(MpnSubscriptionEvent::PropertyChanged("requested_buffer_size"));
            }
        }
        if let Some(frequency) = value("requested_max_frequency") {
            let frequency = match frequency.as_str() {
                "unlimited" => Some(MaxFrequency::Unlimited),
                other => other.parse().ok().map(MaxFrequency::Limited),
            };
            if frequency.is_some() && frequency != inner.requested_max_frequency {
                inner.requested_max_frequency = frequency;
                events.push(MpnSubscriptionEvent::PropertyChanged("requested_max_frequency"));
            }
        }
        if changed.contains_key(NOTIFICATION_FORMAT) {
            let format = value(NOTIFICATION_FORMAT);
            if inner.actual_notification_format != format {
                if inner.notification_format.is_none() {
                    inner.notification_format = format.clone();
                }
                inner.actual_notification_format = format;
                events.push(MpnSubscriptionEvent::PropertyChanged(NOTIFICATION_FORMAT));
            }
        }
        if changed.contains_key(TRIGGER) {
            let trigger = value(TRIGGER);
            if inner.actual_trigger_expression != trigger {
                if inner.trigger_expression.is_none() {
                    inner.trigger_expression = trigger.clone();
                }
                inner.actual_trigger_expression = trigger;
                events.push(MpnSubscriptionEvent::PropertyChanged(TRIGGER));
            }
        }
        if let Some(status) = value("status").and_then(|s| MpnSubscriptionStatus::from_server(&s)) {
            let timestamp = inner.status_timestamp;
            events.extend(inner.advance(status, timestamp));
        }
        events
    }

    /// Parameters of a `pn_reconf` for `property`: the requested format or trigger.
    pub(crate) fn modification(&self, property: &str) -> (Option<String>, Option<String>) {
        let inner = self.lock();
        if property == NOTIFICATION_FORMAT {
            (inner.notification_format.clone(), None)
        } else {
            // An empty trigger removes it.
            (None, Some(inner.trigger_expression.clone().unwrap_or_default()))
        }
    }

    /// The server refused a change: the requested value goes back to the actual one.
    pub(crate) fn modification_failed(
        &self,
        property: &'static str,
        code: i32,
        message: &str,
    ) -> Vec<MpnSubscriptionEvent> {
        let mut inner = self.lock();
        if property == NOTIFICATION_FORMAT {
            inner.notification_format = inner.actual_notification_format.clone();
        } else {
            inner.trigger_expression = inner.actual_trigger_expression.clone();
        }
        vec![MpnSubscriptionEvent::ModificationError {
            code,
            message: (!message.is_empty()).then(|| message.to_string()),
            property,
        }]
    }

    pub(crate) fn unsubscription_failed(&self, code: i32, message: &str) -> Vec<MpnSubscriptionEvent> {
        vec![MpnSubscriptionEvent::UnsubscriptionError {
            code,
            message: (!message.is_empty()).then(|| message.to_string()),
        }]
    }

    pub(crate) fn dispatch(&self, events: &[MpnSubscriptionEvent]) {
        if events.is_empty() {
            return;
        }
        let listeners = self.lock().listeners.clone();
        for event in events {
            for listener in &listeners {
                let mut listener = listener.lock().unwrap_or_else(PoisonError::into_inner);
                event.deliver(&mut **listener);
            }
        }
    }
}
