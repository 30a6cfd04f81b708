/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 18/10/26
******************************************************************************/
use crate::client::SubscriptionRequest;
use crate::protocol::AddSubscription;
use crate::subscription::item_update::Locator;
use crate::subscription::listener::{SubscriptionEvent, SubscriptionListener};
use crate::subscription::state::{Delivery, DeliveryConfig, DeliveryState};
use crate::utils::LightstreamerError;
use std::fmt::{self, Debug, Display, Formatter};
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, warn};

/// The delivery mode of a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubscriptionMode {
    /// The latest value of every field, with updates possibly merged.
    Merge,
    /// Every update is an event on its own, e.g. a news feed.
    Distinct,
    /// Updates delivered unfiltered, without snapshot.
    Raw,
    /// The item is a table of rows identified by the "key" field and changed through the
    /// ADD, UPDATE and DELETE values of the "command" field.
    Command,
}

impl Display for SubscriptionMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            SubscriptionMode::Merge => write!(f, "MERGE"),
            SubscriptionMode::Distinct => write!(f, "DISTINCT"),
            SubscriptionMode::Raw => write!(f, "RAW"),
            SubscriptionMode::Command => write!(f, "COMMAND"),
        }
    }
}

impl FromStr for SubscriptionMode {
    type Err = LightstreamerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "MERGE" => Ok(SubscriptionMode::Merge),
            "DISTINCT" => Ok(SubscriptionMode::Distinct),
            "RAW" => Ok(SubscriptionMode::Raw),
            "COMMAND" => Ok(SubscriptionMode::Command),
            other => Err(LightstreamerError::illegal_argument(format!(
                "unknown subscription mode '{}'",
                other
            ))),
        }
    }
}

/// Snapshot request of a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Snapshot {
    /// The snapshot is requested.
    Yes,
    /// No snapshot.
    No,
    /// Only the last `n` events of the snapshot (DISTINCT mode only).
    Number(usize),
}

impl Display for Snapshot {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Snapshot::Yes => write!(f, "true"),
            Snapshot::No => write!(f, "false"),
            Snapshot::Number(n) => write!(f, "{}", n),
        }
    }
}

/// Length of the buffer the server keeps for each item of a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferSize {
    Unlimited,
    Size(usize),
}

impl Display for BufferSize {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            BufferSize::Unlimited => write!(f, "unlimited"),
            BufferSize::Size(size) => write!(f, "{}", size),
        }
    }
}

/// Maximum update frequency of the items of a subscription, in updates per second.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MaxFrequency {
    /// No limit other than the bandwidth.
    Unlimited,
    /// Unfiltered delivery: no update is merged or dropped.
    Unfiltered,
    Limited(f64),
}

impl Display for MaxFrequency {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            MaxFrequency::Unlimited => write!(f, "unlimited"),
            MaxFrequency::Unfiltered => write!(f, "unfiltered"),
            MaxFrequency::Limited(frequency) => write!(f, "{}", frequency),
        }
    }
}

/// Item names must be non-empty, contain no spaces and not be a number.
pub(crate) fn is_valid_item_name(name: &str) -> bool {
    !name.is_empty()
        && !name.chars().any(char::is_whitespace)
        && !name.chars().all(|c| c.is_ascii_digit())
}

fn is_valid_field_name(name: &str) -> bool {
    !name.is_empty() && !name.chars().any(char::is_whitespace)
}

fn validate_items(items: &[String]) -> Result<(), LightstreamerError> {
    if items.is_empty() {
        return Err(LightstreamerError::illegal_argument("item list is empty"));
    }
    match items.iter().find(|item| !is_valid_item_name(item)) {
        Some(item) => Err(LightstreamerError::illegal_argument(format!(
            "invalid item name '{}'",
            item
        ))),
        None => Ok(()),
    }
}

fn validate_fields(fields: &[String]) -> Result<(), LightstreamerError> {
    if fields.is_empty() {
        return Err(LightstreamerError::illegal_argument("field list is empty"));
    }
    match fields.iter().find(|field| !is_valid_field_name(field)) {
        Some(field) => Err(LightstreamerError::illegal_argument(format!(
            "invalid field name '{}'",
            field
        ))),
        None => Ok(()),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Phase {
    Inactive,
    Active,
    Subscribed,
}

type SharedListener = Arc<Mutex<Box<dyn SubscriptionListener>>>;

pub(crate) struct SubscriptionInner {
    mode: SubscriptionMode,
    items: Option<Vec<String>>,
    item_group: Option<String>,
    fields: Option<Vec<String>>,
    field_schema: Option<String>,
    data_adapter: Option<String>,
    selector: Option<String>,
    requested_buffer_size: Option<BufferSize>,
    requested_snapshot: Option<Snapshot>,
    requested_max_frequency: Option<MaxFrequency>,
    second_level_fields: Option<Vec<String>>,
    second_level_field_schema: Option<String>,
    second_level_data_adapter: Option<String>,
    listeners: Vec<SharedListener>,
    phase: Phase,
    id: Option<usize>,
    binding: Option<UnboundedSender<SubscriptionRequest>>,
    state: Option<DeliveryState>,
    real_max_frequency: Option<MaxFrequency>,
}

impl SubscriptionInner {
    fn ensure_inactive(&self, property: &str) -> Result<(), LightstreamerError> {
        if self.phase == Phase::Inactive {
            Ok(())
        } else {
            Err(LightstreamerError::illegal_state(format!(
                "cannot change {} of an active subscription",
                property
            )))
        }
    }

    fn ensure_command(&self, property: &str) -> Result<(), LightstreamerError> {
        if self.mode == SubscriptionMode::Command {
            Ok(())
        } else {
            Err(LightstreamerError::illegal_state(format!(
                "{} is only available in COMMAND mode",
                property
            )))
        }
    }

    fn is_two_level(&self) -> bool {
        self.mode == SubscriptionMode::Command
            && (self.second_level_fields.is_some() || self.second_level_field_schema.is_some())
    }

    fn snapshot_requested(&self) -> bool {
        match self.requested_snapshot {
            None => self.mode != SubscriptionMode::Raw,
            Some(Snapshot::No) => false,
            Some(_) => true,
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

    fn second_level_schema(&self) -> String {
        match (&self.second_level_fields, &self.second_level_field_schema) {
            (Some(fields), _) => fields.join(" "),
            (None, Some(schema)) => schema.clone(),
            (None, None) => String::new(),
        }
    }

    fn frequency_parameter(&self) -> Option<String> {
        if self.mode == SubscriptionMode::Raw {
            return None;
        }
        self.requested_max_frequency.map(|frequency| frequency.to_string())
    }
}

/// Describes a subscription to a group of items: the items, the fields and the delivery
/// policy. The server pushes updates for it once it is passed to
/// `LightstreamerClient::subscribe`.
///
/// A `Subscription` is a handle: clones share the same state, so the application can keep a
/// clone to query values and unsubscribe while the client delivers updates to it.
///
/// Properties can be changed only while the subscription is inactive, with the exception of
/// the requested max frequency.
#[derive(Clone)]
pub struct Subscription {
    inner: Arc<Mutex<SubscriptionInner>>,
}

impl Debug for Subscription {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let inner = self.lock();
        f.debug_struct("Subscription")
            .field("mode", &inner.mode)
            .field("items", &inner.items)
            .field("item_group", &inner.item_group)
            .field("fields", &inner.fields)
            .field("field_schema", &inner.field_schema)
            .field("data_adapter", &inner.data_adapter)
            .field("phase", &inner.phase)
            .field("id", &inner.id)
            .finish()
    }
}

impl Subscription {
    /// Creates a subscription.
    ///
    /// # Parameters
    ///
    /// - `mode`: the subscription mode.
    /// - `items`: the item list, or `None` to set an item group later.
    /// - `fields`: the field list, or `None` to set a field schema later.
    ///
    /// # Errors
    ///
    /// Illegal argument if a list is empty or contains an invalid name: names cannot be empty
    /// or contain spaces, and item names cannot be numbers.
    pub fn new(
        mode: SubscriptionMode,
        items: Option<Vec<String>>,
        fields: Option<Vec<String>>,
    ) -> Result<Subscription, LightstreamerError> {
        if let Some(items) = &items {
            validate_items(items)?;
        }
        if let Some(fields) = &fields {
            validate_fields(fields)?;
        }
        Ok(Subscription {
            inner: Arc::new(Mutex::new(SubscriptionInner {
                mode,
                items,
                item_group: None,
                fields,
                field_schema: None,
                data_adapter: None,
                selector: None,
                requested_buffer_size: None,
                requested_snapshot: None,
                requested_max_frequency: None,
                second_level_fields: None,
                second_level_field_schema: None,
                second_level_data_adapter: None,
                listeners: Vec::new(),
                phase: Phase::Inactive,
                id: None,
                binding: None,
                state: None,
                real_max_frequency: None,
            })),
        })
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, SubscriptionInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn ptr_eq(&self, other: &Subscription) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Adds a listener; `on_listen_start` is called on it first.
    pub fn add_listener(&self, mut listener: Box<dyn SubscriptionListener>) {
        listener.on_listen_start();
        self.lock().listeners.push(Arc::new(Mutex::new(listener)));
    }

    /// Removes the listener at `index` (in insertion order); `on_listen_end` is called on it.
    ///
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

    /// Number of listeners currently attached.
    pub fn get_listeners(&self) -> usize {
        self.lock().listeners.len()
    }

    pub fn get_mode(&self) -> SubscriptionMode {
        self.lock().mode
    }

    /// # Errors
    ///
    /// Illegal state if the subscription was configured with an item group.
    pub fn get_items(&self) -> Result<Option<Vec<String>>, LightstreamerError> {
        let inner = self.lock();
        if inner.item_group.is_some() {
            return Err(LightstreamerError::illegal_state(
                "subscription configured with an item group",
            ));
        }
        Ok(inner.items.clone())
    }

    /// Sets the item list; `None` clears it.
    ///
    /// # Errors
    ///
    /// Illegal state while active or if an item group is set; illegal argument for an empty
    /// list or an invalid item name.
    pub fn set_items(&self, items: Option<Vec<String>>) -> Result<(), LightstreamerError> {
        let mut inner = self.lock();
        inner.ensure_inactive("items")?;
        if inner.item_group.is_some() {
            return Err(LightstreamerError::illegal_state(
                "subscription configured with an item group",
            ));
        }
        if let Some(items) = &items {
            validate_items(items)?;
        }
        inner.items = items;
        Ok(())
    }

    /// # Errors
    ///
    /// Illegal state if the subscription was configured with an item list.
    pub fn get_item_group(&self) -> Result<Option<String>, LightstreamerError> {
        let inner = self.lock();
        if inner.items.is_some() {
            return Err(LightstreamerError::illegal_state(
                "subscription configured with an item list",
            ));
        }
        Ok(inner.item_group.clone())
    }

    /// Sets the item group, a name the Metadata Adapter expands into the item list; `None`
    /// clears it.
    ///
    /// # Errors
    ///
    /// Illegal state while active or if an item list is set.
    pub fn set_item_group(&self, group: Option<String>) -> Result<(), LightstreamerError> {
        let mut inner = self.lock();
        inner.ensure_inactive("item group")?;
        if inner.items.is_some() {
            return Err(LightstreamerError::illegal_state(
                "subscription configured with an item list",
            ));
        }
        inner.item_group = group;
        Ok(())
    }

    /// # Errors
    ///
    /// Illegal state if the subscription was configured with a field schema.
    pub fn get_fields(&self) -> Result<Option<Vec<String>>, LightstreamerError> {
        let inner = self.lock();
        if inner.field_schema.is_some() {
            return Err(LightstreamerError::illegal_state(
                "subscription configured with a field schema",
            ));
        }
        Ok(inner.fields.clone())
    }

    /// Sets the field list; `None` clears it.
    ///
    /// # Errors
    ///
    /// Illegal state while active or if a field schema is set; illegal argument for an empty
    /// list or an invalid field name.
    pub fn set_fields(&self, fields: Option<Vec<String>>) -> Result<(), LightstreamerError> {
        let mut inner = self.lock();
        inner.ensure_inactive("fields")?;
        if inner.field_schema.is_some() {
            return Err(LightstreamerError::illegal_state(
                "subscription configured with a field schema",
            ));
        }
        if let Some(fields) = &fields {
            validate_fields(fields)?;
        }
        inner.fields = fields;
        Ok(())
    }

    /// # Errors
    ///
    /// Illegal state if the subscription was configured with a field list.
    pub fn get_field_schema(&self) -> Result<Option<String>, LightstreamerError> {
        let inner = self.lock();
        if inner.fields.is_some() {
            return Err(LightstreamerError::illegal_state(
                "subscription configured with a field list",
            ));
        }
        Ok(inner.field_schema.clone())
    }

    /// Sets the field schema; `None` clears it.
    ///
    /// # Errors
    ///
    /// Illegal state while active or if a field list is set.
    pub fn set_field_schema(&self, schema: Option<String>) -> Result<(), LightstreamerError> {
        let mut inner = self.lock();
        inner.ensure_inactive("field schema")?;
        if inner.fields.is_some() {
            return Err(LightstreamerError::illegal_state(
                "subscription configured with a field list",
            ));
        }
        inner.field_schema = schema;
        Ok(())
    }

    pub fn get_data_adapter(&self) -> Option<String> {
        self.lock().data_adapter.clone()
    }

    /// Sets the Data Adapter that supplies the items; `None` uses the default one.
    ///
    /// # Errors
    ///
    /// Illegal state while active.
    pub fn set_data_adapter(&self, data_adapter: Option<String>) -> Result<(), LightstreamerError> {
        let mut inner = self.lock();
        inner.ensure_inactive("data adapter")?;
        inner.data_adapter = data_adapter;
        Ok(())
    }

    pub fn get_selector(&self) -> Option<String> {
        self.lock().selector.clone()
    }

    /// Sets the selector applied by the Metadata Adapter to the updates.
    ///
    /// # Errors
    ///
    /// Illegal state while active.
    pub fn set_selector(&self, selector: Option<String>) -> Result<(), LightstreamerError> {
        let mut inner = self.lock();
        inner.ensure_inactive("selector")?;
        inner.selector = selector;
        Ok(())
    }

    pub fn get_requested_buffer_size(&self) -> Option<BufferSize> {
        self.lock().requested_buffer_size
    }

    /// # Errors
    ///
    /// Illegal state while active; illegal argument for a size of zero.
    pub fn set_requested_buffer_size(
        &self,
        size: Option<BufferSize>,
    ) -> Result<(), LightstreamerError> {
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

    /// The requested snapshot. When unset, the snapshot is requested in every mode but RAW.
    pub fn get_requested_snapshot(&self) -> Option<Snapshot> {
        self.lock().requested_snapshot
    }

    /// # Errors
    ///
    /// Illegal state while active, for a snapshot requested in RAW mode, or for a snapshot
    /// length outside DISTINCT mode; illegal argument for a length of zero.
    pub fn set_requested_snapshot(&self, snapshot: Option<Snapshot>) -> Result<(), LightstreamerError> {
        let mut inner = self.lock();
        inner.ensure_inactive("requested snapshot")?;
        match snapshot {
            Some(Snapshot::Yes) | Some(Snapshot::Number(_))
                if inner.mode == SubscriptionMode::Raw =>
            {
                return Err(LightstreamerError::illegal_state(
                    "snapshot not available in RAW mode",
                ));
            }
            Some(Snapshot::Number(_)) if inner.mode != SubscriptionMode::Distinct => {
                return Err(LightstreamerError::illegal_state(
                    "snapshot length only available in DISTINCT mode",
                ));
            }
            Some(Snapshot::Number(0)) => {
                return Err(LightstreamerError::illegal_argument(
                    "snapshot length must be greater than zero",
                ));
            }
            _ => {}
        }
        inner.requested_snapshot = snapshot;
        Ok(())
    }

    pub fn get_requested_max_frequency(&self) -> Option<MaxFrequency> {
        self.lock().requested_max_frequency
    }

    /// Sets the maximum update frequency requested for each item. `None` leaves the choice
    /// to the server.
    ///
    /// It can be changed while the subscription is active, in which case the new value is sent
    /// to the server, but not to or from `Unfiltered`. In RAW mode the value is kept but never
    /// sent, as RAW is always unfiltered.
    ///
    /// # Errors
    ///
    /// Illegal argument for a limit that is not a positive number; illegal state when switching
    /// to or from `Unfiltered` on an active subscription.
    pub fn set_requested_max_frequency(
        &self,
        frequency: Option<MaxFrequency>,
    ) -> Result<(), LightstreamerError> {
        let mut inner = self.lock();
        if let Some(MaxFrequency::Limited(limit)) = frequency {
            if !(limit.is_finite() && limit > 0.0) {
                return Err(LightstreamerError::illegal_argument(format!(
                    "invalid max frequency {}",
                    limit
                )));
            }
        }
        if inner.phase != Phase::Inactive {
            let current_unfiltered = inner.requested_max_frequency == Some(MaxFrequency::Unfiltered);
            let next_unfiltered = frequency == Some(MaxFrequency::Unfiltered);
            if current_unfiltered != next_unfiltered {
                return Err(LightstreamerError::illegal_state(
                    "cannot switch to or from unfiltered dispatching while active",
                ));
            }
        }
        inner.requested_max_frequency = frequency;

        if inner.phase != Phase::Inactive && inner.mode != SubscriptionMode::Raw {
            if let (Some(id), Some(binding)) = (inner.id, &inner.binding) {
                debug!("requesting max frequency {:?} for subscription {}", frequency, id);
                if binding.send(SubscriptionRequest::Reconfigure(id)).is_err() {
                    warn!("client loop not running, frequency applied on next subscription");
                }
            }
        }
        Ok(())
    }

    /// Fields of the second-level subscriptions opened for each key of a COMMAND item.
    ///
    /// # Errors
    ///
    /// Illegal state outside COMMAND mode, while active, or if a second-level field schema is
    /// set; illegal argument for an empty list or an invalid field name.
    pub fn set_command_second_level_fields(
        &self,
        fields: Option<Vec<String>>,
    ) -> Result<(), LightstreamerError> {
        let mut inner = self.lock();
        inner.ensure_command("second-level fields")?;
        inner.ensure_inactive("second-level fields")?;
        if inner.second_level_field_schema.is_some() {
            return Err(LightstreamerError::illegal_state(
                "subscription configured with a second-level field schema",
            ));
        }
        if let Some(fields) = &fields {
            validate_fields(fields)?;
        }
        inner.second_level_fields = fields;
        Ok(())
    }

    /// # Errors
    ///
    /// Illegal state if a second-level field schema is set.
    pub fn get_command_second_level_fields(&self) -> Result<Option<Vec<String>>, LightstreamerError> {
        let inner = self.lock();
        if inner.second_level_field_schema.is_some() {
            return Err(LightstreamerError::illegal_state(
                "subscription configured with a second-level field schema",
            ));
        }
        Ok(inner.second_level_fields.clone())
    }

    /// # Errors
    ///
    /// Illegal state outside COMMAND mode, while active, or if second-level fields are set.
    pub fn set_command_second_level_field_schema(
        &self,
        schema: Option<String>,
    ) -> Result<(), LightstreamerError> {
        let mut inner = self.lock();
        inner.ensure_command("second-level field schema")?;
        inner.ensure_inactive("second-level field schema")?;
        if inner.second_level_fields.is_some() {
            return Err(LightstreamerError::illegal_state(
                "subscription configured with second-level fields",
            ));
        }
        inner.second_level_field_schema = schema;
        Ok(())
    }

    /// # Errors
    ///
    /// Illegal state if second-level fields are set.
    pub fn get_command_second_level_field_schema(&self) -> Result<Option<String>, LightstreamerError> {
        let inner = self.lock();
        if inner.second_level_fields.is_some() {
            return Err(LightstreamerError::illegal_state(
                "subscription configured with second-level fields",
            ));
        }
        Ok(inner.second_level_field_schema.clone())
    }

    /// # Errors
    ///
    /// Illegal state outside COMMAND mode or while active.
    pub fn set_command_second_level_data_adapter(
        &self,
        data_adapter: Option<String>,
    ) -> Result<(), LightstreamerError> {
        let mut inner = self.lock();
        inner.ensure_command("second-level data adapter")?;
        inner.ensure_inactive("second-level data adapter")?;
        inner.second_level_data_adapter = data_adapter;
        Ok(())
    }

    pub fn get_command_second_level_data_adapter(&self) -> Option<String> {
        self.lock().second_level_data_adapter.clone()
    }

    /// 1-based position of the "key" field.
    ///
    /// # Errors
    ///
    /// Illegal state outside COMMAND mode, or when the subscription uses a field schema and has
    /// not been confirmed by the server yet.
    pub fn get_key_position(&self) -> Result<usize, LightstreamerError> {
        self.special_position("key")
    }

    /// 1-based position of the "command" field. Same rules as [`Subscription::get_key_position`].
    pub fn get_command_position(&self) -> Result<usize, LightstreamerError> {
        self.special_position("command")
    }

    fn special_position(&self, name: &str) -> Result<usize, LightstreamerError> {
        let inner = self.lock();
        inner.ensure_command(&format!("{} position", name))?;
        let from_state = inner.state.as_ref().and_then(|state| {
            if name == "key" {
                state.key_position()
            } else {
                state.command_position()
            }
        });
        from_state
            .or_else(|| {
                inner
                    .fields
                    .as_ref()
                    .and_then(|fields| fields.iter().position(|field| field == name))
                    .map(|index| index + 1)
            })
            .ok_or_else(|| {
                LightstreamerError::illegal_state(format!("{} position not known yet", name))
            })
    }

    /// Whether the subscription was passed to `LightstreamerClient::subscribe` and not yet
    /// removed.
    pub fn is_active(&self) -> bool {
        self.lock().phase != Phase::Inactive
    }

    /// Whether the server confirmed the subscription.
    pub fn is_subscribed(&self) -> bool {
        self.lock().phase == Phase::Subscribed
    }

    /// The frequency last granted by the server.
    pub fn get_real_max_frequency(&self) -> Option<MaxFrequency> {
        self.lock().real_max_frequency
    }

    /// Latest value received for a field of an item. `Ok(None)` when nothing was received yet
    /// or the value is null.
    ///
    /// # Errors
    ///
    /// Illegal argument for an unknown item or field name, or an out-of-range position.
    pub fn get_value<'a, 'b>(
        &self,
        item: impl Into<Locator<'a>>,
        field: impl Into<Locator<'b>>,
    ) -> Result<Option<String>, LightstreamerError> {
        let inner = self.lock();
        let (item, field) = (item.into(), field.into());
        match &inner.state {
            Some(state) => {
                let item_index = state.resolve_item(item)?;
                let field_index = state.resolve_field(field)?;
                Ok(state.value(item_index, field_index))
            }
            None => {
                resolve_unconfirmed(inner.items.as_ref(), item, "item")?;
                resolve_unconfirmed(inner.fields.as_ref(), field, "field")?;
                Ok(None)
            }
        }
    }

    /// Latest value of a field for a key of a COMMAND item, second-level fields included.
    ///
    /// # Errors
    ///
    /// Illegal state outside COMMAND mode; illegal argument for an unknown item or field.
    pub fn get_command_value<'a, 'b>(
        &self,
        item: impl Into<Locator<'a>>,
        key: &str,
        field: impl Into<Locator<'b>>,
    ) -> Result<Option<String>, LightstreamerError> {
        let inner = self.lock();
        inner.ensure_command("command value")?;
        let (item, field) = (item.into(), field.into());
        match &inner.state {
            Some(state) => {
                let item_index = state.resolve_item(item)?;
                let field_index = state.resolve_field(field)?;
                Ok(state.command_value(item_index, key, field_index))
            }
            None => {
                resolve_unconfirmed(inner.items.as_ref(), item, "item")?;
                let mut names = inner.fields.clone().unwrap_or_default();
                if let Some(second) = &inner.second_level_fields {
                    names.extend(second.iter().cloned());
                }
                let names = (inner.fields.is_some()).then_some(names);
                resolve_unconfirmed(names.as_ref(), field, "field")?;
                Ok(None)
            }
        }
    }

    // ---- client side ----

    pub(crate) fn id(&self) -> Option<usize> {
        self.lock().id
    }

    pub(crate) fn set_id(&self, id: Option<usize>) {
        self.lock().id = id;
    }

    /// Checks what the server needs to accept the subscription and marks it active.
    pub(crate) fn activate(
        &self,
        binding: UnboundedSender<SubscriptionRequest>,
    ) -> Result<(), LightstreamerError> {
        let mut inner = self.lock();
        if inner.phase != Phase::Inactive {
            return Err(LightstreamerError::illegal_state(
                "subscription is already active",
            ));
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
        if let (SubscriptionMode::Command, Some(fields)) = (inner.mode, &inner.fields) {
            for required in ["key", "command"] {
                if !fields.iter().any(|field| field == required) {
                    return Err(LightstreamerError::illegal_argument(format!(
                        "COMMAND subscriptions need the \"{}\" field",
                        required
                    )));
                }
            }
        }
        inner.phase = Phase::Active;
        inner.binding = Some(binding);
        Ok(())
    }

    /// Marks the subscription inactive. Returns whether it was subscribed and the ids of the
    /// second-level subscriptions to drop.
    pub(crate) fn deactivate(&self) -> (bool, Vec<usize>) {
        let mut inner = self.lock();
        let was_subscribed = inner.phase == Phase::Subscribed;
        inner.phase = Phase::Inactive;
        inner.binding = None;
        inner.id = None;
        inner.real_max_frequency = None;
        let second_levels = inner
            .state
            .take()
            .map(|mut state| state.close_second_levels())
            .unwrap_or_default();
        (was_subscribed, second_levels)
    }

    pub(crate) fn add_request(&self, id: usize) -> AddSubscription {
        let inner = self.lock();
        let snapshot = match (inner.mode, inner.requested_snapshot) {
            (SubscriptionMode::Raw, _) => None,
            (_, Some(snapshot)) => Some(snapshot.to_string()),
            (_, None) => Some(Snapshot::Yes.to_string()),
        };
        AddSubscription {
            subscription_id: id,
            mode: inner.mode.to_string(),
            group: inner.group(),
            schema: inner.schema(),
            data_adapter: inner.data_adapter.clone(),
            selector: inner.selector.clone(),
            snapshot,
            requested_max_frequency: inner.frequency_parameter(),
            requested_buffer_size: inner.requested_buffer_size.map(|size| size.to_string()),
        }
    }

    /// MERGE subscription to the second-level item named by `key`.
    pub(crate) fn second_level_request(&self, id: usize, key: &str) -> AddSubscription {
        let inner = self.lock();
        AddSubscription {
            subscription_id: id,
            mode: SubscriptionMode::Merge.to_string(),
            group: key.to_string(),
            schema: inner.second_level_schema(),
            data_adapter: inner.second_level_data_adapter.clone(),
            selector: None,
            snapshot: Some(Snapshot::Yes.to_string()),
            requested_max_frequency: inner.frequency_parameter(),
            requested_buffer_size: None,
        }
    }

    /// Frequency to send in a reconfiguration, if any.
    pub(crate) fn reconf_frequency(&self) -> Option<String> {
        let inner = self.lock();
        if inner.mode == SubscriptionMode::Raw {
            return None;
        }
        Some(
            inner
                .requested_max_frequency
                .unwrap_or(MaxFrequency::Unlimited)
                .to_string(),
        )
    }

    /// Server confirmation (`SUBOK` / `SUBCMD`).
    pub(crate) fn confirm(
        &self,
        items: usize,
        fields: usize,
        key_pos: Option<usize>,
        command_pos: Option<usize>,
    ) -> Vec<SubscriptionEvent> {
        let mut inner = self.lock();
        if inner.phase != Phase::Active {
            return Vec::new();
        }
        let config = DeliveryConfig {
            mode: inner.mode,
            item_names: inner.items.clone(),
            field_names: inner.fields.clone(),
            second_level_names: inner.second_level_fields.clone(),
            two_level: inner.is_two_level(),
            snapshot: inner.snapshot_requested(),
        };
        inner.state = Some(DeliveryState::new(config, items, fields, key_pos, command_pos));
        inner.phase = Phase::Subscribed;
        vec![SubscriptionEvent::Subscription]
    }

    fn with_state<T>(
        &self,
        apply: impl FnOnce(&mut DeliveryState) -> Result<T, LightstreamerError>,
    ) -> Result<T, LightstreamerError> {
        let mut inner = self.lock();
        let state = inner
            .state
            .as_mut()
            .ok_or_else(|| LightstreamerError::protocol("notification for an unconfirmed subscription"))?;
        apply(state)
    }

    pub(crate) fn process_update(&self, item_pos: usize, raw: &str) -> Result<Delivery, LightstreamerError> {
        self.with_state(|state| state.update(item_pos, raw))
    }

    pub(crate) fn end_of_snapshot(&self, item_pos: usize) -> Result<Vec<SubscriptionEvent>, LightstreamerError> {
        self.with_state(|state| state.end_of_snapshot(item_pos).map(|event| vec![event]))
    }

    pub(crate) fn clear_snapshot(&self, item_pos: usize) -> Result<Delivery, LightstreamerError> {
        self.with_state(|state| state.clear_snapshot(item_pos))
    }

    pub(crate) fn lost_updates(
        &self,
        item_pos: usize,
        lost_updates: u32,
    ) -> Result<Vec<SubscriptionEvent>, LightstreamerError> {
        self.with_state(|state| state.lost_updates(item_pos, lost_updates).map(|event| vec![event]))
    }

    pub(crate) fn real_max_frequency(&self, frequency: MaxFrequency) -> Vec<SubscriptionEvent> {
        self.lock().real_max_frequency = Some(frequency);
        vec![SubscriptionEvent::RealMaxFrequency(Some(frequency))]
    }

    /// The server dropped the subscription, or the session was lost: back to ACTIVE, waiting
    /// for a new confirmation.
    pub(crate) fn suspend(&self) -> (Vec<SubscriptionEvent>, Vec<usize>) {
        let mut inner = self.lock();
        if inner.phase != Phase::Subscribed {
            return (Vec::new(), Vec::new());
        }
        inner.phase = Phase::Active;
        inner.real_max_frequency = None;
        let second_levels = inner
            .state
            .take()
            .map(|mut state| state.close_second_levels())
            .unwrap_or_default();
        (vec![SubscriptionEvent::Unsubscription], second_levels)
    }

    /// The server refused the subscription. It stays active until the application unsubscribes.
    pub(crate) fn refuse(&self, code: i32, message: &str) -> Vec<SubscriptionEvent> {
        let mut inner = self.lock();
        inner.id = None;
        vec![SubscriptionEvent::SubscriptionError {
            code,
            message: (!message.is_empty()).then(|| message.to_string()),
        }]
    }

    pub(crate) fn attach_second_level(&self, item_pos: usize, key: &str, id: usize) {
        if let Some(state) = self.lock().state.as_mut() {
            state.attach_second_level(item_pos, key, id);
        }
    }

    pub(crate) fn second_level_confirmed(&self, fields: usize) {
        if let Some(state) = self.lock().state.as_mut() {
            state.second_level_confirmed(fields);
        }
    }

    pub(crate) fn process_second_level_update(
        &self,
        item_pos: usize,
        key: &str,
        raw: &str,
    ) -> Result<Vec<SubscriptionEvent>, LightstreamerError> {
        self.with_state(|state| state.second_level_update(item_pos, key, raw))
    }

    pub(crate) fn second_level_refused(
        &self,
        item_pos: usize,
        key: &str,
        code: i32,
        message: &str,
    ) -> Vec<SubscriptionEvent> {
        if let Some(state) = self.lock().state.as_mut() {
            state.detach_second_level(item_pos, key);
        }
        vec![SubscriptionEvent::SecondLevelError {
            code,
            message: (!message.is_empty()).then(|| message.to_string()),
            key: key.to_string(),
        }]
    }

    /// Delivers events to every listener, in order. No lock on the subscription is held while
    /// the listeners run.
    pub(crate) fn dispatch(&self, events: &[SubscriptionEvent]) {
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

fn resolve_unconfirmed(
    names: Option<&Vec<String>>,
    locator: Locator<'_>,
    what: &str,
) -> Result<(), LightstreamerError> {
    let known = match (locator, names) {
        (Locator::Name(name), Some(names)) => names.iter().any(|n| n == name),
        (Locator::Name(_), None) => false,
        (Locator::Position(position), Some(names)) => position >= 1 && position <= names.len(),
        (Locator::Position(position), None) => position >= 1,
    };
    if known {
        Ok(())
    } else {
        Err(LightstreamerError::illegal_argument(format!(
            "unknown {} {:?}",
            what, locator
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn strings(values: &[&str]) -> Option<Vec<String>> {
        Some(values.iter().map(|s| s.to_string()).collect())
    }

    fn merge() -> Subscription {
        Subscription::new(
            SubscriptionMode::Merge,
            strings(&["item1", "item2"]),
            strings(&["last_price", "time"]),
        )
        .unwrap()
    }

    fn activate(subscription: &Subscription) -> mpsc::UnboundedReceiver<SubscriptionRequest> {
        let (tx, rx) = mpsc::unbounded_channel();
        subscription.activate(tx).unwrap();
        rx
    }

    #[test]
    fn test_name_validation() {
        assert!(is_valid_item_name("item1"));
        assert!(!is_valid_item_name(""));
        assert!(!is_valid_item_name("two words"));
        assert!(!is_valid_item_name("123"));

        assert!(
            Subscription::new(SubscriptionMode::Merge, strings(&["42"]), None)
                .unwrap_err()
                .is_illegal_argument()
        );
        assert!(
            Subscription::new(SubscriptionMode::Merge, None, strings(&["a b"]))
                .unwrap_err()
                .is_illegal_argument()
        );
        assert!(
            Subscription::new(SubscriptionMode::Merge, Some(vec![]), None)
                .unwrap_err()
                .is_illegal_argument()
        );
    }

    #[test]
    fn test_list_and_group_are_exclusive() {
        let subscription = merge();
        assert!(subscription.set_item_group(Some("group".into())).unwrap_err().is_illegal_state());
        assert!(subscription.get_item_group().unwrap_err().is_illegal_state());
        assert!(subscription.set_field_schema(Some("schema".into())).unwrap_err().is_illegal_state());

        subscription.set_items(None).unwrap();
        subscription.set_item_group(Some("group".into())).unwrap();
        assert_eq!(subscription.get_item_group().unwrap(), Some("group".to_string()));
        assert!(subscription.get_items().unwrap_err().is_illegal_state());
    }

    #[test]
    fn test_setters_fail_while_active() {
        let subscription = merge();
        let _rx = activate(&subscription);
        assert!(subscription.is_active());
        assert!(!subscription.is_subscribed());

        assert!(subscription.set_items(strings(&["x"])).unwrap_err().is_illegal_state());
        assert!(subscription.set_fields(strings(&["x"])).unwrap_err().is_illegal_state());
        assert!(subscription.set_data_adapter(None).unwrap_err().is_illegal_state());
        assert!(subscription.set_selector(None).unwrap_err().is_illegal_state());
        assert!(subscription.set_requested_buffer_size(None).unwrap_err().is_illegal_state());
        assert!(subscription.set_requested_snapshot(None).unwrap_err().is_illegal_state());
        assert!(
            subscription
                .set_item_group(Some("item1 item2".to_string()))
                .unwrap_err()
                .is_illegal_state()
        );
        assert!(
            subscription
                .set_field_schema(Some("quote".to_string()))
                .unwrap_err()
                .is_illegal_state()
        );
        assert_eq!(subscription.get_items().unwrap(), strings(&["item1", "item2"]));

        let (tx, _rx2) = mpsc::unbounded_channel();
        assert!(subscription.activate(tx).unwrap_err().is_illegal_state());

        let command = Subscription::new(
            SubscriptionMode::Command,
            strings(&["portfolio"]),
            strings(&["key", "command"]),
        )
        .unwrap();
        let _rx3 = activate(&command);
        assert!(
            command
                .set_command_second_level_fields(strings(&["last_price"]))
                .unwrap_err()
                .is_illegal_state()
        );
        assert!(
            command
                .set_command_second_level_field_schema(Some("quote".to_string()))
                .unwrap_err()
                .is_illegal_state()
        );
        assert!(
            command
                .set_command_second_level_data_adapter(Some("QUOTE_ADAPTER".to_string()))
                .unwrap_err()
                .is_illegal_state()
        );
        assert_eq!(command.get_command_second_level_fields().unwrap(), None);
        assert_eq!(command.get_command_second_level_data_adapter(), None);
    }

    #[test]
    fn test_snapshot_rules() {
        let raw = Subscription::new(SubscriptionMode::Raw, strings(&["i"]), strings(&["f"])).unwrap();
        assert!(raw.set_requested_snapshot(Some(Snapshot::Yes)).unwrap_err().is_illegal_state());
        raw.set_requested_snapshot(Some(Snapshot::No)).unwrap();

        let subscription = merge();
        assert!(
            subscription
                .set_requested_snapshot(Some(Snapshot::Number(10)))
                .unwrap_err()
                .is_illegal_state()
        );

        let distinct =
            Subscription::new(SubscriptionMode::Distinct, strings(&["i"]), strings(&["f"])).unwrap();
        distinct.set_requested_snapshot(Some(Snapshot::Number(10))).unwrap();
        assert!(distinct.set_requested_snapshot(Some(Snapshot::Number(0))).is_err());
        assert_eq!(distinct.get_requested_snapshot(), Some(Snapshot::Number(10)));
    }

    #[test]
    fn test_max_frequency_while_active() {
        let subscription = merge();
        subscription.set_requested_max_frequency(Some(MaxFrequency::Limited(1.0))).unwrap();
        let mut rx = activate(&subscription);
        subscription.set_id(Some(4));

        subscription.set_requested_max_frequency(Some(MaxFrequency::Limited(2.5))).unwrap();
        assert!(matches!(rx.try_recv(), Ok(SubscriptionRequest::Reconfigure(4))));

        assert!(
            subscription
                .set_requested_max_frequency(Some(MaxFrequency::Unfiltered))
                .unwrap_err()
                .is_illegal_state()
        );
        assert!(
            subscription
                .set_requested_max_frequency(Some(MaxFrequency::Limited(-1.0)))
                .unwrap_err()
                .is_illegal_argument()
        );
        assert_eq!(
            subscription.get_requested_max_frequency(),
            Some(MaxFrequency::Limited(2.5))
        );
    }

    #[test]
    fn test_cannot_leave_unfiltered_while_active() {
        let subscription = merge();
        subscription.set_requested_max_frequency(Some(MaxFrequency::Unfiltered)).unwrap();
        let _rx = activate(&subscription);
        assert!(
            subscription
                .set_requested_max_frequency(Some(MaxFrequency::Unlimited))
                .unwrap_err()
                .is_illegal_state()
        );
        subscription.set_requested_max_frequency(Some(MaxFrequency::Unfiltered)).unwrap();
    }

    #[test]
    fn test_command_only_operations() {
        let subscription = merge();
        assert!(subscription.get_key_position().unwrap_err().is_illegal_state());
        assert!(
            subscription
                .set_command_second_level_fields(strings(&["bid"]))
                .unwrap_err()
                .is_illegal_state()
        );
        assert!(subscription.get_command_value("item1", "k", "time").unwrap_err().is_illegal_state());

        let command = Subscription::new(
            SubscriptionMode::Command,
            strings(&["portfolio"]),
            strings(&["command", "key", "qty"]),
        )
        .unwrap();
        assert_eq!(command.get_key_position().unwrap(), 2);
        assert_eq!(command.get_command_position().unwrap(), 1);
        command.set_command_second_level_fields(strings(&["bid"])).unwrap();
        assert!(
            command
                .set_command_second_level_field_schema(Some("s".into()))
                .unwrap_err()
                .is_illegal_state()
        );

        let schema = Subscription::new(SubscriptionMode::Command, strings(&["portfolio"]), None).unwrap();
        schema.set_field_schema(Some("portfolio_schema".into())).unwrap();
        assert!(schema.get_key_position().unwrap_err().is_illegal_state());
    }

    #[test]
    fn test_activation_requires_items_and_fields() {
        let subscription = Subscription::new(SubscriptionMode::Merge, None, strings(&["f"])).unwrap();
        let (tx, _rx) = mpsc::unbounded_channel();
        assert!(subscription.activate(tx).unwrap_err().is_illegal_argument());

        let command =
            Subscription::new(SubscriptionMode::Command, strings(&["i"]), strings(&["key", "qty"]))
                .unwrap();
        let (tx, _rx) = mpsc::unbounded_channel();
        assert!(command.activate(tx).unwrap_err().is_illegal_argument());
        assert!(!command.is_active());
    }

    #[test]
    fn test_get_value_lookup() {
        let subscription = merge();
        assert_eq!(subscription.get_value("item1", "last_price").unwrap(), None);
        assert!(subscription.get_value("item9", "last_price").unwrap_err().is_illegal_argument());
        assert!(subscription.get_value("item1", "bid").unwrap_err().is_illegal_argument());
        assert!(subscription.get_value(3, 1).unwrap_err().is_illegal_argument());

        let _rx = activate(&subscription);
        subscription.confirm(2, 2, None, None);
        assert!(subscription.is_subscribed());
        subscription.process_update(1, "10|12:00").unwrap();
        assert_eq!(
            subscription.get_value("item1", "last_price").unwrap(),
            Some("10".to_string())
        );
        assert_eq!(subscription.get_value(1, 2).unwrap(), Some("12:00".to_string()));
        assert!(subscription.get_value("item1", 3).unwrap_err().is_illegal_argument());
    }

    #[test]
    fn test_add_request_defaults() {
        let subscription = merge();
        subscription.set_data_adapter(Some("QUOTE_ADAPTER".into())).unwrap();
        let request = subscription.add_request(3);
        assert_eq!(request.mode, "MERGE");
        assert_eq!(request.group, "item1 item2");
        assert_eq!(request.schema, "last_price time");
        assert_eq!(request.snapshot.as_deref(), Some("true"));
        assert_eq!(request.requested_max_frequency, None);

        let raw = Subscription::new(SubscriptionMode::Raw, strings(&["i"]), strings(&["f"])).unwrap();
        raw.set_requested_max_frequency(Some(MaxFrequency::Limited(1.0))).unwrap();
        let request = raw.add_request(1);
        assert_eq!(request.snapshot, None);
        assert_eq!(request.requested_max_frequency, None);
    }

    #[test]
    fn test_suspend_and_deactivate() {
        let subscription = merge();
        let _rx = activate(&subscription);
        subscription.set_id(Some(1));
        assert_eq!(subscription.confirm(2, 2, None, None).len(), 1);

        let (events, closes) = subscription.suspend();
        assert!(matches!(events.as_slice(), [SubscriptionEvent::Unsubscription]));
        assert!(closes.is_empty());
        assert!(subscription.is_active());
        assert!(!subscription.is_subscribed());

        let (was_subscribed, _) = subscription.deactivate();
        assert!(!was_subscribed);
        assert!(!subscription.is_active());
        assert_eq!(subscription.id(), None);
        subscription.set_items(strings(&["item3"])).unwrap();
    }

    #[test]
    fn test_listeners() {
        struct Counting(Arc<Mutex<Vec<&'static str>>>);
        impl SubscriptionListener for Counting {
            fn on_listen_start(&mut self) {
                self.0.lock().unwrap().push("start");
            }
            fn on_listen_end(&mut self) {
                self.0.lock().unwrap().push("end");
            }
            fn on_subscription(&mut self) {
                self.0.lock().unwrap().push("subscribed");
            }
        }

        let calls = Arc::new(Mutex::new(Vec::new()));
        let subscription = merge();
        subscription.add_listener(Box::new(Counting(calls.clone())));
        assert_eq!(subscription.get_listeners(), 1);

        subscription.dispatch(&[SubscriptionEvent::Subscription]);
        assert!(subscription.remove_listener(3).unwrap_err().is_illegal_argument());
        subscription.remove_listener(0).unwrap();
        assert_eq!(subscription.get_listeners(), 0);
        assert_eq!(*calls.lock().unwrap(), vec!["start", "subscribed", "end"]);
    }

    #[test]
    fn test_mode_strings() {
        assert_eq!(SubscriptionMode::Command.to_string(), "COMMAND");
        assert_eq!("DISTINCT".parse::<SubscriptionMode>().unwrap(), SubscriptionMode::Distinct);
        assert!("merge".parse::<SubscriptionMode>().is_err());
        assert_eq!(MaxFrequency::Limited(0.5).to_string(), "0.5");
        assert_eq!(BufferSize::Unlimited.to_string(), "unlimited");
        assert_eq!(Snapshot::Number(5).to_string(), "5");
    }
}
