/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 18/10/26
******************************************************************************/

//! Per-subscription delivery state: the current values of every item, the key tables of
//! COMMAND items and the second-level subscriptions opened for their keys.

use crate::protocol::{DecodedField, decode_update};
use crate::subscription::item_update::{FieldMap, ItemUpdate, Locator};
use crate::subscription::listener::SubscriptionEvent;
use crate::subscription::model::is_valid_item_name;
use crate::subscription::{SubscriptionErrorCode, SubscriptionMode};
use crate::utils::LightstreamerError;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, trace};

/// Work the session has to carry out for two-level subscriptions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum SecondLevelAction {
    /// Subscribe to the item named by `key` in MERGE mode.
    Open { item_pos: usize, key: String },
    /// Drop an existing second-level subscription.
    Close { subscription_id: usize },
}

/// Listener events produced by a notification, plus second-level work for the session.
#[derive(Debug, Default)]
pub(crate) struct Delivery {
    pub events: Vec<SubscriptionEvent>,
    pub actions: Vec<SecondLevelAction>,
}

impl Delivery {
    fn event(event: SubscriptionEvent) -> Self {
        Self {
            events: vec![event],
            actions: Vec::new(),
        }
    }
}

/// Configuration captured when the server confirms the subscription.
#[derive(Debug, Clone)]
pub(crate) struct DeliveryConfig {
    pub mode: SubscriptionMode,
    pub item_names: Option<Vec<String>>,
    pub field_names: Option<Vec<String>>,
    pub second_level_names: Option<Vec<String>>,
    pub two_level: bool,
    pub snapshot: bool,
}

#[derive(Debug)]
struct SecondLevelRow {
    subscription_id: usize,
    received_first: bool,
}

#[derive(Debug)]
struct KeyRow {
    values: Vec<Option<String>>,
    second_level: Option<SecondLevelRow>,
}

#[derive(Debug, Default)]
struct ItemState {
    /// Last values received for the item; base for decoding the next update.
    values: Vec<Option<String>>,
    received_first: bool,
    snapshot_ended: bool,
    rows: HashMap<String, KeyRow>,
}

#[derive(Debug)]
pub(crate) struct DeliveryState {
    config: DeliveryConfig,
    fields: Arc<FieldMap>,
    first_level_fields: usize,
    second_level_fields: usize,
    key_index: Option<usize>,
    command_index: Option<usize>,
    items: Vec<ItemState>,
}

fn position_of(names: Option<&Vec<String>>, name: &str) -> Option<usize> {
    names.and_then(|names| names.iter().position(|field| field == name))
}

impl DeliveryState {
    pub(crate) fn new(
        config: DeliveryConfig,
        items: usize,
        fields: usize,
        key_pos: Option<usize>,
        command_pos: Option<usize>,
    ) -> Self {
        let (key_index, command_index) = if config.mode == SubscriptionMode::Command {
            (
                key_pos
                    .and_then(|pos| pos.checked_sub(1))
                    .or_else(|| position_of(config.field_names.as_ref(), "key")),
                command_pos
                    .and_then(|pos| pos.checked_sub(1))
                    .or_else(|| position_of(config.field_names.as_ref(), "command")),
            )
        } else {
            (None, None)
        };

        let second_level_fields = if config.two_level {
            config.second_level_names.as_ref().map_or(0, Vec::len)
        } else {
            0
        };
        let mut map = FieldMap::new(config.field_names.as_deref(), fields);
        map.append(config.second_level_names.as_deref(), second_level_fields);

        let items = (0..items)
            .map(|_| ItemState {
                values: vec![None; fields],
                ..Default::default()
            })
            .collect();

        Self {
            config,
            fields: Arc::new(map),
            first_level_fields: fields,
            second_level_fields,
            key_index,
            command_index,
            items,
        }
    }

    /// 1-based position of the key field.
    pub(crate) fn key_position(&self) -> Option<usize> {
        self.key_index.map(|index| index + 1)
    }

    /// 1-based position of the command field.
    pub(crate) fn command_position(&self) -> Option<usize> {
        self.command_index.map(|index| index + 1)
    }

    fn item_name(&self, item_pos: usize) -> Option<String> {
        self.config
            .item_names
            .as_ref()
            .and_then(|names| names.get(item_pos.checked_sub(1)?))
            .cloned()
    }

    fn index(&self, item_pos: usize) -> Result<usize, LightstreamerError> {
        item_pos
            .checked_sub(1)
            .filter(|index| *index < self.items.len())
            .ok_or_else(|| {
                LightstreamerError::protocol(format!("item position {} out of range", item_pos))
            })
    }

    /// 0-based index of an item addressed by the application.
    pub(crate) fn resolve_item(&self, item: Locator<'_>) -> Result<usize, LightstreamerError> {
        match item {
            Locator::Name(name) => position_of(self.config.item_names.as_ref(), name)
                .ok_or_else(|| {
                    LightstreamerError::illegal_argument(format!("unknown item '{}'", name))
                }),
            Locator::Position(position) => position
                .checked_sub(1)
                .filter(|index| *index < self.items.len())
                .ok_or_else(|| {
                    LightstreamerError::illegal_argument(format!(
                        "item position {} out of range",
                        position
                    ))
                }),
        }
    }

    pub(crate) fn resolve_field(&self, field: Locator<'_>) -> Result<usize, LightstreamerError> {
        self.fields.resolve(field)
    }

    pub(crate) fn value(&self, item_index: usize, field_index: usize) -> Option<String> {
        self.items
            .get(item_index)
            .and_then(|item| item.values.get(field_index))
            .cloned()
            .flatten()
    }

    pub(crate) fn command_value(
        &self,
        item_index: usize,
        key: &str,
        field_index: usize,
    ) -> Option<String> {
        self.items
            .get(item_index)
            .and_then(|item| item.rows.get(key))
            .and_then(|row| row.values.get(field_index))
            .cloned()
            .flatten()
    }

    /// Applies an update (`U`) to an item.
    pub(crate) fn update(
        &mut self,
        item_pos: usize,
        raw: &str,
    ) -> Result<Delivery, LightstreamerError> {
        let index = self.index(item_pos)?;
        let item_name = self.item_name(item_pos);
        let snapshot_requested = self.config.snapshot;
        let mode = self.config.mode;

        let item = &mut self.items[index];
        let decoded = decode_update(raw, &item.values)?;
        let is_snapshot = match mode {
            SubscriptionMode::Merge => snapshot_requested && !item.received_first,
            SubscriptionMode::Distinct | SubscriptionMode::Command => {
                snapshot_requested && !item.snapshot_ended
            }
            SubscriptionMode::Raw => false,
        };
        item.received_first = true;
        item.values = decoded.iter().map(|field| field.value.clone()).collect();

        if mode == SubscriptionMode::Command {
            return self.command_update(index, item_pos, item_name, decoded, is_snapshot);
        }

        let update = ItemUpdate {
            item_name,
            item_pos,
            fields: self.fields.clone(),
            values: item.values.clone(),
            changed: decoded.iter().map(|field| field.changed).collect(),
            patches: decoded.into_iter().map(|field| field.patch).collect(),
            is_snapshot,
        };
        Ok(Delivery::event(SubscriptionEvent::ItemUpdate(update)))
    }

    fn command_update(
        &mut self,
        index: usize,
        item_pos: usize,
        item_name: Option<String>,
        decoded: Vec<DecodedField>,
        is_snapshot: bool,
    ) -> Result<Delivery, LightstreamerError> {
        let key_index = self
            .key_index
            .ok_or_else(|| LightstreamerError::protocol("key position unknown"))?;
        let command_index = self
            .command_index
            .ok_or_else(|| LightstreamerError::protocol("command position unknown"))?;
        let key = decoded
            .get(key_index)
            .and_then(|field| field.value.clone())
            .ok_or_else(|| LightstreamerError::protocol("COMMAND update without key"))?;
        let command = decoded
            .get(command_index)
            .and_then(|field| field.value.clone())
            .ok_or_else(|| LightstreamerError::protocol("COMMAND update without command"))?;

        let width = self.first_level_fields + self.second_level_fields;
        let two_level = self.config.two_level;
        let item = &mut self.items[index];
        let exists = item.rows.contains_key(&key);
        let mut delivery = Delivery::default();

        let (values, changed, patches) = match command.as_str() {
            "DELETE" => {
                if let Some(second_level) = item.rows.remove(&key).and_then(|row| row.second_level)
                {
                    delivery.actions.push(SecondLevelAction::Close {
                        subscription_id: second_level.subscription_id,
                    });
                }
                let mut values = vec![None; width];
                values[key_index] = Some(key.clone());
                values[command_index] = Some(command.clone());
                let mut changed = vec![true; width];
                changed[key_index] = false;
                (values, changed, vec![None; width])
            }
            "ADD" | "UPDATE" => {
                let command = if exists { "UPDATE" } else { "ADD" };
                let row = item.rows.entry(key.clone()).or_insert_with(|| KeyRow {
                    values: vec![None; width],
                    second_level: None,
                });
                let mut changed = vec![false; width];
                let mut patches = vec![None; width];
                for (position, field) in decoded.into_iter().enumerate() {
                    let value = if position == command_index {
                        Some(command.to_string())
                    } else {
                        field.value
                    };
                    changed[position] = !exists || row.values[position] != value;
                    row.values[position] = value;
                    patches[position] = field.patch;
                }

                if !exists && two_level {
                    if is_valid_item_name(&key) {
                        delivery.actions.push(SecondLevelAction::Open {
                            item_pos,
                            key: key.clone(),
                        });
                    } else {
                        debug!("key '{}' is not a valid second-level item name", key);
                        delivery.events.push(SubscriptionEvent::SecondLevelError {
                            code: SubscriptionErrorCode::InvalidSecondLevelKey.code(),
                            message: Some(
                                SubscriptionErrorCode::InvalidSecondLevelKey
                                    .description()
                                    .to_string(),
                            ),
                            key: key.clone(),
                        });
                    }
                }
                (row.values.clone(), changed, patches)
            }
            other => {
                return Err(LightstreamerError::protocol(format!(
                    "unknown COMMAND operation '{}'",
                    other
                )));
            }
        };

        trace!("{} {} on item {}", command, key, item_pos);
        // the update is delivered before any error about its second-level item
        delivery.events.insert(
            0,
            SubscriptionEvent::ItemUpdate(ItemUpdate {
                item_name,
                item_pos,
                fields: self.fields.clone(),
                values,
                changed,
                patches,
                is_snapshot,
            }),
        );
        Ok(delivery)
    }

    pub(crate) fn end_of_snapshot(
        &mut self,
        item_pos: usize,
    ) -> Result<SubscriptionEvent, LightstreamerError> {
        let index = self.index(item_pos)?;
        self.items[index].snapshot_ended = true;
        Ok(SubscriptionEvent::EndOfSnapshot {
            item_name: self.item_name(item_pos),
            item_pos,
        })
    }

    pub(crate) fn clear_snapshot(&mut self, item_pos: usize) -> Result<Delivery, LightstreamerError> {
        let index = self.index(item_pos)?;
        let actions = self.items[index]
            .rows
            .drain()
            .filter_map(|(_, row)| row.second_level)
            .map(|second_level| SecondLevelAction::Close {
                subscription_id: second_level.subscription_id,
            })
            .collect();
        Ok(Delivery {
            events: vec![SubscriptionEvent::ClearSnapshot {
                item_name: self.item_name(item_pos),
                item_pos,
            }],
            actions,
        })
    }

    pub(crate) fn lost_updates(
        &self,
        item_pos: usize,
        lost_updates: u32,
    ) -> Result<SubscriptionEvent, LightstreamerError> {
        self.index(item_pos)?;
        Ok(SubscriptionEvent::ItemLostUpdates {
            item_name: self.item_name(item_pos),
            item_pos,
            lost_updates,
        })
    }

    /// Ids of every open second-level subscription; the key tables are emptied.
    pub(crate) fn close_second_levels(&mut self) -> Vec<usize> {
        self.items
            .iter_mut()
            .flat_map(|item| item.rows.drain())
            .filter_map(|(_, row)| row.second_level)
            .map(|second_level| second_level.subscription_id)
            .collect()
    }

    pub(crate) fn attach_second_level(&mut self, item_pos: usize, key: &str, subscription_id: usize) {
        if let Some(row) = item_pos
            .checked_sub(1)
            .and_then(|index| self.items.get_mut(index))
            .and_then(|item| item.rows.get_mut(key))
        {
            row.second_level = Some(SecondLevelRow {
                subscription_id,
                received_first: false,
            });
        }
    }

    /// Records the number of second-level fields once the server reports it. Only needed when
    /// the second level uses a field schema.
    pub(crate) fn second_level_confirmed(&mut self, fields: usize) {
        if self.second_level_fields == fields {
            return;
        }
        self.second_level_fields = fields;
        let width = self.first_level_fields + fields;
        let mut map = FieldMap::new(self.config.field_names.as_deref(), self.first_level_fields);
        map.append(self.config.second_level_names.as_deref(), fields);
        self.fields = Arc::new(map);
        for item in &mut self.items {
            for row in item.rows.values_mut() {
                row.values.resize(width, None);
            }
        }
    }

    /// Applies an update of a second-level item to the row of its key.
    pub(crate) fn second_level_update(
        &mut self,
        item_pos: usize,
        key: &str,
        raw: &str,
    ) -> Result<Vec<SubscriptionEvent>, LightstreamerError> {
        let index = self.index(item_pos)?;
        let item_name = self.item_name(item_pos);
        let first = self.first_level_fields;
        let width = first + self.second_level_fields;

        let Some(row) = self.items[index].rows.get_mut(key) else {
            // the key was deleted while the update was in flight
            return Ok(Vec::new());
        };
        let decoded = decode_update(raw, &row.values[first..width])?;
        let is_snapshot = match row.second_level.as_mut() {
            Some(second_level) => !std::mem::replace(&mut second_level.received_first, true),
            None => false,
        };

        let mut changed = vec![false; width];
        let mut patches = vec![None; width];
        for (offset, field) in decoded.into_iter().enumerate() {
            row.values[first + offset] = field.value;
            changed[first + offset] = field.changed;
            patches[first + offset] = field.patch;
        }

        Ok(vec![SubscriptionEvent::ItemUpdate(ItemUpdate {
            item_name,
            item_pos,
            fields: self.fields.clone(),
            values: row.values.clone(),
            changed,
            patches,
            is_snapshot,
        })])
    }

    pub(crate) fn detach_second_level(&mut self, item_pos: usize, key: &str) {
        if let Some(row) = item_pos
            .checked_sub(1)
            .and_then(|index| self.items.get_mut(index))
            .and_then(|item| item.rows.get_mut(key))
        {
            row.second_level = None;
        }
    }
}
