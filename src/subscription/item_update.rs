/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 18/10/26
******************************************************************************/
use crate::utils::LightstreamerError;
use json_patch::Patch;
use std::collections::HashMap;
use std::sync::Arc;

/// Identifies an item or a field either by name or by its 1-based position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Locator<'a> {
    /// Name as it appears in the item or field list.
    Name(&'a str),
    /// 1-based position within the item or field list (or group, or schema).
    Position(usize),
}

impl<'a> From<&'a str> for Locator<'a> {
    fn from(name: &'a str) -> Self {
        Locator::Name(name)
    }
}

impl<'a> From<&'a String> for Locator<'a> {
    fn from(name: &'a String) -> Self {
        Locator::Name(name.as_str())
    }
}

impl From<usize> for Locator<'_> {
    fn from(position: usize) -> Self {
        Locator::Position(position)
    }
}

/// Positions and names of the fields carried by the updates of a subscription.
///
/// Names are only known when the subscription was made with a field list. For two-level
/// subscriptions the second-level fields follow the first-level ones; a name present at both
/// levels resolves to the first-level field.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct FieldMap {
    names: Vec<Option<String>>,
    positions: HashMap<String, usize>,
}

impl FieldMap {
    pub(crate) fn new(names: Option<&[String]>, count: usize) -> Self {
        let mut map = Self::default();
        map.append(names, count);
        map
    }

    /// Appends `count` fields after the current ones.
    pub(crate) fn append(&mut self, names: Option<&[String]>, count: usize) {
        for index in 0..count {
            let name = names.and_then(|names| names.get(index)).cloned();
            if let Some(name) = &name {
                let position = self.names.len();
                self.positions.entry(name.clone()).or_insert(position);
            }
            self.names.push(name);
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.names.len()
    }

    pub(crate) fn name(&self, index: usize) -> Option<&str> {
        self.names.get(index).and_then(|name| name.as_deref())
    }

    /// 0-based index of the field.
    pub(crate) fn resolve(&self, field: Locator<'_>) -> Result<usize, LightstreamerError> {
        match field {
            Locator::Name(name) => self.positions.get(name).copied().ok_or_else(|| {
                LightstreamerError::illegal_argument(format!("unknown field '{}'", name))
            }),
            Locator::Position(position) if position >= 1 && position <= self.names.len() => {
                Ok(position - 1)
            }
            Locator::Position(position) => Err(LightstreamerError::illegal_argument(format!(
                "field position {} out of range",
                position
            ))),
        }
    }
}

/// Contains all the information related to an update of the field values for an item.
///
/// It reports all the new values of the fields. Instances are immutable and cheap to clone;
/// the same update is handed to every listener of the subscription.
///
/// COMMAND subscriptions carry the values of the key the update refers to. For two-level
/// subscriptions the second-level fields follow the first-level ones.
#[derive(Debug, Clone)]
pub struct ItemUpdate {
    pub(crate) item_name: Option<String>,
    pub(crate) item_pos: usize,
    pub(crate) fields: Arc<FieldMap>,
    pub(crate) values: Vec<Option<String>>,
    pub(crate) changed: Vec<bool>,
    pub(crate) patches: Vec<Option<Patch>>,
    pub(crate) is_snapshot: bool,
}

impl ItemUpdate {
    /// Name of the item, or `None` when the subscription was made with an item group.
    pub fn get_item_name(&self) -> Option<&str> {
        self.item_name.as_deref()
    }

    /// 1-based position of the item within the item list or group.
    pub fn get_item_pos(&self) -> usize {
        self.item_pos
    }

    /// Whether this update belongs to the snapshot of the item.
    ///
    /// In MERGE mode only the first update can be a snapshot; in DISTINCT and COMMAND modes
    /// every update received before the end-of-snapshot notification is. RAW updates never are.
    pub fn is_snapshot(&self) -> bool {
        self.is_snapshot
    }

    /// Current value of a field. `Ok(None)` means the field is null.
    ///
    /// # Errors
    ///
    /// Illegal argument if the field name is not part of the field list, or the position is
    /// out of range.
    pub fn get_value<'a>(
        &self,
        field: impl Into<Locator<'a>>,
    ) -> Result<Option<&str>, LightstreamerError> {
        let index = self.fields.resolve(field.into())?;
        Ok(self.values.get(index).and_then(|value| value.as_deref()))
    }

    /// Whether the value of a field changed with this update.
    ///
    /// # Errors
    ///
    /// Illegal argument for an unknown field.
    pub fn is_value_changed<'a>(
        &self,
        field: impl Into<Locator<'a>>,
    ) -> Result<bool, LightstreamerError> {
        let index = self.fields.resolve(field.into())?;
        Ok(self.changed.get(index).copied().unwrap_or(false))
    }

    /// The JSON Patch the server used to compute the new value of a field, when it sent the
    /// change in that form.
    ///
    /// # Errors
    ///
    /// Illegal argument for an unknown field.
    pub fn get_value_as_json_patch_if_available<'a>(
        &self,
        field: impl Into<Locator<'a>>,
    ) -> Result<Option<&Patch>, LightstreamerError> {
        let index = self.fields.resolve(field.into())?;
        Ok(self.patches.get(index).and_then(Option::as_ref))
    }

    /// Values of all the fields, by name. Empty when the subscription uses a field schema.
    pub fn get_fields(&self) -> HashMap<String, Option<String>> {
        self.named(|_| true)
    }

    /// Values of all the fields, by 1-based position.
    pub fn get_fields_by_position(&self) -> HashMap<usize, Option<String>> {
        self.positioned(|_| true)
    }

    /// Values of the fields changed by this update, by name.
    pub fn get_changed_fields(&self) -> HashMap<String, Option<String>> {
        self.named(|index| self.changed.get(index).copied().unwrap_or(false))
    }

    /// Values of the fields changed by this update, by 1-based position.
    pub fn get_changed_fields_by_position(&self) -> HashMap<usize, Option<String>> {
        self.positioned(|index| self.changed.get(index).copied().unwrap_or(false))
    }

    fn named(&self, include: impl Fn(usize) -> bool) -> HashMap<String, Option<String>> {
        let mut fields = HashMap::new();
        for (index, value) in self.values.iter().enumerate() {
            if !include(index) {
                continue;
            }
            if let Some(name) = self.fields.name(index) {
                // first-level names shadow second-level ones
                fields.entry(name.to_string()).or_insert_with(|| value.clone());
            }
        }
        fields
    }

    fn positioned(&self, include: impl Fn(usize) -> bool) -> HashMap<usize, Option<String>> {
        self.values
            .iter()
            .enumerate()
            .filter(|(index, _)| include(*index))
            .map(|(index, value)| (index + 1, value.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn update() -> ItemUpdate {
        ItemUpdate {
            item_name: Some("item1".to_string()),
            item_pos: 1,
            fields: Arc::new(FieldMap::new(
                Some(&names(&["last_price", "time", "pct_change"])),
                3,
            )),
            values: vec![Some("10.5".to_string()), Some("12:00".to_string()), None],
            changed: vec![true, false, true],
            patches: vec![None, None, None],
            is_snapshot: true,
        }
    }

    #[test]
    fn test_get_value_by_name_and_position() {
        let update = update();
        assert_eq!(update.get_item_name(), Some("item1"));
        assert_eq!(update.get_item_pos(), 1);
        assert!(update.is_snapshot());
        assert_eq!(update.get_value("last_price").unwrap(), Some("10.5"));
        assert_eq!(update.get_value(2).unwrap(), Some("12:00"));
        assert_eq!(update.get_value("pct_change").unwrap(), None);
    }

    #[test]
    fn test_unknown_fields_are_rejected() {
        let update = update();
        assert!(update.get_value("bid").unwrap_err().is_illegal_argument());
        assert!(update.get_value(0).unwrap_err().is_illegal_argument());
        assert!(update.get_value(4).unwrap_err().is_illegal_argument());
        assert!(update.is_value_changed("bid").is_err());
        assert!(update.get_value_as_json_patch_if_available("bid").is_err());
    }

    #[test]
    fn test_changed_fields() {
        let update = update();
        assert!(update.is_value_changed("last_price").unwrap());
        assert!(!update.is_value_changed("time").unwrap());

        let changed = update.get_changed_fields();
        assert_eq!(changed.len(), 2);
        assert_eq!(changed.get("last_price"), Some(&Some("10.5".to_string())));
        assert_eq!(changed.get("pct_change"), Some(&None));

        let changed = update.get_changed_fields_by_position();
        assert_eq!(changed.len(), 2);
        assert!(changed.contains_key(&1));
        assert!(changed.contains_key(&3));

        assert_eq!(update.get_fields().len(), 3);
        assert_eq!(update.get_fields_by_position().len(), 3);
    }

    #[test]
    fn test_schema_fields_have_no_names() {
        let update = ItemUpdate {
            fields: Arc::new(FieldMap::new(None, 2)),
            values: vec![Some("a".to_string()), Some("b".to_string())],
            changed: vec![true, true],
            patches: vec![None, None],
            ..update()
        };
        assert!(update.get_fields().is_empty());
        assert_eq!(update.get_value(2).unwrap(), Some("b"));
        assert!(update.get_value("last_price").is_err());
    }

    #[test]
    fn test_first_level_name_wins_on_collision() {
        let mut map = FieldMap::new(Some(&names(&["key", "command", "price"])), 3);
        map.append(Some(&names(&["price", "volume"])), 2);
        assert_eq!(map.len(), 5);
        assert_eq!(map.resolve(Locator::Name("price")).unwrap(), 2);
        assert_eq!(map.resolve(Locator::Name("volume")).unwrap(), 4);
        assert_eq!(map.resolve(Locator::Position(4)).unwrap(), 3);
    }
}
