/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 18/10/26
******************************************************************************/

//! Helpers to write the notification format of an MPN subscription.
//!
//! A format is the JSON payload sent to the push notification service. Its strings can
//! reference the fields of the subscription with `${field_name}` or `$[field_position]`
//! placeholders, replaced by the server with the latest values before each notification.

use crate::utils::LightstreamerError;
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Placeholders referenced by a notification format or trigger expression, in order of first
/// appearance, e.g. `["${last_price}", "$[2]"]`.
pub fn placeholders(format: &str) -> Vec<String> {
    let mut found: Vec<String> = Vec::new();
    let mut rest = format;
    while let Some(start) = rest.find('$') {
        let candidate = &rest[start..];
        let closing = match candidate.as_bytes().get(1) {
            Some(b'{') => Some('}'),
            Some(b'[') => Some(']'),
            _ => None,
        };
        let token = closing.and_then(|closing| {
            candidate[2..]
                .find(closing)
                .filter(|end| *end > 0)
                .map(|end| &candidate[..end + 3])
        });
        match token {
            Some(token) => {
                if !found.iter().any(|known| known == token) {
                    found.push(token.to_string());
                }
                rest = &candidate[token.len()..];
            }
            None => rest = &candidate[1..],
        }
    }
    found
}

/// Checks the placeholders of `text` against the field list of the subscription, when known.
pub(crate) fn check_placeholders(
    text: &str,
    fields: Option<&[String]>,
) -> Result<(), LightstreamerError> {
    let Some(fields) = fields else {
        return Ok(());
    };
    for token in placeholders(text) {
        let inner = &token[2..token.len() - 1];
        let known = if token.starts_with("${") {
            fields.iter().any(|field| field == inner)
        } else {
            inner
                .parse::<usize>()
                .is_ok_and(|position| position >= 1 && position <= fields.len())
        };
        if !known {
            return Err(LightstreamerError::illegal_argument(format!(
                "placeholder {} does not match any field",
                token
            )));
        }
    }
    Ok(())
}

/// Parses a notification format, which must be a JSON object.
pub(crate) fn parse_format(format: &str) -> Result<Map<String, Value>, LightstreamerError> {
    match serde_json::from_str::<Value>(format) {
        Ok(Value::Object(root)) => Ok(root),
        Ok(_) => Err(LightstreamerError::illegal_argument(
            "notification format must be a JSON object",
        )),
        Err(e) => Err(LightstreamerError::illegal_argument(format!(
            "invalid notification format: {}",
            e
        ))),
    }
}

fn get_path<'a>(root: &'a Map<String, Value>, path: &[&str]) -> Option<&'a Value> {
    let (last, parents) = path.split_last()?;
    let mut node = root;
    for key in parents {
        node = node.get(*key)?.as_object()?;
    }
    node.get(*last)
}

fn set_path(root: &mut Map<String, Value>, path: &[&str], value: Option<Value>) {
    let Some((last, parents)) = path.split_last() else {
        return;
    };
    let mut node = root;
    for key in parents {
        let entry = node
            .entry(key.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !entry.is_object() {
            *entry = Value::Object(Map::new());
        }
        node = match entry {
            Value::Object(map) => map,
            _ => return,
        };
    }
    match value {
        Some(value) => {
            node.insert(last.to_string(), value);
        }
        None => {
            node.remove(*last);
        }
    }
}

fn get_string(root: &Map<String, Value>, path: &[&str]) -> Option<String> {
    get_path(root, path)
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn get_string_map(root: &Map<String, Value>, path: &[&str]) -> Option<HashMap<String, String>> {
    get_path(root, path).and_then(Value::as_object).map(|map| {
        map.iter()
            .filter_map(|(key, value)| value.as_str().map(|value| (key.clone(), value.to_string())))
            .collect()
    })
}

fn string_map(map: Option<HashMap<String, String>>) -> Option<Value> {
    map.map(|map| {
        Value::Object(
            map.into_iter()
                .map(|(key, value)| (key, Value::String(value)))
                .collect(),
        )
    })
}

/// Builds the format of notifications for web push through Firebase Cloud Messaging:
/// `{"webpush":{"headers":{..},"notification":{"title":..,"body":..,"icon":..},"data":{..}}}`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FirebaseMpnBuilder {
    root: Map<String, Value>,
}

impl FirebaseMpnBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts from an existing format, e.g. the actual format of a subscription.
    pub fn from_format(format: &str) -> Result<Self, LightstreamerError> {
        Ok(Self {
            root: parse_format(format)?,
        })
    }

    /// The format as a JSON string.
    pub fn build(&self) -> String {
        Value::Object(self.root.clone()).to_string()
    }

    pub fn get_headers(&self) -> Option<HashMap<String, String>> {
        get_string_map(&self.root, &["webpush", "headers"])
    }

    pub fn set_headers(&mut self, headers: Option<HashMap<String, String>>) -> &mut Self {
        set_path(&mut self.root, &["webpush", "headers"], string_map(headers));
        self
    }

    pub fn get_title(&self) -> Option<String> {
        get_string(&self.root, &["webpush", "notification", "title"])
    }

    pub fn set_title(&mut self, title: Option<&str>) -> &mut Self {
        set_path(
            &mut self.root,
            &["webpush", "notification", "title"],
            title.map(|t| Value::String(t.to_string())),
        );
        self
    }

    pub fn get_body(&self) -> Option<String> {
        get_string(&self.root, &["webpush", "notification", "body"])
    }

    pub fn set_body(&mut self, body: Option<&str>) -> &mut Self {
        set_path(
            &mut self.root,
            &["webpush", "notification", "body"],
            body.map(|b| Value::String(b.to_string())),
        );
        self
    }

    pub fn get_icon(&self) -> Option<String> {
        get_string(&self.root, &["webpush", "notification", "icon"])
    }

    pub fn set_icon(&mut self, icon: Option<&str>) -> &mut Self {
        set_path(
            &mut self.root,
            &["webpush", "notification", "icon"],
            icon.map(|i| Value::String(i.to_string())),
        );
        self
    }

    pub fn get_data(&self) -> Option<HashMap<String, String>> {
        get_string_map(&self.root, &["webpush", "data"])
    }

    pub fn set_data(&mut self, data: Option<HashMap<String, String>>) -> &mut Self {
        set_path(&mut self.root, &["webpush", "data"], string_map(data));
        self
    }
}

/// Builds the format of notifications for Safari through APNs:
/// `{"aps":{"alert":{"title":..,"body":..,"action":..},"url-args":[..]}}`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SafariMpnBuilder {
    root: Map<String, Value>,
}

impl SafariMpnBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_format(format: &str) -> Result<Self, LightstreamerError> {
        Ok(Self {
            root: parse_format(format)?,
        })
    }

    pub fn build(&self) -> String {
        Value::Object(self.root.clone()).to_string()
    }

    pub fn get_title(&self) -> Option<String> {
        get_string(&self.root, &["aps", "alert", "title"])
    }

    pub fn set_title(&mut self, title: Option<&str>) -> &mut Self {
        set_path(
            &mut self.root,
            &["aps", "alert", "title"],
            title.map(|t| Value::String(t.to_string())),
        );
        self
    }

    pub fn get_body(&self) -> Option<String> {
        get_string(&self.root, &["aps", "alert", "body"])
    }

    pub fn set_body(&mut self, body: Option<&str>) -> &mut Self {
        set_path(
            &mut self.root,
            &["aps", "alert", "body"],
            body.map(|b| Value::String(b.to_string())),
        );
        self
    }

    /// Label of the action button.
    pub fn get_action(&self) -> Option<String> {
        get_string(&self.root, &["aps", "alert", "action"])
    }

    pub fn set_action(&mut self, action: Option<&str>) -> &mut Self {
        set_path(
            &mut self.root,
            &["aps", "alert", "action"],
            action.map(|a| Value::String(a.to_string())),
        );
        self
    }

    /// Arguments appended to the URL opened when the notification is clicked.
    pub fn get_url_arguments(&self) -> Option<Vec<String>> {
        get_path(&self.root, &["aps", "url-args"])
            .and_then(Value::as_array)
            .map(|args| {
                args.iter()
                    .filter_map(|arg| arg.as_str().map(str::to_string))
                    .collect()
            })
    }

    pub fn set_url_arguments(&mut self, arguments: Option<Vec<String>>) -> &mut Self {
        set_path(
            &mut self.root,
            &["aps", "url-args"],
            arguments.map(|args| Value::Array(args.into_iter().map(Value::String).collect())),
        );
        self
    }
}
