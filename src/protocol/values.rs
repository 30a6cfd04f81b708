/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 18/10/26
******************************************************************************/

//! Decoding of the field values carried by an update (`U`) notification.
//!
//! Values are separated by `|` and each one is either:
//!
//! - empty: the field did not change since the previous update of the same item;
//! - `#`: the field is null;
//! - `$`: the field is an empty string;
//! - `^N`: the next `N` fields did not change;
//! - `^P<patch>`: a JSON Patch (RFC 6902) to apply to the previous value;
//! - `^T<diff>`: a TLCP-diff to apply to the previous value;
//! - anything else: the percent-encoded new value.

use crate::utils::LightstreamerError;
use json_patch::Patch;

/// One field of a decoded update.
#[derive(Debug, Clone)]
pub(crate) struct DecodedField {
    /// Current value of the field after applying the update.
    pub value: Option<String>,
    /// `false` only when the server marked the field as unchanged.
    pub changed: bool,
    /// The JSON Patch the value was computed from, when the server sent one.
    pub patch: Option<Patch>,
}

impl DecodedField {
    fn unchanged(previous: &Option<String>) -> Self {
        Self {
            value: previous.clone(),
            changed: false,
            patch: None,
        }
    }

    fn changed(value: Option<String>) -> Self {
        Self {
            value,
            changed: true,
            patch: None,
        }
    }
}

fn percent_decode(raw: &str) -> Result<String, LightstreamerError> {
    urlencoding::decode(raw)
        .map(|decoded| decoded.into_owned())
        .map_err(|e| LightstreamerError::protocol(format!("invalid percent encoding: {}", e)))
}

/// Decodes the raw values of an update against the previous values of the same item.
///
/// The number of decoded fields must match `previous.len()`, which is the number of fields
/// announced by the server when the subscription was confirmed.
pub(crate) fn decode_update(
    raw: &str,
    previous: &[Option<String>],
) -> Result<Vec<DecodedField>, LightstreamerError> {
    let mut decoded = Vec::with_capacity(previous.len());

    for token in raw.split('|') {
        let index = decoded.len();
        if let Some(marker) = token.strip_prefix('^') {
            if let Some(patch) = marker.strip_prefix('P') {
                let base = lookup(previous, index)?;
                decoded.push(apply_json_patch(base, &percent_decode(patch)?)?);
            } else if let Some(diff) = marker.strip_prefix('T') {
                let base = lookup(previous, index)?;
                let base = base.as_deref().ok_or_else(|| {
                    LightstreamerError::protocol("TLCP-diff received for a null value")
                })?;
                let value = apply_tlcp_diff(base, &percent_decode(diff)?)?;
                decoded.push(DecodedField::changed(Some(value)));
            } else {
                let count: usize = marker.parse().map_err(|_| {
                    LightstreamerError::protocol(format!("invalid value marker '^{}'", marker))
                })?;
                for offset in 0..count {
                    let base = lookup(previous, index + offset)?;
                    decoded.push(DecodedField::unchanged(base));
                }
            }
            continue;
        }

        let base = lookup(previous, index)?;
        let field = match token {
            "" => DecodedField::unchanged(base),
            "#" => DecodedField::changed(None),
            "$" => DecodedField::changed(Some(String::new())),
            value => DecodedField::changed(Some(percent_decode(value)?)),
        };
        decoded.push(field);
    }

    if decoded.len() != previous.len() {
        return Err(LightstreamerError::protocol(format!(
            "update carries {} fields, {} expected",
            decoded.len(),
            previous.len()
        )));
    }
    Ok(decoded)
}

fn lookup(previous: &[Option<String>], index: usize) -> Result<&Option<String>, LightstreamerError> {
    previous.get(index).ok_or_else(|| {
        LightstreamerError::protocol(format!(
            "update carries more than {} fields",
            previous.len()
        ))
    })
}

fn apply_json_patch(
    base: &Option<String>,
    patch_text: &str,
) -> Result<DecodedField, LightstreamerError> {
    let base = base
        .as_deref()
        .ok_or_else(|| LightstreamerError::protocol("JSON Patch received for a null value"))?;
    let mut document: serde_json::Value = serde_json::from_str(base)
        .map_err(|e| LightstreamerError::protocol(format!("previous value is not JSON: {}", e)))?;
    let patch: Patch = serde_json::from_str(patch_text)
        .map_err(|e| LightstreamerError::protocol(format!("invalid JSON Patch: {}", e)))?;
    json_patch::patch(&mut document, &patch)
        .map_err(|e| LightstreamerError::protocol(format!("cannot apply JSON Patch: {}", e)))?;
    let value = serde_json::to_string(&document)
        .map_err(|e| LightstreamerError::protocol(format!("cannot serialize patched value: {}", e)))?;
    Ok(DecodedField {
        value: Some(value),
        changed: true,
        patch: Some(patch),
    })
}

/// Reads one TLCP-diff count: uppercase letters are leading base-26 digits,
/// a lowercase letter is the last one.
fn read_count(diff: &mut std::iter::Peekable<std::str::Chars<'_>>) -> Result<usize, LightstreamerError> {
    let mut count = 0usize;
    loop {
        let c = diff
            .next()
            .ok_or_else(|| LightstreamerError::protocol("truncated TLCP-diff count"))?;
        match c {
            'A'..='Z' => count = count * 26 + (c as usize - 'A' as usize),
            'a'..='z' => return Ok(count * 26 + (c as usize - 'a' as usize)),
            other => {
                return Err(LightstreamerError::protocol(format!(
                    "invalid TLCP-diff count character '{}'",
                    other
                )));
            }
        }
    }
}

/// Applies a TLCP-diff: a cycle of copy, add and delete commands, each introduced by a
/// count. The add command is followed by the characters to insert. Offsets are counted in
/// characters.
pub(crate) fn apply_tlcp_diff(base: &str, diff: &str) -> Result<String, LightstreamerError> {
    let source: Vec<char> = base.chars().collect();
    let mut output = String::with_capacity(base.len());
    let mut position = 0usize;
    let mut commands = diff.chars().peekable();

    let out_of_range = || LightstreamerError::protocol("TLCP-diff exceeds the previous value");

    loop {
        if commands.peek().is_none() {
            break;
        }
        let copy = read_count(&mut commands)?;
        let end = position.checked_add(copy).filter(|end| *end <= source.len()).ok_or_else(out_of_range)?;
        output.extend(&source[position..end]);
        position = end;

        if commands.peek().is_none() {
            break;
        }
        let add = read_count(&mut commands)?;
        for _ in 0..add {
            let c = commands
                .next()
                .ok_or_else(|| LightstreamerError::protocol("truncated TLCP-diff insertion"))?;
            output.push(c);
        }

        if commands.peek().is_none() {
            break;
        }
        let delete = read_count(&mut commands)?;
        position = position.checked_add(delete).filter(|end| *end <= source.len()).ok_or_else(out_of_range)?;
    }

    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values(values: &[Option<&str>]) -> Vec<Option<String>> {
        values.iter().map(|v| v.map(|s| s.to_string())).collect()
    }

    #[test]
    fn test_plain_values_are_percent_decoded() {
        let decoded = decode_update("a%7Cb|12.5|x%25", &values(&[None, None, None])).unwrap();
        assert_eq!(decoded[0].value.as_deref(), Some("a|b"));
        assert_eq!(decoded[1].value.as_deref(), Some("12.5"));
        assert_eq!(decoded[2].value.as_deref(), Some("x%"));
        assert!(decoded.iter().all(|f| f.changed));
    }

    #[test]
    fn test_plus_is_not_a_space() {
        let decoded = decode_update("1+1", &values(&[None])).unwrap();
        assert_eq!(decoded[0].value.as_deref(), Some("1+1"));
    }

    #[test]
    fn test_null_empty_and_unchanged() {
        let previous = values(&[Some("old"), Some("keep"), Some("x")]);
        let decoded = decode_update("#||$", &previous).unwrap();
        assert_eq!(decoded[0].value, None);
        assert!(decoded[0].changed);
        assert_eq!(decoded[1].value.as_deref(), Some("keep"));
        assert!(!decoded[1].changed);
        assert_eq!(decoded[2].value.as_deref(), Some(""));
        assert!(decoded[2].changed);
    }

    #[test]
    fn test_skip_marker() {
        let previous = values(&[Some("a"), Some("b"), Some("c"), Some("d")]);
        let decoded = decode_update("^3|z", &previous).unwrap();
        assert_eq!(
            decoded.iter().map(|f| f.value.as_deref()).collect::<Vec<_>>(),
            vec![Some("a"), Some("b"), Some("c"), Some("z")]
        );
        assert_eq!(
            decoded.iter().map(|f| f.changed).collect::<Vec<_>>(),
            vec![false, false, false, true]
        );
    }

    #[test]
    fn test_field_count_mismatch() {
        let err = decode_update("a|b", &values(&[None, None, None])).unwrap_err();
        assert!(matches!(err, LightstreamerError::Protocol(_)));

        let err = decode_update("a|b|c", &values(&[None, None])).unwrap_err();
        assert!(matches!(err, LightstreamerError::Protocol(_)));

        let err = decode_update("^5", &values(&[None, None])).unwrap_err();
        assert!(matches!(err, LightstreamerError::Protocol(_)));
    }

    #[test]
    fn test_invalid_marker() {
        let err = decode_update("^x", &values(&[None])).unwrap_err();
        assert!(matches!(err, LightstreamerError::Protocol(_)));
    }

    #[test]
    fn test_json_patch() {
        let previous = values(&[Some(r#"{"bid":1,"ask":2}"#)]);
        let patch = urlencoding::encode(r#"[{"op":"replace","path":"/bid","value":3}]"#);
        let decoded = decode_update(&format!("^P{}", patch), &previous).unwrap();
        let value: serde_json::Value =
            serde_json::from_str(decoded[0].value.as_deref().unwrap()).unwrap();
        assert_eq!(value, serde_json::json!({"bid": 3, "ask": 2}));
        assert!(decoded[0].changed);
        assert!(decoded[0].patch.is_some());
    }

    #[test]
    fn test_json_patch_on_null_value_fails() {
        let err = decode_update("^P%5B%5D", &values(&[None])).unwrap_err();
        assert!(matches!(err, LightstreamerError::Protocol(_)));
    }

    #[test]
    fn test_tlcp_diff() {
        // copy 5 ("hello"), add 6 (" there"), delete 6 (" world"), copy 1 ("!")
        assert_eq!(
            apply_tlcp_diff("hello world!", "fg theregb").unwrap(),
            "hello there!"
        );
        // copy everything
        assert_eq!(apply_tlcp_diff("abc", "d").unwrap(), "abc");
        // replace everything
        assert_eq!(apply_tlcp_diff("abc", "adxyzd").unwrap(), "xyz");
    }

    #[test]
    fn test_tlcp_diff_multi_digit_count() {
        let base = "x".repeat(30);
        // "Be" = 1 * 26 + 4 = 30
        assert_eq!(apply_tlcp_diff(&base, "Be").unwrap(), base);
    }

    #[test]
    fn test_tlcp_diff_out_of_range() {
        assert!(apply_tlcp_diff("abc", "z").is_err());
        assert!(apply_tlcp_diff("abc", "ab").is_err());
        assert!(apply_tlcp_diff("abc", "a1").is_err());
    }

    #[test]
    fn test_tlcp_diff_in_update() {
        let previous = values(&[Some("hello world!")]);
        let decoded = decode_update("^Tfg%20theregb", &previous).unwrap();
        assert_eq!(decoded[0].value.as_deref(), Some("hello there!"));
        assert!(decoded[0].patch.is_none());
    }
}
