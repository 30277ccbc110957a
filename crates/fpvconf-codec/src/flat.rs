//! `key=value` dialect (`/etc/wfb.conf`, `/etc/telemetry.conf`)

use std::sync::OnceLock;

use fpvconf_core::Dialect;
use regex::Regex;
use tracing::debug;

use crate::document::{is_ignorable, RawConfigDocument, Rewriter, ValueSlot};
use crate::error::{CodecError, CodecResult};
use crate::map::ConfigMap;
use crate::ConfigCodec;

fn key_value_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"^\s*(\w+)\s*=\s*['"]?(.*?)['"]?\s*(#.*)?$"#).expect("valid key/value regex")
    })
}

fn bare_key_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\w+$").expect("valid key regex"))
}

/// Match a `key = value  # comment` line, returning the key and its slot
pub(crate) fn match_key_value(line_idx: usize, line: &str) -> Option<(String, ValueSlot)> {
    let caps = key_value_regex().captures(line)?;
    let key = caps.get(1)?.as_str().to_string();
    let value = caps.get(2)?;
    let quote = line[..value.start()]
        .chars()
        .last()
        .filter(|c| *c == '"' || *c == '\'');
    Some((
        key,
        ValueSlot {
            line: line_idx,
            start: value.start(),
            end: value.end(),
            quote,
            value: value.as_str().to_string(),
            pad: false,
        },
    ))
}

pub(crate) fn is_bare_key(key: &str) -> bool {
    bare_key_regex().is_match(key)
}

/// Reject values the line grammar cannot carry: a line break would split
/// the line and `#` always starts a comment, even inside quotes
pub(crate) fn check_value(key: &str, value: &str) -> CodecResult<()> {
    if value.contains(['\r', '\n', '#']) {
        return Err(CodecError::InvalidValue {
            key: key.to_string(),
            reason: "line breaks and '#' cannot be stored in this file".into(),
        });
    }
    Ok(())
}

/// Render a value for a slot, adding `quote` when an unquoted value would
/// not survive a shell or INI reader
pub(crate) fn render_value(slot_quote: Option<char>, value: &str, quote: char) -> String {
    if slot_quote.is_some() {
        return value.to_string();
    }
    let needs_quotes = value
        .chars()
        .any(|c| c.is_whitespace() || c == '"' || c == '\'');
    if needs_quotes {
        format!("{quote}{value}{quote}")
    } else {
        value.to_string()
    }
}

/// Codec for flat `key=value` files with `#` comments
#[derive(Debug, Clone, Default)]
pub struct FlatCodec;

impl FlatCodec {
    pub fn new() -> Self {
        Self
    }
}

impl ConfigCodec for FlatCodec {
    fn dialect(&self) -> Dialect {
        Dialect::Flat
    }

    fn parse(&self, text: &str) -> CodecResult<(ConfigMap, RawConfigDocument)> {
        let mut doc = RawConfigDocument::new(Dialect::Flat, text);
        for idx in 0..doc.lines.len() {
            let line = &doc.lines[idx].text;
            if is_ignorable(line) {
                continue;
            }
            match match_key_value(idx, line) {
                Some((key, slot)) => doc.define(key, slot),
                None => debug!(line = idx + 1, "Keeping unrecognised line verbatim"),
            }
        }

        let map = doc
            .slots
            .iter()
            .map(|(k, slot)| (k.clone(), slot.value.clone()))
            .collect();
        Ok((map, doc))
    }

    fn serialize(&self, doc: &RawConfigDocument, updates: &ConfigMap) -> CodecResult<String> {
        let mut rw = Rewriter::new(doc);
        for (key, value) in updates.iter() {
            match doc.slots.get(key) {
                Some(slot) if slot.value == value => {}
                Some(slot) => {
                    check_value(key, value)?;
                    rw.replace_value(slot, render_value(slot.quote, value, '"'));
                }
                None => {
                    check_value(key, value)?;
                    if !is_bare_key(key) {
                        return Err(CodecError::InvalidKey {
                            key: key.to_string(),
                            reason: "flat keys must be word characters".into(),
                        });
                    }
                    debug!(key, "Appending new key");
                    rw.append(format!("{}={}", key, render_value(None, value, '"')));
                }
            }
        }
        Ok(rw.render())
    }
}
