//! Kernel module options dialect (`/etc/modprobe.d/wfb.conf`)
//!
//! The file is mostly opaque to us. Only `name=value` pairs inside an
//! `options <module> ...` line are exposed, and only the configured
//! writable names may be changed.

use std::sync::OnceLock;

use fpvconf_core::Dialect;
use regex::Regex;
use tracing::debug;

use crate::document::{is_ignorable, RawConfigDocument, Rewriter, ValueSlot};
use crate::error::{CodecError, CodecResult};
use crate::flat::is_bare_key;
use crate::map::ConfigMap;
use crate::ConfigCodec;

/// Transmit power override understood by the rtl88xx WFB drivers
pub const TX_POWER_OVERRIDE: &str = "rtw_tx_pwr_idx_override";

fn options_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*options\s+(\S+)\s+(.*\S)\s*$").expect("valid options regex"))
}

fn sub_key_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?:^|\s)(\w+)=(\S*)").expect("valid sub-key regex"))
}

/// Codec for `options <module> name=value ...` lines
#[derive(Debug, Clone)]
pub struct DriverOptionsCodec {
    /// Only lines for this module are considered; `None` accepts any
    module: Option<String>,
    writable: Vec<String>,
}

impl Default for DriverOptionsCodec {
    fn default() -> Self {
        Self {
            module: None,
            writable: vec![TX_POWER_OVERRIDE.to_string()],
        }
    }
}

impl DriverOptionsCodec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict parsing to one kernel module (e.g. `88XXau_wfb`)
    pub fn for_module(module: impl Into<String>) -> Self {
        Self {
            module: Some(module.into()),
            ..Self::default()
        }
    }

    /// Replace the set of writable option names
    pub fn with_writable<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.writable = names.into_iter().map(Into::into).collect();
        self
    }

    fn is_writable(&self, key: &str) -> bool {
        self.writable.iter().any(|w| w == key)
    }

    fn module_label(&self) -> String {
        self.module.clone().unwrap_or_else(|| "any module".to_string())
    }
}

impl ConfigCodec for DriverOptionsCodec {
    fn dialect(&self) -> Dialect {
        Dialect::DriverOptions
    }

    fn parse(&self, text: &str) -> CodecResult<(ConfigMap, RawConfigDocument)> {
        let mut doc = RawConfigDocument::new(Dialect::DriverOptions, text);

        for idx in 0..doc.lines.len() {
            let line = doc.lines[idx].text.clone();
            if is_ignorable(&line) {
                continue;
            }
            let Some(caps) = options_regex().captures(&line) else {
                continue;
            };
            let (Some(module), Some(options)) = (caps.get(1), caps.get(2)) else {
                continue;
            };
            if self.module.as_deref().is_some_and(|m| m != module.as_str()) {
                continue;
            }
            debug!(module = module.as_str(), line = idx + 1, "Found options line");

            if doc.options_anchor.is_none() {
                doc.options_anchor = Some((idx, options.end()));
            }

            for sub in sub_key_regex().captures_iter(options.as_str()) {
                let (Some(name), Some(value)) = (sub.get(1), sub.get(2)) else {
                    continue;
                };
                doc.define(
                    name.as_str().to_string(),
                    ValueSlot {
                        line: idx,
                        start: options.start() + value.start(),
                        end: options.start() + value.end(),
                        quote: None,
                        value: value.as_str().to_string(),
                        pad: false,
                    },
                );
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
            let current = doc.slots.get(key);
            if current.is_some_and(|slot| slot.value == value) {
                continue;
            }
            if !self.is_writable(key) {
                return Err(CodecError::ReadOnly(key.to_string()));
            }
            if value.is_empty() || value.chars().any(char::is_whitespace) {
                return Err(CodecError::InvalidValue {
                    key: key.to_string(),
                    reason: "module options must be a single non-empty token".into(),
                });
            }

            match current {
                Some(slot) => rw.replace_value(slot, value.to_string()),
                None => {
                    if !is_bare_key(key) {
                        return Err(CodecError::InvalidKey {
                            key: key.to_string(),
                            reason: "option names must be word characters".into(),
                        });
                    }
                    let (line, offset) = doc
                        .options_anchor
                        .ok_or_else(|| CodecError::MissingOptionsLine(self.module_label()))?;
                    rw.replace_range(line, offset, offset, format!(" {}={}", key, value));
                }
            }
        }

        Ok(rw.render())
    }
}
