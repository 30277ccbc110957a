//! INI style dialect with `[section]` headers (`/etc/wifibroadcast.cfg`)

use std::sync::OnceLock;

use fpvconf_core::Dialect;
use indexmap::IndexMap;
use regex::Regex;
use tracing::debug;

use crate::document::{is_ignorable, RawConfigDocument, Rewriter, SectionSpan};
use crate::error::{CodecError, CodecResult};
use crate::flat::{check_value, is_bare_key, match_key_value, render_value};
use crate::map::ConfigMap;
use crate::ConfigCodec;

fn section_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*\[(.*)\]\s*$").expect("valid section regex"))
}

/// Split `section.key` at the last dot
fn split_key(key: &str) -> (Option<&str>, &str) {
    match key.rsplit_once('.') {
        Some((section, local)) => (Some(section), local),
        None => (None, key),
    }
}

/// Codec for sectioned files; keys are exposed as `section.key`
///
/// Keys defined before the first header keep their bare name.
#[derive(Debug, Clone, Default)]
pub struct SectionedCodec;

impl SectionedCodec {
    pub fn new() -> Self {
        Self
    }
}

impl ConfigCodec for SectionedCodec {
    fn dialect(&self) -> Dialect {
        Dialect::Sectioned
    }

    fn parse(&self, text: &str) -> CodecResult<(ConfigMap, RawConfigDocument)> {
        let mut doc = RawConfigDocument::new(Dialect::Sectioned, text);
        let mut current: Option<usize> = None;

        for idx in 0..doc.lines.len() {
            let line = &doc.lines[idx].text;
            if is_ignorable(line) {
                continue;
            }
            if let Some(caps) = section_regex().captures(line) {
                let name = caps.get(1).map_or("", |m| m.as_str()).trim().to_string();
                doc.sections.push(SectionSpan {
                    name,
                    header_line: idx,
                    last_entry_line: None,
                });
                current = Some(doc.sections.len() - 1);
                continue;
            }
            let Some((key, slot)) = match_key_value(idx, line) else {
                debug!(line = idx + 1, "Keeping unrecognised line verbatim");
                continue;
            };
            let full_key = match current {
                Some(section_idx) => {
                    let span = &mut doc.sections[section_idx];
                    span.last_entry_line = Some(idx);
                    format!("{}.{}", span.name, key)
                }
                None => key,
            };
            doc.define(full_key, slot);
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
        // New keys grouped per section so a fresh section gets one header
        let mut new_sections: IndexMap<&str, Vec<String>> = IndexMap::new();

        for (key, value) in updates.iter() {
            if let Some(slot) = doc.slots.get(key) {
                if slot.value != value {
                    check_value(key, value)?;
                    rw.replace_value(slot, render_value(slot.quote, value, '\''));
                }
                continue;
            }

            let (section, local) = split_key(key);
            if !is_bare_key(local) {
                return Err(CodecError::InvalidKey {
                    key: key.to_string(),
                    reason: "expected [section.]key with word characters".into(),
                });
            }
            check_value(key, value)?;
            let line = format!("{} = {}", local, render_value(None, value, '\''));

            match section {
                None => match doc.sections.first() {
                    Some(first) => rw.insert_before(first.header_line, line),
                    None => rw.append(line),
                },
                Some(name) => match doc.sections.iter().find(|s| s.name == name) {
                    Some(span) => {
                        let after = span.last_entry_line.unwrap_or(span.header_line);
                        rw.insert_before(after + 1, line);
                    }
                    None => new_sections.entry(name).or_default().push(line),
                },
            }
        }

        for (name, lines) in new_sections {
            debug!(section = name, "Appending new section");
            rw.append(format!("[{}]", name));
            for line in lines {
                rw.append(line);
            }
        }

        Ok(rw.render())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const WIFIBROADCAST_CFG: &str = "\
# wifibroadcast settings
[common]
wifi_channel = 161     # radio channel
wifi_region = 'BO'

[gs_mavlink]
peer = 'connect://127.0.0.1:14550'  # outgoing connection

[gs_video]
peer = 'connect://127.0.0.1:5600'
";

    #[test]
    fn test_section_prefixes_keys() {
        let (map, _) = SectionedCodec::new()
            .parse("[gs_mavlink]\npeer = '1.2.3.4'\n")
            .unwrap();
        assert_eq!(map.get("gs_mavlink.peer"), Some("1.2.3.4"));
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn test_same_local_key_in_two_sections() {
        let (map, doc) = SectionedCodec::new().parse(WIFIBROADCAST_CFG).unwrap();
        assert_eq!(map.get("gs_mavlink.peer"), Some("connect://127.0.0.1:14550"));
        assert_eq!(map.get("gs_video.peer"), Some("connect://127.0.0.1:5600"));
        assert_eq!(map.get("common.wifi_channel"), Some("161"));
        assert_eq!(doc.sections().len(), 3);
    }

    #[test]
    fn test_roundtrip() {
        let codec = SectionedCodec::new();
        let (map, doc) = codec.parse(WIFIBROADCAST_CFG).unwrap();
        assert_eq!(codec.serialize(&doc, &map).unwrap(), WIFIBROADCAST_CFG);
    }

    #[test]
    fn test_update_one_section_only() {
        let codec = SectionedCodec::new();
        let (_, doc) = codec.parse(WIFIBROADCAST_CFG).unwrap();
        let updates: ConfigMap = [("gs_video.peer", "connect://192.168.1.20:5600")]
            .into_iter()
            .collect();
        let out = codec.serialize(&doc, &updates).unwrap();
        assert!(out.contains("peer = 'connect://127.0.0.1:14550'  # outgoing connection\n"));
        assert!(out.contains("peer = 'connect://192.168.1.20:5600'\n"));
    }

    #[test]
    fn test_update_keeps_comment() {
        let codec = SectionedCodec::new();
        let (_, doc) = codec.parse(WIFIBROADCAST_CFG).unwrap();
        let updates: ConfigMap = [("common.wifi_channel", "36")].into_iter().collect();
        let out = codec.serialize(&doc, &updates).unwrap();
        assert!(out.contains("wifi_channel = 36     # radio channel\n"));
    }

    #[test]
    fn test_append_into_existing_section() {
        let codec = SectionedCodec::new();
        let (_, doc) = codec.parse(WIFIBROADCAST_CFG).unwrap();
        let updates: ConfigMap = [("common.wifi_txpower", "20")].into_iter().collect();
        let out = codec.serialize(&doc, &updates).unwrap();
        assert!(out.contains("wifi_region = 'BO'\nwifi_txpower = 20\n\n[gs_mavlink]"));

        // The new key is still inside [common] after a reparse
        let (map, _) = codec.parse(&out).unwrap();
        assert_eq!(map.get("common.wifi_txpower"), Some("20"));
        assert_eq!(map.get("gs_mavlink.peer"), Some("connect://127.0.0.1:14550"));
    }

    #[test]
    fn test_append_new_section() {
        let codec = SectionedCodec::new();
        let (_, doc) = codec.parse("[common]\nwifi_channel = 161\n").unwrap();
        let updates: ConfigMap = [("drone_video.peer", "listen://0.0.0.0:5600"), ("drone_video.fec", "8")]
            .into_iter()
            .collect();
        assert_eq!(
            codec.serialize(&doc, &updates).unwrap(),
            "[common]\nwifi_channel = 161\n[drone_video]\npeer = listen://0.0.0.0:5600\nfec = 8\n"
        );
    }

    #[test]
    fn test_global_key_goes_before_first_section() {
        let codec = SectionedCodec::new();
        let (_, doc) = codec.parse("[common]\nwifi_channel = 161\n").unwrap();
        let updates: ConfigMap = [("version", "2")].into_iter().collect();
        assert_eq!(
            codec.serialize(&doc, &updates).unwrap(),
            "version = 2\n[common]\nwifi_channel = 161\n"
        );
    }

    #[test]
    fn test_empty_section_gets_first_entry() {
        let codec = SectionedCodec::new();
        let (_, doc) = codec.parse("[a]\n[b]\nx = 1\n").unwrap();
        let updates: ConfigMap = [("a.y", "2")].into_iter().collect();
        assert_eq!(codec.serialize(&doc, &updates).unwrap(), "[a]\ny = 2\n[b]\nx = 1\n");
    }

    #[test]
    fn test_hash_and_line_break_rejected() {
        let codec = SectionedCodec::new();
        let (_, doc) = codec.parse(WIFIBROADCAST_CFG).unwrap();
        for (key, value) in [
            ("common.wifi_channel", "36 # five"),
            ("gs_video.peer", "connect://x#1"),
            ("common.wifi_region", "BO\n[evil]"),
            ("drone_video.peer", "a\rb"),
        ] {
            let updates: ConfigMap = [(key, value)].into_iter().collect();
            assert!(
                matches!(
                    codec.serialize(&doc, &updates),
                    Err(CodecError::InvalidValue { .. })
                ),
                "{key} accepted {value:?}"
            );
        }
    }

    #[test]
    fn test_quote_chars_survive_reparse() {
        let codec = SectionedCodec::new();
        let (_, doc) = codec.parse(WIFIBROADCAST_CFG).unwrap();
        let updates: ConfigMap = [("common.wifi_channel", "a \"b\""), ("gs_video.peer", "it's")]
            .into_iter()
            .collect();
        let out = codec.serialize(&doc, &updates).unwrap();
        assert!(out.contains("wifi_channel = 'a \"b\"'     # radio channel\n"));
        assert!(out.contains("peer = 'it's'\n"));

        let (map, _) = codec.parse(&out).unwrap();
        assert_eq!(map.get("common.wifi_channel"), Some("a \"b\""));
        assert_eq!(map.get("gs_video.peer"), Some("it's"));
        assert_eq!(map.get("gs_mavlink.peer"), Some("connect://127.0.0.1:14550"));
    }
}
