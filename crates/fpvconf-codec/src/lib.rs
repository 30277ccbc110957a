//! Round-trip codecs for OpenIPC configuration files
//!
//! Every codec turns the text of a device file into a [`ConfigMap`] plus a
//! [`RawConfigDocument`] that remembers the exact layout. Serialising the
//! document with a set of updates rewrites only the values that changed;
//! comments, spacing, ordering and line endings of everything else are kept
//! byte for byte.
//!
//! ```
//! use fpvconf_codec::{ConfigCodec, ConfigMap, FlatCodec};
//!
//! let codec = FlatCodec::new();
//! let (_, doc) = codec.parse("unit=drone\nchannel=161\n").unwrap();
//! let updates: ConfigMap = [("channel", "36")].into_iter().collect();
//! assert_eq!(codec.serialize(&doc, &updates).unwrap(), "unit=drone\nchannel=36\n");
//! ```

pub mod document;
pub mod driver;
pub mod error;
pub mod flat;
pub mod map;
pub mod nested;
pub mod sectioned;
pub mod settings;

use fpvconf_core::Dialect;

pub use document::{LineEnding, RawConfigDocument, RawLine, SectionSpan, ValueSlot};
pub use driver::{DriverOptionsCodec, TX_POWER_OVERRIDE};
pub use error::{CodecError, CodecResult, ParseWarning, WarningReason};
pub use flat::FlatCodec;
pub use map::{ConfigMap, Field, Parsed};
pub use nested::NestedCodec;
pub use sectioned::SectionedCodec;
pub use settings::{
    DriverSettings, MajesticSettings, TelemetrySettings, WfbSettings, WifibroadcastSettings,
};

/// A parser/serialiser pair for one configuration dialect
///
/// `serialize(doc, parse(text).0)` must return `text` unchanged, and a value
/// written with `serialize` must read back through `parse`.
pub trait ConfigCodec: Send + Sync {
    /// Dialect handled by this codec
    fn dialect(&self) -> Dialect;

    /// Parse file text into a key/value map plus its layout
    fn parse(&self, text: &str) -> CodecResult<(ConfigMap, RawConfigDocument)>;

    /// Render `doc` with `updates` applied
    ///
    /// Keys in `updates` whose value equals the parsed one are left alone.
    /// Keys not in `updates` are never touched.
    fn serialize(&self, doc: &RawConfigDocument, updates: &ConfigMap) -> CodecResult<String>;
}

/// Default codec for a dialect
pub fn codec_for(dialect: Dialect) -> Box<dyn ConfigCodec> {
    match dialect {
        Dialect::Flat => Box::new(FlatCodec::new()),
        Dialect::Sectioned => Box::new(SectionedCodec::new()),
        Dialect::DriverOptions => Box::new(DriverOptionsCodec::new()),
        Dialect::Nested => Box::new(NestedCodec::new()),
    }
}

/// Parse `text` and return it with `updates` applied
pub fn apply_update(
    codec: &dyn ConfigCodec,
    text: &str,
    updates: &ConfigMap,
) -> CodecResult<String> {
    let (_, doc) = codec.parse(text)?;
    codec.serialize(&doc, updates)
}
