//! Line-preserving model of an original configuration file

use std::collections::BTreeMap;

use fpvconf_core::Dialect;
use indexmap::IndexMap;

/// Terminator that followed a line in the original text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineEnding {
    Lf,
    CrLf,
    /// Last line of a file without a trailing newline
    None,
}

impl LineEnding {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Lf => "\n",
            Self::CrLf => "\r\n",
            Self::None => "",
        }
    }
}

/// One original line, without its terminator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawLine {
    pub text: String,
    pub ending: LineEnding,
}

/// Location of a value inside the original text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueSlot {
    /// Line index
    pub line: usize,
    /// Byte range of the value inside the line, excluding quotes
    pub start: usize,
    pub end: usize,
    /// Quote character wrapping the value, if any
    pub quote: Option<char>,
    /// Current (unquoted) value
    pub value: String,
    /// Insert a separating space when filling an empty slot
    pub pad: bool,
}

/// `[section]` bookkeeping for the sectioned dialect
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionSpan {
    pub name: String,
    pub header_line: usize,
    /// Last `key = value` line inside the section
    pub last_entry_line: Option<usize>,
}

/// Original text plus everything needed to rebuild it
///
/// Lines the codec does not understand are kept verbatim; only value
/// slots are ever rewritten.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawConfigDocument {
    pub(crate) dialect: Dialect,
    pub(crate) lines: Vec<RawLine>,
    pub(crate) slots: IndexMap<String, ValueSlot>,
    pub(crate) sections: Vec<SectionSpan>,
    /// Insertion point for new driver options: (line, byte offset)
    pub(crate) options_anchor: Option<(usize, usize)>,
}

impl RawConfigDocument {
    pub(crate) fn new(dialect: Dialect, text: &str) -> Self {
        Self {
            dialect,
            lines: split_lines(text),
            slots: IndexMap::new(),
            sections: Vec::new(),
            options_anchor: None,
        }
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub fn lines(&self) -> &[RawLine] {
        &self.lines
    }

    /// Slot for a key, if the key is defined in the document
    pub fn slot(&self, key: &str) -> Option<&ValueSlot> {
        self.slots.get(key)
    }

    pub fn sections(&self) -> &[SectionSpan] {
        &self.sections
    }

    /// Original text, byte for byte
    pub fn original_text(&self) -> String {
        self.lines
            .iter()
            .map(|l| format!("{}{}", l.text, l.ending.as_str()))
            .collect()
    }

    /// Ending used for lines the codec appends
    pub(crate) fn preferred_ending(&self) -> LineEnding {
        self.lines
            .iter()
            .map(|l| l.ending)
            .find(|e| *e != LineEnding::None)
            .unwrap_or(LineEnding::Lf)
    }

    /// Record a slot; a later definition of the same key wins
    pub(crate) fn define(&mut self, key: String, slot: ValueSlot) {
        self.slots.shift_remove(&key);
        self.slots.insert(key, slot);
    }
}

/// Split on `\n` and `\r\n`, remembering which terminator each line had
pub(crate) fn split_lines(text: &str) -> Vec<RawLine> {
    let mut lines = Vec::new();
    let mut rest = text;
    while !rest.is_empty() {
        match rest.find('\n') {
            Some(idx) => {
                let (line, ending) = match rest[..idx].strip_suffix('\r') {
                    Some(stripped) => (stripped, LineEnding::CrLf),
                    None => (&rest[..idx], LineEnding::Lf),
                };
                lines.push(RawLine {
                    text: line.to_string(),
                    ending,
                });
                rest = &rest[idx + 1..];
            }
            None => {
                lines.push(RawLine {
                    text: rest.to_string(),
                    ending: LineEnding::None,
                });
                rest = "";
            }
        }
    }
    lines
}

/// Blank or `#` comment line
pub(crate) fn is_ignorable(line: &str) -> bool {
    let trimmed = line.trim_start();
    trimmed.is_empty() || trimmed.starts_with('#')
}

/// Accumulates edits against a document and renders the result
pub(crate) struct Rewriter<'a> {
    doc: &'a RawConfigDocument,
    replacements: BTreeMap<usize, Vec<(usize, usize, String)>>,
    /// Lines to insert before line index (`lines.len()` means end of file)
    inserts: BTreeMap<usize, Vec<String>>,
}

impl<'a> Rewriter<'a> {
    pub(crate) fn new(doc: &'a RawConfigDocument) -> Self {
        Self {
            doc,
            replacements: BTreeMap::new(),
            inserts: BTreeMap::new(),
        }
    }

    /// Replace the value in `slot`, keeping its quotes
    ///
    /// An empty unquoted slot directly in front of a comment gets a space
    /// after the new value so the comment stays separated.
    pub(crate) fn replace_value(&mut self, slot: &ValueSlot, rendered: String) {
        let mut text = rendered;
        if slot.start == slot.end && slot.quote.is_none() && !text.is_empty() {
            if slot.pad {
                text.insert(0, ' ');
            }
            let before_comment = self
                .doc
                .lines
                .get(slot.line)
                .and_then(|line| line.text.get(slot.start..))
                .is_some_and(|rest| rest.starts_with('#'));
            if before_comment {
                text.push(' ');
            }
        }
        self.replace_range(slot.line, slot.start, slot.end, text);
    }

    pub(crate) fn replace_range(&mut self, line: usize, start: usize, end: usize, text: String) {
        self.replacements
            .entry(line)
            .or_default()
            .push((start, end, text));
    }

    pub(crate) fn insert_before(&mut self, line: usize, text: String) {
        self.inserts.entry(line).or_default().push(text);
    }

    pub(crate) fn append(&mut self, text: String) {
        let end = self.doc.lines.len();
        self.insert_before(end, text);
    }

    pub(crate) fn render(mut self) -> String {
        let ending = self.doc.preferred_ending().as_str();
        let mut out = String::new();
        // Set when the previous line had no terminator and more output follows
        let mut dangling = false;

        for idx in 0..=self.doc.lines.len() {
            if let Some(inserted) = self.inserts.remove(&idx) {
                for text in inserted {
                    if dangling {
                        out.push_str(ending);
                        dangling = false;
                    }
                    out.push_str(&text);
                    out.push_str(ending);
                }
            }

            let Some(line) = self.doc.lines.get(idx) else {
                break;
            };
            if dangling {
                out.push_str(ending);
            }

            let mut text = line.text.clone();
            if let Some(mut edits) = self.replacements.remove(&idx) {
                // Right to left so earlier offsets stay valid
                edits.sort_by(|a, b| b.0.cmp(&a.0));
                for (start, end, replacement) in edits {
                    text.replace_range(start..end, &replacement);
                }
            }
            out.push_str(&text);
            out.push_str(line.ending.as_str());
            dangling = line.ending == LineEnding::None;
        }

        out
    }
}
