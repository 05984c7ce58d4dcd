//! Edit commands accepted by `intake replay`, one JSON object per line.
//!
//! ```text
//! {"op":"merge","section":"business_info","value":{"business_name":"Acme"}}
//! {"op":"complete","value":true}
//! {"op":"save"}
//! ```

use intake_store::{ComplexityMode, Document, SectionKey};
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum EditCommand {
    Set { section: SectionKey, value: Value },
    Merge { section: SectionKey, value: Value },
    Clear { section: SectionKey },
    Complete { value: bool },
    Template { value: Option<String> },
    Mode { value: ComplexityMode },
    Step { value: u32 },
    /// Save right away instead of waiting for the debounce gate.
    Save,
}

impl EditCommand {
    /// Parse one input line. Blank lines and `#` comments yield `None`.
    pub fn parse_line(line: &str) -> Option<serde_json::Result<Self>> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return None;
        }
        Some(serde_json::from_str(line))
    }

    /// Whether applying this command changes saved content.
    pub fn is_edit(&self) -> bool {
        !matches!(self, EditCommand::Step { .. } | EditCommand::Save)
    }

    pub fn apply(self, doc: &mut Document) {
        match self {
            EditCommand::Set { section, value } => doc.set_section(section, value),
            EditCommand::Merge { section, value } => doc.merge_section(section, value),
            EditCommand::Clear { section } => doc.clear_section(section),
            EditCommand::Complete { value } => doc.set_complete(value),
            EditCommand::Template { value } => doc.set_template(value.as_deref()),
            EditCommand::Mode { value } => doc.set_complexity_mode(value),
            EditCommand::Step { value } => doc.set_step(value),
            EditCommand::Save => {}
        }
    }
}
