//! In-memory questionnaire document and its save bookkeeping.
//!
//! The document is pure data. Section contents are opaque JSON; the engine
//! only cares about when they changed and when they were last accepted by
//! the server.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use smol_str::SmolStr;
use thiserror::Error;
use tokio::time::Instant;

/// Server-assigned questionnaire id.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(pub i64);

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Id of a landing page generated from a questionnaire.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArtifactId(pub i64);

impl fmt::Display for ArtifactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown {kind}: {value}")]
pub struct ParseKeyError {
    kind: &'static str,
    value: String,
}

/// The fixed set of questionnaire sections.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionKey {
    BusinessInfo,
    Operations,
    Legal,
    Services,
    Contact,
    Brand,
    Projects,
    Timeline,
    SuccessStories,
    Faqs,
}

const SECTION_COUNT: usize = 10;

impl SectionKey {
    pub const ALL: [SectionKey; SECTION_COUNT] = [
        SectionKey::BusinessInfo,
        SectionKey::Operations,
        SectionKey::Legal,
        SectionKey::Services,
        SectionKey::Contact,
        SectionKey::Brand,
        SectionKey::Projects,
        SectionKey::Timeline,
        SectionKey::SuccessStories,
        SectionKey::Faqs,
    ];

    /// Key used for this section at the remote boundary.
    pub const fn as_str(self) -> &'static str {
        match self {
            SectionKey::BusinessInfo => "business_info",
            SectionKey::Operations => "operations",
            SectionKey::Legal => "legal",
            SectionKey::Services => "services",
            SectionKey::Contact => "contact",
            SectionKey::Brand => "brand",
            SectionKey::Projects => "projects",
            SectionKey::Timeline => "timeline",
            SectionKey::SuccessStories => "success_stories",
            SectionKey::Faqs => "faqs",
        }
    }

    /// List-shaped sections hold an array of entries instead of a record.
    pub const fn is_list(self) -> bool {
        matches!(
            self,
            SectionKey::Projects | SectionKey::SuccessStories | SectionKey::Faqs
        )
    }

    /// Value a section holds before the user touches it.
    pub fn empty_value(self) -> Value {
        if self.is_list() {
            Value::Array(Vec::new())
        } else {
            Value::Object(Map::new())
        }
    }

    const fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for SectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SectionKey {
    type Err = ParseKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SectionKey::ALL
            .into_iter()
            .find(|key| key.as_str() == s)
            .ok_or_else(|| ParseKeyError {
                kind: "section",
                value: s.to_string(),
            })
    }
}

/// How much detail the generated landing page should carry.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComplexityMode {
    #[default]
    Simple,
    Advanced,
    Professional,
}

impl ComplexityMode {
    pub const fn as_str(self) -> &'static str {
        match self {
            ComplexityMode::Simple => "simple",
            ComplexityMode::Advanced => "advanced",
            ComplexityMode::Professional => "professional",
        }
    }
}

impl fmt::Display for ComplexityMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ComplexityMode {
    type Err = ParseKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "simple" => Ok(ComplexityMode::Simple),
            "advanced" => Ok(ComplexityMode::Advanced),
            "professional" => Ok(ComplexityMode::Professional),
            other => Err(ParseKeyError {
                kind: "complexity mode",
                value: other.to_string(),
            }),
        }
    }
}

/// Values of every section, one slot per [`SectionKey`].
#[derive(Clone, Debug, PartialEq)]
pub struct Sections {
    values: [Value; SECTION_COUNT],
}

impl Default for Sections {
    fn default() -> Self {
        Self {
            values: std::array::from_fn(|i| SectionKey::ALL[i].empty_value()),
        }
    }
}

impl Sections {
    pub fn get(&self, key: SectionKey) -> &Value {
        &self.values[key.index()]
    }

    /// Replace a section. `null` resets it to its empty value.
    pub fn set(&mut self, key: SectionKey, value: Value) {
        self.values[key.index()] = if value.is_null() {
            key.empty_value()
        } else {
            value
        };
    }

    /// Shallow-merge an object delta into a record section.
    ///
    /// Anything other than object-into-object replaces the section.
    pub fn merge(&mut self, key: SectionKey, delta: Value) {
        let slot = &mut self.values[key.index()];
        match (slot, delta) {
            (Value::Object(current), Value::Object(delta)) => current.extend(delta),
            (slot, delta) => {
                *slot = if delta.is_null() {
                    key.empty_value()
                } else {
                    delta
                }
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (SectionKey, &Value)> {
        SectionKey::ALL.into_iter().zip(self.values.iter())
    }
}

/// Everything a user can change: sections plus completion and selection fields.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DocumentContent {
    pub sections: Sections,
    pub is_complete: bool,
    pub template_id: Option<SmolStr>,
    pub complexity_mode: ComplexityMode,
}

/// Monotonic timestamp issued by a [`Document`].
///
/// The sequence number breaks ties between stamps taken within the same
/// clock tick, so every stamp a document issues is strictly greater than
/// the previous one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Stamp {
    at: Instant,
    seq: u64,
}

impl Stamp {
    pub fn instant(&self) -> Instant {
        self.at
    }
}

/// The questionnaire being filled out in one wizard session.
#[derive(Clone, Debug)]
pub struct Document {
    content: DocumentContent,
    current_step: u32,
    identity: Option<DocumentId>,
    derived_id: Option<ArtifactId>,
    last_changed: Stamp,
    last_saved: Option<Stamp>,
    loading: bool,
    next_seq: u64,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    /// An empty questionnaire that has never been saved.
    pub fn new() -> Self {
        Self {
            content: DocumentContent::default(),
            current_step: 0,
            identity: None,
            derived_id: None,
            last_changed: Stamp {
                at: Instant::now(),
                seq: 0,
            },
            last_saved: None,
            loading: false,
            next_seq: 1,
        }
    }

    pub fn sections(&self) -> &Sections {
        &self.content.sections
    }

    pub fn section(&self, key: SectionKey) -> &Value {
        self.content.sections.get(key)
    }

    pub fn content(&self) -> &DocumentContent {
        &self.content
    }

    pub fn is_complete(&self) -> bool {
        self.content.is_complete
    }

    pub fn template_id(&self) -> Option<&str> {
        self.content.template_id.as_deref()
    }

    pub fn complexity_mode(&self) -> ComplexityMode {
        self.content.complexity_mode
    }

    pub fn current_step(&self) -> u32 {
        self.current_step
    }

    pub fn identity(&self) -> Option<DocumentId> {
        self.identity
    }

    pub fn derived_id(&self) -> Option<ArtifactId> {
        self.derived_id
    }

    pub fn last_changed(&self) -> Stamp {
        self.last_changed
    }

    pub fn last_saved(&self) -> Option<Stamp> {
        self.last_saved
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    /// True when there are changes the server has not confirmed.
    pub fn needs_save(&self) -> bool {
        match self.last_saved {
            None => true,
            Some(saved) => saved < self.last_changed,
        }
    }

    pub fn set_section(&mut self, key: SectionKey, value: Value) {
        self.content.sections.set(key, value);
        self.touch();
    }

    pub fn merge_section(&mut self, key: SectionKey, delta: Value) {
        self.content.sections.merge(key, delta);
        self.touch();
    }

    pub fn clear_section(&mut self, key: SectionKey) {
        self.content.sections.set(key, key.empty_value());
        self.touch();
    }

    pub fn set_complete(&mut self, complete: bool) {
        self.content.is_complete = complete;
        self.touch();
    }

    pub fn set_template(&mut self, template_id: Option<&str>) {
        self.content.template_id = template_id.map(SmolStr::new);
        self.touch();
    }

    pub fn set_complexity_mode(&mut self, mode: ComplexityMode) {
        self.content.complexity_mode = mode;
        self.touch();
    }

    /// Move the wizard to another step. Navigation is not a content change.
    pub fn set_step(&mut self, step: u32) {
        self.current_step = step;
    }

    /// Issue a fresh stamp without recording a change.
    pub(crate) fn stamp(&mut self) -> Stamp {
        self.issue(Instant::now())
    }

    fn issue(&mut self, at: Instant) -> Stamp {
        let seq = self.next_seq;
        self.next_seq += 1;
        Stamp { at, seq }
    }

    fn touch(&mut self) {
        self.last_changed = self.stamp();
    }

    pub(crate) fn set_loading(&mut self, loading: bool) {
        self.loading = loading;
    }

    /// Record that the server accepted the snapshot taken at `snapshot`.
    pub(crate) fn mark_saved(&mut self, snapshot: Stamp) {
        self.last_saved = Some(snapshot);
    }

    /// Take the server-assigned id. Only the first assignment sticks.
    pub(crate) fn adopt_identity(&mut self, id: DocumentId) -> bool {
        if self.identity.is_some() {
            return false;
        }
        self.identity = Some(id);
        true
    }

    pub(crate) fn set_derived_id(&mut self, id: ArtifactId) {
        self.derived_id = Some(id);
    }

    pub(crate) fn set_identity_and_derived(
        &mut self,
        identity: Option<DocumentId>,
        derived_id: Option<ArtifactId>,
    ) {
        self.identity = identity;
        self.derived_id = derived_id;
    }

    /// Replace all user content. Counts as a change.
    pub(crate) fn replace_content(&mut self, content: DocumentContent) {
        self.content = content;
        self.touch();
    }

    /// Replace the document wholesale with what the server holds for `id`.
    ///
    /// The change stamp is placed `offset` before the save stamp so the
    /// freshly loaded state reads as already saved.
    pub(crate) fn hydrate(
        &mut self,
        id: DocumentId,
        derived_id: Option<ArtifactId>,
        content: DocumentContent,
        offset: Duration,
    ) {
        // a derived id from a previously loaded questionnaire does not carry over
        if derived_id.is_some() || self.identity != Some(id) {
            self.derived_id = derived_id;
        }
        self.identity = Some(id);
        self.content = content;

        let now = Instant::now();
        let changed_at = now.checked_sub(offset).unwrap_or(now);
        self.last_changed = self.issue(changed_at);
        let saved = self.issue(now);
        self.last_saved = Some(saved);
    }
}
