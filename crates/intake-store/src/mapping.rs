//! Mapping between the in-memory document and the JSON the server speaks.
//!
//! The server uses flat snake_case keys, one per section, plus the
//! completion and selection fields. Every conversion in either direction
//! goes through the types here so defaulting lives in one place:
//! - absent or `null` sections become the section's empty value
//! - absent or `null` flags and selections become their defaults

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use smol_str::SmolStr;

use crate::store::{
    ArtifactId, ComplexityMode, Document, DocumentContent, DocumentId, SectionKey, Sections,
};

/// Business name sent in a minimal payload when the user has not given one.
pub const PLACEHOLDER_BUSINESS_NAME: &str = "Untitled Business";

/// Industry sent in a minimal payload when the user has not given one.
pub const PLACEHOLDER_INDUSTRY: &str = "General";

fn empty_record() -> Value {
    Value::Object(Map::new())
}

fn empty_list() -> Value {
    Value::Array(Vec::new())
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Full questionnaire payload: every section plus completion and selections.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DocumentPayload {
    #[serde(default = "empty_record")]
    pub business_info: Value,
    #[serde(default = "empty_record")]
    pub operations: Value,
    #[serde(default = "empty_record")]
    pub legal: Value,
    #[serde(default = "empty_record")]
    pub services: Value,
    #[serde(default = "empty_record")]
    pub contact: Value,
    #[serde(default = "empty_record")]
    pub brand: Value,
    #[serde(default = "empty_list")]
    pub projects: Value,
    #[serde(default = "empty_record")]
    pub timeline: Value,
    #[serde(default = "empty_list")]
    pub success_stories: Value,
    #[serde(default = "empty_list")]
    pub faqs: Value,
    #[serde(default, deserialize_with = "null_as_default")]
    pub is_complete: bool,
    #[serde(default)]
    pub template_id: Option<SmolStr>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub complexity_mode: ComplexityMode,
}

impl Default for DocumentPayload {
    fn default() -> Self {
        Self::from_content(&DocumentContent::default())
    }
}

impl DocumentPayload {
    pub fn section(&self, key: SectionKey) -> &Value {
        match key {
            SectionKey::BusinessInfo => &self.business_info,
            SectionKey::Operations => &self.operations,
            SectionKey::Legal => &self.legal,
            SectionKey::Services => &self.services,
            SectionKey::Contact => &self.contact,
            SectionKey::Brand => &self.brand,
            SectionKey::Projects => &self.projects,
            SectionKey::Timeline => &self.timeline,
            SectionKey::SuccessStories => &self.success_stories,
            SectionKey::Faqs => &self.faqs,
        }
    }

    fn section_mut(&mut self, key: SectionKey) -> &mut Value {
        match key {
            SectionKey::BusinessInfo => &mut self.business_info,
            SectionKey::Operations => &mut self.operations,
            SectionKey::Legal => &mut self.legal,
            SectionKey::Services => &mut self.services,
            SectionKey::Contact => &mut self.contact,
            SectionKey::Brand => &mut self.brand,
            SectionKey::Projects => &mut self.projects,
            SectionKey::Timeline => &mut self.timeline,
            SectionKey::SuccessStories => &mut self.success_stories,
            SectionKey::Faqs => &mut self.faqs,
        }
    }

    pub fn from_content(content: &DocumentContent) -> Self {
        let mut payload = Self {
            business_info: Value::Null,
            operations: Value::Null,
            legal: Value::Null,
            services: Value::Null,
            contact: Value::Null,
            brand: Value::Null,
            projects: Value::Null,
            timeline: Value::Null,
            success_stories: Value::Null,
            faqs: Value::Null,
            is_complete: content.is_complete,
            template_id: content.template_id.clone(),
            complexity_mode: content.complexity_mode,
        };
        for (key, value) in content.sections.iter() {
            *payload.section_mut(key) = value.clone();
        }
        payload
    }

    pub fn into_content(mut self) -> DocumentContent {
        let mut sections = Sections::default();
        for key in SectionKey::ALL {
            sections.set(key, self.section_mut(key).take());
        }
        DocumentContent {
            sections,
            is_complete: self.is_complete,
            template_id: self.template_id,
            complexity_mode: self.complexity_mode,
        }
    }
}

impl From<&Document> for DocumentPayload {
    fn from(doc: &Document) -> Self {
        Self::from_content(doc.content())
    }
}

/// Business details kept in a minimal payload.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MinimalBusinessInfo {
    pub business_name: String,
    pub industry: String,
}

/// Reduced payload sent once the full payload has exhausted its retries.
///
/// Carries only what identifies the questionnaire and the user's
/// selections; every free-text section is left out.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MinimalPayload {
    pub business_info: MinimalBusinessInfo,
    pub is_complete: bool,
    pub template_id: Option<SmolStr>,
    pub complexity_mode: ComplexityMode,
}

fn text_field(section: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| {
        section
            .get(*key)?
            .as_str()
            .map(str::trim)
            .filter(|text| !text.is_empty())
            .map(str::to_owned)
    })
}

impl From<&DocumentPayload> for MinimalPayload {
    fn from(payload: &DocumentPayload) -> Self {
        let info = &payload.business_info;
        Self {
            business_info: MinimalBusinessInfo {
                business_name: text_field(info, &["business_name", "name"])
                    .unwrap_or_else(|| PLACEHOLDER_BUSINESS_NAME.to_string()),
                industry: text_field(info, &["industry", "category"])
                    .unwrap_or_else(|| PLACEHOLDER_INDUSTRY.to_string()),
            },
            is_complete: payload.is_complete,
            template_id: payload.template_id.clone(),
            complexity_mode: payload.complexity_mode,
        }
    }
}

/// Body of a create or update call.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SavePayload<'a> {
    Full(&'a DocumentPayload),
    Minimal(&'a MinimalPayload),
}

impl SavePayload<'_> {
    pub fn is_minimal(&self) -> bool {
        matches!(self, SavePayload::Minimal(_))
    }
}

/// Questionnaire as returned by the server's fetch endpoint.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RemoteDocument {
    #[serde(default)]
    pub id: Option<DocumentId>,
    #[serde(default)]
    pub landing_page_id: Option<ArtifactId>,
    #[serde(flatten)]
    pub payload: DocumentPayload,
}

/// Response of a create or update call.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct RemoteRecord {
    #[serde(default)]
    pub id: Option<DocumentId>,
}

/// Response of the landing-page generation call.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct ArtifactRecord {
    pub id: ArtifactId,
}
