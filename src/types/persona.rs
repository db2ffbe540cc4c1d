//! Persona records and the namespaces they belong to.
//!
//! A persona is kept as a JSON object rather than a fixed struct: the model
//! occasionally adds attributes of its own, and those must survive a
//! save/load cycle untouched.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ─────────────────────────────────────────────────────────────────
// Namespace
// ─────────────────────────────────────────────────────────────────

/// Source namespace a persona was generated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Namespace {
    /// Survey export (first CSV layout)
    Csv,
    /// Survey export (second CSV layout)
    Csv2,
    /// Interview transcripts in Markdown
    Md,
}

impl Namespace {
    /// Slug used in persona IDs, file names and CLI args.
    pub fn as_str(&self) -> &'static str {
        match self {
            Namespace::Csv => "csv",
            Namespace::Csv2 => "csv2",
            Namespace::Md => "md",
        }
    }

    /// All namespaces, in listing order.
    pub fn all() -> &'static [Namespace] {
        &[Namespace::Csv, Namespace::Csv2, Namespace::Md]
    }

    /// What kind of material this namespace holds.
    pub fn source_kind(&self) -> SourceKind {
        match self {
            Namespace::Csv | Namespace::Csv2 => SourceKind::Survey,
            Namespace::Md => SourceKind::Interview,
        }
    }

    /// The `"<ns>_"` prefix every persona ID in this namespace carries.
    pub fn id_prefix(&self) -> String {
        format!("{}_", self.as_str())
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Namespace {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "csv" => Ok(Namespace::Csv),
            "csv2" => Ok(Namespace::Csv2),
            "md" | "markdown" => Ok(Namespace::Md),
            _ => Err(format!("Unknown namespace '{}'. Valid: csv, csv2, md", s)),
        }
    }
}

/// Kind of source material, as described to the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Survey,
    Interview,
}

impl SourceKind {
    pub fn label(&self) -> &'static str {
        match self {
            SourceKind::Survey => "survey",
            SourceKind::Interview => "interview",
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Schema
// ─────────────────────────────────────────────────────────────────

/// Attributes the generation prompt asks the model to fill in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersonaField {
    PersonaId,
    Description,
    Motivation,
    Challenges,
    LearningGoals,
    PreferredLearningMethods,
    SuggestedLearningResources,
}

impl PersonaField {
    /// Schema fields in prompt order.
    pub fn all() -> &'static [PersonaField] {
        &[
            PersonaField::PersonaId,
            PersonaField::Description,
            PersonaField::Motivation,
            PersonaField::Challenges,
            PersonaField::LearningGoals,
            PersonaField::PreferredLearningMethods,
            PersonaField::SuggestedLearningResources,
        ]
    }

    /// JSON key of this attribute.
    pub fn key(&self) -> &'static str {
        match self {
            PersonaField::PersonaId => "persona_id",
            PersonaField::Description => "description",
            PersonaField::Motivation => "motivation",
            PersonaField::Challenges => "challenges",
            PersonaField::LearningGoals => "learning_goals",
            PersonaField::PreferredLearningMethods => "preferred_learning_methods",
            PersonaField::SuggestedLearningResources => "suggested_learning_resources",
        }
    }

    /// One-line explanation shown to the model.
    pub fn hint(&self) -> &'static str {
        match self {
            PersonaField::PersonaId => "sequential number starting at 1",
            PersonaField::Description => "overall description of this audience segment",
            PersonaField::Motivation => "why they want to learn",
            PersonaField::Challenges => "obstacles and pain points they face",
            PersonaField::LearningGoals => "what they want to achieve",
            PersonaField::PreferredLearningMethods => "how they prefer to learn",
            PersonaField::SuggestedLearningResources => {
                "recommended resources, each with feature_name, description, justification"
            }
        }
    }
}

/// Key of the chunk provenance tag added to batched results.
pub const BATCH_INFO_KEY: &str = "batch_info";

// ─────────────────────────────────────────────────────────────────
// Persona
// ─────────────────────────────────────────────────────────────────

/// One suggested learning resource.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LearningResource {
    #[serde(default)]
    pub feature_name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub justification: String,
}

/// A synthesized audience profile.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Persona(Map<String, Value>);

impl Persona {
    pub fn from_map(map: Map<String, Value>) -> Self {
        Self(map)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// The persona ID, if it is present and a string.
    pub fn id(&self) -> Option<&str> {
        self.0.get(PersonaField::PersonaId.key()).and_then(Value::as_str)
    }

    /// Render an attribute as display text.
    ///
    /// Lists are joined with "; ", objects and numbers use their JSON form.
    pub fn text(&self, key: &str) -> Option<String> {
        self.0.get(key).and_then(render_value)
    }

    pub fn has_description(&self) -> bool {
        self.text(PersonaField::Description.key())
            .map(|d| !d.trim().is_empty())
            .unwrap_or(false)
    }

    /// Suggested learning resources; entries that are not objects are skipped.
    pub fn resources(&self) -> Vec<LearningResource> {
        self.0
            .get(PersonaField::SuggestedLearningResources.key())
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter(|v| v.is_object())
                    .filter_map(|v| serde_json::from_value(v.clone()).ok())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn batch_info(&self) -> Option<&str> {
        self.0.get(BATCH_INFO_KEY).and_then(Value::as_str)
    }
}

fn render_value(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Array(items) => {
            let parts: Vec<String> = items.iter().filter_map(render_value).collect();
            Some(parts.join("; "))
        }
        other => Some(other.to_string()),
    }
}

/// Order persona IDs by prefix, then numerically by the `_<n>` suffix, so
/// `csv_2` sorts before `csv_10`.
pub fn compare_ids(a: &str, b: &str) -> Ordering {
    fn split(id: &str) -> (&str, Option<u64>) {
        match id.rsplit_once('_').map(|(prefix, n)| (prefix, n.parse().ok())) {
            Some((prefix, Some(n))) => (prefix, Some(n)),
            _ => (id, None),
        }
    }
    split(a).cmp(&split(b)).then_with(|| a.cmp(b))
}
