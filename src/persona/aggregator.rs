//! Persona aggregator: cleans raw model records into persistable personas.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::debug;

use crate::types::{Namespace, Persona, PersonaField};

/// Placeholder values the model copies from the prompt example.
const PLACEHOLDERS: [&str; 2] = ["...", "\u{2026}"];

/// Records with fewer surviving attributes than this are discarded.
const MIN_ATTRIBUTES: usize = 2;

// ─────────────────────────────────────────────────────────────────
// Text Normalization
// ─────────────────────────────────────────────────────────────────

/// Rewrites every string value of a persona (e.g. for translation).
///
/// Implementations must be idempotent.
pub trait TextNormalizer: Send + Sync {
    fn normalize(&self, text: &str) -> String;
}

/// Leaves text unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityNormalizer;

impl TextNormalizer for IdentityNormalizer {
    fn normalize(&self, text: &str) -> String {
        text.to_string()
    }
}

// ─────────────────────────────────────────────────────────────────
// Aggregator
// ─────────────────────────────────────────────────────────────────

/// Output of one aggregation pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Aggregation {
    pub personas: Vec<Persona>,
    /// Raw records dropped for being empty or not objects
    pub discarded: usize,
}

impl Aggregation {
    pub fn is_empty(&self) -> bool {
        self.personas.is_empty()
    }
}

pub struct PersonaAggregator {
    namespace: Namespace,
    normalizer: Arc<dyn TextNormalizer>,
}

impl PersonaAggregator {
    pub fn new(namespace: Namespace, normalizer: Arc<dyn TextNormalizer>) -> Self {
        Self {
            namespace,
            normalizer,
        }
    }

    /// Aggregator with the identity normalizer.
    pub fn for_namespace(namespace: Namespace) -> Self {
        Self::new(namespace, Arc::new(IdentityNormalizer))
    }

    /// Clean, filter and number `raw` records.
    pub fn aggregate(&self, raw: Vec<Value>) -> Aggregation {
        let prefix = self.namespace.id_prefix();
        let id_key = PersonaField::PersonaId.key();
        let mut ids = IdAllocator::new(&prefix);
        let mut result = Aggregation::default();

        for value in raw {
            let Value::Object(map) = value else {
                result.discarded += 1;
                continue;
            };

            let mut cleaned = match clean_value(Value::Object(map)) {
                Some(Value::Object(m)) if m.len() >= MIN_ATTRIBUTES => m,
                _ => {
                    result.discarded += 1;
                    continue;
                }
            };

            let requested = cleaned.remove(id_key).and_then(|v| local_id(&v, &prefix));
            let id = ids.assign(requested);

            let mut persona = Map::new();
            persona.insert(id_key.to_string(), Value::String(id));
            for (key, value) in cleaned {
                persona.insert(key, self.normalize_value(value));
            }
            result.personas.push(Persona::from_map(persona));
        }

        debug!(
            namespace = %self.namespace,
            kept = result.personas.len(),
            discarded = result.discarded,
            "Aggregated personas"
        );
        result
    }

    fn normalize_value(&self, value: Value) -> Value {
        match value {
            Value::String(s) => Value::String(self.normalizer.normalize(&s)),
            Value::Array(items) => {
                Value::Array(items.into_iter().map(|v| self.normalize_value(v)).collect())
            }
            Value::Object(map) => Value::Object(
                map.into_iter()
                    .map(|(k, v)| (k, self.normalize_value(v)))
                    .collect(),
            ),
            other => other,
        }
    }
}

/// Keep the last record for each ID, at the position the ID was first seen.
pub fn dedup_last_wins(personas: Vec<Persona>) -> Vec<Persona> {
    let mut slots: Vec<Persona> = Vec::with_capacity(personas.len());
    let mut positions: HashMap<String, usize> = HashMap::new();

    for persona in personas {
        match persona.id().map(str::to_string) {
            Some(id) => match positions.get(&id) {
                Some(&pos) => slots[pos] = persona,
                None => {
                    positions.insert(id, slots.len());
                    slots.push(persona);
                }
            },
            None => slots.push(persona),
        }
    }
    slots
}

// ─────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────

/// Hands out unique prefixed IDs within one run.
struct IdAllocator<'a> {
    prefix: &'a str,
    used: HashSet<String>,
    next: u64,
}

impl<'a> IdAllocator<'a> {
    fn new(prefix: &'a str) -> Self {
        Self {
            prefix,
            used: HashSet::new(),
            next: 1,
        }
    }

    fn assign(&mut self, requested: Option<String>) -> String {
        if let Some(local) = requested {
            let id = format!("{}{}", self.prefix, local);
            if self.used.insert(id.clone()) {
                return id;
            }
            debug!(id = %id, "Duplicate persona ID, renumbering");
        }

        loop {
            let id = format!("{}{}", self.prefix, self.next);
            self.next += 1;
            if self.used.insert(id.clone()) {
                return id;
            }
        }
    }
}

/// ID without the namespace prefix, or None when unusable.
fn local_id(value: &Value, prefix: &str) -> Option<String> {
    let raw = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    let local = raw.strip_prefix(prefix).unwrap_or(&raw).trim();
    (!local.is_empty()).then(|| local.to_string())
}

/// Drop empty and placeholder values, recursively.
fn clean_value(value: Value) -> Option<Value> {
    match value {
        Value::Null => None,
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() || PLACEHOLDERS.contains(&trimmed) {
                None
            } else {
                Some(Value::String(s))
            }
        }
        Value::Array(items) => {
            let items: Vec<Value> = items.into_iter().filter_map(clean_value).collect();
            (!items.is_empty()).then_some(Value::Array(items))
        }
        Value::Object(map) => {
            let map: Map<String, Value> = map
                .into_iter()
                .filter_map(|(k, v)| clean_value(v).map(|v| (k, v)))
                .collect();
            (!map.is_empty()).then_some(Value::Object(map))
        }
        other => Some(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn ids(agg: &Aggregation) -> Vec<&str> {
        agg.personas.iter().filter_map(Persona::id).collect()
    }

    struct Upper;

    impl TextNormalizer for Upper {
        fn normalize(&self, text: &str) -> String {
            text.to_uppercase()
        }
    }

    #[test]
    fn test_prefixes_and_cleans() {
        let agg = PersonaAggregator::for_namespace(Namespace::Csv).aggregate(vec![json!({
            "persona_id": "1",
            "description": "Evening learner",
            "motivation": "...",
            "challenges": "",
            "learning_goals": [],
            "extra": null,
            "suggested_learning_resources": [
                {"feature_name": "Quizzes", "description": "...", "justification": ""},
                {"feature_name": "", "description": "\u{2026}"}
            ]
        })]);

        assert_eq!(agg.discarded, 0);
        let persona = &agg.personas[0];
        assert_eq!(persona.id(), Some("csv_1"));
        assert_eq!(
            Value::Object(persona.as_map().clone()),
            json!({
                "persona_id": "csv_1",
                "description": "Evening learner",
                "suggested_learning_resources": [{"feature_name": "Quizzes"}]
            })
        );
    }

    #[test]
    fn test_discards_sparse_records() {
        let agg = PersonaAggregator::for_namespace(Namespace::Md).aggregate(vec![
            json!({"persona_id": "1"}),
            json!({"persona_id": "2", "description": "..."}),
            json!("not an object"),
            json!({"description": "Only one field"}),
            json!({"persona_id": 3, "description": "Kept"}),
        ]);

        assert_eq!(ids(&agg), vec!["md_3"]);
        assert_eq!(agg.discarded, 4);
    }

    #[test]
    fn test_missing_and_colliding_ids() {
        let agg = PersonaAggregator::for_namespace(Namespace::Csv2).aggregate(vec![
            json!({"persona_id": "1", "description": "a"}),
            json!({"description": "b", "motivation": "m"}),
            json!({"persona_id": "csv2_1", "description": "c"}),
            json!({"persona_id": 2, "description": "d"}),
        ]);

        assert_eq!(ids(&agg), vec!["csv2_1", "csv2_2", "csv2_3", "csv2_4"]);
    }

    #[test]
    fn test_normalizer_applies_to_nested_strings() {
        let agg = PersonaAggregator::new(Namespace::Csv, Arc::new(Upper)).aggregate(vec![json!({
            "persona_id": "x",
            "description": "quiet",
            "suggested_learning_resources": [{"feature_name": "labs"}]
        })]);

        let persona = &agg.personas[0];
        assert_eq!(persona.id(), Some("csv_x"));
        assert_eq!(persona.text("description").as_deref(), Some("QUIET"));
        assert_eq!(persona.resources()[0].feature_name, "LABS");
    }

    #[test]
    fn test_empty_input_is_empty_aggregation() {
        let agg = PersonaAggregator::for_namespace(Namespace::Csv).aggregate(Vec::new());
        assert!(agg.is_empty());
        assert_eq!(agg.discarded, 0);
    }

    #[test]
    fn test_dedup_last_wins() {
        let p = |id: &str, d: &str| -> Persona {
            serde_json::from_value(json!({"persona_id": id, "description": d})).unwrap()
        };
        let deduped = dedup_last_wins(vec![p("csv_1", "old"), p("csv_2", "b"), p("csv_1", "new")]);

        assert_eq!(deduped.len(), 2);
        assert_eq!(deduped[0].id(), Some("csv_1"));
        assert_eq!(deduped[0].text("description").as_deref(), Some("new"));
        assert_eq!(deduped[1].id(), Some("csv_2"));
    }

    fn raw_value() -> impl Strategy<Value = Value> {
        prop_oneof![
            Just(Value::Null),
            Just(json!("...")),
            "[a-z ]{0,8}".prop_map(Value::String),
            any::<u8>().prop_map(|n| json!(n)),
            prop::collection::vec("[a-z]{0,4}".prop_map(Value::String), 0..3).prop_map(Value::Array),
        ]
    }

    fn raw_record() -> impl Strategy<Value = Value> {
        let key = prop_oneof![
            Just("persona_id"),
            Just("description"),
            Just("motivation"),
            Just("challenges"),
            Just("learning_goals"),
        ]
        .prop_map(String::from);
        prop::collection::btree_map(key, raw_value(), 0..5)
            .prop_map(|m| Value::Object(m.into_iter().collect()))
    }

    proptest! {
        #[test]
        fn prop_aggregate_is_idempotent(raw in prop::collection::vec(raw_record(), 0..8)) {
            let aggregator = PersonaAggregator::for_namespace(Namespace::Csv);
            let first = aggregator.aggregate(raw);
            let again: Vec<Value> = first
                .personas
                .iter()
                .map(|p| Value::Object(p.as_map().clone()))
                .collect();
            let second = aggregator.aggregate(again);

            prop_assert_eq!(second.discarded, 0);
            prop_assert_eq!(&second.personas, &first.personas);
        }

        #[test]
        fn prop_ids_unique_and_prefixed(raw in prop::collection::vec(raw_record(), 0..8)) {
            let agg = PersonaAggregator::for_namespace(Namespace::Md).aggregate(raw);
            let ids: Vec<&str> = agg.personas.iter().filter_map(Persona::id).collect();
            let unique: HashSet<&str> = ids.iter().copied().collect();

            prop_assert_eq!(ids.len(), agg.personas.len());
            prop_assert_eq!(unique.len(), ids.len());
            prop_assert!(ids.iter().all(|id| id.starts_with("md_")));
        }
    }
}
