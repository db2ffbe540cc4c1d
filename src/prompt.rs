//! Prompt rendering for persona generation and copy scoring.
//!
//! Both prompts ask for fenced ```json output and nothing else, which is
//! what the response parser looks for first.

use std::fmt::Write;

use crate::types::{Persona, PersonaField, SourceKind};

/// Placeholder for persona attributes that are missing.
const MISSING: &str = "none";

/// Build the prompt asking the model to synthesize personas from `content`.
pub fn generation_prompt(content: &str, kind: SourceKind) -> String {
    let mut prompt = String::with_capacity(content.len() + 1024);

    let _ = write!(prompt, "The following is {} data:\n{}\n\n", kind.label(), content);
    prompt.push_str(
        "Analyse the data above and synthesize a complete set of audience personas \
         for a course. Every persona must contain these fields:\n",
    );
    for field in PersonaField::all() {
        let _ = writeln!(prompt, "- {} ({})", field.key(), field.hint());
    }
    prompt.push_str(
        "\nRespond with a JSON object, or a JSON array of objects, inside a ```json fence. Example:\n",
    );
    prompt.push_str(GENERATION_EXAMPLE);
    prompt.push_str("Output only the JSON above. Do not add any other text or explanation.");
    prompt
}

const GENERATION_EXAMPLE: &str = r#"```json
{
  "persona_id": "1",
  "description": "...",
  "motivation": "...",
  "challenges": "...",
  "learning_goals": "...",
  "preferred_learning_methods": "...",
  "suggested_learning_resources": [
    {
      "feature_name": "...",
      "description": "...",
      "justification": "..."
    }
  ]
}
```
"#;

/// Build the prompt asking the model to react to `copy` as `persona`.
pub fn scoring_prompt(persona: &Persona, copy: &str) -> String {
    let attr = |field: PersonaField| {
        persona
            .text(field.key())
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| MISSING.to_string())
    };

    let mut prompt = String::with_capacity(copy.len() + 1024);
    prompt.push_str("You are now the following persona.\n");
    let _ = writeln!(prompt, "=== Persona ===\n{}", attr(PersonaField::Description));
    let _ = writeln!(prompt, "Motivation:\n{}", attr(PersonaField::Motivation));
    let _ = writeln!(prompt, "Challenges:\n{}", attr(PersonaField::Challenges));
    let _ = writeln!(prompt, "Learning goals:\n{}", attr(PersonaField::LearningGoals));
    let _ = writeln!(
        prompt,
        "Preferred learning methods:\n{}",
        attr(PersonaField::PreferredLearningMethods)
    );
    let _ = write!(
        prompt,
        "\nGive detailed feedback on this marketing copy:\n=== Marketing copy ===\n{}\n\n",
        copy
    );
    prompt.push_str(
        "Answer with:\n\
         1. Purchase intent score (1-10)\n\
         2. Reasons to buy\n\
         3. Reasons not to buy\n\n\
         Respond with a single JSON object inside a ```json fence, for example:\n",
    );
    prompt.push_str(SCORING_EXAMPLE);
    prompt.push_str("Output only the JSON. Do not add any other text.");
    prompt
}

const SCORING_EXAMPLE: &str = r#"```json
{
  "score": 7,
  "reasons_to_buy": ["reason 1", "reason 2"],
  "reasons_not_to_buy": ["reason 1", "reason 2"]
}
```
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_generation_prompt_lists_schema() {
        let prompt = generation_prompt("q1,q2\nyes,no", SourceKind::Survey);

        assert!(prompt.starts_with("The following is survey data:\nq1,q2\nyes,no"));
        for field in PersonaField::all() {
            assert!(prompt.contains(&format!("- {} (", field.key())), "missing {}", field.key());
        }
        assert!(prompt.contains("```json"));
        assert!(prompt.contains("Do not add any other text"));
    }

    #[test]
    fn test_generation_prompt_mentions_interviews() {
        let prompt = generation_prompt("# Interview", SourceKind::Interview);
        assert!(prompt.contains("interview data"));
    }

    #[test]
    fn test_scoring_prompt_renders_persona_and_copy() {
        let persona: Persona = serde_json::from_value(json!({
            "persona_id": "csv_1",
            "description": "Night-shift nurse studying data analysis",
            "motivation": "Move into hospital analytics",
            "learning_goals": ["SQL", "dashboards"]
        }))
        .unwrap();

        let prompt = scoring_prompt(&persona, "Learn SQL in 30 days!");

        assert!(prompt.contains("Night-shift nurse studying data analysis"));
        assert!(prompt.contains("Move into hospital analytics"));
        assert!(prompt.contains("SQL; dashboards"));
        assert!(prompt.contains("Challenges:\nnone"));
        assert!(prompt.contains("=== Marketing copy ===\nLearn SQL in 30 days!"));
        assert!(prompt.contains("\"reasons_not_to_buy\""));
    }
}
