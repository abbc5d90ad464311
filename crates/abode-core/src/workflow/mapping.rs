//! Step input mapping
//!
//! Source paths address either the workflow payload (`input`, `input.a.b`)
//! or an upstream step's output (`steps.<id>`, `steps.<id>.a.b`). Numeric
//! segments index into arrays.

use std::collections::HashMap;

use serde_json::{Map, Value};

use super::StepDefinition;
use crate::error::MappingError;

/// A parsed source path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourcePath {
    Input(Vec<String>),
    Step { id: String, fields: Vec<String> },
}

impl SourcePath {
    pub fn parse(path: &str) -> Result<Self, String> {
        let mut segments = path.split('.');
        let root = segments.next().unwrap_or_default();
        let rest: Vec<String> = segments.map(str::to_string).collect();
        if rest.iter().any(String::is_empty) {
            return Err(format!("'{}' has an empty segment", path));
        }

        match root {
            "input" => Ok(SourcePath::Input(rest)),
            "steps" => {
                let mut rest = rest.into_iter();
                match rest.next() {
                    Some(id) => Ok(SourcePath::Step {
                        id,
                        fields: rest.collect(),
                    }),
                    None => Err(format!("'{}' does not name a step", path)),
                }
            }
            _ => Err(format!("'{}' must start with 'input' or 'steps.<id>'", path)),
        }
    }

    /// Upstream step this path reads from
    pub fn step(&self) -> Option<&str> {
        match self {
            SourcePath::Input(_) => None,
            SourcePath::Step { id, .. } => Some(id),
        }
    }

    pub fn resolve<'a>(&self, payload: &'a Value, outputs: &'a HashMap<String, Value>) -> Option<&'a Value> {
        let (root, fields) = match self {
            SourcePath::Input(fields) => (payload, fields),
            SourcePath::Step { id, fields } => (outputs.get(id)?, fields),
        };
        fields.iter().try_fold(root, |value, field| match value {
            Value::Object(map) => map.get(field),
            Value::Array(items) => field.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        })
    }
}

/// Assemble the agent input for one step
///
/// Declared bindings are resolved one by one; a missing or null value uses
/// the binding's default, is skipped when optional, and fails otherwise.
/// A step without bindings gets the payload merged with its direct
/// dependencies' outputs, keyed by step id.
pub fn build_step_input(
    workflow: &str,
    step: &StepDefinition,
    payload: &Value,
    outputs: &HashMap<String, Value>,
) -> Result<Value, MappingError> {
    if step.inputs.is_empty() {
        let mut merged = payload.as_object().cloned().unwrap_or_default();
        for dependency in &step.depends_on {
            if let Some(output) = outputs.get(dependency) {
                merged.insert(dependency.clone(), output.clone());
            }
        }
        return Ok(Value::Object(merged));
    }

    let mut input = Map::new();
    for binding in &step.inputs {
        let found = binding
            .source
            .resolve(payload, outputs)
            .filter(|v| !v.is_null())
            .or_else(|| binding.binding.default_value());

        match found {
            Some(value) => {
                input.insert(binding.field.clone(), value.clone());
            }
            None if binding.binding.is_required() => {
                return Err(MappingError::MissingField {
                    workflow: workflow.to_string(),
                    step: step.id.clone(),
                    field: binding.field.clone(),
                    path: binding.binding.source().to_string(),
                });
            }
            None => {}
        }
    }

    Ok(Value::Object(input))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::InputBinding;
    use crate::workflow::StepInput;
    use serde_json::json;

    fn step(inputs: Vec<(&str, InputBinding)>) -> StepDefinition {
        StepDefinition {
            id: "summarize".into(),
            agent: "advisor".into(),
            declared_depends_on: Some(vec!["research".into()]),
            depends_on: vec!["research".into()],
            inputs: inputs
                .into_iter()
                .map(|(field, binding)| StepInput::new(field, binding).unwrap())
                .collect(),
        }
    }

    #[test]
    fn test_parse_paths() {
        assert_eq!(SourcePath::parse("input").unwrap(), SourcePath::Input(vec![]));
        assert_eq!(
            SourcePath::parse("input.customer.budget").unwrap(),
            SourcePath::Input(vec!["customer".into(), "budget".into()])
        );
        assert_eq!(
            SourcePath::parse("steps.research.results").unwrap().step(),
            Some("research")
        );
        assert!(SourcePath::parse("steps").is_err());
        assert!(SourcePath::parse("payload.budget").is_err());
        assert!(SourcePath::parse("input..budget").is_err());
    }

    #[test]
    fn test_resolve_into_arrays() {
        let mut outputs = HashMap::new();
        outputs.insert("research".to_string(), json!({"properties": [{"id": "P006"}]}));
        let path = SourcePath::parse("steps.research.properties.0.id").unwrap();
        assert_eq!(path.resolve(&json!({}), &outputs), Some(&json!("P006")));
    }

    #[test]
    fn test_missing_required_field_names_it() {
        let step = step(vec![("budget", InputBinding::path("input.budget"))]);
        let err = build_step_input("onboarding", &step, &json!({"phone": "1"}), &HashMap::new())
            .unwrap_err();
        assert_eq!(err.field(), Some("budget"));
    }

    #[test]
    fn test_optional_and_default_bindings() {
        let step = step(vec![
            ("notes", InputBinding::optional("input.notes")),
            (
                "city",
                InputBinding::Detailed {
                    from: "input.city".into(),
                    required: true,
                    default: Some(json!("上海")),
                },
            ),
            ("budget", InputBinding::path("input.budget")),
        ]);
        let input = build_step_input("w", &step, &json!({"budget": 5_000_000}), &HashMap::new())
            .unwrap();
        assert_eq!(input, json!({"city": "上海", "budget": 5_000_000}));
    }

    #[test]
    fn test_unbound_step_merges_dependencies() {
        let step = step(vec![]);
        let mut outputs = HashMap::new();
        outputs.insert("research".to_string(), json!({"answer": "ok"}));
        outputs.insert("other".to_string(), json!({"answer": "ignored"}));
        let input = build_step_input("w", &step, &json!({"budget": 1}), &outputs).unwrap();
        assert_eq!(input, json!({"budget": 1, "research": {"answer": "ok"}}));
    }
}
