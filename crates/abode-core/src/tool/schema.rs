//! Helpers for the JSON-schema-shaped tool contracts
//!
//! Only the parts of JSON schema the runtime relies on are interpreted:
//! top-level `properties`, `required` and per-property `type`.

use serde_json::{Map, Value};

/// Property names declared by an object schema, in alphabetical order
///
/// Schema maps do not keep insertion order, so declaration order is lost.
pub fn property_names(schema: &Value) -> Vec<&str> {
    schema
        .get("properties")
        .and_then(Value::as_object)
        .map(|props| props.keys().map(String::as_str).collect())
        .unwrap_or_default()
}

/// Required property names of an object schema
pub fn required_names(schema: &Value) -> Vec<&str> {
    schema
        .get("required")
        .and_then(Value::as_array)
        .map(|req| req.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default()
}

/// Check an input object against a schema
///
/// Returns a description of the first problem found: a non-object input,
/// a missing or null required property, or a property of the wrong type.
pub fn validate_input(schema: &Value, input: &Value) -> Result<(), String> {
    let Some(object) = input.as_object() else {
        return Err(format!("expected an object input, got {}", type_name(input)));
    };

    for name in required_names(schema) {
        match object.get(name) {
            None | Some(Value::Null) => {
                return Err(format!("missing required argument '{}'", name));
            }
            Some(_) => {}
        }
    }

    if let Some(props) = schema.get("properties").and_then(Value::as_object) {
        for (name, value) in object {
            if value.is_null() {
                continue;
            }
            let expected = props
                .get(name)
                .and_then(|p| p.get("type"))
                .and_then(Value::as_str);
            if let Some(expected) = expected {
                if !matches_type(expected, value) {
                    return Err(format!(
                        "argument '{}' should be {}, got {}",
                        name,
                        expected,
                        type_name(value)
                    ));
                }
            }
        }
    }

    Ok(())
}

/// Select the schema's properties from a set of candidate values
///
/// The first non-null candidate for each property wins. Properties with no
/// candidate are left out.
pub fn bind_arguments<'a, I>(schema: &Value, sources: I) -> Value
where
    I: IntoIterator<Item = &'a Map<String, Value>> + Clone,
{
    let mut args = Map::new();
    for name in property_names(schema) {
        let found = sources
            .clone()
            .into_iter()
            .find_map(|source| source.get(name).filter(|v| !v.is_null()));
        if let Some(value) = found {
            args.insert(name.to_string(), value.clone());
        }
    }
    Value::Object(args)
}

fn matches_type(expected: &str, value: &Value) -> bool {
    match expected {
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => value.is_i64() || value.is_u64(),
        "boolean" => value.is_boolean(),
        "array" => value.is_array(),
        "object" => value.is_object(),
        _ => true,
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
