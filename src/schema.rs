//! Output shapes declared to the generation service, built at run time.
//!
//! An [`OutputShape`] renders to the JSON schema sent with a request and
//! validates the decoded response locally. The service's constrained decoding
//! is never trusted on its own: every field is checked again here, and any
//! mismatch is reported as a [`FieldViolation`] rather than coerced.

use crate::error::{Error, FieldViolation, Result};
use serde_json::{Map, Value, json};

/// What a single field of a shape accepts.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
    /// A string that must equal one of the listed values exactly.
    OneOf(Vec<String>),
    /// A string of at least `min_len` characters.
    Text { min_len: usize },
    /// An array of objects, each matching the nested fields.
    List(Vec<FieldSpec>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    pub name: String,
    pub description: String,
    pub kind: FieldKind,
}

impl FieldSpec {
    pub fn one_of(name: impl Into<String>, description: impl Into<String>, values: Vec<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            kind: FieldKind::OneOf(values),
        }
    }

    pub fn text(name: impl Into<String>, description: impl Into<String>, min_len: usize) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            kind: FieldKind::Text { min_len },
        }
    }

    pub fn list(name: impl Into<String>, description: impl Into<String>, fields: Vec<FieldSpec>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            kind: FieldKind::List(fields),
        }
    }
}

/// A named object schema with every field required.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputShape {
    pub name: String,
    pub fields: Vec<FieldSpec>,
}

impl OutputShape {
    pub fn new(name: impl Into<String>, fields: Vec<FieldSpec>) -> Self {
        Self {
            name: name.into(),
            fields,
        }
    }

    /// JSON schema in the strict subset accepted by OpenAI structured outputs.
    ///
    /// Minimum lengths are not expressible there, so they go into the field
    /// description and are enforced by [`OutputShape::validate`].
    pub fn json_schema(&self) -> Value {
        object_schema(&self.fields)
    }

    /// Check a decoded response. Returns every violation found, in field order.
    pub fn validate(&self, value: &Value) -> Vec<FieldViolation> {
        let mut violations = Vec::new();
        check_object(&self.fields, value, "", &mut violations);
        violations
    }

    /// Parse raw response text as JSON and validate it against this shape.
    pub fn decode(&self, raw: &str) -> Result<Map<String, Value>> {
        let json_str = extract_json(raw);
        let value: Value = serde_json::from_str(json_str).map_err(|e| {
            Error::schema(FieldViolation::new(
                "(response)",
                format!("a JSON object matching '{}'", self.name),
                format!("unparseable output ({e}): {}", preview(raw)),
            ))
        })?;

        let violations = self.validate(&value);
        if !violations.is_empty() {
            return Err(Error::SchemaValidation(violations));
        }

        match value {
            Value::Object(map) => Ok(map),
            // validate() already rejects non-objects
            other => Err(Error::schema(FieldViolation::new(
                "(response)",
                "an object",
                describe(&other),
            ))),
        }
    }
}

fn object_schema(fields: &[FieldSpec]) -> Value {
    let mut properties = Map::new();
    for field in fields {
        properties.insert(field.name.clone(), field_schema(field));
    }
    let required: Vec<&str> = fields.iter().map(|f| f.name.as_str()).collect();
    json!({
        "type": "object",
        "properties": properties,
        "required": required,
        "additionalProperties": false,
    })
}

fn field_schema(field: &FieldSpec) -> Value {
    match &field.kind {
        FieldKind::OneOf(values) => json!({
            "type": "string",
            "enum": values,
            "description": field.description,
        }),
        FieldKind::Text { min_len } if *min_len > 0 => json!({
            "type": "string",
            "description": format!("{} (at least {min_len} characters)", field.description),
        }),
        FieldKind::Text { .. } => json!({
            "type": "string",
            "description": field.description,
        }),
        FieldKind::List(nested) => json!({
            "type": "array",
            "description": field.description,
            "items": object_schema(nested),
        }),
    }
}

fn check_object(fields: &[FieldSpec], value: &Value, prefix: &str, out: &mut Vec<FieldViolation>) {
    let Some(map) = value.as_object() else {
        let path = if prefix.is_empty() { "(response)" } else { prefix };
        out.push(FieldViolation::new(path, "an object", describe(value)));
        return;
    };

    for field in fields {
        let path = if prefix.is_empty() {
            field.name.clone()
        } else {
            format!("{prefix}.{}", field.name)
        };
        match map.get(&field.name) {
            None | Some(Value::Null) => {
                out.push(FieldViolation::new(&path, expected(field), "missing"));
            }
            Some(v) => check_field(field, v, &path, out),
        }
    }
}

fn check_field(field: &FieldSpec, value: &Value, path: &str, out: &mut Vec<FieldViolation>) {
    match (&field.kind, value) {
        (FieldKind::OneOf(values), Value::String(s)) => {
            if !values.iter().any(|v| v == s) {
                out.push(FieldViolation::new(path, expected(field), describe(value)));
            }
        }
        (FieldKind::Text { min_len }, Value::String(s)) => {
            if s.chars().count() < *min_len {
                out.push(FieldViolation::new(
                    path,
                    expected(field),
                    format!("{} ({} characters)", describe(value), s.chars().count()),
                ));
            }
        }
        (FieldKind::List(nested), Value::Array(items)) => {
            for (i, item) in items.iter().enumerate() {
                check_object(nested, item, &format!("{path}[{i}]"), out);
            }
        }
        _ => out.push(FieldViolation::new(path, expected(field), describe(value))),
    }
}

fn expected(field: &FieldSpec) -> String {
    match &field.kind {
        FieldKind::OneOf(values) => format!("one of [{}]", values.join(", ")),
        FieldKind::Text { min_len } if *min_len > 0 => {
            format!("a string of at least {min_len} characters")
        }
        FieldKind::Text { .. } => "a string".into(),
        FieldKind::List(_) => "a list of objects".into(),
    }
}

fn describe(value: &Value) -> String {
    match value {
        Value::String(s) => format!("\"{}\"", preview(s)),
        Value::Null => "null".into(),
        Value::Bool(_) => format!("a boolean ({value})"),
        Value::Number(_) => format!("a number ({value})"),
        Value::Array(a) => format!("an array of {} item(s)", a.len()),
        Value::Object(_) => "an object".into(),
    }
}

fn preview(s: &str) -> String {
    const MAX: usize = 120;
    if s.chars().count() <= MAX {
        s.to_string()
    } else {
        let cut: String = s.chars().take(MAX).collect();
        format!("{cut}...")
    }
}

/// Extract JSON from a response that might be wrapped in markdown code fences.
pub fn extract_json(text: &str) -> &str {
    if let Some(start) = text.find("```json") {
        let content = &text[start + 7..];
        if let Some(end) = content.find("```") {
            return content[..end].trim();
        }
    }
    if let Some(start) = text.find("```") {
        let content = &text[start + 3..];
        if let Some(end) = content.find("```") {
            let inner = content[..end].trim();
            if inner.starts_with('{') || inner.starts_with('[') {
                return inner;
            }
        }
    }
    if let Some(start) = text.find('{')
        && let Some(end) = text.rfind('}')
        && start < end
    {
        return &text[start..=end];
    }
    text.trim()
}
