//! Tool input schemas: ingestion of server-declared JSON Schemas,
//! synthesis of fallback schemas, and local argument validation.

use std::collections::BTreeMap;

use serde_json::{json, Map, Value};

use crate::error::{Result, SwitchboardError};

/// The twelve zodiac signs in canonical spelling.
pub const ZODIAC_SIGNS: [&str; 12] = [
    "Aries",
    "Taurus",
    "Gemini",
    "Cancer",
    "Leo",
    "Virgo",
    "Libra",
    "Scorpio",
    "Sagittarius",
    "Capricorn",
    "Aquarius",
    "Pisces",
];

/// Horoscope period selectors accepted by astrology services.
pub const HOROSCOPE_TYPES: [&str; 2] = ["DAILY", "MONTHLY"];

/// Primitive type of a schema field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    String,
    Integer,
    Number,
    Boolean,
    /// Unrecognized declared type; presence is checked, the value is not.
    Any,
}

impl FieldKind {
    fn from_declared(type_name: Option<&str>) -> Self {
        match type_name {
            Some("string") => FieldKind::String,
            Some("integer") => FieldKind::Integer,
            Some("number") => FieldKind::Number,
            Some("boolean") => FieldKind::Boolean,
            _ => FieldKind::Any,
        }
    }

    fn as_json_type(&self) -> &'static str {
        match self {
            FieldKind::String => "string",
            FieldKind::Integer => "integer",
            FieldKind::Number => "number",
            FieldKind::Boolean => "boolean",
            FieldKind::Any => "string",
        }
    }

    fn matches(&self, value: &Value) -> bool {
        match self {
            FieldKind::String => value.is_string(),
            FieldKind::Integer => value.is_i64() || value.is_u64(),
            FieldKind::Number => value.is_number(),
            FieldKind::Boolean => value.is_boolean(),
            FieldKind::Any => true,
        }
    }
}

/// One field of a tool's input schema.
#[derive(Debug, Clone)]
pub struct FieldSpec {
    pub kind: FieldKind,
    pub required: bool,
    /// Closed set of accepted values, canonical spelling.
    pub allowed: Option<Vec<String>>,
    pub description: Option<String>,
}

impl FieldSpec {
    pub fn string(required: bool) -> Self {
        Self {
            kind: FieldKind::String,
            required,
            allowed: None,
            description: None,
        }
    }

    pub fn with_allowed<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed = Some(values.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// The input contract of one tool.
///
/// Built either from the schema the server declared in `tools/list` or,
/// when the server declared nothing usable, synthesized from the tool name.
#[derive(Debug, Clone, Default)]
pub struct InputSchema {
    fields: BTreeMap<String, FieldSpec>,
}

impl InputSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, name: impl Into<String>, spec: FieldSpec) -> Self {
        self.fields.insert(name.into(), spec);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Parse a server-declared JSON Schema. Returns `None` when the
    /// declaration carries no properties, so the caller can synthesize one.
    pub fn from_declared(declared: &Value) -> Option<Self> {
        let properties = declared.get("properties")?.as_object()?;
        if properties.is_empty() {
            return None;
        }

        let required: Vec<&str> = declared
            .get("required")
            .and_then(Value::as_array)
            .map(|names| names.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();

        let mut schema = InputSchema::new();
        for (name, prop) in properties {
            let kind = FieldKind::from_declared(prop.get("type").and_then(Value::as_str));
            let allowed = prop.get("enum").and_then(Value::as_array).map(|values| {
                values
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect::<Vec<_>>()
            });
            let description = prop
                .get("description")
                .and_then(Value::as_str)
                .map(str::to_string);
            schema.fields.insert(
                name.clone(),
                FieldSpec {
                    kind,
                    required: required.contains(&name.as_str()),
                    allowed,
                    description,
                },
            );
        }
        Some(schema)
    }

    /// Synthesize a schema for a tool that declared none. Astrology tools
    /// take a zodiac sign and an optional period; everything else takes a
    /// single free-text query.
    pub fn synthesize_for(tool_name: &str) -> Self {
        if tool_name.to_ascii_lowercase().contains("horoscope") {
            InputSchema::new()
                .field(
                    "zodiac_sign",
                    FieldSpec::string(true)
                        .with_allowed(ZODIAC_SIGNS)
                        .with_description("Zodiac sign to look up"),
                )
                .field(
                    "horoscope_type",
                    FieldSpec::string(false)
                        .with_allowed(HOROSCOPE_TYPES)
                        .with_description("Horoscope period, defaults to DAILY"),
                )
        } else {
            InputSchema::new().field(
                "query",
                FieldSpec::string(true).with_description("Search query string"),
            )
        }
    }

    /// Validate `arguments` against this schema and return the normalized
    /// copy that should go over the wire. Enum values are matched without
    /// regard to case and rewritten to their canonical spelling. Fields the
    /// schema does not mention pass through untouched.
    pub fn validate(&self, tool: &str, arguments: &Value) -> Result<Value> {
        let supplied: Map<String, Value> = match arguments {
            Value::Object(map) => map.clone(),
            Value::Null => Map::new(),
            other => {
                return Err(SwitchboardError::Validation {
                    tool: tool.to_string(),
                    reason: format!("arguments must be a JSON object, got {other}"),
                })
            }
        };

        for (name, spec) in &self.fields {
            if spec.required && !supplied.contains_key(name) {
                return Err(SwitchboardError::Validation {
                    tool: tool.to_string(),
                    reason: format!("missing required field `{name}`"),
                });
            }
        }

        let mut normalized = Map::new();
        for (name, value) in supplied {
            let Some(spec) = self.fields.get(&name) else {
                normalized.insert(name, value);
                continue;
            };

            if !spec.kind.matches(&value) {
                return Err(SwitchboardError::Validation {
                    tool: tool.to_string(),
                    reason: format!(
                        "field `{name}` must be of type {}",
                        spec.kind.as_json_type()
                    ),
                });
            }

            let value = match (&spec.allowed, value.as_str()) {
                (Some(allowed), Some(text)) => {
                    let canonical = allowed
                        .iter()
                        .find(|candidate| candidate.eq_ignore_ascii_case(text));
                    match canonical {
                        Some(canonical) => Value::String(canonical.clone()),
                        None => {
                            return Err(SwitchboardError::Validation {
                                tool: tool.to_string(),
                                reason: format!(
                                    "field `{name}` must be one of [{}], got `{text}`",
                                    allowed.join(", ")
                                ),
                            })
                        }
                    }
                }
                _ => value,
            };
            normalized.insert(name, value);
        }

        Ok(Value::Object(normalized))
    }

    /// Render the schema in the JSON Schema shape language models expect.
    pub fn to_json_schema(&self) -> Value {
        let mut properties = Map::new();
        let mut required = Vec::new();

        for (name, spec) in &self.fields {
            let mut prop = Map::new();
            prop.insert("type".into(), json!(spec.kind.as_json_type()));
            if let Some(allowed) = &spec.allowed {
                prop.insert("enum".into(), json!(allowed));
            }
            if let Some(description) = &spec.description {
                prop.insert("description".into(), json!(description));
            }
            properties.insert(name.clone(), Value::Object(prop));
            if spec.required {
                required.push(name.clone());
            }
        }

        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }
}
