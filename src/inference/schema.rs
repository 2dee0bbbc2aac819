use serde_json::Value as JsonValue;

/// Expected shape of a single field in a model response
#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
    /// Any JSON string
    Text,
    /// JSON number, optionally bounded (inclusive)
    Number { min: Option<f64>, max: Option<f64> },
    /// String matched case-insensitively against a closed set
    OneOf(Vec<String>),
    /// Array of strings
    TextList,
    /// Array of objects, each validated against the nested schema
    ObjectList(Box<ResponseSchema>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    pub name: String,
    pub kind: FieldKind,
    pub required: bool,
}

/// Structural contract for a model response.
///
/// Validation checks presence of required fields, JSON types, enum membership
/// and numeric ranges. It never rewrites the value; leniency (clamping, enum
/// defaults) is the stages' business.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseSchema {
    name: String,
    fields: Vec<FieldSpec>,
}

impl ResponseSchema {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    pub fn required(mut self, name: impl Into<String>, kind: FieldKind) -> Self {
        self.fields.push(FieldSpec {
            name: name.into(),
            kind,
            required: true,
        });
        self
    }

    pub fn optional(mut self, name: impl Into<String>, kind: FieldKind) -> Self {
        self.fields.push(FieldSpec {
            name: name.into(),
            kind,
            required: false,
        });
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    /// Check `value` against this schema, reporting the first violation
    pub fn validate(&self, value: &JsonValue) -> Result<(), String> {
        self.validate_at(value, "")
    }

    fn validate_at(&self, value: &JsonValue, path: &str) -> Result<(), String> {
        let object = value.as_object().ok_or_else(|| {
            format!("{}: expected a JSON object", display_path(path, &self.name))
        })?;

        for field in &self.fields {
            let field_path = if path.is_empty() {
                field.name.clone()
            } else {
                format!("{}.{}", path, field.name)
            };

            match object.get(&field.name) {
                None | Some(JsonValue::Null) => {
                    if field.required {
                        return Err(format!("{}: required field missing", field_path));
                    }
                }
                Some(found) => check_kind(&field.kind, found, &field_path)?,
            }
        }

        Ok(())
    }
}

fn check_kind(kind: &FieldKind, value: &JsonValue, path: &str) -> Result<(), String> {
    match kind {
        FieldKind::Text => {
            if !value.is_string() {
                return Err(format!("{}: expected a string", path));
            }
        }
        FieldKind::Number { min, max } => {
            let number = value
                .as_f64()
                .ok_or_else(|| format!("{}: expected a number", path))?;
            if let Some(min) = min {
                if number < *min {
                    return Err(format!("{}: {} is below minimum {}", path, number, min));
                }
            }
            if let Some(max) = max {
                if number > *max {
                    return Err(format!("{}: {} is above maximum {}", path, number, max));
                }
            }
        }
        FieldKind::OneOf(allowed) => {
            let text = value
                .as_str()
                .ok_or_else(|| format!("{}: expected a string", path))?;
            let text = text.trim();
            if !allowed.iter().any(|a| a.eq_ignore_ascii_case(text)) {
                return Err(format!("{}: '{}' is not one of {:?}", path, text, allowed));
            }
        }
        FieldKind::TextList => {
            let items = value
                .as_array()
                .ok_or_else(|| format!("{}: expected an array", path))?;
            if let Some(idx) = items.iter().position(|item| !item.is_string()) {
                return Err(format!("{}[{}]: expected a string", path, idx));
            }
        }
        FieldKind::ObjectList(schema) => {
            let items = value
                .as_array()
                .ok_or_else(|| format!("{}: expected an array", path))?;
            for (idx, item) in items.iter().enumerate() {
                schema.validate_at(item, &format!("{}[{}]", path, idx))?;
            }
        }
    }

    Ok(())
}

fn display_path<'a>(path: &'a str, schema_name: &'a str) -> &'a str {
    if path.is_empty() {
        schema_name
    } else {
        path
    }
}
