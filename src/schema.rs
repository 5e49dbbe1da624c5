//! Declarative settings schema.
//!
//! Each configurable section lists its fields with a kind and constraints, so
//! a host (editor, CLI, config file loader) can render and validate settings
//! without knowing the bridge's types.

use crate::error::BridgeError;

/// Type of a settings field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// `true` / `false`.
    Bool,
    /// Floating point number. Integer values are accepted.
    Float,
    /// Signed integer.
    Integer,
    /// Free text.
    Text,
    /// One of a fixed set of names (case-insensitive).
    Choice(&'static [&'static str]),
}

/// Constraint checked against a field's value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Constraint {
    /// Numeric value must be `>=` the bound.
    Min(f64),
    /// Numeric value must be `<=` the bound.
    Max(f64),
    /// Numeric value must be finite and `> 0`.
    Positive,
    /// Text must not be empty.
    NonEmpty,
}

/// A concrete value supplied for a field.
#[derive(Debug, Clone, PartialEq)]
pub enum SettingValue {
    /// Boolean value.
    Bool(bool),
    /// Floating point value.
    Float(f64),
    /// Integer value.
    Integer(i64),
    /// Text value.
    Text(String),
}

impl SettingValue {
    #[allow(clippy::cast_precision_loss)]
    fn as_number(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            Self::Integer(v) => Some(*v as f64),
            _ => None,
        }
    }
}

impl From<bool> for SettingValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<f64> for SettingValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<i64> for SettingValue {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<&str> for SettingValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

/// One field of a section.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    name: &'static str,
    kind: FieldKind,
    constraints: Vec<Constraint>,
    description: &'static str,
}

impl FieldSpec {
    /// Creates a field with no constraints.
    #[must_use]
    pub fn new(name: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            kind,
            constraints: Vec::new(),
            description: "",
        }
    }

    /// Adds a constraint.
    #[must_use]
    pub fn constraint(mut self, constraint: Constraint) -> Self {
        self.constraints.push(constraint);
        self
    }

    /// Sets the human-readable description.
    #[must_use]
    pub fn describe(mut self, description: &'static str) -> Self {
        self.description = description;
        self
    }

    /// Field name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Field kind.
    #[must_use]
    pub fn kind(&self) -> FieldKind {
        self.kind
    }

    /// Constraints on the field.
    #[must_use]
    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    /// Human-readable description.
    #[must_use]
    pub fn description(&self) -> &'static str {
        self.description
    }

    /// Checks one value against this field's kind and constraints.
    ///
    /// On failure returns the reason, without section/field context.
    fn check(&self, value: &SettingValue) -> Result<(), String> {
        match (self.kind, value) {
            (FieldKind::Bool, SettingValue::Bool(_))
            | (FieldKind::Float, SettingValue::Float(_) | SettingValue::Integer(_))
            | (FieldKind::Integer, SettingValue::Integer(_))
            | (FieldKind::Text, SettingValue::Text(_)) => {}
            (FieldKind::Choice(options), SettingValue::Text(text)) => {
                if !options.iter().any(|o| o.eq_ignore_ascii_case(text)) {
                    return Err(format!("'{text}' is not one of {}", options.join(", ")));
                }
            }
            (kind, value) => return Err(format!("expected {kind:?}, got {value:?}")),
        }

        for constraint in &self.constraints {
            match (constraint, value) {
                (Constraint::NonEmpty, SettingValue::Text(text)) if text.is_empty() => {
                    return Err("must not be empty".to_string());
                }
                (Constraint::Positive, v) => {
                    if let Some(n) = v.as_number() {
                        if !n.is_finite() || n <= 0.0 {
                            return Err(format!("{n} must be finite and greater than zero"));
                        }
                    }
                }
                (Constraint::Min(min), v) => {
                    if let Some(n) = v.as_number() {
                        if n.is_nan() || n < *min {
                            return Err(format!("{n} is below the minimum {min}"));
                        }
                    }
                }
                (Constraint::Max(max), v) => {
                    if let Some(n) = v.as_number() {
                        if n.is_nan() || n > *max {
                            return Err(format!("{n} is above the maximum {max}"));
                        }
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }
}

/// A named group of fields.
#[derive(Debug, Clone, PartialEq)]
pub struct SectionSpec {
    name: &'static str,
    fields: Vec<FieldSpec>,
}

impl SectionSpec {
    /// Creates an empty section.
    #[must_use]
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            fields: Vec::new(),
        }
    }

    /// Adds a field.
    #[must_use]
    pub fn field(mut self, field: FieldSpec) -> Self {
        self.fields.push(field);
        self
    }

    /// Section name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Fields in declaration order.
    #[must_use]
    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    /// Looks up a field by name.
    #[must_use]
    pub fn find(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// The full set of settings sections.
///
/// # Example
///
/// ```
/// use stream_bridge::schema::{Constraint, FieldKind, FieldSpec, SectionSpec, SettingsSchema};
///
/// let schema = SettingsSchema::new().section(
///     SectionSpec::new("video")
///         .field(FieldSpec::new("rate", FieldKind::Float).constraint(Constraint::Positive)),
/// );
///
/// assert!(schema.validate("video", &[("rate", 30.0.into())]).is_ok());
/// assert!(schema.validate("video", &[("rate", 0.0.into())]).is_err());
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SettingsSchema {
    sections: Vec<SectionSpec>,
}

impl SettingsSchema {
    /// Creates an empty schema.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a section.
    #[must_use]
    pub fn section(mut self, section: SectionSpec) -> Self {
        self.sections.push(section);
        self
    }

    /// Sections in declaration order.
    #[must_use]
    pub fn sections(&self) -> &[SectionSpec] {
        &self.sections
    }

    /// Looks up a section by name.
    #[must_use]
    pub fn find(&self, name: &str) -> Option<&SectionSpec> {
        self.sections.iter().find(|s| s.name == name)
    }

    /// Validates a set of `(field, value)` pairs for one section.
    ///
    /// Stops at the first invalid value.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::InvalidSetting`] for an unknown section or
    /// field, a value of the wrong kind, or a violated constraint.
    pub fn validate(
        &self,
        section: &str,
        values: &[(&str, SettingValue)],
    ) -> Result<(), BridgeError> {
        let invalid = |field: &str, reason: String| BridgeError::InvalidSetting {
            section: section.to_string(),
            field: field.to_string(),
            reason,
        };

        let spec = self
            .find(section)
            .ok_or_else(|| invalid("*", "unknown section".to_string()))?;

        for (name, value) in values {
            let field = spec
                .find(name)
                .ok_or_else(|| invalid(name, "unknown field".to_string()))?;
            field.check(value).map_err(|reason| invalid(name, reason))?;
        }
        Ok(())
    }
}
