// ── Field descriptors ──
//
// Declarative metadata for one field: state name, wire name, shape, scalar
// type, table key, nested fields and version-gated coercion rules.
// Descriptors are built once when a schema is loaded and never mutated.

use std::collections::HashMap;

use indexmap::IndexMap;
use serde::ser::SerializeSeq;
use serde::{Deserialize, Serialize, Serializer};
use strum::{Display, EnumString};

use crate::error::CoreError;
use crate::value::Scalar;
use crate::version::ApiVersion;

// ── Enums ───────────────────────────────────────────────────────────

/// Shape of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum FieldKind {
    #[default]
    Scalar,
    ListOfScalar,
    /// Repeated block whose row order is meaningful.
    ListOfObject,
    /// Repeated block with no natural order; rows are sorted by key.
    SetOfObject,
}

impl FieldKind {
    /// Repeated block of nested objects.
    pub fn is_table(self) -> bool {
        matches!(self, Self::ListOfObject | Self::SetOfObject)
    }
}

/// Type of a scalar (or of each element of a list-of-scalar).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ScalarType {
    #[default]
    String,
    Integer,
    Float,
    Boolean,
}

/// How a scalar is written to the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum WireEncoding {
    /// JSON type matching the field's scalar type.
    #[default]
    Native,
    String,
    Integer,
    Float,
    Boolean,
}

// ── Coercion rules ──────────────────────────────────────────────────

/// One row of a field's version table: `encode` applies to API versions
/// in `[since, below)`. A missing bound is open.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CoercionRule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub since: Option<ApiVersion>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub below: Option<ApiVersion>,
    pub encode: WireEncoding,
}

impl CoercionRule {
    pub fn applies_to(&self, version: &ApiVersion) -> bool {
        self.since.as_ref().is_none_or(|since| version >= since)
            && self.below.as_ref().is_none_or(|below| version < below)
    }
}

// ── FieldDescriptor ─────────────────────────────────────────────────

/// Metadata for a single state field.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldDescriptor {
    pub name: String,
    pub wire_name: String,
    pub kind: FieldKind,
    pub scalar_type: ScalarType,
    /// Name of the nested scalar that identifies a row (tables only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_field: Option<String>,
    #[serde(skip_serializing_if = "DescriptorSet::is_empty")]
    pub fields: DescriptorSet,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub coercion: Vec<CoercionRule>,
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Scalar>,
}

impl FieldDescriptor {
    /// Scalar field; wire name is the state name with `_` → `-`.
    pub fn scalar(name: impl Into<String>, scalar_type: ScalarType) -> Self {
        let name = name.into();
        Self {
            wire_name: default_wire_name(&name),
            name,
            kind: FieldKind::Scalar,
            scalar_type,
            key_field: None,
            fields: DescriptorSet::default(),
            coercion: Vec::new(),
            required: false,
            default: None,
        }
    }

    pub fn scalar_list(name: impl Into<String>, scalar_type: ScalarType) -> Self {
        Self {
            kind: FieldKind::ListOfScalar,
            ..Self::scalar(name, scalar_type)
        }
    }

    /// Table field. The key and nested names are checked by
    /// [`FieldDescriptor::validate`].
    pub fn table(
        name: impl Into<String>,
        kind: FieldKind,
        key_field: impl Into<String>,
        fields: Vec<FieldDescriptor>,
    ) -> Self {
        Self {
            kind,
            key_field: Some(key_field.into()),
            fields: DescriptorSet::collect(fields),
            ..Self::scalar(name, ScalarType::String)
        }
    }

    pub fn with_wire_name(mut self, wire_name: impl Into<String>) -> Self {
        self.wire_name = wire_name.into();
        self
    }

    pub fn with_rule(mut self, rule: CoercionRule) -> Self {
        self.coercion.push(rule);
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_default(mut self, default: impl Into<Scalar>) -> Self {
        self.default = Some(default.into());
        self
    }

    /// Encoding in effect at `version`: first matching rule, else native.
    pub fn encoding_for(&self, version: &ApiVersion) -> WireEncoding {
        self.coercion
            .iter()
            .find(|rule| rule.applies_to(version))
            .map_or(WireEncoding::Native, |rule| rule.encode)
    }

    /// Every encoding this field may carry on the wire at any version.
    pub fn possible_encodings(&self) -> Vec<WireEncoding> {
        let mut encodings = vec![WireEncoding::Native];
        for rule in &self.coercion {
            if !encodings.contains(&rule.encode) {
                encodings.push(rule.encode);
            }
        }
        encodings
    }

    pub fn is_table(&self) -> bool {
        self.kind.is_table()
    }

    /// Check structural consistency. `at` is the dotted location used in
    /// messages.
    pub fn validate(&self, at: &str) -> Result<(), CoreError> {
        let here = if at.is_empty() {
            self.name.clone()
        } else {
            format!("{at}.{}", self.name)
        };

        if self.name.is_empty() || self.wire_name.is_empty() {
            return Err(CoreError::schema(format!("{here}: empty field name")));
        }

        if self.kind.is_table() {
            if self.fields.is_empty() {
                return Err(CoreError::schema(format!("{here}: table has no nested fields")));
            }
            let key = self
                .key_field
                .as_deref()
                .ok_or_else(|| CoreError::schema(format!("{here}: table has no key field")))?;
            match self.fields.get(key) {
                Some(d) if d.kind == FieldKind::Scalar => {}
                Some(_) => {
                    return Err(CoreError::schema(format!(
                        "{here}: key field '{key}' must be a scalar"
                    )));
                }
                None => {
                    return Err(CoreError::schema(format!(
                        "{here}: key field '{key}' is not a nested field"
                    )));
                }
            }
            self.fields.validate(&here)?;
        } else {
            if !self.fields.is_empty() {
                return Err(CoreError::schema(format!(
                    "{here}: {} fields cannot have nested fields",
                    self.kind
                )));
            }
            if self.key_field.is_some() {
                return Err(CoreError::schema(format!(
                    "{here}: only tables have a key field"
                )));
            }
        }

        if self.default.is_some() && self.kind != FieldKind::Scalar {
            return Err(CoreError::schema(format!(
                "{here}: {} fields cannot have a default",
                self.kind
            )));
        }

        if let Some(default) = &self.default {
            let fits = default.scalar_type() == self.scalar_type
                || (self.scalar_type == ScalarType::Float && matches!(default, Scalar::Int(_)));
            if !fits {
                return Err(CoreError::schema(format!(
                    "{here}: default {default} is not a {}",
                    self.scalar_type
                )));
            }
        }

        for rule in &self.coercion {
            if let (Some(since), Some(below)) = (&rule.since, &rule.below) {
                if since >= below {
                    return Err(CoreError::schema(format!(
                        "{here}: coercion rule range {since}..{below} is empty"
                    )));
                }
            }
        }

        Ok(())
    }
}

pub(crate) fn default_wire_name(name: &str) -> String {
    name.replace('_', "-")
}

// ── DescriptorSet ───────────────────────────────────────────────────

/// Ordered set of descriptors addressable by state name or wire name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DescriptorSet {
    by_name: IndexMap<String, FieldDescriptor>,
    wire_index: HashMap<String, String>,
    duplicate: Option<String>,
}

impl DescriptorSet {
    /// Build a set, rejecting duplicate state or wire names.
    pub fn new(fields: Vec<FieldDescriptor>) -> Result<Self, CoreError> {
        let set = Self::collect(fields);
        set.check_duplicates("")?;
        Ok(set)
    }

    fn collect(fields: Vec<FieldDescriptor>) -> Self {
        let mut set = Self::default();
        for field in fields {
            if set.by_name.contains_key(&field.name) || set.wire_index.contains_key(&field.wire_name) {
                set.duplicate.get_or_insert_with(|| field.name.clone());
                continue;
            }
            set.wire_index
                .insert(field.wire_name.clone(), field.name.clone());
            set.by_name.insert(field.name.clone(), field);
        }
        set
    }

    fn check_duplicates(&self, at: &str) -> Result<(), CoreError> {
        match &self.duplicate {
            Some(name) if at.is_empty() => Err(CoreError::schema(format!(
                "duplicate field or wire name '{name}'"
            ))),
            Some(name) => Err(CoreError::schema(format!(
                "{at}: duplicate field or wire name '{name}'"
            ))),
            None => Ok(()),
        }
    }

    pub fn get(&self, name: &str) -> Option<&FieldDescriptor> {
        self.by_name.get(name)
    }

    pub fn by_wire(&self, wire_name: &str) -> Option<&FieldDescriptor> {
        self.wire_index
            .get(wire_name)
            .and_then(|name| self.by_name.get(name))
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldDescriptor> {
        self.by_name.values()
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    /// Validate every descriptor (recursively) under location `at`.
    pub fn validate(&self, at: &str) -> Result<(), CoreError> {
        self.check_duplicates(at)?;
        self.iter().try_for_each(|d| d.validate(at))
    }
}

impl Serialize for DescriptorSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.by_name.len()))?;
        for field in self.by_name.values() {
            seq.serialize_element(field)?;
        }
        seq.end()
    }
}
