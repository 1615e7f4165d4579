// ── State-side value model ──
//
// A `StateTree` is the user-facing configuration record: an ordered map
// from state field name to `StateValue`. Tables are rows of nested trees.
// A field that is not in the map reads as `StateValue::Absent`, so "never
// set" is a variant rather than a sentinel zero value.

use std::fmt;

use indexmap::IndexMap;
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Number, Value};

use crate::coerce;
use crate::error::CoreError;
use crate::path::{FieldPath, Seg};
use crate::schema::{DescriptorSet, FieldDescriptor, FieldKind, ScalarType};

static ABSENT: StateValue = StateValue::Absent;

// ── Scalar ──────────────────────────────────────────────────────────

/// A typed primitive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl Scalar {
    /// The scalar type this value natively belongs to.
    pub fn scalar_type(&self) -> ScalarType {
        match self {
            Self::Bool(_) => ScalarType::Boolean,
            Self::Int(_) => ScalarType::Integer,
            Self::Float(_) => ScalarType::Float,
            Self::Str(_) => ScalarType::String,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Native JSON form. Non-finite floats have no JSON form and render as null.
    pub fn to_json(&self) -> Value {
        match self {
            Self::Bool(b) => Value::Bool(*b),
            Self::Int(i) => Value::from(*i),
            Self::Float(f) => Number::from_f64(*f).map_or(Value::Null, Value::Number),
            Self::Str(s) => Value::String(s.clone()),
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::Str(s) => write!(f, "{s}"),
        }
    }
}

impl From<&str> for Scalar {
    fn from(s: &str) -> Self {
        Self::Str(s.to_owned())
    }
}

impl From<String> for Scalar {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

impl From<i64> for Scalar {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<bool> for Scalar {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<f64> for Scalar {
    fn from(x: f64) -> Self {
        Self::Float(x)
    }
}

// ── StateValue ──────────────────────────────────────────────────────

/// The value of one state field.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum StateValue {
    /// Never set by the user.
    #[default]
    Absent,
    Scalar(Scalar),
    /// A list-of-scalar field.
    Scalars(Vec<Scalar>),
    /// Rows of an intrinsically ordered table.
    List(Vec<StateTree>),
    /// Rows of a table with no natural order (canonicalised by key).
    Set(Vec<StateTree>),
}

impl StateValue {
    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }

    /// Set, and not an empty container.
    pub fn has_content(&self) -> bool {
        match self {
            Self::Absent => false,
            Self::Scalar(_) => true,
            Self::Scalars(items) => !items.is_empty(),
            Self::List(rows) | Self::Set(rows) => !rows.is_empty(),
        }
    }

    pub fn as_scalar(&self) -> Option<&Scalar> {
        match self {
            Self::Scalar(s) => Some(s),
            _ => None,
        }
    }

    /// Table rows, for either table variant.
    pub fn rows(&self) -> Option<&[StateTree]> {
        match self {
            Self::List(rows) | Self::Set(rows) => Some(rows),
            _ => None,
        }
    }

    fn rows_mut(&mut self) -> Option<&mut Vec<StateTree>> {
        match self {
            Self::List(rows) | Self::Set(rows) => Some(rows),
            _ => None,
        }
    }

    /// Short shape name used in diagnostics.
    pub fn shape(&self) -> &'static str {
        match self {
            Self::Absent => "absent",
            Self::Scalar(_) => "scalar",
            Self::Scalars(_) => "list of scalars",
            Self::List(_) => "list of rows",
            Self::Set(_) => "set of rows",
        }
    }

    /// JSON rendering of the state value (not the wire encoding).
    pub fn to_json(&self) -> Value {
        match self {
            Self::Absent => Value::Null,
            Self::Scalar(s) => s.to_json(),
            Self::Scalars(items) => Value::Array(items.iter().map(Scalar::to_json).collect()),
            Self::List(rows) | Self::Set(rows) => Value::Array(
                rows.iter()
                    .map(|row| Value::Object(row.to_json()))
                    .collect(),
            ),
        }
    }
}

impl From<Scalar> for StateValue {
    fn from(s: Scalar) -> Self {
        Self::Scalar(s)
    }
}

impl Serialize for StateValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Absent => serializer.serialize_none(),
            Self::Scalar(s) => s.serialize(serializer),
            Self::Scalars(items) => items.serialize(serializer),
            Self::List(rows) | Self::Set(rows) => {
                let mut seq = serializer.serialize_seq(Some(rows.len()))?;
                for row in rows {
                    seq.serialize_element(row)?;
                }
                seq.end()
            }
        }
    }
}

// ── StateTree ───────────────────────────────────────────────────────

/// Ordered mapping from state field name to value.
///
/// Absent fields are never stored: inserting `Absent` removes the key, so
/// two trees are equal exactly when they set the same fields to the same
/// values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateTree {
    fields: IndexMap<String, StateValue>,
}

impl StateTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Value of a field, `Absent` if unset.
    pub fn get(&self, name: &str) -> &StateValue {
        self.fields.get(name).unwrap_or(&ABSENT)
    }

    /// Set a field. `Absent` removes it.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<StateValue>) {
        let name = name.into();
        match value.into() {
            StateValue::Absent => {
                self.fields.shift_remove(&name);
            }
            value => {
                self.fields.insert(name, value);
            }
        }
    }

    /// Builder-style [`insert`](Self::insert).
    pub fn with(mut self, name: impl Into<String>, value: impl Into<StateValue>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn remove(&mut self, name: &str) -> StateValue {
        self.fields.shift_remove(name).unwrap_or_default()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &StateValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// This tree limited to the top-level fields `other` mentions.
    pub fn restricted_to(&self, other: &StateTree) -> StateTree {
        let fields = self
            .fields
            .iter()
            .filter(|(name, _)| other.contains(name))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();
        StateTree { fields }
    }

    /// Resolve a path; anything that does not exist reads as `Absent`.
    pub fn get_path(&self, path: &FieldPath) -> &StateValue {
        let mut segs = path.segments().iter();
        let Some(Seg::Key(first)) = segs.next() else {
            return &ABSENT;
        };
        let mut current = self.get(first);
        while let Some(seg) = segs.next() {
            current = match (seg, current.rows()) {
                (Seg::Index(idx), Some(rows)) => match (rows.get(*idx), segs.next()) {
                    (Some(row), Some(Seg::Key(name))) => row.get(name),
                    _ => return &ABSENT,
                },
                _ => return &ABSENT,
            };
        }
        current
    }

    /// Write a value at a path. Intermediate rows must already exist.
    pub fn set_path(&mut self, path: &FieldPath, value: StateValue) -> Result<(), CoreError> {
        let Some((parent, last)) = path.split_last() else {
            return Err(CoreError::InvalidPath {
                raw: path.to_string(),
                reason: "cannot replace the root".into(),
            });
        };
        let Seg::Key(name) = last else {
            return Err(CoreError::InvalidPath {
                raw: path.to_string(),
                reason: "path must end with a field name".into(),
            });
        };
        let target = self.tree_at_mut(&parent, path)?;
        target.insert(name.clone(), value);
        Ok(())
    }

    fn tree_at_mut(&mut self, parent: &FieldPath, full: &FieldPath) -> Result<&mut StateTree, CoreError> {
        let missing = || CoreError::InvalidPath {
            raw: full.to_string(),
            reason: "no such row".into(),
        };
        let mut current = self;
        let mut segs = parent.segments().iter();
        while let Some(seg) = segs.next() {
            let (Seg::Key(name), Some(Seg::Index(idx))) = (seg, segs.next()) else {
                return Err(missing());
            };
            current = current
                .fields
                .get_mut(name)
                .and_then(StateValue::rows_mut)
                .and_then(|rows| rows.get_mut(*idx))
                .ok_or_else(missing)?;
        }
        Ok(current)
    }

    /// Plain JSON rendering (state names, absent fields omitted).
    pub fn to_json(&self) -> Map<String, Value> {
        self.fields
            .iter()
            .map(|(k, v)| (k.clone(), v.to_json()))
            .collect()
    }

    /// Parse a state document (JSON object keyed by state names).
    ///
    /// The descriptors decide each field's shape; `null` means Absent.
    pub fn from_json(obj: &Map<String, Value>, descriptors: &DescriptorSet) -> Result<Self, CoreError> {
        tree_from_json(obj, descriptors, &FieldPath::root())
    }
}

impl Serialize for StateTree {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (k, v) in &self.fields {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

impl FromIterator<(String, StateValue)> for StateTree {
    fn from_iter<I: IntoIterator<Item = (String, StateValue)>>(iter: I) -> Self {
        let mut tree = Self::new();
        for (k, v) in iter {
            tree.insert(k, v);
        }
        tree
    }
}

// ── State document parsing ──────────────────────────────────────────

fn tree_from_json(
    obj: &Map<String, Value>,
    descriptors: &DescriptorSet,
    path: &FieldPath,
) -> Result<StateTree, CoreError> {
    let mut tree = StateTree::new();
    for (key, raw) in obj {
        let field_path = path.key(key);
        let descriptor = descriptors
            .get(key)
            .ok_or(CoreError::UnknownField { path: field_path.clone() })?;
        tree.insert(key.clone(), value_from_json(raw, descriptor, &field_path)?);
    }
    Ok(tree)
}

fn value_from_json(
    raw: &Value,
    descriptor: &FieldDescriptor,
    path: &FieldPath,
) -> Result<StateValue, CoreError> {
    if raw.is_null() {
        return Ok(StateValue::Absent);
    }
    match descriptor.kind {
        FieldKind::Scalar => Ok(StateValue::Scalar(coerce::decode_native(
            raw,
            descriptor.scalar_type,
            path,
        )?)),
        FieldKind::ListOfScalar => {
            let items = coerce::expect_array(raw, descriptor, path)?;
            items
                .iter()
                .enumerate()
                .map(|(idx, item)| coerce::decode_native(item, descriptor.scalar_type, &path.index(idx)))
                .collect::<Result<Vec<_>, _>>()
                .map(StateValue::Scalars)
        }
        FieldKind::ListOfObject | FieldKind::SetOfObject => {
            let rows = coerce::expect_rows(raw, descriptor, path)?
                .into_iter()
                .enumerate()
                .map(|(idx, row)| tree_from_json(row, &descriptor.fields, &path.index(idx)))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(if descriptor.kind == FieldKind::SetOfObject {
                StateValue::Set(rows)
            } else {
                StateValue::List(rows)
            })
        }
    }
}
