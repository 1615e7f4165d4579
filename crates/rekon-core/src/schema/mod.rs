// ── Resource schemas ──
//
// A schema document names the resources a device exposes and declares the
// descriptors of each. Documents are YAML or JSON (chosen by extension):
//
//   resources:
//     - name: firewall_policy
//       path: firewall/policy
//       id_field: policyid
//       ignore: [q_origin_key]
//       fields:
//         - { name: policyid, type: integer }
//         - name: srcintf
//           kind: set-of-object
//           key: name
//           fields: [{ name: name }]
//
// The raw document is deserialized first, then converted into validated,
// immutable descriptors.

mod descriptor;

use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::coerce;
use crate::error::CoreError;
use crate::path::FieldPath;

pub use descriptor::{
    CoercionRule, DescriptorSet, FieldDescriptor, FieldKind, ScalarType, WireEncoding,
};

// ── Validated types ─────────────────────────────────────────────────

/// One object type exposed by the device.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResourceSchema {
    pub name: String,
    /// Collection path on the device, e.g. `firewall/policy`.
    pub path: String,
    /// Top-level scalar whose value identifies an object on the device.
    pub id_field: String,
    /// Wire keys the device adds that carry no configuration.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub ignore: Vec<String>,
    pub fields: DescriptorSet,
}

impl ResourceSchema {
    pub fn new(
        name: impl Into<String>,
        path: impl Into<String>,
        id_field: impl Into<String>,
        fields: DescriptorSet,
    ) -> Result<Self, CoreError> {
        let resource = Self {
            name: name.into(),
            path: path.into(),
            id_field: id_field.into(),
            ignore: Vec::new(),
            fields,
        };
        resource.validate()?;
        Ok(resource)
    }

    pub fn with_ignored(mut self, wire_keys: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.ignore.extend(wire_keys.into_iter().map(Into::into));
        self
    }

    pub fn is_ignored(&self, wire_key: &str) -> bool {
        self.ignore.iter().any(|k| k == wire_key)
    }

    fn validate(&self) -> Result<(), CoreError> {
        if self.path.trim_matches('/').is_empty() {
            return Err(CoreError::schema(format!("{}: empty path", self.name)));
        }
        match self.fields.get(&self.id_field) {
            Some(d) if d.kind == FieldKind::Scalar => {}
            _ => {
                return Err(CoreError::schema(format!(
                    "{}: id_field '{}' must name a top-level scalar field",
                    self.name, self.id_field
                )));
            }
        }
        self.fields.validate(&self.name)
    }
}

/// Named collection of resource schemas, shared read-only by the engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Schema {
    resources: IndexMap<String, ResourceSchema>,
}

impl Schema {
    pub fn new(resources: Vec<ResourceSchema>) -> Result<Self, CoreError> {
        let mut map = IndexMap::with_capacity(resources.len());
        for resource in resources {
            if map.contains_key(&resource.name) {
                return Err(CoreError::schema(format!(
                    "duplicate resource '{}'",
                    resource.name
                )));
            }
            map.insert(resource.name.clone(), resource);
        }
        Ok(Self { resources: map })
    }

    /// Load a schema file; `.json` is parsed as JSON, anything else as YAML.
    pub fn load(path: &Path) -> Result<Self, CoreError> {
        let text = std::fs::read_to_string(path).map_err(|source| CoreError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        let schema = if is_json {
            Self::from_json_str(&text)?
        } else {
            Self::from_yaml_str(&text)?
        };
        debug!(
            path = %path.display(),
            resources = schema.resources.len(),
            "loaded schema"
        );
        Ok(schema)
    }

    pub fn from_yaml_str(text: &str) -> Result<Self, CoreError> {
        let raw: RawSchema = serde_yaml::from_str(text)
            .map_err(|e| CoreError::schema(format!("invalid schema document: {e}")))?;
        raw.build()
    }

    pub fn from_json_str(text: &str) -> Result<Self, CoreError> {
        let raw: RawSchema = serde_json::from_str(text)
            .map_err(|e| CoreError::schema(format!("invalid schema document: {e}")))?;
        raw.build()
    }

    pub fn resource(&self, name: &str) -> Result<&ResourceSchema, CoreError> {
        self.resources
            .get(name)
            .ok_or_else(|| CoreError::UnknownResource { name: name.into() })
    }

    pub fn resources(&self) -> impl Iterator<Item = &ResourceSchema> {
        self.resources.values()
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

// ── Raw document ────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawSchema {
    resources: Vec<RawResource>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawResource {
    name: String,
    path: String,
    id_field: String,
    #[serde(default)]
    ignore: Vec<String>,
    fields: Vec<RawField>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawField {
    name: String,
    #[serde(default)]
    wire: Option<String>,
    #[serde(default)]
    kind: FieldKind,
    #[serde(default, rename = "type")]
    scalar_type: Option<ScalarType>,
    #[serde(default)]
    key: Option<String>,
    #[serde(default)]
    fields: Vec<RawField>,
    #[serde(default)]
    coercion: Vec<CoercionRule>,
    #[serde(default)]
    required: bool,
    #[serde(default)]
    default: Option<Value>,
}

impl RawSchema {
    fn build(self) -> Result<Schema, CoreError> {
        let resources = self
            .resources
            .into_iter()
            .map(RawResource::build)
            .collect::<Result<Vec<_>, _>>()?;
        Schema::new(resources)
    }
}

impl RawResource {
    fn build(self) -> Result<ResourceSchema, CoreError> {
        let fields = build_fields(self.fields, &self.name)?;
        let resource = ResourceSchema::new(self.name, self.path, self.id_field, fields)?;
        Ok(resource.with_ignored(self.ignore))
    }
}

fn build_fields(raw: Vec<RawField>, at: &str) -> Result<DescriptorSet, CoreError> {
    let fields = raw
        .into_iter()
        .map(|f| f.build(at))
        .collect::<Result<Vec<_>, _>>()?;
    DescriptorSet::new(fields).map_err(|e| match e {
        CoreError::Schema { message } => CoreError::schema(format!("{at}: {message}")),
        other => other,
    })
}

impl RawField {
    fn build(self, at: &str) -> Result<FieldDescriptor, CoreError> {
        let here = format!("{at}.{}", self.name);
        if self.kind.is_table() && self.scalar_type.is_some() {
            return Err(CoreError::schema(format!(
                "{here}: tables take no 'type'"
            )));
        }
        let scalar_type = self.scalar_type.unwrap_or_default();
        let default = self
            .default
            .map(|raw| {
                coerce::decode_native(&raw, scalar_type, &FieldPath::root().key(&self.name))
                    .map_err(|e| CoreError::schema(format!("{here}: bad default: {e}")))
            })
            .transpose()?;

        let mut descriptor = FieldDescriptor {
            kind: self.kind,
            key_field: self.key,
            fields: build_fields(self.fields, &here)?,
            ..FieldDescriptor::scalar(self.name, scalar_type)
        };
        if let Some(wire) = self.wire {
            descriptor.wire_name = wire;
        }
        descriptor.coercion = self.coercion;
        descriptor.required = self.required;
        descriptor.default = default;
        Ok(descriptor)
    }
}
