// ── Reconciler ──
//
// Wires the pure engine to a device transport. One `Reconciler` serves
// any number of calls; the schema is shared read-only and every call builds
// its own `ReconcileContext`, so concurrent calls never share mutable state.

use std::future::Future;
use std::sync::Arc;

use rekon_api::{DeviceClient, WireObject};
use serde_json::Value;
use tracing::{debug, info};

use crate::context::{ReconcileContext, SortOrder};
use crate::error::CoreError;
use crate::expand::expand;
use crate::flatten::flatten_resource;
use crate::resource::ResourceData;
use crate::schema::{ResourceSchema, Schema};
use crate::value::{Scalar, StateTree};
use crate::version::ApiVersion;

// ── Transport seam ──────────────────────────────────────────────────

/// What the engine needs from a device connection.
///
/// `read` reports a missing object as an error for which
/// [`rekon_api::Error::is_not_found`] is true.
pub trait DeviceTransport: Send + Sync {
    fn read(
        &self,
        path: &str,
        id: &str,
        scope: Option<&str>,
    ) -> impl Future<Output = Result<WireObject, rekon_api::Error>> + Send;

    /// Create an object; returns the device acknowledgement.
    fn create(
        &self,
        path: &str,
        body: &WireObject,
        scope: Option<&str>,
    ) -> impl Future<Output = Result<WireObject, rekon_api::Error>> + Send;

    fn update(
        &self,
        path: &str,
        id: &str,
        body: &WireObject,
        scope: Option<&str>,
    ) -> impl Future<Output = Result<WireObject, rekon_api::Error>> + Send;

    fn delete(
        &self,
        path: &str,
        id: &str,
        scope: Option<&str>,
    ) -> impl Future<Output = Result<(), rekon_api::Error>> + Send;

    /// Raw version string reported by the device.
    fn api_version(&self) -> impl Future<Output = Result<String, rekon_api::Error>> + Send;
}

impl DeviceTransport for DeviceClient {
    fn read(
        &self,
        path: &str,
        id: &str,
        scope: Option<&str>,
    ) -> impl Future<Output = Result<WireObject, rekon_api::Error>> + Send {
        self.get_object(path, id, scope)
    }

    fn create(
        &self,
        path: &str,
        body: &WireObject,
        scope: Option<&str>,
    ) -> impl Future<Output = Result<WireObject, rekon_api::Error>> + Send {
        self.create_object(path, body, scope)
    }

    fn update(
        &self,
        path: &str,
        id: &str,
        body: &WireObject,
        scope: Option<&str>,
    ) -> impl Future<Output = Result<WireObject, rekon_api::Error>> + Send {
        self.update_object(path, id, body, scope)
    }

    fn delete(
        &self,
        path: &str,
        id: &str,
        scope: Option<&str>,
    ) -> impl Future<Output = Result<(), rekon_api::Error>> + Send {
        self.delete_object(path, id, scope)
    }

    fn api_version(&self) -> impl Future<Output = Result<String, rekon_api::Error>> + Send {
        DeviceClient::api_version(self)
    }
}

// ── Options and outcomes ────────────────────────────────────────────

/// Engine policy knobs, usually taken from the active profile.
#[derive(Debug, Clone, Default)]
pub struct EngineOptions {
    pub import_all: bool,
    pub sort_order: SortOrder,
    /// Skip the version probe and assume this version.
    pub pinned_version: Option<ApiVersion>,
}

/// Result of reading one object.
#[derive(Debug, Clone, PartialEq)]
pub enum ReadOutcome {
    Found(StateTree),
    /// The device no longer has the object; the caller should drop it.
    Gone,
}

/// Result of a create or update.
#[derive(Debug, Clone, PartialEq)]
pub struct ApplyOutcome {
    /// Device identifier of the object.
    pub id: String,
    /// The wire object sent, `None` when nothing needed sending.
    pub sent: Option<WireObject>,
    /// State read back after the write.
    pub state: ReadOutcome,
}

// ── Reconciler ──────────────────────────────────────────────────────

/// Runs read / create / update / delete for the resources of a schema.
#[derive(Debug, Clone)]
pub struct Reconciler<T> {
    transport: T,
    schema: Arc<Schema>,
    options: EngineOptions,
}

impl<T: DeviceTransport> Reconciler<T> {
    pub fn new(transport: T, schema: Arc<Schema>, options: EngineOptions) -> Self {
        Self {
            transport,
            schema,
            options,
        }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// The API version to reconcile against: pinned, or probed once.
    pub async fn api_version(&self) -> Result<ApiVersion, CoreError> {
        if let Some(pinned) = &self.options.pinned_version {
            return Ok(pinned.clone());
        }
        let raw = self.transport.api_version().await?;
        let version = ApiVersion::parse(&raw)?;
        debug!(%version, "probed device API version");
        Ok(version)
    }

    fn context<'p>(&self, version: ApiVersion, prior: &'p StateTree) -> ReconcileContext<'p> {
        ReconcileContext::new(version, prior)
            .with_import_all(self.options.import_all)
            .with_sort_order(self.options.sort_order)
    }

    /// Read an object and flatten it against `prior`.
    pub async fn read(
        &self,
        resource: &str,
        id: &str,
        prior: &StateTree,
        scope: Option<&str>,
    ) -> Result<ReadOutcome, CoreError> {
        let schema = self.schema.resource(resource)?;
        let version = self.api_version().await?;
        self.read_at(schema, id, prior, scope, version).await
    }

    async fn read_at(
        &self,
        schema: &ResourceSchema,
        id: &str,
        prior: &StateTree,
        scope: Option<&str>,
        version: ApiVersion,
    ) -> Result<ReadOutcome, CoreError> {
        let wire = match self.transport.read(&schema.path, id, scope).await {
            Ok(wire) => wire,
            Err(e) if e.is_not_found() => {
                info!(resource = %schema.name, id, "object is gone");
                return Ok(ReadOutcome::Gone);
            }
            Err(e) => return Err(e.into()),
        };
        let ctx = self.context(version, prior);
        Ok(ReadOutcome::Found(flatten_resource(&wire, schema, &ctx)?))
    }

    /// Create an object and read it back.
    pub async fn create(
        &self,
        resource: &str,
        desired: &StateTree,
        scope: Option<&str>,
    ) -> Result<ApplyOutcome, CoreError> {
        let schema = self.schema.resource(resource)?;
        let version = self.api_version().await?;

        let empty = StateTree::new();
        let wire = expand(desired, &schema.fields, &self.context(version.clone(), &empty))?;
        let ack = self.transport.create(&schema.path, &wire, scope).await?;
        let id = created_id(&ack, desired, schema)?;
        info!(resource = %schema.name, %id, "created");

        let state = self.read_at(schema, &id, desired, scope, version).await?;
        Ok(ApplyOutcome {
            id,
            sent: Some(wire),
            state,
        })
    }

    /// Send only what changed between `data.prior()` and `data.desired()`,
    /// then read the object back.
    pub async fn update(
        &self,
        resource: &str,
        id: &str,
        data: &ResourceData,
        scope: Option<&str>,
    ) -> Result<ApplyOutcome, CoreError> {
        let schema = self.schema.resource(resource)?;
        let version = self.api_version().await?;
        self.update_at(schema, id, data, scope, version).await
    }

    /// Update an object with no recorded prior state.
    ///
    /// The object is read first and the result, limited to the fields
    /// `desired` mentions, serves as the prior. Fields `desired` leaves out
    /// are never sent.
    pub async fn update_from_device(
        &self,
        resource: &str,
        id: &str,
        desired: &StateTree,
        scope: Option<&str>,
    ) -> Result<ApplyOutcome, CoreError> {
        let schema = self.schema.resource(resource)?;
        let version = self.api_version().await?;
        let current = match self.read_at(schema, id, desired, scope, version.clone()).await? {
            ReadOutcome::Found(current) => current,
            ReadOutcome::Gone => {
                return Err(rekon_api::Error::NotFound {
                    path: format!("{}/{id}", schema.path),
                }
                .into());
            }
        };
        let data = ResourceData::new(desired.clone(), current.restricted_to(desired));
        self.update_at(schema, id, &data, scope, version).await
    }

    async fn update_at(
        &self,
        schema: &ResourceSchema,
        id: &str,
        data: &ResourceData,
        scope: Option<&str>,
        version: ApiVersion,
    ) -> Result<ApplyOutcome, CoreError> {
        let wire = expand(
            data.desired(),
            &schema.fields,
            &self.context(version.clone(), data.prior()),
        )?;
        let sent = if wire.is_empty() {
            debug!(resource = %schema.name, id, "no changes to send");
            None
        } else {
            self.transport.update(&schema.path, id, &wire, scope).await?;
            info!(resource = %schema.name, id, fields = wire.len(), "updated");
            Some(wire)
        };

        let state = self.read_at(schema, id, data.desired(), scope, version).await?;
        Ok(ApplyOutcome {
            id: id.to_owned(),
            sent,
            state,
        })
    }

    /// Delete an object. Deleting something already gone succeeds.
    pub async fn delete(&self, resource: &str, id: &str, scope: Option<&str>) -> Result<(), CoreError> {
        let schema = self.schema.resource(resource)?;
        match self.transport.delete(&schema.path, id, scope).await {
            Ok(()) => {
                info!(resource = %schema.name, id, "deleted");
                Ok(())
            }
            Err(e) if e.is_not_found() => {
                debug!(resource = %schema.name, id, "already gone");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Identifier of a created object: the acknowledged `mkey`, else the
/// desired id field.
fn created_id(ack: &WireObject, desired: &StateTree, schema: &ResourceSchema) -> Result<String, CoreError> {
    match ack.get("mkey") {
        Some(Value::String(s)) if !s.is_empty() => return Ok(s.clone()),
        Some(Value::Number(n)) => return Ok(n.to_string()),
        _ => {}
    }
    match desired.get(&schema.id_field).as_scalar() {
        Some(Scalar::Str(s)) if !s.is_empty() => Ok(s.clone()),
        Some(Scalar::Int(i)) => Ok(i.to_string()),
        _ => Err(CoreError::MissingId {
            resource: schema.name.clone(),
        }),
    }
}
