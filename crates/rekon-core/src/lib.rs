//! Bidirectional reconciliation between desired-state trees and device
//! wire objects.
//!
//! The engine is pure and synchronous; only [`Reconciler`] touches the
//! network, through the [`DeviceTransport`] seam.
//!
//! - **[`flatten()`]** turns a wire object into a [`StateTree`], reconciling
//!   repeated blocks against the prior state so list tables keep device
//!   order and set tables settle into a canonical order.
//!
//! - **[`expand()`]** turns a desired [`StateTree`] into the wire object for a
//!   create or partial update. The [`planner`] decides per field whether to
//!   send the value, an explicit clear, or nothing.
//!
//! - **[`coerce`]** converts scalars to and from the encoding a device uses at
//!   a given [`ApiVersion`], driven by each descriptor's coercion rules.
//!
//! - **[`Schema`]** holds the immutable field descriptors, loaded from a
//!   YAML or JSON document.

pub mod coerce;
pub mod context;
pub mod engine;
pub mod error;
pub mod expand;
pub mod flatten;
pub mod path;
pub mod planner;
pub mod resource;
pub mod schema;
pub mod table;
pub mod value;
pub mod version;

// ── Primary re-exports ──────────────────────────────────────────────
pub use context::{ReconcileContext, SortOrder};
pub use engine::{ApplyOutcome, DeviceTransport, EngineOptions, ReadOutcome, Reconciler};
pub use error::CoreError;
pub use expand::{Expansion, expand, expand_detailed};
pub use flatten::{flatten, flatten_resource};
pub use path::{FieldPath, Seg};
pub use planner::{Decision, PlanScope, plan};
pub use resource::{FieldState, ResourceData};
pub use schema::{
    CoercionRule, DescriptorSet, FieldDescriptor, FieldKind, ResourceSchema, ScalarType, Schema,
    WireEncoding,
};
pub use table::{TableRow, reconcile_table};
pub use value::{Scalar, StateTree, StateValue};
pub use version::ApiVersion;

pub use rekon_api::WireObject;
