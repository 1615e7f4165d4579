// ── Per-call reconciliation context ──

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::value::StateTree;
use crate::version::ApiVersion;

/// How set-of-object rows are ordered by key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum SortOrder {
    /// Plain string / numeric comparison.
    #[default]
    Lexicographic,
    /// Digit runs inside string keys compare numerically (`port2 < port10`).
    Natural,
}

/// Everything one flatten or expand call needs besides the trees.
#[derive(Debug, Clone)]
pub struct ReconcileContext<'a> {
    pub api_version: ApiVersion,
    /// Flatten top-level tables even when the prior state never set them.
    pub import_all: bool,
    pub sort_order: SortOrder,
    /// Last known state; supplies ordering hints and emission triggers.
    pub prior: &'a StateTree,
}

impl<'a> ReconcileContext<'a> {
    pub fn new(api_version: ApiVersion, prior: &'a StateTree) -> Self {
        Self {
            api_version,
            import_all: false,
            sort_order: SortOrder::default(),
            prior,
        }
    }

    pub fn with_import_all(mut self, import_all: bool) -> Self {
        self.import_all = import_all;
        self
    }

    pub fn with_sort_order(mut self, sort_order: SortOrder) -> Self {
        self.sort_order = sort_order;
        self
    }

    pub fn with_prior(mut self, prior: &'a StateTree) -> Self {
        self.prior = prior;
        self
    }
}
