// ── Resource data accessor ──
//
// Host-facing view over the desired and prior trees of one object, in the
// shape a plugin host expects: look a value up by path, ask whether it is
// set, ask whether it changed.

use crate::error::CoreError;
use crate::path::FieldPath;
use crate::value::{StateTree, StateValue};

/// Lookup result for one field.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldState<'a> {
    /// `None` when the field is absent from the desired state.
    pub value: Option<&'a StateValue>,
    /// Desired and prior values differ.
    pub changed: bool,
}

/// Desired and prior state for one object.
#[derive(Debug, Clone, Default)]
pub struct ResourceData {
    desired: StateTree,
    prior: StateTree,
}

impl ResourceData {
    pub fn new(desired: StateTree, prior: StateTree) -> Self {
        Self { desired, prior }
    }

    /// A fresh object with no prior state.
    pub fn create(desired: StateTree) -> Self {
        Self::new(desired, StateTree::new())
    }

    pub fn get(&self, path: &FieldPath) -> FieldState<'_> {
        let current = self.desired.get_path(path);
        FieldState {
            value: (!current.is_absent()).then_some(current),
            changed: current != self.prior.get_path(path),
        }
    }

    pub fn is_set(&self, path: &FieldPath) -> bool {
        !self.desired.get_path(path).is_absent()
    }

    pub fn has_changed(&self, path: &FieldPath) -> bool {
        self.get(path).changed
    }

    /// Overwrite a desired value (for computed fields).
    pub fn set(&mut self, path: &FieldPath, value: StateValue) -> Result<(), CoreError> {
        self.desired.set_path(path, value)
    }

    pub fn desired(&self) -> &StateTree {
        &self.desired
    }

    pub fn prior(&self) -> &StateTree {
        &self.prior
    }

    pub fn into_parts(self) -> (StateTree, StateTree) {
        (self.desired, self.prior)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::value::Scalar;

    #[test]
    fn tri_state_lookup() {
        let prior = StateTree::new()
            .with("comments", Scalar::from("old"))
            .with("name", Scalar::from("p1"));
        let desired = StateTree::new().with("name", Scalar::from("p1"));
        let data = ResourceData::new(desired, prior);

        let name = data.get(&"name".parse().unwrap());
        assert!(name.value.is_some());
        assert!(!name.changed);

        let comments = data.get(&"comments".parse().unwrap());
        assert!(comments.value.is_none());
        assert!(comments.changed);

        assert!(!data.is_set(&"action".parse().unwrap()));
        assert!(!data.has_changed(&"action".parse().unwrap()));
    }

    #[test]
    fn set_writes_desired_only() {
        let mut data = ResourceData::create(StateTree::new());
        let path: FieldPath = "uuid".parse().unwrap();
        data.set(&path, StateValue::Scalar(Scalar::from("abc"))).unwrap();
        assert!(data.is_set(&path));
        assert!(data.prior().is_empty());
    }
}
