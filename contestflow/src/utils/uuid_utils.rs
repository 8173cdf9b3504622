//! Identity generation and remapping.

use std::collections::HashMap;
use uuid::Uuid;

/// Generates a new UUID v4.
#[must_use]
pub fn generate_uuid() -> Uuid {
    Uuid::new_v4()
}

/// Table mapping identities of a source document onto freshly generated ones.
///
/// Every source id is assigned exactly one new id the first time it is seen,
/// so the table can be filled before any references are relinked.
#[derive(Debug, Default, Clone)]
pub struct IdRemapper {
    mapping: HashMap<Uuid, Uuid>,
}

impl IdRemapper {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Assigns (or returns the already assigned) fresh id for `original`.
    pub fn assign(&mut self, original: Uuid) -> Uuid {
        *self.mapping.entry(original).or_insert_with(generate_uuid)
    }

    /// Looks up the fresh id for `original` without assigning one.
    #[must_use]
    pub fn get(&self, original: Uuid) -> Option<Uuid> {
        self.mapping.get(&original).copied()
    }

    /// Remaps an optional reference. Unknown references resolve to `None`.
    #[must_use]
    pub fn remap_optional(&self, original: Option<Uuid>) -> Option<Uuid> {
        original.and_then(|id| self.get(id))
    }

    /// Returns the number of assigned identities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.mapping.len()
    }

    /// Returns true if nothing has been assigned.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.mapping.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_uuid_v4() {
        let a = generate_uuid();
        let b = generate_uuid();
        assert_ne!(a, b);
        assert_eq!(a.get_version_num(), 4);
    }

    #[test]
    fn test_remapper_is_stable_per_source_id() {
        let mut remapper = IdRemapper::new();
        let original = generate_uuid();

        let first = remapper.assign(original);
        let second = remapper.assign(original);

        assert_eq!(first, second);
        assert_ne!(first, original);
        assert_eq!(remapper.len(), 1);
    }

    #[test]
    fn test_remap_optional_unknown_is_none() {
        let mut remapper = IdRemapper::new();
        let known = generate_uuid();
        remapper.assign(known);

        assert!(remapper.remap_optional(Some(generate_uuid())).is_none());
        assert!(remapper.remap_optional(None).is_none());
        assert_eq!(remapper.remap_optional(Some(known)), remapper.get(known));
    }
}
