// SPDX-License-Identifier: Apache-2.0
//! Entity identity types.

/// Logical kind of a persistent entity (e.g. `"Order"`, `"LineItem"`).
///
/// Entity type names are `&'static str` because rule catalogs are built once
/// at startup from static registration; using a dedicated wrapper prevents
/// accidental mixing of type names with attribute or role names.
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct EntityType(pub &'static str);

impl EntityType {
    /// Returns the type name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        self.0
    }
}

impl core::fmt::Display for EntityType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.0)
    }
}

/// Primary key of a persistent entity.
///
/// The substrate owns key generation; the engine only requires keys to be
/// comparable and hashable so they can index per-transaction registries.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum EntityKey {
    /// Integer surrogate key.
    Int(i64),
    /// String natural key.
    Str(String),
}

impl core::fmt::Display for EntityKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Str(s) => f.write_str(s),
        }
    }
}

impl From<i64> for EntityKey {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<&str> for EntityKey {
    fn from(value: &str) -> Self {
        Self::Str(value.to_owned())
    }
}

/// Stable identity of a persistent entity: `(entity-type, primary-key)`.
///
/// The engine never owns an entity's canonical copy, only snapshots tagged
/// with its `EntityRef`. Refs order first by type, then by key, which gives
/// deterministic iteration wherever they key a `BTreeMap`.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct EntityRef {
    /// Entity type.
    pub ty: EntityType,
    /// Primary key within the type.
    pub key: EntityKey,
}

impl EntityRef {
    /// Constructs a ref from a type and anything convertible to a key.
    #[must_use]
    pub fn new(ty: EntityType, key: impl Into<EntityKey>) -> Self {
        Self {
            ty,
            key: key.into(),
        }
    }
}

impl core::fmt::Display for EntityRef {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}#{}", self.ty, self.key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_is_type_hash_key() {
        let r = EntityRef::new(EntityType("Order"), 7);
        assert_eq!(r.to_string(), "Order#7");
        let s = EntityRef::new(EntityType("Order"), "abc");
        assert_eq!(s.to_string(), "Order#abc");
    }

    #[test]
    fn refs_order_by_type_then_key() {
        let a = EntityRef::new(EntityType("A"), 9);
        let b = EntityRef::new(EntityType("B"), 1);
        assert!(a < b);
        let one = EntityRef::new(EntityType("A"), 1);
        assert!(one < a);
    }
}
