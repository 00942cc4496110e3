// SPDX-License-Identifier: Apache-2.0
//! Typed attribute values.
//!
//! Attributes carry tagged values rather than raw bytes so aggregate deltas
//! and constraint checks can be evaluated without a codec at the engine
//! boundary. `Null` is a first-class value: min/max aggregates use it as the
//! "no observations yet" sentinel and never zero-default it.

use core::cmp::Ordering;

use crate::ident::EntityRef;

/// Kind tag for a [`Value`], used for zero-value selection and kind checks.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum ValueKind {
    /// Boolean.
    Bool,
    /// 64-bit signed integer.
    Int,
    /// 64-bit float.
    Float,
    /// Owned string.
    Str,
    /// Reference to another entity.
    Ref,
}

/// Attribute value of a persistent entity.
#[derive(Clone, PartialEq, Debug, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum Value {
    /// Absent / SQL NULL.
    #[default]
    Null,
    /// Boolean.
    Bool(bool),
    /// 64-bit signed integer.
    Int(i64),
    /// 64-bit float.
    Float(f64),
    /// Owned string.
    Str(String),
    /// Reference to another entity.
    Ref(EntityRef),
}

impl Value {
    /// Returns `true` for [`Value::Null`].
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Returns the kind tag, or `None` for `Null`.
    #[must_use]
    pub const fn kind(&self) -> Option<ValueKind> {
        match self {
            Self::Null => None,
            Self::Bool(_) => Some(ValueKind::Bool),
            Self::Int(_) => Some(ValueKind::Int),
            Self::Float(_) => Some(ValueKind::Float),
            Self::Str(_) => Some(ValueKind::Str),
            Self::Ref(_) => Some(ValueKind::Ref),
        }
    }

    /// Zero value for a kind, used by the insert Defaults phase to seed
    /// sum/count aggregate attributes.
    #[must_use]
    pub const fn zero(kind: ValueKind) -> Self {
        match kind {
            ValueKind::Bool => Self::Bool(false),
            ValueKind::Int => Self::Int(0),
            ValueKind::Float => Self::Float(0.0),
            ValueKind::Str => Self::Null,
            ValueKind::Ref => Self::Null,
        }
    }

    /// Checked numeric addition. `Null` operands act as the identity.
    ///
    /// Returns `None` when the operands are non-numeric, of mixed kinds, or
    /// when integer addition overflows.
    #[must_use]
    pub fn checked_add(&self, other: &Self) -> Option<Self> {
        match (self, other) {
            (Self::Null, v) | (v, Self::Null) => Some(v.clone()),
            (Self::Int(a), Self::Int(b)) => a.checked_add(*b).map(Self::Int),
            (Self::Float(a), Self::Float(b)) => Some(Self::Float(a + b)),
            _ => None,
        }
    }

    /// Checked numeric subtraction. A `Null` right-hand side is the identity;
    /// a `Null` left-hand side is treated as the kind's zero.
    #[must_use]
    pub fn checked_sub(&self, other: &Self) -> Option<Self> {
        match (self, other) {
            (v, Self::Null) => Some(v.clone()),
            (Self::Null, Self::Int(b)) => 0i64.checked_sub(*b).map(Self::Int),
            (Self::Null, Self::Float(b)) => Some(Self::Float(-b)),
            (Self::Int(a), Self::Int(b)) => a.checked_sub(*b).map(Self::Int),
            (Self::Float(a), Self::Float(b)) => Some(Self::Float(a - b)),
            _ => None,
        }
    }

    /// Total comparison across same-kind values.
    ///
    /// Floats use `f64::total_cmp` so min/max maintenance is deterministic.
    /// Returns `None` for mixed kinds or when either side is `Null`;
    /// callers decide what a missing observation means.
    #[must_use]
    pub fn compare(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Self::Bool(a), Self::Bool(b)) => Some(a.cmp(b)),
            (Self::Int(a), Self::Int(b)) => Some(a.cmp(b)),
            (Self::Float(a), Self::Float(b)) => Some(a.total_cmp(b)),
            (Self::Str(a), Self::Str(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }

    /// Returns the integer payload when this is `Int`.
    #[must_use]
    pub const fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the float payload when this is `Float`.
    #[must_use]
    pub const fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the entity reference payload when this is `Ref`.
    #[must_use]
    pub const fn as_ref_value(&self) -> Option<&EntityRef> {
        match self {
            Self::Ref(r) => Some(r),
            _ => None,
        }
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Str(value.to_owned())
    }
}

impl From<EntityRef> for Value {
    fn from(value: EntityRef) -> Self {
        Self::Ref(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_is_additive_identity() {
        assert_eq!(Value::Null.checked_add(&Value::Int(3)), Some(Value::Int(3)));
        assert_eq!(Value::Int(3).checked_add(&Value::Null), Some(Value::Int(3)));
        assert_eq!(
            Value::Null.checked_sub(&Value::Int(3)),
            Some(Value::Int(-3))
        );
    }

    #[test]
    fn mixed_kinds_do_not_add() {
        assert_eq!(Value::Int(1).checked_add(&Value::Float(1.0)), None);
        assert_eq!(Value::Str("a".into()).checked_add(&Value::Int(1)), None);
    }

    #[test]
    fn integer_overflow_is_detected() {
        assert_eq!(Value::Int(i64::MAX).checked_add(&Value::Int(1)), None);
        assert_eq!(Value::Int(i64::MIN).checked_sub(&Value::Int(1)), None);
    }

    #[test]
    fn zero_values_per_kind() {
        assert_eq!(Value::zero(ValueKind::Int), Value::Int(0));
        assert_eq!(Value::zero(ValueKind::Float), Value::Float(0.0));
        assert_eq!(Value::zero(ValueKind::Str), Value::Null);
    }

    #[test]
    fn compare_is_total_within_kind() {
        assert_eq!(
            Value::Int(1).compare(&Value::Int(2)),
            Some(Ordering::Less)
        );
        assert_eq!(
            Value::Float(2.0).compare(&Value::Float(1.0)),
            Some(Ordering::Greater)
        );
        assert_eq!(Value::Int(1).compare(&Value::Float(1.0)), None);
        assert_eq!(Value::Null.compare(&Value::Int(1)), None);
    }
}
