// SPDX-License-Identifier: Apache-2.0
//! Per-entity-type rule catalogs and the process-wide registry.
//!
//! The catalog is external, read-only input: it decides *what* rules exist
//! for an entity type and in what dependency order formulas run. The engine's
//! job is solely to execute it. Registration happens once at startup;
//! [`CatalogRegistry::seal`] then validates role bindings and derives the
//! per-type aggregate default specs used by the insert Defaults phase.

use std::collections::BTreeMap;
use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::error::EngineError;
use crate::ident::EntityType;
use crate::rule::{
    ActionRule, AggregateKind, AggregateRule, ConstraintRule, FormulaRule, ParentCopyRule,
};
use crate::value::ValueKind;

/// A to-many child collection role declared on the parent type.
#[derive(Clone, Copy, Debug)]
pub struct ChildRole {
    /// Role name on the parent (the collection).
    pub role: &'static str,
    /// Entity type of the children.
    pub child_type: EntityType,
    /// The child's back-reference role toward this parent. Cascade verifies
    /// it resolves back to the traversed parent before forward-chaining.
    pub inverse: &'static str,
    /// Parent attributes that child rules reference. Cascade fires only when
    /// one of these changed (or on a delete-cascade signal); an empty set
    /// disables cascade for the role.
    pub watched: &'static [&'static str],
}

/// A to-one parent role declared on the child type.
#[derive(Clone, Copy, Debug)]
pub struct ParentRole {
    /// Role name on the child (the back-reference).
    pub role: &'static str,
    /// Entity type of the parent.
    pub parent_type: EntityType,
    /// The parent's collection role holding these children. Used by the
    /// min/max rescan path.
    pub inverse: &'static str,
}

/// Every rule bound to one entity type, in externally supplied order.
///
/// Fields are public: the catalog is declarative configuration assembled by
/// the host at startup.
#[derive(Clone, Debug)]
pub struct RuleCatalog {
    /// Entity type this catalog is bound to.
    pub entity_type: EntityType,
    /// Actions fired before formulas and constraints.
    pub early_actions: Vec<ActionRule>,
    /// Parent-copy refreshes, executed at the head of the formulas phase.
    pub parent_copies: Vec<ParentCopyRule>,
    /// Formulas in dependency order.
    pub formulas: Vec<FormulaRule>,
    /// Constraints checked per verb.
    pub constraints: Vec<ConstraintRule>,
    /// Actions fired after constraints pass.
    pub actions: Vec<ActionRule>,
    /// Commit-scoped actions (once per touched entity, at end of transaction).
    pub commit_actions: Vec<ActionRule>,
    /// Commit-scoped constraints (ditto).
    pub commit_constraints: Vec<ConstraintRule>,
    /// To-many child roles (cascade targets).
    pub child_roles: Vec<ChildRole>,
    /// To-one parent roles (aggregate-adjustment targets).
    pub parent_roles: Vec<ParentRole>,
    /// Aggregates bound to this type's to-one roles, keyed by role name.
    pub aggregates_by_role: BTreeMap<&'static str, Vec<AggregateRule>>,
}

impl RuleCatalog {
    /// Creates an empty catalog for `entity_type`.
    #[must_use]
    pub fn new(entity_type: EntityType) -> Self {
        Self {
            entity_type,
            early_actions: Vec::new(),
            parent_copies: Vec::new(),
            formulas: Vec::new(),
            constraints: Vec::new(),
            actions: Vec::new(),
            commit_actions: Vec::new(),
            commit_constraints: Vec::new(),
            child_roles: Vec::new(),
            parent_roles: Vec::new(),
            aggregates_by_role: BTreeMap::new(),
        }
    }

    /// Registers an aggregate rule under its role.
    pub fn add_aggregate(&mut self, rule: AggregateRule) {
        self.aggregates_by_role.entry(rule.role).or_default().push(rule);
    }

    /// Returns the parent-role descriptor for `role`, if declared.
    #[must_use]
    pub fn parent_role(&self, role: &str) -> Option<&ParentRole> {
        self.parent_roles.iter().find(|p| p.role == role)
    }
}

/// Default spec derived for one aggregate-result attribute on a parent type.
///
/// The insert Defaults phase seeds these attributes with their kind's zero
/// value — except the min/max family, which deliberately stays `Null`.
#[derive(Clone, Copy, Debug)]
pub struct AggregateDefault {
    /// Result attribute on the parent.
    pub attribute: &'static str,
    /// Aggregate kind maintaining it.
    pub kind: AggregateKind,
    /// Value kind of the attribute.
    pub value_kind: ValueKind,
}

/// Process-wide registry of rule catalogs, one per entity type.
///
/// Built once at startup, sealed before the engine uses it, then shared
/// read-only across transactions.
#[derive(Debug, Default)]
pub struct CatalogRegistry {
    catalogs: FxHashMap<EntityType, Arc<RuleCatalog>>,
    defaults: FxHashMap<EntityType, Vec<AggregateDefault>>,
    sealed: bool,
}

impl CatalogRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a catalog.
    ///
    /// # Errors
    /// Returns [`EngineError::DuplicateCatalog`] when a catalog for the type
    /// was already registered, or [`EngineError::InternalCorruption`] when
    /// the registry is already sealed.
    pub fn register(&mut self, catalog: RuleCatalog) -> Result<(), EngineError> {
        if self.sealed {
            return Err(EngineError::InternalCorruption(
                "catalog registered after the registry was sealed",
            ));
        }
        let ty = catalog.entity_type;
        if self.catalogs.contains_key(&ty) {
            return Err(EngineError::DuplicateCatalog(ty));
        }
        self.catalogs.insert(ty, Arc::new(catalog));
        Ok(())
    }

    /// Validates cross-catalog role bindings and derives per-parent-type
    /// aggregate default specs. Idempotent; called by the engine constructor.
    ///
    /// # Errors
    /// Returns [`EngineError::UndeclaredParentRole`] when an aggregate or
    /// parent-copy rule names a to-one role its catalog does not declare.
    pub fn seal(&mut self) -> Result<(), EngineError> {
        if self.sealed {
            return Ok(());
        }
        let mut defaults: FxHashMap<EntityType, Vec<AggregateDefault>> = FxHashMap::default();
        for catalog in self.catalogs.values() {
            for copy in &catalog.parent_copies {
                if catalog.parent_role(copy.role).is_none() {
                    return Err(EngineError::UndeclaredParentRole {
                        ty: catalog.entity_type,
                        rule: copy.name,
                        role: copy.role,
                    });
                }
            }
            for (role, aggregates) in &catalog.aggregates_by_role {
                let Some(parent_role) = catalog.parent_role(role) else {
                    let rule = aggregates.first().map_or("<empty>", |a| a.name);
                    return Err(EngineError::UndeclaredParentRole {
                        ty: catalog.entity_type,
                        rule,
                        role,
                    });
                };
                for aggregate in aggregates {
                    defaults
                        .entry(parent_role.parent_type)
                        .or_default()
                        .push(AggregateDefault {
                            attribute: aggregate.parent_attribute,
                            kind: aggregate.kind,
                            value_kind: aggregate.result_kind,
                        });
                }
            }
        }
        // Stable order so the Defaults phase is deterministic regardless of
        // catalog registration order.
        for specs in defaults.values_mut() {
            specs.sort_by_key(|s| s.attribute);
        }
        self.defaults = defaults;
        self.sealed = true;
        Ok(())
    }

    /// Returns the catalog for `ty`.
    ///
    /// # Errors
    /// Returns [`EngineError::UnknownCatalog`] when no catalog was registered
    /// for the type.
    pub fn get(&self, ty: EntityType) -> Result<Arc<RuleCatalog>, EngineError> {
        self.catalogs
            .get(&ty)
            .cloned()
            .ok_or(EngineError::UnknownCatalog(ty))
    }

    /// Aggregate default specs for attributes maintained on `ty`.
    #[must_use]
    pub fn aggregate_defaults(&self, ty: EntityType) -> &[AggregateDefault] {
        self.defaults.get(&ty).map_or(&[], Vec::as_slice)
    }

    /// Returns `true` once [`CatalogRegistry::seal`] has run.
    #[must_use]
    pub const fn is_sealed(&self) -> bool {
        self.sealed
    }
}
