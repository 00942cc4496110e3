// SPDX-License-Identifier: Apache-2.0
//! The Order/LineItem fixture catalog.
//!
//! Rule bodies are exported individually so tests can assemble custom
//! catalogs (extra constraints, commit-scoped rules) on top of the same
//! domain.

use ripple_core::{
    ActionRule, AggregateKind, AggregateRule, CatalogRegistry, ChildRole, ConstraintRule,
    EntitySnapshot, EntityType, FormulaRule, ParentCopyRule, ParentRole, RuleCatalog, Value,
    ValueKind, Verb, VerbSet, Violation,
};

/// Parent fixture type.
pub const ORDER: EntityType = EntityType("Order");
/// Child fixture type.
pub const LINE_ITEM: EntityType = EntityType("LineItem");

/// `amount = qty * price`. Recomputes only when an input (or the output)
/// is out of date; non-integer inputs yield `Null`.
pub fn amount_formula(current: &mut EntitySnapshot, _prior: Option<&EntitySnapshot>) -> bool {
    let amount = match (current.get("qty").as_int(), current.get("price").as_int()) {
        (Some(qty), Some(price)) => Value::Int(qty.saturating_mul(price)),
        _ => Value::Null,
    };
    if current.get("amount") == amount {
        return false;
    }
    current.set_attr("amount", amount);
    true
}

/// Mirrors `total` into `mirror_total` on the order; exists so tests can
/// observe how often the order pipeline actually ran.
pub fn mirror_total_formula(current: &mut EntitySnapshot, _prior: Option<&EntitySnapshot>) -> bool {
    let total = current.get("total");
    if current.get("mirror_total") == total {
        return false;
    }
    current.set_attr("mirror_total", total);
    true
}

/// `qty` must be a positive integer.
pub fn qty_positive(
    current: &EntitySnapshot,
    _prior: Option<&EntitySnapshot>,
    _verb: Verb,
) -> Result<(), Violation> {
    match current.get("qty").as_int() {
        Some(qty) if qty > 0 => Ok(()),
        _ => Err(Violation::new("li/qty_positive", "qty must be positive").with_attribute("qty")),
    }
}

/// Marks the line item as touched; paired with the fired-actions registry in
/// idempotence tests.
pub fn touch_action(current: &mut EntitySnapshot, _prior: Option<&EntitySnapshot>, _verb: Verb) {
    current.set_attr("touched", true);
}

/// Catalog for [`LINE_ITEM`].
#[must_use]
pub fn line_item_catalog() -> RuleCatalog {
    let mut catalog = RuleCatalog::new(LINE_ITEM);
    catalog.parent_roles.push(ParentRole {
        role: "order",
        parent_type: ORDER,
        inverse: "line_items",
    });
    catalog.parent_copies.push(ParentCopyRule {
        name: "li/copy_currency",
        role: "order",
        parent_attribute: "currency",
        child_attribute: "currency",
    });
    catalog.formulas.push(FormulaRule {
        name: "li/amount",
        attribute: Some("amount"),
        body: amount_formula,
    });
    catalog.constraints.push(ConstraintRule {
        name: "li/qty_positive",
        verbs: VerbSet::WRITES,
        body: qty_positive,
    });
    catalog.actions.push(ActionRule {
        name: "li/touch",
        body: touch_action,
    });
    catalog.add_aggregate(AggregateRule {
        name: "li/sum_amount",
        role: "order",
        kind: AggregateKind::Sum,
        parent_attribute: "total",
        child_attribute: Some("amount"),
        result_kind: ValueKind::Int,
    });
    catalog.add_aggregate(AggregateRule {
        name: "li/count",
        role: "order",
        kind: AggregateKind::Count,
        parent_attribute: "line_count",
        child_attribute: None,
        result_kind: ValueKind::Int,
    });
    catalog.add_aggregate(AggregateRule {
        name: "li/max_qty",
        role: "order",
        kind: AggregateKind::Max,
        parent_attribute: "largest_qty",
        child_attribute: Some("qty"),
        result_kind: ValueKind::Int,
    });
    catalog
}

/// Catalog for [`ORDER`]. Cascade watches only `currency`, so aggregate
/// writes to `total` never re-enter the children.
#[must_use]
pub fn order_catalog() -> RuleCatalog {
    let mut catalog = RuleCatalog::new(ORDER);
    catalog.formulas.push(FormulaRule {
        name: "order/mirror_total",
        attribute: Some("mirror_total"),
        body: mirror_total_formula,
    });
    catalog.child_roles.push(ChildRole {
        role: "line_items",
        child_type: LINE_ITEM,
        inverse: "order",
        watched: &["currency"],
    });
    catalog
}

/// Registry holding both fixture catalogs, ready to seal.
#[must_use]
pub fn registry() -> CatalogRegistry {
    let mut registry = CatalogRegistry::new();
    // The fixture catalogs are fresh; registration cannot collide.
    let _ = registry.register(order_catalog());
    let _ = registry.register(line_item_catalog());
    registry
}
