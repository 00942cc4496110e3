// SPDX-License-Identifier: Apache-2.0
//! Shared test doubles and fixtures for Ripple crates.
//!
//! The canonical fixture domain is an `Order` with `LineItem` children:
//! a formula (`amount = qty * price`), a parent copy (`currency`), three
//! aggregates on the `order` role (sum, count, max), and a positivity
//! constraint on `qty`.
//!
//! # Modules
//!
//! - [`catalog`] - Order/LineItem rule catalogs and reusable rule bodies
//! - [`store`] - In-memory store builders and a never-quiescing store
//! - [`listener`] - Recording listener for phase/rule/summary assertions

#![forbid(unsafe_code)]

pub mod catalog;
pub mod listener;
pub mod store;

// Re-export commonly used items at crate root for convenience
pub use catalog::{
    amount_formula, line_item_catalog, mirror_total_formula, order_catalog, qty_positive,
    registry, LINE_ITEM, ORDER,
};
pub use listener::RecordingListener;
pub use store::{
    apply_delete, apply_insert, apply_update, line_item, order_store, seed_line_item, seed_order,
    EndlessStore,
};
