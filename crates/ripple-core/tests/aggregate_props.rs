// SPDX-License-Identifier: Apache-2.0
//! Property: incremental aggregate maintenance agrees with recomputing the
//! aggregates from scratch, for any insert sequence and any deleted subset.

#![allow(missing_docs)]
#![allow(clippy::expect_used, clippy::unwrap_used)]

use proptest::prelude::*;

use ripple_core::{Engine, EntityRef, Value};
use ripple_dry_tests::{
    apply_delete, apply_insert, line_item, order_store, registry, seed_order, LINE_ITEM,
};

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn incremental_totals_match_direct_recomputation(
        items in proptest::collection::vec((1i64..=20, 1i64..=20), 1..8),
        deletions in proptest::collection::vec(any::<bool>(), 8),
    ) {
        let engine = Engine::new(registry()).expect("catalogs seal");
        let mut store = order_store();
        let order = seed_order(&mut store, 1, "USD");

        let mut ctx = engine.begin();
        for (i, (qty, price)) in items.iter().enumerate() {
            let key = i64::try_from(i).expect("small index") + 1;
            let event = apply_insert(&mut store, line_item(key, &order, *qty, *price));
            engine.submit(&mut ctx, event).expect("submit insert");
        }
        engine.before_commit(&mut ctx, &mut store).expect("drain inserts");
        store.try_commit(&ctx).expect("commit inserts");

        let mut survivors = items.clone();
        let mut ctx = engine.begin();
        let mut deleted_any = false;
        for (i, _) in items.iter().enumerate().rev() {
            if !deletions[i] {
                continue;
            }
            let key = i64::try_from(i).expect("small index") + 1;
            let entity = EntityRef::new(LINE_ITEM, key);
            let event = apply_delete(&mut store, &entity).expect("item present");
            engine.submit(&mut ctx, event).expect("submit delete");
            survivors.remove(i);
            deleted_any = true;
        }
        if deleted_any {
            engine.before_commit(&mut ctx, &mut store).expect("drain deletes");
            store.try_commit(&ctx).expect("commit deletes");
        }

        let expected_total: i64 = survivors.iter().map(|(q, p)| q * p).sum();
        let expected_count = i64::try_from(survivors.len()).expect("small count");
        let expected_largest = survivors
            .iter()
            .map(|(q, _)| *q)
            .max()
            .map_or(Value::Null, Value::Int);

        let committed = store.live(&order).expect("order");
        prop_assert_eq!(committed.get("total"), Value::Int(expected_total));
        prop_assert_eq!(committed.get("line_count"), Value::Int(expected_count));
        prop_assert_eq!(committed.get("largest_qty"), expected_largest);
    }
}
