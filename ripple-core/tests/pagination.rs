//! End-to-end pagination scenarios (spec.md §8) and the planner's
//! property-level invariants, run against `MemoryBackend`. S1 (forward
//! page) lives alongside `StorageAdapter::find_many`'s own unit tests;
//! this file covers the remaining seeded scenarios plus the invariants
//! that need many rows to say anything interesting.

use proptest::prelude::*;
use ripple_core::prelude::*;

fn users_schema() -> TableSchema {
    TableSchema::new(
        "users",
        vec![
            Column::new("id", ColumnKind::Number),
            Column::new("name", ColumnKind::String),
            Column::new("age", ColumnKind::Number),
        ],
        vec!["id".into()],
    )
    .unwrap()
}

fn seeded_users() -> StorageAdapter<MemoryBackend> {
    let adapter = StorageAdapter::new(users_schema(), MemoryBackend::new()).unwrap();
    for id in 1..=10 {
        let mut row = Row::new();
        row.insert("id".to_string(), Value::Number(id as f64));
        row.insert("name".to_string(), Value::String(format!("user{id}")));
        row.insert("age".to_string(), Value::Number(20.0 + id as f64));
        adapter.insert(&row).unwrap();
    }
    adapter
}

fn ids(page: &Page) -> Vec<f64> {
    page.rows.iter().map(|c| c.get("id").unwrap().as_number().unwrap()).collect()
}

#[test]
fn s2_backward_page() {
    let adapter = seeded_users();
    let init = PageInit::Backward(BackwardPageInit {
        before: Some(Cursor::new(vec!["id".into()], vec![Value::Number(8.0)])),
        last: 3,
        order_by: vec![OrderByItem::asc("id")],
        filter: None,
    });
    let page = adapter.find_many(&init).unwrap();
    assert_eq!(ids(&page), vec![5.0, 6.0, 7.0]);
    assert_eq!(page.start_cursor.as_ref().unwrap().get("id"), Some(&Value::Number(5.0)));
    assert_eq!(page.end_cursor.as_ref().unwrap().get("id"), Some(&Value::Number(7.0)));
    assert_eq!(page.item_before_count, 4);
    assert_eq!(page.item_after_count, 3);
}

#[test]
fn s3_filtered_page() {
    let adapter = seeded_users();
    let filter = Expression::column("age").binop(BinaryOperator::Eq, Expression::constant(25.0));
    let init = PageInit::Forward(ForwardPageInit {
        after: None,
        first: 2,
        order_by: vec![OrderByItem::asc("id")],
        filter: Some(filter),
    });
    let page = adapter.find_many(&init).unwrap();
    assert_eq!(ids(&page), vec![5.0]);
    assert_eq!(page.row_count, 1);
}

#[test]
fn s4_descending_page() {
    let adapter = seeded_users();
    let init = PageInit::Forward(ForwardPageInit {
        after: None,
        first: 3,
        order_by: vec![OrderByItem::desc("id")],
        filter: None,
    });
    let page = adapter.find_many(&init).unwrap();
    assert_eq!(ids(&page), vec![10.0, 9.0, 8.0]);
}

#[test]
fn s5_composite_primary_key_iteration() {
    let schema = TableSchema::new(
        "composite",
        vec![Column::new("id", ColumnKind::Number), Column::new("sub_id", ColumnKind::Number)],
        vec!["id".into(), "sub_id".into()],
    )
    .unwrap();
    let adapter = StorageAdapter::new(schema, MemoryBackend::new()).unwrap();
    for id in 1..=3 {
        for sub_id in 1..=2 {
            let mut row = Row::new();
            row.insert("id".to_string(), Value::Number(id as f64));
            row.insert("sub_id".to_string(), Value::Number(sub_id as f64));
            adapter.insert(&row).unwrap();
        }
    }

    let order_by = vec![OrderByItem::asc("id"), OrderByItem::asc("sub_id")];
    let mut visited = Vec::new();
    let mut after = None;
    loop {
        let init = PageInit::Forward(ForwardPageInit {
            after: after.clone(),
            first: 2,
            order_by: order_by.clone(),
            filter: None,
        });
        let page = adapter.find_many(&init).unwrap();
        if page.rows.is_empty() {
            break;
        }
        for cursor in &page.rows {
            visited.push((
                cursor.get("id").unwrap().as_number().unwrap(),
                cursor.get("sub_id").unwrap().as_number().unwrap(),
            ));
        }
        let short_page = page.rows.len() < 2;
        after = page.end_cursor.clone();
        if short_page {
            break;
        }
    }

    assert_eq!(
        visited,
        vec![(1.0, 1.0), (1.0, 2.0), (2.0, 1.0), (2.0, 2.0), (3.0, 1.0), (3.0, 2.0)]
    );
}

#[test]
fn s7_mixed_directions_rejected() {
    let order_by = vec![OrderByItem::asc("id"), OrderByItem::desc("name")];
    let err = build_bundle(&users_schema(), &order_by, None).unwrap_err();
    assert_eq!(err, PlanError::DirectionsMustAgree);
}

fn rows_for(ids: &[i64]) -> Vec<(f64, f64)> {
    ids.iter().map(|&id| (id as f64, 20.0 + id as f64)).collect()
}

fn seed(adapter: &StorageAdapter<MemoryBackend>, data: &[(f64, f64)]) {
    for (id, age) in data {
        let mut row = Row::new();
        row.insert("id".to_string(), Value::Number(*id));
        row.insert("age".to_string(), Value::Number(*age));
        row.insert("name".to_string(), Value::String(format!("u{id}")));
        adapter.insert(&row).unwrap();
    }
}

proptest! {
    /// Invariant 3: forward-iterating by cursor visits every row exactly
    /// once, in orderBy order, and terminates on a short page.
    #[test]
    fn pagination_completeness(mut raw_ids in prop::collection::hash_set(1i64..200, 1..30)) {
        let mut sorted: Vec<i64> = raw_ids.drain().collect();
        sorted.sort_unstable();
        let data = rows_for(&sorted);

        let adapter = StorageAdapter::new(users_schema(), MemoryBackend::new()).unwrap();
        seed(&adapter, &data);

        let order_by = vec![OrderByItem::asc("id")];
        let mut visited = Vec::new();
        let mut after = None;
        loop {
            let init = PageInit::Forward(ForwardPageInit {
                after: after.clone(),
                first: 3,
                order_by: order_by.clone(),
                filter: None,
            });
            let page = adapter.find_many(&init).unwrap();
            let short = page.rows.len() < 3;
            for c in &page.rows {
                visited.push(c.get("id").unwrap().as_number().unwrap());
            }
            after = page.end_cursor.clone();
            if short {
                break;
            }
        }

        let expected: Vec<f64> = sorted.iter().map(|&id| id as f64).collect();
        prop_assert_eq!(visited, expected);
    }

    /// Invariant 4: loadLast/loadPrev reversed match the tail/preceding
    /// slice of the full forward-ordered scan.
    #[test]
    fn forward_backward_symmetry(mut raw_ids in prop::collection::hash_set(1i64..200, 3..30), n in 1usize..3) {
        let mut sorted: Vec<i64> = raw_ids.drain().collect();
        sorted.sort_unstable();
        let data = rows_for(&sorted);

        let adapter = StorageAdapter::new(users_schema(), MemoryBackend::new()).unwrap();
        seed(&adapter, &data);
        let order_by = vec![OrderByItem::asc("id")];

        let full = adapter
            .find_many(&PageInit::Forward(ForwardPageInit {
                after: None,
                first: sorted.len(),
                order_by: order_by.clone(),
                filter: None,
            }))
            .unwrap();
        let full_ids: Vec<f64> = ids(&full);

        let last_n = n.min(full_ids.len());
        let last_page = adapter
            .find_many(&PageInit::Backward(BackwardPageInit {
                before: None,
                last: last_n,
                order_by: order_by.clone(),
                filter: None,
            }))
            .unwrap();
        prop_assert_eq!(ids(&last_page), full_ids[full_ids.len() - last_n..].to_vec());

        if full_ids.len() > last_n {
            let pivot = Cursor::new(vec!["id".into()], vec![Value::Number(full_ids[full_ids.len() - 1])]);
            let prev_page = adapter
                .find_many(&PageInit::Backward(BackwardPageInit {
                    before: Some(pivot),
                    last: last_n,
                    order_by,
                    filter: None,
                }))
                .unwrap();
            let expected_start = full_ids.len() - 1 - last_n;
            prop_assert_eq!(ids(&prev_page), full_ids[expected_start..full_ids.len() - 1].to_vec());
        }
    }

    /// Invariant 5: itemBeforeCount + len(rows) + itemAfterCount == total.
    #[test]
    fn page_accounting_sums_to_total(mut raw_ids in prop::collection::hash_set(1i64..200, 1..30), first in 1usize..6) {
        let mut sorted: Vec<i64> = raw_ids.drain().collect();
        sorted.sort_unstable();
        let data = rows_for(&sorted);

        let adapter = StorageAdapter::new(users_schema(), MemoryBackend::new()).unwrap();
        seed(&adapter, &data);

        let page = adapter
            .find_many(&PageInit::Forward(ForwardPageInit {
                after: None,
                first,
                order_by: vec![OrderByItem::asc("id")],
                filter: None,
            }))
            .unwrap();
        prop_assert_eq!(page.item_before_count + page.rows.len() + page.item_after_count, page.row_count);
    }
}
