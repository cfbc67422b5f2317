//! Proptest strategies for plan statuses and offer batches.
#![allow(dead_code)]

use offer_scheduler::plan::Status;
use proptest::prelude::*;

pub fn status_strategy() -> impl Strategy<Value = Status> {
    prop_oneof![
        Just(Status::Error),
        Just(Status::Waiting),
        Just(Status::Pending),
        Just(Status::Prepared),
        Just(Status::Starting),
        Just(Status::InProgress),
        Just(Status::Complete),
    ]
}

pub fn children_strategy() -> impl Strategy<Value = Vec<Status>> {
    prop::collection::vec(status_strategy(), 0..12)
}

/// Pod names drawn from a small pool so that managers overlap
pub fn pod_names_strategy() -> impl Strategy<Value = Vec<String>> {
    prop::collection::btree_set(0usize..6, 1..6)
        .prop_map(|indices| indices.into_iter().map(|i| format!("node-{i}")).collect())
}
