//! BDD scenarios for replication runs.

use rstest_bdd_macros::scenario;

use super::test_helpers::{ReplicationContext, replication_context};

#[scenario(
    path = "tests/features/replication.feature",
    name = "Copy a tagged image to two accounts"
)]
fn scenario_copy_to_two_accounts(replication_context: ReplicationContext) {
    let _ = replication_context;
}

#[scenario(
    path = "tests/features/replication.feature",
    name = "A failed copy is counted without stopping its sibling"
)]
fn scenario_one_copy_fails(replication_context: ReplicationContext) {
    let _ = replication_context;
}

#[scenario(
    path = "tests/features/replication.feature",
    name = "A missing source image stops planning"
)]
fn scenario_missing_source(replication_context: ReplicationContext) {
    let _ = replication_context;
}

#[scenario(
    path = "tests/features/replication.feature",
    name = "Wait for copies to become available"
)]
fn scenario_wait_for_availability(replication_context: ReplicationContext) {
    let _ = replication_context;
}
