//! BDD step definitions for replication runs.

use std::collections::BTreeMap;

use replika::test_support::copied_image_id;
use replika::{CloudError, Image, ImageState, SourceImage};
use rstest_bdd_macros::{given, then, when};
use tokio::runtime::Runtime;

use super::test_helpers::{ReplicationContext, ReplicationResult};

#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error("assertion failed: {0}")]
    Assertion(String),
}

#[given("a source image \"{image_id}\" in region \"{region}\" tagged \"{key}\" = \"{value}\"")]
fn tagged_source_image(
    mut replication_context: ReplicationContext,
    image_id: String,
    region: String,
    key: String,
    value: String,
) -> ReplicationContext {
    let mut image = Image::new(image_id.as_str(), ImageState::Available);
    image.name = String::from("golden");
    image.tags = BTreeMap::from([(key, value)]);
    replication_context.cloud.add_image(&region, image);
    replication_context
        .sources
        .push(SourceImage::new(region, image_id));
    replication_context
}

#[given("a source image \"{image_id}\" in region \"{region}\" that does not exist")]
fn missing_source_image(
    mut replication_context: ReplicationContext,
    image_id: String,
    region: String,
) -> ReplicationContext {
    replication_context
        .sources
        .push(SourceImage::new(region, image_id));
    replication_context
}

#[given("target accounts \"{accounts}\"")]
fn target_accounts(mut replication_context: ReplicationContext, accounts: String) -> ReplicationContext {
    replication_context.accounts = accounts
        .split(',')
        .map(|account| account.trim().to_owned())
        .collect();
    replication_context
}

#[given("copies to account \"{account}\" fail with \"{code}\"")]
fn copies_fail_for(
    replication_context: ReplicationContext,
    account: String,
    code: String,
) -> ReplicationContext {
    replication_context
        .cloud
        .fail_copy_for(&account, CloudError::coded(code, "copy rejected"));
    replication_context
}

#[given("availability waiting is enabled")]
fn availability_waiting(mut replication_context: ReplicationContext) -> ReplicationContext {
    replication_context.options.ensure_available = true;
    replication_context
}

#[given("copies stay pending for \"{checks}\" checks")]
fn copies_stay_pending(replication_context: ReplicationContext, checks: usize) -> ReplicationContext {
    let mut states = vec![ImageState::Pending; checks];
    states.push(ImageState::Available);
    for source in &replication_context.sources {
        for account in &replication_context.accounts {
            replication_context.cloud.script_states(
                &copied_image_id(account, &source.image_id),
                states.clone(),
            );
        }
    }
    replication_context
}

#[when("I replicate with concurrency \"{limit}\"")]
fn replicate(
    mut replication_context: ReplicationContext,
    limit: usize,
) -> Result<ReplicationContext, StepError> {
    let runtime = Runtime::new().map_err(|err| StepError::Assertion(err.to_string()))?;
    let replicator = replication_context.replicator();
    let sources = replication_context.sources.clone();
    let accounts = replication_context.accounts.clone();
    let options = replication_context.options.clone();

    let result = runtime.block_on(async move {
        match replicator.plan(&sources, &accounts, &options).await {
            Ok(tasks) => ReplicationResult::Completed(replicator.run(tasks, limit).await),
            Err(err) => ReplicationResult::PlanFailed(err.to_string()),
        }
    });
    replication_context.outcome = Some(result);
    Ok(replication_context)
}

#[then("the run reports \"{failures}\" failures out of \"{tasks}\" tasks")]
fn run_reports_counts(
    replication_context: &ReplicationContext,
    failures: usize,
    tasks: usize,
) -> Result<(), StepError> {
    let outcome = replication_context
        .completed()
        .ok_or_else(|| StepError::Assertion(format!("run did not complete: {:?}", replication_context.outcome)))?;
    if outcome.failure_count != failures || outcome.task_count != tasks {
        return Err(StepError::Assertion(format!(
            "expected {failures}/{tasks}, got {}/{}",
            outcome.failure_count, outcome.task_count
        )));
    }
    Ok(())
}

#[then("the manifest lists a copy for account \"{account}\"")]
fn manifest_lists_account(
    replication_context: &ReplicationContext,
    account: String,
) -> Result<(), StepError> {
    let outcome = replication_context
        .completed()
        .ok_or_else(|| StepError::Assertion(String::from("run did not complete")))?;
    let listed = outcome.manifest.iter().any(|entry| {
        entry.account_id == account
            && replication_context
                .sources
                .iter()
                .any(|source| entry.image_id == copied_image_id(&account, &source.image_id))
    });
    if listed {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "manifest has no copy for {account}: {:?}",
            outcome.manifest
        )))
    }
}

#[then("every copy carries the source tags")]
fn copies_carry_tags(replication_context: &ReplicationContext) -> Result<(), StepError> {
    let outcome = replication_context
        .completed()
        .ok_or_else(|| StepError::Assertion(String::from("run did not complete")))?;
    let tagged = replication_context.cloud.tagged();
    for entry in &outcome.manifest {
        let has_tags = tagged
            .iter()
            .any(|(image_id, tags)| *image_id == entry.image_id && tags.get("team").is_some());
        if !has_tags {
            return Err(StepError::Assertion(format!(
                "{} was not tagged: {tagged:?}",
                entry.image_id
            )));
        }
    }
    Ok(())
}

#[then("the failure summary reads \"{summary}\"")]
fn failure_summary_reads(
    replication_context: &ReplicationContext,
    summary: String,
) -> Result<(), StepError> {
    let actual = replication_context
        .completed()
        .and_then(replika::AggregateOutcome::failure_summary);
    if actual.as_deref() == Some(summary.as_str()) {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected summary {summary:?}, got {actual:?}"
        )))
    }
}

#[then("planning fails mentioning \"{needle}\"")]
fn planning_fails(replication_context: &ReplicationContext, needle: String) -> Result<(), StepError> {
    match replication_context.outcome.as_ref() {
        Some(ReplicationResult::PlanFailed(message)) if message.contains(&needle) => Ok(()),
        other => Err(StepError::Assertion(format!(
            "expected planning failure mentioning {needle}, got {other:?}"
        ))),
    }
}

#[then("no copy was submitted")]
fn no_copy_submitted(replication_context: &ReplicationContext) -> Result<(), StepError> {
    let calls = replication_context.cloud.copy_calls();
    if calls == 0 {
        Ok(())
    } else {
        Err(StepError::Assertion(format!("expected no copies, saw {calls}")))
    }
}

#[then("progress mentions \"{needle}\"")]
fn progress_mentions(replication_context: &ReplicationContext, needle: String) -> Result<(), StepError> {
    if replication_context.progress.contains(&needle) {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "no progress message mentions {needle}: {:?}",
            replication_context.progress.messages()
        )))
    }
}
