//! Unit tests for the single-task executor.

use std::collections::BTreeMap;

use super::*;
use crate::image::{Image, ImageState, LocateError};
use crate::test_support::{RecordingProgress, ScriptedCloud, copied_image_id};
use rstest::{fixture, rstest};

const ACCOUNT: &str = "222222222222";
const REGION: &str = "eu-west-1";
const SOURCE: &str = "ami-0source";

fn fast_executor() -> CopyExecutor {
    CopyExecutor::new()
        .with_tag_retry(RetryPolicy::new(
            TAG_ATTEMPTS,
            Duration::ZERO,
            TAG_DELAY_MULTIPLIER,
            Duration::ZERO,
        ))
        .with_availability_poll(AVAILABILITY_ATTEMPTS, Duration::ZERO)
}

fn unauthorized() -> CloudError {
    CloudError::coded("UnauthorizedOperation", "not authorized yet")
}

#[fixture]
fn task() -> CopyTask {
    CopyTask::builder()
        .target_account(ACCOUNT)
        .source_region(REGION)
        .source_image_id(SOURCE)
        .name("golden")
        .source_tags(BTreeMap::from([(String::from("team"), String::from("infra"))]))
        .build()
        .unwrap_or_else(|err| panic!("fixture task should build: {err}"))
}

fn copy_id() -> String {
    copied_image_id(ACCOUNT, SOURCE)
}

#[rstest]
#[tokio::test]
async fn successful_copy_returns_new_image_and_tags_it(task: CopyTask) {
    let cloud = ScriptedCloud::new();
    let client = cloud.client(ACCOUNT, REGION);

    let image_id = fast_executor()
        .replicate(&client, &task, &RecordingProgress::new())
        .await
        .unwrap_or_else(|err| panic!("replicate should succeed: {err}"));

    assert_eq!(image_id, copy_id());
    assert_eq!(cloud.tag_calls(), 1);
    assert_eq!(cloud.tagged(), vec![(copy_id(), task.source_tags.clone())]);
    assert_eq!(cloud.describe_calls(&copy_id()), 0);
}

#[rstest]
#[tokio::test]
async fn invalid_task_never_reaches_the_cloud(task: CopyTask) {
    let cloud = ScriptedCloud::new();
    let client = cloud.client(ACCOUNT, REGION);
    let invalid = CopyTask {
        kms_key_id: Some(String::from("alias/images")),
        encrypted: false,
        ..task
    };

    let err = fast_executor()
        .replicate(&client, &invalid, &RecordingProgress::new())
        .await
        .expect_err("invalid task should fail");

    assert!(matches!(err, TaskError::Validation(_)));
    assert_eq!(cloud.copy_calls(), 0);
}

#[rstest]
#[tokio::test]
async fn copy_failure_is_fatal_and_verbatim(task: CopyTask) {
    let cloud = ScriptedCloud::new();
    let remote = CloudError::coded("InvalidAMIID.Unavailable", "source deregistered");
    cloud.fail_copy_for(ACCOUNT, remote.clone());
    let client = cloud.client(ACCOUNT, REGION);

    let err = fast_executor()
        .replicate(&client, &task, &RecordingProgress::new())
        .await
        .expect_err("copy failure should surface");

    assert_eq!(
        err,
        TaskError::Copy {
            image_id: String::from(SOURCE),
            account: String::from(ACCOUNT),
            source: remote,
        }
    );
    assert_eq!(cloud.tag_calls(), 0);
}

#[rstest]
#[case("InvalidAMIID.NotFound")]
#[case("InvalidSnapshot.NotFound")]
#[tokio::test]
async fn not_yet_visible_tag_errors_count_as_success(task: CopyTask, #[case] code: &str) {
    let cloud = ScriptedCloud::new();
    cloud.script_tags(vec![Err(CloudError::coded(code, "not visible yet"))]);
    let client = cloud.client(ACCOUNT, REGION);

    let result = fast_executor()
        .replicate(&client, &task, &RecordingProgress::new())
        .await;

    assert_eq!(result, Ok(copy_id()));
    assert_eq!(cloud.tag_calls(), 1);
}

#[rstest]
#[tokio::test]
async fn unauthorized_tag_errors_exhaust_eleven_attempts(task: CopyTask) {
    let cloud = ScriptedCloud::new();
    cloud.script_tags(vec![Err(unauthorized()); 11]);
    let client = cloud.client(ACCOUNT, REGION);

    let err = fast_executor()
        .replicate(&client, &task, &RecordingProgress::new())
        .await
        .expect_err("exhausted retries should fail");

    assert_eq!(
        err,
        TaskError::Tagging {
            image_id: copy_id(),
            account: String::from(ACCOUNT),
            source: unauthorized(),
        }
    );
    assert_eq!(cloud.tag_calls(), 11);
}

#[rstest]
#[tokio::test]
async fn unauthorized_then_success_recovers(task: CopyTask) {
    let cloud = ScriptedCloud::new();
    cloud.script_tags(vec![Err(unauthorized()), Err(unauthorized()), Ok(())]);
    let client = cloud.client(ACCOUNT, REGION);

    let result = fast_executor()
        .replicate(&client, &task, &RecordingProgress::new())
        .await;

    assert_eq!(result, Ok(copy_id()));
    assert_eq!(cloud.tag_calls(), 3);
}

#[rstest]
#[tokio::test]
async fn other_tag_errors_fail_without_retry(task: CopyTask) {
    let cloud = ScriptedCloud::new();
    cloud.script_tags(vec![Err(CloudError::coded("TagLimitExceeded", "too many"))]);
    let client = cloud.client(ACCOUNT, REGION);

    let err = fast_executor()
        .replicate(&client, &task, &RecordingProgress::new())
        .await
        .expect_err("fatal tag error should fail");

    assert!(matches!(err, TaskError::Tagging { .. }));
    assert_eq!(cloud.tag_calls(), 1);
}

#[rstest]
#[tokio::test]
async fn untagged_sources_skip_tagging(task: CopyTask) {
    let cloud = ScriptedCloud::new();
    let client = cloud.client(ACCOUNT, REGION);
    let untagged = CopyTask {
        source_tags: BTreeMap::new(),
        ..task
    };

    let result = fast_executor()
        .replicate(&client, &untagged, &RecordingProgress::new())
        .await;

    assert_eq!(result, Ok(copy_id()));
    assert_eq!(cloud.tag_calls(), 0);
}

#[rstest]
#[case(1)]
#[case(4)]
#[case(30)]
#[tokio::test]
async fn availability_poll_stops_at_first_available_state(task: CopyTask, #[case] k: usize) {
    let cloud = ScriptedCloud::new();
    let mut states = vec![ImageState::Pending; k - 1];
    states.push(ImageState::Available);
    cloud.script_states(&copy_id(), states);
    let client = cloud.client(ACCOUNT, REGION);
    let progress = RecordingProgress::new();
    let waiting = CopyTask {
        ensure_available: true,
        ..task
    };

    let result = fast_executor()
        .replicate(&client, &waiting, &progress)
        .await;

    assert_eq!(result, Ok(copy_id()));
    assert_eq!(cloud.describe_calls(&copy_id()), k);
    assert!(progress.contains("Going to wait for image to be in available state"));
}

#[rstest]
#[tokio::test]
async fn availability_poll_times_out_after_thirty_checks(task: CopyTask) {
    let cloud = ScriptedCloud::new();
    cloud.copied_state(ImageState::Pending);
    let client = cloud.client(ACCOUNT, REGION);
    let progress = RecordingProgress::new();
    let waiting = CopyTask {
        ensure_available: true,
        ..task
    };

    let err = fast_executor()
        .replicate(&client, &waiting, &progress)
        .await
        .expect_err("pending image should time out");

    assert_eq!(
        err,
        TaskError::Timeout {
            image_id: copy_id(),
            account: String::from(ACCOUNT),
            attempts: AVAILABILITY_ATTEMPTS,
        }
    );
    assert_eq!(cloud.describe_calls(&copy_id()), 30);
    assert!(progress.contains("(30/30)"));
    assert!(progress.contains("current state: pending"));
}

#[rstest]
#[tokio::test]
async fn lookup_failure_while_polling_is_fatal(task: CopyTask) {
    let cloud = ScriptedCloud::new();
    let remote = CloudError::coded("RequestLimitExceeded", "slow down");
    cloud.fail_describe(&copy_id(), remote.clone());
    let client = cloud.client(ACCOUNT, REGION);
    let waiting = CopyTask {
        ensure_available: true,
        ..task
    };

    let err = fast_executor()
        .replicate(&client, &waiting, &RecordingProgress::new())
        .await
        .expect_err("lookup failure should surface");

    assert_eq!(err, TaskError::Lookup(LocateError::Remote(remote)));
    assert_eq!(cloud.describe_calls(&copy_id()), 1);
}

#[rstest]
#[tokio::test]
async fn failed_state_keeps_polling_until_timeout(task: CopyTask) {
    let cloud = ScriptedCloud::new();
    cloud.add_image(REGION, Image::new("unrelated", ImageState::Available));
    cloud.copied_state(ImageState::Failed);
    let client = cloud.client(ACCOUNT, REGION);
    let executor = fast_executor().with_availability_poll(3, Duration::ZERO);
    let waiting = CopyTask {
        ensure_available: true,
        ..task
    };

    let err = executor
        .replicate(&client, &waiting, &RecordingProgress::new())
        .await
        .expect_err("failed image never becomes available");

    assert!(matches!(err, TaskError::Timeout { attempts: 3, .. }));
    assert_eq!(cloud.describe_calls(&copy_id()), 3);
}
