//! Runs one copy task to a terminal state.
//!
//! The steps are strictly sequential: validate, submit the copy, propagate
//! tags, then optionally wait for availability. Created images and applied
//! tags are not rolled back when a later step fails.

use std::time::Duration;

use tokio::time::sleep;
use tracing::debug;

use crate::cloud::{CloudError, ImageClient};
use crate::image::locate_single_image;
use crate::progress::ProgressSink;
use crate::task::{CopyTask, TaskError};

mod retry;

pub use retry::{
    RetryPolicy, TAG_ATTEMPTS, TAG_DELAY_MULTIPLIER, TAG_INITIAL_DELAY, TAG_MAX_DELAY,
};

/// Availability checks performed before giving up.
pub const AVAILABILITY_ATTEMPTS: u32 = 30;
/// Wait between availability checks.
pub const AVAILABILITY_INTERVAL: Duration = Duration::from_secs(60);

/// Executes the per-task state machine against an injected client.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct CopyExecutor {
    tag_retry: RetryPolicy,
    availability_attempts: u32,
    availability_interval: Duration,
}

impl Default for CopyExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl CopyExecutor {
    /// Creates an executor with the production retry and polling settings.
    #[must_use]
    pub fn new() -> Self {
        Self {
            tag_retry: RetryPolicy::default(),
            availability_attempts: AVAILABILITY_ATTEMPTS,
            availability_interval: AVAILABILITY_INTERVAL,
        }
    }

    /// Overrides the tag propagation retry policy.
    #[must_use]
    pub const fn with_tag_retry(mut self, policy: RetryPolicy) -> Self {
        self.tag_retry = policy;
        self
    }

    /// Overrides the availability polling limits.
    ///
    /// This is primarily used by tests to keep polling scenarios fast.
    #[must_use]
    pub const fn with_availability_poll(mut self, attempts: u32, interval: Duration) -> Self {
        self.availability_attempts = attempts;
        self.availability_interval = interval;
        self
    }

    /// Runs `task` to completion and returns the new image identifier.
    ///
    /// # Errors
    ///
    /// Returns the [`TaskError`] of the first fatal step.
    pub async fn replicate<C>(
        &self,
        client: &C,
        task: &CopyTask,
        progress: &dyn ProgressSink,
    ) -> Result<String, TaskError>
    where
        C: ImageClient + ?Sized,
    {
        task.validate()?;

        let image_id = client
            .copy_image(&task.copy_request())
            .await
            .map_err(|source| TaskError::Copy {
                image_id: task.source_image_id.clone(),
                account: task.target_account.clone(),
                source,
            })?;

        self.propagate_tags(client, task, &image_id).await?;

        if task.ensure_available {
            self.wait_until_available(client, task, &image_id, progress)
                .await?;
        }

        Ok(image_id)
    }

    async fn propagate_tags<C>(
        &self,
        client: &C,
        task: &CopyTask,
        image_id: &str,
    ) -> Result<(), TaskError>
    where
        C: ImageClient + ?Sized,
    {
        if task.source_tags.is_empty() {
            return Ok(());
        }

        self.tag_retry
            .run(
                move || async move {
                    match client.create_tags(image_id, &task.source_tags).await {
                        Err(err) if err.is_not_yet_visible() => {
                            debug!(image_id, error = %err, "copy not visible to tagging yet");
                            Ok(())
                        }
                        other => other,
                    }
                },
                CloudError::is_unauthorized,
            )
            .await
            .map_err(|source| TaskError::Tagging {
                image_id: image_id.to_owned(),
                account: task.target_account.clone(),
                source,
            })
    }

    async fn wait_until_available<C>(
        &self,
        client: &C,
        task: &CopyTask,
        image_id: &str,
        progress: &dyn ProgressSink,
    ) -> Result<(), TaskError>
    where
        C: ImageClient + ?Sized,
    {
        progress.say("Going to wait for image to be in available state");
        for attempt in 1..=self.availability_attempts {
            let image = locate_single_image(client, image_id).await?;
            if image.state.is_available() {
                return Ok(());
            }
            progress.say(&format!(
                "Waiting {}s ({attempt}/{}) for image to become available, current state: {} for image {} on account {}",
                self.availability_interval.as_secs(),
                self.availability_attempts,
                image.state,
                image.id,
                task.target_account,
            ));
            if attempt < self.availability_attempts {
                sleep(self.availability_interval).await;
            }
        }

        Err(TaskError::Timeout {
            image_id: image_id.to_owned(),
            account: task.target_account.clone(),
            attempts: self.availability_attempts,
        })
    }
}

#[cfg(test)]
mod tests;
