use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use chrono::{DateTime, Utc};
use rocket::tokio::{
    self,
    sync::Notify,
    task::{JoinError, JoinHandle},
    time::Duration,
};

/// A task scheduled for a specific point in the future.
/// It will automatically execute at that point, or can be cancelled.
pub struct ScheduledTask<T> {
    task_handle: JoinHandle<T>,
    wait_handle: JoinHandle<()>,
}

impl<T> ScheduledTask<T>
where
    T: Send + 'static,
{
    /// Schedule the given task to execute at time `run_at`.
    /// If `run_at` is in the past, the task will execute immediately.
    pub fn new<Fut>(task: Fut, run_at: DateTime<Utc>) -> Self
    where
        Fut: Future<Output = T> + Send + 'static,
    {
        // Create the synchronisation signal.
        let signal = Arc::new(Notify::new());

        // Schedule the task to wait on the signal.
        let task_signal = signal.clone();
        let task_handle = tokio::spawn(async move {
            task_signal.notified().await;
            task.await
        });

        // Spawn another task to give the signal at the appropriate time.
        let sleep_duration = datetime_to_duration(run_at);
        let wait_handle = tokio::spawn(async move {
            tokio::time::sleep(sleep_duration).await;
            signal.notify_one();
        });

        Self {
            task_handle,
            wait_handle,
        }
    }

    /// Cancel the task. Returns true iff it had already completed before we could cancel it.
    pub async fn cancel(self) -> bool {
        self.task_handle.abort();
        self.wait_handle.abort();
        self.task_handle.await.is_ok()
    }
}

/// Implement `Future` for `ScheduledTask` so we can directly `await` it.
impl<T> Future for ScheduledTask<T> {
    type Output = Result<T, JoinError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.task_handle).poll(cx)
    }
}

/// Convert a `DateTime` into a duration from the current instant.
/// A `DateTime` in the past will produce a duration of zero.
fn datetime_to_duration(datetime: DateTime<Utc>) -> Duration {
    let target_timestamp = datetime.timestamp_millis();
    let now_timestamp = Utc::now().timestamp_millis();
    let time_diff = u64::try_from(target_timestamp - now_timestamp).unwrap_or(0);
    Duration::from_millis(time_diff)
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::Duration as ChronoDuration;

    #[rocket::async_test]
    async fn runs_immediately_when_scheduled_in_the_past() {
        let task = ScheduledTask::new(async { 42 }, Utc::now() - ChronoDuration::seconds(5));
        let result = tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("task should have run immediately");
        assert_eq!(result.unwrap(), 42);
    }

    #[rocket::async_test]
    async fn cancel_prevents_execution() {
        let task = ScheduledTask::new(async { () }, Utc::now() + ChronoDuration::hours(1));
        let already_completed = task.cancel().await;
        assert!(!already_completed);
    }
}
