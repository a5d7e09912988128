use chrono::{DateTime, Duration, Utc};
use mongodb::{bson::doc, error::Error as DbError, Database};
use rocket::{
    fairing::{Fairing, Info, Kind},
    futures::future::{BoxFuture, FutureExt},
    futures::TryStreamExt,
    tokio::sync::Mutex,
    Build, Rocket,
};
use std::collections::HashMap;
use std::sync::Arc;

use crate::{
    error::Error,
    model::{
        common::PollStatus,
        db::poll::Poll,
        mongodb::{Coll, Id},
    },
    scheduled_task::ScheduledTask,
};

/// Map from poll IDs to closer tasks.
type TaskMap = HashMap<Id, ScheduledTask<Result<(), Error>>>;

/// Poll closers: scheduled tasks that move an active poll to completed
/// when its end date passes.
pub struct PollClosers {
    tasks: Arc<Mutex<TaskMap>>,
}

impl PollClosers {
    /// Create an empty set of poll closers.
    pub fn new() -> Self {
        Self {
            tasks: Default::default(),
        }
    }

    /// Schedule a closer for every active poll with an end date.
    pub async fn schedule_polls(&self, db: &Database) -> Result<(), DbError> {
        let filter = doc! {
            "status": PollStatus::Active,
            "end_date": { "$ne": null },
        };
        let open_polls: Vec<_> = Coll::<Poll>::from_db(db)
            .find(filter, None)
            .await?
            .try_collect()
            .await?;
        let polls = Coll::<Poll>::from_db(db);
        for poll in open_polls {
            if let Some(end_date) = poll.end_date {
                self.schedule_poll(polls.clone(), poll.id, end_date).await;
            }
        }

        Ok(())
    }

    /// Schedule a closer for the given poll.
    /// If one already exists, it will be rescheduled.
    pub async fn schedule_poll(&self, polls: Coll<Poll>, poll_id: Id, close_at: DateTime<Utc>) {
        let closer = Self::closer(poll_id, polls, self.tasks.clone());
        // Schedule the closer and keep track of it.
        let mut tasks_locked = self.tasks.lock().await;
        if let Some(task) = tasks_locked.remove(&poll_id) {
            let already_completed = task.cancel().await;
            if already_completed {
                // This should never happen, since a task can only complete by either:
                // * erroring, in which case it is replaced before returning.
                // * succeeding, in which case it is removed before returning.
                warn!(
                    "schedule_poll: unexpected code path. This is not a bug in itself, \
but hints that assumptions made elsewhere might be incorrect"
                );
                return;
            }
        }
        let closer_task = ScheduledTask::new(closer, close_at);
        tasks_locked.insert(poll_id, closer_task);
    }

    /// Drop any scheduled closer for the given poll, e.g. because the poll
    /// was deleted or moved back out of scope.
    pub async fn cancel_poll(&self, poll_id: Id) {
        let task = self.tasks.lock().await.remove(&poll_id);
        if let Some(task) = task {
            task.cancel().await;
        }
    }

    /// Close the given poll by marking it completed.
    /// Since this is a recursive async function, we must use `BoxFuture` to
    /// avoid an infinitely-recursive state machine.
    fn closer(
        poll_id: Id,
        polls: Coll<Poll>,
        tasks: Arc<Mutex<TaskMap>>,
    ) -> BoxFuture<'static, Result<(), Error>> {
        /// Nested function for error handling.
        async fn close(poll_id: Id, polls: Coll<Poll>) -> Result<(), Error> {
            debug!("Running closer for poll {poll_id}");
            let filter = doc! {
                "_id": *poll_id,
                "status": PollStatus::Active,
            };
            let update = doc! {
                "$set": {
                    "status": PollStatus::Completed,
                    "updated_at": mongodb::bson::DateTime::now(),
                }
            };
            let result = polls.update_one(filter, update, None).await?;
            if result.modified_count == 1 {
                info!("Poll {poll_id} reached its end date and was completed");
            } else {
                // Already completed or deleted in the meantime.
                debug!("Closer for poll {poll_id} had nothing to do");
            }
            Ok(())
        }

        async move {
            let result = close(poll_id, polls.clone()).await;
            match result {
                Ok(()) => {
                    tasks.lock().await.remove(&poll_id);
                    trace!("Closer completed; removed self from list");
                }
                Err(ref e) => {
                    error!("Closer for poll {poll_id} failed, poll may stay open past its end date: {e}");
                    // Re-schedule the closer.
                    let retry = Self::closer(poll_id, polls, tasks.clone());
                    const RETRY_INTERVAL_SECONDS: i64 = 300;
                    let retry_time = Utc::now() + Duration::seconds(RETRY_INTERVAL_SECONDS);
                    let mut tasks_locked = tasks.lock().await;
                    let closer_task = ScheduledTask::new(retry, retry_time);
                    tasks_locked.insert(poll_id, closer_task);
                    warn!("Failed closer will be retried in {RETRY_INTERVAL_SECONDS} seconds");
                }
            }
            result
        }
        .boxed()
    }
}

impl Default for PollClosers {
    fn default() -> Self {
        Self::new()
    }
}

/// A fairing that schedules closers for all applicable polls during Rocket
/// ignition, and places a `PollClosers` into managed state.
/// This fairing depends on the database being available in managed state,
/// and so must be attached after the fairing responsible for that.
pub struct PollCloserFairing;

#[rocket::async_trait]
impl Fairing for PollCloserFairing {
    fn info(&self) -> Info {
        Info {
            name: "Poll Closers",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, mut rocket: Rocket<Build>) -> rocket::fairing::Result {
        info!("Scheduling poll closers...");
        let closers = PollClosers::new();
        let db = match rocket.state::<Database>() {
            Some(db) => db,
            None => {
                error!("Database was not available when scheduling poll closers");
                return Err(rocket);
            }
        };
        if let Err(e) = closers.schedule_polls(db).await {
            error!("Failed to schedule poll closers: {e}");
            return Err(rocket);
        }
        info!("...poll closers scheduled!");

        // Manage the state.
        rocket = rocket.manage(closers);
        Ok(rocket)
    }
}
