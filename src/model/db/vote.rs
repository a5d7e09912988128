use chrono::{DateTime, Utc};
use mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime;
use serde::{Deserialize, Serialize};

use crate::model::{common::UserId, mongodb::Id};

/// One recorded choice by one participant for one option of one poll.
///
/// Uniqueness within a poll depends on the poll's vote type; the store
/// enforces at most one row per `(poll_id, option_id, user_id)` in all cases.
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub struct Vote {
    #[serde(rename = "_id")]
    pub id: Id,
    pub poll_id: Id,
    pub option_id: Id,
    /// `None` is reserved for fully anonymous ballots, which no current
    /// flow produces.
    pub user_id: Option<UserId>,
    /// Preference rank, `>= 1`. Always 1 for non-ranked polls.
    pub ranking: u32,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
}

/// A vote that has not been inserted yet, so has no ID.
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub struct NewVote {
    pub poll_id: Id,
    pub option_id: Id,
    pub user_id: Option<UserId>,
    pub ranking: u32,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
}

impl NewVote {
    pub fn new(poll_id: Id, option_id: Id, user_id: UserId, ranking: u32) -> Self {
        Self {
            poll_id,
            option_id,
            user_id: Some(user_id),
            ranking,
            created_at: Utc::now(),
        }
    }
}
