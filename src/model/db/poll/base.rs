use chrono::{DateTime, Utc};
use mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime;
use serde::{Deserialize, Serialize};

use crate::model::{
    common::{PollStatus, UserId, VoteType},
    mongodb::serde_opt_datetime,
};

/// Core poll data, as stored in the database.
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub struct PollCore {
    /// Poll title.
    pub title: String,
    /// Optional free-text description.
    pub description: Option<String>,
    /// The creator's user ID. Immutable after creation.
    pub created_by: UserId,
    /// How ballots are interpreted.
    pub vote_type: VoteType,
    /// Lifecycle status.
    pub status: PollStatus,
    /// Set the first time the poll leaves draft; `None` iff status is draft.
    #[serde(with = "serde_opt_datetime")]
    pub start_date: Option<DateTime<Utc>>,
    /// Optional closing time. Must be in the future when supplied.
    #[serde(with = "serde_opt_datetime")]
    pub end_date: Option<DateTime<Utc>>,
    /// Display flag only: participant names are hidden in result views.
    /// Frozen once the poll is non-draft.
    pub is_anonymous: bool,
    /// Whether non-creators may see results at all.
    pub is_public_results: bool,
    /// Whether non-creators may see results while the poll is still active.
    pub is_realtime_results: bool,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub updated_at: DateTime<Utc>,
}

/// A poll that has not been inserted yet, so has no ID.
/// Serialises identically to [`PollCore`]; the separate name keeps insert
/// call sites honest about which shape they are writing.
pub type NewPoll = PollCore;

impl PollCore {
    /// Does this poll currently accept ballots?
    pub fn is_open(&self) -> bool {
        self.status == PollStatus::Active
    }
}
