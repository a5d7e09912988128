use chrono::{DateTime, Utc};
use mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime;
use serde::{Deserialize, Serialize};

use crate::model::mongodb::Id;

/// One voteable option of a poll.
///
/// `created_at` is the canonical ordering key: everywhere options are
/// returned, they are sorted ascending by creation time (ties broken by ID),
/// never by vote count.
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub struct PollOption {
    #[serde(rename = "_id")]
    pub id: Id,
    pub poll_id: Id,
    pub text: String,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
}

/// A poll option that has not been inserted yet, so has no ID.
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub struct NewPollOption {
    pub poll_id: Id,
    pub text: String,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
}

impl NewPollOption {
    pub fn new(poll_id: Id, text: String) -> Self {
        Self {
            poll_id,
            text,
            created_at: Utc::now(),
        }
    }
}

/// Sort options into their canonical (creation) order.
pub fn sort_canonical(options: &mut [PollOption]) {
    options.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
}
