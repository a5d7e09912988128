use mongodb::bson::{to_bson, Bson};
use serde::{Deserialize, Serialize};

/// States in the poll lifecycle.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PollStatus {
    /// Under construction, not open for ballots.
    Draft,
    /// Open for ballots.
    Active,
    /// Closed. Terminal: no transition out.
    Completed,
}

impl PollStatus {
    /// Is `self -> to` a legal lifecycle transition?
    /// Staying in the same state is always allowed; the lifecycle only
    /// ever moves forward (draft -> active -> completed).
    pub fn can_transition(self, to: PollStatus) -> bool {
        use PollStatus::*;
        matches!(
            (self, to),
            (Draft, Draft)
                | (Draft, Active)
                | (Active, Active)
                | (Active, Completed)
                | (Completed, Completed)
        )
    }
}

impl From<PollStatus> for Bson {
    fn from(status: PollStatus) -> Self {
        to_bson(&status).expect("Serialisation is infallible")
    }
}

/// How ballots are interpreted for a poll.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoteType {
    /// One option per participant; re-voting replaces the previous choice.
    Single,
    /// Any number of distinct options per participant.
    Multiple,
    /// Like multiple, but each selection carries a preference rank.
    Ranked,
}

impl From<VoteType> for Bson {
    fn from(vote_type: VoteType) -> Self {
        to_bson(&vote_type).expect("Serialisation is infallible")
    }
}
