mod poll;

pub use poll::{PollStatus, VoteType};

use crate::model::mongodb::Id;

/// User identities come from the external identity provider but share the
/// database's ID format.
pub type UserId = Id;
