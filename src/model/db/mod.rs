//! DB-compatible (e.g. de/serialisable) types.
//!
//! The types in this module are serialised in a DB-friendly way, e.g.:
//!
//! - IDs and datetimes are serialised in MongoDB's own format.

pub mod poll;
pub use poll::{NewPoll, Poll, PollClosers, PollCore};

mod poll_option;
pub use poll_option::{sort_canonical, NewPollOption, PollOption};

mod vote;
pub use vote::{NewVote, Vote};

mod profile;
pub use profile::Profile;
