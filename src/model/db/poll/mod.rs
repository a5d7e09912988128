mod base;
mod closer;
mod db;

pub use base::{NewPoll, PollCore};
pub use closer::{PollCloserFairing, PollClosers};
pub use db::Poll;
