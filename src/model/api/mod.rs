mod auth;
mod ballot;
mod id;
mod poll;
mod profile;
mod results;

pub use auth::{AuthToken, AUTH_TOKEN_COOKIE};
pub use ballot::{plan_ballot, BallotPlan, BallotReceipt, BallotSpec, Selection};
pub use id::ApiId;
pub use poll::{OptionDiff, OptionSpec, OptionView, PollDetail, PollSpec, PollSummary, PollUpdate};
pub use profile::ProfileView;
pub use results::{check_visibility, DayCount, OptionTally, PollResults};
