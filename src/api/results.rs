use rocket::{serde::json::Json, Route};

use crate::error::Result;
use crate::model::{
    api::{check_visibility, AuthToken, PollResults},
    db::{Poll, PollOption, Vote},
    mongodb::{Coll, Id},
};

use super::common::{options_for_poll, poll_by_id, votes_for_poll};

pub fn routes() -> Vec<Route> {
    routes![get_results]
}

/// The aggregated results of a poll, gated by the poll's visibility flags.
#[get("/polls/<poll_id>/results")]
async fn get_results(
    token: Option<AuthToken>,
    poll_id: Id,
    polls: Coll<Poll>,
    options: Coll<PollOption>,
    votes: Coll<Vote>,
) -> Result<Json<PollResults>> {
    let poll = poll_by_id(poll_id, &polls).await?;
    check_visibility(&poll, token.map(|token| token.id))?;

    let poll_options = options_for_poll(poll_id, &options).await?;
    let poll_votes = votes_for_poll(poll_id, &votes).await?;
    Ok(Json(PollResults::new(&poll, poll_options, &poll_votes)))
}
