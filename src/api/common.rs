use mongodb::bson::doc;
use rocket::futures::TryStreamExt;

use crate::error::{Error, Result};
use crate::model::{
    common::UserId,
    db::{sort_canonical, Poll, PollOption, Vote},
    mongodb::{Coll, Id},
};

/// Return a poll from the database, or 404.
pub async fn poll_by_id(poll_id: Id, polls: &Coll<Poll>) -> Result<Poll> {
    polls
        .find_one(poll_id.as_doc(), None)
        .await?
        .ok_or_else(|| Error::not_found(format!("Poll {poll_id}")))
}

/// Return a poll from the database, requiring the caller to be its creator.
pub async fn owned_poll_by_id(poll_id: Id, user_id: UserId, polls: &Coll<Poll>) -> Result<Poll> {
    let poll = poll_by_id(poll_id, polls).await?;
    if poll.created_by != user_id {
        return Err(Error::forbidden(format!(
            "Only the creator may modify poll {poll_id}"
        )));
    }
    Ok(poll)
}

/// All options of a poll, in creation order.
pub async fn options_for_poll(poll_id: Id, options: &Coll<PollOption>) -> Result<Vec<PollOption>> {
    let mut found: Vec<PollOption> = options
        .find(doc! { "poll_id": poll_id }, None)
        .await?
        .try_collect()
        .await?;
    sort_canonical(&mut found);
    Ok(found)
}

/// All votes cast in a poll.
pub async fn votes_for_poll(poll_id: Id, votes: &Coll<Vote>) -> Result<Vec<Vote>> {
    Ok(votes
        .find(doc! { "poll_id": poll_id }, None)
        .await?
        .try_collect()
        .await?)
}
