use mongodb::{
    bson::{doc, Bson},
    error::{Error as DbError, ErrorKind, WriteFailure},
    Client,
};
use rocket::{futures::TryStreamExt, serde::json::Json, Route, State};

use crate::error::{Error, Result};
use crate::model::{
    api::{plan_ballot, AuthToken, BallotReceipt, BallotSpec},
    db::{NewVote, Poll, PollOption, Vote},
    mongodb::{Coll, Id},
};

use super::common::{options_for_poll, poll_by_id};

pub fn routes() -> Vec<Route> {
    routes![cast_ballot]
}

/// Cast a complete ballot in one request.
///
/// The ballot is validated against the poll, planned against the caller's
/// previous votes (single: replace; multiple/ranked: conflict on a re-vote),
/// and committed in one transaction, with the unique vote index backstopping
/// concurrent duplicates.
#[post("/polls/<poll_id>/vote", data = "<ballot>", format = "json")]
async fn cast_ballot(
    token: Option<AuthToken>,
    poll_id: Id,
    ballot: Json<BallotSpec>,
    polls: Coll<Poll>,
    options: Coll<PollOption>,
    votes: Coll<Vote>,
    new_votes: Coll<NewVote>,
    db_client: &State<Client>,
) -> Result<Json<BallotReceipt>> {
    // Missing poll and closed poll outrank a missing session.
    let poll = poll_by_id(poll_id, &polls).await?;
    if !poll.is_open() {
        return Err(Error::InvalidState(
            "Ballots are only accepted while the poll is active".to_string(),
        ));
    }
    let token =
        token.ok_or_else(|| Error::unauthorized(format!("Voting in poll {poll_id}")))?;

    let poll_options = options_for_poll(poll_id, &options).await?;
    let rows = ballot.0.into_votes(&poll, &poll_options, token.id)?;

    let previous: Vec<Vote> = votes
        .find(doc! { "poll_id": poll_id, "user_id": token.id }, None)
        .await?
        .try_collect()
        .await?;
    let plan = plan_ballot(poll.vote_type, &previous, rows)?;

    let vote_ids = {
        let mut session = db_client.start_session(None).await?;
        session.start_transaction(None).await?;

        if !plan.delete.is_empty() {
            let delete_ids: Vec<Bson> = plan.delete.iter().copied().map(Bson::from).collect();
            votes
                .delete_many_with_session(
                    doc! { "_id": { "$in": delete_ids } },
                    None,
                    &mut session,
                )
                .await?;
        }

        // A concurrent submission can race past the plan's conflict check;
        // the unique vote index catches it here.
        let result = match new_votes
            .insert_many_with_session(&plan.insert, None, &mut session)
            .await
        {
            Ok(result) => result,
            Err(err) if is_duplicate_key(&err) => {
                return Err(Error::DuplicateVote(format!(
                    "Already voted for one of these options in poll {poll_id}"
                )));
            }
            Err(err) => return Err(err.into()),
        };

        session.commit_transaction().await?;

        let mut vote_ids: Vec<(usize, Id)> = result
            .inserted_ids
            .into_iter()
            .map(|(index, id)| {
                let id = id
                    .as_object_id()
                    .unwrap() // Valid because the ID comes directly from the DB.
                    .into();
                (index, id)
            })
            .collect();
        vote_ids.sort_by_key(|(index, _)| *index);
        vote_ids.into_iter().map(|(_, id)| id).collect::<Vec<_>>()
    };

    info!(
        "User {} cast {} vote(s) in poll {poll_id}",
        token.id,
        vote_ids.len()
    );
    Ok(Json(BallotReceipt::new(vote_ids)))
}

/// The server error code for a unique index violation.
const DUPLICATE_KEY: i32 = 11000;

fn is_duplicate_key(err: &DbError) -> bool {
    match &*err.kind {
        ErrorKind::Write(WriteFailure::WriteError(write_error)) => {
            write_error.code == DUPLICATE_KEY
        }
        ErrorKind::BulkWrite(failure) => failure
            .write_errors
            .iter()
            .flatten()
            .any(|write_error| write_error.code == DUPLICATE_KEY),
        _ => false,
    }
}
