use mongodb::{
    bson::{doc, Bson},
    options::FindOptions,
    Client,
};
use rocket::{futures::TryStreamExt, serde::json::Json, Route, State};

use crate::config::{Config, OrphanVotePolicy};
use crate::error::{Error, Result};
use crate::model::{
    api::{AuthToken, OptionDiff, PollDetail, PollSpec, PollSummary, PollUpdate},
    common::PollStatus,
    db::{sort_canonical, NewPoll, NewPollOption, Poll, PollClosers, PollOption, Vote},
    mongodb::{Coll, Id},
};

use super::common::{options_for_poll, owned_poll_by_id, poll_by_id};

pub fn routes() -> Vec<Route> {
    routes![my_polls, create_poll, get_poll, update_poll, delete_poll]
}

#[get("/polls")]
async fn my_polls(
    token: AuthToken,
    polls: Coll<Poll>,
    votes: Coll<Vote>,
) -> Result<Json<Vec<PollSummary>>> {
    let filter = doc! { "created_by": token.id };
    let find_options = FindOptions::builder()
        .sort(doc! { "created_at": -1 })
        .build();
    let my_polls: Vec<Poll> = polls.find(filter, find_options).await?.try_collect().await?;

    let mut summaries = Vec::with_capacity(my_polls.len());
    for poll in my_polls {
        let vote_count = votes
            .count_documents(doc! { "poll_id": poll.id }, None)
            .await?;
        summaries.push(PollSummary::new(&poll, vote_count));
    }
    Ok(Json(summaries))
}

#[post("/polls", data = "<spec>", format = "json")]
async fn create_poll(
    token: AuthToken,
    spec: Json<PollSpec>,
    new_polls: Coll<NewPoll>,
    polls: Coll<Poll>,
    new_options: Coll<NewPollOption>,
    options: Coll<PollOption>,
    db_client: &State<Client>,
    closers: &State<PollClosers>,
) -> Result<Json<PollDetail>> {
    spec.validate()?;
    let (new_poll, option_texts) = spec.0.into_poll(token.id);

    // Atomically insert the poll and its options.
    let (poll, poll_options) = {
        let mut session = db_client.start_session(None).await?;
        session.start_transaction(None).await?;

        let poll_id: Id = new_polls
            .insert_one_with_session(&new_poll, None, &mut session)
            .await?
            .inserted_id
            .as_object_id()
            .unwrap() // Valid because the ID comes directly from the DB.
            .into();

        let rows = option_texts
            .into_iter()
            .map(|text| NewPollOption::new(poll_id, text))
            .collect::<Vec<_>>();
        new_options
            .insert_many_with_session(&rows, None, &mut session)
            .await?;

        // Retrieve the full poll and options including IDs.
        let poll = polls
            .find_one_with_session(poll_id.as_doc(), None, &mut session)
            .await?
            .unwrap();
        let mut poll_options = Vec::new();
        let mut cursor = options
            .find_with_session(doc! { "poll_id": poll_id }, None, &mut session)
            .await?;
        while let Some(option) = cursor.next(&mut session).await {
            poll_options.push(option?);
        }
        sort_canonical(&mut poll_options);

        session.commit_transaction().await?;
        (poll, poll_options)
    };

    // An active poll with an end date closes itself.
    if poll.status == PollStatus::Active {
        if let Some(end_date) = poll.end_date {
            closers.schedule_poll(polls.clone(), poll.id, end_date).await;
        }
    }

    Ok(Json(PollDetail::new(poll, poll_options, false, 0)))
}

#[get("/polls/<poll_id>")]
async fn get_poll(
    token: Option<AuthToken>,
    poll_id: Id,
    polls: Coll<Poll>,
    options: Coll<PollOption>,
    votes: Coll<Vote>,
) -> Result<Json<PollDetail>> {
    let poll = poll_by_id(poll_id, &polls).await?;
    let poll_options = options_for_poll(poll_id, &options).await?;
    let vote_count = votes
        .count_documents(doc! { "poll_id": poll_id }, None)
        .await?;
    let has_voted = match token {
        Some(token) => {
            let filter = doc! { "poll_id": poll_id, "user_id": token.id };
            votes.count_documents(filter, None).await? > 0
        }
        None => false,
    };
    Ok(Json(PollDetail::new(poll, poll_options, has_voted, vote_count)))
}

#[put("/polls/<poll_id>", data = "<update>", format = "json")]
async fn update_poll(
    token: AuthToken,
    poll_id: Id,
    update: Json<PollUpdate>,
    config: &State<Config>,
    new_polls: Coll<NewPoll>,
    polls: Coll<Poll>,
    new_options: Coll<NewPollOption>,
    options: Coll<PollOption>,
    votes: Coll<Vote>,
    db_client: &State<Client>,
    closers: &State<PollClosers>,
) -> Result<Json<PollDetail>> {
    let mut poll = owned_poll_by_id(poll_id, token.id, &polls).await?;
    let update = update.0;

    // Apply the field updates and lifecycle checks in memory first.
    update.apply(&mut poll.poll)?;

    // Reconcile the option list, if one was submitted.
    let diff = match &update.options {
        Some(submitted) => {
            let existing = options_for_poll(poll_id, &options).await?;
            OptionDiff::compute(&existing, submitted)?
        }
        None => OptionDiff::default(),
    };

    // Atomically write the poll and the option reconciliation. Dropping the
    // session without committing aborts the transaction.
    let delete_ids: Vec<Bson> = diff.delete.iter().copied().map(Bson::from).collect();
    {
        let mut session = db_client.start_session(None).await?;
        session.start_transaction(None).await?;

        // Deleting a voted-on option is only allowed under the cascade
        // policy. Counting inside the transaction means a ballot landing
        // concurrently cannot slip past the check.
        if !diff.delete.is_empty() && config.orphan_vote_policy() == OrphanVotePolicy::Reject {
            let affected = votes
                .count_documents_with_session(
                    doc! { "option_id": { "$in": delete_ids.clone() } },
                    None,
                    &mut session,
                )
                .await?;
            if affected > 0 {
                return Err(Error::bad_request(
                    "Cannot delete an option that has votes",
                ));
            }
        }

        new_polls
            .replace_one_with_session(poll_id.as_doc(), &poll.poll, None, &mut session)
            .await?;

        for (option_id, text) in &diff.update {
            options
                .update_one_with_session(
                    option_id.as_doc(),
                    doc! { "$set": { "text": text.clone() } },
                    None,
                    &mut session,
                )
                .await?;
        }
        if !diff.insert.is_empty() {
            let rows = diff
                .insert
                .iter()
                .map(|text| NewPollOption::new(poll_id, text.clone()))
                .collect::<Vec<_>>();
            new_options
                .insert_many_with_session(&rows, None, &mut session)
                .await?;
        }
        if !diff.delete.is_empty() {
            // Under the reject policy this is checked above to be a no-op.
            votes
                .delete_many_with_session(
                    doc! { "option_id": { "$in": delete_ids } },
                    None,
                    &mut session,
                )
                .await?;
            options
                .delete_many_with_session(
                    doc! { "_id": { "$in": diff.delete.iter().copied().map(Bson::from).collect::<Vec<_>>() } },
                    None,
                    &mut session,
                )
                .await?;
        }

        session.commit_transaction().await?;
    }

    // Keep the closer in line with the new state.
    match (poll.status, poll.end_date) {
        (PollStatus::Active, Some(end_date)) => {
            closers.schedule_poll(polls.clone(), poll_id, end_date).await;
        }
        _ => closers.cancel_poll(poll_id).await,
    }

    let poll_options = options_for_poll(poll_id, &options).await?;
    let vote_count = votes
        .count_documents(doc! { "poll_id": poll_id }, None)
        .await?;
    let has_voted = votes
        .count_documents(doc! { "poll_id": poll_id, "user_id": token.id }, None)
        .await?
        > 0;
    Ok(Json(PollDetail::new(poll, poll_options, has_voted, vote_count)))
}

#[delete("/polls/<poll_id>")]
async fn delete_poll(
    token: AuthToken,
    poll_id: Id,
    polls: Coll<Poll>,
    options: Coll<PollOption>,
    votes: Coll<Vote>,
    db_client: &State<Client>,
    closers: &State<PollClosers>,
) -> Result<()> {
    owned_poll_by_id(poll_id, token.id, &polls).await?;

    // Atomically delete the poll and all associated data.
    {
        let mut session = db_client.start_session(None).await?;
        session.start_transaction(None).await?;

        let filter = doc! { "poll_id": poll_id };
        votes
            .delete_many_with_session(filter.clone(), None, &mut session)
            .await?;
        options
            .delete_many_with_session(filter, None, &mut session)
            .await?;
        polls
            .delete_one_with_session(poll_id.as_doc(), None, &mut session)
            .await?;

        session.commit_transaction().await?;
    }

    closers.cancel_poll(poll_id).await;
    Ok(())
}
