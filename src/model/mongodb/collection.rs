use std::ops::Deref;

use mongodb::{
    bson::doc, error::Error as DbError, options::IndexOptions, Collection, Database, IndexModel,
};
use rocket::{
    request::{self, FromRequest, Request},
    State,
};

use crate::model::db::{NewPoll, NewPollOption, NewVote, Poll, PollOption, Profile, Vote};

/// A type that can be directly inserted/read to/from the database.
pub trait MongoCollection {
    /// The name of the collection.
    const NAME: &'static str;
}

/// A database collection of the given type.
pub struct Coll<T>(Collection<T>);

impl<T> Coll<T>
where
    T: MongoCollection,
{
    /// Get a handle on this collection in the given database.
    pub fn from_db(db: &Database) -> Self {
        Self(db.collection(T::NAME))
    }
}

// `Derive(Clone)` would only derive if `T: Clone`, but we don't need that bound.
impl<T> Clone for Coll<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<T> Deref for Coll<T> {
    type Target = Collection<T>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[rocket::async_trait]
impl<'r, T> FromRequest<'r> for Coll<T>
where
    T: MongoCollection,
{
    type Error = ();

    /// Get the database connection from the managed state and wrap it in a collection.
    ///
    /// Panics iff the [`Database`] is not managed by [`rocket::Rocket`].
    async fn from_request(req: &'r Request<'_>) -> request::Outcome<Self, Self::Error> {
        let db = req.guard::<&State<Database>>().await.unwrap();
        request::Outcome::Success(Coll::from_db(db))
    }
}

// Profile collection
const PROFILES: &str = "profiles";
impl MongoCollection for Profile {
    const NAME: &'static str = PROFILES;
}

// Poll collections
const POLLS: &str = "polls";
impl MongoCollection for Poll {
    const NAME: &'static str = POLLS;
}
impl MongoCollection for NewPoll {
    const NAME: &'static str = POLLS;
}

// Poll option collections
const POLL_OPTIONS: &str = "poll_options";
impl MongoCollection for PollOption {
    const NAME: &'static str = POLL_OPTIONS;
}
impl MongoCollection for NewPollOption {
    const NAME: &'static str = POLL_OPTIONS;
}

// Vote collections
const VOTES: &str = "votes";
impl MongoCollection for Vote {
    const NAME: &'static str = VOTES;
}
impl MongoCollection for NewVote {
    const NAME: &'static str = VOTES;
}

/// Ensure that all the required indexes exist on the given database.
///
/// This operation is idempotent.
pub async fn ensure_indexes_exist(db: &Database) -> Result<(), DbError> {
    debug!("Ensuring collection indexes exist");

    let unique = IndexOptions::builder().unique(true).build();

    // Vote collection: the store-level backstop for ballot uniqueness.
    // A single concurrent double-submission cannot create two rows for the
    // same (poll, option, caller) no matter how the pre-checks interleave.
    let vote_unique_index = IndexModel::builder()
        .keys(doc! {"poll_id": 1, "option_id": 1, "user_id": 1})
        .options(unique)
        .build();
    let vote_poll_index = IndexModel::builder().keys(doc! {"poll_id": 1}).build();
    let votes = Coll::<Vote>::from_db(db);
    votes.create_index(vote_unique_index, None).await?;
    votes.create_index(vote_poll_index, None).await?;

    // Poll option collection.
    let option_poll_index = IndexModel::builder().keys(doc! {"poll_id": 1}).build();
    Coll::<PollOption>::from_db(db)
        .create_index(option_poll_index, None)
        .await?;

    // Poll collection.
    let poll_creator_index = IndexModel::builder().keys(doc! {"created_by": 1}).build();
    Coll::<Poll>::from_db(db)
        .create_index(poll_creator_index, None)
        .await?;

    Ok(())
}
