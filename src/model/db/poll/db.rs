use std::ops::{Deref, DerefMut};

use serde::{Deserialize, Serialize};

use crate::model::mongodb::Id;

use super::base::PollCore;

/// A poll from the database, with its unique ID.
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub struct Poll {
    #[serde(rename = "_id")]
    pub id: Id,
    #[serde(flatten)]
    pub poll: PollCore,
}

impl Deref for Poll {
    type Target = PollCore;

    fn deref(&self) -> &Self::Target {
        &self.poll
    }
}

impl DerefMut for Poll {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.poll
    }
}
