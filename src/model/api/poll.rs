use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::{
    common::{PollStatus, UserId, VoteType},
    db::{Poll, PollCore, PollOption},
    mongodb::Id,
};

use super::id::ApiId;

fn default_true() -> bool {
    true
}

fn default_vote_type() -> VoteType {
    VoteType::Single
}

fn default_status() -> PollStatus {
    PollStatus::Active
}

/// A poll that the caller wishes to create.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollSpec {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_vote_type")]
    pub vote_type: VoteType,
    #[serde(default)]
    pub end_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_anonymous: bool,
    /// Results are public unless the caller explicitly opts out.
    #[serde(default = "default_true")]
    pub is_public_results: bool,
    #[serde(default)]
    pub is_realtime_results: bool,
    /// Polls are created open for ballots unless explicitly drafted.
    #[serde(default = "default_status")]
    pub status: PollStatus,
    /// Option texts, in display order. At least two.
    pub options: Vec<String>,
}

impl PollSpec {
    /// Check the spec is well-formed: non-empty title and option texts,
    /// at least two options, a future end date, and a creatable status.
    pub fn validate(&self) -> Result<()> {
        if self.title.trim().is_empty() {
            return Err(Error::bad_request("Poll title is required"));
        }
        if self.options.len() < 2 {
            return Err(Error::bad_request("At least two options are required"));
        }
        if self.options.iter().any(|text| text.trim().is_empty()) {
            return Err(Error::bad_request("Option text must not be empty"));
        }
        if let Some(end_date) = self.end_date {
            if end_date <= Utc::now() {
                return Err(Error::bad_request("End date must be in the future"));
            }
        }
        if self.status == PollStatus::Completed {
            return Err(Error::InvalidState(
                "A poll cannot be created already completed".to_string(),
            ));
        }
        Ok(())
    }

    /// Convert into a DB-ready poll plus its option texts.
    /// Assumes [`Self::validate`] has passed.
    pub fn into_poll(self, created_by: UserId) -> (PollCore, Vec<String>) {
        let now = Utc::now();
        let start_date = (self.status == PollStatus::Active).then_some(now);
        let poll = PollCore {
            title: self.title,
            description: self.description,
            created_by,
            vote_type: self.vote_type,
            status: self.status,
            start_date,
            end_date: self.end_date,
            is_anonymous: self.is_anonymous,
            is_public_results: self.is_public_results,
            is_realtime_results: self.is_realtime_results,
            created_at: now,
            updated_at: now,
        };
        (poll, self.options)
    }
}

/// A partial update to a poll; `None` fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollUpdate {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub vote_type: Option<VoteType>,
    #[serde(default)]
    pub end_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_anonymous: Option<bool>,
    #[serde(default)]
    pub is_public_results: Option<bool>,
    #[serde(default)]
    pub is_realtime_results: Option<bool>,
    #[serde(default)]
    pub status: Option<PollStatus>,
    /// Full replacement option list; absent leaves the options untouched.
    #[serde(default)]
    pub options: Option<Vec<OptionSpec>>,
}

impl PollUpdate {
    /// Apply the field updates to the poll, enforcing the lifecycle rules:
    /// the status only moves forward, `start_date` is set on the first
    /// departure from draft and never again, and the anonymity flag and
    /// vote type are frozen once the poll is non-draft.
    ///
    /// Option reconciliation is separate; see [`OptionDiff::compute`].
    pub fn apply(&self, poll: &mut PollCore) -> Result<()> {
        let now = Utc::now();

        if let Some(ref title) = self.title {
            if title.trim().is_empty() {
                return Err(Error::bad_request("Poll title is required"));
            }
            poll.title = title.clone();
        }
        if let Some(ref description) = self.description {
            poll.description = Some(description.clone());
        }
        if let Some(vote_type) = self.vote_type {
            if poll.status != PollStatus::Draft && vote_type != poll.vote_type {
                return Err(Error::InvalidState(
                    "The vote type cannot change once the poll has opened".to_string(),
                ));
            }
            poll.vote_type = vote_type;
        }
        if let Some(end_date) = self.end_date {
            if end_date <= now {
                return Err(Error::bad_request("End date must be in the future"));
            }
            poll.end_date = Some(end_date);
        }
        if let Some(is_anonymous) = self.is_anonymous {
            if poll.status != PollStatus::Draft && is_anonymous != poll.is_anonymous {
                return Err(Error::InvalidState(
                    "Anonymity is fixed once the poll has opened".to_string(),
                ));
            }
            poll.is_anonymous = is_anonymous;
        }
        if let Some(is_public_results) = self.is_public_results {
            poll.is_public_results = is_public_results;
        }
        if let Some(is_realtime_results) = self.is_realtime_results {
            poll.is_realtime_results = is_realtime_results;
        }
        if let Some(status) = self.status {
            if !poll.status.can_transition(status) {
                return Err(Error::InvalidState(format!(
                    "Cannot move a {:?} poll to {:?}",
                    poll.status, status
                )));
            }
            // First activation only; an already-active poll keeps its
            // original start date.
            if poll.status == PollStatus::Draft
                && status == PollStatus::Active
                && poll.start_date.is_none()
            {
                poll.start_date = Some(now);
            }
            poll.status = status;
        }

        poll.updated_at = now;
        Ok(())
    }
}

/// One option in an update submission: an existing option (with id) to
/// keep or re-text, or a new option (without id) to insert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionSpec {
    #[serde(default)]
    pub id: Option<Id>,
    pub text: String,
}

/// The difference between a poll's stored options and a submitted
/// replacement list: full replace-by-diff, not append-only.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OptionDiff {
    /// Existing options whose text changed.
    pub update: Vec<(Id, String)>,
    /// Texts of brand-new options.
    pub insert: Vec<String>,
    /// Existing options absent from the submission.
    pub delete: Vec<Id>,
}

impl OptionDiff {
    /// Work out the reconciliation between stored and submitted options.
    ///
    /// Fails if a submitted id does not belong to the poll, an option text
    /// is empty, an id appears twice, or the resulting set would have fewer
    /// than two options.
    pub fn compute(existing: &[PollOption], submitted: &[OptionSpec]) -> Result<OptionDiff> {
        let existing_by_id: HashMap<Id, &PollOption> =
            existing.iter().map(|option| (option.id, option)).collect();

        let mut diff = OptionDiff::default();
        let mut kept = HashSet::new();

        for spec in submitted {
            if spec.text.trim().is_empty() {
                return Err(Error::bad_request("Option text must not be empty"));
            }
            match spec.id {
                Some(id) => {
                    let current = existing_by_id.get(&id).ok_or_else(|| {
                        Error::bad_request(format!("Option {id} does not belong to this poll"))
                    })?;
                    if !kept.insert(id) {
                        return Err(Error::bad_request(format!(
                            "Option {id} was submitted twice"
                        )));
                    }
                    if current.text != spec.text {
                        diff.update.push((id, spec.text.clone()));
                    }
                }
                None => diff.insert.push(spec.text.clone()),
            }
        }

        diff.delete = existing
            .iter()
            .map(|option| option.id)
            .filter(|id| !kept.contains(id))
            .collect();

        if kept.len() + diff.insert.len() < 2 {
            return Err(Error::bad_request("At least two options are required"));
        }

        Ok(diff)
    }

    /// True if nothing would change.
    pub fn is_empty(&self) -> bool {
        self.update.is_empty() && self.insert.is_empty() && self.delete.is_empty()
    }
}

/// An API-friendly view of one poll option.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionView {
    pub id: ApiId,
    pub text: String,
}

impl From<PollOption> for OptionView {
    fn from(option: PollOption) -> Self {
        Self {
            id: option.id.into(),
            text: option.text,
        }
    }
}

/// A summary of a poll as returned by list views, with its raw vote count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollSummary {
    pub id: ApiId,
    pub title: String,
    pub description: Option<String>,
    pub status: PollStatus,
    pub vote_type: VoteType,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub is_anonymous: bool,
    pub is_public_results: bool,
    pub is_realtime_results: bool,
    pub created_at: DateTime<Utc>,
    pub vote_count: u64,
}

impl PollSummary {
    pub fn new(poll: &Poll, vote_count: u64) -> Self {
        Self {
            id: poll.id.into(),
            title: poll.title.clone(),
            description: poll.description.clone(),
            status: poll.status,
            vote_type: poll.vote_type,
            start_date: poll.start_date,
            end_date: poll.end_date,
            is_anonymous: poll.is_anonymous,
            is_public_results: poll.is_public_results,
            is_realtime_results: poll.is_realtime_results,
            created_at: poll.created_at,
            vote_count,
        }
    }
}

/// The full poll view: summary plus creator, options in canonical order,
/// and whether the calling user has already voted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollDetail {
    pub id: ApiId,
    pub title: String,
    pub description: Option<String>,
    pub created_by: ApiId,
    pub status: PollStatus,
    pub vote_type: VoteType,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub is_anonymous: bool,
    pub is_public_results: bool,
    pub is_realtime_results: bool,
    pub created_at: DateTime<Utc>,
    pub options: Vec<OptionView>,
    pub has_voted: bool,
    pub vote_count: u64,
}

impl PollDetail {
    pub fn new(poll: Poll, options: Vec<PollOption>, has_voted: bool, vote_count: u64) -> Self {
        Self {
            id: poll.id.into(),
            created_by: poll.created_by.into(),
            title: poll.poll.title,
            description: poll.poll.description,
            status: poll.poll.status,
            vote_type: poll.poll.vote_type,
            start_date: poll.poll.start_date,
            end_date: poll.poll.end_date,
            is_anonymous: poll.poll.is_anonymous,
            is_public_results: poll.poll.is_public_results,
            is_realtime_results: poll.poll.is_realtime_results,
            created_at: poll.poll.created_at,
            options: options.into_iter().map(Into::into).collect(),
            has_voted,
            vote_count,
        }
    }
}
