use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::{
    common::{UserId, VoteType},
    db::{NewVote, Poll, PollOption, Vote},
    mongodb::Id,
};

use super::id::ApiId;

/// One chosen option within a ballot. `ranking` is only meaningful for
/// ranked polls and defaults to the 1-based submission position there.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    pub option_id: Id,
    #[serde(default)]
    pub ranking: Option<u32>,
}

/// A complete ballot, submitted in one request and written atomically.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BallotSpec {
    pub selections: Vec<Selection>,
}

impl BallotSpec {
    /// Validate the ballot against the poll and build the vote rows to
    /// insert. Checks the poll is open, the selections are non-empty,
    /// distinct, and all belong to the poll, and the selection count and
    /// rankings fit the poll's vote type.
    pub fn into_votes(
        self,
        poll: &Poll,
        options: &[PollOption],
        user_id: UserId,
    ) -> Result<Vec<NewVote>> {
        if !poll.is_open() {
            return Err(Error::InvalidState(
                "Ballots are only accepted while the poll is active".to_string(),
            ));
        }
        if self.selections.is_empty() {
            return Err(Error::bad_request("A ballot must select at least one option"));
        }
        if poll.vote_type == VoteType::Single && self.selections.len() != 1 {
            return Err(Error::bad_request(
                "This poll accepts exactly one selection",
            ));
        }

        let valid_options: HashSet<Id> = options.iter().map(|option| option.id).collect();
        let mut seen = HashSet::new();
        for selection in &self.selections {
            if !valid_options.contains(&selection.option_id) {
                return Err(Error::bad_request(format!(
                    "Option {} does not belong to this poll",
                    selection.option_id
                )));
            }
            if !seen.insert(selection.option_id) {
                return Err(Error::bad_request(format!(
                    "Option {} was selected twice",
                    selection.option_id
                )));
            }
            if selection.ranking == Some(0) {
                return Err(Error::bad_request("Rankings start at 1"));
            }
        }

        let votes = self
            .selections
            .into_iter()
            .enumerate()
            .map(|(index, selection)| {
                let ranking = match poll.vote_type {
                    // Rankings are taken as given, or from submission order.
                    VoteType::Ranked => selection.ranking.unwrap_or(index as u32 + 1),
                    VoteType::Single | VoteType::Multiple => 1,
                };
                NewVote::new(poll.id, selection.option_id, user_id, ranking)
            })
            .collect();
        Ok(votes)
    }
}

/// The persistence plan for a validated ballot: which of the caller's
/// previous votes to remove and which rows to write. Both sets commit in
/// one transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BallotPlan {
    pub delete: Vec<Id>,
    pub insert: Vec<NewVote>,
}

/// Decide how a ballot lands, given the caller's previous votes in the poll.
///
/// Single-choice: re-voting is a vote change, so the previous ballot is
/// deleted and the new row inserted. Multiple and ranked: a selection that
/// already has a vote by this caller is a conflict and nothing is written.
pub fn plan_ballot(
    vote_type: VoteType,
    previous: &[Vote],
    rows: Vec<NewVote>,
) -> Result<BallotPlan> {
    match vote_type {
        VoteType::Single => Ok(BallotPlan {
            delete: previous.iter().map(|vote| vote.id).collect(),
            insert: rows,
        }),
        VoteType::Multiple | VoteType::Ranked => {
            for row in &rows {
                if previous.iter().any(|vote| vote.option_id == row.option_id) {
                    return Err(Error::DuplicateVote(format!(
                        "Already voted for option {} in this poll",
                        row.option_id
                    )));
                }
            }
            Ok(BallotPlan {
                delete: Vec::new(),
                insert: rows,
            })
        }
    }
}

/// The committed ballot: the ids of the votes that were written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BallotReceipt {
    pub vote_ids: Vec<ApiId>,
}

impl BallotReceipt {
    pub fn new(vote_ids: impl IntoIterator<Item = Id>) -> Self {
        Self {
            vote_ids: vote_ids.into_iter().map(Into::into).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::Utc;

    use crate::model::common::PollStatus;
    use crate::model::db::PollCore;

    fn poll(vote_type: VoteType, status: PollStatus) -> Poll {
        let now = Utc::now();
        Poll {
            id: Id::new(),
            poll: PollCore {
                title: "Lunch spot".to_string(),
                description: None,
                created_by: Id::new(),
                vote_type,
                status,
                start_date: Some(now),
                end_date: None,
                is_anonymous: false,
                is_public_results: true,
                is_realtime_results: false,
                created_at: now,
                updated_at: now,
            },
        }
    }

    fn options_for(poll_id: Id, count: usize) -> Vec<PollOption> {
        (0..count)
            .map(|i| PollOption {
                id: Id::new(),
                poll_id,
                text: format!("Option {i}"),
                created_at: Utc::now(),
            })
            .collect()
    }

    fn select(option_id: Id) -> Selection {
        Selection {
            option_id,
            ranking: None,
        }
    }

    #[test]
    fn single_ballot_builds_one_row_with_rank_one() {
        let poll = poll(VoteType::Single, PollStatus::Active);
        let options = options_for(poll.id, 3);
        let user = Id::new();

        let ballot = BallotSpec {
            selections: vec![select(options[1].id)],
        };
        let votes = ballot.into_votes(&poll, &options, user).unwrap();
        assert_eq!(votes.len(), 1);
        assert_eq!(votes[0].poll_id, poll.id);
        assert_eq!(votes[0].option_id, options[1].id);
        assert_eq!(votes[0].user_id, Some(user));
        assert_eq!(votes[0].ranking, 1);
    }

    #[test]
    fn single_ballot_rejects_multiple_selections() {
        let poll = poll(VoteType::Single, PollStatus::Active);
        let options = options_for(poll.id, 3);

        let ballot = BallotSpec {
            selections: vec![select(options[0].id), select(options[1].id)],
        };
        assert!(ballot.into_votes(&poll, &options, Id::new()).is_err());
    }

    #[test]
    fn closed_polls_reject_ballots() {
        for status in [PollStatus::Draft, PollStatus::Completed] {
            let poll = poll(VoteType::Single, status);
            let options = options_for(poll.id, 2);
            let ballot = BallotSpec {
                selections: vec![select(options[0].id)],
            };
            assert!(ballot.into_votes(&poll, &options, Id::new()).is_err());
        }
    }

    #[test]
    fn foreign_duplicate_and_empty_selections_are_rejected() {
        let poll = poll(VoteType::Multiple, PollStatus::Active);
        let options = options_for(poll.id, 3);

        let ballot = BallotSpec { selections: vec![] };
        assert!(ballot.into_votes(&poll, &options, Id::new()).is_err());

        let ballot = BallotSpec {
            selections: vec![select(Id::new())],
        };
        assert!(ballot.into_votes(&poll, &options, Id::new()).is_err());

        let ballot = BallotSpec {
            selections: vec![select(options[0].id), select(options[0].id)],
        };
        assert!(ballot.into_votes(&poll, &options, Id::new()).is_err());
    }

    #[test]
    fn ranked_ballot_defaults_rankings_to_submission_order() {
        let poll = poll(VoteType::Ranked, PollStatus::Active);
        let options = options_for(poll.id, 3);

        let ballot = BallotSpec {
            selections: vec![
                select(options[2].id),
                Selection {
                    option_id: options[0].id,
                    ranking: Some(5),
                },
                select(options[1].id),
            ],
        };
        let votes = ballot.into_votes(&poll, &options, Id::new()).unwrap();
        let rankings: Vec<u32> = votes.iter().map(|vote| vote.ranking).collect();
        assert_eq!(rankings, vec![1, 5, 3]);
    }

    #[test]
    fn ranked_ballot_rejects_rank_zero_but_allows_gaps() {
        let poll = poll(VoteType::Ranked, PollStatus::Active);
        let options = options_for(poll.id, 3);

        let ballot = BallotSpec {
            selections: vec![Selection {
                option_id: options[0].id,
                ranking: Some(0),
            }],
        };
        assert!(ballot
            .clone()
            .into_votes(&poll, &options, Id::new())
            .is_err());

        // Gaps and repeats in rankings are the voter's business.
        let ballot = BallotSpec {
            selections: vec![
                Selection {
                    option_id: options[0].id,
                    ranking: Some(7),
                },
                Selection {
                    option_id: options[1].id,
                    ranking: Some(7),
                },
            ],
        };
        assert!(ballot.into_votes(&poll, &options, Id::new()).is_ok());
    }

    // Apply a plan to an in-memory vote store the way the handler applies
    // it to the collection: deletes first, then inserts.
    fn apply(store: &mut Vec<Vote>, plan: BallotPlan) {
        store.retain(|vote| !plan.delete.contains(&vote.id));
        for row in plan.insert {
            store.push(Vote {
                id: Id::new(),
                poll_id: row.poll_id,
                option_id: row.option_id,
                user_id: row.user_id,
                ranking: row.ranking,
                created_at: row.created_at,
            });
        }
    }

    fn caller_votes(store: &[Vote], user: Id) -> Vec<Vote> {
        store
            .iter()
            .filter(|vote| vote.user_id == Some(user))
            .cloned()
            .collect()
    }

    #[test]
    fn single_revote_leaves_exactly_one_row_reflecting_the_last_option() {
        let poll = poll(VoteType::Single, PollStatus::Active);
        let options = options_for(poll.id, 3);
        let user = Id::new();
        let mut store = Vec::new();

        // A second voter's row must survive the re-votes untouched.
        let other = Id::new();
        let ballot = BallotSpec {
            selections: vec![select(options[2].id)],
        };
        let rows = ballot.into_votes(&poll, &options, other).unwrap();
        let plan = plan_ballot(poll.vote_type, &caller_votes(&store, other), rows).unwrap();
        apply(&mut store, plan);

        for option in [&options[0], &options[1], &options[0]] {
            let ballot = BallotSpec {
                selections: vec![select(option.id)],
            };
            let rows = ballot.into_votes(&poll, &options, user).unwrap();
            let plan = plan_ballot(poll.vote_type, &caller_votes(&store, user), rows).unwrap();
            apply(&mut store, plan);
        }

        let mine = caller_votes(&store, user);
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].option_id, options[0].id);
        assert_eq!(caller_votes(&store, other).len(), 1);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn multiple_duplicate_vote_is_a_conflict_with_no_write() {
        let poll = poll(VoteType::Multiple, PollStatus::Active);
        let options = options_for(poll.id, 2);
        let user = Id::new();
        let mut store = Vec::new();

        let ballot = BallotSpec {
            selections: vec![select(options[0].id)],
        };
        let rows = ballot.into_votes(&poll, &options, user).unwrap();
        let plan = plan_ballot(poll.vote_type, &caller_votes(&store, user), rows).unwrap();
        apply(&mut store, plan);
        assert_eq!(store.len(), 1);

        // Same option again: conflict, and the store is untouched.
        let ballot = BallotSpec {
            selections: vec![select(options[0].id), select(options[1].id)],
        };
        let rows = ballot.into_votes(&poll, &options, user).unwrap();
        let err = plan_ballot(poll.vote_type, &caller_votes(&store, user), rows).unwrap_err();
        assert!(matches!(err, Error::DuplicateVote(_)));
        assert_eq!(store.len(), 1);
        assert_eq!(store[0].option_id, options[0].id);
    }

    #[test]
    fn ranked_revote_on_a_chosen_option_is_a_conflict() {
        let poll = poll(VoteType::Ranked, PollStatus::Active);
        let options = options_for(poll.id, 3);
        let user = Id::new();
        let mut store = Vec::new();

        let ballot = BallotSpec {
            selections: vec![select(options[0].id), select(options[1].id)],
        };
        let rows = ballot.into_votes(&poll, &options, user).unwrap();
        let plan = plan_ballot(poll.vote_type, &caller_votes(&store, user), rows).unwrap();
        assert!(plan.delete.is_empty());
        apply(&mut store, plan);

        let ballot = BallotSpec {
            selections: vec![select(options[1].id)],
        };
        let rows = ballot.into_votes(&poll, &options, user).unwrap();
        let err = plan_ballot(poll.vote_type, &caller_votes(&store, user), rows).unwrap_err();
        assert!(matches!(err, Error::DuplicateVote(_)));
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn multiple_ballot_ignores_submitted_rankings() {
        let poll = poll(VoteType::Multiple, PollStatus::Active);
        let options = options_for(poll.id, 2);

        let ballot = BallotSpec {
            selections: vec![
                Selection {
                    option_id: options[0].id,
                    ranking: Some(4),
                },
                select(options[1].id),
            ],
        };
        let votes = ballot.into_votes(&poll, &options, Id::new()).unwrap();
        assert!(votes.iter().all(|vote| vote.ranking == 1));
    }
}
