use std::collections::{BTreeMap, HashSet};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::{
    common::UserId,
    db::{sort_canonical, Poll, PollOption, Vote},
};

use super::id::ApiId;
use super::poll::PollSummary;

/// The vote count for one option.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionTally {
    pub id: ApiId,
    pub text: String,
    pub votes: u64,
}

/// A count attributed to one UTC calendar day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayCount {
    pub date: NaiveDate,
    pub count: u64,
}

/// The aggregated results of a poll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollResults {
    pub poll: PollSummary,
    /// Per-option tallies, in option creation order.
    pub results: Vec<OptionTally>,
    /// Raw vote rows.
    pub total_votes: u64,
    /// Distinct users who voted.
    pub unique_participants: u64,
    /// Raw vote rows per UTC day.
    pub votes_per_day: Vec<DayCount>,
    /// Distinct voters per UTC day; a user voting twice on one day counts once.
    pub participants_per_day: Vec<DayCount>,
}

impl PollResults {
    pub fn new(poll: &Poll, options: Vec<PollOption>, votes: &[Vote]) -> Self {
        Self {
            poll: PollSummary::new(poll, votes.len() as u64),
            results: tally_options(options, votes),
            total_votes: votes.len() as u64,
            unique_participants: unique_participants(votes),
            votes_per_day: votes_per_day(votes),
            participants_per_day: participants_per_day(votes),
        }
    }
}

/// Check whether the caller may see this poll's results.
///
/// The creator always may. Otherwise private results deny everyone, and
/// non-realtime results deny everyone while voting is still open. Denial is
/// 401 for anonymous callers and 403 for authenticated ones.
pub fn check_visibility(poll: &Poll, caller: Option<UserId>) -> Result<()> {
    if caller == Some(poll.created_by) {
        return Ok(());
    }
    let denied = |message: &str| match caller {
        None => Error::unauthorized(message),
        Some(_) => Error::forbidden(message),
    };
    if !poll.is_public_results {
        return Err(denied("The results of this poll are private"));
    }
    if !poll.is_realtime_results && poll.is_open() {
        return Err(denied(
            "The results are not available while voting is open",
        ));
    }
    Ok(())
}

/// Count the votes for each option, returning tallies in option creation
/// order. Options with no votes tally zero; votes for deleted options are
/// simply not represented.
pub fn tally_options(mut options: Vec<PollOption>, votes: &[Vote]) -> Vec<OptionTally> {
    sort_canonical(&mut options);
    options
        .into_iter()
        .map(|option| {
            let count = votes
                .iter()
                .filter(|vote| vote.option_id == option.id)
                .count();
            OptionTally {
                id: option.id.into(),
                text: option.text,
                votes: count as u64,
            }
        })
        .collect()
}

/// The number of distinct users among the votes.
pub fn unique_participants(votes: &[Vote]) -> u64 {
    votes
        .iter()
        .filter_map(|vote| vote.user_id)
        .collect::<HashSet<_>>()
        .len() as u64
}

/// Raw vote rows grouped by the UTC day they were cast, ascending by day.
pub fn votes_per_day(votes: &[Vote]) -> Vec<DayCount> {
    let mut days = BTreeMap::new();
    for vote in votes {
        *days.entry(vote.created_at.date_naive()).or_insert(0_u64) += 1;
    }
    into_day_counts(days)
}

/// Distinct voters grouped by the UTC day they voted, ascending by day.
/// Each (user, day) pair counts once however many votes it covers.
pub fn participants_per_day(votes: &[Vote]) -> Vec<DayCount> {
    let mut seen = HashSet::new();
    let mut days = BTreeMap::new();
    for vote in votes {
        let day = vote.created_at.date_naive();
        if seen.insert((vote.user_id, day)) {
            *days.entry(day).or_insert(0_u64) += 1;
        }
    }
    into_day_counts(days)
}

fn into_day_counts(days: BTreeMap<NaiveDate, u64>) -> Vec<DayCount> {
    days.into_iter()
        .map(|(date, count)| DayCount { date, count })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::{DateTime, Duration, TimeZone, Utc};

    use crate::model::common::{PollStatus, VoteType};
    use crate::model::db::PollCore;
    use crate::model::mongodb::Id;

    fn poll(status: PollStatus, public: bool, realtime: bool) -> Poll {
        let now = Utc::now();
        Poll {
            id: Id::new(),
            poll: PollCore {
                title: "Team offsite".to_string(),
                description: None,
                created_by: Id::new(),
                vote_type: VoteType::Single,
                status,
                start_date: Some(now),
                end_date: None,
                is_anonymous: false,
                is_public_results: public,
                is_realtime_results: realtime,
                created_at: now,
                updated_at: now,
            },
        }
    }

    fn option_at(poll_id: Id, text: &str, created_at: DateTime<Utc>) -> PollOption {
        PollOption {
            id: Id::new(),
            poll_id,
            text: text.to_string(),
            created_at,
        }
    }

    fn vote_at(poll_id: Id, option_id: Id, user_id: UserId, created_at: DateTime<Utc>) -> Vote {
        Vote {
            id: Id::new(),
            poll_id,
            option_id,
            user_id: Some(user_id),
            ranking: 1,
            created_at,
        }
    }

    #[test]
    fn creator_always_sees_results() {
        for (public, realtime) in [(false, false), (false, true), (true, false)] {
            let poll = poll(PollStatus::Active, public, realtime);
            assert!(check_visibility(&poll, Some(poll.created_by)).is_ok());
        }
    }

    #[test]
    fn private_results_deny_everyone_else() {
        let poll = poll(PollStatus::Completed, false, false);
        assert!(matches!(
            check_visibility(&poll, None),
            Err(Error::Unauthorized(_))
        ));
        assert!(matches!(
            check_visibility(&poll, Some(Id::new())),
            Err(Error::Forbidden(_))
        ));
    }

    #[test]
    fn non_realtime_results_hide_until_completion() {
        let active = poll(PollStatus::Active, true, false);
        assert!(check_visibility(&active, Some(Id::new())).is_err());

        let completed = poll(PollStatus::Completed, true, false);
        assert!(check_visibility(&completed, Some(Id::new())).is_ok());
        assert!(check_visibility(&completed, None).is_ok());
    }

    #[test]
    fn realtime_public_results_are_visible_while_active() {
        let poll = poll(PollStatus::Active, true, true);
        assert!(check_visibility(&poll, None).is_ok());
        assert!(check_visibility(&poll, Some(Id::new())).is_ok());
    }

    #[test]
    fn tallies_follow_creation_order_not_popularity() {
        let poll_id = Id::new();
        let base = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap();
        let first = option_at(poll_id, "First", base);
        let second = option_at(poll_id, "Second", base + Duration::minutes(1));
        let third = option_at(poll_id, "Third", base + Duration::minutes(2));

        // "Second" is the most popular, "First" has no votes at all.
        let votes = vec![
            vote_at(poll_id, second.id, Id::new(), base),
            vote_at(poll_id, second.id, Id::new(), base),
            vote_at(poll_id, third.id, Id::new(), base),
        ];

        // Hand the options over shuffled.
        let tallies = tally_options(vec![third.clone(), first.clone(), second.clone()], &votes);
        let texts: Vec<&str> = tallies.iter().map(|tally| tally.text.as_str()).collect();
        assert_eq!(texts, vec!["First", "Second", "Third"]);
        let counts: Vec<u64> = tallies.iter().map(|tally| tally.votes).collect();
        assert_eq!(counts, vec![0, 2, 1]);
    }

    #[test]
    fn orphaned_votes_do_not_break_tallies() {
        let poll_id = Id::new();
        let base = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap();
        let kept = option_at(poll_id, "Kept", base);
        let deleted_option = Id::new();

        let votes = vec![
            vote_at(poll_id, kept.id, Id::new(), base),
            vote_at(poll_id, deleted_option, Id::new(), base),
        ];

        let tallies = tally_options(vec![kept.clone()], &votes);
        assert_eq!(tallies.len(), 1);
        assert_eq!(tallies[0].votes, 1);
        // The orphan still counts towards the raw total.
        assert_eq!(votes.len(), 2);
    }

    #[test]
    fn unique_participants_deduplicates_users() {
        let poll_id = Id::new();
        let option_id = Id::new();
        let alice = Id::new();
        let bob = Id::new();
        let base = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap();

        let votes = vec![
            vote_at(poll_id, option_id, alice, base),
            vote_at(poll_id, option_id, alice, base + Duration::hours(1)),
            vote_at(poll_id, option_id, bob, base),
        ];
        assert_eq!(unique_participants(&votes), 2);
    }

    #[test]
    fn the_two_day_series_count_differently() {
        let poll_id = Id::new();
        let option_id = Id::new();
        let alice = Id::new();
        let bob = Id::new();
        let monday = Utc.with_ymd_and_hms(2026, 3, 2, 10, 0, 0).unwrap();
        let tuesday = Utc.with_ymd_and_hms(2026, 3, 3, 10, 0, 0).unwrap();

        // Alice votes twice on Monday; Bob votes Monday and Tuesday.
        let votes = vec![
            vote_at(poll_id, option_id, alice, monday),
            vote_at(poll_id, option_id, alice, monday + Duration::hours(2)),
            vote_at(poll_id, option_id, bob, monday),
            vote_at(poll_id, option_id, bob, tuesday),
        ];

        let raw = votes_per_day(&votes);
        assert_eq!(
            raw,
            vec![
                DayCount {
                    date: monday.date_naive(),
                    count: 3
                },
                DayCount {
                    date: tuesday.date_naive(),
                    count: 1
                },
            ]
        );

        let participants = participants_per_day(&votes);
        assert_eq!(
            participants,
            vec![
                DayCount {
                    date: monday.date_naive(),
                    count: 2
                },
                DayCount {
                    date: tuesday.date_naive(),
                    count: 1
                },
            ]
        );
    }

    #[test]
    fn results_bundle_everything_together() {
        let poll = poll(PollStatus::Completed, true, false);
        let base = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap();
        let a = option_at(poll.id, "A", base);
        let b = option_at(poll.id, "B", base + Duration::minutes(1));
        let alice = Id::new();

        let votes = vec![
            vote_at(poll.id, a.id, alice, base),
            vote_at(poll.id, a.id, Id::new(), base),
        ];

        let results = PollResults::new(&poll, vec![a, b], &votes);
        assert_eq!(results.total_votes, 2);
        assert_eq!(results.unique_participants, 2);
        assert_eq!(results.results.len(), 2);
        assert_eq!(results.results[0].votes, 2);
        assert_eq!(results.results[1].votes, 0);
        assert_eq!(results.poll.vote_count, 2);
    }
}
