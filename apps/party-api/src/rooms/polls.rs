//! Per-room polls: creation, single-vote enforcement, tallying, closing.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use watchtide_common::id::{prefix, prefixed_ulid};

use crate::error::PartyError;

pub const MIN_POLL_OPTIONS: usize = 2;
pub const MAX_POLL_OPTIONS: usize = 6;

#[derive(Debug, Clone)]
pub struct Poll {
    pub id: String,
    pub question: String,
    pub options: Vec<String>,
    /// Voter key → chosen option index. Voter key is the member's
    /// `auth_user_id` when present, else their session id.
    votes: HashMap<String, usize>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// A poll as it goes over the wire: per-option tallies, no voter identities.
#[derive(Debug, Clone, Serialize)]
pub struct PollSnapshot {
    pub id: String,
    pub question: String,
    pub options: Vec<PollOptionSnapshot>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PollOptionSnapshot {
    pub text: String,
    pub vote_count: usize,
}

impl Poll {
    pub fn new(
        question: String,
        options: Vec<String>,
        expires_in_minutes: Option<i64>,
        now: DateTime<Utc>,
    ) -> Result<Self, PartyError> {
        if question.trim().is_empty() {
            return Err(PartyError::validation("Poll question must not be empty"));
        }
        let options: Vec<String> = options
            .into_iter()
            .map(|o| o.trim().to_string())
            .filter(|o| !o.is_empty())
            .collect();
        if options.len() < MIN_POLL_OPTIONS || options.len() > MAX_POLL_OPTIONS {
            return Err(PartyError::validation(format!(
                "Polls need between {MIN_POLL_OPTIONS} and {MAX_POLL_OPTIONS} options"
            )));
        }

        Ok(Self {
            id: prefixed_ulid(prefix::POLL),
            question,
            options,
            votes: HashMap::new(),
            is_active: true,
            created_at: now,
            expires_at: expires_in_minutes.map(|m| now + Duration::minutes(m)),
        })
    }

    /// Record a vote. One vote per voter per poll; votes are immutable once
    /// cast.
    pub fn vote(
        &mut self,
        voter_key: &str,
        option_index: usize,
        now: DateTime<Utc>,
    ) -> Result<(), PartyError> {
        if !self.is_open(now) {
            return Err(PartyError::state("This poll is closed"));
        }
        if option_index >= self.options.len() {
            return Err(PartyError::validation("Poll option out of range"));
        }
        if self.votes.contains_key(voter_key) {
            return Err(PartyError::state("You already voted on this poll"));
        }
        self.votes.insert(voter_key.to_string(), option_index);
        Ok(())
    }

    /// Vote count per option index, tallied on demand.
    pub fn results(&self) -> Vec<usize> {
        let mut counts = vec![0; self.options.len()];
        for &index in self.votes.values() {
            counts[index] += 1;
        }
        counts
    }

    pub fn close(&mut self) {
        self.is_active = false;
    }

    pub fn is_open(&self, now: DateTime<Utc>) -> bool {
        self.is_active && !self.is_expired(now)
    }

    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }

    /// Lazily close a poll whose end time has passed. Returns true when this
    /// call performed the transition, so the caller can broadcast it once.
    pub fn expire_if_due(&mut self, now: DateTime<Utc>) -> bool {
        if self.is_active && self.is_expired(now) {
            self.is_active = false;
            return true;
        }
        false
    }

    pub fn snapshot(&self) -> PollSnapshot {
        let counts = self.results();
        PollSnapshot {
            id: self.id.clone(),
            question: self.question.clone(),
            options: self
                .options
                .iter()
                .zip(counts)
                .map(|(text, vote_count)| PollOptionSnapshot {
                    text: text.clone(),
                    vote_count,
                })
                .collect(),
            is_active: self.is_active,
            created_at: self.created_at,
            expires_at: self.expires_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn poll(options: &[&str]) -> Poll {
        Poll::new(
            "Which one?".to_string(),
            options.iter().map(|s| s.to_string()).collect(),
            None,
            Utc::now(),
        )
        .unwrap()
    }

    #[test]
    fn rejects_too_few_options() {
        let err = Poll::new("Q".to_string(), vec!["only".to_string()], None, Utc::now());
        assert!(err.is_err());
    }

    #[test]
    fn rejects_blank_options_and_question() {
        // Blank options are dropped before the count check.
        let err = Poll::new(
            "Q".to_string(),
            vec!["a".to_string(), "   ".to_string()],
            None,
            Utc::now(),
        );
        assert!(err.is_err());

        let err = Poll::new("  ".to_string(), vec!["a".to_string(), "b".to_string()], None, Utc::now());
        assert!(err.is_err());
    }

    #[test]
    fn tallies_votes_per_option_index() {
        let mut p = poll(&["A", "B"]);
        let now = Utc::now();
        p.vote("u1", 0, now).unwrap();
        p.vote("u2", 0, now).unwrap();
        p.vote("u3", 1, now).unwrap();
        assert_eq!(p.results(), vec![2, 1]);
    }

    #[test]
    fn second_vote_by_same_user_rejected_and_tally_unchanged() {
        let mut p = poll(&["A", "B"]);
        let now = Utc::now();
        p.vote("u1", 0, now).unwrap();

        let err = p.vote("u1", 1, now).unwrap_err();
        assert_eq!(err.code(), "STATE_ERROR");
        assert_eq!(p.results(), vec![1, 0]);
    }

    #[test]
    fn out_of_range_option_rejected() {
        let mut p = poll(&["A", "B"]);
        let err = p.vote("u1", 2, Utc::now()).unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");
        assert_eq!(p.results(), vec![0, 0]);
    }

    #[test]
    fn votes_rejected_after_close() {
        let mut p = poll(&["A", "B"]);
        p.close();
        let err = p.vote("u1", 0, Utc::now()).unwrap_err();
        assert_eq!(err.code(), "STATE_ERROR");
    }

    #[test]
    fn expires_lazily_past_end_time() {
        let now = Utc::now();
        let mut p = Poll::new(
            "Q".to_string(),
            vec!["a".to_string(), "b".to_string()],
            Some(5),
            now,
        )
        .unwrap();

        let before = now + Duration::minutes(4);
        assert!(!p.expire_if_due(before));
        assert!(p.is_open(before));

        let after = now + Duration::minutes(6);
        assert!(p.expire_if_due(after));
        assert!(!p.is_open(after));
        // Only the first observation reports the transition.
        assert!(!p.expire_if_due(after));
    }

    #[test]
    fn snapshot_carries_tallies() {
        let mut p = poll(&["A", "B"]);
        p.vote("u1", 1, Utc::now()).unwrap();
        let snap = p.snapshot();
        assert_eq!(snap.options[0].vote_count, 0);
        assert_eq!(snap.options[1].vote_count, 1);
        assert!(snap.is_active);
    }
}
