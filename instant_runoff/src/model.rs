// ********* Input data structures ***********

use std::collections::HashSet;
use std::error::Error;
use std::fmt::Display;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A poll: a prompt and an ordered list of choices.
///
/// Choices are referenced everywhere else by their index in this list. The
/// list is fixed at construction, so indices are stable for the lifetime of
/// the poll.
#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "PollDoc")]
pub struct Poll {
    poll_id: String,
    prompt: String,
    choices: Vec<String>,
}

// Wire shape for polls. The id is assigned on this side when the document
// does not carry one (a freshly submitted poll, as opposed to a stored one).
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PollDoc {
    #[serde(default)]
    poll_id: Option<String>,
    prompt: String,
    choices: Vec<String>,
}

impl From<PollDoc> for Poll {
    fn from(doc: PollDoc) -> Poll {
        Poll {
            poll_id: doc.poll_id.unwrap_or_else(fresh_id),
            prompt: doc.prompt,
            choices: doc.choices,
        }
    }
}

impl Poll {
    /// Validates the prompt and choices and assigns a fresh opaque id.
    pub fn new(prompt: &str, choices: &[String]) -> Result<Poll, VotingError> {
        Poll::with_id(fresh_id().as_str(), prompt, choices)
    }

    /// Re-hydrates a poll with a known id, for example one read back from
    /// storage. The same field validation applies.
    pub fn with_id(poll_id: &str, prompt: &str, choices: &[String]) -> Result<Poll, VotingError> {
        let poll = Poll {
            poll_id: poll_id.to_string(),
            prompt: prompt.to_string(),
            choices: choices.to_vec(),
        };
        poll.validate()?;
        Ok(poll)
    }

    /// Field validation. Deserialized polls are not validated on the way in
    /// and must go through this before being tabulated.
    pub fn validate(&self) -> Result<(), VotingError> {
        if self.prompt.is_empty() {
            return Err(VotingError::InvalidPoll("prompt cannot be empty".into()));
        }
        if self.choices.len() < 2 {
            return Err(VotingError::InvalidPoll(
                "there must be at least two choices".into(),
            ));
        }
        if self.choices.iter().any(|c| c.is_empty()) {
            return Err(VotingError::InvalidPoll(
                "none of the choices can be empty".into(),
            ));
        }
        let uniques: HashSet<&String> = self.choices.iter().collect();
        if uniques.len() != self.choices.len() {
            return Err(VotingError::InvalidPoll("choices must be unique".into()));
        }
        Ok(())
    }

    pub fn id(&self) -> &str {
        &self.poll_id
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn choices(&self) -> &[String] {
        &self.choices
    }
}

/// A single voter's ranked ballot for one poll.
///
/// `rank_order` is a permutation of `0..n-1` where `n` is the number of
/// choices in the poll: `rank_order[0]` is the first preference. Every choice
/// appears exactly once, which guarantees that a ballot always has a next
/// preference to fall back on during redistribution.
#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "BallotDoc")]
pub struct Ballot {
    poll_id: String,
    voter_id: String,
    rank_order: Vec<usize>,
}

// Wire shape for ballots. Anonymous submissions get a generated voter id.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct BallotDoc {
    poll_id: String,
    #[serde(default)]
    voter_id: Option<String>,
    rank_order: Vec<usize>,
}

impl From<BallotDoc> for Ballot {
    fn from(doc: BallotDoc) -> Ballot {
        Ballot {
            poll_id: doc.poll_id,
            voter_id: doc.voter_id.unwrap_or_else(fresh_id),
            rank_order: doc.rank_order,
        }
    }
}

impl Ballot {
    pub fn new(
        poll_id: &str,
        voter_id: &str,
        rank_order: &[usize],
    ) -> Result<Ballot, VotingError> {
        let ballot = Ballot {
            poll_id: poll_id.to_string(),
            voter_id: voter_id.to_string(),
            rank_order: rank_order.to_vec(),
        };
        ballot.validate()?;
        Ok(ballot)
    }

    /// Field validation. Deserialized ballots are not validated on the way in
    /// and must go through this before being tabulated.
    pub fn validate(&self) -> Result<(), VotingError> {
        if self.poll_id.is_empty() {
            return Err(VotingError::InvalidBallot("poll ID cannot be empty".into()));
        }
        if self.voter_id.is_empty() {
            return Err(VotingError::InvalidBallot(
                "voter ID cannot be empty".into(),
            ));
        }
        if self.rank_order.len() < 2 {
            return Err(VotingError::InvalidBallot(
                "there must be at least two rankings".into(),
            ));
        }
        // The permutation check sorts a private copy, never the field itself.
        let mut sorted = self.rank_order.clone();
        sorted.sort_unstable();
        if sorted.iter().enumerate().any(|(idx, &rank)| rank != idx) {
            return Err(VotingError::InvalidBallot("not a valid rank order".into()));
        }
        Ok(())
    }

    pub fn poll_id(&self) -> &str {
        &self.poll_id
    }

    pub fn voter_id(&self) -> &str {
        &self.voter_id
    }

    pub fn rank_order(&self) -> &[usize] {
        &self.rank_order
    }
}

fn fresh_id() -> String {
    Uuid::new_v4().to_string()
}

// ******** Output data structures *********

/// The external-facing payload for a concluded tabulation.
#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Outcome {
    pub prompt: String,
    pub total_votes: u64,
    pub winning_votes: u64,
    pub winning_choice: String,
    pub winning_round: u32,
}

/// Statistics for one round.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct RoundStats {
    /// 1-based round number.
    pub round: u32,
    /// Vote counts of the still-live choices at the start of the round.
    pub tally: Vec<(String, u64)>,
    /// The choice eliminated at the end of this round, if any.
    pub eliminated: Option<String>,
}

// ********* Configuration **********

/// Policy for resolving a fully symmetric last-place tie, where the
/// head-to-head count among the tied choices is itself an exact split.
///
/// This is the only nondeterministic branch of the tabulation, and only in
/// the sense that `Random` varies across seeds. A given seed always
/// reproduces the same elimination order.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum TieBreakMode {
    /// Eliminates the tied choice with the highest index.
    UseChoiceOrder,
    // Note: implemented with a cryptographic hash over the seed, round and
    // choice name instead of a stateful RNG, so runs are reproducible.
    Random(u64),
}

/// Errors that prevent a tabulation from concluding.
#[derive(Eq, PartialEq, Debug, Clone)]
pub enum VotingError {
    InvalidPoll(String),
    InvalidBallot(String),
    ResultNotComputed,
}

impl Error for VotingError {}

impl Display for VotingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VotingError::InvalidPoll(reason) => write!(f, "invalid poll: {}", reason),
            VotingError::InvalidBallot(reason) => write!(f, "invalid ballot: {}", reason),
            VotingError::ResultNotComputed => write!(f, "no conclusive result"),
        }
    }
}
