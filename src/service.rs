use log::{info, warn};

use instant_runoff::{run_tabulation, Ballot, Poll, TieBreakMode, VotingError};
use snafu::{prelude::*, Snafu};

use std::fs;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Deserialize;
use text_diff::print_diff;
use uuid::Uuid;

use crate::args::Args;

#[derive(Debug, Snafu)]
pub enum ServiceError {
    #[snafu(display("Error opening file {path}"))]
    OpeningFile {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Error parsing JSON file {path}"))]
    ParsingJson {
        source: serde_json::Error,
        path: String,
    },
    #[snafu(display("{source}"))]
    BadPoll { source: VotingError },
    #[snafu(display("Ballot from voter {voter_id}: {source}"))]
    BadBallot {
        source: VotingError,
        voter_id: String,
    },
    #[snafu(display("{source}"))]
    NoResult { source: VotingError },
    #[snafu(display("Error writing outcome to {path}"))]
    WritingOutcome {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display(""))]
    RenderingOutcome { source: serde_json::Error },

    #[snafu(whatever, display("{message}"))]
    Whatever {
        message: String,
        #[snafu(source(from(Box<dyn std::error::Error>, Some)))]
        source: Option<Box<dyn std::error::Error>>,
    },
}

pub type ServiceResult<T> = Result<T, ServiceError>;

// The input document: one poll and its ballots.
#[derive(Debug, Clone, Deserialize)]
struct ElectionDoc {
    poll: Poll,
    ballots: Vec<BallotEntry>,
}

// One ballot in the election document. The poll id comes from the enclosing
// document; anonymous ballots get a generated voter id.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BallotEntry {
    #[serde(default)]
    voter_id: Option<String>,
    rank_order: Vec<usize>,
}

fn collect_ballots(poll: &Poll, entries: &[BallotEntry]) -> ServiceResult<Vec<Ballot>> {
    let num_choices = poll.choices().len();
    let mut ballots: Vec<Ballot> = Vec::with_capacity(entries.len());
    for entry in entries {
        let voter_id = entry
            .voter_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        if entry.rank_order.len() != num_choices {
            whatever!(
                "Ballot from voter {} ranks {} choices but the poll has {}",
                voter_id,
                entry.rank_order.len(),
                num_choices
            );
        }
        let ballot = Ballot::new(poll.id(), voter_id.as_str(), &entry.rank_order)
            .context(BadBallotSnafu {
                voter_id: voter_id.clone(),
            })?;
        ballots.push(ballot);
    }
    Ok(ballots)
}

fn clock_seed() -> u64 {
    match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(elapsed) => elapsed.as_nanos() as u64,
        Err(_) => 0,
    }
}

fn check_reference(path: &str, pretty_outcome: &str) -> ServiceResult<()> {
    let contents = fs::read_to_string(path).context(OpeningFileSnafu { path })?;
    let reference: serde_json::Value =
        serde_json::from_str(&contents).context(ParsingJsonSnafu { path })?;
    let pretty_reference =
        serde_json::to_string_pretty(&reference).context(RenderingOutcomeSnafu {})?;
    if pretty_reference != pretty_outcome {
        warn!("Found differences with the reference outcome");
        print_diff(pretty_reference.as_str(), pretty_outcome, "\n");
        whatever!("Difference detected between calculated outcome and reference outcome");
    }
    Ok(())
}

pub fn run(args: &Args) -> ServiceResult<()> {
    let contents = fs::read_to_string(&args.input).context(OpeningFileSnafu {
        path: args.input.clone(),
    })?;
    let doc: ElectionDoc = serde_json::from_str(&contents).context(ParsingJsonSnafu {
        path: args.input.clone(),
    })?;
    doc.poll.validate().context(BadPollSnafu {})?;
    let ballots = collect_ballots(&doc.poll, &doc.ballots)?;

    let seed = args.seed.unwrap_or_else(clock_seed);
    info!(
        "Tabulating {} ballots for poll {} with tie-break seed {}",
        ballots.len(),
        doc.poll.id(),
        seed
    );
    let tabulation = run_tabulation(&doc.poll, &ballots, TieBreakMode::Random(seed));
    for stats in tabulation.round_stats() {
        info!(
            "Round {}: tally {:?}, eliminated {:?}",
            stats.round, stats.tally, stats.eliminated
        );
    }
    let outcome = tabulation.outcome().context(NoResultSnafu {})?;

    let pretty_outcome =
        serde_json::to_string_pretty(&outcome).context(RenderingOutcomeSnafu {})?;
    match args.out.as_deref() {
        None | Some("stdout") => println!("{}", pretty_outcome),
        Some(path) => {
            fs::write(path, &pretty_outcome).context(WritingOutcomeSnafu { path })?;
        }
    }

    if let Some(reference_path) = &args.reference {
        check_reference(reference_path, &pretty_outcome)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = r#"{
        "poll": {"prompt": "What is the best fruit?", "choices": ["apple", "banana", "clementine"]},
        "ballots": [
            {"voterId": "voter1", "rankOrder": [1, 0, 2]},
            {"rankOrder": [2, 0, 1]},
            {"rankOrder": [2, 1, 0]}
        ]
    }"#;

    #[test]
    fn election_doc_parses_and_tabulates() {
        let doc: ElectionDoc = serde_json::from_str(DOC).unwrap();
        doc.poll.validate().unwrap();
        let ballots = collect_ballots(&doc.poll, &doc.ballots).unwrap();
        assert_eq!(ballots.len(), 3);
        // Named and anonymous voters both come through.
        assert_eq!(ballots[0].voter_id(), "voter1");
        assert!(!ballots[1].voter_id().is_empty());
        assert_ne!(ballots[1].voter_id(), ballots[2].voter_id());

        let outcome = run_tabulation(&doc.poll, &ballots, TieBreakMode::Random(0))
            .outcome()
            .unwrap();
        assert_eq!(outcome.winning_choice, "clementine");
        assert_eq!(outcome.total_votes, 3);
        assert_eq!(outcome.winning_votes, 2);
        assert_eq!(outcome.winning_round, 1);
    }

    #[test]
    fn ballot_with_wrong_rank_count_is_rejected() {
        let doc: ElectionDoc = serde_json::from_str(DOC).unwrap();
        let entries = vec![BallotEntry {
            voter_id: Some("voter1".to_string()),
            rank_order: vec![0, 1],
        }];
        let res = collect_ballots(&doc.poll, &entries);
        assert!(matches!(res, Err(ServiceError::Whatever { .. })));
    }

    #[test]
    fn invalid_rank_order_is_rejected() {
        let doc: ElectionDoc = serde_json::from_str(DOC).unwrap();
        let entries = vec![BallotEntry {
            voter_id: Some("voter1".to_string()),
            rank_order: vec![0, 0, 2],
        }];
        let res = collect_ballots(&doc.poll, &entries);
        assert!(matches!(res, Err(ServiceError::BadBallot { .. })));
    }
}
