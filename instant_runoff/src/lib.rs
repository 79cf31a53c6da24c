mod model;
use log::{debug, info, warn};

use std::collections::HashSet;

pub use crate::model::*;

// **** Private structures ****

type ChoiceIdx = usize;

// Per-choice vote tracking. An eliminated choice is distinct from a live
// choice that currently holds zero ballots.
#[derive(Eq, PartialEq, Debug, Clone)]
enum Bucket {
    Live(Vec<usize>),
    Eliminated,
}

impl Bucket {
    fn live_count(&self) -> Option<usize> {
        match self {
            Bucket::Live(ballot_ids) => Some(ballot_ids.len()),
            Bucket::Eliminated => None,
        }
    }
}

#[derive(Eq, PartialEq, Debug, Clone, Copy)]
struct Winner {
    choice: ChoiceIdx,
    votes: usize,
    round: u32,
}

/// The computed state of one poll's instant-runoff tabulation.
///
/// Built once by [run_tabulation] and immutable afterwards. The round-by-round
/// statistics are kept for observability; the external payload is produced by
/// [Tabulation::outcome].
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct Tabulation {
    prompt: String,
    choices: Vec<String>,
    total_votes: usize,
    winner: Option<Winner>,
    round_stats: Vec<RoundStats>,
}

/// Runs the instant-runoff rounds for the given poll and ballots.
///
/// Ballots whose poll id does not match are dropped before computation.
/// Callers should not rely on this filter for correctness, but foreign
/// ballots never make the tabulation fail. Each remaining ballot is expected
/// to have passed [Ballot::validate] against this poll's choice count.
///
/// The tabulation itself cannot fail: a run that does not conclude (for
/// example with zero ballots) is reported by [Tabulation::outcome].
pub fn run_tabulation(poll: &Poll, ballots: &[Ballot], tie_break: TieBreakMode) -> Tabulation {
    let considered: Vec<&Ballot> = ballots.iter().filter(|b| b.poll_id() == poll.id()).collect();
    let num_choices = poll.choices().len();
    let num_ballots = considered.len();
    info!(
        "run_tabulation: processing {:?} ballots ({:?} foreign dropped) over {:?} choices",
        num_ballots,
        ballots.len() - num_ballots,
        num_choices
    );
    for (idx, name) in poll.choices().iter().enumerate() {
        info!("Choice {}: {}", idx, name);
    }

    let mut tabulation = Tabulation {
        prompt: poll.prompt().to_string(),
        choices: poll.choices().to_vec(),
        total_votes: num_ballots,
        winner: None,
        round_stats: Vec::new(),
    };
    if num_ballots == 0 {
        warn!("run_tabulation: no ballots for poll {}, nothing to compute", poll.id());
        return tabulation;
    }

    // First-preference tally.
    let mut votes: Vec<Bucket> = vec![Bucket::Live(Vec::new()); num_choices];
    for (ballot_id, ballot) in considered.iter().enumerate() {
        let first = ballot.rank_order().first().copied();
        if let Some(Bucket::Live(bucket)) = first.and_then(|choice| votes.get_mut(choice)) {
            bucket.push(ballot_id);
        }
    }

    // One elimination per non-winning round, so the loop is bounded by the
    // number of choices.
    for round in 1..=num_choices as u32 {
        let tally: Vec<(ChoiceIdx, usize)> = votes
            .iter()
            .enumerate()
            .filter_map(|(choice, bucket)| bucket.live_count().map(|count| (choice, count)))
            .collect();
        info!(
            "Round {}: tally {:?}",
            round,
            tally
                .iter()
                .map(|&(choice, count)| (tabulation.choices[choice].as_str(), count))
                .collect::<Vec<_>>()
        );

        // Majority check: strictly more than half of all considered ballots.
        let majority = tally
            .iter()
            .find(|&&(_, count)| count as f64 / num_ballots as f64 > 0.5);
        if let Some(&(choice, count)) = majority {
            info!(
                "Round {}: {} wins with {}/{} votes",
                round, tabulation.choices[choice], count, num_ballots
            );
            tabulation.winner = Some(Winner {
                choice,
                votes: count,
                round,
            });
            tabulation
                .round_stats
                .push(round_stats(round, &tally, &tabulation.choices, None));
            return tabulation;
        }

        // Find last place among the live choices.
        let min_count = match tally.iter().map(|&(_, count)| count).min() {
            Some(x) => x,
            None => break,
        };
        let tied: Vec<ChoiceIdx> = tally
            .iter()
            .filter_map(|&(choice, count)| if count == min_count { Some(choice) } else { None })
            .collect();
        let loser = if tied.len() == 1 {
            tied[0]
        } else {
            break_last_place_tie(&considered, &tabulation.choices, &tied, tie_break, round)
        };
        info!("Round {}: {} eliminated", round, tabulation.choices[loser]);
        tabulation
            .round_stats
            .push(round_stats(round, &tally, &tabulation.choices, Some(loser)));

        // Eliminate the loser and redistribute its ballots to each voter's
        // highest-ranked still-live choice. The rank order is a total
        // permutation, so a live choice always exists while the poll has one.
        let freed = match std::mem::replace(&mut votes[loser], Bucket::Eliminated) {
            Bucket::Live(ballot_ids) => ballot_ids,
            Bucket::Eliminated => Vec::new(),
        };
        for ballot_id in freed {
            let next = considered[ballot_id]
                .rank_order()
                .iter()
                .copied()
                .find(|&choice| matches!(votes.get(choice), Some(Bucket::Live(_))));
            match next {
                Some(choice) => {
                    debug!(
                        "Round {}: ballot {} transfers to {}",
                        round, ballot_id, tabulation.choices[choice]
                    );
                    if let Some(Bucket::Live(bucket)) = votes.get_mut(choice) {
                        bucket.push(ballot_id);
                    }
                }
                None => {
                    // Only reachable with a malformed rank order.
                    warn!("Round {}: ballot {} has no live choice left", round, ballot_id);
                }
            }
        }
    }

    // A single surviving choice holds every ballot and passes the majority
    // check, so reaching this point is a defect rather than a normal end.
    warn!(
        "run_tabulation: no majority found after {} rounds for poll {}",
        tabulation.round_stats.len(),
        poll.id()
    );
    tabulation
}

impl Tabulation {
    /// Projects the computed state into the external payload.
    ///
    /// Fails with [VotingError::ResultNotComputed] when the rounds concluded
    /// without a majority winner.
    pub fn outcome(&self) -> Result<Outcome, VotingError> {
        let winner = self.winner.ok_or(VotingError::ResultNotComputed)?;
        Ok(Outcome {
            prompt: self.prompt.clone(),
            total_votes: self.total_votes as u64,
            winning_votes: winner.votes as u64,
            winning_choice: self.choices[winner.choice].clone(),
            winning_round: winner.round,
        })
    }

    /// The index of the winning choice in the poll's choice list.
    pub fn winner_index(&self) -> Option<usize> {
        self.winner.map(|w| w.choice)
    }

    /// The number of ballots considered, after foreign ballots are dropped.
    pub fn total_votes(&self) -> usize {
        self.total_votes
    }

    /// Round-by-round tallies, in round order.
    pub fn round_stats(&self) -> &[RoundStats] {
        &self.round_stats
    }
}

fn round_stats(
    round: u32,
    tally: &[(ChoiceIdx, usize)],
    choices: &[String],
    eliminated: Option<ChoiceIdx>,
) -> RoundStats {
    RoundStats {
        round,
        tally: tally
            .iter()
            .map(|&(choice, count)| (choices[choice].clone(), count as u64))
            .collect(),
        eliminated: eliminated.map(|choice| choices[choice].clone()),
    }
}

/// Picks the choice to eliminate among several tied for last place.
///
/// The secondary tally counts, for each tied choice, the ballots whose
/// highest-ranked choice *among the tied set* is that choice: the
/// head-to-head outcome of a hypothetical poll restricted to the tied
/// choices. A unique minimum loses. An exact split is resolved by the
/// tie-break mode, and anything in between recurses on the narrowed set.
fn break_last_place_tie(
    ballots: &[&Ballot],
    choices: &[String],
    tied: &[ChoiceIdx],
    tie_break: TieBreakMode,
    round: u32,
) -> ChoiceIdx {
    debug_assert!(tied.len() >= 2);
    let tied_set: HashSet<ChoiceIdx> = tied.iter().copied().collect();
    let mut secondary: Vec<(ChoiceIdx, usize)> = tied.iter().map(|&choice| (choice, 0)).collect();
    for ballot in ballots {
        let head = ballot
            .rank_order()
            .iter()
            .copied()
            .find(|choice| tied_set.contains(choice));
        if let Some(choice) = head {
            for entry in secondary.iter_mut() {
                if entry.0 == choice {
                    entry.1 += 1;
                }
            }
        }
    }
    debug!(
        "break_last_place_tie: round {} secondary tally {:?}",
        round,
        secondary
            .iter()
            .map(|&(choice, count)| (choices[choice].as_str(), count))
            .collect::<Vec<_>>()
    );

    let min_count = secondary.iter().map(|&(_, count)| count).min().unwrap_or(0);
    let narrowed: Vec<ChoiceIdx> = secondary
        .iter()
        .filter_map(|&(choice, count)| if count == min_count { Some(choice) } else { None })
        .collect();

    if narrowed.len() == 1 {
        return narrowed[0];
    }
    if narrowed.len() == tied.len() {
        // Fully symmetric: the sub-poll among the tied choices is itself an
        // exact split, so fall back to the configured policy.
        let loser = match tie_break {
            TieBreakMode::UseChoiceOrder => *narrowed.last().unwrap_or(&tied[0]),
            TieBreakMode::Random(seed) => hashed_pick(choices, &narrowed, seed, round),
        };
        debug!(
            "break_last_place_tie: symmetric split, {} picked by {:?}",
            choices[loser], tie_break
        );
        return loser;
    }
    // The tie narrowed but did not resolve. Each step strictly shrinks the
    // set, so the recursion terminates.
    break_last_place_tie(ballots, choices, &narrowed, tie_break, round)
}

// Orders the tied choices by a hash of (seed, round, name) and takes the
// smallest. Hard to predict without the seed, reproducible with it.
fn hashed_pick(choices: &[String], tied: &[ChoiceIdx], seed: u64, round: u32) -> ChoiceIdx {
    debug_assert!(!tied.is_empty());
    let mut keyed: Vec<(String, ChoiceIdx)> = tied
        .iter()
        .map(|&choice| {
            let key = sha256::digest(format!("{:016x}{:08x}{}", seed, round, choices[choice]));
            (key, choice)
        })
        .collect();
    keyed.sort();
    keyed[0].1
}
