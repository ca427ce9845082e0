use crate::generation::{Turn, TurnStatus};

/// Picks the candidate with the highest length-normalised log-likelihood.
///
/// Completed turns win over incomplete ones; ties keep the earlier candidate.
pub fn best_candidate(candidates: Vec<Turn>) -> Option<Turn> {
    candidates.into_iter().fold(None, |best, candidate| match best {
        None => Some(candidate),
        Some(current) => {
            if outranks(&candidate, &current) {
                Some(candidate)
            } else {
                Some(current)
            }
        }
    })
}

fn outranks(candidate: &Turn, current: &Turn) -> bool {
    let complete = |turn: &Turn| turn.status == TurnStatus::Complete;
    match (complete(candidate), complete(current)) {
        (true, false) => true,
        (false, true) => false,
        _ => candidate.score() > current.score(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn turn(status: TurnStatus, log_likelihood: f32, scored_tokens: usize) -> Turn {
        Turn {
            tokens: vec![2; scored_tokens + 1],
            status,
            steps: scored_tokens,
            forced_continuations: 0,
            log_likelihood,
            scored_tokens,
        }
    }

    #[test]
    fn length_normalisation_favours_fluent_long_turns() {
        let short = turn(TurnStatus::Complete, -3.0, 2);
        let long = turn(TurnStatus::Complete, -10.0, 10);
        let best = best_candidate(vec![short, long.clone()]);
        assert_eq!(best, Some(long));
    }

    #[test]
    fn complete_turns_beat_incomplete_ones() {
        let incomplete = turn(TurnStatus::Incomplete, -1.0, 10);
        let complete = turn(TurnStatus::Complete, -20.0, 10);
        assert_eq!(
            best_candidate(vec![incomplete, complete.clone()]),
            Some(complete)
        );
    }

    #[test]
    fn ties_keep_the_first_candidate() {
        let first = turn(TurnStatus::Complete, -4.0, 4);
        let mut second = first.clone();
        second.steps = 99;
        assert_eq!(best_candidate(vec![first.clone(), second]), Some(first));
        assert_eq!(best_candidate(Vec::new()), None);
    }
}
