//! Per-turn autoregressive decoding.
//!
//! A turn starts from a role preamble and grows by one sampled token per
//! step. `SEP` ends the turn only once the state is longer than `min_len`;
//! an earlier `SEP` is replaced by the continuation tokens (filler plus role
//! marker) and decoding goes on. The step cap and the state capacity both
//! bound a turn, and hitting either ends it as [`TurnStatus::Incomplete`].

use tokenizer::SpecialTokens;

use crate::error::{ChatError, Result};
use crate::sampling::{Sampler, SamplingStrategy};

/// Produces the logit vector for the next decoder position.
pub trait LogitSource {
    fn vocab_size(&self) -> usize;

    /// `source` is the unpadded context; `decoder` the tokens generated so far.
    fn next_token_logits(&self, source: &[u32], decoder: &[u32]) -> Result<Vec<f32>>;
}

impl<S: LogitSource + ?Sized> LogitSource for &S {
    fn vocab_size(&self) -> usize {
        (**self).vocab_size()
    }

    fn next_token_logits(&self, source: &[u32], decoder: &[u32]) -> Result<Vec<f32>> {
        (**self).next_token_logits(source, decoder)
    }
}

/// Append-only decoder tokens with a fixed, pre-reserved capacity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationState {
    tokens: Vec<u32>,
    capacity: usize,
}

impl GenerationState {
    pub fn new(preamble: &[u32], capacity: usize) -> Self {
        let mut tokens = Vec::with_capacity(capacity);
        tokens.extend(preamble.iter().copied().take(capacity));
        Self { tokens, capacity }
    }

    /// Returns `false` without appending when the state is full.
    pub fn push(&mut self, token: u32) -> bool {
        if self.is_full() {
            return false;
        }
        self.tokens.push(token);
        true
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.tokens.len() >= self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn tokens(&self) -> &[u32] {
        &self.tokens
    }

    pub fn into_tokens(self) -> Vec<u32> {
        self.tokens
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeState {
    Generating,
    ForceContinue,
    Complete,
}

/// Outcome of one decoding step given the current state length.
pub fn transition(state_len: usize, next_token: u32, sep: u32, min_len: usize) -> DecodeState {
    if next_token != sep {
        DecodeState::Generating
    } else if state_len > min_len {
        DecodeState::Complete
    } else {
        DecodeState::ForceContinue
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnStatus {
    Complete,
    Incomplete,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodingPolicy {
    /// `SEP` is accepted only when the state holds more than this many tokens.
    pub min_len: usize,
    pub max_steps: usize,
    /// Upper bound on the decoder state, normally `max_seq_len`.
    pub capacity: usize,
    /// Tokens every turn starts with (anchor and role marker).
    pub preamble: Vec<u32>,
    /// Tokens appended instead of a premature `SEP`.
    pub continuation: Vec<u32>,
}

impl DecodingPolicy {
    pub fn new(max_seq_len: usize, min_len: usize, preamble: Vec<u32>, continuation: Vec<u32>) -> Self {
        Self {
            min_len,
            max_steps: max_seq_len,
            capacity: max_seq_len,
            preamble,
            continuation,
        }
    }
}

/// A finished (or abandoned) turn, ready to be folded into the context.
#[derive(Debug, Clone, PartialEq)]
pub struct Turn {
    pub tokens: Vec<u32>,
    pub status: TurnStatus,
    pub steps: usize,
    pub forced_continuations: usize,
    /// Sum of log-probabilities of the accepted samples, including a final `SEP`.
    pub log_likelihood: f32,
    pub scored_tokens: usize,
}

impl Turn {
    /// Length-normalised log-likelihood.
    pub fn score(&self) -> f32 {
        if self.scored_tokens == 0 {
            f32::NEG_INFINITY
        } else {
            self.log_likelihood / self.scored_tokens as f32
        }
    }
}

pub struct TurnDecoder<'a, S: LogitSource + ?Sized> {
    source: &'a S,
    policy: &'a DecodingPolicy,
    special: SpecialTokens,
}

impl<'a, S: LogitSource + ?Sized> TurnDecoder<'a, S> {
    pub fn new(source: &'a S, policy: &'a DecodingPolicy, special: SpecialTokens) -> Self {
        Self {
            source,
            policy,
            special,
        }
    }

    /// Runs one turn. `strategy` overrides the sampler's own policy for this turn;
    /// `cancel` is polled before every step.
    pub fn decode(
        &self,
        context: &[u32],
        sampler: &mut Sampler,
        strategy: Option<&SamplingStrategy>,
        cancel: &dyn Fn() -> bool,
    ) -> Result<Turn> {
        let policy = self.policy;
        let mut state = GenerationState::new(&policy.preamble, policy.capacity);
        let mut status = TurnStatus::Incomplete;
        let mut steps = 0;
        let mut forced = 0;
        let mut log_likelihood = 0.0f32;
        let mut scored = 0;

        while steps < policy.max_steps {
            if cancel() {
                status = TurnStatus::Cancelled;
                break;
            }
            if state.is_full() {
                break;
            }

            let logits = self.source.next_token_logits(context, state.tokens())?;
            let expected = self.source.vocab_size();
            if logits.len() != expected {
                return Err(ChatError::LogitWidth {
                    expected,
                    actual: logits.len(),
                });
            }
            let sampled = match strategy {
                Some(strategy) => sampler.choose_with(strategy, &logits, self.special.pad)?,
                None => sampler.choose(&logits, self.special.pad)?,
            };
            steps += 1;

            match transition(state.len(), sampled.token, self.special.sep, policy.min_len) {
                DecodeState::Complete => {
                    log_likelihood += sampled.log_prob;
                    scored += 1;
                    status = TurnStatus::Complete;
                    break;
                }
                DecodeState::ForceContinue => {
                    forced += 1;
                    log::debug!(
                        "step {steps}: premature separator at length {}, continuing",
                        state.len()
                    );
                    for &token in &policy.continuation {
                        if !state.push(token) {
                            break;
                        }
                    }
                }
                DecodeState::Generating => {
                    log_likelihood += sampled.log_prob;
                    scored += 1;
                    state.push(sampled.token);
                    log::debug!("step {steps}: token {} (log_prob {:.3})", sampled.token, sampled.log_prob);
                }
            }
        }

        if status == TurnStatus::Incomplete {
            log::warn!(
                "turn reached its limit after {steps} steps without a separator ({} tokens)",
                state.len()
            );
        }
        Ok(Turn {
            tokens: state.into_tokens(),
            status,
            steps,
            forced_continuations: forced,
            log_likelihood,
            scored_tokens: scored,
        })
    }
}
