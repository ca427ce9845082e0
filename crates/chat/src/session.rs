//! Multi-turn conversation over a [`LogitSource`] and a tokenizer.

use tokenizer::{DecodeOptions, EncodeOptions, SpecialTokens, TokenizerCapability};

use crate::config::DecodingSection;
use crate::context::ContextWindow;
use crate::error::{ConfigError, Result};
use crate::generation::{DecodingPolicy, LogitSource, Turn, TurnDecoder, TurnStatus};
use crate::rank::best_candidate;
use crate::sampling::{Sampler, SamplingStrategy};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOptions {
    pub user_marker: String,
    pub bot_marker: String,
    pub min_len: usize,
    pub rank_whole_utterances: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self::from(&DecodingSection::default())
    }
}

impl From<&DecodingSection> for SessionOptions {
    fn from(section: &DecodingSection) -> Self {
        Self {
            user_marker: section.user_marker.clone(),
            bot_marker: section.bot_marker.clone(),
            min_len: section.min_len,
            rank_whole_utterances: section.rank_whole_utterances,
        }
    }
}

/// One bot turn as presented to the user.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    /// Decoded reply without special tokens or the leading role marker.
    pub text: String,
    /// `text` split on embedded role markers.
    pub segments: Vec<String>,
    pub status: TurnStatus,
    pub tokens: Vec<u32>,
    pub steps: usize,
    pub forced_continuations: usize,
}

pub struct ChatSession<'a, S: LogitSource + ?Sized, T: TokenizerCapability + ?Sized> {
    source: &'a S,
    tokenizer: &'a T,
    special: SpecialTokens,
    context: ContextWindow,
    sampler: Sampler,
    policy: DecodingPolicy,
    options: SessionOptions,
}

impl<'a, S: LogitSource + ?Sized, T: TokenizerCapability + ?Sized> ChatSession<'a, S, T> {
    pub fn new(
        source: &'a S,
        tokenizer: &'a T,
        sampler: Sampler,
        options: SessionOptions,
        max_seq_len: usize,
    ) -> Result<Self> {
        let special = tokenizer.special();
        let marker = tokenizer.encode(&options.bot_marker, &EncodeOptions::plain())?;
        if marker.is_empty() {
            return Err(ConfigError::Validation(vec![format!(
                "bot marker '{}' encodes to no tokens",
                options.bot_marker
            )])
            .into());
        }

        let mut preamble = Vec::with_capacity(marker.len() + 1);
        preamble.push(special.cls);
        preamble.extend_from_slice(&marker);
        let mut continuation = Vec::with_capacity(marker.len() + 1);
        continuation.push(special.unk);
        continuation.extend_from_slice(&marker);

        let policy = DecodingPolicy::new(max_seq_len, options.min_len, preamble, continuation);
        let context = ContextWindow::new(special, max_seq_len)?;
        Ok(Self {
            source,
            tokenizer,
            special,
            context,
            sampler,
            policy,
            options,
        })
    }

    pub fn context(&self) -> &ContextWindow {
        &self.context
    }

    pub fn policy(&self) -> &DecodingPolicy {
        &self.policy
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    /// Drops the history, keeping only the anchor.
    pub fn reset(&mut self) {
        self.context.reset();
        log::debug!("chat session reset");
    }

    /// Folds `"{user_marker} {text}"` into the context.
    pub fn push_user_turn(&mut self, text: &str) -> Result<()> {
        let line = format!("{} {}", self.options.user_marker, text.trim());
        let options = EncodeOptions::plain().with_max_length(self.context.max_seq_len());
        let ids = self.tokenizer.encode(&line, &options)?;

        let mut turn = Vec::with_capacity(ids.len() + 1);
        turn.push(self.special.cls);
        turn.extend(ids);
        self.context.fold(&turn);
        Ok(())
    }

    /// Generates and folds one bot turn.
    pub fn generate_reply(&mut self, cancel: &dyn Fn() -> bool) -> Result<Reply> {
        let (turn, cancelled) = match self.sampler.strategy() {
            SamplingStrategy::SampleAndRank { n, temperature } if self.options.rank_whole_utterances => {
                self.ranked_turn(n, temperature, cancel)?
            }
            _ => {
                let decoder = TurnDecoder::new(self.source, &self.policy, self.special);
                let turn = decoder.decode(self.context.tokens(), &mut self.sampler, None, cancel)?;
                let cancelled = turn.status == TurnStatus::Cancelled;
                (turn, cancelled)
            }
        };

        self.context.fold(&turn.tokens);

        let decoded = self
            .tokenizer
            .decode(&turn.tokens, &DecodeOptions::skipping_special())?;
        let text = strip_marker(&decoded, &self.options.bot_marker).to_string();
        let segments = split_segments(&text, &self.options.bot_marker);
        Ok(Reply {
            text,
            segments,
            status: if cancelled {
                TurnStatus::Cancelled
            } else {
                turn.status
            },
            tokens: turn.tokens,
            steps: turn.steps,
            forced_continuations: turn.forced_continuations,
        })
    }

    /// Folds the user line, then generates the reply.
    pub fn respond(&mut self, text: &str, cancel: &dyn Fn() -> bool) -> Result<Reply> {
        self.push_user_turn(text)?;
        self.generate_reply(cancel)
    }

    fn ranked_turn(
        &mut self,
        n: usize,
        temperature: f32,
        cancel: &dyn Fn() -> bool,
    ) -> Result<(Turn, bool)> {
        // Candidates are plain temperature samples; ranking does the selection.
        let candidate_strategy = SamplingStrategy::TopP { p: 1.0, temperature };
        let decoder = TurnDecoder::new(self.source, &self.policy, self.special);
        let mut candidates = Vec::with_capacity(n);
        let mut cancelled = false;
        for index in 0..n {
            let turn = decoder.decode(
                self.context.tokens(),
                &mut self.sampler,
                Some(&candidate_strategy),
                cancel,
            )?;
            log::debug!(
                "candidate {index}: {:?} score {:.3} over {} tokens",
                turn.status,
                turn.score(),
                turn.scored_tokens
            );
            cancelled = turn.status == TurnStatus::Cancelled;
            candidates.push(turn);
            if cancelled {
                break;
            }
        }
        let best = best_candidate(candidates).unwrap_or_else(|| Turn {
            tokens: self.policy.preamble.clone(),
            status: TurnStatus::Cancelled,
            steps: 0,
            forced_continuations: 0,
            log_likelihood: 0.0,
            scored_tokens: 0,
        });
        Ok((best, cancelled))
    }
}

fn strip_marker<'t>(text: &'t str, marker: &str) -> &'t str {
    let trimmed = text.trim_start();
    trimmed.strip_prefix(marker).unwrap_or(trimmed).trim()
}

/// Splits a reply on embedded role markers, dropping empty pieces.
pub fn split_segments(text: &str, marker: &str) -> Vec<String> {
    text.split(marker)
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .map(str::to_owned)
        .collect()
}
