//! Token-choice policies over one position's logit vector.
//!
//! Every policy works on temperature-scaled log-probabilities with the padding
//! id removed from the support, so padding can never be emitted. The reported
//! [`Sampled::log_prob`] is always taken from the full (unfiltered) scaled
//! distribution, which makes scores comparable across policies when ranking
//! whole candidate turns.

use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::error::SamplingError;

pub const DEFAULT_TOP_K: usize = 50;
pub const DEFAULT_TOP_P: f32 = 0.9;
pub const DEFAULT_RANK_CANDIDATES: usize = 20;
pub const DEFAULT_RANK_TEMPERATURE: f32 = 0.88;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SamplingStrategy {
    /// Sample among the `k` highest-scoring tokens.
    TopK {
        #[serde(default = "default_top_k")]
        k: usize,
        #[serde(default = "default_temperature")]
        temperature: f32,
    },
    /// Nucleus sampling over the smallest prefix whose mass exceeds `p`.
    TopP {
        #[serde(default = "default_top_p")]
        p: f32,
        #[serde(default = "default_temperature")]
        temperature: f32,
    },
    /// Draw `n` candidates at `temperature` and keep the most likely one.
    SampleAndRank {
        #[serde(default = "default_rank_candidates")]
        n: usize,
        #[serde(default = "default_rank_temperature")]
        temperature: f32,
    },
}

impl Default for SamplingStrategy {
    fn default() -> Self {
        Self::TopP {
            p: DEFAULT_TOP_P,
            temperature: default_temperature(),
        }
    }
}

fn default_top_k() -> usize {
    DEFAULT_TOP_K
}

fn default_top_p() -> f32 {
    DEFAULT_TOP_P
}

fn default_temperature() -> f32 {
    1.0
}

fn default_rank_candidates() -> usize {
    DEFAULT_RANK_CANDIDATES
}

fn default_rank_temperature() -> f32 {
    DEFAULT_RANK_TEMPERATURE
}

/// A chosen token and its log-probability under the scaled distribution.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sampled {
    pub token: u32,
    pub log_prob: f32,
}

impl SamplingStrategy {
    pub fn temperature(&self) -> f32 {
        match *self {
            Self::TopK { temperature, .. }
            | Self::TopP { temperature, .. }
            | Self::SampleAndRank { temperature, .. } => temperature,
        }
    }

    pub fn validate(&self) -> Result<(), SamplingError> {
        let temperature = self.temperature();
        if !(temperature.is_finite() && temperature > 0.0) {
            return Err(SamplingError::InvalidParameter(format!(
                "temperature must be positive and finite, got {temperature}"
            )));
        }
        match *self {
            Self::TopK { k: 0, .. } => Err(SamplingError::InvalidParameter(
                "top-k requires k >= 1".into(),
            )),
            Self::TopP { p, .. } if !(p > 0.0 && p <= 1.0) => Err(
                SamplingError::InvalidParameter(format!("top-p requires p in (0, 1], got {p}")),
            ),
            Self::SampleAndRank { n: 0, .. } => Err(SamplingError::InvalidParameter(
                "sample-and-rank requires n >= 1".into(),
            )),
            _ => Ok(()),
        }
    }

    /// Chooses the next token, never returning `pad_id`.
    pub fn choose<R: Rng + ?Sized>(
        &self,
        logits: &[f32],
        pad_id: u32,
        rng: &mut R,
    ) -> Result<Sampled, SamplingError> {
        self.validate()?;
        let log_probs = scaled_log_probs(logits, self.temperature(), pad_id)?;
        match *self {
            Self::TopK { k, .. } => {
                let ranked = ranked_candidates(&log_probs);
                let keep = k.min(ranked.len());
                sample_from(&ranked[..keep], rng)
            }
            Self::TopP { p, .. } => {
                let ranked = ranked_candidates(&log_probs);
                let keep = nucleus_len(&ranked, p);
                sample_from(&ranked[..keep], rng)
            }
            Self::SampleAndRank { n, .. } => {
                let ranked = ranked_candidates(&log_probs);
                let mut best: Option<Sampled> = None;
                for _ in 0..n {
                    let draw = sample_from(&ranked, rng)?;
                    best = match best {
                        Some(current) if current.log_prob >= draw.log_prob => Some(current),
                        _ => Some(draw),
                    };
                }
                best.ok_or(SamplingError::NoCandidates)
            }
        }
    }
}

/// Log-softmax of `logits / temperature` with padding and non-finite entries removed.
pub fn scaled_log_probs(
    logits: &[f32],
    temperature: f32,
    pad_id: u32,
) -> Result<Vec<f32>, SamplingError> {
    if logits.is_empty() {
        return Err(SamplingError::EmptyLogits);
    }
    let scaled: Vec<f32> = logits
        .iter()
        .enumerate()
        .map(|(id, &logit)| {
            if id as u32 == pad_id || logit.is_nan() {
                f32::NEG_INFINITY
            } else {
                logit / temperature
            }
        })
        .collect();

    let max = scaled
        .iter()
        .copied()
        .filter(|value| value.is_finite())
        .fold(f32::NEG_INFINITY, f32::max);
    if !max.is_finite() {
        return Err(SamplingError::NoCandidates);
    }
    let sum: f32 = scaled.iter().map(|value| (value - max).exp()).sum();
    let log_z = max + sum.ln();
    Ok(scaled.into_iter().map(|value| value - log_z).collect())
}

/// Finite-probability tokens, most likely first (ties by lower id).
fn ranked_candidates(log_probs: &[f32]) -> Vec<(u32, f32)> {
    let mut ranked: Vec<(u32, f32)> = log_probs
        .iter()
        .enumerate()
        .filter(|(_, value)| value.is_finite())
        .map(|(id, &value)| (id as u32, value))
        .collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
    ranked
}

/// Length of the prefix whose cumulative probability first exceeds `p`.
fn nucleus_len(ranked: &[(u32, f32)], p: f32) -> usize {
    let mut cumulative = 0.0f32;
    for (index, (_, log_prob)) in ranked.iter().enumerate() {
        cumulative += log_prob.exp();
        if cumulative > p {
            return index + 1;
        }
    }
    ranked.len()
}

fn sample_from<R: Rng + ?Sized>(
    candidates: &[(u32, f32)],
    rng: &mut R,
) -> Result<Sampled, SamplingError> {
    let (&(first_token, first_log_prob), rest) =
        candidates.split_first().ok_or(SamplingError::NoCandidates)?;
    if rest.is_empty() {
        return Ok(Sampled {
            token: first_token,
            log_prob: first_log_prob,
        });
    }
    // Candidates are sorted, so the first one carries the largest weight.
    let weights: Vec<f32> = candidates
        .iter()
        .map(|(_, log_prob)| (log_prob - first_log_prob).exp())
        .collect();
    let dist = WeightedIndex::new(&weights).map_err(|_| SamplingError::NoCandidates)?;
    let (token, log_prob) = candidates[dist.sample(rng)];
    Ok(Sampled { token, log_prob })
}

/// A strategy paired with its own random source.
#[derive(Debug, Clone)]
pub struct Sampler {
    strategy: SamplingStrategy,
    rng: StdRng,
}

impl Sampler {
    pub fn new(strategy: SamplingStrategy, seed: Option<u64>) -> Result<Self, SamplingError> {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self::from_rng(strategy, rng)
    }

    pub fn from_rng(strategy: SamplingStrategy, rng: StdRng) -> Result<Self, SamplingError> {
        strategy.validate()?;
        Ok(Self { strategy, rng })
    }

    pub fn strategy(&self) -> SamplingStrategy {
        self.strategy
    }

    pub fn choose(&mut self, logits: &[f32], pad_id: u32) -> Result<Sampled, SamplingError> {
        self.strategy.choose(logits, pad_id, &mut self.rng)
    }

    /// Uses `strategy` for one draw while sharing this sampler's random stream.
    pub fn choose_with(
        &mut self,
        strategy: &SamplingStrategy,
        logits: &[f32],
        pad_id: u32,
    ) -> Result<Sampled, SamplingError> {
        strategy.choose(logits, pad_id, &mut self.rng)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAD: u32 = 0;

    fn rng(seed: u64) -> StdRng {
        StdRng::seed_from_u64(seed)
    }

    #[test]
    fn top_k_one_is_argmax_for_any_seed() -> Result<(), SamplingError> {
        let logits = [9.0, 0.5, 3.0, 2.9, -1.0];
        let strategy = SamplingStrategy::TopK {
            k: 1,
            temperature: 1.0,
        };
        for seed in 0..32 {
            assert_eq!(strategy.choose(&logits, PAD, &mut rng(seed))?.token, 2);
        }
        Ok(())
    }

    #[test]
    fn padding_is_never_sampled() -> Result<(), SamplingError> {
        let logits = [50.0, 1.0, 1.0, 1.0];
        let strategies = [
            SamplingStrategy::TopK {
                k: 4,
                temperature: 1.0,
            },
            SamplingStrategy::TopP {
                p: 0.99,
                temperature: 1.0,
            },
            SamplingStrategy::SampleAndRank {
                n: 5,
                temperature: 0.88,
            },
        ];
        let mut source = rng(7);
        for strategy in &strategies {
            for _ in 0..200 {
                assert_ne!(strategy.choose(&logits, PAD, &mut source)?.token, PAD);
            }
        }
        Ok(())
    }

    #[test]
    fn top_k_stays_inside_the_k_best() -> Result<(), SamplingError> {
        let logits = [0.0, 5.0, 4.9, -3.0, -3.0, 4.8];
        let strategy = SamplingStrategy::TopK {
            k: 3,
            temperature: 1.0,
        };
        let mut source = rng(11);
        for _ in 0..300 {
            let token = strategy.choose(&logits, PAD, &mut source)?.token;
            assert!([1, 2, 5].contains(&token), "token {token}");
        }
        Ok(())
    }

    #[test]
    fn top_p_includes_the_token_that_crosses_the_threshold() {
        let ranked = vec![(1, 0.5f32.ln()), (2, 0.3f32.ln()), (3, 0.2f32.ln())];
        assert_eq!(nucleus_len(&ranked, 0.4), 1);
        assert_eq!(nucleus_len(&ranked, 0.5), 2);
        assert_eq!(nucleus_len(&ranked, 0.9), 3);
        assert_eq!(nucleus_len(&ranked, 1.0), 3);
    }

    #[test]
    fn top_p_with_a_dominant_token_is_deterministic() -> Result<(), SamplingError> {
        // Token 3 holds about 0.95 of the mass.
        let logits = [0.0, 0.0, 0.0, 4.0, 0.0];
        let strategy = SamplingStrategy::TopP {
            p: 0.9,
            temperature: 1.0,
        };
        let mut source = rng(3);
        for _ in 0..100 {
            assert_eq!(strategy.choose(&logits, PAD, &mut source)?.token, 3);
        }
        Ok(())
    }

    #[test]
    fn top_p_sampling_follows_the_distribution() -> Result<(), SamplingError> {
        let logits = [0.0, 0.0, 0.0, 0.0];
        let strategy = SamplingStrategy::TopP {
            p: 1.0,
            temperature: 1.0,
        };
        let mut counts = [0usize; 4];
        let mut source = rng(5);
        for _ in 0..3000 {
            counts[strategy.choose(&logits, PAD, &mut source)?.token as usize] += 1;
        }
        assert_eq!(counts[0], 0);
        for count in &counts[1..] {
            assert!((800..1200).contains(count), "counts {counts:?}");
        }
        Ok(())
    }

    #[test]
    fn sample_and_rank_prefers_likely_tokens() -> Result<(), SamplingError> {
        let logits = [0.0, 3.0, 1.0, 1.0, 1.0];
        let strategy = SamplingStrategy::SampleAndRank {
            n: 20,
            temperature: 0.88,
        };
        let mut source = rng(13);
        let hits = (0..200)
            .filter_map(|_| strategy.choose(&logits, PAD, &mut source).ok())
            .filter(|sampled| sampled.token == 1)
            .count();
        assert!(hits > 190, "hits {hits}");
        Ok(())
    }

    #[test]
    fn log_prob_is_reported_under_the_scaled_distribution() -> Result<(), SamplingError> {
        let logits = [0.0, 2.0, 2.0];
        let sampled = SamplingStrategy::TopK {
            k: 1,
            temperature: 1.0,
        }
        .choose(&logits, PAD, &mut rng(0))?;
        assert_eq!(sampled.token, 1);
        assert!((sampled.log_prob - 0.5f32.ln()).abs() < 1e-5);
        Ok(())
    }

    #[test]
    fn same_seed_gives_same_sequence() -> Result<(), SamplingError> {
        let logits = [0.0, 1.0, 1.1, 0.9, 1.05];
        let mut a = Sampler::new(SamplingStrategy::default(), Some(42))?;
        let mut b = Sampler::new(SamplingStrategy::default(), Some(42))?;
        for _ in 0..50 {
            assert_eq!(a.choose(&logits, PAD)?, b.choose(&logits, PAD)?);
        }
        Ok(())
    }

    #[test]
    fn invalid_parameters_are_rejected() {
        let bad = [
            SamplingStrategy::TopK {
                k: 0,
                temperature: 1.0,
            },
            SamplingStrategy::TopP {
                p: 0.0,
                temperature: 1.0,
            },
            SamplingStrategy::TopP {
                p: 1.5,
                temperature: 1.0,
            },
            SamplingStrategy::SampleAndRank {
                n: 0,
                temperature: 1.0,
            },
            SamplingStrategy::TopK {
                k: 3,
                temperature: 0.0,
            },
        ];
        for strategy in bad {
            assert!(matches!(
                strategy.validate(),
                Err(SamplingError::InvalidParameter(_))
            ));
        }
    }

    #[test]
    fn degenerate_logits_are_errors() {
        let mut source = rng(1);
        let strategy = SamplingStrategy::default();
        assert_eq!(
            strategy.choose(&[], PAD, &mut source),
            Err(SamplingError::EmptyLogits)
        );
        assert_eq!(
            strategy.choose(&[1.0], PAD, &mut source),
            Err(SamplingError::NoCandidates)
        );
        assert_eq!(
            strategy.choose(&[1.0, f32::NAN], PAD, &mut source),
            Err(SamplingError::NoCandidates)
        );
    }

    #[test]
    fn strategy_deserializes_with_defaults() -> Result<(), serde_json::Error> {
        let parsed: SamplingStrategy = serde_json::from_str(r#"{"kind":"sample_and_rank"}"#)?;
        assert_eq!(
            parsed,
            SamplingStrategy::SampleAndRank {
                n: 20,
                temperature: 0.88
            }
        );
        let parsed: SamplingStrategy = serde_json::from_str(r#"{"kind":"top_k","k":1}"#)?;
        assert_eq!(
            parsed,
            SamplingStrategy::TopK {
                k: 1,
                temperature: 1.0
            }
        );
        Ok(())
    }
}
