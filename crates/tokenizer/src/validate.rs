use crate::config::{Config, SpecialTokenNames};
use crate::errors::{Error, Result};
use crate::types::SpecialTokens;
use std::collections::HashSet;
use tokenizers::Tokenizer;

pub fn validate_config(cfg: &Config) -> Result<()> {
    if cfg.tokenizer_json.is_none() && cfg.vocab.is_none() {
        return Err(Error::InvalidConfig(
            "either tokenizer_json or vocab must be configured",
        ));
    }

    let mut seen = HashSet::new();
    for token in cfg.special_tokens.all() {
        if token.trim().is_empty() {
            return Err(Error::Validation("special token names must not be empty".into()));
        }
        if !seen.insert(token) {
            return Err(Error::Validation(format!(
                "special token '{token}' appears multiple times"
            )));
        }
    }
    Ok(())
}

/// Resolves the reserved ids, failing when any of them is absent from the vocabulary.
pub fn resolve_special_tokens(tok: &Tokenizer, names: &SpecialTokenNames) -> Result<SpecialTokens> {
    let lookup = |token: &str| {
        tok.token_to_id(token)
            .ok_or_else(|| Error::MissingSpecialToken(token.to_owned()))
    };
    let special = SpecialTokens {
        cls: lookup(&names.cls)?,
        sep: lookup(&names.sep)?,
        pad: lookup(&names.pad)?,
        unk: lookup(&names.unk)?,
    };

    let distinct: HashSet<u32> = [special.cls, special.sep, special.pad, special.unk]
        .into_iter()
        .collect();
    if distinct.len() != 4 {
        return Err(Error::Validation(format!(
            "special tokens must map to distinct ids, got {special:?}"
        )));
    }
    Ok(special)
}

pub fn validate_tokenizer(tok: &Tokenizer, special: &SpecialTokens) -> Result<()> {
    let actual_size = tok.get_vocab_size(true);
    for id in [special.cls, special.sep, special.pad, special.unk] {
        if id as usize >= actual_size {
            return Err(Error::Validation(format!(
                "special id {id} is outside the vocabulary of size {actual_size}"
            )));
        }
    }
    Ok(())
}
