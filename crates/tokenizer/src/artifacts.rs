use crate::config::Config;
use crate::errors::{Error, Result};
use std::path::{Path, PathBuf};
use tokenizers::models::wordpiece::WordPiece;
use tokenizers::Tokenizer;

const TOKENIZER_JSON_ERR: &str = "tokenizer json not found at";
const VOCAB_TXT_ERR: &str = "vocab txt not found at";
const NON_UTF8_PATH: &str = "path is not valid UTF-8:";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactSource {
    TokenizerJson(PathBuf),
    VocabTxt(PathBuf),
}

pub fn resolve_source(cfg: &Config) -> Result<ArtifactSource> {
    if let Some(json) = &cfg.tokenizer_json {
        return Ok(ArtifactSource::TokenizerJson(json.clone()));
    }
    cfg.vocab
        .clone()
        .map(ArtifactSource::VocabTxt)
        .ok_or(Error::InvalidConfig(
            "either tokenizer_json or vocab must be configured",
        ))
}

pub fn load_tokenizer_from_json(path: &Path) -> Result<Tokenizer> {
    ensure_file(path, TOKENIZER_JSON_ERR)?;
    Tokenizer::from_file(path).map_err(Error::from)
}

pub fn load_wordpiece_from_vocab(path: &Path, unk_token: &str) -> Result<WordPiece> {
    ensure_file(path, VOCAB_TXT_ERR)?;
    let vocab = path_to_string(path)?;
    WordPiece::from_file(&vocab)
        .unk_token(unk_token.to_owned())
        .build()
        .map_err(Error::from)
}

pub fn save_tokenizer_json(tok: &Tokenizer, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }
    }
    tok.save(path, false).map_err(Error::from)
}

fn ensure_file(path: &Path, reason: &'static str) -> Result<()> {
    if path.is_file() {
        Ok(())
    } else {
        Err(Error::artifact(reason, path))
    }
}

fn path_to_string(path: &Path) -> Result<String> {
    path.to_str()
        .map(str::to_owned)
        .ok_or_else(|| Error::artifact(NON_UTF8_PATH, path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenizer_json_takes_precedence() -> Result<()> {
        let mut cfg = Config::from_vocab("vocab.txt");
        cfg.tokenizer_json = Some(PathBuf::from("tokenizer.json"));
        assert_eq!(
            resolve_source(&cfg)?,
            ArtifactSource::TokenizerJson(PathBuf::from("tokenizer.json"))
        );
        Ok(())
    }

    #[test]
    fn missing_sources_are_rejected() {
        let mut cfg = Config::from_vocab("vocab.txt");
        cfg.vocab = None;
        assert!(matches!(resolve_source(&cfg), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn missing_file_is_an_artifact_error() {
        let err = load_wordpiece_from_vocab(Path::new("/definitely/not/here.txt"), "[UNK]");
        match err {
            Err(Error::Artifact { reason, path }) => {
                assert_eq!(reason, VOCAB_TXT_ERR);
                assert_eq!(path, Path::new("/definitely/not/here.txt"));
            }
            Err(other) => panic!("expected an artifact error, got {other}"),
            Ok(_) => panic!("a missing vocab file must not load"),
        }
    }
}
