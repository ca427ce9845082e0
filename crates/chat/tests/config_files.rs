use std::fs;

use anyhow::Result;
use chat::{ChatConfig, ConfigError, SamplingStrategy};
use model::DecoderMode;

#[test]
fn toml_paths_resolve_against_the_config_directory() -> Result<()> {
    let dir = tempfile::tempdir()?;
    fs::write(dir.path().join("vocab.txt"), "[PAD]\n[UNK]\n[CLS]\n[SEP]\n")?;
    let path = dir.path().join("chat.toml");
    fs::write(
        &path,
        r#"
[model]
dim = 8
head_num = 2
max_seq_len = 16
decoder_mode = "cross_attention"

[tokenizer]
vocab = "vocab.txt"

[decoding]
min_len = 4
seed = 11
strategy = { kind = "sample_and_rank", n = 5 }
"#,
    )?;

    let config = ChatConfig::from_path(&path)?;
    assert_eq!(config.tokenizer.vocab, Some(dir.path().join("vocab.txt")));
    assert_eq!(config.model.decoder_mode, DecoderMode::CrossAttention);
    assert_eq!(
        config.decoding.strategy,
        SamplingStrategy::SampleAndRank {
            n: 5,
            temperature: 0.88
        }
    );
    config.ensure_files()?;
    Ok(())
}

#[test]
fn from_path_reads_json_and_applies_defaults() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("minimal.json");
    fs::write(&path, r#"{ "tokenizer": { "vocab": "vocab.txt" } }"#)?;

    let config = ChatConfig::from_path(&path)?;
    assert_eq!(config.model.dim, 2560);
    assert_eq!(config.model.max_seq_len, 128);
    assert_eq!(config.decoding.min_len, 15);
    assert_eq!(config.decoding.user_marker, "A :");
    assert_eq!(config.tokenizer.vocab, Some(dir.path().join("vocab.txt")));
    Ok(())
}

#[test]
fn json_config_with_overrides() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("chat.json");
    fs::write(
        &path,
        r#"{ "model": { "dim": 8, "head_num": 2, "max_seq_len": 16 },
             "tokenizer": { "vocab": "vocab.txt" },
             "decoding": { "min_len": 4 } }"#,
    )?;

    let config = ChatConfig::load(&path, &["decoding.seed=3", "presentation.segment_delay_ms=0"])?;
    assert_eq!(config.decoding.seed, Some(3));
    assert_eq!(config.presentation.segment_delay_ms, 0);
    Ok(())
}

#[test]
fn missing_files_are_reported_together() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("chat.toml");
    fs::write(
        &path,
        r#"
[model]
dim = 8
head_num = 2
max_seq_len = 16

[tokenizer]
vocab = "absent-vocab.txt"

[weights]
path = "absent.safetensors"

[decoding]
min_len = 4
"#,
    )?;
    let config = ChatConfig::from_path(&path)?;
    match config.ensure_files() {
        Err(ConfigError::MissingFiles(missing)) => assert_eq!(missing.len(), 2),
        other => anyhow::bail!("expected missing files, got {other:?}"),
    }
    Ok(())
}

#[test]
fn invalid_file_fails_validation_on_load() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("chat.toml");
    fs::write(
        &path,
        r#"
[model]
dim = 10
head_num = 4

[tokenizer]
"#,
    )?;
    match ChatConfig::from_path(&path) {
        Err(ConfigError::Validation(errors)) => {
            assert!(errors.iter().any(|e| e.contains("divisible")));
            assert!(errors.iter().any(|e| e.contains("tokenizer")));
        }
        other => anyhow::bail!("expected validation errors, got {other:?}"),
    }
    Ok(())
}
