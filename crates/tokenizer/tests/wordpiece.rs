use std::fs;
use std::path::Path;

use anyhow::Result;
use tokenizer::{
    Config, DecodeOptions, EncodeOptions, Error, TokenizerCapability, WordPieceTokenizer,
};

const VOCAB: &[&str] = &[
    "[PAD]", "[UNK]", "[CLS]", "[SEP]", "A", "B", ":", "hello", "world", "hi", "there", ",", ".",
    "?", "how", "are", "you", "play", "##ing", "Hello",
];

fn write_vocab(dir: &Path, tokens: &[&str]) -> Result<std::path::PathBuf> {
    let path = dir.join("vocab.txt");
    fs::write(&path, tokens.join("\n") + "\n")?;
    Ok(path)
}

fn build() -> Result<(tempfile::TempDir, WordPieceTokenizer)> {
    let dir = tempfile::tempdir()?;
    let path = write_vocab(dir.path(), VOCAB)?;
    let tok = WordPieceTokenizer::from_vocab_file(path)?;
    Ok((dir, tok))
}

#[test]
fn reserved_ids_follow_vocab_order() -> Result<()> {
    let (_dir, tok) = build()?;
    let special = tok.special();
    assert_eq!((special.pad, special.unk, special.cls, special.sep), (0, 1, 2, 3));
    assert_eq!(tok.vocab_size(), VOCAB.len());
    Ok(())
}

#[test]
fn encode_wraps_with_cls_and_sep() -> Result<()> {
    let (_dir, tok) = build()?;
    let ids = tok.encode("hello world", &EncodeOptions::default())?;
    assert_eq!(ids, vec![2, 7, 8, 3]);

    let plain = tok.encode("A : hi", &EncodeOptions::plain())?;
    assert_eq!(plain, vec![4, 6, 9]);
    Ok(())
}

#[test]
fn tokenizer_is_cased_by_default() -> Result<()> {
    let (_dir, tok) = build()?;
    assert_eq!(tok.encode("Hello", &EncodeOptions::plain())?, vec![19]);
    assert_eq!(tok.encode("HELLO", &EncodeOptions::plain())?, vec![1]);
    Ok(())
}

#[test]
fn lowercase_option_normalises_input() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let mut cfg = Config::from_vocab(write_vocab(dir.path(), VOCAB)?);
    cfg.lowercase = true;
    let tok = WordPieceTokenizer::from_config(&cfg)?;
    assert_eq!(tok.encode("HELLO", &EncodeOptions::plain())?, vec![7]);
    Ok(())
}

#[test]
fn subwords_and_unknowns() -> Result<()> {
    let (_dir, tok) = build()?;
    assert_eq!(tok.encode("playing zebra", &EncodeOptions::plain())?, vec![17, 18, 1]);
    assert_eq!(
        tok.decode(&[17, 18], &DecodeOptions::default())?,
        "playing"
    );
    Ok(())
}

#[test]
fn bracketed_special_tokens_in_text_are_single_ids() -> Result<()> {
    let (_dir, tok) = build()?;
    let ids = tok.encode("[CLS] A : hi [SEP]", &EncodeOptions::plain())?;
    assert_eq!(ids, vec![2, 4, 6, 9, 3]);
    Ok(())
}

#[test]
fn decode_without_stripping_returns_the_same_ids() -> Result<()> {
    let (_dir, tok) = build()?;
    let ids = tok.encode("[CLS] hello, world. how are you?", &EncodeOptions::plain())?;
    let text = tok.decode(&ids, &DecodeOptions::default())?;
    assert_eq!(text, "[CLS] hello, world. how are you?");
    assert_eq!(tok.encode(&text, &EncodeOptions::plain())?, ids);
    Ok(())
}

#[test]
fn decode_can_skip_special_tokens_and_keep_spaces() -> Result<()> {
    let (_dir, tok) = build()?;
    let ids = [2, 5, 6, 7, 11, 8, 3];
    let skipped = tok.decode(&ids, &DecodeOptions::skipping_special())?;
    assert_eq!(skipped, "B : hello, world");

    let raw = tok.decode(
        &ids,
        &DecodeOptions {
            skip_special_tokens: false,
            clean_up_tokenization_spaces: false,
        },
    )?;
    assert_eq!(raw, "[CLS] B : hello , world [SEP]");
    Ok(())
}

#[test]
fn truncation_and_padding() -> Result<()> {
    let (_dir, tok) = build()?;
    let truncated = tok.encode(
        "hello world hi there",
        &EncodeOptions::default().with_max_length(4),
    )?;
    assert_eq!(truncated, vec![2, 7, 8, 3]);

    let padded = tok.encode("hi", &EncodeOptions::plain().with_max_length(4).padded())?;
    assert_eq!(padded, vec![9, 0, 0, 0]);

    let err = tok.encode(
        "hi",
        &EncodeOptions {
            pad_to_max_length: true,
            ..EncodeOptions::default()
        },
    );
    assert!(matches!(err, Err(Error::InvalidConfig(_))));
    Ok(())
}

#[test]
fn missing_reserved_token_is_rejected() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let without_pad: Vec<&str> = VOCAB.iter().copied().filter(|t| *t != "[PAD]").collect();
    let path = write_vocab(dir.path(), &without_pad)?;
    match WordPieceTokenizer::from_vocab_file(path) {
        Err(Error::MissingSpecialToken(name)) => assert_eq!(name, "[PAD]"),
        Err(other) => anyhow::bail!("unexpected error {other}"),
        Ok(_) => anyhow::bail!("a vocabulary without [PAD] must be rejected"),
    }
    Ok(())
}

#[test]
fn saved_tokenizer_json_reloads_identically() -> Result<()> {
    let (dir, tok) = build()?;
    let json = dir.path().join("out").join("tokenizer.json");
    tok.save(&json)?;

    let reloaded = WordPieceTokenizer::from_tokenizer_json(&json)?;
    assert_eq!(reloaded.special(), tok.special());
    let sample = "hello, world. how are you?";
    assert_eq!(
        reloaded.encode(sample, &EncodeOptions::default())?,
        tok.encode(sample, &EncodeOptions::default())?
    );
    Ok(())
}

#[test]
fn missing_vocab_file_is_reported() {
    let err = WordPieceTokenizer::from_vocab_file("/no/such/vocab.txt");
    assert!(matches!(err, Err(Error::Artifact { .. })));
}
