use crate::artifacts::{
    load_tokenizer_from_json, load_wordpiece_from_vocab, resolve_source, save_tokenizer_json,
    ArtifactSource,
};
use crate::capability::TokenizerCapability;
use crate::config::Config;
use crate::errors::{Error, Result};
use crate::postprocessor::build_bert_processing;
use crate::pretokenizer::{build_decoder, build_normalizer, build_pre_tokenizer, clean_up_tokenization};
use crate::types::{DecodeOptions, EncodeOptions, SpecialTokens};
use crate::validate::{resolve_special_tokens, validate_config, validate_tokenizer};
use std::path::Path;
use tokenizers::{AddedToken, Tokenizer};

/// BERT-style WordPiece tokenizer with resolved reserved ids.
#[derive(Debug, Clone)]
pub struct WordPieceTokenizer {
    inner: Tokenizer,
    special: SpecialTokens,
}

impl WordPieceTokenizer {
    pub fn from_config(cfg: &Config) -> Result<Self> {
        validate_config(cfg)?;
        let names = &cfg.special_tokens;

        let mut inner = match resolve_source(cfg)? {
            ArtifactSource::TokenizerJson(path) => load_tokenizer_from_json(&path)?,
            ArtifactSource::VocabTxt(path) => {
                let model = load_wordpiece_from_vocab(&path, &names.unk)?;
                let mut tokenizer = Tokenizer::new(model);
                tokenizer.with_normalizer(Some(build_normalizer(cfg.lowercase)));
                tokenizer.with_pre_tokenizer(Some(build_pre_tokenizer()));
                tokenizer.with_decoder(Some(build_decoder()));
                tokenizer
            }
        };

        // Resolve against the vocabulary first so absent tokens are not silently added.
        let special = resolve_special_tokens(&inner, names)?;
        let added: Vec<AddedToken> = names
            .all()
            .iter()
            .map(|token| AddedToken::from(token.to_string(), true))
            .collect();
        inner.add_special_tokens(&added);

        if cfg.expects_vocab_file() {
            inner.with_post_processor(Some(build_bert_processing(names, &special)));
        }
        validate_tokenizer(&inner, &special)?;
        ensure_send_sync(&inner);

        log::info!(
            "tokenizer ready: vocab_size={} cls={} sep={} pad={} unk={}",
            inner.get_vocab_size(true),
            special.cls,
            special.sep,
            special.pad,
            special.unk
        );
        Ok(Self { inner, special })
    }

    /// Cased BERT vocabulary file.
    pub fn from_vocab_file(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_config(&Config::from_vocab(path.as_ref()))
    }

    pub fn from_tokenizer_json(path: impl AsRef<Path>) -> Result<Self> {
        let cfg = Config {
            vocab: None,
            tokenizer_json: Some(path.as_ref().to_path_buf()),
            ..Config::from_vocab("")
        };
        Self::from_config(&cfg)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        save_tokenizer_json(&self.inner, path.as_ref())
    }

    pub fn token_to_id(&self, token: &str) -> Option<u32> {
        self.inner.token_to_id(token)
    }

    pub fn inner(&self) -> &Tokenizer {
        &self.inner
    }
}

impl TokenizerCapability for WordPieceTokenizer {
    fn encode(&self, text: &str, options: &EncodeOptions) -> Result<Vec<u32>> {
        if options.pad_to_max_length && options.max_length.is_none() {
            return Err(Error::InvalidConfig("pad_to_max_length requires max_length"));
        }
        let encoding = self.inner.encode(text, options.add_special_tokens)?;
        let mut ids = encoding.get_ids().to_vec();

        if let (true, Some(max_length)) = (options.truncation, options.max_length) {
            if ids.len() > max_length {
                ids.truncate(max_length);
                // Keep the closing separator of a wrapped sequence.
                if options.add_special_tokens {
                    if let Some(last) = ids.last_mut() {
                        *last = self.special.sep;
                    }
                }
            }
        }
        if let (true, Some(max_length)) = (options.pad_to_max_length, options.max_length) {
            if ids.len() < max_length {
                ids.resize(max_length, self.special.pad);
            }
        }
        Ok(ids)
    }

    fn decode(&self, ids: &[u32], options: &DecodeOptions) -> Result<String> {
        let text = self.inner.decode(ids, options.skip_special_tokens)?;
        Ok(if options.clean_up_tokenization_spaces {
            clean_up_tokenization(&text)
        } else {
            text
        })
    }

    fn vocab_size(&self) -> usize {
        self.inner.get_vocab_size(true)
    }

    fn special(&self) -> SpecialTokens {
        self.special
    }

    fn id_to_token(&self, id: u32) -> Option<String> {
        self.inner.id_to_token(id)
    }
}

fn ensure_send_sync<T: Send + Sync>(_: &T) {}
