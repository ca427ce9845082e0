use tokenizers::decoders::wordpiece::WordPiece as WordPieceDecoder;
use tokenizers::normalizers::bert::BertNormalizer;
use tokenizers::pre_tokenizers::bert::BertPreTokenizer;

/// Cleans control characters and isolates CJK ideographs; accents are stripped
/// only together with lowercasing.
pub fn build_normalizer(lowercase: bool) -> BertNormalizer {
    BertNormalizer::new(true, true, None, lowercase)
}

/// Splits on whitespace and punctuation.
pub fn build_pre_tokenizer() -> BertPreTokenizer {
    BertPreTokenizer
}

/// Joins `##` continuations; space clean-up is applied separately at decode time.
pub fn build_decoder() -> WordPieceDecoder {
    WordPieceDecoder::new("##".to_owned(), false)
}

/// Removes the spaces WordPiece decoding leaves before punctuation and contractions.
pub fn clean_up_tokenization(text: &str) -> String {
    const REPLACEMENTS: [(&str, &str); 10] = [
        (" .", "."),
        (" ?", "?"),
        (" !", "!"),
        (" ,", ","),
        (" ' ", "'"),
        (" n't", "n't"),
        (" 'm", "'m"),
        (" 's", "'s"),
        (" 've", "'ve"),
        (" 're", "'re"),
    ];
    REPLACEMENTS
        .iter()
        .fold(text.to_owned(), |acc, (from, to)| acc.replace(from, to))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_up_joins_punctuation() {
        // BERT pre-tokenization splits "isn't" into `isn ' t`.
        assert_eq!(
            clean_up_tokenization("hello , world . isn ' t it ?"),
            "hello, world. isn't it?"
        );
    }

    #[test]
    fn clean_up_only_joins_known_contractions() {
        assert_eq!(clean_up_tokenization("they 're sure it 's fine"), "they're sure it's fine");
        assert_eq!(clean_up_tokenization("isn 't"), "isn 't");
    }

    #[test]
    fn clean_up_leaves_plain_text() {
        assert_eq!(clean_up_tokenization("A : hi there"), "A : hi there");
    }
}
