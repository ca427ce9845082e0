use crate::types::SpecialTokens;
use crate::config::SpecialTokenNames;
use tokenizers::processors::bert::BertProcessing;

/// `[CLS] $A [SEP]` for single sequences.
pub fn build_bert_processing(names: &SpecialTokenNames, ids: &SpecialTokens) -> BertProcessing {
    BertProcessing::new((names.sep.clone(), ids.sep), (names.cls.clone(), ids.cls))
}
