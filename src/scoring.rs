//! # Answer decoding and SQuAD scoring
//!
//! Answers are rendered from token ids as the whitespace-joined tokens of an inclusive span
//! `start..=end` (empty when `start > end`). Predicted spans take the argmax of the start and end
//! log-probabilities. Predicted and gold answers are compared after SQuAD normalization:
//! lower-casing, removal of ASCII punctuation, removal of the articles `a`, `an`, `the` and
//! whitespace collapsing.
//!
//! ```
//! use rust_subjqa::scoring::{compute_f1, exact_match};
//!
//! assert_eq!(exact_match("The Eiffel Tower!", "eiffel tower"), 1.0);
//! assert_eq!(compute_f1("the cat sat", "a cat"), 2.0 / 3.0);
//! ```

use std::convert::TryFrom;
use crate::QaError;
use lazy_static::lazy_static;
use regex::Regex;
use rust_tokenizers::tokenizer::{BertTokenizer, Tokenizer};
use rust_tokenizers::vocab::{BertVocab, Vocab};
use std::collections::HashMap;
use tch::{Device, Kind, Tensor};

lazy_static! {
    static ref ARTICLES: Regex = Regex::new(r"\b(a|an|the)\b").unwrap();
}

/// Mapping from token ids to token strings
pub trait TokenLookup {
    fn token(&self, id: i64) -> String;
}

impl TokenLookup for BertVocab {
    fn token(&self, id: i64) -> String {
        self.id_to_token(&id)
    }
}

impl TokenLookup for BertTokenizer {
    fn token(&self, id: i64) -> String {
        self.vocab().id_to_token(&id)
    }
}

/// Whitespace-joined tokens of the inclusive span `start..=end`, clipped to the sequence.
pub fn decode_span<T: TokenLookup + ?Sized>(
    lookup: &T,
    input_ids: &[i64],
    start: i64,
    end: i64,
) -> String {
    if start > end || start < 0 || input_ids.is_empty() {
        return String::new();
    }
    let last = input_ids.len() - 1;
    let (start, end) = (start as usize, (end as usize).min(last));
    if start > last {
        return String::new();
    }
    input_ids[start..=end]
        .iter()
        .map(|&id| lookup.token(id))
        .collect::<Vec<String>>()
        .join(" ")
}

fn decode_batch<T: TokenLookup + ?Sized>(
    lookup: &T,
    input_ids: &Tensor,
    starts: &Tensor,
    ends: &Tensor,
) -> Result<Vec<String>, QaError> {
    let to_cpu = |tensor: &Tensor| tensor.to_kind(Kind::Int64).to_device(Device::Cpu);
    let input_ids = Vec::<Vec<i64>>::try_from(&to_cpu(input_ids))?;
    let starts = Vec::<i64>::try_from(&to_cpu(starts))?;
    let ends = Vec::<i64>::try_from(&to_cpu(ends))?;
    if starts.len() != input_ids.len() || ends.len() != input_ids.len() {
        return Err(QaError::ValueError(format!(
            "Got {} start and {} end positions for {} sequences",
            starts.len(),
            ends.len(),
            input_ids.len()
        )));
    }
    Ok(input_ids
        .iter()
        .zip(starts.iter().zip(ends.iter()))
        .map(|(ids, (&start, &end))| decode_span(lookup, ids, start, end))
        .collect())
}

/// Answers predicted by span logits of shape (*batch size*, *sequence_length*)
pub fn predicted_answers<T: TokenLookup + ?Sized>(
    lookup: &T,
    input_ids: &Tensor,
    start_logits: &Tensor,
    end_logits: &Tensor,
) -> Result<Vec<String>, QaError> {
    let starts = start_logits.detach().log_softmax(-1, Kind::Float).argmax(-1, false);
    let ends = end_logits.detach().log_softmax(-1, Kind::Float).argmax(-1, false);
    decode_batch(lookup, input_ids, &starts, &ends)
}

/// Answers delimited by gold positions of shape (*batch size*)
pub fn gold_answers<T: TokenLookup + ?Sized>(
    lookup: &T,
    input_ids: &Tensor,
    start_positions: &Tensor,
    end_positions: &Tensor,
) -> Result<Vec<String>, QaError> {
    decode_batch(lookup, input_ids, start_positions, end_positions)
}

/// SQuAD answer normalization
pub fn normalize_answer(text: &str) -> String {
    let lower = text.to_lowercase();
    let without_punctuation: String = lower
        .chars()
        .filter(|c| !c.is_ascii_punctuation())
        .collect();
    let without_articles = ARTICLES.replace_all(&without_punctuation, " ");
    without_articles
        .split_whitespace()
        .collect::<Vec<&str>>()
        .join(" ")
}

fn normalized_tokens(text: &str) -> Vec<String> {
    normalize_answer(text)
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

/// 1 if the normalized answers are identical, 0 otherwise
pub fn exact_match(gold: &str, prediction: &str) -> f64 {
    if normalize_answer(gold) == normalize_answer(prediction) {
        1.0
    } else {
        0.0
    }
}

/// Token-level F1 between two token sequences (multiset overlap).
/// Two empty sequences score 1, a single empty sequence scores 0.
pub fn token_f1<S: AsRef<str>>(gold_tokens: &[S], predicted_tokens: &[S]) -> f64 {
    if gold_tokens.is_empty() || predicted_tokens.is_empty() {
        return if gold_tokens.is_empty() && predicted_tokens.is_empty() {
            1.0
        } else {
            0.0
        };
    }

    let mut gold_counts: HashMap<&str, usize> = HashMap::new();
    for token in gold_tokens {
        *gold_counts.entry(token.as_ref()).or_insert(0) += 1;
    }
    let mut num_same = 0usize;
    for token in predicted_tokens {
        if let Some(count) = gold_counts.get_mut(token.as_ref()) {
            if *count > 0 {
                *count -= 1;
                num_same += 1;
            }
        }
    }
    if num_same == 0 {
        return 0.0;
    }

    let precision = num_same as f64 / predicted_tokens.len() as f64;
    let recall = num_same as f64 / gold_tokens.len() as f64;
    2.0 * precision * recall / (precision + recall)
}

/// Token F1 between the normalized answers
pub fn compute_f1(gold: &str, prediction: &str) -> f64 {
    token_f1(&normalized_tokens(gold), &normalized_tokens(prediction))
}

/// Sum of exact-match scores over aligned answers
pub fn exact_match_batch<S: AsRef<str>>(gold: &[S], predictions: &[S]) -> f64 {
    gold.iter()
        .zip(predictions.iter())
        .map(|(gold, prediction)| exact_match(gold.as_ref(), prediction.as_ref()))
        .sum()
}

/// Sum of F1 scores over aligned answers
pub fn f1_batch<S: AsRef<str>>(gold: &[S], predictions: &[S]) -> f64 {
    gold.iter()
        .zip(predictions.iter())
        .map(|(gold, prediction)| compute_f1(gold.as_ref(), prediction.as_ref()))
        .sum()
}
