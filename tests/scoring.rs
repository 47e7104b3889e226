extern crate anyhow;

use rust_subjqa::scoring::{
    compute_f1, decode_span, exact_match, exact_match_batch, f1_batch, gold_answers,
    normalize_answer, predicted_answers, token_f1, TokenLookup,
};
use tch::Tensor;

struct TokenList(Vec<&'static str>);

impl TokenLookup for TokenList {
    fn token(&self, id: i64) -> String {
        self.0
            .get(id as usize)
            .map(|token| token.to_string())
            .unwrap_or_else(|| "[UNK]".to_string())
    }
}

fn tokens() -> TokenList {
    TokenList(vec![
        "[PAD]", "[CLS]", "[SEP]", "where", "is", "the", "tower", "eiffel", "in", "paris", "?",
    ])
}

#[test]
fn squad_normalization() {
    assert_eq!(normalize_answer("The Eiffel  Tower!"), "eiffel tower");
    assert_eq!(normalize_answer("an apple, a pear"), "apple pear");
    assert_eq!(normalize_answer("  Theatre  "), "theatre");
    assert_eq!(normalize_answer("A.B.C."), "abc");
    assert_eq!(normalize_answer(""), "");
}

#[test]
fn exact_match_after_normalization() {
    assert_eq!(exact_match("The Eiffel Tower", "eiffel tower."), 1.0);
    assert_eq!(exact_match("Paris", "in Paris"), 0.0);
    assert_eq!(exact_match("", "the"), 1.0);
}

#[test]
fn token_f1_on_raw_tokens() {
    let f1 = token_f1(&["a", "b", "c"], &["b", "c", "d"]);
    assert!((f1 - 2.0 / 3.0).abs() < 1e-12);

    let f1 = token_f1(&["a", "a", "b"], &["a", "b", "b"]);
    assert!((f1 - 2.0 / 3.0).abs() < 1e-12);

    assert_eq!(token_f1(&["x"], &["y"]), 0.0);
}

#[test]
fn token_f1_empty_answers() {
    let empty: [&str; 0] = [];
    assert_eq!(token_f1(&empty, &empty), 1.0);
    assert_eq!(token_f1(&empty, &["a"]), 0.0);
    assert_eq!(token_f1(&["a"], &empty), 0.0);

    assert_eq!(compute_f1("the", "a"), 1.0);
    assert_eq!(compute_f1("", "paris"), 0.0);
}

#[test]
fn f1_on_normalized_answers() {
    let f1 = compute_f1("the Eiffel Tower in Paris", "Eiffel tower");
    let expected = 2.0 * (1.0 * 0.5) / 1.5;
    assert!((f1 - expected).abs() < 1e-12);
}

#[test]
fn batch_scores_are_summed() {
    let gold = vec!["eiffel tower".to_string(), "paris".to_string()];
    let predictions = vec!["the eiffel tower".to_string(), "france".to_string()];
    assert_eq!(exact_match_batch(&gold, &predictions), 1.0);
    assert_eq!(f1_batch(&gold, &predictions), 1.0);
}

#[test]
fn span_decoding_is_inclusive() {
    let lookup = tokens();
    let input_ids = [1, 3, 4, 5, 7, 6, 10, 2];
    assert_eq!(decode_span(&lookup, &input_ids, 3, 5), "the eiffel tower");
    assert_eq!(decode_span(&lookup, &input_ids, 4, 4), "eiffel");
    assert_eq!(decode_span(&lookup, &input_ids, 5, 3), "");
    assert_eq!(decode_span(&lookup, &input_ids, 6, 42), "? [SEP]");
}

#[test]
fn answers_from_logits_and_gold_positions() -> anyhow::Result<()> {
    let lookup = tokens();
    let input_ids = Tensor::from_slice(&[1i64, 3, 4, 7, 6, 8, 9, 2, 1, 3, 4, 5, 6, 10, 2, 0])
        .view((2, 8));

    let mut start_logits = vec![0f32; 16];
    let mut end_logits = vec![0f32; 16];
    start_logits[3] = 5.0;
    end_logits[4] = 5.0;
    start_logits[8 + 6] = 5.0;
    end_logits[8 + 2] = 5.0;
    let start_logits = Tensor::from_slice(&start_logits).view((2, 8));
    let end_logits = Tensor::from_slice(&end_logits).view((2, 8));

    let predictions = predicted_answers(&lookup, &input_ids, &start_logits, &end_logits)?;
    assert_eq!(predictions, vec!["eiffel tower".to_string(), String::new()]);

    let gold = gold_answers(
        &lookup,
        &input_ids,
        &Tensor::from_slice(&[3i64, 3]),
        &Tensor::from_slice(&[6i64, 4]),
    )?;
    assert_eq!(
        gold,
        vec![
            "eiffel tower in paris".to_string(),
            "the tower".to_string()
        ]
    );

    assert_eq!(exact_match_batch(&gold, &predictions), 0.0);
    Ok(())
}
