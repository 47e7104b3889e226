#[macro_use]
extern crate criterion;

use criterion::{black_box, Criterion};
use rust_subjqa::encoder::EncoderOutput;
use rust_subjqa::heads::{HeadInput, HeadKind, QAHead, QAHeadConfig, TaskSelector};
use rust_subjqa::scoring::{exact_match_batch, f1_batch, predicted_answers, TokenLookup};
use std::time::{Duration, Instant};
use tch::{nn, no_grad, Device, Kind, Tensor};

static BATCH_SIZE: i64 = 32;
static SEQUENCE_LENGTH: i64 = 384;
static HIDDEN_SIZE: i64 = 768;

struct WordPieces(Vec<String>);

impl TokenLookup for WordPieces {
    fn token(&self, id: i64) -> String {
        self.0[id as usize % self.0.len()].clone()
    }
}

fn create_answers(n_answers: usize) -> (Vec<String>, Vec<String>) {
    let words = [
        "the", "battery", "life", "is", "great", "but", "a", "screen", "was", "dim", "and",
        "an", "awful", "keyboard",
    ];
    let gold = (0..n_answers)
        .map(|index| {
            (0..8)
                .map(|offset| words[(index + offset) % words.len()])
                .collect::<Vec<&str>>()
                .join(" ")
        })
        .collect();
    let predictions = (0..n_answers)
        .map(|index| {
            (2..6)
                .map(|offset| words[(index + 2 * offset) % words.len()])
                .collect::<Vec<&str>>()
                .join(" ")
        })
        .collect();
    (gold, predictions)
}

fn score_answers(iters: u64, gold: &[String], predictions: &[String]) -> Duration {
    let mut duration = Duration::new(0, 0);
    for _i in 0..iters {
        let start = Instant::now();
        let _ = black_box(exact_match_batch(gold, predictions));
        let _ = black_box(f1_batch(gold, predictions));
        duration += start.elapsed();
    }
    duration
}

fn decode_answers(iters: u64, lookup: &WordPieces, input_ids: &Tensor, logits: &Tensor) -> Duration {
    let mut duration = Duration::new(0, 0);
    for _i in 0..iters {
        let start = Instant::now();
        let _ = black_box(predicted_answers(lookup, input_ids, logits, &logits.flip([1])));
        duration += start.elapsed();
    }
    duration
}

fn head_forward_pass(iters: u64, head: &QAHead, encoder_output: &EncoderOutput) -> Duration {
    let lengths = Tensor::full(
        [BATCH_SIZE],
        SEQUENCE_LENGTH,
        (Kind::Int64, Device::Cpu),
    );
    let input = HeadInput::new(encoder_output).with_lengths(&lengths);
    let mut duration = Duration::new(0, 0);
    for _i in 0..iters {
        let start = Instant::now();
        let _ = black_box(no_grad(|| head.forward_t(TaskSelector::QA, &input, false)));
        duration += start.elapsed();
    }
    duration
}

fn bench_scoring(c: &mut Criterion) {
    let (gold, predictions) = create_answers(1000);
    c.bench_function("Answer scoring", |b| {
        b.iter_custom(|iters| black_box(score_answers(iters, &gold, &predictions)))
    });

    let lookup = WordPieces(
        create_answers(1)
            .0
            .join(" ")
            .split(' ')
            .map(str::to_string)
            .collect(),
    );
    let input_ids = Tensor::randint(1000, [BATCH_SIZE, SEQUENCE_LENGTH], (Kind::Int64, Device::Cpu));
    let logits = Tensor::randn([BATCH_SIZE, SEQUENCE_LENGTH], (Kind::Float, Device::Cpu));
    c.bench_function("Answer decoding", |b| {
        b.iter_custom(|iters| black_box(decode_answers(iters, &lookup, &input_ids, &logits)))
    });

    let vs = nn::VarStore::new(Device::Cpu);
    let mut config = QAHeadConfig::new(HeadKind::Recurrent, HIDDEN_SIZE);
    config.highway_connection = true;
    let head = QAHead::new(vs.root() / "qa_head", &config).unwrap();
    let encoder_output = EncoderOutput {
        hidden_state: Tensor::randn(
            [BATCH_SIZE, SEQUENCE_LENGTH, HIDDEN_SIZE],
            (Kind::Float, Device::Cpu),
        ),
        all_hidden_states: None,
    };
    c.bench_function("Recurrent head forward pass", |b| {
        b.iter_custom(|iters| black_box(head_forward_pass(iters, &head, &encoder_output)))
    });
}

criterion_group! {
name = benches;
config = Criterion::default().sample_size(10);
targets = bench_scoring
}

criterion_main!(benches);
