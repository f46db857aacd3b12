//! Smoke-test binary for the beam search engine: runs it against a mock
//! subgraph (scripted or random-uniform logits) and prints the decoded
//! sequences, with no real model in the loop.

use std::sync::atomic::AtomicBool;

use anyhow::Result;
use beamsearch::BeamSearchBuilder;
use candle_core::{Device, Tensor};
use clap::Parser;
use rand::Rng;
use tracing_subscriber::EnvFilter;

/// Run autoregressive beam search decoding against a mock language-model
/// subgraph, for manual smoke-testing of the engine without a real model.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Number of prompts to decode in one call.
    #[arg(long, default_value_t = 1)]
    batch_size: usize,

    /// Beam width.
    #[arg(long, default_value_t = 4)]
    num_beams: usize,

    /// How many of the top beams to return per prompt.
    #[arg(long, default_value_t = 1)]
    num_return_sequences: usize,

    /// Mock vocabulary size.
    #[arg(long, default_value_t = 32)]
    vocab_size: usize,

    /// Prompt length, in tokens.
    #[arg(long, default_value_t = 4)]
    sequence_length: usize,

    /// Maximum total sequence length (prompt + generated).
    #[arg(long, default_value_t = 16)]
    max_length: usize,

    /// Minimum number of tokens before EOS is allowed.
    #[arg(long, default_value_t = 0)]
    min_length: usize,

    /// Length penalty exponent alpha.
    #[arg(long, default_value_t = 1.0)]
    length_penalty: f32,

    /// Token id treated as end-of-sequence.
    #[arg(long, default_value_t = 0)]
    eos_token_id: u32,

    /// Token id used to pad finished sequences.
    #[arg(long, default_value_t = 1)]
    pad_token_id: u32,

    /// Random seed for the mock subgraph's logits.
    #[arg(long, default_value_t = 1234)]
    seed: u64,
}

/// A subgraph that ignores its feeds and returns fresh uniform-random
/// logits every call, letting the CLI exercise the full decode loop without
/// a scripted trace.
struct RandomSubgraph {
    vocab_size: usize,
    batch_beam_size: usize,
    rng: rand::rngs::StdRng,
}

impl beamsearch_core::Subgraph for RandomSubgraph {
    fn forward(
        &mut self,
        _feeds: &beamsearch_core::SubgraphFeeds,
    ) -> beamsearch_core::Result<beamsearch_core::SubgraphOutput> {
        let n = self.batch_beam_size * self.vocab_size;
        let logits: Vec<f32> = (0..n).map(|_| self.rng.random_range(-3.0..3.0)).collect();
        let tensor = Tensor::from_vec(
            logits,
            (self.batch_beam_size, 1, self.vocab_size),
            &Device::Cpu,
        )?;
        Ok(beamsearch_core::SubgraphOutput {
            logits: tensor,
            past: Vec::new(),
        })
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let decoder = BeamSearchBuilder::new(
        args.batch_size,
        args.num_beams,
        args.vocab_size,
        args.sequence_length,
        args.max_length,
    )
    .num_return_sequences(args.num_return_sequences)
    .min_length(args.min_length)
    .length_penalty(args.length_penalty)
    .eos_token_id(args.eos_token_id)
    .pad_token_id(args.pad_token_id)
    .build()?;

    let prompt_tokens: Vec<i64> = (0..args.batch_size * args.sequence_length)
        .map(|i| (i % args.vocab_size) as i64)
        .collect();

    let mut subgraph = RandomSubgraph {
        vocab_size: args.vocab_size,
        batch_beam_size: args.batch_size * args.num_beams,
        rng: {
            use rand::SeedableRng;
            rand::rngs::StdRng::seed_from_u64(args.seed)
        },
    };

    let terminate = AtomicBool::new(false);
    let output = decoder.execute(&prompt_tokens, &mut subgraph, &terminate)?;

    let k = args.num_return_sequences;
    for (i, (seq, score)) in output
        .sequences
        .iter()
        .zip(output.sequences_scores.iter())
        .enumerate()
    {
        let prompt = i / k;
        let rank = i % k;
        println!("prompt {prompt} rank {rank} (score {score:.4}): {seq:?}");
    }

    Ok(())
}
