//! Decoding driver: orchestrates initial-feed construction, iterative
//! subgraph invocation, state updates, early stop, and output emission.
//! Grounded on `BeamSearchImpl<T>::Execute` in the source this system was
//! distilled from, generalized from an ONNX operator kernel to a plain Rust
//! call over a user-supplied [`Subgraph`].

use std::sync::atomic::{AtomicBool, Ordering};

use candle_core::{DType, Device, Tensor};
use tracing::{debug, info, instrument};

use crate::device::to_f32_vec;
use crate::error::{BeamSearchError, Result};
use crate::logits::LogitsProcessorPipeline;
use crate::params::BeamSearchParams;
use crate::scorer::BeamScorer;
use crate::sequences::SequencesStore;
use crate::subgraph::{Subgraph, SubgraphFeeds};

/// Everything `execute` hands back to the caller.
pub struct BeamSearchOutput {
    /// `[batch_size][num_return_sequences][max_length]`, padded with
    /// `pad_token_id`.
    pub sequences: Vec<Vec<i64>>,
    /// Length-penalized score per returned sequence, same indexing as
    /// `sequences` flattened to `[batch_size * num_return_sequences]`.
    pub sequences_scores: Vec<f32>,
    /// Present iff `params.output_scores`: one `[batch_size * num_beams *
    /// vocab_size]` row of post-processor log-probs per decoding step.
    pub scores_trace: Option<Vec<Vec<f32>>>,
}

/// Owns a validated parameter set and runs beam search decoding against any
/// [`Subgraph`] implementation.
pub struct BeamSearchDecoder {
    params: BeamSearchParams,
}

impl BeamSearchDecoder {
    pub fn new(params: BeamSearchParams) -> Result<Self> {
        params.validate()?;
        Ok(Self { params })
    }

    pub fn params(&self) -> &BeamSearchParams {
        &self.params
    }

    /// Build the expanded `[B*M, L0]` input ids, `position_ids`, and
    /// `attention_mask`, row-replicating each prompt across its
    /// `num_beams` beams.
    fn build_initial_feeds(&self, prompt_tokens: &[i64]) -> SubgraphFeeds {
        let p = &self.params;
        let (b, l0, m) = (p.batch_size, p.sequence_length, p.num_beams);
        let mut expanded_ids = vec![0i64; b * m * l0];
        let mut position_ids = vec![0i64; b * m * l0];
        let mut attention_mask = vec![0i64; b * m * l0];
        for prompt in 0..b {
            let src = &prompt_tokens[prompt * l0..(prompt + 1) * l0];
            for beam in 0..m {
                let row = prompt * m + beam;
                let dst = &mut expanded_ids[row * l0..(row + 1) * l0];
                dst.copy_from_slice(src);
                for pos in 0..l0 {
                    position_ids[row * l0 + pos] = pos as i64;
                    attention_mask[row * l0 + pos] = if src[pos] != p.pad_token_id as i64 { 1 } else { 0 };
                }
            }
        }
        let device = Device::Cpu;
        SubgraphFeeds {
            input_ids: Tensor::from_vec(expanded_ids, (b * m, l0), &device).unwrap(),
            position_ids: Tensor::from_vec(position_ids, (b * m, l0), &device).unwrap(),
            attention_mask: Tensor::from_vec(attention_mask, (b * m, l0), &device).unwrap(),
            past: Vec::new(),
        }
    }

    /// First-step `-inf` trick: only the first beam of each prompt is
    /// "alive" for the very first step, preventing M-way duplication of the
    /// same top-K picks (every beam of a fresh prompt starts identical).
    fn init_beam_scores(&self) -> Vec<f32> {
        let p = &self.params;
        let mut scores = vec![f32::NEG_INFINITY; p.batch_beam_size()];
        for prompt in 0..p.batch_size {
            scores[prompt * p.num_beams] = 0.0;
        }
        scores
    }

    /// Gather `tensor`'s rows along the batch-beam axis by `beam_indices`,
    /// as the driver must for past-KV between steps: each surviving beam's
    /// KV cache has to follow the beam it descended from, not stay in place.
    fn gather_beam_axis(tensor: &Tensor, beam_indices: &[usize]) -> Result<Tensor> {
        let idx = Tensor::new(
            beam_indices.iter().map(|&i| i as u32).collect::<Vec<_>>(),
            tensor.device(),
        )?;
        Ok(tensor.index_select(&idx, 0)?)
    }

    #[instrument(skip(self, prompt_tokens, subgraph, terminate))]
    pub fn execute(
        &self,
        prompt_tokens: &[i64],
        subgraph: &mut dyn Subgraph,
        terminate: &AtomicBool,
    ) -> Result<BeamSearchOutput> {
        let p = &self.params;
        info!(
            batch_size = p.batch_size,
            num_beams = p.num_beams,
            max_length = p.max_length,
            "beam search: starting decode"
        );

        let mut feeds = self.build_initial_feeds(prompt_tokens);
        let mut beam_scores = self.init_beam_scores();
        let pipeline = LogitsProcessorPipeline::new(p);
        let mut scorer = BeamScorer::new(p);
        let mut sequences = SequencesStore::new(
            p.batch_beam_size(),
            p.sequence_length,
            p.max_length,
            {
                // Row-replicate the prompt across beams the same way the
                // feeds were expanded, so the sequences store and the
                // model's view of `input_ids` agree from the start.
                let expanded: Vec<i64> = feeds
                    .input_ids
                    .to_dtype(DType::I64)?
                    .flatten_all()?
                    .to_vec1::<i64>()?;
                &expanded
            },
        );

        let mut scores_trace = if p.output_scores { Some(Vec::new()) } else { None };
        let mut current_length = p.sequence_length;

        while current_length < p.max_length {
            if terminate.load(Ordering::SeqCst) {
                return Err(BeamSearchError::Canceled);
            }

            let out = subgraph.forward(&feeds)?;
            let last_step_logits = Self::take_last_step(&out.logits)?;
            let mut next_token_scores = to_f32_vec(&last_step_logits)?;

            pipeline.apply(&mut next_token_scores, p.vocab_size, &sequences);

            if let Some(trace) = scores_trace.as_mut() {
                trace.push(next_token_scores.clone());
            }

            let step = scorer.step(&next_token_scores, &beam_scores, &sequences);
            beam_scores = step.beam_scores;

            sequences.reorder_and_append(&step.beam_indices, &step.beam_next_tokens);

            debug!(current_length, done = scorer.is_done(), "beam search: step complete");
            if scorer.is_done() {
                break;
            }

            current_length += 1;

            if current_length < p.max_length {
                feeds = self.update_feeds(&feeds, &out, &step.beam_next_tokens, &step.beam_indices)?;
            }
        }

        let (out_sequences, out_scores) = scorer.finalize(
            &sequences,
            &beam_scores,
            p.max_length,
            p.pad_token_id as i64,
        );

        info!("beam search: decode complete");
        Ok(BeamSearchOutput {
            sequences: out_sequences,
            sequences_scores: out_scores,
            scores_trace,
        })
    }

    /// Extract the final position's logits as `[batch_beam_size, vocab_size]`
    /// whether the subgraph returned prompt-length logits (the first call) or
    /// length-1 logits (every call after).
    fn take_last_step(logits: &Tensor) -> Result<Tensor> {
        let dims = logits.dims();
        let seq_dim = dims.len() - 2;
        let seq_len = dims[seq_dim];
        Ok(logits.narrow(seq_dim, seq_len - 1, 1)?.squeeze(seq_dim)?)
    }

    /// Build next-step feeds: the new `input_ids` is `beam_next_tokens`
    /// reshaped to `[N, 1]`, positions advance by one, attention mask grows
    /// by a column of ones, and past is gathered along the beam axis by
    /// `beam_indices`.
    fn update_feeds(
        &self,
        prev: &SubgraphFeeds,
        out: &crate::subgraph::SubgraphOutput,
        beam_next_tokens: &[i64],
        beam_indices: &[usize],
    ) -> Result<SubgraphFeeds> {
        let n = self.params.batch_beam_size();
        let device = prev.input_ids.device();
        let input_ids = Tensor::from_vec(beam_next_tokens.to_vec(), (n, 1), device)?;

        let prev_positions: Vec<i64> = prev
            .position_ids
            .narrow(1, prev.position_ids.dim(1)? - 1, 1)?
            .flatten_all()?
            .to_vec1::<i64>()?;
        let next_positions: Vec<i64> = prev_positions.iter().map(|&p| p + 1).collect();
        let position_ids = Tensor::from_vec(next_positions, (n, 1), device)?;

        let ones = Tensor::ones((n, 1), DType::I64, device)?;
        let attention_mask = Tensor::cat(&[&prev.attention_mask, &ones], 1)?;

        let past = out
            .past
            .iter()
            .map(|t| Self::gather_beam_axis(t, beam_indices))
            .collect::<Result<Vec<_>>>()?;

        Ok(SubgraphFeeds {
            input_ids,
            position_ids,
            attention_mask,
            past,
        })
    }
}
