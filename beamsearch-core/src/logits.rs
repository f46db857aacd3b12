//! Logits processor pipeline: a fixed, ordered sequence of score transforms
//! applied to each beam's row before the final log-softmax.
//!
//! Generalizes `CustomLogitsProcessor` from `mistralrs-core`'s sampler: there
//! each processor transforms a single sequence's logits in place; here the
//! same shape of trait runs once per beam row over the batch-beam axis, in a
//! fixed configured order, with row-parallel dispatch via `rayon` the same
//! way `apply_dry_penalty` parallelizes per-context-position work.

use rayon::prelude::*;

use crate::params::BeamSearchParams;
use crate::sequences::SequencesStore;

const NEG_INF: f32 = f32::NEG_INFINITY;

/// Per-row context a processor needs: which beam, what it has generated so
/// far, and how long the sequence currently is.
pub struct RowContext<'a> {
    pub beam_index: usize,
    pub sequence: &'a [i64],
    pub current_length: usize,
}

/// One step of the pipeline. Mutates `scores` (length `vocab_size`) in place.
pub trait LogitsProcessor: Send + Sync {
    fn process(&self, scores: &mut [f32], ctx: &RowContext);
}

/// Suppresses every vocabulary column whose mask entry is zero.
struct VocabMask {
    mask: Vec<i32>,
}

impl LogitsProcessor for VocabMask {
    fn process(&self, scores: &mut [f32], _ctx: &RowContext) {
        for (score, &bit) in scores.iter_mut().zip(&self.mask) {
            if bit == 0 {
                *score = NEG_INF;
            }
        }
    }
}

/// Suppresses EOS until `min_length` has been reached.
struct MinLength {
    min_length: usize,
    eos_token_id: u32,
}

impl LogitsProcessor for MinLength {
    fn process(&self, scores: &mut [f32], ctx: &RowContext) {
        if ctx.current_length < self.min_length {
            if let Some(s) = scores.get_mut(self.eos_token_id as usize) {
                *s = NEG_INF;
            }
        }
    }
}

/// Penalizes tokens already present in the beam's own history.
struct RepetitionPenalty {
    penalty: f32,
}

impl LogitsProcessor for RepetitionPenalty {
    fn process(&self, scores: &mut [f32], ctx: &RowContext) {
        for &tok in ctx.sequence {
            let idx = tok as usize;
            if let Some(s) = scores.get_mut(idx) {
                *s = if *s > 0.0 {
                    *s / self.penalty
                } else {
                    *s * self.penalty
                };
            }
        }
    }
}

/// Bans tokens that would complete an n-gram already seen in the sequence.
struct NoRepeatNgram {
    ngram_size: usize,
}

impl LogitsProcessor for NoRepeatNgram {
    fn process(&self, scores: &mut [f32], ctx: &RowContext) {
        let n = self.ngram_size;
        if n == 0 || ctx.current_length < n {
            return;
        }
        let seq = ctx.sequence;
        let prefix_len = n - 1;
        let prefix = &seq[seq.len() - prefix_len..];
        // Tokens `t` such that `prefix + t` occurred earlier in the sequence.
        for window in seq.windows(n) {
            if &window[..prefix_len] == prefix {
                let banned = window[prefix_len] as usize;
                if let Some(s) = scores.get_mut(banned) {
                    *s = NEG_INF;
                }
            }
        }
    }
}

/// Scales logits by `1/temperature` before the final log-softmax.
struct Temperature {
    temperature: f32,
}

impl LogitsProcessor for Temperature {
    fn process(&self, scores: &mut [f32], _ctx: &RowContext) {
        for s in scores.iter_mut() {
            *s /= self.temperature;
        }
    }
}

/// Row-stabilized log-softmax over the vocabulary. Always the last step;
/// not user-configurable, since it is the numeric contract of the channel.
fn log_softmax_row(scores: &mut [f32]) {
    let max = scores.iter().cloned().fold(NEG_INF, f32::max);
    if max.is_infinite() && max.is_sign_negative() {
        // Every entry is -inf (fully masked row); leave as-is rather than
        // producing NaN from `-inf - (-inf)`.
        return;
    }
    let mut sum = 0f32;
    for s in scores.iter_mut() {
        *s -= max;
        sum += s.exp();
    }
    let log_sum = sum.ln();
    for s in scores.iter_mut() {
        *s -= log_sum;
    }
}

/// The fixed, ordered pipeline: vocab mask, min-length, repetition penalty,
/// no-repeat n-gram, temperature, log-softmax.
pub struct LogitsProcessorPipeline {
    steps: Vec<Box<dyn LogitsProcessor>>,
}

impl LogitsProcessorPipeline {
    pub fn new(params: &BeamSearchParams) -> Self {
        let mut steps: Vec<Box<dyn LogitsProcessor>> = Vec::new();
        if let Some(mask) = &params.vocab_mask {
            steps.push(Box::new(VocabMask { mask: mask.clone() }));
        }
        if params.min_length > 0 {
            steps.push(Box::new(MinLength {
                min_length: params.min_length,
                eos_token_id: params.eos_token_id,
            }));
        }
        if let Some(rho) = params.repetition_penalty {
            if rho != 1.0 {
                steps.push(Box::new(RepetitionPenalty { penalty: rho }));
            }
        }
        if params.no_repeat_ngram_size >= 1 {
            steps.push(Box::new(NoRepeatNgram {
                ngram_size: params.no_repeat_ngram_size,
            }));
        }
        if params.temperature > 0.0 && (params.temperature - 1.0).abs() > f32::EPSILON {
            steps.push(Box::new(Temperature {
                temperature: params.temperature,
            }));
        }
        Self { steps }
    }

    /// Run the pipeline over `scores` viewed as `[batch_beam_size, vocab_size]`,
    /// in place, one row per beam, parallelized with rayon across rows.
    pub fn apply(
        &self,
        scores: &mut [f32],
        vocab_size: usize,
        sequences: &SequencesStore,
    ) {
        let current_length = sequences.current_length();
        scores
            .par_chunks_mut(vocab_size)
            .enumerate()
            .for_each(|(beam_index, row)| {
                let ctx = RowContext {
                    beam_index,
                    sequence: sequences.get_sequence(beam_index),
                    current_length,
                };
                for step in &self.steps {
                    step.process(row, &ctx);
                }
                log_softmax_row(row);
            });
    }
}
