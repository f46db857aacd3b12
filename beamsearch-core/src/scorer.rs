//! Beam scorer: per-step top-2M expansion, EOS bookkeeping, and
//! finalization under length penalty.
//!
//! The top-k selection technique (partition, then sort only the selected
//! slice) is grounded on `Sampler::get_top_logprobs` in `sampler.rs`,
//! generalized from top-n-logprobs-for-display to the top-2M beam/token
//! candidate selection this component needs.

use tracing::debug;

use crate::hypotheses::BeamHypotheses;
use crate::params::BeamSearchParams;
use crate::sequences::SequencesStore;

/// One step's output: per-prompt next beam assignments.
pub struct StepOutput {
    pub beam_scores: Vec<f32>,
    pub beam_indices: Vec<usize>,
    pub beam_next_tokens: Vec<i64>,
}

struct Candidate {
    score: f32,
    beam_within_prompt: usize,
    token: usize,
}

/// Partition-then-sort top-k over a slice of `(score)` values, returning
/// indices into that slice in descending-score order. Ties broken by the
/// original (ascending-index) order, matching a stable top-k producer.
fn top_k_indices(values: &[f32], k: usize) -> Vec<usize> {
    let k = k.min(values.len());
    let mut idx: Vec<usize> = (0..values.len()).collect();
    if k < idx.len() {
        idx.select_nth_unstable_by(k - 1, |&a, &b| {
            values[b]
                .partial_cmp(&values[a])
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        idx.truncate(k);
    }
    idx.sort_by(|&a, &b| {
        values[b]
            .partial_cmp(&values[a])
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.cmp(&b))
    });
    idx
}

/// Per-prompt beam search scorer state plus the driver-facing step/finalize
/// operations.
pub struct BeamScorer {
    batch_size: usize,
    num_beams: usize,
    num_return_sequences: usize,
    vocab_size: usize,
    pad_token_id: i64,
    eos_token_id: i64,
    hypotheses: Vec<BeamHypotheses>,
    done: Vec<bool>,
}

impl BeamScorer {
    pub fn new(params: &BeamSearchParams) -> Self {
        let hypotheses = (0..params.batch_size)
            .map(|_| {
                BeamHypotheses::new(
                    params.num_beams,
                    params.length_penalty,
                    params.early_stopping,
                )
            })
            .collect();
        Self {
            batch_size: params.batch_size,
            num_beams: params.num_beams,
            num_return_sequences: params.num_return_sequences,
            vocab_size: params.vocab_size,
            pad_token_id: params.pad_token_id as i64,
            eos_token_id: params.eos_token_id as i64,
            hypotheses,
            done: vec![false; params.batch_size],
        }
    }

    pub fn is_done(&self) -> bool {
        self.done.iter().all(|&d| d)
    }

    /// Perform one decoding step's scoring: combine running beam scores with
    /// this step's processed logits, select the top-2M candidates per
    /// prompt, consume EOS picks into the hypothesis set, and emit the `M`
    /// surviving beam/token assignments.
    ///
    /// `next_token_scores` is `[batch_beam_size, vocab_size]` post-processor
    /// log-probs; `beam_scores_in` is the running per-beam log-prob.
    pub fn step(
        &mut self,
        next_token_scores: &[f32],
        beam_scores_in: &[f32],
        sequences: &SequencesStore,
    ) -> StepOutput {
        let m = self.num_beams;
        let v = self.vocab_size;
        let current_length = sequences.current_length();

        let mut out_scores = vec![0f32; self.batch_size * m];
        let mut out_indices = vec![0usize; self.batch_size * m];
        let mut out_tokens = vec![0i64; self.batch_size * m];

        for b in 0..self.batch_size {
            if self.done[b] {
                // Already finished: keep emitting pad with -inf score so the
                // pipeline stays shape-stable without contributing further
                // hypotheses.
                for slot in 0..m {
                    out_scores[b * m + slot] = f32::NEG_INFINITY;
                    out_indices[b * m + slot] = b * m;
                    out_tokens[b * m + slot] = self.pad_token_id;
                }
                continue;
            }

            // combined[i, v] = next_token_scores[i, v] + beam_scores_in[i],
            // reshaped per prompt to `[m * v]` flattened cells.
            let mut combined = vec![0f32; m * v];
            for beam in 0..m {
                let row_start = (b * m + beam) * v;
                let score_row = &next_token_scores[row_start..row_start + v];
                let running = beam_scores_in[b * m + beam];
                let dst_start = beam * v;
                for t in 0..v {
                    combined[dst_start + t] = score_row[t] + running;
                }
            }

            let top2m = top_k_indices(&combined, 2 * m);
            let candidates: Vec<Candidate> = top2m
                .into_iter()
                .map(|flat| Candidate {
                    score: combined[flat],
                    beam_within_prompt: flat / v,
                    token: flat % v,
                })
                .collect();

            let mut filled = 0usize;
            let mut best_raw_score = f32::NEG_INFINITY;
            for (rank, cand) in candidates.iter().enumerate() {
                if filled == m {
                    break;
                }
                if cand.token as i64 == self.eos_token_id {
                    if rank < m {
                        let source_beam = b * m + cand.beam_within_prompt;
                        let seq = sequences.get_sequence(source_beam).to_vec();
                        self.hypotheses[b].add(seq, cand.score);
                        if cand.score > best_raw_score {
                            best_raw_score = cand.score;
                        }
                    }
                    continue;
                }
                out_scores[b * m + filled] = cand.score;
                out_indices[b * m + filled] = b * m + cand.beam_within_prompt;
                out_tokens[b * m + filled] = cand.token as i64;
                if cand.score > best_raw_score {
                    best_raw_score = cand.score;
                }
                filled += 1;
            }

            if filled < m {
                // Fewer than M non-EOS picks among the 2M candidates: pad
                // the remainder and force this prompt terminal.
                for slot in filled..m {
                    out_scores[b * m + slot] = f32::NEG_INFINITY;
                    out_indices[b * m + slot] = b * m;
                    out_tokens[b * m + slot] = self.pad_token_id;
                }
                self.hypotheses[b].latch_done();
                self.done[b] = true;
                debug!(prompt = b, "beam scorer: under-filled, forcing terminal");
                continue;
            }

            if self.hypotheses[b].is_done(best_raw_score, current_length) {
                self.done[b] = true;
            }
        }

        StepOutput {
            beam_scores: out_scores,
            beam_indices: out_indices,
            beam_next_tokens: out_tokens,
        }
    }

    /// Finalize: complete any still-live beam as if it had just produced
    /// EOS, then select the top `num_return_sequences` per prompt.
    pub fn finalize(
        &mut self,
        sequences: &SequencesStore,
        beam_scores: &[f32],
        max_length: usize,
        pad_token_id: i64,
    ) -> (Vec<Vec<i64>>, Vec<f32>) {
        let m = self.num_beams;
        let k = self.num_return_sequences;
        let mut all_sequences = Vec::with_capacity(self.batch_size * k);
        let mut all_scores = Vec::with_capacity(self.batch_size * k);

        for b in 0..self.batch_size {
            for beam in 0..m {
                let idx = b * m + beam;
                let seq = sequences.get_sequence(idx).to_vec();
                self.hypotheses[b].add(seq, beam_scores[idx]);
            }
        }

        let hyps = std::mem::replace(
            &mut self.hypotheses,
            (0..self.batch_size).map(|_| BeamHypotheses::new(m, 1.0, false)).collect(),
        );

        // Every still-live beam was just folded into its prompt's hypothesis
        // set above, so each set holds exactly `num_beams` entries by now
        // (never fewer): a prompt can never run short of completed
        // hypotheses to return, since the live beams cover any shortfall.
        for hyp_set in hyps.into_iter() {
            let length_penalty = hyp_set.length_penalty();
            let top = hyp_set.into_top_k(k);
            for h in &top {
                let mut tokens = h.tokens.clone();
                tokens.resize(max_length, pad_token_id);
                all_scores.push(h.penalized_score(length_penalty));
                all_sequences.push(tokens);
            }
        }

        (all_sequences, all_scores)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> BeamSearchParams {
        BeamSearchParams {
            batch_size: 1,
            num_beams: 2,
            num_return_sequences: 1,
            vocab_size: 4,
            sequence_length: 2,
            max_length: 6,
            min_length: 0,
            length_penalty: 1.0,
            repetition_penalty: None,
            no_repeat_ngram_size: 0,
            pad_token_id: 0,
            eos_token_id: 3,
            early_stopping: false,
            temperature: 1.0,
            vocab_mask: None,
            output_scores: false,
        }
    }

    #[test]
    fn top_k_indices_orders_descending() {
        let values = vec![0.1, 0.9, 0.5, 0.2];
        let top = top_k_indices(&values, 2);
        assert_eq!(top, vec![1, 2]);
    }

    #[test]
    fn step_emits_m_slots_per_prompt() {
        let p = params();
        let mut scorer = BeamScorer::new(&p);
        let sequences = SequencesStore::new(2, 2, 6, &[5, 6, 5, 6]);
        // Uniform scores across vocab for both beams; no EOS picked since
        // token 3 has the same score as others here -- make it clearly worse.
        let mut scores = vec![0.0; 2 * 4];
        scores[3] = -100.0; // beam 0 eos
        scores[7] = -100.0; // beam 1 eos
        let beam_scores_in = vec![0.0, f32::NEG_INFINITY];
        let out = scorer.step(&scores, &beam_scores_in, &sequences);
        assert_eq!(out.beam_scores.len(), 2);
        assert_eq!(out.beam_indices.len(), 2);
        assert_eq!(out.beam_next_tokens.len(), 2);
    }

    #[test]
    fn eos_completes_a_hypothesis_and_is_not_reemitted() {
        let p = params();
        let mut scorer = BeamScorer::new(&p);
        let sequences = SequencesStore::new(2, 2, 6, &[5, 6, 5, 6]);
        let mut scores = vec![-10.0; 2 * 4];
        scores[3] = 5.0; // beam 0 strongly prefers EOS
        scores[4 + 1] = 5.0; // beam 1 strongly prefers token 1
        let beam_scores_in = vec![0.0, f32::NEG_INFINITY];
        let out = scorer.step(&scores, &beam_scores_in, &sequences);
        assert!(!out.beam_next_tokens.contains(&3));
    }
}
