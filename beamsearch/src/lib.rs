//! Public facade over `beamsearch-core`: a fluent builder for
//! [`BeamSearchParams`] plus a straight re-export of the engine types, in the
//! manner of the `mistralrs` crate wrapping `mistralrs-core`.

pub use beamsearch_core::{
    BeamSearchDecoder, BeamSearchError, BeamSearchOutput, BeamSearchParams, Result,
    ScriptedSubgraph, Subgraph, SubgraphFeeds, SubgraphOutput,
};

/// Builds a [`BeamSearchParams`] field by field, defaulting the knobs most
/// callers leave alone (no repetition penalty, no n-gram ban, no vocab mask,
/// temperature 1.0) and requiring only the shape-defining fields up front.
pub struct BeamSearchBuilder {
    params: BeamSearchParams,
}

impl BeamSearchBuilder {
    /// Start from the required shape of the problem: how many prompts, how
    /// wide the beam, how large the vocabulary, how long the prompt and the
    /// generation ceiling are.
    pub fn new(
        batch_size: usize,
        num_beams: usize,
        vocab_size: usize,
        sequence_length: usize,
        max_length: usize,
    ) -> Self {
        Self {
            params: BeamSearchParams {
                batch_size,
                num_beams,
                num_return_sequences: num_beams,
                vocab_size,
                sequence_length,
                max_length,
                min_length: 0,
                length_penalty: 1.0,
                repetition_penalty: None,
                no_repeat_ngram_size: 0,
                pad_token_id: 0,
                eos_token_id: 0,
                early_stopping: false,
                temperature: 1.0,
                vocab_mask: None,
                output_scores: false,
            },
        }
    }

    pub fn num_return_sequences(mut self, n: usize) -> Self {
        self.params.num_return_sequences = n;
        self
    }

    pub fn min_length(mut self, n: usize) -> Self {
        self.params.min_length = n;
        self
    }

    pub fn length_penalty(mut self, alpha: f32) -> Self {
        self.params.length_penalty = alpha;
        self
    }

    pub fn repetition_penalty(mut self, rho: f32) -> Self {
        self.params.repetition_penalty = Some(rho);
        self
    }

    pub fn no_repeat_ngram_size(mut self, n: usize) -> Self {
        self.params.no_repeat_ngram_size = n;
        self
    }

    pub fn pad_token_id(mut self, id: u32) -> Self {
        self.params.pad_token_id = id;
        self
    }

    pub fn eos_token_id(mut self, id: u32) -> Self {
        self.params.eos_token_id = id;
        self
    }

    pub fn early_stopping(mut self, on: bool) -> Self {
        self.params.early_stopping = on;
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.params.temperature = t;
        self
    }

    pub fn vocab_mask(mut self, mask: Vec<i32>) -> Self {
        self.params.vocab_mask = Some(mask);
        self
    }

    pub fn output_scores(mut self, on: bool) -> Self {
        self.params.output_scores = on;
        self
    }

    /// Validate and build the decoder.
    pub fn build(self) -> Result<BeamSearchDecoder> {
        BeamSearchDecoder::new(self.params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_produces_a_valid_decoder() {
        let decoder = BeamSearchBuilder::new(1, 2, 8, 3, 10)
            .eos_token_id(1)
            .length_penalty(0.8)
            .build()
            .unwrap();
        assert_eq!(decoder.params().num_beams, 2);
        assert_eq!(decoder.params().num_return_sequences, 2);
    }

    #[test]
    fn builder_rejects_invalid_params() {
        let result = BeamSearchBuilder::new(1, 2, 8, 3, 10)
            .num_return_sequences(5)
            .build();
        assert!(matches!(result, Err(BeamSearchError::InvalidArgument(_))));
    }
}
