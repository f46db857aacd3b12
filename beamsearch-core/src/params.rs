//! Decoding parameters and their validation.

use serde::{Deserialize, Serialize};

use crate::error::{BeamSearchError, Result};

/// Fixed decoding parameters, validated once per [`crate::driver::BeamSearchDecoder::execute`] call.
///
/// Field-to-operator-input mapping, carried over from the ONNX beam search
/// operator this engine generalizes:
/// `vocab_mask` <- input 8, `min_length` <- input 1, `max_length` <- input 2,
/// `num_beams` <- input 3, `num_return_sequences` <- input 4, `temperature`
/// <- input 5, `length_penalty` <- input 6, `repetition_penalty` <- input 7.
/// `batch_size`, `vocab_size`, and `sequence_length` are derived from
/// `input_ids` rather than passed explicitly.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BeamSearchParams {
    pub batch_size: usize,
    pub num_beams: usize,
    pub num_return_sequences: usize,
    pub vocab_size: usize,
    pub sequence_length: usize,
    pub max_length: usize,
    pub min_length: usize,
    pub length_penalty: f32,
    pub repetition_penalty: Option<f32>,
    pub no_repeat_ngram_size: usize,
    pub pad_token_id: u32,
    pub eos_token_id: u32,
    pub early_stopping: bool,
    pub temperature: f32,
    pub vocab_mask: Option<Vec<i32>>,
    pub output_scores: bool,
}

impl BeamSearchParams {
    /// Number of rows on the batch-beam axis, `N = B * M`.
    pub fn batch_beam_size(&self) -> usize {
        self.batch_size * self.num_beams
    }

    /// Validate every structural invariant these parameters must satisfy.
    /// Fails fast with `BeamSearchError::InvalidArgument` on the first
    /// violation found.
    pub fn validate(&self) -> Result<()> {
        if self.num_return_sequences > self.num_beams {
            return Err(BeamSearchError::InvalidArgument(format!(
                "num_return_sequences ({}) must be <= num_beams ({})",
                self.num_return_sequences, self.num_beams
            )));
        }
        if self.max_length <= self.sequence_length {
            return Err(BeamSearchError::InvalidArgument(format!(
                "max_length ({}) must be > sequence_length ({})",
                self.max_length, self.sequence_length
            )));
        }
        if self.num_beams == 0 || self.batch_size == 0 || self.vocab_size == 0 {
            return Err(BeamSearchError::InvalidArgument(
                "batch_size, num_beams, and vocab_size must all be > 0".to_string(),
            ));
        }
        if let Some(mask) = &self.vocab_mask {
            if mask.len() != self.vocab_size {
                return Err(BeamSearchError::InvalidArgument(format!(
                    "vocab_mask length ({}) does not match vocab_size ({})",
                    mask.len(),
                    self.vocab_size
                )));
            }
        }
        if self.temperature <= 0.0 {
            return Err(BeamSearchError::InvalidArgument(
                "temperature must be > 0".to_string(),
            ));
        }
        if let Some(rho) = self.repetition_penalty {
            if rho <= 0.0 {
                return Err(BeamSearchError::InvalidArgument(
                    "repetition_penalty must be > 0".to_string(),
                ));
            }
        }
        if self.eos_token_id as usize >= self.vocab_size {
            return Err(BeamSearchError::InvalidArgument(format!(
                "eos_token_id ({}) out of range for vocab_size ({})",
                self.eos_token_id, self.vocab_size
            )));
        }
        Ok(())
    }
}
