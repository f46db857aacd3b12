//! Ping-pong sequences store, grounded on
//! `onnxruntime/contrib_ops/cpu/transformers/sequences.cc`.
//!
//! Two equally sized slabs of `batch_beam_size * max_length` tokens, with a
//! flip bit selecting the current slab. Reorder-and-append merges the beam
//! reindexing and the token append into a single pass so there is never an
//! observable state in which the store is partially updated.

/// Two alternating slabs of per-beam token history.
#[derive(Debug)]
pub struct SequencesStore {
    slabs: [Vec<i64>; 2],
    current: usize,
    batch_beam_size: usize,
    max_length: usize,
    current_length: usize,
}

impl SequencesStore {
    /// Allocate both slabs and seed the current one with the prompt tokens.
    ///
    /// `prompt_tokens` is row-major `[batch_beam_size, sequence_length]`,
    /// already expanded across beams.
    pub fn new(
        batch_beam_size: usize,
        sequence_length: usize,
        max_length: usize,
        prompt_tokens: &[i64],
    ) -> Self {
        assert_eq!(prompt_tokens.len(), batch_beam_size * sequence_length);
        let slab_len = batch_beam_size * max_length;
        let mut slab0 = vec![0i64; slab_len];
        for beam in 0..batch_beam_size {
            let src = &prompt_tokens[beam * sequence_length..(beam + 1) * sequence_length];
            let dst_start = beam * max_length;
            slab0[dst_start..dst_start + sequence_length].copy_from_slice(src);
        }
        Self {
            slabs: [slab0, vec![0i64; slab_len]],
            current: 0,
            batch_beam_size,
            max_length,
            current_length: sequence_length,
        }
    }

    pub fn current_length(&self) -> usize {
        self.current_length
    }

    pub fn max_length(&self) -> usize {
        self.max_length
    }

    pub fn batch_beam_size(&self) -> usize {
        self.batch_beam_size
    }

    /// Read-only view of beam `beam`'s token history at the current length.
    pub fn get_sequence(&self, beam: usize) -> &[i64] {
        let start = beam * self.max_length;
        &self.slabs[self.current][start..start + self.current_length]
    }

    /// Reorder beams according to `beam_indices` and append `beam_next_tokens`
    /// in a single pass, then flip the current-slab bit.
    ///
    /// `beam_indices[i]` names the source beam that destination beam `i`
    /// descends from this step.
    pub fn reorder_and_append(&mut self, beam_indices: &[usize], beam_next_tokens: &[i64]) {
        assert_eq!(beam_indices.len(), self.batch_beam_size);
        assert_eq!(beam_next_tokens.len(), self.batch_beam_size);
        assert!(self.current_length < self.max_length);

        let src_slab = self.current;
        let dst_slab = 1 - self.current;
        let max_length = self.max_length;
        let current_length = self.current_length;

        let (first, second) = self.slabs.split_at_mut(1);
        let (src_part, dst_part): (&[i64], &mut [i64]) = if src_slab == 0 {
            (&first[0], &mut second[0])
        } else {
            (&second[0], &mut first[0])
        };

        for dest in 0..self.batch_beam_size {
            let source_beam = beam_indices[dest];
            let src_start = source_beam * max_length;
            let dst_start = dest * max_length;
            dst_part[dst_start..dst_start + current_length]
                .copy_from_slice(&src_part[src_start..src_start + current_length]);
            dst_part[dst_start + current_length] = beam_next_tokens[dest];
        }

        self.current_length += 1;
        self.current = dst_slab;
    }
}
