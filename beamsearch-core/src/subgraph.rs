//! The model subgraph contract, kept as a named external collaborator: this
//! crate never implements transformer execution, only the trait boundary
//! plus deterministic test doubles used by the seed decode scenarios.

use candle_core::Tensor;

use crate::error::Result;

/// Inputs handed to the subgraph for one call. The first call carries
/// prompt-length tensors; later calls carry length-1 tensors with `past`
/// already gathered along the beam axis by the driver.
pub struct SubgraphFeeds {
    pub input_ids: Tensor,
    pub position_ids: Tensor,
    pub attention_mask: Tensor,
    pub past: Vec<Tensor>,
}

/// Outputs produced by one subgraph call: logits followed by new past-KV.
pub struct SubgraphOutput {
    pub logits: Tensor,
    pub past: Vec<Tensor>,
}

/// External collaborator: given feeds, produce logits plus new past-KV.
/// Implementations may run on any device; the driver only ever touches the
/// tensors it gets back through the [`crate::device::DeviceCopy`] boundary.
pub trait Subgraph {
    fn forward(&mut self, feeds: &SubgraphFeeds) -> Result<SubgraphOutput>;
}

impl<F> Subgraph for F
where
    F: FnMut(&SubgraphFeeds) -> Result<SubgraphOutput>,
{
    fn forward(&mut self, feeds: &SubgraphFeeds) -> Result<SubgraphOutput> {
        self(feeds)
    }
}

/// A deterministic test double that replays a fixed sequence of logits
/// tensors, one per call, ignoring the feeds entirely, repeating the last
/// tensor for any call past the scripted length. This is what the seed
/// decode scenarios (S1-S6) run against in place of a real model.
pub struct ScriptedSubgraph {
    steps: Vec<Tensor>,
    call: usize,
}

impl ScriptedSubgraph {
    pub fn new(steps: Vec<Tensor>) -> Self {
        Self { steps, call: 0 }
    }
}

impl Subgraph for ScriptedSubgraph {
    fn forward(&mut self, _feeds: &SubgraphFeeds) -> Result<SubgraphOutput> {
        let logits = self.steps[self.call.min(self.steps.len() - 1)].clone();
        self.call += 1;
        Ok(SubgraphOutput {
            logits,
            past: Vec::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{DType, Device};

    #[test]
    fn scripted_subgraph_replays_in_order() {
        let a = Tensor::new(&[1f32, 2.0], &Device::Cpu).unwrap();
        let b = Tensor::new(&[3f32, 4.0], &Device::Cpu).unwrap();
        let mut sg = ScriptedSubgraph::new(vec![a.clone(), b.clone()]);
        let feeds = SubgraphFeeds {
            input_ids: Tensor::zeros(1, DType::I64, &Device::Cpu).unwrap(),
            position_ids: Tensor::zeros(1, DType::I64, &Device::Cpu).unwrap(),
            attention_mask: Tensor::zeros(1, DType::I64, &Device::Cpu).unwrap(),
            past: Vec::new(),
        };
        let out1 = sg.forward(&feeds).unwrap();
        assert_eq!(out1.logits.to_vec1::<f32>().unwrap(), vec![1.0, 2.0]);
        let out2 = sg.forward(&feeds).unwrap();
        assert_eq!(out2.logits.to_vec1::<f32>().unwrap(), vec![3.0, 4.0]);
        // Past the scripted length, the last step repeats.
        let out3 = sg.forward(&feeds).unwrap();
        assert_eq!(out3.logits.to_vec1::<f32>().unwrap(), vec![3.0, 4.0]);
    }
}
