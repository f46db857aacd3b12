//! Autoregressive beam search decoding over a causal language-model
//! subgraph: the logits processor pipeline, the length-penalized beam
//! scorer, the ping-pong sequences store, and the driver that ties them
//! together.

pub mod device;
pub mod driver;
pub mod error;
pub mod hypotheses;
pub mod logits;
pub mod params;
pub mod scorer;
pub mod sequences;
pub mod subgraph;

pub use driver::{BeamSearchDecoder, BeamSearchOutput};
pub use error::{BeamSearchError, Result};
pub use params::BeamSearchParams;
pub use subgraph::{ScriptedSubgraph, Subgraph, SubgraphFeeds, SubgraphOutput};
