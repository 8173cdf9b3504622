//! Stage chain model.
//!
//! A chain is the ordered sequence of stage definitions owned by one template.
//! It is stored as an arena sorted by `order`; previous/next links are derived
//! from arena position and never stored independently.

mod builder;
mod definition;

pub use builder::{build_chain, StageChain};
pub use definition::{StageDefinition, StageRecord, StageSpec};
