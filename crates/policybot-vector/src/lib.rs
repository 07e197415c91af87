//! LanceDB-backed chunk store.
//!
//! `IndexBuilder` rebuilds the whole store from a chunk list; `VectorStore`
//! serves cosine nearest-neighbour queries over it.

pub mod schema;
pub mod search;
pub mod table;
pub mod writer;

pub use search::VectorStore;
pub use writer::{swap_into_place, IndexBuilder, IndexReport};
