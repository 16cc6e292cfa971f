pub mod fixtures;
pub mod mocks;

#[allow(unused_imports)]
pub use fixtures::{Leaf, Note, TitledCodec, context, context_with, leaf_spec_with_title_index};
#[allow(unused_imports)]
pub use mocks::{CountingSource, FaultyStore};
