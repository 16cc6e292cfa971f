pub mod fixtures;
pub mod mocks;

#[allow(unused_imports)]
pub use fixtures::{item, leaf_schema, seed_rows};
#[allow(unused_imports)]
pub use mocks::FlakyStore;
