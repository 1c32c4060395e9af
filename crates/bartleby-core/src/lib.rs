pub mod error;
pub mod event;
pub mod tree;
pub mod types;
pub mod wikiref;

pub use error::{CoreError, CoreResult};
pub use types::*;
