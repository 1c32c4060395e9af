pub mod commands;
pub mod network;
pub mod reconcile;
pub mod search;
pub mod tree_edit;
pub mod workspace;

pub use commands::{Committed, NewCard, NewLink};
pub use network::Network;
pub use workspace::{AmbiguousReference, CardDetail, LinkedCard, Workspace};
