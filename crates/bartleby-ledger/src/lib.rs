pub mod lock;
pub mod paths;
pub mod projector;
pub mod rebuild;
pub mod settings;
pub mod sqlite_store;

pub use lock::WorkspaceLock;
pub use paths::BartlebyPaths;
pub use rebuild::{rebuild_views, RebuildReport};
pub use settings::Settings;
pub use sqlite_store::SqliteStore;
