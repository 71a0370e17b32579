mod backend;

pub use backend::SqliteStore;
