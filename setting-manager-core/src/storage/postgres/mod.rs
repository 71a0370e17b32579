mod backend;

pub use backend::PostgresStore;
