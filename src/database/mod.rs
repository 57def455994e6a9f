// Database module
// Dual database system: SQLite for metadata, LanceDB for vectors

pub mod lancedb;
pub mod sqlite;

pub use sqlite::Database;
