#![forbid(unsafe_code)]

pub mod repository;
pub mod sqlite;

pub use repository::{
    InMemoryCache, ProgressRepository, StorageError, VersionRepository,
};
pub use sqlite::{SqliteCache, SqliteInitError};
