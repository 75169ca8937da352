pub mod object_store_adapter;
pub mod sqlite_mirror;

pub use object_store_adapter::{build_store, ObjectStoreArtifacts};
pub use sqlite_mirror::SqliteMetricsMirror;
