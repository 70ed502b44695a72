//! Persistent caching: a folder-wide, mtime-keyed file cache (§4.B) and a
//! generic result memo keyed by parameters and input-file mtimes (§4.C).

mod cache_data;
mod folder_cache;
mod memo;
mod timestamp;

pub use cache_data::CacheData;
pub use folder_cache::{CacheError, FileMap, FileOnDisk, FolderCache, FolderToCache};
pub use memo::{memo, store, CacheOverwrites, MemoError};
pub use timestamp::Timestamp;
