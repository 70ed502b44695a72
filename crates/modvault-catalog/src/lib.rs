//! The availability engine's data model (§3) and in-memory catalog (§4.G).

mod catalog;
mod github_provenance;
mod types;

pub use catalog::{ArchiveLookup, Catalog, CatalogError};
pub use github_provenance::parse_github_remote;
pub use types::{Archive, ArchiveStep, FileInArchive, FileOrigin, Retriever};
