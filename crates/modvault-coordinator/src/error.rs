#[derive(Debug, thiserror::Error)]
pub enum CoordinatorError {
    #[error(transparent)]
    Scheduler(#[from] modvault_scheduler::SchedulerError),
    #[error(transparent)]
    Cache(#[from] modvault_cache::CacheError),
    #[error(transparent)]
    Memo(#[from] modvault_cache::MemoError),
    #[error(transparent)]
    Catalog(#[from] modvault_catalog::CatalogError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("retriever chain recursed past depth {0}, archive hash graph may be corrupt")]
    RetrieverDepthExceeded(u32),
}
