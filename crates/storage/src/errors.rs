pub use contract_watch_domain::storage::StorageError;
