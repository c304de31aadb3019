//! Bucket namespace services: durable metadata, name leasing, listing, and
//! the request-level orchestration that ties them together.

pub mod bucket_service;
pub mod listing;
pub mod metadata_store;
pub mod namespace;

#[cfg(test)]
pub(crate) mod test_support {
    use super::metadata_store::{MetadataStore, StoreOptions};
    use tempfile::TempDir;

    /// A migrated store backed by a database file in a fresh temp directory.
    ///
    /// The directory must outlive the store, so it is returned alongside.
    pub(crate) async fn temp_store() -> (TempDir, MetadataStore) {
        let dir = tempfile::tempdir().expect("create temp dir");
        let url = format!("sqlite://{}", dir.path().join("buckets.db").display());
        let store = MetadataStore::connect(&url, &StoreOptions::default())
            .await
            .expect("open store");
        store.migrate().await.expect("migrate store");
        (dir, store)
    }
}
