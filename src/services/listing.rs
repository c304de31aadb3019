//! Paginated, lexicographically ordered bucket enumeration.
//!
//! Pages are cut from an ordered store scan. The resume cursor is the last
//! name of the previous page, base64-encoded; the server keeps no per-client
//! state. Resuming is read-committed: buckets deleted since the last page are
//! skipped and buckets created after the cursor position show up.

use crate::{
    models::bucket::Bucket,
    services::metadata_store::{MetadataStore, ScanParams, StoreError},
};
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use futures::{Stream, TryStreamExt, stream};
use thiserror::Error;

pub const DEFAULT_PAGE_SIZE: usize = 1000;
pub const MAX_PAGE_SIZE: usize = 1000;

#[derive(Debug, Error)]
pub enum ListError {
    #[error("listing cursor is malformed")]
    InvalidCursor,
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// One listing call.
#[derive(Clone, Debug, Default)]
pub struct ListRequest {
    /// Restrict to buckets owned by this principal.
    pub owner_id: Option<String>,
    pub prefix: Option<String>,
    /// Opaque token from a previous page's `next_cursor`.
    pub cursor: Option<String>,
    /// Clamped to `1..=MAX_PAGE_SIZE`; defaults to `DEFAULT_PAGE_SIZE`.
    pub page_size: Option<usize>,
}

#[derive(Debug)]
pub struct ListPage {
    pub buckets: Vec<Bucket>,
    /// Present iff more buckets remain after this page.
    pub next_cursor: Option<String>,
}

impl ListPage {
    pub fn is_truncated(&self) -> bool {
        self.next_cursor.is_some()
    }
}

pub fn encode_cursor(name: &str) -> String {
    URL_SAFE_NO_PAD.encode(name)
}

pub fn decode_cursor(token: &str) -> Result<String, ListError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(token)
        .map_err(|_| ListError::InvalidCursor)?;
    match String::from_utf8(bytes) {
        Ok(name) if !name.is_empty() => Ok(name),
        _ => Err(ListError::InvalidCursor),
    }
}

fn clamp_page_size(requested: Option<usize>) -> usize {
    requested
        .unwrap_or(DEFAULT_PAGE_SIZE)
        .clamp(1, MAX_PAGE_SIZE)
}

#[derive(Clone, Debug)]
pub struct ListingEngine {
    store: MetadataStore,
}

impl ListingEngine {
    pub fn new(store: MetadataStore) -> Self {
        Self { store }
    }

    /// Return one page of buckets in byte-wise name order.
    pub async fn list(&self, request: &ListRequest) -> Result<ListPage, ListError> {
        let page_size = clamp_page_size(request.page_size);
        let start_after = request.cursor.as_deref().map(decode_cursor).transpose()?;

        // One extra row tells us whether another page exists.
        let params = ScanParams {
            start_after,
            prefix: request.prefix.clone(),
            owner_id: request.owner_id.clone(),
            limit: page_size + 1,
        };
        let mut buckets = self.store.scan(&params).await?;

        let next_cursor = if buckets.len() > page_size {
            buckets.truncate(page_size);
            buckets.last().map(|b| encode_cursor(&b.name))
        } else {
            None
        };

        Ok(ListPage {
            buckets,
            next_cursor,
        })
    }

    /// Lazily walk every page, starting from `request.cursor`.
    ///
    /// Pages are fetched only as the stream is polled; dropping the stream
    /// stops the enumeration.
    pub fn stream(
        &self,
        request: ListRequest,
    ) -> impl Stream<Item = Result<Bucket, ListError>> + Send + 'static {
        let engine = self.clone();
        stream::try_unfold(Some(request), move |state| {
            let engine = engine.clone();
            async move {
                let Some(request) = state else {
                    return Ok(None);
                };
                let page = engine.list(&request).await?;
                let next = page.next_cursor.map(|cursor| ListRequest {
                    cursor: Some(cursor),
                    ..request
                });
                let items =
                    stream::iter(page.buckets.into_iter().map(Ok::<Bucket, ListError>));
                Ok::<_, ListError>(Some((items, next)))
            }
        })
        .try_flatten()
    }
}
