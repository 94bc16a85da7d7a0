//! In-memory `ObjectStore` for tests.

use crate::basic;
use crate::error::{FetchError, FetchResult};
use crate::store::{ListingPage, ObjectEntry, ObjectStore};
use async_trait::async_trait;
use aws_credential_types::{provider::SharedCredentialsProvider, Credentials};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Mutex;

pub(crate) struct MemoryStore {
    objects: BTreeMap<String, Vec<u8>>,
    page_size: usize,
    credentials: Option<SharedCredentialsProvider>,
    empty_page_at: Option<usize>,
    failing_listing: Option<usize>,
    failing_download: Option<String>,
    downloads: Mutex<Vec<String>>,
}

impl MemoryStore {
    pub(crate) fn new(page_size: usize) -> Self {
        let credentials = Credentials::new("AKIDEXAMPLE", "SECRET", None, None, "MemoryStore");
        Self {
            objects: BTreeMap::new(),
            page_size: page_size.max(1),
            credentials: Some(SharedCredentialsProvider::new(credentials)),
            empty_page_at: None,
            failing_listing: None,
            failing_download: None,
            downloads: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn with_object(mut self, key: &str, data: &[u8]) -> Self {
        self.objects.insert(key.to_owned(), data.to_vec());
        self
    }

    pub(crate) fn with_credentials(mut self, credentials: Option<SharedCredentialsProvider>) -> Self {
        self.credentials = credentials;
        self
    }

    /// Insert an empty page at `index` of the listing.
    pub(crate) fn with_empty_page(mut self, index: usize) -> Self {
        self.empty_page_at = Some(index);
        self
    }

    pub(crate) fn with_listing_failure(mut self, index: usize) -> Self {
        self.failing_listing = Some(index);
        self
    }

    pub(crate) fn with_download_failure(mut self, key: &str) -> Self {
        self.failing_download = Some(key.to_owned());
        self
    }

    pub(crate) fn downloads(&self) -> Vec<String> {
        self.downloads.lock().unwrap().clone()
    }

    fn pages(&self, prefix: &str) -> Vec<Vec<ObjectEntry>> {
        let matching = self
            .objects
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .map(|(key, data)| ObjectEntry {
                key: key.clone(),
                size: data.len() as u64,
            })
            .collect::<Vec<_>>();
        let mut pages = matching
            .chunks(self.page_size)
            .map(|chunk| chunk.to_vec())
            .collect::<Vec<_>>();
        if let Some(index) = self.empty_page_at {
            pages.insert(index.min(pages.len()), Vec::new());
        }
        if pages.is_empty() {
            pages.push(Vec::new());
        }
        pages
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn check_credentials(&self) -> FetchResult<()> {
        basic::resolve_credentials(self.credentials.as_ref()).await?;
        Ok(())
    }

    async fn list_page(
        &self,
        _bucket: &str,
        prefix: &str,
        continuation: Option<String>,
    ) -> FetchResult<ListingPage> {
        let index = match continuation {
            Some(token) => token
                .parse::<usize>()
                .map_err(|_| FetchError::S3(format!("invalid continuation token: {}", token)))?,
            None => 0,
        };
        if self.failing_listing == Some(index) {
            return Err(FetchError::S3("listing interrupted".to_string()));
        }
        let pages = self.pages(prefix);
        let objects = pages.get(index).cloned().unwrap_or_default();
        let next_continuation = (index + 1 < pages.len()).then(|| (index + 1).to_string());
        Ok(ListingPage {
            objects,
            next_continuation,
        })
    }

    async fn download_object(
        &self,
        _bucket: &str,
        key: &str,
        destination: &Path,
    ) -> FetchResult<u64> {
        if self.failing_download.as_deref() == Some(key) {
            return Err(FetchError::S3(format!("connection reset while fetching {}", key)));
        }
        let data = self
            .objects
            .get(key)
            .ok_or_else(|| FetchError::S3(format!("NoSuchKey: {}", key)))?;
        tokio::fs::write(destination, data)
            .await
            .map_err(|err| FetchError::io(destination, err))?;
        self.downloads.lock().unwrap().push(key.to_owned());
        Ok(data.len() as u64)
    }
}
