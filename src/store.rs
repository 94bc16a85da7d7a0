//! Remote object listing and download.

use crate::basic::{self, FetchParams};
use crate::error::{FetchError, FetchResult};
use async_trait::async_trait;
use aws_credential_types::provider::SharedCredentialsProvider;
use aws_sdk_s3::{error::DisplayErrorContext, Client};
use log::{debug, error};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectEntry {
    pub key: String,
    pub size: u64,
}

/// One page of a listing. `next_continuation` is set when more pages follow.
#[derive(Debug, Clone, Default)]
pub struct ListingPage {
    pub objects: Vec<ObjectEntry>,
    pub next_continuation: Option<String>,
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fail early when no usable credentials can be resolved.
    async fn check_credentials(&self) -> FetchResult<()>;

    async fn list_page(
        &self,
        bucket: &str,
        prefix: &str,
        continuation: Option<String>,
    ) -> FetchResult<ListingPage>;

    /// Write the object to `destination`, replacing any existing file.
    /// Returns the number of bytes written.
    async fn download_object(&self, bucket: &str, key: &str, destination: &Path)
        -> FetchResult<u64>;
}

/// Forward-only sequence of listing pages.
///
/// Always yields at least one page, stops after the last one or after the
/// first error. Create a new one to start the listing over.
pub struct Pages<'a, S: ObjectStore + ?Sized> {
    store: &'a S,
    bucket: &'a str,
    prefix: &'a str,
    continuation: Option<String>,
    exhausted: bool,
}

impl<'a, S: ObjectStore + ?Sized> Pages<'a, S> {
    pub fn new(store: &'a S, bucket: &'a str, prefix: &'a str) -> Self {
        Self {
            store,
            bucket,
            prefix,
            continuation: None,
            exhausted: false,
        }
    }

    pub async fn next_page(&mut self) -> Option<FetchResult<ListingPage>> {
        if self.exhausted {
            return None;
        }
        let result = self
            .store
            .list_page(self.bucket, self.prefix, self.continuation.take())
            .await;
        match &result {
            Ok(page) => {
                self.continuation = page.next_continuation.clone();
                self.exhausted = self.continuation.is_none();
            }
            Err(_) => self.exhausted = true,
        }
        Some(result)
    }
}

/// `ObjectStore` backed by the aws s3 sdk.
#[derive(Clone, Debug)]
pub struct S3Store {
    client: Client,
    credentials: Option<SharedCredentialsProvider>,
}

impl S3Store {
    pub fn new(client: Client, credentials: Option<SharedCredentialsProvider>) -> Self {
        Self {
            client,
            credentials,
        }
    }

    pub async fn from_params(params: &FetchParams) -> Self {
        let config = basic::load_sdk_config(params).await;
        let client = basic::create_s3_client(&config, params);
        Self::new(client, config.credentials_provider())
    }
}

fn partial_path(destination: &Path) -> PathBuf {
    let mut name = destination
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_default();
    name.push(".part");
    destination.with_file_name(name)
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn check_credentials(&self) -> FetchResult<()> {
        basic::resolve_credentials(self.credentials.as_ref()).await?;
        Ok(())
    }

    async fn list_page(
        &self,
        bucket: &str,
        prefix: &str,
        continuation: Option<String>,
    ) -> FetchResult<ListingPage> {
        debug!(
            "list_objects_v2 bucket: {}, prefix: '{}', continuation: {:?}",
            bucket, prefix, continuation
        );
        let output = self
            .client
            .list_objects_v2()
            .bucket(bucket)
            .prefix(prefix)
            .set_continuation_token(continuation)
            .send()
            .await
            .map_err(|err| FetchError::S3(DisplayErrorContext(&err).to_string()))?;
        let objects = output
            .contents()
            .iter()
            .filter_map(|object| {
                object.key().map(|key| ObjectEntry {
                    key: key.to_owned(),
                    size: object.size().unwrap_or_default().max(0) as u64,
                })
            })
            .collect::<Vec<_>>();
        let next_continuation = if output.is_truncated().unwrap_or(false) {
            output.next_continuation_token().map(str::to_owned)
        } else {
            None
        };
        debug!(
            "list_objects_v2 returned {} objects, truncated: {}",
            objects.len(),
            next_continuation.is_some()
        );
        Ok(ListingPage {
            objects,
            next_continuation,
        })
    }

    async fn download_object(
        &self,
        bucket: &str,
        key: &str,
        destination: &Path,
    ) -> FetchResult<u64> {
        let mut resp = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|err| FetchError::S3(DisplayErrorContext(&err).to_string()))?;
        // Stream into a sibling file and move it into place once complete.
        let partial = partial_path(destination);
        let mut file = tokio::fs::File::create(&partial)
            .await
            .map_err(|err| FetchError::io(&partial, err))?;
        let mut byte_count = 0_u64;
        let written: FetchResult<()> = async {
            while let Some(bytes) = resp
                .body
                .try_next()
                .await
                .map_err(|err| FetchError::S3(DisplayErrorContext(&err).to_string()))?
            {
                file.write_all(&bytes)
                    .await
                    .map_err(|err| FetchError::io(&partial, err))?;
                byte_count += bytes.len() as u64;
            }
            file.flush().await.map_err(|err| FetchError::io(&partial, err))
        }
        .await;
        drop(file);
        if let Err(err) = written {
            if let Err(cleanup) = tokio::fs::remove_file(&partial).await {
                error!("failed to remove {}: {}", partial.display(), cleanup);
            }
            return Err(err);
        }
        tokio::fs::rename(&partial, destination)
            .await
            .map_err(|err| FetchError::io(destination, err))?;
        Ok(byte_count)
    }
}
