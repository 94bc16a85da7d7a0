use crate::error::{FetchError, FetchResult};
use crate::store::{ObjectStore, Pages};
use log::{debug, info, warn};
use std::path::{Path, PathBuf};

/// Where a listed key lands, relative to the local folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocalTarget {
    File(PathBuf),
    /// Directory marker keys, ending in `/`.
    Directory(PathBuf),
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DownloadSummary {
    pub files: u64,
    pub directories: u64,
    pub bytes: u64,
}

// Split on '/', drop empty and '.' components and resolve '..'.
// None when the path climbs above its root.
fn normalize(path: &str) -> Option<Vec<&str>> {
    let mut parts = Vec::new();
    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                parts.pop()?;
            }
            part => parts.push(part),
        }
    }
    Some(parts)
}

/// Map an object key to its local target by stripping `prefix`.
///
/// A prefix ending mid-component (`logs/2024-`) is taken relative to its
/// parent directory, so `logs/2024-01/x` becomes `2024-01/x`. A key equal to
/// the prefix lands under its own file name.
pub fn local_target(key: &str, prefix: &str) -> FetchResult<LocalTarget> {
    let unsafe_key = || FetchError::UnsafeKey(key.to_owned());
    let key_parts = normalize(key).ok_or_else(unsafe_key)?;
    let prefix_parts = normalize(prefix).ok_or_else(unsafe_key)?;
    let mut base = if key_parts.starts_with(&prefix_parts) {
        prefix_parts.len()
    } else {
        let parent = &prefix_parts[..prefix_parts.len().saturating_sub(1)];
        if !key_parts.starts_with(parent) {
            return Err(unsafe_key());
        }
        parent.len()
    };
    if key.ends_with('/') {
        let relative = key_parts[base..].iter().collect::<PathBuf>();
        return Ok(LocalTarget::Directory(relative));
    }
    if base == key_parts.len() {
        if base == 0 {
            return Err(unsafe_key());
        }
        base -= 1;
    }
    let relative = key_parts[base..].iter().collect::<PathBuf>();
    Ok(LocalTarget::File(relative))
}

async fn ensure_dir(path: &Path) -> FetchResult<()> {
    tokio::fs::create_dir_all(path)
        .await
        .map_err(|err| FetchError::io(path, err))
}

/// Mirror every object under `prefix` into `local_folder`.
///
/// Objects are fetched one at a time in listing order. Any page without
/// contents ends the run with `FetchError::NoObjects`; files written before
/// a failure are left in place.
pub async fn download_prefix<S: ObjectStore + ?Sized>(
    store: &S,
    bucket: &str,
    local_folder: &Path,
    prefix: &str,
    progress: &(dyn Fn(&str, &Path) + Send + Sync),
) -> FetchResult<DownloadSummary> {
    ensure_dir(local_folder).await?;
    store.check_credentials().await?;

    let mut summary = DownloadSummary::default();
    let mut pages = Pages::new(store, bucket, prefix);
    while let Some(page) = pages.next_page().await {
        let page = page?;
        if page.objects.is_empty() {
            info!("no objects under s3://{}/{}", bucket, prefix);
            return Err(FetchError::NoObjects(prefix.to_owned()));
        }
        for object in &page.objects {
            match local_target(&object.key, prefix)? {
                LocalTarget::Directory(relative) => {
                    let local_dir = local_folder.join(relative);
                    debug!("directory marker {} -> {}", object.key, local_dir.display());
                    ensure_dir(&local_dir).await?;
                    summary.directories += 1;
                }
                LocalTarget::File(relative) => {
                    let local_path = local_folder.join(relative);
                    if let Some(parent) = local_path.parent() {
                        ensure_dir(parent).await?;
                    }
                    progress(&object.key, &local_path);
                    let bytes = store
                        .download_object(bucket, &object.key, &local_path)
                        .await?;
                    if bytes != object.size {
                        warn!(
                            "{} was listed with {} bytes but {} were written",
                            object.key, object.size, bytes
                        );
                    }
                    info!("downloaded {} ({} bytes) to {}", object.key, bytes, local_path.display());
                    summary.files += 1;
                    summary.bytes += bytes;
                }
            }
        }
    }
    info!(
        "downloaded {} objects ({} bytes) from s3://{}/{}",
        summary.files, summary.bytes, bucket, prefix
    );
    Ok(summary)
}
