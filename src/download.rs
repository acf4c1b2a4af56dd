//! The full pipeline: validate, fetch with revalidated redirects, persist atomically.

use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::Error;
use crate::fetch::{fetch_with, Transport};
use crate::policy::FetchPolicy;
use crate::writer::write_atomically;

/// A completed download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Downloaded {
    pub path: PathBuf,
    pub bytes: u64,
    /// URL the body was read from, after redirects.
    pub final_url: String,
    pub redirects: u32,
}

/// Download `url` to `dest` through `transport`.
///
/// On success `dest` holds exactly the fetched bytes. On any failure `dest` is
/// left as it was and no staged file remains. Nothing touches the filesystem
/// until a 2xx response has been obtained.
pub async fn download_with<T>(
    transport: &T,
    url: &str,
    dest: impl AsRef<Path>,
    policy: &FetchPolicy,
) -> Result<Downloaded, Error>
where
    T: Transport + ?Sized,
{
    let dest = dest.as_ref();

    let pipeline = async {
        let fetched = fetch_with(transport, url, policy).await?;
        let redirects = fetched.redirects();
        let final_url = fetched.final_url().as_str().to_string();

        let written = write_atomically(dest, fetched.body).await?;
        info!(
            path = %written.path.display(),
            bytes = written.bytes,
            redirects,
            "download saved"
        );

        Ok::<_, Error>(Downloaded {
            path: written.path,
            bytes: written.bytes,
            final_url,
            redirects,
        })
    };

    match policy.overall_timeout() {
        Some(limit) => tokio::time::timeout(limit, pipeline)
            .await
            .unwrap_or_else(|_| {
                Err(Error::Timeout {
                    url: url.to_string(),
                    after: limit,
                })
            }),
        None => pipeline.await,
    }
}

/// Download with the default reqwest transport.
///
/// # Example
///
/// ```rust,no_run
/// use fetch_jail::{download, FetchPolicy};
///
/// # async fn example() -> Result<(), fetch_jail::Error> {
/// let saved = download("https://example.com/image.png", "out/image.png", &FetchPolicy::default()).await?;
/// println!("{} ({} bytes)", saved.path.display(), saved.bytes);
/// # Ok(())
/// # }
/// ```
#[cfg(feature = "fetch")]
pub async fn download(
    url: &str,
    dest: impl AsRef<Path>,
    policy: &FetchPolicy,
) -> Result<Downloaded, Error> {
    let transport = crate::transport::ReqwestTransport::new()?;
    download_with(&transport, url, dest, policy).await
}

/// Synchronous version of [`download`].
///
/// Outside a Tokio runtime a temporary one is created. Inside a multi-thread
/// runtime the current worker blocks in place. Inside a current-thread runtime
/// the download runs on a helper thread with its own runtime, and the calling
/// thread (and with it that runtime) is blocked until it finishes.
#[cfg(feature = "fetch")]
pub fn download_sync(
    url: &str,
    dest: impl AsRef<Path>,
    policy: &FetchPolicy,
) -> Result<Downloaded, Error> {
    use tokio::runtime::{Handle, RuntimeFlavor};

    let dest = dest.as_ref();
    match Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
            tokio::task::block_in_place(|| handle.block_on(download(url, dest, policy)))
        }
        // block_in_place panics on a current-thread runtime
        Ok(_) => std::thread::scope(|scope| {
            scope
                .spawn(|| block_on_new_runtime(url, dest, policy))
                .join()
                .unwrap_or_else(|panic| std::panic::resume_unwind(panic))
        }),
        Err(_) => block_on_new_runtime(url, dest, policy),
    }
}

#[cfg(feature = "fetch")]
fn block_on_new_runtime(url: &str, dest: &Path, policy: &FetchPolicy) -> Result<Downloaded, Error> {
    let rt = tokio::runtime::Runtime::new().map_err(|e| Error::io(dest, e))?;
    rt.block_on(download(url, dest, policy))
}
