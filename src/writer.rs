//! All-or-nothing persistence: stage in the destination directory, then rename.
//!
//! The staged file lives next to the destination so the final rename never
//! crosses a filesystem. Until that rename happens the staged file is owned by
//! a [`tempfile::TempPath`], which deletes it on every failure path, including
//! the writing future being dropped.

use std::io;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use tempfile::{PathPersistError, TempPath};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::error::Error;

/// Prefix of staged files.
pub const STAGING_PREFIX: &str = ".tmp-";

/// A committed file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Written {
    pub path: PathBuf,
    pub bytes: u64,
}

/// Write `body` to `dest` atomically.
///
/// Creates the parent directory if needed. A reader of `dest` sees either the
/// previous file (or nothing) or the complete new content.
///
/// # Errors
///
/// Any error yielded by `body` is returned unchanged. Filesystem failures are
/// [`Error::Io`]. A failure to remove the staged file is logged and never
/// replaces the original error.
pub async fn write_atomically<S>(dest: &Path, mut body: S) -> Result<Written, Error>
where
    S: Stream<Item = Result<Bytes, Error>> + Unpin,
{
    let file_name = dest.file_name().ok_or_else(|| {
        Error::io(
            dest,
            io::Error::new(io::ErrorKind::InvalidInput, "destination has no file name"),
        )
    })?;

    let parent = match dest.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    tokio::fs::create_dir_all(&parent)
        .await
        .map_err(|e| Error::io(&parent, e))?;

    let suffix = Path::new(file_name)
        .extension()
        .map(|ext| format!(".{}", ext.to_string_lossy()))
        .unwrap_or_default();

    let staged = tempfile::Builder::new()
        .prefix(STAGING_PREFIX)
        .suffix(&suffix)
        .rand_bytes(16)
        .tempfile_in(&parent)
        .map_err(|e| Error::io(&parent, e))?;
    let (file, temp_path) = staged.into_parts();
    debug!(staged = %temp_path.display(), dest = %dest.display(), "staging download");

    let bytes = match copy_stream(file, &temp_path, &mut body).await {
        Ok(bytes) => bytes,
        Err(err) => {
            discard(temp_path);
            return Err(err);
        }
    };

    if let Err(PathPersistError { error, path }) = temp_path.persist(dest) {
        discard(path);
        return Err(Error::io(dest, error));
    }

    Ok(Written {
        path: dest.to_path_buf(),
        bytes,
    })
}

async fn copy_stream<S>(file: std::fs::File, path: &Path, body: &mut S) -> Result<u64, Error>
where
    S: Stream<Item = Result<Bytes, Error>> + Unpin,
{
    let mut file = tokio::fs::File::from_std(file);
    let mut written: u64 = 0;

    while let Some(chunk) = body.next().await {
        let chunk = chunk?;
        file.write_all(&chunk)
            .await
            .map_err(|e| Error::io(path, e))?;
        written += chunk.len() as u64;
    }

    file.flush().await.map_err(|e| Error::io(path, e))?;
    file.sync_all().await.map_err(|e| Error::io(path, e))?;
    Ok(written)
}

/// Best-effort removal of a staged file.
fn discard(path: TempPath) {
    let shown = path.to_path_buf();
    if let Err(err) = path.close() {
        warn!(staged = %shown.display(), error = %err, "failed to remove staged file");
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use futures_util::stream;

    use super::*;

    fn chunks(parts: &[&'static str]) -> impl Stream<Item = Result<Bytes, Error>> + Unpin {
        let items: Vec<Result<Bytes, Error>> = parts
            .iter()
            .copied()
            .map(|p| Ok(Bytes::from_static(p.as_bytes())))
            .collect();
        stream::iter(items)
    }

    fn staged_leftovers(dir: &Path) -> Vec<String> {
        std::fs::read_dir(dir)
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|name| name.starts_with(STAGING_PREFIX))
            .collect()
    }

    #[tokio::test]
    async fn test_write_commits_full_content() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("image.png");

        let written = write_atomically(&dest, chunks(&["hello ", "world"]))
            .await
            .unwrap();

        assert_eq!(written.bytes, 11);
        assert_eq!(written.path, dest);
        assert_eq!(std::fs::read(&dest).unwrap(), b"hello world");
        assert!(staged_leftovers(dir.path()).is_empty());
    }

    #[tokio::test]
    async fn test_creates_missing_parent() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("a").join("b").join("out.webp");

        write_atomically(&dest, chunks(&["x"])).await.unwrap();
        assert_eq!(std::fs::read(&dest).unwrap(), b"x");
    }

    #[tokio::test]
    async fn test_empty_body_creates_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("empty.bin");

        let written = write_atomically(&dest, chunks(&[])).await.unwrap();
        assert_eq!(written.bytes, 0);
        assert_eq!(std::fs::metadata(&dest).unwrap().len(), 0);
    }

    #[tokio::test]
    async fn test_mid_stream_failure_leaves_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("image.png");

        let body = stream::iter(vec![
            Ok(Bytes::from_static(b"first chunk")),
            Err(Error::io(
                "disk",
                io::Error::new(io::ErrorKind::Other, "injected write failure"),
            )),
            Ok(Bytes::from_static(b"never written")),
        ]);

        let err = write_atomically(&dest, body).await.unwrap_err();
        assert!(matches!(err, Error::Io { ref path, .. } if path == Path::new("disk")));
        assert!(!dest.exists());
        assert!(staged_leftovers(dir.path()).is_empty());
    }

    #[tokio::test]
    async fn test_failure_keeps_previous_file() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("image.png");
        std::fs::write(&dest, b"previous").unwrap();

        let body = stream::iter(vec![
            Ok(Bytes::from_static(b"new")),
            Err(Error::size_exceeded("https://cdn.example.com/x", 3, 6)),
        ]);

        let err = write_atomically(&dest, body).await.unwrap_err();
        assert!(matches!(err, Error::SizeExceeded { .. }));
        assert_eq!(std::fs::read(&dest).unwrap(), b"previous");
        assert!(staged_leftovers(dir.path()).is_empty());
    }

    #[tokio::test]
    async fn test_overwrite_replaces_not_merges() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("out.txt");

        write_atomically(&dest, chunks(&["a much longer first version"]))
            .await
            .unwrap();
        let written = write_atomically(&dest, chunks(&["short"])).await.unwrap();

        assert_eq!(written.bytes, 5);
        assert_eq!(std::fs::read(&dest).unwrap(), b"short");
    }

    #[tokio::test]
    async fn test_cancelled_write_leaves_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("image.png");

        let body = stream::iter(vec![Ok(Bytes::from_static(b"partial"))]).chain(stream::pending());
        let outcome =
            tokio::time::timeout(Duration::from_millis(50), write_atomically(&dest, body)).await;

        assert!(outcome.is_err());
        assert!(!dest.exists());
        assert!(staged_leftovers(dir.path()).is_empty());
    }

    #[tokio::test]
    async fn test_rename_failure_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        // a non-empty directory cannot be replaced by a file
        let dest = dir.path().join("taken");
        std::fs::create_dir(&dest).unwrap();
        std::fs::write(dest.join("keep.txt"), b"keep").unwrap();

        let err = write_atomically(&dest, chunks(&["payload"])).await.unwrap_err();

        assert!(matches!(err, Error::Io { ref path, .. } if path == &dest));
        assert!(dest.is_dir());
        assert_eq!(std::fs::read(dest.join("keep.txt")).unwrap(), b"keep");
        assert!(staged_leftovers(dir.path()).is_empty());
    }

    #[tokio::test]
    async fn test_destination_without_file_name() {
        let err = write_atomically(Path::new("/"), chunks(&["x"]))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Io { .. }));
    }
}
