use std::{
    fs::File,
    io,
    path::{Path, PathBuf},
    pin::Pin,
    task::{Context, Poll},
};

use bytes::Bytes;
use tokio_stream::Stream;
use tokio_util::io::ReaderStream;
use tracing::{debug, info, warn};
use uuid::Uuid;
use walkdir::WalkDir;
use zip::{write::SimpleFileOptions, CompressionMethod, ZipWriter};

use crate::{config::DatasetConfig, error::AppError};

/// A temp archive on disk, deleted when this value is dropped.
///
/// The guard is created before the file is written and is carried through
/// the build and into the response body, so the file disappears on every
/// exit path: failed build, finished transfer or aborted connection.
#[derive(Debug)]
pub struct TempArchive {
    path: PathBuf,
}

impl TempArchive {
    /// Names a fresh archive in `work_dir`. The nonce keeps concurrent
    /// downloads by the same user from sharing a path.
    pub fn new(work_dir: &Path, owner: &str) -> Self {
        let name = format!(
            "dataset_{}_{}.zip",
            sanitize_component(owner),
            Uuid::new_v4().simple()
        );
        Self {
            path: work_dir.join(name),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TempArchive {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "temp archive removed"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(error = %e, path = %self.path.display(), "failed to remove temp archive"),
        }
    }
}

fn sanitize_component(s: &str) -> String {
    s.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Writes every file and directory under `source` into a deflated zip at `dest`.
/// Symlinks are followed; a link cycle fails the walk. Returns the number of
/// entries written.
pub fn write_zip(source: &Path, dest: &Path) -> anyhow::Result<usize> {
    let out = File::create(dest)?;
    let mut zip = ZipWriter::new(out);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    let walker = WalkDir::new(source)
        .follow_links(true)
        .min_depth(1)
        .sort_by_file_name();

    let mut entries = 0;
    for entry in walker {
        let entry = entry?;
        let path = entry.path();
        if path == dest {
            continue;
        }
        let name = path
            .strip_prefix(source)?
            .to_string_lossy()
            .replace('\\', "/");

        if entry.file_type().is_dir() {
            zip.add_directory(format!("{name}/"), options)?;
        } else if entry.file_type().is_file() {
            zip.start_file(name, options)?;
            let mut file = File::open(path)?;
            io::copy(&mut file, &mut zip)?;
        } else {
            warn!(path = %path.display(), "skipping entry that is neither file nor directory");
            continue;
        }
        entries += 1;
    }

    zip.finish()?;
    Ok(entries)
}

async fn is_dir(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_dir())
        .unwrap_or(false)
}

/// Packs the configured dataset source into a fresh temp archive.
///
/// Compression runs on the blocking pool. Missing dataset directories
/// surface as [`AppError::NotFound`], anything that goes wrong while
/// writing as [`AppError::Build`].
pub async fn build(config: &DatasetConfig, owner: &str) -> Result<TempArchive, AppError> {
    if !is_dir(&config.root).await {
        return Err(AppError::NotFound(
            "Dataset directory not found on server.".into(),
        ));
    }
    let source = config.source_path();
    if !is_dir(&source).await {
        return Err(AppError::NotFound(
            "Source dataset not found on server.".into(),
        ));
    }

    tokio::fs::create_dir_all(&config.work_dir)
        .await
        .map_err(|e| AppError::Build(e.into()))?;

    let archive = TempArchive::new(&config.work_dir, owner);
    info!(source = %source.display(), dest = %archive.path().display(), "zipping dataset");

    let (archive, written) = tokio::task::spawn_blocking(move || {
        let written = write_zip(&source, archive.path());
        (archive, written)
    })
    .await
    .map_err(|e| AppError::Build(e.into()))?;

    let entries = written.map_err(AppError::Build)?;

    let present = tokio::fs::metadata(archive.path())
        .await
        .map(|m| m.is_file())
        .unwrap_or(false);
    if !present {
        return Err(AppError::Build(anyhow::anyhow!(
            "archive {} missing after build",
            archive.path().display()
        )));
    }

    info!(entries, path = %archive.path().display(), "zipping complete");
    Ok(archive)
}

/// Response body stream that owns the temp archive it reads from.
pub struct ArchiveStream {
    inner: ReaderStream<tokio::fs::File>,
    _archive: TempArchive,
}

impl ArchiveStream {
    pub async fn open(archive: TempArchive) -> io::Result<(Self, u64)> {
        let file = tokio::fs::File::open(archive.path()).await?;
        let len = file.metadata().await?.len();
        Ok((
            Self {
                inner: ReaderStream::new(file),
                _archive: archive,
            },
            len,
        ))
    }
}

impl Stream for ArchiveStream {
    type Item = io::Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.get_mut().inner).poll_next(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use tempfile::TempDir;
    use tokio_stream::StreamExt;

    fn dataset_with_source(tmp: &TempDir) -> DatasetConfig {
        let root = tmp.path().to_path_buf();
        let source = root.join("dataset_source");
        std::fs::create_dir_all(source.join("images")).unwrap();
        std::fs::create_dir_all(source.join("empty")).unwrap();
        std::fs::write(source.join("images/crack_001.jpg"), b"\xff\xd8fake-jpeg").unwrap();
        std::fs::write(source.join("images/crack_001.json"), br#"{"type":"crack"}"#).unwrap();
        std::fs::write(source.join("README.txt"), b"road defects").unwrap();
        DatasetConfig {
            work_dir: root.clone(),
            root,
            source_dir: "dataset_source".into(),
        }
    }

    fn zips_in(dir: &Path) -> Vec<PathBuf> {
        std::fs::read_dir(dir)
            .unwrap()
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| p.extension().is_some_and(|ext| ext == "zip"))
            .collect()
    }

    #[test]
    fn temp_names_are_unique_and_safe() {
        let a = TempArchive::new(Path::new("/tmp"), "../alice");
        let b = TempArchive::new(Path::new("/tmp"), "../alice");
        assert_ne!(a.path(), b.path());
        assert_eq!(a.path().parent(), Some(Path::new("/tmp")));
        let name = a.path().file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("dataset____alice_"));
        assert!(name.ends_with(".zip"));
    }

    #[test]
    fn guard_deletes_file_on_drop() {
        let tmp = TempDir::new().unwrap();
        let archive = TempArchive::new(tmp.path(), "alice");
        std::fs::write(archive.path(), b"partial").unwrap();
        let path = archive.path().to_path_buf();
        drop(archive);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn build_packs_source_tree() {
        let tmp = TempDir::new().unwrap();
        let cfg = dataset_with_source(&tmp);

        let archive = build(&cfg, "alice").await.expect("build");
        let mut zip = zip::ZipArchive::new(File::open(archive.path()).unwrap()).unwrap();
        let mut names: Vec<String> = zip.file_names().map(String::from).collect();
        names.sort();
        assert_eq!(
            names,
            vec![
                "README.txt",
                "empty/",
                "images/",
                "images/crack_001.jpg",
                "images/crack_001.json",
            ]
        );

        let mut readme = String::new();
        zip.by_name("README.txt")
            .unwrap()
            .read_to_string(&mut readme)
            .unwrap();
        assert_eq!(readme, "road defects");

        drop(zip);
        drop(archive);
        assert!(zips_in(tmp.path()).is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn symlinked_files_are_archived() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().to_path_buf();
        let source = root.join("dataset_source");
        std::fs::create_dir_all(&source).unwrap();
        std::fs::write(root.join("real.jpg"), b"linked-bytes").unwrap();
        std::os::unix::fs::symlink(root.join("real.jpg"), source.join("linked.jpg")).unwrap();
        std::fs::write(source.join("plain.json"), b"{}").unwrap();
        let cfg = DatasetConfig {
            work_dir: root.clone(),
            root,
            source_dir: "dataset_source".into(),
        };

        let archive = build(&cfg, "alice").await.expect("build");
        let mut zip = zip::ZipArchive::new(File::open(archive.path()).unwrap()).unwrap();
        let mut names: Vec<String> = zip.file_names().map(String::from).collect();
        names.sort();
        assert_eq!(names, vec!["linked.jpg", "plain.json"]);

        let mut linked = String::new();
        zip.by_name("linked.jpg")
            .unwrap()
            .read_to_string(&mut linked)
            .unwrap();
        assert_eq!(linked, "linked-bytes");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn symlink_cycle_is_build_error() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().to_path_buf();
        let source = root.join("dataset_source");
        std::fs::create_dir_all(source.join("nested")).unwrap();
        std::os::unix::fs::symlink(&source, source.join("nested/loop")).unwrap();
        let cfg = DatasetConfig {
            work_dir: root.clone(),
            root,
            source_dir: "dataset_source".into(),
        };

        let err = build(&cfg, "alice").await.unwrap_err();
        assert!(matches!(err, AppError::Build(_)));
        assert!(zips_in(tmp.path()).is_empty());
    }

    #[tokio::test]
    async fn missing_root_is_not_found() {
        let tmp = TempDir::new().unwrap();
        let cfg = DatasetConfig {
            root: tmp.path().join("nope"),
            source_dir: "dataset_source".into(),
            work_dir: tmp.path().to_path_buf(),
        };
        let err = build(&cfg, "alice").await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(ref m) if m.contains("Dataset directory")));
        assert!(zips_in(tmp.path()).is_empty());
    }

    #[tokio::test]
    async fn missing_source_is_not_found_and_leaves_nothing() {
        let tmp = TempDir::new().unwrap();
        let cfg = DatasetConfig {
            root: tmp.path().to_path_buf(),
            source_dir: "dataset_source".into(),
            work_dir: tmp.path().to_path_buf(),
        };
        let err = build(&cfg, "alice").await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(ref m) if m.contains("Source dataset")));
        assert!(zips_in(tmp.path()).is_empty());
    }

    #[tokio::test]
    async fn unwritable_work_dir_is_build_error() {
        let tmp = TempDir::new().unwrap();
        let mut cfg = dataset_with_source(&tmp);
        // a regular file where the work directory should be
        let blocker = tmp.path().join("blocker");
        std::fs::write(&blocker, b"x").unwrap();
        cfg.work_dir = blocker.join("work");

        let err = build(&cfg, "alice").await.unwrap_err();
        assert!(matches!(err, AppError::Build(_)));
        assert!(zips_in(tmp.path()).is_empty());
    }

    #[tokio::test]
    async fn stream_removes_archive_when_dropped_early() {
        let tmp = TempDir::new().unwrap();
        let cfg = dataset_with_source(&tmp);
        let archive = build(&cfg, "alice").await.unwrap();
        let path = archive.path().to_path_buf();

        let (mut stream, len) = ArchiveStream::open(archive).await.unwrap();
        assert!(len > 0);
        let first = stream.next().await.expect("one chunk").unwrap();
        assert!(!first.is_empty());
        assert!(path.exists());

        drop(stream);
        assert!(!path.exists());
    }
}
