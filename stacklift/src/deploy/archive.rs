//! Content-addressed packaging of code bundles

use std::fs::File;
use std::io::{Cursor, Read, Write};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;
use tracing::{debug, info};
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipArchive, ZipWriter};

use crate::cloud::object_store::ObjectStore;
use crate::errors::DeployError;

const CHUNK_SIZE: usize = 4096;
const KEY_PREFIX: &str = "function";

/// Content hash of a bundle and the object key derived from it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveDescriptor {
    pub content_hash: String,
    pub object_key: String,
}

impl ArchiveDescriptor {
    fn from_hash(content_hash: String) -> Self {
        let object_key = format!("{}/{}.zip", KEY_PREFIX, content_hash);
        Self {
            content_hash,
            object_key,
        }
    }
}

/// A packaged bundle. The archive file is removed when this is dropped.
#[derive(Debug)]
pub struct PackagedArchive {
    file: NamedTempFile,
    pub descriptor: ArchiveDescriptor,
}

impl PackagedArchive {
    pub fn path(&self) -> &Path {
        self.file.path()
    }
}

/// Zip a directory on the blocking pool
pub async fn package(root: PathBuf) -> Result<PackagedArchive, DeployError> {
    tokio::task::spawn_blocking(move || package_dir(&root)).await?
}

/// Zip every file under `root` into a byte-stable archive. Symlinks are
/// followed and archived with their target's bytes.
///
/// Files are visited in file-name order, entries carry the zip epoch as their
/// modification time, and the content hash covers each relative path followed by
/// the file bytes.
pub fn package_dir(root: &Path) -> Result<PackagedArchive, DeployError> {
    if !root.is_dir() {
        return Err(DeployError::ConfigError(format!(
            "Function root is not a directory: {}",
            root.display()
        )));
    }

    let temp = tempfile::Builder::new()
        .prefix("archive-")
        .suffix(".zip")
        .tempfile()?;
    let mut writer = ZipWriter::new(temp);
    let mut hasher = Sha256::new();
    let mut buf = [0u8; CHUNK_SIZE];

    // Symlinks are archived as the files they point to; a dangling link is an error
    for entry in WalkDir::new(root).follow_links(true).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            DeployError::ConfigError(format!(
                "Failed to read {}: {}",
                e.path().unwrap_or(root).display(),
                e
            ))
        })?;
        if !entry.file_type().is_file() {
            continue;
        }

        let relative = relative_name(root, entry.path())?;
        let options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .last_modified_time(DateTime::default())
            .unix_permissions(entry_mode(&entry)?);

        writer.start_file(relative.as_str(), options)?;
        hasher.update(relative.as_bytes());
        hasher.update([0u8]);

        let mut file = File::open(entry.path())?;
        loop {
            let n = file.read(&mut buf)?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
            writer.write_all(&buf[..n])?;
        }
        debug!("Archived {}", relative);
    }

    let file = writer.finish()?;
    let descriptor = ArchiveDescriptor::from_hash(hex::encode(hasher.finalize()));

    Ok(PackagedArchive { file, descriptor })
}

/// Upload the archive unless its key already exists. Returns whether an upload happened.
pub async fn upload_if_absent(
    store: &dyn ObjectStore,
    bucket: &str,
    archive: &PackagedArchive,
) -> Result<bool, DeployError> {
    let key = &archive.descriptor.object_key;

    if store.object_exists(bucket, key).await? {
        info!("s3://{}/{} already exists, skipping upload", bucket, key);
        return Ok(false);
    }

    store.upload_file(bucket, key, archive.path()).await?;
    info!("Uploaded s3://{}/{}", bucket, key);
    Ok(true)
}

/// Unpack a zip archive into `target_dir`
pub fn extract_zip(bytes: Vec<u8>, target_dir: &Path) -> Result<(), DeployError> {
    std::fs::create_dir_all(target_dir)?;
    let mut archive = ZipArchive::new(Cursor::new(bytes))?;
    archive.extract(target_dir)?;
    Ok(())
}

fn relative_name(root: &Path, path: &Path) -> Result<String, DeployError> {
    let relative = path.strip_prefix(root).map_err(|_| {
        DeployError::ConfigError(format!("{} is outside {}", path.display(), root.display()))
    })?;

    Ok(relative
        .components()
        .map(|component| component.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/"))
}

#[cfg(unix)]
fn entry_mode(entry: &walkdir::DirEntry) -> Result<u32, DeployError> {
    use std::os::unix::fs::PermissionsExt;

    let mode = entry.metadata().map_err(std::io::Error::from)?.permissions().mode();
    Ok(if mode & 0o111 != 0 { 0o755 } else { 0o644 })
}

#[cfg(not(unix))]
fn entry_mode(_entry: &walkdir::DirEntry) -> Result<u32, DeployError> {
    Ok(0o644)
}
