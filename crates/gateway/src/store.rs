use crate::retention::{RetentionPolicy, SweepReport, select_expired};
use image::{ImageFormat, RgbImage};
use std::fmt;
use std::fs;
use std::io::{self, Cursor};
use std::path::{Component, Path, PathBuf};
use std::time::SystemTime;
use thiserror::Error;
use uuid::Uuid;

const TEMP_SUFFIX: &str = ".partial";

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Failed to create storage root {path}: {source}")]
    CreateRoot {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to encode {path}: {source}")]
    Encode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("Failed to scan {path}: {source}")]
    Scan {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupError {
    #[error("Forbidden")]
    Forbidden,

    #[error("Not found")]
    NotFound,
}

/// Per-request identifier, the filename stem of every artifact the request
/// produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ArtifactId(Uuid);

impl ArtifactId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ArtifactId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ArtifactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.as_hyphenated())
    }
}

/// Extension applied to both the stored upload and the rendered prediction.
///
/// Only `.jpg`, `.jpeg` and `.png` are kept (case-insensitively); everything
/// else becomes `.jpg`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImageExtension {
    #[default]
    Jpg,
    Jpeg,
    Png,
}

impl ImageExtension {
    pub fn from_filename(filename: Option<&str>) -> Self {
        let extension = filename
            .map(Path::new)
            .and_then(Path::extension)
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase);

        match extension.as_deref() {
            Some("jpeg") => Self::Jpeg,
            Some("png") => Self::Png,
            _ => Self::Jpg,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Jpg => ".jpg",
            Self::Jpeg => ".jpeg",
            Self::Png => ".png",
        }
    }

    pub fn image_format(&self) -> ImageFormat {
        match self {
            Self::Jpg | Self::Jpeg => ImageFormat::Jpeg,
            Self::Png => ImageFormat::Png,
        }
    }
}

impl fmt::Display for ImageExtension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn artifact_file_name(id: ArtifactId, extension: ImageExtension) -> String {
    format!("{}{}", id, extension)
}

/// Uploads and predictions on local disk, under two independent roots.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    upload_root: PathBuf,
    prediction_root: PathBuf,
}

impl ArtifactStore {
    /// Create both roots if needed. Safe to call on an existing layout.
    pub fn open(
        upload_root: impl AsRef<Path>,
        prediction_root: impl AsRef<Path>,
    ) -> Result<Self, StorageError> {
        Ok(Self {
            upload_root: create_root(upload_root.as_ref())?,
            prediction_root: create_root(prediction_root.as_ref())?,
        })
    }

    pub fn upload_root(&self) -> &Path {
        &self.upload_root
    }

    pub fn prediction_root(&self) -> &Path {
        &self.prediction_root
    }

    pub fn allocate_identifier(&self) -> ArtifactId {
        ArtifactId::new()
    }

    pub fn write_upload(
        &self,
        id: ArtifactId,
        extension: ImageExtension,
        bytes: &[u8],
    ) -> Result<PathBuf, StorageError> {
        let path = self.upload_root.join(artifact_file_name(id, extension));
        write_atomic(&path, bytes)?;
        Ok(path)
    }

    pub fn write_prediction(
        &self,
        id: ArtifactId,
        extension: ImageExtension,
        image: &RgbImage,
    ) -> Result<PathBuf, StorageError> {
        let path = self.prediction_root.join(artifact_file_name(id, extension));

        let mut encoded = Cursor::new(Vec::new());
        image
            .write_to(&mut encoded, extension.image_format())
            .map_err(|source| StorageError::Encode {
                path: path.clone(),
                source,
            })?;

        write_atomic(&path, encoded.get_ref())?;
        Ok(path)
    }

    /// Map a requested filename to an existing prediction file.
    ///
    /// Only plain, non-hidden names directly under the prediction root are
    /// served; anything that could address another location is `Forbidden`.
    pub fn resolve_prediction(&self, filename: &str) -> Result<PathBuf, LookupError> {
        validate_file_name(filename)?;

        let candidate = self.prediction_root.join(filename);
        let resolved = match fs::canonicalize(&candidate) {
            Ok(path) => path,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Err(LookupError::NotFound),
            Err(e) => {
                tracing::warn!(error = %e, filename, "Failed to resolve prediction");
                return Err(LookupError::NotFound);
            }
        };

        if !resolved.starts_with(&self.prediction_root) {
            tracing::warn!(filename, "Prediction resolves outside its root");
            return Err(LookupError::Forbidden);
        }
        if !resolved.is_file() {
            return Err(LookupError::NotFound);
        }

        Ok(resolved)
    }

    /// Apply `policy` to both roots independently.
    pub fn sweep(
        &self,
        policy: &RetentionPolicy,
        now: SystemTime,
    ) -> Result<SweepReport, StorageError> {
        let mut report = SweepReport::default();
        for root in [&self.upload_root, &self.prediction_root] {
            report += sweep_root(root, policy, now)?;
        }
        Ok(report)
    }
}

fn create_root(path: &Path) -> Result<PathBuf, StorageError> {
    let create_err = |source| StorageError::CreateRoot {
        path: path.to_path_buf(),
        source,
    };

    fs::create_dir_all(path).map_err(create_err)?;
    fs::canonicalize(path).map_err(create_err)
}

/// Write under a hidden sibling name, then rename into place, so the final
/// name only ever holds a complete file.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StorageError> {
    let write_err = |source| StorageError::Write {
        path: path.to_path_buf(),
        source,
    };

    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| write_err(io::Error::from(io::ErrorKind::InvalidInput)))?;
    let temp_path = path.with_file_name(format!(".{}{}", file_name, TEMP_SUFFIX));

    if let Err(e) = fs::write(&temp_path, bytes).and_then(|_| fs::rename(&temp_path, path)) {
        let _ = fs::remove_file(&temp_path);
        return Err(write_err(e));
    }

    Ok(())
}

fn validate_file_name(filename: &str) -> Result<(), LookupError> {
    if filename.is_empty()
        || filename.starts_with('.')
        || filename.contains(['/', '\\', '\0'])
    {
        return Err(LookupError::Forbidden);
    }

    let mut components = Path::new(filename).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(()),
        _ => Err(LookupError::Forbidden),
    }
}

fn sweep_root(
    root: &Path,
    policy: &RetentionPolicy,
    now: SystemTime,
) -> Result<SweepReport, StorageError> {
    let scan_err = |source| StorageError::Scan {
        path: root.to_path_buf(),
        source,
    };

    let mut files = Vec::new();
    for entry in fs::read_dir(root).map_err(scan_err)? {
        let entry = entry.map_err(scan_err)?;

        // In-flight writes are hidden and never swept
        if entry.file_name().to_string_lossy().starts_with('.') {
            continue;
        }

        let metadata = match entry.metadata() {
            Ok(metadata) if metadata.is_file() => metadata,
            Ok(_) => continue,
            Err(e) => {
                tracing::warn!(error = %e, path = %entry.path().display(), "Skipping unreadable entry");
                continue;
            }
        };
        let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
        files.push((entry.path(), modified));
    }

    let mut report = SweepReport {
        scanned: files.len(),
        removed: 0,
    };

    for path in select_expired(files, policy, now) {
        match fs::remove_file(&path) {
            Ok(()) => report.removed += 1,
            Err(e) => {
                tracing::warn!(error = %e, path = %path.display(), "Failed to remove expired artifact")
            }
        }
    }

    Ok(report)
}
