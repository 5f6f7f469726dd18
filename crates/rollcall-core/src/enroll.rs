//! Enrollment of known faces from a directory of reference images.
//!
//! Each image named `Person_Name.ext` must contain exactly one face; its
//! embedding is enrolled under the display name "Person Name".

use crate::provider::{convert_color_order, FaceProvider};
use crate::types::{Embedding, Identity};
use serde::Serialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

const IMAGE_EXTENSIONS: [&str; 3] = [".jpg", ".jpeg", ".png"];

#[derive(Error, Debug)]
pub enum EnrollError {
    #[error("images directory not found: {}", .0.display())]
    DirectoryNotFound(PathBuf),
    #[error("cannot list images in {}: {source}", .path.display())]
    ListFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("no .jpg, .jpeg or .png images in {}", .0.display())]
    NoImages(PathBuf),
    #[error("no valid faces enrolled from {}", .0.display())]
    NoValidFaces(PathBuf),
}

/// What happened to one reference image.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum EnrollStatus {
    Enrolled { name: String },
    NoFace,
    MultipleFaces(usize),
    Failed(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct FileReport {
    pub file: String,
    pub status: EnrollStatus,
}

/// The enrolled identity set plus a per-file account of how it was built.
#[derive(Debug, Clone)]
pub struct Enrollment {
    pub identities: Vec<Identity>,
    pub report: Vec<FileReport>,
}

impl Enrollment {
    /// Recognition model the enrolled embeddings came from, if the provider
    /// records one.
    pub fn model_version(&self) -> Option<&str> {
        self.identities
            .iter()
            .find_map(|i| i.embedding.model_version.as_deref())
    }
}

/// True for file names ending in a recognized image extension (any case).
pub fn is_image_file(file_name: &str) -> bool {
    let lower = file_name.to_lowercase();
    IMAGE_EXTENSIONS.iter().any(|ext| lower.ends_with(ext))
}

/// Display name for a reference image: extension stripped, underscores to
/// spaces, trimmed, each word title-cased.
pub fn display_name(file_name: &str) -> String {
    let stem = Path::new(file_name)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    title_case(stem.replace('_', " ").trim())
}

/// First letter of every alphabetic run upper-cased, the rest lower-cased.
fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev_alpha = false;
    for c in s.chars() {
        if prev_alpha {
            out.extend(c.to_lowercase());
        } else {
            out.extend(c.to_uppercase());
        }
        prev_alpha = c.is_alphabetic();
    }
    out
}

/// Enroll every reference image in `dir`.
///
/// Files are visited in name order. Images with zero or several faces, and
/// images that fail to load, are skipped. An empty result is an error.
pub fn enroll_directory<P: FaceProvider + ?Sized>(
    dir: &Path,
    provider: &mut P,
) -> Result<Enrollment, EnrollError> {
    if !dir.is_dir() {
        return Err(EnrollError::DirectoryNotFound(dir.to_path_buf()));
    }

    let list_failed = |source| EnrollError::ListFailed {
        path: dir.to_path_buf(),
        source,
    };
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(list_failed)? {
        let entry = entry.map_err(list_failed)?;
        match entry.file_name().into_string() {
            Ok(name) if is_image_file(&name) => files.push(name),
            Ok(_) => {}
            Err(raw) => tracing::warn!(file = ?raw, "skipping non UTF-8 file name"),
        }
    }
    files.sort();

    if files.is_empty() {
        return Err(EnrollError::NoImages(dir.to_path_buf()));
    }

    tracing::info!(dir = %dir.display(), images = files.len(), "loading known faces");

    let mut identities = Vec::new();
    let mut report = Vec::with_capacity(files.len());

    for file in files {
        let status = match enroll_file(&dir.join(&file), provider) {
            Ok(embedding) => {
                let name = display_name(&file);
                tracing::info!(%file, %name, "enrolled");
                identities.push(Identity {
                    name: name.clone(),
                    embedding,
                });
                EnrollStatus::Enrolled { name }
            }
            Err(status) => {
                match &status {
                    EnrollStatus::NoFace => tracing::warn!(%file, "no face found, skipping"),
                    EnrollStatus::MultipleFaces(n) => {
                        tracing::warn!(%file, faces = n, "multiple faces found, skipping for unambiguous enrollment")
                    }
                    EnrollStatus::Failed(reason) => tracing::error!(%file, %reason, "failed to process image"),
                    EnrollStatus::Enrolled { .. } => {}
                }
                status
            }
        };
        report.push(FileReport { file, status });
    }

    if identities.is_empty() {
        return Err(EnrollError::NoValidFaces(dir.to_path_buf()));
    }

    let enrollment = Enrollment { identities, report };
    tracing::info!(
        count = enrollment.identities.len(),
        names = ?enrollment.identities.iter().map(|i| i.name.as_str()).collect::<Vec<_>>(),
        model = enrollment.model_version().unwrap_or("unversioned"),
        "known faces loaded"
    );

    Ok(enrollment)
}

/// The single embedding of a reference image, or why there is none.
fn enroll_file<P: FaceProvider + ?Sized>(path: &Path, provider: &mut P) -> Result<Embedding, EnrollStatus> {
    let image = image::open(path)
        .map_err(|e| EnrollStatus::Failed(format!("decode: {e}")))?
        .to_rgb8();
    let image = convert_color_order(&image, provider.color_order());

    let faces = provider
        .locate(&image)
        .map_err(|e| EnrollStatus::Failed(e.to_string()))?;
    match faces.len() {
        0 => return Err(EnrollStatus::NoFace),
        1 => {}
        n => return Err(EnrollStatus::MultipleFaces(n)),
    }

    let mut embeddings = provider
        .embed(&image, &faces)
        .map_err(|e| EnrollStatus::Failed(e.to_string()))?;
    match embeddings.len() {
        0 => Err(EnrollStatus::NoFace),
        1 => Ok(embeddings.remove(0)),
        n => Err(EnrollStatus::MultipleFaces(n)),
    }
}
