//! Encoding cache builder.
//!
//! Walks a directory of labeled images (`<root>/<Name>/<image>`), encodes the
//! first face of every image not yet in the cache, and rewrites the cache
//! with the merged result.

use crate::cache::{CacheError, EncodingCache, EncodingRecord};
use crate::pipeline::{FaceEncoder, FaceLocator, PipelineError};
use crate::types::UNLABELED;
use image::ImageError;
use std::path::{Path, PathBuf};
use std::thread;
use thiserror::Error;
use walkdir::WalkDir;

/// Default input directory, relative to the working directory.
pub const DEFAULT_FACES_DIR: &str = "faces";

/// Extensions picked up by discovery, compared case-insensitively.
pub const IMAGE_EXTENSIONS: [&str; 5] = ["jpg", "jpeg", "png", "gif", "bmp"];

#[derive(Error, Debug)]
pub enum BuildError {
    #[error("image directory not found: {0}")]
    MissingDirectory(PathBuf),
    #[error("failed to walk image directory: {0}")]
    Walk(#[from] walkdir::Error),
    #[error("failed to create face extractor: {0}")]
    Extractor(#[source] PipelineError),
    #[error(transparent)]
    Cache(#[from] CacheError),
}

/// Why a single image produced no cache entry.
#[derive(Error, Debug)]
pub enum ItemError {
    #[error("unsupported image format: {0}")]
    Unsupported(String),
    #[error("cannot decode image: {0}")]
    Decode(String),
    #[error("no face found")]
    NoFace,
    #[error("face extraction failed: {0}")]
    Extraction(#[from] PipelineError),
}

impl From<ImageError> for ItemError {
    fn from(err: ImageError) -> Self {
        match err {
            ImageError::Unsupported(e) => ItemError::Unsupported(e.to_string()),
            other => ItemError::Decode(other.to_string()),
        }
    }
}

/// Outcome counts of one build run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuildReport {
    /// Image files found under the root.
    pub discovered: usize,
    /// Files skipped because their path was already cached.
    pub skipped: usize,
    /// New cache entries written.
    pub added: usize,
    /// Files that decoded but contained no face.
    pub no_face: usize,
    /// Files that could not be decoded or encoded.
    pub failed: usize,
}

/// Label for an image: the name of its parent directory, or `unknown`.
pub fn label_for(path: &Path) -> String {
    path.parent()
        .and_then(|p| p.file_name())
        .map(|n| n.to_string_lossy().into_owned())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| UNLABELED.to_string())
}

/// Cache key for an image path.
pub fn cache_key(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| IMAGE_EXTENSIONS.iter().any(|known| known.eq_ignore_ascii_case(ext)))
}

/// Recursively list image files under `root`, sorted by path.
pub fn discover_images(root: &Path) -> Result<Vec<PathBuf>, BuildError> {
    if !root.is_dir() {
        return Err(BuildError::MissingDirectory(root.to_path_buf()));
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry?;
        if entry.file_type().is_file() && is_image(entry.path()) {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

/// Decode one image and encode its first face.
pub fn encode_image<E>(extractor: &mut E, path: &Path) -> Result<EncodingRecord, ItemError>
where
    E: FaceLocator + FaceEncoder,
{
    let image = image::open(path)?.to_rgb8();
    let faces = extractor.locate(&image)?;
    let Some(first) = faces.into_iter().next() else {
        return Err(ItemError::NoFace);
    };
    let encoding = extractor
        .encode(&image, std::slice::from_ref(&first))?
        .into_iter()
        .next()
        .ok_or(ItemError::NoFace)?;
    Ok(EncodingRecord::new(encoding, label_for(path)))
}

type ItemResult = (PathBuf, Result<EncodingRecord, ItemError>);

/// Builds or extends an [`EncodingCache`] from an image directory.
///
/// Each worker thread owns an extractor made by `factory`; extractors are
/// only created when there is new work.
pub struct CacheBuilder<F> {
    factory: F,
    workers: usize,
}

impl<F, E> CacheBuilder<F>
where
    F: FnMut() -> Result<E, PipelineError>,
    E: FaceLocator + FaceEncoder + Send,
{
    pub fn new(factory: F) -> Self {
        let workers = thread::available_parallelism().map_or(1, |n| n.get());
        Self { factory, workers }
    }

    /// Number of worker threads (minimum 1).
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Encode new images under `root` and rewrite `output` with old + new entries.
    pub fn build(&mut self, root: &Path, output: &Path) -> Result<BuildReport, BuildError> {
        let mut cache = EncodingCache::load_or_empty(output);
        let files = discover_images(root)?;

        let mut report = BuildReport {
            discovered: files.len(),
            ..BuildReport::default()
        };
        let pending: Vec<PathBuf> = files
            .into_iter()
            .filter(|f| !cache.contains(&cache_key(f)))
            .collect();
        report.skipped = report.discovered - pending.len();

        tracing::info!(
            root = %root.display(),
            discovered = report.discovered,
            pending = pending.len(),
            "scanning image directory"
        );

        for (path, result) in self.encode_batch(pending)? {
            match result {
                Ok(record) => {
                    tracing::debug!(path = %path.display(), name = %record.name, "encoded face");
                    cache.insert(cache_key(&path), record);
                    report.added += 1;
                }
                Err(ItemError::NoFace) => {
                    tracing::debug!(path = %path.display(), "no face found");
                    report.no_face += 1;
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "skipping image");
                    report.failed += 1;
                }
            }
        }

        cache.save(output)?;
        Ok(report)
    }

    /// Encode `files` in parallel. Completion order is not preserved.
    fn encode_batch(&mut self, files: Vec<PathBuf>) -> Result<Vec<ItemResult>, BuildError> {
        if files.is_empty() {
            return Ok(Vec::new());
        }

        let workers = self.workers.min(files.len());
        let extractors = (0..workers)
            .map(|_| (self.factory)())
            .collect::<Result<Vec<E>, _>>()
            .map_err(BuildError::Extractor)?;

        let (job_tx, job_rx) = crossbeam_channel::bounded::<PathBuf>(workers * 2);
        let (result_tx, result_rx) = crossbeam_channel::unbounded::<ItemResult>();

        thread::scope(|scope| {
            for (id, mut extractor) in extractors.into_iter().enumerate() {
                let job_rx = job_rx.clone();
                let result_tx = result_tx.clone();
                scope.spawn(move || {
                    tracing::debug!(worker = id, "encoder worker started");
                    for path in job_rx {
                        tracing::debug!(worker = id, path = %path.display(), "processing");
                        let result = encode_image(&mut extractor, &path);
                        if result_tx.send((path, result)).is_err() {
                            break;
                        }
                    }
                });
            }
            drop(result_tx);
            drop(job_rx);

            for path in files {
                if job_tx.send(path).is_err() {
                    break;
                }
            }
            drop(job_tx);
        });

        Ok(result_rx.into_iter().collect())
    }
}
