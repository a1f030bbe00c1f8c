use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::detection::domain::face_locator::FaceLocator;
use crate::recognition::domain::embedding_provider::EmbeddingProvider;
use crate::recognition::domain::face_embedding::FaceEmbedding;
use crate::recognition::domain::known_identity_set::{
    IdentityLabel, IdentitySetError, KnownIdentitySet, LabeledEmbedding,
};
use crate::shared::constants::IMAGE_EXTENSIONS;
use crate::video::domain::image_reader::ImageReader;

#[derive(Error, Debug)]
pub enum BuildError {
    #[error("corpus directory {0} does not exist")]
    CorpusMissing(PathBuf),
    #[error("no face embeddings produced from {root} ({images} images scanned)")]
    EmptyCorpus { root: PathBuf, images: usize },
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    InvalidSet(#[from] IdentitySetError),
}

/// Why a corpus image contributed nothing.
#[derive(Clone, Debug, PartialEq)]
pub enum SkipReason {
    Unreadable(String),
    NoFace,
    NoEmbedding,
    EmbeddingFailed(String),
    DimensionMismatch { expected: usize, found: usize },
}

#[derive(Clone, Debug, PartialEq)]
pub struct SkippedImage {
    pub path: PathBuf,
    pub label: IdentityLabel,
    pub reason: SkipReason,
}

/// What a build looked at and what it dropped.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BuildReport {
    pub images_scanned: usize,
    pub embedded: usize,
    pub skipped: Vec<SkippedImage>,
}

/// Turns a directory of labeled photos into a [`KnownIdentitySet`].
///
/// Layout: `<root>/<label>/*.jpg` for people with several photos, or
/// `<root>/<label>.jpg` for a single loose photo. Only the first face
/// found in each image is enrolled. The builder never touches storage.
pub struct EnrollmentBuilder {
    locator: FaceLocator,
    provider: Box<dyn EmbeddingProvider>,
    reader: Box<dyn ImageReader>,
}

impl EnrollmentBuilder {
    pub fn new(
        locator: FaceLocator,
        provider: Box<dyn EmbeddingProvider>,
        reader: Box<dyn ImageReader>,
    ) -> Self {
        Self {
            locator,
            provider,
            reader,
        }
    }

    pub fn build(&mut self, corpus_root: &Path) -> Result<KnownIdentitySet, BuildError> {
        self.build_with_report(corpus_root).map(|(set, _)| set)
    }

    /// Build the set and also return per-image skip details.
    ///
    /// Fails only when the corpus is missing or nothing could be embedded.
    pub fn build_with_report(
        &mut self,
        corpus_root: &Path,
    ) -> Result<(KnownIdentitySet, BuildReport), BuildError> {
        if !corpus_root.is_dir() {
            return Err(BuildError::CorpusMissing(corpus_root.to_path_buf()));
        }

        let images = collect_images(corpus_root)?;
        let mut report = BuildReport {
            images_scanned: images.len(),
            ..BuildReport::default()
        };
        let mut entries: Vec<LabeledEmbedding> = Vec::new();

        for (label, path) in images {
            match self.embed_image(&path, entries.first().map(|e| e.embedding.dimension())) {
                Ok(entry) => {
                    log::debug!("Enrolled {} as {label}", path.display());
                    entries.push(LabeledEmbedding::new(entry, label));
                }
                Err(reason) => {
                    log::warn!("Skipping {}: {reason:?}", path.display());
                    report.skipped.push(SkippedImage {
                        path,
                        label,
                        reason,
                    });
                }
            }
        }

        if entries.is_empty() {
            return Err(BuildError::EmptyCorpus {
                root: corpus_root.to_path_buf(),
                images: report.images_scanned,
            });
        }
        report.embedded = entries.len();

        let set = KnownIdentitySet::new(entries)?;
        log::info!(
            "Enrolled {} embeddings for {} people ({} images skipped)",
            set.embedding_count(),
            set.unique_label_count(),
            report.skipped.len()
        );
        Ok((set, report))
    }

    fn embed_image(
        &mut self,
        path: &Path,
        expected_dimension: Option<usize>,
    ) -> Result<FaceEmbedding, SkipReason> {
        let image = self
            .reader
            .read(path)
            .map_err(|e| SkipReason::Unreadable(e.to_string()))?;
        let candidates = self.locator.locate(&image);
        let Some(first) = candidates.first() else {
            return Err(SkipReason::NoFace);
        };
        let embedding = self
            .provider
            .embed(&image.crop(first))
            .map_err(|e| SkipReason::EmbeddingFailed(e.to_string()))?
            .ok_or(SkipReason::NoEmbedding)?;
        if let Some(expected) = expected_dimension {
            if embedding.dimension() != expected {
                return Err(SkipReason::DimensionMismatch {
                    expected,
                    found: embedding.dimension(),
                });
            }
        }
        Ok(embedding)
    }
}

/// `(label, path)` for every enrollable image, in name order.
fn collect_images(root: &Path) -> Result<Vec<(IdentityLabel, PathBuf)>, BuildError> {
    let mut images = Vec::new();
    for path in sorted_entries(root)? {
        if is_hidden(&path) {
            continue;
        }
        if path.is_dir() {
            let Some(label) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            for inner in sorted_entries(&path)? {
                if inner.is_file() && is_image(&inner) && !is_hidden(&inner) {
                    images.push((label.to_string(), inner));
                }
            }
        } else if is_image(&path) {
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                images.push((stem.to_string(), path.clone()));
            }
        }
    }
    Ok(images)
}

fn sorted_entries(dir: &Path) -> Result<Vec<PathBuf>, BuildError> {
    let io_err = |source| BuildError::Io {
        path: dir.to_path_buf(),
        source,
    };
    let mut paths = fs::read_dir(dir)
        .map_err(io_err)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<Result<Vec<_>, _>>()
        .map_err(io_err)?;
    paths.sort();
    Ok(paths)
}

pub(crate) fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with('.'))
}
