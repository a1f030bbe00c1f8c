use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::recognition::domain::known_identity_set::{IdentityLabel, KnownIdentitySet};
use crate::storage::artifact_codec::{self, CodecError};

#[derive(Error, Debug)]
pub enum ModelStoreError {
    #[error("no model artifact at {0}")]
    NotFound(PathBuf),
    #[error("model artifact {path} is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: CodecError,
    },
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Header-level facts about a stored artifact.
#[derive(Clone, Debug, PartialEq)]
pub struct ModelSummary {
    pub path: PathBuf,
    pub created_at: DateTime<Utc>,
    pub embedding_count: usize,
    pub unique_label_count: usize,
    pub dimension: Option<usize>,
    pub labels: Vec<(IdentityLabel, usize)>,
    pub file_size: u64,
}

/// Whether an artifact reflects the current enrollment corpus.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Freshness {
    /// No artifact on disk yet.
    Missing,
    Fresh,
    /// This many corpus files were modified after the artifact was written.
    Stale { newer_files: usize },
}

/// Persists a [`KnownIdentitySet`] as a single artifact file.
///
/// Saves write to a sibling `.part` file and rename it into place, so a
/// concurrent reader sees either the old artifact or the new one.
#[derive(Clone, Debug)]
pub struct ModelStore {
    path: PathBuf,
}

impl ModelStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    pub fn save(&self, set: &KnownIdentitySet) -> Result<(), ModelStoreError> {
        let io_err = |path: &Path| {
            let path = path.to_path_buf();
            move |source| ModelStoreError::Io { path, source }
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_err(parent))?;
        }

        let temp_path = self.temp_path();
        let result = write_synced(&temp_path, &artifact_codec::encode(set))
            .map_err(io_err(&temp_path))
            .and_then(|()| fs::rename(&temp_path, &self.path).map_err(io_err(&self.path)));
        if result.is_err() {
            let _ = fs::remove_file(&temp_path);
        }
        result?;

        log::info!(
            "Saved {} embeddings ({} identities) to {}",
            set.embedding_count(),
            set.unique_label_count(),
            self.path.display()
        );
        Ok(())
    }

    pub fn load(&self) -> Result<KnownIdentitySet, ModelStoreError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(ModelStoreError::NotFound(self.path.clone()))
            }
            Err(e) => {
                return Err(ModelStoreError::Io {
                    path: self.path.clone(),
                    source: e,
                })
            }
        };
        let set = artifact_codec::decode(&bytes).map_err(|e| ModelStoreError::Corrupt {
            path: self.path.clone(),
            source: e,
        })?;
        log::debug!(
            "Loaded {} embeddings from {}",
            set.embedding_count(),
            self.path.display()
        );
        Ok(set)
    }

    pub fn describe(&self) -> Result<ModelSummary, ModelStoreError> {
        let set = self.load()?;
        let file_size = fs::metadata(&self.path)
            .map_err(|e| ModelStoreError::Io {
                path: self.path.clone(),
                source: e,
            })?
            .len();
        Ok(ModelSummary {
            path: self.path.clone(),
            created_at: set.created_at(),
            embedding_count: set.embedding_count(),
            unique_label_count: set.unique_label_count(),
            dimension: set.dimension(),
            labels: set.label_counts(),
            file_size,
        })
    }

    /// True when some corpus file changed after the artifact was written.
    /// Advisory only; nothing is rebuilt.
    pub fn is_stale(&self, corpus_root: &Path) -> Result<bool, ModelStoreError> {
        Ok(matches!(
            self.freshness(corpus_root)?,
            Freshness::Stale { .. }
        ))
    }

    /// Compare the artifact's modification time with every file under
    /// `corpus_root`.
    pub fn freshness(&self, corpus_root: &Path) -> Result<Freshness, ModelStoreError> {
        let artifact_time = match fs::metadata(&self.path) {
            Ok(meta) => modified(&meta, &self.path)?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Freshness::Missing),
            Err(e) => {
                return Err(ModelStoreError::Io {
                    path: self.path.clone(),
                    source: e,
                })
            }
        };
        if !corpus_root.is_dir() {
            return Ok(Freshness::Fresh);
        }
        let newer_files = count_newer_files(corpus_root, artifact_time)?;
        Ok(if newer_files == 0 {
            Freshness::Fresh
        } else {
            Freshness::Stale { newer_files }
        })
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".part");
        self.path.with_file_name(name)
    }
}

fn write_synced(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut file = fs::File::create(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}

fn modified(meta: &fs::Metadata, path: &Path) -> Result<SystemTime, ModelStoreError> {
    meta.modified().map_err(|e| ModelStoreError::Io {
        path: path.to_path_buf(),
        source: e,
    })
}

fn count_newer_files(dir: &Path, threshold: SystemTime) -> Result<usize, ModelStoreError> {
    let io_err = |source| ModelStoreError::Io {
        path: dir.to_path_buf(),
        source,
    };
    let mut count = 0;
    for entry in fs::read_dir(dir).map_err(io_err)? {
        let entry = entry.map_err(io_err)?;
        let path = entry.path();
        let meta = entry.metadata().map_err(io_err)?;
        if meta.is_dir() {
            count += count_newer_files(&path, threshold)?;
        } else if modified(&meta, &path)? > threshold {
            count += 1;
        }
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recognition::domain::face_embedding::FaceEmbedding;
    use crate::recognition::domain::known_identity_set::LabeledEmbedding;
    use std::time::Duration;
    use tempfile::TempDir;

    fn sample_set(labels: &[&str]) -> KnownIdentitySet {
        KnownIdentitySet::new(
            labels
                .iter()
                .enumerate()
                .map(|(i, l)| LabeledEmbedding::new(FaceEmbedding::new(vec![i as f32, 0.5]), *l))
                .collect(),
        )
        .unwrap()
    }

    fn set_mtime(path: &Path, time: SystemTime) {
        fs::File::options()
            .write(true)
            .open(path)
            .unwrap()
            .set_modified(time)
            .unwrap();
    }

    #[test]
    fn test_save_then_load_round_trips() {
        let tmp = TempDir::new().unwrap();
        let store = ModelStore::new(tmp.path().join("models").join("known.rkm"));
        let set = sample_set(&["Ana", "Ana", "Luis"]);

        store.save(&set).unwrap();
        assert_eq!(store.load().unwrap(), set);
        assert!(!tmp.path().join("models").join("known.rkm.part").exists());
    }

    #[test]
    fn test_save_replaces_previous_artifact() {
        let tmp = TempDir::new().unwrap();
        let store = ModelStore::new(tmp.path().join("known.rkm"));
        store.save(&sample_set(&["Ana"])).unwrap();
        let newer = sample_set(&["Luis", "Marta"]);
        store.save(&newer).unwrap();
        assert_eq!(store.load().unwrap(), newer);
    }

    #[test]
    fn test_load_missing_is_not_found() {
        let tmp = TempDir::new().unwrap();
        let store = ModelStore::new(tmp.path().join("absent.rkm"));
        assert!(matches!(store.load(), Err(ModelStoreError::NotFound(_))));
    }

    #[test]
    fn test_load_garbage_is_corrupt() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("known.rkm");
        fs::write(&path, b"definitely not a model").unwrap();
        let store = ModelStore::new(&path);
        assert!(matches!(store.load(), Err(ModelStoreError::Corrupt { .. })));
    }

    #[test]
    fn test_load_truncated_is_corrupt() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("known.rkm");
        let store = ModelStore::new(&path);
        store.save(&sample_set(&["Ana", "Luis"])).unwrap();
        let bytes = fs::read(&path).unwrap();
        fs::write(&path, &bytes[..bytes.len() - 3]).unwrap();
        assert!(matches!(store.load(), Err(ModelStoreError::Corrupt { .. })));
    }

    #[test]
    fn test_describe_reports_counts() {
        let tmp = TempDir::new().unwrap();
        let store = ModelStore::new(tmp.path().join("known.rkm"));
        let set = sample_set(&["Luis", "Ana", "Luis"]);
        store.save(&set).unwrap();

        let summary = store.describe().unwrap();
        assert_eq!(summary.embedding_count, 3);
        assert_eq!(summary.unique_label_count, 2);
        assert_eq!(summary.dimension, Some(2));
        assert_eq!(summary.created_at, set.created_at());
        assert_eq!(summary.labels[1], ("Luis".to_string(), 2));
        assert_eq!(summary.file_size, fs::metadata(store.path()).unwrap().len());
    }

    #[test]
    fn test_freshness_missing_artifact() {
        let tmp = TempDir::new().unwrap();
        let store = ModelStore::new(tmp.path().join("known.rkm"));
        assert_eq!(store.freshness(tmp.path()).unwrap(), Freshness::Missing);
    }

    #[test]
    fn test_freshness_detects_newer_corpus_files() {
        let tmp = TempDir::new().unwrap();
        let corpus = tmp.path().join("corpus");
        fs::create_dir_all(corpus.join("Ana")).unwrap();
        let old_photo = corpus.join("Ana").join("1.jpg");
        let new_photo = corpus.join("Ana").join("2.jpg");
        fs::write(&old_photo, b"x").unwrap();
        fs::write(&new_photo, b"x").unwrap();

        let store = ModelStore::new(tmp.path().join("known.rkm"));
        store.save(&sample_set(&["Ana"])).unwrap();

        let now = SystemTime::now();
        set_mtime(store.path(), now);
        set_mtime(&old_photo, now - Duration::from_secs(60));
        set_mtime(&new_photo, now - Duration::from_secs(60));
        assert_eq!(store.freshness(&corpus).unwrap(), Freshness::Fresh);
        assert!(!store.is_stale(&corpus).unwrap());

        set_mtime(&new_photo, now + Duration::from_secs(60));
        assert_eq!(
            store.freshness(&corpus).unwrap(),
            Freshness::Stale { newer_files: 1 }
        );
        assert!(store.is_stale(&corpus).unwrap());
    }
}
