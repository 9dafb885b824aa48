//! Sandboxed file materialization.
//!
//! A [`FileSet`] is an untrusted mapping of relative path → full file
//! content, produced either by a default-content template or by the
//! external generation call. [`FileSet::apply`] writes it under a working
//! copy root after validating every entry, so a hostile filename can never
//! escape the root.
//!
//! Validation is two-phase: all entries are checked before any byte is
//! written, so a bad entry anywhere in the set leaves the working copy
//! untouched. A `.git` entry is not specially rejected — only emptiness,
//! absoluteness, traversal and root escape are.

use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

use crate::errors::MaterializeError;

/// A validated-on-apply mapping from relative file path to content.
///
/// Backed by a `BTreeMap` so iteration (and therefore write order and
/// error reporting) is deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileSet(pub BTreeMap<String, String>);

impl FileSet {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    pub fn insert(&mut self, path: impl Into<String>, content: impl Into<String>) {
        self.0.insert(path.into(), content.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Parse a file set from a JSON object of `{"path": "content", ...}`.
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        let obj = value.as_object()?;
        let mut files = BTreeMap::new();
        for (key, val) in obj {
            files.insert(key.clone(), val.as_str()?.to_string());
        }
        Some(Self(files))
    }

    /// Write every entry under `root`, creating parent directories and
    /// overwriting existing files. Returns the absolute paths written, in
    /// deterministic (sorted-key) order.
    ///
    /// All entries are validated before any write; on the first invalid
    /// entry the whole application is rejected and nothing is written.
    pub fn apply(&self, root: &Path) -> Result<Vec<PathBuf>, MaterializeError> {
        let root = root.canonicalize().map_err(|source| MaterializeError::Io {
            path: root.display().to_string(),
            source,
        })?;

        let mut targets = Vec::with_capacity(self.0.len());
        for key in self.0.keys() {
            targets.push(validate_entry(key, &root)?);
        }

        for (target, content) in targets.iter().zip(self.0.values()) {
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent).map_err(|source| MaterializeError::Io {
                    path: parent.display().to_string(),
                    source,
                })?;
            }
            std::fs::write(target, content).map_err(|source| MaterializeError::Io {
                path: target.display().to_string(),
                source,
            })?;
        }

        Ok(targets)
    }
}

impl FromIterator<(String, String)> for FileSet {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Validate one entry and return its resolved absolute target path.
///
/// The target must stay lexically under `root` (which is already
/// canonicalized); the file itself may not exist yet, so containment is
/// checked by normalizing components rather than by canonicalizing.
fn validate_entry(key: &str, root: &Path) -> Result<PathBuf, MaterializeError> {
    if key.trim().is_empty() {
        return Err(MaterializeError::EmptyPath);
    }
    let rel = Path::new(key);
    if rel.is_absolute() || key.starts_with('/') || key.starts_with('\\') {
        return Err(MaterializeError::AbsolutePath {
            path: key.to_string(),
        });
    }

    let mut target = root.to_path_buf();
    for component in rel.components() {
        match component {
            Component::Normal(part) => target.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                return Err(MaterializeError::Traversal {
                    path: key.to_string(),
                })
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(MaterializeError::AbsolutePath {
                    path: key.to_string(),
                })
            }
        }
    }

    if !target.starts_with(root) {
        return Err(MaterializeError::EscapesRoot {
            path: key.to_string(),
        });
    }

    Ok(target)
}
