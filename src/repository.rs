//! Repository boundary: location resolution and data storage
//!
//! Locations use the `//repository/path/to/entry` form. Relative locations
//! are resolved against a base folder (the parent of the process location).

use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use thiserror::Error;

use crate::operator::IoObject;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RepositoryError {
    #[error("malformed repository location '{location}': {details}")]
    Malformed { location: String, details: String },

    #[error("{0}")]
    Backend(String),

    #[error("operation not supported: {0}")]
    Unsupported(&'static str),
}

/// What a resolved location points at.
#[derive(Debug, Clone, PartialEq)]
pub enum Entry {
    Data(IoObject),
    /// Binary entry; consumers read it through its location.
    Blob { location: String },
    Folder { location: String },
}

/// Absolute `//repository/path` location.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RepositoryLocation {
    repository: String,
    path: Vec<String>,
}

const ABSOLUTE_PREFIX: &str = "//";

impl RepositoryLocation {
    pub fn is_absolute(location: &str) -> bool {
        location.starts_with(ABSOLUTE_PREFIX)
    }

    /// Parse an absolute location.
    pub fn parse(location: &str) -> Result<Self, RepositoryError> {
        let malformed = |details: &str| RepositoryError::Malformed {
            location: location.to_string(),
            details: details.to_string(),
        };
        let rest = location
            .strip_prefix(ABSOLUTE_PREFIX)
            .ok_or_else(|| malformed("location must start with //"))?;
        let mut segments = rest.split('/').filter(|s| !s.is_empty());
        let repository = segments
            .next()
            .ok_or_else(|| malformed("repository name is missing"))?
            .to_string();
        Ok(Self {
            repository,
            path: segments.map(str::to_string).collect(),
        })
    }

    pub fn repository(&self) -> &str {
        &self.repository
    }

    pub fn path(&self) -> &[String] {
        &self.path
    }

    /// Last path segment, `None` for the repository root.
    pub fn name(&self) -> Option<&str> {
        self.path.last().map(String::as_str)
    }

    /// Containing folder; the repository root is its own parent.
    pub fn parent(&self) -> Self {
        let mut path = self.path.clone();
        path.pop();
        Self {
            repository: self.repository.clone(),
            path,
        }
    }

    /// Resolve a relative path (`.`/`..` aware) below this folder.
    pub fn join(&self, relative: &str) -> Result<Self, RepositoryError> {
        let mut path = self.path.clone();
        for segment in relative.split('/') {
            match segment {
                "" | "." => {}
                ".." => {
                    if path.pop().is_none() {
                        return Err(RepositoryError::Malformed {
                            location: relative.to_string(),
                            details: "path escapes the repository root".into(),
                        });
                    }
                }
                name => path.push(name.to_string()),
            }
        }
        Ok(Self {
            repository: self.repository.clone(),
            path,
        })
    }

    /// Express `self` relative to the folder `base`. Falls back to the
    /// absolute form across repositories.
    pub fn make_relative(&self, base: &RepositoryLocation) -> String {
        if self.repository != base.repository {
            return self.to_string();
        }
        let common = self
            .path
            .iter()
            .zip(&base.path)
            .take_while(|(a, b)| a == b)
            .count();
        let ups = std::iter::repeat("..").take(base.path.len() - common);
        let downs = self.path[common..].iter().map(String::as_str);
        ups.chain(downs).collect::<Vec<_>>().join("/")
    }
}

impl fmt::Display for RepositoryLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{ABSOLUTE_PREFIX}{}", self.repository)?;
        for segment in &self.path {
            write!(f, "/{segment}")?;
        }
        Ok(())
    }
}

/// Resolve a context location string against an optional base folder.
pub fn resolve_location(
    base: Option<&RepositoryLocation>,
    location: &str,
) -> Result<RepositoryLocation, RepositoryError> {
    if RepositoryLocation::is_absolute(location) {
        return RepositoryLocation::parse(location);
    }
    match base {
        Some(base) => base.join(location),
        None => Err(RepositoryError::Malformed {
            location: location.to_string(),
            details: "relative location without a repository process location".into(),
        }),
    }
}

/// Storage backend resolving and persisting data objects.
pub trait Repository: Send + Sync {
    /// Look up an entry; `Ok(None)` if nothing exists there.
    fn locate(&self, location: &RepositoryLocation) -> Result<Option<Entry>, RepositoryError>;

    /// Persist `data` at `location`. `owner` names the storing process.
    fn store(
        &self,
        data: &IoObject,
        location: &RepositoryLocation,
        owner: Option<&str>,
    ) -> Result<(), RepositoryError>;

    /// Persist a serialized process definition.
    fn store_process(
        &self,
        _definition: &[u8],
        _location: &RepositoryLocation,
    ) -> Result<(), RepositoryError> {
        Err(RepositoryError::Unsupported("storing processes"))
    }
}

/// In-process repository backed by a concurrent map.
#[derive(Debug, Default)]
pub struct MemoryRepository {
    entries: DashMap<RepositoryLocation, Entry>,
    processes: DashMap<RepositoryLocation, Arc<[u8]>>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, location: RepositoryLocation, entry: Entry) {
        self.entries.insert(location, entry);
    }

    pub fn data(&self, location: &RepositoryLocation) -> Option<IoObject> {
        match self.entries.get(location).as_deref() {
            Some(Entry::Data(data)) => Some(data.clone()),
            _ => None,
        }
    }

    pub fn process(&self, location: &RepositoryLocation) -> Option<Arc<[u8]>> {
        self.processes.get(location).map(|p| Arc::clone(p.value()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Repository for MemoryRepository {
    fn locate(&self, location: &RepositoryLocation) -> Result<Option<Entry>, RepositoryError> {
        Ok(self.entries.get(location).map(|entry| entry.value().clone()))
    }

    fn store(
        &self,
        data: &IoObject,
        location: &RepositoryLocation,
        _owner: Option<&str>,
    ) -> Result<(), RepositoryError> {
        let stored = data.clone().with_source(&location.to_string());
        self.entries.insert(location.clone(), Entry::Data(stored));
        Ok(())
    }

    fn store_process(
        &self,
        definition: &[u8],
        location: &RepositoryLocation,
    ) -> Result<(), RepositoryError> {
        self.processes
            .insert(location.clone(), Arc::from(definition));
        Ok(())
    }
}
