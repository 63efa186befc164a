//! Disk Store: a flat directory of named image files
//!
//! The directory is the only record of which disks exist. A disk's name is
//! its file name, so every name that reaches the filesystem goes through
//! [`validate_name`] first.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::{Error, Result};

const MAX_NAME_LEN: usize = 255;

/// Attempts at finding a free `stem-N.ext` name before giving up
const MAX_NAME_SUFFIX: u32 = 1000;

/// Check that `name` is a single, plain path segment.
pub fn validate_name(name: &str) -> Result<()> {
    let reject = |reason| {
        Err(Error::InvalidDiskName {
            name: name.to_string(),
            reason,
        })
    };

    if name.is_empty() {
        return reject("name is empty");
    }
    if name == "." || name == ".." {
        return reject("name is a relative directory reference");
    }
    if name.starts_with('.') {
        return reject("name must not start with '.'");
    }
    if name.contains(['/', '\\']) {
        return reject("name must not contain path separators");
    }
    if name.contains(':') {
        return reject("name must not contain ':'");
    }
    if name.contains('\0') {
        return reject("name must not contain NUL");
    }
    if name.len() > MAX_NAME_LEN {
        return reject("name is too long");
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct DiskStore {
    base: PathBuf,
}

impl DiskStore {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    /// Path of the image called `name`. Never escapes the base directory.
    pub fn resolve(&self, name: &str) -> Result<PathBuf> {
        validate_name(name)?;
        Ok(self.base.join(name))
    }

    /// Create the base directory if absent
    pub fn ensure_ready(&self) -> io::Result<()> {
        fs::create_dir_all(&self.base)
    }

    pub fn exists(&self, name: &str) -> Result<bool> {
        Ok(self.resolve(name)?.is_file())
    }

    /// Regular files directly inside the store, sorted. A missing store is
    /// an empty store.
    pub fn list_files(&self) -> io::Result<Vec<String>> {
        let entries = match fs::read_dir(&self.base) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                tracing::warn!(path = %entry.path().display(), "Skipping non UTF-8 file name");
                continue;
            };
            // staging files of conversions and uploads in flight
            if name.starts_with('.') {
                continue;
            }
            names.push(name);
        }
        names.sort();
        Ok(names)
    }

    /// Hidden sibling of `name` used as a conversion target before the
    /// atomic rename.
    pub fn staging_path(&self, name: &str) -> Result<PathBuf> {
        validate_name(name)?;
        Ok(self
            .base
            .join(format!(".{}.{}.partial", name, uuid::Uuid::new_v4().simple())))
    }

    /// Hidden staging file that will become `name` once persisted
    pub fn stage(&self, name: &str) -> Result<StagedFile> {
        let path = self.staging_path(name)?;
        self.ensure_ready()?;
        Ok(StagedFile {
            store: self.clone(),
            name: name.to_string(),
            path,
        })
    }

    /// Give the staging file at `staging` a visible name: `name` if free,
    /// otherwise the first free `stem-N.ext`. Never replaces a file.
    fn persist_unique(&self, staging: &Path, name: &str) -> Result<String> {
        for n in 0..MAX_NAME_SUFFIX {
            let candidate = if n == 0 { name.to_string() } else { numbered(name, n) };
            let target = self.resolve(&candidate)?;
            // a hard link fails instead of clobbering an existing target
            match fs::hard_link(staging, &target) {
                Ok(()) => {
                    fs::remove_file(staging)?;
                    return Ok(candidate);
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Err(Error::Other(format!("no free file name for '{}'", name)))
    }
}

/// `installer.iso` -> `installer-2.iso`
fn numbered(name: &str, n: u32) -> String {
    match name.rsplit_once('.') {
        Some((stem, ext)) => format!("{}-{}.{}", stem, n, ext),
        None => format!("{}-{}", name, n),
    }
}

/// A file being written under a hidden name. Removed on drop unless
/// [`persist`](StagedFile::persist)ed.
#[derive(Debug)]
pub struct StagedFile {
    store: DiskStore,
    name: String,
    path: PathBuf,
}

impl StagedFile {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Name requested for the finished file
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Publish the finished file and return the name it received
    pub fn persist(self) -> Result<String> {
        self.store.persist_unique(&self.path, &self.name)
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            if e.kind() != io::ErrorKind::NotFound {
                tracing::warn!(path = %self.path.display(), error = %e, "Failed to remove staging file");
            }
        }
    }
}
