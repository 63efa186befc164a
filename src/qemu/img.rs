//! `qemu-img` wrappers for disk image operations

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::runner::{CommandRunner, Invocation};
use crate::models::{DiskFormat, DiskInfo, Gigabytes};
use crate::store::DiskStore;
use crate::{Error, Result};

/// Disk-image command adapter bound to one Disk Store
pub struct QemuImg {
    binary: PathBuf,
    store: DiskStore,
    runner: Arc<dyn CommandRunner>,
}

impl QemuImg {
    pub fn new(binary: impl Into<PathBuf>, store: DiskStore, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            binary: binary.into(),
            store,
            runner,
        }
    }

    /// Create a new image of `size` GiB
    pub fn create(&self, name: &str, size: Gigabytes, format: DiskFormat) -> Result<String> {
        let path = self.store.resolve(name)?;
        let invocation = self
            .command()
            .arg("create")
            .arg("-f")
            .arg(format.as_str())
            .arg(&path)
            .arg(size.to_arg());
        self.execute(&invocation)
    }

    /// Re-encode an image as `format`, replacing it only once the new
    /// encoding is complete
    pub fn convert(&self, name: &str, format: DiskFormat) -> Result<String> {
        let path = self.store.resolve(name)?;
        let staging = self.store.staging_path(name)?;
        let invocation = self
            .command()
            .arg("convert")
            .arg("-O")
            .arg(format.as_str())
            .arg(&path)
            .arg(&staging);

        let output = match self.execute(&invocation) {
            Ok(output) => output,
            Err(e) => {
                discard(&staging);
                return Err(e);
            }
        };

        if let Err(e) = fs::rename(&staging, &path) {
            discard(&staging);
            return Err(e.into());
        }
        tracing::info!(disk = %name, format = %format, "Disk converted");
        Ok(output)
    }

    /// Grow the image by `delta` GiB (relative, never absolute)
    pub fn resize(&self, name: &str, delta: Gigabytes) -> Result<String> {
        let path = self.store.resolve(name)?;
        let invocation = self
            .command()
            .arg("resize")
            .arg(&path)
            .arg(format!("+{}", delta.to_arg()));
        self.execute(&invocation)
    }

    /// Inspect an image. A missing file is reported without running the tool.
    pub fn info(&self, name: &str) -> Result<DiskInfo> {
        let path = self.store.resolve(name)?;
        if !path.is_file() {
            return Err(Error::DiskNotFound(name.to_string()));
        }
        let invocation = self.command().arg("info").arg(&path);
        let stdout = self.execute(&invocation)?;
        Ok(DiskInfo::from_info_output(&stdout))
    }

    fn command(&self) -> Invocation {
        Invocation::new(&self.binary)
    }

    fn execute(&self, invocation: &Invocation) -> Result<String> {
        tracing::debug!(command = %invocation, "Running disk utility");

        let output = self.runner.run(invocation).map_err(|source| Error::Spawn {
            program: invocation.program_name(),
            source,
        })?;

        if !output.success() {
            tracing::warn!(
                command = %invocation,
                code = ?output.code,
                stderr = %output.stderr.trim(),
                "Disk utility failed"
            );
            return Err(Error::CommandFailed {
                program: invocation.program_name(),
                code: output.code,
                stderr: output.stderr,
            });
        }

        Ok(output.stdout)
    }
}

fn discard(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!(path = %path.display(), error = %e, "Failed to remove staging file");
        }
    }
}
