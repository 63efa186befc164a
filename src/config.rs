//! Manager configuration with builder pattern

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Default directory holding disk images, relative to the working directory
pub const DEFAULT_STORE_DIR: &str = "VImgs";

/// Default directory receiving uploaded install media
pub const DEFAULT_MEDIA_DIR: &str = "isofiles";

pub const DEFAULT_QEMU_IMG: &str = "qemu-img";
pub const DEFAULT_EMULATOR: &str = "qemu-system-x86_64";
pub const DEFAULT_DISPLAY: &str = "sdl";

/// Upper bound for a multipart upload (install media are large)
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 8 * 1024 * 1024 * 1024;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManagerConfig {
    /// Disk Store directory, the only authority on disk identity
    pub store_dir: PathBuf,
    /// Where uploaded install media land
    pub media_dir: PathBuf,
    /// Disk utility binary
    pub qemu_img: PathBuf,
    /// Machine emulator binary
    pub emulator: PathBuf,
    /// Emulator display backend (`-display`)
    pub display: String,
    /// Show the emulator boot menu
    pub boot_menu: bool,
    /// Clamped to the address space when applied
    pub max_upload_bytes: u64,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            store_dir: PathBuf::from(DEFAULT_STORE_DIR),
            media_dir: PathBuf::from(DEFAULT_MEDIA_DIR),
            qemu_img: PathBuf::from(DEFAULT_QEMU_IMG),
            emulator: PathBuf::from(DEFAULT_EMULATOR),
            display: DEFAULT_DISPLAY.to_string(),
            boot_menu: true,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }
}

impl ManagerConfig {
    pub fn builder() -> ManagerConfigBuilder {
        ManagerConfigBuilder::default()
    }

    pub fn validate(&self) -> crate::Result<()> {
        if self.store_dir.as_os_str().is_empty() {
            return Err(crate::Error::Config("store_dir cannot be empty".into()));
        }
        if self.media_dir.as_os_str().is_empty() {
            return Err(crate::Error::Config("media_dir cannot be empty".into()));
        }
        if self.store_dir == self.media_dir {
            return Err(crate::Error::Config(
                "store_dir and media_dir must be different directories".into(),
            ));
        }
        if self.qemu_img.as_os_str().is_empty() || self.emulator.as_os_str().is_empty() {
            return Err(crate::Error::Config("tool paths cannot be empty".into()));
        }
        if self.display.trim().is_empty() {
            return Err(crate::Error::Config("display cannot be empty".into()));
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct ManagerConfigBuilder {
    config: ManagerConfig,
}

impl ManagerConfigBuilder {
    pub fn store_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.store_dir = dir.into();
        self
    }

    pub fn media_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.media_dir = dir.into();
        self
    }

    pub fn qemu_img(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.qemu_img = path.into();
        self
    }

    pub fn emulator(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.emulator = path.into();
        self
    }

    pub fn display(mut self, display: impl Into<String>) -> Self {
        self.config.display = display.into();
        self
    }

    pub fn boot_menu(mut self, enabled: bool) -> Self {
        self.config.boot_menu = enabled;
        self
    }

    pub fn max_upload_bytes(mut self, bytes: u64) -> Self {
        self.config.max_upload_bytes = bytes;
        self
    }

    pub fn build(self) -> ManagerConfig {
        self.config
    }

    pub fn build_validated(self) -> crate::Result<ManagerConfig> {
        let config = self.build();
        config.validate()?;
        Ok(config)
    }
}
