//! qdisk: virtual disk lifecycle manager
//!
//! Creates, inspects, converts and resizes disk image files with `qemu-img`,
//! and boots virtual machines from them with `qemu-system`. A single
//! directory (the Disk Store) is the only record of which disks exist: a disk
//! is a file, and its name is the file name.
//!
//! # Example
//!
//! ```no_run
//! use qdisk::{CreateDisk, DiskService, ManagerConfig};
//!
//! let config = ManagerConfig::builder()
//!     .store_dir("/var/lib/qdisk/disks")
//!     .build_validated()?;
//! let service = DiskService::with_config(config)?;
//!
//! service.create_disk_image(&CreateDisk {
//!     name: Some("debian.qcow2".into()),
//!     size: Some(20.0.into()),
//!     format: Some("qcow2".into()),
//! })?;
//! service.grow_disk("debian.qcow2", Some(&5.0.into()))?;
//!
//! let info = service.inspect_disk("debian.qcow2")?;
//! println!("{} {}", info.file_format, info.virtual_size);
//! # Ok::<(), qdisk::Error>(())
//! ```

pub mod api;
pub mod config;
pub mod error;
pub mod locks;
pub mod models;
pub mod qemu;
pub mod service;
pub mod store;
pub mod supervisor;

pub use api::Server;
pub use config::ManagerConfig;
pub use error::{Error, ErrorKind, Result};
pub use models::*;
pub use service::DiskService;
pub use store::DiskStore;
