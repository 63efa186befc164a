//! Disk lifecycle service: the single entry point for every disk and
//! machine operation
//!
//! Validates raw requests, resolves disk names against the store, takes the
//! per-disk lock and delegates to the qemu adapters. Disk calls block until
//! `qemu-img` exits; async callers should run them on a blocking thread.
//! Machine launches are async and supervised.

use std::path::PathBuf;
use std::sync::Arc;

use crate::config::ManagerConfig;
use crate::locks::DiskLocks;
use crate::models::*;
use crate::qemu::{CommandRunner, QemuImg, QemuSystem, SystemRunner};
use crate::store::{DiskStore, StagedFile};
use crate::supervisor::MachineSupervisor;
use crate::{Error, Result};

pub struct DiskService {
    config: ManagerConfig,
    store: DiskStore,
    media: DiskStore,
    img: QemuImg,
    emulator: QemuSystem,
    locks: DiskLocks,
    machines: MachineSupervisor,
}

impl DiskService {
    /// Create a service with default settings
    pub fn new() -> Result<Self> {
        Self::with_config(ManagerConfig::default())
    }

    /// Create a service running the real tools
    pub fn with_config(config: ManagerConfig) -> Result<Self> {
        Self::with_runner(config, Arc::new(SystemRunner))
    }

    /// Create a service with a custom process runner
    pub fn with_runner(config: ManagerConfig, runner: Arc<dyn CommandRunner>) -> Result<Self> {
        config.validate()?;

        let store = DiskStore::new(&config.store_dir);
        store.ensure_ready()?;

        Ok(Self {
            img: QemuImg::new(&config.qemu_img, store.clone(), runner.clone()),
            emulator: QemuSystem::new(&config, store.clone(), runner),
            locks: DiskLocks::new(),
            machines: MachineSupervisor::new(),
            media: DiskStore::new(&config.media_dir),
            store,
            config,
        })
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    pub fn store(&self) -> &DiskStore {
        &self.store
    }

    /// Create a new disk image. Fails if the name is taken.
    pub fn create_disk_image(&self, request: &CreateDisk) -> Result<String> {
        let name = required_text("name", request.name.as_deref())?;
        let size = match &request.size {
            Some(size) if !size.is_blank() => Gigabytes::parse("size", size)?,
            _ => return Err(Error::missing("size")),
        };
        let format: DiskFormat = required_text("format", request.format.as_deref())?.parse()?;

        self.store.resolve(name)?;
        self.store.ensure_ready()?;

        let _guard = self.locks.lock(name);
        if self.store.exists(name)? {
            return Err(Error::DiskAlreadyExists(name.to_string()));
        }

        let output = self.img.create(name, size, format)?;
        tracing::info!(disk = %name, %format, size_gb = %size, "Disk created");
        Ok(output)
    }

    /// Re-encode an existing disk as `new_format`
    pub fn change_format(&self, disk_id: &str, new_format: Option<&str>) -> Result<String> {
        let format: DiskFormat = required_text("newFormat", new_format)?.parse()?;
        let _guard = self.lock_existing(disk_id)?;
        self.img.convert(disk_id, format)
    }

    /// Grow an existing disk by `delta` GiB
    pub fn grow_disk(&self, disk_id: &str, delta: Option<&Quantity>) -> Result<String> {
        let delta = match delta {
            Some(delta) if !delta.is_blank() => Gigabytes::parse("newSize", delta)?,
            _ => return Err(Error::missing("newSize")),
        };
        let _guard = self.lock_existing(disk_id)?;
        let output = self.img.resize(disk_id, delta)?;
        tracing::info!(disk = %disk_id, delta_gb = %delta, "Disk resized");
        Ok(output)
    }

    pub fn inspect_disk(&self, disk_id: &str) -> Result<DiskInfo> {
        self.store.resolve(disk_id)?;
        let _guard = self.locks.lock(disk_id);
        self.img.info(disk_id)
    }

    pub fn list_disks(&self) -> Result<Vec<String>> {
        Ok(self.store.list_files()?)
    }

    /// Validate a launch request into a [`MachineSpec`], checking that the
    /// disk exists
    pub fn machine_spec(&self, request: &StartMachine) -> Result<MachineSpec> {
        let name = required_text("name", request.name.as_deref())?;
        let cpu = required_text("cpu", request.cpu.as_deref())?;
        let memory = required_text("memory", request.memory.as_deref())?;
        let disk_name = required_text("diskName", request.disk_name.as_deref())?;

        let cpu_count: u32 = cpu
            .parse()
            .ok()
            .filter(|n| *n > 0)
            .ok_or_else(|| {
                Error::Validation(format!("'cpu' must be a positive integer, got '{}'", cpu))
            })?;
        let memory: MemorySize = memory.parse()?;

        if !self.store.exists(disk_name)? {
            return Err(Error::DiskNotFound(disk_name.to_string()));
        }

        let mut spec = MachineSpec::new(name, disk_name)
            .with_cpus(cpu_count)
            .with_memory(memory);
        if let Some(medium) = &request.install_medium {
            spec = spec.with_install_medium(medium);
        }
        Ok(spec)
    }

    /// Validate `request` and run the machine until it exits
    pub async fn start_machine(&self, request: &StartMachine) -> Result<MachineSpec> {
        let spec = self.machine_spec(request)?;
        self.launch(&spec).await?;
        Ok(spec)
    }

    /// Run an already validated machine until it exits. Dropping the
    /// future, or [`shutdown`](Self::shutdown), kills the emulator.
    pub async fn launch(&self, spec: &MachineSpec) -> Result<()> {
        self.machines
            .supervise(&spec.name, self.emulator.launch(spec))
            .await
    }

    /// Stop every running machine and refuse new launches
    pub fn shutdown(&self) {
        self.machines.shutdown();
    }

    pub fn running_machines(&self) -> Vec<String> {
        self.machines.running()
    }

    /// Hidden file in the media directory to receive an upload of
    /// `file_name`; removed unless adopted
    pub fn stage_install_medium(&self, file_name: &str) -> Result<StagedFile> {
        self.media.stage(file_name)
    }

    /// Publish a finished upload without replacing existing media and return
    /// its absolute path
    pub fn adopt_install_medium(&self, staged: StagedFile) -> Result<PathBuf> {
        let requested = staged.name().to_string();
        let name = staged.persist()?;
        let path = std::fs::canonicalize(self.media.resolve(&name)?)?;
        if name != requested {
            tracing::info!(requested = %requested, saved = %name, "Install medium name taken, saved under a new name");
        }
        tracing::info!(path = %path.display(), "Install medium saved");
        Ok(path)
    }

    fn lock_existing(&self, disk_id: &str) -> Result<crate::locks::DiskGuard> {
        self.store.resolve(disk_id)?;
        let guard = self.locks.lock(disk_id);
        if !self.store.exists(disk_id)? {
            return Err(Error::DiskNotFound(disk_id.to_string()));
        }
        Ok(guard)
    }
}

fn required_text<'a>(field: &str, value: Option<&'a str>) -> Result<&'a str> {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(Error::missing(field)),
    }
}
