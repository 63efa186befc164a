//! Machine emulator launcher

use std::path::PathBuf;
use std::sync::Arc;

use super::runner::{CommandRunner, Invocation};
use crate::config::ManagerConfig;
use crate::models::MachineSpec;
use crate::store::DiskStore;
use crate::{Error, Result};

/// Boots a machine from a Disk Store image and waits for it to exit
pub struct QemuSystem {
    binary: PathBuf,
    display: String,
    boot_menu: bool,
    store: DiskStore,
    runner: Arc<dyn CommandRunner>,
}

impl QemuSystem {
    pub fn new(config: &ManagerConfig, store: DiskStore, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            binary: config.emulator.clone(),
            display: config.display.clone(),
            boot_menu: config.boot_menu,
            store,
            runner,
        }
    }

    /// Emulator command line for `spec`
    pub fn invocation(&self, spec: &MachineSpec) -> Result<Invocation> {
        let disk = self.store.resolve(&spec.disk_name)?;

        let mut invocation = Invocation::new(&self.binary)
            .arg("-name")
            .arg(&spec.name)
            .arg("-m")
            .arg(spec.memory.megabytes().to_string())
            .arg("-smp")
            .arg(spec.cpu_count.to_string())
            .arg("-hda")
            .arg(&disk);
        if self.boot_menu {
            invocation = invocation.arg("-boot").arg("menu=on");
        }
        invocation = invocation.arg("-display").arg(&self.display);
        if let Some(medium) = &spec.install_medium {
            invocation = invocation.arg("-cdrom").arg(medium);
        }
        Ok(invocation)
    }

    /// Run the machine until the emulator exits. The emulator is a child of
    /// the returned future: dropping the future kills it.
    pub async fn launch(&self, spec: &MachineSpec) -> Result<()> {
        let invocation = self.invocation(spec)?;
        tracing::info!(machine = %spec.name, command = %invocation, "Launching machine");

        let exit = self.runner.spawn(&invocation).map_err(|e| {
            Error::Launch(format!("could not start {}: {}", invocation.program_name(), e))
        })?;
        let output = exit.await.map_err(|e| {
            Error::Launch(format!("lost track of {}: {}", invocation.program_name(), e))
        })?;

        if !output.success() {
            let reason = match output.code {
                Some(code) => format!("exit code {}", code),
                None => "terminated by signal".to_string(),
            };
            tracing::warn!(machine = %spec.name, %reason, stderr = %output.stderr.trim(), "Machine failed");
            return Err(Error::Launch(format!(
                "{} failed ({}): {}",
                invocation.program_name(),
                reason,
                output.stderr.trim()
            )));
        }

        tracing::info!(machine = %spec.name, "Machine exited");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MemorySize;
    use crate::qemu::runner::{CommandOutput, MockCommandRunner, ProcessExit};
    use std::sync::atomic::{AtomicBool, Ordering};

    fn launcher(runner: MockCommandRunner, config: &ManagerConfig) -> QemuSystem {
        QemuSystem::new(config, DiskStore::new("/srv/VImgs"), Arc::new(runner))
    }

    fn spec() -> MachineSpec {
        MachineSpec::new("debian", "deb.qcow2")
            .with_cpus(2)
            .with_memory(MemorySize::from_megabytes(3072).unwrap())
    }

    #[test]
    fn test_invocation_layout() {
        let config = ManagerConfig::default();
        let inv = launcher(MockCommandRunner::new(), &config)
            .invocation(&spec())
            .unwrap();
        assert_eq!(inv.program_name(), "qemu-system-x86_64");
        assert_eq!(
            inv.args_lossy(),
            vec![
                "-name", "debian", "-m", "3072", "-smp", "2", "-hda", "/srv/VImgs/deb.qcow2",
                "-boot", "menu=on", "-display", "sdl",
            ]
        );
    }

    #[test]
    fn test_install_medium_attached() {
        let config = ManagerConfig::builder().boot_menu(false).display("gtk").build();
        let inv = launcher(MockCommandRunner::new(), &config)
            .invocation(&spec().with_install_medium("/iso/debian.iso"))
            .unwrap();
        let args = inv.args_lossy();
        assert!(!args.contains(&"menu=on".to_string()));
        assert_eq!(&args[args.len() - 4..], ["-display", "gtk", "-cdrom", "/iso/debian.iso"]);
    }

    fn exits_with(output: CommandOutput) -> std::io::Result<ProcessExit> {
        Ok(Box::pin(async move { Ok::<_, std::io::Error>(output) }))
    }

    /// Flags `killed` when dropped before completion
    struct Child(Arc<AtomicBool>);

    impl Drop for Child {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_bad_disk_name_rejected_before_spawn() {
        let mut runner = MockCommandRunner::new();
        runner.expect_spawn().times(0);
        let config = ManagerConfig::default();
        let err = launcher(runner, &config)
            .launch(&MachineSpec::new("x", "../../etc/shadow"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidDiskName { .. }));
    }

    #[tokio::test]
    async fn test_clean_exit() {
        let mut runner = MockCommandRunner::new();
        runner
            .expect_spawn()
            .times(1)
            .returning(|_| exits_with(CommandOutput { code: Some(0), ..Default::default() }));
        let config = ManagerConfig::default();
        launcher(runner, &config).launch(&spec()).await.unwrap();
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_launch_error() {
        let mut runner = MockCommandRunner::new();
        runner.expect_spawn().times(1).returning(|_| {
            exits_with(CommandOutput {
                code: Some(1),
                stdout: String::new(),
                stderr: "qemu-system-x86_64: Could not initialize SDL\n".into(),
            })
        });
        let config = ManagerConfig::default();
        let err = launcher(runner, &config).launch(&spec()).await.unwrap_err();
        match err {
            Error::Launch(msg) => assert!(msg.contains("Could not initialize SDL")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_spawn_failure_is_launch_error() {
        let mut runner = MockCommandRunner::new();
        runner
            .expect_spawn()
            .returning(|_| Err(std::io::Error::new(std::io::ErrorKind::NotFound, "not found")));
        let config = ManagerConfig::default();
        let err = launcher(runner, &config).launch(&spec()).await.unwrap_err();
        assert!(matches!(err, Error::Launch(_)));
    }

    #[tokio::test]
    async fn test_dropped_launch_releases_child() {
        let killed = Arc::new(AtomicBool::new(false));
        let flag = killed.clone();
        let mut runner = MockCommandRunner::new();
        runner.expect_spawn().times(1).returning(move |_| {
            let child = Child(flag.clone());
            Ok(Box::pin(async move {
                let _child = child;
                std::future::pending::<std::io::Result<CommandOutput>>().await
            }))
        });

        let config = ManagerConfig::default();
        let system = launcher(runner, &config);
        let spec = spec();
        let launch = system.launch(&spec);
        let timed_out = tokio::time::timeout(std::time::Duration::from_millis(50), launch).await;
        assert!(timed_out.is_err());
        assert!(killed.load(Ordering::SeqCst));
    }
}
