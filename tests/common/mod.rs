//! In-process stand-in for `qemu-img` and the emulator.
//!
//! Images are small JSON files recording format and virtual size, so tests
//! can observe what each command did without the real tools installed.

#![allow(dead_code)]

use parking_lot::Mutex;
use qdisk::qemu::{CommandOutput, CommandRunner, Invocation, ProcessExit};
use qdisk::{DiskService, ManagerConfig};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

const GIB: u64 = 1024 * 1024 * 1024;

#[derive(Debug, Serialize, Deserialize)]
pub struct FakeImage {
    pub format: String,
    pub virtual_size: u64,
}

#[derive(Default)]
struct Activity {
    in_flight: HashMap<PathBuf, usize>,
    peak_per_disk: usize,
    total: usize,
    peak_total: usize,
}

#[derive(Default)]
pub struct FakeQemu {
    calls: Mutex<Vec<Invocation>>,
    failure: Mutex<Option<(String, String)>>,
    activity: Mutex<Activity>,
    delay: Mutex<Option<Duration>>,
    machine_runtime: Mutex<Option<Duration>>,
    machines: Arc<Machines>,
}

#[derive(Default)]
struct Machines {
    running: AtomicUsize,
    killed: AtomicUsize,
}

/// A simulated emulator process; counts as killed when dropped before exit
struct FakeMachine {
    machines: Arc<Machines>,
    exited: bool,
}

impl FakeMachine {
    fn start(machines: Arc<Machines>) -> Self {
        machines.running.fetch_add(1, Ordering::SeqCst);
        Self { machines, exited: false }
    }

    fn exit(mut self) {
        self.exited = true;
    }
}

impl Drop for FakeMachine {
    fn drop(&mut self) {
        self.machines.running.fetch_sub(1, Ordering::SeqCst);
        if !self.exited {
            self.machines.killed.fetch_add(1, Ordering::SeqCst);
        }
    }
}

impl FakeQemu {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make every invocation whose first argument is `subcommand` exit 1
    pub fn fail(&self, subcommand: &str, stderr: &str) {
        *self.failure.lock() = Some((subcommand.to_string(), stderr.to_string()));
    }

    /// Hold each invocation open for `delay`
    pub fn slow(&self, delay: Duration) {
        *self.delay.lock() = Some(delay);
    }

    /// Keep simulated machines running for `runtime`
    pub fn machines_run_for(&self, runtime: Duration) {
        *self.machine_runtime.lock() = Some(runtime);
    }

    pub fn running_machines(&self) -> usize {
        self.machines.running.load(Ordering::SeqCst)
    }

    /// Machines terminated before they exited on their own
    pub fn killed_machines(&self) -> usize {
        self.machines.killed.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> Vec<Invocation> {
        self.calls.lock().clone()
    }

    pub fn subcommands(&self) -> Vec<String> {
        self.calls
            .lock()
            .iter()
            .filter_map(|c| c.args_lossy().into_iter().next())
            .collect()
    }

    /// Highest number of concurrent invocations seen on a single image
    pub fn peak_per_disk(&self) -> usize {
        self.activity.lock().peak_per_disk
    }

    /// Highest number of concurrent invocations overall
    pub fn peak_total(&self) -> usize {
        self.activity.lock().peak_total
    }

    pub fn read_image(path: &Path) -> FakeImage {
        let raw = fs::read_to_string(path).unwrap();
        serde_json::from_str(&raw).unwrap()
    }

    fn enter(&self, target: &Path) {
        let mut activity = self.activity.lock();
        let count = activity.in_flight.entry(target.to_path_buf()).or_insert(0);
        *count += 1;
        let count = *count;
        activity.peak_per_disk = activity.peak_per_disk.max(count);
        activity.total += 1;
        activity.peak_total = activity.peak_total.max(activity.total);
    }

    fn leave(&self, target: &Path) {
        let mut activity = self.activity.lock();
        if let Some(count) = activity.in_flight.get_mut(target) {
            *count -= 1;
        }
        activity.total -= 1;
    }

    fn injected_failure(&self, args: &[String]) -> Option<CommandOutput> {
        let (subcommand, stderr) = self.failure.lock().clone()?;
        (args.first() == Some(&subcommand)).then(|| CommandOutput {
            code: Some(1),
            stdout: String::new(),
            stderr,
        })
    }

    fn simulate(&self, args: &[String]) -> CommandOutput {
        let result = match args.first().map(String::as_str) {
            Some("create") => create(args),
            Some("convert") => convert(args),
            Some("resize") => resize(args),
            Some("info") => info(args),
            _ => Err(format!("unknown command: {:?}", args)),
        };
        match result {
            Ok(stdout) => CommandOutput { code: Some(0), stdout, stderr: String::new() },
            Err(stderr) => CommandOutput { code: Some(1), stdout: String::new(), stderr },
        }
    }
}

impl CommandRunner for FakeQemu {
    fn run(&self, invocation: &Invocation) -> io::Result<CommandOutput> {
        self.calls.lock().push(invocation.clone());
        let args = invocation.args_lossy();
        if let Some(output) = self.injected_failure(&args) {
            return Ok(output);
        }

        let target = target_path(&args);
        self.enter(&target);
        if let Some(delay) = *self.delay.lock() {
            std::thread::sleep(delay);
        }
        let output = self.simulate(&args);
        self.leave(&target);
        Ok(output)
    }

    fn spawn(&self, invocation: &Invocation) -> io::Result<ProcessExit> {
        self.calls.lock().push(invocation.clone());
        let args = invocation.args_lossy();
        if let Some(output) = self.injected_failure(&args) {
            return Ok(Box::pin(async move { Ok::<_, io::Error>(output) }));
        }

        let runtime = *self.machine_runtime.lock();
        let machine = FakeMachine::start(self.machines.clone());
        Ok(Box::pin(async move {
            if let Some(runtime) = runtime {
                tokio::time::sleep(runtime).await;
            }
            machine.exit();
            Ok::<_, io::Error>(CommandOutput { code: Some(0), ..Default::default() })
        }))
    }
}

/// Image an invocation works on
fn target_path(args: &[String]) -> PathBuf {
    let path = match args.first().map(String::as_str) {
        Some("create") => args.get(3),
        Some("convert") => args.get(3),
        _ => args.get(1),
    };
    PathBuf::from(path.cloned().unwrap_or_default())
}

fn parse_size(arg: &str) -> Result<u64, String> {
    let gib: f64 = arg
        .trim_start_matches('+')
        .trim_end_matches('G')
        .parse()
        .map_err(|_| format!("Invalid image size specified: {}", arg))?;
    Ok((gib * GIB as f64) as u64)
}

fn load(path: &str) -> Result<FakeImage, String> {
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Could not open '{}': {}", path, e))?;
    serde_json::from_str(&raw).map_err(|e| format!("Image is corrupt: {}", e))
}

fn save(path: &str, image: &FakeImage) -> Result<(), String> {
    let raw = serde_json::to_string(image).map_err(|e| e.to_string())?;
    fs::write(path, raw).map_err(|e| format!("Could not write '{}': {}", path, e))
}

// create -f <fmt> <path> <size>
fn create(args: &[String]) -> Result<String, String> {
    let [_, _, format, path, size] = args else {
        return Err(format!("bad create arguments: {:?}", args));
    };
    let virtual_size = parse_size(size)?;
    save(path, &FakeImage { format: format.clone(), virtual_size })?;
    Ok(format!(
        "Formatting '{}', fmt={} size={}\n",
        path, format, virtual_size
    ))
}

// convert -O <fmt> <src> <dst>
fn convert(args: &[String]) -> Result<String, String> {
    let [_, _, format, src, dst] = args else {
        return Err(format!("bad convert arguments: {:?}", args));
    };
    let image = load(src)?;
    save(dst, &FakeImage { format: format.clone(), virtual_size: image.virtual_size })?;
    Ok(String::new())
}

// resize <path> +<N>G
fn resize(args: &[String]) -> Result<String, String> {
    let [_, path, delta] = args else {
        return Err(format!("bad resize arguments: {:?}", args));
    };
    if !delta.starts_with('+') {
        return Err("expected a relative size".to_string());
    }
    let mut image = load(path)?;
    image.virtual_size += parse_size(delta)?;
    save(path, &image)?;
    Ok("Image resized.\n".to_string())
}

// info <path>
fn info(args: &[String]) -> Result<String, String> {
    let [_, path] = args else {
        return Err(format!("bad info arguments: {:?}", args));
    };
    let image = load(path)?;
    Ok(format!(
        "image: {}\nfile format: {}\nvirtual size: {} GiB ({} bytes)\ndisk size: 196 KiB\ncluster_size: 65536\n",
        path,
        image.format,
        image.virtual_size / GIB,
        image.virtual_size
    ))
}

pub fn config(dir: &Path) -> ManagerConfig {
    ManagerConfig::builder()
        .store_dir(dir.join("VImgs"))
        .media_dir(dir.join("isofiles"))
        .build()
}

pub fn service(dir: &Path, qemu: &Arc<FakeQemu>) -> DiskService {
    DiskService::with_runner(config(dir), qemu.clone()).unwrap()
}
