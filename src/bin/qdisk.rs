//! qdisk CLI - virtual disk lifecycle manager over qemu-img

use clap::{Parser, Subcommand};
use qdisk::models::*;
use qdisk::{DiskService, ManagerConfig, Result, Server};
use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "qdisk")]
#[command(about = "Create, convert, resize and boot virtual disk images")]
#[command(version)]
struct Cli {
    /// Directory holding disk images
    #[arg(long, global = true, env = "QDISK_STORE_DIR", default_value = qdisk::config::DEFAULT_STORE_DIR)]
    store_dir: PathBuf,

    /// Directory receiving uploaded install media
    #[arg(long, global = true, env = "QDISK_MEDIA_DIR", default_value = qdisk::config::DEFAULT_MEDIA_DIR)]
    media_dir: PathBuf,

    /// qemu-img binary
    #[arg(long, global = true, env = "QDISK_QEMU_IMG", default_value = qdisk::config::DEFAULT_QEMU_IMG)]
    qemu_img: PathBuf,

    /// Emulator binary
    #[arg(long, global = true, env = "QDISK_EMULATOR", default_value = qdisk::config::DEFAULT_EMULATOR)]
    emulator: PathBuf,

    /// Emulator display backend
    #[arg(long, global = true, env = "QDISK_DISPLAY", default_value = qdisk::config::DEFAULT_DISPLAY)]
    display: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Disk image operations
    Disk {
        #[command(subcommand)]
        action: DiskAction,
    },
    /// Virtual machine operations
    Vm {
        #[command(subcommand)]
        action: VmAction,
    },
    /// Start HTTP API server
    Serve {
        /// Host to bind to
        #[arg(long, default_value = "0.0.0.0")]
        host: String,
        /// Port to listen on
        #[arg(short, long, default_value = "5000")]
        port: u16,
    },
}

#[derive(Subcommand)]
enum DiskAction {
    /// Create a new disk image
    Create {
        /// Disk file name
        name: String,
        /// Size in GiB
        #[arg(short, long)]
        size: f64,
        /// Image format (raw, qcow2, vmdk, vdi, vhdx)
        #[arg(short, long, default_value = "qcow2")]
        format: String,
    },
    /// Re-encode a disk in another format
    Convert {
        name: String,
        /// Target format
        #[arg(short, long)]
        format: String,
    },
    /// Grow a disk
    Resize {
        name: String,
        /// GiB to add
        #[arg(short, long)]
        by: f64,
    },
    /// Show disk metadata
    Info { name: String },
    /// List disks in the store
    List,
}

#[derive(Subcommand)]
enum VmAction {
    /// Boot a machine from a disk and wait for it to exit
    Start {
        /// Machine name
        #[arg(short, long)]
        name: String,
        /// Disk to boot from
        #[arg(short, long)]
        disk: String,
        /// CPU count
        #[arg(short, long, default_value = "1")]
        cpus: u32,
        /// Memory, in GiB unless suffixed (e.g. 2, 512M, 4G)
        #[arg(short, long, default_value = "1")]
        memory: String,
        /// Install medium attached as CD-ROM
        #[arg(long)]
        iso: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("qdisk=info,tower_http=info")),
        )
        .init();

    let cli = Cli::parse();

    let config = ManagerConfig::builder()
        .store_dir(cli.store_dir)
        .media_dir(cli.media_dir)
        .qemu_img(cli.qemu_img)
        .emulator(cli.emulator)
        .display(cli.display)
        .build_validated()?;

    let service = DiskService::with_config(config)?;

    match cli.command {
        Commands::Disk { action } => handle_disk(&service, action)?,
        Commands::Vm { action } => handle_vm(&service, action).await?,
        Commands::Serve { host, port } => {
            let addr: SocketAddr = format!("{}:{}", host, port)
                .parse()
                .map_err(|e| qdisk::Error::Config(format!("invalid listen address: {}", e)))?;

            println!("Starting API server on http://{}", addr);
            println!();
            println!("Endpoints:");
            println!("  GET  /health                                Health check");
            println!("  GET  /api/virtual-disk                      List disks");
            println!("  POST /api/virtual-disk                      Create disk");
            println!("  POST /api/virtual-disk/convert/{{disk_id}}    Convert disk");
            println!("  POST /api/virtual-disk/resize/{{disk_id}}     Grow disk");
            println!("  GET  /api/virtual-disk/info/{{disk_id}}       Disk info");
            println!("  POST /api/vms                               Start machine (multipart)");
            println!();

            let server = Server::new(service, addr);
            server.run().await?;
        }
    }

    Ok(())
}

fn handle_disk(service: &DiskService, action: DiskAction) -> Result<()> {
    match action {
        DiskAction::Create { name, size, format } => {
            let output = service.create_disk_image(&CreateDisk {
                name: Some(name.clone()),
                size: Some(size.into()),
                format: Some(format),
            })?;
            print_output(&output);
            println!("Disk created: {}", name);
        }
        DiskAction::Convert { name, format } => {
            let output = service.change_format(&name, Some(&format))?;
            print_output(&output);
            println!("Disk converted: {} -> {}", name, format);
        }
        DiskAction::Resize { name, by } => {
            let output = service.grow_disk(&name, Some(&by.into()))?;
            print_output(&output);
            println!("Disk resized: {} (+{}G)", name, by);
        }
        DiskAction::Info { name } => {
            let info = service.inspect_disk(&name)?;
            println!("Image:        {}", info.image);
            println!("Format:       {}", info.file_format);
            println!("Virtual size: {}", info.virtual_size);
            println!("Disk size:    {}", info.disk_size);
        }
        DiskAction::List => {
            let disks = service.list_disks()?;
            if disks.is_empty() {
                println!("No disks in {}", service.store().base().display());
            }
            for disk in disks {
                println!("{}", disk);
            }
        }
    }
    Ok(())
}

async fn handle_vm(service: &DiskService, action: VmAction) -> Result<()> {
    match action {
        VmAction::Start { name, disk, cpus, memory, iso } => {
            let install_medium = match iso {
                Some(path) => Some(tokio::fs::canonicalize(&path).await?),
                None => None,
            };
            let spec = service.machine_spec(&StartMachine {
                name: Some(name),
                cpu: Some(cpus.to_string()),
                memory: Some(memory),
                disk_name: Some(disk),
                install_medium,
            })?;

            println!(
                "Starting {} ({} CPU, {}) from {}...",
                spec.name, spec.cpu_count, spec.memory, spec.disk_name
            );
            tokio::select! {
                result = service.launch(&spec) => {
                    result?;
                    println!("Machine exited: {}", spec.name);
                }
                _ = tokio::signal::ctrl_c() => {
                    service.shutdown();
                    println!("Interrupted, machine stopped: {}", spec.name);
                }
            }
        }
    }
    Ok(())
}

fn print_output(output: &str) {
    let output = output.trim();
    if !output.is_empty() {
        println!("{}", output);
    }
}
