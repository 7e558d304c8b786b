mod progress;

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{Context as _, Result, anyhow};
use clap::{Parser, Subcommand};
use divelink_core::{
    Context, Device, Dive, EventMask, LogLevel, SessionConfig, descriptor, extract_dives,
    open_device,
};
use tracing::{error, info, warn};

use crate::progress::ProgressObserver;

#[derive(Parser, Debug)]
#[command(author, version, about = "Dive computer download tool", long_about = None)]
struct Cli {
    /// TOML file with session settings
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Product name of the dive computer (default: Sensus)
    #[arg(long, global = true)]
    device: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Download the raw device memory to a file
    Dump {
        /// Serial port the device is attached to
        #[arg(long)]
        port: Option<String>,

        /// Destination file
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Download dives newer than the fingerprint, one file per dive
    Dives {
        #[arg(long)]
        port: Option<String>,

        /// Device timestamp of the newest dive already downloaded
        #[arg(long)]
        fingerprint: Option<u32>,

        #[arg(long)]
        output_dir: Option<PathBuf>,
    },
    /// Split a previously saved memory dump into dives
    Extract {
        #[arg(short, long)]
        input: PathBuf,

        #[arg(long)]
        fingerprint: Option<u32>,

        #[arg(long)]
        output_dir: Option<PathBuf>,
    },
    /// Look up a product name in the device table
    Identify { name: String },
}

fn main() {
    let cli = Cli::parse();

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(if cli.verbose {
                    tracing::Level::DEBUG.into()
                } else {
                    tracing::Level::INFO.into()
                })
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    if let Err(e) = run(cli) {
        error!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let mut config = match &cli.config {
        Some(path) => SessionConfig::load_from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => SessionConfig::default(),
    };
    if cli.device.is_some() {
        config.device = cli.device.clone();
    }

    let cancelled = Arc::new(AtomicBool::new(false));
    let flag = cancelled.clone();
    ctrlc::set_handler(move || {
        flag.store(true, Ordering::SeqCst);
    })?;

    let context = Arc::new(
        Context::new()
            .with_loglevel(if cli.verbose {
                LogLevel::Debug
            } else {
                LogLevel::Warning
            })
            .with_cancel(move || cancelled.load(Ordering::SeqCst)),
    );

    match cli.command {
        Commands::Dump { port, output } => {
            if port.is_some() {
                config.port = port;
            }
            let observer = Arc::new(ProgressObserver::new());
            let mut device = open_session(&config, context, observer.clone())?;

            let mut buffer = Vec::new();
            let result = device.dump(&mut buffer);
            finish_session(device, &observer, result.is_ok());
            result?;

            std::fs::write(&output, &buffer)
                .with_context(|| format!("writing {}", output.display()))?;
            info!(bytes = buffer.len(), path = %output.display(), "Memory dump saved");
        }
        Commands::Dives {
            port,
            fingerprint,
            output_dir,
        } => {
            if port.is_some() {
                config.port = port;
            }
            if fingerprint.is_some() {
                config.fingerprint = fingerprint;
            }
            if let Some(dir) = output_dir {
                config.output_dir = Some(dir.display().to_string());
            }
            let dir = output_directory(&config)?;

            let observer = Arc::new(ProgressObserver::new());
            let mut device = open_session(&config, context, observer.clone())?;
            if let Some(fingerprint) = config.fingerprint {
                device.set_fingerprint(&fingerprint.to_le_bytes())?;
            }

            let mut writer = DiveWriter::new(dir);
            let result = device.foreach(&mut |dive| writer.save(dive));
            finish_session(device, &observer, result.is_ok());
            result?;
            writer.finish()?;

            info!(count = writer.count, "Dives downloaded");
            if let Some(newest) = writer.newest {
                println!("Newest fingerprint: {newest}");
                if let Some(path) = &cli.config {
                    config.fingerprint = Some(newest);
                    config.save_to_file(path)?;
                    info!(path = %path.display(), "Fingerprint stored");
                }
            }
        }
        Commands::Extract {
            input,
            fingerprint,
            output_dir,
        } => {
            let data = std::fs::read(&input)
                .with_context(|| format!("reading {}", input.display()))?;

            match output_dir {
                Some(dir) => {
                    std::fs::create_dir_all(&dir)?;
                    let mut writer = DiveWriter::new(dir);
                    extract_dives(&data, fingerprint, &mut |dive| writer.save(dive))?;
                    writer.finish()?;
                    info!(count = writer.count, "Dives extracted");
                }
                None => {
                    extract_dives(&data, fingerprint, &mut |dive| {
                        println!(
                            "timestamp {:>10}  {:>6} bytes",
                            dive.timestamp,
                            dive.data.len()
                        );
                        true
                    })?;
                }
            }
        }
        Commands::Identify { name } => {
            let found = descriptor::identify(&name)
                .ok_or_else(|| anyhow!("no supported device matches '{name}'"))?;
            println!(
                "{} {} (family {}, model {})",
                found.vendor, found.product, found.family, found.model
            );
        }
    }

    Ok(())
}

fn open_session(
    config: &SessionConfig,
    context: Arc<Context>,
    observer: Arc<ProgressObserver>,
) -> Result<Box<dyn Device>> {
    let name = config.device.as_deref().unwrap_or("Sensus");
    let descriptor = descriptor::identify(name)
        .ok_or_else(|| anyhow!("no supported device matches '{name}'"))?;
    let port = config
        .port
        .as_deref()
        .context("no serial port given (use --port or the config file)")?;

    info!(device = descriptor.product, port, "Connecting");
    let transport = open_transport(port)?;
    let mut device = open_device(context, &descriptor, transport)?;

    if let Some(timeout_ms) = config.timeout_ms {
        device.set_timeout(Duration::from_millis(timeout_ms))?;
    }
    device.set_events(EventMask::ALL, observer);
    Ok(device)
}

#[cfg(unix)]
fn open_transport(port: &str) -> Result<Box<dyn divelink_core::IoStream>> {
    let transport = divelink_core::transport::SerialTransport::open(port)?;
    Ok(Box::new(transport))
}

#[cfg(not(unix))]
fn open_transport(_port: &str) -> Result<Box<dyn divelink_core::IoStream>> {
    anyhow::bail!("serial ports are only supported on unix hosts")
}

fn finish_session(device: Box<dyn Device>, observer: &ProgressObserver, ok: bool) {
    if ok {
        observer.finish("Download complete.");
    } else {
        observer.abandon();
    }
    if let Err(e) = device.close() {
        warn!(error = %e, "Failed to close device");
    }
}

fn output_directory(config: &SessionConfig) -> Result<PathBuf> {
    let dir = PathBuf::from(config.output_dir.as_deref().unwrap_or("."));
    std::fs::create_dir_all(&dir).with_context(|| format!("creating {}", dir.display()))?;
    Ok(dir)
}

/// Writes each dive to `dive-<timestamp>.bin`, stopping at the first I/O error.
struct DiveWriter {
    dir: PathBuf,
    count: usize,
    newest: Option<u32>,
    error: Option<std::io::Error>,
}

impl DiveWriter {
    fn new(dir: PathBuf) -> Self {
        Self {
            dir,
            count: 0,
            newest: None,
            error: None,
        }
    }

    fn save(&mut self, dive: &Dive<'_>) -> bool {
        let timestamp = dive.timestamp;
        let path = self.dir.join(format!("dive-{timestamp}.bin"));
        if let Err(e) = std::fs::write(&path, dive.data) {
            self.error = Some(e);
            return false;
        }

        // Dives arrive newest first.
        self.newest.get_or_insert(timestamp);
        self.count += 1;
        info!(timestamp, bytes = dive.data.len(), path = %path.display(), "Saved dive");
        true
    }

    fn finish(&mut self) -> Result<()> {
        match self.error.take() {
            Some(e) => Err(e).context("writing dive file"),
            None => Ok(()),
        }
    }
}
