//! pocketfs: hybrid inline/block storage image CLI
//!
//! Commands:
//!   write <path>            - write stdin (or --input) into a file
//!   read <path>             - read a file to stdout (or --output)
//!   truncate <path> <size>  - shrink a file
//!   stat <path>             - show mode/size/version
//!   ls                      - list files in the image
//!
//! Files under the top-level `encrypt` directory are transparently
//! ciphered with the key from the config; everything else is stored raw.

mod image;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing::info;

use image::Image;
use pocketfs_core::PocketfsConfig;

// ── CLI structure ──────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "pocketfs",
    version,
    about = "pocketfs storage image client",
    long_about = "pocketfs: read and write files in a hybrid inline/block storage image"
)]
struct Cli {
    /// Path to pocketfs.toml configuration file
    #[arg(
        long,
        short = 'c',
        env = "POCKETFS_CONFIG",
        default_value = "pocketfs.toml"
    )]
    config: PathBuf,

    /// Image root directory (overrides config)
    #[arg(long, short = 'i', env = "POCKETFS_IMAGE")]
    image: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "POCKETFS_LOG", default_value = "warn")]
    log: String,

    /// Log format (json, text)
    #[arg(long, env = "POCKETFS_LOG_FORMAT", default_value = "text")]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Debug, ValueEnum)]
enum LogFormat {
    Json,
    Text,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write data into a file at a path inside the image
    Write {
        /// File path inside the image (e.g. /encrypt/notes.txt)
        path: String,
        /// Byte offset to write at (ignored with --append)
        #[arg(long, short = 'o', default_value_t = 0)]
        offset: u64,
        /// Append to the end of the file
        #[arg(long, short = 'a')]
        append: bool,
        /// Read data from this file instead of stdin
        #[arg(long)]
        input: Option<PathBuf>,
    },

    /// Read a file out of the image
    Read {
        /// File path inside the image
        path: String,
        /// Byte offset to read from
        #[arg(long, short = 'o', default_value_t = 0)]
        offset: u64,
        /// Maximum bytes to read (default: to end of file)
        #[arg(long, short = 'l')]
        len: Option<usize>,
        /// Write data to this file instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Shrink a file to the given size
    Truncate {
        /// File path inside the image
        path: String,
        /// New size in bytes
        size: u64,
    },

    /// Show a file's storage mode and metadata
    Stat {
        /// File path inside the image
        path: String,
    },

    /// List files in the image
    Ls,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log, &cli.log_format);

    let config = load_config(&cli.config).await?;
    let root = cli
        .image
        .clone()
        .unwrap_or_else(|| config.storage.image.clone());

    info!(image = %root.display(), "opening image");
    let mut image = Image::open(&root, &config).await?;

    match cli.command {
        Commands::Write {
            path,
            offset,
            append,
            input,
        } => {
            let data = match input {
                Some(file) => tokio::fs::read(&file)
                    .await
                    .with_context(|| format!("reading {}", file.display()))?,
                None => {
                    use tokio::io::AsyncReadExt;
                    let mut buf = Vec::new();
                    tokio::io::stdin()
                        .read_to_end(&mut buf)
                        .await
                        .context("reading stdin")?;
                    buf
                }
            };

            let (entry, id) = image.resolve_or_create(&path).await?;
            let written = image
                .engine()
                .write(image.namespace(), entry, id, offset, &data, append)
                .await?;
            image.save().await?;

            let st = image.engine().stat(id).await?;
            println!("wrote {written} bytes to {path} ({} mode)", st.mode);
        }

        Commands::Read {
            path,
            offset,
            len,
            output,
        } => {
            let (entry, id) = image.resolve(&path).await?;
            let st = image.engine().stat(id).await?;
            let len = len.unwrap_or(st.size.saturating_sub(offset) as usize);
            let data = image
                .engine()
                .read(image.namespace(), entry, id, offset, len)
                .await?;

            match output {
                Some(file) => tokio::fs::write(&file, &data)
                    .await
                    .with_context(|| format!("writing {}", file.display()))?,
                None => {
                    use tokio::io::AsyncWriteExt;
                    tokio::io::stdout()
                        .write_all(&data)
                        .await
                        .context("writing stdout")?;
                }
            }
        }

        Commands::Truncate { path, size } => {
            let (_, id) = image.resolve(&path).await?;
            image.engine().truncate(id, size).await?;
            image.save().await?;
            println!("truncated {path} to {size} bytes");
        }

        Commands::Stat { path } => {
            let (_, id) = image.resolve(&path).await?;
            let st = image.engine().stat(id).await?;
            println!("path:    {path}");
            println!("record:  {}", st.id);
            println!("mode:    {}", st.mode);
            println!("size:    {}", st.size);
            println!("version: {}", st.version);
            println!("blocks:  {}", st.blocks);
            if let Ok(age) = st.mtime.elapsed() {
                println!("mtime:   {}s ago", age.as_secs());
            }
        }

        Commands::Ls => {
            for (path, id) in image.paths() {
                let st = image.engine().stat(id).await?;
                println!("{:>8}  {:6}  {}", st.size, st.mode.to_string(), path);
            }
        }
    }

    Ok(())
}

async fn load_config(path: &PathBuf) -> Result<PocketfsConfig> {
    if path.exists() {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| anyhow::anyhow!("reading config {}: {e}", path.display()))?;
        toml::from_str(&content)
            .map_err(|e| anyhow::anyhow!("parsing config {}: {e}", path.display()))
    } else {
        tracing::debug!("config file not found: {} (using defaults)", path.display());
        Ok(PocketfsConfig::default())
    }
}

fn init_logging(level: &str, format: &LogFormat) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json())
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer())
                .init();
        }
    }
}
