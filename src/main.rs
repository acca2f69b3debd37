/*!
 * Stowage CLI - command line access to S3-compatible object storage
 */

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use secrecy::SecretString;
use std::path::{Path, PathBuf};
use std::time::Duration;
use stowage::{
    logging::{self, LogConfig},
    types::{ByteRange, ObjectDescriptor, ObjectSize, PresignedUrlSpec, UploadSpec},
    ConnectionProvider, ObjectFacade, StorageProperties,
};
use tokio::io::AsyncWriteExt;

/// Default part size for streamed uploads (16 MiB)
const DEFAULT_PART_SIZE: u64 = 16 * 1024 * 1024;

#[derive(Parser)]
#[command(name = "stowage")]
#[command(version, about = "Command line access to S3-compatible object storage", long_about = None)]
struct Cli {
    /// Properties file (TOML)
    #[arg(short = 'c', long = "config", value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Service endpoint, e.g. http://localhost:9000
    #[arg(long, global = true)]
    endpoint: Option<String>,

    /// Access key
    #[arg(long, global = true)]
    access_key: Option<String>,

    /// Secret key
    #[arg(long, global = true)]
    secret_key: Option<String>,

    /// Region
    #[arg(long, global = true)]
    region: Option<String>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Write JSON logs to this file instead of stderr
    #[arg(long = "log", value_name = "FILE", global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List buckets
    Buckets,

    /// Create a bucket (no error if it exists)
    Mb {
        bucket: String,
    },

    /// Remove an empty bucket
    Rb {
        bucket: String,
    },

    /// List objects
    Ls {
        bucket: String,

        /// Key prefix
        prefix: Option<String>,

        /// List all keys under the prefix instead of one level
        #[arg(short, long)]
        recursive: bool,
    },

    /// Upload a file, or stdin when the path is `-`
    Put {
        bucket: String,
        key: String,
        path: PathBuf,

        /// Content type (guessed from the file name when omitted)
        #[arg(long)]
        content_type: Option<String>,

        /// Part size in bytes for streamed uploads (5 MiB to 5 GiB)
        #[arg(long, default_value_t = DEFAULT_PART_SIZE)]
        part_size: u64,
    },

    /// Download an object to a file, or stdout when no path is given
    Get {
        bucket: String,
        key: String,
        path: Option<PathBuf>,

        /// Object version
        #[arg(long)]
        version: Option<String>,

        /// First byte to read
        #[arg(long)]
        offset: Option<u64>,

        /// Number of bytes to read
        #[arg(long, requires = "offset")]
        length: Option<u64>,
    },

    /// Show object metadata
    Stat {
        bucket: String,
        key: String,

        #[arg(long)]
        version: Option<String>,
    },

    /// Remove one or more objects
    Rm {
        bucket: String,

        #[arg(required = true)]
        keys: Vec<String>,
    },

    /// Create a directory marker (name must end with '/')
    Mkdir {
        bucket: String,
        name: String,
    },

    /// Print a presigned GET URL
    Presign {
        bucket: String,
        key: String,

        /// Expiry in seconds (default 7 days)
        #[arg(long)]
        expires: Option<u64>,

        #[arg(long)]
        version: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    let code = match run().await {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            1
        }
    };
    std::process::exit(code);
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    let mut log_config = LogConfig::from_verbosity(cli.verbose);
    log_config.log_file = cli.log_file.clone();
    if let Err(e) = logging::init_logging(&log_config) {
        eprintln!("Warning: Failed to initialize logging: {}", e);
    }

    let props = load_properties(&cli)?;
    let provider = ConnectionProvider::initialize(&props)
        .await
        .context("failed to connect")?;
    let objects = provider.objects();

    match cli.command {
        Commands::Buckets => {
            for bucket in objects.list_buckets().await? {
                let created = bucket
                    .creation_date
                    .map(|d| d.format("%Y-%m-%d %H:%M:%S").to_string())
                    .unwrap_or_default();
                println!("{:<20} {}", created, bucket.name);
            }
        }
        Commands::Mb { bucket } => {
            objects.create_bucket_if_absent(&bucket).await?;
            println!("Bucket {} ready", bucket);
        }
        Commands::Rb { bucket } => {
            objects.remove_bucket(&bucket).await?;
            println!("Removed bucket {}", bucket);
        }
        Commands::Ls {
            bucket,
            prefix,
            recursive,
        } => {
            for entry in objects
                .list_objects(&bucket, prefix.as_deref(), recursive)
                .await?
            {
                if entry.is_dir {
                    println!("{:>12} {}", "DIR", entry.key);
                } else {
                    println!("{:>12} {}", entry.size, entry.key);
                }
            }
        }
        Commands::Put {
            bucket,
            key,
            path,
            content_type,
            part_size,
        } => put(&objects, &bucket, &key, &path, content_type, part_size).await?,
        Commands::Get {
            bucket,
            key,
            path,
            version,
            offset,
            length,
        } => {
            let mut object = ObjectDescriptor::new(bucket, key);
            if let Some(version) = version {
                object = object.version(version);
            }
            if let Some(offset) = offset {
                object = object.range(ByteRange {
                    offset,
                    length,
                });
            }

            let mut stream = objects.get(&object).await?;
            match path {
                Some(path) => {
                    let mut file = tokio::fs::File::create(&path)
                        .await
                        .with_context(|| format!("cannot create {}", path.display()))?;
                    let written = tokio::io::copy(&mut stream.reader, &mut file).await?;
                    file.flush().await?;
                    println!("Wrote {} bytes to {}", written, path.display());
                }
                None => {
                    let mut stdout = tokio::io::stdout();
                    tokio::io::copy(&mut stream.reader, &mut stdout).await?;
                    stdout.flush().await?;
                }
            }
        }
        Commands::Stat {
            bucket,
            key,
            version,
        } => {
            let mut object = ObjectDescriptor::new(bucket, key);
            if let Some(version) = version {
                object = object.version(version);
            }
            let meta = objects.stat(&object).await?;
            println!("Name:          {}/{}", meta.bucket, meta.key);
            println!("Size:          {}", meta.size);
            println!("Content-Type:  {}", meta.content_type.unwrap_or_default());
            println!("ETag:          {}", meta.etag.unwrap_or_default());
            if let Some(modified) = meta.last_modified {
                println!("Last-Modified: {}", modified.to_rfc3339());
            }
            if let Some(version) = meta.version_id {
                println!("Version:       {}", version);
            }
            let mut user: Vec<_> = meta.user_metadata.into_iter().collect();
            user.sort();
            for (name, value) in user {
                println!("Meta:          {}={}", name, value);
            }
        }
        Commands::Rm { bucket, keys } => {
            if let [key] = keys.as_slice() {
                objects.remove(&ObjectDescriptor::new(&bucket, key)).await?;
                println!("Removed {}", key);
            } else {
                let result = objects.remove_batch(&bucket, &keys).await?;
                println!("Removed {} of {} objects", result.deleted_keys().len(), result.len());
                for failure in result.failures() {
                    eprintln!("  {}: {} ({})", failure.key, failure.message, failure.code);
                }
                if !result.all_succeeded() {
                    bail!("some objects could not be removed");
                }
            }
        }
        Commands::Mkdir { bucket, name } => {
            objects.mkdir(&bucket, &name).await?;
            println!("Created {}/{}", bucket, name);
        }
        Commands::Presign {
            bucket,
            key,
            expires,
            version,
        } => {
            let mut object = ObjectDescriptor::new(bucket, key);
            if let Some(version) = version {
                object = object.version(version);
            }
            let mut spec = PresignedUrlSpec::get(object);
            if let Some(secs) = expires {
                spec = spec.expiry(Duration::from_secs(secs));
            }
            println!("{}", objects.presigned_url(&spec).await?);
        }
    }

    Ok(())
}

/// Properties file, then environment, then command line flags
fn load_properties(cli: &Cli) -> Result<StorageProperties> {
    let props = match &cli.config {
        Some(path) => StorageProperties::from_file(path)?,
        None => StorageProperties::default(),
    };
    let mut props = props.with_env_overrides()?;

    if let Some(endpoint) = &cli.endpoint {
        props.endpoint = Some(endpoint.clone());
    }
    if let Some(access_key) = &cli.access_key {
        props.access_key = Some(access_key.clone());
    }
    if let Some(secret_key) = &cli.secret_key {
        props.secret_key = Some(SecretString::new(secret_key.clone().into_boxed_str()));
    }
    if let Some(region) = &cli.region {
        props.region = Some(region.clone());
    }
    Ok(props)
}

async fn put(
    objects: &ObjectFacade,
    bucket: &str,
    key: &str,
    path: &Path,
    content_type: Option<String>,
    part_size: u64,
) -> Result<()> {
    let object = ObjectDescriptor::new(bucket, key);

    // Files over one part go multipart
    let spec = if path.as_os_str() == "-" {
        UploadSpec::new(tokio::io::stdin(), ObjectSize::Unknown).part_size(part_size)
    } else {
        let file = tokio::fs::File::open(path)
            .await
            .with_context(|| format!("cannot open {}", path.display()))?;
        let len = file.metadata().await?.len();
        if len > part_size {
            UploadSpec::new(file, ObjectSize::Unknown).part_size(part_size)
        } else {
            UploadSpec::new(file, ObjectSize::Known(len))
        }
    };

    let content_type = content_type.unwrap_or_else(|| {
        let name = if path.as_os_str() == "-" {
            Path::new(key)
        } else {
            path
        };
        mime_guess::from_path(name).first_or_octet_stream().to_string()
    });

    let receipt = objects.put(&object, spec.content_type(content_type)).await?;
    println!(
        "Uploaded {}/{} (etag {})",
        receipt.bucket,
        receipt.key,
        receipt.etag.unwrap_or_default()
    );
    Ok(())
}
