use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use asset_audit::cli;
use asset_audit::config::ConfigOverrides;

#[derive(Parser)]
#[command(
    name = "asset-audit",
    version,
    about = "Decrypt exported attachment blobs where possible and audit every file"
)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Walk an assets tree and write one audit row per file
    Audit(AuditArgs),

    /// Try every cipher layout on one file and print the attempts as JSON
    Inspect {
        /// File to inspect
        file: PathBuf,

        /// Key as hex or base64
        #[arg(long)]
        key: Option<String>,

        /// External OpenSSL-compatible tool instead of the built-in ciphers
        #[arg(long, env = "OPENSSL_BIN")]
        openssl: Option<PathBuf>,
    },
}

#[derive(Args)]
struct AuditArgs {
    /// SQLite database holding the attachment keys
    #[arg(long, env = "DB")]
    db: Option<PathBuf>,

    /// Root directory of the exported attachments
    #[arg(long, env = "ASSETS_ROOT")]
    assets: Option<PathBuf>,

    /// Audit CSV to write [default: asset_audit.csv]
    #[arg(long)]
    out: Option<PathBuf>,

    /// Directory for preview artifacts [default: <out stem>_previews]
    #[arg(long)]
    preview_dir: Option<PathBuf>,

    /// External OpenSSL-compatible tool instead of the built-in ciphers
    #[arg(long, env = "OPENSSL_BIN")]
    openssl: Option<PathBuf>,

    /// Stop after this many files (0 = no limit)
    #[arg(long, env = "LIMIT")]
    limit: Option<usize>,

    /// Files processed concurrently [default: 1]
    #[arg(long)]
    jobs: Option<usize>,

    /// Largest preview written per file, in bytes [default: 64 MiB]
    #[arg(long)]
    max_preview_bytes: Option<u64>,

    /// Largest keyed file decrypted, in bytes (0 = no limit) [default: 1 GiB]
    #[arg(long)]
    max_keyed_bytes: Option<u64>,

    /// Write a JSON run report here
    #[arg(long)]
    report: Option<PathBuf>,

    /// YAML config file; command line values take precedence
    #[arg(long)]
    config: Option<PathBuf>,
}

impl AuditArgs {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            database_path: self.db.clone(),
            assets_root: self.assets.clone(),
            cipher_backend: self.openssl.clone(),
            max_files: self.limit,
            audit_path: self.out.clone(),
            preview_dir: self.preview_dir.clone(),
            max_preview_bytes: self.max_preview_bytes,
            max_keyed_bytes: self.max_keyed_bytes,
            jobs: self.jobs,
            report_path: self.report.clone(),
        }
    }
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let opts = Cli::parse();
    init_tracing(opts.verbose);

    match opts.command {
        Commands::Audit(args) => {
            match cli::audit::run(args.overrides(), args.config.as_deref()).await {
                Ok(_) => ExitCode::SUCCESS,
                Err(e) => {
                    eprintln!("asset-audit: {}", e);
                    ExitCode::from(e.exit_code())
                }
            }
        }
        Commands::Inspect { file, key, openssl } => {
            match cli::inspect::run(&file, key.as_deref(), openssl.as_deref()).await {
                Ok(()) => ExitCode::SUCCESS,
                Err(e) => {
                    eprintln!("asset-audit: {:#}", e);
                    ExitCode::FAILURE
                }
            }
        }
    }
}
