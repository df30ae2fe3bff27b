//! gvault: encrypted file vault on a blob host repository
//!
//! Commands:
//!   status                 - check repository access and show storage stats
//!   config show            - display current configuration
//!   ls [--raw]             - list stored files (joined with the metadata index)
//!   tree [<dir>]           - recursive listing of a repository directory
//!   push <files...>        - upload files, optionally sealed with a passphrase
//!   pull <paths...>        - download files, optionally unsealing them
//!   rm <path>              - delete a stored file and its index record
//!   passgen                - print a random passphrase
//!
//! The bearer token is read from GVAULT_TOKEN (or GITHUB_TOKEN).

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use secrecy::{ExposeSecret, SecretString};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use gvault_core::{format_size, EntryKind, GvaultConfig, Session};
use gvault_storage::{build_client, verify_repository, ObjectStore, TreeNode};
use gvault_sync::transfer::sanitize_name;
use gvault_sync::{
    Catalog, DownloadRequest, Progress, ProgressFn, TransferOrchestrator, TransferState,
    UploadRequest,
};

// ── CLI structure ──────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "gvault",
    version,
    about = "Encrypted file vault on a blob host repository",
    long_about = "gvault: push, pull, list, and delete client-side encrypted files stored in a repository"
)]
struct Cli {
    /// Path to gvault.toml configuration file
    #[arg(long, short = 'c', env = "GVAULT_CONFIG", default_value = "gvault.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(long, env = "GVAULT_LOG")]
    log: Option<String>,

    /// Log format; overrides the config file
    #[arg(long, env = "GVAULT_LOG_FORMAT")]
    log_format: Option<LogFormat>,

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
    /// Check repository access and show storage statistics
    Status,

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// List stored files
    Ls {
        /// Show the raw directory listing, ignoring the metadata index
        #[arg(long)]
        raw: bool,
    },

    /// Recursive listing of a repository directory
    Tree {
        /// Directory to walk (default: repository root)
        dir: Option<String>,
    },

    /// Upload local files
    ///
    /// With --encrypt, the passphrase is read from GVAULT_PASSPHRASE or
    /// prompted for.
    Push {
        /// Local files to upload
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Seal each file with a passphrase before upload
        #[arg(long, short = 'e')]
        encrypt: bool,
        /// Reminder stored in the index next to encrypted files
        #[arg(long, requires = "encrypt")]
        hint: Option<String>,
    },

    /// Download stored files
    Pull {
        /// Stored paths (e.g. files/1700000000000_report.pdf.encrypted)
        #[arg(required = true)]
        paths: Vec<String>,
        /// Output directory
        #[arg(long, short = 'o', default_value = ".")]
        out: PathBuf,
        /// Unseal with a passphrase (GVAULT_PASSPHRASE or prompt)
        #[arg(long, short = 'd')]
        decrypt: bool,
    },

    /// Delete a stored file and its index record
    Rm {
        /// Stored path
        path: String,
    },

    /// Print a random 32-character passphrase
    Passgen,
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the active configuration (merged defaults + config file)
    Show,
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli.config).await?;

    let level = cli.log.clone().unwrap_or_else(|| config.log.level.clone());
    let format = cli.log_format.clone().unwrap_or(match config.log.format.as_str() {
        "json" => LogFormat::Json,
        _ => LogFormat::Text,
    });
    init_logging(&level, &format);

    match cli.command {
        Commands::Status => cmd_status(&config).await,
        Commands::Config { action: ConfigAction::Show } => cmd_config_show(&config, &cli.config),
        Commands::Ls { raw } => cmd_ls(&config, raw).await,
        Commands::Tree { dir } => cmd_tree(&config, dir.as_deref().unwrap_or("")).await,
        Commands::Push { files, encrypt, hint } => {
            cmd_push(&config, &files, encrypt, hint.as_deref()).await
        }
        Commands::Pull { paths, out, decrypt } => cmd_pull(&config, &paths, &out, decrypt).await,
        Commands::Rm { path } => cmd_rm(&config, &path).await,
        Commands::Passgen => {
            println!("{}", gvault_crypto::generate_passphrase().expose_secret());
            Ok(())
        }
    }
}

/// Logs go to stderr so command output stays pipeable.
fn init_logging(level: &str, format: &LogFormat) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}

// ── Config loading ────────────────────────────────────────────────────────────

async fn load_config(path: &Path) -> Result<GvaultConfig> {
    if path.exists() {
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("reading config: {}", path.display()))?;
        GvaultConfig::from_toml(&content)
            .with_context(|| format!("parsing config: {}", path.display()))
    } else {
        tracing::debug!(path = %path.display(), "config file not found, using defaults");
        Ok(GvaultConfig::default())
    }
}

// ── Session and store from environment credentials ────────────────────────────

/// Build a session from GVAULT_TOKEN (or GITHUB_TOKEN).
fn session_from_env() -> Result<Session> {
    let token = std::env::var("GVAULT_TOKEN")
        .or_else(|_| std::env::var("GITHUB_TOKEN"))
        .context(
            "no access token set\n\
             Set GVAULT_TOKEN (or GITHUB_TOKEN) to a token with contents read/write access.\n\
             Example:\n\
             \texport GVAULT_TOKEN=github_pat_...",
        )?;
    let user_type = std::env::var("GVAULT_USER_TYPE").unwrap_or_else(|_| "owner".to_string());
    tracing::debug!(%user_type, "session from environment");
    Ok(Session::new(user_type, SecretString::from(token)))
}

fn open_store(config: &GvaultConfig) -> Result<(Arc<dyn ObjectStore>, Session)> {
    let session = session_from_env()?;
    let client = build_client(config, &session).context("building content API client")?;
    Ok((Arc::new(client), session))
}

fn orchestrator(config: &GvaultConfig) -> Result<TransferOrchestrator> {
    let (store, session) = open_store(config)?;
    Ok(TransferOrchestrator::from_config(store, config, &session))
}

/// Passphrase from GVAULT_PASSPHRASE, or an interactive prompt.
fn read_passphrase(confirm: bool) -> Result<SecretString> {
    if let Ok(p) = std::env::var("GVAULT_PASSPHRASE") {
        return Ok(SecretString::from(p));
    }
    let first = rpassword::prompt_password("Passphrase: ").context("reading passphrase")?;
    if first.is_empty() {
        anyhow::bail!("passphrase must not be empty");
    }
    if confirm {
        let second =
            rpassword::prompt_password("Confirm passphrase: ").context("reading passphrase")?;
        if first != second {
            anyhow::bail!("passphrases do not match");
        }
    }
    Ok(SecretString::from(first))
}

fn copy_secret(s: &SecretString) -> SecretString {
    SecretString::from(s.expose_secret().to_owned())
}

// ── Progress bar helpers ──────────────────────────────────────────────────────

fn make_progress_bar(prefix: &str) -> ProgressBar {
    let pb = ProgressBar::new(100);
    let style = ProgressStyle::with_template("{prefix:.bold} [{bar:40.cyan/blue}] {pos:>3}% {msg}")
        .map(|s| s.progress_chars("=>-"))
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    pb.set_style(style);
    pb.set_prefix(prefix.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

fn progress_sink(pb: &ProgressBar) -> ProgressFn {
    let pb = pb.clone();
    Box::new(move |p: &Progress| {
        pb.set_position(p.batch_percent.round() as u64);
        pb.set_message(format!("[{}/{}] {} ({})", p.index + 1, p.total, p.name, p.state));
        if let TransferState::Failed(reason) = &p.state {
            pb.println(format!("  failed: {} ({reason})", p.name));
        }
    })
}

// ── `gvault status` ───────────────────────────────────────────────────────────

async fn cmd_status(config: &GvaultConfig) -> Result<()> {
    let session = session_from_env()?;
    let client = build_client(config, &session).context("building content API client")?;

    println!("gvault v{}", env!("CARGO_PKG_VERSION"));
    println!(
        "repository:  {}/{} @ {}",
        config.repo.owner, config.repo.name, config.repo.branch
    );
    println!("api:         {}", config.repo.api_url);

    let info = verify_repository(&client)
        .await
        .context("checking repository access")?;
    println!(
        "access:      ok ({}, default branch {})",
        if info.private { "private" } else { "public" },
        info.default_branch
    );

    let store: Arc<dyn ObjectStore> = Arc::new(client);
    let orch = TransferOrchestrator::from_config(store.clone(), config, &session);
    let catalog = Catalog::build(store.as_ref(), orch.index(), &config.storage.files_dir)
        .await
        .context("building catalog")?;
    let stats = catalog.stats();

    println!("files:       {}", stats.files);
    println!("encrypted:   {}", stats.encrypted);
    println!("total size:  {}", format_size(stats.total_bytes));
    if let Some(reason) = &catalog.degraded {
        println!("index:       unavailable ({reason})");
    } else {
        println!(
            "index:       {} ({} unindexed, {} dangling)",
            config.storage.index_path,
            catalog.orphans().count(),
            catalog.dangling.len()
        );
    }
    Ok(())
}

// ── `gvault config show` ──────────────────────────────────────────────────────

fn cmd_config_show(config: &GvaultConfig, config_path: &Path) -> Result<()> {
    if config_path.exists() {
        println!("# Configuration from: {}", config_path.display());
    } else {
        println!("# Configuration: defaults (no file at {})", config_path.display());
    }
    println!();
    let rendered = toml::to_string_pretty(config).context("serializing config to TOML")?;
    print!("{rendered}");
    Ok(())
}

// ── `gvault ls` ───────────────────────────────────────────────────────────────

async fn cmd_ls(config: &GvaultConfig, raw: bool) -> Result<()> {
    let (store, session) = open_store(config)?;
    let files_dir = &config.storage.files_dir;

    if raw {
        let entries = store
            .list(files_dir)
            .await
            .with_context(|| format!("listing {files_dir}"))?;
        for e in &entries {
            let marker = if e.kind == EntryKind::Dir { "/" } else { "" };
            println!("{:>10}  {}{marker}", format_size(e.size), e.path);
        }
        println!("{} entries", entries.len());
        return Ok(());
    }

    let orch = TransferOrchestrator::from_config(store.clone(), config, &session);
    let catalog = Catalog::build(store.as_ref(), orch.index(), files_dir)
        .await
        .context("building catalog")?;

    if let Some(reason) = &catalog.degraded {
        eprintln!("warning: metadata index unavailable ({reason}); names derived from paths");
    }
    for entry in &catalog.entries {
        let lock = if entry.encrypted { "E " } else { "  " };
        let hint = entry
            .password_hint()
            .map(|h| format!("  hint: {h}"))
            .unwrap_or_default();
        println!(
            "{lock} {:>10}  {:<12} {:<32} {}{hint}",
            format_size(entry.size),
            entry.kind().as_str(),
            entry.name,
            entry.stored_path,
        );
    }
    for rec in &catalog.dangling {
        println!("!! {:>10}  {:<12} {:<32} {} (missing)", "-", "-", rec.file_name, rec.stored_path);
    }
    println!("{} files", catalog.entries.len());
    Ok(())
}

// ── `gvault tree` ─────────────────────────────────────────────────────────────

fn print_tree(nodes: &[TreeNode], indent: usize) {
    for node in nodes {
        match node.kind {
            EntryKind::Dir => {
                println!("{:indent$}{}/", "", node.name, indent = indent);
                print_tree(&node.children, indent + 2);
            }
            EntryKind::File => {
                println!(
                    "{:indent$}{} ({})",
                    "",
                    node.name,
                    format_size(node.size),
                    indent = indent
                );
            }
        }
    }
}

async fn cmd_tree(config: &GvaultConfig, dir: &str) -> Result<()> {
    let (store, _session) = open_store(config)?;
    let nodes = gvault_storage::walk(store.as_ref(), dir)
        .await
        .with_context(|| format!("walking {}", if dir.is_empty() { "/" } else { dir }))?;
    print_tree(&nodes, 0);
    let files: usize = nodes.iter().map(TreeNode::file_count).sum();
    let bytes: u64 = nodes.iter().map(TreeNode::total_bytes).sum();
    println!();
    println!("{files} files, {}", format_size(bytes));
    Ok(())
}

// ── `gvault push` ─────────────────────────────────────────────────────────────

async fn cmd_push(
    config: &GvaultConfig,
    files: &[PathBuf],
    encrypt: bool,
    hint: Option<&str>,
) -> Result<()> {
    let orch = orchestrator(config)?;
    let passphrase = if encrypt { Some(read_passphrase(true)?) } else { None };

    let mut requests = Vec::with_capacity(files.len());
    for path in files {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("reading {}", path.display()))?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .with_context(|| format!("not a file: {}", path.display()))?;

        let mut request = match &passphrase {
            Some(p) => UploadRequest::encrypted(name, bytes, copy_secret(p)),
            None => UploadRequest::plain(name, bytes),
        };
        if let Some(h) = hint {
            request = request.with_hint(h);
        }
        requests.push(request);
    }

    println!(
        "Pushing {} file(s) → {}/{}:{}",
        requests.len(),
        config.repo.owner,
        config.repo.name,
        config.storage.files_dir
    );

    let pb = make_progress_bar("push");
    let sink = progress_sink(&pb);
    let report = orch.upload_batch(requests, Some(&sink)).await;
    pb.finish_with_message("done".to_string());

    println!();
    for outcome in &report.succeeded {
        println!(
            "  {} → {} ({}{})",
            outcome.name,
            outcome.stored_path,
            format_size(outcome.stored_bytes),
            if outcome.encrypted { ", encrypted" } else { "" }
        );
    }
    for failed in &report.failed {
        println!("  FAILED {}: {}", failed.file, failed.reason);
    }
    println!(
        "Push complete: {} uploaded, {} failed",
        report.succeeded.len(),
        report.failed.len()
    );

    if !report.all_succeeded() {
        anyhow::bail!("{} of {} uploads failed", report.failed.len(), report.total());
    }
    Ok(())
}

// ── `gvault pull` ─────────────────────────────────────────────────────────────

async fn cmd_pull(config: &GvaultConfig, paths: &[String], out: &Path, decrypt: bool) -> Result<()> {
    let orch = orchestrator(config)?;
    let passphrase = if decrypt { Some(read_passphrase(false)?) } else { None };

    tokio::fs::create_dir_all(out)
        .await
        .with_context(|| format!("creating {}", out.display()))?;

    let requests = paths
        .iter()
        .map(|p| match &passphrase {
            Some(pass) => DownloadRequest::decrypt(p, copy_secret(pass)),
            None => DownloadRequest::raw(p),
        })
        .collect();

    let pb = make_progress_bar("pull");
    let sink = progress_sink(&pb);
    let report = orch.download_batch(requests, Some(&sink)).await;
    pb.finish_with_message("done".to_string());

    println!();
    let mut write_failures = 0usize;
    for file in &report.succeeded {
        // Names inside sealed headers are untrusted
        let local = out.join(sanitize_name(&file.name));
        match tokio::fs::write(&local, &file.bytes).await {
            Ok(()) => println!(
                "  {} → {} ({})",
                file.stored_path,
                local.display(),
                format_size(file.bytes.len() as u64)
            ),
            Err(e) => {
                write_failures += 1;
                println!("  FAILED writing {}: {e}", local.display());
            }
        }
    }
    for failed in &report.failed {
        println!("  FAILED {}: {}", failed.file, failed.reason);
    }

    let failed = report.failed.len() + write_failures;
    println!(
        "Pull complete: {} downloaded, {} failed",
        report.succeeded.len() - write_failures,
        failed
    );
    if failed > 0 {
        anyhow::bail!("{failed} of {} downloads failed", report.total());
    }
    Ok(())
}

// ── `gvault rm` ───────────────────────────────────────────────────────────────

async fn cmd_rm(config: &GvaultConfig, path: &str) -> Result<()> {
    let orch = orchestrator(config)?;
    orch.delete(path)
        .await
        .with_context(|| format!("deleting {path}"))?;
    println!("Deleted {path}");
    Ok(())
}
