use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};

use kodegen_certstore::{
    CertStoreError, Principal, QueryConfig, QueryResult, ResultShape, SelectionMode, error,
    success, warn,
};

// ============================================================================
// ERROR HANDLING STRATEGY
// ============================================================================
//
// CRITICAL I/O - Errors propagated with `?` operator:
//   • Reading the config file, writing JSON or PKCS#12 output
//   • Store access and key export
//
// DECORATIVE I/O - Errors ignored with `let _ =`:
//   • Terminal coloring and status lines (see `report`)
// ============================================================================

#[derive(Parser)]
#[command(name = "kodegen_certstore")]
#[command(version, about = "Find a usable signing certificate in the system certificate store")]
struct Cli {
    /// Store name (e.g. My, Root, CA)
    #[arg(long)]
    store: Option<String>,

    /// Store location: CurrentUser, LocalMachine, ...
    #[arg(long)]
    principal: Option<Principal>,

    /// Dotted OID of the extension to match (defaults to key usage)
    #[arg(long)]
    oid: Option<String>,

    /// Text the rendered extension must contain (defaults to "Digital Signature")
    #[arg(long)]
    value: Option<String>,

    /// Return every qualifying certificate instead of the first
    #[arg(long)]
    all: bool,

    /// Write PKCS#12 files instead of JSON records
    #[arg(long, conflicts_with = "include_bytes")]
    bytes: bool,

    /// Embed the base64 PKCS#12 export in each JSON record
    #[arg(long)]
    include_bytes: bool,

    /// Skip certificates outside their validity period
    #[arg(long)]
    valid_only: bool,

    /// Print the chosen certificate and report skipped candidates
    #[arg(long, short = 'v')]
    verbose: bool,

    /// Path to query config file (TOML)
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// Output file, or directory when writing several PKCS#12 files
    #[arg(long, short = 'o')]
    output: Option<PathBuf>,
}

impl Cli {
    /// Config file first, then flags on top.
    fn query_config(&self) -> Result<QueryConfig> {
        let mut config = match &self.config {
            Some(path) => QueryConfig::from_file(path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?,
            None => QueryConfig::default(),
        };

        if let Some(store) = &self.store {
            config.store = store.clone();
        }
        if let Some(principal) = self.principal {
            config.principal = principal;
        }
        if self.oid.is_some() {
            config.extension_oid = self.oid.clone();
        }
        if self.value.is_some() {
            config.extension_value = self.value.clone();
        }
        if self.all {
            config.mode = SelectionMode::All;
        }
        if self.bytes {
            config.shape = ResultShape::Bytes;
        }
        config.include_bytes |= self.include_bytes;
        config.require_time_valid |= self.valid_only;
        config.verbose |= self.verbose;

        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    let config = cli.query_config()?;

    if config.shape == ResultShape::Bytes && cli.output.is_none() {
        anyhow::bail!("--bytes requires --output");
    }

    let result = match run_query(config).await? {
        Ok(result) => result,
        Err(e) if e.is_engine_error() => {
            error!("{e}");
            std::process::exit(1);
        }
        Err(e) => return Err(e.into()),
    };

    if result.is_empty() {
        warn!("No certificate matched; writing an empty result");
    }

    write_result(result, cli.output.as_deref()).await
}

/// Store access blocks, so it runs off the async runtime.
#[cfg(windows)]
async fn run_query(config: QueryConfig) -> Result<kodegen_certstore::Result<QueryResult>> {
    let result = tokio::task::spawn_blocking(move || {
        kodegen_certstore::find_certificate(&kodegen_certstore::SystemStores::new(), &config)
    })
    .await
    .context("Certificate query task panicked")?;
    Ok(result)
}

#[cfg(not(windows))]
async fn run_query(_config: QueryConfig) -> Result<kodegen_certstore::Result<QueryResult>> {
    Ok(Err(CertStoreError::UnsupportedPlatform(format!(
        "system certificate stores are only available on Windows (running on {})",
        std::env::consts::OS
    ))))
}

async fn write_result(result: QueryResult, output: Option<&Path>) -> Result<()> {
    match result {
        QueryResult::Record(record) => write_json(&record, output).await,
        QueryResult::RecordList(records) => write_json(&records, output).await,
        QueryResult::Bytes(bytes) => {
            let path = output.context("--bytes requires --output")?;
            tokio::fs::write(path, bytes.as_slice())
                .await
                .with_context(|| format!("Failed to write {}", path.display()))?;
            success!("Wrote {}", path.display());
            Ok(())
        }
        QueryResult::BytesList(items) => {
            let dir = output.context("--bytes requires --output")?;
            tokio::fs::create_dir_all(dir)
                .await
                .with_context(|| format!("Failed to create {}", dir.display()))?;

            for (n, bytes) in items.iter().enumerate() {
                let path = dir.join(format!("cert-{}.pfx", n + 1));
                tokio::fs::write(&path, bytes.as_slice())
                    .await
                    .with_context(|| format!("Failed to write {}", path.display()))?;
            }
            success!("Wrote {} certificate(s) to {}", items.len(), dir.display());
            Ok(())
        }
    }
}

async fn write_json<T: serde::Serialize>(value: &T, output: Option<&Path>) -> Result<()> {
    let json = serde_json::to_string_pretty(value).map_err(CertStoreError::from)?;

    match output {
        Some(path) => {
            tokio::fs::write(path, json)
                .await
                .with_context(|| format!("Failed to write {}", path.display()))?;
            success!("Wrote {}", path.display());
        }
        None => println!("{json}"),
    }
    Ok(())
}
