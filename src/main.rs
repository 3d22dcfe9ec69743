use clap::{Parser, Subcommand};
use color_eyre::eyre::{eyre, WrapErr};
use color_eyre::Result;
use env_logger::Env;
use log::{info, warn};
use serde::Serialize;
use std::path::PathBuf;

use resource_backend::backend::Backend;
use resource_backend::claim::ClaimStatus;
use resource_backend::config::BackendConfig;
use resource_backend::config_loader;
use resource_backend::index::Index;
use resource_backend::store::{FileStorage, Storage};

/// Identifier allocation for AS numbers, VLANs and VXLAN ids
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the backend configuration YAML file
    #[arg(short, long, global = true, default_value = "resource-backend.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create the configured indexes and apply every configured claim
    Apply,
    /// Release configured claims
    Release {
        /// Only release the claim with this name
        #[arg(long)]
        claim: Option<String>,
    },
    /// Print the persisted entries of an index
    Show {
        #[arg(long)]
        index: String,
        #[arg(long, default_value = "default")]
        namespace: String,
    },
    /// Delete an index and its persisted entries
    DeleteIndex {
        #[arg(long)]
        index: String,
        #[arg(long, default_value = "default")]
        namespace: String,
    },
}

/// Result of applying one claim, printed as JSON
#[derive(Debug, Serialize)]
struct ClaimOutcome {
    claim: String,
    index: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    status: Option<ClaimStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

fn open_backend(config: &BackendConfig) -> Result<Backend<FileStorage>> {
    let mut backend = Backend::new(FileStorage::new(&config.storage.path));
    for index in &config.indexes {
        if let Some(report) = backend
            .create_index(index)
            .wrap_err_with(|| format!("Failed to create index {}", index.key()))?
        {
            if !report.orphans.is_empty() || !report.failed.is_empty() {
                warn!(
                    "Index {} restored with {} orphaned entries and {} failed claims",
                    index.key(),
                    report.orphans.len(),
                    report.failed.len()
                );
            }
        }
    }
    Ok(backend)
}

fn find_index<'a>(config: &'a BackendConfig, name: &str, namespace: &str) -> Result<&'a Index> {
    config
        .index(name, namespace)
        .ok_or_else(|| eyre!("Index {}/{} is not configured", namespace, name))
}

fn apply(config: &BackendConfig) -> Result<()> {
    let mut backend = open_backend(config)?;
    let mut outcomes = Vec::new();

    // validation guarantees every claim targets a configured index
    for claim in config
        .indexes
        .iter()
        .flat_map(|index| config.claims_for(index))
    {
        let mut claim = claim.clone();
        backend.store_mut().storage_mut().put_claim(&claim)?;

        let outcome = match backend.claim(&mut claim) {
            Ok(()) => {
                backend.store_mut().storage_mut().put_claim(&claim)?;
                ClaimOutcome {
                    claim: claim.key(),
                    index: claim.spec.index.clone(),
                    status: Some(claim.status.clone()),
                    error: None,
                }
            }
            Err(e) => {
                warn!("Claim {} failed: {}", claim.key(), e);
                ClaimOutcome {
                    claim: claim.key(),
                    index: claim.spec.index.clone(),
                    status: None,
                    error: Some(e.to_string()),
                }
            }
        };
        outcomes.push(outcome);
    }

    println!("{}", serde_json::to_string_pretty(&outcomes)?);

    let failed = outcomes.iter().filter(|o| o.error.is_some()).count();
    if failed > 0 {
        return Err(eyre!("{} of {} claims failed", failed, outcomes.len()));
    }
    info!("Applied {} claims", outcomes.len());
    Ok(())
}

fn release(config: &BackendConfig, only: Option<&str>) -> Result<()> {
    let mut backend = open_backend(config)?;
    let mut released = 0;

    for claim in config
        .claims
        .iter()
        .filter(|claim| only.map_or(true, |name| claim.name == name))
    {
        backend
            .release(claim)
            .wrap_err_with(|| format!("Failed to release claim {}", claim.key()))?;
        backend.store_mut().storage_mut().delete_claim(claim)?;
        released += 1;
    }

    if released == 0 {
        if let Some(name) = only {
            return Err(eyre!("Claim {} is not configured", name));
        }
    }
    info!("Released {} claims", released);
    Ok(())
}

fn show(config: &BackendConfig, name: &str, namespace: &str) -> Result<()> {
    let index = find_index(config, name, namespace)?;
    let backend = open_backend(config)?;
    let records = backend.store().storage().list_entries(&index.key())?;
    println!("{}", serde_json::to_string_pretty(&records)?);
    Ok(())
}

fn delete_index(config: &BackendConfig, name: &str, namespace: &str) -> Result<()> {
    let index = find_index(config, name, namespace)?;
    let mut backend = Backend::new(FileStorage::new(&config.storage.path));
    backend.delete_index(&index.key())?;
    info!("Deleted index {}", index.key());
    Ok(())
}

fn main() -> Result<()> {
    // Initialize error handling
    color_eyre::install()?;

    let cli = Cli::parse();

    // Initialize logging with default filter level of "info"
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let config = config_loader::load_config(&cli.config)
        .wrap_err_with(|| format!("Failed to load configuration {:?}", cli.config))?;

    match cli.command {
        Commands::Apply => apply(&config),
        Commands::Release { claim } => release(&config, claim.as_deref()),
        Commands::Show { index, namespace } => show(&config, &index, &namespace),
        Commands::DeleteIndex { index, namespace } => delete_index(&config, &index, &namespace),
    }
}
