use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context as AnyhowContext, Result};
use clap::{Parser, Subcommand};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use amboss_normalize::{
    aggregate_identifiers, ensure_organization_bundle, load_document, process_bundle,
    IdentifierMap, NormalizeOptions, DEFAULT_ORGANIZATION_ID, DEFAULT_PRACTITIONER_ID,
};

#[derive(Parser)]
#[command(
    name = "amboss",
    about = "Prepares Synthea-generated FHIR bundles for server ingestion",
    version,
    arg_required_else_help = true
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Normalize every bundle document in a directory, in place.
    Normalize {
        /// Directory containing the generated bundle JSON files.
        dir: PathBuf,
        /// Organization id wired into injected payor/provider references.
        #[arg(long, default_value = DEFAULT_ORGANIZATION_ID)]
        organization_id: String,
        /// Practitioner id wired into injected Provenance agent references.
        #[arg(long, default_value = DEFAULT_PRACTITIONER_ID)]
        practitioner_id: String,
    },

    /// Print CLI version.
    Version,
}

fn main() -> Result<()> {
    init_logging();

    let cli = Cli::parse();
    match cli.command {
        Commands::Normalize {
            dir,
            organization_id,
            practitioner_id,
        } => {
            let options = NormalizeOptions {
                organization_id,
                practitioner_id,
            };
            normalize_directory(&dir, &options)
        }
        Commands::Version => {
            println!("amboss {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn init_logging() {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "amboss=info,amboss_normalize=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn normalize_directory(dir: &Path, options: &NormalizeOptions) -> Result<()> {
    let files = collect_bundle_files(dir)
        .with_context(|| format!("Failed to enumerate bundle documents in {}", dir.display()))?;
    if files.is_empty() {
        info!(dir = %dir.display(), "No JSON documents found");
        return Ok(());
    }
    info!(count = files.len(), dir = %dir.display(), "Found bundle documents");

    // Seeded after the batch was listed, so the run that creates it does not
    // also submit it for rewriting.
    if let Err(err) = ensure_organization_bundle(dir, &options.organization_id) {
        warn!(error = %err, "Failed to write Organization bundle");
    }

    let global = aggregate_identifiers(&files);
    info!(
        identifiers = global.len(),
        "Aggregated identifier mappings across the batch"
    );

    let mut processed = 0usize;
    for path in &files {
        match normalize_file(path, &global, options) {
            Ok(()) => processed += 1,
            Err(err) => error!(path = %path.display(), error = %err, "Skipping document"),
        }
    }
    info!(processed, total = files.len(), "Batch complete");
    Ok(())
}

fn collect_bundle_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension() == Some("json".as_ref()) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

fn normalize_file(path: &Path, global: &IdentifierMap, options: &NormalizeOptions) -> Result<()> {
    info!(path = %path.display(), "Processing");
    let document = load_document(path)?;
    let normalized = process_bundle(document, global, options);
    fs::write(
        path,
        format!("{}\n", serde_json::to_string_pretty(&normalized)?),
    )
    .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}
