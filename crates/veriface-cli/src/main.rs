use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

use veriface_core::dnn::DnnFaceDetector;
use veriface_core::{EmbeddingStore, Engine, EngineConfig, VerifyOutcome};

#[derive(Parser)]
#[command(name = "veriface", about = "Veriface enrollment and verification CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Enroll (or re-enroll) an identity from a photo
    Enroll {
        /// External identity key (e.g., a user id)
        identity: String,
        /// Path to the photo (jpeg, png or webp)
        image: PathBuf,
    },
    /// Verify a photo against every enrolled identity
    Verify {
        /// Path to the photo (jpeg, png or webp)
        image: PathBuf,
    },
    /// List enrolled identities
    List,
    /// Remove an enrolled identity
    Remove {
        /// Identity key to remove
        identity: String,
    },
}

/// Declared content type from the file extension. The decoder verifies
/// the actual bytes; this only has to name the intent.
fn content_type_for(path: &Path) -> Result<&'static str> {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("jpg") | Some("jpeg") => Ok("image/jpeg"),
        Some("png") => Ok("image/png"),
        Some("webp") => Ok("image/webp"),
        other => bail!("unsupported image extension: {other:?}"),
    }
}

fn build_engine() -> Result<Engine> {
    let config = EngineConfig::from_env();
    let db_path = veriface_core::config::db_path_from_env();
    let store = EmbeddingStore::open(&db_path)
        .with_context(|| format!("opening embedding store at {}", db_path.display()))?;

    let model_path = veriface_core::config::model_path_from_env();
    let learned = match DnnFaceDetector::load(&model_path, config.confidence_floor) {
        Ok(detector) => Some(detector),
        Err(err) => {
            tracing::warn!(
                model = %model_path.display(),
                error = %err,
                "learned detector unavailable, geometric stages only"
            );
            None
        }
    };

    Ok(Engine::new(config, store, learned))
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let engine = build_engine()?;

    match cli.command {
        Commands::Enroll { identity, image } => {
            let content_type = content_type_for(&image)?;
            let bytes = std::fs::read(&image)
                .with_context(|| format!("reading {}", image.display()))?;
            let outcome = engine.enroll(&identity, &bytes, content_type)?;
            if outcome.was_update {
                println!("re-enrolled {} ({})", outcome.identity_key, outcome.source_ref);
            } else {
                println!("enrolled {} ({})", outcome.identity_key, outcome.source_ref);
            }
        }
        Commands::Verify { image } => {
            let content_type = content_type_for(&image)?;
            let bytes = std::fs::read(&image)
                .with_context(|| format!("reading {}", image.display()))?;
            match engine.verify(&bytes, content_type)? {
                VerifyOutcome::Verified {
                    identity_key,
                    similarity,
                } => println!("verified: {identity_key} (similarity {similarity:.3})"),
                VerifyOutcome::NoMatch { best_similarity } => match best_similarity {
                    Some(best) => println!("no match (best similarity {best:.3})"),
                    None => println!("no match (no identities enrolled)"),
                },
            }
        }
        Commands::List => {
            let records = engine.list()?;
            if records.is_empty() {
                println!("no identities enrolled");
            }
            for record in records {
                println!(
                    "{}\tdim={}\tupdated={}\t{}",
                    record.identity_key, record.dim, record.updated_at, record.source_ref
                );
            }
        }
        Commands::Remove { identity } => {
            if engine.remove(&identity)? {
                println!("removed {identity}");
            } else {
                println!("{identity} was not enrolled");
            }
        }
    }

    Ok(())
}
