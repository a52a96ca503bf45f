//! Delta Registry CLI
//!
//! Registers deltas, inspects the version graph, resolves chains, and
//! transforms records from the command line.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use delta_schemas::{Delta, RegistryConfig, SchemaRegistry, VersionId};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "delta-registry")]
#[command(about = "Manage schema versions and migrate records between them")]
struct Cli {
    /// Path to a config file (delta-schemas.toml is picked up automatically)
    #[arg(short, long)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register a delta from a JSON file
    Register {
        /// Subject the delta belongs to
        subject: String,
        /// Path to the delta JSON
        delta: PathBuf,
    },

    /// List subjects, or the versions of one subject
    Versions {
        /// Subject to list (omit to list subjects)
        subject: Option<String>,
    },

    /// Show a registered delta
    Show {
        subject: String,
        /// Source version
        #[arg(short, long)]
        from: String,
        /// Target version
        #[arg(short, long)]
        to: String,
    },

    /// Resolve the delta chain between two versions
    Resolve {
        subject: String,
        #[arg(short, long)]
        from: String,
        #[arg(short, long)]
        to: String,
    },

    /// Classify compatibility between two versions
    Compat {
        subject: String,
        #[arg(short, long)]
        from: String,
        #[arg(short, long)]
        to: String,
    },

    /// Transform a record between versions
    Transform {
        subject: String,
        #[arg(short, long)]
        from: String,
        #[arg(short, long)]
        to: String,
        /// Path to the record JSON (reads stdin if omitted)
        record: Option<PathBuf>,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config = RegistryConfig::load_from(cli.config.as_deref())?;
    let registry = SchemaRegistry::from_config(&config)?;

    match cli.command {
        Commands::Register { subject, delta } => {
            let json = std::fs::read_to_string(&delta)?;
            let delta: Delta = serde_json::from_str(&json)?;
            let from = delta.from_version.clone();
            let to = delta.to_version.clone();
            registry.register(&subject, delta)?;
            println!("✅ Registered {} -> {} for {}", from, to, subject);
            Ok(())
        }

        Commands::Versions { subject } => {
            match subject {
                Some(subject) => {
                    let versions = registry.versions(&subject);
                    if versions.is_empty() {
                        println!("No versions registered for {}", subject);
                    } else {
                        for version in versions {
                            println!("{}", version);
                        }
                    }
                }
                None => {
                    for subject in registry.subjects() {
                        println!("{}", subject);
                    }
                }
            }
            Ok(())
        }

        Commands::Show { subject, from, to } => {
            let from = VersionId::new(from)?;
            let to = VersionId::new(to)?;
            match registry.delta(&subject, &from, &to) {
                Some(delta) => {
                    println!("{}", serde_json::to_string_pretty(&*delta)?);
                    Ok(())
                }
                None => Err(format!("no delta {} -> {} for {}", from, to, subject).into()),
            }
        }

        Commands::Resolve { subject, from, to } => {
            let from = VersionId::new(from)?;
            let to = VersionId::new(to)?;
            let chain = registry.resolve(&subject, &from, &to)?;
            let route: Vec<String> = chain.route().iter().map(|v| v.to_string()).collect();
            println!(
                "{} hop(s){}: {}",
                chain.len(),
                if chain.is_downgrade() { " (downgrade)" } else { "" },
                route.join(" -> ")
            );
            Ok(())
        }

        Commands::Compat { subject, from, to } => {
            let from = VersionId::new(from)?;
            let to = VersionId::new(to)?;
            let compatibility = registry.classify(&subject, &from, &to)?;
            println!("{}", compatibility);
            Ok(())
        }

        Commands::Transform {
            subject,
            from,
            to,
            record,
        } => {
            let from = VersionId::new(from)?;
            let to = VersionId::new(to)?;
            let json = match record {
                Some(path) => std::fs::read_to_string(&path)?,
                None => std::io::read_to_string(std::io::stdin())?,
            };
            let record: serde_json::Value = serde_json::from_str(&json)?;
            let record = record
                .as_object()
                .ok_or("record must be a JSON object")?;
            let output = registry.transform(&subject, &from, &to, record)?;
            println!(
                "{}",
                serde_json::to_string_pretty(&serde_json::Value::Object(output))?
            );
            Ok(())
        }
    }
}
