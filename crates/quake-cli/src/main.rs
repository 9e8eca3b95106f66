use std::collections::BTreeSet;
use std::fs;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use quake_config::{
    migrate_entry, radius_in_km, ConfigFlow, FlowResult, HostDefaults, StoredEntry, UnitSystem,
};
use quake_reconcile::{canonical_entity_id, event_id, geo_unique_id};
use tracing::{debug, info};

#[derive(Parser)]
#[command(name = "quake")]
#[command(about = "INGV earthquake feed integration tooling", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute layered config hash + print canonical JSON of the integration section
    ConfigHash {
        /// Paths in merge order (base -> site -> local...)
        #[arg(required = true)]
        paths: Vec<String>,
    },

    /// Run the YAML import through the config flow and print the entry it would create
    ConfigCheck {
        /// Paths in merge order
        #[arg(required = true)]
        paths: Vec<String>,

        /// Host location name used when the section leaves it blank
        #[arg(long, default_value = "Home")]
        location: String,

        #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
        latitude: f64,

        #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
        longitude: f64,

        /// Host unit system; decides how `radius` is read
        #[arg(long, value_enum, default_value_t = Units::Metric)]
        units: Units,
    },

    /// Print the event id derived from one or more external identifiers
    EventId {
        #[arg(required = true)]
        external_ids: Vec<String>,
    },

    /// Print the unique id and canonical entity id of a point marker
    EntityId {
        /// Location name of the config entry
        #[arg(long)]
        scope: String,

        /// Event id or external identifier
        #[arg(long)]
        event: String,
    },

    /// Migrate a stored config entry (JSON file) to the current version
    Migrate {
        path: String,

        /// Write the migrated entry back to `path`
        #[arg(long, default_value_t = false)]
        write: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Units {
    Metric,
    Imperial,
}

impl From<Units> for UnitSystem {
    fn from(u: Units) -> Self {
        match u {
            Units::Metric => UnitSystem::Metric,
            Units::Imperial => UnitSystem::Imperial,
        }
    }
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    // Optional dev-time overrides; absence is fine.
    let _ = dotenvy::from_filename(".env.local");
    init_tracing();

    let cli = Cli::parse();

    match cli.cmd {
        Commands::ConfigHash { paths } => {
            let path_refs: Vec<&str> = paths.iter().map(|s| s.as_str()).collect();
            let loaded = quake_config::load_layered_yaml(&path_refs)?;
            println!("config_hash={}", loaded.config_hash);
            println!("{}", loaded.canonical_json);
        }

        Commands::ConfigCheck {
            paths,
            location,
            latitude,
            longitude,
            units,
        } => {
            let path_refs: Vec<&str> = paths.iter().map(|s| s.as_str()).collect();
            let loaded = quake_config::load_layered_yaml(&path_refs)?;
            println!("config_hash={}", loaded.config_hash);

            let Some(input) = loaded.import.as_ref() else {
                println!("no integration section; nothing to import");
                return Ok(());
            };

            let host = HostDefaults {
                location_name: location,
                latitude,
                longitude,
                units: units.into(),
            };
            let outcome = ConfigFlow::new(&host)
                .step_import(input, &BTreeSet::new())
                .context("import rejected")?;
            match outcome {
                FlowResult::CreateEntry(new) => {
                    let entry = new.into_entry();
                    let radius_km = radius_in_km(entry.options.radius, host.units);
                    debug!(entry_id = %entry.entry_id, "import accepted");
                    println!("radius_km={radius_km}");
                    println!("options_hash={}", entry.options.hash());
                    println!("{}", serde_json::to_string_pretty(&entry)?);
                }
                FlowResult::Abort { reason } => println!("import aborted: {reason}"),
                other => anyhow::bail!("unexpected import flow result: {other:?}"),
            }
        }

        Commands::EventId { external_ids } => {
            for ext in &external_ids {
                println!("{ext} -> {}", event_id(ext));
            }
        }

        Commands::EntityId { scope, event } => {
            let id = event_id(&event);
            println!("unique_id={}", geo_unique_id(&scope, id));
            println!("entity_id={}", canonical_entity_id(&scope, id));
        }

        Commands::Migrate { path, write } => {
            let raw = fs::read_to_string(&path).with_context(|| format!("read {path}"))?;
            let stored: StoredEntry =
                serde_json::from_str(&raw).with_context(|| format!("parse stored entry {path}"))?;
            let migrated = migrate_entry(stored).context("migration failed")?;

            match migrated.migrated_from {
                Some(from) => info!(from, to = migrated.entry.version, "entry migrated"),
                None => info!(version = migrated.entry.version, "entry already current"),
            }
            let out = serde_json::to_string_pretty(&migrated.entry.to_stored())?;
            if write {
                fs::write(&path, format!("{out}\n")).with_context(|| format!("write {path}"))?;
                println!("wrote {path}");
            } else {
                println!("{out}");
            }
        }
    }

    Ok(())
}
