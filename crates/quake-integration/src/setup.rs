//! Config entry lifecycle.
//!
//! [`Integration`] owns one coordinator (plus its platforms and refresh task)
//! per loaded config entry. Host services are passed in once through
//! [`HostServices`]; nothing is global.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use quake_config::{
    migrate_entry, radius_in_km, ConfigEntry, ConfigFlow, FlowResult, HostDefaults, LoadedImport,
    OptionsFlow, OptionsInput, StoredEntry, DOMAIN,
};
use quake_feed::{FeedFactory, FeedSettings};
use quake_reconcile::{
    normalize_legacy_entity_ids, spawn_refresh_loop, Coordinator, CoordinatorConfig, Dispatcher,
    EntityRegistry,
};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::geo_location::GeoLocationPlatform;
use crate::sensor::StatusSensor;
use crate::state::StateSink;

/// Everything the host platform lends to the integration.
#[derive(Clone)]
pub struct HostServices {
    pub dispatcher: Arc<dyn Dispatcher>,
    pub registry: Arc<dyn EntityRegistry>,
    pub states: Arc<dyn StateSink>,
    pub feeds: Arc<dyn FeedFactory>,
    pub defaults: HostDefaults,
}

struct LoadedEntry {
    entry: ConfigEntry,
    coordinator: Coordinator,
    geo: GeoLocationPlatform,
    sensor: Arc<StatusSensor>,
    refresh: JoinHandle<()>,
}

pub struct Integration {
    host: HostServices,
    loaded: RwLock<BTreeMap<String, LoadedEntry>>,
}

impl Integration {
    pub fn new(host: HostServices) -> Self {
        Self {
            host,
            loaded: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn host(&self) -> &HostServices {
        &self.host
    }

    pub async fn entries(&self) -> Vec<ConfigEntry> {
        self.loaded
            .read()
            .await
            .values()
            .map(|l| l.entry.clone())
            .collect()
    }

    pub async fn entry(&self, entry_id: &str) -> Option<ConfigEntry> {
        self.loaded
            .read()
            .await
            .get(entry_id)
            .map(|l| l.entry.clone())
    }

    pub async fn coordinator(&self, entry_id: &str) -> Option<Coordinator> {
        self.loaded
            .read()
            .await
            .get(entry_id)
            .map(|l| l.coordinator.clone())
    }

    pub async fn geo_platform(&self, entry_id: &str) -> Option<GeoLocationPlatform> {
        self.loaded
            .read()
            .await
            .get(entry_id)
            .map(|l| l.geo.clone())
    }

    pub async fn status_sensor(&self, entry_id: &str) -> Option<Arc<StatusSensor>> {
        self.loaded
            .read()
            .await
            .get(entry_id)
            .map(|l| Arc::clone(&l.sensor))
    }

    async fn configured_unique_ids(&self) -> BTreeSet<String> {
        self.loaded
            .read()
            .await
            .values()
            .map(|l| l.entry.unique_id.clone())
            .collect()
    }

    // -----------------------------------------------------------------------
    // Import
    // -----------------------------------------------------------------------

    /// Create and set up an entry from the YAML integration section.
    ///
    /// `Ok(None)` when there is nothing to import or the location is
    /// already configured.
    pub async fn import_yaml(&self, loaded: &LoadedImport) -> Result<Option<ConfigEntry>> {
        let Some(input) = loaded.import.as_ref() else {
            debug!("no {DOMAIN} section in yaml, nothing to import");
            return Ok(None);
        };
        let configured = self.configured_unique_ids().await;
        let outcome = ConfigFlow::new(&self.host.defaults)
            .step_import(input, &configured)
            .context("yaml import rejected")?;

        match outcome {
            FlowResult::CreateEntry(new) => {
                let entry = new.into_entry();
                info!(
                    entry_id = %entry.entry_id,
                    location = %entry.unique_id,
                    config_hash = %loaded.config_hash,
                    "imported config entry from yaml"
                );
                self.setup_entry(entry.to_stored()).await.map(Some)
            }
            FlowResult::Abort { reason } => {
                info!(reason, "yaml import skipped");
                Ok(None)
            }
            other => Err(anyhow!("unexpected import flow result: {other:?}")),
        }
    }

    // -----------------------------------------------------------------------
    // Setup / unload
    // -----------------------------------------------------------------------

    /// Migrate, build the feed and coordinator, attach platforms and start
    /// the refresh loop.
    pub async fn setup_entry(&self, stored: StoredEntry) -> Result<ConfigEntry> {
        let entry_id = stored.entry_id.clone();
        if self.loaded.read().await.contains_key(&entry_id) {
            bail!("config entry {entry_id} is already set up");
        }

        let migrated = migrate_entry(stored)
            .with_context(|| format!("migrating config entry {entry_id}"))?;
        let entry = migrated.entry;
        if let Some(from) = migrated.migrated_from {
            info!(entry_id = %entry.entry_id, from, to = entry.version, "config entry migrated");
            normalize_legacy_entity_ids(
                self.host.registry.as_ref(),
                &entry.entry_id,
                &entry.unique_id,
            );
        }

        let radius = radius_in_km(entry.options.radius, self.host.defaults.units);
        let settings = FeedSettings::new(
            (entry.data.latitude, entry.data.longitude),
            radius,
            entry.options.minimum_magnitude,
            i64::try_from(entry.options.start_time).context("start_time out of range")?,
        );
        let feed = self
            .host
            .feeds
            .build(&settings)
            .with_context(|| format!("building feed manager for {}", entry.data.location))?;

        let coordinator = Coordinator::new(
            CoordinatorConfig {
                entry_id: entry.entry_id.clone(),
                scope: entry.unique_id.clone(),
                name: format!("{DOMAIN}-{}", entry.data.location),
                update_interval: Duration::from_secs(entry.options.scan_interval),
            },
            feed,
            Arc::clone(&self.host.dispatcher),
            Arc::clone(&self.host.registry),
        );
        debug!(entry_id = %entry.entry_id, radius_km = radius, "feed entity coordinator added");

        normalize_legacy_entity_ids(
            self.host.registry.as_ref(),
            &entry.entry_id,
            &entry.unique_id,
        );

        let sensor = StatusSensor::setup(&coordinator, &entry, Arc::clone(&self.host.states));
        let geo = GeoLocationPlatform::setup(&coordinator, Arc::clone(&self.host.states));
        let refresh = spawn_refresh_loop(coordinator.clone());

        let mut loaded = self.loaded.write().await;
        if loaded.contains_key(&entry_id) {
            // Lost a race with a concurrent setup of the same entry.
            coordinator.stop();
            geo.unload();
            sensor.unload();
            bail!("config entry {entry_id} is already set up");
        }
        loaded.insert(
            entry_id,
            LoadedEntry {
                entry: entry.clone(),
                coordinator,
                geo,
                sensor,
                refresh,
            },
        );
        info!(entry_id = %entry.entry_id, title = %entry.title, "config entry set up");
        Ok(entry)
    }

    /// Stop the coordinator and withdraw the entry's entities.
    ///
    /// `Ok(false)` for an entry that is not loaded.
    pub async fn unload_entry(&self, entry_id: &str) -> Result<bool> {
        let removed = self.loaded.write().await.remove(entry_id);
        let Some(loaded) = removed else {
            debug!(entry_id, "unload of unknown config entry ignored");
            return Ok(false);
        };

        loaded.coordinator.stop();
        if let Err(e) = loaded.refresh.await {
            warn!(entry_id, error = %e, "refresh task ended abnormally");
        }
        loaded.geo.unload();
        loaded.sensor.unload();
        info!(entry_id, "config entry unloaded");
        Ok(true)
    }

    pub async fn reload_entry(&self, entry_id: &str) -> Result<bool> {
        let Some(entry) = self.entry(entry_id).await else {
            return Ok(false);
        };
        self.reload_with(entry).await?;
        Ok(true)
    }

    async fn reload_with(&self, entry: ConfigEntry) -> Result<()> {
        self.unload_entry(&entry.entry_id).await?;
        self.setup_entry(entry.to_stored())
            .await
            .with_context(|| format!("reloading config entry {}", entry.entry_id))?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Options
    // -----------------------------------------------------------------------

    /// Validate new options and reload the entry when they changed.
    ///
    /// Returns whether a reload happened; `Ok(false)` as well for an entry
    /// that is not loaded.
    pub async fn update_options(&self, entry_id: &str, input: &OptionsInput) -> Result<bool> {
        let Some(mut entry) = self.entry(entry_id).await else {
            return Ok(false);
        };

        let outcome = OptionsFlow::new(&entry.options)
            .step_init(Some(input))
            .context("options rejected")?;
        let options = match outcome {
            FlowResult::UpdateOptions(options) => options,
            FlowResult::ShowForm { .. } => return Ok(false),
            other => return Err(anyhow!("unexpected options flow result: {other:?}")),
        };

        if options.hash() == entry.options.hash() {
            debug!(entry_id, "options unchanged, no reload");
            return Ok(false);
        }
        info!(entry_id, "options changed, reloading entry");
        entry.options = options;
        self.reload_with(entry).await?;
        Ok(true)
    }

    /// Unload every entry.
    pub async fn shutdown(&self) {
        let ids: Vec<String> = self.loaded.read().await.keys().cloned().collect();
        for id in ids {
            if let Err(e) = self.unload_entry(&id).await {
                warn!(entry_id = %id, error = %e, "unload failed during shutdown");
            }
        }
    }
}
