use std::path::Path;
use std::sync::{Arc, RwLock};

use chrono::Utc;
use dashmap::DashMap;
use tracing::info;

use crate::error::AppError;
use crate::models::pricing::PricingConfig;

/// Published pricing schedules, exactly one of which is active.
///
/// Readers take an `Arc` snapshot and keep using it for the whole request,
/// so activating a new version never changes a quote that is in flight.
pub struct PricingConfigStore {
    versions: DashMap<u32, Arc<PricingConfig>>,
    active: RwLock<Arc<PricingConfig>>,
}

impl PricingConfigStore {
    /// Creates a store whose first version is `initial`, already active.
    pub fn new(initial: PricingConfig) -> Result<Self, AppError> {
        initial.validate()?;
        let initial = Arc::new(PricingConfig {
            version: 1,
            ..initial
        });

        let versions = DashMap::new();
        versions.insert(1, initial.clone());

        Ok(Self {
            versions,
            active: RwLock::new(initial),
        })
    }

    pub fn active(&self) -> Arc<PricingConfig> {
        match self.active.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn get(&self, version: u32) -> Option<Arc<PricingConfig>> {
        self.versions.get(&version).map(|entry| entry.value().clone())
    }

    pub fn latest_version(&self) -> u32 {
        self.versions.iter().map(|entry| *entry.key()).max().unwrap_or(0)
    }

    /// Stores `config` under the next version number without activating it.
    pub fn publish(&self, config: PricingConfig) -> Result<u32, AppError> {
        config.validate()?;

        // Versions are allocated under the write lock so concurrent publishers never collide.
        let _guard = self.write_active();
        let version = self.latest_version() + 1;
        self.versions.insert(
            version,
            Arc::new(PricingConfig {
                version,
                ..config
            }),
        );

        Ok(version)
    }

    pub fn activate(&self, version: u32) -> Result<Arc<PricingConfig>, AppError> {
        let config = self
            .get(version)
            .ok_or_else(|| AppError::NotFound(format!("pricing config version {version} not found")))?;

        *self.write_active() = config.clone();
        info!(version, "pricing config activated");
        Ok(config)
    }

    pub fn publish_and_activate(&self, config: PricingConfig) -> Result<Arc<PricingConfig>, AppError> {
        let version = self.publish(config)?;
        self.activate(version)
    }

    /// Publishes the file's schedule when it differs from the active one.
    /// Returns the newly activated version, if any.
    pub fn reload_from_path(&self, path: &Path) -> Result<Option<u32>, AppError> {
        let mut candidate = load_config_file(path)?;
        let active = self.active();

        candidate.version = active.version;
        candidate.effective_from = active.effective_from;
        if candidate == *active {
            return Ok(None);
        }

        candidate.effective_from = Utc::now();
        let activated = self.publish_and_activate(candidate)?;
        Ok(Some(activated.version))
    }

    fn write_active(&self) -> std::sync::RwLockWriteGuard<'_, Arc<PricingConfig>> {
        match self.active.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

pub fn load_config_file(path: &Path) -> Result<PricingConfig, AppError> {
    let raw = std::fs::read_to_string(path).map_err(|err| {
        AppError::Internal(format!("failed to read {}: {err}", path.display()))
    })?;
    serde_json::from_str(&raw)
        .map_err(|err| AppError::Validation(format!("invalid pricing config {}: {err}", path.display())))
}
