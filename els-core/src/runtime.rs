//! The daemon runtime
//!
//! One root struct owning the shared services: the store, the GPIO driver,
//! the probe cache, the registry and the system settings. Constructed once
//! at startup and handed to the scheduler and the API server.

use std::sync::Arc;

use tokio::sync::RwLock;

use crate::data::store::Database;
use crate::hw::gpio::GpioDriver;
use crate::hw::probe::ProbeCache;
use crate::registry::Registry;
use crate::settings::SystemSettings;
use els_error::Result;

/// Root of the process: every shared service hangs off this
pub struct Runtime {
    pub db: Arc<Database>,
    pub probes: Arc<ProbeCache>,
    pub registry: Registry,
    pub settings: RwLock<SystemSettings>,
}

impl Runtime {
    /// Wire the services together. The store must already be migrated.
    pub fn new(db: Arc<Database>, gpio: Arc<dyn GpioDriver>) -> Result<Arc<Self>> {
        let settings = SystemSettings::load_or_default(&db)?;
        Ok(Arc::new(Self {
            registry: Registry::new(db.clone(), gpio),
            probes: Arc::new(ProbeCache::new()),
            db,
            settings: RwLock::new(settings),
        }))
    }
}
