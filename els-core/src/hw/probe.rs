//! Probe reading cache
//!
//! The single source of probe state for the process. The probe-read task is
//! the only writer; controller update loops read through it and tolerate a
//! stale value. Entries are created on first bus enumeration and never
//! removed while the process runs.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};

use crate::temperature::Temperature;

/// The current reading of one physical probe
#[derive(Debug, Clone)]
pub struct ProbeReading {
    /// Stable hex string form of the device address
    pub phys_addr: String,
    /// Numeric 64-bit bus address
    pub address: u64,
    /// Last temperature seen
    pub reading: Temperature,
    /// When the reading was last refreshed
    pub updated: DateTime<Utc>,
}

/// Process-wide probe reading cache
#[derive(Default)]
pub struct ProbeCache {
    readings: RwLock<HashMap<String, ProbeReading>>,
}

impl ProbeCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a probe by its physical address
    pub fn get(&self, phys_addr: &str) -> Option<ProbeReading> {
        self.readings.read().unwrap().get(phys_addr).cloned()
    }

    /// Snapshot of every known probe
    pub fn all(&self) -> Vec<ProbeReading> {
        self.readings.read().unwrap().values().cloned().collect()
    }

    /// Insert or replace a probe entry wholesale
    pub fn insert(&self, reading: ProbeReading) {
        self.readings
            .write()
            .unwrap()
            .insert(reading.phys_addr.clone(), reading);
    }

    /// Make sure an entry exists for a discovered device without disturbing
    /// an existing reading
    pub fn ensure(&self, phys_addr: &str, address: u64) {
        let mut readings = self.readings.write().unwrap();
        readings
            .entry(phys_addr.to_string())
            .or_insert_with(|| ProbeReading {
                phys_addr: phys_addr.to_string(),
                address,
                reading: Temperature::default(),
                updated: Utc::now(),
            });
    }

    /// Store a fresh reading for a probe, stamping the update time
    pub fn update(&self, phys_addr: &str, temperature: Temperature) {
        let mut readings = self.readings.write().unwrap();
        if let Some(entry) = readings.get_mut(phys_addr) {
            entry.reading = temperature;
            entry.updated = Utc::now();
        }
    }
}
