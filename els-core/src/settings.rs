//! Brewery-level system settings
//!
//! One persisted row of global settings. On first startup the row does not
//! exist yet and is created with the default brewery name.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::constants::defaults::BREWERY_NAME;
use crate::data::store::{Database, SettingsRecord};
use els_error::Result;

/// Partial update for the system settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsInput {
    /// The new brewery name (blank for no change)
    pub brewery_name: Option<String>,
}

/// The global settings for this brewery
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemSettings {
    pub brewery_name: String,
}

impl SystemSettings {
    /// Load the settings row, creating it with defaults when missing or
    /// when the stored name is blank
    pub fn load_or_default(db: &Database) -> Result<Self> {
        let mut settings = match db.load_settings()? {
            Some(record) => Self {
                brewery_name: record.brewery_name,
            },
            None => Self {
                brewery_name: String::new(),
            },
        };

        if settings.brewery_name.trim().is_empty() {
            settings.brewery_name = BREWERY_NAME.to_string();
            settings.save(db)?;
            info!("Initialised settings for {}", settings.brewery_name);
        }
        Ok(settings)
    }

    pub fn save(&self, db: &Database) -> Result<()> {
        db.save_settings(&SettingsRecord {
            brewery_name: self.brewery_name.clone(),
        })
    }

    /// Apply a partial update and persist it
    pub fn apply(&mut self, input: &SettingsInput, db: &Database) -> Result<()> {
        if let Some(name) = &input.brewery_name {
            if !name.trim().is_empty() {
                self.brewery_name = name.clone();
            }
        }
        self.save(db)
    }
}
