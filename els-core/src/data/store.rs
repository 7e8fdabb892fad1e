//! SQLite store
//!
//! Controllers, their settings children, probe assignments, switches and
//! the system settings row all live in one SQLite database. The schema is
//! migrated with `CREATE TABLE IF NOT EXISTS` at startup; records are
//! written synchronously on every mutation so a restart picks up where the
//! process left off.
//!
//! Store writes happen only during explicit mutations, never inside the
//! toggle loop.

use std::path::Path;
use std::sync::Mutex;

use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info};

use crate::devices::controller::{
    ControllerMode, HysteresisSettings, ManualSettings, PidSettings,
};
use crate::temperature::Temperature;
use els_error::Result;

/// A probe assignment row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeRow {
    pub phys_addr: String,
    pub friendly_name: String,
}

/// Everything persisted about one controller
#[derive(Debug, Clone, Default)]
pub struct ControllerRecord {
    pub id: i64,
    pub name: String,
    pub mode: ControllerMode,
    pub set_point: Option<Temperature>,
    pub heat_settings: PidSettings,
    pub cool_settings: PidSettings,
    pub manual_settings: ManualSettings,
    pub hysteresis_settings: HysteresisSettings,
    pub probes: Vec<ProbeRow>,
}

/// A persisted switch
#[derive(Debug, Clone)]
pub struct SwitchRecord {
    pub id: i64,
    pub name: String,
    pub gpio: String,
    pub inverted: bool,
}

/// The system settings row
#[derive(Debug, Clone)]
pub struct SettingsRecord {
    pub brewery_name: String,
}

/// The process-wide SQLite handle
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open (or create) the store at the given path
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        info!("Loading database at {:?}", path.as_ref());
        let conn = Connection::open(path)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// An in-memory store, used by tests
    pub fn open_in_memory() -> Result<Self> {
        Ok(Self {
            conn: Mutex::new(Connection::open_in_memory()?),
        })
    }

    /// Create any missing tables
    pub fn migrate(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS temperature_controllers (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE,
                mode TEXT NOT NULL DEFAULT 'off',
                set_point INTEGER
            );

            CREATE TABLE IF NOT EXISTS pid_settings (
                controller_id INTEGER NOT NULL,
                kind TEXT NOT NULL,
                proportional REAL NOT NULL DEFAULT 0,
                integral REAL NOT NULL DEFAULT 0,
                derivative REAL NOT NULL DEFAULT 0,
                cycle_time INTEGER NOT NULL DEFAULT 0,
                delay INTEGER NOT NULL DEFAULT 0,
                configured INTEGER NOT NULL DEFAULT 0,
                gpio TEXT NOT NULL DEFAULT '',
                PRIMARY KEY (controller_id, kind)
            );

            CREATE TABLE IF NOT EXISTS manual_settings (
                controller_id INTEGER PRIMARY KEY,
                duty_cycle INTEGER NOT NULL DEFAULT 0,
                cycle_time INTEGER NOT NULL DEFAULT 0,
                configured INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE IF NOT EXISTS hysteresis_settings (
                controller_id INTEGER PRIMARY KEY,
                max_temp INTEGER,
                min_temp INTEGER,
                min_time INTEGER NOT NULL DEFAULT 0,
                configured INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE IF NOT EXISTS probe_details (
                phys_addr TEXT PRIMARY KEY,
                controller_id INTEGER NOT NULL,
                friendly_name TEXT NOT NULL DEFAULT ''
            );

            CREATE TABLE IF NOT EXISTS switches (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE,
                gpio TEXT NOT NULL,
                inverted INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE IF NOT EXISTS system_settings (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                brewery_name TEXT NOT NULL
            );",
        )?;

        debug!("Schema migration complete");
        Ok(())
    }

    // ========================================================================
    // Controllers
    // ========================================================================

    /// Insert a bare controller row and return its id
    pub fn insert_controller(&self, name: &str) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO temperature_controllers (name, mode) VALUES (?1, 'off')",
            params![name],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Write a controller and all of its children
    pub fn save_controller(&self, record: &ControllerRecord) -> Result<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        tx.execute(
            "UPDATE temperature_controllers SET name = ?1, mode = ?2, set_point = ?3 WHERE id = ?4",
            params![
                record.name,
                record.mode.as_str(),
                record.set_point.map(Temperature::raw),
                record.id
            ],
        )?;

        for (kind, settings) in [
            ("heat", &record.heat_settings),
            ("cool", &record.cool_settings),
        ] {
            tx.execute(
                "INSERT OR REPLACE INTO pid_settings
                 (controller_id, kind, proportional, integral, derivative, cycle_time, delay, configured, gpio)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    record.id,
                    kind,
                    settings.proportional,
                    settings.integral,
                    settings.derivative,
                    settings.cycle_time,
                    settings.delay,
                    settings.configured,
                    settings.gpio
                ],
            )?;
        }

        tx.execute(
            "INSERT OR REPLACE INTO manual_settings (controller_id, duty_cycle, cycle_time, configured)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                record.id,
                record.manual_settings.duty_cycle,
                record.manual_settings.cycle_time,
                record.manual_settings.configured
            ],
        )?;

        tx.execute(
            "INSERT OR REPLACE INTO hysteresis_settings (controller_id, max_temp, min_temp, min_time, configured)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                record.id,
                record.hysteresis_settings.max_temp.map(Temperature::raw),
                record.hysteresis_settings.min_temp.map(Temperature::raw),
                record.hysteresis_settings.min_time,
                record.hysteresis_settings.configured
            ],
        )?;

        tx.execute(
            "DELETE FROM probe_details WHERE controller_id = ?1",
            params![record.id],
        )?;
        for probe in &record.probes {
            tx.execute(
                "INSERT OR REPLACE INTO probe_details (phys_addr, controller_id, friendly_name)
                 VALUES (?1, ?2, ?3)",
                params![probe.phys_addr, record.id, probe.friendly_name],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    pub fn load_controllers(&self) -> Result<Vec<ControllerRecord>> {
        let ids: Vec<i64> = {
            let conn = self.conn.lock().unwrap();
            let mut stmt =
                conn.prepare("SELECT id FROM temperature_controllers ORDER BY id")?;
            let rows = stmt.query_map([], |row| row.get(0))?;
            rows.collect::<rusqlite::Result<_>>()?
        };

        let mut records = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(record) = self.load_controller_by_id(id)? {
                records.push(record);
            }
        }
        Ok(records)
    }

    pub fn load_controller_by_id(&self, id: i64) -> Result<Option<ControllerRecord>> {
        self.load_controller("id = ?1", params![id])
    }

    pub fn load_controller_by_name(&self, name: &str) -> Result<Option<ControllerRecord>> {
        self.load_controller("name = ?1", params![name])
    }

    fn load_controller(
        &self,
        predicate: &str,
        args: impl rusqlite::Params,
    ) -> Result<Option<ControllerRecord>> {
        let conn = self.conn.lock().unwrap();

        let base = conn
            .query_row(
                &format!(
                    "SELECT id, name, mode, set_point FROM temperature_controllers WHERE {predicate}"
                ),
                args,
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, Option<i64>>(3)?,
                    ))
                },
            )
            .optional()?;

        let Some((id, name, mode, set_point)) = base else {
            return Ok(None);
        };

        let mut record = ControllerRecord {
            id,
            name,
            mode: ControllerMode::parse(&mode).unwrap_or_default(),
            set_point: set_point.map(Temperature::from_raw),
            ..Default::default()
        };

        let mut stmt = conn.prepare(
            "SELECT kind, proportional, integral, derivative, cycle_time, delay, configured, gpio
             FROM pid_settings WHERE controller_id = ?1",
        )?;
        let pid_rows = stmt.query_map(params![id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                PidSettings {
                    proportional: row.get(1)?,
                    integral: row.get(2)?,
                    derivative: row.get(3)?,
                    cycle_time: row.get(4)?,
                    delay: row.get(5)?,
                    configured: row.get(6)?,
                    gpio: row.get(7)?,
                },
            ))
        })?;
        for row in pid_rows {
            let (kind, settings) = row?;
            match kind.as_str() {
                "heat" => record.heat_settings = settings,
                "cool" => record.cool_settings = settings,
                other => debug!("Ignoring pid settings of unknown kind '{}'", other),
            }
        }

        record.manual_settings = conn
            .query_row(
                "SELECT duty_cycle, cycle_time, configured FROM manual_settings WHERE controller_id = ?1",
                params![id],
                |row| {
                    Ok(ManualSettings {
                        duty_cycle: row.get(0)?,
                        cycle_time: row.get(1)?,
                        configured: row.get(2)?,
                    })
                },
            )
            .optional()?
            .unwrap_or_default();

        record.hysteresis_settings = conn
            .query_row(
                "SELECT max_temp, min_temp, min_time, configured FROM hysteresis_settings WHERE controller_id = ?1",
                params![id],
                |row| {
                    Ok(HysteresisSettings {
                        max_temp: row.get::<_, Option<i64>>(0)?.map(Temperature::from_raw),
                        min_temp: row.get::<_, Option<i64>>(1)?.map(Temperature::from_raw),
                        min_time: row.get(2)?,
                        configured: row.get(3)?,
                    })
                },
            )
            .optional()?
            .unwrap_or_default();

        let mut stmt = conn.prepare(
            "SELECT phys_addr, friendly_name FROM probe_details WHERE controller_id = ?1",
        )?;
        let probe_rows = stmt.query_map(params![id], |row| {
            Ok(ProbeRow {
                phys_addr: row.get(0)?,
                friendly_name: row.get(1)?,
            })
        })?;
        for row in probe_rows {
            record.probes.push(row?);
        }

        Ok(Some(record))
    }

    /// Remove a controller and all of its children
    pub fn delete_controller(&self, id: i64) -> Result<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM temperature_controllers WHERE id = ?1",
            params![id],
        )?;
        tx.execute(
            "DELETE FROM pid_settings WHERE controller_id = ?1",
            params![id],
        )?;
        tx.execute(
            "DELETE FROM manual_settings WHERE controller_id = ?1",
            params![id],
        )?;
        tx.execute(
            "DELETE FROM hysteresis_settings WHERE controller_id = ?1",
            params![id],
        )?;
        tx.execute(
            "DELETE FROM probe_details WHERE controller_id = ?1",
            params![id],
        )?;
        tx.commit()?;
        Ok(())
    }

    // ========================================================================
    // Switches
    // ========================================================================

    pub fn insert_switch(&self, name: &str, gpio: &str, inverted: bool) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO switches (name, gpio, inverted) VALUES (?1, ?2, ?3)",
            params![name, gpio, inverted],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn save_switch(&self, record: &SwitchRecord) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE switches SET name = ?1, gpio = ?2, inverted = ?3 WHERE id = ?4",
            params![record.name, record.gpio, record.inverted, record.id],
        )?;
        Ok(())
    }

    pub fn load_switches(&self) -> Result<Vec<SwitchRecord>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT id, name, gpio, inverted FROM switches ORDER BY id")?;
        let rows = stmt.query_map([], |row| {
            Ok(SwitchRecord {
                id: row.get(0)?,
                name: row.get(1)?,
                gpio: row.get(2)?,
                inverted: row.get(3)?,
            })
        })?;
        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }

    pub fn delete_switch(&self, id: i64) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM switches WHERE id = ?1", params![id])?;
        Ok(())
    }

    // ========================================================================
    // System settings
    // ========================================================================

    pub fn load_settings(&self) -> Result<Option<SettingsRecord>> {
        let conn = self.conn.lock().unwrap();
        let record = conn
            .query_row(
                "SELECT brewery_name FROM system_settings WHERE id = 1",
                [],
                |row| {
                    Ok(SettingsRecord {
                        brewery_name: row.get(0)?,
                    })
                },
            )
            .optional()?;
        Ok(record)
    }

    pub fn save_settings(&self, record: &SettingsRecord) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR REPLACE INTO system_settings (id, brewery_name) VALUES (1, ?1)",
            params![record.brewery_name],
        )?;
        Ok(())
    }
}
