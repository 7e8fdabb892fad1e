//! 1-Wire bus access via the Linux w1 sysfs
//!
//! The kernel w1 subsystem exposes every enumerated slave as a directory
//! under `/sys/bus/w1/devices`, named `<family>-<serial>` in hex
//! (e.g. `28-0316a4d1fca2` for a DS18B20). Reading the `temperature` file
//! triggers a conversion and yields millidegrees Celsius; older kernels only
//! provide `w1_slave`, which embeds the value after `t=`.
//!
//! The canonical string form of a 64-bit device address is the first byte in
//! hex, a dash, then the next six bytes reversed in hex.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::constants::paths::W1_DEVICES_DIR;
use crate::hw::probe::ProbeCache;
use crate::temperature::Temperature;
use els_error::{ElsinoreError, Result};

/// A device discovered on the bus
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredProbe {
    pub phys_addr: String,
    pub address: u64,
}

/// Render a 64-bit device address in its canonical string form
pub fn phys_addr_from_address(address: u64) -> String {
    let bytes = address.to_le_bytes();
    let mut serial = [0u8; 6];
    serial.copy_from_slice(&bytes[1..7]);
    serial.reverse();
    let serial_hex: String = serial.iter().map(|b| format!("{:02x}", b)).collect();
    format!("{:02x}-{}", bytes[0], serial_hex)
}

/// Reconstruct the numeric address from the canonical string form.
/// The CRC byte is not part of the string form and comes back as zero.
pub fn address_from_phys_addr(phys_addr: &str) -> Option<u64> {
    let (family_hex, serial_hex) = phys_addr.split_once('-')?;
    if family_hex.len() != 2 || serial_hex.len() != 12 {
        return None;
    }
    let family = u8::from_str_radix(family_hex, 16).ok()?;

    let mut serial = [0u8; 6];
    for (i, chunk) in serial_hex.as_bytes().chunks(2).enumerate() {
        let pair = std::str::from_utf8(chunk).ok()?;
        serial[i] = u8::from_str_radix(pair, 16).ok()?;
    }
    serial.reverse();

    let mut bytes = [0u8; 8];
    bytes[0] = family;
    bytes[1..7].copy_from_slice(&serial);
    Some(u64::from_le_bytes(bytes))
}

/// Enumerate the slaves currently visible on the bus
pub fn enumerate() -> Result<Vec<DiscoveredProbe>> {
    enumerate_in(Path::new(W1_DEVICES_DIR))
}

fn enumerate_in(base: &Path) -> Result<Vec<DiscoveredProbe>> {
    let mut found = Vec::new();

    if !base.exists() {
        debug!("No w1 sysfs at {:?}, no probes to enumerate", base);
        return Ok(found);
    }

    for entry in fs::read_dir(base)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().to_string();
        if name.starts_with("w1_bus_master") {
            continue;
        }
        match address_from_phys_addr(&name) {
            Some(address) => {
                found.push(DiscoveredProbe {
                    phys_addr: name,
                    address,
                });
            }
            None => debug!("Skipping non-sensor w1 entry {}", name),
        }
    }

    Ok(found)
}

/// Read the current temperature of one slave
pub fn read_temperature(phys_addr: &str) -> Result<Temperature> {
    read_temperature_in(Path::new(W1_DEVICES_DIR), phys_addr)
}

fn read_temperature_in(base: &Path, phys_addr: &str) -> Result<Temperature> {
    let device_dir: PathBuf = base.join(phys_addr);

    // Preferred interface: a bare millidegree value
    let temperature_file = device_dir.join("temperature");
    if temperature_file.exists() {
        let content = fs::read_to_string(&temperature_file)?;
        return parse_millidegrees(content.trim())
            .ok_or_else(|| ElsinoreError::hardware(format!("unreadable value for {phys_addr}")));
    }

    // Fallback: the w1_slave scratchpad dump ("... t=23625")
    let slave_file = device_dir.join("w1_slave");
    let content = fs::read_to_string(&slave_file)
        .map_err(|e| ElsinoreError::hardware(format!("failed to read {phys_addr}: {e}")))?;
    if content.lines().next().is_some_and(|l| l.ends_with("NO")) {
        return Err(ElsinoreError::hardware(format!(
            "bad CRC reading {phys_addr}"
        )));
    }
    content
        .rsplit_once("t=")
        .and_then(|(_, value)| parse_millidegrees(value.trim()))
        .ok_or_else(|| ElsinoreError::hardware(format!("no reading in w1_slave for {phys_addr}")))
}

fn parse_millidegrees(value: &str) -> Option<Temperature> {
    value
        .parse::<i64>()
        .ok()
        .map(Temperature::from_millicelsius)
}

/// Scan the bus and refresh every cached probe reading. New devices are
/// added to the cache; a failed read leaves the previous reading in place
/// and moves on to the next probe.
pub fn refresh(cache: &ProbeCache) {
    match enumerate() {
        Ok(discovered) => {
            for probe in discovered {
                if cache.get(&probe.phys_addr).is_none() {
                    info!("Found probe {}", probe.phys_addr);
                }
                cache.ensure(&probe.phys_addr, probe.address);
            }
        }
        Err(e) => warn!("1-Wire enumeration failed: {}", e),
    }

    if !Path::new(W1_DEVICES_DIR).exists() {
        // Nothing to read from; injected test probes keep their value
        return;
    }

    for reading in cache.all() {
        match read_temperature(&reading.phys_addr) {
            Ok(temperature) => cache.update(&reading.phys_addr, temperature),
            Err(e) => warn!("Failed to read probe {}: {}", reading.phys_addr, e),
        }
    }
}
