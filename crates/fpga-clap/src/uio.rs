//! Reads devicetree properties exposed by the UIO sysfs tree.
//!
//! `/sys/class/uio/uio<I>/device/of_node/<property>` holds the raw,
//! big-endian-on-disk bytes of one devicetree property; this module
//! converts them to the scalar/string/vector shapes the register
//! auto-detection logic needs.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::UioError;

fn property_path(uio_id: u32, property: &str) -> PathBuf {
    PathBuf::from(format!("/sys/class/uio/uio{uio_id}/device/of_node/{property}"))
}

fn read_raw(uio_id: u32, property: &str) -> std::result::Result<Vec<u8>, UioError> {
    fs::read(property_path(uio_id, property)).map_err(|_| UioError::NotFound(property.to_string()))
}

/// A single devicetree cell or cell-pair, stored big-endian on disk.
pub fn read_scalar_property(uio_id: u32, property: &str) -> std::result::Result<u64, UioError> {
    let bytes = read_raw(uio_id, property)?;
    match bytes.len() {
        4 => {
            let mut buf = [0u8; 4];
            buf.copy_from_slice(&bytes);
            Ok(u32::from_be_bytes(buf) as u64)
        }
        8 => {
            let mut buf = [0u8; 8];
            buf.copy_from_slice(&bytes);
            Ok(u64::from_be_bytes(buf))
        }
        other => Err(UioError::ParseFailure(
            property.to_string(),
            format!("expected 4 or 8 bytes, found {other}"),
        )),
    }
}

/// A vector of 32-bit cells (e.g. `interrupts = <1 2>`).
pub fn read_vec_property(uio_id: u32, property: &str) -> std::result::Result<Vec<u64>, UioError> {
    let bytes = read_raw(uio_id, property)?;
    if bytes.len() % 4 != 0 {
        return Err(UioError::ParseFailure(property.to_string(), "length not a multiple of 4".into()));
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|c| u32::from_be_bytes([c[0], c[1], c[2], c[3]]) as u64)
        .collect())
}

/// A NUL-terminated devicetree string property.
pub fn read_string_property(uio_id: u32, property: &str) -> std::result::Result<String, UioError> {
    let bytes = read_raw(uio_id, property)?;
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8(bytes[..end].to_vec()).map_err(|e| UioError::ParseFailure(property.to_string(), e.to_string()))
}

pub fn property_exists(uio_id: u32, property: &str) -> bool {
    property_path(uio_id, property).exists()
}

/// Hex-encoded address, devicetree style: `/dma-channel@<hex offset>/prop`.
pub fn build_dma_channel_property(ctrl_plus_offset: u64, property: &str) -> String {
    format!("dma-channel@{ctrl_plus_offset:x}/{property}")
}

/// Finds the uio device that maps `addr`, by scanning
/// `/sys/class/uio/uio*/maps/mapN/addr` until `addr` falls within
/// `[map_addr, map_addr + map_size)`, or no more maps exist for the
/// device. Mirrors `Uio::initMaps`'s incrementing `mapN` walk.
pub fn find_uio_id_for_addr(addr: u64) -> std::result::Result<u32, UioError> {
    let class = Path::new("/sys/class/uio");
    let entries = fs::read_dir(class).map_err(|_| UioError::NotFound("/sys/class/uio".into()))?;

    for entry in entries.flatten() {
        let name = entry.file_name();
        let name = name.to_string_lossy();
        let Some(id_str) = name.strip_prefix("uio") else { continue };
        let Ok(id) = id_str.parse::<u32>() else { continue };

        for map_idx in 0.. {
            let addr_path = entry.path().join(format!("maps/map{map_idx}/addr"));
            let size_path = entry.path().join(format!("maps/map{map_idx}/size"));
            let Ok(addr_text) = fs::read_to_string(&addr_path) else { break };
            let Ok(size_text) = fs::read_to_string(&size_path) else { break };

            let map_addr = parse_hex_text(&addr_text);
            let map_size = parse_hex_text(&size_text);
            if let (Some(map_addr), Some(map_size)) = (map_addr, map_size) {
                if addr >= map_addr && addr < map_addr + map_size {
                    return Ok(id);
                }
            }
        }
    }

    Err(UioError::NotFound(format!("no uio device maps address 0x{addr:x}")))
}

fn parse_hex_text(text: &str) -> Option<u64> {
    let trimmed = text.trim();
    let digits = trimmed.strip_prefix("0x").unwrap_or(trimmed);
    u64::from_str_radix(digits, 16).ok()
}
