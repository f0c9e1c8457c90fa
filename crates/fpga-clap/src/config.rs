//! Configuration types deserialized from the `CLAP_DUMMY_BACKEND_CONFIG`
//! JSON file (see `SPEC_FULL.md` §6). The schema mirrors
//! `DummyBackendBase::applyConfig` field-for-field so existing fixture
//! files stay usable.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use crate::constants::{DUMMY_BACKEND_CONFIG_ENV, DUMMY_DEFAULT_MEMORY_SIZE};

fn default_memory_size() -> usize {
    DUMMY_DEFAULT_MEMORY_SIZE
}

#[derive(Debug, Deserialize, Default)]
pub struct UioScalarEntry {
    pub addr: u64,
    pub name: String,
    pub value: u64,
}

#[derive(Debug, Deserialize, Default)]
pub struct UioStringEntry {
    pub addr: u64,
    pub name: String,
    pub value: String,
}

#[derive(Debug, Deserialize, Default)]
pub struct UioVecEntry {
    pub addr: u64,
    pub name: String,
    #[serde(default)]
    pub values: Vec<u64>,
}

#[derive(Debug, Deserialize, Default)]
pub struct UioIdEntry {
    pub addr: u64,
    pub id: i32,
}

#[derive(Debug, Deserialize, Default)]
pub struct UioSection {
    #[serde(default)]
    pub scalars: Vec<UioScalarEntry>,
    #[serde(default)]
    pub strings: Vec<UioStringEntry>,
    #[serde(default)]
    pub vectors: Vec<UioVecEntry>,
    #[serde(default)]
    pub ids: Vec<UioIdEntry>,
}

#[derive(Debug, Deserialize, Default)]
pub struct RegValueEntry {
    pub addr: u64,
    pub value: u64,
    #[serde(default = "default_width")]
    pub width: usize,
}

fn default_width() -> usize {
    4
}

#[derive(Debug, Deserialize, Default)]
pub struct RegisterHookEntry {
    pub addr: u64,
    #[serde(default = "default_width")]
    pub width: usize,
    #[serde(default, rename = "set_on_write")]
    pub set_on_write: u64,
    #[serde(default, rename = "clear_on_write")]
    pub clear_on_write: u64,
    #[serde(default, rename = "set_on_read")]
    pub set_on_read: u64,
    #[serde(default, rename = "clear_on_read")]
    pub clear_on_read: u64,
}

#[derive(Debug, Deserialize, Default)]
pub struct RegSection {
    #[serde(default)]
    pub values: Vec<RegValueEntry>,
    #[serde(default)]
    pub hooks: Vec<RegisterHookEntry>,
}

#[derive(Debug, Deserialize, Default)]
pub struct MemByteEntry {
    pub addr: u64,
    pub value: u8,
}

/// Root document of a `CLAP_DUMMY_BACKEND_CONFIG` file.
#[derive(Debug, Deserialize, Default)]
pub struct DummyBackendConfig {
    #[serde(default = "default_memory_size")]
    pub memory_size: usize,
    #[serde(default)]
    pub uio: UioSection,
    #[serde(default)]
    pub reg: RegSection,
    #[serde(default)]
    pub apctrl_autocomplete: Vec<u64>,
    #[serde(default)]
    pub mem_bytes: Vec<MemByteEntry>,
}

impl DummyBackendConfig {
    /// Default configuration when no config file is present or it fails
    /// to parse: a blank `memory_size`-byte region.
    pub fn empty() -> Self {
        Self {
            memory_size: DUMMY_DEFAULT_MEMORY_SIZE,
            uio: UioSection::default(),
            reg: RegSection::default(),
            apctrl_autocomplete: Vec::new(),
            mem_bytes: Vec::new(),
        }
    }

    /// Loads the config named by `CLAP_DUMMY_BACKEND_CONFIG`, falling
    /// back to [`Self::empty`] if the variable is unset, the file is
    /// missing, or it fails to parse — matching the source's
    /// best-effort `loadConfig`.
    pub fn from_env() -> Self {
        match std::env::var(DUMMY_BACKEND_CONFIG_ENV) {
            Ok(path) if !path.is_empty() => Self::from_path(&path).unwrap_or_else(|_| Self::empty()),
            _ => Self::empty(),
        }
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, serde_json::Error> {
        let text = std::fs::read_to_string(path).unwrap_or_default();
        if text.trim().is_empty() {
            return Ok(Self::empty());
        }
        serde_json::from_str(&text)
    }
}

/// Construction-time configuration for [`crate::backend::Backend`]
/// variants that aren't Dummy.
#[derive(Debug, Clone, Default)]
pub struct BackendConfig {
    pub device_num: u32,
    pub channel_num: u32,
    pub extra: HashMap<String, String>,
}
