use std::collections::HashMap;
use std::sync::Mutex;

use super::BackendOps;
use crate::config::DummyBackendConfig;
use crate::error::{ClapError, Result, UioError};
use crate::interrupt::{DummyUserInterrupt, UserInterrupt};

#[derive(Default)]
struct PropertyStore {
    scalars: HashMap<String, u64>,
    strings: HashMap<String, String>,
    vectors: HashMap<String, Vec<u64>>,
}

#[derive(Clone, Copy)]
struct RegisterHook {
    width: usize,
    set_on_write: u64,
    clear_on_write: u64,
    set_on_read: u64,
    clear_on_read: u64,
}

struct State {
    memory: Vec<u8>,
    uio_properties: HashMap<u64, PropertyStore>,
    uio_ids: HashMap<u64, i32>,
    apctrl_autocomplete: std::collections::HashSet<u64>,
    register_hooks: HashMap<u64, RegisterHook>,
}

/// In-process byte array backed by a JSON-driven property store and
/// register hooks; see `CLAP_DUMMY_BACKEND_CONFIG` in `SPEC_FULL.md`.
pub struct DummyBackend {
    state: Mutex<State>,
    uio_supported: bool,
    name: String,
}

impl DummyBackend {
    pub fn from_env() -> Self {
        Self::from_config(DummyBackendConfig::from_env(), true)
    }

    pub fn new_pcie() -> Self {
        Self::from_config(DummyBackendConfig::empty(), false)
    }

    pub fn from_config(cfg: DummyBackendConfig, uio_supported: bool) -> Self {
        let mut state = State {
            memory: vec![0u8; cfg.memory_size],
            uio_properties: HashMap::new(),
            uio_ids: HashMap::new(),
            apctrl_autocomplete: std::collections::HashSet::new(),
            register_hooks: HashMap::new(),
        };

        if uio_supported {
            for s in &cfg.uio.scalars {
                state.uio_properties.entry(s.addr).or_default().scalars.insert(s.name.clone(), s.value);
            }
            for s in &cfg.uio.strings {
                state.uio_properties.entry(s.addr).or_default().strings.insert(s.name.clone(), s.value.clone());
            }
            for v in &cfg.uio.vectors {
                state.uio_properties.entry(v.addr).or_default().vectors.insert(v.name.clone(), v.values.clone());
            }
            for id in &cfg.uio.ids {
                state.uio_ids.insert(id.addr, id.id);
            }
        }

        for reg in &cfg.reg.values {
            write_value(&mut state.memory, reg.addr, reg.value, reg.width);
        }
        for hook in &cfg.reg.hooks {
            state.register_hooks.insert(
                hook.addr,
                RegisterHook {
                    width: hook.width,
                    set_on_write: hook.set_on_write,
                    clear_on_write: hook.clear_on_write,
                    set_on_read: hook.set_on_read,
                    clear_on_read: hook.clear_on_read,
                },
            );
        }
        for addr in &cfg.apctrl_autocomplete {
            state.apctrl_autocomplete.insert(*addr);
        }
        for mb in &cfg.mem_bytes {
            if (mb.addr as usize) < state.memory.len() {
                state.memory[mb.addr as usize] = mb.value;
            }
        }

        Self { state: Mutex::new(state), uio_supported, name: "Dummy".into() }
    }

    /// Reads one register word directly (test helper, bypasses hooks).
    pub fn peek_register(&self, addr: u64, width: usize) -> u64 {
        let state = self.state.lock().unwrap();
        read_value(&state.memory, addr, width)
    }

    pub fn poke_register(&self, addr: u64, value: u64, width: usize) {
        let mut state = self.state.lock().unwrap();
        write_value(&mut state.memory, addr, value, width);
    }
}

fn check_range(len: usize, addr: u64, size: u64) -> Result<()> {
    if size == 0 {
        return Ok(());
    }
    if addr >= len as u64 || addr + size > len as u64 {
        return Err(ClapError::OutOfRange { addr, len: size });
    }
    Ok(())
}

fn read_value(memory: &[u8], addr: u64, width: usize) -> u64 {
    let addr = addr as usize;
    let mut buf = [0u8; 8];
    buf[..width].copy_from_slice(&memory[addr..addr + width]);
    u64::from_ne_bytes(buf)
}

fn write_value(memory: &mut [u8], addr: u64, value: u64, width: usize) {
    let addr = addr as usize;
    let bytes = value.to_ne_bytes();
    memory[addr..addr + width].copy_from_slice(&bytes[..width]);
}

impl BackendOps for DummyBackend {
    fn backend_name(&self) -> &str {
        &self.name
    }

    fn required_alignment(&self) -> u64 {
        1
    }

    fn read_raw(&self, addr: u64, buf: &mut [u8]) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        check_range(state.memory.len(), addr, buf.len() as u64)?;

        if let Some(hook) = state.register_hooks.get(&addr).copied() {
            if hook.width == buf.len() {
                let mut value = read_value(&state.memory, addr, hook.width);
                value |= hook.set_on_read;
                value &= !hook.clear_on_read;
                write_value(&mut state.memory, addr, value, hook.width);
            }
        }

        buf.copy_from_slice(&state.memory[addr as usize..addr as usize + buf.len()]);
        Ok(())
    }

    fn write_raw(&self, addr: u64, buf: &[u8]) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        check_range(state.memory.len(), addr, buf.len() as u64)?;
        let addr_usize = addr as usize;
        state.memory[addr_usize..addr_usize + buf.len()].copy_from_slice(buf);

        if let Some(hook) = state.register_hooks.get(&addr).copied() {
            if hook.width == buf.len() {
                let mut value = read_value(&state.memory, addr, hook.width);
                value |= hook.set_on_write;
                value &= !hook.clear_on_write;
                write_value(&mut state.memory, addr, value, hook.width);
            }
        }

        if !buf.is_empty() && state.apctrl_autocomplete.contains(&addr) {
            let byte = state.memory[addr_usize];
            if byte & 0x1 != 0 {
                let auto_restart = byte & 0x80;
                state.memory[addr_usize] = auto_restart | 0x0E;
            }
        }

        Ok(())
    }

    fn read_ctrl(&self, addr: u64, byte_cnt: usize) -> Result<u64> {
        if byte_cnt > 8 {
            return Err(ClapError::IpCore {
                core: "Backend",
                detail: format!("control read size ({byte_cnt} byte) exceeds maximal allowed size (8 byte)"),
            });
        }
        let mut buf = [0u8; 8];
        self.read_raw(addr, &mut buf[..byte_cnt])?;
        Ok(u64::from_ne_bytes(buf))
    }

    fn read_uio_property(&self, addr: u64, name: &str) -> std::result::Result<u64, UioError> {
        if !self.uio_supported {
            return Err(UioError::Unsupported);
        }
        let state = self.state.lock().unwrap();
        state
            .uio_properties
            .get(&addr)
            .and_then(|p| p.scalars.get(name))
            .copied()
            .ok_or_else(|| UioError::NotFound(name.to_string()))
    }

    fn read_uio_string_property(&self, addr: u64, name: &str) -> std::result::Result<String, UioError> {
        if !self.uio_supported {
            return Err(UioError::Unsupported);
        }
        let state = self.state.lock().unwrap();
        state
            .uio_properties
            .get(&addr)
            .and_then(|p| p.strings.get(name))
            .cloned()
            .ok_or_else(|| UioError::NotFound(name.to_string()))
    }

    fn read_uio_property_vec(&self, addr: u64, name: &str) -> std::result::Result<Vec<u64>, UioError> {
        if !self.uio_supported {
            return Err(UioError::Unsupported);
        }
        let state = self.state.lock().unwrap();
        state
            .uio_properties
            .get(&addr)
            .and_then(|p| p.vectors.get(name))
            .cloned()
            .ok_or_else(|| UioError::NotFound(name.to_string()))
    }

    fn check_uio_property_exists(&self, addr: u64, name: &str) -> bool {
        if !self.uio_supported {
            return false;
        }
        let state = self.state.lock().unwrap();
        state
            .uio_properties
            .get(&addr)
            .map(|p| p.scalars.contains_key(name) || p.strings.contains_key(name) || p.vectors.contains_key(name))
            .unwrap_or(false)
    }

    fn get_uio_id(&self, addr: u64) -> std::result::Result<i32, UioError> {
        if !self.uio_supported {
            return Err(UioError::Unsupported);
        }
        let state = self.state.lock().unwrap();
        state.uio_ids.get(&addr).copied().ok_or_else(|| UioError::NotFound("uio id".into()))
    }

    fn make_user_interrupt(&self) -> Box<dyn UserInterrupt> {
        Box::new(DummyUserInterrupt::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_word_and_bytes() {
        let backend = DummyBackend::from_config(DummyBackendConfig::empty(), false);
        backend.write_raw(0x100, &0xA5A5_A5A5u32.to_ne_bytes()).unwrap();
        let mut buf = [0u8; 4];
        backend.read_raw(0x100, &mut buf).unwrap();
        assert_eq!(u32::from_ne_bytes(buf), 0xA5A5_A5A5);

        backend.write_raw(0x200, &[1, 2, 3, 4, 5]).unwrap();
        let mut buf = [0u8; 5];
        backend.read_raw(0x200, &mut buf).unwrap();
        assert_eq!(buf, [1, 2, 3, 4, 5]);
    }

    #[test]
    fn apctrl_auto_complete_sets_done_idle_ready() {
        let mut cfg = DummyBackendConfig::empty();
        cfg.apctrl_autocomplete.push(0x3000);
        let backend = DummyBackend::from_config(cfg, false);
        backend.write_raw(0x3000, &[0x01]).unwrap();
        assert_eq!(backend.peek_register(0x3000, 1) & 0xFF, 0x0E);
    }

    #[test]
    fn out_of_range_access_fails() {
        let backend = DummyBackend::from_config(DummyBackendConfig::empty(), false);
        let mut buf = [0u8; 4];
        assert!(backend.read_raw(0xFFFF_FFFF, &mut buf).is_err());
    }
}
