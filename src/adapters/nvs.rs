//! NVS (Non-Volatile Storage) adapter.
//!
//! Implements [`ConfigPort`].  The system configuration is stored as a
//! single postcard blob under `greeniot::syscfg`, and
//! [`SystemConfig::validate`] runs before every save.
//!
//! On host builds the partition is simulated with a `HashMap` keyed by
//! `"{namespace}::{key}"`.

use crate::app::ports::{ConfigError, ConfigPort};
use crate::config::SystemConfig;
use log::{info, warn};

#[cfg(not(target_os = "espidf"))]
use std::collections::HashMap;

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;

pub const CONFIG_NAMESPACE: &str = "greeniot";
const CONFIG_KEY: &str = "syscfg";

/// Upper bound for any blob read back from flash.
const MAX_BLOB_SIZE: usize = 1024;

/// NVS names are limited to 15 characters plus the terminator.
#[cfg_attr(not(target_os = "espidf"), allow(dead_code))]
const NVS_NAME_LEN: usize = 16;

/// Backend failure, carrying the ESP-IDF return code on target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(not(target_os = "espidf"), allow(dead_code))]
enum BlobError {
    NotFound,
    Full,
    Io(i32),
}

pub struct NvsAdapter {
    #[cfg(not(target_os = "espidf"))]
    store: std::cell::RefCell<HashMap<String, Vec<u8>>>,
}

impl NvsAdapter {
    /// Create a new NvsAdapter and initialise NVS flash.
    ///
    /// Returns `Err(ConfigError::IoError)` if flash initialisation fails
    /// unrecoverably. On first boot or after a version mismatch the NVS
    /// partition is erased and re-initialised automatically.
    pub fn new() -> Result<Self, ConfigError> {
        #[cfg(target_os = "espidf")]
        {
            // SAFETY: called once from the main task before any other NVS access.
            let ret = unsafe { nvs_flash_init() };
            if ret == ESP_ERR_NVS_NO_FREE_PAGES as i32 || ret == ESP_ERR_NVS_NEW_VERSION_FOUND as i32 {
                warn!("NVS: erasing and re-initialising flash partition");
                if unsafe { nvs_flash_erase() } != ESP_OK as i32 {
                    return Err(ConfigError::IoError);
                }
                if unsafe { nvs_flash_init() } != ESP_OK as i32 {
                    return Err(ConfigError::IoError);
                }
            } else if ret != ESP_OK as i32 {
                return Err(ConfigError::IoError);
            }
            info!("NvsAdapter: ESP-IDF NVS initialised");
        }

        #[cfg(not(target_os = "espidf"))]
        info!("NvsAdapter: simulation backend");

        Ok(Self {
            #[cfg(not(target_os = "espidf"))]
            store: std::cell::RefCell::new(HashMap::new()),
        })
    }

    // ── Blob primitives ───────────────────────────────────────

    #[cfg(not(target_os = "espidf"))]
    fn composite_key(namespace: &str, key: &str) -> String {
        format!("{}::{}", namespace, key)
    }

    #[cfg(not(target_os = "espidf"))]
    fn get_blob(&self, namespace: &str, key: &str) -> Result<Vec<u8>, BlobError> {
        self.store
            .borrow()
            .get(&Self::composite_key(namespace, key))
            .cloned()
            .ok_or(BlobError::NotFound)
    }

    #[cfg(not(target_os = "espidf"))]
    fn set_blob(&self, namespace: &str, key: &str, data: &[u8]) -> Result<(), BlobError> {
        if data.len() > MAX_BLOB_SIZE {
            return Err(BlobError::Full);
        }
        self.store
            .borrow_mut()
            .insert(Self::composite_key(namespace, key), data.to_vec());
        Ok(())
    }

    /// NUL-terminated copy of an NVS namespace or key name.
    #[cfg(target_os = "espidf")]
    fn c_name(name: &str) -> [u8; NVS_NAME_LEN] {
        let mut buf = [0u8; NVS_NAME_LEN];
        let bytes = name.as_bytes();
        let len = bytes.len().min(NVS_NAME_LEN - 1);
        buf[..len].copy_from_slice(&bytes[..len]);
        buf
    }

    /// Open an NVS namespace, execute a closure with the handle, then close.
    #[cfg(target_os = "espidf")]
    fn with_nvs_handle<F, T>(namespace: &str, write: bool, f: F) -> Result<T, BlobError>
    where
        F: FnOnce(nvs_handle_t) -> Result<T, BlobError>,
    {
        let ns = Self::c_name(namespace);
        let mut handle: nvs_handle_t = 0;
        let mode = if write {
            nvs_open_mode_t_NVS_READWRITE
        } else {
            nvs_open_mode_t_NVS_READONLY
        };

        let ret = unsafe { nvs_open(ns.as_ptr() as *const _, mode, &mut handle) };
        if ret == ESP_ERR_NVS_NOT_FOUND as i32 {
            return Err(BlobError::NotFound);
        }
        if ret != ESP_OK as i32 {
            return Err(BlobError::Io(ret));
        }

        let result = f(handle);
        unsafe {
            nvs_close(handle);
        }
        result
    }

    #[cfg(target_os = "espidf")]
    fn get_blob(&self, namespace: &str, key: &str) -> Result<Vec<u8>, BlobError> {
        let key = Self::c_name(key);
        Self::with_nvs_handle(namespace, false, |handle| {
            let mut size: usize = 0;
            let ret = unsafe {
                nvs_get_blob(
                    handle,
                    key.as_ptr() as *const _,
                    core::ptr::null_mut(),
                    &mut size,
                )
            };
            if ret == ESP_ERR_NVS_NOT_FOUND as i32 {
                return Err(BlobError::NotFound);
            }
            if ret != ESP_OK as i32 || size > MAX_BLOB_SIZE {
                return Err(BlobError::Io(ret));
            }

            let mut buf = vec![0u8; size];
            let ret = unsafe {
                nvs_get_blob(
                    handle,
                    key.as_ptr() as *const _,
                    buf.as_mut_ptr() as *mut _,
                    &mut size,
                )
            };
            if ret != ESP_OK as i32 {
                return Err(BlobError::Io(ret));
            }
            buf.truncate(size);
            Ok(buf)
        })
    }

    #[cfg(target_os = "espidf")]
    fn set_blob(&self, namespace: &str, key: &str, data: &[u8]) -> Result<(), BlobError> {
        if data.len() > MAX_BLOB_SIZE {
            return Err(BlobError::Full);
        }
        let key = Self::c_name(key);
        Self::with_nvs_handle(namespace, true, |handle| {
            let ret = unsafe {
                nvs_set_blob(
                    handle,
                    key.as_ptr() as *const _,
                    data.as_ptr() as *const _,
                    data.len(),
                )
            };
            if ret == ESP_ERR_NVS_NOT_ENOUGH_SPACE as i32 {
                return Err(BlobError::Full);
            }
            if ret != ESP_OK as i32 {
                return Err(BlobError::Io(ret));
            }
            let ret = unsafe { nvs_commit(handle) };
            if ret != ESP_OK as i32 {
                return Err(BlobError::Io(ret));
            }
            Ok(())
        })
    }
}

impl ConfigPort for NvsAdapter {
    fn load(&self) -> Result<SystemConfig, ConfigError> {
        match self.get_blob(CONFIG_NAMESPACE, CONFIG_KEY) {
            Ok(bytes) => {
                let cfg: SystemConfig =
                    postcard::from_bytes(&bytes).map_err(|_| ConfigError::Corrupted)?;
                info!("NvsAdapter: loaded config ({} bytes)", bytes.len());
                Ok(cfg)
            }
            Err(BlobError::NotFound) => {
                info!("NvsAdapter: no stored config, using defaults");
                Ok(SystemConfig::default())
            }
            Err(e) => {
                warn!("NvsAdapter: read error {:?}, using defaults", e);
                Ok(SystemConfig::default())
            }
        }
    }

    fn save(&self, config: &SystemConfig) -> Result<(), ConfigError> {
        config.validate()?;
        let bytes = postcard::to_allocvec(config).map_err(|_| ConfigError::IoError)?;
        match self.set_blob(CONFIG_NAMESPACE, CONFIG_KEY, &bytes) {
            Ok(()) => {
                info!("NvsAdapter: config saved ({} bytes)", bytes.len());
                Ok(())
            }
            Err(BlobError::Full) => Err(ConfigError::StorageFull),
            Err(e) => {
                warn!("NvsAdapter: write error {:?}", e);
                Err(ConfigError::IoError)
            }
        }
    }
}
