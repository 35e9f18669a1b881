//! BLE Mesh sensor-server transport adapter.
//!
//! Implements [`TransportPort`] for the node's mesh radio.
//!
//! ## cfg gating
//!
//! - **`target_os = "espidf"`**: ESP-BLE-MESH node API (`esp_ble_mesh_*`).
//!   `init` brings up the BT controller and Bluedroid, then registers one
//!   element with a Configuration Server and a Sensor Server.
//! - **all other targets**: simulation backed by static atomics so host
//!   tests can flip provisioning and inject publish failures.
//!
//! ## Payload
//!
//! Sensor Status carries a marshalled property list.  Each entry starts
//! with a Format A MPID (little-endian `u16`: bit 0 = format, bits 1–4 =
//! length − 1, bits 5–15 = property ID) followed by the raw value:
//!
//! | Property               | ID       | Value                          |
//! |------------------------|----------|--------------------------------|
//! | Present Ambient Temp.  | `0x004F` | `i16` LE, 0.5 °C, clamped ±128 |
//! | Present Ambient RH     | `0x0076` | `u16` LE, 0.5 %, max 200       |
//! | Present Battery Level  | `0x006E` | `u8` percent                   |

use log::{debug, info, warn};

use crate::app::ports::{features, MeshSensorData, TransportPort, TransportStatus};
use crate::config::{ProvisioningBearer, TransportConfig};
use crate::error::TransportError;

use super::device_id::{read_mac, MacAddress};

// ───────────────────────────────────────────────────────────────
// Constants
// ───────────────────────────────────────────────────────────────

pub const PROP_TEMPERATURE: u16 = 0x004F;
pub const PROP_HUMIDITY: u16 = 0x0076;
pub const PROP_BATTERY_LEVEL: u16 = 0x006E;

/// Device UUID prefix ("GRNIOT").
const UUID_PREFIX: [u8; 6] = *b"GRNIOT";
/// UUID layout revision stored in bytes 12–13.
const UUID_VERSION: u16 = 0x0001;

pub const MESH_UUID_LEN: usize = 16;
/// 3 × MPID + 2 + 2 + 1 value bytes.
pub const SENSOR_STATUS_LEN: usize = 11;

pub type MeshUuid = [u8; MESH_UUID_LEN];
pub type SensorStatusPayload = heapless::Vec<u8, SENSOR_STATUS_LEN>;

// ───────────────────────────────────────────────────────────────
// Encoding
// ───────────────────────────────────────────────────────────────

/// Temperature in 0.5 °C steps, clamped to the signed 8-bit range.
pub fn encode_temperature(celsius: f32) -> [u8; 2] {
    let steps = (celsius / 0.5) as i16;
    steps.clamp(-128, 127).to_le_bytes()
}

pub fn decode_temperature(bytes: [u8; 2]) -> f32 {
    f32::from(i16::from_le_bytes(bytes)) * 0.5
}

/// Relative humidity in 0.5 % steps, capped at 100 %.
pub fn encode_humidity(percent: f32) -> [u8; 2] {
    // Float-to-int `as` saturates, so negatives land on 0.
    let steps = (percent / 0.5) as u16;
    steps.min(200).to_le_bytes()
}

pub fn decode_humidity(bytes: [u8; 2]) -> f32 {
    f32::from(u16::from_le_bytes(bytes)) * 0.5
}

/// Format A marshalled property ID.
fn mpid(property_id: u16, value_len: usize) -> [u8; 2] {
    let raw = ((property_id & 0x07FF) << 5) | (((value_len as u16 - 1) & 0x0F) << 1);
    raw.to_le_bytes()
}

/// Build the Sensor Status payload for one publication.
pub fn encode_sensor_status(data: &MeshSensorData) -> SensorStatusPayload {
    let mut out = SensorStatusPayload::new();
    // Fixed layout, never exceeds SENSOR_STATUS_LEN.
    let _ = out.extend_from_slice(&mpid(PROP_TEMPERATURE, 2));
    let _ = out.extend_from_slice(&encode_temperature(data.temperature));
    let _ = out.extend_from_slice(&mpid(PROP_HUMIDITY, 2));
    let _ = out.extend_from_slice(&encode_humidity(data.humidity));
    let _ = out.extend_from_slice(&mpid(PROP_BATTERY_LEVEL, 1));
    let _ = out.push(data.battery_percent.min(100));
    out
}

/// Device UUID: `"GRNIOT" | MAC | version BE | product BE`.
pub fn device_uuid(mac: &MacAddress, product_id: u16) -> MeshUuid {
    let mut uuid = [0u8; MESH_UUID_LEN];
    uuid[0..6].copy_from_slice(&UUID_PREFIX);
    uuid[6..12].copy_from_slice(mac);
    uuid[12..14].copy_from_slice(&UUID_VERSION.to_be_bytes());
    uuid[14..16].copy_from_slice(&product_id.to_be_bytes());
    uuid
}

/// Configuration Server state the node registers with the stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeRole {
    pub relay: bool,
    pub gatt_proxy: bool,
    pub low_power: bool,
    pub default_ttl: u8,
    /// Network transmit state (see [`transmit_state`]).
    pub net_transmit: u8,
}

/// Transmit state byte: retransmit count in bits 0–2, steps of 10 ms
/// (minus one) in bits 3–7.
pub const fn transmit_state(count: u8, interval_ms: u16) -> u8 {
    let steps = (interval_ms / 10).saturating_sub(1);
    let steps = if steps > 0x1F { 0x1F } else { steps as u8 };
    (count & 0x07) | (steps << 3)
}

/// An LPN neither relays nor proxies; a mains node does both.
pub fn node_role(config: &TransportConfig) -> NodeRole {
    let lpn = config.low_power_node;
    NodeRole {
        relay: !lpn,
        gatt_proxy: !lpn,
        low_power: lpn,
        default_ttl: config.publish_ttl,
        net_transmit: transmit_state(2, 20),
    }
}

fn feature_bits(config: &TransportConfig) -> u8 {
    let role = node_role(config);
    let mut bits = 0;
    if role.relay {
        bits |= features::RELAY;
    }
    if role.gatt_proxy {
        bits |= features::PROXY;
    }
    if role.low_power {
        bits |= features::LOW_POWER;
    }
    bits
}

/// Zero-based value length of a Format A sensor state, as the Sensor
/// Server expects it in `sensor_data.length`.
pub const fn raw_length(property_id: u16) -> u8 {
    match property_id {
        PROP_BATTERY_LEVEL => 0,
        _ => 1,
    }
}

// ───────────────────────────────────────────────────────────────
// Simulation state
// ───────────────────────────────────────────────────────────────

#[cfg(not(target_os = "espidf"))]
use core::sync::atomic::{AtomicBool, AtomicU16, Ordering};

#[cfg(not(target_os = "espidf"))]
static SIM_ADDRESS: AtomicU16 = AtomicU16::new(0);

#[cfg(not(target_os = "espidf"))]
static SIM_SEND_FAILS: AtomicBool = AtomicBool::new(false);

/// Simulation: admit the node with the given unicast address
/// (0 leaves the network).
#[cfg(not(target_os = "espidf"))]
pub fn sim_set_provisioned(address: u16) {
    SIM_ADDRESS.store(address, Ordering::Relaxed);
}

/// Simulation: make every subsequent publish fail.
#[cfg(not(target_os = "espidf"))]
pub fn sim_set_send_fails(fail: bool) {
    SIM_SEND_FAILS.store(fail, Ordering::Relaxed);
}

// ───────────────────────────────────────────────────────────────
// MeshTransport
// ───────────────────────────────────────────────────────────────

pub struct MeshTransport {
    uuid: MeshUuid,
    config: Option<TransportConfig>,
    provisioning_enabled: bool,
    publish_count: u32,
    last_payload: Option<SensorStatusPayload>,
    #[cfg(not(target_os = "espidf"))]
    started: std::time::Instant,
}

impl Default for MeshTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MeshTransport {
    pub fn new() -> Self {
        Self {
            uuid: [0u8; MESH_UUID_LEN],
            config: None,
            provisioning_enabled: false,
            publish_count: 0,
            last_payload: None,
            #[cfg(not(target_os = "espidf"))]
            started: std::time::Instant::now(),
        }
    }

    pub fn uuid(&self) -> &MeshUuid {
        &self.uuid
    }

    pub fn publish_count(&self) -> u32 {
        self.publish_count
    }

    /// Last Sensor Status payload handed to the stack.
    pub fn last_payload(&self) -> Option<&[u8]> {
        self.last_payload.as_deref()
    }

    fn require_init(&self) -> Result<&TransportConfig, TransportError> {
        self.config.as_ref().ok_or(TransportError::Init)
    }

    #[cfg(target_os = "espidf")]
    fn primary_address(&self) -> u16 {
        stack::primary_address()
    }

    #[cfg(not(target_os = "espidf"))]
    fn primary_address(&self) -> u16 {
        SIM_ADDRESS.load(Ordering::Relaxed)
    }

    #[cfg(target_os = "espidf")]
    fn uptime_s(&self) -> u32 {
        (unsafe { esp_idf_svc::sys::esp_timer_get_time() } / 1_000_000) as u32
    }

    #[cfg(not(target_os = "espidf"))]
    fn uptime_s(&self) -> u32 {
        self.started.elapsed().as_secs() as u32
    }

    // ── Platform hooks ────────────────────────────────────────

    #[cfg(target_os = "espidf")]
    fn platform_start(&mut self, config: &TransportConfig) -> Result<(), TransportError> {
        stack::start(&self.uuid, config)
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_start(&mut self, _config: &TransportConfig) -> Result<(), TransportError> {
        Ok(())
    }

    #[cfg(target_os = "espidf")]
    fn platform_enable_provisioning(&mut self, bearer: ProvisioningBearer) -> Result<(), TransportError> {
        stack::enable_provisioning(bearer)
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_enable_provisioning(&mut self, _bearer: ProvisioningBearer) -> Result<(), TransportError> {
        Ok(())
    }

    #[cfg(target_os = "espidf")]
    fn platform_is_provisioned(&self) -> bool {
        stack::is_provisioned()
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_is_provisioned(&self) -> bool {
        SIM_ADDRESS.load(Ordering::Relaxed) != 0
    }

    #[cfg(target_os = "espidf")]
    fn platform_publish(&mut self, data: &MeshSensorData, payload: &[u8], ttl: u8) -> Result<(), TransportError> {
        debug!("Mesh: publishing {} byte status, default ttl={}", payload.len(), ttl);
        stack::publish(data, payload)
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_publish(&mut self, _data: &MeshSensorData, payload: &[u8], ttl: u8) -> Result<(), TransportError> {
        if SIM_SEND_FAILS.load(Ordering::Relaxed) {
            return Err(TransportError::Send);
        }
        debug!("Mesh(sim): {} byte status, ttl={}", payload.len(), ttl);
        Ok(())
    }

    #[cfg(target_os = "espidf")]
    fn platform_local_reset(&mut self) -> Result<(), TransportError> {
        stack::local_reset()
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_local_reset(&mut self) -> Result<(), TransportError> {
        SIM_ADDRESS.store(0, Ordering::Relaxed);
        Ok(())
    }
}

impl TransportPort for MeshTransport {
    fn init(&mut self, config: &TransportConfig) -> Result<(), TransportError> {
        if config.publish_ttl == 0 || config.publish_ttl > 127 {
            return Err(TransportError::InvalidParam);
        }
        if self.config.is_some() {
            return Ok(());
        }
        self.uuid = device_uuid(&read_mac(), config.product_id);
        self.platform_start(config)?;
        self.config = Some(*config);
        info!(
            "Mesh: init company=0x{:04X} product=0x{:04X} bearer={:?} lpn={}",
            config.company_id, config.product_id, config.bearer, config.low_power_node
        );
        debug!("Mesh: uuid={:02X?}", self.uuid);
        Ok(())
    }

    fn enable_provisioning(&mut self) -> Result<(), TransportError> {
        let bearer = self.require_init()?.bearer;
        if self.provisioning_enabled {
            return Ok(());
        }
        self.platform_enable_provisioning(bearer)?;
        self.provisioning_enabled = true;
        info!("Mesh: unprovisioned beacon on via {:?}, waiting for a provisioner", bearer);
        Ok(())
    }

    fn is_provisioned(&self) -> bool {
        self.config.is_some() && self.platform_is_provisioned()
    }

    fn send(&mut self, data: &MeshSensorData) -> Result<(), TransportError> {
        let ttl = self.require_init()?.publish_ttl;
        if !self.is_provisioned() {
            return Err(TransportError::NotProvisioned);
        }
        let payload = encode_sensor_status(data);
        self.platform_publish(data, &payload, ttl)?;
        self.publish_count = self.publish_count.saturating_add(1);
        info!(
            "Mesh: published T={:.1}\u{00b0}C H={:.1}% batt={}% from 0x{:04X}",
            data.temperature,
            data.humidity,
            data.battery_percent,
            self.primary_address()
        );
        self.last_payload = Some(payload);
        Ok(())
    }

    fn status(&self) -> TransportStatus {
        let Some(config) = self.config.as_ref() else {
            return TransportStatus::default();
        };
        let provisioned = self.is_provisioned();
        TransportStatus {
            initialized: true,
            provisioned,
            address: if provisioned { self.primary_address() } else { 0 },
            features: feature_bits(config),
            uptime_s: self.uptime_s(),
        }
    }

    fn factory_reset(&mut self) -> Result<(), TransportError> {
        self.require_init()?;
        warn!("Mesh: factory reset, erasing network membership");
        self.platform_local_reset()?;
        self.provisioning_enabled = false;
        self.last_payload = None;
        Ok(())
    }
}

// ───────────────────────────────────────────────────────────────
// ESP-BLE-MESH node stack
// ───────────────────────────────────────────────────────────────

#[cfg(target_os = "espidf")]
mod stack {
    use core::ffi::c_void;
    use core::sync::atomic::{AtomicBool, AtomicU16, Ordering};

    use esp_idf_svc::sys::*;
    use log::{error, info, warn};

    use super::{
        encode_humidity, encode_temperature, node_role, raw_length, MeshUuid,
        PROP_BATTERY_LEVEL, PROP_HUMIDITY, PROP_TEMPERATURE, SENSOR_STATUS_LEN,
    };
    use crate::app::ports::MeshSensorData;
    use crate::config::{ProvisioningBearer, TransportConfig};
    use crate::error::TransportError;

    const MODEL_ID_CONFIG_SRV: u16 = 0x0000;
    const MODEL_ID_SENSOR_SRV: u16 = 0x1100;
    const OP_SENSOR_STATUS: u32 = 0x52;
    const DEV_ROLE_NODE: u8 = 0;
    const KEY_UNUSED: u16 = 0xFFFF;
    const STATE_COUNT: usize = 3;
    /// Largest single property value (temperature, humidity).
    const STATE_VALUE_LEN: usize = 2;
    /// Publication buffer: 1-byte opcode, payload, 4-byte TransMIC.
    const PUB_MSG_LEN: usize = 1 + SENSOR_STATUS_LEN + 4;

    static STARTED: AtomicBool = AtomicBool::new(false);
    static PROVISIONED: AtomicBool = AtomicBool::new(false);
    static ADDRESS: AtomicU16 = AtomicU16::new(0);
    static LPN_WANTED: AtomicBool = AtomicBool::new(false);

    /// Everything the stack keeps a pointer to after `esp_ble_mesh_init`.
    struct Storage {
        uuid: MeshUuid,
        prov: esp_ble_mesh_prov_t,
        comp: esp_ble_mesh_comp_t,
        elements: [esp_ble_mesh_elem_t; 1],
        models: [esp_ble_mesh_model_t; 2],
        cfg_srv: esp_ble_mesh_cfg_srv_t,
        sensor_srv: esp_ble_mesh_sensor_srv_t,
        states: [esp_ble_mesh_sensor_state_t; STATE_COUNT],
        state_bufs: [net_buf_simple; STATE_COUNT],
        state_data: [[u8; STATE_VALUE_LEN]; STATE_COUNT],
        sensor_pub: esp_ble_mesh_model_pub_t,
        pub_buf: net_buf_simple,
        pub_data: [u8; PUB_MSG_LEN],
    }

    // Zero is a valid bit pattern for every field (null pointers, zero counts).
    static mut STORAGE: Storage = unsafe { core::mem::zeroed() };

    fn check(ret: esp_err_t, what: &str, err: TransportError) -> Result<(), TransportError> {
        if ret == ESP_OK as i32 {
            Ok(())
        } else {
            error!("Mesh: {} failed (rc={})", what, ret);
            Err(err)
        }
    }

    fn sig_model(id: u16, pub_: *mut esp_ble_mesh_model_pub_t, user_data: *mut c_void) -> esp_ble_mesh_model_t {
        // SAFETY: plain C struct, all-zero is the unassigned state.
        let mut model: esp_ble_mesh_model_t = unsafe { core::mem::zeroed() };
        model.__bindgen_anon_1.model_id = id;
        model.pub_ = pub_;
        model.keys.fill(KEY_UNUSED);
        model.user_data = user_data;
        model
    }

    /// Wire the composition data into `STORAGE`. Runs once, before
    /// `esp_ble_mesh_init`.
    unsafe fn build_composition(uuid: &MeshUuid, config: &TransportConfig) {
        let s = &raw mut STORAGE;
        let role = node_role(config);
        unsafe {
            (*s).uuid = *uuid;
            (*s).prov.uuid = (&raw const (*s).uuid).cast::<u8>();

            (*s).cfg_srv.net_transmit = role.net_transmit;
            (*s).cfg_srv.relay = if role.relay {
                ESP_BLE_MESH_RELAY_ENABLED as u8
            } else {
                ESP_BLE_MESH_RELAY_NOT_SUPPORTED as u8
            };
            (*s).cfg_srv.relay_retransmit = super::transmit_state(2, 20);
            (*s).cfg_srv.beacon = ESP_BLE_MESH_BEACON_ENABLED as u8;
            (*s).cfg_srv.gatt_proxy = if role.gatt_proxy {
                ESP_BLE_MESH_GATT_PROXY_ENABLED as u8
            } else {
                ESP_BLE_MESH_GATT_PROXY_NOT_SUPPORTED as u8
            };
            (*s).cfg_srv.friend_state = ESP_BLE_MESH_FRIEND_NOT_SUPPORTED as u8;
            (*s).cfg_srv.default_ttl = role.default_ttl;

            let props = [PROP_TEMPERATURE, PROP_HUMIDITY, PROP_BATTERY_LEVEL];
            for (i, id) in props.into_iter().enumerate() {
                let data = (&raw mut (*s).state_data[i]).cast::<u8>();
                (*s).state_bufs[i].data = data;
                (*s).state_bufs[i].__buf = data;
                (*s).state_bufs[i].len = 0;
                (*s).state_bufs[i].size = STATE_VALUE_LEN as u16;

                (*s).states[i].sensor_property_id = id;
                (*s).states[i].sensor_data.format = ESP_BLE_MESH_SENSOR_DATA_FORMAT_A as u8;
                (*s).states[i].sensor_data.length = raw_length(id);
                (*s).states[i].sensor_data.raw_value = &raw mut (*s).state_bufs[i];
            }
            (*s).sensor_srv.rsp_ctrl.get_auto_rsp = ESP_BLE_MESH_SERVER_AUTO_RSP as u8;
            (*s).sensor_srv.rsp_ctrl.set_auto_rsp = ESP_BLE_MESH_SERVER_AUTO_RSP as u8;
            (*s).sensor_srv.state_count = STATE_COUNT as u8;
            (*s).sensor_srv.states = (&raw mut (*s).states).cast::<esp_ble_mesh_sensor_state_t>();

            let pub_data = (&raw mut (*s).pub_data).cast::<u8>();
            (*s).pub_buf.data = pub_data;
            (*s).pub_buf.__buf = pub_data;
            (*s).pub_buf.size = PUB_MSG_LEN as u16;
            (*s).sensor_pub.msg = &raw mut (*s).pub_buf;
            (*s).sensor_pub.dev_role = DEV_ROLE_NODE;

            (*s).models[0] = sig_model(
                MODEL_ID_CONFIG_SRV,
                core::ptr::null_mut(),
                (&raw mut (*s).cfg_srv).cast::<c_void>(),
            );
            (*s).models[1] = sig_model(
                MODEL_ID_SENSOR_SRV,
                &raw mut (*s).sensor_pub,
                (&raw mut (*s).sensor_srv).cast::<c_void>(),
            );

            (*s).elements[0].location = 0;
            (*s).elements[0].sig_model_count = 2;
            (*s).elements[0].sig_models = (&raw mut (*s).models).cast::<esp_ble_mesh_model_t>();
            (*s).elements[0].vnd_model_count = 0;
            (*s).elements[0].vnd_models = core::ptr::null_mut();

            (*s).comp.cid = config.company_id;
            (*s).comp.pid = config.product_id;
            (*s).comp.element_count = 1;
            (*s).comp.elements = (&raw mut (*s).elements).cast::<esp_ble_mesh_elem_t>();
        }
    }

    unsafe extern "C" fn prov_cb(event: esp_ble_mesh_prov_cb_event_t, param: *mut esp_ble_mesh_prov_cb_param_t) {
        if param.is_null() {
            return;
        }
        #[allow(non_upper_case_globals)]
        match event {
            esp_ble_mesh_prov_cb_event_t_ESP_BLE_MESH_PROV_REGISTER_COMP_EVT => {
                let rc = unsafe { (*param).prov_register_comp.err_code };
                info!("Mesh: provisioning registered (rc={})", rc);
            }
            esp_ble_mesh_prov_cb_event_t_ESP_BLE_MESH_NODE_PROV_COMPLETE_EVT => {
                let (addr, net_idx) = unsafe {
                    let p = (*param).node_prov_complete;
                    (p.addr, p.net_idx)
                };
                ADDRESS.store(addr, Ordering::Relaxed);
                PROVISIONED.store(true, Ordering::Relaxed);
                info!("Mesh: provisioned addr=0x{:04X} net_idx=0x{:04X}", addr, net_idx);
                if LPN_WANTED.load(Ordering::Relaxed) {
                    let ret = unsafe { esp_ble_mesh_lpn_enable() };
                    if ret != ESP_OK as i32 {
                        warn!("Mesh: LPN enable failed (rc={})", ret);
                    }
                }
            }
            esp_ble_mesh_prov_cb_event_t_ESP_BLE_MESH_NODE_PROV_RESET_EVT => {
                PROVISIONED.store(false, Ordering::Relaxed);
                ADDRESS.store(0, Ordering::Relaxed);
                warn!("Mesh: provisioning reset by the network");
            }
            esp_ble_mesh_prov_cb_event_t_ESP_BLE_MESH_LPN_FRIENDSHIP_ESTABLISH_EVT => {
                info!("Mesh: friendship established");
            }
            esp_ble_mesh_prov_cb_event_t_ESP_BLE_MESH_LPN_FRIENDSHIP_TERMINATE_EVT => {
                warn!("Mesh: friendship terminated");
            }
            _ => {}
        }
    }

    /// BT controller, Bluedroid host, then the mesh node with its
    /// composition. Later calls are no-ops.
    pub fn start(uuid: &MeshUuid, config: &TransportConfig) -> Result<(), TransportError> {
        if STARTED.load(Ordering::Relaxed) {
            return Ok(());
        }
        unsafe {
            esp_bt_controller_mem_release(esp_bt_mode_t_ESP_BT_MODE_CLASSIC_BT);
            let mut bt_cfg = esp_bt_controller_config_t::default();
            check(esp_bt_controller_init(&mut bt_cfg), "bt_controller_init", TransportError::Init)?;
            check(
                esp_bt_controller_enable(esp_bt_mode_t_ESP_BT_MODE_BLE),
                "bt_controller_enable",
                TransportError::Init,
            )?;
            check(esp_bluedroid_init(), "bluedroid_init", TransportError::Init)?;
            check(esp_bluedroid_enable(), "bluedroid_enable", TransportError::Init)?;

            build_composition(uuid, config);
            LPN_WANTED.store(config.low_power_node, Ordering::Relaxed);

            check(
                esp_ble_mesh_register_prov_callback(Some(prov_cb)),
                "register_prov_callback",
                TransportError::Init,
            )?;
            let s = &raw mut STORAGE;
            check(
                esp_ble_mesh_init(&raw mut (*s).prov, &raw mut (*s).comp),
                "esp_ble_mesh_init",
                TransportError::Init,
            )?;
        }
        STARTED.store(true, Ordering::Relaxed);

        // Provisioning data restored from flash by the settings layer.
        if unsafe { esp_ble_mesh_node_is_provisioned() } {
            PROVISIONED.store(true, Ordering::Relaxed);
            ADDRESS.store(unsafe { esp_ble_mesh_get_primary_element_address() }, Ordering::Relaxed);
            if config.low_power_node {
                let ret = unsafe { esp_ble_mesh_lpn_enable() };
                if ret != ESP_OK as i32 {
                    warn!("Mesh: LPN enable failed (rc={})", ret);
                }
            }
        }
        info!(
            "Mesh: node stack up (config + sensor server), provisioned={}",
            PROVISIONED.load(Ordering::Relaxed)
        );
        Ok(())
    }

    pub fn enable_provisioning(bearer: ProvisioningBearer) -> Result<(), TransportError> {
        let bearers = match bearer {
            ProvisioningBearer::Adv => esp_ble_mesh_prov_bearer_t_ESP_BLE_MESH_PROV_ADV,
            ProvisioningBearer::Gatt => esp_ble_mesh_prov_bearer_t_ESP_BLE_MESH_PROV_GATT,
        };
        check(
            unsafe { esp_ble_mesh_node_prov_enable(bearers) },
            "node_prov_enable",
            TransportError::Provision,
        )
    }

    pub fn is_provisioned() -> bool {
        STARTED.load(Ordering::Relaxed) && PROVISIONED.load(Ordering::Relaxed)
    }

    pub fn primary_address() -> u16 {
        ADDRESS.load(Ordering::Relaxed)
    }

    /// Refresh the Sensor Server states, then publish a Sensor Status to
    /// the model's publication address.
    pub fn publish(data: &MeshSensorData, payload: &[u8]) -> Result<(), TransportError> {
        if payload.len() > SENSOR_STATUS_LEN {
            return Err(TransportError::InvalidParam);
        }
        let values: [&[u8]; STATE_COUNT] = [
            &encode_temperature(data.temperature),
            &encode_humidity(data.humidity),
            &[data.battery_percent.min(100)],
        ];
        let s = &raw mut STORAGE;
        unsafe {
            for (i, value) in values.into_iter().enumerate() {
                (*s).state_data[i][..value.len()].copy_from_slice(value);
                (*s).state_bufs[i].len = value.len() as u16;
            }
            check(
                esp_ble_mesh_model_publish(
                    &raw mut (*s).models[1],
                    OP_SENSOR_STATUS,
                    payload.len() as u16,
                    payload.as_ptr().cast_mut(),
                    DEV_ROLE_NODE,
                ),
                "model_publish",
                TransportError::Send,
            )
        }
    }

    pub fn local_reset() -> Result<(), TransportError> {
        check(unsafe { esp_ble_mesh_node_local_reset() }, "node_local_reset", TransportError::Init)?;
        PROVISIONED.store(false, Ordering::Relaxed);
        ADDRESS.store(0, Ordering::Relaxed);
        Ok(())
    }
}
