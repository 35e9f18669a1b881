//! Node identity derived from the ESP32 factory MAC address.
//!
//! Produces a stable, human-readable node name in the form `GRN-XXYYZZ`
//! (last 3 bytes of the 6-byte MAC in uppercase hex).  The full MAC also
//! seeds the mesh device UUID (see [`super::mesh::device_uuid`]).

/// Fixed-size node name: "GRN-XXYYZZ" (10 chars).
pub type NodeName = heapless::String<16>;

/// Full 6-byte MAC address.
pub type MacAddress = [u8; 6];

/// Read the factory MAC address from eFuse.
#[cfg(target_os = "espidf")]
pub fn read_mac() -> MacAddress {
    let mut mac: MacAddress = [0u8; 6];
    unsafe {
        esp_idf_svc::sys::esp_efuse_mac_get_default(mac.as_mut_ptr());
    }
    mac
}

/// Simulation: returns a deterministic fake MAC.
#[cfg(not(target_os = "espidf"))]
pub fn read_mac() -> MacAddress {
    [0x34, 0x85, 0x18, 0x6A, 0x2B, 0xC4]
}

/// Format: `GRN-XXYYZZ` (e.g. `GRN-6A2BC4`).
pub fn node_name(mac: &MacAddress) -> NodeName {
    use core::fmt::Write;
    let mut name = NodeName::new();
    let _ = write!(name, "GRN-{:02X}{:02X}{:02X}", mac[3], mac[4], mac[5]);
    name
}
