//! Firmware capability matrix
//!
//! The gateway's behavior drifts across firmware releases: table names in
//! the miio database, the zigbee storage layout and the miio client flags
//! all depend on the version. Firmware versions of this device family sort
//! lexicographically in release order, so every decision here is an ordered
//! threshold lookup against the raw version string — never a parse.

use crate::commands::{MIIO_146, MIIO_147};

/// Pick the value of the first entry whose threshold the version reaches.
///
/// `table` holds `(threshold, value)` pairs in descending threshold order;
/// the first `version >= threshold` wins and `fallback` covers everything
/// older. Boundaries are inclusive.
fn select(
    version: &str,
    table: &[(&'static str, &'static str)],
    fallback: &'static str,
) -> &'static str {
    table
        .iter()
        .find(|(threshold, _)| version >= *threshold)
        .map(|&(_, value)| value)
        .unwrap_or(fallback)
}

/// Name of the BLE mesh group table in the miio database.
pub fn mesh_group_table(version: &str) -> &'static str {
    select(
        version,
        &[
            ("1.4.7_0160", "mesh_group_v3"),
            ("1.4.6_0043", "mesh_group_v1"),
        ],
        "mesh_group",
    )
}

/// Name of the BLE mesh device table in the miio database.
pub fn mesh_device_table(version: &str) -> &'static str {
    select(version, &[("1.4.7_0160", "mesh_device_v3")], "mesh_device")
}

/// Glob for the zigbee device storage.
///
/// Old firmwares keep a single `zigbee_gw.db`; 1.4.6_0030 and later spread
/// the data over per-device json files.
pub fn zigbee_db(version: &str) -> &'static str {
    select(
        version,
        &[("1.4.6_0030", "/data/zigbee_gw/*.json")],
        "/data/zigbee_gw/zigbee_gw.db",
    )
}

/// miio client invocation for this firmware.
pub(crate) fn miio_client(version: &str) -> &'static str {
    select(version, &[("1.4.7_0063", MIIO_147)], MIIO_146)
}

/// Extra Z3 argument that opens the console port, where supported.
pub(crate) fn z3_console_arg(version: &str) -> &'static str {
    select(version, &[("1.4.7_0063", " -r 'c'")], "")
}

/// Known-good bluetooth NCP firmware digests, exact version match only.
const BT_MD5: [(&str, &str); 2] = [
    ("1.4.7_0160", "ba2e1931667c836187cbf7f1e834f588"),
    ("1.5.0_0026", "ba2e1931667c836187cbf7f1e834f588"),
];

/// md5 of the known-good bluetooth NCP firmware for `version`, if any.
pub fn bt_firmware_md5(version: &str) -> Option<&'static str> {
    BT_MD5
        .iter()
        .find(|&&(v, _)| v == version)
        .map(|&(_, md5)| md5)
}
