//! Fixed command strings and protocol literals for the gateway shell.
//!
//! Everything here is a string contract with the target firmware: prompts,
//! paths, checksums and command lines are bit-exact and must stay that way.

/// Username prompt the telnetd prints on connect.
pub(crate) const LOGIN_PROMPT: &[u8] = b"login: ";

/// The only supported account. No \r here: some firmwares choke on \r\n.
pub(crate) const LOGIN_USER: &[u8] = b"admin\n";

/// Marker for a password-protected device; those are rejected outright.
pub(crate) const PASSWORD_PROMPT: &[u8] = b"Password:";

/// Prompt the shell emits once a command has finished. The sole command
/// boundary this protocol has.
pub(crate) const READY_PROMPT: &[u8] = b"\r\n# ";

/// Tail of the ready prompt, used when the echoed command line has already
/// been consumed separately.
pub(crate) const PROMPT_TAIL: &[u8] = b"# ";

// wget, not HTTPS: the stock firmware ships no TLS-capable fetcher. The md5
// gate in front of every download makes the plain-HTTP hop acceptable.
pub(crate) fn download(file: &str, category: &str) -> String {
    format!(
        "(wget -O /data/{file} http://master.dl.sourceforge.net/project/mgl03/{category}/{file}?viasf=1 \
         && chmod +x /data/{file})",
        file = file,
        category = category
    )
}

pub(crate) const CHECK_SOCAT: &str =
    "(md5sum /data/socat | grep 92b77e1a93c4f4377b4b751a5390d979)";

pub(crate) const CHECK_BUSYBOX: &str =
    "(md5sum /data/busybox | grep 099137899ece96f311ac5ab554ea6fec)";

pub(crate) fn zigbee_tcp(port: u16) -> String {
    format!("/data/socat tcp-l:{},reuseaddr,fork /dev/ttyS2", port)
}

pub(crate) const LOCK_FIRMWARE: &str = "/data/busybox chattr +i";
pub(crate) const UNLOCK_FIRMWARE: &str = "/data/busybox chattr -i";

pub(crate) const RUN_FTP: &str =
    "(/data/busybox tcpsvd -E 0.0.0.0 21 /data/busybox ftpd -w &)";

/// Both paths the updater may write a firmware image to. Locked means both.
pub(crate) const FIRMWARE_PATHS: [&str; 2] =
    ["/data/firmware.bin", "/data/firmware/firmware_ota.bin"];

/// Environment-specific string contract: busybox touch prints this on an
/// immutable file. Would need revisiting for a non-English userspace.
pub(crate) const PERMISSION_DENIED: &str = "Permission denied";

pub(crate) const RUN_BT: &str = "killall silabs_ncp_bt; pkill -f log/ble; \
     /data/silabs_ncp_bt /dev/ttyS1 1 2>&1 >/dev/null | \
     mosquitto_pub -t log/ble -l &";

// awk instead of a plain pipe because of its line buffering
pub(crate) const MIIO_147: &str = "miio_client -l 0 -o FILE_STORE -n 128 -d /data/miio";
pub(crate) const MIIO_146: &str = "miio_client -l 4 -d /data/miio";

pub(crate) fn miio2mqtt(pattern: &str) -> String {
    format!(
        " | awk '/{}/{{print $0;fflush()}}' | mosquitto_pub -t log/miio -l &",
        pattern
    )
}

// Z3 needs an open stdin, hence the leading tail; -l 0 keeps it quiet until
// a `debugprint on 1` console command turns logging on.
pub(crate) fn z3_console(console_arg: &str) -> String {
    format!(
        "nohup tail -f /dev/null 2>&1 | \
         nohup Lumi_Z3GatewayHost_MQTT -n 1 -b 115200 -l 0 \
         -p '/dev/ttyS2' -d '/data/silicon_zigbee_host/'{} 2>&1 | \
         mosquitto_pub -t log/z3 -l &",
        console_arg
    )
}

/// Archive every persistent-data directory worth backing up, base64-encoded
/// onto the text channel.
pub(crate) const TAR_DATA: &[u8] =
    b"tar -czOC /data basic_app basic_gw conf factory miio mijia_automation \
      silicon_zigbee_host zigbee zigbee_gw ble_info miioconfig.db \
      2>/dev/null | base64\n";

/// Echo mark for [`TAR_DATA`]: the command line is long enough that the
/// generic skip-one-line logic does not apply; skipping through the trailing
/// `base64\r\n` of the echo is what works.
pub(crate) const TAR_ECHO_MARK: &[u8] = b"base64\r\n";
