//! Authenticated maintenance-shell session and device operations

use std::sync::OnceLock;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use lumigate_telnet::{TcpTransport, Transport};
use regex::Regex;
use tokio::time::sleep;
use tracing::{debug, info};

use crate::caps;
use crate::commands::{
    self, CHECK_BUSYBOX, CHECK_SOCAT, FIRMWARE_PATHS, LOCK_FIRMWARE, LOGIN_PROMPT, LOGIN_USER,
    PASSWORD_PROMPT, PERMISSION_DENIED, PROMPT_TAIL, READY_PROMPT, RUN_BT, RUN_FTP, TAR_DATA,
    TAR_ECHO_MARK, UNLOCK_FIRMWARE,
};
use crate::{Result, ShellError};

/// Deadline for the login handshake and ordinary commands.
const SHORT_TIMEOUT: Duration = Duration::from_secs(3);

/// The data archive takes a while to assemble on-device.
const TAR_TIMEOUT: Duration = Duration::from_secs(30);

/// Settle time for the remote init scripts between a kill and a respawn.
/// There is no status channel to poll; the delay is the synchronization.
const SETTLE: Duration = Duration::from_millis(500);

/// Maintenance-shell port on the gateway.
pub const SHELL_PORT: u16 = 23;

fn version_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"version=([0-9._]+)").expect("version pattern"))
}

fn did_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"did=(\d+)").expect("did pattern"))
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|window| window == needle)
}

fn decode_base64(raw: &[u8]) -> Result<Vec<u8>> {
    // the remote encoder wraps its output in lines
    let compact: Vec<u8> = raw
        .iter()
        .copied()
        .filter(|byte| !byte.is_ascii_whitespace())
        .collect();
    BASE64
        .decode(compact)
        .map_err(|e| ShellError::Protocol(format!("invalid base64 payload: {}", e)))
}

/// One authenticated session to a gateway's maintenance shell.
///
/// Construction runs the whole login handshake and caches the firmware
/// version; the version never changes for the lifetime of the session. All
/// operations are strict request/response pairs on a single stream, so the
/// exclusive borrow taken by every method is load-bearing: it is what keeps
/// commands from interleaving. A session that has returned an error should
/// be dropped and replaced; there is no reconnect.
#[derive(Debug)]
pub struct ShellSession<T: Transport> {
    transport: T,
    version: String,
}

impl ShellSession<TcpTransport> {
    /// Connect to `host` on the maintenance-shell port and log in.
    pub async fn connect(host: &str) -> Result<Self> {
        let transport = TcpTransport::connect(host, SHELL_PORT, SHORT_TIMEOUT).await?;
        Self::login(transport).await
    }
}

impl<T: Transport> ShellSession<T> {
    /// Log in over an established transport.
    ///
    /// Waits for the login prompt, sends the fixed `admin` user and waits
    /// for the ready prompt. A device that asks for a password is rejected
    /// with [`ShellError::PasswordRequired`] before any further traffic.
    /// The firmware version is fetched as the final login step and cached.
    pub async fn login(mut transport: T) -> Result<Self> {
        transport.read_until(LOGIN_PROMPT, SHORT_TIMEOUT).await?;
        transport.write(LOGIN_USER).await?;

        let found = transport
            .expect(&[READY_PROMPT, PASSWORD_PROMPT], SHORT_TIMEOUT)
            .await?;
        if found.pattern == 1 || contains(&found.data, PASSWORD_PROMPT) {
            return Err(ShellError::PasswordRequired);
        }

        let mut session = Self {
            transport,
            version: String::new(),
        };
        session.version = session.detect_version().await?;
        info!("shell session ready, firmware {}", session.version);
        Ok(session)
    }

    /// Firmware version detected at login, e.g. `1.4.7_0160`.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Run `command` and return everything the shell printed — echoed
    /// command line and trailing ready prompt included — decoded as UTF-8,
    /// lossily.
    ///
    /// Success means the prompt reappeared, nothing more. Operations that
    /// need confirmation must probe separately. Known hazard: a command
    /// whose own output contains the ready-prompt sequence `\r\n# ` is cut
    /// short at that point; the prompt is the only framing this protocol
    /// has. Route such payloads through [`read_file`](Self::read_file) with
    /// base64 instead.
    pub async fn exec(&mut self, command: &str) -> Result<String> {
        let raw = self.exec_raw(command).await?;
        Ok(String::from_utf8_lossy(&raw).into_owned())
    }

    /// Like [`exec`](Self::exec), but returns the raw bytes.
    pub async fn exec_raw(&mut self, command: &str) -> Result<Vec<u8>> {
        debug!("exec: {}", command);
        let mut line = Vec::with_capacity(command.len() + 1);
        line.extend_from_slice(command.as_bytes());
        line.push(b'\n');
        self.transport.write(&line).await?;
        Ok(self.transport.read_until(READY_PROMPT, SHORT_TIMEOUT).await?)
    }

    /// Framed read: discard the echoed command line through `echo_mark`,
    /// accumulate until `terminator`, return the capture with the
    /// terminator bytes removed.
    ///
    /// Getting either half wrong corrupts every raw read by a fixed number
    /// of bytes at the start or the end, which is why this is the single
    /// primitive behind all file retrieval.
    async fn read_framed(
        &mut self,
        echo_mark: &[u8],
        terminator: &[u8],
        timeout: Duration,
    ) -> Result<Vec<u8>> {
        self.transport.read_until(echo_mark, timeout).await?;
        let mut raw = self.transport.read_until(terminator, timeout).await?;
        raw.truncate(raw.len() - terminator.len());
        Ok(raw)
    }

    /// Fetch a file over the text channel.
    ///
    /// With `as_base64` the remote side encodes the content and it is
    /// decoded here — the only safe path for binary files, whose bytes
    /// could otherwise collide with the prompt framing. Without it the raw
    /// terminal capture is returned, trailing prompt stripped.
    pub async fn read_file(&mut self, path: &str, as_base64: bool) -> Result<Vec<u8>> {
        if as_base64 {
            let command = format!("cat {} | base64\n", path);
            self.transport.write(command.as_bytes()).await?;
            let raw = self.read_framed(b"\r\n", PROMPT_TAIL, SHORT_TIMEOUT).await?;
            decode_base64(&raw)
        } else {
            let command = format!("cat {}\n", path);
            self.transport.write(command.as_bytes()).await?;
            self.read_framed(b"\r\n", PROMPT_TAIL, SHORT_TIMEOUT).await
        }
    }

    /// Pull a gzipped tar of every persistent-data directory.
    ///
    /// Slow by design: the archive is assembled on-device and squeezed
    /// through the text channel in base64, so this read runs under the long
    /// deadline.
    pub async fn tar_data(&mut self) -> Result<Vec<u8>> {
        self.transport.write(TAR_DATA).await?;
        let raw = self
            .read_framed(TAR_ECHO_MARK, PROMPT_TAIL, TAR_TIMEOUT)
            .await?;
        decode_base64(&raw)
    }

    async fn detect_version(&mut self) -> Result<String> {
        let raw = self.read_file("/etc/rootfs_fw_info", false).await?;
        let text = String::from_utf8_lossy(&raw);
        let captures = version_re()
            .captures(&text)
            .ok_or_else(|| ShellError::Protocol("no version in /etc/rootfs_fw_info".into()))?;
        Ok(captures[1].to_string())
    }

    /// The device's miio token, lowercase hex.
    pub async fn token(&mut self) -> Result<String> {
        let raw = self.read_file("/data/miio/device.token", false).await?;
        let token = raw
            .trim_ascii_end()
            .iter()
            .map(|byte| format!("{:02x}", byte))
            .collect();
        Ok(token)
    }

    /// The device's numeric miio identifier.
    pub async fn device_id(&mut self) -> Result<String> {
        let raw = self.read_file("/data/miio/device.conf", false).await?;
        let text = String::from_utf8_lossy(&raw);
        let captures = did_re()
            .captures(&text)
            .ok_or_else(|| ShellError::Protocol("no did in /data/miio/device.conf".into()))?;
        Ok(captures[1].to_string())
    }

    /// Wireless MAC address, upper-cased.
    pub async fn wlan_mac(&mut self) -> Result<String> {
        let raw = self.read_file("/sys/class/net/wlan0/address", false).await?;
        Ok(String::from_utf8_lossy(&raw).trim().to_uppercase())
    }

    /// Ensure a known-good socat sits at `/data/socat`.
    ///
    /// One compound remote command: the md5 check and the fallback download
    /// travel in a single round trip, so no other process can observe a
    /// half-provisioned binary between the check and the fetch.
    pub async fn check_or_download_socat(&mut self) -> Result<String> {
        let download = commands::download("socat", "bin");
        self.exec(&format!("{} || {}", CHECK_SOCAT, download)).await
    }

    /// Ensure a known-good busybox sits at `/data/busybox`.
    pub async fn check_or_download_busybox(&mut self) -> Result<String> {
        let download = commands::download("busybox", "bin");
        self.exec(&format!("{} || {}", CHECK_BUSYBOX, download))
            .await
    }

    /// Expose the zigbee serial port over TCP via socat.
    pub async fn run_zigbee_tcp(&mut self, port: u16) -> Result<()> {
        let command = format!("{} && {} &", CHECK_SOCAT, commands::zigbee_tcp(port));
        self.exec(&command).await?;
        Ok(())
    }

    /// Stop the serial-over-TCP bridge, both the 8888 and 8889 variants.
    pub async fn stop_zigbee_tcp(&mut self) -> Result<()> {
        self.exec("pkill -f 'tcp-l:888'").await?;
        Ok(())
    }

    /// Start the stock zigbee daemon stack.
    pub async fn run_lumi_zigbee(&mut self) -> Result<()> {
        self.exec("daemon_app.sh &").await?;
        Ok(())
    }

    /// Stop the stock zigbee daemon stack.
    pub async fn stop_lumi_zigbee(&mut self) -> Result<()> {
        self.exec("killall daemon_app.sh Lumi_Z3GatewayHost_MQTT").await?;
        Ok(())
    }

    /// Whether the bluetooth NCP firmware on-device matches the known-good
    /// digest for this firmware version. `None` when no digest is known.
    pub async fn check_bt(&mut self) -> Result<Option<bool>> {
        let Some(md5) = caps::bt_firmware_md5(&self.version) else {
            return Ok(None);
        };
        let out = self.exec("md5sum /data/silabs_ncp_bt").await?;
        Ok(Some(out.contains(md5)))
    }

    /// Replace the bluetooth NCP firmware with the known-good build.
    pub async fn download_bt(&mut self) -> Result<()> {
        let Some(md5) = caps::bt_firmware_md5(&self.version) else {
            return Err(ShellError::Protocol(format!(
                "no bluetooth firmware known for {}",
                self.version
            )));
        };
        self.exec("rm /data/silabs_ncp_bt").await?;
        // same file name on every firmware so the stock scripts can still
        // kill it around updates
        self.exec(&commands::download("silabs_ncp_bt", md5)).await?;
        Ok(())
    }

    /// Start the bluetooth NCP bridge with its log mirrored to MQTT.
    pub async fn run_bt(&mut self) -> Result<()> {
        self.exec(RUN_BT).await?;
        Ok(())
    }

    /// Stop the bluetooth NCP bridge.
    pub async fn stop_bt(&mut self) -> Result<()> {
        self.exec("killall silabs_ncp_bt").await?;
        Ok(())
    }

    /// Check whether the firmware-update paths are locked.
    ///
    /// Locked means BOTH paths refuse the touch; a single writable path is
    /// enough for an update to slip through, so partial lock reports false.
    pub async fn check_firmware_lock(&mut self) -> Result<bool> {
        self.exec("mkdir -p /data/firmware").await?;
        let mut locked = true;
        for path in FIRMWARE_PATHS {
            let out = self.exec(&format!("touch {}", path)).await?;
            locked &= out.contains(PERMISSION_DENIED);
        }
        Ok(locked)
    }

    /// Toggle the immutable attribute on both firmware-update paths.
    pub async fn lock_firmware(&mut self, enable: bool) -> Result<()> {
        let command = if enable { LOCK_FIRMWARE } else { UNLOCK_FIRMWARE };
        for path in FIRMWARE_PATHS {
            self.exec(&format!("{} && {} {}", CHECK_BUSYBOX, command, path))
                .await?;
        }
        Ok(())
    }

    /// Start a minimal anonymous FTP daemon rooted at the writable data
    /// partition.
    pub async fn run_ftp(&mut self) -> Result<()> {
        self.exec(&format!("{} && {}", CHECK_BUSYBOX, RUN_FTP)).await?;
        Ok(())
    }

    /// Restart the MQTT broker bound to all interfaces instead of loopback.
    pub async fn run_public_mosquitto(&mut self) -> Result<()> {
        self.exec("killall mosquitto").await?;
        sleep(SETTLE).await;
        self.exec("mosquitto -d").await?;
        sleep(SETTLE).await;
        // zigbee_gw pins a core once the broker restarts; take it down too
        self.exec("killall zigbee_gw").await?;
        Ok(())
    }

    /// Start the NTP daemon.
    pub async fn run_ntpd(&mut self) -> Result<()> {
        self.exec("ntpd -l").await?;
        Ok(())
    }

    /// Output of `ps -w` on the device.
    pub async fn running_processes(&mut self) -> Result<String> {
        self.exec("ps -w").await
    }

    /// Restart the miio client with its log filtered onto the MQTT broker.
    ///
    /// `pattern` is an awk regular expression selecting which log lines get
    /// republished on `log/miio`. The client invocation is firmware-gated.
    pub async fn redirect_miio2mqtt(&mut self, pattern: &str) -> Result<()> {
        self.exec("killall daemon_miio.sh miio_client; pkill -f log/miio")
            .await?;
        sleep(SETTLE).await;
        let client = caps::miio_client(&self.version);
        let command = format!("{}{}", client, commands::miio2mqtt(pattern));
        self.exec(&command).await?;
        self.exec("daemon_miio.sh &").await?;
        Ok(())
    }

    /// Relaunch the Z3 gateway host with its console mirrored to MQTT.
    pub async fn run_public_zb_console(&mut self) -> Result<()> {
        // old firmwares run Z3 behind a tail, new ones do not; kill both
        self.exec("killall daemon_app.sh tail Lumi_Z3GatewayHost_MQTT")
            .await?;
        let command = commands::z3_console(caps::z3_console_arg(&self.version));
        self.exec(&command).await?;
        self.exec("daemon_app.sh &").await?;
        Ok(())
    }

    /// Silence the buzzer by removing the placeholder basic_gw process.
    pub async fn run_buzzer(&mut self) -> Result<()> {
        self.exec("kill $(ps | grep dummy:basic_gw | awk '{print $1}')")
            .await?;
        Ok(())
    }

    /// Stop the real basic_gw and park a dummy process under the same
    /// marker so the watchdog leaves the slot alone.
    pub async fn stop_buzzer(&mut self) -> Result<()> {
        self.exec("killall daemon_miio.sh; killall -9 basic_gw").await?;
        self.exec("sh -c 'sleep 999d' dummy:basic_gw &").await?;
        self.exec("daemon_miio.sh &").await?;
        Ok(())
    }

    /// Name of the BLE mesh group table for this firmware.
    pub fn mesh_group_table(&self) -> &'static str {
        caps::mesh_group_table(&self.version)
    }

    /// Name of the BLE mesh device table for this firmware.
    pub fn mesh_device_table(&self) -> &'static str {
        caps::mesh_device_table(&self.version)
    }

    /// Glob for the zigbee device storage on this firmware.
    pub fn zigbee_db(&self) -> &'static str {
        caps::zigbee_db(&self.version)
    }

    /// Tear the session down. Terminal: connect again for a fresh session.
    pub async fn close(mut self) -> Result<()> {
        self.transport.close().await?;
        Ok(())
    }
}
