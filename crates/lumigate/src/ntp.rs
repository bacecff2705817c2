//! Clock-skew probe against a plain NTP server
//!
//! The gateway loses its clock when it boots offline; callers compare this
//! probe against local time to decide whether to force a resync. It is
//! advisory only: every failure mode collapses to `0.0` so nothing upstream
//! has to care why the probe went unanswered.

use std::io;
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::time::timeout;
use tracing::debug;

/// Seconds between the NTP epoch (1900-01-01) and the Unix epoch.
const NTP_DELTA: f64 = 2_208_988_800.0;

const NTP_PORT: u16 = 123;

const REPLY_TIMEOUT: Duration = Duration::from_secs(2);

/// 48-byte client request: LI 0, version 3, client mode, rest zero.
const NTP_QUERY: [u8; 48] = {
    let mut query = [0u8; 48];
    query[0] = 0x1b;
    query
};

/// Ask `host` for its current time.
///
/// Returns seconds since the Unix epoch as reported by the server, or `0.0`
/// on timeout, malformed reply or any socket failure.
pub async fn query(host: &str) -> f64 {
    match probe(host, NTP_PORT).await {
        Ok(time) => time,
        Err(e) => {
            debug!("ntp probe of {} failed: {}", host, e);
            0.0
        }
    }
}

async fn probe(host: &str, port: u16) -> io::Result<f64> {
    let sock = UdpSocket::bind("0.0.0.0:0").await?;
    sock.send_to(&NTP_QUERY, (host, port)).await?;

    let mut buf = [0u8; 1024];
    let n = timeout(REPLY_TIMEOUT, sock.recv(&mut buf))
        .await
        .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "no ntp reply"))??;

    Ok(parse_reply(&buf[..n]).unwrap_or(0.0))
}

/// Transmit timestamp from the reply's last 8 bytes: big-endian 32-bit
/// seconds since 1900 plus 32-bit fractional seconds.
fn parse_reply(raw: &[u8]) -> Option<f64> {
    if raw.len() < 8 {
        return None;
    }
    let tail = &raw[raw.len() - 8..];
    let secs = u32::from_be_bytes(tail[..4].try_into().ok()?);
    let frac = u32::from_be_bytes(tail[4..].try_into().ok()?);
    Some(f64::from(secs) + f64::from(frac) / 4_294_967_296.0 - NTP_DELTA)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reply_with(secs: u32, frac: u32) -> [u8; 48] {
        let mut reply = [0u8; 48];
        reply[40..44].copy_from_slice(&secs.to_be_bytes());
        reply[44..48].copy_from_slice(&frac.to_be_bytes());
        reply
    }

    #[test]
    fn test_parse_epoch_boundary() {
        // server reporting exactly the Unix epoch
        let reply = reply_with(2_208_988_800, 0);
        assert_eq!(parse_reply(&reply), Some(0.0));
    }

    #[test]
    fn test_parse_fractional_seconds() {
        let reply = reply_with(2_208_988_801, u32::MAX / 2 + 1);
        let time = parse_reply(&reply).unwrap();
        assert!((time - 1.5).abs() < 1e-6);
    }

    #[test]
    fn test_parse_short_reply() {
        assert_eq!(parse_reply(&[0x1c, 0, 0, 0]), None);
        assert_eq!(parse_reply(&[]), None);
    }

    #[tokio::test]
    async fn test_probe_round_trip() {
        let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = server.local_addr().unwrap().port();

        tokio::spawn(async move {
            let mut buf = [0u8; 64];
            let (n, peer) = server.recv_from(&mut buf).await.unwrap();
            assert_eq!(n, 48);
            assert_eq!(buf[0], 0x1b);
            server
                .send_to(&reply_with(2_208_988_800, 0), peer)
                .await
                .unwrap();
        });

        let time = probe("127.0.0.1", port).await.unwrap();
        assert_eq!(time, 0.0);
    }

    #[tokio::test]
    async fn test_probe_malformed_reply_yields_zero() {
        let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = server.local_addr().unwrap().port();

        tokio::spawn(async move {
            let mut buf = [0u8; 64];
            let (_, peer) = server.recv_from(&mut buf).await.unwrap();
            server.send_to(&[0x1c, 0, 0, 0], peer).await.unwrap();
        });

        let time = probe("127.0.0.1", port).await.unwrap();
        assert_eq!(time, 0.0);
    }

    #[tokio::test]
    async fn test_probe_times_out_on_silence() {
        // a bound socket that never answers
        let silent = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = silent.local_addr().unwrap().port();

        assert!(probe("127.0.0.1", port).await.is_err());
    }
}
