//! TCP transport implementation
//!
//! Speaks just enough telnet for an embedded busybox telnetd: inbound IAC
//! sequences are stripped from the data stream and every option the server
//! proposes is refused, leaving a plain byte channel for the session client.

use async_trait::async_trait;
use bytes::{BufMut, BytesMut};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{timeout, Instant};
use tracing::{debug, trace};

use crate::transport::{Match, Transport};
use crate::TransportError;

const IAC: u8 = 255;
const DONT: u8 = 254;
const DO: u8 = 253;
const WONT: u8 = 252;
const WILL: u8 = 251;
const SB: u8 = 250;
const SE: u8 = 240;

/// Option parser state, carried across reads since IAC sequences can be
/// split between TCP segments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NvtState {
    /// Plain data
    Data,
    /// Seen an IAC byte
    Iac,
    /// Seen IAC + negotiation verb; waiting for the option byte. The field
    /// is the refusal verb to answer with.
    Refuse(u8),
    /// Inside a subnegotiation block
    Sub,
    /// Inside a subnegotiation block, seen an IAC
    SubIac,
}

/// Plain TCP transport to a device's maintenance shell
#[derive(Debug)]
pub struct TcpTransport {
    stream: TcpStream,
    /// Decoded data not yet consumed by a read
    buf: BytesMut,
    state: NvtState,
}

impl TcpTransport {
    /// Connect to `host:port`, bounded by `connect_timeout`.
    pub async fn connect(
        host: &str,
        port: u16,
        connect_timeout: Duration,
    ) -> Result<Self, TransportError> {
        debug!("connecting to {}:{}", host, port);
        let stream = timeout(connect_timeout, TcpStream::connect((host, port)))
            .await
            .map_err(|_| TransportError::Timeout)?
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        Ok(Self {
            stream,
            buf: BytesMut::with_capacity(4096),
            state: NvtState::Data,
        })
    }

    /// Run `raw` through the option parser, appending data bytes to the scan
    /// buffer and answering negotiation with refusals.
    async fn feed(&mut self, raw: &[u8]) -> Result<(), TransportError> {
        let mut replies = Vec::new();
        for &byte in raw {
            match self.state {
                NvtState::Data => {
                    if byte == IAC {
                        self.state = NvtState::Iac;
                    } else {
                        self.buf.put_u8(byte);
                    }
                }
                NvtState::Iac => match byte {
                    // escaped literal 0xFF
                    IAC => {
                        self.buf.put_u8(IAC);
                        self.state = NvtState::Data;
                    }
                    DO | DONT => self.state = NvtState::Refuse(WONT),
                    WILL | WONT => self.state = NvtState::Refuse(DONT),
                    SB => self.state = NvtState::Sub,
                    // NOP, GA and friends carry no option byte
                    _ => self.state = NvtState::Data,
                },
                NvtState::Refuse(verb) => {
                    trace!("refusing telnet option {}", byte);
                    replies.extend_from_slice(&[IAC, verb, byte]);
                    self.state = NvtState::Data;
                }
                NvtState::Sub => {
                    if byte == IAC {
                        self.state = NvtState::SubIac;
                    }
                }
                NvtState::SubIac => {
                    self.state = if byte == SE {
                        NvtState::Data
                    } else {
                        NvtState::Sub
                    };
                }
            }
        }
        if !replies.is_empty() {
            self.stream.write_all(&replies).await?;
        }
        Ok(())
    }

    /// Find the earliest occurrence of any pattern in the scan buffer and
    /// consume through it.
    fn scan(&mut self, patterns: &[&[u8]]) -> Option<Match> {
        let mut best: Option<(usize, usize, usize)> = None;
        for (index, pattern) in patterns.iter().enumerate() {
            if pattern.is_empty() {
                continue;
            }
            if let Some(pos) = find_subsequence(&self.buf, pattern) {
                let candidate = (pos, pos + pattern.len(), index);
                if best.map_or(true, |b| candidate.0 < b.0) {
                    best = Some(candidate);
                }
            }
        }
        let (_, end, pattern) = best?;
        let data = self.buf.split_to(end).to_vec();
        Some(Match { pattern, data })
    }
}

fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

#[async_trait]
impl Transport for TcpTransport {
    async fn write(&mut self, data: &[u8]) -> Result<(), TransportError> {
        if data.contains(&IAC) {
            let mut escaped = Vec::with_capacity(data.len() + 4);
            for &byte in data {
                escaped.push(byte);
                if byte == IAC {
                    escaped.push(IAC);
                }
            }
            self.stream.write_all(&escaped).await?;
        } else {
            self.stream.write_all(data).await?;
        }
        Ok(())
    }

    async fn expect(
        &mut self,
        patterns: &[&[u8]],
        read_timeout: Duration,
    ) -> Result<Match, TransportError> {
        let deadline = Instant::now() + read_timeout;
        loop {
            if let Some(found) = self.scan(patterns) {
                return Ok(found);
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(TransportError::Timeout);
            }
            let mut chunk = [0u8; 4096];
            let n = timeout(remaining, self.stream.read(&mut chunk))
                .await
                .map_err(|_| TransportError::Timeout)??;
            if n == 0 {
                return Err(TransportError::Closed);
            }
            self.feed(&chunk[..n]).await?;
        }
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        debug!("closing transport");
        self.stream.shutdown().await?;
        Ok(())
    }
}
