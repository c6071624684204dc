// Copyright 2025 JiangLong.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! ICMP echo transport.
//!
//! Uses unprivileged datagram ICMP sockets (`net.ipv4.ping_group_range` must
//! include the process group). The kernel rewrites the echo identifier on
//! these sockets, so replies are matched by sequence number only.

use crate::infrastructure::constants::PROBE_PAYLOAD;
use crate::shared::error::{FleetError, Result};
use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use std::io::{ErrorKind, Read};
use std::net::{IpAddr, SocketAddr};
use std::time::{Duration, Instant};

const ECHO_REQUEST_V4: u8 = 8;
const ECHO_REPLY_V4: u8 = 0;
const ECHO_REQUEST_V6: u8 = 128;
const ECHO_REPLY_V6: u8 = 129;

/// Sends a single echo request and waits for its reply.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait EchoProbe: Send + Sync {
    /// Succeeds once a reply carrying `sequence` arrives within `timeout`.
    async fn echo(&self, address: IpAddr, sequence: u16, timeout: Duration) -> Result<()>;
}

pub struct IcmpEcho {
    identifier: u16,
}

impl IcmpEcho {
    pub fn new() -> Self {
        Self {
            identifier: (std::process::id() & 0xffff) as u16,
        }
    }
}

impl Default for IcmpEcho {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EchoProbe for IcmpEcho {
    async fn echo(&self, address: IpAddr, sequence: u16, timeout: Duration) -> Result<()> {
        let identifier = self.identifier;
        tokio::task::spawn_blocking(move || blocking_echo(address, identifier, sequence, timeout))
            .await
            .map_err(|e| FleetError::invalid_state(format!("echo task failed: {}", e)))?
    }
}

fn blocking_echo(address: IpAddr, identifier: u16, sequence: u16, timeout: Duration) -> Result<()> {
    let (domain, protocol, request, reply) = match address {
        IpAddr::V4(_) => (Domain::IPV4, Protocol::ICMPV4, ECHO_REQUEST_V4, ECHO_REPLY_V4),
        IpAddr::V6(_) => (Domain::IPV6, Protocol::ICMPV6, ECHO_REQUEST_V6, ECHO_REPLY_V6),
    };

    let socket = Socket::new(domain, Type::DGRAM, Some(protocol))?;
    let packet = encode_echo_request(request, identifier, sequence, PROBE_PAYLOAD);
    socket.send_to(&packet, &SockAddr::from(SocketAddr::new(address, 0)))?;

    let timed_out = || FleetError::Timeout {
        operation: format!("echo {} seq {}", address, sequence),
        timeout,
    };

    let deadline = Instant::now() + timeout;
    let mut buf = [0u8; 1500];
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(timed_out());
        }
        socket.set_read_timeout(Some(remaining))?;

        match (&socket).read(&mut buf) {
            Ok(n) => {
                if reply_sequence(&buf[..n], reply) == Some(sequence) {
                    return Ok(());
                }
            }
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                return Err(timed_out());
            }
            Err(e) => return Err(e.into()),
        }
    }
}

/// RFC 1071 ones' complement checksum.
pub fn internet_checksum(data: &[u8]) -> u16 {
    let mut sum: u32 = data
        .chunks(2)
        .map(|chunk| match chunk {
            [hi, lo] => u16::from_be_bytes([*hi, *lo]) as u32,
            [hi] => u16::from_be_bytes([*hi, 0]) as u32,
            _ => 0,
        })
        .sum();
    while sum >> 16 != 0 {
        sum = (sum & 0xffff) + (sum >> 16);
    }
    !(sum as u16)
}

pub fn encode_echo_request(kind: u8, identifier: u16, sequence: u16, payload: &[u8]) -> Vec<u8> {
    let mut packet = Vec::with_capacity(8 + payload.len());
    packet.extend_from_slice(&[kind, 0, 0, 0]);
    packet.extend_from_slice(&identifier.to_be_bytes());
    packet.extend_from_slice(&sequence.to_be_bytes());
    packet.extend_from_slice(payload);

    let checksum = internet_checksum(&packet);
    packet[2..4].copy_from_slice(&checksum.to_be_bytes());
    packet
}

/// Sequence number of an echo reply of type `reply_kind`, skipping an IPv4
/// header when the socket delivers one.
pub fn reply_sequence(packet: &[u8], reply_kind: u8) -> Option<u16> {
    let icmp = match packet.first() {
        Some(first) if reply_kind == ECHO_REPLY_V4 && first >> 4 == 4 => {
            let header_len = ((first & 0x0f) as usize) * 4;
            packet.get(header_len..)?
        }
        _ => packet,
    };

    if icmp.len() < 8 || icmp[0] != reply_kind {
        return None;
    }
    Some(u16::from_be_bytes([icmp[6], icmp[7]]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checksum_verifies_to_zero() {
        let packet = encode_echo_request(ECHO_REQUEST_V4, 0x1234, 7, b"abc");
        assert_eq!(internet_checksum(&packet), 0);
        assert_eq!(&packet[4..6], &0x1234u16.to_be_bytes());
        assert_eq!(&packet[6..8], &7u16.to_be_bytes());
    }

    #[test]
    fn test_reply_sequence_without_ip_header() {
        let mut reply = encode_echo_request(ECHO_REPLY_V4, 1, 42, b"x");
        assert_eq!(reply_sequence(&reply, ECHO_REPLY_V4), Some(42));

        reply[0] = ECHO_REQUEST_V4;
        assert_eq!(reply_sequence(&reply, ECHO_REPLY_V4), None);
    }

    #[test]
    fn test_reply_sequence_with_ip_header() {
        let mut packet = vec![0x45u8];
        packet.extend_from_slice(&[0u8; 19]);
        packet.extend(encode_echo_request(ECHO_REPLY_V4, 99, 3, b""));
        assert_eq!(reply_sequence(&packet, ECHO_REPLY_V4), Some(3));
    }

    #[test]
    fn test_reply_sequence_ignores_identifier() {
        let a = encode_echo_request(ECHO_REPLY_V6, 1, 5, b"");
        let b = encode_echo_request(ECHO_REPLY_V6, 2, 5, b"");
        assert_eq!(reply_sequence(&a, ECHO_REPLY_V6), reply_sequence(&b, ECHO_REPLY_V6));
    }

    #[test]
    fn test_truncated_reply() {
        assert_eq!(reply_sequence(&[ECHO_REPLY_V4, 0, 0], ECHO_REPLY_V4), None);
        assert_eq!(reply_sequence(&[], ECHO_REPLY_V4), None);
    }

    #[tokio::test]
    #[ignore] // Requires ICMP datagram sockets (net.ipv4.ping_group_range)
    async fn test_echo_loopback() {
        let echo = IcmpEcho::new();
        echo.echo("127.0.0.1".parse().unwrap(), 1, Duration::from_secs(1))
            .await
            .unwrap();
    }
}
