//! TCP (Transmission Control Protocol) segments.
//!
//! This module builds and validates single segments. Sequencing lives in
//! [`connection`]; every function here takes sequence and acknowledgment
//! numbers from its caller.

pub mod connection;

use super::checksum::{fold_checksum, sum_words};
use super::error::Error;
use super::ethernet::{self, ETHER_TYPE_IPV4, EthernetHeader, MacAddress};
use super::ipv4::{self, Ipv4Address, Ipv4Header, protocol};

/// Length of a TCP header without options.
pub const HEADER_LEN: usize = 20;
/// Largest option block expressible through the data offset nibble.
pub const MAX_OPTIONS_LEN: usize = 40;
/// Receive window advertised on every segment.
pub const WINDOW_SIZE: u16 = 1500;

/// Maximum segment size option advertising 1460 bytes, sent with SYN.
pub const MSS_OPTION: [u8; 4] = [0x02, 0x04, 0x05, 0xB4];

/// TCP control flags (low byte of the offset/flags word).
pub mod flags {
    /// No more data from sender.
    pub const FIN: u8 = 0x01;
    /// Synchronize sequence numbers.
    pub const SYN: u8 = 0x02;
    /// Reset the connection.
    pub const RST: u8 = 0x04;
    /// Push function.
    pub const PSH: u8 = 0x08;
    /// Acknowledgment field significant.
    pub const ACK: u8 = 0x10;
}

/// One endpoint of the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Socket {
    /// IPv4 address.
    pub ip: Ipv4Address,
    /// Hardware address.
    pub mac: MacAddress,
    /// TCP port.
    pub port: u16,
}

/// TCP packet header structure
///
/// Represents the standard 20-byte TCP header as defined in RFC 793
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TcpHeader {
    /// Source port.
    pub src_port: u16,
    /// Destination port.
    pub dst_port: u16,
    /// Sequence number of the first payload byte.
    pub seq_number: u32,
    /// Next sequence number expected from the other side.
    pub ack_number: u32,
    /// Data offset (4 bits) + Reserved (3 bits) + Flags (9 bits)
    pub data_offset_and_flags: u16,
    /// Receive window.
    pub window_size: u16,
    /// Checksum over pseudo-header, header and payload.
    pub checksum: u16,
    /// Urgent pointer (unused).
    pub urgent_ptr: u16,
}

impl TcpHeader {
    /// Parse TCP header from byte slice
    ///
    /// Returns None if the data is too short to contain a valid TCP header
    pub fn parse(data: &[u8]) -> Option<Self> {
        if data.len() < HEADER_LEN {
            return None;
        }
        Some(TcpHeader {
            src_port: u16::from_be_bytes([data[0], data[1]]),
            dst_port: u16::from_be_bytes([data[2], data[3]]),
            seq_number: u32::from_be_bytes([data[4], data[5], data[6], data[7]]),
            ack_number: u32::from_be_bytes([data[8], data[9], data[10], data[11]]),
            data_offset_and_flags: u16::from_be_bytes([data[12], data[13]]),
            window_size: u16::from_be_bytes([data[14], data[15]]),
            checksum: u16::from_be_bytes([data[16], data[17]]),
            urgent_ptr: u16::from_be_bytes([data[18], data[19]]),
        })
    }

    /// Serialize the base header into the first [`HEADER_LEN`] bytes of `out`.
    pub fn write(&self, out: &mut [u8]) -> bool {
        if out.len() < HEADER_LEN {
            return false;
        }
        out[0..2].copy_from_slice(&self.src_port.to_be_bytes());
        out[2..4].copy_from_slice(&self.dst_port.to_be_bytes());
        out[4..8].copy_from_slice(&self.seq_number.to_be_bytes());
        out[8..12].copy_from_slice(&self.ack_number.to_be_bytes());
        out[12..14].copy_from_slice(&self.data_offset_and_flags.to_be_bytes());
        out[14..16].copy_from_slice(&self.window_size.to_be_bytes());
        out[16..18].copy_from_slice(&self.checksum.to_be_bytes());
        out[18..20].copy_from_slice(&self.urgent_ptr.to_be_bytes());
        true
    }

    /// Control flags.
    pub fn flags(&self) -> u8 {
        (self.data_offset_and_flags & 0x00FF) as u8
    }

    /// Whether all bits of `mask` are set.
    pub fn has(&self, mask: u8) -> bool {
        self.flags() & mask == mask
    }

    /// Get the data offset (header length) in bytes
    pub fn data_offset(&self) -> usize {
        ((self.data_offset_and_flags >> 12) as usize) * 4
    }
}

/// A validated view of the TCP segment inside a received frame.
#[derive(Debug, Clone, Copy)]
pub struct TcpSegment<'a> {
    /// Enclosing IPv4 header.
    pub ip: Ipv4Header,
    /// TCP header.
    pub header: TcpHeader,
    /// Option bytes between the base header and the payload.
    pub options: &'a [u8],
    /// Segment payload, Ethernet padding excluded.
    pub payload: &'a [u8],
}

impl<'a> TcpSegment<'a> {
    /// Locate the TCP segment in `frame`.
    ///
    /// Only structure is checked here; use [`is_tcp`] for the checksum.
    pub fn parse(frame: &'a [u8]) -> Option<Self> {
        let (ip, _, segment) = ipv4::datagram(frame)?;
        if ip.protocol != protocol::TCP {
            return None;
        }
        let header = TcpHeader::parse(segment)?;
        let offset = header.data_offset();
        if offset < HEADER_LEN || segment.len() < offset {
            return None;
        }
        Some(TcpSegment {
            ip,
            header,
            options: &segment[HEADER_LEN..offset],
            payload: &segment[offset..],
        })
    }

    /// Number of sequence numbers this segment occupies.
    ///
    /// SYN and FIN each count as one, on top of the payload bytes.
    pub fn sequence_len(&self) -> u32 {
        let mut len = self.payload.len() as u32;
        if self.header.has(flags::SYN) {
            len += 1;
        }
        if self.header.has(flags::FIN) {
            len += 1;
        }
        len
    }
}

/// Sum of the 12-byte pseudo-header used by the TCP checksum.
fn pseudo_header_sum(source: Ipv4Address, destination: Ipv4Address, tcp_len: u16) -> u32 {
    let mut pseudo = [0u8; 12];
    pseudo[0..4].copy_from_slice(&source.0);
    pseudo[4..8].copy_from_slice(&destination.0);
    pseudo[8] = 0;
    pseudo[9] = protocol::TCP;
    pseudo[10..12].copy_from_slice(&tcp_len.to_be_bytes());
    let mut acc = 0;
    sum_words(&pseudo, &mut acc);
    acc
}

/// Whether `frame` carries a TCP segment whose checksum validates.
///
/// The sum runs over the pseudo-header (source IP, destination IP, zero,
/// protocol, TCP length) followed by header, options and payload; a segment
/// is valid iff the folded result is zero.
pub fn is_tcp(frame: &[u8]) -> bool {
    let Some((ip, _, segment)) = ipv4::datagram(frame) else {
        return false;
    };
    if ip.protocol != protocol::TCP || segment.len() < HEADER_LEN {
        return false;
    }
    let mut acc = pseudo_header_sum(ip.source, ip.destination, segment.len() as u16);
    sum_words(segment, &mut acc);
    fold_checksum(acc) == 0
}

/// Payload length of the TCP segment in `frame`: IP total length minus the
/// IP and TCP header lengths. Zero if `frame` holds no TCP segment.
pub fn payload_size(frame: &[u8]) -> usize {
    TcpSegment::parse(frame)
        .map(|s| s.payload.len())
        .unwrap_or(0)
}

/// Everything needed to put one segment on the wire.
#[derive(Debug, Clone, Copy)]
pub struct SegmentSpec<'a> {
    /// This node.
    pub local: &'a Socket,
    /// The peer.
    pub remote: &'a Socket,
    /// Control flags.
    pub flags: u8,
    /// Sequence number of the first payload byte.
    pub seq: u32,
    /// Acknowledgment number.
    pub ack: u32,
    /// Raw option bytes; padded with zeros to a multiple of four.
    pub options: &'a [u8],
}

/// Build a complete Ethernet/IPv4/TCP frame into `buf`.
///
/// Returns the frame length on success. The data offset is
/// `5 + padded_options / 4`, TTL is [`ipv4::DEFAULT_TTL`] and the window is
/// [`WINDOW_SIZE`]. Both checksums are filled in.
pub fn write_segment(buf: &mut [u8], spec: &SegmentSpec<'_>, payload: &[u8]) -> Result<usize, Error> {
    let options_len = spec.options.len().div_ceil(4) * 4;
    if options_len > MAX_OPTIONS_LEN {
        return Err(Error::BufferTooSmall);
    }
    let tcp_len = HEADER_LEN + options_len + payload.len();
    let ip_len = ipv4::HEADER_LEN + tcp_len;
    let frame_len = ethernet::HEADER_LEN + ip_len;
    if buf.len() < frame_len || ip_len > u16::MAX as usize {
        return Err(Error::BufferTooSmall);
    }

    EthernetHeader {
        destination: spec.remote.mac,
        source: spec.local.mac,
        ether_type: ETHER_TYPE_IPV4,
    }
    .write(buf);

    let ip_start = ethernet::HEADER_LEN;
    let tcp_start = ip_start + ipv4::HEADER_LEN;
    Ipv4Header::new(protocol::TCP, spec.local.ip, spec.remote.ip, tcp_len as u16)
        .write(&mut buf[ip_start..]);

    let data_offset = ((HEADER_LEN + options_len) / 4) as u16;
    TcpHeader {
        src_port: spec.local.port,
        dst_port: spec.remote.port,
        seq_number: spec.seq,
        ack_number: spec.ack,
        data_offset_and_flags: (data_offset << 12) | spec.flags as u16,
        window_size: WINDOW_SIZE,
        checksum: 0,
        urgent_ptr: 0,
    }
    .write(&mut buf[tcp_start..]);

    let options_start = tcp_start + HEADER_LEN;
    let payload_start = options_start + options_len;
    buf[options_start..options_start + spec.options.len()].copy_from_slice(spec.options);
    buf[options_start + spec.options.len()..payload_start].fill(0);
    buf[payload_start..frame_len].copy_from_slice(payload);

    let mut acc = pseudo_header_sum(spec.local.ip, spec.remote.ip, tcp_len as u16);
    sum_words(&buf[tcp_start..frame_len], &mut acc);
    let check = fold_checksum(acc);
    buf[tcp_start + 16..tcp_start + 18].copy_from_slice(&check.to_be_bytes());

    ipv4::compute_header_checksum(&mut buf[ip_start..tcp_start]);
    Ok(frame_len)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sockets() -> (Socket, Socket) {
        (
            Socket {
                ip: Ipv4Address::new(192, 168, 2, 101),
                mac: MacAddress::new(2, 3, 4, 5, 6, 101),
                port: 40_000,
            },
            Socket {
                ip: Ipv4Address::new(192, 168, 2, 1),
                mac: MacAddress::new(0xAA, 0xBB, 0xCC, 0, 0, 1),
                port: 1883,
            },
        )
    }

    #[test]
    fn syn_with_mss_validates() {
        let (local, remote) = sockets();
        let mut buf = [0u8; 128];
        let spec = SegmentSpec {
            local: &local,
            remote: &remote,
            flags: flags::SYN,
            seq: 200,
            ack: 0,
            options: &MSS_OPTION,
        };
        let len = write_segment(&mut buf, &spec, &[]).unwrap();
        assert_eq!(len, 14 + 20 + 24);
        assert!(ipv4::is_ipv4(&buf[..len]));
        assert!(is_tcp(&buf[..len]));

        let segment = TcpSegment::parse(&buf[..len]).unwrap();
        assert_eq!(segment.header.data_offset(), 24);
        assert!(segment.header.has(flags::SYN));
        assert!(!segment.header.has(flags::ACK));
        assert_eq!(segment.options, &MSS_OPTION);
        assert_eq!(segment.header.seq_number, 200);
        assert_eq!(segment.sequence_len(), 1);
        assert_eq!(payload_size(&buf[..len]), 0);
    }

    #[test]
    fn payload_is_copied_and_counted() {
        let (local, remote) = sockets();
        let mut buf = [0u8; 128];
        let spec = SegmentSpec {
            local: &local,
            remote: &remote,
            flags: flags::PSH | flags::ACK,
            seq: 1,
            ack: 2,
            options: &[],
        };
        let len = write_segment(&mut buf, &spec, b"hello").unwrap();
        assert!(is_tcp(&buf[..len]));
        assert_eq!(payload_size(&buf[..len]), 5);
        assert_eq!(TcpSegment::parse(&buf[..len]).unwrap().payload, b"hello");
    }

    #[test]
    fn odd_options_are_padded() {
        let (local, remote) = sockets();
        let mut buf = [0u8; 128];
        let spec = SegmentSpec {
            local: &local,
            remote: &remote,
            flags: flags::SYN,
            seq: 0,
            ack: 0,
            options: &[0x02, 0x04, 0x05, 0xB4, 0x00],
        };
        let len = write_segment(&mut buf, &spec, &[]).unwrap();
        let segment = TcpSegment::parse(&buf[..len]).unwrap();
        assert_eq!(segment.header.data_offset(), 28);
        assert_eq!(segment.options, &[0x02, 0x04, 0x05, 0xB4, 0, 0, 0, 0]);
        assert!(is_tcp(&buf[..len]));
    }

    #[test]
    fn corrupted_segment_fails_checksum() {
        let (local, remote) = sockets();
        let mut buf = [0u8; 128];
        let spec = SegmentSpec {
            local: &local,
            remote: &remote,
            flags: flags::ACK,
            seq: 10,
            ack: 20,
            options: &[],
        };
        let len = write_segment(&mut buf, &spec, b"xyz").unwrap();
        buf[len - 1] ^= 0x40;
        assert!(!is_tcp(&buf[..len]));
    }

    #[test]
    fn small_buffer_is_an_error() {
        let (local, remote) = sockets();
        let spec = SegmentSpec {
            local: &local,
            remote: &remote,
            flags: flags::ACK,
            seq: 0,
            ack: 0,
            options: &[],
        };
        assert_eq!(write_segment(&mut [0u8; 40], &spec, &[]), Err(Error::BufferTooSmall));
    }
}
