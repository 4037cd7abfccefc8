//! IPv4 header handling.
//!
//! Only the base 20-byte header is ever written; received headers may carry
//! options and are honoured through the IHL field when locating the payload.

use core::fmt;
use core::str::FromStr;

use super::checksum::{fold_checksum, sum_words};
use super::ethernet::{self, ETHER_TYPE_IPV4};
use super::Interface;

/// Length of an IPv4 header without options.
pub const HEADER_LEN: usize = 20;
/// TTL used for every datagram this node originates.
pub const DEFAULT_TTL: u8 = 128;

const IPV4_VERSION: u8 = 4;

/// IP protocol numbers used by the stack.
pub mod protocol {
    /// Internet Control Message Protocol.
    pub const ICMP: u8 = 1;
    /// Transmission Control Protocol.
    pub const TCP: u8 = 6;
}

/// A 32-bit IPv4 address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Ipv4Address(pub [u8; 4]);

impl Ipv4Address {
    /// 255.255.255.255
    pub const BROADCAST: Ipv4Address = Ipv4Address([0xFF; 4]);
    /// 0.0.0.0
    pub const UNSPECIFIED: Ipv4Address = Ipv4Address([0; 4]);

    /// Create an address from its four octets.
    pub const fn new(a: u8, b: u8, c: u8, d: u8) -> Self {
        Ipv4Address([a, b, c, d])
    }

    /// Raw octets.
    pub const fn octets(&self) -> [u8; 4] {
        self.0
    }

    /// Address packed into a `u32`, first octet most significant.
    pub const fn to_bits(&self) -> u32 {
        u32::from_be_bytes(self.0)
    }

    /// Inverse of [`to_bits`](Self::to_bits).
    pub const fn from_bits(bits: u32) -> Self {
        Ipv4Address(bits.to_be_bytes())
    }

    /// Whether this is 0.0.0.0.
    pub fn is_unspecified(&self) -> bool {
        *self == Self::UNSPECIFIED
    }
}

impl fmt::Display for Ipv4Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let o = &self.0;
        write!(f, "{}.{}.{}.{}", o[0], o[1], o[2], o[3])
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Ipv4Address {
    fn format(&self, f: defmt::Formatter) {
        let o = &self.0;
        defmt::write!(f, "{}.{}.{}.{}", o[0], o[1], o[2], o[3])
    }
}

/// Error returned when a dotted-quad string does not parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressParseError;

impl FromStr for Ipv4Address {
    type Err = AddressParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut octets = [0u8; 4];
        let mut parts = s.split('.');
        for octet in octets.iter_mut() {
            let part = parts.next().ok_or(AddressParseError)?;
            if part.is_empty() || part.len() > 3 || !part.bytes().all(|b| b.is_ascii_digit()) {
                return Err(AddressParseError);
            }
            *octet = part.parse().map_err(|_| AddressParseError)?;
        }
        if parts.next().is_some() {
            return Err(AddressParseError);
        }
        Ok(Ipv4Address(octets))
    }
}

/// IPv4 packet header structure
///
/// Represents the standard 20-byte IPv4 header as defined in RFC 791
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ipv4Header {
    /// Version (high nibble) and header length in 32-bit words (low nibble).
    pub version_ihl: u8,
    /// Type of service.
    pub tos: u8,
    /// Header plus payload length in bytes.
    pub total_len: u16,
    /// Identification.
    pub id: u16,
    /// Flags and fragment offset.
    pub flags_frag_offset: u16,
    /// Time to live.
    pub ttl: u8,
    /// Payload protocol number.
    pub protocol: u8,
    /// Header checksum as carried on the wire.
    pub checksum: u16,
    /// Source address.
    pub source: Ipv4Address,
    /// Destination address.
    pub destination: Ipv4Address,
}

impl Ipv4Header {
    /// Build an option-less header for a payload of `payload_len` bytes.
    ///
    /// The checksum is left at zero; [`compute_header_checksum`] fills it in
    /// once the header has been written out.
    pub fn new(
        protocol: u8,
        source: Ipv4Address,
        destination: Ipv4Address,
        payload_len: u16,
    ) -> Self {
        Ipv4Header {
            version_ihl: (IPV4_VERSION << 4) | (HEADER_LEN / 4) as u8,
            tos: 0,
            total_len: HEADER_LEN as u16 + payload_len,
            id: 0,
            flags_frag_offset: 0,
            ttl: DEFAULT_TTL,
            protocol,
            checksum: 0,
            source,
            destination,
        }
    }

    /// Parse IPv4 header from byte slice
    ///
    /// Returns None if the data is too short or if the version field is not 4
    pub fn parse(data: &[u8]) -> Option<Self> {
        if data.len() < HEADER_LEN {
            return None;
        }
        if data[0] >> 4 != IPV4_VERSION {
            return None;
        }
        Some(Ipv4Header {
            version_ihl: data[0],
            tos: data[1],
            total_len: u16::from_be_bytes([data[2], data[3]]),
            id: u16::from_be_bytes([data[4], data[5]]),
            flags_frag_offset: u16::from_be_bytes([data[6], data[7]]),
            ttl: data[8],
            protocol: data[9],
            checksum: u16::from_be_bytes([data[10], data[11]]),
            source: Ipv4Address([data[12], data[13], data[14], data[15]]),
            destination: Ipv4Address([data[16], data[17], data[18], data[19]]),
        })
    }

    /// Serialize the base header into the first [`HEADER_LEN`] bytes of `out`.
    pub fn write(&self, out: &mut [u8]) -> bool {
        if out.len() < HEADER_LEN {
            return false;
        }
        out[0] = self.version_ihl;
        out[1] = self.tos;
        out[2..4].copy_from_slice(&self.total_len.to_be_bytes());
        out[4..6].copy_from_slice(&self.id.to_be_bytes());
        out[6..8].copy_from_slice(&self.flags_frag_offset.to_be_bytes());
        out[8] = self.ttl;
        out[9] = self.protocol;
        out[10..12].copy_from_slice(&self.checksum.to_be_bytes());
        out[12..16].copy_from_slice(&self.source.0);
        out[16..20].copy_from_slice(&self.destination.0);
        true
    }

    /// Header length in bytes, including options.
    pub fn header_len(&self) -> usize {
        ((self.version_ihl & 0x0F) as usize) * 4
    }

    /// Length of the payload following the header.
    pub fn payload_len(&self) -> usize {
        (self.total_len as usize).saturating_sub(self.header_len())
    }
}

/// Recompute the header checksum of the IPv4 header at the start of `header`.
///
/// The header length is taken from the IHL nibble. Does nothing if the slice
/// is shorter than that length.
pub fn compute_header_checksum(header: &mut [u8]) {
    let Some(&first) = header.first() else {
        return;
    };
    let len = ((first & 0x0F) as usize) * 4;
    if len < HEADER_LEN || header.len() < len {
        return;
    }
    header[10] = 0;
    header[11] = 0;
    let mut acc = 0;
    sum_words(&header[..len], &mut acc);
    let check = fold_checksum(acc);
    header[10..12].copy_from_slice(&check.to_be_bytes());
}

/// Borrow the header and payload of the IPv4 datagram carried by `frame`.
///
/// Bounds are checked against both the IHL and the total length field, so
/// Ethernet padding is excluded from the returned payload.
pub(crate) fn datagram(frame: &[u8]) -> Option<(Ipv4Header, &[u8], &[u8])> {
    let packet = ethernet::payload(frame);
    let header = Ipv4Header::parse(packet)?;
    let header_len = header.header_len();
    let total_len = header.total_len as usize;
    if header_len < HEADER_LEN || total_len < header_len || packet.len() < total_len {
        return None;
    }
    Some((
        header,
        &packet[..header_len],
        &packet[header_len..total_len],
    ))
}

/// Whether `frame` carries an IPv4 datagram with a valid header checksum.
pub fn is_ipv4(frame: &[u8]) -> bool {
    if ethernet::ether_type(frame) != Some(ETHER_TYPE_IPV4) {
        return false;
    }
    match datagram(frame) {
        Some((_, header, _)) => {
            let mut acc = 0;
            sum_words(header, &mut acc);
            fold_checksum(acc) == 0
        }
        None => false,
    }
}

/// Whether the datagram in `frame` is addressed to `ip`.
///
/// `frame` must already have passed [`is_ipv4`].
pub fn is_unicast_to(frame: &[u8], ip: Ipv4Address) -> bool {
    Ipv4Header::parse(ethernet::payload(frame))
        .map(|h| h.destination == ip)
        .unwrap_or(false)
}

/// Whether the datagram in `frame` is a limited or subnet-directed broadcast
/// on `interface`'s network.
pub fn is_broadcast(frame: &[u8], interface: &Interface) -> bool {
    let Some(header) = Ipv4Header::parse(ethernet::payload(frame)) else {
        return false;
    };
    if header.destination == Ipv4Address::BROADCAST {
        return true;
    }
    let mask = interface.subnet_mask.to_bits();
    let directed = (interface.ip.to_bits() & mask) | !mask;
    mask != u32::MAX && header.destination.to_bits() == directed
}

/// Swap the source and destination addresses of the IPv4 header at the
/// start of `header` in place.
pub(crate) fn swap_addresses(header: &mut [u8]) {
    if header.len() < HEADER_LEN {
        return;
    }
    for i in 12..16 {
        header.swap(i, i + 4);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::ethernet::{EthernetHeader, MacAddress};

    fn frame_with(header: Ipv4Header, payload: &[u8]) -> [u8; 64] {
        let mut frame = [0u8; 64];
        EthernetHeader {
            destination: MacAddress::BROADCAST,
            source: MacAddress::new(2, 0, 0, 0, 0, 1),
            ether_type: ETHER_TYPE_IPV4,
        }
        .write(&mut frame);
        header.write(&mut frame[14..]);
        compute_header_checksum(&mut frame[14..]);
        frame[34..34 + payload.len()].copy_from_slice(payload);
        frame
    }

    #[test]
    fn valid_header_is_ipv4() {
        let header = Ipv4Header::new(
            protocol::TCP,
            Ipv4Address::new(192, 168, 2, 1),
            Ipv4Address::new(192, 168, 2, 101),
            4,
        );
        let frame = frame_with(header, b"abcd");
        assert!(is_ipv4(&frame));
        assert!(is_unicast_to(&frame, Ipv4Address::new(192, 168, 2, 101)));
        assert!(!is_unicast_to(&frame, Ipv4Address::new(192, 168, 2, 102)));
    }

    #[test]
    fn corrupted_header_is_not_ipv4() {
        let header = Ipv4Header::new(
            protocol::TCP,
            Ipv4Address::new(10, 0, 0, 1),
            Ipv4Address::new(10, 0, 0, 2),
            0,
        );
        let mut frame = frame_with(header, &[]);
        frame[22] ^= 0x01;
        assert!(!is_ipv4(&frame));
    }

    #[test]
    fn total_length_beyond_frame_is_rejected() {
        let mut header = Ipv4Header::new(
            protocol::TCP,
            Ipv4Address::new(10, 0, 0, 1),
            Ipv4Address::new(10, 0, 0, 2),
            0,
        );
        header.total_len = 400;
        let frame = frame_with(header, &[]);
        assert!(!is_ipv4(&frame));
    }

    #[test]
    fn broadcast_detection_uses_mask() {
        let interface = Interface {
            mac: MacAddress::new(2, 3, 4, 5, 6, 101),
            ip: Ipv4Address::new(192, 168, 2, 101),
            subnet_mask: Ipv4Address::new(255, 255, 255, 0),
            gateway: Ipv4Address::new(192, 168, 2, 1),
        };
        let directed = Ipv4Header::new(1, Ipv4Address::new(192, 168, 2, 7), Ipv4Address::new(192, 168, 2, 255), 0);
        let limited = Ipv4Header::new(1, Ipv4Address::new(192, 168, 2, 7), Ipv4Address::BROADCAST, 0);
        let unicast = Ipv4Header::new(1, Ipv4Address::new(192, 168, 2, 7), interface.ip, 0);
        assert!(is_broadcast(&frame_with(directed, &[]), &interface));
        assert!(is_broadcast(&frame_with(limited, &[]), &interface));
        assert!(!is_broadcast(&frame_with(unicast, &[]), &interface));
    }

    #[test]
    fn dotted_quad_parsing() {
        assert_eq!("192.168.1.1".parse(), Ok(Ipv4Address::new(192, 168, 1, 1)));
        assert!("192.168.1".parse::<Ipv4Address>().is_err());
        assert!("192.168.1.256".parse::<Ipv4Address>().is_err());
        assert!("1.2.3.4.5".parse::<Ipv4Address>().is_err());
        assert!("1.2.+3.4".parse::<Ipv4Address>().is_err());
    }

    #[test]
    fn bits_round_trip() {
        let ip = Ipv4Address::new(192, 168, 2, 1);
        assert_eq!(ip.to_bits(), 0xC0A8_0201);
        assert_eq!(Ipv4Address::from_bits(0xC0A8_0201), ip);
    }
}
