//! Ethernet II framing.

use core::fmt;

/// Length of an Ethernet II header without VLAN tag.
pub const HEADER_LEN: usize = 14;

/// EtherType for IPv4.
pub const ETHER_TYPE_IPV4: u16 = 0x0800;
/// EtherType for ARP.
pub const ETHER_TYPE_ARP: u16 = 0x0806;

/// A 48-bit hardware address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MacAddress(pub [u8; 6]);

impl MacAddress {
    /// The all-ones broadcast address.
    pub const BROADCAST: MacAddress = MacAddress([0xFF; 6]);
    /// The all-zero address, used before a peer has been resolved.
    pub const UNSPECIFIED: MacAddress = MacAddress([0; 6]);

    /// Create an address from its six octets.
    pub const fn new(a: u8, b: u8, c: u8, d: u8, e: u8, f: u8) -> Self {
        MacAddress([a, b, c, d, e, f])
    }

    /// Raw octets.
    pub const fn octets(&self) -> [u8; 6] {
        self.0
    }

    /// Whether every octet is 0xFF.
    pub fn is_broadcast(&self) -> bool {
        *self == Self::BROADCAST
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let o = &self.0;
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            o[0], o[1], o[2], o[3], o[4], o[5]
        )
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for MacAddress {
    fn format(&self, f: defmt::Formatter) {
        let o = &self.0;
        defmt::write!(
            f,
            "{=u8:02X}:{=u8:02X}:{=u8:02X}:{=u8:02X}:{=u8:02X}:{=u8:02X}",
            o[0],
            o[1],
            o[2],
            o[3],
            o[4],
            o[5]
        )
    }
}

/// The fixed 14-byte Ethernet II header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EthernetHeader {
    /// Destination hardware address.
    pub destination: MacAddress,
    /// Source hardware address.
    pub source: MacAddress,
    /// EtherType of the payload, host order.
    pub ether_type: u16,
}

impl EthernetHeader {
    /// Parse the header at the start of `frame`.
    ///
    /// Returns `None` if the frame is shorter than [`HEADER_LEN`].
    pub fn parse(frame: &[u8]) -> Option<Self> {
        if frame.len() < HEADER_LEN {
            return None;
        }
        let mut destination = [0u8; 6];
        let mut source = [0u8; 6];
        destination.copy_from_slice(&frame[0..6]);
        source.copy_from_slice(&frame[6..12]);
        Some(EthernetHeader {
            destination: MacAddress(destination),
            source: MacAddress(source),
            ether_type: u16::from_be_bytes([frame[12], frame[13]]),
        })
    }

    /// Write the header into the first [`HEADER_LEN`] bytes of `frame`.
    ///
    /// Returns `false` without touching the buffer if it is too short.
    pub fn write(&self, frame: &mut [u8]) -> bool {
        if frame.len() < HEADER_LEN {
            return false;
        }
        frame[0..6].copy_from_slice(&self.destination.0);
        frame[6..12].copy_from_slice(&self.source.0);
        frame[12..14].copy_from_slice(&self.ether_type.to_be_bytes());
        true
    }
}

/// EtherType of `frame`, or `None` for a runt frame.
pub fn ether_type(frame: &[u8]) -> Option<u16> {
    if frame.len() < HEADER_LEN {
        return None;
    }
    Some(u16::from_be_bytes([frame[12], frame[13]]))
}

/// Exchange the destination and source addresses of `frame` in place.
pub(crate) fn swap_addresses(frame: &mut [u8]) {
    if frame.len() < HEADER_LEN {
        return;
    }
    for i in 0..6 {
        frame.swap(i, i + 6);
    }
}

/// Payload of `frame` following the Ethernet header.
pub fn payload(frame: &[u8]) -> &[u8] {
    frame.get(HEADER_LEN..).unwrap_or(&[])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_round_trips_network_order() {
        let header = EthernetHeader {
            destination: MacAddress::BROADCAST,
            source: MacAddress::new(2, 3, 4, 5, 6, 101),
            ether_type: ETHER_TYPE_ARP,
        };
        let mut frame = [0u8; HEADER_LEN];
        assert!(header.write(&mut frame));
        assert_eq!(&frame[12..14], &[0x08, 0x06]);
        assert_eq!(EthernetHeader::parse(&frame), Some(header));
    }

    #[test]
    fn runt_frames_are_rejected() {
        assert_eq!(EthernetHeader::parse(&[0u8; 13]), None);
        assert_eq!(ether_type(&[0u8; 4]), None);
        assert!(!EthernetHeader::parse(&[0u8; 14]).unwrap().write(&mut [0u8; 3]));
    }

    #[test]
    fn swap_exchanges_hardware_addresses() {
        let mut frame = [0u8; HEADER_LEN];
        frame[0..6].copy_from_slice(&[1; 6]);
        frame[6..12].copy_from_slice(&[2; 6]);
        swap_addresses(&mut frame);
        assert_eq!(&frame[0..6], &[2; 6]);
        assert_eq!(&frame[6..12], &[1; 6]);
    }

    #[test]
    fn display_uses_colon_hex() {
        let mut text: heapless::String<32> = heapless::String::new();
        core::fmt::write(&mut text, format_args!("{}", MacAddress::new(2, 3, 4, 5, 6, 101)))
            .unwrap();
        assert_eq!(text.as_str(), "02:03:04:05:06:65");
    }
}
