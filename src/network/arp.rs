//! Address Resolution Protocol (RFC 826) for Ethernet/IPv4.

use super::ethernet::{self, ETHER_TYPE_ARP, ETHER_TYPE_IPV4, EthernetHeader, MacAddress};
use super::ipv4::Ipv4Address;
use super::Interface;

/// Length of an Ethernet/IPv4 ARP packet.
pub const PACKET_LEN: usize = 28;
/// Length of a complete ARP frame, Ethernet header included.
pub const FRAME_LEN: usize = ethernet::HEADER_LEN + PACKET_LEN;

const HARDWARE_TYPE_ETHERNET: u16 = 1;

/// ARP operation codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Who-has.
    Request = 1,
    /// Is-at.
    Reply = 2,
}

/// An Ethernet/IPv4 ARP packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArpPacket {
    /// Request or reply.
    pub operation: Operation,
    /// Sender hardware address.
    pub sender_mac: MacAddress,
    /// Sender protocol address.
    pub sender_ip: Ipv4Address,
    /// Target hardware address.
    pub target_mac: MacAddress,
    /// Target protocol address.
    pub target_ip: Ipv4Address,
}

impl ArpPacket {
    /// Parse the ARP packet carried by an Ethernet frame.
    ///
    /// Only Ethernet/IPv4 packets with a known operation are accepted.
    pub fn parse(frame: &[u8]) -> Option<Self> {
        if ethernet::ether_type(frame) != Some(ETHER_TYPE_ARP) {
            return None;
        }
        let arp = ethernet::payload(frame);
        if arp.len() < PACKET_LEN {
            return None;
        }
        if u16::from_be_bytes([arp[0], arp[1]]) != HARDWARE_TYPE_ETHERNET
            || u16::from_be_bytes([arp[2], arp[3]]) != ETHER_TYPE_IPV4
            || arp[4] != 6
            || arp[5] != 4
        {
            return None;
        }
        let operation = match u16::from_be_bytes([arp[6], arp[7]]) {
            1 => Operation::Request,
            2 => Operation::Reply,
            _ => return None,
        };
        let mut sender_mac = [0u8; 6];
        let mut sender_ip = [0u8; 4];
        let mut target_mac = [0u8; 6];
        let mut target_ip = [0u8; 4];
        sender_mac.copy_from_slice(&arp[8..14]);
        sender_ip.copy_from_slice(&arp[14..18]);
        target_mac.copy_from_slice(&arp[18..24]);
        target_ip.copy_from_slice(&arp[24..28]);
        Some(ArpPacket {
            operation,
            sender_mac: MacAddress(sender_mac),
            sender_ip: Ipv4Address(sender_ip),
            target_mac: MacAddress(target_mac),
            target_ip: Ipv4Address(target_ip),
        })
    }

    /// Serialize into the [`PACKET_LEN`] bytes at the start of `out`.
    pub fn write(&self, out: &mut [u8]) -> bool {
        if out.len() < PACKET_LEN {
            return false;
        }
        out[0..2].copy_from_slice(&HARDWARE_TYPE_ETHERNET.to_be_bytes());
        out[2..4].copy_from_slice(&ETHER_TYPE_IPV4.to_be_bytes());
        out[4] = 6;
        out[5] = 4;
        out[6..8].copy_from_slice(&(self.operation as u16).to_be_bytes());
        out[8..14].copy_from_slice(&self.sender_mac.0);
        out[14..18].copy_from_slice(&self.sender_ip.0);
        out[18..24].copy_from_slice(&self.target_mac.0);
        out[24..28].copy_from_slice(&self.target_ip.0);
        true
    }
}

/// Whether `frame` is an ARP request asking for `local_ip`.
pub fn is_arp_request(frame: &[u8], local_ip: Ipv4Address) -> bool {
    matches!(
        ArpPacket::parse(frame),
        Some(arp) if arp.operation == Operation::Request && arp.target_ip == local_ip
    )
}

/// Whether `frame` is an ARP reply addressed to `local_ip`.
///
/// The resolved address is the reply's `sender_mac`; read it with
/// [`ArpPacket::parse`].
pub fn is_arp_reply(frame: &[u8], local_ip: Ipv4Address) -> bool {
    matches!(
        ArpPacket::parse(frame),
        Some(arp) if arp.operation == Operation::Reply && arp.target_ip == local_ip
    )
}

/// Turn the request in `frame` into the matching reply, in place.
///
/// The requester becomes the target, `interface` becomes the sender and the
/// Ethernet header is readdressed accordingly. Returns the length of the
/// frame to transmit, or `None` if `frame` is not an ARP packet.
pub fn write_arp_reply(frame: &mut [u8], interface: &Interface) -> Option<usize> {
    let request = ArpPacket::parse(frame)?;
    let reply = ArpPacket {
        operation: Operation::Reply,
        sender_mac: interface.mac,
        sender_ip: request.target_ip,
        target_mac: request.sender_mac,
        target_ip: request.sender_ip,
    };
    EthernetHeader {
        destination: request.sender_mac,
        source: interface.mac,
        ether_type: ETHER_TYPE_ARP,
    }
    .write(frame);
    reply.write(&mut frame[ethernet::HEADER_LEN..]);
    Some(FRAME_LEN)
}

/// Build a broadcast request for `target_ip` from `interface` into `buf`.
///
/// Returns the frame length, or `None` if `buf` is shorter than [`FRAME_LEN`].
pub fn write_arp_request(
    buf: &mut [u8],
    interface: &Interface,
    target_ip: Ipv4Address,
) -> Option<usize> {
    if buf.len() < FRAME_LEN {
        return None;
    }
    EthernetHeader {
        destination: MacAddress::BROADCAST,
        source: interface.mac,
        ether_type: ETHER_TYPE_ARP,
    }
    .write(buf);
    ArpPacket {
        operation: Operation::Request,
        sender_mac: interface.mac,
        sender_ip: interface.ip,
        target_mac: MacAddress::UNSPECIFIED,
        target_ip,
    }
    .write(&mut buf[ethernet::HEADER_LEN..]);
    Some(FRAME_LEN)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn interface() -> Interface {
        Interface {
            mac: MacAddress::new(2, 3, 4, 5, 6, 101),
            ip: Ipv4Address::new(192, 168, 2, 101),
            subnet_mask: Ipv4Address::new(255, 255, 255, 0),
            gateway: Ipv4Address::new(192, 168, 2, 1),
        }
    }

    fn request_from(mac: MacAddress, ip: Ipv4Address, target: Ipv4Address) -> [u8; FRAME_LEN] {
        let peer = Interface {
            mac,
            ip,
            ..interface()
        };
        let mut frame = [0u8; FRAME_LEN];
        write_arp_request(&mut frame, &peer, target).unwrap();
        frame
    }

    #[test]
    fn request_for_our_ip_is_recognised() {
        let peer_mac = MacAddress::new(0xAA, 0xBB, 0xCC, 0, 0, 1);
        let frame = request_from(peer_mac, Ipv4Address::new(192, 168, 2, 1), interface().ip);
        assert!(is_arp_request(&frame, interface().ip));
        assert!(!is_arp_request(&frame, Ipv4Address::new(192, 168, 2, 102)));
        assert!(!is_arp_reply(&frame, interface().ip));
    }

    #[test]
    fn reply_swaps_addresses() {
        let peer_mac = MacAddress::new(0xAA, 0xBB, 0xCC, 0, 0, 1);
        let peer_ip = Ipv4Address::new(192, 168, 2, 1);
        let mut frame = request_from(peer_mac, peer_ip, interface().ip);

        assert_eq!(write_arp_reply(&mut frame, &interface()), Some(FRAME_LEN));

        let header = EthernetHeader::parse(&frame).unwrap();
        assert_eq!(header.destination, peer_mac);
        assert_eq!(header.source, interface().mac);

        let reply = ArpPacket::parse(&frame).unwrap();
        assert_eq!(reply.operation, Operation::Reply);
        assert_eq!(&frame[20..22], &[0, 2]);
        assert_eq!(reply.sender_mac, interface().mac);
        assert_eq!(reply.sender_ip, interface().ip);
        assert_eq!(reply.target_mac, peer_mac);
        assert_eq!(reply.target_ip, peer_ip);
        assert!(is_arp_reply(&frame, peer_ip));
    }

    #[test]
    fn request_is_broadcast() {
        let mut frame = [0u8; 64];
        let target = Ipv4Address::new(192, 168, 2, 1);
        assert_eq!(write_arp_request(&mut frame, &interface(), target), Some(FRAME_LEN));
        assert!(EthernetHeader::parse(&frame).unwrap().destination.is_broadcast());
        let arp = ArpPacket::parse(&frame).unwrap();
        assert_eq!(arp.operation, Operation::Request);
        assert_eq!(arp.target_ip, target);
        assert_eq!(arp.sender_ip, interface().ip);
    }

    #[test]
    fn short_buffers_are_refused() {
        assert_eq!(write_arp_request(&mut [0u8; 20], &interface(), Ipv4Address::BROADCAST), None);
        assert_eq!(ArpPacket::parse(&[0u8; 20]), None);
    }
}
