//! ICMP echo (ping) responder.

use super::checksum::checksum;
use super::ethernet;
use super::ipv4::{self, protocol};

/// Minimum ICMP header length in bytes
pub const HEADER_LEN: usize = 8;

/// ICMP message types
pub const ICMP_TYPE_ECHO_REPLY: u8 = 0;
/// Echo request type.
pub const ICMP_TYPE_ECHO_REQUEST: u8 = 8;

/// Whether `frame` holds an ICMP echo request.
///
/// `frame` must already have passed [`ipv4::is_ipv4`].
pub fn is_ping_request(frame: &[u8]) -> bool {
    match ipv4::datagram(frame) {
        Some((header, _, icmp)) => {
            header.protocol == protocol::ICMP
                && icmp.len() >= HEADER_LEN
                && icmp[0] == ICMP_TYPE_ECHO_REQUEST
        }
        None => false,
    }
}

/// Rewrite the echo request in `frame` into its reply, in place.
///
/// Hardware and IP addresses are swapped, the type becomes echo reply and
/// both the ICMP checksum (type through data) and the IP header checksum are
/// recomputed. Identifier, sequence and data are echoed unchanged. Returns
/// the length of the frame to transmit.
pub fn write_ping_response(frame: &mut [u8]) -> Option<usize> {
    let (header, _, _) = ipv4::datagram(frame)?;
    let header_len = header.header_len();
    let total_len = header.total_len as usize;
    if total_len < header_len + HEADER_LEN {
        return None;
    }

    ethernet::swap_addresses(frame);
    let ip = &mut frame[ethernet::HEADER_LEN..ethernet::HEADER_LEN + total_len];
    ipv4::swap_addresses(ip);
    ipv4::compute_header_checksum(ip);

    let icmp = &mut ip[header_len..];
    icmp[0] = ICMP_TYPE_ECHO_REPLY;
    icmp[2] = 0;
    icmp[3] = 0;
    let check = checksum(icmp);
    icmp[2..4].copy_from_slice(&check.to_be_bytes());

    Some(ethernet::HEADER_LEN + total_len)
}
