//! A hand-built Ethernet/ARP/IPv4/TCP stack.
//!
//! Layers are plain functions over byte slices: each one classifies or
//! builds the bytes of its own header at explicit offsets and leaves the
//! rest of the frame to the next layer. State lives in exactly two places,
//! [`tcp::connection::Connection`] and
//! [`application::mqtt::session::Session`]; the [`node`](crate::node) module
//! ties them to a [`Transport`].
//!
//! ```text
//!  frame ─► ethernet ─┬─► arp
//!                     └─► ipv4 ─┬─► icmp
//!                               └─► tcp ─► connection ─► mqtt session
//! ```

#![allow(missing_docs)]
#![deny(unsafe_code)]

/// Common error types for network operations
pub mod error;

pub mod application;
pub mod arp;
pub mod checksum;
pub mod ethernet;
pub mod icmp;
pub mod ipv4;
pub mod notice;
pub mod tcp;

use ethernet::MacAddress;
use ipv4::Ipv4Address;

/// Size of the one frame buffer: Ethernet header, VLAN tag, 1500-byte MTU
/// and CRC.
pub const MAX_FRAME_SIZE: usize = 1522;
/// Largest MQTT control packet this node assembles.
pub const MAX_PACKET_LEN: usize = 512;
/// Largest topic name or filter, in bytes.
pub const MAX_TOPIC_LEN: usize = 80;
/// Largest application message, in bytes.
pub const MAX_MESSAGE_LEN: usize = 256;
/// Most topic filters in one SUBSCRIBE or UNSUBSCRIBE.
pub const MAX_TOPICS: usize = 4;
/// Longest client identifier every 3.1.1 broker must accept.
pub const MAX_CLIENT_ID_LEN: usize = 23;

/// The Ethernet controller driver.
///
/// The stack holds exactly one frame at a time and never blocks: it asks
/// [`data_available`](Self::data_available) before every
/// [`receive_frame`](Self::receive_frame).
pub trait Transport {
    /// Associated error type
    type Error: core::fmt::Debug;
    /// Whether the PHY reports link.
    fn link_up(&mut self) -> bool;
    /// Whether a received frame is waiting.
    fn data_available(&mut self) -> bool;
    /// Whether the receive buffer overflowed since the last call. Reading
    /// the flag clears it.
    fn overflowed(&mut self) -> bool;
    /// Copy the next frame into `buf` and return its length.
    fn receive_frame(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error>;
    /// Transmit a complete frame.
    fn send_frame(&mut self, frame: &[u8]) -> Result<(), Self::Error>;
}

impl<T: Transport + ?Sized> Transport for &mut T {
    type Error = T::Error;

    fn link_up(&mut self) -> bool {
        T::link_up(self)
    }

    fn data_available(&mut self) -> bool {
        T::data_available(self)
    }

    fn overflowed(&mut self) -> bool {
        T::overflowed(self)
    }

    fn receive_frame(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        T::receive_frame(self, buf)
    }

    fn send_frame(&mut self, frame: &[u8]) -> Result<(), Self::Error> {
        T::send_frame(self, frame)
    }
}

/// This node's addressing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interface {
    /// Hardware address.
    pub mac: MacAddress,
    /// IPv4 address.
    pub ip: Ipv4Address,
    /// Subnet mask.
    pub subnet_mask: Ipv4Address,
    /// Default gateway.
    pub gateway: Ipv4Address,
}
