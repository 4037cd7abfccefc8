//! Operator-visible outcomes.
//!
//! The state machines never print. They emit [`Notice`] values, and the
//! node renders them through [`Display`](core::fmt::Display) on whatever
//! text sink the firmware provides.

use core::fmt;

use super::application::mqtt::packet::Subscription;
use super::error::Error;
use super::ethernet::MacAddress;

/// Something the operator should hear about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// The receive buffer overflowed; the driver has cleared it.
    Overflow,
    /// The broker's hardware address was resolved.
    ArpResolved(MacAddress),
    /// TCP handshake completed.
    Established,
    /// CONNACK accepted the session.
    Connected,
    /// CONNACK carried a non-zero return code.
    ConnectRefused(u8),
    /// A wait-state ran out of retries.
    ConnectionFailed,
    /// The peer reset the connection.
    ConnectionReset,
    /// The connection finished closing.
    ConnectionClosed,
    /// A segment arrived with a sequence number other than the one expected.
    UnexpectedSequence {
        /// Our acknowledgment number.
        expected: u32,
        /// The segment's sequence number.
        received: u32,
    },
    /// An MQTT packet did not match what the session was waiting for.
    UnexpectedPacket(u8),
    /// A command arrived while another exchange was outstanding.
    Busy,
    /// The broker address has not been set.
    NotConfigured,
    /// The command needs an MQTT session.
    NotConnected,
    /// The Ethernet link is down.
    LinkDown,
    /// A PUBLISH left (QoS 0) or was acknowledged (QoS 1).
    Published(Option<u16>),
    /// SUBACK granted every requested filter.
    Subscribed,
    /// SUBACK rejected at least one filter.
    SubackFailure,
    /// UNSUBACK received.
    Unsubscribed,
    /// PINGRESP received.
    PingResponse,
    /// Something other than PINGRESP answered a PINGREQ.
    NoPingResponse,
    /// The MQTT session ended.
    Disconnected,
    /// An application message arrived.
    Message(Subscription),
    /// A command could not be carried out.
    Failed(Error),
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::Overflow => f.write_str("Receive overflow"),
            Notice::ArpResolved(mac) => write!(f, "Received an ARP response from {mac}"),
            Notice::Established => f.write_str("TCP connection established"),
            Notice::Connected => f.write_str("Connected to MQTT broker"),
            Notice::ConnectRefused(code) => write!(f, "Connection refused, return code {code}"),
            Notice::ConnectionFailed => f.write_str("Connection failed, no response"),
            Notice::ConnectionReset => f.write_str("Connection reset by broker"),
            Notice::ConnectionClosed => f.write_str("Connection closed"),
            Notice::UnexpectedSequence { expected, received } => {
                write!(f, "Unexpected sequence number {received}, expected {expected}")
            }
            Notice::UnexpectedPacket(control) => write!(f, "Unexpected packet 0x{control:02X}"),
            Notice::Busy => f.write_str("Busy, try again"),
            Notice::NotConfigured => f.write_str("MQTT IP not set"),
            Notice::NotConnected => f.write_str("Not connected"),
            Notice::LinkDown => f.write_str("Link down"),
            Notice::Published(Some(id)) => write!(f, "PUBACK received for {id}"),
            Notice::Published(None) => f.write_str("Published"),
            Notice::Subscribed => f.write_str("Subscribed"),
            Notice::SubackFailure => f.write_str("SUBACK failure"),
            Notice::Unsubscribed => f.write_str("Unsubscribed"),
            Notice::PingResponse => f.write_str("Ping response received"),
            Notice::NoPingResponse => f.write_str("No ping response"),
            Notice::Disconnected => f.write_str("Disconnected"),
            Notice::Message(sub) => match core::str::from_utf8(&sub.message) {
                Ok(text) => write!(f, "{}: {}", sub.topic, text),
                Err(_) => write!(f, "{}: <{} bytes>", sub.topic, sub.message.len()),
            },
            Notice::Failed(error) => write!(f, "Error: {error}"),
        }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Notice {
    fn format(&self, f: defmt::Formatter) {
        match self {
            Notice::Overflow => defmt::write!(f, "Overflow"),
            Notice::ArpResolved(mac) => defmt::write!(f, "ArpResolved({})", mac),
            Notice::Established => defmt::write!(f, "Established"),
            Notice::Connected => defmt::write!(f, "Connected"),
            Notice::ConnectRefused(code) => defmt::write!(f, "ConnectRefused({=u8})", code),
            Notice::ConnectionFailed => defmt::write!(f, "ConnectionFailed"),
            Notice::ConnectionReset => defmt::write!(f, "ConnectionReset"),
            Notice::ConnectionClosed => defmt::write!(f, "ConnectionClosed"),
            Notice::UnexpectedSequence { expected, received } => defmt::write!(
                f,
                "UnexpectedSequence {{ expected: {=u32}, received: {=u32} }}",
                expected,
                received
            ),
            Notice::UnexpectedPacket(control) => defmt::write!(f, "UnexpectedPacket({=u8:#x})", control),
            Notice::Busy => defmt::write!(f, "Busy"),
            Notice::NotConfigured => defmt::write!(f, "NotConfigured"),
            Notice::NotConnected => defmt::write!(f, "NotConnected"),
            Notice::LinkDown => defmt::write!(f, "LinkDown"),
            Notice::Published(id) => defmt::write!(f, "Published({})", id),
            Notice::Subscribed => defmt::write!(f, "Subscribed"),
            Notice::SubackFailure => defmt::write!(f, "SubackFailure"),
            Notice::Unsubscribed => defmt::write!(f, "Unsubscribed"),
            Notice::PingResponse => defmt::write!(f, "PingResponse"),
            Notice::NoPingResponse => defmt::write!(f, "NoPingResponse"),
            Notice::Disconnected => defmt::write!(f, "Disconnected"),
            Notice::Message(sub) => defmt::write!(f, "Message({=str})", sub.topic.as_str()),
            Notice::Failed(error) => defmt::write!(f, "Failed({})", error),
        }
    }
}
