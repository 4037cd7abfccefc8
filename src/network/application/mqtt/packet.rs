//! MQTT 3.1.1 control packet encoding and decoding.
//!
//! Every assembler writes into a bounded [`Packet`] and fails with an
//! [`Error`] instead of truncating. Every parser takes the bytes of one
//! complete control packet, usually obtained from [`Packets`], and checks the
//! fixed header before reading any field.
//!
//! # Examples
//!
//! ```rust
//! use ethmqtt::network::application::mqtt::packet::{
//!     assemble_connect, ConnectFlags, ConnectOptions, FixedHeader, CONNECT,
//! };
//!
//! let options = ConnectOptions {
//!     client_id: "test",
//!     keep_alive_seconds: 60,
//!     flags: ConnectFlags::CLEAN_SESSION,
//! };
//! let packet = assemble_connect(&options).unwrap();
//! let header = FixedHeader::parse(&packet).unwrap();
//! assert_eq!(header.control, CONNECT);
//! assert_eq!(header.remaining_length, 16);
//! ```

use heapless::{String, Vec};

use crate::network::error::Error;
use crate::network::{MAX_CLIENT_ID_LEN, MAX_MESSAGE_LEN, MAX_PACKET_LEN, MAX_TOPIC_LEN, MAX_TOPICS};

/// MQTT CONNECT packet type identifier.
pub const CONNECT: u8 = 0x10;
/// MQTT CONNACK packet type identifier.
pub const CONNACK: u8 = 0x20;
/// MQTT PUBLISH packet type identifier (flags in the low nibble).
pub const PUBLISH: u8 = 0x30;
/// MQTT PUBACK packet type identifier.
pub const PUBACK: u8 = 0x40;
/// MQTT SUBSCRIBE packet type identifier, reserved flags included.
pub const SUBSCRIBE: u8 = 0x82;
/// MQTT SUBACK packet type identifier.
pub const SUBACK: u8 = 0x90;
/// MQTT UNSUBSCRIBE packet type identifier, reserved flags included.
pub const UNSUBSCRIBE: u8 = 0xA2;
/// MQTT UNSUBACK packet type identifier.
pub const UNSUBACK: u8 = 0xB0;
/// MQTT PINGREQ packet type identifier.
pub const PINGREQ: u8 = 0xC0;
/// MQTT PINGRESP packet type identifier.
pub const PINGRESP: u8 = 0xD0;
/// MQTT DISCONNECT packet type identifier.
pub const DISCONNECT: u8 = 0xE0;

/// Largest value a remaining-length field can carry.
pub const MAX_REMAINING_LENGTH: usize = 268_435_455;

/// SUBACK return code signalling a rejected subscription.
pub const SUBACK_FAILURE: u8 = 0x80;

/// MQTT 3.1.1 protocol name.
const PROTOCOL_NAME: &[u8] = b"MQTT";
/// MQTT protocol level for version 3.1.1.
const PROTOCOL_LEVEL: u8 = 4;

/// An assembled control packet.
pub type Packet = Vec<u8, MAX_PACKET_LEN>;

/// Quality of Service levels this client speaks.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default)]
pub enum QoS {
    /// Fire and forget.
    #[default]
    AtMostOnce = 0,
    /// Acknowledged with PUBACK.
    AtLeastOnce = 1,
}

impl TryFrom<u8> for QoS {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(QoS::AtMostOnce),
            1 => Ok(QoS::AtLeastOnce),
            _ => Err(Error::InvalidQoS),
        }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for QoS {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "QoS{=u8}", *self as u8)
    }
}

/// CONNECT flag byte.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default)]
pub struct ConnectFlags(pub u8);

impl ConnectFlags {
    /// Discard any previous session state.
    pub const CLEAN_SESSION: ConnectFlags = ConnectFlags(0x02);
    /// A will message follows.
    pub const WILL: ConnectFlags = ConnectFlags(0x04);
    /// Will QoS bits.
    pub const WILL_QOS: ConnectFlags = ConnectFlags(0x18);
    /// Retain the will message.
    pub const WILL_RETAIN: ConnectFlags = ConnectFlags(0x20);
    /// A password follows.
    pub const PASSWORD: ConnectFlags = ConnectFlags(0x40);
    /// A user name follows.
    pub const USERNAME: ConnectFlags = ConnectFlags(0x80);

    /// Whether every bit of `other` is set.
    pub const fn contains(self, other: ConnectFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl core::ops::BitOr for ConnectFlags {
    type Output = ConnectFlags;

    fn bitor(self, rhs: Self) -> Self {
        ConnectFlags(self.0 | rhs.0)
    }
}

/// Parameters of a CONNECT packet.
#[derive(Debug, Clone, Copy)]
pub struct ConnectOptions<'a> {
    /// Client identifier, at most [`MAX_CLIENT_ID_LEN`] bytes.
    pub client_id: &'a str,
    /// Keep-alive interval in seconds; 0 disables it.
    pub keep_alive_seconds: u16,
    /// Connect flags. Will, user name and password are not supported.
    pub flags: ConnectFlags,
}

/// Decoded fixed header.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct FixedHeader {
    /// First byte: packet type and flags.
    pub control: u8,
    /// Number of bytes following the fixed header.
    pub remaining_length: usize,
    /// Length of the fixed header itself (2 to 5 bytes).
    pub header_len: usize,
}

impl FixedHeader {
    /// Decode the fixed header at the start of `bytes`.
    pub fn parse(bytes: &[u8]) -> Result<Self, Error> {
        let (&control, rest) = bytes.split_first().ok_or(Error::Truncated)?;
        let (remaining_length, consumed) = decode_remaining_length(rest)?;
        Ok(FixedHeader {
            control,
            remaining_length,
            header_len: 1 + consumed,
        })
    }

    /// Packet type in the high nibble, flags cleared.
    pub fn packet_type(&self) -> u8 {
        self.control & 0xF0
    }

    /// Total packet length.
    pub fn packet_len(&self) -> usize {
        self.header_len + self.remaining_length
    }
}

/// An application message received from the broker.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Subscription {
    /// Topic the message was published on.
    pub topic: String<MAX_TOPIC_LEN>,
    /// Message bytes.
    pub message: Vec<u8, MAX_MESSAGE_LEN>,
    /// Delivery QoS.
    pub qos: QoS,
    /// Identifier to acknowledge, present for QoS 1.
    pub packet_id: Option<u16>,
    /// The broker delivered a retained message.
    pub retain: bool,
    /// Remaining length of the PUBLISH packet.
    pub remaining_length: usize,
}

/// Iterator over the control packets packed into one TCP payload.
///
/// Stops at the first incomplete or malformed packet.
#[derive(Debug, Clone)]
pub struct Packets<'a> {
    bytes: &'a [u8],
}

impl<'a> Packets<'a> {
    /// Iterate over the packets in `bytes`.
    pub fn new(bytes: &'a [u8]) -> Self {
        Packets { bytes }
    }
}

impl<'a> Iterator for Packets<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<Self::Item> {
        let header = FixedHeader::parse(self.bytes).ok()?;
        let len = header.packet_len();
        if self.bytes.len() < len {
            self.bytes = &[];
            return None;
        }
        let (packet, rest) = self.bytes.split_at(len);
        self.bytes = rest;
        Some(packet)
    }
}

/// Encode `value` as a remaining-length field into `out`.
///
/// Returns the number of bytes written (1 to 4).
pub fn encode_remaining_length(mut value: usize, out: &mut [u8]) -> Result<usize, Error> {
    if value > MAX_REMAINING_LENGTH {
        return Err(Error::MalformedLength);
    }
    let mut written = 0;
    loop {
        let slot = out.get_mut(written).ok_or(Error::BufferTooSmall)?;
        let mut byte = (value % 128) as u8;
        value /= 128;
        if value > 0 {
            byte |= 0x80;
        }
        *slot = byte;
        written += 1;
        if value == 0 {
            return Ok(written);
        }
    }
}

/// Decode a remaining-length field from the start of `bytes`.
///
/// Returns the value and the number of bytes consumed. A continuation bit
/// on the fourth byte is rejected rather than read further.
pub fn decode_remaining_length(bytes: &[u8]) -> Result<(usize, usize), Error> {
    let mut value = 0usize;
    let mut multiplier = 1usize;
    for (i, &byte) in bytes.iter().enumerate() {
        value += (byte & 0x7F) as usize * multiplier;
        if byte & 0x80 == 0 {
            return Ok((value, i + 1));
        }
        if i == 3 {
            return Err(Error::MalformedLength);
        }
        multiplier *= 128;
    }
    Err(Error::Truncated)
}

fn put(packet: &mut Packet, bytes: &[u8]) -> Result<(), Error> {
    packet.extend_from_slice(bytes).map_err(|_| Error::BufferTooSmall)
}

fn put_u16(packet: &mut Packet, value: u16) -> Result<(), Error> {
    put(packet, &value.to_be_bytes())
}

fn put_str(packet: &mut Packet, text: &str) -> Result<(), Error> {
    put_u16(packet, text.len() as u16)?;
    put(packet, text.as_bytes())
}

fn start(control: u8, remaining_length: usize) -> Result<Packet, Error> {
    let mut header = [0u8; 5];
    header[0] = control;
    let len = encode_remaining_length(remaining_length, &mut header[1..])?;
    if 1 + len + remaining_length > MAX_PACKET_LEN {
        return Err(Error::BufferTooSmall);
    }
    let mut packet = Packet::new();
    put(&mut packet, &header[..1 + len])?;
    Ok(packet)
}

fn check_topics(topics: &[&str]) -> Result<(), Error> {
    if topics.is_empty() || topics.len() > MAX_TOPICS {
        return Err(Error::TooManyTopics);
    }
    if topics.iter().any(|t| t.is_empty() || t.len() > MAX_TOPIC_LEN) {
        return Err(Error::TopicTooLong);
    }
    Ok(())
}

/// Assemble a CONNECT packet.
pub fn assemble_connect(options: &ConnectOptions<'_>) -> Result<Packet, Error> {
    // Clean session is the only flag with nothing to carry in the payload.
    if !ConnectFlags::CLEAN_SESSION.contains(options.flags) {
        return Err(Error::Malformed);
    }
    if options.client_id.len() > MAX_CLIENT_ID_LEN {
        return Err(Error::Malformed);
    }
    let remaining = 2 + PROTOCOL_NAME.len() + 1 + 1 + 2 + 2 + options.client_id.len();
    let mut packet = start(CONNECT, remaining)?;
    put_u16(&mut packet, PROTOCOL_NAME.len() as u16)?;
    put(&mut packet, PROTOCOL_NAME)?;
    put(&mut packet, &[PROTOCOL_LEVEL, options.flags.0])?;
    put_u16(&mut packet, options.keep_alive_seconds)?;
    put_str(&mut packet, options.client_id)?;
    Ok(packet)
}

/// Assemble a PUBLISH packet.
///
/// `packet_id` is written only for QoS 1, where it must be non-zero. The
/// message bytes follow the variable header without a length prefix.
pub fn assemble_publish(topic: &str, packet_id: u16, qos: QoS, message: &[u8]) -> Result<Packet, Error> {
    if topic.is_empty() || topic.len() > MAX_TOPIC_LEN {
        return Err(Error::TopicTooLong);
    }
    if message.len() > MAX_MESSAGE_LEN {
        return Err(Error::MessageTooLong);
    }
    let id_len = match qos {
        QoS::AtMostOnce => 0,
        QoS::AtLeastOnce if packet_id == 0 => return Err(Error::InvalidPacketId),
        QoS::AtLeastOnce => 2,
    };
    let remaining = 2 + topic.len() + id_len + message.len();
    let mut packet = start(PUBLISH | ((qos as u8) << 1), remaining)?;
    put_str(&mut packet, topic)?;
    if id_len > 0 {
        put_u16(&mut packet, packet_id)?;
    }
    put(&mut packet, message)?;
    Ok(packet)
}

/// Assemble a SUBSCRIBE packet requesting `qos` for every topic filter.
pub fn assemble_subscribe(packet_id: u16, topics: &[&str], qos: QoS) -> Result<Packet, Error> {
    if packet_id == 0 {
        return Err(Error::InvalidPacketId);
    }
    check_topics(topics)?;
    let remaining = 2 + topics.iter().map(|t| 2 + t.len() + 1).sum::<usize>();
    let mut packet = start(SUBSCRIBE, remaining)?;
    put_u16(&mut packet, packet_id)?;
    for topic in topics {
        put_str(&mut packet, topic)?;
        put(&mut packet, &[qos as u8])?;
    }
    Ok(packet)
}

/// Assemble an UNSUBSCRIBE packet.
pub fn assemble_unsubscribe(packet_id: u16, topics: &[&str]) -> Result<Packet, Error> {
    if packet_id == 0 {
        return Err(Error::InvalidPacketId);
    }
    check_topics(topics)?;
    let remaining = 2 + topics.iter().map(|t| 2 + t.len()).sum::<usize>();
    let mut packet = start(UNSUBSCRIBE, remaining)?;
    put_u16(&mut packet, packet_id)?;
    for topic in topics {
        put_str(&mut packet, topic)?;
    }
    Ok(packet)
}

/// Assemble a header-only packet such as [`PINGREQ`] or [`DISCONNECT`].
pub fn assemble_simple(control: u8) -> Packet {
    let mut packet = Packet::new();
    // Two bytes always fit in a non-empty packet buffer.
    let _ = packet.extend_from_slice(&[control, 0]);
    packet
}

/// Assemble the PUBACK answering an inbound QoS 1 PUBLISH.
pub fn assemble_puback(packet_id: u16) -> Packet {
    let mut packet = Packet::new();
    let id = packet_id.to_be_bytes();
    let _ = packet.extend_from_slice(&[PUBACK, 2, id[0], id[1]]);
    packet
}

fn packet_id_at(packet: &[u8], offset: usize) -> Option<u16> {
    Some(u16::from_be_bytes([*packet.get(offset)?, *packet.get(offset + 1)?]))
}

/// Return code of a well-formed CONNACK, or `None` for anything else.
pub fn connack_return_code(packet: &[u8]) -> Option<u8> {
    match packet {
        [CONNACK, 2, _flags, code, ..] => Some(*code),
        _ => None,
    }
}

/// Whether `packet` is a CONNACK accepting the connection.
pub fn is_connack(packet: &[u8]) -> bool {
    matches!(packet, [CONNACK, 2, 0, 0, ..])
}

/// Whether `packet` is a complete PUBLISH.
pub fn is_publish(packet: &[u8]) -> bool {
    match FixedHeader::parse(packet) {
        Ok(header) => header.packet_type() == PUBLISH && packet.len() >= header.packet_len(),
        Err(_) => false,
    }
}

/// Whether `packet` is a PUBACK for `packet_id`.
pub fn is_puback(packet: &[u8], packet_id: u16) -> bool {
    matches!(packet, [PUBACK, 2, ..]) && packet_id_at(packet, 2) == Some(packet_id)
}

/// Whether `packet` is a SUBACK for `packet_id` covering `topic_count` filters.
pub fn is_suback(packet: &[u8], packet_id: u16, topic_count: usize) -> bool {
    match FixedHeader::parse(packet) {
        Ok(header) => {
            header.control == SUBACK
                && header.remaining_length == 2 + topic_count
                && packet.len() >= header.packet_len()
                && packet_id_at(packet, header.header_len) == Some(packet_id)
        }
        Err(_) => false,
    }
}

/// Return codes of a SUBACK, one per requested filter: the granted QoS
/// (0 to 2) or [`SUBACK_FAILURE`].
pub fn suback_return_codes(packet: &[u8]) -> Option<&[u8]> {
    let header = FixedHeader::parse(packet).ok()?;
    if header.control != SUBACK || header.remaining_length < 2 {
        return None;
    }
    packet.get(header.header_len + 2..header.packet_len())
}

/// Whether `packet` is an UNSUBACK for `packet_id`.
pub fn is_unsuback(packet: &[u8], packet_id: u16) -> bool {
    matches!(packet, [UNSUBACK, 2, ..]) && packet_id_at(packet, 2) == Some(packet_id)
}

/// Whether `packet` is a PINGRESP.
pub fn is_pingresp(packet: &[u8]) -> bool {
    matches!(packet, [PINGRESP, 0, ..])
}

/// Decode an inbound PUBLISH.
///
/// Topics longer than [`MAX_TOPIC_LEN`] and messages longer than
/// [`MAX_MESSAGE_LEN`] are rejected.
pub fn parse_publish(packet: &[u8]) -> Result<Subscription, Error> {
    let header = FixedHeader::parse(packet)?;
    if header.packet_type() != PUBLISH {
        return Err(Error::Malformed);
    }
    let body = packet
        .get(header.header_len..header.packet_len())
        .ok_or(Error::Truncated)?;
    let qos = QoS::try_from((header.control >> 1) & 0x03)?;

    let topic_len = packet_id_at(body, 0).ok_or(Error::Truncated)? as usize;
    if topic_len > MAX_TOPIC_LEN {
        return Err(Error::TopicTooLong);
    }
    let topic_bytes = body.get(2..2 + topic_len).ok_or(Error::Truncated)?;
    let topic = core::str::from_utf8(topic_bytes).map_err(|_| Error::Malformed)?;

    let mut offset = 2 + topic_len;
    let packet_id = match qos {
        QoS::AtMostOnce => None,
        QoS::AtLeastOnce => {
            let id = packet_id_at(body, offset).ok_or(Error::Truncated)?;
            offset += 2;
            Some(id)
        }
    };

    let message = &body[offset..];
    if message.len() > MAX_MESSAGE_LEN {
        return Err(Error::MessageTooLong);
    }

    let mut subscription = Subscription {
        topic: String::new(),
        message: Vec::new(),
        qos,
        packet_id,
        retain: header.control & 0x01 != 0,
        remaining_length: header.remaining_length,
    };
    subscription
        .topic
        .push_str(topic)
        .map_err(|_| Error::TopicTooLong)?;
    subscription
        .message
        .extend_from_slice(message)
        .map_err(|_| Error::MessageTooLong)?;
    Ok(subscription)
}
