//! Common error types for network operations

/// A common error type for the protocol stack.
///
/// Classifiers in the link, IP and TCP layers report "not for us" with a
/// `bool` or `None`; this type is reserved for operations that were asked to
/// build or decode something and could not. It is `Copy` and carries no data
/// so it stays cheap to pass around on small targets.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Error {
    /// The output buffer cannot hold the frame or packet being built.
    BufferTooSmall,
    /// The input ended before a complete header or field was read.
    Truncated,
    /// An MQTT remaining-length field used more than four bytes.
    MalformedLength,
    /// A packet had the wrong type or an invalid field, such as a topic
    /// that is not UTF-8.
    Malformed,
    /// A topic name exceeded [`MAX_TOPIC_LEN`](crate::network::MAX_TOPIC_LEN).
    TopicTooLong,
    /// A message payload exceeded [`MAX_MESSAGE_LEN`](crate::network::MAX_MESSAGE_LEN).
    MessageTooLong,
    /// A SUBSCRIBE or UNSUBSCRIBE named no topics, or more than
    /// [`MAX_TOPICS`](crate::network::MAX_TOPICS).
    TooManyTopics,
    /// A QoS level this client does not support was requested.
    InvalidQoS,
    /// A packet identifier of zero was used where one is required.
    InvalidPacketId,
    /// The operation needs an established connection.
    NotConnected,
    /// Another exchange is still waiting for its acknowledgement.
    Busy,
    /// The transport driver refused the frame.
    TransmitFailed,
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let text = match self {
            Error::BufferTooSmall => "buffer too small",
            Error::Truncated => "truncated input",
            Error::MalformedLength => "malformed remaining length",
            Error::Malformed => "malformed packet",
            Error::TopicTooLong => "topic too long",
            Error::MessageTooLong => "message too long",
            Error::TooManyTopics => "invalid topic count",
            Error::InvalidQoS => "unsupported QoS",
            Error::InvalidPacketId => "invalid packet identifier",
            Error::NotConnected => "not connected",
            Error::Busy => "busy",
            Error::TransmitFailed => "transmit failed",
        };
        f.write_str(text)
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Error {
    fn format(&self, f: defmt::Formatter) {
        match self {
            Error::BufferTooSmall => defmt::write!(f, "BufferTooSmall"),
            Error::Truncated => defmt::write!(f, "Truncated"),
            Error::MalformedLength => defmt::write!(f, "MalformedLength"),
            Error::Malformed => defmt::write!(f, "Malformed"),
            Error::TopicTooLong => defmt::write!(f, "TopicTooLong"),
            Error::MessageTooLong => defmt::write!(f, "MessageTooLong"),
            Error::TooManyTopics => defmt::write!(f, "TooManyTopics"),
            Error::InvalidQoS => defmt::write!(f, "InvalidQoS"),
            Error::InvalidPacketId => defmt::write!(f, "InvalidPacketId"),
            Error::NotConnected => defmt::write!(f, "NotConnected"),
            Error::Busy => defmt::write!(f, "Busy"),
            Error::TransmitFailed => defmt::write!(f, "TransmitFailed"),
        }
    }
}
