//! MQTT 3.1.1 for embedded systems.
//!
//! [`packet`] encodes and decodes control packets into bounded buffers;
//! [`session`] sequences them over the TCP connection.
//!
//! ```rust
//! use ethmqtt::network::application::mqtt::packet::{assemble_publish, parse_publish, QoS};
//!
//! let packet = assemble_publish("sensors/temperature", 18, QoS::AtLeastOnce, b"23.5").unwrap();
//! let received = parse_publish(&packet).unwrap();
//! assert_eq!(received.topic.as_str(), "sensors/temperature");
//! assert_eq!(received.packet_id, Some(18));
//! ```

pub mod packet;
pub mod session;

pub use packet::{ConnectFlags, ConnectOptions, QoS, Subscription};
pub use session::{Session, SessionState};
