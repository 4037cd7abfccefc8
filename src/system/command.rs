//! Operator commands.
//!
//! [`Command::parse`] turns the fields of one console line into a typed
//! command. Verbs and the `set` targets are case-insensitive. Anything
//! that does not parse yields `None` and is ignored.

use heapless::Vec;

use crate::network::MAX_TOPICS;
use crate::network::application::mqtt::packet::QoS;
use crate::network::ipv4::Ipv4Address;

/// Text printed by `help`.
pub const HELP: &str = "\
status                          show addresses and state\r\n\
connect [keepAliveSeconds]      connect to the broker\r\n\
publish <topic> <message> [qos] publish a message (qos 0 or 1)\r\n\
subscribe <topic>...            subscribe to up to 4 topics\r\n\
unsubscribe <topic>...          unsubscribe from up to 4 topics\r\n\
ping                            send PINGREQ\r\n\
disconnect                      end the session\r\n\
set MQTT <a.b.c.d>              set the broker address\r\n\
set IP <a.b.c.d>                set this node's address\r\n";

/// A parsed operator command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command<'a> {
    /// Show addresses and state.
    Status,
    /// Open TCP and start an MQTT session.
    Connect {
        /// Overrides the configured keep-alive interval.
        keep_alive_seconds: Option<u16>,
    },
    /// Publish one message.
    Publish {
        /// Topic name.
        topic: &'a str,
        /// Message text.
        message: &'a str,
        /// Delivery QoS, 0 unless given.
        qos: QoS,
    },
    /// Subscribe to topic filters.
    Subscribe {
        /// One to [`MAX_TOPICS`] filters.
        topics: Vec<&'a str, MAX_TOPICS>,
    },
    /// Unsubscribe from topic filters.
    Unsubscribe {
        /// One to [`MAX_TOPICS`] filters.
        topics: Vec<&'a str, MAX_TOPICS>,
    },
    /// Send PINGREQ.
    Ping,
    /// End the session.
    Disconnect,
    /// Store the broker address.
    SetBroker(Ipv4Address),
    /// Store this node's address.
    SetIp(Ipv4Address),
    /// Print [`HELP`].
    Help,
}

/// Parse an address given either as one dotted field or as four fields.
fn parse_address(fields: &[&str]) -> Option<Ipv4Address> {
    match fields {
        [dotted] => dotted.parse().ok(),
        [a, b, c, d] => Some(Ipv4Address::new(
            a.parse().ok()?,
            b.parse().ok()?,
            c.parse().ok()?,
            d.parse().ok()?,
        )),
        _ => None,
    }
}

fn topics<'a>(fields: &[&'a str]) -> Option<Vec<&'a str, MAX_TOPICS>> {
    if fields.is_empty() {
        return None;
    }
    Vec::from_slice(fields).ok()
}

impl<'a> Command<'a> {
    /// Parse the fields of one line.
    pub fn parse(fields: &[&'a str]) -> Option<Self> {
        let (verb, args) = fields.split_first()?;
        let is = |name: &str| verb.eq_ignore_ascii_case(name);

        if is("status") && args.is_empty() {
            Some(Command::Status)
        } else if is("connect") {
            match args {
                [] => Some(Command::Connect { keep_alive_seconds: None }),
                [seconds] => Some(Command::Connect {
                    keep_alive_seconds: Some(seconds.parse().ok()?),
                }),
                _ => None,
            }
        } else if is("publish") {
            let (topic, message, qos) = match args {
                [topic, message] => (*topic, *message, QoS::AtMostOnce),
                [topic, message, qos] => (*topic, *message, QoS::try_from(qos.parse::<u8>().ok()?).ok()?),
                _ => return None,
            };
            Some(Command::Publish { topic, message, qos })
        } else if is("subscribe") {
            Some(Command::Subscribe { topics: topics(args)? })
        } else if is("unsubscribe") {
            Some(Command::Unsubscribe { topics: topics(args)? })
        } else if is("ping") && args.is_empty() {
            Some(Command::Ping)
        } else if is("disconnect") && args.is_empty() {
            Some(Command::Disconnect)
        } else if is("help") {
            Some(Command::Help)
        } else if is("set") {
            let (target, address) = args.split_first()?;
            let address = parse_address(address)?;
            if target.eq_ignore_ascii_case("mqtt") {
                Some(Command::SetBroker(address))
            } else if target.eq_ignore_ascii_case("ip") {
                Some(Command::SetIp(address))
            } else {
                None
            }
        } else {
            None
        }
    }
}
