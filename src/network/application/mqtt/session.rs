//! The MQTT session state machine.
//!
//! A [`Session`] sits on top of the TCP connection. Requests move it from
//! [`SessionState::Idle`] into a send state; the next [`Event::Tick`] that
//! finds the connection ready emits the packet and moves on to the matching
//! wait state; the matching acknowledgment brings it back to idle. Anything
//! else that arrives while waiting is reported and ignored.
//!
//! Inbound PUBLISH packets are delivered whatever the state, and QoS 1
//! deliveries are acknowledged on the next tick.

use heapless::{String, Vec};

use super::packet::{
    self, ConnectFlags, ConnectOptions, DISCONNECT, FixedHeader, PINGREQ, Packet, QoS, SUBACK_FAILURE,
};
use crate::network::MAX_CLIENT_ID_LEN;
use crate::network::error::Error;
use crate::network::notice::Notice;

/// Upper bound on the actions produced by one event.
pub const MAX_ACTIONS: usize = 3;

/// Session states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No MQTT session.
    Disconnected,
    /// CONNECT is due once TCP is established.
    Connect,
    /// Waiting for CONNACK.
    Connack,
    /// Connected, nothing outstanding.
    Idle,
    /// PUBLISH is due.
    Publish,
    /// QoS 0 PUBLISH handed to the connection.
    PublishQos0,
    /// Waiting for PUBACK.
    PublishQos1,
    /// SUBSCRIBE is due.
    Subscribe,
    /// Waiting for SUBACK.
    Suback,
    /// UNSUBSCRIBE is due.
    Unsubscribe,
    /// Waiting for UNSUBACK.
    Unsuback,
    /// PINGREQ is due.
    PingReq,
    /// Waiting for PINGRESP.
    PingResp,
    /// DISCONNECT is due.
    Disconnect,
}

#[cfg(feature = "defmt")]
impl defmt::Format for SessionState {
    fn format(&self, f: defmt::Formatter) {
        match self {
            SessionState::Disconnected => defmt::write!(f, "Disconnected"),
            SessionState::Connect => defmt::write!(f, "Connect"),
            SessionState::Connack => defmt::write!(f, "Connack"),
            SessionState::Idle => defmt::write!(f, "Idle"),
            SessionState::Publish => defmt::write!(f, "Publish"),
            SessionState::PublishQos0 => defmt::write!(f, "PublishQos0"),
            SessionState::PublishQos1 => defmt::write!(f, "PublishQos1"),
            SessionState::Subscribe => defmt::write!(f, "Subscribe"),
            SessionState::Suback => defmt::write!(f, "Suback"),
            SessionState::Unsubscribe => defmt::write!(f, "Unsubscribe"),
            SessionState::Unsuback => defmt::write!(f, "Unsuback"),
            SessionState::PingReq => defmt::write!(f, "PingReq"),
            SessionState::PingResp => defmt::write!(f, "PingResp"),
            SessionState::Disconnect => defmt::write!(f, "Disconnect"),
        }
    }
}

/// How the connection should carry a packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Keep the bytes until TCP acknowledges them.
    Acknowledged,
    /// Release the bytes as soon as the transport accepts the frame.
    Unacknowledged,
}

/// Work requested by the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Open the TCP connection to the broker.
    Open,
    /// Send a packet over the connection.
    Transmit(Packet, Delivery),
    /// Close the TCP connection.
    Close,
    /// Tell the operator.
    Notice(Notice),
}

/// Actions produced by one call.
pub type Actions = Vec<Action, MAX_ACTIONS>;

/// Operator requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request<'a> {
    /// Start a session.
    Connect {
        /// Keep-alive interval; 0 disables it.
        keep_alive_seconds: u16,
    },
    /// Publish one message.
    Publish {
        /// Topic name.
        topic: &'a str,
        /// Message bytes.
        message: &'a [u8],
        /// Delivery QoS.
        qos: QoS,
    },
    /// Subscribe to topic filters.
    Subscribe {
        /// Filters, 1 to [`MAX_TOPICS`](crate::network::MAX_TOPICS).
        topics: &'a [&'a str],
        /// Requested QoS for every filter.
        qos: QoS,
    },
    /// Unsubscribe from topic filters.
    Unsubscribe {
        /// Filters, 1 to [`MAX_TOPICS`](crate::network::MAX_TOPICS).
        topics: &'a [&'a str],
    },
    /// Send PINGREQ.
    Ping,
    /// End the session.
    Disconnect,
}

/// Inputs to the state machine.
#[derive(Debug, Clone, Copy)]
pub enum Event<'a> {
    /// An operator request.
    Request(Request<'a>),
    /// Polling tick. `ready` is true when the connection is established and
    /// can take another segment.
    Tick {
        /// Monotonic time.
        now_ms: u64,
        /// Whether a packet may be sent now.
        ready: bool,
    },
    /// One complete control packet received from the broker.
    Packet(&'a [u8]),
    /// The TCP connection went away underneath the session.
    ConnectionLost,
}

/// The one MQTT session of the node.
#[derive(Debug, Clone)]
pub struct Session {
    state: SessionState,
    client_id: String<MAX_CLIENT_ID_LEN>,
    flags: ConnectFlags,
    keep_alive_seconds: u16,
    next_packet_id: u16,
    packet_id: u16,
    topic_count: usize,
    outgoing: Packet,
    puback_due: Option<u16>,
    puback_in_flight: bool,
    keep_alive_ping: bool,
    last_sent_ms: u64,
    now_ms: u64,
}

fn emit(actions: &mut Actions, action: Action) {
    if actions.push(action).is_err() {
        warn!("mqtt: action queue full");
    }
}

impl Session {
    /// Create a disconnected session for `client_id`.
    pub fn new(client_id: &str, flags: ConnectFlags) -> Result<Self, Error> {
        let mut id = String::new();
        id.push_str(client_id).map_err(|_| Error::Malformed)?;
        Ok(Session {
            state: SessionState::Disconnected,
            client_id: id,
            flags,
            keep_alive_seconds: 0,
            next_packet_id: 1,
            packet_id: 0,
            topic_count: 0,
            outgoing: Packet::new(),
            puback_due: None,
            puback_in_flight: false,
            keep_alive_ping: false,
            last_sent_ms: 0,
            now_ms: 0,
        })
    }

    /// Current state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Whether a CONNACK has been accepted and the session not yet ended.
    pub fn is_connected(&self) -> bool {
        !matches!(
            self.state,
            SessionState::Disconnected | SessionState::Connect | SessionState::Connack
        )
    }

    /// Identifier of the exchange in flight, or of the last one.
    pub fn packet_id(&self) -> u16 {
        self.packet_id
    }

    /// Negotiated keep-alive interval.
    pub fn keep_alive_seconds(&self) -> u16 {
        self.keep_alive_seconds
    }

    /// Identifier the next exchange will use. Zero is skipped.
    pub fn set_next_packet_id(&mut self, id: u16) {
        self.next_packet_id = id.max(1);
    }

    fn allocate_packet_id(&mut self) -> u16 {
        let id = self.next_packet_id;
        self.next_packet_id = match id.wrapping_add(1) {
            0 => 1,
            next => next,
        };
        self.packet_id = id;
        id
    }

    /// Advance the state machine by one event.
    pub fn handle(&mut self, event: Event<'_>) -> Actions {
        let mut actions = Actions::new();
        match event {
            Event::Request(request) => self.on_request(request, &mut actions),
            Event::Tick { now_ms, ready } => {
                self.now_ms = now_ms;
                if ready {
                    self.on_tick(now_ms, &mut actions);
                }
            }
            Event::Packet(bytes) => self.on_packet(bytes, &mut actions),
            Event::ConnectionLost => {
                if self.state != SessionState::Disconnected {
                    info!("mqtt: connection lost");
                    self.state = SessionState::Disconnected;
                    self.puback_due = None;
                    self.puback_in_flight = false;
                    emit(&mut actions, Action::Notice(Notice::Disconnected));
                }
            }
        }
        actions
    }

    fn on_request(&mut self, request: Request<'_>, actions: &mut Actions) {
        if let Request::Connect { keep_alive_seconds } = request {
            if self.state != SessionState::Disconnected {
                emit(actions, Action::Notice(Notice::Busy));
                return;
            }
            let options = ConnectOptions {
                client_id: &self.client_id,
                keep_alive_seconds,
                flags: self.flags,
            };
            match packet::assemble_connect(&options) {
                Ok(packet) => {
                    self.outgoing = packet;
                    self.keep_alive_seconds = keep_alive_seconds;
                    self.state = SessionState::Connect;
                    emit(actions, Action::Open);
                }
                Err(error) => emit(actions, Action::Notice(Notice::Failed(error))),
            }
            return;
        }

        match self.state {
            SessionState::Idle => {}
            SessionState::Connect | SessionState::Connack if request == Request::Disconnect => {
                info!("mqtt: connect abandoned");
                self.state = SessionState::Disconnected;
                self.puback_due = None;
                self.puback_in_flight = false;
                emit(actions, Action::Close);
                emit(actions, Action::Notice(Notice::Disconnected));
                return;
            }
            SessionState::Disconnected | SessionState::Connect | SessionState::Connack => {
                emit(actions, Action::Notice(Notice::NotConnected));
                return;
            }
            _ if request == Request::Disconnect => {}
            _ => {
                emit(actions, Action::Notice(Notice::Busy));
                return;
            }
        }

        let assembled = match request {
            Request::Connect { .. } => return,
            Request::Publish { topic, message, qos } => {
                let id = match qos {
                    QoS::AtMostOnce => 0,
                    QoS::AtLeastOnce => self.next_packet_id,
                };
                packet::assemble_publish(topic, id, qos, message).map(|packet| {
                    if qos == QoS::AtLeastOnce {
                        self.allocate_packet_id();
                    }
                    (packet, SessionState::Publish)
                })
            }
            Request::Subscribe { topics, qos } => {
                packet::assemble_subscribe(self.next_packet_id, topics, qos).map(|packet| {
                    self.allocate_packet_id();
                    self.topic_count = topics.len();
                    (packet, SessionState::Subscribe)
                })
            }
            Request::Unsubscribe { topics } => {
                packet::assemble_unsubscribe(self.next_packet_id, topics).map(|packet| {
                    self.allocate_packet_id();
                    self.topic_count = topics.len();
                    (packet, SessionState::Unsubscribe)
                })
            }
            Request::Ping => Ok((packet::assemble_simple(PINGREQ), SessionState::PingReq)),
            Request::Disconnect => Ok((packet::assemble_simple(DISCONNECT), SessionState::Disconnect)),
        };

        match assembled {
            Ok((packet, state)) => {
                self.outgoing = packet;
                self.keep_alive_ping = false;
                self.state = state;
            }
            Err(error) => emit(actions, Action::Notice(Notice::Failed(error))),
        }
    }

    fn transmit(&mut self, delivery: Delivery, now_ms: u64, actions: &mut Actions) {
        self.last_sent_ms = now_ms;
        emit(actions, Action::Transmit(self.outgoing.clone(), delivery));
    }

    fn on_tick(&mut self, now_ms: u64, actions: &mut Actions) {
        if let Some(id) = self.puback_due {
            self.last_sent_ms = now_ms;
            self.puback_in_flight = true;
            emit(
                actions,
                Action::Transmit(packet::assemble_puback(id), Delivery::Unacknowledged),
            );
            return;
        }

        match self.state {
            SessionState::Connect => {
                self.transmit(Delivery::Acknowledged, now_ms, actions);
                self.state = SessionState::Connack;
            }
            SessionState::Publish => {
                let qos = FixedHeader::parse(&self.outgoing)
                    .map(|h| (h.control >> 1) & 0x03)
                    .unwrap_or(0);
                if qos == 0 {
                    self.transmit(Delivery::Unacknowledged, now_ms, actions);
                    self.state = SessionState::PublishQos0;
                } else {
                    self.transmit(Delivery::Acknowledged, now_ms, actions);
                    self.state = SessionState::PublishQos1;
                }
            }
            SessionState::PublishQos0 => {
                self.state = SessionState::Idle;
                emit(actions, Action::Notice(Notice::Published(None)));
            }
            SessionState::Subscribe => {
                self.transmit(Delivery::Acknowledged, now_ms, actions);
                self.state = SessionState::Suback;
            }
            SessionState::Unsubscribe => {
                self.transmit(Delivery::Acknowledged, now_ms, actions);
                self.state = SessionState::Unsuback;
            }
            SessionState::PingReq => {
                self.transmit(Delivery::Acknowledged, now_ms, actions);
                self.state = SessionState::PingResp;
            }
            SessionState::Disconnect => {
                self.transmit(Delivery::Unacknowledged, now_ms, actions);
                emit(actions, Action::Close);
                emit(actions, Action::Notice(Notice::Disconnected));
                self.state = SessionState::Disconnected;
                info!("mqtt: disconnected");
            }
            SessionState::Idle => {
                let interval = u64::from(self.keep_alive_seconds) * 1000;
                if interval != 0 && now_ms.saturating_sub(self.last_sent_ms) >= interval {
                    debug!("mqtt: keep-alive ping");
                    self.outgoing = packet::assemble_simple(PINGREQ);
                    self.keep_alive_ping = true;
                    self.transmit(Delivery::Acknowledged, now_ms, actions);
                    self.state = SessionState::PingResp;
                }
            }
            _ => {}
        }
    }

    /// Report whether the transport accepted the last unacknowledged
    /// transmission. A refused PUBACK is sent again on the next tick; a
    /// refused QoS 0 PUBLISH is reported instead of confirmed.
    pub fn transmitted(&mut self, ok: bool) -> Option<Notice> {
        if core::mem::take(&mut self.puback_in_flight) {
            if ok {
                self.puback_due = None;
            } else {
                warn!("mqtt: PUBACK refused, will resend");
            }
            return None;
        }
        if ok || self.state != SessionState::PublishQos0 {
            return None;
        }
        self.state = SessionState::Idle;
        Some(Notice::Failed(Error::TransmitFailed))
    }

    fn on_packet(&mut self, bytes: &[u8], actions: &mut Actions) {
        let control = bytes.first().copied().unwrap_or(0);

        if self.is_connected() && packet::is_publish(bytes) {
            match packet::parse_publish(bytes) {
                Ok(message) => {
                    if let Some(id) = message.packet_id {
                        self.puback_due = Some(id);
                    }
                    emit(actions, Action::Notice(Notice::Message(message)));
                }
                Err(error) => emit(actions, Action::Notice(Notice::Failed(error))),
            }
            return;
        }

        match self.state {
            SessionState::Connack => {
                if packet::is_connack(bytes) {
                    info!("mqtt: connected");
                    self.last_sent_ms = self.now_ms;
                    self.state = SessionState::Idle;
                    emit(actions, Action::Notice(Notice::Connected));
                } else if let Some(code) = packet::connack_return_code(bytes) {
                    warn!("mqtt: connection refused, code {}", code);
                    self.state = SessionState::Disconnected;
                    emit(actions, Action::Notice(Notice::ConnectRefused(code)));
                    emit(actions, Action::Close);
                } else {
                    emit(actions, Action::Notice(Notice::UnexpectedPacket(control)));
                }
            }
            SessionState::PublishQos1 => {
                if packet::is_puback(bytes, self.packet_id) {
                    self.state = SessionState::Idle;
                    emit(actions, Action::Notice(Notice::Published(Some(self.packet_id))));
                } else {
                    error!("mqtt: expected PUBACK {}", self.packet_id);
                    emit(actions, Action::Notice(Notice::UnexpectedPacket(control)));
                }
            }
            SessionState::Suback => {
                if packet::is_suback(bytes, self.packet_id, self.topic_count) {
                    self.state = SessionState::Idle;
                    let failed = packet::suback_return_codes(bytes)
                        .map(|codes| codes.contains(&SUBACK_FAILURE))
                        .unwrap_or(true);
                    let notice = if failed { Notice::SubackFailure } else { Notice::Subscribed };
                    emit(actions, Action::Notice(notice));
                } else {
                    emit(actions, Action::Notice(Notice::UnexpectedPacket(control)));
                }
            }
            SessionState::Unsuback => {
                if packet::is_unsuback(bytes, self.packet_id) {
                    self.state = SessionState::Idle;
                    emit(actions, Action::Notice(Notice::Unsubscribed));
                } else {
                    emit(actions, Action::Notice(Notice::UnexpectedPacket(control)));
                }
            }
            SessionState::PingResp => {
                if packet::is_pingresp(bytes) {
                    self.state = SessionState::Idle;
                    if !self.keep_alive_ping {
                        emit(actions, Action::Notice(Notice::PingResponse));
                    }
                    self.keep_alive_ping = false;
                } else {
                    emit(actions, Action::Notice(Notice::NoPingResponse));
                }
            }
            _ => emit(actions, Action::Notice(Notice::UnexpectedPacket(control))),
        }
    }
}
