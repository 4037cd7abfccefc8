//! The single TCP connection to the broker.
//!
//! [`Connection`] is a pure state machine: it never touches the transport.
//! [`Connection::handle`] takes an [`Event`] and returns the [`Action`]s the
//! caller must carry out, in order. Outgoing segments are described by
//! [`Outgoing`]; the caller renders them with
//! [`write_segment`](super::write_segment), taking any payload from
//! [`Connection::pending`].
//!
//! Sequencing follows a stop-and-wait discipline: at most one data segment
//! is unacknowledged at a time, and inbound data is accepted only in order.

use heapless::Vec;

use super::{MSS_OPTION, Socket, TcpSegment, flags};
use crate::network::MAX_PACKET_LEN;
use crate::network::error::Error;
use crate::network::ethernet::MacAddress;
use crate::network::ipv4::Ipv4Address;
use crate::network::notice::Notice;
use crate::system::random::SequenceSource;

/// Time spent in [`ConnectionState::Closed`] before the connection is reusable.
pub const CLOSE_DELAY_MS: u64 = 100;

/// Upper bound on the actions produced by one event.
pub const MAX_ACTIONS: usize = 4;

/// Connection states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Nothing in progress; [`Connection::open`] may be called.
    Idle,
    /// An ARP request for the broker is due.
    SendArp,
    /// Waiting for the ARP reply.
    RecvArp,
    /// A SYN is due.
    SendSyn,
    /// Waiting for SYN+ACK.
    RecvSynAck,
    /// Data may flow.
    Established,
    /// Our FIN is out, not yet acknowledged.
    FinWait1,
    /// Our FIN is acknowledged; waiting for the peer's.
    FinWait2,
    /// The peer closed; our FIN is due.
    CloseWait,
    /// Waiting for the acknowledgment of our FIN after a passive close.
    LastAck,
    /// Torn down; becomes [`Idle`](Self::Idle) after [`CLOSE_DELAY_MS`].
    Closed,
}

#[cfg(feature = "defmt")]
impl defmt::Format for ConnectionState {
    fn format(&self, f: defmt::Formatter) {
        match self {
            ConnectionState::Idle => defmt::write!(f, "Idle"),
            ConnectionState::SendArp => defmt::write!(f, "SendArp"),
            ConnectionState::RecvArp => defmt::write!(f, "RecvArp"),
            ConnectionState::SendSyn => defmt::write!(f, "SendSyn"),
            ConnectionState::RecvSynAck => defmt::write!(f, "RecvSynAck"),
            ConnectionState::Established => defmt::write!(f, "Established"),
            ConnectionState::FinWait1 => defmt::write!(f, "FinWait1"),
            ConnectionState::FinWait2 => defmt::write!(f, "FinWait2"),
            ConnectionState::CloseWait => defmt::write!(f, "CloseWait"),
            ConnectionState::LastAck => defmt::write!(f, "LastAck"),
            ConnectionState::Closed => defmt::write!(f, "Closed"),
        }
    }
}

/// Retransmission policy for the wait-states.
///
/// After `interval_ms` without an answer the last request is sent again;
/// after `max_attempts` retransmissions the connection is abandoned.
/// `max_attempts == 0` disables retransmission and waits indefinitely.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Time between attempts.
    pub interval_ms: u64,
    /// Retransmissions before giving up.
    pub max_attempts: u8,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            interval_ms: 1000,
            max_attempts: 5,
        }
    }
}

/// A segment the caller must build and transmit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Outgoing {
    /// Control flags.
    pub flags: u8,
    /// Sequence number.
    pub seq: u32,
    /// Acknowledgment number.
    pub ack: u32,
    /// Option bytes.
    pub options: &'static [u8],
    /// Whether [`Connection::pending`] is the payload.
    pub carries_data: bool,
}

/// Work requested by the connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Broadcast an ARP request for this address.
    ArpRequest(Ipv4Address),
    /// Transmit a segment.
    Segment(Outgoing),
    /// Hand the payload of the segment just handled to the application.
    Deliver,
    /// Tell the operator.
    Notice(Notice),
}

/// Actions produced by one call.
pub type Actions = Vec<Action, MAX_ACTIONS>;

/// Inputs to the state machine.
#[derive(Debug, Clone, Copy)]
pub enum Event<'a> {
    /// Polling tick: drive the send side and check timers.
    Tick,
    /// An ARP reply addressed to us.
    ArpReply {
        /// Address that was resolved.
        ip: Ipv4Address,
        /// Its hardware address.
        mac: MacAddress,
    },
    /// A checksummed TCP segment addressed to us.
    Segment(TcpSegment<'a>),
}

/// The one TCP connection of the node.
#[derive(Debug, Clone)]
pub struct Connection {
    local: Socket,
    remote: Socket,
    next_hop: Ipv4Address,
    seq: u32,
    ack: u32,
    state: ConnectionState,
    pending: Vec<u8, MAX_PACKET_LEN>,
    awaiting_ack: bool,
    retry: RetryPolicy,
    attempts: u8,
    deadline_ms: u64,
}

fn emit(actions: &mut Actions, action: Action) {
    if actions.push(action).is_err() {
        warn!("tcp: action queue full");
    }
}

impl Connection {
    /// Create an idle connection for `local`, starting at sequence `isn`.
    pub fn new(local: Socket, retry: RetryPolicy, isn: u32) -> Self {
        Connection {
            local,
            remote: Socket::default(),
            next_hop: Ipv4Address::UNSPECIFIED,
            seq: isn,
            ack: 0,
            state: ConnectionState::Idle,
            pending: Vec::new(),
            awaiting_ack: false,
            retry,
            attempts: 0,
            deadline_ms: 0,
        }
    }

    /// Current state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Next sequence number to send.
    pub fn seq(&self) -> u32 {
        self.seq
    }

    /// Next sequence number expected from the peer.
    pub fn ack(&self) -> u32 {
        self.ack
    }

    /// This node's endpoint.
    pub fn local(&self) -> &Socket {
        &self.local
    }

    /// The broker's endpoint; its MAC is unspecified until ARP resolves it.
    pub fn remote(&self) -> &Socket {
        &self.remote
    }

    /// Payload of the last data segment, kept until it is acknowledged.
    pub fn pending(&self) -> &[u8] {
        &self.pending
    }

    /// Whether a data segment is still waiting for its acknowledgment.
    pub fn awaiting_ack(&self) -> bool {
        self.awaiting_ack
    }

    /// Whether data may be sent.
    pub fn is_established(&self) -> bool {
        self.state == ConnectionState::Established
    }

    /// Resolve `gateway` instead of the broker itself, for a broker
    /// outside the local subnet. Call right after [`open`](Self::open).
    pub fn route_via(&mut self, gateway: Ipv4Address) {
        if self.state == ConnectionState::SendArp {
            self.next_hop = gateway;
        }
    }

    /// Address whose hardware address is being resolved.
    pub fn next_hop(&self) -> Ipv4Address {
        self.next_hop
    }

    /// Start an active open from `local_ip:local_port` towards
    /// `remote_ip:remote_port`. The local address is fixed until the
    /// connection is closed.
    pub fn open(
        &mut self,
        local_ip: Ipv4Address,
        local_port: u16,
        remote_ip: Ipv4Address,
        remote_port: u16,
    ) -> Result<(), Error> {
        if self.state != ConnectionState::Idle {
            return Err(Error::Busy);
        }
        self.remote = Socket {
            ip: remote_ip,
            mac: MacAddress::UNSPECIFIED,
            port: remote_port,
        };
        self.next_hop = remote_ip;
        self.local.ip = local_ip;
        self.local.port = local_port;
        self.ack = 0;
        self.attempts = 0;
        self.state = ConnectionState::SendArp;
        debug!("tcp: opening to {}:{}", remote_ip, remote_port);
        Ok(())
    }

    fn load(&mut self, data: &[u8]) -> Result<(), Error> {
        if self.state != ConnectionState::Established {
            return Err(Error::NotConnected);
        }
        if self.awaiting_ack {
            return Err(Error::Busy);
        }
        self.pending.clear();
        self.pending
            .extend_from_slice(data)
            .map_err(|_| Error::BufferTooSmall)
    }

    /// Send `data`, keeping it for retransmission until the peer
    /// acknowledges `seq + data.len()`.
    pub fn send(&mut self, data: &[u8], now_ms: u64) -> Result<Action, Error> {
        self.load(data)?;
        self.awaiting_ack = true;
        self.attempts = 0;
        self.arm(now_ms);
        Ok(self.segment(flags::PSH | flags::ACK, &[], true))
    }

    /// Send `data` without waiting for an acknowledgment.
    ///
    /// The caller calls [`commit`](Self::commit) once the transport has
    /// accepted the frame.
    pub fn send_unacknowledged(&mut self, data: &[u8]) -> Result<Action, Error> {
        self.load(data)?;
        Ok(self.segment(flags::PSH | flags::ACK, &[], true))
    }

    /// Advance `seq` past the pending bytes and release them.
    pub fn commit(&mut self) {
        self.seq = self.seq.wrapping_add(self.pending.len() as u32);
        self.pending.clear();
        self.awaiting_ack = false;
    }

    /// Begin closing.
    ///
    /// From [`Established`](ConnectionState::Established) a FIN is
    /// returned for transmission; any unacknowledged data is abandoned. A
    /// handshake in progress is abandoned outright.
    pub fn close<R: SequenceSource>(&mut self, now_ms: u64, rng: &mut R) -> Option<Action> {
        match self.state {
            ConnectionState::Established => {
                if self.awaiting_ack {
                    self.commit();
                }
                self.state = ConnectionState::FinWait1;
                self.attempts = 0;
                self.arm(now_ms);
                Some(self.segment(flags::FIN | flags::ACK, &[], false))
            }
            ConnectionState::SendArp
            | ConnectionState::RecvArp
            | ConnectionState::SendSyn
            | ConnectionState::RecvSynAck => {
                self.enter_closed(now_ms, rng);
                None
            }
            _ => None,
        }
    }

    /// Advance the state machine by one event.
    pub fn handle<R: SequenceSource>(&mut self, event: Event<'_>, now_ms: u64, rng: &mut R) -> Actions {
        let mut actions = Actions::new();
        match event {
            Event::Tick => self.on_tick(now_ms, rng, &mut actions),
            Event::ArpReply { ip, mac } => {
                if self.state == ConnectionState::RecvArp && ip == self.next_hop {
                    self.remote.mac = mac;
                    self.state = ConnectionState::SendSyn;
                    self.attempts = 0;
                    emit(&mut actions, Action::Notice(Notice::ArpResolved(mac)));
                }
            }
            Event::Segment(segment) => self.on_segment(&segment, now_ms, rng, &mut actions),
        }
        actions
    }

    fn segment(&self, flags: u8, options: &'static [u8], carries_data: bool) -> Action {
        Action::Segment(Outgoing {
            flags,
            seq: self.seq,
            ack: self.ack,
            options,
            carries_data,
        })
    }

    fn arm(&mut self, now_ms: u64) {
        self.deadline_ms = now_ms.saturating_add(self.retry.interval_ms);
    }

    fn expired(&self, now_ms: u64) -> bool {
        self.retry.max_attempts != 0 && now_ms >= self.deadline_ms
    }

    fn enter_closed<R: SequenceSource>(&mut self, now_ms: u64, rng: &mut R) {
        self.state = ConnectionState::Closed;
        self.seq = rng.next_u32();
        self.ack = 0;
        self.pending.clear();
        self.awaiting_ack = false;
        self.attempts = 0;
        self.deadline_ms = now_ms.saturating_add(CLOSE_DELAY_MS);
    }

    fn on_tick<R: SequenceSource>(&mut self, now_ms: u64, rng: &mut R, actions: &mut Actions) {
        match self.state {
            ConnectionState::SendArp => {
                emit(actions, Action::ArpRequest(self.next_hop));
                self.state = ConnectionState::RecvArp;
                self.arm(now_ms);
            }
            ConnectionState::SendSyn => {
                emit(actions, self.segment(flags::SYN, &MSS_OPTION, false));
                self.state = ConnectionState::RecvSynAck;
                self.arm(now_ms);
            }
            ConnectionState::CloseWait => {
                emit(actions, self.segment(flags::FIN | flags::ACK, &[], false));
                self.state = ConnectionState::LastAck;
                self.attempts = 0;
                self.arm(now_ms);
            }
            ConnectionState::Closed => {
                if now_ms >= self.deadline_ms {
                    self.state = ConnectionState::Idle;
                }
            }
            ConnectionState::RecvArp
            | ConnectionState::RecvSynAck
            | ConnectionState::FinWait1
            | ConnectionState::LastAck => {
                if self.expired(now_ms) {
                    self.retransmit(now_ms, rng, actions);
                }
            }
            ConnectionState::Established => {
                if self.awaiting_ack && self.expired(now_ms) {
                    self.retransmit(now_ms, rng, actions);
                }
            }
            ConnectionState::Idle | ConnectionState::FinWait2 => {}
        }
    }

    fn retransmit<R: SequenceSource>(&mut self, now_ms: u64, rng: &mut R, actions: &mut Actions) {
        if self.attempts >= self.retry.max_attempts {
            warn!("tcp: giving up after {} attempts", self.attempts);
            self.enter_closed(now_ms, rng);
            emit(actions, Action::Notice(Notice::ConnectionFailed));
            return;
        }
        self.attempts += 1;
        self.arm(now_ms);
        debug!("tcp: retransmission {}", self.attempts);
        let action = match self.state {
            ConnectionState::RecvArp => Action::ArpRequest(self.next_hop),
            ConnectionState::RecvSynAck => self.segment(flags::SYN, &MSS_OPTION, false),
            ConnectionState::Established => self.segment(flags::PSH | flags::ACK, &[], true),
            _ => self.segment(flags::FIN | flags::ACK, &[], false),
        };
        emit(actions, action);
    }

    fn on_segment<R: SequenceSource>(
        &mut self,
        segment: &TcpSegment<'_>,
        now_ms: u64,
        rng: &mut R,
        actions: &mut Actions,
    ) {
        let header = &segment.header;
        if header.src_port != self.remote.port
            || header.dst_port != self.local.port
            || segment.ip.source != self.remote.ip
        {
            return;
        }

        match self.state {
            ConnectionState::Idle
            | ConnectionState::SendArp
            | ConnectionState::RecvArp
            | ConnectionState::Closed => return,
            _ => {}
        }

        if header.has(flags::RST) {
            let acceptable = if self.state == ConnectionState::RecvSynAck {
                header.has(flags::ACK) && header.ack_number == self.seq.wrapping_add(1)
            } else {
                header.seq_number == self.ack
            };
            if acceptable {
                info!("tcp: reset by peer");
                self.enter_closed(now_ms, rng);
                emit(actions, Action::Notice(Notice::ConnectionReset));
            }
            return;
        }

        match self.state {
            ConnectionState::SendSyn | ConnectionState::RecvSynAck => {
                if header.has(flags::SYN | flags::ACK) && header.ack_number == self.seq.wrapping_add(1) {
                    self.seq = self.seq.wrapping_add(1);
                    self.ack = header.seq_number.wrapping_add(1);
                    self.state = ConnectionState::Established;
                    self.attempts = 0;
                    emit(actions, self.segment(flags::ACK, &[], false));
                    emit(actions, Action::Notice(Notice::Established));
                    info!("tcp: established");
                }
            }
            ConnectionState::LastAck => {
                if header.has(flags::ACK)
                    && header.ack_number == self.seq.wrapping_add(1)
                    && header.seq_number == self.ack
                {
                    self.enter_closed(now_ms, rng);
                    emit(actions, Action::Notice(Notice::ConnectionClosed));
                }
            }
            ConnectionState::Established | ConnectionState::FinWait1 | ConnectionState::FinWait2 => {
                self.on_data(segment, now_ms, rng, actions);
            }
            _ => {}
        }
    }

    fn on_data<R: SequenceSource>(
        &mut self,
        segment: &TcpSegment<'_>,
        now_ms: u64,
        rng: &mut R,
        actions: &mut Actions,
    ) {
        let header = &segment.header;
        let mut fin_acked = false;
        if header.has(flags::ACK) {
            match self.state {
                ConnectionState::Established => {
                    let expected = self.seq.wrapping_add(self.pending.len() as u32);
                    if self.awaiting_ack && header.ack_number == expected {
                        self.commit();
                    }
                }
                ConnectionState::FinWait1 => {
                    if header.ack_number == self.seq.wrapping_add(1) {
                        self.seq = self.seq.wrapping_add(1);
                        fin_acked = true;
                    }
                }
                _ => {}
            }
        }

        let fin = header.has(flags::FIN);
        if segment.payload.is_empty() && !fin {
            if fin_acked {
                self.state = ConnectionState::FinWait2;
            }
            return;
        }
        if header.seq_number != self.ack {
            emit(
                actions,
                Action::Notice(Notice::UnexpectedSequence {
                    expected: self.ack,
                    received: header.seq_number,
                }),
            );
            if fin_acked {
                self.state = ConnectionState::FinWait2;
            }
            return;
        }

        self.ack = self.ack.wrapping_add(segment.sequence_len());
        emit(actions, self.segment(flags::ACK, &[], false));
        if !segment.payload.is_empty() {
            emit(actions, Action::Deliver);
        }

        match (self.state, fin) {
            (ConnectionState::Established, true) => {
                info!("tcp: peer closed");
                self.state = ConnectionState::CloseWait;
            }
            (ConnectionState::FinWait1 | ConnectionState::FinWait2, true) => {
                self.enter_closed(now_ms, rng);
                emit(actions, Action::Notice(Notice::ConnectionClosed));
            }
            (ConnectionState::FinWait1, false) if fin_acked => {
                self.state = ConnectionState::FinWait2;
            }
            _ => {}
        }
    }
}
