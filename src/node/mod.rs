//! The polling loop that ties the stack together.
//!
//! A [`Node`] owns the transport, the one frame buffer, the TCP
//! [`Connection`] and the MQTT [`Session`]. The firmware calls
//! [`Node::execute`] with each operator command and [`Node::poll`] on every
//! pass of its main loop. Each poll:
//!
//! 1. reports a receive overflow,
//! 2. lets the connection, then the session, send whatever is due,
//! 3. handles at most one received frame.
//!
//! Inbound frames are classified into owned actions before anything is
//! written back, so the same buffer serves both directions.
//!
//! ```rust
//! use ethmqtt::network::Transport;
//! use ethmqtt::node::{Config, Node};
//! use ethmqtt::storage::RamStorage;
//! use ethmqtt::system::command::Command;
//! use ethmqtt::system::random::MiddleSquare;
//!
//! struct Loopback;
//!
//! impl Transport for Loopback {
//!     type Error = ();
//!     fn link_up(&mut self) -> bool { true }
//!     fn data_available(&mut self) -> bool { false }
//!     fn overflowed(&mut self) -> bool { false }
//!     fn receive_frame(&mut self, _buf: &mut [u8]) -> Result<usize, ()> { Ok(0) }
//!     fn send_frame(&mut self, _frame: &[u8]) -> Result<(), ()> { Ok(()) }
//! }
//!
//! let mut node = Node::new(
//!     Config::default(),
//!     Loopback,
//!     RamStorage::<64>::new(),
//!     MiddleSquare::new(7),
//! )
//! .unwrap();
//! let mut console = heapless::String::<256>::new();
//! node.execute(Command::Connect { keep_alive_seconds: None }, 0, &mut console);
//! assert!(console.contains("MQTT IP not set"));
//! ```

use core::fmt::Write;

use heapless::String;

use crate::network::application::mqtt::packet::{ConnectFlags, Packets, QoS};
use crate::network::application::mqtt::session::{
    Action as SessionAction, Actions as SessionActions, Delivery, Event as SessionEvent, Request, Session,
    SessionState,
};
use crate::network::arp::{self, ArpPacket};
use crate::network::error::Error;
use crate::network::ethernet::MacAddress;
use crate::network::ipv4::{self, Ipv4Address};
use crate::network::notice::Notice;
use crate::network::tcp::connection::{
    Action as ConnectionAction, Actions as ConnectionActions, Connection, ConnectionState,
    Event as ConnectionEvent, Outgoing, RetryPolicy,
};
use crate::network::tcp::{self, SegmentSpec, Socket, TcpSegment};
use crate::network::{Interface, MAX_CLIENT_ID_LEN, MAX_FRAME_SIZE, Transport, icmp};
use crate::storage::Storage;
use crate::storage::config::{BROKER_IP, ConfigStore, LOCAL_IP};
use crate::system::command::{Command, HELP};
use crate::system::random::SequenceSource;

/// Standard MQTT port.
pub const MQTT_PORT: u16 = 1883;

/// Node settings fixed at start-up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Hardware address.
    pub mac: MacAddress,
    /// IPv4 address, unless one was stored with `set IP`.
    pub ip: Ipv4Address,
    /// Subnet mask.
    pub subnet_mask: Ipv4Address,
    /// Gateway for brokers outside the subnet.
    pub gateway: Ipv4Address,
    /// Local TCP port; 0 picks an ephemeral port per connection.
    pub local_port: u16,
    /// Broker TCP port.
    pub broker_port: u16,
    /// MQTT client identifier.
    pub client_id: String<MAX_CLIENT_ID_LEN>,
    /// Keep-alive used when `connect` gives none.
    pub keep_alive_seconds: u16,
    /// Retransmission policy for the connection.
    pub retry: RetryPolicy,
}

impl Default for Config {
    fn default() -> Self {
        let mut client_id = String::new();
        let _ = client_id.push_str("ethmqtt");
        Config {
            mac: MacAddress::new(0x02, 0x03, 0x04, 0x05, 0x06, 0x65),
            ip: Ipv4Address::new(192, 168, 2, 101),
            subnet_mask: Ipv4Address::new(255, 255, 255, 0),
            gateway: Ipv4Address::new(192, 168, 1, 1),
            local_port: 0,
            broker_port: MQTT_PORT,
            client_id,
            keep_alive_seconds: 10,
            retry: RetryPolicy::default(),
        }
    }
}

fn report<W: Write>(out: &mut W, notice: &Notice) {
    debug!("node: {}", notice);
    let _ = write!(out, "{notice}\r\n");
}

/// One MQTT client node on one Ethernet interface.
pub struct Node<T: Transport, S: Storage, R: SequenceSource> {
    transport: T,
    store: ConfigStore<S>,
    rng: R,
    interface: Interface,
    broker: Option<Ipv4Address>,
    local_port: u16,
    broker_port: u16,
    keep_alive_seconds: u16,
    connection: Connection,
    session: Session,
    frame: [u8; MAX_FRAME_SIZE],
}

impl<T: Transport, S: Storage, R: SequenceSource> core::fmt::Debug for Node<T, S, R> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Node")
            .field("interface", &self.interface)
            .field("broker", &self.broker)
            .field("connection", &self.connection.state())
            .field("session", &self.session.state())
            .finish_non_exhaustive()
    }
}

impl<T: Transport, S: Storage, R: SequenceSource> Node<T, S, R> {
    /// Create a node, reading stored addresses from `storage`.
    ///
    /// A stored local address overrides `config.ip`. Unreadable storage is
    /// treated as empty.
    pub fn new(config: Config, transport: T, storage: S, mut rng: R) -> Result<Self, Error> {
        let mut store = ConfigStore::new(storage);
        let broker = store.read_address(BROKER_IP).unwrap_or_else(|_| {
            warn!("node: broker address unreadable");
            None
        });
        let ip = match store.read_address(LOCAL_IP) {
            Ok(Some(ip)) => ip,
            Ok(None) => config.ip,
            Err(_) => {
                warn!("node: local address unreadable");
                config.ip
            }
        };

        let interface = Interface {
            mac: config.mac,
            ip,
            subnet_mask: config.subnet_mask,
            gateway: config.gateway,
        };
        let local = Socket {
            ip,
            mac: config.mac,
            port: config.local_port,
        };
        let connection = Connection::new(local, config.retry, rng.next_u32());
        let session = Session::new(&config.client_id, ConnectFlags::CLEAN_SESSION)?;
        info!("node: up at {}", ip);

        Ok(Node {
            transport,
            store,
            rng,
            interface,
            broker,
            local_port: config.local_port,
            broker_port: config.broker_port,
            keep_alive_seconds: config.keep_alive_seconds,
            connection,
            session,
            frame: [0; MAX_FRAME_SIZE],
        })
    }

    /// This node's addressing.
    pub fn interface(&self) -> &Interface {
        &self.interface
    }

    /// The configured broker, if any.
    pub fn broker(&self) -> Option<Ipv4Address> {
        self.broker
    }

    /// The TCP connection.
    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    /// The MQTT session.
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Mutable access to the MQTT session, e.g. to seed packet identifiers.
    pub fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }

    /// The transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Mutable access to the transport.
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Carry out one operator command, writing any response to `out`.
    pub fn execute<W: Write>(&mut self, command: Command<'_>, now_ms: u64, out: &mut W) {
        match command {
            Command::Status => self.status(out),
            Command::Help => {
                let _ = out.write_str(HELP);
            }
            Command::Connect { keep_alive_seconds } => {
                if !self.transport.link_up() {
                    report(out, &Notice::LinkDown);
                } else if self.broker.is_none() {
                    report(out, &Notice::NotConfigured);
                } else if self.connection.state() != ConnectionState::Idle {
                    report(out, &Notice::Busy);
                } else {
                    let keep_alive_seconds = keep_alive_seconds.unwrap_or(self.keep_alive_seconds);
                    self.request(Request::Connect { keep_alive_seconds }, now_ms, out);
                }
            }
            Command::Publish { topic, message, qos } => {
                let request = Request::Publish {
                    topic,
                    message: message.as_bytes(),
                    qos,
                };
                self.request(request, now_ms, out);
            }
            Command::Subscribe { topics } => {
                let request = Request::Subscribe {
                    topics: &topics,
                    qos: QoS::AtMostOnce,
                };
                self.request(request, now_ms, out);
            }
            Command::Unsubscribe { topics } => {
                self.request(Request::Unsubscribe { topics: &topics }, now_ms, out);
            }
            Command::Ping => self.request(Request::Ping, now_ms, out),
            Command::Disconnect => self.request(Request::Disconnect, now_ms, out),
            Command::SetBroker(ip) => match self.store.write_address(BROKER_IP, ip) {
                Ok(()) => {
                    self.broker = Some(ip);
                    let _ = write!(out, "MQTT IP: {ip}\r\n");
                }
                Err(_) => {
                    error!("node: storing broker address failed");
                    let _ = out.write_str("Could not store MQTT IP\r\n");
                }
            },
            Command::SetIp(ip) => match self.store.write_address(LOCAL_IP, ip) {
                Ok(()) => {
                    self.interface.ip = ip;
                    let _ = write!(out, "IP: {ip}\r\n");
                }
                Err(_) => {
                    error!("node: storing local address failed");
                    let _ = out.write_str("Could not store IP\r\n");
                }
            },
        }
        self.sync_session(out);
    }

    /// One pass of the main loop at time `now_ms`.
    pub fn poll<W: Write>(&mut self, now_ms: u64, out: &mut W) {
        if self.transport.overflowed() {
            report(out, &Notice::Overflow);
        }

        let actions = self.connection.handle(ConnectionEvent::Tick, now_ms, &mut self.rng);
        self.run_connection_actions(actions, out);
        self.sync_session(out);

        let ready = self.connection.is_established() && !self.connection.awaiting_ack();
        let actions = self.session.handle(SessionEvent::Tick { now_ms, ready });
        self.run_session_actions(actions, now_ms, out);

        if self.transport.data_available() {
            match self.transport.receive_frame(&mut self.frame) {
                Ok(len) => self.process_frame(len.min(MAX_FRAME_SIZE), now_ms, out),
                Err(_) => warn!("node: receive failed"),
            }
        }
        self.sync_session(out);
    }

    fn status<W: Write>(&mut self, out: &mut W) {
        let _ = write!(out, "IP: {}\r\n", self.interface.ip);
        match self.broker {
            Some(ip) => {
                let _ = write!(out, "MQTT IP: {ip}\r\n");
            }
            None => {
                let _ = out.write_str("MQTT IP: not set\r\n");
            }
        }
        let _ = write!(out, "MQTT Broker MAC: {}\r\n", self.connection.remote().mac);
        let _ = write!(out, "Link: {}\r\n", if self.transport.link_up() { "up" } else { "down" });
        let _ = write!(out, "TCP: {:?}\r\n", self.connection.state());
        let _ = write!(out, "MQTT: {:?}\r\n", self.session.state());
    }

    fn request<W: Write>(&mut self, request: Request<'_>, now_ms: u64, out: &mut W) {
        let actions = self.session.handle(SessionEvent::Request(request));
        self.run_session_actions(actions, now_ms, out);
    }

    /// Demultiplex the frame of `len` bytes sitting in the buffer.
    fn process_frame<W: Write>(&mut self, len: usize, now_ms: u64, out: &mut W) {
        let local_ip = self.interface.ip;
        let frame = &self.frame[..len];

        if arp::is_arp_request(frame, local_ip) {
            if let Some(n) = arp::write_arp_reply(&mut self.frame[..len], &self.interface) {
                trace!("node: answering ARP request");
                send_frame(&mut self.transport, &self.frame[..n]);
            }
            return;
        }

        if arp::is_arp_reply(frame, local_ip) {
            if let Some(reply) = ArpPacket::parse(frame) {
                let event = ConnectionEvent::ArpReply {
                    ip: reply.sender_ip,
                    mac: reply.sender_mac,
                };
                let actions = self.connection.handle(event, now_ms, &mut self.rng);
                self.run_connection_actions(actions, out);
            }
            return;
        }

        if !ipv4::is_ipv4(frame) {
            return;
        }
        let unicast = ipv4::is_unicast_to(frame, local_ip);
        if !unicast && !ipv4::is_broadcast(frame, &self.interface) {
            return;
        }

        if icmp::is_ping_request(frame) {
            if unicast {
                if let Some(n) = icmp::write_ping_response(&mut self.frame[..len]) {
                    trace!("node: answering ping");
                    send_frame(&mut self.transport, &self.frame[..n]);
                }
            }
            return;
        }

        if !tcp::is_tcp(frame) {
            return;
        }
        let Some(segment) = TcpSegment::parse(frame) else {
            return;
        };

        let actions = self
            .connection
            .handle(ConnectionEvent::Segment(segment), now_ms, &mut self.rng);

        // Received packets only ever produce notices and a request to close.
        let mut close = false;
        if actions.contains(&ConnectionAction::Deliver) {
            for packet in Packets::new(segment.payload) {
                for action in self.session.handle(SessionEvent::Packet(packet)) {
                    match action {
                        SessionAction::Notice(notice) => report(out, &notice),
                        SessionAction::Close => close = true,
                        SessionAction::Open | SessionAction::Transmit(..) => {}
                    }
                }
            }
        }

        self.run_connection_actions(actions, out);
        if close {
            self.close(now_ms, out);
        }
    }

    fn run_connection_actions<W: Write>(&mut self, actions: ConnectionActions, out: &mut W) {
        for action in actions {
            self.run_connection_action(action, out);
        }
    }

    /// Carry out one connection action; false if a frame could not be sent.
    fn run_connection_action<W: Write>(&mut self, action: ConnectionAction, out: &mut W) -> bool {
        match action {
            ConnectionAction::ArpRequest(target) => {
                match arp::write_arp_request(&mut self.frame, &self.interface, target) {
                    Some(n) => send_frame(&mut self.transport, &self.frame[..n]),
                    None => false,
                }
            }
            ConnectionAction::Segment(outgoing) => self.send_segment(&outgoing),
            ConnectionAction::Deliver => true,
            ConnectionAction::Notice(notice) => {
                report(out, &notice);
                true
            }
        }
    }

    fn send_segment(&mut self, outgoing: &Outgoing) -> bool {
        let payload: &[u8] = if outgoing.carries_data {
            self.connection.pending()
        } else {
            &[]
        };
        let spec = SegmentSpec {
            local: self.connection.local(),
            remote: self.connection.remote(),
            flags: outgoing.flags,
            seq: outgoing.seq,
            ack: outgoing.ack,
            options: outgoing.options,
        };
        match tcp::write_segment(&mut self.frame, &spec, payload) {
            Ok(len) => send_frame(&mut self.transport, &self.frame[..len]),
            Err(error) => {
                warn!("node: segment not built: {}", error);
                false
            }
        }
    }

    fn run_session_actions<W: Write>(&mut self, actions: SessionActions, now_ms: u64, out: &mut W) {
        for action in actions {
            match action {
                SessionAction::Open => self.open(out),
                SessionAction::Transmit(packet, delivery) => self.transmit(&packet, delivery, now_ms, out),
                SessionAction::Close => self.close(now_ms, out),
                SessionAction::Notice(notice) => report(out, &notice),
            }
        }
    }

    fn open<W: Write>(&mut self, out: &mut W) {
        let Some(broker) = self.broker else {
            report(out, &Notice::NotConfigured);
            return;
        };
        let local_port = match self.local_port {
            0 => self.rng.next_port(),
            port => port,
        };
        match self.connection.open(self.interface.ip, local_port, broker, self.broker_port) {
            Ok(()) => {
                let mask = self.interface.subnet_mask.to_bits();
                if (broker.to_bits() ^ self.interface.ip.to_bits()) & mask != 0 {
                    debug!("node: broker reached via {}", self.interface.gateway);
                    self.connection.route_via(self.interface.gateway);
                }
            }
            Err(error) => report(out, &Notice::Failed(error)),
        }
    }

    fn transmit<W: Write>(&mut self, packet: &[u8], delivery: Delivery, now_ms: u64, out: &mut W) {
        let loaded = match delivery {
            Delivery::Acknowledged => self.connection.send(packet, now_ms),
            Delivery::Unacknowledged => self.connection.send_unacknowledged(packet),
        };
        let sent = match loaded {
            Ok(action) => self.run_connection_action(action, out),
            Err(error) => {
                report(out, &Notice::Failed(error));
                false
            }
        };
        if delivery == Delivery::Unacknowledged {
            if sent {
                self.connection.commit();
            }
            if let Some(notice) = self.session.transmitted(sent) {
                report(out, &notice);
            }
        }
    }

    fn close<W: Write>(&mut self, now_ms: u64, out: &mut W) {
        if let Some(action) = self.connection.close(now_ms, &mut self.rng) {
            self.run_connection_action(action, out);
        }
    }

    /// End the session if the connection under it went away.
    fn sync_session<W: Write>(&mut self, out: &mut W) {
        if self.session.state() == SessionState::Disconnected {
            return;
        }
        let alive = matches!(
            self.connection.state(),
            ConnectionState::SendArp
                | ConnectionState::RecvArp
                | ConnectionState::SendSyn
                | ConnectionState::RecvSynAck
                | ConnectionState::Established
        );
        if !alive {
            for action in self.session.handle(SessionEvent::ConnectionLost) {
                if let SessionAction::Notice(notice) = action {
                    report(out, &notice);
                }
            }
        }
    }
}

fn send_frame<T: Transport>(transport: &mut T, frame: &[u8]) -> bool {
    match transport.send_frame(frame) {
        Ok(()) => true,
        Err(_) => {
            warn!("node: transmit failed");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::RamStorage;
    use crate::system::random::FixedSequence;
    use heapless::Vec;

    #[derive(Default)]
    struct Wire {
        link: bool,
        sent: Vec<Vec<u8, 128>, 8>,
    }

    impl Transport for Wire {
        type Error = ();

        fn link_up(&mut self) -> bool {
            self.link
        }

        fn data_available(&mut self) -> bool {
            false
        }

        fn overflowed(&mut self) -> bool {
            false
        }

        fn receive_frame(&mut self, _buf: &mut [u8]) -> Result<usize, ()> {
            Err(())
        }

        fn send_frame(&mut self, frame: &[u8]) -> Result<(), ()> {
            let frame = Vec::from_slice(&frame[..frame.len().min(128)]).map_err(|_| ())?;
            self.sent.push(frame).map_err(|_| ())
        }
    }

    type TestNode = Node<Wire, RamStorage<32>, FixedSequence<1>>;

    fn node(link: bool, broker: Option<Ipv4Address>) -> TestNode {
        let mut storage = RamStorage::<32>::new();
        if let Some(ip) = broker {
            ConfigStore::new(&mut storage).write_address(BROKER_IP, ip).unwrap();
        }
        let wire = Wire { link, ..Wire::default() };
        Node::new(Config::default(), wire, storage, FixedSequence::new([1000])).unwrap()
    }

    #[test]
    fn connect_needs_link_and_broker() {
        let mut out: String<128> = String::new();
        node(false, Some(Ipv4Address::new(192, 168, 2, 1))).execute(
            Command::Connect { keep_alive_seconds: None },
            0,
            &mut out,
        );
        assert_eq!(out.as_str(), "Link down\r\n");

        out.clear();
        node(true, None).execute(Command::Connect { keep_alive_seconds: None }, 0, &mut out);
        assert_eq!(out.as_str(), "MQTT IP not set\r\n");
    }

    #[test]
    fn connect_resolves_broker_first() {
        let broker = Ipv4Address::new(192, 168, 2, 1);
        let mut node = node(true, Some(broker));
        let mut out: String<128> = String::new();
        node.execute(Command::Connect { keep_alive_seconds: Some(5) }, 0, &mut out);
        assert_eq!(node.connection().state(), ConnectionState::SendArp);
        assert_eq!(node.session().state(), SessionState::Connect);

        node.poll(1, &mut out);
        assert_eq!(node.connection().state(), ConnectionState::RecvArp);
        let request = ArpPacket::parse(&node.transport().sent[0]).unwrap();
        assert_eq!(request.target_ip, broker);
        assert!(node.connection().local().port >= 49_152);
    }

    #[test]
    fn remote_broker_is_resolved_through_gateway() {
        let mut node = node(true, Some(Ipv4Address::new(10, 0, 0, 1)));
        let mut out: String<128> = String::new();
        node.execute(Command::Connect { keep_alive_seconds: None }, 0, &mut out);
        node.poll(1, &mut out);
        let request = ArpPacket::parse(&node.transport().sent[0]).unwrap();
        assert_eq!(request.target_ip, Ipv4Address::new(192, 168, 1, 1));
    }

    #[test]
    fn set_commands_persist() {
        let mut node = node(true, None);
        let mut out: String<256> = String::new();
        node.execute(Command::SetBroker(Ipv4Address::new(192, 168, 2, 1)), 0, &mut out);
        node.execute(Command::SetIp(Ipv4Address::new(192, 168, 2, 50)), 0, &mut out);
        assert_eq!(node.broker(), Some(Ipv4Address::new(192, 168, 2, 1)));
        assert_eq!(node.interface().ip, Ipv4Address::new(192, 168, 2, 50));
        assert_eq!(node.connection().local().ip, Ipv4Address::new(192, 168, 2, 101));

        out.clear();
        node.execute(Command::Status, 0, &mut out);
        assert!(out.starts_with("IP: 192.168.2.50\r\nMQTT IP: 192.168.2.1\r\n"));
        assert!(out.contains("TCP: Idle"));
        assert!(out.contains("MQTT: Disconnected"));
    }

    #[test]
    fn commands_need_a_session() {
        let mut node = node(true, None);
        let mut out: String<128> = String::new();
        node.execute(Command::Ping, 0, &mut out);
        assert_eq!(out.as_str(), "Not connected\r\n");
    }
}
