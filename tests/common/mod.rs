//! A scripted broker and a mock Ethernet driver for driving a [`Node`].

#![allow(dead_code)]

use std::collections::VecDeque;

use ethmqtt::network::arp::{ArpPacket, Operation};
use ethmqtt::network::checksum::checksum;
use ethmqtt::network::ethernet::{self, ETHER_TYPE_ARP, ETHER_TYPE_IPV4, EthernetHeader, MacAddress};
use ethmqtt::network::icmp::ICMP_TYPE_ECHO_REQUEST;
use ethmqtt::network::ipv4::{self, Ipv4Address, Ipv4Header, protocol};
use ethmqtt::network::tcp::{SegmentSpec, Socket, TcpSegment, write_segment};
use ethmqtt::network::{MAX_FRAME_SIZE, Transport};
use ethmqtt::node::{Config, Node};
use ethmqtt::storage::RamStorage;
use ethmqtt::storage::config::{BROKER_IP, ConfigStore};
use ethmqtt::system::random::FixedSequence;

pub const BROKER_MAC: MacAddress = MacAddress::new(0x00, 0x11, 0x22, 0x33, 0x44, 0x55);
pub const BROKER_ADDR: Ipv4Address = Ipv4Address::new(192, 168, 2, 1);
pub const BROKER_PORT: u16 = 1883;
/// Every value the node draws: its initial sequence number and its port seed.
pub const NODE_ISN: u32 = 1000;
pub const BROKER_ISN: u32 = 5000;

#[derive(Debug)]
pub struct MockError;

#[derive(Debug)]
pub struct MockWire {
    pub link: bool,
    pub overflow: bool,
    pub fail_sends: bool,
    pub inbound: VecDeque<Vec<u8>>,
    pub sent: Vec<Vec<u8>>,
}

impl Default for MockWire {
    fn default() -> Self {
        MockWire {
            link: true,
            overflow: false,
            fail_sends: false,
            inbound: VecDeque::new(),
            sent: Vec::new(),
        }
    }
}

impl Transport for MockWire {
    type Error = MockError;

    fn link_up(&mut self) -> bool {
        self.link
    }

    fn data_available(&mut self) -> bool {
        !self.inbound.is_empty()
    }

    fn overflowed(&mut self) -> bool {
        core::mem::take(&mut self.overflow)
    }

    fn receive_frame(&mut self, buf: &mut [u8]) -> Result<usize, MockError> {
        let frame = self.inbound.pop_front().ok_or(MockError)?;
        let len = frame.len().min(buf.len());
        buf[..len].copy_from_slice(&frame[..len]);
        Ok(len)
    }

    fn send_frame(&mut self, frame: &[u8]) -> Result<(), MockError> {
        if self.fail_sends {
            return Err(MockError);
        }
        self.sent.push(frame.to_vec());
        Ok(())
    }
}

pub type TestNode = Node<MockWire, RamStorage<64>, FixedSequence<1>>;

pub fn broker_socket() -> Socket {
    Socket {
        ip: BROKER_ADDR,
        mac: BROKER_MAC,
        port: BROKER_PORT,
    }
}

/// A node, its console and a clock, with the broker address already stored.
pub struct Harness {
    pub node: TestNode,
    pub console: String,
    pub now_ms: u64,
    /// Next sequence number the broker will use.
    pub broker_seq: u32,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Self {
        let mut storage = RamStorage::<64>::new();
        ConfigStore::new(&mut storage)
            .write_address(BROKER_IP, BROKER_ADDR)
            .unwrap();
        let node = Node::new(config, MockWire::default(), storage, FixedSequence::new([NODE_ISN])).unwrap();
        Harness {
            node,
            console: String::new(),
            now_ms: 0,
            broker_seq: BROKER_ISN,
        }
    }

    pub fn poll(&mut self) {
        self.now_ms += 1;
        self.node.poll(self.now_ms, &mut self.console);
    }

    pub fn poll_at(&mut self, now_ms: u64) {
        self.now_ms = now_ms;
        self.node.poll(now_ms, &mut self.console);
    }

    /// Queue `frame` and poll once so it is handled.
    pub fn deliver(&mut self, frame: Vec<u8>) {
        self.node.transport_mut().inbound.push_back(frame);
        self.poll();
    }

    pub fn execute(&mut self, line: &str) {
        let fields: Vec<&str> = line.split_whitespace().collect();
        let command = ethmqtt::system::command::Command::parse(&fields).expect("command parses");
        self.node.execute(command, self.now_ms, &mut self.console);
    }

    pub fn take_sent(&mut self) -> Vec<Vec<u8>> {
        core::mem::take(&mut self.node.transport_mut().sent)
    }

    pub fn take_console(&mut self) -> String {
        core::mem::take(&mut self.console)
    }

    pub fn node_socket(&self) -> Socket {
        *self.node.connection().local()
    }

    /// A broker segment acknowledging everything the node has sent.
    pub fn from_broker(&mut self, flags: u8, payload: &[u8]) -> Vec<u8> {
        let connection = self.node.connection();
        let ack = connection.seq().wrapping_add(connection.pending().len() as u32);
        let frame = tcp_frame(&broker_socket(), &self.node_socket(), flags, self.broker_seq, ack, payload);
        self.broker_seq = self.broker_seq.wrapping_add(payload.len() as u32);
        frame
    }

    /// Run `connect` through ARP, the handshake and CONNACK.
    pub fn establish(&mut self) {
        use ethmqtt::network::tcp::flags::{ACK, PSH, SYN};

        self.execute("connect");
        self.poll();
        let reply = arp_reply(&self.node.interface().ip, &self.node.interface().mac);
        self.deliver(reply);
        self.poll();

        let syn = self.take_sent().pop().expect("SYN sent");
        let syn = TcpSegment::parse(&syn).unwrap();
        let syn_ack = tcp_frame(
            &broker_socket(),
            &self.node_socket(),
            SYN | ACK,
            self.broker_seq,
            syn.header.seq_number.wrapping_add(1),
            &[],
        );
        self.broker_seq = self.broker_seq.wrapping_add(1);
        self.deliver(syn_ack);
        self.poll();

        let connack = self.from_broker(PSH | ACK, &[0x20, 0x02, 0x00, 0x00]);
        self.deliver(connack);
        self.take_sent();
        self.take_console();
    }
}

pub fn tcp_frame(from: &Socket, to: &Socket, flags: u8, seq: u32, ack: u32, payload: &[u8]) -> Vec<u8> {
    let mut buf = [0u8; MAX_FRAME_SIZE];
    let spec = SegmentSpec {
        local: from,
        remote: to,
        flags,
        seq,
        ack,
        options: &[],
    };
    let len = write_segment(&mut buf, &spec, payload).unwrap();
    buf[..len].to_vec()
}

fn arp_frame(destination: MacAddress, packet: ArpPacket) -> Vec<u8> {
    let mut frame = vec![0u8; 42];
    EthernetHeader {
        destination,
        source: packet.sender_mac,
        ether_type: ETHER_TYPE_ARP,
    }
    .write(&mut frame);
    packet.write(&mut frame[ethernet::HEADER_LEN..]);
    frame
}

/// The broker answering the node's ARP request.
pub fn arp_reply(node_ip: &Ipv4Address, node_mac: &MacAddress) -> Vec<u8> {
    arp_frame(
        *node_mac,
        ArpPacket {
            operation: Operation::Reply,
            sender_mac: BROKER_MAC,
            sender_ip: BROKER_ADDR,
            target_mac: *node_mac,
            target_ip: *node_ip,
        },
    )
}

/// The broker asking who has `target_ip`.
pub fn arp_request(target_ip: Ipv4Address) -> Vec<u8> {
    arp_frame(
        MacAddress::BROADCAST,
        ArpPacket {
            operation: Operation::Request,
            sender_mac: BROKER_MAC,
            sender_ip: BROKER_ADDR,
            target_mac: MacAddress::UNSPECIFIED,
            target_ip,
        },
    )
}

/// An ICMP echo request from the broker.
pub fn ping_request(to_ip: Ipv4Address, to_mac: MacAddress, ident: u16, seq: u16, data: &[u8]) -> Vec<u8> {
    let icmp_len = 8 + data.len();
    let mut frame = vec![0u8; ethernet::HEADER_LEN + ipv4::HEADER_LEN + icmp_len];
    EthernetHeader {
        destination: to_mac,
        source: BROKER_MAC,
        ether_type: ETHER_TYPE_IPV4,
    }
    .write(&mut frame);
    let ip_start = ethernet::HEADER_LEN;
    let icmp_start = ip_start + ipv4::HEADER_LEN;
    Ipv4Header::new(protocol::ICMP, BROKER_ADDR, to_ip, icmp_len as u16).write(&mut frame[ip_start..]);
    ipv4::compute_header_checksum(&mut frame[ip_start..icmp_start]);

    let icmp = &mut frame[icmp_start..];
    icmp[0] = ICMP_TYPE_ECHO_REQUEST;
    icmp[4..6].copy_from_slice(&ident.to_be_bytes());
    icmp[6..8].copy_from_slice(&seq.to_be_bytes());
    icmp[8..].copy_from_slice(data);
    let check = checksum(icmp);
    icmp[2..4].copy_from_slice(&check.to_be_bytes());
    frame
}
