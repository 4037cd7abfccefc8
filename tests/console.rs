mod common;

use common::*;
use ethmqtt::network::ipv4::Ipv4Address;
use ethmqtt::storage::config::{BROKER_IP, ConfigStore};
use ethmqtt::system::command::{Command, HELP};
use ethmqtt::system::shell::{Shell, ShellResult};

/// Type `line` at the console and run whatever it parses to.
fn type_line(h: &mut Harness, shell: &mut Shell, line: &str) -> bool {
    let mut echo = String::new();
    for &byte in line.as_bytes() {
        if shell.input(byte, &mut echo) == ShellResult::Ready {
            let fields = shell.fields();
            return match Command::parse(&fields) {
                Some(command) => {
                    h.node.execute(command, h.now_ms, &mut h.console);
                    true
                }
                None => false,
            };
        }
    }
    false
}

#[test]
fn set_mqtt_then_status() {
    let mut h = Harness::new();
    let mut shell = Shell::new();

    assert!(type_line(&mut h, &mut shell, "set mqtt 10 0 0 7\r"));
    assert_eq!(h.take_console(), "MQTT IP: 10.0.0.7\r\n");
    assert_eq!(h.node.broker(), Some(Ipv4Address::new(10, 0, 0, 7)));

    assert!(type_line(&mut h, &mut shell, "STATUS\r"));
    let status = h.take_console();
    assert!(status.contains("IP: 192.168.2.101\r\n"));
    assert!(status.contains("MQTT IP: 10.0.0.7\r\n"));
    assert!(status.contains("TCP: Idle\r\n"));
    assert!(status.contains("MQTT: Disconnected\r\n"));
}

#[test]
fn stored_broker_survives_restart() {
    let mut storage = ethmqtt::storage::RamStorage::<64>::new();
    ConfigStore::new(&mut storage)
        .write_address(BROKER_IP, Ipv4Address::new(172, 16, 0, 1))
        .unwrap();
    let node = ethmqtt::node::Node::new(
        ethmqtt::node::Config::default(),
        MockWire::default(),
        storage,
        ethmqtt::system::random::MiddleSquare::new(3),
    )
    .unwrap();
    assert_eq!(node.broker(), Some(Ipv4Address::new(172, 16, 0, 1)));
}

#[test]
fn unknown_lines_are_ignored() {
    let mut h = Harness::new();
    let mut shell = Shell::new();
    assert!(!type_line(&mut h, &mut shell, "reboot now\r"));
    assert!(!type_line(&mut h, &mut shell, "set MQTT 1.2.3\r"));
    assert!(h.take_console().is_empty());
}

#[test]
fn help_lists_commands() {
    let mut h = Harness::new();
    let mut shell = Shell::new();
    assert!(type_line(&mut h, &mut shell, "help\r"));
    assert_eq!(h.take_console(), HELP);
}

#[test]
fn connect_refused_without_link() {
    let mut h = Harness::new();
    h.node.transport_mut().link = false;
    let mut shell = Shell::new();
    type_line(&mut h, &mut shell, "connect\r");
    assert_eq!(h.take_console(), "Link down\r\n");
}

#[test]
fn quoted_message_is_published_whole() {
    let mut h = Harness::new();
    h.establish();
    let mut shell = Shell::new();
    assert!(type_line(&mut h, &mut shell, "publish room/light \"on full\"\r"));
    h.poll();
    let sent = h.take_sent();
    let segment = ethmqtt::network::tcp::TcpSegment::parse(&sent[0]).unwrap();
    assert!(segment.payload.ends_with(b"room/lighton full"));
}
