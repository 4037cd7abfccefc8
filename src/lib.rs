//! # ethmqtt - MQTT over a hand-built Ethernet stack
//!
//! An MQTT 3.1.1 client for controllers with no operating system. Every
//! layer between the Ethernet controller and the broker lives in this
//! crate: frame demultiplexing, ARP, IPv4 with ICMP echo, a single TCP
//! connection, and the MQTT codec and session.
//!
//! ## Features
//!
//! ### Network
//! - **Ethernet II / ARP**: answers requests for its own address from any
//!   state and resolves the broker (or the gateway) before connecting
//! - **IPv4 / ICMP**: header checksums, unicast and broadcast filtering,
//!   echo replies
//! - **TCP**: one stop-and-wait connection with active and passive close
//!   and a bounded retransmission policy
//! - **MQTT 3.1.1**: CONNECT, PUBLISH at QoS 0 and 1, SUBSCRIBE,
//!   UNSUBSCRIBE, PINGREQ, DISCONNECT and keep-alive
//!
//! ### Storage
//! - Byte-addressed storage traits with a RAM implementation
//! - Persistent broker and node addresses in 4-byte slots
//!
//! ### System
//! - Console line editor and typed operator commands
//! - Sequence-number sources for initial sequence numbers and ports
//!
//! ## Usage
//!
//! The firmware implements [`network::Transport`] for its Ethernet driver
//! and [`storage::Storage`] for its EEPROM, then drives a [`node::Node`]:
//!
//! ```rust,no_run
//! use ethmqtt::network::Transport;
//! use ethmqtt::node::{Config, Node};
//! use ethmqtt::storage::RamStorage;
//! use ethmqtt::system::command::Command;
//! use ethmqtt::system::random::MiddleSquare;
//! use ethmqtt::system::shell::{Shell, ShellResult};
//! # struct Driver;
//! # impl Transport for Driver {
//! #     type Error = ();
//! #     fn link_up(&mut self) -> bool { true }
//! #     fn data_available(&mut self) -> bool { false }
//! #     fn overflowed(&mut self) -> bool { false }
//! #     fn receive_frame(&mut self, _buf: &mut [u8]) -> Result<usize, ()> { Ok(0) }
//! #     fn send_frame(&mut self, _frame: &[u8]) -> Result<(), ()> { Ok(()) }
//! # }
//! # fn millis() -> u64 { 0 }
//! # fn uart_read() -> Option<u8> { None }
//!
//! let mut node = Node::new(Config::default(), Driver, RamStorage::<64>::new(), MiddleSquare::new(42))
//!     .unwrap();
//! let mut shell = Shell::new();
//! let mut console = heapless::String::<512>::new();
//!
//! loop {
//!     if let Some(byte) = uart_read() {
//!         if shell.input(byte, &mut console) == ShellResult::Ready {
//!             let fields = shell.fields();
//!             if let Some(command) = Command::parse(&fields) {
//!                 node.execute(command, millis(), &mut console);
//!             }
//!         }
//!     }
//!     node.poll(millis(), &mut console);
//!     // flush `console` to the UART
//!     console.clear();
//! }
//! ```
//!
//! ## Optional Features
//!
//! - `std`: Enable standard library support (default: disabled)
//! - `defmt`: Enable defmt logging support for embedded debugging

#![cfg_attr(not(feature = "std"), no_std)]
#![deny(missing_docs)]
#![warn(missing_debug_implementations)]

// Must come first so the logging macros are visible to every module.
mod fmt;

/// The Ethernet/ARP/IPv4/TCP stack and the MQTT client on top of it.
pub mod network;

/// The polling loop binding the stack to a transport and storage.
pub mod node;

/// Storage abstraction layer for non-volatile configuration.
///
/// Provides a byte-addressed interface over EEPROM, Flash or RAM and the
/// slot layout used for persistent addresses.
pub mod storage;

/// System utilities for embedded devices.
///
/// Contains the operator console and the sequence-number sources.
pub mod system;
