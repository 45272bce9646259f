//! Real-time chat room built around a single broadcast hub.
//!
//! Every connected participant is a [`client::Client`] that joins the
//! [`hub::Hub`]. Whatever one participant sends is fanned out by the hub to
//! every participant's outbound buffer, the sender included. Each module
//! focuses on a concrete responsibility:
//!
//! - [`hub`] owns the member registry inside one dispatcher task and decides
//!   every join, leave and delivery; slow members are dropped, never waited on.
//! - [`client`] pumps one connection into and out of the hub.
//! - [`connection`] is the transport contract, with [`memory`] and [`tcp`]
//!   implementations.
//! - [`protocol`] provides the JSON line protocol spoken over TCP.
//! - [`server`] accepts TCP connections and performs the hello handshake.
//! - [`terminal`] is an interactive participant for a terminal user.
//! - [`trace`] is the sink the hub reports its activity to.
//! - [`cli`] parses the command-line interface for server and client modes.

pub mod cli;
pub mod client;
pub mod connection;
pub mod error;
pub mod hub;
pub mod memory;
pub mod message;
pub mod protocol;
pub mod server;
pub mod tcp;
pub mod terminal;
pub mod trace;
