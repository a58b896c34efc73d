//! Model Context Protocol (MCP) server handling and JSON-RPC implementations
//!
//! Provides JSON-RPC formatting, the per-request protocol server and the stateless transport binding it to HTTP.

pub mod rpc;
pub mod server;
pub mod transport;
