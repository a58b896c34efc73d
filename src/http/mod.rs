//! HTTP Transport layer for the Model Context Protocol
//!
//! Provides the external API routing: the protected `/mcp` listener and the public discovery endpoints.

pub mod handlers;
