//! simulo-server
//!
//! Session hub for Simulo editors and machines: WebSocket sessions,
//! machine presence, the compile queue and AI-driven deployments.

pub mod config;
pub mod types;
pub mod server;
pub mod connection;
pub mod compile_queue;
pub mod toolchain;
pub mod deploy;
pub mod codegen;
pub mod identity;
pub mod object_store;

// request handlers, reached through `server` and `connection`
mod api;
mod auth;
mod editor;
