//! Configuration components for the server and client halves

pub mod client;
pub mod server;

pub use client::*;
pub use server::*;
