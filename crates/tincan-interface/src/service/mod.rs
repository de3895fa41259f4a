//! # Service Layer
//!
//! The protocol client, the response classifier and the module that drives
//! both.

pub mod client;
pub mod dispatcher;
pub mod module;

pub use client::TincanClient;
pub use dispatcher::{classify_datagram, Emission, ResponseDispatcher};
pub use module::TincanInterface;
