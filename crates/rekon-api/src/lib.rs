//! Async HTTP transport for device configuration APIs.
//!
//! This crate is deliberately ignorant of object shapes: it moves untyped
//! JSON objects ([`WireObject`]) between the caller and the device, unwraps
//! the device's response envelope, and classifies failures into [`Error`].
//! Retries are left to the caller.

pub mod client;
pub mod error;
pub mod models;
pub mod transport;

pub use client::{DeviceClient, WireObject};
pub use error::Error;
pub use models::DeviceResponse;
pub use transport::{TlsMode, TransportConfig};
