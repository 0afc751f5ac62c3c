//! Authenticated HTTP gateway for the admin console API.
//!
//! Adds bearer credentials to outbound requests, refreshes them with a
//! single-flight guard when the server answers 401, replays the original request
//! once, and turns attachment responses into file saves.

mod client;
pub mod config;
pub mod download;
mod errors;
pub mod i18n;
pub mod navigator;
pub mod pipeline;
pub mod request;
pub mod storage;
pub mod telemetry;
pub mod token;
pub mod types;

pub use client::{Gateway, GatewayBuilder};
pub use config::{Config, ConfigLocation, read_config};
pub use errors::Error;
pub use request::{OutboundRequest, ResponseType};
pub use token::{CredentialPair, CredentialStore};

#[cfg(test)]
mod tests;
