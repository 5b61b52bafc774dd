//! Synchronous client core for the fleet cluster-management API.
//!
//! # Overview
//! Turns a verb call plus loosely-structured options into a
//! `RequestDescriptor`, hands it to a `Connection`, and returns the raw
//! response body or a `FleetError`. The network round-trip lives behind the
//! `Connection` trait; `UreqConnection` is the blocking default.
//!
//! # Design
//! - `config` holds the recognized options, their defaults and the
//!   process-wide instance. A `Client` snapshots it at construction.
//! - `Client` opens its connection lazily and reuses it for every call.
//! - Options become query parameters for GET/DELETE/HEAD and the body for
//!   PUT/POST; empty options set neither.
//! - Every transport failure surfaces as `FleetError::Connection` carrying
//!   only the original message.
//! - `resources` adds the fleet v1 unit, machine and state endpoints on top
//!   of the verb methods.

pub mod client;
pub mod config;
pub mod connection;
pub mod error;
pub mod http;
pub mod resources;

pub use client::{Client, ClientBuilder};
pub use config::{Configuration, Setting, SslOptions};
pub use connection::{Connection, UreqConnection};
pub use error::{FleetError, FleetResult, TransportError};
pub use http::{Headers, Options, RequestDescriptor, Response, Verb};
pub use resources::{service_definition, StateFilter, UnitOption, UnitState};
