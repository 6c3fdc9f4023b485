//! Synchronous client for a legacy CRM REST API.
//!
//! # Overview
//! The server speaks a form-encoded JSON dialect: every call is a POST to a
//! single endpoint with a `method` name and a positional `rest_data` payload.
//! `protocol` builds those requests and parses the replies as plain data;
//! a `Transport` performs the HTTP round-trip. `SessionClient` holds the
//! session token and exposes record primitives, and `ModuleService` layers
//! validation and shaping on top for each module in `Module`.
//!
//! # Design
//! - Request building and response parsing never touch the network, so the
//!   whole stack is testable with `MockTransport`.
//! - Every module shares one record shape (`Record`, an ordered field map)
//!   and one service type; per-module behavior is data in a `ModuleSpec`.
//! - Validation runs fully before any request is sent and reports every
//!   violation at once.
//! - Errors are a single `CrmError` enum carrying the raw server response
//!   where one was received.

pub mod config;
pub mod convert;
pub mod crm;
pub mod error;
pub mod format;
pub mod http;
pub mod modules;
pub mod protocol;
pub mod query;
pub mod service;
pub mod session;
pub mod transport;
pub mod types;
pub mod validation;

pub use config::CrmConfig;
pub use convert::{convert_lead, invoice_from_quote, ConvertedLead, LeadConversion};
pub use crm::Crm;
pub use error::{CrmError, Result};
pub use http::{HttpMethod, HttpRequest, HttpResponse};
pub use modules::Module;
pub use query::{Criteria, Criterion, Operator};
pub use service::{ModuleService, ModuleSpec, ModuleStatistics, WriteKind};
pub use session::SessionClient;
pub use transport::{MockTransport, Transport, UreqTransport};
pub use types::{record, Record, RelationshipResult, SearchPage};
pub use validation::Rule;
