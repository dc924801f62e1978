//! HTTP-style status interface
//!
//! Served on the node's own port, next to the OMEGA protocol.
//!
//! # Endpoints
//!
//! - `GET /data/status` - Known peers and blocks
//! - `GET /data/log` - Recent node events
//! - `GET /` and anything else - Static documents from the document root

pub mod events;
pub mod handlers;
pub mod routes;

pub use events::{EventLog, LogEntry};
pub use handlers::{BlockInfo, ServerInfo, StatusResponse};
pub use routes::{route, HttpResponse};
