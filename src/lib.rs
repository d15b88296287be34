//! # DOM Query Bridge
//!
//! This library runs CSS-style selector queries against an in-memory
//! document tree by delegating the matching itself to an embedded,
//! sandboxed JavaScript engine (Boa), while exposing the host's native
//! tree objects to that engine as if they were native script objects.
//!
//! ## Architecture
//!
//! ```text
//! Caller (host code)
//!     │
//!     │ DomQuery facade
//!     ▼
//! Scoped engine session ── wrap factory stack
//!     │
//!     │ proxied host objects (nodes, collections)
//!     ▼
//! Selector engine script in Boa
//! ```
//!
//! ## Features
//!
//! - **Shape-driven wrapping**: nodes and the four host collection shapes
//!   each get a dedicated wrapper variant; everything else falls back to
//!   an opaque reflection wrapper
//! - **Synthesized properties**: `id`, `className`, and `innerHTML` exist
//!   only on the engine side, backed by host attributes and subtree
//!   serialization
//! - **Custom pseudo-selectors**: host predicates adapted to the engine's
//!   two-stage factory/matcher convention
//! - **Transparent instrumentation**: an opt-in decorator logs every
//!   boundary crossing without changing observable semantics

#![deny(missing_docs)]
#![deny(unsafe_op_in_unsafe_fn)]

pub mod config;
pub mod dom;
mod engine;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod pseudo;
pub mod query;
mod wrap;

// Re-export commonly used types
pub use config::BridgeConfig;
pub use dom::{parse_fragment, AttrEntry, Document, DomError, NodeKind, NodeRef, ParseDiagnostic};
pub use error::{BridgeError, Result};
pub use metrics::{BoundaryMetrics, BoundarySnapshot};
pub use pseudo::Pseudo;
pub use query::DomQuery;

/// The embedded selector engine script artifact
pub const SELECTOR_ENGINE_JS: &str = include_str!("selector_engine.js");

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
