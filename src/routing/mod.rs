//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming Request (method, path, query)
//!     → table.rs (load current snapshot)
//!     → template.rs (match path, bind route values)
//!     → constraint.rs (verb / LIST / composite predicates)
//!     → entry target (handler) → HandlerResult
//!
//! Mutation (mount/unmount):
//!     writer lock
//!     → copy current entries
//!     → append/remove
//!     → rebuild name index
//!     → publish new snapshot
//! ```
//!
//! # Design Decisions
//! - Snapshots are immutable; mutations publish new ones
//! - Deterministic: first match in insertion order wins
//! - Route names are unique, case-insensitive

pub mod constraint;
pub mod entry;
pub mod table;
pub mod template;

pub use constraint::{CompositeConstraint, FnConstraint, RouteConstraint, Verb, VerbConstraint};
pub use entry::{DataTokens, RouteEntry};
pub use table::{RouteTable, RouteTableOptions, RouteTableSnapshot, RoutingError};
pub use template::{RouteTemplate, RouteValues};
