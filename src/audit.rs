//! Audit trail of resolved authentication outcomes.
//!
//! This module provides:
//! - `AuditEvent`: Structured record of one outcome
//! - `AuditTrail`: In-memory audit event recorder
//! - `AuditListener`: Outcome listener emitting audit events through tracing
//!
//! Audit events hold identifiers and failure kinds only. Credentials and
//! attribute values never reach the trail.

mod event;
mod listener;
mod trail;

pub use event::{AuditEvent, AuditOutcome};
pub use listener::AuditListener;
pub use trail::AuditTrail;
