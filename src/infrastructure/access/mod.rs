//! Access control facade
//!
//! Ties the credential store, quota counter and usage ledger together behind
//! the three calls a request path needs: authenticate, admit, record.

mod service;

pub use service::{AccessControl, AccessStatus, KeyQuotaStatus};
