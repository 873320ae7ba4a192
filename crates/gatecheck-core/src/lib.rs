//! gatecheck-core - Core library for Gatecheck
//!
//! This crate contains the offline-tolerant ticket check-in pipeline shared by
//! all Gatecheck gate devices: the durable local scan queue, the check-in
//! classifier, the sync engine that reconciles queued scans against the
//! authoritative ledger, and the connectivity glue that drives sync.

pub mod classifier;
pub mod connectivity;
pub mod db;
pub mod error;
pub mod models;
pub mod service;
pub mod sync;

pub use error::{Error, Result};
pub use models::{ScanOutcome, ScanRecord, ScanRecordId, ScanStatus};
pub use service::CheckInService;
