//! Data models for Gatecheck

mod check_in;
mod scan_record;
mod ticket;

pub use check_in::{
    CheckIn, CheckInId, CheckInStats, CheckInStatus, Classification, ScanOutcome, ScanStatus,
};
pub use scan_record::{NewScan, ScanRecord, ScanRecordId};
pub use ticket::{Ticket, TicketStatus};
