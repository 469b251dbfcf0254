pub mod commands;
pub mod model;
pub mod queries;

pub use commands::{BidLedger, CreateBidCommand};
pub use model::{Bid, BidHistoryEntry, BidStatus};
pub use queries::BidRole;
