pub mod bids;
pub mod catalog;
pub mod database;
pub mod error;
pub mod handlers;
pub mod notify;
pub mod session;
pub mod store;
pub mod sync;
