//! Core services invoked by the request-handling layer

pub mod analytics;
pub mod market;
pub mod position;
pub mod settlement;
pub mod trade;
pub mod users;
pub mod wallet;
