//! Core data types for netacct

pub mod accounting;
pub mod flow;
pub mod session;
pub mod switch;
