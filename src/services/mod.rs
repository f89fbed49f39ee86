pub mod chart;
pub mod filter;
pub mod ranking;
pub mod report;
pub mod scoring;
pub mod session;
pub mod table;
