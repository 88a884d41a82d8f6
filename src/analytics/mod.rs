pub mod indicators;
pub mod statistics;
