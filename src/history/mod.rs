pub mod store;
pub mod persistence;
