pub mod cache;
pub mod partition;
