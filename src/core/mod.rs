//! Core runtime: topic naming, sensors and the acquisition loop.

pub mod executor;
pub mod sensors;
pub mod topic;
