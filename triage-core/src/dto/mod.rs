//! Data Transfer Objects
//!
//! Request and response shapes used by the HTTP and CLI surfaces.

pub mod connection;
pub mod monitor;
pub mod report;
pub mod run;
pub mod task;
