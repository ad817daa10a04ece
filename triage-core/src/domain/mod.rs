//! Core domain types
//!
//! These types are shared between the engine (which mutates runs and records
//! reports) and the server/CLI surfaces (which only read them).

pub mod report;
pub mod run;
pub mod task;
