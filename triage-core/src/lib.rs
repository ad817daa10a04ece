//! Triage Core
//!
//! Core types shared by every Triage crate.
//!
//! This crate contains:
//! - Domain types: runs, reports and declarative task configuration
//! - DTOs: request/response shapes for the HTTP and CLI surfaces

pub mod domain;
pub mod dto;
