//! Core domain types and utilities for chainflow.
//!
//! This crate provides the foundational types and error handling shared by
//! the workflow engine and its binaries.

pub mod error;
pub mod id;

pub use error::Result;
pub use id::{ExecutionId, ParseIdError, WorkflowId};
