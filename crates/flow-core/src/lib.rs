//! Core types for WhisperrFlow: the task/project/label and event model, view
//! descriptions, and the contracts for storage, persistence and identity.
//! Kept free of I/O so every other crate can depend on it.

pub mod backend;
pub mod events;
pub mod filter;
pub mod focus;
pub mod identity;
pub mod labels;
pub mod projects;
pub mod storage;
pub mod tasks;
