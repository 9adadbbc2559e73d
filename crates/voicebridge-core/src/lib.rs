//! Core types, config, and errors for Voicebridge.

pub mod config;
pub mod error;
pub mod storage;
pub mod types;
