//! CLI infrastructure for the metamon training toolkit
//!
//! This module provides the command-line interface for training agents,
//! inspecting the live environment roster and recording replay corpora.

pub mod commands;
pub mod output;
pub mod telemetry;
