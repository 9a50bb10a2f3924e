// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Labprint: Core types, errors and configuration shared across all crates.

pub mod config;
pub mod error;
pub mod human_errors;
pub mod page_range;
pub mod process;
pub mod types;

pub use config::PipelineConfig;
pub use error::LabprintError;
pub use page_range::PageSet;
pub use types::*;
