// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Labprint Print: the job store, bounded queue and worker pool, plus printer
// resolution and the two dispatch paths (silent command print and the
// rendering fallback with device-mode negotiation).

pub mod cups_device;
pub mod device;
pub mod directives;
pub mod dispatch;
pub mod native;
pub mod pipeline;
pub mod primary;
pub mod print_log;
pub mod printers;
pub mod queue;
pub mod reaper;
pub mod store;
pub mod worker;

pub use dispatch::{Dispatcher, PrintDispatcher};
pub use pipeline::PrintPipeline;
pub use print_log::PrintLog;
pub use printers::{CupsDirectory, PrinterDirectory};
pub use queue::JobQueue;
pub use store::JobStore;
