// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Platform constants for the fault handler.
//!
//! Everything the signal handler touches has a capacity fixed at compile time, since nothing on
//! that path is allowed to allocate.

/// Maximum number of frames to collect in a backtrace.
///
/// This limit prevents runaway frame walking in case of stack corruption.
pub const MAX_BACKTRACE_FRAMES: usize = 128;

/// Maximum number of signals whose installation is tracked for later removal.
pub const MAX_TRACKED_SIGNALS: usize = 32;

/// Size of the buffer holding the crash report path, including the trailing NUL.
pub const REPORT_PATH_CAPACITY: usize = 512;

/// Size of the stack buffer a single report line is formatted into.
pub const LINE_CAPACITY: usize = 1024;
