// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! This crate prints a symbolized native stack trace when the process receives a fatal signal,
//! then lets the signal terminate the process exactly as it would have without it.
//!
//! Architecturally, it consists of two parts:
//! 1. Setup, in normal context. [`enable`] builds a process-wide [`Symbolizer`] once, publishes the
//!    optional report path and installs the crash handler for the requested signals.  The
//!    symbolizer indexes the symbol tables and DWARF line tables of every loaded object into
//!    sorted arrays, so that resolving an address later is a binary search.
//! 2. The crash handler, which runs under the constraints of a signal handler.
//!    https://man7.org/linux/man-pages/man7/signal-safety.7.html
//!    In particular, memory allocation and synchronization such as mutexes are potentially UB.
//!    The handler therefore walks the stack into a fixed-size buffer, formats each line on the
//!    stack and writes it with a single `write`, to stderr and optionally to the report file.
//!    Handlers are installed with `SA_RESETHAND`, so once the report is written the handler
//!    re-raises the signal against the default disposition.  Exit status and core dumps are those
//!    of an uninstrumented process.
//!
//! Data collected:
//! 1. The signal number and name, and the process id.
//! 2. The stack of the crashing thread, innermost first, starting at the faulting instruction.
//!    Each frame is printed with whatever of function, file and line could be resolved.
//!
//! Outside of crashes, [`get_backtrace`] and [`print_backtrace`] return the same information for
//! the calling thread.
#![cfg(unix)]

mod collector;
mod crash_info;
mod shared;
mod stacktrace;
mod symbolizer;

pub use collector::*;
pub use crash_info::*;
pub use shared::configuration::FaultHandlerConfiguration;
pub use shared::constants::*;
pub use stacktrace::{get_backtrace, print_backtrace, supported};
pub use symbolizer::{Resolve, ResolveError, Symbolizer, SymbolizerError, Symbols};
