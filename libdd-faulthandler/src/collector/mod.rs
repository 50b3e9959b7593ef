// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

mod crash_handler;
mod emitters;
pub(crate) mod frame_walker;
mod platform;
mod signal_handler_manager;

pub use crash_handler::{
    disable, enable, enable_with_config, installed_signals, is_enabled, FaultHandlerError,
};
pub(crate) use crash_handler::shared_symbolizer;
pub use frame_walker::{Frame, FrameBuffer, Frames, UnresolvedFrame};
pub use platform::MAX_BACKTRACE_FRAMES;
pub use signal_handler_manager::{install, uninstall_all, SignalRegistryError, SignalSet};
