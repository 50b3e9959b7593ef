// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use super::emitters::{emit_crash_report, emit_report_saved, fault_ip, ReportPath, STDERR};
use super::frame_walker::FrameBuffer;
use super::signal_handler_manager::{
    create_alt_stack, install, uninstall_all, SignalRegistryError, SignalSet,
};
use crate::crash_info::{default_signal_names, map_name};
use crate::shared::configuration::FaultHandlerConfiguration;
use crate::symbolizer::{Symbolizer, SymbolizerError};
use libc::{c_int, c_void, siginfo_t, ucontext_t};
use nix::sys::signal::{self, SaFlags, SigAction, SigHandler};
use std::path::{Path, PathBuf};
use std::ptr;
use std::sync::atomic::Ordering::SeqCst;
use std::sync::atomic::{AtomicBool, AtomicPtr};
use std::sync::{Mutex, PoisonError};
use tracing::{debug, info, warn};

// Note that this file makes use the following async-signal safe functions in a signal handler.
// <https://man7.org/linux/man-pages/man7/signal-safety.7.html>
// - close
// - getpid
// - open
// - raise
// - sigaction
// - write

// Using mutexes inside a signal handler is not allowed, so the handler reads its state through
// `AtomicPtr`s. These are always either null_mut or `Box::into_raw()`.
// The symbolizer is published once and never freed. The report path is replaced on every
// reconfiguration; a crash racing with `enable`/`disable` on another thread may observe a freed
// path, which is an accepted limitation.
static SYMBOLIZER: AtomicPtr<Symbolizer> = AtomicPtr::new(ptr::null_mut());
static REPORT_PATH: AtomicPtr<ReportPath> = AtomicPtr::new(ptr::null_mut());
static ENABLED: AtomicBool = AtomicBool::new(false);

// Normal-context only.
static SYMBOLIZER_INIT: Mutex<()> = Mutex::new(());
static INSTALLED: Mutex<SignalSet> = Mutex::new(SignalSet::new());

#[derive(Debug, thiserror::Error)]
pub enum FaultHandlerError {
    #[error("unknown signal: {0}")]
    UnknownSignal(String),
    #[error(transparent)]
    Install(#[from] SignalRegistryError),
    #[error("report path contains a NUL byte: {}", .0.display())]
    InvalidReportPath(PathBuf),
    #[error("unable to create the alternate signal stack: {0:#}")]
    AltStack(anyhow::Error),
}

fn published_symbolizer() -> Option<&'static Symbolizer> {
    // Safety: only ever set from `Box::into_raw` and never freed.
    unsafe { SYMBOLIZER.load(SeqCst).as_ref() }
}

/// The process-wide symbolizer used by the crash handler, created on first use.
pub(crate) fn shared_symbolizer() -> Result<&'static Symbolizer, SymbolizerError> {
    if let Some(symbolizer) = published_symbolizer() {
        return Ok(symbolizer);
    }
    let _guard = SYMBOLIZER_INIT.lock().unwrap_or_else(PoisonError::into_inner);
    if let Some(symbolizer) = published_symbolizer() {
        return Ok(symbolizer);
    }
    let symbolizer = Box::into_raw(Box::new(Symbolizer::create(None, true)?));
    SYMBOLIZER.store(symbolizer, SeqCst);
    // Safety: just created from a box that is never freed.
    Ok(unsafe { &*symbolizer })
}

fn publish_report_path(report_path: Option<ReportPath>) {
    let new = report_path.map_or(ptr::null_mut(), |path| Box::into_raw(Box::new(path)));
    let old = REPORT_PATH.swap(new, SeqCst);
    if !old.is_null() {
        // Safety: This can only come from a box above.
        unsafe {
            std::mem::drop(Box::from_raw(old));
        }
    }
}

/// Installs the crash handler for `signals`, or for the default set when `None`.
///
/// Any previous configuration is removed first. When `report_path` is given, every crash report
/// is also written to that file.
///
/// Names are resolved in order and installed as they resolve. An unknown name stops the call with
/// [`FaultHandlerError::UnknownSignal`]; the signals installed before it stay installed, but the
/// fault handler is not reported as enabled.
///
/// PRECONDITIONS:
///     None
/// SAFETY:
///     Crash-handler configuration functions are not guaranteed to be reentrant.
/// ATOMICITY:
///     Not atomic with respect to a crash on another thread. Handlers are installed only after
///     the report path and symbolizer they read have been published.
pub fn enable(
    signals: Option<&[&str]>,
    report_path: Option<&Path>,
) -> Result<(), FaultHandlerError> {
    configure(signals, report_path, false, false)
}

/// Like [`enable`], taking every setting, including the alternate stack, from `config`.
pub fn enable_with_config(config: &FaultHandlerConfiguration) -> Result<(), FaultHandlerError> {
    configure(
        config.signals(),
        config.report_path(),
        config.create_alt_stack(),
        config.use_alt_stack(),
    )
}

fn configure<S: AsRef<str>>(
    signals: Option<&[S]>,
    report_path: Option<&Path>,
    create_alt: bool,
    use_alt: bool,
) -> Result<(), FaultHandlerError> {
    let mut installed = INSTALLED.lock().unwrap_or_else(PoisonError::into_inner);
    uninstall_all(&mut installed);
    ENABLED.store(false, SeqCst);

    let report_path = match report_path.map(|path| (path, ReportPath::new(path))) {
        None => None,
        Some((_, Some(path))) => Some(path),
        Some((path, None)) => {
            // The previous configuration is already gone; leave no stale path behind either.
            publish_report_path(None);
            return Err(FaultHandlerError::InvalidReportPath(path.to_path_buf()));
        }
    };
    publish_report_path(report_path);

    if let Err(e) = shared_symbolizer() {
        warn!("Crash reports will not be symbolized: {e}");
    }

    if create_alt {
        // Safety: This function has no documented preconditions.
        unsafe { create_alt_stack() }.map_err(FaultHandlerError::AltStack)?;
    }

    let names: Vec<&str> = match signals {
        Some(signals) => signals.iter().map(|name| name.as_ref()).collect(),
        None => default_signal_names().to_vec(),
    };
    for name in names {
        let signum =
            map_name(name).ok_or_else(|| FaultHandlerError::UnknownSignal(name.into()))?;
        install(signum, &mut installed, use_alt)?;
        debug!(signal = name, signum, "Installed crash handler");
    }

    ENABLED.store(true, SeqCst);
    info!(signals = ?installed.as_slice(), "Fault handler enabled");
    Ok(())
}

/// Restores the default disposition of every handled signal and forgets the report path.
pub fn disable() {
    let mut installed = INSTALLED.lock().unwrap_or_else(PoisonError::into_inner);
    uninstall_all(&mut installed);
    ENABLED.store(false, SeqCst);
    publish_report_path(None);
    info!("Fault handler disabled");
}

pub fn is_enabled() -> bool {
    ENABLED.load(SeqCst)
}

/// The signal numbers that currently have the crash handler installed.
pub fn installed_signals() -> Vec<c_int> {
    INSTALLED
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .as_slice()
        .to_vec()
}

/// Writes the crash report, then lets the signal terminate the process as if nothing had been
/// installed.
///
/// SIGNAL SAFETY:
///     See the list of syscalls at the top of this file. Everything else works on stack buffers
///     and on state that was frozen before the handler was installed.
pub(crate) extern "C" fn handle_crash_signal(
    signum: c_int,
    _sig_info: *mut siginfo_t,
    ucontext: *mut c_void,
) {
    let symbolizer = published_symbolizer();
    let mut frames = FrameBuffer::new(0);
    if symbolizer.is_some() {
        // Safety: the unsynchronized unwinder is the only one usable here.
        frames = unsafe { FrameBuffer::capture_unsynchronized() };
        // Everything above the faulting instruction belongs to this handler.
        if let Some(ip) = fault_ip(ucontext as *const ucontext_t) {
            frames.trim_to(ip);
        }
    }

    emit_crash_report(STDERR, signum, symbolizer, &frames, true);

    // Safety: published before any handler was installed.
    if let Some(path) = unsafe { REPORT_PATH.load(SeqCst).as_ref() } {
        if let Some(fd) = path.open() {
            emit_crash_report(fd, signum, symbolizer, &frames, false);
            // Safety: `fd` was opened above and is not used afterwards.
            unsafe { libc::close(fd) };
            emit_report_saved(STDERR, path);
        }
    }

    reraise(signum);
}

/// Restores the default disposition and delivers `signum` again, so that termination, exit
/// status and core dumps are those of an uninstrumented process.
fn reraise(signum: c_int) {
    if let Ok(signal_type) = signal::Signal::try_from(signum) {
        let default = SigAction::new(
            SigHandler::SigDfl,
            SaFlags::empty(),
            signal::SigSet::empty(),
        );
        // Safety: restoring the default disposition has no preconditions.
        let _ = unsafe { signal::sigaction(signal_type, &default) };
    }
    // Safety: No preconditions.
    unsafe { libc::raise(signum) };
}
