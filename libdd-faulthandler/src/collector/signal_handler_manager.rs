// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0
use super::crash_handler::handle_crash_signal;
use super::platform::MAX_TRACKED_SIGNALS;
use libc::{
    c_int, mmap, sigaltstack, MAP_ANON, MAP_FAILED, MAP_PRIVATE, PROT_NONE, PROT_READ, PROT_WRITE,
    SIGSTKSZ,
};
use nix::sys::signal::{self, SaFlags, SigAction, SigHandler};
use std::ptr;

#[derive(Debug, thiserror::Error)]
pub enum SignalRegistryError {
    #[error("{signum} is not a valid signal: {source}")]
    InvalidSignal {
        signum: c_int,
        #[source]
        source: nix::Error,
    },
    #[error("unable to install the crash handler for {signum}: {source}")]
    Sigaction {
        signum: c_int,
        #[source]
        source: nix::Error,
    },
}

/// The signals that currently have the crash handler installed.
///
/// Capacity is fixed; signals installed beyond it are still installed with the OS but are not
/// tracked, and are therefore not reset by [`uninstall_all`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignalSet {
    signals: [c_int; MAX_TRACKED_SIGNALS],
    len: usize,
}

impl Default for SignalSet {
    fn default() -> Self {
        Self::new()
    }
}

impl SignalSet {
    pub const fn new() -> Self {
        Self {
            signals: [0; MAX_TRACKED_SIGNALS],
            len: 0,
        }
    }

    /// Tracks `signum`. Returns `false` if it was already tracked or the set is full.
    pub fn insert(&mut self, signum: c_int) -> bool {
        if self.contains(signum) || self.len >= MAX_TRACKED_SIGNALS {
            return false;
        }
        self.signals[self.len] = signum;
        self.len += 1;
        true
    }

    pub fn contains(&self, signum: c_int) -> bool {
        self.as_slice().contains(&signum)
    }

    pub fn iter(&self) -> impl Iterator<Item = c_int> + '_ {
        self.as_slice().iter().copied()
    }

    pub fn as_slice(&self) -> &[c_int] {
        &self.signals[..self.len]
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn clear(&mut self) {
        self.len = 0;
    }
}

/// Installs the crash handler for `signum` and tracks it in `installed`.
///
/// The handler is one-shot: the kernel resets the disposition to the default before running it,
/// so a fault inside the handler, or the handler's own re-raise, terminates the process.
/// SAFETY:
///     Replaces any handler previously installed for `signum` without chaining to it.
pub fn install(
    signum: c_int,
    installed: &mut SignalSet,
    use_alt_stack: bool,
) -> Result<(), SignalRegistryError> {
    let signal_type = signal::Signal::try_from(signum)
        .map_err(|source| SignalRegistryError::InvalidSignal { signum, source })?;

    let extra_saflags = if use_alt_stack {
        SaFlags::SA_ONSTACK
    } else {
        SaFlags::empty()
    };
    let sig_action = SigAction::new(
        SigHandler::SigAction(handle_crash_signal),
        SaFlags::SA_RESETHAND | SaFlags::SA_NODEFER | extra_saflags,
        signal::SigSet::empty(),
    );
    // Safety: `handle_crash_signal` only performs async-signal-safe operations.
    unsafe { signal::sigaction(signal_type, &sig_action) }
        .map_err(|source| SignalRegistryError::Sigaction { signum, source })?;
    installed.insert(signum);
    Ok(())
}

/// Resets every tracked signal to its default disposition and forgets them. Idempotent.
pub fn uninstall_all(installed: &mut SignalSet) {
    let default = SigAction::new(
        SigHandler::SigDfl,
        SaFlags::empty(),
        signal::SigSet::empty(),
    );
    for signum in installed.iter() {
        if let Ok(signal_type) = signal::Signal::try_from(signum) {
            // Safety: restoring the default disposition has no preconditions.
            let _ = unsafe { signal::sigaction(signal_type, &default) };
        }
    }
    installed.clear();
}

/// Size of the alternate stack: the greater of 16 pages or SIGSTKSZ.
fn alt_stack_size() -> usize {
    std::cmp::max(SIGSTKSZ, 16 * page_size::get())
}

/// Gives the calling thread an alternate signal stack with a guard page at its end, unless it
/// already has one at least as large. The stack is never freed.
/// Inspired by https://github.com/rust-lang/rust/pull/69969/files
pub(crate) unsafe fn create_alt_stack() -> anyhow::Result<()> {
    let page_size = page_size::get();
    let sigalstack_base_size = alt_stack_size();

    let mut current: libc::stack_t = std::mem::zeroed();
    if sigaltstack(ptr::null(), &mut current) == 0
        && current.ss_flags & libc::SS_DISABLE == 0
        && current.ss_size >= sigalstack_base_size
    {
        return Ok(());
    }

    let stackp = mmap(
        ptr::null_mut(),
        sigalstack_base_size + page_size,
        PROT_READ | PROT_WRITE,
        MAP_PRIVATE | MAP_ANON,
        -1,
        0,
    );
    anyhow::ensure!(
        stackp != MAP_FAILED,
        "failed to allocate an alternative stack"
    );
    let guard_result = libc::mprotect(stackp, page_size, PROT_NONE);
    anyhow::ensure!(
        guard_result == 0,
        "failed to set up alternative stack guard page"
    );
    let stackp = stackp.add(page_size);

    let stack = libc::stack_t {
        ss_sp: stackp,
        ss_flags: 0,
        ss_size: sigalstack_base_size,
    };
    let rval = sigaltstack(&stack, ptr::null_mut());
    anyhow::ensure!(rval == 0, "sigaltstack failed {rval}");
    Ok(())
}

/// Reads the current disposition of `signum` by swapping it out and back in.
#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) fn current_disposition(signum: c_int) -> SigHandler {
    let probe = SigAction::new(
        SigHandler::SigDfl,
        SaFlags::empty(),
        signal::SigSet::empty(),
    );
    let signal_type = signal::Signal::try_from(signum).unwrap();
    let old = unsafe { signal::sigaction(signal_type, &probe) }.unwrap();
    unsafe { signal::sigaction(signal_type, &old) }.unwrap();
    old.handler()
}
