// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The vocabulary of crash signals the fault handler can be attached to.
//!
//! Everything here is a compile-time table or a `const fn` match, so the same lookups used to
//! configure the handler in normal context are also usable from inside it.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[allow(clippy::upper_case_acronyms)]
/// See <https://man7.org/linux/man-pages/man7/signal.7.html>
pub enum CrashSignal {
    SIGSEGV,
    SIGABRT,
    SIGFPE,
    SIGBUS,
    SIGILL,
    SIGTRAP,
    SIGSYS,
}

/// Every crash signal known on this platform, in the order reported by [`signal_names`].
pub const CRASH_SIGNALS: &[CrashSignal] = &[
    CrashSignal::SIGSEGV,
    CrashSignal::SIGABRT,
    CrashSignal::SIGFPE,
    CrashSignal::SIGBUS,
    CrashSignal::SIGILL,
    CrashSignal::SIGTRAP,
    CrashSignal::SIGSYS,
];

/// The signals handled when the caller does not name any.
pub const DEFAULT_CRASH_SIGNALS: [CrashSignal; 4] = [
    CrashSignal::SIGSEGV,
    CrashSignal::SIGABRT,
    CrashSignal::SIGFPE,
    CrashSignal::SIGBUS,
];

const SIGNAL_NAMES: [&str; 7] = [
    CrashSignal::SIGSEGV.name(),
    CrashSignal::SIGABRT.name(),
    CrashSignal::SIGFPE.name(),
    CrashSignal::SIGBUS.name(),
    CrashSignal::SIGILL.name(),
    CrashSignal::SIGTRAP.name(),
    CrashSignal::SIGSYS.name(),
];

const DEFAULT_SIGNAL_NAMES: [&str; 4] = [
    DEFAULT_CRASH_SIGNALS[0].name(),
    DEFAULT_CRASH_SIGNALS[1].name(),
    DEFAULT_CRASH_SIGNALS[2].name(),
    DEFAULT_CRASH_SIGNALS[3].name(),
];

impl CrashSignal {
    pub const fn name(self) -> &'static str {
        match self {
            CrashSignal::SIGSEGV => "SIGSEGV",
            CrashSignal::SIGABRT => "SIGABRT",
            CrashSignal::SIGFPE => "SIGFPE",
            CrashSignal::SIGBUS => "SIGBUS",
            CrashSignal::SIGILL => "SIGILL",
            CrashSignal::SIGTRAP => "SIGTRAP",
            CrashSignal::SIGSYS => "SIGSYS",
        }
    }

    pub const fn signum(self) -> libc::c_int {
        match self {
            CrashSignal::SIGSEGV => libc::SIGSEGV,
            CrashSignal::SIGABRT => libc::SIGABRT,
            CrashSignal::SIGFPE => libc::SIGFPE,
            CrashSignal::SIGBUS => libc::SIGBUS,
            CrashSignal::SIGILL => libc::SIGILL,
            CrashSignal::SIGTRAP => libc::SIGTRAP,
            CrashSignal::SIGSYS => libc::SIGSYS,
        }
    }

    /// Exact, case-sensitive lookup by name (e.g. `"SIGSEGV"`).
    pub fn from_name(name: &str) -> Option<Self> {
        CRASH_SIGNALS
            .iter()
            .copied()
            .find(|signal| signal.name() == name)
    }

    pub const fn from_signum(signum: libc::c_int) -> Option<Self> {
        match signum {
            libc::SIGSEGV => Some(CrashSignal::SIGSEGV),
            libc::SIGABRT => Some(CrashSignal::SIGABRT),
            libc::SIGFPE => Some(CrashSignal::SIGFPE),
            libc::SIGBUS => Some(CrashSignal::SIGBUS),
            libc::SIGILL => Some(CrashSignal::SIGILL),
            libc::SIGTRAP => Some(CrashSignal::SIGTRAP),
            libc::SIGSYS => Some(CrashSignal::SIGSYS),
            _ => None,
        }
    }
}

/// Maps a signal name from the crash vocabulary to its platform number.
pub fn map_name(name: &str) -> Option<libc::c_int> {
    CrashSignal::from_name(name).map(CrashSignal::signum)
}

/// Symbolic name for a signal number.
///
/// SIGNAL SAFETY:
///     `strsignal` and friends may allocate or read locale data; this is a plain match.
pub const fn signal_name(signum: libc::c_int) -> &'static str {
    match CrashSignal::from_signum(signum) {
        Some(signal) => signal.name(),
        None => "UNKNOWN",
    }
}

/// Every name accepted by [`map_name`].
pub fn signal_names() -> &'static [&'static str] {
    &SIGNAL_NAMES
}

/// The names installed when the fault handler is enabled without an explicit list.
pub fn default_signal_names() -> &'static [&'static str] {
    &DEFAULT_SIGNAL_NAMES
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_name() {
        assert_eq!(map_name("SIGSEGV"), Some(libc::SIGSEGV));
        assert_eq!(map_name("SIGSYS"), Some(libc::SIGSYS));
        assert_eq!(map_name("sigsegv"), None);
        assert_eq!(map_name("SIGKILL"), None);
        assert_eq!(map_name(""), None);
    }

    #[test]
    fn test_signal_name() {
        for signal in CRASH_SIGNALS {
            assert_eq!(signal_name(signal.signum()), signal.name());
        }
        assert_eq!(signal_name(libc::SIGINT), "UNKNOWN");
        assert_eq!(signal_name(-1), "UNKNOWN");
    }

    #[test]
    fn test_default_signals_are_stable() {
        assert_eq!(
            default_signal_names(),
            &["SIGSEGV", "SIGABRT", "SIGFPE", "SIGBUS"]
        );
        assert_eq!(default_signal_names(), default_signal_names());
        for name in default_signal_names() {
            assert!(signal_names().contains(name));
        }
    }

    #[test]
    fn test_names_match_table() {
        let names: Vec<_> = CRASH_SIGNALS.iter().map(|s| s.name()).collect();
        assert_eq!(names, signal_names());
    }
}
