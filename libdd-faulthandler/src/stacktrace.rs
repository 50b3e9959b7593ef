// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Native backtraces outside of crashes, for diagnostics.

use crate::collector::shared_symbolizer;
use crate::crash_info::BacktraceFrame;
use std::io::{self, Write};
use tracing::debug;

/// Whether native backtraces can be collected and resolved on this platform.
pub fn supported() -> bool {
    cfg!(any(target_os = "linux", target_os = "macos"))
}

/// The calling thread's stack, innermost first, starting at the caller of this function.
///
/// `skip` drops that many additional innermost frames. Uses the same process-wide symbolizer as
/// the crash handler, creating it if needed; returns an empty list if it cannot be created.
#[inline(never)]
pub fn get_backtrace(skip: usize) -> Vec<BacktraceFrame> {
    if !supported() {
        return vec![];
    }
    match shared_symbolizer() {
        Ok(symbolizer) => symbolizer.backtrace(skip + 1),
        Err(e) => {
            debug!("Native backtrace not available: {e}");
            vec![]
        }
    }
}

/// Writes the caller's stack to `w`, one `  #<index> <frame>` line per frame.
#[inline(never)]
pub fn print_backtrace(skip: usize, w: &mut impl Write) -> io::Result<()> {
    let frames = get_backtrace(skip + 1);
    if frames.is_empty() {
        return writeln!(w, "  (native backtrace not available)");
    }
    for (i, frame) in frames.iter().enumerate() {
        writeln!(w, "  #{i} {frame}")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[inline(never)]
    fn outer_frame_for_test() -> Vec<BacktraceFrame> {
        get_backtrace(0)
    }

    #[test]
    #[cfg_attr(miri, ignore)]
    fn test_get_backtrace_contains_caller() {
        assert!(supported());
        let frames = outer_frame_for_test();
        assert!(!frames.is_empty());
        assert!(frames.len() <= crate::collector::MAX_BACKTRACE_FRAMES);
        assert!(frames
            .iter()
            .filter_map(|frame| frame.function.as_deref())
            .any(|name| name.contains("outer_frame_for_test")));
    }

    #[test]
    #[cfg_attr(miri, ignore)]
    fn test_print_backtrace() {
        let mut out = Vec::new();
        print_backtrace(0, &mut out).unwrap();
        let out = String::from_utf8(out).unwrap();
        assert!(out.starts_with("  #0 "), "{out}");
        assert!(out.lines().all(|line| line.starts_with("  #")), "{out}");
        assert!(out.contains("test_print_backtrace"), "{out}");
    }
}
