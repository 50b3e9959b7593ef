// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Stack capture into a fixed-capacity buffer.
//!
//! Capturing and resolving are split: the unwinder only records instruction pointers into a
//! [`FrameBuffer`], and [`FrameBuffer::frames`] later pairs each of them with its symbols. Both
//! halves work without allocating, so the same walker serves the crash handler and the ordinary
//! backtrace query.

use super::platform::MAX_BACKTRACE_FRAMES;
use crate::symbolizer::{Resolve, ResolveError};

/// One frame of a walk. Text fields borrow from the resolver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame<'a> {
    pub address: usize,
    pub function: Option<&'a str>,
    pub file: Option<&'a str>,
    pub line: Option<u32>,
}

impl Frame<'_> {
    pub const fn bare(address: usize) -> Self {
        Self {
            address,
            function: None,
            file: None,
            line: None,
        }
    }
}

/// A frame whose symbols could not be resolved. The walk carries on past it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("cannot resolve {address:#x}: {reason}")]
pub struct UnresolvedFrame {
    pub address: usize,
    pub reason: ResolveError,
}

impl UnresolvedFrame {
    /// The frame as it should still be reported, without symbol information.
    pub const fn frame(&self) -> Frame<'static> {
        Frame::bare(self.address)
    }
}

#[derive(Debug, Clone)]
pub struct FrameBuffer {
    addresses: [usize; MAX_BACKTRACE_FRAMES],
    len: usize,
    skip: usize,
    exact_first: bool,
}

impl FrameBuffer {
    /// An empty buffer that will discard the first `skip` recorded frames.
    pub const fn new(skip: usize) -> Self {
        Self {
            addresses: [0; MAX_BACKTRACE_FRAMES],
            len: 0,
            skip,
            exact_first: false,
        }
    }

    /// Feeds one frame encountered by the unwinder, innermost first.
    ///
    /// Skipping counts every encountered frame. Returns `false` once the buffer is full, which
    /// tells the unwinder to stop. A zero address marks the end of the stack and is not recorded.
    pub fn record(&mut self, address: usize) -> bool {
        if address == 0 {
            return false;
        }
        if self.skip > 0 {
            self.skip -= 1;
            return true;
        }
        if self.len >= MAX_BACKTRACE_FRAMES {
            return false;
        }
        self.addresses[self.len] = address;
        self.len += 1;
        self.len < MAX_BACKTRACE_FRAMES
    }

    /// Captures the calling thread's stack starting at the caller of this function, dropping the
    /// `skip` innermost caller frames.
    ///
    /// Uses the synchronized unwinder and must not be called from a signal handler.
    #[inline(never)]
    pub fn capture(skip: usize) -> Self {
        let entry = Self::capture as fn(usize) -> Self as usize;
        let mut buffer = Self::new(0);
        let mut entry_found = false;
        backtrace::trace(|frame| {
            if !entry_found && frame.symbol_address() as usize == entry {
                entry_found = true;
                buffer = Self::new(skip);
                return true;
            }
            buffer.record(frame.ip() as usize)
        });
        if !entry_found {
            // Unwinder frames stay at the top; the caller's skip is the best estimate available.
            buffer.discard_innermost(skip);
        }
        buffer
    }

    /// Captures every frame of the current stack, including the caller's own.
    ///
    /// # Safety
    /// Uses the unsynchronized unwinder. Intended for the crash handler, where no other thread
    /// can be relied upon to release the unwinder's lock.
    pub unsafe fn capture_unsynchronized() -> Self {
        let mut buffer = Self::new(0);
        backtrace::trace_unsynchronized(|frame| buffer.record(frame.ip() as usize));
        buffer
    }

    /// Drops every frame above `fault_ip`, which becomes the innermost frame and is resolved at
    /// its exact address. Leaves the buffer untouched and returns `false` if `fault_ip` was not
    /// captured.
    pub fn trim_to(&mut self, fault_ip: usize) -> bool {
        let Some(position) = self.addresses().iter().position(|&ip| ip == fault_ip) else {
            return false;
        };
        self.discard_innermost(position);
        self.exact_first = true;
        true
    }

    pub fn discard_innermost(&mut self, count: usize) {
        let count = count.min(self.len);
        self.addresses.copy_within(count..self.len, 0);
        self.len -= count;
    }

    pub fn addresses(&self) -> &[usize] {
        &self.addresses[..self.len]
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Resolves the captured frames, innermost first.
    pub fn frames<'b, 'r, R: Resolve>(&'b self, resolver: &'r R) -> Frames<'b, 'r, R> {
        Frames {
            buffer: self,
            resolver,
            next: 0,
        }
    }

    /// Return addresses point past the call; look up the call instruction instead.
    fn lookup_address(&self, index: usize, address: usize) -> usize {
        if index == 0 && self.exact_first {
            address
        } else {
            address.saturating_sub(1)
        }
    }
}

/// Iterator returned by [`FrameBuffer::frames`].
///
/// Yields exactly one item per captured address; a failed lookup is an `Err` item rather than
/// the end of the walk.
pub struct Frames<'b, 'r, R> {
    buffer: &'b FrameBuffer,
    resolver: &'r R,
    next: usize,
}

impl<'r, R: Resolve> Iterator for Frames<'_, 'r, R> {
    type Item = Result<Frame<'r>, UnresolvedFrame>;

    fn next(&mut self) -> Option<Self::Item> {
        let index = self.next;
        let address = *self.buffer.addresses().get(index)?;
        self.next += 1;
        let lookup = self.buffer.lookup_address(index, address);
        let resolver: &'r R = self.resolver;
        Some(match resolver.resolve(lookup) {
            Ok(symbols) => Ok(Frame {
                address,
                function: symbols.function,
                file: symbols.file,
                line: symbols.line,
            }),
            Err(reason) => Err(UnresolvedFrame { address, reason }),
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.buffer.len() - self.next;
        (remaining, Some(remaining))
    }
}

impl<R: Resolve> ExactSizeIterator for Frames<'_, '_, R> {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbolizer::Symbols;

    /// Resolves even addresses at `0x1000 * n`, fails on addresses ending in `0xbad`.
    struct FakeResolver;

    impl Resolve for FakeResolver {
        fn resolve(&self, address: usize) -> Result<Symbols<'_>, ResolveError> {
            if address & 0xfff == 0xbad {
                return Err(ResolveError::NoDebugInfo);
            }
            if address & 0xfff == 0 {
                return Ok(Symbols {
                    function: Some("exact"),
                    file: Some("fake.rs"),
                    line: Some((address >> 12) as u32),
                });
            }
            Ok(Symbols {
                function: Some("call_site"),
                ..Default::default()
            })
        }
    }

    fn filled(depth: usize, skip: usize) -> FrameBuffer {
        let mut buffer = FrameBuffer::new(skip);
        for i in 0..depth {
            if !buffer.record(0x1000 * (i + 1)) {
                break;
            }
        }
        buffer
    }

    #[test]
    fn test_skip_counts_every_frame() {
        for (depth, skip) in [(10, 0), (10, 3), (10, 9), (10, 10), (10, 25), (0, 0)] {
            let buffer = filled(depth, skip);
            assert_eq!(buffer.len(), depth.saturating_sub(skip), "{depth} {skip}");
        }
        let buffer = filled(10, 3);
        assert_eq!(buffer.addresses()[0], 0x4000);
        assert_eq!(buffer.addresses()[6], 0xa000);
    }

    #[test]
    fn test_capacity_caps_walk() {
        let buffer = filled(MAX_BACKTRACE_FRAMES + 50, 0);
        assert_eq!(buffer.len(), MAX_BACKTRACE_FRAMES);
        let buffer = filled(MAX_BACKTRACE_FRAMES + 50, 20);
        assert_eq!(buffer.len(), MAX_BACKTRACE_FRAMES);
        assert_eq!(buffer.addresses()[0], 0x1000 * 21);

        let mut full = filled(MAX_BACKTRACE_FRAMES, 0);
        assert!(!full.record(0x42));
        assert_eq!(full.len(), MAX_BACKTRACE_FRAMES);
    }

    #[test]
    fn test_zero_address_ends_walk() {
        let mut buffer = FrameBuffer::new(0);
        assert!(buffer.record(0x1000));
        assert!(!buffer.record(0));
        assert_eq!(buffer.addresses(), &[0x1000]);

        let mut skipping = FrameBuffer::new(5);
        assert!(!skipping.record(0));
        assert!(skipping.is_empty());
    }

    #[test]
    fn test_failed_lookups_still_yield_frames() {
        let mut buffer = FrameBuffer::new(0);
        for address in [0x1001, 0x2bae, 0x3001, 0x4bae] {
            buffer.record(address);
        }
        let frames: Vec<_> = buffer.frames(&FakeResolver).collect();
        assert_eq!(frames.len(), 4);
        assert!(frames[0].is_ok());
        assert_eq!(
            frames[1],
            Err(UnresolvedFrame {
                address: 0x2bae,
                reason: ResolveError::NoDebugInfo
            })
        );
        assert!(frames[2].is_ok());
        assert!(frames[3].is_err());
        assert_eq!(frames[3].unwrap_err().frame(), Frame::bare(0x4bae));
    }

    #[test]
    fn test_caller_frames_resolve_before_return_address() {
        let mut buffer = FrameBuffer::new(0);
        buffer.record(0x1001);
        let frame = buffer.frames(&FakeResolver).next().unwrap().unwrap();
        // 0x1001 - 1 lands on the exact entry; the reported address is unchanged.
        assert_eq!(frame.address, 0x1001);
        assert_eq!(frame.function, Some("exact"));
        assert_eq!(frame.file, Some("fake.rs"));
        assert_eq!(frame.line, Some(1));
    }

    #[test]
    fn test_trim_to_fault() {
        let mut buffer = filled(6, 0);
        assert!(!buffer.trim_to(0xdead));
        assert_eq!(buffer.len(), 6);

        assert!(buffer.trim_to(0x3000));
        assert_eq!(buffer.addresses(), &[0x3000, 0x4000, 0x5000, 0x6000]);
        let frames: Vec<_> = buffer.frames(&FakeResolver).map(Result::unwrap).collect();
        // The faulting frame is looked up exactly, callers one byte earlier.
        assert_eq!(frames[0].function, Some("exact"));
        assert_eq!(frames[0].line, Some(3));
        assert_eq!(frames[1].function, Some("call_site"));
    }

    #[test]
    fn test_discard_innermost() {
        let mut buffer = filled(4, 0);
        buffer.discard_innermost(1);
        assert_eq!(buffer.addresses(), &[0x2000, 0x3000, 0x4000]);
        buffer.discard_innermost(10);
        assert!(buffer.is_empty());
    }

    #[inline(never)]
    fn capture_pair() -> (FrameBuffer, FrameBuffer) {
        (FrameBuffer::capture(0), FrameBuffer::capture(1))
    }

    #[test]
    #[cfg_attr(miri, ignore)]
    fn test_capture_skips_callers() {
        let (all, skipped) = capture_pair();
        assert!(!all.is_empty());
        assert!(all.len() < MAX_BACKTRACE_FRAMES);
        assert_eq!(all.len(), skipped.len() + 1);
    }

    #[test]
    #[cfg_attr(miri, ignore)]
    fn test_capture_unsynchronized() {
        let buffer = unsafe { FrameBuffer::capture_unsynchronized() };
        assert!(!buffer.is_empty());
        assert!(buffer.addresses().iter().all(|&ip| ip != 0));

        let on_thread = std::thread::spawn(|| unsafe { FrameBuffer::capture_unsynchronized() })
            .join()
            .unwrap();
        assert_ne!(on_thread.addresses().last(), Some(&0));
        assert!(on_thread.addresses().iter().all(|&ip| ip != 0));
    }

    #[test]
    #[cfg_attr(miri, ignore)]
    fn test_capture_has_no_end_marker() {
        let buffer = FrameBuffer::capture(0);
        assert!(!buffer.is_empty());
        assert_ne!(buffer.addresses().last(), Some(&0));
    }
}
