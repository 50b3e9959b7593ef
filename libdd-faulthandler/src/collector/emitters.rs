// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Rendering of the crash report.
//!
//! Everything in this module may run inside the crash handler. Text is formatted into a
//! [`LineBuffer`] on the stack and handed to the kernel with a single `write`; nothing buffers,
//! allocates or locks.

use super::frame_walker::{Frame, FrameBuffer};
use super::platform::{LINE_CAPACITY, REPORT_PATH_CAPACITY};
use crate::crash_info::signal_name;
use crate::shared::constants::*;
use crate::symbolizer::Resolve;
use libc::{c_int, ucontext_t};
use std::fmt;
use std::os::unix::ffi::OsStrExt;
use std::path::Path;

pub(crate) const STDERR: c_int = libc::STDERR_FILENO;

/// A fixed-size line formatted on the stack.
///
/// Output that does not fit is cut off; if the cut removed the final newline, the last byte is
/// replaced by one so the next line still starts on its own.
pub(crate) struct LineBuffer<const N: usize> {
    buf: [u8; N],
    len: usize,
    truncated: bool,
}

impl<const N: usize> LineBuffer<N> {
    pub const fn new() -> Self {
        Self {
            buf: [0; N],
            len: 0,
            truncated: false,
        }
    }

    pub fn push_bytes(&mut self, bytes: &[u8]) {
        let available = N - self.len;
        let taken = bytes.len().min(available);
        self.buf[self.len..self.len + taken].copy_from_slice(&bytes[..taken]);
        self.len += taken;
        if taken < bytes.len() {
            self.truncated = true;
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    pub fn write_to(&mut self, fd: c_int) {
        if self.truncated && N > 0 {
            self.buf[N - 1] = b'\n';
        }
        write_raw(fd, self.as_bytes());
    }
}

impl<const N: usize> fmt::Write for LineBuffer<N> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.push_bytes(s.as_bytes());
        Ok(())
    }
}

/// Formats one line into a [`LineBuffer`] and writes it with a single `write`.
macro_rules! emit_line {
    ($fd:expr, $($arg:tt)*) => {{
        let mut line = LineBuffer::<LINE_CAPACITY>::new();
        let _ = fmt::Write::write_fmt(&mut line, format_args!($($arg)*));
        line.write_to($fd);
    }};
}

/// A single `write`. Short writes and errors are ignored; there is nobody to report them to.
pub(crate) fn write_raw(fd: c_int, bytes: &[u8]) {
    if bytes.is_empty() {
        return;
    }
    // SAFETY: `bytes` is valid for `bytes.len()` bytes.
    unsafe {
        libc::write(fd, bytes.as_ptr().cast(), bytes.len());
    }
}

pub(crate) fn emit_header(fd: c_int, signum: c_int) {
    write_raw(fd, FAULTHANDLER_BANNER.as_bytes());
    // SAFETY: getpid is async-signal-safe and cannot fail.
    let pid = unsafe { libc::getpid() };
    emit_line!(
        fd,
        "Signal: {signum} ({})\nPID: {pid}\n\n",
        signal_name(signum)
    );
    write_raw(fd, FAULTHANDLER_BEGIN_STACKTRACE.as_bytes());
}

pub(crate) fn emit_frame(fd: c_int, frame: &Frame) {
    let address = frame.address;
    let line = frame.line.unwrap_or(0);
    match (frame.function, frame.file) {
        (Some(function), Some(file)) => {
            emit_line!(fd, "  #{address:#x} {function} at {file}:{line}\n")
        }
        (Some(function), None) => emit_line!(fd, "  #{address:#x} {function}\n"),
        (None, Some(file)) => emit_line!(
            fd,
            "  #{address:#x} {FAULTHANDLER_UNKNOWN_SYMBOL} at {file}:{line}\n"
        ),
        (None, None) => emit_line!(fd, "  #{address:#x} {FAULTHANDLER_UNKNOWN_SYMBOL}\n"),
    }
}

pub(crate) fn emit_footer(fd: c_int) {
    write_raw(fd, FAULTHANDLER_FOOTER.as_bytes());
}

/// Writes a complete report for `signum` to `fd`.
///
/// Without a resolver, a fixed line replaces the stack. When `diagnostics` is set, every frame
/// that fails to resolve is also described on stderr.
/// SIGNAL SAFETY:
///     Only `write` and `getpid` are called, on stack buffers. `resolver` must not allocate.
pub(crate) fn emit_crash_report<R: Resolve>(
    fd: c_int,
    signum: c_int,
    resolver: Option<&R>,
    frames: &FrameBuffer,
    diagnostics: bool,
) {
    emit_header(fd, signum);
    match resolver {
        Some(resolver) => {
            for frame in frames.frames(resolver) {
                match frame {
                    Ok(frame) => emit_frame(fd, &frame),
                    Err(unresolved) => {
                        if diagnostics {
                            emit_line!(STDERR, "  [backtrace error: {unresolved}]\n");
                        }
                        emit_frame(fd, &unresolved.frame());
                    }
                }
            }
        }
        None => write_raw(fd, FAULTHANDLER_NO_SYMBOLIZER.as_bytes()),
    }
    emit_footer(fd);
}

pub(crate) fn emit_report_saved(fd: c_int, path: &ReportPath) {
    let mut line = LineBuffer::<LINE_CAPACITY>::new();
    line.push_bytes(FAULTHANDLER_REPORT_SAVED.as_bytes());
    line.push_bytes(path.as_bytes());
    line.push_bytes(b"\n");
    line.write_to(fd);
}

/// The instruction that faulted, read from the signal context.
#[allow(unreachable_code)]
pub(crate) fn fault_ip(ucontext: *const ucontext_t) -> Option<usize> {
    if ucontext.is_null() {
        return None;
    }
    // SAFETY: the kernel passes the handler a valid context for the interrupted thread.
    #[cfg(all(target_os = "macos", target_arch = "x86_64"))]
    return Some(unsafe { (*(*ucontext).uc_mcontext).__ss.__rip } as usize);
    #[cfg(all(target_os = "macos", target_arch = "aarch64"))]
    return Some(unsafe { (*(*ucontext).uc_mcontext).__ss.__pc } as usize);

    #[cfg(all(target_os = "linux", target_arch = "x86_64"))]
    return Some(unsafe { (*ucontext).uc_mcontext.gregs[libc::REG_RIP as usize] } as usize);
    #[cfg(all(target_os = "linux", target_arch = "aarch64"))]
    return Some(unsafe { (*ucontext).uc_mcontext.pc } as usize);

    None
}

/// A crash report destination, NUL-terminated and fixed-size so the handler can `open` it.
#[derive(Clone)]
pub(crate) struct ReportPath {
    buf: [u8; REPORT_PATH_CAPACITY],
    len: usize,
}

impl ReportPath {
    /// Copies `path`, truncated to fit with its terminator. Returns `None` if `path` contains a
    /// NUL byte.
    pub fn new(path: &Path) -> Option<Self> {
        let bytes = path.as_os_str().as_bytes();
        if bytes.contains(&0) {
            return None;
        }
        let len = bytes.len().min(REPORT_PATH_CAPACITY - 1);
        let mut buf = [0; REPORT_PATH_CAPACITY];
        buf[..len].copy_from_slice(&bytes[..len]);
        Some(Self { buf, len })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    /// Creates or truncates the file. Returns the descriptor, or `None` if it cannot be opened.
    pub fn open(&self) -> Option<c_int> {
        // SAFETY: `buf` is NUL-terminated within its bounds.
        let fd = unsafe {
            libc::open(
                self.buf.as_ptr().cast(),
                libc::O_WRONLY | libc::O_CREAT | libc::O_TRUNC | libc::O_CLOEXEC,
                0o644 as libc::c_uint,
            )
        };
        (fd >= 0).then_some(fd)
    }
}

impl fmt::Debug for ReportPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ReportPath")
            .field(&String::from_utf8_lossy(self.as_bytes()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbolizer::{ResolveError, Symbols};
    use std::io::{Read, Seek};
    use std::os::fd::AsRawFd;

    fn capture_output(emit: impl FnOnce(c_int)) -> String {
        let mut file = tempfile::tempfile().unwrap();
        emit(file.as_raw_fd());
        file.rewind().unwrap();
        let mut out = String::new();
        file.read_to_string(&mut out).unwrap();
        out
    }

    struct FakeResolver;

    impl Resolve for FakeResolver {
        fn resolve(&self, address: usize) -> Result<Symbols<'_>, ResolveError> {
            match address {
                0xfff => Ok(Symbols {
                    function: Some("crashing_fn"),
                    file: Some("src/crash.rs"),
                    line: Some(12),
                }),
                0x1fff => Err(ResolveError::NoModule),
                _ => Ok(Symbols::default()),
            }
        }
    }

    #[test]
    #[cfg_attr(miri, ignore)]
    fn test_frame_variants() {
        let out = capture_output(|fd| {
            emit_frame(
                fd,
                &Frame {
                    address: 0x10,
                    function: Some("f"),
                    file: Some("a.rs"),
                    line: Some(3),
                },
            );
            emit_frame(
                fd,
                &Frame {
                    address: 0x20,
                    function: Some("g"),
                    file: None,
                    line: Some(4),
                },
            );
            emit_frame(
                fd,
                &Frame {
                    address: 0x30,
                    function: None,
                    file: Some("b.rs"),
                    line: None,
                },
            );
            emit_frame(fd, &Frame::bare(0x40));
        });
        assert_eq!(
            out,
            "  #0x10 f at a.rs:3\n  #0x20 g\n  #0x30 ??? at b.rs:0\n  #0x40 ???\n"
        );
    }

    #[test]
    #[cfg_attr(miri, ignore)]
    fn test_header() {
        let out = capture_output(|fd| emit_header(fd, libc::SIGSEGV));
        let pid = std::process::id();
        assert!(out.starts_with(FAULTHANDLER_BANNER));
        assert!(out.contains(&format!(
            "Signal: {} (SIGSEGV)\nPID: {pid}\n\n",
            libc::SIGSEGV
        )));
        assert!(out.ends_with(FAULTHANDLER_BEGIN_STACKTRACE));
    }

    #[test]
    #[cfg_attr(miri, ignore)]
    fn test_report_without_resolver() {
        let frames = FrameBuffer::new(0);
        let out = capture_output(|fd| {
            emit_crash_report::<FakeResolver>(fd, libc::SIGABRT, None, &frames, false)
        });
        assert!(out.contains("(SIGABRT)"));
        assert!(out.contains(FAULTHANDLER_NO_SYMBOLIZER));
        assert!(out.ends_with(FAULTHANDLER_FOOTER));
    }

    #[test]
    #[cfg_attr(miri, ignore)]
    fn test_report_keeps_unresolved_frames() {
        let mut frames = FrameBuffer::new(0);
        frames.record(0x1000);
        frames.record(0x2000);
        frames.record(0x3000);
        let out = capture_output(|fd| {
            emit_crash_report(fd, libc::SIGFPE, Some(&FakeResolver), &frames, false)
        });
        let stack: Vec<_> = out
            .lines()
            .filter(|line| line.starts_with("  #"))
            .collect();
        assert_eq!(
            stack,
            [
                "  #0x1000 crashing_fn at src/crash.rs:12",
                "  #0x2000 ???",
                "  #0x3000 ???",
            ]
        );
        let header = out.find("Native Stack Trace:").unwrap();
        let first = out.find("  #0x1000").unwrap();
        let footer = out.find("Tip:").unwrap();
        assert!(header < first && first < footer);
    }

    #[test]
    fn test_line_buffer_truncation_keeps_newline() {
        let mut line = LineBuffer::<8>::new();
        fmt::Write::write_str(&mut line, "0123456789\n").unwrap();
        assert_eq!(line.as_bytes(), b"01234567");
        let mut file = tempfile::tempfile().unwrap();
        line.write_to(file.as_raw_fd());
        file.rewind().unwrap();
        let mut out = String::new();
        file.read_to_string(&mut out).unwrap();
        assert_eq!(out, "0123456\n");
    }

    #[test]
    fn test_report_path() {
        assert!(ReportPath::new(Path::new("/tmp/a\0b")).is_none());
        let path = ReportPath::new(Path::new("/tmp/report.log")).unwrap();
        assert_eq!(path.as_bytes(), b"/tmp/report.log");

        let long = format!("/tmp/{}", "x".repeat(REPORT_PATH_CAPACITY * 2));
        let path = ReportPath::new(Path::new(&long)).unwrap();
        assert_eq!(path.as_bytes().len(), REPORT_PATH_CAPACITY - 1);
        assert_eq!(path.as_bytes(), &long.as_bytes()[..REPORT_PATH_CAPACITY - 1]);
    }

    #[test]
    #[cfg_attr(miri, ignore)]
    fn test_report_path_open_truncates() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("crash.log");
        std::fs::write(&target, "stale contents that must disappear").unwrap();
        let path = ReportPath::new(&target).unwrap();
        let fd = path.open().unwrap();
        write_raw(fd, b"fresh\n");
        unsafe { libc::close(fd) };
        assert_eq!(std::fs::read_to_string(&target).unwrap(), "fresh\n");
        let mode = std::fs::metadata(&target).unwrap().permissions().mode();
        assert_eq!(mode & 0o111, 0);

        let out = capture_output(|fd| emit_report_saved(fd, &path));
        assert_eq!(
            out,
            format!("{FAULTHANDLER_REPORT_SAVED}{}\n", target.display())
        );

        let missing = ReportPath::new(&dir.path().join("no/such/dir/crash.log")).unwrap();
        assert!(missing.open().is_none());
    }

    #[test]
    fn test_fault_ip_null() {
        assert_eq!(fault_ip(std::ptr::null()), None);
    }
}
