// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Symbol resolution for instruction pointers of the current process.
//!
//! A [`Symbolizer`] indexes every loaded object once, when it is created, and is never mutated
//! afterwards. Resolution is therefore reentrant and allocation free, which is what allows the
//! crash handler to share one instance with ordinary threads.

mod index;
mod modules;

use crate::collector::frame_walker::FrameBuffer;
use crate::crash_info::BacktraceFrame;
use index::ModuleIndex;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[derive(Debug, thiserror::Error)]
pub enum SymbolizerError {
    #[error("unable to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("unable to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: object::Error,
    },
    #[error("no loaded object could be indexed")]
    NoModules,
}

/// Why an address could not be resolved. Kept `Copy` so it can travel through the signal path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ResolveError {
    #[error("address is not inside any loaded object")]
    NoModule,
    #[error("object has no symbol or line information")]
    NoDebugInfo,
}

/// Symbol information for one address, borrowed from the resolver.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Symbols<'a> {
    pub function: Option<&'a str>,
    pub file: Option<&'a str>,
    pub line: Option<u32>,
}

/// Anything that can map an instruction pointer to symbol information.
///
/// Implementations used from the crash handler must not allocate or lock.
pub trait Resolve {
    fn resolve(&self, address: usize) -> Result<Symbols<'_>, ResolveError>;
}

#[derive(Debug)]
pub struct Symbolizer {
    modules: Vec<ModuleIndex>,
    threaded: bool,
    target: Option<PathBuf>,
}

impl Symbolizer {
    /// Indexes the running process.
    ///
    /// `target` replaces the path used for the main executable, e.g. when the binary on disk
    /// carries the debug information and the running copy was stripped. Failing to index the main
    /// executable is an error; other objects that cannot be indexed are skipped.
    ///
    /// `threaded` is recorded for callers that care; resolution never caches, so every instance
    /// can be shared between threads and signal handlers.
    pub fn create(target: Option<&Path>, threaded: bool) -> Result<Self, SymbolizerError> {
        let mut indexes = Vec::new();
        for module in modules::loaded_modules() {
            let path = match (module.is_main, target) {
                (true, Some(target)) => target.to_path_buf(),
                _ => module.path,
            };
            match ModuleIndex::load(&path, module.bias) {
                Ok(index) => {
                    debug!(
                        path = %path.display(),
                        functions = index.function_count(),
                        lines = index.line_count(),
                        "Indexed module"
                    );
                    indexes.push(index);
                }
                Err(e) if module.is_main => return Err(e),
                Err(e) => debug!("Skipping module: {e}"),
            }
        }
        if indexes.is_empty() {
            return Err(SymbolizerError::NoModules);
        }
        info!(modules = indexes.len(), threaded, "Symbolizer created");
        Ok(Self {
            modules: indexes,
            threaded,
            target: target.map(Path::to_path_buf),
        })
    }

    pub fn is_threaded(&self) -> bool {
        self.threaded
    }

    pub fn target(&self) -> Option<&Path> {
        self.target.as_deref()
    }

    /// The current thread's stack, innermost first, starting at the caller of this function.
    ///
    /// `skip` additionally drops that many of the innermost caller frames. Frames whose symbols
    /// cannot be resolved are still returned, without function, file or line.
    #[inline(never)]
    pub fn backtrace(&self, skip: usize) -> Vec<BacktraceFrame> {
        let frames = FrameBuffer::capture(skip + 1);
        frames
            .frames(self)
            .map(|frame| match frame {
                Ok(frame) => BacktraceFrame::from(frame),
                Err(unresolved) => {
                    debug!("{unresolved}");
                    BacktraceFrame::from(unresolved.frame())
                }
            })
            .collect()
    }
}

impl Resolve for Symbolizer {
    /// SIGNAL SAFETY:
    ///     Linear scan over the modules followed by binary searches; nothing is allocated.
    fn resolve(&self, address: usize) -> Result<Symbols<'_>, ResolveError> {
        self.modules
            .iter()
            .find(|module| module.contains(address))
            .ok_or(ResolveError::NoModule)?
            .lookup(address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[inline(never)]
    fn resolve_self() -> usize {
        resolve_self as fn() -> usize as usize
    }

    #[test]
    #[cfg_attr(miri, ignore)]
    fn test_resolves_own_function() {
        let symbolizer = Symbolizer::create(None, false).unwrap();
        assert!(!symbolizer.is_threaded());
        assert_eq!(symbolizer.target(), None);
        let symbols = symbolizer.resolve(resolve_self()).unwrap();
        let function = symbols.function.unwrap();
        assert!(function.contains("resolve_self"), "{function}");
    }

    #[test]
    #[cfg_attr(miri, ignore)]
    fn test_address_outside_modules() {
        let symbolizer = Symbolizer::create(None, true).unwrap();
        assert!(symbolizer.is_threaded());
        assert_eq!(symbolizer.resolve(0).unwrap_err(), ResolveError::NoModule);
    }

    #[test]
    #[cfg_attr(miri, ignore)]
    fn test_missing_target_is_an_error() {
        let err = Symbolizer::create(Some(Path::new("/nonexistent/binary")), true).unwrap_err();
        assert!(matches!(err, SymbolizerError::Io { .. }), "{err}");
    }

    #[test]
    #[cfg_attr(miri, ignore)]
    #[cfg(target_os = "linux")]
    fn test_invalid_debug_info_still_symbolizes() {
        let dir = tempfile::tempdir().unwrap();
        let corrupt = super::index::copy_with_corrupt_first_unit(dir.path());
        let symbolizer = Symbolizer::create(Some(&corrupt), true).unwrap();
        assert_eq!(symbolizer.target(), Some(corrupt.as_path()));
        let symbols = symbolizer.resolve(resolve_self()).unwrap();
        let function = symbols.function.unwrap();
        assert!(function.contains("resolve_self"), "{function}");
    }

    #[inline(never)]
    fn nested_backtrace(symbolizer: &Symbolizer) -> Vec<BacktraceFrame> {
        symbolizer.backtrace(0)
    }

    #[test]
    #[cfg_attr(miri, ignore)]
    fn test_backtrace_starts_at_caller() {
        let symbolizer = Symbolizer::create(None, true).unwrap();
        let frames = nested_backtrace(&symbolizer);
        assert!(!frames.is_empty());
        let names: Vec<_> = frames.iter().filter_map(|f| f.function.as_deref()).collect();
        assert!(
            names.iter().any(|n| n.contains("nested_backtrace")),
            "{names:?}"
        );
    }
}
