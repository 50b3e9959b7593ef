// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::collector::frame_walker::Frame;
use serde::{Deserialize, Serialize};
use std::fmt;

/// An owned stack frame, as returned by the backtrace query outside of crashes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BacktraceFrame {
    pub address: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
}

impl From<Frame<'_>> for BacktraceFrame {
    fn from(frame: Frame<'_>) -> Self {
        Self {
            address: frame.address,
            function: frame.function.map(String::from),
            file: frame.file.map(String::from),
            line: frame.line,
        }
    }
}

/// `<function> at <file>:<line>`, or `<function> at <address>` without a file.
/// Unknown functions print as `??`.
impl fmt::Display for BacktraceFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let function = self.function.as_deref().unwrap_or("??");
        match &self.file {
            Some(file) => write!(f, "{function} at {file}:{}", self.line.unwrap_or(0)),
            None => write!(f, "{function} at {:#x}", self.address),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let mut frame = BacktraceFrame {
            address: 0xabc,
            function: Some("main".to_string()),
            file: Some("src/main.rs".to_string()),
            line: Some(42),
        };
        assert_eq!(frame.to_string(), "main at src/main.rs:42");
        frame.file = None;
        assert_eq!(frame.to_string(), "main at 0xabc");
        frame.function = None;
        assert_eq!(frame.to_string(), "?? at 0xabc");
    }

    #[test]
    fn test_from_frame() {
        let frame = Frame {
            address: 0x10,
            function: Some("f"),
            file: None,
            line: Some(3),
        };
        let owned = BacktraceFrame::from(frame);
        assert_eq!(owned.function.as_deref(), Some("f"));
        assert_eq!(owned.file, None);
        assert_eq!(owned.line, Some(3));
        assert_eq!(BacktraceFrame::from(Frame::bare(7)).address, 7);
    }

    #[test]
    fn test_serialize_skips_missing_fields() {
        let frame = BacktraceFrame {
            address: 16,
            ..Default::default()
        };
        assert_eq!(serde_json::to_string(&frame).unwrap(), r#"{"address":16}"#);
    }
}
