// Tool stdout line classification
//
// Wipe tools interleave structured JSON progress lines with free text. Each
// stdout line is classified on its own: a line either decodes into one of
// the known shapes or passes through verbatim. A malformed line never fails
// the stream.

use serde::Deserialize;

/// One classified stdout line.
#[derive(Debug, Clone, PartialEq)]
pub enum OutputLine {
    /// `{"progress": 45, "message": "..."}`
    Progress {
        percent: f64,
        message: Option<String>,
    },
    /// `{"message": "..."}`
    Message(String),
    /// `{"error": "..."}`
    ErrorLine(String),
    /// Anything that is not one of the known JSON shapes
    Unstructured(String),
}

// Superset of the known line shapes. Which fields decoded decides the
// classification; precedence is progress, then error, then message.
#[derive(Deserialize)]
struct RawLine {
    progress: Option<f64>,
    message: Option<String>,
    error: Option<String>,
}

impl OutputLine {
    pub fn classify(line: &str) -> OutputLine {
        match serde_json::from_str::<RawLine>(line.trim()) {
            Ok(RawLine {
                progress: Some(percent),
                message,
                ..
            }) => OutputLine::Progress { percent, message },
            Ok(RawLine {
                error: Some(error), ..
            }) => OutputLine::ErrorLine(error),
            Ok(RawLine {
                message: Some(message),
                ..
            }) => OutputLine::Message(message),
            _ => OutputLine::Unstructured(line.to_string()),
        }
    }
}
