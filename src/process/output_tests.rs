/// Tests for stdout line classification
/// Covers the known JSON shapes, field precedence and verbatim passthrough

#[cfg(test)]
mod output_classification_tests {
    use super::super::output::OutputLine;

    #[test]
    fn test_progress_line_integer() {
        let line = OutputLine::classify(r#"{"progress": 45, "message": "Pass 1/3"}"#);
        assert_eq!(
            line,
            OutputLine::Progress {
                percent: 45.0,
                message: Some("Pass 1/3".to_string())
            }
        );
    }

    #[test]
    fn test_progress_line_float_without_message() {
        let line = OutputLine::classify(r#"{"progress": 99.5}"#);
        assert_eq!(
            line,
            OutputLine::Progress {
                percent: 99.5,
                message: None
            }
        );
    }

    #[test]
    fn test_message_line() {
        let line = OutputLine::classify(r#"{"message": "Starting wipe"}"#);
        assert_eq!(line, OutputLine::Message("Starting wipe".to_string()));
    }

    #[test]
    fn test_error_line() {
        let line = OutputLine::classify(r#"{"error": "device busy"}"#);
        assert_eq!(line, OutputLine::ErrorLine("device busy".to_string()));
    }

    #[test]
    fn test_progress_takes_precedence() {
        let line =
            OutputLine::classify(r#"{"progress": 10, "message": "m", "error": "ignored"}"#);
        assert!(matches!(line, OutputLine::Progress { percent, .. } if percent == 10.0));
    }

    #[test]
    fn test_error_takes_precedence_over_message() {
        let line = OutputLine::classify(r#"{"error": "bad", "message": "good"}"#);
        assert_eq!(line, OutputLine::ErrorLine("bad".to_string()));
    }

    #[test]
    fn test_unknown_json_object_passes_through() {
        let raw = r#"{"pass": 2, "sector": 1024}"#;
        assert_eq!(
            OutputLine::classify(raw),
            OutputLine::Unstructured(raw.to_string())
        );
    }

    #[test]
    fn test_non_object_json_passes_through() {
        assert_eq!(
            OutputLine::classify("[1, 2, 3]"),
            OutputLine::Unstructured("[1, 2, 3]".to_string())
        );
        assert_eq!(
            OutputLine::classify(r#""just a string""#),
            OutputLine::Unstructured(r#""just a string""#.to_string())
        );
    }

    #[test]
    fn test_plain_text_passes_through() {
        let raw = "Wiping /dev/sdb: pass 1 of 3";
        assert_eq!(
            OutputLine::classify(raw),
            OutputLine::Unstructured(raw.to_string())
        );
    }

    #[test]
    fn test_wrong_progress_type_passes_through() {
        let raw = r#"{"progress": "almost done"}"#;
        assert_eq!(
            OutputLine::classify(raw),
            OutputLine::Unstructured(raw.to_string())
        );
    }

    #[test]
    fn test_surrounding_whitespace_tolerated() {
        let line = OutputLine::classify("  {\"progress\": 5}  ");
        assert!(matches!(line, OutputLine::Progress { percent, .. } if percent == 5.0));
    }

    #[test]
    fn test_null_fields_are_absent() {
        let line = OutputLine::classify(r#"{"progress": null, "message": "tick"}"#);
        assert_eq!(line, OutputLine::Message("tick".to_string()));
    }
}
