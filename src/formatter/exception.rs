//! Traceback rendering and decoding.
//!
//! Rendering follows the familiar "most recent call last" layout so log
//! files read the same whichever component captured the exception.

use std::borrow::Cow;

use encoding_rs::{Encoding, UTF_8};

use crate::exception_schema::{ExceptionPayload, StackFrame};

/// Decode rendered traceback bytes for display.
///
/// Valid UTF-8 is borrowed as-is. Anything else is decoded permissively with
/// `fallback` (UTF-8 when `None`), replacing malformed sequences.
pub fn decode_traceback<'a>(bytes: &'a [u8], fallback: Option<&'static Encoding>) -> Cow<'a, str> {
    match std::str::from_utf8(bytes) {
        Ok(text) => Cow::Borrowed(text),
        Err(_) => {
            let encoding = fallback.unwrap_or(UTF_8);
            let (decoded, _, _) = encoding.decode(bytes);
            decoded
        }
    }
}

fn format_exception_chain(payload: &ExceptionPayload, output: &mut String) {
    if let Some(cause) = &payload.cause {
        output.push_str(&format_exception_payload(cause));
        output
            .push_str("\nThe above exception was the direct cause of the following exception:\n\n");
    } else if let Some(context) = &payload.context
        && !payload.suppress_context
    {
        output.push_str(&format_exception_payload(context));
        output
            .push_str("\nDuring handling of the above exception, another exception occurred:\n\n");
    }
}

fn format_exception_header(payload: &ExceptionPayload) -> String {
    match &payload.module {
        Some(module) => format!("{}.{}: {}\n", module, payload.type_name, payload.message),
        None => format!("{}: {}\n", payload.type_name, payload.message),
    }
}

/// Format an exception payload, including its cause or context chain.
pub fn format_exception_payload(payload: &ExceptionPayload) -> String {
    let mut output = String::new();
    format_exception_chain(payload, &mut output);

    output.push_str("Traceback (most recent call last):\n");
    for frame in &payload.frames {
        output.push_str(&format_stack_frame(frame));
    }
    output.push_str(&format_exception_header(payload));

    for note in &payload.notes {
        output.push_str("  ");
        output.push_str(note);
        output.push('\n');
    }
    output
}

/// Format a single stack frame.
pub fn format_stack_frame(frame: &StackFrame) -> String {
    let mut output = format!(
        "  File \"{}\", line {}, in {}\n",
        frame.filename, frame.lineno, frame.function
    );
    if let Some(source) = &frame.source_line {
        let trimmed = source.trim();
        if !trimmed.is_empty() {
            output.push_str("    ");
            output.push_str(trimmed);
            output.push('\n');
        }
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use encoding_rs::WINDOWS_1252;

    #[test]
    fn format_stack_frame_with_source_line() {
        let mut frame = StackFrame::new("example.rs", 5, "do_something");
        frame.source_line = Some("    let result = calculate();  ".to_string());

        let output = format_stack_frame(&frame);

        assert_eq!(
            output,
            "  File \"example.rs\", line 5, in do_something\n    let result = calculate();\n"
        );
    }

    #[test]
    fn format_exception_with_cause_chain() {
        let cause = ExceptionPayload::new("OSError", "file not found");
        let mut effect = ExceptionPayload::new("RuntimeError", "operation failed");
        effect.cause = Some(Box::new(cause));

        let output = format_exception_payload(&effect);

        let cause_pos = output.find("OSError: file not found").unwrap();
        let effect_pos = output.find("RuntimeError: operation failed").unwrap();
        assert!(cause_pos < effect_pos);
        assert!(output.contains("The above exception was the direct cause"));
    }

    #[test]
    fn suppressed_context_is_hidden() {
        let mut effect = ExceptionPayload::new("TypeError", "type mismatch");
        effect.context = Some(Box::new(ExceptionPayload::new("ValueError", "invalid")));
        effect.suppress_context = true;

        let output = format_exception_payload(&effect);

        assert!(!output.contains("ValueError"));
    }

    #[test]
    fn format_exception_with_module_and_notes() {
        let mut exception = ExceptionPayload::new("CustomError", "custom message");
        exception.module = Some("salt.exceptions".to_string());
        exception.notes = vec!["while rendering sls".to_string()];

        let output = format_exception_payload(&exception);

        assert!(output.contains("salt.exceptions.CustomError: custom message\n"));
        assert!(output.ends_with("  while rendering sls\n"));
    }

    #[test]
    fn decode_borrows_valid_utf8() {
        assert!(matches!(decode_traceback(b"ok", None), Cow::Borrowed("ok")));
    }

    #[test]
    fn decode_replaces_invalid_bytes() {
        let decoded = decode_traceback(b"bad \xff byte", None);
        assert_eq!(decoded, "bad \u{fffd} byte");
    }

    #[test]
    fn decode_uses_fallback_encoding() {
        let decoded = decode_traceback(b"caf\xe9", Some(WINDOWS_1252));
        assert_eq!(decoded, "caf\u{e9}");
    }
}
