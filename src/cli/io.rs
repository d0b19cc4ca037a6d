//! JSON I/O handling for CLI
//!
//! - Input: one JSON document via stdin, possibly spanning several lines
//! - Output: one JSON object per line via stdout
//! - Logs go to stderr and never mix with responses

use std::io::{self, Read, Write};

use serde_json::{json, Value};

use super::errors::{CliError, CliResult};

/// Read a JSON document from `reader`
pub fn read_document<R: Read>(mut reader: R) -> CliResult<Value> {
    let mut content = String::new();
    reader.read_to_string(&mut content)?;

    if content.trim().is_empty() {
        return Err(CliError::io_error("Empty input"));
    }

    let value: Value = serde_json::from_str(&content)?;
    Ok(value)
}

/// Read a JSON request from stdin
pub fn read_request() -> CliResult<Value> {
    read_document(io::stdin().lock())
}

fn write_line<W: Write>(writer: &mut W, response: &Value) -> CliResult<()> {
    serde_json::to_writer(&mut *writer, response)?;
    writeln!(writer)?;
    writer.flush()?;
    Ok(())
}

/// Success envelope
pub fn ok_envelope(data: Value) -> Value {
    json!({
        "status": "ok",
        "data": data
    })
}

/// Error envelope
pub fn error_envelope(code: &str, message: &str) -> Value {
    json!({
        "status": "error",
        "code": code,
        "message": message
    })
}

/// Write a success response to stdout
pub fn write_response(data: Value) -> CliResult<()> {
    write_line(&mut io::stdout().lock(), &ok_envelope(data))
}

/// Write an error response to stdout
pub fn write_error(code: &str, message: &str) -> CliResult<()> {
    write_line(&mut io::stdout().lock(), &error_envelope(code, message))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reads_multiline_document() {
        let input = "{\n  \"age\": {\"$gt\": 1}\n}\n";
        let value = read_document(input.as_bytes()).unwrap();
        assert_eq!(value, json!({"age": {"$gt": 1}}));
    }

    #[test]
    fn test_rejects_empty_and_invalid_input() {
        let err = read_document("  \n".as_bytes()).unwrap_err();
        assert_eq!(err.code_str(), "SHAPE_CLI_IO_ERROR");
        assert!(read_document("{oops".as_bytes()).is_err());
    }

    #[test]
    fn test_envelopes() {
        let mut out = Vec::new();
        write_line(&mut out, &ok_envelope(json!([1]))).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "{\"status\":\"ok\",\"data\":[1]}\n");
        assert_eq!(
            error_envelope("SHAPE_UNKNOWN_FIELD", "nope"),
            json!({"status": "error", "code": "SHAPE_UNKNOWN_FIELD", "message": "nope"})
        );
    }
}
