use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::ser::Formatter;
use std::io::{self, Write};

/// The single object printed on stdout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnalysisOutput {
    pub text: String,
}

impl AnalysisOutput {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

/// Compact JSON with a space after `:` and `,`, i.e. `{"text": "OK"}`.
/// Non-ASCII characters are written as `\uXXXX` escapes (UTF-16 units), so
/// the line is plain ASCII.
///
/// Callers of the script historically parse this exact layout.
#[derive(Debug, Default, Clone, Copy)]
struct SpacedFormatter;

impl Formatter for SpacedFormatter {
    fn begin_array_value<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_key<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_value<W>(&mut self, writer: &mut W) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        writer.write_all(b": ")
    }

    fn write_string_fragment<W>(&mut self, writer: &mut W, fragment: &str) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        let mut start = 0;
        for (idx, ch) in fragment.char_indices() {
            if ch.is_ascii() {
                continue;
            }
            writer.write_all(fragment[start..idx].as_bytes())?;
            let mut units = [0u16; 2];
            for unit in ch.encode_utf16(&mut units) {
                write!(writer, "\\u{:04x}", unit)?;
            }
            start = idx + ch.len_utf8();
        }
        writer.write_all(fragment[start..].as_bytes())
    }
}

pub fn to_json_line(output: &AnalysisOutput) -> Result<String> {
    let mut buf = Vec::new();
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, SpacedFormatter);
    output
        .serialize(&mut ser)
        .context("Failed to serialize analysis output")?;
    let line = String::from_utf8(buf).context("Serialized output was not UTF-8")?;
    Ok(line)
}

pub fn write_output<W: Write>(writer: &mut W, output: &AnalysisOutput) -> Result<()> {
    let line = to_json_line(output)?;
    writeln!(writer, "{}", line).context("Failed to write analysis output")?;
    writer.flush().context("Failed to flush analysis output")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_layout() {
        let mut out = Vec::new();
        write_output(&mut out, &AnalysisOutput::new("OK")).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "{\"text\": \"OK\"}\n");
    }

    #[test]
    fn embedded_json_stays_a_string() {
        let raw = "```json\n[{\"id\": 1, \"answer\": true, \"why\": \"waves\"}]\n```";
        let line = to_json_line(&AnalysisOutput::new(raw)).unwrap();

        let value: serde_json::Value = serde_json::from_str(&line).unwrap();
        let object = value.as_object().expect("output must be an object");
        assert_eq!(object.len(), 1);
        assert_eq!(object["text"].as_str(), Some(raw));
    }

    #[test]
    fn escapes_quotes_and_newlines() {
        let line = to_json_line(&AnalysisOutput::new("a \"b\"\nc")).unwrap();
        assert_eq!(line, r#"{"text": "a \"b\"\nc"}"#);
    }

    #[test]
    fn non_ascii_is_escaped() {
        let text = "Größe 😀 ok";
        let line = to_json_line(&AnalysisOutput::new(text)).unwrap();
        assert_eq!(line, r#"{"text": "Gr\u00f6\u00dfe \ud83d\ude00 ok"}"#);
        assert!(line.is_ascii());

        let value: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["text"].as_str(), Some(text));
    }
}
