// src/csv.rs
use std::io::{self, Write};
use std::mem::take;

pub const SEP: char = ',';

/* ---------------- Parsing ---------------- */

/// Minimal CSV parser (quotes + CRLF tolerant).
pub fn parse_rows(text: &str, sep: char) -> Vec<Vec<String>> {
    let mut rows = Vec::new();
    let mut field = s!();
    let mut row = Vec::new();
    let mut in_quotes = false;
    let mut chars = text.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '"' => {
                if in_quotes {
                    if matches!(chars.peek(), Some('"')) {
                        chars.next(); // double-quote escape
                        field.push('"');
                    } else {
                        in_quotes = false;
                    }
                } else {
                    in_quotes = true;
                }
            }
            c if c == sep && !in_quotes => {
                row.push(take(&mut field));
            }
            '\n' | '\r' if !in_quotes => {
                if ch == '\r' && matches!(chars.peek(), Some('\n')) { chars.next(); }
                row.push(take(&mut field));
                if !(row.len() == 1 && row[0].is_empty()) {
                    rows.push(take(&mut row));
                } else {
                    row.clear();
                }
            }
            _ => field.push(ch),
        }
    }

    // Trailing row without a final newline.
    if !field.is_empty() || !row.is_empty() {
        row.push(field);
        rows.push(row);
    }

    rows
}

/// Split off the header row and check it names the expected columns.
/// Returns `None` when the header does not match.
pub fn split_header<'a>(rows: &'a [Vec<String>], expected: &[&str]) -> Option<&'a [Vec<String>]> {
    let (first, rest) = rows.split_first()?;
    let matches = first.len() == expected.len()
        && first.iter().zip(expected).all(|(a, b)| a.trim() == *b);
    matches.then_some(rest)
}

/* ---------------- Writing ---------------- */

fn needs_quotes(field: &str, sep: char) -> bool {
    field.contains(sep) || field.contains('"') || field.contains('\n') || field.contains('\r')
}

/// Write a single CSV row to any writer.
pub fn write_row<W: Write>(mut w: W, row: &[String], sep: char) -> io::Result<()> {
    let mut first = true;
    for cell in row {
        if !first { write!(w, "{}", sep)?; } else { first = false; }
        if needs_quotes(cell, sep) {
            let escaped = cell.replace('"', "\"\"");
            write!(w, "\"{}\"", escaped)?;
        } else {
            write!(w, "{}", cell)?;
        }
    }
    writeln!(w)
}

/// Header line plus rows, as one string.
pub fn rows_to_string(headers: &[&str], rows: &[Vec<String>], sep: char) -> String {
    let mut buf: Vec<u8> = Vec::new();

    let h: Vec<String> = headers.iter().map(|s| s.to_string()).collect();
    let _ = write_row(&mut buf, &h, sep);
    for r in rows {
        let _ = write_row(&mut buf, r, sep);
    }

    match String::from_utf8(buf) {
        Ok(s) => s,
        Err(e) => String::from_utf8_lossy(&e.into_bytes()).into_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quoted_fields_survive_parse() {
        let text = rows_to_string(&["a", "b"], &[vec![s!("x, y"), s!("say \"hi\"")]], SEP);
        let rows = parse_rows(&text, SEP);
        let body = split_header(&rows, &["a", "b"]).unwrap();
        assert_eq!(body, &[vec![s!("x, y"), s!("say \"hi\"")]]);
    }

    #[test]
    fn header_mismatch_is_rejected() {
        let rows = parse_rows("a,c\n1,2\n", SEP);
        assert!(split_header(&rows, &["a", "b"]).is_none());
    }
}
