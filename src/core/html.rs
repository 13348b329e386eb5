// src/core/html.rs
//
// Just enough HTML to pull `<table>`s out of a page: case-insensitive tag
// scanning over byte offsets (ASCII-only lowercasing keeps offsets aligned).

use super::sanitize::{normalize_entities, normalize_ws};

pub fn to_lower(s: &str) -> String {
    s.chars()
        .map(|c| {
            if c.is_ascii() {
                c.to_ascii_lowercase()
            } else {
                c
            }
        })
        .collect()
}

/// Text between the first `open_pat` tag and the next `close_pat`.
pub fn slice_between_ci<'a>(s: &'a str, open_pat: &str, close_pat: &str) -> Option<&'a str> {
    let lc = to_lower(s);
    let (start, _) = find_tag(&lc, &to_lower(open_pat), 0)?;
    let after = s[start..].find('>')? + start + 1;
    let cr = lc[after..].find(&to_lower(close_pat))?;
    Some(&s[after..after + cr])
}

/// Position of the next `<tag` whose name ends right after `tag`
/// (so `<th` does not match `<thead`). `lc` must be lowercased already.
fn find_tag(lc: &str, tag: &str, from: usize) -> Option<(usize, usize)> {
    let mut at = from;
    loop {
        let start = lc.get(at..)?.find(tag)? + at;
        let name_end = start + tag.len();
        match lc.as_bytes().get(name_end) {
            Some(b) if b.is_ascii_whitespace() || *b == b'>' || *b == b'/' => return Some((start, name_end)),
            None => return None,
            _ => at = name_end,
        }
    }
}

/// Byte range of the next `o ... c` block at or after `from`.
pub fn next_tag_block_ci(s: &str, o: &str, c: &str, from: usize) -> Option<(usize, usize)> {
    let lc = to_lower(s);
    let (start, _) = find_tag(&lc, &to_lower(o), from)?;
    let open_end = s[start..].find('>')? + start + 1;
    let end_rel = lc[open_end..].find(&to_lower(c))?;
    let end = open_end + end_rel + c.len();
    Some((start, end))
}

pub fn inner_after_open_tag(block: &str) -> String {
    if let Some(oe) = block.find('>') {
        if let Some(cs) = block.rfind('<') {
            if cs > oe {
                return block[oe + 1..cs].to_string();
            }
        }
    }
    s!()
}

pub fn strip_tags<S: AsRef<str>>(s: S) -> String {
    let s = s.as_ref();

    let mut out = String::with_capacity(s.len());
    let mut in_tag = false;

    for ch in s.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => out.push(ch),
            _ => {}
        }
    }
    normalize_ws(&normalize_entities(&out))
}

/* ---------------- Tables ---------------- */

/// One `<table>`: header texts plus data rows, cells trimmed.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    pub fn column(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    pub fn cell(&self, row: usize, col: usize) -> Option<&str> {
        self.rows.get(row)?.get(col).map(String::as_str)
    }

    /// Value of column `name` in the first data row.
    pub fn first(&self, name: &str) -> Option<&str> {
        self.cell(0, self.column(name)?)
    }
}

/// Cell texts of one `<tr>` block, `<td>` and `<th>` in document order.
fn row_cells(tr: &str) -> Vec<String> {
    let lc = to_lower(tr);
    let mut cells = Vec::new();
    let mut at = 0;

    loop {
        let td = find_tag(&lc, "<td", at);
        let th = find_tag(&lc, "<th", at);
        let (start, close) = match (td, th) {
            (Some((a, _)), Some((b, _))) if a < b => (a, "</td"),
            (Some(_), Some((b, _))) => (b, "</th"),
            (Some((a, _)), None) => (a, "</td"),
            (None, Some((b, _))) => (b, "</th"),
            (None, None) => break,
        };
        let Some(open_end) = tr[start..].find('>').map(|i| start + i + 1) else { break };
        let end = lc[open_end..].find(close).map_or(tr.len(), |i| open_end + i);
        cells.push(strip_tags(&tr[open_end..end]));
        at = end;
    }
    cells
}

/// Every table in `doc` that has at least one data row.
///
/// Headers are all `<th>` texts of the table, or the first row when there
/// are none. Rows identical to the headers are dropped; rows of empty cells
/// are kept, since some pages use them as section separators.
pub fn extract_tables(doc: &str) -> Vec<Table> {
    let mut tables = Vec::new();
    let mut from = 0;

    while let Some((start, end)) = next_tag_block_ci(doc, "<table", "</table>", from) {
        let block = &doc[start..end];
        from = end;

        let mut rows: Vec<Vec<String>> = Vec::new();
        let mut at = 0;
        let lc = to_lower(block);
        while let Some((tr, _)) = find_tag(&lc, "<tr", at) {
            let next_tr = find_tag(&lc, "<tr", tr + 3).map_or(block.len(), |(n, _)| n);
            let cells = row_cells(&block[tr..next_tr]);
            if !cells.is_empty() {
                rows.push(cells);
            }
            at = next_tr;
        }

        let th_headers: Vec<String> = {
            let mut hs = Vec::new();
            let mut at = 0;
            while let Some((th, _)) = find_tag(&lc, "<th", at) {
                let Some(open_end) = block[th..].find('>').map(|i| th + i + 1) else { break };
                let end = lc[open_end..].find("</th").map_or(block.len(), |i| open_end + i);
                hs.push(strip_tags(&block[open_end..end]));
                at = end;
            }
            hs
        };
        let headers = if th_headers.is_empty() {
            rows.first().cloned().unwrap_or_default()
        } else {
            th_headers
        };

        rows.retain(|r| *r != headers);
        if !rows.is_empty() {
            tables.push(Table { headers, rows });
        }
    }
    tables
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
        <html><body>
        <TABLE class="rank">
          <thead><tr><th>#</th><th>Jogador</th><th>RAW no per&iacute;odo</th></tr></thead>
          <tbody>
            <tr><td>1</td><td><a href="/player?name=Foo+Bar">Foo&nbsp;Bar</a></td><td> 1.234.567 </td></tr>
            <tr><td>2</td><td>Baz</td><td>98,000</td></tr>
          </tbody>
        </TABLE>
        <table><tr><td>only</td></tr></table>
        </body></html>"#;

    #[test]
    fn extracts_headers_and_rows() {
        let tables = extract_tables(PAGE);
        assert_eq!(tables.len(), 1);
        let t = &tables[0];
        assert_eq!(t.headers[1], "Jogador");
        assert_eq!(t.rows.len(), 2);
        assert_eq!(t.first("Jogador"), Some("Foo Bar"));
        assert_eq!(t.cell(1, 2), Some("98,000"));
    }

    #[test]
    fn thead_is_not_a_header_cell() {
        let t = &extract_tables(PAGE)[0];
        assert_eq!(t.headers.len(), 3);
    }

    #[test]
    fn blank_separator_rows_survive() {
        let doc = "<table><tr><th>A</th><th>B</th></tr><tr><td>1</td><td>2</td></tr>\
                   <tr><td></td><td></td></tr><tr><td>3</td><td>4</td></tr></table>";
        let t = &extract_tables(doc)[0];
        assert_eq!(t.rows.len(), 3);
        assert!(t.rows[1].iter().all(String::is_empty));
    }
}
