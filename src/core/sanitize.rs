// src/core/sanitize.rs

const NAMED: &[(&str, &str)] = &[
    ("&nbsp;", " "),
    ("&lt;", "<"),
    ("&gt;", ">"),
    ("&quot;", "\""),
    ("&apos;", "'"),
    ("&aacute;", "á"),
    ("&atilde;", "ã"),
    ("&acirc;", "â"),
    ("&eacute;", "é"),
    ("&ecirc;", "ê"),
    ("&iacute;", "í"),
    ("&oacute;", "ó"),
    ("&otilde;", "õ"),
    ("&uacute;", "ú"),
    ("&ccedil;", "ç"),
];

/// Decode the entities ranking pages actually use, plus numeric `&#NNN;`
/// and `&#xHH;`. `&amp;` goes last so `&amp;lt;` stays literal.
pub fn normalize_entities(s: &str) -> String {
    if !s.contains('&') {
        return s.to_string();
    }
    let mut out = s.to_string();
    for (ent, ch) in NAMED {
        if out.contains(ent) {
            out = out.replace(ent, ch);
        }
    }
    out = decode_numeric(&out);
    out.replace("&amp;", "&")
}

fn decode_numeric(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(i) = rest.find("&#") {
        out.push_str(&rest[..i]);
        let tail = &rest[i + 2..];
        let decoded = tail.find(';').and_then(|end| {
            let body = &tail[..end];
            let code = match body.strip_prefix(['x', 'X']) {
                Some(hex) => u32::from_str_radix(hex, 16).ok(),
                None => body.parse::<u32>().ok(),
            };
            code.and_then(char::from_u32).map(|c| (c, end))
        });
        match decoded {
            Some((c, end)) => {
                out.push(c);
                rest = &tail[end + 1..];
            }
            None => {
                out.push_str("&#");
                rest = tail;
            }
        }
    }
    out.push_str(rest);
    out
}

pub fn normalize_ws(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev_space = false;
    for ch in s.chars() {
        if ch.is_whitespace() {
            if !prev_space { out.push(' '); prev_space = true; }
        } else { out.push(ch); prev_space = false; }
    }
    out.trim().to_string()
}

/// Integer with `,` or `.` thousands separators: "1.234.567" -> 1234567.
pub fn parse_count(s: &str) -> Option<i64> {
    let digits: String = s.trim().chars().filter(|c| !matches!(c, ',' | '.' | ' ')).collect();
    if digits.is_empty() {
        return None;
    }
    digits.parse().ok()
}

/// Online time as shown on player pages: "6h 05m" -> 365, "50m" -> 50,
/// "7h" -> 420. Empty and "0:00" are zero.
pub fn parse_online_minutes(s: &str) -> Option<i64> {
    let s = s.trim();
    if s.is_empty() || s == "0:00" {
        return Some(0);
    }

    let (hours, rest) = match s.split_once('h') {
        Some((h, rest)) => (h.trim().parse::<i64>().ok()?, rest.trim()),
        None => (0, s),
    };
    let minutes = match rest.split_once('m') {
        Some((m, _)) if !m.trim().is_empty() => m.trim().parse::<i64>().ok()?,
        Some(_) => 0,
        None if rest.is_empty() => 0,
        None => return None,
    };
    Some(hours * 60 + minutes)
}

/// Keep word chars, whitespace and `,.:-`; used on routine labels that
/// carry icons or emoji.
pub fn keep_label_chars(s: &str) -> String {
    let kept: String = s
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace() || matches!(c, '_' | ',' | '.' | ':' | '-'))
        .collect();
    normalize_ws(&kept)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entities() {
        assert_eq!(normalize_entities("RAW no per&iacute;odo"), "RAW no período");
        assert_eq!(normalize_entities("a&nbsp;&amp;&#39;b&#x41;"), "a &'bA");
        assert_eq!(normalize_entities("&#bogus; x"), "&#bogus; x");
    }

    #[test]
    fn counts() {
        assert_eq!(parse_count("1.234.567"), Some(1_234_567));
        assert_eq!(parse_count(" 98,000 "), Some(98_000));
        assert_eq!(parse_count("-"), None);
        assert_eq!(parse_count(""), None);
    }

    #[test]
    fn online_minutes() {
        assert_eq!(parse_online_minutes("6h 05m"), Some(365));
        assert_eq!(parse_online_minutes("7h 10m"), Some(430));
        assert_eq!(parse_online_minutes("50m"), Some(50));
        assert_eq!(parse_online_minutes("2h"), Some(120));
        assert_eq!(parse_online_minutes("0:00"), Some(0));
        assert_eq!(parse_online_minutes("soon"), None);
    }

    #[test]
    fn labels() {
        assert_eq!(keep_label_chars("⚡ Daily Raw Ranking"), "Daily Raw Ranking");
    }
}
