use serde::{Deserialize, Serialize};

/// Number of leading fields a line must yield to become a [`Record`].
pub const RECORD_FIELDS: usize = 6;

/// Substrings that mark the first line of an upload as a header row.
const HEADER_MARKERS: [&str; 2] = ["firstname", "email"];

/// One persisted row of an upload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub id: i64,
    pub firstname: String,
    pub lastname: String,
    pub email: String,
    pub email2: String,
    pub profession: String,
}

impl Record {
    /// Build a record from split fields. Returns `None` for short rows.
    ///
    /// Fields past the sixth are ignored.
    pub fn from_fields(fields: &[String]) -> Option<Self> {
        if fields.len() < RECORD_FIELDS {
            return None;
        }
        let text = |idx: usize| fields.get(idx).cloned().unwrap_or_default();
        Some(Self {
            id: parse_leading_int(&fields[0]),
            firstname: text(1),
            lastname: text(2),
            email: text(3),
            email2: text(4),
            profession: text(5),
        })
    }

    /// Split and map one line in a single step.
    pub fn from_line(line: &str) -> Option<Self> {
        Self::from_fields(&split_line(line))
    }
}

/// Quote-aware comma splitter.
///
/// A `"` toggles the quoted state and is dropped from the output. There is no
/// escape form: `""` toggles twice, so `"a""b"` reads as `ab`. An unterminated
/// quote runs to the end of the line without error. Every field is trimmed of
/// whitespace and stray byte order marks.
pub fn split_line(line: &str) -> Vec<String> {
    let mut fields = Vec::with_capacity(RECORD_FIELDS);
    let mut current = String::new();
    let mut in_quotes = false;

    for ch in line.chars() {
        match ch {
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => {
                fields.push(trim_field(&current).to_string());
                current.clear();
            }
            _ => current.push(ch),
        }
    }
    fields.push(trim_field(&current).to_string());
    fields
}

fn trim_field(field: &str) -> &str {
    field.trim_matches(|c: char| c.is_whitespace() || c == '\u{feff}')
}

/// Header heuristic for the first line of an upload.
///
/// Any data row containing one of the markers is misread as a header.
pub fn looks_like_header(line: &str) -> bool {
    let lower = line.to_lowercase();
    HEADER_MARKERS.iter().any(|marker| lower.contains(marker))
}

/// Lenient integer read: optional sign, then the longest run of digits, read
/// as hex after a `0x` prefix. No digits, or a value outside `i64`, reads as 0.
fn parse_leading_int(field: &str) -> i64 {
    let field = trim_field(field);
    let (negative, rest) = match field.as_bytes().first() {
        Some(b'-') => (true, &field[1..]),
        Some(b'+') => (false, &field[1..]),
        _ => (false, field),
    };
    let (radix, digits) = match rest.get(..2) {
        Some("0x" | "0X") => (16, &rest[2..]),
        _ => (10, rest),
    };
    let end = digits
        .bytes()
        .take_while(|b| char::from(*b).is_digit(radix))
        .count();
    if end == 0 {
        return 0;
    }
    match i64::from_str_radix(&digits[..end], radix) {
        Ok(v) if negative => -v,
        Ok(v) => v,
        Err(_) => 0,
    }
}
