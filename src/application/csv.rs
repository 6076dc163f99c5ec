//! CSV export and tolerant import parsing for the exhibitor catalogue.
//!
//! Real exhibitor spreadsheets arrive with BOMs, mixed line endings,
//! semicolon delimiters and unquoted commas inside free text. The parser
//! is therefore best effort: rows whose column count drifts from the
//! header are re-aligned around a stable tail of known columns, and every
//! repair is reported through the warnings list rather than rejected.

use std::collections::HashMap;

use tracing::warn;

/// Trailing columns that keep their position in exports; re-alignment
/// fills them from the right before distributing what remains.
const STABLE_TAIL: [&str; 9] = [
    "website_url",
    "linkedin_url",
    "pdf_url",
    "theme",
    "contacts_phone",
    "contacts_first_name",
    "contacts_last_name",
    "contacts_role",
    "contacts_email",
];

const MAX_CELL_LENGTH: usize = 50_000;
const DRIFT_WARNING_THRESHOLD: usize = 10;

/// Parse outcome: rows are positionally aligned with `headers`.
#[derive(Debug, Default)]
pub struct ParsedCsv {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
    pub warnings: Vec<String>,
}

impl ParsedCsv {
    pub fn index_of(&self, header: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == header)
    }

    /// Value of `header` in `row`, empty cells reported as `None`.
    pub fn value<'a>(&self, row: &'a [String], header: &str) -> Option<&'a str> {
        let index = self.index_of(header)?;
        let value = row.get(index)?.trim();
        if value.is_empty() { None } else { Some(value) }
    }
}

/// Serialize rows in RFC 4180 form with a comma delimiter. Values are
/// trimmed; quoting applies when a value contains a comma, quote or
/// newline, with embedded quotes doubled.
pub fn to_csv(headers: &[&str], rows: &[Vec<String>]) -> String {
    fn esc(value: &str) -> String {
        let value = value.trim();
        if value.contains([',', '"', '\n', '\r']) {
            format!("\"{}\"", value.replace('"', "\"\""))
        } else {
            value.to_string()
        }
    }

    let head = headers.join(",");
    let body = rows
        .iter()
        .map(|row| row.iter().map(|v| esc(v)).collect::<Vec<_>>().join(","))
        .collect::<Vec<_>>()
        .join("\n");
    format!("{head}\n{body}")
}

/// Parse a whole CSV document.
pub fn parse_csv(text: &str) -> ParsedCsv {
    let mut parsed = ParsedCsv::default();

    if text.trim().is_empty() {
        parsed.warnings.push("CSV input is empty".to_string());
        return parsed;
    }

    let normalized = normalize_input(text);
    let mut lines = logical_lines(&normalized);

    if lines.is_empty() {
        parsed
            .warnings
            .push("no lines found after normalization".to_string());
        return parsed;
    }

    let delimiter = detect_delimiter(&lines);

    let header_line = lines.remove(0);
    if header_line.trim().is_empty() {
        parsed.warnings.push("header line is empty".to_string());
        return parsed;
    }

    let headers: Vec<String> = split_line(&header_line, delimiter)
        .into_iter()
        .map(|h| h.trim().to_string())
        .filter(|h| !h.is_empty())
        .collect();

    if headers.is_empty() {
        parsed
            .warnings
            .push("no columns found in the header line".to_string());
        return parsed;
    }

    parsed.headers = dedupe_headers(headers);

    let mut realigned = 0usize;
    for (idx, line) in lines.iter().enumerate() {
        if line.trim().is_empty() {
            continue;
        }

        let cols = split_line(line, delimiter);
        let aligned = if cols.len() == parsed.headers.len() {
            cols
        } else {
            realigned += 1;
            if cols.len().abs_diff(parsed.headers.len()) > DRIFT_WARNING_THRESHOLD {
                parsed.warnings.push(format!(
                    "line {}: large column drift ({} vs {} expected)",
                    idx + 1,
                    cols.len(),
                    parsed.headers.len()
                ));
            }
            realign_columns(&parsed.headers, &cols)
        };

        let row: Vec<String> = (0..parsed.headers.len())
            .map(|j| sanitize_value(aligned.get(j).map(String::as_str).unwrap_or("")))
            .collect();
        parsed.rows.push(row);
    }

    if realigned > 0 {
        parsed
            .warnings
            .push(format!("{realigned} row(s) automatically re-aligned"));
    }

    parsed
}

/// Strip a UTF-8 BOM, normalize CR/CRLF to LF and drop trailing
/// whitespace on every line.
fn normalize_input(text: &str) -> String {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let text = text.replace("\r\n", "\n").replace('\r', "\n");
    text.split('\n')
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Rebuild logical records: a newline inside an open quote belongs to the
/// current field, not to a new row.
fn logical_lines(input: &str) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    let mut in_quote = false;

    let chars: Vec<char> = input.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let ch = chars[i];

        if ch == '"' && chars.get(i + 1) == Some(&'"') {
            current.push_str("\"\"");
            i += 2;
            continue;
        }
        if ch == '"' {
            in_quote = !in_quote;
            current.push(ch);
            i += 1;
            continue;
        }
        if !in_quote && ch == '\n' {
            if !current.trim().is_empty() {
                lines.push(std::mem::take(&mut current));
            } else {
                current.clear();
            }
            i += 1;
            continue;
        }

        current.push(ch);
        i += 1;
    }

    if !current.trim().is_empty() {
        lines.push(current);
    }

    lines
}

/// Pick `,` or `;` by counting out-of-quote occurrences over the first
/// three logical lines. Comma wins ties.
fn detect_delimiter(lines: &[String]) -> char {
    let mut comma = 0usize;
    let mut semi = 0usize;

    for line in lines.iter().take(3) {
        let chars: Vec<char> = line.chars().collect();
        let mut in_quote = false;
        let mut i = 0;
        while i < chars.len() {
            let ch = chars[i];
            if ch == '"' && chars.get(i + 1) == Some(&'"') {
                i += 2;
                continue;
            }
            if ch == '"' {
                in_quote = !in_quote;
                i += 1;
                continue;
            }
            if !in_quote {
                match ch {
                    ',' => comma += 1,
                    ';' => semi += 1,
                    _ => {}
                }
            }
            i += 1;
        }
    }

    if semi > comma { ';' } else { ',' }
}

/// RFC 4180 field split with doubled-quote escaping; every field is
/// trimmed.
fn split_line(line: &str, delimiter: char) -> Vec<String> {
    let mut cols = Vec::new();
    let mut value = String::new();
    let mut in_quote = false;

    let chars: Vec<char> = line.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let ch = chars[i];

        if ch == '"' && chars.get(i + 1) == Some(&'"') {
            value.push('"');
            i += 2;
            continue;
        }
        if ch == '"' {
            in_quote = !in_quote;
            i += 1;
            continue;
        }
        if !in_quote && ch == delimiter {
            cols.push(value.trim().to_string());
            value.clear();
            i += 1;
            continue;
        }

        value.push(ch);
        i += 1;
    }

    cols.push(value.trim().to_string());
    cols
}

/// Duplicate header names get a positional suffix: `name`, `name_2`, ...
fn dedupe_headers(headers: Vec<String>) -> Vec<String> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    headers
        .into_iter()
        .map(|h| {
            let count = seen.entry(h.clone()).or_insert(0);
            *count += 1;
            if *count == 1 { h } else { format!("{h}_{count}") }
        })
        .collect()
}

/// Re-align a row whose column count drifted from the header:
/// the stable tail is filled from the right, the head is filled
/// left-to-right up to and including `logo_url`, and any leftover middle
/// tokens are folded into `description`.
fn realign_columns(headers: &[String], cols: &[String]) -> Vec<String> {
    let expected = headers.len();
    if cols.len() == expected {
        return cols.iter().map(|c| c.trim().to_string()).collect();
    }

    let index_map: HashMap<&str, usize> = headers
        .iter()
        .enumerate()
        .map(|(i, h)| (h.as_str(), i))
        .collect();
    let stable_tail: Vec<&str> = headers
        .iter()
        .map(String::as_str)
        .filter(|h| STABLE_TAIL.contains(h))
        .collect();
    let tail_len = stable_tail.len();

    let mut result = vec![String::new(); expected];

    for i in 0..tail_len {
        let header_name = stable_tail[tail_len - 1 - i];
        let Some(&target) = index_map.get(header_name) else {
            continue;
        };
        let Some(source) = cols.len().checked_sub(1 + i) else {
            continue;
        };
        result[target] = cols[source].trim().to_string();
    }

    let desc_idx = index_map.get("description").copied();
    let logo_idx = index_map.get("logo_url").copied();

    let head_count = match logo_idx {
        Some(idx) => (idx + 1).min(headers.len()),
        None => 0,
    };
    let source_left_count = cols.len().saturating_sub(tail_len);
    let left_cols = &cols[..source_left_count.min(cols.len())];

    for (i, header) in headers.iter().take(head_count).enumerate() {
        if let Some(&target) = index_map.get(header.as_str()) {
            result[target] = left_cols.get(i).map(|c| c.trim()).unwrap_or("").to_string();
        }
    }

    if let Some(desc_idx) = desc_idx {
        let extra = left_cols
            .iter()
            .skip(head_count)
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        if !extra.is_empty() {
            let existing = result[desc_idx].trim().to_string();
            result[desc_idx] = if existing.is_empty() {
                extra
            } else {
                format!("{existing} {extra}")
            };
        }
    }

    result
}

/// Neutralize spreadsheet formula injection and cap runaway cell sizes.
fn sanitize_value(value: &str) -> String {
    let value = value.trim();

    if value.starts_with(['=', '+', '-', '@', '\t', '\r']) {
        let preview: String = value.chars().take(50).collect();
        warn!(
            target = "expohall::csv",
            preview = %preview,
            "potential formula injection neutralized"
        );
        return format!("'{value}");
    }

    if value.chars().count() > MAX_CELL_LENGTH {
        warn!(
            target = "expohall::csv",
            length = value.len(),
            "cell value truncated"
        );
        let truncated: String = value.chars().take(MAX_CELL_LENGTH).collect();
        return format!("{truncated}... [truncated]");
    }

    value.to_string()
}
