//! SQL statement splitting.
//!
//! Splits on `;` outside of quoted text. Recognized quoting: `'literal'`
//! (with `''` escapes), `"identifier"`, dollar quoting (`$$ ... $$`,
//! `$tag$ ... $tag$`) and `/* block comments */`. `--` comments run to the
//! end of the line and are dropped.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Segment {
    Code,
    Quoted,
    LineComment,
    BlockComment,
    Terminator,
}

/// Remove all `--` comments, keeping line breaks
pub fn strip_line_comments(sql: &str) -> String {
    segments(sql)
        .into_iter()
        .filter(|(kind, _)| *kind != Segment::LineComment)
        .map(|(_, text)| text)
        .collect()
}

/// Split a script into its statements, without terminating `;`.
///
/// Empty statements are dropped; statement text is trimmed.
pub fn split_statements(sql: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut current = String::new();
    for (kind, text) in segments(sql) {
        match kind {
            Segment::LineComment => {}
            Segment::Terminator => push_statement(&mut statements, &mut current),
            Segment::Code | Segment::Quoted | Segment::BlockComment => current.push_str(text),
        }
    }
    push_statement(&mut statements, &mut current);
    statements
}

/// Collapse runs of whitespace outside quoted text into a single space
pub fn collapse_whitespace(statement: &str) -> String {
    let mut out = String::with_capacity(statement.len());
    for (kind, text) in segments(statement) {
        match kind {
            Segment::Code => {
                let mut pending_space = false;
                for c in text.chars() {
                    if c.is_whitespace() {
                        pending_space = true;
                    } else {
                        if pending_space && !out.is_empty() {
                            out.push(' ');
                        }
                        pending_space = false;
                        out.push(c);
                    }
                }
                if pending_space && !out.is_empty() {
                    out.push(' ');
                }
            }
            Segment::LineComment => {}
            _ => out.push_str(text),
        }
    }
    out.trim().to_string()
}

fn push_statement(statements: &mut Vec<String>, current: &mut String) {
    let statement = current.trim();
    if !statement.is_empty() {
        statements.push(statement.to_string());
    }
    current.clear();
}

/// Cut `sql` into typed segments. All delimiters are ASCII, so every cut
/// lands on a char boundary.
fn segments(sql: &str) -> Vec<(Segment, &str)> {
    let bytes = sql.as_bytes();
    let len = bytes.len();
    let mut out = Vec::new();
    let mut start = 0;
    let mut i = 0;

    while i < len {
        let (kind, end) = match bytes[i] {
            b'-' if bytes.get(i + 1) == Some(&b'-') => {
                let end = find(bytes, i, b"\n").unwrap_or(len);
                (Segment::LineComment, end)
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                let end = find(bytes, i + 2, b"*/").map(|p| p + 2).unwrap_or(len);
                (Segment::BlockComment, end)
            }
            b'\'' | b'"' => (Segment::Quoted, closing_quote(bytes, i)),
            b'$' => match dollar_tag_len(bytes, i) {
                Some(tag_len) => {
                    let tag = &bytes[i..i + tag_len];
                    let end = find(bytes, i + tag_len, tag)
                        .map(|p| p + tag_len)
                        .unwrap_or(len);
                    (Segment::Quoted, end)
                }
                None => {
                    i += 1;
                    continue;
                }
            },
            b';' => (Segment::Terminator, i + 1),
            _ => {
                i += 1;
                continue;
            }
        };

        if start < i {
            out.push((Segment::Code, &sql[start..i]));
        }
        out.push((kind, &sql[i..end]));
        i = end;
        start = end;
    }

    if start < len {
        out.push((Segment::Code, &sql[start..]));
    }
    out
}

fn find(bytes: &[u8], from: usize, needle: &[u8]) -> Option<usize> {
    if from >= bytes.len() || needle.is_empty() {
        return None;
    }
    bytes[from..]
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|p| p + from)
}

/// End (exclusive) of the quoted run opening at `open`; doubled quotes escape
fn closing_quote(bytes: &[u8], open: usize) -> usize {
    let quote = bytes[open];
    let mut i = open + 1;
    while i < bytes.len() {
        if bytes[i] == quote {
            if bytes.get(i + 1) == Some(&quote) {
                i += 2;
                continue;
            }
            return i + 1;
        }
        i += 1;
    }
    bytes.len()
}

/// Length of a dollar-quote tag (`$$` or `$name$`) starting at `i`
fn dollar_tag_len(bytes: &[u8], i: usize) -> Option<usize> {
    let mut j = i + 1;
    match bytes.get(j) {
        Some(b'$') => return Some(2),
        Some(c) if c.is_ascii_alphabetic() || *c == b'_' => {}
        _ => return None,
    }
    while let Some(c) = bytes.get(j) {
        if c.is_ascii_alphanumeric() || *c == b'_' {
            j += 1;
        } else {
            break;
        }
    }
    if bytes.get(j) == Some(&b'$') {
        Some(j - i + 1)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_simple() {
        let statements = split_statements("CREATE TABLE a (id INT);\n\nCREATE TABLE b (id INT);\n");
        assert_eq!(
            statements,
            vec!["CREATE TABLE a (id INT)", "CREATE TABLE b (id INT)"]
        );
    }

    #[test]
    fn test_split_strips_line_comments() {
        let sql = "-- header; with semicolon\nINSERT INTO a VALUES (1); -- trailing\n-- only comment\n";
        assert_eq!(split_statements(sql), vec!["INSERT INTO a VALUES (1)"]);
    }

    #[test]
    fn test_split_respects_quotes() {
        let sql = "INSERT INTO a VALUES ('x;y', 'it''s -- not a comment');INSERT INTO \"we;ird\" VALUES (2)";
        let statements = split_statements(sql);
        assert_eq!(statements.len(), 2);
        assert_eq!(
            statements[0],
            "INSERT INTO a VALUES ('x;y', 'it''s -- not a comment')"
        );
        assert_eq!(statements[1], "INSERT INTO \"we;ird\" VALUES (2)");
    }

    #[test]
    fn test_split_respects_dollar_quotes() {
        let sql = r#"
CREATE FUNCTION f() RETURNS trigger AS $$
BEGIN
  UPDATE t SET x = 1; -- inside body
  RETURN NEW;
END;
$$ LANGUAGE plpgsql;
CREATE FUNCTION g() RETURNS int AS $body$ SELECT 1; $body$ LANGUAGE sql;
SELECT $1;
"#;
        let statements = split_statements(sql);
        assert_eq!(statements.len(), 3);
        assert!(statements[0].contains("RETURN NEW;"));
        assert!(statements[0].ends_with("LANGUAGE plpgsql"));
        assert!(statements[1].contains("$body$ SELECT 1; $body$"));
        assert_eq!(statements[2], "SELECT $1");
    }

    #[test]
    fn test_block_comment_is_opaque() {
        let statements = split_statements("/* a; b */ SELECT 1;");
        assert_eq!(statements, vec!["/* a; b */ SELECT 1"]);
    }

    #[test]
    fn test_strip_line_comments_keeps_newlines() {
        assert_eq!(
            strip_line_comments("SELECT 1; -- c\nSELECT '--x';"),
            "SELECT 1; \nSELECT '--x';"
        );
    }

    #[test]
    fn test_collapse_whitespace() {
        assert_eq!(
            collapse_whitespace("  CREATE   TABLE\n\tt ( a  TEXT DEFAULT 'x  y' ) "),
            "CREATE TABLE t ( a TEXT DEFAULT 'x  y' )"
        );
    }
}
