//! Mapping diagnostics back to lines of the author's original file
//!
//! Stages look at split and rendered documents, but users edit the original
//! text. Three strategies recover a 1-based line in that text:
//!
//! - [`line_for_doc_index`]: first content line of the n-th document
//! - [`line_for_yaml_path`]: line introducing a dot-separated YAML path
//! - [`line_for_match`]: first line containing a literal substring
//!
//! All three are pure string scans over the original content and return
//! `None` when nothing matches.

/// Whether a trimmed line separates documents (`---`, optionally followed by
/// a comment)
fn is_separator(trimmed: &str) -> bool {
    match trimmed.strip_prefix("---") {
        Some(rest) => {
            let rest = rest.trim_start();
            rest.is_empty() || rest.starts_with('#')
        }
        None => false,
    }
}

fn is_skippable(trimmed: &str) -> bool {
    trimmed.is_empty() || trimmed.starts_with('#')
}

fn leading_whitespace(line: &str) -> &str {
    let content_start = line.len() - line.trim_start().len();
    &line[..content_start]
}

/// 1-based line of the first content line of document `doc_index`.
///
/// Separators seen before the first content line are leading and do not
/// start a new document.
pub fn line_for_doc_index(content: &str, doc_index: usize) -> Option<usize> {
    let mut current = 0usize;
    let mut seen_content = false;
    let mut awaiting_first_line = true;

    for (i, line) in content.lines().enumerate() {
        let trimmed = line.trim_start();
        if is_separator(trimmed) {
            if seen_content {
                current += 1;
                awaiting_first_line = true;
            }
            continue;
        }
        if is_skippable(trimmed) {
            continue;
        }
        seen_content = true;
        if awaiting_first_line {
            if current == doc_index {
                return Some(i + 1);
            }
            awaiting_first_line = false;
        }
        if current > doc_index {
            break;
        }
    }

    None
}

enum Segment<'a> {
    Index(usize),
    Key(&'a str),
}

fn parse_segments(path: &str) -> Vec<Segment<'_>> {
    path.split('.')
        .filter(|s| !s.is_empty())
        .map(|s| match s.parse::<usize>() {
            Ok(i) => Segment::Index(i),
            Err(_) => Segment::Key(s),
        })
        .collect()
}

/// Whether `rest` (text after a list dash) introduces `key:`
fn introduces_key(rest: &str, key: &str) -> bool {
    rest.trim_start()
        .strip_prefix(key)
        .is_some_and(|after| after.starts_with(':'))
}

/// Indentation of the first content line after line index `from`
fn next_indent<'a>(lines: &[&'a str], from: usize) -> Option<&'a str> {
    lines[from + 1..]
        .iter()
        .find(|l| !is_skippable(l.trim_start()))
        .map(|l| leading_whitespace(l))
}

/// 1-based line introducing a YAML path such as
/// `spec.template.spec.containers.0.image` within document `doc_index`.
///
/// Integer segments address list items, other segments mapping keys. When
/// the full path cannot be followed, the last matched line is returned.
pub fn line_for_yaml_path(content: &str, doc_index: usize, path: &str) -> Option<usize> {
    let start = line_for_doc_index(content, doc_index)?;
    let segments = parse_segments(path);
    if segments.is_empty() {
        return Some(start);
    }

    let lines: Vec<&str> = content.lines().collect();
    let mut indent: String = leading_whitespace(lines[start - 1]).to_string();
    let mut cursor = 0usize;
    let mut item_count: Option<usize> = None;
    let mut matched = None;

    let mut i = start - 1;
    while i < lines.len() && cursor < segments.len() {
        let line = lines[i];
        let trimmed = line.trim_start();
        if i >= start && is_separator(trimmed) {
            break;
        }
        if is_skippable(trimmed) {
            i += 1;
            continue;
        }

        let consumed = match segments[cursor] {
            Segment::Index(wanted) => match line.strip_prefix(indent.as_str()) {
                Some(rest) if rest.starts_with('-') => {
                    let count = item_count.map_or(0, |c| c + 1);
                    item_count = Some(count);
                    if count == wanted {
                        cursor += 1;
                        item_count = None;
                        if let Some(Segment::Key(key)) = segments.get(cursor)
                            && introduces_key(&rest[1..], key)
                        {
                            cursor += 1;
                        }
                        true
                    } else {
                        false
                    }
                }
                _ => false,
            },
            Segment::Key(key) => {
                let consumed = line
                    .strip_prefix(indent.as_str())
                    .and_then(|rest| rest.strip_prefix(key))
                    .is_some_and(|after| after.starts_with(':'));
                if consumed {
                    cursor += 1;
                }
                consumed
            }
        };

        if consumed {
            matched = Some(i + 1);
            match next_indent(&lines, i) {
                Some(next) => indent = next.to_string(),
                None => break,
            }
        }
        i += 1;
    }

    matched
}

/// Remove single and double quotes
fn strip_quotes(line: &str) -> String {
    line.chars().filter(|c| *c != '"' && *c != '\'').collect()
}

/// 1-based line of the first line at or after document `doc_index` that
/// contains `needle`, directly or once quotes are stripped from the line
pub fn line_for_match(content: &str, doc_index: usize, needle: &str) -> Option<usize> {
    if needle.is_empty() {
        return None;
    }
    let start = line_for_doc_index(content, doc_index)?;

    content
        .lines()
        .enumerate()
        .skip(start - 1)
        .filter(|(_, line)| !line.trim().is_empty())
        .find(|(_, line)| line.contains(needle) || strip_quotes(line).contains(needle))
        .map(|(i, _)| i + 1)
}
