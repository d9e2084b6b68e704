//! Core parsing primitives for line-oriented text.
//!
//! Command output, version files, password files and environment dumps are
//! all read through these helpers.

use regex::Regex;

/// Extract the first match of a capture group, scanning line by line.
/// Returns the 1-based capture groups of the first matching line.
pub fn first_line_captures(content: &str, re: &Regex) -> Option<Vec<String>> {
    content.lines().find_map(|line| {
        re.captures(line).map(|caps| {
            caps.iter()
                .skip(1)
                .map(|m| m.map(|m| m.as_str().to_string()).unwrap_or_default())
                .collect()
        })
    })
}

/// First line of content with surrounding whitespace removed.
pub fn first_line(content: &str) -> Option<String> {
    content.lines().next().map(|l| l.trim().to_string())
}

/// Parse output into non-empty lines.
pub fn lines(output: &str) -> impl Iterator<Item = &str> {
    output.lines().filter(|line| !line.is_empty())
}

/// Last `count` lines of output, joined back with newlines.
pub fn tail(output: &str, count: usize) -> String {
    let tail: Vec<&str> = output.lines().rev().take(count).collect();
    tail.into_iter().rev().collect::<Vec<_>>().join("\n")
}
