//! Naming template engine — §4.T.
//!
//! Expands `{name[:modifier]}` placeholders against a case-insensitive
//! `name -> value` map. Used by the organiser to turn a Book into a
//! filesystem path.

use std::collections::HashMap;

use regex::Regex;
use thiserror::Error;

const KNOWN_NAMES: &[&str] = &[
    "title",
    "cleantitle",
    "titlethe",
    "author",
    "authorfirst",
    "authorlast",
    "narrator",
    "narratorfirst",
    "narratorlast",
    "series",
    "seriestitle",
    "seriesposition",
    "year",
    "publishyear",
    "audiobookreleaseyear",
    "publisher",
    "language",
    "edition",
    "quality",
    "duration",
    "filesize",
    "format",
    "genre",
    "subgenre",
    "tags",
    "isbn",
    "asin",
    "isbn13",
    "release_group",
];

const MAX_SEGMENT_LEN: usize = 180;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TemplateError {
    #[error("expanded path still contains an unresolved placeholder: {0:?}")]
    LeftoverPlaceholder(String),
}

/// A single `{name[:modifier]}` occurrence parsed out of a pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Placeholder {
    raw: String,
    name: String,
    modifier: Option<String>,
}

fn name_start_re() -> Regex {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*").unwrap()
}

/// Scans `pattern` starting at `from` for the next `{name[:modifier]}` span,
/// depth-counting braces so a conditional modifier's embedded `{name}`
/// literal doesn't truncate the outer placeholder early.
fn next_placeholder(pattern: &str, from: usize) -> Option<(usize, usize, Placeholder)> {
    let bytes = pattern.as_bytes();
    let mut i = from;
    while i < bytes.len() {
        if bytes[i] == b'{' {
            let after_brace = i + 1;
            if let Some(m) = name_start_re().find(&pattern[after_brace..]) {
                let name_end = after_brace + m.end();
                let rest = &pattern[name_end..];
                if rest.starts_with('}') {
                    let end = name_end + 1;
                    return Some((
                        i,
                        end,
                        Placeholder { raw: pattern[i..end].to_string(), name: m.as_str().to_lowercase(), modifier: None },
                    ));
                }
                if let Some(after_colon) = rest.strip_prefix(':') {
                    let colon_start = name_end + 1;
                    if let Some(close_rel) = find_matching_close(after_colon) {
                        let modifier = &after_colon[..close_rel];
                        let end = colon_start + close_rel + 1;
                        return Some((
                            i,
                            end,
                            Placeholder {
                                raw: pattern[i..end].to_string(),
                                name: m.as_str().to_lowercase(),
                                modifier: Some(modifier.to_string()),
                            },
                        ));
                    }
                }
            }
        }
        i += 1;
    }
    None
}

/// Finds the byte offset of the `}` that closes the modifier, treating any
/// inner `{...}` (as used by the conditional modifier's literal) as nested.
fn find_matching_close(s: &str) -> Option<usize> {
    let mut depth = 0;
    for (idx, ch) in s.char_indices() {
        match ch {
            '{' => depth += 1,
            '}' => {
                if depth == 0 {
                    return Some(idx);
                }
                depth -= 1;
            }
            _ => {}
        }
    }
    None
}

fn strip_placeholders(pattern: &str) -> String {
    let mut out = String::new();
    let mut last = 0;
    let mut pos = 0;
    while let Some((start, end, _)) = next_placeholder(pattern, pos) {
        out.push_str(&pattern[last..start]);
        last = end;
        pos = end;
    }
    out.push_str(&pattern[last..]);
    out
}

fn find_placeholders(pattern: &str) -> Vec<Placeholder> {
    let mut out = Vec::new();
    let mut pos = 0;
    while let Some((_, end, placeholder)) = next_placeholder(pattern, pos) {
        pos = end;
        out.push(placeholder);
    }
    out
}

/// Expands `pattern` against `values` (name lookup is case-insensitive).
/// Returns an error if, after expansion, an unresolved `{...}` remains.
pub fn expand(pattern: &str, values: &HashMap<String, String>) -> Result<String, TemplateError> {
    let lower_values: HashMap<String, String> =
        values.iter().map(|(k, v)| (k.to_lowercase(), v.clone())).collect();

    let mut out = String::with_capacity(pattern.len());
    let mut last = 0;
    while let Some((start, end, placeholder)) = next_placeholder(pattern, last) {
        out.push_str(&pattern[last..start]);
        last = end;

        let value = lower_values.get(&placeholder.name).cloned().unwrap_or_default();
        out.push_str(&apply_modifier(&placeholder.name, &value, placeholder.modifier.as_deref(), &lower_values));
    }
    out.push_str(&pattern[last..]);

    if let Some((start, end, _)) = next_placeholder(&out, 0) {
        return Err(TemplateError::LeftoverPlaceholder(out[start..end].to_string()));
    }
    Ok(out)
}

fn apply_modifier(
    name: &str,
    value: &str,
    modifier: Option<&str>,
    values: &HashMap<String, String>,
) -> String {
    let Some(modifier) = modifier else {
        return value.to_string();
    };

    if let Some(literal) = modifier.strip_prefix('+') {
        if value.is_empty() {
            return String::new();
        }
        return literal.replace(&format!("{{{name}}}"), value);
    }

    match modifier {
        "upper" => return value.to_uppercase(),
        "lower" => return value.to_lowercase(),
        "title" => return title_case(value),
        "camel" => return camel_case(value),
        _ => {}
    }

    if modifier.chars().all(|c| c == '0') && !modifier.is_empty() {
        let width = modifier.len();
        return pad(value, width);
    }

    if let Ok(n) = modifier.parse::<i32>() {
        return truncate(value, n);
    }

    if let Some(rest) = modifier.strip_prefix("replace(") {
        if let Some(rest) = rest.strip_suffix(')') {
            if let Some((src, dst)) = parse_replace_args(rest) {
                return value.replace(&src, &dst);
            }
        }
    }

    let _ = values;
    value.to_string()
}

fn pad(value: &str, width: usize) -> String {
    if value.chars().all(|c| c.is_ascii_digit()) && !value.is_empty() {
        format!("{:0>width$}", value, width = width)
    } else {
        format!("{:>width$}", value, width = width)
    }
}

fn truncate(value: &str, n: i32) -> String {
    let chars: Vec<char> = value.chars().collect();
    if n >= 0 {
        let n = n as usize;
        if chars.len() <= n {
            value.to_string()
        } else {
            chars[chars.len() - n..].iter().collect()
        }
    } else {
        let n = (-n) as usize;
        chars.into_iter().take(n).collect()
    }
}

fn parse_replace_args(inner: &str) -> Option<(String, String)> {
    let inner = inner.trim();
    let rest = inner.strip_prefix('\'')?;
    let src_end = rest.find('\'')?;
    let src = &rest[..src_end];
    let rest = rest[src_end + 1..].trim_start();
    let rest = rest.strip_prefix(',')?.trim_start();
    let rest = rest.strip_prefix('\'')?;
    let dst_end = rest.rfind('\'')?;
    let dst = &rest[..dst_end];
    Some((src.to_string(), dst.to_string()))
}

fn title_case(value: &str) -> String {
    value
        .split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn camel_case(value: &str) -> String {
    let mut result = String::new();
    for (i, word) in value.split_whitespace().enumerate() {
        if i == 0 {
            result.push_str(&word.to_lowercase());
        } else {
            let mut chars = word.chars();
            if let Some(first) = chars.next() {
                result.extend(first.to_uppercase());
                result.push_str(&chars.as_str().to_lowercase());
            }
        }
    }
    result
}

/// Inspects `pattern` without expanding it. Returns a list of human-readable
/// problems; an empty list means the pattern is valid.
pub fn validate(pattern: &str) -> Vec<String> {
    let mut messages = Vec::new();

    for placeholder in find_placeholders(pattern) {
        if !KNOWN_NAMES.contains(&placeholder.name.as_str()) {
            messages.push(format!("unknown placeholder {:?}", placeholder.raw));
        }
    }

    let has_title = pattern.contains("{title}") || pattern.to_lowercase().contains("{title}");
    let has_series = pattern.to_lowercase().contains("{series}");
    if !has_title && !has_series {
        messages.push("pattern must contain {title} or {series}".to_string());
    }

    for segment in pattern.split('/') {
        let static_len = strip_placeholders(segment).chars().count();
        if static_len > MAX_SEGMENT_LEN {
            messages.push(format!(
                "path segment {segment:?} has {static_len} static characters, exceeding {MAX_SEGMENT_LEN}"
            ));
        }
    }

    messages
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values() -> HashMap<String, String> {
        let mut m = HashMap::new();
        m.insert("title".to_string(), "Project Hail Mary".to_string());
        m.insert("author".to_string(), "Andy Weir".to_string());
        m.insert("seriesposition".to_string(), "2".to_string());
        m.insert("narrator".to_string(), "".to_string());
        m
    }

    #[test]
    fn expands_plain_placeholders() {
        let out = expand("{author}/{title}", &values()).unwrap();
        assert_eq!(out, "Andy Weir/Project Hail Mary");
    }

    #[test]
    fn missing_value_vanishes() {
        let out = expand("{title} [{series}]", &values()).unwrap();
        assert_eq!(out, "Project Hail Mary []");
    }

    #[test]
    fn case_insensitive_name_lookup() {
        let out = expand("{Author}", &values()).unwrap();
        assert_eq!(out, "Andy Weir");
    }

    #[test]
    fn upper_modifier() {
        let out = expand("{author:upper}", &values()).unwrap();
        assert_eq!(out, "ANDY WEIR");
    }

    #[test]
    fn pad_modifier_zero_pads_numeric() {
        let out = expand("{seriesposition:00}", &values()).unwrap();
        assert_eq!(out, "02");
    }

    #[test]
    fn truncate_positive_keeps_last_n() {
        let out = expand("{title:4}", &values()).unwrap();
        assert_eq!(out, "Mary");
    }

    #[test]
    fn truncate_negative_keeps_first_n() {
        let out = expand("{title:-4}", &values()).unwrap();
        assert_eq!(out, "Proj");
    }

    #[test]
    fn replace_modifier() {
        let out = expand("{title:replace(' ','_')}", &values()).unwrap();
        assert_eq!(out, "Project_Hail_Mary");
    }

    #[test]
    fn conditional_modifier_only_emits_when_nonempty() {
        let out = expand("{title}{narrator:+ narrated by {narrator}}", &values()).unwrap();
        assert_eq!(out, "Project Hail Mary");

        let mut vals = values();
        vals.insert("narrator".to_string(), "Ray Porter".to_string());
        let out = expand("{title}{narrator:+ narrated by {narrator}}", &vals).unwrap();
        assert_eq!(out, "Project Hail Mary narrated by Ray Porter");
    }

    #[test]
    fn unknown_modifier_passes_value_through() {
        let out = expand("{author:frobnicate}", &values()).unwrap();
        assert_eq!(out, "Andy Weir");
    }

    #[test]
    fn leftover_placeholder_after_bad_nesting_errors() {
        let mut vals = values();
        vals.insert("title".to_string(), "{unresolved}".to_string());
        let result = expand("{title}", &vals);
        assert!(result.is_err());
    }

    #[test]
    fn validate_flags_unknown_placeholder() {
        let messages = validate("{title}/{bogus}");
        assert!(messages.iter().any(|m| m.contains("bogus")));
    }

    #[test]
    fn validate_requires_title_or_series() {
        let messages = validate("{author}/{narrator}");
        assert!(messages.iter().any(|m| m.contains("title")));
    }

    #[test]
    fn validate_accepts_series_only_pattern() {
        let messages = validate("{series}/{seriesposition} - {author}");
        assert!(messages.is_empty());
    }

    #[test]
    fn validate_flags_overlong_static_segment() {
        let long = "x".repeat(200);
        let messages = validate(&format!("{long}/{{title}}"));
        assert!(messages.iter().any(|m| m.contains("exceeding")));
    }
}
