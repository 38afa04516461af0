//! Placeholder substitution for instruction templates.
//!
//! Only placeholders naming a supplied key are replaced, in either the
//! `${key}` or the bare `$key` form. Everything else in the template,
//! including JSON-like braces and unknown placeholders, passes through
//! verbatim, and substituted values are never re-scanned.

/// Placeholder for the resolved task.
pub const TASK: &str = "task";
/// Placeholder for the formatted block of prior responses.
pub const PREVIOUS_RESPONSES: &str = "previous_responses";
/// Placeholder for a persona description inside a persona template.
pub const PERSONA: &str = "persona";

/// Render `template` with `values`, collapsing doubled trailing periods.
///
/// An absent value (`None`) renders as the empty string.
pub fn render(template: &str, values: &[(&str, Option<&str>)]) -> String {
    render_with(template, values, true)
}

/// Render `template` with `values`.
///
/// With `avoid_double_period`, a placeholder directly followed by a literal
/// `.` whose value already ends in `.` emits the value without its final
/// period, so `"Task: ${task}."` with `"Y."` yields `"Task: Y."`.
pub fn render_with(
    template: &str,
    values: &[(&str, Option<&str>)],
    avoid_double_period: bool,
) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(pos) = rest.find('$') {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];
        match match_placeholder(after, values) {
            Some((consumed, value)) => {
                let tail = &after[consumed..];
                let value = value.unwrap_or("");
                if avoid_double_period && tail.starts_with('.') && value.ends_with('.') {
                    out.push_str(&value[..value.len() - 1]);
                } else {
                    out.push_str(value);
                }
                rest = tail;
            }
            None => {
                out.push('$');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

/// Whether `template` contains the braced placeholder `${name}`.
pub fn has_placeholder(template: &str, name: &str) -> bool {
    template.contains(&format!("${{{name}}}"))
}

/// Format prior responses as a numbered block:
///
/// ```text
/// Response 0: first
/// Response 1: second
/// ```
///
/// Returns the empty string for an empty slice.
pub fn format_previous_responses<S: AsRef<str>>(responses: &[S]) -> String {
    let entries: Vec<(String, &str)> = responses
        .iter()
        .enumerate()
        .map(|(i, r)| (format!("Response {i}"), r.as_ref()))
        .collect();
    format_labeled(&entries)
}

/// Like [`format_previous_responses`], skipping absent entries.
///
/// Numbering counts only the entries that are present.
pub fn format_present_responses(responses: &[Option<String>]) -> String {
    let present: Vec<&str> = responses.iter().flatten().map(String::as_str).collect();
    format_previous_responses(&present)
}

/// Format `(label, text)` pairs as `label: text` lines, trimmed as a block.
pub fn format_labeled<L: AsRef<str>>(entries: &[(L, &str)]) -> String {
    let mut block = String::new();
    for (label, text) in entries {
        block.push_str(label.as_ref());
        block.push_str(": ");
        block.push_str(text);
        block.push('\n');
    }
    block.trim().to_string()
}

fn match_placeholder<'v>(
    after: &str,
    values: &[(&str, Option<&'v str>)],
) -> Option<(usize, Option<&'v str>)> {
    if let Some(inner) = after.strip_prefix('{') {
        let end = inner.find('}')?;
        let value = lookup(values, &inner[..end])?;
        return Some((end + 2, value));
    }

    let len = after
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .unwrap_or(after.len());
    if len == 0 || after.as_bytes()[0].is_ascii_digit() {
        return None;
    }
    let value = lookup(values, &after[..len])?;
    Some((len, value))
}

fn lookup<'v>(values: &[(&str, Option<&'v str>)], name: &str) -> Option<Option<&'v str>> {
    values.iter().find(|(k, _)| *k == name).map(|(_, v)| *v)
}
