// src/config/template.rs

//! `${name}` interpolation shared by variable templates, working
//! directories and command arguments.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;

use crate::types::Value;

static REFERENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_-]*)\}").expect("reference regex is valid")
});

/// Names referenced by `${...}` in `text`.
pub fn references(text: &str) -> BTreeSet<String> {
    REFERENCE
        .captures_iter(text)
        .map(|c| c[1].to_string())
        .collect()
}

/// If `text` is exactly one reference (`"${name}"`), return the name.
pub fn sole_reference(text: &str) -> Option<&str> {
    let caps = REFERENCE.captures(text)?;
    let whole = caps.get(0)?;
    if whole.start() == 0 && whole.end() == text.len() {
        caps.get(1).map(|m| m.as_str())
    } else {
        None
    }
}

/// Replace every reference with the display form of its value.
///
/// Returns the first unresolvable name as the error.
pub fn interpolate<'v, F>(text: &str, lookup: F) -> Result<String, String>
where
    F: Fn(&str) -> Option<&'v Value>,
{
    let mut out = String::with_capacity(text.len());
    let mut last = 0;

    for caps in REFERENCE.captures_iter(text) {
        let whole = caps.get(0).expect("group 0 always matches");
        let name = &caps[1];
        let value = lookup(name).ok_or_else(|| name.to_string())?;
        out.push_str(&text[last..whole.start()]);
        out.push_str(&value.to_string());
        last = whole.end();
    }
    out.push_str(&text[last..]);

    Ok(out)
}

/// Interpolate a list of items; an item that is exactly `${list_var}` is
/// spliced into the list element by element.
pub fn interpolate_list<'v, F>(items: &[String], lookup: F) -> Result<Vec<String>, String>
where
    F: Fn(&str) -> Option<&'v Value>,
{
    let mut out = Vec::with_capacity(items.len());
    for item in items {
        if let Some(name) = sole_reference(item) {
            if let Some(Value::List(values)) = lookup(name) {
                out.extend(values.iter().cloned());
                continue;
            }
        }
        out.push(interpolate(item, &lookup)?);
    }
    Ok(out)
}
