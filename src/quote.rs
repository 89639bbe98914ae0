// src/quote.rs

//! POSIX shell quoting, so that logged commands can be pasted back into a
//! shell and generated makefile recipes survive `/bin/sh`.

/// Quote one argument for `/bin/sh`.
///
/// Arguments made only of safe characters are left alone; everything else
/// is wrapped in single quotes, with embedded single quotes written as
/// `'"'"'`.
pub fn shell_quote(arg: &str) -> String {
    let safe = !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "@%+=:,./-_".contains(c));
    if safe {
        return arg.to_string();
    }
    format!("'{}'", arg.replace('\'', r#"'"'"'"#))
}

/// Quote every argument individually and join with spaces.
pub fn shell_join<S: AsRef<str>>(argv: &[S]) -> String {
    argv.iter()
        .map(|a| shell_quote(a.as_ref()))
        .collect::<Vec<_>>()
        .join(" ")
}
