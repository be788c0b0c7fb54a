//! POSIX shell argument escaping.

/// Characters that never need quoting.
fn is_safe(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '/' | ':' | '=' | '-')
}

/// Escape a single argument for inclusion in an `sh` command line.
///
/// Arguments made only of `[A-Za-z0-9_/:=-]` are returned unchanged. Anything
/// else is wrapped in single quotes with embedded quotes rendered as `'\''`.
/// An empty argument becomes `''` so it still occupies a position.
pub fn shell_escape(arg: &str) -> String {
    if arg.is_empty() {
        return "''".to_string();
    }
    if arg.chars().all(is_safe) {
        return arg.to_string();
    }

    let mut quoted = String::with_capacity(arg.len() + 2);
    quoted.push('\'');
    for c in arg.chars() {
        if c == '\'' {
            quoted.push_str("'\\''");
        } else {
            quoted.push(c);
        }
    }
    quoted.push('\'');

    // `'\''` at either end leaves an empty `''` pair behind; drop them.
    let mut trimmed = quoted.as_str();
    while let Some(rest) = trimmed.strip_prefix("''") {
        trimmed = rest;
    }
    trimmed.replace("\\'''", "\\'")
}
