//! Minimal `{{ path }}` substitution for email subjects and bodies.
//!
//! This is a data-interpolation tool, not a template language: no
//! conditionals, no loops, no escaping. A token's path is split on `.` and
//! walked field by field through a JSON context; a missing segment or a
//! `null` leaf substitutes the empty string. Malformed tokens (an opening
//! `{{` with no closing `}}`) are left as literal text, so the renderer has
//! no error states at all.

use serde_json::Value;

/// Render `template` against `context`, replacing every `{{ path }}` token.
///
/// Scalar leaves substitute their natural string form (strings unquoted),
/// composite leaves their compact JSON encoding.
///
/// # Examples
///
/// ```rust
/// use dripline::template::render;
/// use serde_json::json;
///
/// let ctx = json!({"firstName": "Jane", "n1": {"status": "sent"}});
/// assert_eq!(render("Hi {{firstName}}!", &ctx), "Hi Jane!");
/// assert_eq!(render("{{n1.status}}", &ctx), "sent");
/// assert_eq!(render("{{ missing.path }}", &ctx), "");
/// assert_eq!(render("literal {{oops", &ctx), "literal {{oops");
/// ```
#[must_use]
pub fn render(template: &str, context: &Value) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find("{{") {
        out.push_str(&rest[..open]);
        let after_open = &rest[open + 2..];
        match after_open.find("}}") {
            Some(close) => {
                let path = after_open[..close].trim();
                out.push_str(&lookup(context, path));
                rest = &after_open[close + 2..];
            }
            None => {
                // Unbalanced token: keep the remainder verbatim.
                out.push_str(&rest[open..]);
                return out;
            }
        }
    }
    out.push_str(rest);
    out
}

/// Walk `path` (dot-separated) through `context`; missing or null → "".
fn lookup(context: &Value, path: &str) -> String {
    if path.is_empty() {
        return String::new();
    }
    let mut current = context;
    for segment in path.split('.') {
        match current.get(segment) {
            Some(next) => current = next,
            None => return String::new(),
        }
    }
    stringify(current)
}

fn stringify(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        composite => composite.to_string(),
    }
}
