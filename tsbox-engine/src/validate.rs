//! Static checks on submitted source, run before anything executes.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::EngineError;

// The entry-point contract accepts the declaration form, the const/arrow
// form, and a named export list; anything else fails before a V8 isolate
// is created. The list form cannot prove `main` is async textually, so the
// driver's runtime type check covers it.
static FN_EXPORT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*export\s+(?:default\s+)?async\s+function\s+main\s*\(")
        .expect("entry-point pattern")
});
static ASSIGN_EXPORT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*export\s+(?:const|let|var)\s+main\s*=\s*async\b")
        .expect("entry-point pattern")
});
static LIST_EXPORT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*export\s*\{([^}]*)\}").expect("entry-point pattern"));

/// Strip line and block comments so a commented-out export neither
/// satisfies nor hides the entry-point check. String and template literals
/// are passed through untouched.
fn strip_comments(code: &str) -> String {
    enum State {
        Normal,
        Str(char),
        LineComment,
        BlockComment,
    }

    let mut out = String::with_capacity(code.len());
    let mut state = State::Normal;
    let mut chars = code.chars().peekable();
    while let Some(c) = chars.next() {
        match state {
            State::Normal => match c {
                '"' | '\'' | '`' => {
                    state = State::Str(c);
                    out.push(c);
                }
                '/' => match chars.peek() {
                    Some('/') => {
                        chars.next();
                        state = State::LineComment;
                    }
                    Some('*') => {
                        chars.next();
                        state = State::BlockComment;
                    }
                    _ => out.push(c),
                },
                _ => out.push(c),
            },
            State::Str(quote) => {
                out.push(c);
                if c == '\\' {
                    if let Some(escaped) = chars.next() {
                        out.push(escaped);
                    }
                } else if c == quote {
                    state = State::Normal;
                }
            }
            State::LineComment => {
                if c == '\n' {
                    out.push('\n');
                    state = State::Normal;
                }
            }
            State::BlockComment => {
                if c == '*' && chars.peek() == Some(&'/') {
                    chars.next();
                    state = State::Normal;
                }
            }
        }
    }
    out
}

/// Whether any `export { ... }` list names `main`, directly or via an
/// `as main` alias.
fn export_list_names_main(code: &str) -> bool {
    LIST_EXPORT.captures_iter(code).any(|caps| {
        caps[1].split(',').any(|item| {
            let mut words = item.split_whitespace();
            matches!(
                (words.next(), words.next(), words.next()),
                (Some("main"), None, None) | (Some(_), Some("as"), Some("main"))
            )
        })
    })
}

/// Whether the source exports the required `main` entry point.
pub fn has_entry_point(code: &str) -> bool {
    let code = strip_comments(code);
    FN_EXPORT.is_match(&code) || ASSIGN_EXPORT.is_match(&code) || export_list_names_main(&code)
}

/// Validate submitted source: size ceiling, then the entry-point export
/// contract. Purely textual; the code is never evaluated here.
pub fn validate_code(code: &str, max_size: usize) -> Result<(), EngineError> {
    if code.len() > max_size {
        return Err(EngineError::CodeTooLarge {
            max: max_size,
            actual: code.len(),
        });
    }
    if !has_entry_point(code) {
        return Err(EngineError::MissingEntryPoint);
    }
    Ok(())
}
