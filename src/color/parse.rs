//! CSS text scanning for color functions.
//!
//! Locates function invocations by name with balanced-parenthesis
//! matching (quoted strings and comments are skipped), splits argument
//! lists at top level, and parses numeric color components.

/// Byte span of one `name( ... )` invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FunctionSpan {
    /// Index of the first byte of the function name.
    pub start: usize,
    /// Index just after the opening parenthesis.
    pub args_start: usize,
    /// Index of the closing parenthesis.
    pub args_end: usize,
}

impl FunctionSpan {
    /// Index just past the closing parenthesis.
    pub fn end(&self) -> usize {
        self.args_end + 1
    }

    pub fn args<'a>(&self, text: &'a str) -> &'a str {
        &text[self.args_start..self.args_end]
    }
}

fn is_ident_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'-' || b == b'_' || b >= 0x80
}

/// Index just past the string or comment that starts at `i`, if one does.
fn skip_opaque(bytes: &[u8], i: usize) -> Option<usize> {
    match bytes[i] {
        quote @ (b'"' | b'\'') => {
            let mut j = i + 1;
            while j < bytes.len() {
                match bytes[j] {
                    b'\\' => j += 2,
                    b if b == quote => return Some(j + 1),
                    _ => j += 1,
                }
            }
            Some(bytes.len())
        }
        b'/' if bytes.get(i + 1) == Some(&b'*') => {
            let mut j = i + 2;
            while j + 1 < bytes.len() {
                if bytes[j] == b'*' && bytes[j + 1] == b'/' {
                    return Some(j + 2);
                }
                j += 1;
            }
            Some(bytes.len())
        }
        _ => None,
    }
}

/// Finds the parenthesis closing the one just before `from`.
fn matching_paren(bytes: &[u8], from: usize) -> Option<usize> {
    let mut depth = 1usize;
    let mut i = from;
    while i < bytes.len() {
        if let Some(next) = skip_opaque(bytes, i) {
            i = next;
            continue;
        }
        match bytes[i] {
            b'(' => depth += 1,
            b')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
        i += 1;
    }
    None
}

/// Finds the next balanced invocation of any of `names` at or after `from`.
///
/// Names match case-insensitively and only at an identifier boundary, so
/// `my-oklch(` is not an `oklch(` call. An unterminated invocation is
/// skipped and scanning resumes inside its argument list.
pub fn find_function(text: &str, names: &[&str], from: usize) -> Option<(FunctionSpan, usize)> {
    let bytes = text.as_bytes();
    let mut i = from;
    while i < bytes.len() {
        if let Some(next) = skip_opaque(bytes, i) {
            i = next;
            continue;
        }
        let at_boundary = i == 0 || !is_ident_byte(bytes[i - 1]);
        if at_boundary && bytes[i].is_ascii_alphabetic() {
            for (idx, name) in names.iter().enumerate() {
                let open = i + name.len();
                let matches_name = bytes
                    .get(i..open)
                    .is_some_and(|s| s.eq_ignore_ascii_case(name.as_bytes()));
                if matches_name && bytes.get(open) == Some(&b'(') {
                    if let Some(close) = matching_paren(bytes, open + 1) {
                        let span = FunctionSpan {
                            start: i,
                            args_start: open + 1,
                            args_end: close,
                        };
                        return Some((span, idx));
                    }
                }
            }
        }
        i += 1;
    }
    None
}

/// Splits at every `sep` byte that is not nested inside parentheses.
pub fn split_top_level(args: &str, sep: u8) -> Vec<&str> {
    let bytes = args.as_bytes();
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut last = 0;
    let mut i = 0;
    while i < bytes.len() {
        if let Some(next) = skip_opaque(bytes, i) {
            i = next;
            continue;
        }
        match bytes[i] {
            b'(' => depth += 1,
            b')' => depth = depth.saturating_sub(1),
            b if b == sep && depth == 0 => {
                parts.push(&args[last..i]);
                last = i + 1;
            }
            _ => {}
        }
        i += 1;
    }
    parts.push(&args[last..]);
    parts
}

/// Whitespace-separated tokens outside parentheses.
pub fn top_level_tokens(text: &str) -> Vec<&str> {
    let bytes = text.as_bytes();
    let mut tokens = Vec::new();
    let mut depth = 0usize;
    let mut start: Option<usize> = None;
    for (i, &b) in bytes.iter().enumerate() {
        match b {
            b'(' => depth += 1,
            b')' => depth = depth.saturating_sub(1),
            _ => {}
        }
        if b.is_ascii_whitespace() && depth == 0 {
            if let Some(s) = start.take() {
                tokens.push(&text[s..i]);
            }
        } else if start.is_none() {
            start = Some(i);
        }
    }
    if let Some(s) = start {
        tokens.push(&text[s..]);
    }
    tokens
}

/// A plain CSS number. Rejects `inf`/`NaN` spellings Rust would accept.
fn parse_number(token: &str) -> Option<f64> {
    let first = token.bytes().next()?;
    if !(first.is_ascii_digit() || matches!(first, b'.' | b'+' | b'-')) {
        return None;
    }
    token.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Number or percentage; `percent_ref` is the value 100% stands for.
/// `none` yields 0.
pub fn parse_scalar(token: &str, percent_ref: f64) -> Option<f64> {
    if token.eq_ignore_ascii_case("none") {
        return Some(0.0);
    }
    match token.strip_suffix('%') {
        Some(pct) => parse_number(pct).map(|v| v / 100.0 * percent_ref),
        None => parse_number(token),
    }
}

/// Hue in degrees. `none` yields NaN, which the converter treats as
/// achromatic.
pub fn parse_hue(token: &str) -> Option<f64> {
    if token.eq_ignore_ascii_case("none") {
        return Some(f64::NAN);
    }
    let lower = token.to_ascii_lowercase();
    let (number, factor) = if let Some(n) = lower.strip_suffix("grad") {
        (n, 0.9)
    } else if let Some(n) = lower.strip_suffix("deg") {
        (n, 1.0)
    } else if let Some(n) = lower.strip_suffix("rad") {
        (n, 180.0 / std::f64::consts::PI)
    } else if let Some(n) = lower.strip_suffix("turn") {
        (n, 360.0)
    } else {
        (lower.as_str(), 1.0)
    };
    parse_number(number).map(|v| v * factor)
}

/// Three color components plus alpha, still unparsed.
#[derive(Debug, PartialEq)]
pub struct RawComponents<'a> {
    pub channels: [&'a str; 3],
    pub alpha: Option<&'a str>,
}

/// Splits `L C H / A` (or the legacy comma form) into its parts.
/// Returns `None` unless exactly three channels are present.
pub fn split_components(args: &str) -> Option<RawComponents<'_>> {
    let (main, alpha) = match args.find('/') {
        Some(pos) => (&args[..pos], Some(args[pos + 1..].trim())),
        None => (args, None),
    };
    let channels: Vec<&str> = main
        .split(|c: char| c.is_ascii_whitespace() || c == ',')
        .filter(|s| !s.is_empty())
        .collect();
    let channels: [&str; 3] = channels.try_into().ok()?;
    Some(RawComponents { channels, alpha })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_nested_invocation_end() {
        let css = "a{color:color-mix(in oklab, var(--a) 40%, rgb(0 0 0 / 0.5))} b{}";
        let (span, idx) = find_function(css, &["color-mix"], 0).unwrap();
        assert_eq!(idx, 0);
        assert_eq!(&css[span.start..span.end()], "color-mix(in oklab, var(--a) 40%, rgb(0 0 0 / 0.5))");
        assert_eq!(span.args(css), "in oklab, var(--a) 40%, rgb(0 0 0 / 0.5)");
    }

    #[test]
    fn requires_identifier_boundary() {
        assert!(find_function("x: my-oklch(1 0 0)", &["oklch"], 0).is_none());
        assert!(find_function("x:OKLCH(1 0 0)", &["oklch"], 0).is_some());
    }

    #[test]
    fn skips_strings_and_comments() {
        let css = r#"content:"oklch(1 0 0)"; /* oklch(0 0 0) */ color:oklch(0.5 0 0)"#;
        let (span, _) = find_function(css, &["oklch"], 0).unwrap();
        assert_eq!(span.args(css), "0.5 0 0");
    }

    #[test]
    fn unterminated_call_is_skipped() {
        let css = "color: oklch(1 0 0; background: oklab(0 0 0)";
        let (span, idx) = find_function(css, &["oklch", "oklab"], 0).unwrap();
        assert_eq!(idx, 1);
        assert_eq!(span.args(css), "0 0 0");
    }

    #[test]
    fn splits_commas_outside_parens() {
        let parts = split_top_level("in oklab, rgb(1, 2, 3) 10%, red", b',');
        assert_eq!(parts, vec!["in oklab", " rgb(1, 2, 3) 10%", " red"]);
    }

    #[test]
    fn tokens_keep_function_calls_whole() {
        assert_eq!(top_level_tokens(" var(--x, a b) 50% "), vec!["var(--x, a b)", "50%"]);
    }

    #[test]
    fn scalar_forms() {
        assert_eq!(parse_scalar("0.5", 1.0), Some(0.5));
        assert_eq!(parse_scalar("50%", 1.0), Some(0.5));
        assert_eq!(parse_scalar("100%", 0.4), Some(0.4));
        assert_eq!(parse_scalar("none", 1.0), Some(0.0));
        assert_eq!(parse_scalar("nan", 1.0), None);
        assert_eq!(parse_scalar("inf", 1.0), None);
        assert_eq!(parse_scalar("calc(1)", 1.0), None);
    }

    #[test]
    fn hue_units() {
        assert_eq!(parse_hue("90"), Some(90.0));
        assert_eq!(parse_hue("90deg"), Some(90.0));
        assert_eq!(parse_hue("0.5turn"), Some(180.0));
        assert_eq!(parse_hue("100grad"), Some(90.0));
        assert!((parse_hue("3.14159265rad").unwrap() - 180.0).abs() < 1e-6);
        assert!(parse_hue("none").unwrap().is_nan());
        assert_eq!(parse_hue("red"), None);
    }

    #[test]
    fn component_split() {
        let raw = split_components("0.7 0.1 200 / 50%").unwrap();
        assert_eq!(raw.channels, ["0.7", "0.1", "200"]);
        assert_eq!(raw.alpha, Some("50%"));
        assert!(split_components("0.7 0.1").is_none());
        assert!(split_components("0.7 0.1 2 3").is_none());
        assert_eq!(split_components("1, 0, 0").unwrap().channels, ["1", "0", "0"]);
    }
}
