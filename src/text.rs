//! String helpers for line-oriented protocol parsing

/// ASCII case-insensitive equality
pub fn eq_ignore_case(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b)
}

/// Strip every trailing character contained in `chars`
///
/// `trim_trailing("200 OK\r\n", "\r\n")` gives `"200 OK"`.
pub fn trim_trailing<'a>(input: &'a str, chars: &str) -> &'a str {
    input.trim_end_matches(|c: char| chars.contains(c))
}
