//! Middle truncation for human-readable log messages.

const ELLIPSIS: &str = "...";

/// Shorten `s` around a middle `...`, keeping its head and tail.
///
/// Lengths are counted in characters. With `max <= 3` the result is `max`
/// dots; a string that already fits is returned unchanged. Otherwise head and
/// tail each keep half of `max - 3` characters, rounded up, so an odd budget
/// yields one character more than `max`.
///
/// # Examples
///
/// ```rust
/// use accesslog::ellipsize;
///
/// assert_eq!(ellipsize("somestring", 9), "som...ing");
/// assert_eq!(ellipsize("somestring", 10), "somestring");
/// assert_eq!(ellipsize("somestring", 2), "..");
/// ```
pub fn ellipsize(s: &str, max: usize) -> String {
    if max <= ELLIPSIS.len() {
        return ".".repeat(max);
    }
    let len = s.chars().count();
    if len <= max {
        return s.to_owned();
    }

    let keep = (max - ELLIPSIS.len()).div_ceil(2);
    let head: String = s.chars().take(keep).collect();
    let tail: String = s.chars().skip(len - keep).collect();
    format!("{head}{ELLIPSIS}{tail}")
}

#[cfg(test)]
mod tests {
    use super::ellipsize;

    #[test]
    fn test_ellipsize() {
        assert_eq!(ellipsize("", 10), "");
        assert_eq!(ellipsize("somestring", 5), "s...g");
        assert_eq!(ellipsize("somestring", 10), "somestring");
        assert_eq!(ellipsize("somestring", 9), "som...ing");
        assert_eq!(ellipsize("somestring", 0), "");
        assert_eq!(ellipsize("somestring", 1), ".");
        assert_eq!(ellipsize("somestring", 2), "..");
        assert_eq!(ellipsize("somestring", 3), "...");
        assert_eq!(ellipsize("somestring", 4), "s...g");
    }

    #[test]
    fn test_long_path() {
        let path = format!("/{}", "x".repeat(150));
        let short = ellipsize(&path, 100);
        assert_eq!(
            short,
            format!("/{}...{}", "x".repeat(48), "x".repeat(49))
        );
    }

    #[test]
    fn test_counts_characters_not_bytes() {
        assert_eq!(ellipsize("héllo wörld", 11), "héllo wörld");
        assert_eq!(ellipsize("héllo wörld", 7), "hé...ld");
    }
}
