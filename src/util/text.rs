use std::borrow::Cow;

const ELLIPSIS: &str = "...";

/// True for bytes removed by [`strip_control_chars`] outside escape sequences.
///
/// Tab, newline and carriage return survive.
fn is_control_byte(b: u8) -> bool {
    b == 0x7f || (b < 0x20 && b != b'\t' && b != b'\n' && b != b'\r')
}

/// SEC-001: Remove C0 control characters, DEL and ANSI escape sequences.
///
/// Names and titles in import files are untrusted and end up in the database
/// and on the terminal through the CLI. CSI sequences (`ESC [` ... final byte
/// 0x40-0x7E) and OSC sequences (`ESC ]` ... BEL or `ESC \`) are dropped whole.
///
/// Clean input is returned borrowed.
pub fn strip_control_chars(s: &str) -> Cow<'_, str> {
    let bytes = s.as_bytes();
    if !bytes.iter().any(|&b| b == 0x1b || is_control_byte(b)) {
        return Cow::Borrowed(s);
    }

    let mut out = String::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            0x1b => i = skip_escape(bytes, i),
            b if is_control_byte(b) => i += 1,
            _ => {
                let start = i;
                while i < bytes.len() && bytes[i] != 0x1b && !is_control_byte(bytes[i]) {
                    i += 1;
                }
                // ASCII control bytes never occur inside a multi-byte UTF-8 sequence.
                out.push_str(&s[start..i]);
            }
        }
    }
    Cow::Owned(out)
}

/// Index of the first byte after the escape sequence starting at `start`.
fn skip_escape(bytes: &[u8], start: usize) -> usize {
    let mut i = start + 1;
    match bytes.get(i) {
        Some(b'[') => {
            i += 1;
            while let Some(&c) = bytes.get(i) {
                i += 1;
                if (0x40..=0x7e).contains(&c) {
                    break;
                }
            }
            i
        }
        Some(b']') => {
            i += 1;
            while let Some(&c) = bytes.get(i) {
                if c == 0x07 {
                    return i + 1;
                }
                if c == 0x1b && bytes.get(i + 1) == Some(&b'\\') {
                    return i + 2;
                }
                i += 1;
            }
            i
        }
        _ => i,
    }
}

/// Shorten `s` to at most `max_chars` characters, ending in `...` when cut.
///
/// Counts characters rather than bytes so the cut never splits a code point.
/// Widths below 4 leave no room for text before the ellipsis and return the
/// input unchanged.
pub fn abbreviate(s: &str, max_chars: usize) -> Cow<'_, str> {
    if max_chars < ELLIPSIS.len() + 1 || s.chars().count() <= max_chars {
        return Cow::Borrowed(s);
    }
    let keep = max_chars - ELLIPSIS.len();
    let cut = s
        .char_indices()
        .nth(keep)
        .map(|(idx, _)| idx)
        .unwrap_or(s.len());
    Cow::Owned(format!("{}{}", &s[..cut], ELLIPSIS))
}

/// Strip control characters and trim, returning `None` for blank input.
pub fn clean_label(s: &str) -> Option<String> {
    let stripped = strip_control_chars(s);
    let trimmed = stripped.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_strip_clean_text_returns_borrowed() {
        let input = "line1\nline2\ttabbed\r\nwindows";
        let result = strip_control_chars(input);
        assert!(matches!(result, Cow::Borrowed(_)));
        assert_eq!(result, input);
    }

    #[test]
    fn test_strip_removes_c0_and_del() {
        assert_eq!(
            strip_control_chars("he\x00ll\x07o\x08 w\x0bor\x0cld\x01!\x7f"),
            "hello world!"
        );
    }

    #[test]
    fn test_strip_csi_sequences() {
        assert_eq!(strip_control_chars("\x1b[31mRed\x1b[0m"), "Red");
        assert_eq!(strip_control_chars("before\x1b[2Aafter"), "beforeafter");
    }

    #[test]
    fn test_strip_osc_sequences() {
        assert_eq!(strip_control_chars("\x1b]0;title\x07safe"), "safe");
        assert_eq!(strip_control_chars("\x1b]0;title\x1b\\safe"), "safe");
    }

    #[test]
    fn test_strip_bare_and_trailing_esc() {
        assert_eq!(strip_control_chars("before\x1bafter"), "beforeafter");
        assert_eq!(strip_control_chars("dangling\x1b"), "dangling");
        assert_eq!(strip_control_chars("open\x1b[12"), "open");
    }

    #[test]
    fn test_strip_keeps_unicode() {
        assert_eq!(
            strip_control_chars("日本語 \x1b[31m赤い\x1b[0m テキスト"),
            "日本語 赤い テキスト"
        );
    }

    #[test]
    fn test_abbreviate_short_input_borrowed() {
        let result = abbreviate("https://example.com/rss", 100);
        assert!(matches!(result, Cow::Borrowed(_)));
    }

    #[test]
    fn test_abbreviate_cuts_with_ellipsis() {
        assert_eq!(abbreviate("abcdefghij", 7), "abcd...");
        assert_eq!(abbreviate("abcdefghij", 7).chars().count(), 7);
    }

    #[test]
    fn test_abbreviate_counts_chars() {
        assert_eq!(abbreviate("日本語テキスト", 5), "日本...");
    }

    #[test]
    fn test_abbreviate_tiny_width_is_noop() {
        assert_eq!(abbreviate("abcdefghij", 3), "abcdefghij");
    }

    #[test]
    fn test_clean_label() {
        assert_eq!(clean_label("  Tech \x1b[0m"), Some("Tech".to_string()));
        assert_eq!(clean_label(" \t "), None);
    }

    proptest! {
        #[test]
        fn prop_abbreviate_respects_width(s in "\\PC{0,200}", max_chars in 4usize..120) {
            let short = abbreviate(&s, max_chars);
            prop_assert!(short.chars().count() <= max_chars);
            if short != s {
                let kept = short.strip_suffix(ELLIPSIS);
                prop_assert!(kept.is_some_and(|kept| s.starts_with(kept)));
            }
        }

        #[test]
        fn prop_stripped_text_has_no_control_bytes(s in any::<String>()) {
            let stripped = strip_control_chars(&s);
            prop_assert!(!stripped.bytes().any(|b| b == 0x1b || is_control_byte(b)));
        }

        #[test]
        fn prop_clean_label_is_trimmed(s in any::<String>()) {
            if let Some(label) = clean_label(&s) {
                prop_assert!(!label.is_empty());
                prop_assert_eq!(label.trim(), label.as_str());
            }
        }
    }
}
