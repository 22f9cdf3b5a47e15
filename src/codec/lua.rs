//! Lua codec - turning host values into command source.
//!
//! Free-form text becomes part of a command in exactly one place: here.
//! [`LuaCodec::escape`] is a total mapping, every character outside the
//! table below passes through unchanged:
//!
//! | input | output |
//! |---|---|
//! | `\` | `\\` |
//! | LF | `\n` |
//! | CR | `\r` |
//! | TAB | `\t` |
//! | `"` | `\"` |
//!
//! # Example
//!
//! ```
//! use framewire::codec::LuaCodec;
//!
//! assert_eq!(LuaCodec::quote("say \"hi\"\n"), r#""say \"hi\"\n""#);
//! assert_eq!(LuaCodec::rewrite_print("print(1) myprint(2)"), "prntLng(1) myprint(2)");
//! ```

/// Name of the on-device helper that prints arbitrarily long strings.
pub const PRINT_LONG: &str = "prntLng";

/// Lua source codec, implemented as a marker struct with static methods.
pub struct LuaCodec;

impl LuaCodec {
    /// Escape text for use inside a double-quoted Lua string literal.
    pub fn escape(text: &str) -> String {
        let mut out = String::with_capacity(text.len());
        for c in text.chars() {
            match c {
                '\\' => out.push_str("\\\\"),
                '\n' => out.push_str("\\n"),
                '\r' => out.push_str("\\r"),
                '\t' => out.push_str("\\t"),
                '"' => out.push_str("\\\""),
                _ => out.push(c),
            }
        }
        out
    }

    /// Escape and wrap in double quotes.
    pub fn quote(text: &str) -> String {
        format!("\"{}\"", Self::escape(text))
    }

    /// Replace every whole-word `print(` call with the long-print helper.
    ///
    /// Native `print` truncates at one packet; the helper splits long output
    /// into the long-text stream.
    pub fn rewrite_print(source: &str) -> String {
        const CALL: &str = "print(";

        let mut out = String::with_capacity(source.len());
        let mut rest = source;
        let mut prev: Option<char> = None;

        while let Some(pos) = rest.find(CALL) {
            let before = &rest[..pos];
            let boundary = before.chars().next_back().or(prev);
            out.push_str(before);

            if boundary.map_or(true, |c| !is_word_char(c)) {
                out.push_str(PRINT_LONG);
                out.push('(');
            } else {
                out.push_str(CALL);
            }

            prev = Some('(');
            rest = &rest[pos + CALL.len()..];
        }

        out.push_str(rest);
        out
    }
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_table() {
        assert_eq!(LuaCodec::escape("a\\b"), "a\\\\b");
        assert_eq!(LuaCodec::escape("l1\nl2\r\t"), "l1\\nl2\\r\\t");
        assert_eq!(LuaCodec::escape("\"q\""), "\\\"q\\\"");
    }

    #[test]
    fn test_escape_leaves_other_text() {
        assert_eq!(LuaCodec::escape("[x] 'y' é"), "[x] 'y' é");
        assert_eq!(LuaCodec::escape(""), "");
    }

    #[test]
    fn test_quote() {
        assert_eq!(LuaCodec::quote("/a.lua"), "\"/a.lua\"");
    }

    #[test]
    fn test_rewrite_print_word_boundary() {
        assert_eq!(LuaCodec::rewrite_print("print('hi')"), "prntLng('hi')");
        assert_eq!(LuaCodec::rewrite_print("x=1;print(x)"), "x=1;prntLng(x)");
        assert_eq!(LuaCodec::rewrite_print("myprint(x)"), "myprint(x)");
        assert_eq!(LuaCodec::rewrite_print("my_print(x)"), "my_print(x)");
        assert_eq!(LuaCodec::rewrite_print("print print(x)"), "print prntLng(x)");
    }

    #[test]
    fn test_rewrite_print_adjacent_calls() {
        assert_eq!(
            LuaCodec::rewrite_print("print(print(1))"),
            "prntLng(prntLng(1))"
        );
    }

    #[test]
    fn test_rewrite_print_untouched() {
        assert_eq!(LuaCodec::rewrite_print("a = 1"), "a = 1");
        assert_eq!(LuaCodec::rewrite_print("prntLng(1)"), "prntLng(1)");
    }
}
