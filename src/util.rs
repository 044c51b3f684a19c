// src/util.rs — Text previews for logs and terminal output

/// Marker appended to a cut preview.
pub const ELLIPSIS: &str = "...";

/// Single-line preview of model text. Whitespace runs (newlines included)
/// collapse to one space; text longer than `max_chars` characters is cut
/// there and marked with [`ELLIPSIS`].
pub fn preview(text: &str, max_chars: usize) -> String {
    let mut out = String::with_capacity(text.len().min(max_chars + ELLIPSIS.len()));
    let mut taken = 0;
    for word in text.split_whitespace() {
        if taken > 0 {
            if taken == max_chars {
                out.push_str(ELLIPSIS);
                return out;
            }
            out.push(' ');
            taken += 1;
        }
        for c in word.chars() {
            if taken == max_chars {
                out.push_str(ELLIPSIS);
                return out;
            }
            out.push(c);
            taken += 1;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_text_unchanged() {
        assert_eq!(preview("What is 2+2?", 40), "What is 2+2?");
        assert_eq!(preview("", 10), "");
    }

    #[test]
    fn test_whitespace_collapsed() {
        assert_eq!(preview("def f():\n    return 4\n", 80), "def f(): return 4");
    }

    #[test]
    fn test_cut_is_marked() {
        assert_eq!(preview("hello world", 5), "hello...");
        assert_eq!(preview("hello world", 6), "hello ...");
        assert_eq!(preview("hello world", 11), "hello world");
    }

    #[test]
    fn test_counts_chars_not_bytes() {
        assert_eq!(preview("café au lait", 4), "café...");
        assert_eq!(preview("日本語のテキスト", 3), "日本語...");
    }

    #[test]
    fn test_zero_width() {
        assert_eq!(preview("anything", 0), "...");
        assert_eq!(preview("   ", 0), "");
    }
}
