/// True when `text` holds at least one CJK unified ideograph (U+4E00..=U+9FFF).
///
/// City query values written in Chinese are names to look up; anything else is
/// taken as a raw id.
pub fn contains_cjk(text: &str) -> bool {
    text.chars().any(|c| ('\u{4E00}'..='\u{9FFF}').contains(&c))
}

pub fn truncate_text(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contains_cjk() {
        assert!(contains_cjk("广州"));
        assert!(contains_cjk("city 北京"));
        assert!(!contains_cjk("12"));
        assert!(!contains_cjk("Springfield"));
        assert!(!contains_cjk(""));
        // katakana sits outside the unified ideograph block
        assert!(!contains_cjk("カタカナ"));
    }

    #[test]
    fn test_truncate_text() {
        assert_eq!(truncate_text("short", 10), "short");
        assert_eq!(truncate_text("This is a very long text", 7), "This is...");
        assert_eq!(truncate_text("广州早茶很好吃", 2), "广州...");
    }
}
