//! Markdown code fence handling for model output

use std::sync::LazyLock;

use regex::Regex;

static FENCED_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```([A-Za-z0-9_+-]*)[ \t]*\r?\n(.*?)\r?\n?```").expect("static regex is valid")
});

/// First fenced block whose language tag is one of `langs` (or untagged)
pub fn find_fenced_block<'a>(text: &'a str, langs: &[&str]) -> Option<&'a str> {
    FENCED_BLOCK.captures_iter(text).find_map(|caps| {
        let lang = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
        let accepted = lang.is_empty() || langs.iter().any(|l| l.eq_ignore_ascii_case(lang));
        accepted.then(|| caps.get(2).map(|m| m.as_str())).flatten()
    })
}

/// Body of `text` when the whole response is one fence tagged with one of
/// `langs` (or untagged); `None` when anything sits outside the fence
pub fn unwrap_whole_fence<'a>(text: &'a str, langs: &[&str]) -> Option<&'a str> {
    let trimmed = text.trim();
    if !trimmed.starts_with("```") || !trimmed.ends_with("```") || trimmed.len() < 6 {
        return None;
    }
    let first_newline = trimmed.find('\n')?;
    let lang = trimmed[3..first_newline].trim();
    if !lang.is_empty() && !langs.iter().any(|l| l.eq_ignore_ascii_case(lang)) {
        return None;
    }
    let body = &trimmed[first_newline + 1..trimmed.len() - 3];
    // Inner code blocks come in open/close pairs; an odd count means the
    // outer fence closed early and the response holds several blocks
    let inner_fences = body
        .lines()
        .filter(|line| line.trim_start().starts_with("```"))
        .count();
    if inner_fences % 2 != 0 {
        return None;
    }
    Some(body.trim_end())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_fenced_block() {
        let text = "Here you go:\n```json\n{\"pages\": []}\n```\nThanks";
        assert_eq!(find_fenced_block(text, &["json"]), Some("{\"pages\": []}"));

        let untagged = "```\n{\"a\": 1}\n```";
        assert_eq!(find_fenced_block(untagged, &["json"]), Some("{\"a\": 1}"));

        let other = "```rust\nfn main() {}\n```";
        assert_eq!(find_fenced_block(other, &["json"]), None);
    }

    #[test]
    fn test_unwrap_whole_fence() {
        let wrapped = "```markdown\n# Title\n\nBody\n```";
        assert_eq!(
            unwrap_whole_fence(wrapped, &["markdown", "md"]),
            Some("# Title\n\nBody")
        );

        let partial = "# Title\n```markdown\nx\n```";
        assert_eq!(unwrap_whole_fence(partial, &["markdown"]), None);

        let nested = "```md\n# Setup\n```bash\ncargo build\n```\n```";
        assert_eq!(
            unwrap_whole_fence(nested, &["markdown", "md"]),
            Some("# Setup\n```bash\ncargo build\n```")
        );

        let split = "```markdown\na\n```\ntext\n```";
        assert_eq!(unwrap_whole_fence(split, &["markdown"]), None);

        let code = "```python\nprint(1)\n```";
        assert_eq!(unwrap_whole_fence(code, &["markdown"]), None);
    }
}
