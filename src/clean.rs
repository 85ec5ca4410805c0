use std::sync::LazyLock;

use regex::Regex;

static AD_LINES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(?:Реклама|Объявление):[^\n]*").expect("ad line regex"));
static BARE_URLS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"https?://\S+").expect("bare url regex"));
static SPACE_RUNS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ \t]{2,}").expect("space run regex"));
static BLANK_RUNS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n{3,}").expect("blank run regex"));
static WHITESPACE_RUNS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("whitespace run regex"));

/// Strip ad lines and stray URLs, collapse whitespace, keep paragraph breaks.
pub fn clean_text(raw: &str) -> String {
    if raw.is_empty() {
        return String::new();
    }

    let text = AD_LINES.replace_all(raw, "");
    let text = BARE_URLS.replace_all(&text, "");
    let text = SPACE_RUNS.replace_all(&text, " ");
    let text = BLANK_RUNS.replace_all(&text, "\n\n");

    text.lines()
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_owned()
}

pub fn normalize_title(raw: &str) -> String {
    let title = WHITESPACE_RUNS.replace_all(raw.trim(), " ").into_owned();
    if title.is_empty() {
        "Untitled".to_owned()
    } else {
        title
    }
}

static CHAPTER_NUMBER_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)Chapter\s*(\d+)",
        r"(?i)Глава\s*(\d+)",
        r"(?i)Ch\.?\s*(\d+)",
        r"#(\d+)",
        r"^(\d+)\.",
    ]
    .into_iter()
    .map(|pattern| Regex::new(pattern).expect("chapter number regex"))
    .collect()
});

/// Best-effort chapter number from a title like "Chapter 42: …".
pub fn extract_chapter_number(title: &str) -> Option<u32> {
    for pattern in CHAPTER_NUMBER_PATTERNS.iter() {
        if let Some(captures) = pattern.captures(title) {
            if let Some(number) = captures.get(1).and_then(|m| m.as_str().parse().ok()) {
                return Some(number);
            }
        }
    }
    None
}
