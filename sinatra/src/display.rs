use regex::Regex;
use std::sync::OnceLock;
use time::OffsetDateTime;

fn suffix_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            r"(?i)\s*[-–]\s*\d{4}\s*Remaster(ed)?",
            r"(?i)\s*[-–]\s*Remaster(ed)?( Version)?",
            r"(?i)\s*\(\s*\d{4}\s*Remaster\s*\)",
            r"(?i)\s*\(\s*Remaster(ed)?\s*\)",
            r"(?i)\s*\[\s*\d{4}\s*Remaster\s*\]",
            r"(?i)\s*[-–]\s*Single( Version| Edit)?",
            r"(?i)\s*\(\s*Single( Version| Edit)?\s*\)",
            r"(?i)\s*[-–]\s*Single;\s*\d{4}\s*Remaster",
            r"(?i)\s*[-–]\s*\d{4}$",
        ]
        .into_iter()
        .map(|pattern| Regex::new(pattern).unwrap())
        .collect()
    })
}

/// Strips remaster and single-release suffixes from a track title. Each
/// pattern removes at most its first match, in order.
pub fn clean_track_name(name: &str) -> String {
    let mut name = name.to_owned();
    for re in suffix_patterns() {
        name = re.replace(&name, "").into_owned();
    }
    name.trim().to_owned()
}

/// "just now", "1m ago" or "Nm ago".
pub fn freshness_label(now: OffsetDateTime, then: OffsetDateTime) -> String {
    match (now - then).whole_minutes() {
        minutes if minutes < 1 => "just now".to_owned(),
        1 => "1m ago".to_owned(),
        minutes => format!("{minutes}m ago"),
    }
}
