use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// Maximum excerpt length, in characters.
pub const EXCERPT_MAX_CHARS: usize = 64;

/// An expanded caption.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Caption {
    pub body: String,
    pub excerpt: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hashtags: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub users: Vec<String>,
}

impl Caption {
    pub fn expand(text: &str) -> Self {
        let body = text.trim().to_string();
        Self {
            excerpt: excerpt(&body),
            hashtags: capture_unique(hashtag_re(), &body),
            users: capture_unique(user_re(), &body),
            body,
        }
    }
}

fn hashtag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"#(\w+)").expect("hashtag pattern"))
}

fn user_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"@([\w.]+)").expect("user pattern"))
}

fn capture_unique(re: &Regex, text: &str) -> Vec<String> {
    let mut found: Vec<String> = Vec::new();
    for cap in re.captures_iter(text) {
        let value = cap[1].trim_end_matches('.').to_string();
        if !value.is_empty() && !found.contains(&value) {
            found.push(value);
        }
    }
    found
}

/// First sentence of the first line, cut on a word boundary if it is
/// longer than [`EXCERPT_MAX_CHARS`].
pub fn excerpt(body: &str) -> String {
    let line = body.lines().map(str::trim).find(|l| !l.is_empty()).unwrap_or("");

    let mut sentence = line;
    let mut chars = line.char_indices().peekable();
    while let Some((idx, c)) = chars.next() {
        if matches!(c, '.' | '!' | '?') {
            let at_break = chars.peek().map_or(true, |(_, next)| next.is_whitespace());
            if at_break {
                sentence = &line[..idx + c.len_utf8()];
                break;
            }
        }
    }

    if sentence.chars().count() <= EXCERPT_MAX_CHARS {
        return sentence.to_string();
    }

    let cut: String = sentence.chars().take(EXCERPT_MAX_CHARS).collect();
    match cut.rfind(char::is_whitespace) {
        Some(idx) if idx > 0 => cut[..idx].trim_end().to_string(),
        _ => cut,
    }
}
