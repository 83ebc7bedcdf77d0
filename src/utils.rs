// utils.rs - Text and Environment Helpers
// Small parsing helpers shared by configuration and the reply path.
//
// Key Features:
// - Discord-safe text splitting (word/paragraph aware, hyphenates long words)
// - Lenient boolean and number parsing for environment values
// - System prompt unescaping with <date> substitution
//
// Used by: config.rs, relay/batch.rs, commands/

use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;

// Case-insensitive <date> placeholder in system prompts
static DATE_PLACEHOLDER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)<date>").expect("Invalid date placeholder regex")
});

/// Split text into segments of at most `length` characters.
/// Cuts at whitespace, prefers the last paragraph break inside the current segment,
/// and hyphenates words that are longer than a whole segment.
pub fn split_text(text: &str, length: usize) -> Vec<String> {
    let length = length.max(1);
    let normalized = text.replace("\r\n", "\n").replace('\r', "\n");
    let mut rest = normalized.trim();

    let mut segments = Vec::new();
    let mut segment = String::new();

    loop {
        let mut word = take_word(rest);
        if word.is_empty() {
            break;
        }
        let mut suffix = "";

        if segment.chars().count() + word.chars().count() > length {
            if let Some(newline) = segment.rfind('\n') {
                let last_paragraph = segment[newline + 1..].to_string();
                segment.truncate(newline + 1);
                push_segment(&mut segments, &mut segment);
                segment = last_paragraph;
                continue;
            }

            push_segment(&mut segments, &mut segment);

            if word.chars().count() > length {
                word = prefix_chars(word, length);
                if length > 1 && !word.chars().any(char::is_whitespace) {
                    word = prefix_chars(word, length - 1);
                    suffix = "-";
                }
            }
        }

        rest = &rest[word.len()..];
        segment.push_str(word);
        segment.push_str(suffix);
    }

    push_segment(&mut segments, &mut segment);
    segments
}

// A run of non-whitespace followed by its trailing whitespace
fn take_word(text: &str) -> &str {
    let word_end = text.find(char::is_whitespace).unwrap_or(text.len());
    let space_end = text[word_end..]
        .find(|c: char| !c.is_whitespace())
        .map(|offset| word_end + offset)
        .unwrap_or(text.len());
    &text[..space_end]
}

fn prefix_chars(text: &str, count: usize) -> &str {
    match text.char_indices().nth(count) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

fn push_segment(segments: &mut Vec<String>, segment: &mut String) {
    let trimmed = segment.trim();
    if !trimmed.is_empty() {
        segments.push(trimmed.to_string());
    }
    segment.clear();
}

/// Interpret an environment flag. Empty, "false", "no", "off" and "0" are false.
pub fn get_boolean(value: &str) -> bool {
    let value = value.trim().to_lowercase();
    !value.is_empty() && !matches!(value.as_str(), "false" | "no" | "off" | "0")
}

/// Parse a numeric environment value, `None` for anything that is not a finite number
pub fn parse_env_number(value: &str) -> Option<f64> {
    value
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|number| number.is_finite())
}

/// Unescape each line as the body of a JSON string literal, so `\n`, `\t` and `\"`
/// written in a .env value become real characters.
pub fn parse_json_message(value: &str) -> Result<String, serde_json::Error> {
    value
        .split(|c| c == '\r' || c == '\n')
        .filter(|line| !line.is_empty())
        .map(|line| serde_json::from_str::<String>(&format!("\"{}\"", line)))
        .collect::<Result<Vec<_>, _>>()
        .map(|lines| lines.join("\n"))
}

/// Prepare a prompt taken from configuration: unescape and replace `<date>`
pub fn parse_env_string(value: Option<&str>) -> Option<String> {
    let value = value?;
    let unescaped = match parse_json_message(value) {
        Ok(text) => text,
        Err(e) => {
            log::warn!("[UTILS] Invalid escape sequence in configured prompt, using it verbatim: {}", e);
            value.to_string()
        }
    };
    let date = Utc::now().format("%a, %d %b %Y %H:%M:%S GMT").to_string();
    Some(DATE_PLACEHOLDER.replace_all(&unescaped, date.as_str()).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_text_by_length() {
        let text = "This is a test message that needs to be split";
        assert_eq!(
            split_text(text, 10),
            vec!["This is a", "test", "message", "that", "needs to", "be split"]
        );
    }

    #[test]
    fn test_split_text_empty() {
        assert!(split_text("", 10).is_empty());
        assert!(split_text("   \n\r\n  ", 10).is_empty());
    }

    #[test]
    fn test_split_text_newlines() {
        let text = "First line\nSecond line\r\nThird line";
        assert_eq!(
            split_text(text, 20),
            vec!["First line", "Second line", "Third line"]
        );
    }

    #[test]
    fn test_split_text_prefers_paragraph_break() {
        let text = "alpha beta\ngamma delta epsilon";
        assert_eq!(split_text(text, 20), vec!["alpha beta", "gamma delta epsilon"]);
    }

    #[test]
    fn test_split_text_hyphenates_long_words() {
        let segments = split_text("abcdefghijklmnopqrstuvwxyz", 10);
        assert_eq!(segments, vec!["abcdefghi-", "jklmnopqr-", "stuvwxyz"]);
    }

    #[test]
    fn test_split_text_length_one_does_not_hyphenate() {
        assert_eq!(split_text("abc", 1), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_split_text_segments_bounded_and_ordered() {
        let text = "Lorem ipsum dolor sit amet, consectetur adipiscing elit.\n\n\
                    Supercalifragilisticexpialidocious words appear here ünïcödé too.\n\
                    Short.";
        for limit in [5usize, 8, 13, 40, 2000] {
            let segments = split_text(text, limit);
            assert!(!segments.is_empty());
            for segment in &segments {
                assert!(!segment.is_empty());
                assert!(segment.chars().count() <= limit, "{:?} over {}", segment, limit);
            }
            let rebuilt: String = segments
                .iter()
                .map(|s| s.trim_end_matches('-'))
                .collect::<Vec<_>>()
                .concat()
                .split_whitespace()
                .collect();
            let original: String = text.split_whitespace().collect();
            assert_eq!(rebuilt, original, "limit {}", limit);
        }
    }

    #[test]
    fn test_get_boolean() {
        for truthy in ["true", "yes", "1", "on", "TRUE"] {
            assert!(get_boolean(truthy), "{}", truthy);
        }
        for falsy in ["false", "no", "0", "off", "", "  "] {
            assert!(!get_boolean(falsy), "{}", falsy);
        }
    }

    #[test]
    fn test_parse_env_number() {
        assert_eq!(parse_env_number("123"), Some(123.0));
        assert_eq!(parse_env_number("123.456"), Some(123.456));
        assert_eq!(parse_env_number("12.5"), Some(12.5));
        assert_eq!(parse_env_number("-123"), Some(-123.0));
        assert_eq!(parse_env_number("abc"), None);
        assert_eq!(parse_env_number(""), None);
        assert_eq!(parse_env_number("inf"), None);
    }

    #[test]
    fn test_parse_json_message_unescapes() {
        assert_eq!(parse_json_message(r"Line\tone\nLine two").unwrap(), "Line\tone\nLine two");
        assert_eq!(parse_json_message("a\nb").unwrap(), "a\nb");
        assert!(parse_json_message(r"bad \q escape").is_err());
    }

    #[test]
    fn test_parse_env_string_replaces_date() {
        let date = Regex::new(r"\w+, \d+ \w+ \d+ \d+:\d+:\d+ GMT").unwrap();
        let result = parse_env_string(Some("Today is <DATE>")).unwrap();
        assert!(result.starts_with("Today is "));
        assert!(date.is_match(&result));
    }

    #[test]
    fn test_parse_env_string_none() {
        assert_eq!(parse_env_string(None), None);
    }
}
