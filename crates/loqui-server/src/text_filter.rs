//! Text filtering for the sentence aggregator.
//!
//! Model output arrives noisy: markdown markers, stray control characters,
//! uneven whitespace. The filter normalises fragments before buffering,
//! splits buffered text into complete sentences, and counts meaningful
//! words for the emit thresholds.

/// Characters that end a sentence.
pub const END_PUNCTUATION: &[char] = &['.', '!', '?'];

/// Normalises fragments and splits sentences.
#[derive(Debug, Clone, Default)]
pub struct TextFilter;

impl TextFilter {
    /// Create a filter.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Clean one model fragment: drop reasoning blocks and control
    /// characters, strip markup markers, collapse whitespace runs, trim.
    /// Returns an empty string when nothing survives.
    #[must_use]
    pub fn clean(&self, fragment: &str) -> String {
        let without_thinking = strip_thinking_blocks(fragment);
        let without_markup = strip_markup(&without_thinking);

        let mut cleaned = String::with_capacity(without_markup.len());
        let mut prev_space = true; // leading whitespace is dropped
        for c in without_markup.chars() {
            if c.is_control() || c.is_whitespace() {
                if !prev_space {
                    cleaned.push(' ');
                    prev_space = true;
                }
            } else {
                cleaned.push(c);
                prev_space = false;
            }
        }

        while cleaned.ends_with(' ') {
            cleaned.pop();
        }
        cleaned
    }

    /// Split `text` into `(complete_sentences, remainder)`.
    ///
    /// With `strict` boundaries a sentence closes only at end punctuation
    /// followed by whitespace (so "main.py" stays whole); `at_end` also
    /// closes a sentence at trailing punctuation with nothing after it.
    #[must_use]
    pub fn split_sentences(&self, text: &str, strict: bool, at_end: bool) -> (Vec<String>, String) {
        let chars: Vec<char> = text.chars().collect();
        let mut sentences = Vec::new();
        let mut start = 0;

        let mut i = 0;
        while i < chars.len() {
            let c = chars[i];
            if END_PUNCTUATION.contains(&c) {
                let next = chars.get(i + 1);
                let boundary = match next {
                    Some(n) => !strict || n.is_whitespace(),
                    None => at_end,
                };
                // Run through consecutive punctuation ("?!", "...").
                let run_continues = next.is_some_and(|n| END_PUNCTUATION.contains(n));
                if boundary && !run_continues {
                    let sentence: String = chars[start..=i].iter().collect();
                    let sentence = sentence.trim().to_string();
                    if !sentence.is_empty() {
                        sentences.push(sentence);
                    }
                    start = i + 1;
                }
            }
            i += 1;
        }

        let remainder: String = chars[start.min(chars.len())..].iter().collect();
        (sentences, remainder.trim_start().to_string())
    }

    /// Count tokens containing at least one alphanumeric character.
    #[must_use]
    pub fn meaningful_words(&self, text: &str) -> usize {
        text.split_whitespace()
            .filter(|token| token.chars().any(char::is_alphanumeric))
            .count()
    }
}

/// Remove `<think>...</think>` and `<reasoning>...</reasoning>` blocks so
/// chain-of-thought output is never spoken. The open tag may carry
/// attributes (`<think duration="5">`); matching is case-insensitive.
fn strip_thinking_blocks(text: &str) -> String {
    let mut result = text.to_string();
    result = strip_tag_block_pair(&result, "<think", "</think>");
    result = strip_tag_block_pair(&result, "<reasoning>", "</reasoning>");
    result
}

fn strip_tag_block_pair(text: &str, open_prefix: &str, close_tag: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let haystack = text.to_ascii_lowercase();
    let open_lower = open_prefix.to_ascii_lowercase();
    let close_lower = close_tag.to_ascii_lowercase();

    let mut cursor = 0;
    while cursor < text.len() {
        let Some(open_start) = haystack[cursor..].find(&open_lower) else {
            result.push_str(&text[cursor..]);
            break;
        };
        let abs_open = cursor + open_start;

        // The open tag must close with '>' and have a matching close tag.
        let closed = haystack[abs_open..].find('>').and_then(|tag_end_offset| {
            let tag_end = abs_open + tag_end_offset + 1;
            haystack[tag_end..]
                .find(&close_lower)
                .map(|close_offset| tag_end + close_offset + close_tag.len())
        });

        match closed {
            Some(close_end) => {
                result.push_str(&text[cursor..abs_open]);
                cursor = close_end;
            }
            None => {
                // Unterminated block: keep the text as-is and move past.
                result.push_str(&text[cursor..abs_open + open_prefix.len()]);
                cursor = abs_open + open_prefix.len();
            }
        }
    }

    result
}

/// Strip inline markdown markers and HTML tags, keeping the text content.
fn strip_markup(text: &str) -> String {
    let mut s = text
        .replace("**", "")
        .replace("__", "")
        .replace("~~", "")
        .replace('*', "")
        .replace('`', "");

    // Headers and blockquote markers only matter at line starts.
    s = s
        .lines()
        .map(|line| {
            let trimmed = line.trim_start();
            let stripped = trimmed
                .trim_start_matches('#')
                .trim_start_matches('>')
                .trim_start();
            stripped.to_string()
        })
        .collect::<Vec<_>>()
        .join(" ");

    strip_html_tags(&s)
}

fn strip_html_tags(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut in_tag = false;

    for c in text.chars() {
        match c {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            _ if !in_tag => result.push(c),
            _ => {}
        }
    }

    result
}
