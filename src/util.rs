//! Text helpers for pulling structured pieces out of oracle replies.

use regex::Regex;

/// Extract a JSON object from text that may contain other content.
/// Uses brace-counting to find the outermost JSON object.
pub fn extract_json_object(text: &str) -> Option<String> {
    let start = text.find('{')?;
    let mut depth = 0;
    let mut in_string = false;
    let mut escaped = false;

    for (i, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(text[start..start + i + 1].to_string());
                }
            }
            _ => {}
        }
    }

    None
}

/// Every `<tag>...</tag>` segment in `text`, in order.
///
/// A single newline directly after the opening tag is dropped so that
/// block-formatted replies yield exactly the enclosed body.
pub fn extract_tagged(text: &str, tag: &str) -> Vec<String> {
    let pattern = format!(r"(?s)<{0}>(.*?)</{0}>", regex::escape(tag));
    let Ok(re) = Regex::new(&pattern) else {
        return Vec::new();
    };

    re.captures_iter(text)
        .filter_map(|cap| cap.get(1))
        .map(|m| {
            let body = m.as_str();
            body.strip_prefix("\r\n")
                .or_else(|| body.strip_prefix('\n'))
                .unwrap_or(body)
                .to_string()
        })
        .collect()
}

/// The first `<tag>...</tag>` segment, if any.
pub fn extract_first_tagged(text: &str, tag: &str) -> Option<String> {
    extract_tagged(text, tag).into_iter().next()
}

/// Convert a title to a branch-safe slug, limited to `max_len` characters.
pub fn slugify(title: &str, max_len: usize) -> String {
    let slug: String = title
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '-' })
        .collect::<String>()
        .split('-')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-");
    if slug.len() > max_len {
        slug[..slug.floor_char_boundary(max_len)]
            .trim_end_matches('-')
            .to_string()
    } else {
        slug
    }
}
