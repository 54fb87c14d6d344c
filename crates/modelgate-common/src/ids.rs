use rand::Rng;

const ID_CHARSET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// `prefix_` followed by `len` random lowercase alphanumerics.
pub fn generate_public_id(prefix: &str, len: usize) -> String {
    let mut rng = rand::rng();
    let suffix: String = (0..len)
        .map(|_| ID_CHARSET[rng.random_range(0..ID_CHARSET.len())] as char)
        .collect();
    format!("{prefix}_{suffix}")
}

/// Lowercases, collapses every run of non `[a-z0-9]` into one `-` and trims
/// leading/trailing hyphens.
pub fn slugify(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut pending_dash = false;
    for ch in input.trim().chars().flat_map(char::to_lowercase) {
        if ch.is_ascii_lowercase() || ch.is_ascii_digit() {
            if pending_dash && !out.is_empty() {
                out.push('-');
            }
            pending_dash = false;
            out.push(ch);
        } else {
            pending_dash = true;
        }
    }
    out
}

/// Last four characters of an API key, shown in place of the key itself.
pub fn api_key_hint(key: &str) -> Option<String> {
    let count = key.chars().count();
    if count < 4 {
        return None;
    }
    Some(key.chars().skip(count - 4).collect())
}

pub fn normalize_base_url(base_url: &str) -> String {
    base_url.trim().trim_end_matches('/').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugify_collapses_and_trims() {
        assert_eq!(slugify("  OpenAI / GPT-4o  "), "openai-gpt-4o");
        assert_eq!(slugify("--Hello__World--"), "hello-world");
        assert_eq!(slugify("***"), "");
        assert_eq!(slugify("anthropic/claude-3.5-sonnet"), "anthropic-claude-3-5-sonnet");
    }

    #[test]
    fn public_id_shape() {
        let id = generate_public_id("prov", 24);
        let (prefix, suffix) = id.split_once('_').unwrap();
        assert_eq!(prefix, "prov");
        assert_eq!(suffix.len(), 24);
        assert!(suffix.bytes().all(|b| ID_CHARSET.contains(&b)));
    }

    #[test]
    fn hint_needs_four_chars() {
        assert_eq!(api_key_hint("sk-abcdef").as_deref(), Some("cdef"));
        assert_eq!(api_key_hint("abc"), None);
    }

    #[test]
    fn base_url_loses_trailing_slashes() {
        assert_eq!(
            normalize_base_url(" https://api.example.com/v1// "),
            "https://api.example.com/v1"
        );
    }
}
