//! Brand-variant generation
//!
//! Media brands appear under many spellings. Starting from the leftmost
//! non-registry domain label, variants come from hyphen splits, camelCase
//! splits, and stripping common media suffixes.

use once_cell::sync::Lazy;
use std::collections::BTreeSet;

/// Suffixes stripped to recover the bare brand token.
const MEDIA_SUFFIXES: &[&str] = &[
    "news", "net", "media", "times", "post", "daily", "tribune", "herald",
];

/// Labels that never identify a brand.
static STOPWORDS: Lazy<BTreeSet<&'static str>> = Lazy::new(|| {
    ["the", "and", "for", "www", "web", "com", "net", "org", "online", "official"]
        .into_iter()
        .collect()
});

/// Host prefixes that sit in front of the brand label.
const NON_BRAND_PREFIXES: &[&str] = &["www", "m", "amp", "en", "news"];

/// Registry-ish labels that end a host (public suffixes, coarse set).
const REGISTRY_LABELS: &[&str] = &[
    "com", "org", "net", "info", "co", "uk", "de", "fr", "ru", "cn", "io", "gov", "edu",
];

/// The base brand token of a host: the leftmost label that is neither a
/// generic prefix nor part of the registry suffix.
pub fn base_brand_token(host: &str) -> Option<String> {
    let labels: Vec<&str> = host
        .trim_end_matches('.')
        .split('.')
        .filter(|l| !l.is_empty())
        .collect();
    labels
        .iter()
        .find(|label| {
            let lowered = label.to_lowercase();
            !NON_BRAND_PREFIXES.contains(&lowered.as_str())
                && !REGISTRY_LABELS.contains(&lowered.as_str())
        })
        .map(|label| label.to_lowercase())
}

/// Split a camelCase token on case boundaries.
fn camel_case_parts(token: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    for ch in token.chars() {
        if ch.is_uppercase() && !current.is_empty() {
            parts.push(current.to_lowercase());
            current = String::new();
        }
        current.push(ch);
    }
    if !current.is_empty() {
        parts.push(current.to_lowercase());
    }
    parts
}

/// Generate brand variants for a host. Tokens shorter than 3 characters
/// and stopwords are dropped. Output order is deterministic.
pub fn brand_variants(host: &str) -> Vec<String> {
    let Some(base) = base_brand_token(host) else {
        return Vec::new();
    };

    let mut variants = BTreeSet::new();
    variants.insert(base.clone());

    // Hyphen split: whole joined form plus the individual parts.
    if base.contains('-') {
        variants.insert(base.replace('-', ""));
        variants.insert(base.replace('-', " "));
        for part in base.split('-') {
            variants.insert(part.to_string());
        }
    }

    // CamelCase split on the original-case label.
    if let Some(original) = host.split('.').find(|l| l.eq_ignore_ascii_case(&base)) {
        let parts = camel_case_parts(original);
        if parts.len() > 1 {
            variants.insert(parts.join(" "));
            for part in &parts {
                variants.insert(part.clone());
            }
        }
    }

    // Suffix strip on every variant collected so far.
    let snapshot: Vec<String> = variants.iter().cloned().collect();
    for token in snapshot {
        for suffix in MEDIA_SUFFIXES {
            if let Some(stripped) = token.strip_suffix(suffix) {
                let stripped = stripped.trim_end_matches(['-', ' ']);
                if !stripped.is_empty() {
                    variants.insert(stripped.to_string());
                }
            }
        }
    }

    variants
        .into_iter()
        .filter(|v| v.len() >= 3 && !STOPWORDS.contains(v.as_str()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_token_skips_prefixes_and_registry() {
        assert_eq!(
            base_brand_token("www.example-news.co.uk").as_deref(),
            Some("example-news")
        );
        assert_eq!(base_brand_token("m.globaltimes.cn").as_deref(), Some("globaltimes"));
        assert_eq!(base_brand_token("example.com").as_deref(), Some("example"));
    }

    #[test]
    fn hyphen_split_variants() {
        let variants = brand_variants("daily-truth-media.com");
        assert!(variants.contains(&"daily-truth-media".to_string()));
        assert!(variants.contains(&"dailytruthmedia".to_string()));
        assert!(variants.contains(&"truth".to_string()));
        // "daily" survives as a token here even though it is also a
        // strippable suffix elsewhere.
        assert!(variants.contains(&"daily".to_string()));
    }

    #[test]
    fn suffix_strip_variants() {
        let variants = brand_variants("examplenews.com");
        assert!(variants.contains(&"examplenews".to_string()));
        assert!(variants.contains(&"example".to_string()));

        let variants = brand_variants("cityherald.org");
        assert!(variants.contains(&"city".to_string()));
    }

    #[test]
    fn short_tokens_and_stopwords_dropped() {
        let variants = brand_variants("ab-the-xyznews.com");
        assert!(!variants.iter().any(|v| v == "ab"));
        assert!(!variants.iter().any(|v| v == "the"));
        assert!(variants.contains(&"xyznews".to_string()));
        assert!(variants.contains(&"xyz".to_string()));
    }

    #[test]
    fn output_is_deterministic() {
        let a = brand_variants("some-site-news.com");
        let b = brand_variants("some-site-news.com");
        assert_eq!(a, b);
    }
}
