//! Domain extraction and the importance filter
//!
//! Reliability evaluation is expensive, so throwaway hosts are filtered
//! before prefetch: blog and free-hosting platforms, spam TLDs, hosts
//! with long digit runs, and overlong hosts.

use once_cell::sync::Lazy;
use std::collections::BTreeSet;

/// Free-hosting and blog platforms whose subdomains say nothing about
/// the publisher.
static PLATFORM_HOSTS: Lazy<BTreeSet<&'static str>> = Lazy::new(|| {
    [
        "blogspot.com",
        "wordpress.com",
        "medium.com",
        "substack.com",
        "tumblr.com",
        "weebly.com",
        "wixsite.com",
        "sites.google.com",
        "github.io",
        "neocities.org",
        "livejournal.com",
    ]
    .into_iter()
    .collect()
});

/// TLDs dominated by spam registrations.
static SPAM_TLDS: Lazy<BTreeSet<&'static str>> = Lazy::new(|| {
    ["xyz", "top", "click", "loan", "win", "bid", "gq", "cf", "tk", "ml"]
        .into_iter()
        .collect()
});

const MAX_HOST_LENGTH: usize = 34;
const MAX_DIGIT_RUN: usize = 4;

/// Lowercased host of a URL with any `www.` prefix removed.
pub fn domain_of(url: &str) -> Option<String> {
    let host = url::Url::parse(url).ok()?.host_str()?.to_lowercase();
    Some(host.trim_start_matches("www.").to_string())
}

fn has_long_digit_run(host: &str) -> bool {
    let mut run = 0;
    for ch in host.chars() {
        if ch.is_ascii_digit() {
            run += 1;
            if run >= MAX_DIGIT_RUN {
                return true;
            }
        } else {
            run = 0;
        }
    }
    false
}

/// Should this domain be evaluated at all?
pub fn is_important_domain(domain: &str) -> bool {
    if domain.is_empty() || domain.len() > MAX_HOST_LENGTH {
        return false;
    }
    if has_long_digit_run(domain) {
        return false;
    }
    if PLATFORM_HOSTS.iter().any(|platform| {
        domain == *platform || domain.ends_with(&format!(".{platform}"))
    }) {
        return false;
    }
    if let Some(tld) = domain.rsplit('.').next() {
        if SPAM_TLDS.contains(tld) {
            return false;
        }
    }
    true
}

/// Unique importance-filtered domains from a URL list, in first-seen
/// order.
pub fn unique_important_domains(urls: &[String]) -> Vec<String> {
    let mut seen = BTreeSet::new();
    let mut out = Vec::new();
    for url in urls {
        let Some(domain) = domain_of(url) else { continue };
        if !is_important_domain(&domain) {
            continue;
        }
        if seen.insert(domain.clone()) {
            out.push(domain);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn platform_and_spam_hosts_filtered() {
        assert!(!is_important_domain("myblog.blogspot.com"));
        assert!(!is_important_domain("medium.com"));
        assert!(!is_important_domain("cheap-pills.xyz"));
        assert!(is_important_domain("reuters.com"));
        assert!(is_important_domain("example-news.co.uk"));
    }

    #[test]
    fn digit_runs_and_length_filtered() {
        assert!(!is_important_domain("a1234bcd.com"));
        assert!(is_important_domain("a123bcd.com"));
        assert!(!is_important_domain(
            "this-is-a-very-long-suspicious-host.com"
        ));
    }

    #[test]
    fn unique_domains_preserve_first_seen_order() {
        let urls = vec![
            "https://www.reuters.com/article/1".to_string(),
            "https://reuters.com/article/2".to_string(),
            "https://spam.xyz/x".to_string(),
            "https://apnews.com/item".to_string(),
        ];
        let domains = unique_important_domains(&urls);
        assert_eq!(domains, vec!["reuters.com", "apnews.com"]);
    }
}
