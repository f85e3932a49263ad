// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Heuristic browser/agent classification.
//!
//! Rules, first match wins:
//!
//! 1. Missing or empty `User-Agent` → automated.
//! 2. `User-Agent` matches a known automation signature → automated.
//! 3. No `Mozilla/` marker and no `Accept-Language` header → automated.
//! 4. Otherwise → human.
//!
//! Ambiguous traffic is classified as human. Blocking a person is worse than
//! letting an unidentified bot through without the extra check.

use axum::http::{
    header::{ACCEPT_LANGUAGE, USER_AGENT},
    HeaderMap,
};
use regex::{RegexSet, RegexSetBuilder};

/// Marker every mainstream browser includes in its user agent.
pub const BROWSER_MARKER: &str = "Mozilla/";

/// User agent prefix sent by the first-party agent client.
pub const CLIENT_MARKER: &str = "AgentGate-Client";

/// Built-in automation signatures. Patterns are matched case-insensitively.
pub const DEFAULT_SIGNATURES: &[&str] = &[
    // AI crawlers and agents
    r"GPTBot",
    r"ChatGPT-User",
    r"OAI-SearchBot",
    r"ClaudeBot",
    r"Claude-User",
    r"Claude-Web",
    r"anthropic-ai",
    r"PerplexityBot",
    r"Perplexity-User",
    r"Google-Extended",
    r"CCBot",
    r"Bytespider",
    r"cohere-ai",
    r"Meta-ExternalAgent",
    r"Amazonbot",
    r"Applebot",
    r"YouBot",
    // Search engines
    r"Googlebot",
    r"bingbot",
    r"DuckDuckBot",
    r"YandexBot",
    r"Baiduspider",
    r"facebookexternalhit",
    // HTTP client libraries
    r"^curl/",
    r"^Wget/",
    r"python-requests",
    r"python-urllib",
    r"aiohttp",
    r"httpx",
    r"axios/",
    r"node-fetch",
    r"undici",
    r"Go-http-client",
    r"okhttp",
    r"^Java/",
    r"libwww-perl",
    r"reqwest",
    r"PostmanRuntime",
    // Generic tokens
    r"\bbot\b",
    r"\bcrawler\b",
    r"\bspider\b",
    r"\bscraper\b",
    // First-party client
    r"AgentGate-Client",
];

/// Classifies requests as automated or human from their headers.
#[derive(Debug, Clone)]
pub struct RequestClassifier {
    signatures: RegexSet,
}

impl RequestClassifier {
    /// Build a classifier from a custom signature list.
    ///
    /// Each entry is a regular expression matched case-insensitively against
    /// the `User-Agent` value.
    pub fn new<I, S>(signatures: I) -> Result<Self, regex::Error>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let signatures = RegexSetBuilder::new(signatures)
            .case_insensitive(true)
            .build()?;
        Ok(Self { signatures })
    }

    /// Build a classifier from the built-in list plus `extra` signatures.
    pub fn with_extra_signatures<I, S>(extra: I) -> Result<Self, regex::Error>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns: Vec<String> = DEFAULT_SIGNATURES
            .iter()
            .map(|s| (*s).to_string())
            .chain(extra.into_iter().map(|s| s.as_ref().to_string()))
            .collect();
        Self::new(patterns)
    }

    /// Number of configured signatures.
    pub fn len(&self) -> usize {
        self.signatures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signatures.is_empty()
    }

    /// Returns `true` if the request looks like automated traffic.
    pub fn classify(&self, headers: &HeaderMap) -> bool {
        let user_agent = headers
            .get(USER_AGENT)
            .map(|v| String::from_utf8_lossy(v.as_bytes()).trim().to_string())
            .unwrap_or_default();

        if user_agent.is_empty() {
            return true;
        }

        if self.signatures.is_match(&user_agent) {
            return true;
        }

        !user_agent.contains(BROWSER_MARKER) && !headers.contains_key(ACCEPT_LANGUAGE)
    }
}

impl Default for RequestClassifier {
    fn default() -> Self {
        Self::new(DEFAULT_SIGNATURES).expect("built-in automation signatures must compile")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    const CHROME: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                          (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36";

    fn headers(user_agent: Option<&str>, accept_language: Option<&str>) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Some(ua) = user_agent {
            headers.insert(USER_AGENT, HeaderValue::from_str(ua).unwrap());
        }
        if let Some(lang) = accept_language {
            headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_str(lang).unwrap());
        }
        headers
    }

    #[test]
    fn missing_user_agent_is_automated() {
        let classifier = RequestClassifier::default();
        assert!(classifier.classify(&headers(None, None)));
        assert!(classifier.classify(&headers(None, Some("en-US"))));
    }

    #[test]
    fn empty_user_agent_is_automated() {
        let classifier = RequestClassifier::default();
        assert!(classifier.classify(&headers(Some(""), Some("en-US"))));
        assert!(classifier.classify(&headers(Some("   "), Some("en-US"))));
    }

    /// One real-world user agent per built-in signature, in list order.
    const SIGNATURE_SAMPLES: &[(&str, &str)] = &[
        (r"GPTBot", "Mozilla/5.0 AppleWebKit/537.36 (KHTML, like Gecko; compatible; GPTBot/1.2; +https://openai.com/gptbot)"),
        (r"ChatGPT-User", "Mozilla/5.0 AppleWebKit/537.36 (KHTML, like Gecko); compatible; ChatGPT-User/1.0; +https://openai.com/bot"),
        (r"OAI-SearchBot", "Mozilla/5.0 AppleWebKit/537.36 (KHTML, like Gecko); compatible; OAI-SearchBot/1.0; +https://openai.com/searchbot"),
        (r"ClaudeBot", "Mozilla/5.0 (compatible; ClaudeBot/1.0; +claudebot@anthropic.com)"),
        (r"Claude-User", "Mozilla/5.0 AppleWebKit/537.36 (KHTML, like Gecko; compatible; Claude-User/1.0; +Claude-User@anthropic.com)"),
        (r"Claude-Web", "Mozilla/5.0 (compatible; Claude-Web/1.0; +https://www.anthropic.com)"),
        (r"anthropic-ai", "anthropic-ai/1.0"),
        (r"PerplexityBot", "Mozilla/5.0 AppleWebKit/537.36 (KHTML, like Gecko; compatible; PerplexityBot/1.0; +https://perplexity.ai/perplexitybot)"),
        (r"Perplexity-User", "Mozilla/5.0 AppleWebKit/537.36 (KHTML, like Gecko; compatible; Perplexity-User/1.0; +https://perplexity.ai/perplexity-user)"),
        (r"Google-Extended", "Mozilla/5.0 (compatible; Google-Extended)"),
        (r"CCBot", "CCBot/2.0 (https://commoncrawl.org/faq/)"),
        (r"Bytespider", "Mozilla/5.0 (Linux; Android 5.0) AppleWebKit/537.36 (KHTML, like Gecko) Mobile Safari/537.36 (compatible; Bytespider; spider-feedback@bytedance.com)"),
        (r"cohere-ai", "cohere-ai"),
        (r"Meta-ExternalAgent", "meta-externalagent/1.1 (+https://developers.facebook.com/docs/sharing/webmasters/crawler)"),
        (r"Amazonbot", "Mozilla/5.0 AppleWebKit/537.36 (KHTML, like Gecko; compatible; Amazonbot/0.1; +https://developer.amazon.com/support/amazonbot) Chrome/119.0.6045.214 Safari/537.36"),
        (r"Applebot", "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_5) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/13.1.1 Safari/605.1.15 (Applebot/0.1; +http://www.apple.com/go/applebot)"),
        (r"YouBot", "Mozilla/5.0 AppleWebKit/537.36 (KHTML, like Gecko; compatible; YouBot (+http://about.you.com/youbot))"),
        (r"Googlebot", "Mozilla/5.0 (compatible; Googlebot/2.1; +http://www.google.com/bot.html)"),
        (r"bingbot", "Mozilla/5.0 (compatible; bingbot/2.0; +http://www.bing.com/bingbot.htm)"),
        (r"DuckDuckBot", "DuckDuckBot/1.1; (+http://duckduckgo.com/duckduckbot.html)"),
        (r"YandexBot", "Mozilla/5.0 (compatible; YandexBot/3.0; +http://yandex.com/bots)"),
        (r"Baiduspider", "Mozilla/5.0 (compatible; Baiduspider/2.0; +http://www.baidu.com/search/spider.html)"),
        (r"facebookexternalhit", "facebookexternalhit/1.1 (+http://www.facebook.com/externalhit_uatext.php)"),
        (r"^curl/", "curl/7.88.1"),
        (r"^Wget/", "Wget/1.21.4"),
        (r"python-requests", "python-requests/2.32.3"),
        (r"python-urllib", "Python-urllib/3.12"),
        (r"aiohttp", "Python/3.12 aiohttp/3.9.5"),
        (r"httpx", "python-httpx/0.27.0"),
        (r"axios/", "axios/1.7.2"),
        (r"node-fetch", "node-fetch/1.0 (+https://github.com/bitinn/node-fetch)"),
        (r"undici", "undici"),
        (r"Go-http-client", "Go-http-client/1.1"),
        (r"okhttp", "okhttp/4.12.0"),
        (r"^Java/", "Java/17.0.2"),
        (r"libwww-perl", "libwww-perl/6.72"),
        (r"reqwest", "reqwest/0.12.15"),
        (r"PostmanRuntime", "PostmanRuntime/7.39.0"),
        (r"\bbot\b", "Mozilla/5.0 (compatible; my bot)"),
        (r"\bcrawler\b", "Mozilla/5.0 (compatible; SomeCrawler crawler; +https://example.com)"),
        (r"\bspider\b", "acme spider 2.0"),
        (r"\bscraper\b", "acme scraper 1.0"),
        (r"AgentGate-Client", "AgentGate-Client/0.3.1"),
    ];

    #[test]
    fn every_signature_has_a_sample() {
        let listed: Vec<&str> = SIGNATURE_SAMPLES.iter().map(|(sig, _)| *sig).collect();
        assert_eq!(listed, DEFAULT_SIGNATURES);
    }

    #[test]
    fn known_signatures_are_automated() {
        let classifier = RequestClassifier::default();
        for (signature, ua) in SIGNATURE_SAMPLES {
            let only = RequestClassifier::new([*signature]).unwrap();
            assert!(
                only.classify(&headers(Some(*ua), Some("en-US"))),
                "{signature} does not match its sample: {ua}"
            );
            assert!(
                classifier.classify(&headers(Some(*ua), Some("en-US"))),
                "expected automated: {ua}"
            );
        }
    }

    #[test]
    fn signature_match_is_case_insensitive() {
        let classifier = RequestClassifier::default();
        assert!(classifier.classify(&headers(Some("CURL/8.0"), Some("en"))));
        assert!(classifier.classify(&headers(Some("Mozilla/5.0 gptbot"), Some("en"))));
    }

    #[test]
    fn generic_tokens_match_on_word_boundaries_only() {
        let classifier = RequestClassifier::default();
        // "Abbott" contains "bot" but not as a word
        let ua = "Mozilla/5.0 Abbott-Kiosk/3.1";
        assert!(!classifier.classify(&headers(Some(ua), Some("sv-SE"))));
        assert!(classifier.classify(&headers(Some("Mozilla/5.0 my bot"), Some("sv-SE"))));
    }

    #[test]
    fn desktop_browser_with_accept_language_is_human() {
        let classifier = RequestClassifier::default();
        assert!(!classifier.classify(&headers(Some(CHROME), Some("en-US,en;q=0.9"))));
    }

    #[test]
    fn browser_without_accept_language_is_human() {
        let classifier = RequestClassifier::default();
        assert!(!classifier.classify(&headers(Some(CHROME), None)));
    }

    #[test]
    fn non_browser_without_accept_language_is_automated() {
        let classifier = RequestClassifier::default();
        assert!(classifier.classify(&headers(Some("MyCustomTool/2.0"), None)));
    }

    #[test]
    fn non_browser_with_accept_language_is_human() {
        let classifier = RequestClassifier::default();
        assert!(!classifier.classify(&headers(Some("MyCustomTool/2.0"), Some("en-US"))));
    }

    #[test]
    fn extra_signatures_extend_the_defaults() {
        let classifier = RequestClassifier::with_extra_signatures(["InternalProbe"]).unwrap();
        assert_eq!(classifier.len(), DEFAULT_SIGNATURES.len() + 1);
        assert!(classifier.classify(&headers(Some("Mozilla/5.0 InternalProbe/1"), Some("en"))));
        assert!(classifier.classify(&headers(Some("curl/8.0"), Some("en"))));
    }

    #[test]
    fn custom_signatures_replace_the_defaults() {
        let classifier = RequestClassifier::new(["^acme-agent/"]).unwrap();
        assert!(classifier.classify(&headers(Some("acme-agent/1.0"), Some("en"))));
        // curl is no longer a signature; Accept-Language makes it human
        assert!(!classifier.classify(&headers(Some("curl/8.0"), Some("en"))));
    }

    #[test]
    fn invalid_signature_is_rejected() {
        assert!(RequestClassifier::new(["(unclosed"]).is_err());
    }
}
