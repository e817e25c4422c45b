//! Relatedness predicates for Tense follow-ups
//!
//! Whether a follow-up message "belongs" to the conversation the agent just
//! joined is deliberately pluggable. The default is a cheap lexical overlap
//! check; deployments can swap in anything implementing
//! [`RelevancePredicate`], including plain closures.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

static WORD_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[a-z0-9_]{2,}").expect("word pattern is valid"));

static CJK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\x{4e00}-\x{9fff}]").expect("cjk pattern is valid"));

/// Decides whether a message continues the current focus
pub trait RelevancePredicate: Send + Sync {
    /// `focus` is the text the Tense window was entered on (possibly merged
    /// with the agent's reply); `message` is the new follow-up.
    fn is_related(&self, focus: &str, message: &str) -> bool;
}

impl<F> RelevancePredicate for F
where
    F: Fn(&str, &str) -> bool + Send + Sync,
{
    fn is_related(&self, focus: &str, message: &str) -> bool {
        self(focus, message)
    }
}

/// Every follow-up is related
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysRelated;

impl RelevancePredicate for AlwaysRelated {
    fn is_related(&self, _focus: &str, _message: &str) -> bool {
        true
    }
}

/// Lexical overlap between focus and message.
///
/// Related when the two share a lower-cased ASCII word of two or more
/// characters, or at least `min_shared_ideographs` CJK ideographs. An empty
/// focus relates to everything.
#[derive(Debug, Clone)]
pub struct KeywordOverlap {
    min_shared_ideographs: usize,
}

impl KeywordOverlap {
    /// Create with the default ideograph threshold (2)
    pub fn new() -> Self {
        Self {
            min_shared_ideographs: 2,
        }
    }

    /// Set the number of shared CJK ideographs that counts as related
    pub fn with_min_shared_ideographs(mut self, n: usize) -> Self {
        self.min_shared_ideographs = n.max(1);
        self
    }

    fn signals(text: &str) -> (HashSet<String>, HashSet<String>) {
        let lowered = text.to_lowercase();
        let words = WORD_RE
            .find_iter(&lowered)
            .map(|m| m.as_str().to_string())
            .collect();
        let ideographs = CJK_RE
            .find_iter(&lowered)
            .map(|m| m.as_str().to_string())
            .collect();
        (words, ideographs)
    }
}

impl Default for KeywordOverlap {
    fn default() -> Self {
        Self::new()
    }
}

impl RelevancePredicate for KeywordOverlap {
    fn is_related(&self, focus: &str, message: &str) -> bool {
        if focus.trim().is_empty() {
            return true;
        }

        let (msg_words, msg_chars) = Self::signals(message);
        let (focus_words, focus_chars) = Self::signals(focus);

        if !msg_words.is_disjoint(&focus_words) {
            return true;
        }
        msg_chars.intersection(&focus_chars).count() >= self.min_shared_ideographs
    }
}
