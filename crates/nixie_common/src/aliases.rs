//! Package alias resolution.
//!
//! Everyday names ("chrome", "vs code", "node") map to nixpkgs attribute
//! names. Multi-word aliases win over their first word (longest prefix).
//! Phrases the table does not know are offered to an optional external
//! `AliasLookup`; its answers are cached under `alias:<phrase>`. Without one,
//! unknown phrases pass through unchanged.

use crate::cache::Cache;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

/// (alias, nixpkgs attribute)
pub const ALIAS_TABLE: &[(&str, &str)] = &[
    ("firefox", "firefox"),
    ("web browser", "firefox"),
    ("chrome", "google-chrome"),
    ("google chrome", "google-chrome"),
    ("chromium", "chromium"),
    ("vscode", "vscode"),
    ("vs code", "vscode"),
    ("visual studio code", "vscode"),
    ("code", "vscode"),
    ("vim", "vim"),
    ("neovim", "neovim"),
    ("nvim", "neovim"),
    ("emacs", "emacs"),
    ("python", "python3"),
    ("python3", "python311"),
    ("nodejs", "nodejs"),
    ("node", "nodejs"),
    ("node js", "nodejs"),
    ("npm", "nodejs"),
    ("docker", "docker"),
    ("git", "git"),
    ("htop", "htop"),
    ("tmux", "tmux"),
    ("zsh", "zsh"),
    ("fish", "fish"),
    ("rust", "rustc"),
    ("cargo", "cargo"),
    ("rustc", "rustc"),
    ("go", "go"),
    ("golang", "go"),
    ("java", "openjdk"),
    ("jdk", "openjdk"),
];

/// Filler words dropped from package phrases before lookup.
pub const STOP_WORDS: &[&str] = &[
    "a", "an", "the", "some", "please", "pls", "me", "my", "i", "to", "for", "want",
    "need", "would", "like", "could", "can", "you", "get", "install", "add", "remove",
    "uninstall", "delete", "package", "program", "app", "application", "called", "named",
    "latest", "version", "of", "it", "this", "that", "just", "also", "now",
];

/// External resolver for phrases the table does not cover, such as an
/// embedding index. Returns a nixpkgs attribute name.
pub trait AliasLookup: Send + Sync {
    fn lookup(&self, phrase: &str) -> Option<String>;
}

pub struct AliasResolver {
    table: HashMap<String, String>,
    stop_words: HashSet<&'static str>,
    max_alias_words: usize,
    lookup: Option<Box<dyn AliasLookup>>,
    cache: Option<Arc<Cache>>,
    lookup_ttl: Duration,
}

impl Default for AliasResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl AliasResolver {
    pub fn new() -> Self {
        let table: HashMap<String, String> = ALIAS_TABLE
            .iter()
            .map(|(alias, target)| (alias.to_string(), target.to_string()))
            .collect();
        let max_alias_words = table
            .keys()
            .map(|k| k.split_whitespace().count())
            .max()
            .unwrap_or(1);
        Self {
            table,
            stop_words: STOP_WORDS.iter().copied().collect(),
            max_alias_words,
            lookup: None,
            cache: None,
            lookup_ttl: Duration::from_secs(7 * 24 * 3600),
        }
    }

    pub fn with_lookup(mut self, lookup: Box<dyn AliasLookup>) -> Self {
        self.lookup = Some(lookup);
        self
    }

    pub fn with_cache(mut self, cache: Arc<Cache>, ttl: Duration) -> Self {
        self.cache = Some(cache);
        self.lookup_ttl = ttl;
        self
    }

    /// Lower-cased words of `phrase` minus stop words.
    pub fn content_words(&self, phrase: &str) -> Vec<String> {
        phrase
            .split_whitespace()
            .map(|w| w.to_lowercase())
            .filter(|w| !self.stop_words.contains(w.as_str()))
            .collect()
    }

    /// Table lookup only, longest prefix first.
    pub fn lookup_table(&self, words: &[String]) -> Option<String> {
        let longest = words.len().min(self.max_alias_words);
        (1..=longest).rev().find_map(|n| {
            let candidate = words[..n].join(" ");
            self.table.get(&candidate).cloned()
        })
    }

    /// Canonical package name for a free-form phrase. None when nothing but
    /// filler words remain.
    pub fn resolve(&self, phrase: &str) -> Option<String> {
        let words = self.content_words(phrase);
        if words.is_empty() {
            return None;
        }
        if let Some(hit) = self.lookup_table(&words) {
            return Some(hit);
        }

        let joined = words.join(" ");
        if let Some(found) = self.lookup_external(&joined) {
            return Some(found);
        }
        Some(joined)
    }

    fn lookup_external(&self, phrase: &str) -> Option<String> {
        let lookup = self.lookup.as_ref()?;
        let key = format!("alias:{}", phrase);

        if let Some(cache) = &self.cache {
            if let Some(hit) = cache.get::<String>(&key) {
                return Some(hit);
            }
        }

        let found = lookup.lookup(phrase)?;
        tracing::debug!(phrase = %phrase, package = %found, "alias resolved externally");
        if let Some(cache) = &self.cache {
            cache.set(&key, &found, Some(self.lookup_ttl));
        }
        Some(found)
    }
}
