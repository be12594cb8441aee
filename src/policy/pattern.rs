//! Glob matching for rule and target patterns.
//!
//! `*` alone matches everything. A single leading or trailing `*` is a plain
//! suffix or prefix test. Anything else containing `*` or `?` is translated
//! to an anchored regex where `?` is one character, `*` is a run without `/`
//! and `**` is any run. Patterns that fail to compile match nothing.

use lru::LruCache;
use regex::Regex;
use std::num::NonZeroUsize;
use std::sync::Mutex;

const REGEX_CACHE_CAPACITY: usize = 512;

lazy_static::lazy_static! {
    static ref REGEX_CACHE: Mutex<LruCache<String, Option<Regex>>> = Mutex::new(LruCache::new(
        NonZeroUsize::new(REGEX_CACHE_CAPACITY).unwrap_or(NonZeroUsize::MIN),
    ));
}

/// Compiles `pattern`, memoizing both successes and failures.
pub fn cached_regex(pattern: &str) -> Option<Regex> {
    let mut cache = REGEX_CACHE.lock().unwrap_or_else(|e| e.into_inner());
    if let Some(entry) = cache.get(pattern) {
        return entry.clone();
    }
    let compiled = Regex::new(pattern).ok();
    cache.put(pattern.to_string(), compiled.clone());
    compiled
}

fn has_wildcard(pattern: &str) -> bool {
    pattern.contains(['*', '?'])
}

fn glob_to_regex(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len() + 8);
    out.push('^');
    let mut chars = pattern.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '*' if chars.peek() == Some(&'*') => {
                chars.next();
                out.push_str(".*");
            }
            '*' => out.push_str("[^/]*"),
            '?' => out.push('.'),
            other => out.push_str(&regex::escape(other.encode_utf8(&mut [0; 4]))),
        }
    }
    out.push('$');
    out
}

/// Matches `value` against a single pattern.
pub fn match_pattern(value: &str, pattern: &str) -> bool {
    if pattern == "*" {
        return true;
    }
    if let Some(prefix) = pattern.strip_suffix('*') {
        if !has_wildcard(prefix) {
            return value.starts_with(prefix);
        }
    }
    if let Some(suffix) = pattern.strip_prefix('*') {
        if !has_wildcard(suffix) {
            return value.ends_with(suffix);
        }
    }
    if has_wildcard(pattern) {
        return cached_regex(&glob_to_regex(pattern))
            .map(|re| re.is_match(value))
            .unwrap_or(false);
    }
    value == pattern
}

/// True if any pattern matches. An empty pattern list matches nothing.
pub fn matches_any<S: AsRef<str>>(value: &str, patterns: &[S]) -> bool {
    patterns.iter().any(|p| match_pattern(value, p.as_ref()))
}
