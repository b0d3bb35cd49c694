//! Wildcard-aware path matcher.
//!
//! # Responsibilities
//! - Parse path patterns (exact, trailing wildcard, inner wildcard)
//! - Freeze them into an immutable matcher
//! - Resolve a request path to the most specific registered value
//!
//! # Matching Order
//! 1. Exact path (including the auto-derived trailing-slash companion)
//! 2. Prefix paths, longest first. A prefix applies when the request path
//!    equals it or continues with `/`. Inner-wildcard continuations registered
//!    under the prefix are tried before the prefix's own value.
//! 3. The value registered for `/*`, if any
//!
//! # Design Decisions
//! - Two-phase API: [`PathMatcherBuilder`] collects, [`PathMatcher`] is frozen
//! - Malformed patterns fail at `build()`, `match_path()` never fails
//! - Inner wildcards are modelled as a nested matcher per prefix

use std::collections::{BTreeMap, HashMap};

use crate::error::ConfigError;
use crate::matcher::substring::SubstringMap;

/// Merges a value registered again for the same pattern into the earlier one.
pub type Accumulator<V> = fn(&mut V, V);

/// Result of [`PathMatcher::match_path`].
#[derive(Debug, Clone, Copy)]
pub struct PathMatch<'m, 'p, V> {
    matched: &'p str,
    remaining: &'p str,
    value: Option<&'m V>,
}

impl<'m, 'p, V> PathMatch<'m, 'p, V> {
    /// Portion of the request path consumed by the winning pattern.
    pub fn matched(&self) -> &'p str {
        self.matched
    }

    /// Portion of the request path after the matched prefix.
    pub fn remaining(&self) -> &'p str {
        self.remaining
    }

    /// The value of the winning pattern, `None` when nothing governs the path.
    pub fn value(&self) -> Option<&'m V> {
        self.value
    }

    pub fn is_match(&self) -> bool {
        self.value.is_some()
    }
}

struct PrefixEntry<V> {
    value: Option<V>,
    sub_matcher: Option<PathMatcher<V>>,
}

/// Immutable matcher built by [`PathMatcherBuilder`].
///
/// Safe to share across threads; nothing is mutated after `build()`.
pub struct PathMatcher<V> {
    exact: SubstringMap<V>,
    prefixes: SubstringMap<PrefixEntry<V>>,
    /// Distinct prefix lengths, longest first.
    lengths: Box<[usize]>,
    has_inner_wildcard: bool,
}

impl<V> PathMatcher<V> {
    pub fn builder() -> PathMatcherBuilder<V> {
        PathMatcherBuilder::new()
    }

    /// A matcher without entries. Every path resolves to no value.
    pub fn empty() -> Self {
        Self {
            exact: SubstringMap::default(),
            prefixes: SubstringMap::default(),
            lengths: Box::new([]),
            has_inner_wildcard: false,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.exact.is_empty() && self.prefixes.is_empty()
    }

    /// Value registered for `/*`.
    pub fn default_value(&self) -> Option<&V> {
        self.prefixes
            .get("/", 1)
            .and_then(|entry| entry.value.value.as_ref())
    }

    pub fn match_path<'m, 'p>(&'m self, path: &'p str) -> PathMatch<'m, 'p, V> {
        if let Some(value) = self.exact.get_full(path) {
            return PathMatch {
                matched: path,
                remaining: "",
                value: Some(value),
            };
        }

        let bytes = path.as_bytes();
        for &length in self.lengths.iter() {
            let candidate = match length.cmp(&bytes.len()) {
                std::cmp::Ordering::Equal => true,
                // `/` is the only prefix of length 1; the first segment is
                // only inspected when an inner wildcard follows it.
                std::cmp::Ordering::Less => {
                    bytes[length] == b'/' || (length == 1 && self.has_inner_wildcard)
                }
                std::cmp::Ordering::Greater => false,
            };
            if !candidate {
                continue;
            }
            let Some(found) = self.prefixes.get(path, length) else {
                continue;
            };
            let entry = found.value;

            if length < bytes.len() {
                if let Some(sub_matcher) = &entry.sub_matcher {
                    if let Some(inner) = match_inner_wildcard(sub_matcher, path, length) {
                        return inner;
                    }
                }
            }
            if let Some(value) = &entry.value {
                return PathMatch {
                    matched: &path[..length],
                    remaining: &path[length..],
                    value: Some(value),
                };
            }
        }

        PathMatch {
            matched: "",
            remaining: path,
            value: self.default_value(),
        }
    }
}

impl<V> Default for PathMatcher<V> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<V: std::fmt::Debug> std::fmt::Debug for PathMatcher<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PathMatcher")
            .field("exact", &self.exact)
            .field("prefixes", &self.prefixes.keys().collect::<Vec<_>>())
            .field("has_inner_wildcard", &self.has_inner_wildcard)
            .finish()
    }
}

/// Skip the path segment consumed by the wildcard and match what follows it
/// against the nested matcher.
fn match_inner_wildcard<'m, 'p, V>(
    sub_matcher: &'m PathMatcher<V>,
    path: &'p str,
    prefix_length: usize,
) -> Option<PathMatch<'m, 'p, V>> {
    let bytes = path.as_bytes();
    let segment_start = if bytes[prefix_length] == b'/' {
        prefix_length + 1
    } else {
        prefix_length
    };
    let segment_length = bytes[segment_start..].iter().position(|&b| b == b'/')?;
    // The wildcard stands for exactly one non-empty segment.
    if segment_length == 0 {
        return None;
    }
    let boundary = segment_start + segment_length;

    let inner = sub_matcher.match_path(&path[boundary..]);
    let value = inner.value?;
    Some(PathMatch {
        matched: &path[..boundary + inner.matched.len()],
        remaining: inner.remaining,
        value: Some(value),
    })
}

/// Shape of a single registered pattern.
#[derive(Debug, PartialEq, Eq)]
enum Pattern<'a> {
    Exact(&'a str),
    Prefix(&'a str),
    InnerWildcard { prefix: &'a str, remainder: &'a str },
}

fn parse_pattern(pattern: &str) -> Result<Pattern<'_>, ConfigError> {
    if pattern.is_empty() {
        return Err(ConfigError::EmptyPathPattern);
    }
    let pattern = if pattern == "*" { "/*" } else { pattern };
    if !pattern.starts_with('/') {
        return Err(ConfigError::invalid_pattern(
            pattern,
            "path must start with a path separator",
        ));
    }

    let Some(wildcard) = pattern.find('*') else {
        return Ok(Pattern::Exact(pattern));
    };

    if wildcard == pattern.len() - 1 {
        let prefix = &pattern[..wildcard];
        let prefix = prefix.strip_suffix('/').unwrap_or(prefix);
        return Ok(Pattern::Prefix(if prefix.is_empty() { "/" } else { prefix }));
    }

    let bytes = pattern.as_bytes();
    if bytes[wildcard - 1] != b'/' || bytes[wildcard + 1] != b'/' {
        return Err(ConfigError::invalid_pattern(
            pattern,
            "an inner wildcard must be the only character of its path segment",
        ));
    }
    let prefix = &pattern[..wildcard - 1];
    Ok(Pattern::InnerWildcard {
        prefix: if prefix.is_empty() { "/" } else { prefix },
        remainder: &pattern[wildcard + 1..],
    })
}

struct PrefixBuilder<V> {
    value: Option<V>,
    /// Patterns registered after an inner wildcard, in registration order.
    inner: Vec<(String, V)>,
}

/// Collects path patterns before freezing them into a [`PathMatcher`].
pub struct PathMatcherBuilder<V> {
    exact: HashMap<String, V>,
    trailing_slash: HashMap<String, V>,
    prefixes: BTreeMap<String, PrefixBuilder<V>>,
    accumulator: Option<Accumulator<V>>,
    error: Option<ConfigError>,
}

impl<V> Default for PathMatcherBuilder<V> {
    fn default() -> Self {
        Self {
            exact: HashMap::new(),
            trailing_slash: HashMap::new(),
            prefixes: BTreeMap::new(),
            accumulator: None,
            error: None,
        }
    }
}

impl<V> PathMatcherBuilder<V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge repeated registrations of one pattern instead of replacing them.
    pub fn accumulator(mut self, accumulator: Accumulator<V>) -> Self {
        self.accumulator = Some(accumulator);
        self
    }
}

impl<V: Clone> PathMatcherBuilder<V> {
    /// Register `pattern`. Malformed patterns are reported by [`build`].
    ///
    /// [`build`]: PathMatcherBuilder::build
    pub fn add_path(mut self, pattern: &str, value: V) -> Self {
        if self.error.is_some() {
            return self;
        }
        match parse_pattern(pattern) {
            Ok(Pattern::Exact(path)) => {
                if !path.ends_with('/') {
                    let companion = format!("{path}/");
                    merge(&mut self.trailing_slash, companion, value.clone(), self.accumulator);
                }
                merge(&mut self.exact, path.to_string(), value, self.accumulator);
            }
            Ok(Pattern::Prefix(prefix)) => {
                let accumulator = self.accumulator;
                let entry = self.prefix_entry(prefix);
                match (&mut entry.value, accumulator) {
                    (Some(existing), Some(accumulate)) => accumulate(existing, value),
                    (slot, _) => *slot = Some(value),
                }
            }
            Ok(Pattern::InnerWildcard { prefix, remainder }) => {
                self.prefix_entry(prefix)
                    .inner
                    .push((remainder.to_string(), value));
            }
            Err(err) => self.error = Some(err),
        }
        self
    }

    fn prefix_entry(&mut self, prefix: &str) -> &mut PrefixBuilder<V> {
        self.prefixes
            .entry(prefix.to_string())
            .or_insert_with(|| PrefixBuilder {
                value: None,
                inner: Vec::new(),
            })
    }

    pub fn build(self) -> Result<PathMatcher<V>, ConfigError> {
        let PathMatcherBuilder {
            mut exact,
            trailing_slash,
            prefixes,
            accumulator,
            error,
        } = self;
        if let Some(err) = error {
            return Err(err);
        }

        // An explicit registration of `/a/` wins over the companion of `/a`.
        for (path, value) in trailing_slash {
            exact.entry(path).or_insert(value);
        }

        let mut has_inner_wildcard = false;
        let mut entries = Vec::with_capacity(prefixes.len());
        for (prefix, builder) in prefixes {
            let sub_matcher = if builder.inner.is_empty() {
                None
            } else {
                has_inner_wildcard = true;
                let mut sub = PathMatcherBuilder::new();
                sub.accumulator = accumulator;
                for (remainder, value) in builder.inner {
                    sub = sub.add_path(&remainder, value);
                }
                Some(sub.build()?)
            };
            entries.push((
                prefix,
                PrefixEntry {
                    value: builder.value,
                    sub_matcher,
                },
            ));
        }

        let mut lengths: Vec<usize> = entries.iter().map(|(prefix, _)| prefix.len()).collect();
        lengths.sort_unstable_by(|a, b| b.cmp(a));
        lengths.dedup();

        Ok(PathMatcher {
            exact: SubstringMap::from_entries(exact),
            prefixes: SubstringMap::from_entries(entries),
            lengths: lengths.into_boxed_slice(),
            has_inner_wildcard,
        })
    }
}

fn merge<V>(map: &mut HashMap<String, V>, key: String, value: V, accumulator: Option<Accumulator<V>>) {
    match (map.get_mut(&key), accumulator) {
        (Some(existing), Some(accumulate)) => accumulate(existing, value),
        _ => {
            map.insert(key, value);
        }
    }
}
