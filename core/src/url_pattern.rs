//! URL patterns and the matcher capability that judges them.
//!
//! The engine treats URL matching as an external predicate: a
//! [`UrlPatternMatcher`] answers "does this pattern match this URL?". The
//! pattern itself is compiled once, at admission, by [`UrlPattern::new`].
//!
//! # Glob syntax ([`GlobMatcher`])
//!
//! | Token | Matches |
//! |-------|---------|
//! | `*`   | any run of characters within one path segment |
//! | `**`  | any number of whole segments (including none) |
//! | `?`   | exactly one character other than `/` |
//!
//! Patterns starting with `/` are matched against the URL path. Any other
//! pattern is matched against origin + path (`https://host/path`). Query and
//! fragment never take part.

use crate::{ValidationError, MAX_PATTERN_LENGTH};
use regex::Regex;
use std::fmt;
use url::Url;

/// A compiled URL pattern.
#[derive(Clone)]
pub struct UrlPattern {
    source: String,
    regex: Regex,
}

impl UrlPattern {
    /// Compile a pattern.
    ///
    /// # Errors
    ///
    /// - [`ValidationError::EmptyUrlPattern`] for an empty pattern
    /// - [`ValidationError::PatternTooLong`] above [`MAX_PATTERN_LENGTH`]
    /// - [`ValidationError::InvalidUrlPattern`] if the glob cannot be compiled
    pub fn new(pattern: impl Into<String>) -> Result<Self, ValidationError> {
        let source = pattern.into();
        if source.is_empty() {
            return Err(ValidationError::EmptyUrlPattern);
        }
        if source.len() > MAX_PATTERN_LENGTH {
            return Err(ValidationError::PatternTooLong {
                len: source.len(),
                max: MAX_PATTERN_LENGTH,
            });
        }
        let regex = Regex::new(&glob_to_regex(&source)).map_err(|e| {
            ValidationError::InvalidUrlPattern {
                pattern: source.clone(),
                reason: e.to_string(),
            }
        })?;
        Ok(Self { source, regex })
    }

    /// The pattern as written.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Returns `true` if the pattern is matched against the path only.
    #[must_use]
    pub fn is_path_only(&self) -> bool {
        self.source.starts_with('/')
    }
}

impl fmt::Debug for UrlPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("UrlPattern").field(&self.source).finish()
    }
}

impl fmt::Display for UrlPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

impl PartialEq for UrlPattern {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl Eq for UrlPattern {}

/// Judges whether a URL matches a pattern.
///
/// Hosts with a native URL-pattern implementation plug it in here; the
/// pattern's raw text is available through [`UrlPattern::as_str`].
#[diagnostic::on_unimplemented(
    message = "`{Self}` does not implement `UrlPatternMatcher`",
    note = "use the built-in `GlobMatcher` or implement `matches(&self, &UrlPattern, &Url) -> bool`"
)]
pub trait UrlPatternMatcher: Send + Sync + fmt::Debug {
    /// Returns `true` if `url` matches `pattern`.
    fn matches(&self, pattern: &UrlPattern, url: &Url) -> bool;
}

/// Default [`UrlPatternMatcher`] using the compiled glob.
#[derive(Debug, Clone, Copy, Default)]
pub struct GlobMatcher;

impl UrlPatternMatcher for GlobMatcher {
    fn matches(&self, pattern: &UrlPattern, url: &Url) -> bool {
        if pattern.is_path_only() {
            pattern.regex.is_match(url.path())
        } else {
            let target = format!("{}{}", url.origin().ascii_serialization(), url.path());
            pattern.regex.is_match(&target)
        }
    }
}

/// Translate a glob into an anchored regex.
fn glob_to_regex(glob: &str) -> String {
    let mut out = String::with_capacity(glob.len() * 2 + 2);
    out.push('^');
    let chars: Vec<char> = glob.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '*' if chars.get(i + 1) == Some(&'*') => {
                if chars.get(i + 2) == Some(&'/') {
                    // `**/` spans zero or more whole segments
                    out.push_str("(?:.*/)?");
                    i += 3;
                } else {
                    out.push_str(".*");
                    i += 2;
                }
            }
            '*' => {
                out.push_str("[^/]*");
                i += 1;
            }
            '?' => {
                out.push_str("[^/]");
                i += 1;
            }
            c => {
                let mut buf = [0u8; 4];
                out.push_str(&regex::escape(c.encode_utf8(&mut buf)));
                i += 1;
            }
        }
    }
    out.push('$');
    out
}
