//! Version ordering for artifact versions.
//!
//! Versions are split into tokens on `.`, `-`, `_` and on every transition
//! between digits and letters. Numeric tokens compare numerically (so `10 > 2`),
//! qualifiers compare by rank:
//!
//! `alpha < beta < milestone < rc < snapshot < (unknown) < release < sp`
//!
//! Unknown qualifiers compare lexicographically among themselves. Trailing
//! zero and release tokens are dropped, so `1 == 1.0 == 1.0.0 == 1.0-final`.

use std::cmp::Ordering;

use crate::constants::SNAPSHOT_SUFFIX;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    /// Digits with leading zeros stripped.
    Number(String),
    Qualifier(String),
}

const RELEASE: &str = "";

fn qualifier_rank(qualifier: &str) -> u8 {
    match qualifier {
        "alpha" => 0,
        "beta" => 1,
        "milestone" => 2,
        "rc" => 3,
        "snapshot" => 4,
        RELEASE => 6,
        "sp" => 7,
        _ => 5,
    }
}

fn normalize_qualifier(raw: &str) -> String {
    let lower = raw.to_ascii_lowercase();
    match lower.as_str() {
        "a" => "alpha".to_string(),
        "b" => "beta".to_string(),
        "m" => "milestone".to_string(),
        "cr" => "rc".to_string(),
        "ga" | "final" | "release" => RELEASE.to_string(),
        _ => lower,
    }
}

fn compare_numbers(a: &str, b: &str) -> Ordering {
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

fn compare_qualifiers(a: &str, b: &str) -> Ordering {
    qualifier_rank(a)
        .cmp(&qualifier_rank(b))
        .then_with(|| a.cmp(b))
}

fn compare_tokens(a: Option<&Token>, b: Option<&Token>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (Some(Token::Number(x)), Some(Token::Number(y))) => compare_numbers(x, y),
        (Some(Token::Qualifier(x)), Some(Token::Qualifier(y))) => compare_qualifiers(x, y),
        (Some(Token::Number(_)), Some(Token::Qualifier(_))) => Ordering::Greater,
        (Some(Token::Qualifier(_)), Some(Token::Number(_))) => Ordering::Less,
        // A missing token reads as `0` against numbers and as a release against qualifiers.
        (None, Some(Token::Number(y))) => compare_numbers("", y),
        (Some(Token::Number(x)), None) => compare_numbers(x, ""),
        (None, Some(Token::Qualifier(y))) => compare_qualifiers(RELEASE, y),
        (Some(Token::Qualifier(x)), None) => compare_qualifiers(x, RELEASE),
    }
}

/// A parsed, comparable version string.
#[derive(Debug, Clone)]
pub struct MavenVersion {
    raw: String,
    tokens: Vec<Token>,
}

impl MavenVersion {
    pub fn parse(raw: &str) -> Self {
        let mut tokens = Vec::new();
        let mut current = String::new();
        let mut current_is_digit = false;

        let flush = |current: &mut String, is_digit: bool, tokens: &mut Vec<Token>| {
            if current.is_empty() {
                return;
            }
            if is_digit {
                tokens.push(Token::Number(current.trim_start_matches('0').to_string()));
            } else {
                tokens.push(Token::Qualifier(normalize_qualifier(current)));
            }
            current.clear();
        };

        for c in raw.chars() {
            if matches!(c, '.' | '-' | '_') {
                flush(&mut current, current_is_digit, &mut tokens);
                continue;
            }
            let is_digit = c.is_ascii_digit();
            if !current.is_empty() && is_digit != current_is_digit {
                flush(&mut current, current_is_digit, &mut tokens);
            }
            current_is_digit = is_digit;
            current.push(c);
        }
        flush(&mut current, current_is_digit, &mut tokens);

        while matches!(
            tokens.last(),
            Some(Token::Number(n)) if n.is_empty()
        ) || matches!(tokens.last(), Some(Token::Qualifier(q)) if q == RELEASE)
        {
            tokens.pop();
        }

        Self {
            raw: raw.to_string(),
            tokens,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn is_snapshot(&self) -> bool {
        is_snapshot(&self.raw)
    }
}

impl PartialEq for MavenVersion {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for MavenVersion {}

impl PartialOrd for MavenVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for MavenVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.tokens.len().max(other.tokens.len());
        (0..len)
            .map(|i| compare_tokens(self.tokens.get(i), other.tokens.get(i)))
            .find(|ordering| *ordering != Ordering::Equal)
            .unwrap_or(Ordering::Equal)
    }
}

pub fn compare_versions(a: &str, b: &str) -> Ordering {
    MavenVersion::parse(a).cmp(&MavenVersion::parse(b))
}

pub fn is_snapshot(version: &str) -> bool {
    version.ends_with(SNAPSHOT_SUFFIX)
}
