//! Password-strength heuristic.
//!
//! Scores a candidate secret out of 10 and maps it onto a 0–5 level:
//!
//! | rule                                         | points |
//! |----------------------------------------------|--------|
//! | length ≥ 16 / ≥ 12 / ≥ 8                      | 3/2/1  |
//! | each of lowercase, uppercase, digit, symbol  | 1 each |
//! | neither all digits nor all letters           | 1      |
//! | no weak pattern                              | 1      |
//! | no common-password word                      | 1      |
//!
//! The level is `min(5, score / 2)`.
//!
//! "All digits" means ASCII digits only; other Unicode digits count as
//! symbols.

use std::sync::OnceLock;

use regex::Regex;

/// Highest level the estimator returns.
pub const MAX_LEVEL: u8 = 5;

/// Literal sequences a weak password tends to start with.
const WEAK_PREFIXES: &[&str] = &["123456", "654321", "111111", "abcdef"];

/// Weak only as the whole secret, not as a prefix.
const WEAK_EXACT: &str = "fedcba";

/// Common passwords; a secret that contains any of these loses a point.
const COMMON_WORDS: &[&str] = &[
    "password", "123456", "qwerty", "admin", "user", "passwd", "abc123",
];

struct Classes {
    lower: Regex,
    upper: Regex,
    digit: Regex,
    symbol: Regex,
    long_digits: Regex,
    long_letters: Regex,
}

fn classes() -> &'static Classes {
    static CLASSES: OnceLock<Classes> = OnceLock::new();
    CLASSES.get_or_init(|| Classes {
        lower: Regex::new(r"[a-z]").expect("static regex"),
        upper: Regex::new(r"[A-Z]").expect("static regex"),
        digit: Regex::new(r"[0-9]").expect("static regex"),
        symbol: Regex::new(r"[^a-zA-Z0-9]").expect("static regex"),
        long_digits: Regex::new(r"^[0-9]{6,}$").expect("static regex"),
        long_letters: Regex::new(r"^[a-zA-Z]{6,}$").expect("static regex"),
    })
}

/// Estimate the strength of `secret` as a level from 0 (weak) to 5.
///
/// An empty secret scores 0.
pub fn password_level(secret: &str) -> u8 {
    if secret.is_empty() {
        return 0;
    }
    let c = classes();
    let mut score = 0u8;

    let length = secret.chars().count();
    score += match length {
        16.. => 3,
        12..=15 => 2,
        8..=11 => 1,
        _ => 0,
    };

    score += [&c.lower, &c.upper, &c.digit, &c.symbol]
        .iter()
        .filter(|re| re.is_match(secret))
        .count() as u8;

    let all_digits = secret.chars().all(|ch| ch.is_ascii_digit());
    let all_letters = secret.chars().all(char::is_alphabetic);
    if !all_digits && !all_letters {
        score += 1;
    }

    let lowered = secret.to_lowercase();
    if !is_weak_pattern(&lowered) {
        score += 1;
    }

    if !COMMON_WORDS.iter().any(|word| lowered.contains(word)) {
        score += 1;
    }

    (score / 2).min(MAX_LEVEL)
}

fn is_weak_pattern(lowered: &str) -> bool {
    let c = classes();
    if c.long_digits.is_match(lowered) || c.long_letters.is_match(lowered) {
        return true;
    }

    // One character repeated five or more times.
    let mut chars = lowered.chars();
    if let Some(first) = chars.next() {
        if lowered.chars().count() >= 5 && chars.all(|ch| ch == first) {
            return true;
        }
    }

    lowered == WEAK_EXACT || WEAK_PREFIXES.iter().any(|seq| lowered.starts_with(seq))
}
