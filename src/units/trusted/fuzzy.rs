//! Fuzzy matching against a closed vocabulary.
//!
//! The scorer is a weighted ratio over normalized Indel similarity: plain
//! ratio, best-window partial ratio, and token sort/set ratios, blended by
//! the length ratio of the two strings. Scores are in `0..=100`.

use std::collections::BTreeSet;

use crate::domain::Value;

/// Longest common subsequence length
fn lcs_len(a: &[char], b: &[char]) -> usize {
    if a.is_empty() || b.is_empty() {
        return 0;
    }
    let mut prev = vec![0usize; b.len() + 1];
    let mut curr = vec![0usize; b.len() + 1];
    for &ca in a {
        for (j, &cb) in b.iter().enumerate() {
            curr[j + 1] = if ca == cb {
                prev[j] + 1
            } else {
                prev[j + 1].max(curr[j])
            };
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

fn ratio_chars(a: &[char], b: &[char]) -> f64 {
    let total = a.len() + b.len();
    if total == 0 {
        return 100.0;
    }
    100.0 * (2 * lcs_len(a, b)) as f64 / total as f64
}

/// Normalized Indel similarity
pub fn ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    ratio_chars(&a, &b)
}

/// Best ratio of the shorter string against the windows of the longer one.
///
/// Besides every full-length window, the prefixes and suffixes of the longer
/// string that are shorter than the needle are scored, so a match hanging
/// off either edge still counts.
pub fn partial_ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let (short, long) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    if short.is_empty() {
        return if long.is_empty() { 100.0 } else { 0.0 };
    }

    let n = short.len();
    let m = long.len();
    let windows = (1..n)
        .map(|end| &long[..end])
        .chain((0..=m - n).map(|start| &long[start..start + n]))
        .chain((m - n + 1..m).map(|start| &long[start..]));

    let mut best = 0.0f64;
    for window in windows {
        best = best.max(ratio_chars(&short, window));
        if best >= 100.0 {
            break;
        }
    }
    best
}

fn sorted_tokens(s: &str) -> String {
    let mut tokens: Vec<&str> = s.split_whitespace().collect();
    tokens.sort_unstable();
    tokens.join(" ")
}

/// Ratio after sorting whitespace tokens
pub fn token_sort_ratio(a: &str, b: &str) -> f64 {
    ratio(&sorted_tokens(a), &sorted_tokens(b))
}

/// Ratio over the shared token set and each side's remainder
pub fn token_set_ratio(a: &str, b: &str) -> f64 {
    let ta: BTreeSet<&str> = a.split_whitespace().collect();
    let tb: BTreeSet<&str> = b.split_whitespace().collect();
    if ta.is_empty() || tb.is_empty() {
        return 0.0;
    }

    let common: Vec<&str> = ta.intersection(&tb).copied().collect();
    let only_a: Vec<&str> = ta.difference(&tb).copied().collect();
    let only_b: Vec<&str> = tb.difference(&ta).copied().collect();

    // One token set contains the other
    if !common.is_empty() && (only_a.is_empty() || only_b.is_empty()) {
        return 100.0;
    }

    let sect = common.join(" ");
    let join = |rest: &[&str]| {
        if sect.is_empty() {
            rest.join(" ")
        } else {
            format!("{} {}", sect, rest.join(" "))
        }
    };
    let combined_a = join(&only_a);
    let combined_b = join(&only_b);

    ratio(&sect, &combined_a)
        .max(ratio(&sect, &combined_b))
        .max(ratio(&combined_a, &combined_b))
}

/// Partial ratio over sorted tokens; a shared token is a perfect match
pub fn partial_token_ratio(a: &str, b: &str) -> f64 {
    let ta: BTreeSet<&str> = a.split_whitespace().collect();
    let tb: BTreeSet<&str> = b.split_whitespace().collect();
    if ta.is_empty() || tb.is_empty() {
        return 0.0;
    }
    if ta.intersection(&tb).next().is_some() {
        return 100.0;
    }

    let sorted = partial_ratio(&sorted_tokens(a), &sorted_tokens(b));
    let deduped = partial_ratio(
        &ta.iter().copied().collect::<Vec<_>>().join(" "),
        &tb.iter().copied().collect::<Vec<_>>().join(" "),
    );
    sorted.max(deduped)
}

/// Weighted blend of the ratios above
pub fn weighted_ratio(a: &str, b: &str) -> f64 {
    const UNBASE_SCALE: f64 = 0.95;

    let len_a = a.chars().count();
    let len_b = b.chars().count();
    if len_a == 0 || len_b == 0 {
        return 0.0;
    }

    let len_ratio = len_a.max(len_b) as f64 / len_a.min(len_b) as f64;
    let base = ratio(a, b);

    if len_ratio < 1.5 {
        let token = token_sort_ratio(a, b).max(token_set_ratio(a, b));
        return base.max(token * UNBASE_SCALE);
    }

    let partial_scale = if len_ratio < 8.0 { 0.9 } else { 0.6 };
    let partial = partial_ratio(a, b) * partial_scale;
    let partial_token = partial_token_ratio(a, b) * UNBASE_SCALE * partial_scale;

    base.max(partial).max(partial_token)
}

/// Lower-case and trim for comparison
pub fn normalize(s: &str) -> String {
    s.trim().to_lowercase()
}

/// A closed reference vocabulary with precomputed normalized entries
pub struct Vocabulary {
    entries: &'static [&'static str],
    normalized: Vec<String>,
}

impl Vocabulary {
    pub fn new(entries: &'static [&'static str]) -> Self {
        Self {
            entries,
            normalized: entries.iter().map(|e| normalize(e)).collect(),
        }
    }

    /// Best entry scoring at least `cutoff`.
    ///
    /// Highest score wins; equal scores go to the earlier entry.
    pub fn best_match(&self, value: &str, cutoff: f64) -> Option<(&'static str, f64)> {
        let query = normalize(value);
        let mut best: Option<(usize, f64)> = None;
        for (i, candidate) in self.normalized.iter().enumerate() {
            let score = weighted_ratio(&query, candidate);
            if score < cutoff {
                continue;
            }
            match best {
                Some((_, top)) if score <= top => {}
                _ => best = Some((i, score)),
            }
        }
        best.map(|(i, score)| (self.entries[i], score))
    }

    /// Map a cell onto the vocabulary, or onto `fallback` below the cutoff.
    ///
    /// Missing cells stay missing.
    pub fn correct(&self, value: &Value, cutoff: f64, fallback: &str) -> Value {
        if value.is_null() {
            return Value::Null;
        }
        let text = value.to_string();
        match self.best_match(&text, cutoff) {
            Some((entry, _)) => Value::Text(entry.to_string()),
            None => Value::Text(fallback.to_string()),
        }
    }
}
