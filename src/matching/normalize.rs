// src/matching/normalize.rs - Canonicalization of modality / specialization labels
//
// Patient intake strings and therapist profile strings drift in formatting
// ("Somatic Experiencing®" vs "somatic_experiencing"). Matching runs over a
// stable identifier space produced here.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

static HYPHEN_RUNS: Lazy<Regex> = Lazy::new(|| Regex::new(r"-{2,}").expect("static regex"));

/// Canonicalizes one free-text modality label into a stable identifier.
///
/// Steps: trim, lowercase, NFD-decompose and drop combining marks, fold any
/// dash variant to an ASCII hyphen, collapse whitespace and underscores to
/// hyphens, drop everything outside `[a-z0-9-]`, collapse hyphen runs.
/// Deterministic, pure and idempotent; malformed input normalizes to a
/// possibly empty string rather than erroring.
pub fn normalize_modality(raw: &str) -> String {
    let lowered = raw.trim().to_lowercase();

    let mut folded = String::with_capacity(lowered.len());
    for c in lowered.nfd() {
        if is_combining_mark(c) {
            continue;
        }
        let mapped = match c {
            '\u{2010}' | '\u{2011}' | '\u{2012}' | '\u{2013}' | '\u{2014}' | '\u{2015}'
            | '\u{2212}' => '-',
            c if c.is_whitespace() || c == '_' => '-',
            c => c,
        };
        if mapped == '-' || mapped.is_ascii_lowercase() || mapped.is_ascii_digit() {
            folded.push(mapped);
        }
    }

    let collapsed = HYPHEN_RUNS.replace_all(&folded, "-");
    collapsed.trim_matches('-').to_string()
}

/// Normalizes a collection of labels into a set of identifiers, dropping
/// labels that normalize to nothing.
pub fn normalize_modality_set<I, S>(labels: I) -> HashSet<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    labels
        .into_iter()
        .map(|label| normalize_modality(label.as_ref()))
        .filter(|id| !id.is_empty())
        .collect()
}
