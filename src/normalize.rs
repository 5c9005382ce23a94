//! Text cleanup applied to every text field before it is written.
//!
//! Pages sometimes arrive with UTF-8 punctuation that was decoded as Windows-1251
//! somewhere upstream ("вЂ™" for a right quote). Those fragments are removed, typographic
//! punctuation is flattened to ASCII, and replacement characters are dropped.

use regex::Regex;
use std::sync::OnceLock;

/// Fixed substitution table, applied in order.
const SUBSTITUTIONS: &[(char, &str)] = &[
    ('\u{2019}', "'"),
    ('\u{2018}', "'"),
    ('\u{201C}', "\""),
    ('\u{201D}', "\""),
    ('\u{2013}', "-"),
    ('\u{2014}', "-"),
    ('\u{2026}', "..."),
    ('\u{2022}', "-"),
    ('\u{00A0}', " "),
];

/// Lead sequence of a mis-decoded multi-byte character plus up to three trailing chars.
fn mojibake() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)вЂ.{0,3}").ok()).as_ref()
}

fn single_pass(text: &str) -> String {
    let stripped = match mojibake() {
        Some(re) => re.replace_all(text, ""),
        None => text.into(),
    };
    let mut out = String::with_capacity(stripped.len());
    for c in stripped.chars() {
        match SUBSTITUTIONS.iter().find(|(from, _)| *from == c) {
            Some((_, to)) => out.push_str(to),
            None if c == char::REPLACEMENT_CHARACTER => {}
            None => out.push(c),
        }
    }
    out
}

/// Clean one text field. Pure, total and idempotent.
///
/// Removing a fragment can join two halves into a new fragment, so passes repeat until
/// the text is stable. Every pass after the first only shrinks the text.
pub fn normalize(text: &str) -> String {
    let mut current = single_pass(text);
    loop {
        let next = single_pass(&current);
        if next == current {
            return current;
        }
        current = next;
    }
}
