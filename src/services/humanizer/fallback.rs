// Local Humanizer
// Deterministic word-level rewrites used whenever the paraphrase model fails or is absent

use rand::Rng;
use regex::Regex;
use std::sync::OnceLock;

use crate::models::RoundProfile;
use crate::services::text_processor::{char_len, word_spans};

const TRAILING_PUNCT: &[char] = &['.', ',', ';', ':', '!', '?', '"', '\'', ')'];
const MIN_FILLER_WORD_CHARS: usize = 5;

fn it_is_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b([Ii])t is\b").expect("it is regex"))
}

fn cannot_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b([Cc])annot\b").expect("cannot regex"))
}

enum Filler {
    Prefix(&'static str),
    Suffix(&'static str),
}

/// Position-indexed filler for word `index`.
fn filler_for(profile: RoundProfile, index: usize) -> Option<Filler> {
    match profile {
        RoundProfile::Conservative if index % 7 == 0 => Some(Filler::Prefix("really")),
        RoundProfile::Conservative if index % 11 == 0 => Some(Filler::Suffix("actually")),
        RoundProfile::Aggressive if index % 6 == 0 => Some(Filler::Prefix("essentially")),
        RoundProfile::Aggressive if index % 9 == 0 => Some(Filler::Suffix("indeed")),
        _ => None,
    }
}

fn substitutions(profile: RoundProfile) -> &'static [(&'static str, &'static str)] {
    match profile {
        RoundProfile::Conservative => &[("will", "may"), ("can", "could potentially")],
        RoundProfile::Aggressive => &[
            ("is", "appears to be"),
            ("was", "had been"),
            ("will", "will likely"),
            ("can", "has the ability to"),
        ],
    }
}

fn ends_sentence(word: &str) -> bool {
    word.trim_end_matches(&['"', '\'', ')'][..])
        .ends_with(&['.', '!', '?'][..])
}

/// Adverbial fillers on long words plus probabilistic phrase substitution.
/// Whitespace between words is copied verbatim so line breaks survive.
pub fn fallback_humanize<R: Rng + ?Sized>(
    text: &str,
    profile: RoundProfile,
    substitution_probability: f64,
    rng: &mut R,
) -> String {
    let spans = word_spans(text);
    let mut out = String::with_capacity(text.len() + text.len() / 4);
    let mut cursor = 0usize;
    // Prefix slot that landed on a sentence opener, carried to the next long word.
    let mut pending_prefix: Option<&'static str> = None;

    for (i, &(start, end)) in spans.iter().enumerate() {
        out.push_str(&text[cursor..start]);
        let word = &text[start..end];
        let sentence_start = i == 0 || ends_sentence(&text[spans[i - 1].0..spans[i - 1].1]);
        let long_word = char_len(word) >= MIN_FILLER_WORD_CHARS;

        let filler = match long_word.then(|| filler_for(profile, i)).flatten() {
            Some(Filler::Prefix(p)) if sentence_start => {
                pending_prefix = Some(p);
                None
            }
            None if long_word && !sentence_start => pending_prefix.take().map(Filler::Prefix),
            other => other,
        };

        match filler {
            Some(Filler::Prefix(filler)) => {
                out.push_str(filler);
                out.push(' ');
                out.push_str(word);
            }
            Some(Filler::Suffix(filler)) => {
                let core = word.trim_end_matches(TRAILING_PUNCT);
                out.push_str(core);
                out.push(' ');
                out.push_str(filler);
                out.push_str(&word[core.len()..]);
            }
            _ => out.push_str(word),
        }
        cursor = end;
    }
    out.push_str(&text[cursor..]);

    let p = substitution_probability.clamp(0.0, 1.0);
    for (from, to) in substitutions(profile) {
        if rng.gen_bool(p) {
            out = out.replace(&format!(" {} ", from), &format!(" {} ", to));
        }
    }
    out
}

/// `it is` → `it's`, `cannot` → `can't`, case of the first letter kept.
pub fn apply_contractions(text: &str) -> String {
    let contracted = it_is_re().replace_all(text, "${1}t's");
    cannot_re().replace_all(&contracted, "${1}an't").into_owned()
}
