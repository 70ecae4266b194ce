// Writing Quirks
// Rhythm variation, em-dashes, asides, rhetorical questions, typos and keyword reinsertion

use rand::Rng;

use crate::models::RoundProfile;
use crate::services::config_store::HumanizerConfig;
use crate::services::text_processor::{contains_ci, word_spans};

const PARENTHETICAL: &str = " (which is worth noting)";
const RHETORICAL_QUESTION: &str = " Isn't that interesting?";
const TYPO_MIN_WORD_CHARS: usize = 5;
const TRANSPOSITION_PROBABILITY: f64 = 0.4;

/// Sentence openers that may be lowercased after an inserted "In fact,".
const LOWERCASE_OPENERS: &[&str] = &[
    "The", "A", "An", "This", "That", "These", "Those", "It", "Its", "There", "They", "We",
    "Many", "Most", "Some", "Each", "Every", "Our", "Such",
];

pub(crate) fn chance<R: Rng + ?Sized>(rng: &mut R, probability: f64) -> bool {
    rng.gen_bool(probability.clamp(0.0, 1.0))
}

// ============ Rhythm ============

/// Turn the first sentence break into `!` (or `?` in aggressive rounds) and add a short
/// interjection at the next one.
pub fn vary_rhythm(paragraph: &str, profile: RoundProfile) -> String {
    let Some(first) = paragraph.find(". ") else {
        return paragraph.to_string();
    };

    let swap = if profile.is_aggressive() { "? " } else { "! " };
    let mut out = String::with_capacity(paragraph.len() + 16);
    out.push_str(&paragraph[..first]);
    out.push_str(swap);

    let rest = &paragraph[first + 2..];
    let Some(second) = rest.find(". ") else {
        out.push_str(rest);
        return out;
    };

    out.push_str(&rest[..second]);
    let tail = &rest[second + 2..];
    if profile.is_aggressive() {
        out.push_str(". In fact, ");
        out.push_str(&lowercase_opener(tail));
    } else {
        out.push_str(". Really. ");
        out.push_str(tail);
    }
    out
}

fn lowercase_opener(text: &str) -> String {
    let word_end = text.find(char::is_whitespace).unwrap_or(text.len());
    let first = &text[..word_end];
    if LOWERCASE_OPENERS.contains(&first) {
        format!("{}{}", first.to_lowercase(), &text[word_end..])
    } else {
        text.to_string()
    }
}

// ============ Quirks ============

/// Em-dash for the first comma, a parenthetical aside inside a middle sentence, and a trailing
/// rhetorical question, each drawn independently.
pub fn add_quirks<R: Rng + ?Sized>(text: &str, config: &HumanizerConfig, rng: &mut R) -> String {
    let mut text = text.to_string();

    if chance(rng, config.em_dash_probability) {
        text = text.replacen(", ", " \u{2014} ", 1);
    }

    if chance(rng, config.parenthetical_probability) {
        let mut sentences: Vec<String> = text.split(". ").map(str::to_string).collect();
        if sentences.len() > 3 {
            let index = rng.gen_range(1..=sentences.len() - 2);
            sentences[index].push_str(PARENTHETICAL);
            text = sentences.join(". ");
        }
    }

    if chance(rng, config.rhetorical_question_probability) && !text.trim_end().ends_with('?') {
        text.push_str(RHETORICAL_QUESTION);
    }

    text
}

// ============ Typos ============

fn typo_variant<R: Rng + ?Sized>(word: &str, rng: &mut R) -> Option<String> {
    let mut chars: Vec<char> = word.chars().collect();
    if chars.len() < TYPO_MIN_WORD_CHARS {
        return None;
    }
    if chance(rng, TRANSPOSITION_PROBABILITY) {
        let i = rng.gen_range(1..=chars.len() - 2);
        chars.swap(i, i + 1);
    } else {
        let i = rng.gen_range(1..chars.len());
        chars.insert(i, chars[i]);
    }
    Some(chars.into_iter().collect())
}

/// One or two typos (transposition or doubling) on words of five or more characters, never in the
/// first or last `edge_words` words nor inside `protected` byte ranges. A typo that would make a
/// present keyword disappear is dropped.
pub fn introduce_typos<R: Rng + ?Sized>(
    text: &str,
    keywords: &[String],
    edge_words: usize,
    protected: &[(usize, usize)],
    rng: &mut R,
) -> String {
    let spans = word_spans(text);
    if spans.len() <= edge_words * 2 {
        return text.to_string();
    }

    let mut current = text.to_string();
    let typo_count = rng.gen_range(1..=2);

    for _ in 0..typo_count {
        let spans = word_spans(&current);
        if spans.len() <= edge_words * 2 {
            break;
        }
        let idx = rng.gen_range(edge_words..spans.len() - edge_words);
        let (start, end) = spans[idx];
        if protected.iter().any(|&(ps, pe)| start < pe && end > ps) {
            continue;
        }
        let Some(variant) = typo_variant(&current[start..end], rng) else {
            continue;
        };

        let candidate = format!("{}{}{}", &current[..start], variant, &current[end..]);
        let breaks_keyword = keywords
            .iter()
            .any(|k| contains_ci(&current, k) && !contains_ci(&candidate, k));
        if !breaks_keyword {
            current = candidate;
        }
    }

    current
}

// ============ Keywords ============

/// Append a short sentence for every keyword present in `original` but missing from `rewritten`.
pub fn reinsert_keywords(original: &str, rewritten: &str, keywords: &[String]) -> String {
    let mut out = rewritten.to_string();
    for keyword in keywords.iter().map(|k| k.trim()).filter(|k| !k.is_empty()) {
        if !contains_ci(original, keyword) || contains_ci(&out, keyword) {
            continue;
        }
        let trimmed_len = out.trim_end().len();
        out.truncate(trimmed_len);
        if !out.is_empty() && !out.ends_with(&['.', '!', '?'][..]) {
            out.push('.');
        }
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(&format!("This also concerns {}.", keyword));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_vary_rhythm_conservative() {
        let out = vary_rhythm("One fact. Two facts. Three facts. Four.", RoundProfile::Conservative);
        assert_eq!(out, "One fact! Two facts. Really. Three facts. Four.");
    }

    #[test]
    fn test_vary_rhythm_aggressive_lowercases_opener() {
        let out = vary_rhythm("One fact. Two facts. The third. Four.", RoundProfile::Aggressive);
        assert_eq!(out, "One fact? Two facts. In fact, the third. Four.");

        let out = vary_rhythm("One fact. Two facts. Karachi grew.", RoundProfile::Aggressive);
        assert!(out.ends_with("In fact, Karachi grew."));
    }

    #[test]
    fn test_vary_rhythm_without_breaks() {
        assert_eq!(vary_rhythm("No breaks here", RoundProfile::Conservative), "No breaks here");
    }

    #[test]
    fn test_quirks_with_certain_probabilities() {
        let config = HumanizerConfig {
            em_dash_probability: 1.0,
            parenthetical_probability: 1.0,
            rhetorical_question_probability: 1.0,
            ..HumanizerConfig::default()
        };
        let mut rng = StdRng::seed_from_u64(5);
        let text = "First, a claim. Second point. Third point. Fourth point. Fifth.";
        let out = add_quirks(text, &config, &mut rng);
        assert!(out.starts_with("First \u{2014} a claim."));
        assert!(out.contains(PARENTHETICAL));
        assert!(out.ends_with(RHETORICAL_QUESTION));
    }

    #[test]
    fn test_quirks_disabled_leave_text() {
        let config = HumanizerConfig {
            em_dash_probability: 0.0,
            parenthetical_probability: 0.0,
            rhetorical_question_probability: 0.0,
            ..HumanizerConfig::default()
        };
        let mut rng = StdRng::seed_from_u64(5);
        assert_eq!(add_quirks("Plain, text.", &config, &mut rng), "Plain, text.");
    }

    #[test]
    fn test_typos_respect_edges_and_keywords() {
        let words: Vec<String> = (0..30).map(|i| format!("Karachi{:02}", i)).collect();
        let text = words.join(" ");
        let keywords: Vec<String> = words.clone();
        for seed in 0..20 {
            let mut rng = StdRng::seed_from_u64(seed);
            let out = introduce_typos(&text, &keywords, 10, &[], &mut rng);
            for k in &keywords {
                assert!(out.contains(k.as_str()), "{} broken with seed {}", k, seed);
            }
        }

        for seed in 0..20 {
            let mut rng = StdRng::seed_from_u64(seed);
            let out = introduce_typos(&text, &[], 10, &[], &mut rng);
            let out_words: Vec<&str> = out.split(' ').collect();
            assert_eq!(&out_words[..10], &words.iter().map(String::as_str).collect::<Vec<_>>()[..10]);
            assert_eq!(out_words.len(), 30);
        }
    }

    #[test]
    fn test_typos_skip_short_documents_and_protected_ranges() {
        let mut rng = StdRng::seed_from_u64(2);
        assert_eq!(introduce_typos("only a few words", &[], 10, &[], &mut rng), "only a few words");

        let text = (0..30).map(|_| "harbour").collect::<Vec<_>>().join(" ");
        let out = introduce_typos(&text, &[], 10, &[(0, text.len())], &mut rng);
        assert_eq!(out, text);
    }

    #[test]
    fn test_reinsert_keywords() {
        let kw = vec!["Karachi".to_string(), "absent".to_string()];
        let out = reinsert_keywords("Karachi is big", "The city is big", &kw);
        assert_eq!(out, "The city is big. This also concerns Karachi.");

        let out = reinsert_keywords("Karachi is big", "KARACHI is big.", &kw);
        assert_eq!(out, "KARACHI is big.");
    }
}
