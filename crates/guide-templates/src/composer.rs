//! Instruction composition (`spec.md` §4.C): per-template instruction
//! resolution, importance override, and concatenate-then-fuzzy-dedupe
//! combination across a template and its resolved partials.

use crate::frontmatter::Frontmatter;
use crate::similarity;

const DEFAULT_TYPE: &str = "agent/instruction";
const DEDUP_THRESHOLD: f64 = 0.85;

/// One template's resolved instruction: `text` is `None` for a lone `^`
/// marker (important, but carrying no instruction text of its own).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedInstruction {
    pub text: Option<String>,
    pub important: bool,
}

fn default_instruction_for_type(type_name: &str) -> &'static str {
    match type_name {
        "user/information" => "Display this information.",
        "agent/information" => "This is for your reference; do not display.",
        "agent/requirements" => "Adhere to these requirements; do not display.",
        _ => "Follow these instructions; do not display.",
    }
}

/// Strip a leading `^` importance marker. A bare `^` is important with no
/// text; `^` followed by whitespace strips the marker and leading
/// whitespace, keeping the remainder (possibly empty, which again yields no
/// text). Anything else is returned unchanged and not important.
fn parse_importance(s: &str) -> (bool, Option<String>) {
    let Some(rest) = s.strip_prefix('^') else {
        return (false, Some(s.to_string()));
    };
    if rest.is_empty() {
        return (true, None);
    }
    if rest.starts_with(char::is_whitespace) {
        let remainder = rest.trim_start();
        return (true, if remainder.is_empty() { None } else { Some(remainder.to_string()) });
    }
    (false, Some(s.to_string()))
}

/// Resolve a single template's instruction, per `spec.md` §4.C steps 1-5.
/// `None` means the template contributes nothing to composition at all.
pub fn resolve_instruction(frontmatter: &Frontmatter) -> Option<ResolvedInstruction> {
    let has_type = frontmatter.get("type").is_some();
    let instruction_value = frontmatter.get("instruction");

    if instruction_value.is_none() && !has_type {
        return None;
    }

    let type_name = frontmatter.string("type").unwrap_or_else(|| DEFAULT_TYPE.to_string());
    let default_text = default_instruction_for_type(&type_name);

    // `as_str` is `None` both when `instruction` is absent and when it's
    // present as a non-string value - both fall back to the type default.
    let explicit = instruction_value.and_then(|v| v.as_str()).map(str::to_string);

    match explicit {
        Some(s) => {
            let (important, text) = parse_importance(&s);
            Some(ResolvedInstruction { text, important })
        }
        None => Some(ResolvedInstruction {
            text: Some(default_text.to_string()),
            important: false,
        }),
    }
}

/// Combine a template's own instruction with its resolved partials', parent
/// first then partials in include order.
pub fn compose(own: &Frontmatter, partials: &[Frontmatter]) -> Option<String> {
    let mut resolved: Vec<ResolvedInstruction> = Vec::new();
    if let Some(r) = resolve_instruction(own) {
        resolved.push(r);
    }
    for p in partials {
        if let Some(r) = resolve_instruction(p) {
            resolved.push(r);
        }
    }

    if let Some(important) = resolved.iter().find(|r| r.important) {
        return important.text.clone();
    }

    let texts: Vec<String> = resolved.into_iter().filter_map(|r| r.text).collect();
    if texts.is_empty() {
        return None;
    }

    let joined = texts.join(" ");
    let deduped = dedupe_sentences(split_sentences(&joined));
    if deduped.is_empty() {
        None
    } else {
        Some(deduped.join("\n"))
    }
}

/// Split `text` on sentence-terminal punctuation, treating `e.g.`, `i.e.`,
/// and `etc.` as non-terminal.
fn split_sentences(text: &str) -> Vec<String> {
    let protected = protect_abbreviations(text);
    let chars: Vec<char> = protected.chars().collect();
    let mut sentences = Vec::new();
    let mut current = String::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        current.push(c);
        if matches!(c, '.' | '!' | '?') {
            let mut j = i + 1;
            while j < chars.len() && matches!(chars[j], '.' | '!' | '?') {
                current.push(chars[j]);
                j += 1;
            }
            i = j;
            push_sentence(&mut sentences, &current);
            current.clear();
            continue;
        }
        i += 1;
    }
    push_sentence(&mut sentences, &current);

    sentences
}

fn push_sentence(sentences: &mut Vec<String>, raw: &str) {
    let trimmed = raw.trim();
    if !trimmed.is_empty() {
        sentences.push(restore_abbreviations(trimmed));
    }
}

const ABBREVIATIONS: [(&str, &str); 5] = [
    ("e.g.", "e\u{0}g\u{0}"),
    ("E.g.", "E\u{0}g\u{0}"),
    ("i.e.", "i\u{0}e\u{0}"),
    ("I.e.", "I\u{0}e\u{0}"),
    ("etc.", "etc\u{0}"),
];

fn protect_abbreviations(text: &str) -> String {
    let mut out = text.to_string();
    for (from, to) in ABBREVIATIONS {
        out = out.replace(from, to);
    }
    out
}

fn restore_abbreviations(text: &str) -> String {
    text.replace('\u{0}', ".")
}

/// Remove any sentence whose lowercase-trimmed form is >= the similarity
/// threshold to an earlier kept sentence.
fn dedupe_sentences(sentences: Vec<String>) -> Vec<String> {
    let mut kept: Vec<String> = Vec::new();
    let mut kept_normalized: Vec<String> = Vec::new();

    for sentence in sentences {
        let normalized = sentence.trim().to_lowercase();
        let is_duplicate = kept_normalized
            .iter()
            .any(|k| similarity::ratio(&normalized, k) >= DEDUP_THRESHOLD);
        if !is_duplicate {
            kept_normalized.push(normalized);
            kept.push(sentence);
        }
    }

    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn frontmatter_with(pairs: &[(&str, &str)]) -> Frontmatter {
        let raw: BTreeMap<String, serde_yaml::Value> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), serde_yaml::Value::String(v.to_string())))
            .collect();
        Frontmatter::from_map(raw)
    }

    #[test]
    fn no_instruction_and_no_type_yields_nothing() {
        let fm = Frontmatter::default();
        assert_eq!(resolve_instruction(&fm), None);
    }

    #[test]
    fn type_only_falls_back_to_default_table() {
        let fm = frontmatter_with(&[("type", "agent/requirements")]);
        let resolved = resolve_instruction(&fm).unwrap();
        assert_eq!(resolved.text.as_deref(), Some("Adhere to these requirements; do not display."));
        assert!(!resolved.important);
    }

    #[test]
    fn caret_prefix_marks_important_and_strips_marker() {
        let fm = frontmatter_with(&[("instruction", "^ Stop and confirm with the user.")]);
        let resolved = resolve_instruction(&fm).unwrap();
        assert!(resolved.important);
        assert_eq!(resolved.text.as_deref(), Some("Stop and confirm with the user."));
    }

    #[test]
    fn bare_caret_is_important_with_no_text() {
        let fm = frontmatter_with(&[("instruction", "^")]);
        let resolved = resolve_instruction(&fm).unwrap();
        assert!(resolved.important);
        assert_eq!(resolved.text, None);
    }

    #[test]
    fn compose_with_no_partials_returns_parent_text() {
        let parent = frontmatter_with(&[("instruction", "Follow the house style.")]);
        assert_eq!(compose(&parent, &[]).as_deref(), Some("Follow the house style."));
    }

    #[test]
    fn important_child_overrides_parent_scenario_2() {
        let parent = frontmatter_with(&[("instruction", "Generic parent guidance.")]);
        let child = frontmatter_with(&[("instruction", "^ Use the emergency procedure.")]);
        assert_eq!(compose(&parent, &[child]).as_deref(), Some("Use the emergency procedure."));
    }

    #[test]
    fn fuzzy_dedup_collapses_near_duplicate_sentences_scenario_6() {
        let parent = frontmatter_with(&[("instruction", "Display this error as-is to the user.")]);
        let child = frontmatter_with(&[("instruction", "display this error as-is to the user!")]);
        let composed = compose(&parent, &[child]).unwrap();
        assert_eq!(composed.lines().count(), 1);
    }

    #[test]
    fn abbreviation_periods_do_not_split_sentences() {
        let sentences = split_sentences("Use common formats, e.g. JSON or YAML. Then proceed.");
        assert_eq!(sentences, vec![
            "Use common formats, e.g. JSON or YAML.".to_string(),
            "Then proceed.".to_string(),
        ]);
    }

    #[test]
    fn distinct_sentences_are_both_kept() {
        let parent = frontmatter_with(&[("instruction", "First distinct point.")]);
        let child = frontmatter_with(&[("instruction", "Second, unrelated point.")]);
        let composed = compose(&parent, &[child]).unwrap();
        assert_eq!(composed.lines().count(), 2);
    }
}
