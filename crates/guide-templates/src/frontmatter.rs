//! Frontmatter parsing and the `requires-<flag>` gate (`spec.md` §4.A).

use std::collections::BTreeMap;

use crate::flag::{FlagValue, ResolvedFlags};
use crate::TemplateError;

const FENCE: &str = "---";

/// A parsed `{frontmatter, header_byte_length, body}` triple.
#[derive(Debug, Clone, Default)]
pub struct TemplateContentUnit {
    pub frontmatter: Frontmatter,
    pub header_byte_length: usize,
    pub body: String,
}

/// Known, typed header. Unknown keys are preserved verbatim in `raw`.
#[derive(Debug, Clone, Default)]
pub struct Frontmatter {
    raw: BTreeMap<String, serde_yaml::Value>,
}

impl Frontmatter {
    pub fn from_map(raw: BTreeMap<String, serde_yaml::Value>) -> Self {
        Self { raw }
    }

    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&serde_yaml::Value> {
        self.raw.get(key)
    }

    /// String accessor, lowercased (`spec.md` §3: "string-lowercased").
    pub fn string(&self, key: &str) -> Option<String> {
        self.raw
            .get(key)
            .and_then(|v| v.as_str())
            .map(|s| s.to_lowercase())
    }

    /// Same as `string`, but preserving original case — used for values that
    /// are displayed or substituted verbatim (e.g. `instruction`).
    pub fn raw_string(&self, key: &str) -> Option<String> {
        self.raw.get(key).and_then(|v| v.as_str()).map(str::to_string)
    }

    pub fn list(&self, key: &str) -> Option<Vec<String>> {
        self.raw.get(key).and_then(|v| v.as_sequence()).map(|seq| {
            seq.iter()
                .filter_map(|item| item.as_str().map(str::to_string))
                .collect()
        })
    }

    pub fn dict(&self, key: &str) -> Option<BTreeMap<String, String>> {
        self.raw.get(key).and_then(|v| v.as_mapping()).map(|map| {
            map.iter()
                .filter_map(|(k, v)| {
                    let k = k.as_str()?.to_string();
                    let v = v.as_str()?.to_string();
                    Some((k, v))
                })
                .collect()
        })
    }

    pub fn bool(&self, key: &str) -> Option<bool> {
        self.raw.get(key).and_then(|v| v.as_bool())
    }

    /// All keys beginning with `requires-`, mapped to the flag name (suffix)
    /// and the required `FlagValue` parsed from the YAML value.
    pub fn requires_directives(&self) -> Vec<(String, FlagValue)> {
        self.raw
            .iter()
            .filter_map(|(k, v)| {
                let flag_name = k.strip_prefix("requires-")?;
                let value: FlagValue = serde_yaml::from_value(v.clone()).ok()?;
                Some((flag_name.to_string(), value))
            })
            .collect()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.raw.keys()
    }
}

/// Strip a leading `---`-fenced YAML header from `text`. Absence of a
/// leading fence yields an empty frontmatter and the full text as body.
pub fn parse_frontmatter(text: &str) -> Result<TemplateContentUnit, TemplateError> {
    let trimmed_start = text.trim_start_matches('\u{feff}');
    let Some(after_open) = trimmed_start.strip_prefix(FENCE) else {
        return Ok(TemplateContentUnit {
            frontmatter: Frontmatter::default(),
            header_byte_length: 0,
            body: text.to_string(),
        });
    };
    // The opening fence must be immediately followed by a newline.
    let Some(after_open) = after_open.strip_prefix('\n').or_else(|| after_open.strip_prefix("\r\n")) else {
        return Ok(TemplateContentUnit {
            frontmatter: Frontmatter::default(),
            header_byte_length: 0,
            body: text.to_string(),
        });
    };

    let Some(close_pos) = find_closing_fence(after_open) else {
        return Ok(TemplateContentUnit {
            frontmatter: Frontmatter::default(),
            header_byte_length: 0,
            body: text.to_string(),
        });
    };

    let header_yaml = &after_open[..close_pos.header_end];
    let body = &after_open[close_pos.body_start..];

    let raw: BTreeMap<String, serde_yaml::Value> = if header_yaml.trim().is_empty() {
        BTreeMap::new()
    } else {
        serde_yaml::from_str(header_yaml)?
    };

    let consumed_prefix_len = text.len() - (trimmed_start.len() - FENCE.len());
    let header_byte_length = consumed_prefix_len + after_open.len() - body.len();

    Ok(TemplateContentUnit {
        frontmatter: Frontmatter::from_map(raw),
        header_byte_length,
        body: body.to_string(),
    })
}

struct ClosingFence {
    header_end: usize,
    body_start: usize,
}

fn find_closing_fence(text: &str) -> Option<ClosingFence> {
    let mut offset = 0usize;
    for line in text.split_inclusive('\n') {
        let trimmed = line.trim_end_matches(['\n', '\r']);
        if trimmed == FENCE {
            let header_end = offset;
            let body_start = offset + line.len();
            return Some(ClosingFence {
                header_end,
                body_start,
            });
        }
        offset += line.len();
    }
    None
}

/// Evaluate every `requires-*` directive against `flags`. A template with no
/// directives always passes.
pub fn passes_requires_gate(frontmatter: &Frontmatter, flags: &dyn ResolvedFlags) -> bool {
    frontmatter
        .requires_directives()
        .into_iter()
        .all(|(name, required)| {
            let actual = flags.get(&name).cloned().unwrap_or(FlagValue::Bool(false));
            actual.satisfies(&required)
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap as Map;

    struct FixedFlags(Map<String, FlagValue>);
    impl ResolvedFlags for FixedFlags {
        fn get(&self, name: &str) -> Option<&FlagValue> {
            self.0.get(name)
        }
        fn all(&self) -> Map<String, FlagValue> {
            self.0.clone()
        }
    }

    #[test]
    fn no_header_yields_empty_frontmatter() {
        let unit = parse_frontmatter("plain body, no header").unwrap();
        assert!(unit.frontmatter.is_empty());
        assert_eq!(unit.header_byte_length, 0);
        assert_eq!(unit.body, "plain body, no header");
    }

    #[test]
    fn header_is_stripped_and_parsed() {
        let text = "---\ntype: agent/instruction\ninstruction: \"Do the thing\"\n---\nBody text\n";
        let unit = parse_frontmatter(text).unwrap();
        assert_eq!(unit.frontmatter.string("type").as_deref(), Some("agent/instruction"));
        assert_eq!(unit.frontmatter.raw_string("instruction").as_deref(), Some("Do the thing"));
        assert_eq!(unit.body, "Body text\n");
    }

    #[test]
    fn requires_gate_scenario_3() {
        let mut flags = Map::new();
        flags.insert(
            "workflow".to_string(),
            FlagValue::List(vec!["discussion".into(), "planning".into()]),
        );
        let resolver = FixedFlags(flags);

        let text_pass = "---\nrequires-workflow: [\"planning\"]\n---\nok\n";
        let unit = parse_frontmatter(text_pass).unwrap();
        assert!(passes_requires_gate(&unit.frontmatter, &resolver));

        let text_fail = "---\nrequires-workflow: [\"deployment\"]\n---\nok\n";
        let unit = parse_frontmatter(text_fail).unwrap();
        assert!(!passes_requires_gate(&unit.frontmatter, &resolver));
    }

    #[test]
    fn requires_gate_missing_flag_fails_closed() {
        let resolver = FixedFlags(Map::new());
        let text = "---\nrequires-allow-client-info: true\n---\nok\n";
        let unit = parse_frontmatter(text).unwrap();
        assert!(!passes_requires_gate(&unit.frontmatter, &resolver));
    }
}
