//! The template renderer (component B): a logic-less mustache-style
//! substitution engine over the layered context, with recursive partial
//! inclusion, requires-gate filtering, and document-root confinement.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};

use crate::context::RenderContext;
use crate::flag::ResolvedFlags;
use crate::frontmatter::{parse_frontmatter, passes_requires_gate, Frontmatter};
use crate::TemplateError;

/// Sentinel suffix that marks a file as "a template".
pub const TEMPLATE_SUFFIX: &str = ".mustache";

pub fn is_template_name(name: &str) -> bool {
    name.ends_with(TEMPLATE_SUFFIX)
}

/// A loader for template and partial text, confined to a document root.
/// This is the narrow interface the renderer consumes from the (external)
/// filesystem layer.
pub trait TemplateSource {
    /// Load the text for `name`, resolved relative to `relative_to` (empty
    /// string for a top-level template). Returns the text plus the logical
    /// directory that should be used as `relative_to` when this template's
    /// own includes are resolved.
    fn load(&self, relative_to: &str, name: &str) -> Result<(String, String), TemplateError>;
}

/// Filesystem-backed `TemplateSource` confined to `root`.
pub struct FsTemplateSource {
    root: PathBuf,
}

impl FsTemplateSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve_confined(&self, relative_to: &str, name: &str) -> Result<PathBuf, TemplateError> {
        let rel = Path::new(name);
        if rel.is_absolute() {
            return Err(TemplateError::PartialAbsolute(name.to_string()));
        }
        let candidate = self.root.join(relative_to).join(rel);
        let normalized = normalize_lexical(&candidate);
        if !normalized.starts_with(&self.root) {
            return Err(TemplateError::PartialEscapesRoot(name.to_string()));
        }
        Ok(normalized)
    }
}

fn normalize_lexical(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            std::path::Component::ParentDir => {
                out.pop();
            }
            std::path::Component::CurDir => {}
            other => out.push(other.as_os_str()),
        }
    }
    out
}

impl TemplateSource for FsTemplateSource {
    fn load(&self, relative_to: &str, name: &str) -> Result<(String, String), TemplateError> {
        let resolved = self.resolve_confined(relative_to, name)?;
        let mut candidates = vec![resolved.clone()];
        if resolved.extension().is_none() {
            let mut with_suffix = resolved.clone();
            with_suffix.set_extension("mustache");
            candidates.push(with_suffix);
        }

        for candidate in candidates {
            match std::fs::read_to_string(&candidate) {
                Ok(text) => {
                    let dir = candidate
                        .strip_prefix(&self.root)
                        .unwrap_or(&candidate)
                        .parent()
                        .map(|p| p.to_string_lossy().to_string())
                        .unwrap_or_default();
                    return Ok((dir, text));
                }
                Err(_) => continue,
            }
        }

        Err(TemplateError::FileRead {
            name: name.to_string(),
            message: "not found under document root".to_string(),
        })
    }
}

/// Output of a successful, non-filtered render (`spec.md` §3 "Rendered content").
#[derive(Debug, Clone)]
pub struct RenderedContent {
    pub template_path: String,
    pub template_name: String,
    pub frontmatter: Frontmatter,
    pub frontmatter_byte_length: usize,
    pub body: String,
    pub body_length: usize,
    /// Frontmatter of every non-filtered partial pulled in transitively, in
    /// include order, parent-first at each level.
    pub partial_frontmatter: Vec<Frontmatter>,
}

pub enum RenderOutcome {
    Content(RenderedContent),
    /// A `requires-*` directive failed; render silently yields no content.
    Filtered,
}

/// Render `name` against `caller_context` and `session_base` (the
/// system/agent/project/category layer assembled by the context cache,
/// component E) and `flags` (the resolved view from component D).
pub fn render(
    source: &dyn TemplateSource,
    name: &str,
    caller_context: Map<String, Value>,
    session_base: Map<String, Value>,
    flags: &dyn ResolvedFlags,
) -> Result<RenderOutcome, TemplateError> {
    let (dir, text) = source.load("", name)?;
    let unit = parse_frontmatter(&text)?;

    if !passes_requires_gate(&unit.frontmatter, flags) {
        tracing::debug!(template = name, "template filtered by requires-gate");
        return Ok(RenderOutcome::Filtered);
    }

    if !is_template_name(name) {
        return Ok(RenderOutcome::Content(RenderedContent {
            template_path: name.to_string(),
            template_name: base_name(name),
            body_length: unit.body.len(),
            frontmatter: unit.frontmatter,
            frontmatter_byte_length: unit.header_byte_length,
            body: unit.body,
            partial_frontmatter: Vec::new(),
        }));
    }

    let flags_layer = flags_to_json(flags);
    let ctx_flags = RenderContext::root(flags_layer);
    let ctx_session = ctx_flags.child(session_base);
    let ctx_caller = ctx_session.child(frontmatter_vars(&unit.frontmatter));
    let ctx_caller = ctx_caller.child(caller_context);

    let includes = unit.frontmatter.list("includes").unwrap_or_default();
    let mut partial_frontmatter = Vec::new();
    let mut visiting = HashSet::new();
    visiting.insert(name.to_string());
    let mut partials = HashMap::new();
    for include_name in &includes {
        let rendered = render_partial(
            source,
            &dir,
            include_name,
            &ctx_caller,
            flags,
            &mut visiting,
            &mut partial_frontmatter,
        )?;
        partials.insert(include_name.clone(), rendered);
    }

    let body = render_mustache(&unit.body, &ctx_caller, &partials, name)?;

    Ok(RenderOutcome::Content(RenderedContent {
        template_path: name.to_string(),
        template_name: base_name(name),
        body_length: body.len(),
        frontmatter: unit.frontmatter,
        frontmatter_byte_length: unit.header_byte_length,
        body,
        partial_frontmatter,
    }))
}

#[allow(clippy::too_many_arguments)]
fn render_partial(
    source: &dyn TemplateSource,
    dir: &str,
    name: &str,
    parent_ctx: &RenderContext,
    flags: &dyn ResolvedFlags,
    visiting: &mut HashSet<String>,
    partial_frontmatter: &mut Vec<Frontmatter>,
) -> Result<String, TemplateError> {
    if !visiting.insert(name.to_string()) {
        return Err(TemplateError::CyclicInclude(name.to_string()));
    }

    let (child_dir, text) = source.load(dir, name)?;
    let unit = parse_frontmatter(&text)?;

    if !passes_requires_gate(&unit.frontmatter, flags) {
        tracing::debug!(partial = name, "partial filtered by requires-gate");
        visiting.remove(name);
        return Ok(String::new());
    }

    let child_ctx = parent_ctx.child(frontmatter_vars(&unit.frontmatter));

    let nested_includes = unit.frontmatter.list("includes").unwrap_or_default();
    let mut nested_partials = HashMap::new();
    for nested_name in &nested_includes {
        let rendered = render_partial(
            source,
            &child_dir,
            nested_name,
            &child_ctx,
            flags,
            visiting,
            partial_frontmatter,
        )?;
        nested_partials.insert(nested_name.clone(), rendered);
    }

    let rendered_body = render_mustache(&unit.body, &child_ctx, &nested_partials, name)?;
    partial_frontmatter.push(unit.frontmatter);
    visiting.remove(name);
    Ok(rendered_body)
}

fn base_name(path: &str) -> String {
    path.rsplit('/').next().unwrap_or(path).to_string()
}

fn frontmatter_vars(frontmatter: &Frontmatter) -> Map<String, Value> {
    let mut map = Map::new();
    for key in frontmatter.keys() {
        if key == "includes" || key.starts_with("requires-") {
            continue;
        }
        if let Some(value) = frontmatter.get(key) {
            if let Ok(json_value) = serde_json::to_value(value) {
                map.insert(key.clone(), json_value);
            }
        }
    }
    map
}

fn flags_to_json(flags: &dyn ResolvedFlags) -> Map<String, Value> {
    let mut map = Map::new();
    for (name, value) in flags.all() {
        if let Ok(json_value) = serde_json::to_value(value) {
            map.insert(name, json_value);
        }
    }
    map
}

fn value_to_string(value: Option<Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s,
        Some(Value::Bool(b)) => b.to_string(),
        Some(Value::Number(n)) => n.to_string(),
        Some(other) => other.to_string(),
    }
}

/// Render `{{var}}`, `{{{var}}}`, `{{#sec}}..{{/sec}}`, `{{^sec}}..{{/sec}}`,
/// `{{>partial}}`, and `{{! comment }}` against `ctx`, resolving partials
/// from the pre-rendered `partials` map.
fn render_mustache(
    template: &str,
    ctx: &RenderContext,
    partials: &HashMap<String, String>,
    template_name: &str,
) -> Result<String, TemplateError> {
    let mut out = String::new();
    let mut rest = template;

    loop {
        let Some(open_idx) = rest.find("{{") else {
            out.push_str(rest);
            break;
        };
        out.push_str(&rest[..open_idx]);
        let after_open = &rest[open_idx + 2..];
        let Some(close_rel) = after_open.find("}}") else {
            return Err(TemplateError::Render {
                template: template_name.to_string(),
                message: "unterminated '{{' tag".to_string(),
            });
        };
        let tag_raw = &after_open[..close_rel];
        let after_tag = &after_open[close_rel + 2..];

        if tag_raw.starts_with('!') {
            rest = after_tag;
            continue;
        }

        if let Some(name) = tag_raw.strip_prefix('#') {
            let name = name.trim();
            let (block, remainder) = split_on_matching_close(after_tag, name, template_name)?;
            for child_ctx in ctx.section_contexts(name) {
                out.push_str(&render_mustache(block, &child_ctx, partials, template_name)?);
            }
            rest = remainder;
            continue;
        }

        if let Some(name) = tag_raw.strip_prefix('^') {
            let name = name.trim();
            let (block, remainder) = split_on_matching_close(after_tag, name, template_name)?;
            if !ctx.is_truthy(name) {
                out.push_str(&render_mustache(block, ctx, partials, template_name)?);
            }
            rest = remainder;
            continue;
        }

        if let Some(name) = tag_raw.strip_prefix('>') {
            let name = name.trim();
            out.push_str(partials.get(name).map(String::as_str).unwrap_or(""));
            rest = after_tag;
            continue;
        }

        if let Some(stripped) = tag_raw.strip_prefix('{') {
            let name = stripped.strip_suffix('}').unwrap_or(stripped).trim();
            let after_tag = after_tag.strip_prefix('}').unwrap_or(after_tag);
            out.push_str(&value_to_string(ctx.lookup(name)));
            rest = after_tag;
            continue;
        }

        let name = tag_raw.trim();
        out.push_str(&value_to_string(ctx.lookup(name)));
        rest = after_tag;
    }

    Ok(out)
}

/// Find the `{{/name}}` matching the section opened just before `s`,
/// accounting for nested sections of the same name.
fn split_on_matching_close<'a>(
    s: &'a str,
    name: &str,
    template_name: &str,
) -> Result<(&'a str, &'a str), TemplateError> {
    let open_hash = format!("{{{{#{}}}}}", name);
    let open_caret = format!("{{{{^{}}}}}", name);
    let close = format!("{{{{/{}}}}}", name);

    let mut depth = 1i32;
    let mut pos = 0usize;

    loop {
        let window = &s[pos..];
        let candidates = [
            window.find(&open_hash).map(|i| (i, 1i32)),
            window.find(&open_caret).map(|i| (i, 1i32)),
            window.find(&close).map(|i| (i, -1i32)),
        ];
        let best = candidates.into_iter().flatten().min_by_key(|(i, _)| *i);

        match best {
            None => {
                return Err(TemplateError::Render {
                    template: template_name.to_string(),
                    message: format!("unterminated section '{}'", name),
                })
            }
            Some((idx, delta)) => {
                let abs = pos + idx;
                if delta > 0 {
                    depth += 1;
                    pos = abs + open_hash.len();
                } else {
                    depth -= 1;
                    if depth == 0 {
                        return Ok((&s[..abs], &s[abs + close.len()..]));
                    }
                    pos = abs + close.len();
                }
            }
        }
    }
}
