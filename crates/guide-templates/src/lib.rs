//! Frontmatter gating, mustache-style rendering, and instruction composition
//! for guide templates.
//!
//! A template is a plain-text file carrying an optional `---`-fenced YAML
//! frontmatter header. The header can gate the template behind project
//! flags (`requires-<flag>`), declare `includes` for partial composition,
//! and attach an `instruction` describing how the rendered content should be
//! treated by the consuming agent. Non-template files (anything not named
//! `*.mustache`) are still frontmatter-gated but returned verbatim - no
//! substitution runs over their body.
//!
//! - [`frontmatter`] - component A: header parsing and the requires-gate.
//! - [`context`] - the layered variable scope the renderer substitutes against.
//! - [`renderer`] - component B: the mustache-subset engine and partial resolution.
//! - [`composer`] - component C: per-template instruction resolution and combination.
//! - [`flag`] - the flag value type and the read-only resolver trait both
//!   of the above depend on. The flag *store* lives in `guide-workflow`.

mod composer;
mod context;
mod error;
mod flag;
mod frontmatter;
mod renderer;
mod similarity;

pub use composer::{compose, resolve_instruction, ResolvedInstruction};
pub use context::RenderContext;
pub use error::TemplateError;
pub use flag::{EmptyFlags, FlagValue, ResolvedFlags};
pub use frontmatter::{parse_frontmatter, passes_requires_gate, Frontmatter, TemplateContentUnit};
pub use renderer::{
    is_template_name, render, FsTemplateSource, RenderOutcome, RenderedContent, TemplateSource,
    TEMPLATE_SUFFIX,
};
