//! Prompt pack builder for deterministic generator input.

use anyhow::Result;
use minijinja::{Environment, context};
use tracing::debug;

use crate::core::context::RetrievedContext;
use crate::core::guidance::Guidance;
use crate::io::parser::SourceFacts;

const MODULE_TEMPLATE: &str = include_str!("prompts/module.md");

/// System prompt shared by every generation request.
pub const SYSTEM_PROMPT: &str = "You are an expert software migration engineer. You translate \
legacy modules faithfully, preserving observable behavior exactly, and you always wrap the \
final code in <code> tags.";

/// A parsed section from rendered template output.
#[derive(Debug, Clone)]
struct ParsedSection {
    /// Section identifier (e.g., "contract", "source").
    key: String,
    /// Whether this section is required (cannot be dropped).
    required: bool,
    /// Full section content including header.
    content: String,
}

/// Parse sections from rendered template output using HTML comment markers.
///
/// Markers follow format: `<!-- section:KEY required|droppable -->`
fn parse_sections(rendered: &str) -> Vec<ParsedSection> {
    use std::sync::LazyLock;
    static SECTION_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
        regex::Regex::new(r"<!--\s*section:(\w+)\s+(required|droppable)\s*-->").unwrap()
    });

    let mut sections = Vec::new();
    let matches: Vec<_> = SECTION_RE.captures_iter(rendered).collect();

    for (i, caps) in matches.iter().enumerate() {
        let key = caps.get(1).unwrap().as_str().to_string();
        let required = caps.get(2).unwrap().as_str() == "required";
        let start = caps.get(0).unwrap().end();
        let end = matches
            .get(i + 1)
            .map(|m| m.get(0).unwrap().start())
            .unwrap_or(rendered.len());

        let content = rendered[start..end].trim().to_string();
        if !content.is_empty() || required {
            sections.push(ParsedSection {
                key,
                required,
                content,
            });
        }
    }

    sections
}

/// Apply budget to parsed sections, dropping droppable sections as needed.
///
/// Drop order: context -> facts -> guidance
fn apply_budget_to_sections(sections: &mut Vec<ParsedSection>, budget: usize) {
    let total_len =
        |secs: &[ParsedSection]| -> usize { secs.iter().map(|s| s.content.len()).sum() };

    if total_len(sections) <= budget {
        return;
    }

    let drop_order = ["context", "facts", "guidance"];
    for key in drop_order {
        if total_len(sections) <= budget {
            break;
        }
        if let Some(idx) = sections.iter().position(|s| s.key == key && !s.required) {
            let dropped_len = sections[idx].content.len();
            debug!(
                section = key,
                bytes_dropped = dropped_len,
                "dropped section for budget"
            );
            sections.remove(idx);
        }
    }

    // If still over budget, truncate the last section
    if total_len(sections) > budget && !sections.is_empty() {
        let other_len: usize = sections
            .iter()
            .take(sections.len() - 1)
            .map(|s| s.content.len())
            .sum();
        let allowed = budget.saturating_sub(other_len);
        let last = sections.last_mut().unwrap();
        let before_len = last.content.len();
        if last.content.len() > allowed {
            if allowed > 12 {
                last.content.truncate(allowed - 12);
                last.content.push_str("\n[truncated]");
            } else {
                last.content.truncate(allowed);
            }
            debug!(
                section = last.key,
                before_len,
                after_len = last.content.len(),
                "truncated section for budget"
            );
        }
    }
}

fn render_sections(sections: &[ParsedSection]) -> String {
    sections
        .iter()
        .map(|s| s.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// All inputs needed to build the initial prompt for one module.
#[derive(Debug, Clone)]
pub struct PromptInputs<'a> {
    pub module_id: &'a str,
    pub source_language: &'a str,
    pub target_language: &'a str,
    /// Original module source.
    pub source: &'a str,
    pub facts: &'a SourceFacts,
    pub context: &'a RetrievedContext,
    pub guidance: &'a Guidance,
}

/// Builds a prompt pack within a byte budget, dropping less critical sections first.
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    budget_bytes: usize,
}

impl PromptBuilder {
    pub fn new(budget_bytes: usize) -> Self {
        Self { budget_bytes }
    }

    /// Build the initial user prompt for a module.
    pub fn build_module_prompt(&self, input: &PromptInputs<'_>) -> Result<String> {
        let mut env = Environment::new();
        env.add_template("module", MODULE_TEMPLATE)
            .expect("module template should be valid");
        let template = env.get_template("module")?;

        let facts_summary = facts_summary(input.facts);
        let rendered = template.render(context! {
            module_id => input.module_id,
            source_language => input.source_language,
            target_language => input.target_language,
            source => input.source,
            facts => (!facts_summary.is_empty()).then_some(facts_summary),
            snippets => (!input.context.snippets.is_empty()).then(|| &input.context.snippets),
            guidance => input.guidance,
        })?;

        let mut sections = parse_sections(&rendered);
        apply_budget_to_sections(&mut sections, self.budget_bytes);
        Ok(render_sections(&sections))
    }
}

/// One-line-per-item summary of structural facts for the prompt.
fn facts_summary(facts: &SourceFacts) -> String {
    let mut lines = Vec::new();
    if !facts.package.is_empty() {
        lines.push(format!("package: {}", facts.package));
    }
    for t in &facts.types {
        let kind = match t.kind {
            crate::io::parser::TypeKind::Class => "class",
            crate::io::parser::TypeKind::Interface => "interface",
            crate::io::parser::TypeKind::Enum => "enum",
        };
        let mut line = format!("type: {} ({kind})", t.name);
        if let Some(supertype) = &t.supertype {
            line.push_str(&format!(" extends {supertype}"));
        }
        if !t.interfaces.is_empty() {
            line.push_str(&format!(" implements {}", t.interfaces.join(", ")));
        }
        lines.push(line);
    }
    for m in &facts.methods {
        lines.push(format!("method: {}({})", m.name, m.parameters.join(", ")));
    }
    for f in &facts.fields {
        lines.push(format!("field: {} {}", f.name, f.type_name));
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::context::{RetrievalMode, RetrievedContext};
    use crate::io::parser::{RegexJavaParser, StructuralParser};
    use crate::test_support::snippet;

    fn inputs<'a>(
        facts: &'a SourceFacts,
        context: &'a RetrievedContext,
        guidance: &'a Guidance,
    ) -> PromptInputs<'a> {
        PromptInputs {
            module_id: "com.acme.Player",
            source_language: "java",
            target_language: "go",
            source: "public class Player {}",
            facts,
            context,
            guidance,
        }
    }

    /// Sections appear in deterministic order: contract, source, facts,
    /// context, guidance.
    #[test]
    fn prompt_ordering_is_stable() {
        let facts = RegexJavaParser.parse("package com.acme;\npublic class Player {}\n");
        let context = RetrievedContext {
            mode: RetrievalMode::Real,
            snippets: vec![snippet("func NewPlayer() {}")],
        };
        let guidance = Guidance::default();

        let prompt = PromptBuilder::new(40_000)
            .build_module_prompt(&inputs(&facts, &context, &guidance))
            .expect("build");

        let contract_pos = prompt.find("### Translation Contract").expect("contract");
        let source_pos = prompt.find("### Module Source").expect("source");
        let facts_pos = prompt.find("### Structural Facts").expect("facts");
        let context_pos = prompt.find("### Reference Code").expect("context");
        let guidance_pos = prompt.find("### Migration Guidance").expect("guidance");

        assert!(contract_pos < source_pos, "contract before source");
        assert!(source_pos < facts_pos, "source before facts");
        assert!(facts_pos < context_pos, "facts before context");
        assert!(context_pos < guidance_pos, "context before guidance");
        assert!(prompt.contains("com.acme.Player"));
    }

    /// With a tight budget the reference context goes first while the module
    /// source always survives.
    #[test]
    fn budget_drops_context_before_source() {
        let facts = RegexJavaParser.parse("package com.acme;\npublic class Player {}\n");
        let context = RetrievedContext {
            mode: RetrievalMode::Real,
            snippets: vec![snippet(&"func Reference() {}\n".repeat(100))],
        };
        let guidance = Guidance::default();

        let prompt = PromptBuilder::new(900)
            .build_module_prompt(&inputs(&facts, &context, &guidance))
            .expect("build");

        assert!(
            !prompt.contains("### Reference Code"),
            "context should be dropped"
        );
        assert!(prompt.contains("### Module Source"), "source should remain");
        assert!(
            prompt.contains("public class Player {}"),
            "module source should remain"
        );
    }

    /// Degraded retrieval renders no context section at all.
    #[test]
    fn degraded_context_renders_without_snippets() {
        let facts = RegexJavaParser.parse("public class Player {}\n");
        let context = RetrievedContext::degraded();
        let guidance = Guidance::default();

        let prompt = PromptBuilder::new(40_000)
            .build_module_prompt(&inputs(&facts, &context, &guidance))
            .expect("build");

        assert!(!prompt.contains("### Reference Code"));
    }
}
