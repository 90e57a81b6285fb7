//! Output Parsing
//!
//! Turns raw model text into typed steps. Two grammars live here:
//!
//! - the ReAct grammar (`Action:` / `Action Input:` / `Final Answer:`), and
//! - the ReWOO planner grammar (`#Plan<N>: ...` followed by `#E<N>: Tool[input]`).
//!
//! Everything in this module is pure: same text in, same value out.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::{AgentError, Result};
use crate::output::{AgentAction, AgentFinish, AgentStep};

/// Marker that ends a ReAct run
pub const FINAL_ANSWER: &str = "Final Answer:";

/// Stop sequence for every ReAct generation
pub const OBSERVATION: &str = "Observation:";

/// Placeholder value for evidence lines whose id is malformed
pub const MALFORMED_EVIDENCE: &str = "No evidence found";

const PLAN_PREFIX: &str = "#Plan";
const EVIDENCE_PREFIX: &str = "#E";

static ACTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)Action\s*\d*\s*:\s*(.*?)\s*Action\s*\d*\s*Input\s*\d*\s*:\s*(.*)")
        .expect("action pattern is valid")
});

static EVIDENCE_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^#E\d+$").expect("evidence id pattern is valid"));

/// Matches evidence references inside a tool input
pub static EVIDENCE_REF_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"#E\d+").expect("evidence reference pattern is valid"));

// ============================================================================
// ReAct grammar
// ============================================================================

/// Which steps the parser may produce
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ParseMode {
    /// Actions and final answers
    #[default]
    React,
    /// Only final answers; action blocks are treated as plain text
    FinishOnly,
}

/// Parser for single-step model output
#[derive(Clone, Copy, Debug, Default)]
pub struct OutputParser {
    pub mode: ParseMode,
    /// Fail on unmatched text instead of treating it as the answer
    pub strict: bool,
}

impl OutputParser {
    pub fn new(mode: ParseMode, strict: bool) -> Self {
        Self { mode, strict }
    }

    pub fn parse(&self, text: &str) -> Result<AgentStep> {
        let final_answer = text.rfind(FINAL_ANSWER).map(|idx| &text[idx + FINAL_ANSWER.len()..]);

        let action = match self.mode {
            ParseMode::React => ACTION_RE.captures(text),
            ParseMode::FinishOnly => None,
        };

        match (action, final_answer) {
            (Some(_), Some(_)) => Err(AgentError::AmbiguousOutput(text.to_string())),
            (Some(caps), None) => {
                let tool = caps.get(1).map_or("", |m| m.as_str()).trim();
                let raw_input = caps.get(2).map_or("", |m| m.as_str()).trim();
                Ok(AgentStep::Action(AgentAction::new(
                    tool,
                    clean_tool_input(raw_input),
                    text,
                )))
            }
            (None, Some(answer)) => Ok(AgentStep::Finish(AgentFinish::with_output(answer.trim(), text))),
            (None, None) if self.strict => Err(AgentError::UnparsableOutput(text.to_string())),
            (None, None) => Ok(AgentStep::Finish(AgentFinish::with_output(text, text))),
        }
    }
}

/// Strip wrapping double quotes, except from SQL where they are literals
fn clean_tool_input(input: &str) -> &str {
    if input.starts_with("SELECT ") {
        input
    } else {
        input.trim_matches('"')
    }
}

/// Parse ReAct output with the default (non-strict) parser
pub fn parse(text: &str) -> Result<AgentStep> {
    OutputParser::default().parse(text)
}

// ============================================================================
// ReWOO planner grammar
// ============================================================================

/// One `#Plan<N>` directive and the evidences declared under it
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Plan {
    pub id: String,
    pub description: String,
    /// Evidence ids in declaration order
    pub evidences: Vec<String>,
}

/// Group planner output into plans, in declaration order.
///
/// Lines that start with neither `#Plan` nor `#E` are narrative and ignored.
/// An `#E` line before any `#Plan`, or a directive without a colon, is a
/// malformed plan.
pub fn parse_plans(text: &str) -> Result<Vec<Plan>> {
    let mut plans: Vec<Plan> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut current: Option<usize> = None;

    for line in text.lines().map(str::trim) {
        if !line.starts_with(PLAN_PREFIX) && !line.starts_with(EVIDENCE_PREFIX) {
            continue;
        }
        let (key, description) = split_directive(line)?;

        if key.starts_with(PLAN_PREFIX) {
            let plan = Plan {
                id: key.to_string(),
                description: description.to_string(),
                evidences: Vec::new(),
            };
            // a repeated plan id keeps its first position but starts over
            let slot = match index.get(key) {
                Some(&slot) => {
                    plans[slot] = plan;
                    slot
                }
                None => {
                    index.insert(key.to_string(), plans.len());
                    plans.push(plan);
                    plans.len() - 1
                }
            };
            current = Some(slot);
        } else {
            let slot = current.ok_or_else(|| {
                AgentError::MalformedPlan(format!("evidence {key} appears before any #Plan"))
            })?;
            plans[slot].evidences.push(key.to_string());
        }
    }

    Ok(plans)
}

/// State of one parsed evidence line
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EvidenceSpec {
    /// `Tool[input]` text to execute (or a literal when it has no brackets)
    Call(String),
    /// The id was not a bare `#E<digits>`; resolves to [`MALFORMED_EVIDENCE`]
    Malformed,
}

/// Evidence declarations from planner output
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Evidences {
    order: Vec<String>,
    specs: HashMap<String, EvidenceSpec>,
}

impl Evidences {
    /// Evidence ids in first-declaration order
    pub fn ids(&self) -> &[String] {
        &self.order
    }

    pub fn get(&self, id: &str) -> Option<&EvidenceSpec> {
        self.specs.get(id)
    }

    /// Well-formed `(id, spec)` pairs in declaration order
    pub fn calls(&self) -> impl Iterator<Item = (&str, &str)> {
        self.order.iter().filter_map(|id| match self.specs.get(id) {
            Some(EvidenceSpec::Call(spec)) => Some((id.as_str(), spec.as_str())),
            _ => None,
        })
    }

    /// Ids whose declaration was malformed
    pub fn malformed(&self) -> impl Iterator<Item = &str> {
        self.order
            .iter()
            .filter(|id| matches!(self.specs.get(id.as_str()), Some(EvidenceSpec::Malformed)))
            .map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    fn insert(&mut self, id: &str, spec: EvidenceSpec) {
        if self.specs.insert(id.to_string(), spec).is_none() {
            self.order.push(id.to_string());
        }
    }
}

impl<'a> FromIterator<(&'a str, &'a str)> for Evidences {
    fn from_iter<I: IntoIterator<Item = (&'a str, &'a str)>>(iter: I) -> Self {
        let mut evidences = Self::default();
        for (id, spec) in iter {
            evidences.insert(id, EvidenceSpec::Call(spec.to_string()));
        }
        evidences
    }
}

/// Collect `#E<N>: spec` lines.
///
/// Only lines whose third character is a digit are considered. The id must be
/// exactly `#E` followed by digits; anything else is recorded as
/// [`EvidenceSpec::Malformed`] instead of failing the parse. A later line with
/// the same id overrides the earlier spec.
pub fn parse_evidences(text: &str) -> Result<Evidences> {
    let mut evidences = Evidences::default();

    for line in text.lines().map(str::trim) {
        let is_evidence = line.starts_with(EVIDENCE_PREFIX)
            && line[EVIDENCE_PREFIX.len()..].starts_with(|c: char| c.is_ascii_digit());
        if !is_evidence {
            continue;
        }
        let (id, spec) = split_directive(line)?;

        if EVIDENCE_ID_RE.is_match(id) {
            evidences.insert(id, EvidenceSpec::Call(spec.to_string()));
        } else {
            tracing::warn!(evidence = %id, "Malformed evidence id");
            evidences.insert(id, EvidenceSpec::Malformed);
        }
    }

    Ok(evidences)
}

/// Split `key: rest` at the first colon, trimming both sides
fn split_directive(line: &str) -> Result<(&str, &str)> {
    line.split_once(':')
        .map(|(key, rest)| (key.trim(), rest.trim()))
        .ok_or_else(|| AgentError::MalformedPlan(format!("directive without ':' in `{line}`")))
}

/// Split an evidence spec into tool name and input.
///
/// `None` when the spec has no `[`, which marks it as a literal value.
pub fn split_tool_call(spec: &str) -> Option<(&str, &str)> {
    let (tool, rest) = spec.split_once('[')?;
    let rest = rest.trim_end();
    let input = rest.strip_suffix(']').unwrap_or(rest);
    Some((tool.trim(), input))
}
