//! Prompt Templates
//!
//! `{name}` placeholders filled at run time. The default templates reproduce
//! the markers the engine parses (`Action:`, `Action Input:`, `Final Answer:`,
//! `#Plan<N>`, `#E<N>`), so prompts and parsers stay in lockstep.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{AgentError, Result};

static PLACEHOLDER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("placeholder pattern is valid"));

/// Text with `{placeholder}` slots
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct PromptTemplate {
    template: String,
    placeholders: BTreeSet<String>,
}

impl PromptTemplate {
    pub fn new(template: impl Into<String>) -> Self {
        let template = template.into();
        let placeholders = PLACEHOLDER_RE
            .captures_iter(&template)
            .filter_map(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
            .collect();
        Self {
            template,
            placeholders,
        }
    }

    pub fn placeholders(&self) -> &BTreeSet<String> {
        &self.placeholders
    }

    pub fn has_placeholder(&self, name: &str) -> bool {
        self.placeholders.contains(name)
    }

    /// Fill every placeholder.
    ///
    /// Values for names the template does not declare are ignored; a declared
    /// placeholder without a value is an error. Substituted values are not
    /// rescanned.
    pub fn populate(&self, values: &[(&str, &str)]) -> Result<String> {
        if let Some(missing) = self
            .placeholders
            .iter()
            .find(|p| !values.iter().any(|(k, _)| *k == p.as_str()))
        {
            return Err(AgentError::Template(format!("missing value for placeholder `{missing}`")));
        }

        let filled = PLACEHOLDER_RE.replace_all(&self.template, |caps: &regex::Captures<'_>| {
            let name = &caps[1];
            values
                .iter()
                .find(|(k, _)| *k == name)
                .map_or_else(|| caps[0].to_string(), |(_, v)| (*v).to_string())
        });
        Ok(filled.into_owned())
    }

    pub fn as_str(&self) -> &str {
        &self.template
    }
}

impl From<String> for PromptTemplate {
    fn from(template: String) -> Self {
        Self::new(template)
    }
}

impl From<&str> for PromptTemplate {
    fn from(template: &str) -> Self {
        Self::new(template)
    }
}

impl From<PromptTemplate> for String {
    fn from(template: PromptTemplate) -> Self {
        template.template
    }
}

/// Few-shot examples: one block, or several joined by a blank line
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Examples {
    One(String),
    Many(Vec<String>),
}

impl Examples {
    pub fn compose(&self) -> String {
        match self {
            Examples::One(text) => text.clone(),
            Examples::Many(items) => items
                .iter()
                .map(|e| e.trim_matches('\n'))
                .collect::<Vec<_>>()
                .join("\n\n"),
        }
    }
}

pub const REACT_PROMPT: &str = r"Answer the following questions as best you can. Give answer in {lang}. You have access to the following tools:
{tool_description}
Use the following format:

Question: the input question you must answer
Thought: you should always think about what to do

Action: the action to take, should be one of [{tool_names}]

Action Input: the input to the action, should be different from the action input of the same action in previous steps.

Observation: the result of the action

... (this Thought/Action/Action Input/Observation can repeat N times)
#Thought: I now know the final answer
Final Answer: the final answer to the original input question

Begin! After each Action Input.

Question: {instruction}
Thought:{agent_scratchpad}
";

pub const PLANNER_PROMPT: &str = r"You are an AI agent who makes step-by-step plans to solve a problem under the help of external tools.
For each step, make one plan followed by one tool-call, which will be executed later to retrieve evidence for that step.
You should store each evidence into a distinct variable #E1, #E2, #E3 ... that can be referred to in later tool-call inputs.

##Available Tools##
{tool_description}

##Output Format (Replace '<...>')##
#Plan1: <describe your plan here>
#E1: <toolname>[<input here>] (eg. Search[What is Python])
#Plan2: <describe next plan>
#E2: <toolname>[<input here, you can use #E1 to represent its expected output>]
And so on...

##Your Task##
{task}

##Now Begin##
";

pub const FEW_SHOT_PLANNER_PROMPT: &str = r"You are an AI agent who makes step-by-step plans to solve a problem under the help of external tools.
For each step, make one plan followed by one tool-call, which will be executed later to retrieve evidence for that step.
You should store each evidence into a distinct variable #E1, #E2, #E3 ... that can be referred to in later tool-call inputs.

##Available Tools##
{tool_description}

##Output Format (Replace '<...>')##
#Plan1: <describe your plan here>
#E1: <toolname>[<input>]
#Plan2: <describe next plan>
#E2: <toolname>[<input, you can use #E1 to represent its expected output>]
And so on...

##Examples##
{fewshot}

##Your Task##
{task}

##Now Begin##
";

pub const SOLVER_PROMPT: &str = r"You are an AI agent who solves a problem with my assistance. I will provide step-by-step plans(#Plan) and evidences(#E) that could be helpful.
Your task is to briefly summarize each step, then make a short final conclusion for your task. Give answer in {lang}.

##My Plans and Evidences##
{plan_evidence}

##Example Output##
First, I <did something> , and I think <...>; Second, I <...>, and I think <...>; ....
So, <your conclusion>.

##Your Task##
{task}

##Now Begin##
";

pub const FEW_SHOT_SOLVER_PROMPT: &str = r"You are an AI agent who solves a problem with my assistance. I will provide step-by-step plans and evidences that could be helpful.
Your task is to briefly summarize each step, then make a short final conclusion for your task. Give answer in {lang}.

##My Plans and Evidences##
{plan_evidence}

##Example Output##
First, I <did something> , and I think <...>; Second, I <...>, and I think <...>; ....
So, <your conclusion>.

##Example##
{fewshot}

##Your Task##
{task}

##Now Begin##
";
