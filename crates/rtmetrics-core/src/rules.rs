//! Rule compilation and matching.
//!
//! A rule pairs a name pattern with an action. Rules are evaluated in
//! declaration order and the first match wins; names no rule matches fall back
//! to the rule set's default action. Expensive counters are the exception:
//! only an explicit `include` rule selects them.
//!
//! Patterns come in three flavours:
//! - `literal`: exact name equality
//! - `glob`: whole-name match, `*` = any run of characters, `?` = one character
//! - `regex`: unanchored search (the default)

use regex::Regex;
use serde::Deserialize;

use crate::error::{Result, RtMetricsError};
use crate::sampler::CounterDescription;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Include,
    Exclude,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternKind {
    Literal,
    Glob,
    #[default]
    Regex,
}

/// Uncompiled rule, as read from configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleSpec {
    pub pattern: String,
    #[serde(default, rename = "match")]
    pub kind: PatternKind,
    pub action: Action,
}

impl RuleSpec {
    pub fn include(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            kind: PatternKind::Regex,
            action: Action::Include,
        }
    }

    pub fn exclude(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            kind: PatternKind::Regex,
            action: Action::Exclude,
        }
    }

    pub fn with_kind(mut self, kind: PatternKind) -> Self {
        self.kind = kind;
        self
    }
}

#[derive(Debug, Clone)]
enum Pattern {
    Literal(String),
    // Globs compile down to an anchored regex.
    Regex(Regex),
}

impl Pattern {
    fn compile(raw: &str, kind: PatternKind) -> Result<Self> {
        if raw.is_empty() {
            return Err(RtMetricsError::Config("rule pattern must not be empty".into()));
        }
        match kind {
            PatternKind::Literal => Ok(Pattern::Literal(raw.to_string())),
            PatternKind::Glob => compile_regex(&glob_to_regex(raw), raw).map(Pattern::Regex),
            PatternKind::Regex => compile_regex(raw, raw).map(Pattern::Regex),
        }
    }

    fn is_match(&self, name: &str) -> bool {
        match self {
            Pattern::Literal(s) => s == name,
            Pattern::Regex(re) => re.is_match(name),
        }
    }
}

fn compile_regex(source: &str, raw: &str) -> Result<Regex> {
    Regex::new(source)
        .map_err(|e| RtMetricsError::Config(format!("invalid rule pattern {raw:?}: {e}")))
}

fn glob_to_regex(glob: &str) -> String {
    let mut out = String::with_capacity(glob.len() + 8);
    out.push('^');
    let mut literal = String::new();
    for c in glob.chars() {
        match c {
            '*' | '?' => {
                out.push_str(&regex::escape(&literal));
                literal.clear();
                out.push_str(if c == '*' { ".*" } else { "." });
            }
            _ => literal.push(c),
        }
    }
    out.push_str(&regex::escape(&literal));
    out.push('$');
    out
}

/// Compiled rule.
#[derive(Debug, Clone)]
pub struct Rule {
    pattern: Pattern,
    action: Action,
}

impl Rule {
    pub fn compile(spec: &RuleSpec) -> Result<Self> {
        Ok(Self {
            pattern: Pattern::compile(&spec.pattern, spec.kind)?,
            action: spec.action,
        })
    }

    pub fn action(&self) -> Action {
        self.action
    }
}

/// Ordered rules plus a default action. Built once at startup.
#[derive(Debug, Clone)]
pub struct RuleSet {
    rules: Vec<Rule>,
    default: Action,
}

impl RuleSet {
    /// Compile every rule; the first malformed pattern fails the whole set.
    pub fn new(specs: &[RuleSpec], default: Action) -> Result<Self> {
        let rules = specs.iter().map(Rule::compile).collect::<Result<Vec<_>>>()?;
        Ok(Self { rules, default })
    }

    /// Rule set with no rules: everything falls to `default`.
    pub fn with_default(default: Action) -> Self {
        Self {
            rules: Vec::new(),
            default,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Action of the first rule matching `name`, if any.
    pub fn decide(&self, name: &str) -> Option<Action> {
        self.rules
            .iter()
            .find(|r| r.pattern.is_match(name))
            .map(|r| r.action)
    }

    /// Whether `name` is included, falling back to the default action.
    ///
    /// Only the name is consulted, so an expensive counter that no rule
    /// mentions still matches under a default of `Include`. Use
    /// [`RuleSet::selects`] to decide whether a counter is sampled.
    pub fn matches(&self, name: &str) -> bool {
        self.decide(name).unwrap_or(self.default) == Action::Include
    }

    /// Whether a described counter should be sampled.
    pub fn selects(&self, desc: &CounterDescription) -> bool {
        match self.decide(&desc.name) {
            Some(action) => action == Action::Include,
            None => !desc.expensive && self.default == Action::Include,
        }
    }

    /// Names of the selected counters, in input order.
    pub fn select(&self, descs: &[CounterDescription]) -> Vec<String> {
        descs
            .iter()
            .filter(|d| self.selects(d))
            .map(|d| d.name.clone())
            .collect()
    }
}
