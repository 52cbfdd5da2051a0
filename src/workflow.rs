//! Declarative workflow definitions: steps, conditions, selectors, waves

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Result, SwarmError};

/// Run context shared by every step of a run
pub type RunContext = Map<String, Value>;

/// Which agents a step is dispatched to
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentSelector {
    /// Every registered agent
    #[default]
    All,
    /// The single agent with the highest belief
    MaxBelief,
    /// The agent recorded under `proposer` in the run context
    Proposer,
}

/// Lifecycle of a step within a run.
///
/// A finished [`WorkflowRun`](crate::engine::WorkflowRun) only ever reports the
/// terminal states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Running,
    Done,
    Skipped,
    Failed,
}

impl StepStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Skipped | Self::Failed)
    }
}

/// Guard evaluated against the run context before a step is dispatched.
///
/// Parsed from strings such as `anomaly_detected == true`,
/// `consensus_proposal.status != "rejected"`, `summary contains "cholera"`, or
/// a bare `key` for a truthiness test. Keys are dot-separated paths; a key that
/// is absent evaluates falsy.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Condition {
    #[default]
    Always,
    Truthy(String),
    Equals(String, Value),
    NotEquals(String, Value),
    Contains(String, String),
}

impl Condition {
    /// Parse a condition expression
    pub fn parse(expr: &str) -> Result<Self> {
        let expr = expr.trim();
        if expr.is_empty() || expr == "always" {
            return Ok(Self::Always);
        }

        if let Some((key, needle)) = split_operator(expr, " contains ") {
            return Ok(Self::Contains(key?, needle.trim_matches('"').to_string()));
        }
        if let Some((key, raw)) = split_operator(expr, "!=") {
            return Ok(Self::NotEquals(key?, parse_literal(raw)));
        }
        if let Some((key, raw)) = split_operator(expr, "==") {
            return Ok(Self::Equals(key?, parse_literal(raw)));
        }

        if expr.contains(char::is_whitespace) {
            return Err(SwarmError::Config(format!("Unparseable condition: {expr}")));
        }
        Ok(Self::Truthy(expr.to_string()))
    }

    /// Evaluate against the run context
    pub fn evaluate(&self, context: &RunContext) -> bool {
        match self {
            Self::Always => true,
            Self::Truthy(key) => lookup(context, key).is_some_and(is_truthy),
            Self::Equals(key, value) => lookup(context, key).is_some_and(|v| v == value),
            Self::NotEquals(key, value) => lookup(context, key).is_some_and(|v| v != value),
            Self::Contains(key, needle) => lookup(context, key).is_some_and(|v| match v {
                Value::String(s) => s.contains(needle.as_str()),
                Value::Array(items) => items.iter().any(|i| i.as_str() == Some(needle.as_str())),
                Value::Object(map) => map.contains_key(needle),
                _ => false,
            }),
        }
    }
}

fn split_operator<'a>(expr: &'a str, op: &str) -> Option<(Result<String>, &'a str)> {
    let (key, value) = expr.split_once(op)?;
    let key = key.trim();
    let key = if key.is_empty() || key.contains(char::is_whitespace) {
        Err(SwarmError::Config(format!("Bad condition key in: {expr}")))
    } else {
        Ok(key.to_string())
    };
    Some((key, value.trim()))
}

/// JSON literal if it parses as one, otherwise a bare word
fn parse_literal(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

fn lookup<'a>(context: &'a RunContext, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let mut current = context.get(segments.next()?)?;
    for segment in segments {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

impl TryFrom<String> for Condition {
    type Error = SwarmError;

    fn try_from(expr: String) -> Result<Self> {
        Self::parse(&expr)
    }
}

impl From<Condition> for String {
    fn from(condition: Condition) -> Self {
        condition.to_string()
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Always => f.write_str("always"),
            Self::Truthy(key) => f.write_str(key),
            Self::Equals(key, value) => write!(f, "{key} == {value}"),
            Self::NotEquals(key, value) => write!(f, "{key} != {value}"),
            Self::Contains(key, needle) => write!(f, "{key} contains \"{needle}\""),
        }
    }
}

/// Static description of one workflow step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepSpec {
    pub name: String,
    /// Action identifier handed to the dispatcher
    pub action: String,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub condition: Condition,
    #[serde(default)]
    pub parallel: bool,
    #[serde(default)]
    pub agent_selector: AgentSelector,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_timeout_ms() -> u64 {
    30_000
}

impl StepSpec {
    pub fn new(name: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            action: action.into(),
            depends_on: vec![],
            condition: Condition::Always,
            parallel: false,
            agent_selector: AgentSelector::All,
            timeout_ms: default_timeout_ms(),
        }
    }

    pub fn depends_on(mut self, steps: &[&str]) -> Self {
        self.depends_on = steps.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn when(mut self, condition: Condition) -> Self {
        self.condition = condition;
        self
    }

    pub fn parallel(mut self) -> Self {
        self.parallel = true;
        self
    }

    pub fn selector(mut self, selector: AgentSelector) -> Self {
        self.agent_selector = selector;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn timeout_duration(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// A validated, acyclic step graph with its readiness waves
#[derive(Debug, Clone)]
pub struct WorkflowDefinition {
    pub name: String,
    steps: Vec<StepSpec>,
    /// Step indices per wave, declaration order within a wave
    waves: Vec<Vec<usize>>,
}

impl WorkflowDefinition {
    /// Validate names and dependencies and lay the steps out in waves.
    ///
    /// A step sits one wave after the latest of its dependencies. Duplicate
    /// names, unknown dependencies and cycles are configuration errors.
    pub fn new(name: impl Into<String>, steps: Vec<StepSpec>) -> Result<Self> {
        let mut index: HashMap<&str, usize> = HashMap::new();
        for (i, step) in steps.iter().enumerate() {
            if index.insert(step.name.as_str(), i).is_some() {
                return Err(SwarmError::Config(format!(
                    "Duplicate step name: {}",
                    step.name
                )));
            }
        }

        let mut deps: Vec<HashSet<usize>> = Vec::with_capacity(steps.len());
        for step in &steps {
            let mut set = HashSet::new();
            for dep in &step.depends_on {
                let &d = index.get(dep.as_str()).ok_or_else(|| {
                    SwarmError::Config(format!(
                        "Step {} depends on unknown step {dep}",
                        step.name
                    ))
                })?;
                set.insert(d);
            }
            deps.push(set);
        }

        // Kahn's algorithm, one wave at a time
        let mut level: Vec<Option<usize>> = vec![None; steps.len()];
        let mut waves: Vec<Vec<usize>> = Vec::new();
        let mut placed = 0;
        while placed < steps.len() {
            let wave: Vec<usize> = (0..steps.len())
                .filter(|&i| level[i].is_none())
                .filter(|&i| deps[i].iter().all(|&d| level[d].is_some()))
                .collect();

            if wave.is_empty() {
                let stuck: Vec<&str> = (0..steps.len())
                    .filter(|&i| level[i].is_none())
                    .map(|i| steps[i].name.as_str())
                    .collect();
                return Err(SwarmError::Config(format!(
                    "Workflow graph has a cycle through: {}",
                    stuck.join(", ")
                )));
            }

            for &i in &wave {
                level[i] = Some(waves.len());
            }
            placed += wave.len();
            waves.push(wave);
        }

        Ok(Self {
            name: name.into(),
            steps,
            waves,
        })
    }

    /// The outbreak-detection workflow run when a village triggers escalation
    pub fn outbreak_detection() -> Result<Self> {
        let secs = Duration::from_secs;
        Self::new(
            "outbreak_detection",
            vec![
                StepSpec::new("local_analysis", "analyze_symptoms")
                    .parallel()
                    .timeout(secs(30)),
                StepSpec::new("neighbor_consultation", "query_neighbors")
                    .when(Condition::parse("anomaly_detected == true")?)
                    .parallel()
                    .timeout(secs(60)),
                StepSpec::new("collective_reasoning", "reason_about_collective_evidence")
                    .depends_on(&["neighbor_consultation"])
                    .parallel()
                    .timeout(secs(45)),
                StepSpec::new("consensus_proposal", "propose_consensus")
                    .depends_on(&["local_analysis", "collective_reasoning"])
                    .selector(AgentSelector::MaxBelief)
                    .timeout(secs(30)),
                StepSpec::new("escalation", "escalate")
                    .depends_on(&["consensus_proposal"])
                    .when(Condition::parse("consensus_proposal.consensus_reached == true")?)
                    .selector(AgentSelector::Proposer)
                    .timeout(secs(120)),
            ],
        )
    }

    /// Steps in declaration order
    pub fn steps(&self) -> &[StepSpec] {
        &self.steps
    }

    /// Look up a step by name
    pub fn step(&self, name: &str) -> Option<&StepSpec> {
        self.steps.iter().find(|s| s.name == name)
    }

    /// Waves in execution order
    pub fn waves(&self) -> impl Iterator<Item = Vec<&StepSpec>> {
        self.waves
            .iter()
            .map(|wave| wave.iter().map(|&i| &self.steps[i]).collect())
    }

    pub fn wave_count(&self) -> usize {
        self.waves.len()
    }
}
