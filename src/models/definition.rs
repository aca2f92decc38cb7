//! # Workflow Definitions
//!
//! A `WorkflowDefinition` is an ordered list of steps, each bound to a capability name
//! rather than a network address. Definitions are immutable once registered and are
//! addressed by [`DefinitionRef`] (`name@version`).

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::constants::{DEFAULT_STEP_MAX_RETRIES, DEFAULT_STEP_TIMEOUT_MS};

/// Reference to a registered definition
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DefinitionRef {
    pub name: String,
    pub version: String,
}

impl DefinitionRef {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }
}

impl fmt::Display for DefinitionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.version)
    }
}

impl FromStr for DefinitionRef {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.rsplit_once('@') {
            Some((name, version)) if !name.is_empty() && !version.is_empty() => {
                Ok(Self::new(name, version))
            }
            _ => Err(format!("Invalid definition reference '{s}', expected name@version")),
        }
    }
}

fn default_max_retries() -> u32 {
    DEFAULT_STEP_MAX_RETRIES
}

fn default_timeout_ms() -> u64 {
    DEFAULT_STEP_TIMEOUT_MS
}

/// A single step of a workflow
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepDefinition {
    pub name: String,
    /// Logical capability resolved through the registry at dispatch time
    pub capability: String,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// JSON pointer into the instance payload; the step is skipped unless the value
    /// there is present and non-empty
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_unless: Option<String>,
}

impl StepDefinition {
    pub fn new(name: impl Into<String>, capability: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            capability: capability.into(),
            max_retries: DEFAULT_STEP_MAX_RETRIES,
            timeout_ms: DEFAULT_STEP_TIMEOUT_MS,
            skip_unless: None,
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn with_skip_unless(mut self, pointer: impl Into<String>) -> Self {
        self.skip_unless = Some(pointer.into());
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Whether the step runs for `payload`
    ///
    /// Null, `false`, empty strings and empty collections count as absent.
    pub fn runs_for(&self, payload: &Value) -> bool {
        let Some(pointer) = &self.skip_unless else {
            return true;
        };
        match payload.pointer(pointer) {
            None | Some(Value::Null) | Some(Value::Bool(false)) => false,
            Some(Value::String(s)) => !s.trim().is_empty(),
            Some(Value::Array(items)) => !items.is_empty(),
            Some(Value::Object(fields)) => !fields.is_empty(),
            Some(_) => true,
        }
    }

    /// Total attempts allowed before the step is considered exhausted
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

/// Ordered sequence of steps
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    pub name: String,
    pub version: String,
    pub steps: Vec<StepDefinition>,
}

impl WorkflowDefinition {
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        steps: Vec<StepDefinition>,
    ) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            steps,
        }
    }

    pub fn definition_ref(&self) -> DefinitionRef {
        DefinitionRef::new(self.name.clone(), self.version.clone())
    }

    pub fn step(&self, index: usize) -> Option<&StepDefinition> {
        self.steps.get(index)
    }

    pub fn step_by_name(&self, name: &str) -> Option<(usize, &StepDefinition)> {
        self.steps.iter().enumerate().find(|(_, s)| s.name == name)
    }

    pub fn is_last_step(&self, index: usize) -> bool {
        index + 1 >= self.steps.len()
    }

    /// Capabilities referenced by this definition, in step order, without repeats
    pub fn capabilities(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.steps
            .iter()
            .filter(|s| seen.insert(s.capability.as_str()))
            .map(|s| s.capability.clone())
            .collect()
    }

    /// Structural validation; returns the first problem found
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("definition name must not be empty".to_string());
        }
        if self.version.trim().is_empty() {
            return Err("definition version must not be empty".to_string());
        }
        if self.name.contains('@') {
            return Err("definition name must not contain '@'".to_string());
        }
        if self.steps.is_empty() {
            return Err("definition must contain at least one step".to_string());
        }

        let mut names = HashSet::new();
        for step in &self.steps {
            if step.name.trim().is_empty() {
                return Err("step name must not be empty".to_string());
            }
            if step.capability.trim().is_empty() {
                return Err(format!("step '{}' has an empty capability", step.name));
            }
            if step.timeout_ms == 0 {
                return Err(format!("step '{}' has a zero timeout", step.name));
            }
            if let Some(pointer) = &step.skip_unless {
                if !pointer.starts_with('/') {
                    return Err(format!(
                        "step '{}' has skip_unless '{pointer}', expected a JSON pointer starting with '/'",
                        step.name
                    ));
                }
            }
            if !names.insert(step.name.as_str()) {
                return Err(format!("duplicate step name '{}'", step.name));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signup() -> WorkflowDefinition {
        WorkflowDefinition::new(
            "signup",
            "1",
            vec![
                StepDefinition::new("create_account", "accounts"),
                StepDefinition::new("send_welcome", "email").with_max_retries(5),
                StepDefinition::new("notify_crm", "crm"),
            ],
        )
    }

    #[test]
    fn test_definition_ref_parse_and_display() {
        let r: DefinitionRef = "user.created@2".parse().unwrap();
        assert_eq!(r.name, "user.created");
        assert_eq!(r.version, "2");
        assert_eq!(r.to_string(), "user.created@2");

        assert!("no-version".parse::<DefinitionRef>().is_err());
        assert!("@1".parse::<DefinitionRef>().is_err());
        assert!("name@".parse::<DefinitionRef>().is_err());
    }

    #[test]
    fn test_valid_definition() {
        let def = signup();
        assert!(def.validate().is_ok());
        assert!(def.is_last_step(2));
        assert!(!def.is_last_step(1));
        assert_eq!(def.step(1).unwrap().max_attempts(), 6);
        assert_eq!(def.capabilities(), vec!["accounts", "email", "crm"]);
    }

    #[test]
    fn test_invalid_definitions() {
        let empty = WorkflowDefinition::new("x", "1", vec![]);
        assert!(empty.validate().unwrap_err().contains("at least one step"));

        let dup = WorkflowDefinition::new(
            "x",
            "1",
            vec![StepDefinition::new("a", "c1"), StepDefinition::new("a", "c2")],
        );
        assert!(dup.validate().unwrap_err().contains("duplicate"));

        let no_cap = WorkflowDefinition::new("x", "1", vec![StepDefinition::new("a", " ")]);
        assert!(no_cap.validate().unwrap_err().contains("capability"));
    }

    #[test]
    fn test_step_defaults_from_serde() {
        let step: StepDefinition =
            serde_json::from_str(r#"{"name":"a","capability":"email"}"#).unwrap();
        assert_eq!(step.max_retries, DEFAULT_STEP_MAX_RETRIES);
        assert_eq!(step.timeout_ms, DEFAULT_STEP_TIMEOUT_MS);
        assert!(step.skip_unless.is_none());
    }

    #[test]
    fn test_skip_unless_condition() {
        let sms = StepDefinition::new("send_sms", "sms").with_skip_unless("/data/phone");

        assert!(sms.runs_for(&serde_json::json!({"data": {"phone": "+34600000000"}})));
        assert!(!sms.runs_for(&serde_json::json!({"data": {"phone": ""}})));
        assert!(!sms.runs_for(&serde_json::json!({"data": {"phone": "  "}})));
        assert!(!sms.runs_for(&serde_json::json!({"data": {"phone": null}})));
        assert!(!sms.runs_for(&serde_json::json!({"data": {}})));
        assert!(!sms.runs_for(&serde_json::Value::Null));

        let unconditional = StepDefinition::new("send_email", "email");
        assert!(unconditional.runs_for(&serde_json::Value::Null));
    }

    #[test]
    fn test_skip_unless_must_be_a_pointer() {
        let def = WorkflowDefinition::new(
            "x",
            "1",
            vec![StepDefinition::new("a", "sms").with_skip_unless("data.phone")],
        );
        assert!(def.validate().unwrap_err().contains("JSON pointer"));
    }
}
