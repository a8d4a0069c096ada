use crate::domain::errors::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A single sampled parameter value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Categorical(String),
}

impl ParamValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ParamValue::Int(v) => Some(*v as f64),
            ParamValue::Float(v) => Some(*v),
            ParamValue::Categorical(s) => s.parse().ok(),
            ParamValue::Bool(_) => None,
        }
    }

    /// Integers, or floats with no fractional part.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ParamValue::Int(v) => Some(*v),
            ParamValue::Float(v) if v.fract() == 0.0 && v.is_finite() => Some(*v as i64),
            ParamValue::Categorical(s) => s.parse().ok(),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ParamValue::Bool(v) => Some(*v),
            ParamValue::Categorical(s) => s.parse().ok(),
            _ => None,
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Bool(v) => write!(f, "{}", v),
            ParamValue::Int(v) => write!(f, "{}", v),
            ParamValue::Float(v) => write!(f, "{:.4}", v),
            ParamValue::Categorical(s) => write!(f, "{}", s),
        }
    }
}

/// Named mapping of sampled values, ordered by name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParameterSet(BTreeMap<String, ParamValue>);

impl ParameterSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: ParamValue) {
        self.0.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.0.get(name)
    }

    pub fn get_f64(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(ParamValue::as_f64)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ParamValue)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, ParamValue)> for ParameterSet {
    fn from_iter<T: IntoIterator<Item = (String, ParamValue)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl fmt::Display for ParameterSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .0
            .iter()
            .map(|(name, value)| format!("{}={}", name, value))
            .collect();
        write!(f, "{}", parts.join(", "))
    }
}

/// Domain of one search axis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ParamSpec {
    Float { low: f64, high: f64 },
    Int { low: i64, high: i64 },
    Categorical { choices: Vec<ParamValue> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterDef {
    pub name: String,
    #[serde(flatten)]
    pub spec: ParamSpec,
}

impl ParameterDef {
    pub fn float(name: &str, low: f64, high: f64) -> Self {
        Self {
            name: name.to_string(),
            spec: ParamSpec::Float { low, high },
        }
    }

    pub fn int(name: &str, low: i64, high: i64) -> Self {
        Self {
            name: name.to_string(),
            spec: ParamSpec::Int { low, high },
        }
    }

    pub fn categorical(name: &str, choices: Vec<ParamValue>) -> Self {
        Self {
            name: name.to_string(),
            spec: ParamSpec::Categorical { choices },
        }
    }
}

/// Declared parameter axes of a study.
///
/// TOML layout:
///
/// ```toml
/// [[parameters]]
/// name = "leverage"
/// type = "int"
/// low = 5
/// high = 25
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchSpace {
    pub parameters: Vec<ParameterDef>,
}

impl SearchSpace {
    pub fn new(parameters: Vec<ParameterDef>) -> Self {
        Self { parameters }
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::SearchSpace(e.to_string()))
    }

    pub fn len(&self) -> usize {
        self.parameters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }

    /// Checks ranges, choices and name uniqueness. `known` restricts the
    /// accepted parameter names when given.
    pub fn validate(&self, known: Option<&[&str]>) -> Result<(), ConfigError> {
        let mut seen: Vec<&str> = Vec::with_capacity(self.parameters.len());

        for def in &self.parameters {
            if seen.contains(&def.name.as_str()) {
                return Err(ConfigError::SearchSpace(format!(
                    "duplicate parameter '{}'",
                    def.name
                )));
            }
            seen.push(&def.name);

            if let Some(known) = known
                && !known.contains(&def.name.as_str())
            {
                return Err(ConfigError::UnknownParameter(def.name.clone()));
            }

            match &def.spec {
                ParamSpec::Float { low, high } => {
                    if !(low.is_finite() && high.is_finite() && low <= high) {
                        return Err(ConfigError::SearchSpace(format!(
                            "'{}' has invalid range [{}, {}]",
                            def.name, low, high
                        )));
                    }
                }
                ParamSpec::Int { low, high } => {
                    if low > high {
                        return Err(ConfigError::SearchSpace(format!(
                            "'{}' has invalid range [{}, {}]",
                            def.name, low, high
                        )));
                    }
                }
                ParamSpec::Categorical { choices } => {
                    if choices.is_empty() {
                        return Err(ConfigError::SearchSpace(format!(
                            "'{}' has no choices",
                            def.name
                        )));
                    }
                }
            }
        }

        Ok(())
    }
}

impl Default for SearchSpace {
    /// The space swept for a single symbol/timeframe by default.
    fn default() -> Self {
        Self::new(vec![
            ParameterDef::float("prediction_threshold", 0.55, 0.85),
            ParameterDef::float("risk_reward_ratio", 1.0, 5.0),
            ParameterDef::float("risk_per_trade_pct", 0.5, 2.0),
            ParameterDef::int("leverage", 5, 25),
            ParameterDef::float("min_natr", 0.1, 1.0),
            ParameterDef::float("max_natr", 1.0, 5.0),
            ParameterDef::categorical(
                "ema_period",
                vec![ParamValue::Int(50), ParamValue::Int(100), ParamValue::Int(200)],
            ),
        ])
    }
}
