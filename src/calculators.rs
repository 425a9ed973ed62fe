//! Derived metrics computed from accumulator snapshots.
//!
//! A [`Calculator`] is a side-effect free function over the values of the
//! accumulators registered on the same node. It is invoked fresh on every
//! [`snapshot`](crate::registry::RegistryNode::snapshot) and keeps no state
//! between invocations.
//!
//! # Available Calculators
//!
//! | Type | Output | Description |
//! |------|--------|-------------|
//! | [`Ratio`] | `Float` | `numerator / denominator` |
//! | [`Rate`] | `Float` | windowed value normalized to a per-unit rate |
//! | [`Summary`] | `Composite` | several accumulators under one name |
//! | [`FnCalculator`] | any | closure, e.g. a formatted string |
//!
//! # Examples
//!
//! ```rust
//! use accumulatori::calculators::{Ratio, Value};
//! use accumulatori::mutators::MutatorFactory;
//! use accumulatori::registry::Registrar;
//!
//! let registrar = Registrar::new();
//! registrar.set_on("", true);
//!
//! let cache = registrar.node("cache");
//! cache.accumulator_with("hits", &MutatorFactory::unbounded_sum()).mutator().put(3);
//! cache.accumulator_with("lookups", &MutatorFactory::unbounded_sum()).mutator().put(4);
//! cache.register_calculator("hit_ratio", Ratio::new("hits", "lookups"));
//!
//! let snapshot = cache.snapshot();
//! assert_eq!(snapshot["hits"], Value::Int(3));
//! assert_eq!(snapshot["hit_ratio"], Value::Float(0.75));
//! ```

use std::collections::BTreeMap;
use std::fmt::{self, Display};
use std::sync::Arc;
use std::time::Duration;

use crate::accumulator::Accumulator;
use crate::error::CalculatorError;

/// Accumulator values by name, as read at the start of a snapshot.
pub type Values = BTreeMap<String, i64>;

/// Accumulators by name, read-only view handed to calculators.
pub type Accumulators = BTreeMap<String, Arc<Accumulator>>;

/// The value of a snapshot entry.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(untagged))]
pub enum Value {
    /// Raw accumulator value or integer metric.
    Int(i64),
    /// Ratio, rate or any other real-valued metric.
    Float(f64),
    /// Formatted metric.
    Text(String),
    /// Several named properties under one calculator.
    Composite(BTreeMap<String, Value>),
}

impl Value {
    /// Returns `true` for a zero number, an empty string or an empty composite.
    pub fn is_zero(&self) -> bool {
        match self {
            Value::Int(v) => *v == 0,
            Value::Float(v) => *v == 0.0,
            Value::Text(s) => s.is_empty(),
            Value::Composite(map) => map.is_empty(),
        }
    }

    /// Returns the value as an `i64`, truncating floats.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            Value::Float(v) => Some(*v as i64),
            _ => None,
        }
    }

    /// Returns the value as an `f64`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(v) => Some(*v as f64),
            Value::Float(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns a composite property by name.
    pub fn property(&self, name: &str) -> Option<&Value> {
        match self {
            Value::Composite(map) => map.get(name),
            _ => None,
        }
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{}", v),
            Value::Text(s) => write!(f, "{}", s),
            Value::Composite(map) => {
                write!(f, "{{")?;
                for (i, (k, v)) in map.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}={}", k, v)?;
                }
                write!(f, "}}")
            }
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

/// A derived metric.
///
/// Implementations must not keep state between calls and must not block.
pub trait Calculator: Send + Sync {
    /// Computes the metric from the node's accumulator values.
    fn calculate(
        &self,
        values: &Values,
        accumulators: &Accumulators,
    ) -> Result<Value, CalculatorError>;

    /// Names of the properties of a composite output.
    ///
    /// Glob member matching offers `<calculator>.<property>` for each one;
    /// a calculator without properties is matched by its bare name.
    fn properties(&self) -> Vec<String> {
        Vec::new()
    }
}

fn lookup(values: &Values, name: &str) -> Result<i64, CalculatorError> {
    values
        .get(name)
        .copied()
        .ok_or_else(|| CalculatorError::MissingAccumulator(name.to_string()))
}

/// `numerator / denominator` as a float.
///
/// A zero denominator is a calculation failure: the snapshot gets no entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ratio {
    numerator: String,
    denominator: String,
}

impl Ratio {
    /// Creates a ratio of two accumulators of the same node.
    pub fn new(numerator: impl Into<String>, denominator: impl Into<String>) -> Self {
        Ratio {
            numerator: numerator.into(),
            denominator: denominator.into(),
        }
    }
}

impl Calculator for Ratio {
    fn calculate(&self, values: &Values, _: &Accumulators) -> Result<Value, CalculatorError> {
        let numerator = lookup(values, &self.numerator)?;
        let denominator = lookup(values, &self.denominator)?;
        if denominator == 0 {
            return Err(CalculatorError::DivisionByZero {
                numerator: self.numerator.clone(),
                denominator: self.denominator.clone(),
            });
        }
        Ok(Value::Float(numerator as f64 / denominator as f64))
    }
}

/// A windowed value normalized to a rate.
///
/// `value × per / window`: a sum over a one-minute window with `per` of one
/// second yields events per second.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rate {
    accumulator: String,
    window: Duration,
    per: Duration,
}

impl Rate {
    /// Rate of `accumulator` over `window`, per second.
    pub fn per_second(accumulator: impl Into<String>, window: Duration) -> Self {
        Self::new(accumulator, window, Duration::from_secs(1))
    }

    /// Rate of `accumulator` over `window`, per `per`.
    pub fn new(accumulator: impl Into<String>, window: Duration, per: Duration) -> Self {
        Rate {
            accumulator: accumulator.into(),
            window,
            per,
        }
    }
}

impl Calculator for Rate {
    fn calculate(&self, values: &Values, _: &Accumulators) -> Result<Value, CalculatorError> {
        let value = lookup(values, &self.accumulator)?;
        if self.window.is_zero() {
            return Err(CalculatorError::Failed(format!(
                "rate of {:?} over an empty window",
                self.accumulator
            )));
        }
        Ok(Value::Float(
            value as f64 * self.per.as_secs_f64() / self.window.as_secs_f64(),
        ))
    }
}

/// Several accumulators exposed as properties of one composite value.
///
/// # Examples
///
/// ```rust
/// use accumulatori::calculators::{Calculator, Summary};
///
/// let latency = Summary::new()
///     .with("min", "latency_min")
///     .with("max", "latency_max");
/// assert_eq!(latency.properties(), vec!["min", "max"]);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Summary {
    properties: Vec<(String, String)>,
}

impl Summary {
    /// Creates an empty summary.
    pub fn new() -> Self {
        Self::default()
    }

    /// Exposes `accumulator` as `property`, returning `self` for method chaining.
    ///
    /// An existing property is remapped.
    pub fn with(mut self, property: impl Into<String>, accumulator: impl Into<String>) -> Self {
        let property = property.into();
        let accumulator = accumulator.into();

        if let Some(pos) = self.properties.iter().position(|(p, _)| p == &property) {
            self.properties[pos].1 = accumulator;
        } else {
            self.properties.push((property, accumulator));
        }
        self
    }
}

impl Calculator for Summary {
    fn calculate(&self, values: &Values, _: &Accumulators) -> Result<Value, CalculatorError> {
        self.properties
            .iter()
            .map(|(property, accumulator)| {
                lookup(values, accumulator).map(|v| (property.clone(), Value::Int(v)))
            })
            .collect::<Result<BTreeMap<_, _>, _>>()
            .map(Value::Composite)
    }

    fn properties(&self) -> Vec<String> {
        self.properties.iter().map(|(p, _)| p.clone()).collect()
    }
}

type CalculateFn =
    dyn Fn(&Values, &Accumulators) -> Result<Value, CalculatorError> + Send + Sync;

/// A calculator backed by a closure.
///
/// # Examples
///
/// ```rust
/// use accumulatori::calculators::{Calculator, FnCalculator, Value};
/// use std::collections::BTreeMap;
///
/// let uptime = FnCalculator::new(|values, _| {
///     let secs = values.get("uptime_secs").copied().unwrap_or_default();
///     Ok(Value::Text(format!("{}h{:02}m", secs / 3600, (secs % 3600) / 60)))
/// });
///
/// let values = BTreeMap::from([("uptime_secs".to_string(), 7_500)]);
/// assert_eq!(
///     uptime.calculate(&values, &BTreeMap::new()).unwrap(),
///     Value::Text("2h05m".to_string())
/// );
/// ```
pub struct FnCalculator {
    calculate: Box<CalculateFn>,
    properties: Vec<String>,
}

impl FnCalculator {
    /// Wraps `calculate`.
    pub fn new<F>(calculate: F) -> Self
    where
        F: Fn(&Values, &Accumulators) -> Result<Value, CalculatorError> + Send + Sync + 'static,
    {
        FnCalculator {
            calculate: Box::new(calculate),
            properties: Vec::new(),
        }
    }

    /// Declares the composite properties the closure produces.
    pub fn with_properties<I, S>(self, properties: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            properties: properties.into_iter().map(Into::into).collect(),
            ..self
        }
    }
}

impl Calculator for FnCalculator {
    fn calculate(
        &self,
        values: &Values,
        accumulators: &Accumulators,
    ) -> Result<Value, CalculatorError> {
        (self.calculate)(values, accumulators)
    }

    fn properties(&self) -> Vec<String> {
        self.properties.clone()
    }
}

/// The sentinel calculator returned for unknown names. Always `Int(0)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopCalculator;

impl Calculator for NoopCalculator {
    fn calculate(&self, _: &Values, _: &Accumulators) -> Result<Value, CalculatorError> {
        Ok(Value::Int(0))
    }
}
