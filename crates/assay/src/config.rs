//! Tester configuration.
//!
//! Options can be built in code, deserialized (camelCase keys, timeout in
//! milliseconds) or overridden from `ASSAY_*` environment variables:
//!
//! - `ASSAY_BAIL`: `1`/`true` stops dispatch after the first failing test
//! - `ASSAY_RUN_ORDER`: `sequence`, `random` or `parallel`
//! - `ASSAY_TIMEOUT_MS`: default per-test timeout
//! - `ASSAY_SEED`: seed for `random` order

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::TesterError;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(5000);

/// How eligible tests are dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunOrder {
    /// Depth-first, registration order, one test at a time.
    #[default]
    Sequence,
    /// Same as `Sequence` but the runnable tests are shuffled first.
    Random,
    /// Every runnable test is in flight at once.
    Parallel,
}

impl FromStr for RunOrder {
    type Err = TesterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sequence" | "sequential" => Ok(RunOrder::Sequence),
            "random" => Ok(RunOrder::Random),
            "parallel" => Ok(RunOrder::Parallel),
            other => Err(TesterError::InvalidRunOrder(other.to_string())),
        }
    }
}

/// Options for a [`crate::Tester`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TesterOptions {
    pub bail: bool,
    pub run_order: RunOrder,
    #[serde(with = "duration_ms")]
    pub timeout: Duration,
    /// Name reported in state snapshots. A random one is generated when unset.
    pub identifier: Option<String>,
    /// Makes `random` order reproducible.
    pub seed: Option<u64>,
}

impl Default for TesterOptions {
    fn default() -> Self {
        TesterOptions {
            bail: false,
            run_order: RunOrder::Sequence,
            timeout: DEFAULT_TIMEOUT,
            identifier: None,
            seed: None,
        }
    }
}

impl TesterOptions {
    pub fn bail(mut self, bail: bool) -> Self {
        self.bail = bail;
        self
    }

    pub fn run_order(mut self, run_order: RunOrder) -> Self {
        self.run_order = run_order;
        self
    }

    pub fn timeout_ms(mut self, ms: u64) -> Self {
        self.timeout = Duration::from_millis(ms);
        self
    }

    pub fn identifier(mut self, identifier: impl Into<String>) -> Self {
        self.identifier = Some(identifier.into());
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Defaults overridden from the process environment.
    pub fn from_env() -> Result<Self, TesterError> {
        Self::default().with_env()
    }

    /// Apply `ASSAY_*` overrides on top of these options.
    pub fn with_env(self) -> Result<Self, TesterError> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    fn with_overrides(mut self, var: impl Fn(&str) -> Option<String>) -> Result<Self, TesterError> {
        if let Some(bail) = var("ASSAY_BAIL") {
            self.bail = bail == "1" || bail.eq_ignore_ascii_case("true");
        }
        if let Some(order) = var("ASSAY_RUN_ORDER").filter(|s| !s.is_empty()) {
            self.run_order = order.parse()?;
        }
        if let Some(ms) = var("ASSAY_TIMEOUT_MS").and_then(|s| s.trim().parse::<u64>().ok()) {
            self.timeout = Duration::from_millis(ms);
        }
        if let Some(seed) = var("ASSAY_SEED").and_then(|s| s.trim().parse::<u64>().ok()) {
            self.seed = Some(seed);
        }
        Ok(self)
    }
}

/// Durations as integer milliseconds on the wire.
pub(crate) mod duration_ms {
    use super::*;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

pub(crate) fn serialize_opt_ms<S: Serializer>(d: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
    match d {
        Some(d) => s.serialize_some(&(d.as_millis() as u64)),
        None => s.serialize_none(),
    }
}

pub(crate) fn serialize_ms_f64<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64() * 1000.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let options = TesterOptions::default();
        assert!(!options.bail);
        assert_eq!(options.run_order, RunOrder::Sequence);
        assert_eq!(options.timeout, Duration::from_millis(5000));
    }

    #[test]
    fn test_deserialize_camel_case() {
        let options: TesterOptions =
            serde_json::from_str(r#"{"bail": true, "runOrder": "parallel", "timeout": 250}"#).unwrap();
        assert!(options.bail);
        assert_eq!(options.run_order, RunOrder::Parallel);
        assert_eq!(options.timeout, Duration::from_millis(250));
        assert!(options.identifier.is_none());
    }

    #[test]
    fn test_run_order_parse() {
        assert_eq!("Random".parse::<RunOrder>().unwrap(), RunOrder::Random);
        assert!(matches!(
            "shuffled".parse::<RunOrder>(),
            Err(TesterError::InvalidRunOrder(_))
        ));
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = [
            ("ASSAY_BAIL", "true"),
            ("ASSAY_RUN_ORDER", "random"),
            ("ASSAY_TIMEOUT_MS", "100"),
            ("ASSAY_SEED", "7"),
        ]
        .into_iter()
        .collect();
        let options = TesterOptions::default()
            .with_overrides(|k| vars.get(k).map(|v| v.to_string()))
            .unwrap();
        assert!(options.bail);
        assert_eq!(options.run_order, RunOrder::Random);
        assert_eq!(options.timeout, Duration::from_millis(100));
        assert_eq!(options.seed, Some(7));
    }
}
