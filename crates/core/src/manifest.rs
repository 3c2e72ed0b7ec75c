//! Unit manifests: the declarative description of an executable unit.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

/// How multiple instances of the same unit may be executed.
///
/// Declared by the manifest and carried through registration; the
/// orchestrator currently treats it as advisory.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionOrder {
    #[default]
    Parallel,
    Serial,
}

impl ExecutionOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionOrder::Parallel => "parallel",
            ExecutionOrder::Serial => "serial",
        }
    }
}

/// Fixed interval at which a recurring job re-executes its unit.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct Schedule(Duration);

impl Schedule {
    /// Longest accepted interval.
    pub const MAX_INTERVAL: Duration = Duration::from_secs(365 * 24 * 60 * 60);

    /// Build a schedule from an explicit interval. Zero and intervals longer
    /// than [`Schedule::MAX_INTERVAL`] are rejected.
    pub fn every(interval: Duration) -> CoreResult<Self> {
        Self::checked(humantime::format_duration(interval).to_string(), interval)
    }

    /// Parse a human readable interval such as `100ms`, `10s` or `1m 30s`.
    pub fn parse(input: &str) -> CoreResult<Self> {
        let interval = humantime::parse_duration(input.trim())
            .map_err(|e| CoreError::invalid_schedule(input, e.to_string()))?;
        Self::checked(input.to_string(), interval)
    }

    fn checked(input: String, interval: Duration) -> CoreResult<Self> {
        if interval.is_zero() {
            return Err(CoreError::invalid_schedule(input, "interval must be positive"));
        }
        if interval > Self::MAX_INTERVAL {
            return Err(CoreError::invalid_schedule(
                input,
                format!(
                    "interval must not exceed {}",
                    humantime::format_duration(Self::MAX_INTERVAL)
                ),
            ));
        }
        Ok(Self(interval))
    }

    pub fn interval(&self) -> Duration {
        self.0
    }
}

impl fmt::Display for Schedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", humantime::format_duration(self.0))
    }
}

/// Declarative description of a unit, as posted by clients and stored by a library.
///
/// Field names on the wire follow the service's established JSON shape
/// (`txn_type`, `cmd`, `cron`, ...).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitManifest {
    /// Unique unit name; also the transaction type clients submit against.
    #[serde(rename = "txn_type")]
    pub name: String,
    /// Runnable artifact reference, e.g. `<registry id>/<image>:<tag>`.
    pub image: String,
    #[serde(default)]
    pub cmd: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub execution_order: ExecutionOrder,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    /// Optional recurring interval (`"10s"`); empty means not scheduled.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub cron: String,
    /// Optional registry credential (`user:token`) used when pulling a private image.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<String>,
}

impl UnitManifest {
    pub fn new(name: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            image: image.into(),
            ..Self::default()
        }
    }

    pub fn with_cmd(mut self, cmd: impl Into<String>) -> Self {
        self.cmd = cmd.into();
        self
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn with_cron(mut self, cron: impl Into<String>) -> Self {
        self.cron = cron.into();
        self
    }

    pub fn with_auth(mut self, auth: impl Into<String>) -> Self {
        self.auth = Some(auth.into());
        self
    }

    pub fn with_execution_order(mut self, order: ExecutionOrder) -> Self {
        self.execution_order = order;
        self
    }

    /// The recurring schedule declared by `cron`, if any.
    pub fn schedule(&self) -> CoreResult<Option<Schedule>> {
        if self.cron.trim().is_empty() {
            return Ok(None);
        }
        Schedule::parse(&self.cron).map(Some)
    }

    /// Structural validation only: required fields present, schedule parseable.
    pub fn validate(&self) -> CoreResult<()> {
        if self.name.trim().is_empty() {
            return Err(CoreError::invalid_manifest("txn_type must not be empty"));
        }
        if self.image.trim().is_empty() {
            return Err(CoreError::invalid_manifest(format!(
                "unit '{}' has no image",
                self.name
            )));
        }
        self.schedule()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_established_wire_shape() {
        let raw = r#"{
            "txn_type": "counter",
            "image": "acme/counter:1.0",
            "cmd": "node",
            "args": ["index.js"],
            "execution_order": "serial",
            "env": {"MODE": "fast"},
            "cron": "10s",
            "unknown": true
        }"#;

        let manifest: UnitManifest = serde_json::from_str(raw).unwrap();
        assert_eq!(manifest.name, "counter");
        assert_eq!(manifest.args, vec!["index.js".to_string()]);
        assert_eq!(manifest.execution_order, ExecutionOrder::Serial);
        assert_eq!(manifest.env.get("MODE").map(String::as_str), Some("fast"));
        assert_eq!(
            manifest.schedule().unwrap().map(|s| s.interval()),
            Some(Duration::from_secs(10))
        );
        assert!(manifest.auth.is_none());
    }

    #[test]
    fn optional_fields_default() {
        let manifest: UnitManifest =
            serde_json::from_str(r#"{"txn_type": "echo", "image": "busybox"}"#).unwrap();
        assert_eq!(manifest.execution_order, ExecutionOrder::Parallel);
        assert!(manifest.cmd.is_empty());
        assert_eq!(manifest.schedule().unwrap(), None);
        manifest.validate().unwrap();
    }

    #[test]
    fn schedule_accepts_humantime_forms() {
        assert_eq!(Schedule::parse("100ms").unwrap().interval(), Duration::from_millis(100));
        assert_eq!(Schedule::parse("1m 30s").unwrap().interval(), Duration::from_secs(90));
    }

    #[test]
    fn schedule_rejects_zero_and_garbage() {
        assert!(matches!(Schedule::parse("0s"), Err(CoreError::InvalidSchedule { .. })));
        assert!(matches!(Schedule::parse("soon"), Err(CoreError::InvalidSchedule { .. })));
        assert!(Schedule::every(Duration::ZERO).is_err());
    }

    #[test]
    fn schedule_rejects_intervals_beyond_a_year() {
        assert!(matches!(
            Schedule::parse("300000000000years"),
            Err(CoreError::InvalidSchedule { .. })
        ));
        assert!(Schedule::every(Duration::MAX).is_err());
        assert!(Schedule::every(Schedule::MAX_INTERVAL + Duration::from_secs(1)).is_err());
        assert_eq!(
            Schedule::every(Schedule::MAX_INTERVAL).unwrap().interval(),
            Schedule::MAX_INTERVAL
        );
        assert!(matches!(
            UnitManifest::new("slow", "busybox").with_cron("300000000000years").validate(),
            Err(CoreError::InvalidSchedule { .. })
        ));
    }

    #[test]
    fn validate_requires_name_and_image() {
        assert!(matches!(
            UnitManifest::new("", "busybox").validate(),
            Err(CoreError::InvalidManifest(_))
        ));
        assert!(matches!(
            UnitManifest::new("echo", " ").validate(),
            Err(CoreError::InvalidManifest(_))
        ));
        assert!(matches!(
            UnitManifest::new("echo", "busybox").with_cron("every tuesday").validate(),
            Err(CoreError::InvalidSchedule { .. })
        ));
    }
}
