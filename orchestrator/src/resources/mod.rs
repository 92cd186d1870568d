//! Resource allocation policy for sessions
//!
//! A [`ResourceProfile`] is validated once and then attached, unchanged, to a
//! session for its whole lifetime.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::ResourceDefaults;
use crate::container::{ContainerRuntime, OrchestrationError};

/// Errors raised while validating resource limits
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProfileError {
    #[error("Invalid limit: {0}")]
    InvalidLimit(String),
}

/// Memory size in bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MemSize(u64);

impl MemSize {
    pub fn bytes(&self) -> u64 {
        self.0
    }

    /// Parse sizes like "4G", "512M", "1024K" or a plain byte count.
    /// Suffixes are binary multiples and case-insensitive.
    pub fn parse(s: &str) -> Result<Self, ProfileError> {
        let s = s.trim();
        let invalid = || ProfileError::InvalidLimit(format!("memory limit {:?}", s));

        let (digits, multiplier) = match s.chars().last() {
            Some(c) if c.is_ascii_digit() => (s, 1u64),
            Some(c) => {
                let multiplier = match c.to_ascii_uppercase() {
                    'K' => 1u64 << 10,
                    'M' => 1 << 20,
                    'G' => 1 << 30,
                    'T' => 1 << 40,
                    _ => return Err(invalid()),
                };
                (&s[..s.len() - c.len_utf8()], multiplier)
            }
            None => return Err(invalid()),
        };

        let value: f64 = digits.trim().parse().map_err(|_| invalid())?;
        if !value.is_finite() || value <= 0.0 {
            return Err(invalid());
        }

        let bytes = (value * multiplier as f64) as u64;
        if bytes == 0 {
            return Err(invalid());
        }

        Ok(Self(bytes))
    }
}

impl fmt::Display for MemSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const UNITS: [(u64, &str); 3] = [(1 << 30, "G"), (1 << 20, "M"), (1 << 10, "K")];
        for (size, unit) in UNITS {
            if self.0 >= size && self.0 % size == 0 {
                return write!(f, "{}{}", self.0 / size, unit);
            }
        }
        write!(f, "{}", self.0)
    }
}

/// Validated CPU/memory/accelerator allocation for one session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceProfile {
    cpu_limit: f64,
    mem_limit: MemSize,
    accelerators: BTreeSet<String>,
}

impl ResourceProfile {
    /// Validate raw limits into a profile
    pub fn validate(
        cpu_limit: f64,
        mem_limit: MemSize,
        accelerator_visibility: impl IntoIterator<Item = String>,
    ) -> Result<Self, ProfileError> {
        if !cpu_limit.is_finite() || cpu_limit <= 0.0 {
            return Err(ProfileError::InvalidLimit(format!(
                "cpu limit must be positive, got {}",
                cpu_limit
            )));
        }

        if mem_limit.bytes() == 0 {
            return Err(ProfileError::InvalidLimit(
                "memory limit must be positive".to_string(),
            ));
        }

        let accelerators = accelerator_visibility
            .into_iter()
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .collect();

        Ok(Self {
            cpu_limit,
            mem_limit,
            accelerators,
        })
    }

    /// Build the default profile from configuration
    pub fn from_defaults(defaults: &ResourceDefaults) -> Result<Self, ProfileError> {
        let mem = MemSize::parse(&defaults.mem_limit)?;
        let devices = defaults
            .gpu
            .split(',')
            .map(str::to_string)
            .collect::<Vec<_>>();
        Self::validate(defaults.cpu_limit, mem, devices)
    }

    pub fn cpu_limit(&self) -> f64 {
        self.cpu_limit
    }

    pub fn mem_limit(&self) -> MemSize {
        self.mem_limit
    }

    pub fn accelerators(&self) -> &BTreeSet<String> {
        &self.accelerators
    }

    pub fn wants_accelerators(&self) -> bool {
        !self.accelerators.is_empty()
    }

    /// Check that the runtime can honor this profile.
    ///
    /// Accelerator visibility needs device passthrough; a runtime without it
    /// makes the profile unusable for this start.
    pub async fn attach(&self, runtime: &dyn ContainerRuntime) -> Result<(), OrchestrationError> {
        if self.wants_accelerators() && !runtime.supports_device_passthrough().await {
            return Err(OrchestrationError::ResourceUnavailable(format!(
                "runtime cannot pass through accelerators {:?}",
                self.accelerators
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::MockContainerRuntime;

    #[test]
    fn test_parse_mem_size() {
        assert_eq!(MemSize::parse("4G").unwrap().bytes(), 4u64 << 30);
        assert_eq!(MemSize::parse("512m").unwrap().bytes(), 512 << 20);
        assert_eq!(MemSize::parse("1.5G").unwrap().bytes(), 3u64 << 29);
        assert_eq!(MemSize::parse("2048").unwrap().bytes(), 2048);
        assert!(MemSize::parse("").is_err());
        assert!(MemSize::parse("0G").is_err());
        assert!(MemSize::parse("-1M").is_err());
        assert!(MemSize::parse("lots").is_err());
        assert_eq!(MemSize::parse("4G").unwrap().to_string(), "4G");
    }

    #[test]
    fn test_validate_rejects_non_positive() {
        let mem = MemSize::parse("1G").unwrap();
        assert!(ResourceProfile::validate(0.0, mem, vec![]).is_err());
        assert!(ResourceProfile::validate(-2.0, mem, vec![]).is_err());
        assert!(ResourceProfile::validate(f64::NAN, mem, vec![]).is_err());
        assert!(ResourceProfile::validate(0.5, mem, vec![]).is_ok());
    }

    #[test]
    fn test_from_defaults() {
        let profile = ResourceProfile::from_defaults(&ResourceDefaults::default()).unwrap();
        assert_eq!(profile.cpu_limit(), 1.0);
        assert_eq!(profile.mem_limit().bytes(), 4u64 << 30);
        assert!(!profile.wants_accelerators());

        let defaults = ResourceDefaults {
            cpu_limit: 2.0,
            mem_limit: "8G".to_string(),
            gpu: "0, 1".to_string(),
        };
        let profile = ResourceProfile::from_defaults(&defaults).unwrap();
        assert_eq!(profile.accelerators().len(), 2);
        assert!(profile.accelerators().contains("1"));
    }

    #[tokio::test]
    async fn test_accelerators_need_passthrough_at_attach() {
        let mem = MemSize::parse("1G").unwrap();
        // validation succeeds regardless of runtime support
        let profile = ResourceProfile::validate(1.0, mem, vec!["0".to_string()]).unwrap();

        let mut runtime = MockContainerRuntime::new();
        runtime
            .expect_supports_device_passthrough()
            .returning(|| false);

        let err = profile.attach(&runtime).await.unwrap_err();
        assert!(matches!(err, OrchestrationError::ResourceUnavailable(_)));

        let cpu_only = ResourceProfile::validate(1.0, mem, vec![]).unwrap();
        assert!(cpu_only.attach(&runtime).await.is_ok());
    }
}
