//! Small built-in transforms.

use anyhow::Result;
use std::str::FromStr;

use super::traits::{Plugin, DEFAULT_PRIORITY};
use crate::config::ComponentConfig;
use crate::error::ConfigurationError;

/// Which hooks a built-in plugin runs in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Phase {
    Pre,
    Post,
    #[default]
    Both,
}

impl Phase {
    fn runs_pre(self) -> bool {
        matches!(self, Self::Pre | Self::Both)
    }

    fn runs_post(self) -> bool {
        matches!(self, Self::Post | Self::Both)
    }
}

impl FromStr for Phase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pre" => Ok(Self::Pre),
            "post" => Ok(Self::Post),
            "both" => Ok(Self::Both),
            other => Err(format!("unknown phase `{other}` (expected pre, post or both)")),
        }
    }
}

/// Read the shared `priority` and `phase` options.
fn common_options(
    plugin: &str,
    config: &ComponentConfig,
) -> Result<(i32, Phase), ConfigurationError> {
    let priority = match config.get("priority") {
        None => DEFAULT_PRIORITY,
        Some(value) => value
            .as_i64()
            .and_then(|p| i32::try_from(p).ok())
            .ok_or_else(|| {
                ConfigurationError::new(format!("{plugin}: `priority` must be an integer"))
            })?,
    };

    let phase = match config.get("phase") {
        None => Phase::default(),
        Some(value) => value
            .as_str()
            .ok_or_else(|| ConfigurationError::new(format!("{plugin}: `phase` must be a string")))?
            .parse()
            .map_err(|e: String| ConfigurationError::new(format!("{plugin}: {e}")))?,
    };

    Ok((priority, phase))
}

/// Uppercases text.
#[derive(Debug, Clone)]
pub struct UpperPlugin {
    priority: i32,
    phase: Phase,
}

impl UpperPlugin {
    pub fn new(priority: i32, phase: Phase) -> Self {
        Self { priority, phase }
    }

    pub fn from_config(config: &ComponentConfig) -> Result<Self, ConfigurationError> {
        let (priority, phase) = common_options("upper", config)?;
        Ok(Self::new(priority, phase))
    }
}

impl Plugin for UpperPlugin {
    fn name(&self) -> &str {
        "upper"
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn pre_process(&self, text: &str) -> Result<String> {
        Ok(if self.phase.runs_pre() {
            text.to_uppercase()
        } else {
            text.to_string()
        })
    }

    fn post_process(&self, text: &str) -> Result<String> {
        Ok(if self.phase.runs_post() {
            text.to_uppercase()
        } else {
            text.to_string()
        })
    }
}

/// Appends a fixed suffix.
#[derive(Debug, Clone)]
pub struct SuffixPlugin {
    suffix: String,
    priority: i32,
    phase: Phase,
}

impl SuffixPlugin {
    pub fn new(suffix: impl Into<String>, priority: i32, phase: Phase) -> Self {
        Self {
            suffix: suffix.into(),
            priority,
            phase,
        }
    }

    pub fn from_config(config: &ComponentConfig) -> Result<Self, ConfigurationError> {
        let (priority, phase) = common_options("suffix", config)?;
        let suffix = match config.get("suffix") {
            None => String::new(),
            Some(value) => value
                .as_str()
                .ok_or_else(|| ConfigurationError::new("suffix: `suffix` must be a string"))?
                .to_string(),
        };
        Ok(Self::new(suffix, priority, phase))
    }
}

impl Plugin for SuffixPlugin {
    fn name(&self) -> &str {
        "suffix"
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn pre_process(&self, text: &str) -> Result<String> {
        Ok(if self.phase.runs_pre() {
            format!("{text}{}", self.suffix)
        } else {
            text.to_string()
        })
    }

    fn post_process(&self, text: &str) -> Result<String> {
        Ok(if self.phase.runs_post() {
            format!("{text}{}", self.suffix)
        } else {
            text.to_string()
        })
    }
}
