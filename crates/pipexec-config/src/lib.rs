// SPDX-License-Identifier: MIT OR Apache-2.0
//! Declarative pipeline definitions for pipexec.
//!
//! A [`PipelineConfig`] lists the stages of a pipeline in TOML, together with
//! environment entries and an optional log level. It can be validated, which
//! yields advisory [`ConfigWarning`]s, and converted into a
//! [`CmdBuilder`](pipexec::CmdBuilder).
#![deny(unsafe_code)]
#![warn(missing_docs)]

use std::collections::BTreeMap;
use std::path::Path;

use pipexec::{CmdBuilder, Context, command_with_context};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur while loading or validating a pipeline definition.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The requested file does not exist.
    #[error("config file not found: {path}")]
    FileNotFound {
        /// Path that was requested.
        path: String,
    },

    /// The file exists but could not be read.
    #[error("failed to read config {path}: {source}")]
    Io {
        /// Path that was requested.
        path: String,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The content is not valid TOML for a pipeline definition.
    #[error("failed to parse config: {reason}")]
    ParseError {
        /// Human-readable parse error detail.
        reason: String,
    },

    /// Semantic validation failed (one or more problems).
    #[error("config validation failed: {reasons:?}")]
    ValidationError {
        /// Individual validation failure messages.
        reasons: Vec<String>,
    },
}

// ---------------------------------------------------------------------------
// Warnings
// ---------------------------------------------------------------------------

/// Advisory issues that do not prevent building the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigWarning {
    /// A stage's command cannot be resolved on `PATH` right now. The pipeline
    /// can still be built; running it reports the not-found error.
    UnresolvedCommand {
        /// Zero-based stage index.
        stage: usize,
        /// Command as written.
        command: String,
    },
}

impl std::fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigWarning::UnresolvedCommand { stage, command } => {
                write!(f, "stage {stage}: command '{command}' not found on PATH")
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Config types
// ---------------------------------------------------------------------------

/// A pipeline: stages run head to tail, stdout of each feeding the next.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Log level override (e.g. `"debug"`, `"info"`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,

    /// Environment entries added to every stage.
    #[serde(default)]
    pub env: BTreeMap<String, String>,

    /// Stages in pipeline order.
    #[serde(default)]
    pub stages: Vec<StageConfig>,
}

/// One stage of a [`PipelineConfig`].
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct StageConfig {
    /// Executable name or path.
    pub command: String,
    /// Arguments, not including the command itself.
    #[serde(default)]
    pub args: Vec<String>,
}

/// Recognised log levels.
const VALID_LOG_LEVELS: &[&str] = &["error", "warn", "info", "debug", "trace"];

/// Environment variable overriding [`PipelineConfig::log_level`].
pub const LOG_LEVEL_ENV: &str = "PIPEXEC_LOG_LEVEL";

impl PipelineConfig {
    /// Parse a TOML string.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        toml::from_str::<PipelineConfig>(content).map_err(|e| ConfigError::ParseError {
            reason: e.to_string(),
        })
    }

    /// Read and parse a TOML file, then apply environment overrides.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => ConfigError::FileNotFound {
                path: path.display().to_string(),
            },
            _ => ConfigError::Io {
                path: path.display().to_string(),
                source: e,
            },
        })?;
        let mut config = Self::from_toml_str(&content)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply `PIPEXEC_LOG_LEVEL` when set.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var(LOG_LEVEL_ENV) {
            self.log_level = Some(val);
        }
    }

    /// Check the definition, returning advisory warnings.
    ///
    /// Hard errors (no stages, empty commands, malformed env keys, unknown
    /// log level) come back as [`ConfigError::ValidationError`].
    pub fn validate(&self) -> Result<Vec<ConfigWarning>, ConfigError> {
        let mut errors: Vec<String> = Vec::new();
        let mut warnings: Vec<ConfigWarning> = Vec::new();

        if let Some(level) = self
            .log_level
            .as_deref()
            .filter(|level| !VALID_LOG_LEVELS.contains(level))
        {
            errors.push(format!("invalid log_level '{level}'"));
        }

        for key in self.env.keys() {
            if key.is_empty() {
                errors.push("env key must not be empty".into());
            } else if key.contains('=') {
                errors.push(format!("env key '{key}' must not contain '='"));
            }
        }

        if self.stages.is_empty() {
            errors.push("at least one stage is required".into());
        }
        for (i, stage) in self.stages.iter().enumerate() {
            if stage.command.trim().is_empty() {
                errors.push(format!("stage {i}: command must not be empty"));
            } else if pipexec_which::look_path(&stage.command).is_err() {
                warnings.push(ConfigWarning::UnresolvedCommand {
                    stage: i,
                    command: stage.command.clone(),
                });
            }
        }

        if errors.is_empty() {
            Ok(warnings)
        } else {
            Err(ConfigError::ValidationError { reasons: errors })
        }
    }

    /// Build the equivalent pipeline under `ctx`.
    ///
    /// The first stage becomes the head; each further stage is appended with
    /// [`CmdBuilder::pipe`]. Environment entries go on the head and are
    /// shared downstream when the pipeline is wired.
    pub fn to_builder(&self, ctx: Context) -> Result<CmdBuilder, ConfigError> {
        let Some((head, rest)) = self.stages.split_first() else {
            return Err(ConfigError::ValidationError {
                reasons: vec!["at least one stage is required".into()],
            });
        };

        let mut builder = command_with_context(ctx, &head.command)
            .args(head.args.iter().cloned())
            .envs(&self.env);
        for stage in rest {
            builder = builder.pipe(&stage.command, stage.args.iter().cloned());
        }
        Ok(builder)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"
        log_level = "debug"

        [env]
        GREETING = "hi"

        [[stages]]
        command = "echo"
        args = ["a\nb\nc"]

        [[stages]]
        command = "grep"
        args = ["b"]
    "#;

    #[test]
    fn parse_sample() {
        let cfg = PipelineConfig::from_toml_str(SAMPLE).unwrap();
        assert_eq!(cfg.log_level.as_deref(), Some("debug"));
        assert_eq!(cfg.env.get("GREETING").map(String::as_str), Some("hi"));
        assert_eq!(cfg.stages.len(), 2);
        assert_eq!(cfg.stages[0].args, ["a\nb\nc"]);
    }

    #[test]
    fn args_default_to_empty() {
        let cfg = PipelineConfig::from_toml_str("[[stages]]\ncommand = \"true\"\n").unwrap();
        assert!(cfg.stages[0].args.is_empty());
    }

    #[test]
    fn invalid_toml_gives_parse_error() {
        let err = PipelineConfig::from_toml_str("this is [not valid toml =").unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
    }

    #[test]
    fn wrong_types_give_parse_error() {
        let err = PipelineConfig::from_toml_str("stages = 42").unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
    }

    #[test]
    fn empty_config_fails_validation() {
        let err = PipelineConfig::default().validate().unwrap_err();
        match err {
            ConfigError::ValidationError { reasons } => {
                assert_eq!(reasons, ["at least one stage is required"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn validation_collects_every_problem() {
        let mut cfg = PipelineConfig::from_toml_str(SAMPLE).unwrap();
        cfg.log_level = Some("verbose".into());
        cfg.env.insert("A=B".into(), "x".into());
        cfg.stages.push(StageConfig {
            command: "  ".into(),
            args: vec![],
        });

        let ConfigError::ValidationError { reasons } = cfg.validate().unwrap_err() else {
            panic!("expected validation error");
        };
        assert_eq!(reasons.len(), 3, "{reasons:?}");
        assert!(reasons.iter().any(|r| r.contains("log_level")));
        assert!(reasons.iter().any(|r| r.contains("'A=B'")));
        assert!(reasons.iter().any(|r| r.contains("stage 2")));
    }

    #[test]
    fn unresolved_command_is_only_a_warning() {
        let cfg = PipelineConfig::from_toml_str(
            "[[stages]]\ncommand = \"definitely-not-installed-xyz\"\n",
        )
        .unwrap();
        let warnings = cfg.validate().unwrap();
        assert_eq!(
            warnings,
            [ConfigWarning::UnresolvedCommand {
                stage: 0,
                command: "definitely-not-installed-xyz".into(),
            }]
        );
        assert_eq!(
            warnings[0].to_string(),
            "stage 0: command 'definitely-not-installed-xyz' not found on PATH"
        );
    }

    #[test]
    fn load_missing_file_is_file_not_found() {
        let err = PipelineConfig::load(Path::new("/definitely/not/here.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound { .. }));
    }

    #[test]
    fn load_reads_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        let cfg = PipelineConfig::load(file.path()).unwrap();
        assert_eq!(cfg.stages[1].command, "grep");
    }

    #[test]
    fn to_builder_chains_stages() {
        let cfg = PipelineConfig::from_toml_str(
            r#"
            [[stages]]
            command = "not-installed-a"
            args = ["x y"]

            [[stages]]
            command = "not-installed-b"
            "#,
        )
        .unwrap();
        let cmd = cfg.to_builder(Context::background()).unwrap().build();
        assert_eq!(cmd.to_string(), "not-installed-a 'x y' | not-installed-b");
        assert!(cmd.err().is_some());
    }

    #[test]
    fn to_builder_without_stages_fails() {
        let err = PipelineConfig::default()
            .to_builder(Context::background())
            .unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError { .. }));
    }

    #[test]
    fn round_trips_through_toml() {
        let cfg = PipelineConfig::from_toml_str(SAMPLE).unwrap();
        let text = toml::to_string(&cfg).unwrap();
        assert_eq!(PipelineConfig::from_toml_str(&text).unwrap(), cfg);
    }
}
