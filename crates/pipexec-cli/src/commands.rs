// SPDX-License-Identifier: MIT OR Apache-2.0
//! Subcommand implementations.

use std::path::Path;
use std::process::ExitCode;

use anyhow::{Context as _, Result};
use pipexec::{CancelToken, CmdBuilder, Context, ExecError, Input, Output, command_with_context};
use pipexec_config::{ConfigError, PipelineConfig};
use pipexec_telemetry::{TracingLogger, TracingTracer};
use tracing::{debug, warn};

/// Separates stages of a pipeline given on the command line.
const STAGE_SEPARATOR: &str = "|";

/// Exit code used when an executable cannot be found.
const NOT_FOUND_EXIT: u8 = 127;

/// What `run` executes.
#[derive(Debug)]
pub enum PipelineSource {
    /// A TOML pipeline definition.
    Config(PipelineConfig),
    /// Stages parsed from the command line, each `(command, args)`.
    Argv(Vec<(String, Vec<String>)>),
}

impl PipelineSource {
    /// Pick the pipeline from exactly one of `config` and `argv`.
    pub fn from_args(config: Option<&Path>, argv: &[String]) -> Result<Self> {
        match (config, argv.is_empty()) {
            (Some(_), false) => {
                anyhow::bail!("pass either --config or a command line, not both")
            }
            (Some(path), true) => {
                let config = PipelineConfig::load(path)
                    .with_context(|| format!("load pipeline '{}'", path.display()))?;
                Ok(PipelineSource::Config(config))
            }
            (None, false) => Ok(PipelineSource::Argv(split_stages(argv)?)),
            (None, true) => {
                anyhow::bail!("nothing to run: pass --config FILE or a command line after --")
            }
        }
    }

    /// Log level requested by the pipeline definition, if any.
    pub fn log_level(&self) -> Option<&str> {
        match self {
            PipelineSource::Config(config) => config.log_level.as_deref(),
            PipelineSource::Argv(_) => None,
        }
    }

    fn builder(&self, ctx: Context) -> Result<CmdBuilder> {
        match self {
            PipelineSource::Config(config) => {
                for warning in config.validate()? {
                    warn!(target: "pipexec", "{warning}");
                }
                Ok(config.to_builder(ctx)?)
            }
            PipelineSource::Argv(stages) => {
                let Some(((name, args), rest)) = stages.split_first() else {
                    anyhow::bail!("nothing to run");
                };
                let mut builder = command_with_context(ctx, name).args(args.iter().cloned());
                for (name, args) in rest {
                    builder = builder.pipe(name, args.iter().cloned());
                }
                Ok(builder)
            }
        }
    }
}

/// Split `argv` on literal `|` arguments into `(command, args)` stages.
pub fn split_stages(argv: &[String]) -> Result<Vec<(String, Vec<String>)>> {
    argv.split(|arg| arg == STAGE_SEPARATOR)
        .enumerate()
        .map(|(i, stage)| match stage.split_first() {
            Some((name, args)) => Ok((name.clone(), args.to_vec())),
            None => anyhow::bail!("stage {i} is empty"),
        })
        .collect()
}

/// Parse a `KEY=VALUE` flag value.
pub fn parse_key_value_flag(raw: &str, flag_name: &str) -> Result<(String, String)> {
    let (raw_key, raw_value) = raw
        .split_once('=')
        .with_context(|| format!("{flag_name} expects KEY=VALUE, got '{raw}'"))?;

    let key = raw_key.trim();
    if key.is_empty() {
        anyhow::bail!("{flag_name} key cannot be empty (got '{raw}')");
    }

    Ok((key.to_string(), raw_value.to_string()))
}

/// Process exit code reflecting a pipeline failure.
pub fn exit_code_for(err: &ExecError) -> u8 {
    match err {
        ExecError::NotFound(_) => NOT_FOUND_EXIT,
        ExecError::Exit(exit) => u8::try_from(exit.code())
            .ok()
            .filter(|code| *code != 0)
            .unwrap_or(1),
        _ => 1,
    }
}

pub async fn cmd_run(source: PipelineSource, env_vars: &[String]) -> Result<ExitCode> {
    let token = CancelToken::new();
    let ctx = Context::with_cancel(token.clone());
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            debug!(target: "pipexec", "interrupt received, cancelling");
            token.cancel();
        }
    });

    let mut builder = source.builder(ctx)?;
    for raw in env_vars {
        let (key, value) = parse_key_value_flag(raw, "--env")?;
        builder = builder.env(key, value);
    }

    let (cmd, result) = builder
        .stdin(Input::Inherit)
        .stdout(Output::Inherit)
        .stderr(Output::Inherit)
        .tracer(TracingTracer::new())
        .logger(TracingLogger)
        .run()
        .await;
    debug!(target: "pipexec", pipeline = %cmd, ok = result.is_ok(), "pipeline finished");

    Ok(match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("pipexec: {err}");
            ExitCode::from(exit_code_for(&err))
        }
    })
}

pub fn cmd_which(name: &str) -> Result<ExitCode> {
    let path = pipexec::look_path(name)?;
    println!("{}", path.display());
    Ok(ExitCode::SUCCESS)
}

pub fn cmd_check(path: &Path) -> Result<ExitCode> {
    let config = PipelineConfig::load(path)
        .with_context(|| format!("load pipeline '{}'", path.display()))?;

    match config.validate() {
        Ok(warnings) => {
            for warning in &warnings {
                println!("warning: {warning}");
            }
            println!("config: ok ({} stages)", config.stages.len());
            Ok(ExitCode::SUCCESS)
        }
        Err(ConfigError::ValidationError { reasons }) => {
            for reason in &reasons {
                println!("error: {reason}");
            }
            Ok(ExitCode::FAILURE)
        }
        Err(err) => Err(err.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn split_stages_on_pipe_tokens() {
        let stages = split_stages(&argv(&["echo", "a b", "|", "tr", "a-z", "A-Z"])).unwrap();
        assert_eq!(
            stages,
            vec![
                ("echo".to_string(), argv(&["a b"])),
                ("tr".to_string(), argv(&["a-z", "A-Z"])),
            ]
        );
    }

    #[test]
    fn split_stages_rejects_empty_stage() {
        let err = split_stages(&argv(&["echo", "|", "|", "cat"])).unwrap_err();
        assert!(err.to_string().contains("stage 1 is empty"));
    }

    #[test]
    fn key_value_flag_parsing() {
        assert_eq!(
            parse_key_value_flag("A=b=c", "--env").unwrap(),
            ("A".to_string(), "b=c".to_string())
        );
        assert!(parse_key_value_flag("novalue", "--env").is_err());
        assert!(parse_key_value_flag("=x", "--env").is_err());
    }

    #[test]
    fn exit_codes() {
        let not_found = ExecError::from(pipexec::NotFoundError::new("x"));
        assert_eq!(exit_code_for(&not_found), 127);
        assert_eq!(exit_code_for(&ExecError::Cancelled), 1);
    }

    #[test]
    fn source_requires_exactly_one_input() {
        assert!(PipelineSource::from_args(None, &[]).is_err());
        assert!(PipelineSource::from_args(Some(Path::new("x.toml")), &argv(&["echo"])).is_err());
        assert!(matches!(
            PipelineSource::from_args(None, &argv(&["echo"])).unwrap(),
            PipelineSource::Argv(_)
        ));
    }
}
