// SPDX-License-Identifier: MIT OR Apache-2.0
//! Cross-crate scenarios: TOML definitions through resolution, wiring and
//! telemetry.
#![cfg(unix)]

use pipexec::{Context, SharedBuffer};
use pipexec_config::PipelineConfig;
use pipexec_telemetry::{RecordingLogger, RecordingTracer, Status, Value};

const PIPELINE: &str = r#"
[[stages]]
command = "echo"
args = ["a\nb\nc"]

[[stages]]
command = "grep"
args = ["b"]

[[stages]]
command = "sed"
args = ["-E", "s#b#B#g"]
"#;

#[tokio::test]
async fn config_pipeline_emits_one_span_per_stage() {
    let cfg = PipelineConfig::from_toml_str(PIPELINE).unwrap();
    let tracer = RecordingTracer::new();
    let out = SharedBuffer::new();

    let (cmd, result) = cfg
        .to_builder(Context::background())
        .unwrap()
        .tracer(tracer.clone())
        .stdout(out.clone())
        .run()
        .await;
    result.unwrap();
    assert_eq!(out.contents().trim(), "B");

    let spans = tracer.spans();
    assert_eq!(spans.len(), 3);
    let paths: Vec<_> = cmd.stages().map(|stage| stage.path().to_string()).collect();
    for (span, path) in spans.iter().zip(&paths) {
        assert_eq!(span.status, Status::Ok);
        assert_eq!(span.end_count, 1);
        assert_eq!(span.attribute("exec.exit_code"), Some(&Value::I64(0)));
        let Some(Value::StringArray(args)) = span.attribute("exec.args") else {
            panic!("missing exec.args on {span:?}");
        };
        assert_eq!(&args[0], path);
        assert_eq!(pipexec_which::look_path(path).unwrap().to_string_lossy(), *path);
    }
}

#[tokio::test]
async fn cancelled_context_stops_config_pipeline() {
    let cfg = PipelineConfig::from_toml_str(PIPELINE).unwrap();
    let token = pipexec::CancelToken::new();
    token.cancel();
    let logger = RecordingLogger::new();

    let (cmd, result) = cfg
        .to_builder(Context::with_cancel(token))
        .unwrap()
        .logger(logger.clone())
        .run()
        .await;

    assert!(matches!(result, Err(pipexec::ExecError::Cancelled)));
    assert!(cmd.stages().all(|stage| stage.process_id().is_none()));
    assert!(logger.entries().is_empty(), "{logger}");
}

#[tokio::test]
async fn throwaway_script_stage_sees_config_env() {
    let dir = tempfile::tempdir().unwrap();
    let script = dir.path().join("shout.sh");
    std::fs::write(&script, "read line\necho \"$GREETING $line\" | tr a-z A-Z\n").unwrap();

    let toml = format!(
        r#"
[env]
GREETING = "hi"

[[stages]]
command = "echo"
args = ["there"]

[[stages]]
command = "sh"
args = [{script:?}]
"#,
        script = script.to_string_lossy()
    );
    let cfg = PipelineConfig::from_toml_str(&toml).unwrap();
    assert!(cfg.validate().unwrap().is_empty());

    let out = SharedBuffer::new();
    let (cmd, result) = cfg
        .to_builder(Context::background())
        .unwrap()
        .stdout(out.clone())
        .run()
        .await;
    result.unwrap();
    assert_eq!(out.contents(), "HI THERE\n");
    assert!(cmd.next().is_some_and(|tail| tail.env().iter().any(|e| e == "GREETING=hi")));
}
