//! CLI parsing, configuration layering and command execution.

use clap::Parser;
use serial_test::serial;
use spatialbn_cli::commands::{GradDefCommand, RunCommand};
use spatialbn_cli::{Cli, Commands, ConfigAction, load_configuration};
use spatialbn_common::{BackendPreference, KernelBackend, LogFormat, RuntimeConfig};
use std::fs;
use tempfile::TempDir;

const TRAIN_DEF: &str = r#"{
    "type": "SpatialBN",
    "name": "bn",
    "input": ["X", "scale", "bias", "rm", "rv"],
    "output": ["Y", "rm", "rv", "sm", "siv"],
    "arg": [{"name": "momentum", "f": 0.5}]
}"#;

const TRAIN_INPUTS: &str = r#"[
    {"shape": [2, 2, 2], "data": [1.0, 2.0, 10.0, 20.0, 3.0, 4.0, 30.0, 40.0]},
    {"shape": [2], "data": [1.0, 1.0]},
    {"shape": [2], "data": [0.0, 0.0]},
    {"shape": [2], "data": [0.0, 0.0]},
    {"shape": [2], "data": [1.0, 1.0]}
]"#;

fn clear_env() {
    for key in [
        "SPATIALBN_LOG_LEVEL",
        "SPATIALBN_LOG_FORMAT",
        "SPATIALBN_KERNEL",
        "SPATIALBN_NUM_THREADS",
    ] {
        unsafe {
            std::env::remove_var(key);
        }
    }
}

#[test]
fn parses_global_flags_after_subcommand() {
    let cli = Cli::try_parse_from([
        "spatialbn",
        "run",
        "--def",
        "op.json",
        "--inputs",
        "in.json",
        "--kernel",
        "fallback",
        "--log-format",
        "json",
    ])
    .unwrap();
    assert_eq!(cli.kernel, Some(BackendPreference::Fixed(KernelBackend::CpuFallback)));
    assert_eq!(cli.log_format, Some(LogFormat::Json));
    match cli.command {
        Some(Commands::Run(cmd)) => {
            assert_eq!(cmd.def.to_str(), Some("op.json"));
            assert!(cmd.output.is_none());
        }
        other => panic!("unexpected command {other:?}"),
    }
}

#[test]
fn parses_config_show_and_grad_alias() {
    let cli = Cli::try_parse_from(["spatialbn", "config", "show"]).unwrap();
    assert!(matches!(cli.command, Some(Commands::Config { action: ConfigAction::Show })));

    let cli = Cli::try_parse_from(["spatialbn", "grad", "--def", "bn.json"]).unwrap();
    assert!(matches!(cli.command, Some(Commands::GradDef(_))));
}

#[test]
fn rejects_unknown_kernel() {
    assert!(Cli::try_parse_from(["spatialbn", "--kernel", "cuda", "info"]).is_err());
}

#[test]
#[serial]
fn flags_override_file_and_env() {
    clear_env();
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("spatialbn.toml");
    fs::write(
        &path,
        "[logging]\nlevel = \"warn\"\nformat = \"compact\"\n\n[kernel]\nnum_threads = 3\n",
    )
    .unwrap();

    unsafe {
        std::env::set_var("SPATIALBN_LOG_LEVEL", "error");
    }
    let cli = Cli::try_parse_from([
        "spatialbn",
        "--config",
        path.to_str().unwrap(),
        "--threads",
        "2",
        "info",
    ])
    .unwrap();
    let config = load_configuration(&cli).unwrap();
    clear_env();

    assert_eq!(config.logging.level, "error");
    assert_eq!(config.logging.format, LogFormat::Compact);
    assert_eq!(config.kernel.num_threads, Some(2));
    assert_eq!(config.kernel.backend, BackendPreference::Auto);
}

#[test]
#[serial]
fn missing_explicit_config_file_fails() {
    clear_env();
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("absent.toml");
    let cli =
        Cli::try_parse_from(["spatialbn", "--config", path.to_str().unwrap(), "info"]).unwrap();
    let err = load_configuration(&cli).unwrap_err();
    assert!(format!("{err:#}").contains("absent.toml"));
}

#[test]
#[serial]
fn bad_env_value_fails() {
    clear_env();
    unsafe {
        std::env::set_var("SPATIALBN_NUM_THREADS", "many");
    }
    let cli = Cli::try_parse_from(["spatialbn", "info"]).unwrap();
    let result = load_configuration(&cli);
    clear_env();
    assert!(result.is_err());
}

#[test]
fn run_writes_named_outputs() {
    let dir = TempDir::new().unwrap();
    let def = dir.path().join("bn.json");
    let inputs = dir.path().join("inputs.json");
    let output = dir.path().join("out.json");
    fs::write(&def, TRAIN_DEF).unwrap();
    fs::write(&inputs, TRAIN_INPUTS).unwrap();

    let cmd = RunCommand { def, inputs, output: Some(output.clone()) };
    cmd.execute(&RuntimeConfig::default()).unwrap();

    let written: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&output).unwrap()).unwrap();
    let outputs = written.as_array().unwrap();
    assert_eq!(outputs.len(), 5);
    assert_eq!(outputs[0]["name"], "Y");
    assert_eq!(outputs[0]["shape"], serde_json::json!([2, 2, 2]));
    assert_eq!(outputs[3]["name"], "sm");
    assert_eq!(outputs[3]["data"], serde_json::json!([2.5, 25.0]));
    let running_mean = outputs[1]["data"][0].as_f64().unwrap();
    assert!((running_mean - 1.25).abs() < 1e-6);
}

#[test]
fn run_reports_invalid_definition() {
    let dir = TempDir::new().unwrap();
    let def = dir.path().join("bn.json");
    let inputs = dir.path().join("inputs.json");
    fs::write(&def, TRAIN_DEF.replace("\"sm\", \"siv\"", "\"sm\"")).unwrap();
    fs::write(&inputs, TRAIN_INPUTS).unwrap();

    let cmd = RunCommand { def, inputs, output: Some(dir.path().join("out.json")) };
    let err = cmd.execute(&RuntimeConfig::default()).unwrap_err();
    assert_eq!(spatialbn_cli::exit::exit_code(&err), spatialbn_cli::exit::EXIT_CONFIG);
}

#[test]
fn grad_def_writes_gradient_definition() {
    let dir = TempDir::new().unwrap();
    let def = dir.path().join("bn.json");
    let output = dir.path().join("bn_grad.json");
    fs::write(&def, TRAIN_DEF).unwrap();

    GradDefCommand { def, output: Some(output.clone()) }.execute().unwrap();

    let grad = spatialbn_ops::OperatorDef::from_json(&fs::read_to_string(&output).unwrap())
        .unwrap();
    assert_eq!(grad.op_type, "SpatialBNGradient");
    assert_eq!(grad.name, "bn_grad");
    assert_eq!(grad.inputs, vec!["X", "scale", "Y_grad", "sm", "siv"]);
    assert_eq!(grad.outputs, vec!["X_grad", "scale_grad", "bias_grad"]);
}
