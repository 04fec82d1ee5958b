use super::*;
use crate::ExecutionMode;
use pretty_assertions::assert_eq;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn write_json5(path: &Path, contents: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("dir");
    }
    fs::write(path, contents).expect("write");
}

fn options_for(root: &Path, cwd: &Path) -> LayeredConfigOptions {
    LayeredConfigOptions {
        system_config_path: Some(root.join("system.json5")),
        user_config_path: Some(root.join("user.json5")),
        requirements_path: Some(root.join("requirements.json5")),
        ..LayeredConfigOptions::new(cwd)
    }
}

#[test]
fn empty_config_uses_defaults() {
    let config = SwitchyardConfig::load_from_str("{}").expect("config");
    assert_eq!(config.providers.call_timeout_ms, 30_000);
    assert_eq!(config.validator.confidence_threshold, 0.7);
    assert_eq!(config.validator.max_issues, 3);
    assert_eq!(config.executor.mode, ExecutionMode::Sequential);
    assert_eq!(config.fallback.real_time_override, true);
}

#[test]
fn json5_comments_and_trailing_commas_parse() {
    let config = SwitchyardConfig::load_from_str(
        r#"{
            // tighter budget for tests
            providers: { call_timeout_ms: 500, },
            executor: { mode: "parallel" },
        }"#,
    )
    .expect("config");
    assert_eq!(config.providers.call_timeout_ms, 500);
    assert_eq!(config.executor.mode, ExecutionMode::Parallel);
}

#[test]
fn rejects_unknown_top_level_key() {
    let err = SwitchyardConfig::load_from_str("{ agents: {} }").unwrap_err();
    assert!(err.to_string().contains("unknown key"));
}

#[test]
fn rejects_threshold_out_of_range() {
    let err = SwitchyardConfig::load_from_str("{ validator: { confidence_threshold: 1.5 } }")
        .unwrap_err();
    assert!(err.to_string().contains("confidence_threshold"));
}

#[test]
fn missing_explicit_file_is_not_found() {
    let temp = TempDir::new().expect("tmp");
    let err = SwitchyardConfig::load_from_path(temp.path().join("absent.json5")).unwrap_err();
    assert!(matches!(err, ConfigError::NotFound(_)));
}

#[test]
fn later_layers_override_earlier_ones() {
    let temp = TempDir::new().expect("tmp");
    let root = temp.path();
    let project = root.join("project");
    fs::create_dir_all(project.join(".git")).expect("git");
    let cwd = project.join("nested");
    fs::create_dir_all(&cwd).expect("cwd");

    write_json5(&root.join("system.json5"), "{ planner: { max_steps: 2 } }");
    write_json5(&root.join("user.json5"), "{ planner: { max_steps: 3 } }");
    write_json5(
        &project.join(DEFAULT_CONFIG_FILE),
        "{ planner: { max_steps: 4 }, memory: { top_k: 7 } }",
    );
    write_json5(&cwd.join(DEFAULT_CONFIG_FILE), "{ planner: { max_steps: 5 } }");
    write_json5(
        &project.join(DEFAULT_CONFIG_DIR).join(DEFAULT_CONFIG_FILE),
        "{ planner: { max_steps: 6 } }",
    );

    let layered =
        SwitchyardConfig::load_layered_with_options(options_for(root, &cwd)).expect("layered");
    assert_eq!(layered.config.planner.max_steps, 6);
    assert_eq!(layered.config.memory.top_k, 7);
    let sources: Vec<_> = layered.layers.iter().map(|layer| layer.source).collect();
    assert_eq!(
        sources,
        vec![
            ConfigLayerSource::System,
            ConfigLayerSource::User,
            ConfigLayerSource::Project,
            ConfigLayerSource::Cwd,
            ConfigLayerSource::Repo,
        ]
    );
}

#[test]
fn runtime_layer_wins_and_must_exist() {
    let temp = TempDir::new().expect("tmp");
    let root = temp.path();
    write_json5(&root.join("user.json5"), "{ fallback: { enabled: true } }");
    let runtime = root.join("runtime.json5");
    write_json5(&runtime, "{ fallback: { enabled: false } }");

    let layered = SwitchyardConfig::load_layered_with_options(
        options_for(root, root).with_runtime_path(&runtime),
    )
    .expect("layered");
    assert_eq!(layered.config.fallback.enabled, false);

    let err = SwitchyardConfig::load_layered_with_options(
        options_for(root, root).with_runtime_path(root.join("missing.json5")),
    )
    .unwrap_err();
    assert!(matches!(err, ConfigError::NotFound(_)));
}

#[test]
fn requirements_pin_keys() {
    let temp = TempDir::new().expect("tmp");
    let root = temp.path();
    write_json5(
        &root.join("requirements.json5"),
        "{ fallback: { enabled: true } }",
    );
    write_json5(
        &root.join("user.json5"),
        "{ fallback: { enabled: false, real_time_override: false } }",
    );

    let layered =
        SwitchyardConfig::load_layered_with_options(options_for(root, root)).expect("layered");
    assert_eq!(layered.config.fallback.enabled, true);
    assert_eq!(layered.config.fallback.real_time_override, false);
}

#[test]
fn invalid_layer_reports_its_origin() {
    let temp = TempDir::new().expect("tmp");
    let root = temp.path();
    write_json5(&root.join("user.json5"), "{ executor: { mode: 3 } }");
    let err =
        SwitchyardConfig::load_layered_with_options(options_for(root, root)).unwrap_err();
    let message = err.to_string();
    assert!(message.contains("user("));
    assert!(message.contains("executor.mode"));
}
