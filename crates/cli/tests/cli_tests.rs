//! CLI integration tests

use std::path::Path;
use std::process::{Command, Output};

const SNAPSHOT: &str = r#"{
  "cluster": "ExampleCluster",
  "tasks": [
    {
      "taskArn": "arn:aws:ecs:us-east-2:211220956907:task/ExampleCluster/0a1b2c3d",
      "taskDefinitionArn": "arn:aws:ecs:us-east-2:211220956907:task-definition/nginx:3",
      "launchType": "FARGATE",
      "group": "service:nginx",
      "attachments": [
        {
          "type": "ElasticNetworkInterface",
          "details": [{ "name": "privateIPv4Address", "value": "10.0.0.7" }]
        }
      ]
    }
  ],
  "taskDefinitions": [
    {
      "taskDefinitionArn": "arn:aws:ecs:us-east-2:211220956907:task-definition/nginx:3",
      "family": "nginx",
      "revision": 3,
      "networkMode": "awsvpc",
      "containerDefinitions": [
        {
          "name": "nginx-exporter",
          "portMappings": [{ "containerPort": 9113, "hostPort": 9113 }]
        }
      ]
    }
  ]
}"#;

const TARGETS: &str = r#"- targets:
  - 10.0.0.7:9113
  labels:
    __metrics_path__: /metrics
    container_name: nginx-exporter
    job: nginx
    TaskId: 0a1b2c3d
- targets:
  - 10.0.0.8:9404
  labels:
    __metrics_path__: /metrics
    container_name: jmx
    job: java
"#;

fn sdctl(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_sdctl"))
        .args(args)
        .output()
        .expect("Failed to execute command")
}

fn write_config(dir: &Path) -> String {
    let config = format!(
        r#"
inventory_file = "{inventory}"

[service_discovery]
sd_frequency = "30s"
sd_target_cluster = "ExampleCluster"
sd_cluster_region = "us-east-2"
sd_result_file = "{result}"

[[service_discovery.task_definition_list]]
sd_task_definition_arn_pattern = ".*:task-definition/nginx:[0-9]+"
sd_metrics_ports = "9113"
sd_job_name = "nginx"
"#,
        inventory = dir.join("inventory.json").display(),
        result = dir.join("targets.yaml").display(),
    );
    std::fs::write(dir.join("inventory.json"), SNAPSHOT).unwrap();

    let path = dir.join("config.toml");
    std::fs::write(&path, config).unwrap();
    path.display().to_string()
}

/// Test that the CLI shows help
#[test]
fn test_cli_help() {
    let output = sdctl(&["--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI help should succeed");
    assert!(stdout.contains("ECS service discovery"), "Should show app name");
    assert!(stdout.contains("validate"), "Should show validate command");
    assert!(stdout.contains("targets"), "Should show targets command");
    assert!(stdout.contains("discover"), "Should show discover command");
    assert!(stdout.contains("--format"), "Should show format option");
}

/// Test that the CLI shows version
#[test]
fn test_cli_version() {
    let output = sdctl(&["--version"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI version should succeed");
    assert!(stdout.contains("sdctl"), "Should show binary name");
}

/// Test targets subcommand help
#[test]
fn test_targets_help() {
    let output = sdctl(&["targets", "--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "Targets help should succeed");
    assert!(stdout.contains("--job"), "Should show job option");
}

/// Test discover subcommand help
#[test]
fn test_discover_help() {
    let output = sdctl(&["discover", "--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "Discover help should succeed");
    assert!(stdout.contains("--inventory"), "Should show inventory option");
    assert!(stdout.contains("--output"), "Should show output option");
}

#[test]
fn test_validate_accepts_valid_config() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path());

    let output = sdctl(&["validate", &config, "--format", "json"]);
    assert!(output.status.success(), "Valid config should pass");

    let summary: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(summary["cluster"], "ExampleCluster");
    assert_eq!(summary["frequency_secs"], 30);
    assert_eq!(summary["task_definition_rules"], 1);
    assert_eq!(summary["docker_label"], false);
}

#[test]
fn test_validate_rejects_config_without_rules() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(
        &path,
        r#"
[service_discovery]
sd_target_cluster = "ExampleCluster"
sd_cluster_region = "us-east-2"
sd_result_file = "/tmp/ecs_sd_targets.yaml"
"#,
    )
    .unwrap();

    let output = sdctl(&["validate", path.to_str().unwrap()]);
    assert!(!output.status.success(), "Config without rules should fail");

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("discovery"), "Should explain the failure");
}

#[test]
fn test_validate_rejects_bad_pattern() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path());
    let contents = std::fs::read_to_string(&config)
        .unwrap()
        .replace(".*:task-definition/nginx:[0-9]+", "nginx:(");
    std::fs::write(&config, contents).unwrap();

    let output = sdctl(&["validate", &config]);
    assert!(!output.status.success(), "Bad pattern should fail");
}

#[test]
fn test_targets_reads_result_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("targets.yaml");
    std::fs::write(&path, TARGETS).unwrap();

    let output = sdctl(&["targets", path.to_str().unwrap()]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success());
    assert!(stdout.contains("10.0.0.7:9113"));
    assert!(stdout.contains("10.0.0.8:9404"));
    assert!(stdout.contains("Total: 2 targets"));
}

#[test]
fn test_targets_filters_by_job() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("targets.yaml");
    std::fs::write(&path, TARGETS).unwrap();

    let output = sdctl(&["targets", path.to_str().unwrap(), "--job", "java", "-f", "json"]);
    assert!(output.status.success());

    let targets: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let targets = targets.as_array().unwrap();
    assert_eq!(targets.len(), 1);
    assert_eq!(targets[0]["targets"][0], "10.0.0.8:9404");
}

#[test]
fn test_targets_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.yaml");

    let output = sdctl(&["targets", path.to_str().unwrap()]);
    assert!(!output.status.success(), "Missing file should fail");
}

#[test]
fn test_discover_publishes_targets() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path());

    let output = sdctl(&["discover", &config, "--format", "json"]);
    assert!(
        output.status.success(),
        "Discover should succeed: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let targets: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(targets[0]["targets"][0], "10.0.0.7:9113");
    assert_eq!(targets[0]["labels"]["job"], "nginx");
    assert_eq!(targets[0]["labels"]["TaskId"], "0a1b2c3d");
    assert!(dir.path().join("targets.yaml").exists());
}

#[test]
fn test_discover_requires_inventory() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path());
    let contents = std::fs::read_to_string(&config)
        .unwrap()
        .lines()
        .filter(|line| !line.starts_with("inventory_file"))
        .collect::<Vec<_>>()
        .join("\n");
    std::fs::write(&config, contents).unwrap();

    let output = sdctl(&["discover", &config]);
    assert!(!output.status.success(), "Discover without inventory should fail");

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("inventory"), "Should ask for an inventory");
}

/// Test invalid command error handling
#[test]
fn test_invalid_command() {
    let output = sdctl(&["invalid-command"]);
    assert!(!output.status.success(), "Invalid command should fail");

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("error") || stderr.contains("invalid"),
        "Should show error message"
    );
}

/// Test missing required argument error handling
#[test]
fn test_missing_argument() {
    let output = sdctl(&["validate"]);
    assert!(!output.status.success(), "Missing argument should fail");

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("required") || stderr.contains("error"),
        "Should show error about missing argument"
    );
}
