//! Configuration loading tests

use crate::config::Config;
use serial_test::serial;
use std::env;
use std::io::Write;

fn write_config(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(".toml")
        .tempfile()
        .expect("Failed to create temp config");
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[test]
fn test_default_config_is_valid() {
    let config = Config::default();
    config.validate().unwrap();

    assert!(config.database.url.starts_with("sqlite:"));
    assert_eq!(config.supervisor.port_range_start, 3001);
    assert_eq!(config.supervisor.port_range_end, 4000);
    assert_eq!(config.supervisor.grace_period_secs, 10);
    assert_eq!(config.coordination.max_workload, 3);
    assert!(config.services.is_empty());
}

#[test]
#[serial]
fn test_load_without_files_uses_defaults() {
    let config = Config::load().expect("Should load config");
    assert_eq!(config.supervisor.health_check_interval_secs, 30);
    assert_eq!(config.coordination.staleness_timeout_secs, 300);
    // Children receive the coordinator's database unless told otherwise
    assert_eq!(
        config.supervisor.database_url.as_deref(),
        Some(config.database.url.as_str())
    );
}

#[test]
#[serial]
fn test_file_sections_and_services() {
    let file = write_config(
        r#"
        [database]
        url = "sqlite:/tmp/agent-team-test.db"

        [supervisor]
        port_range_start = 5000
        port_range_end = 5009
        http_probe = false

        [supervisor.agent_programs.qa_engineer]
        program = "/usr/local/bin/qa-agent"
        args = ["--quiet"]

        [coordination]
        max_workload = 5

        [monitoring.logging]
        format = "json"

        [[services]]
        id = "qa-1"
        agent_type = "qa_engineer"
        capabilities = ["testing"]
        auto_restart = true

        [[services]]
        id = "dev-1"
        agent_type = "developer"
        port = 5005
        "#,
    );

    let config = Config::load_from_file(file.path()).expect("Should load file");
    config.validate().unwrap();

    assert_eq!(config.database.url, "sqlite:/tmp/agent-team-test.db");
    assert_eq!(config.supervisor.port_range_start, 5000);
    assert!(!config.supervisor.http_probe);
    assert_eq!(config.supervisor.grace_period_secs, 10);
    assert_eq!(
        config.supervisor.agent_programs["qa_engineer"].args,
        vec!["--quiet".to_string()]
    );
    assert_eq!(config.coordination.max_workload, 5);
    assert_eq!(
        config.monitoring.logging.format,
        agent_team_monitoring::LogFormat::Json
    );

    assert_eq!(config.services.len(), 2);
    assert!(config.services[0].capabilities.contains("testing"));
    assert!(config.services[0].auto_restart);
    assert_eq!(config.services[0].restart_delay_secs, 5);
    assert_eq!(config.services[1].port, Some(5005));
}

#[test]
#[serial]
fn test_environment_variable_override() {
    let original = env::var("AGENT_TEAM_DATABASE__URL");
    env::set_var("AGENT_TEAM_DATABASE__URL", "sqlite:/tmp/override.db");
    env::set_var("AGENT_TEAM_SUPERVISOR__PORT_RANGE_END", "3100");

    let loaded = Config::load();

    match original {
        Ok(val) => env::set_var("AGENT_TEAM_DATABASE__URL", val),
        Err(_) => env::remove_var("AGENT_TEAM_DATABASE__URL"),
    }
    env::remove_var("AGENT_TEAM_SUPERVISOR__PORT_RANGE_END");

    let config = loaded.expect("Should load config");
    assert_eq!(config.database.url, "sqlite:/tmp/override.db");
    assert_eq!(config.supervisor.port_range_end, 3100);
    assert_eq!(
        config.supervisor.database_url.as_deref(),
        Some("sqlite:/tmp/override.db")
    );
}

#[test]
#[serial]
fn test_missing_explicit_file_fails() {
    assert!(Config::load_from_file("/nonexistent/agent-team.toml").is_err());
}

#[test]
fn test_validation_rejects_bad_sections() {
    let mut config = Config::default();
    config.supervisor.port_range_start = 4000;
    config.supervisor.port_range_end = 3000;
    assert!(config.validate().is_err());

    let mut config = Config::default();
    config.coordination.max_workload = 0;
    assert!(config.validate().is_err());

    let mut config = Config::default();
    config.database.url = "  ".to_string();
    assert!(config.validate().is_err());

    let mut config = Config::default();
    let service: agent_team_core::service::ServiceConfig =
        serde_json::from_str(r#"{"id": "svc-1", "agent_type": "developer"}"#).unwrap();
    config.services = vec![service.clone(), service];
    let err = config.validate().unwrap_err();
    assert!(err.to_string().contains("more than once"));
}
