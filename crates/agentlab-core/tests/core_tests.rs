//! Tests for agentlab-core: ids, frameworks, agent payload validation, settings, errors

use agentlab_core::*;
use serde_json::json;

// ===========================================================================
// Ids
// ===========================================================================

#[test]
fn ids_serialize_transparently() {
    assert_eq!(serde_json::to_string(&ExperimentId(7)).unwrap(), "7");
    let back: AgentId = serde_json::from_str("42").unwrap();
    assert_eq!(back, AgentId(42));
    assert_eq!(format!("{}", UserId(3)), "3");
}

// ===========================================================================
// Framework
// ===========================================================================

#[test]
fn framework_tags() {
    assert_eq!(serde_json::to_string(&Framework::CrewAi).unwrap(), r#""crewai""#);
    assert_eq!(serde_json::to_string(&Framework::LangChain).unwrap(), r#""langchain""#);
    assert_eq!(serde_json::to_string(&Framework::OpenAi).unwrap(), r#""openai""#);
    for fw in Framework::ALL {
        assert_eq!(fw.as_str().parse::<Framework>().unwrap(), fw);
    }
}

#[test]
fn unknown_framework_tag_is_validation_error() {
    let err = "autogen".parse::<Framework>().unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
    assert!(err.to_string().contains("unsupported framework: autogen"));
    assert!(serde_json::from_str::<Framework>(r#""autogen""#).is_err());
}

// ===========================================================================
// Agent payloads
// ===========================================================================

#[test]
fn new_agent_defaults_config_to_empty_object() {
    let agent: NewAgent =
        serde_json::from_value(json!({"name": "bot", "framework": "openai"})).unwrap();
    assert_eq!(agent.config, json!({}));
    assert!(agent.validate().is_ok());
}

#[test]
fn new_agent_validation() {
    let empty_name = NewAgent {
        name: String::new(),
        framework: Framework::OpenAi,
        config: json!({}),
    };
    assert!(empty_name.validate().is_err());

    let long_name = NewAgent {
        name: "x".repeat(201),
        framework: Framework::OpenAi,
        config: json!({}),
    };
    assert!(long_name.validate().is_err());

    let non_object = NewAgent {
        name: "bot".into(),
        framework: Framework::CrewAi,
        config: json!(["role"]),
    };
    assert!(non_object.validate().is_err());
}

#[test]
fn agent_patch_applies_only_present_fields() {
    let created = chrono::Utc::now();
    let mut agent = AgentConfig {
        id: AgentId(1),
        owner_id: UserId(1),
        name: "bot".into(),
        framework: Framework::OpenAi,
        config: json!({"model": "gpt-4o"}),
        created_at: created,
        updated_at: created,
    };
    let patch: AgentPatch = serde_json::from_value(json!({"framework": "crewai"})).unwrap();
    assert!(patch.validate().is_ok());
    let later = created + chrono::Duration::seconds(1);
    patch.apply(&mut agent, later);
    assert_eq!(agent.name, "bot");
    assert_eq!(agent.framework, Framework::CrewAi);
    assert_eq!(agent.config, json!({"model": "gpt-4o"}));
    assert_eq!(agent.updated_at, later);
}

#[test]
fn new_user_validation() {
    let ok = NewUser { username: "alice".into(), email: "alice@example.com".into() };
    assert!(ok.validate().is_ok());
    let short = NewUser { username: "al".into(), email: "al@example.com".into() };
    assert!(short.validate().is_err());
    let bad_email = NewUser { username: "alice".into(), email: "alice".into() };
    assert!(bad_email.validate().is_err());
}

// ===========================================================================
// ExperimentStatus
// ===========================================================================

#[test]
fn status_serializes_lowercase() {
    assert_eq!(serde_json::to_string(&ExperimentStatus::Pending).unwrap(), r#""pending""#);
    assert_eq!(serde_json::to_string(&ExperimentStatus::Failed).unwrap(), r#""failed""#);
    assert!(ExperimentStatus::Completed.is_terminal());
    assert!(!ExperimentStatus::Running.is_terminal());
}

// ===========================================================================
// Settings
// ===========================================================================

#[test]
fn settings_missing_file_yields_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let s = Settings::load(&dir.path().join("absent.toml")).unwrap();
    assert_eq!(s.server.port, 8000);
    assert!(s.store.snapshot_path.is_none());
}

#[test]
fn settings_load_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("agentlab.toml");
    std::fs::write(
        &path,
        r#"
[server]
port = 8100
bind = "loopback"

[auth]
mode = "none"

[store]
snapshot_path = "/var/lib/agentlab/state.json"

[providers]
openai_base_url = "http://localhost:11434/v1"
"#,
    )
    .unwrap();
    let s = Settings::load(&path).unwrap();
    assert_eq!(s.server.port, 8100);
    assert_eq!(s.server.bind.to_addr(), "127.0.0.1");
    assert_eq!(s.auth.mode, config::AuthMode::None);
    assert_eq!(
        s.store.snapshot_path.as_deref(),
        Some(std::path::Path::new("/var/lib/agentlab/state.json"))
    );
    assert_eq!(s.providers.openai_base_url, "http://localhost:11434/v1");
}

#[test]
fn settings_malformed_file_is_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bad.toml");
    std::fs::write(&path, "[server\nport = ").unwrap();
    assert!(matches!(Settings::load(&path), Err(Error::Config(_))));
}

// ===========================================================================
// Error
// ===========================================================================

#[test]
fn error_messages() {
    assert_eq!(Error::AgentNotFound(AgentId(1)).to_string(), "Agent not found");
    let not_ready = Error::NotReady { id: ExperimentId(1), status: ExperimentStatus::Running };
    assert_eq!(not_ready.to_string(), "Experiment is not completed yet");
    let transition = Error::InvalidTransition {
        id: ExperimentId(4),
        from: ExperimentStatus::Completed,
        to: ExperimentStatus::Running,
    };
    assert_eq!(
        transition.to_string(),
        "invalid transition for experiment 4: completed -> running"
    );
    assert!(Error::ExperimentNotFound(ExperimentId(1)).is_not_found());
    assert!(!Error::validation("x").is_not_found());
}
