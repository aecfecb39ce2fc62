//! Unit tests for valdeploy configuration types.

use super::*;
use camino::Utf8PathBuf;
use ortho_config::MergeComposer;
use ortho_config::serde_json::json;
use rstest::{fixture, rstest};

/// Fixture providing a default `AppConfig`.
#[fixture]
fn app_config() -> AppConfig {
    AppConfig::default()
}

/// Fixture providing an `AppConfig` parsed from a full TOML example.
#[fixture]
fn app_config_from_full_toml() -> AppConfig {
    let toml = r#"
        region = "eu-west-1"
        profile = "validators"

        [aws]
        instance_type = "c6a.8xlarge"

        [terraform]
        dir = "infra"
        plan_file = "validator.tfplan"

        [state]
        file = "state/deployment.json"
        artifacts = ["infra/validator.tfplan", "inventory.ini"]

        [ssh]
        user = "admin"
        key_file = "/home/op/.ssh/validator.pem"

        [polling]
        interval_secs = 5
        max_attempts = 60

        [pricing]
        fallback_rate = "2.50"
        rates = { "c6a.8xlarge" = "1.30" }
    "#;

    ortho_config::toml::from_str(toml).expect("TOML parsing should succeed")
}

/// Helper: Creates a `MergeComposer` with defaults layer already pushed.
fn create_composer_with_defaults() -> MergeComposer {
    let mut composer = MergeComposer::new();
    let defaults = ortho_config::serde_json::to_value(AppConfig::default())
        .expect("serialization should succeed");
    composer.push_defaults(defaults);
    composer
}

/// Helper: Merges layers from a composer into `AppConfig`.
fn merge_config(composer: MergeComposer) -> AppConfig {
    AppConfig::merge_from_layers(composer.layers()).expect("merge should succeed")
}

#[rstest]
fn defaults_target_a_validator_sized_instance(app_config: AppConfig) {
    assert_eq!(app_config.aws.instance_type, "r6a.8xlarge");
    assert_eq!(app_config.aws.region, "us-east-1");
    assert_eq!(app_config.state.file, Utf8PathBuf::from("deployment.json"));
    assert_eq!(app_config.polling.probe_retries, 3);
    assert_eq!(app_config.pricing.fallback_rate, "1.00");
    assert!(app_config.pricing.rates.is_empty());
}

#[rstest]
fn effective_region_prefers_top_level_override(mut app_config: AppConfig) {
    assert_eq!(app_config.effective_region(), "us-east-1");
    app_config.region = Some(String::from("ap-south-1"));
    assert_eq!(app_config.effective_region(), "ap-south-1");
}

#[rstest]
fn full_toml_populates_every_section(app_config_from_full_toml: AppConfig) {
    let config = app_config_from_full_toml;
    assert_eq!(config.effective_region(), "eu-west-1");
    assert_eq!(config.profile.as_deref(), Some("validators"));
    assert_eq!(config.aws.instance_type, "c6a.8xlarge");
    assert_eq!(config.terraform.dir, Utf8PathBuf::from("infra"));
    assert_eq!(config.state.artifacts.len(), 2);
    assert_eq!(config.ssh.user, "admin");
    assert_eq!(config.polling.max_attempts, 60);
    assert_eq!(
        config.pricing.rates.get("c6a.8xlarge").map(String::as_str),
        Some("1.30")
    );
}

#[rstest]
fn partial_sections_keep_remaining_defaults(app_config_from_full_toml: AppConfig) {
    let config = app_config_from_full_toml;
    assert_eq!(config.aws.binary, "aws");
    assert_eq!(config.ssh.connect_timeout_secs, 10);
    assert_eq!(config.polling.backoff_base_ms, 500);
    assert_eq!(config.terraform.instance_id_output, "instance_id");
}

#[rstest]
fn file_layer_overrides_defaults() {
    let mut composer = create_composer_with_defaults();
    composer.push_file(
        json!({ "aws": { "instance_type": "m6i.4xlarge" } }),
        None,
    );
    let config = merge_config(composer);
    assert_eq!(config.aws.instance_type, "m6i.4xlarge");
    assert_eq!(config.aws.region, "us-east-1");
}

#[rstest]
fn cli_layer_overrides_environment_layer() {
    let mut composer = create_composer_with_defaults();
    composer.push_environment(json!({ "region": "us-west-2" }));
    composer.push_cli(json!({ "region": "eu-central-1" }));
    let config = merge_config(composer);
    assert_eq!(config.effective_region(), "eu-central-1");
}

#[rstest]
fn blank_region_override_falls_back_to_aws_region() {
    let mut composer = create_composer_with_defaults();
    composer.push_cli(json!({ "region": "  " }));
    let config = merge_config(composer);
    assert_eq!(config.region, None);
    assert_eq!(config.effective_region(), "us-east-1");
}

#[rstest]
fn validate_accepts_defaults(app_config: AppConfig) {
    assert!(app_config.validate().is_ok());
}

#[rstest]
fn validate_rejects_empty_instance_type(mut app_config: AppConfig) {
    app_config.aws.instance_type = String::from(" ");
    let error = app_config.validate().expect_err("empty type should fail");
    assert!(error.to_string().contains("aws.instance_type"));
}

#[rstest]
fn validate_rejects_zero_poll_budget(mut app_config: AppConfig) {
    app_config.polling.max_attempts = 0;
    let error = app_config.validate().expect_err("zero attempts should fail");
    assert!(error.to_string().contains("polling.max_attempts"));
}

#[rstest]
fn env_var_names_cover_every_section() {
    let names = env_var_names();
    for expected in [
        "VALDEPLOY_REGION",
        "VALDEPLOY_AWS_INSTANCE_TYPE",
        "VALDEPLOY_STATE_FILE",
        "VALDEPLOY_POLLING_MAX_ATTEMPTS",
        "VALDEPLOY_PRICING_FALLBACK_RATE",
    ] {
        assert!(names.contains(&expected), "missing {expected}");
    }
}
