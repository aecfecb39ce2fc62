//! Layered configuration loading.
//!
//! Precedence, lowest first: built-in defaults, the TOML file, `VALDEPLOY_*`
//! environment variables, then global CLI flags. The layers are pushed into
//! a `MergeComposer` by hand since `Cli` owns `--config` and subcommand
//! dispatch.
//!
//! Numeric environment variables are parsed here and a bad value such as
//! `VALDEPLOY_POLLING_MAX_ATTEMPTS=many` is a configuration error. Text
//! variables are passed through as-is.

use camino::Utf8PathBuf;
use cap_std::ambient_authority;
use cap_std::fs_utf8::Dir;
use ortho_config::discovery::ConfigDiscovery;
use ortho_config::serde_json::{self, Map, Value};
use ortho_config::{MergeComposer, toml};

use crate::config::{AppConfig, Cli};
use crate::error::{ConfigError, Result};

#[derive(Clone, Copy)]
enum EnvVarType {
    Text,
    Count,
}

/// One `VALDEPLOY_*` variable and the config field it sets.
struct EnvVarSpec {
    env_var: &'static str,
    path: &'static [&'static str],
    var_type: EnvVarType,
}

const fn text(env_var: &'static str, path: &'static [&'static str]) -> EnvVarSpec {
    EnvVarSpec {
        env_var,
        path,
        var_type: EnvVarType::Text,
    }
}

const fn count(env_var: &'static str, path: &'static [&'static str]) -> EnvVarSpec {
    EnvVarSpec {
        env_var,
        path,
        var_type: EnvVarType::Count,
    }
}

const ENV_VAR_SPECS: &[EnvVarSpec] = &[
    text("VALDEPLOY_REGION", &["region"]),
    text("VALDEPLOY_PROFILE", &["profile"]),
    text("VALDEPLOY_AWS_REGION", &["aws", "region"]),
    text("VALDEPLOY_AWS_INSTANCE_TYPE", &["aws", "instance_type"]),
    text("VALDEPLOY_AWS_BINARY", &["aws", "binary"]),
    text("VALDEPLOY_TERRAFORM_DIR", &["terraform", "dir"]),
    text("VALDEPLOY_TERRAFORM_BINARY", &["terraform", "binary"]),
    text("VALDEPLOY_STATE_FILE", &["state", "file"]),
    text("VALDEPLOY_STATE_KEYS_DIR", &["state", "keys_dir"]),
    text("VALDEPLOY_SSH_USER", &["ssh", "user"]),
    text("VALDEPLOY_SSH_KEY_FILE", &["ssh", "key_file"]),
    count(
        "VALDEPLOY_SSH_CONNECT_TIMEOUT_SECS",
        &["ssh", "connect_timeout_secs"],
    ),
    count("VALDEPLOY_POLLING_INTERVAL_SECS", &["polling", "interval_secs"]),
    count("VALDEPLOY_POLLING_MAX_ATTEMPTS", &["polling", "max_attempts"]),
    count("VALDEPLOY_POLLING_PROBE_RETRIES", &["polling", "probe_retries"]),
    text("VALDEPLOY_PRICING_FALLBACK_RATE", &["pricing", "fallback_rate"]),
    text("VALDEPLOY_SOLANA_CLUSTER_URL", &["solana", "cluster_url"]),
    count("VALDEPLOY_SOLANA_AIRDROP_SOL", &["solana", "airdrop_sol"]),
    text("VALDEPLOY_VALIDATOR_SERVICE", &["validator", "service"]),
    text(
        "VALDEPLOY_VALIDATOR_INSTALL_COMMAND",
        &["validator", "install_command"],
    ),
    text("VALDEPLOY_VALIDATOR_EXEC_START", &["validator", "exec_start"]),
];

/// Every environment variable the loader reads, for tests that need a clean
/// environment.
#[must_use]
pub fn env_var_names() -> Vec<&'static str> {
    ENV_VAR_SPECS.iter().map(|spec| spec.env_var).collect()
}

fn load_config_file(path: &Utf8PathBuf, composer: &mut MergeComposer) -> Result<()> {
    let current_dir = Utf8PathBuf::from(".");
    let parent = path.parent().unwrap_or_else(|| current_dir.as_ref());
    let file_name = path.file_name().unwrap_or(path.as_str());

    let dir = Dir::open_ambient_dir(parent, ambient_authority()).map_err(|e| {
        ConfigError::ParseError {
            message: format!("cannot open config directory {parent}: {e}"),
        }
    })?;
    let content = dir
        .read_to_string(file_name)
        .map_err(|e| ConfigError::ParseError {
            message: format!("cannot read {path}: {e}"),
        })?;
    let value =
        toml::from_str::<serde_json::Value>(&content).map_err(|e| ConfigError::ParseError {
            message: format!("invalid TOML in {path}: {e}"),
        })?;

    composer.push_file(value, Some(path.clone()));
    Ok(())
}

/// An explicit `--config` that exists wins over discovery.
fn config_file(cli: &Cli) -> Option<Utf8PathBuf> {
    if let Some(path) = cli.config.clone().filter(|path| path.exists()) {
        return Some(path);
    }
    ConfigDiscovery::builder("valdeploy")
        .env_var("VALDEPLOY_CONFIG_PATH")
        .config_file_name("config.toml")
        .dotfile_name(".valdeploy.toml")
        .build()
        .candidates()
        .into_iter()
        .filter(|path| path.exists())
        .find_map(|path| Utf8PathBuf::try_from(path).ok())
}

/// Load and validate the effective configuration for `cli`.
///
/// # Errors
///
/// Returns `ConfigError` for an unreadable or malformed file, a numeric
/// environment variable that does not parse, a failed merge, or a merged
/// configuration that fails [`AppConfig::validate`].
pub fn load_config(cli: &Cli) -> Result<AppConfig> {
    let mut composer = MergeComposer::new();

    let defaults =
        serde_json::to_value(AppConfig::default()).map_err(|e| ConfigError::ParseError {
            message: format!("cannot serialise defaults: {e}"),
        })?;
    composer.push_defaults(defaults);

    if let Some(path) = config_file(cli) {
        load_config_file(&path, &mut composer)?;
    }

    let environment = collect_env_vars()?;
    if !environment.is_null() {
        composer.push_environment(environment);
    }

    let flags = build_cli_overrides(cli);
    if !flags.is_null() {
        composer.push_cli(flags);
    }

    let config =
        AppConfig::merge_from_layers(composer.layers()).map_err(ConfigError::OrthoConfig)?;
    config.validate()?;
    Ok(config)
}

fn parse_env_value(spec: &EnvVarSpec, raw: String) -> Result<Value> {
    match spec.var_type {
        EnvVarType::Text => Ok(Value::String(raw)),
        EnvVarType::Count => raw.parse::<u64>().map(Value::from).map_err(|_| {
            ConfigError::InvalidValue {
                field: spec.env_var.to_owned(),
                reason: format!("expected unsigned integer, got '{raw}'"),
            }
            .into()
        }),
    }
}

fn collect_env_vars() -> Result<Value> {
    let mut root = Map::new();
    for spec in ENV_VAR_SPECS {
        let Ok(raw) = std::env::var(spec.env_var) else {
            continue;
        };
        let value = parse_env_value(spec, raw)?;
        insert_at_path(&mut root, spec.path, value);
    }
    if root.is_empty() {
        return Ok(Value::Null);
    }
    Ok(Value::Object(root))
}

fn insert_at_path(root: &mut Map<String, Value>, path: &[&str], value: Value) {
    let Some((&field, sections)) = path.split_last() else {
        return;
    };
    let mut current = root;
    for &section in sections {
        let entry = current
            .entry(section.to_owned())
            .or_insert_with(|| Value::Object(Map::new()));
        let Some(table) = entry.as_object_mut() else {
            return;
        };
        current = table;
    }
    current.insert(field.to_owned(), value);
}

fn build_cli_overrides(cli: &Cli) -> Value {
    let mut overrides = Map::new();
    if let Some(region) = &cli.region {
        overrides.insert(String::from("region"), Value::String(region.clone()));
    }
    if let Some(profile) = &cli.profile {
        overrides.insert(String::from("profile"), Value::String(profile.clone()));
    }
    if overrides.is_empty() {
        return Value::Null;
    }
    Value::Object(overrides)
}
