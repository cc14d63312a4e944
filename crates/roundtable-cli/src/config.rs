use anyhow::{Context, Result};
use roundtable_core::{Agent, OrchestratorConfig, validate_roster};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::warn;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundtableConfig {
    #[serde(default)]
    pub user: UserConfig,
    pub backend: BackendConfig,
    pub room: RoomConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserConfig {
    #[serde(default = "default_display_name")]
    pub display_name: String,
}

fn default_display_name() -> String {
    "You".to_string()
}

impl Default for UserConfig {
    fn default() -> Self {
        Self {
            display_name: default_display_name(),
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    pub base_url: String,
    #[serde(default = "default_backend_id")]
    pub backend_id: String,
    #[serde(default)]
    pub api_key: String,
    /// Per-call limit; 0 disables it
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl std::fmt::Debug for BackendConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendConfig")
            .field("base_url", &self.base_url)
            .field("backend_id", &self.backend_id)
            .field("api_key", &mask_secret(&self.api_key))
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

fn default_backend_id() -> String {
    "default".to_string()
}

fn default_timeout_secs() -> u64 {
    120
}

impl BackendConfig {
    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            backend_id: self.backend_id.clone(),
            call_timeout_secs: self.timeout_secs,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomConfig {
    #[serde(default = "default_room_id")]
    pub id: String,
    #[serde(default = "default_room_name")]
    pub name: String,
    #[serde(default)]
    pub agents: Vec<Agent>,
}

fn default_room_id() -> String {
    "main".to_string()
}

fn default_room_name() -> String {
    "Roundtable".to_string()
}

/// Mask a secret string for safe display in Debug output / logs.
/// Shows first 3 and last 4 chars for keys longer than 7 chars, otherwise "***".
fn mask_secret(s: &str) -> String {
    if s.is_empty() {
        return "(empty)".to_string();
    }
    let chars: Vec<char> = s.chars().collect();
    if chars.len() > 7 {
        let prefix: String = chars[..3].iter().collect();
        let suffix: String = chars[chars.len() - 4..].iter().collect();
        format!("{}...{}", prefix, suffix)
    } else {
        "***".to_string()
    }
}

pub fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".roundtable")
}

impl RoundtableConfig {
    pub fn load(custom_path: &Option<PathBuf>) -> Result<Self> {
        let path = custom_path
            .clone()
            .unwrap_or_else(|| config_dir().join("config.toml"));

        check_permissions(&path)?;

        let content = std::fs::read_to_string(&path).with_context(|| {
            format!(
                "Failed to read config at {}. Run `roundtable init` first.",
                path.display()
            )
        })?;

        let config = Self::parse(&content)
            .with_context(|| format!("Invalid config at {}", path.display()))?;

        if !config.backend.api_key.is_empty() && !content.contains("${ROUNDTABLE_API_KEY}") {
            warn!(
                "Backend API key is hardcoded in config file. For security, use environment variables: api_key = \"${{ROUNDTABLE_API_KEY}}\""
            );
        }

        Ok(config)
    }

    /// Expand, parse and validate config text
    pub fn parse(content: &str) -> Result<Self> {
        let expanded = expand_env_vars(content);
        let config: Self = toml::from_str(&expanded).context("Failed to parse config")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.backend.base_url.trim().is_empty() {
            anyhow::bail!("backend.base_url must not be empty");
        }
        if self.user.display_name.trim().is_empty() {
            anyhow::bail!("user.display_name must not be empty");
        }
        validate_roster(&self.room.agents).context("Invalid agent roster in [room]")?;
        if self.room.agents.is_empty() {
            warn!("Room '{}' has no agents configured", self.room.id);
        }
        Ok(())
    }
}

/// Refuse config files readable by group or other (Unix only)
fn check_permissions(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Ok(metadata) = std::fs::metadata(path) {
            let mode = metadata.permissions().mode();
            if mode & 0o077 != 0 {
                return Err(anyhow::anyhow!(
                    "Config file {:?} has overly permissive permissions ({:o}). \
                     It may contain secrets. Fix with: chmod 600 {:?}",
                    path,
                    mode & 0o777,
                    path
                ));
            }
        }
    }
    #[cfg(not(unix))]
    let _ = path;
    Ok(())
}

/// Allowlist of environment variable names that may be expanded in config files.
/// This prevents an attacker who can modify the config from reading arbitrary env vars.
const ALLOWED_ENV_VARS: &[&str] = &[
    "ROUNDTABLE_API_KEY",
    "ROUNDTABLE_BASE_URL",
    "ROUNDTABLE_BACKEND_ID",
    "HOME",
    "USER",
];

fn expand_env_vars(s: &str) -> String {
    let mut result = s.to_string();
    let mut pos = 0;
    while pos < result.len() {
        let Some(start) = result[pos..].find("${") else {
            break;
        };
        let abs_start = pos + start;
        let Some(end) = result[abs_start..].find('}') else {
            break;
        };
        let var_name = result[abs_start + 2..abs_start + end].to_string();

        if !ALLOWED_ENV_VARS.contains(&var_name.as_str()) {
            warn!(
                "Skipping expansion of unrecognized env var '{}' in config (not in allowlist)",
                var_name
            );
            // Leave the ${VAR} unexpanded so it's obvious
            pos = abs_start + end + 1;
            continue;
        }

        let value = std::env::var(&var_name).unwrap_or_default();
        let value_len = value.len();
        result = format!(
            "{}{}{}",
            &result[..abs_start],
            value,
            &result[abs_start + end + 1..]
        );
        pos = abs_start + value_len;
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use roundtable_core::Trigger;
    use std::io::Write;

    const SAMPLE: &str = r#"
[user]
display_name = "Sarah"

[backend]
base_url = "http://localhost:8080/agent"
backend_id = "crew-7"
api_key = "${ROUNDTABLE_API_KEY}"
timeout_secs = 30

[room]
id = "strategy"
name = "Strategy"

[[room.agents]]
id = "agent-alpha"
name = "Alpha"
trigger = "all"
personality = "formal"

[[room.agents]]
id = "agent-beta"
name = "Beta"
trigger = "mentions"
frequency = "every-2nd"
"#;

    #[test]
    fn test_parse_sample() {
        let config = RoundtableConfig::parse(SAMPLE).unwrap();
        assert_eq!(config.user.display_name, "Sarah");
        assert_eq!(config.backend.backend_id, "crew-7");
        assert_eq!(config.backend.timeout_secs, 30);
        assert_eq!(config.room.agents.len(), 2);
        assert_eq!(config.room.agents[0].trigger, Trigger::All);
        assert_eq!(config.room.agents[1].trigger, Trigger::Mentions);
        assert_eq!(config.room.agents[1].personality, "analytical");

        let orch = config.backend.orchestrator_config();
        assert_eq!(orch.backend_id, "crew-7");
        assert_eq!(orch.call_timeout_secs, 30);
    }

    #[test]
    fn test_defaults_applied() {
        let config = RoundtableConfig::parse(
            r#"
[backend]
base_url = "http://localhost:8080"

[room]
"#,
        )
        .unwrap();
        assert_eq!(config.user.display_name, "You");
        assert_eq!(config.backend.backend_id, "default");
        assert_eq!(config.backend.timeout_secs, 120);
        assert_eq!(config.room.id, "main");
        assert!(config.room.agents.is_empty());
    }

    #[test]
    fn test_duplicate_agent_names_rejected() {
        let err = RoundtableConfig::parse(
            r#"
[backend]
base_url = "http://localhost:8080"

[room]
[[room.agents]]
id = "a"
name = "Echo"

[[room.agents]]
id = "b"
name = "echo"
"#,
        )
        .unwrap_err();
        assert!(format!("{:#}", err).contains("echo"));
    }

    #[test]
    fn test_unmentionable_agent_name_rejected() {
        let err = RoundtableConfig::parse(
            r#"
[backend]
base_url = "http://localhost:8080"

[room]
[[room.agents]]
id = "cost"
name = "cost-optimizer"
trigger = "mentions"
"#,
        )
        .unwrap_err();
        assert!(format!("{:#}", err).contains("cost-optimizer"));
    }

    #[test]
    fn test_empty_base_url_rejected() {
        let err = RoundtableConfig::parse("[backend]\nbase_url = \" \"\n[room]\n").unwrap_err();
        assert!(err.to_string().contains("base_url"));
    }

    #[test]
    fn test_unlisted_env_var_left_unexpanded() {
        let out = expand_env_vars("key = \"${SOME_RANDOM_SECRET}\"");
        assert_eq!(out, "key = \"${SOME_RANDOM_SECRET}\"");
    }

    #[test]
    fn test_unterminated_placeholder_left_alone() {
        assert_eq!(expand_env_vars("a = \"${HOME\""), "a = \"${HOME\"");
    }

    #[test]
    fn test_mask_secret() {
        assert_eq!(mask_secret(""), "(empty)");
        assert_eq!(mask_secret("short"), "***");
        assert_eq!(mask_secret("rt-abcdef123456"), "rt-...3456");
    }

    #[test]
    fn test_debug_masks_api_key() {
        let backend = BackendConfig {
            base_url: "http://x".to_string(),
            backend_id: "default".to_string(),
            api_key: "rt-supersecretvalue".to_string(),
            timeout_secs: 5,
        };
        let debug = format!("{:?}", backend);
        assert!(!debug.contains("supersecret"));
        assert!(debug.contains("rt-...alue"));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        // NamedTempFile is created with 0600 on unix
        let config = RoundtableConfig::load(&Some(file.path().to_path_buf())).unwrap();
        assert_eq!(config.room.name, "Strategy");
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = RoundtableConfig::load(&Some(dir.path().join("nope.toml"))).unwrap_err();
        assert!(err.to_string().contains("roundtable init"));
    }

    #[cfg(unix)]
    #[test]
    fn test_load_rejects_world_readable() {
        use std::os::unix::fs::PermissionsExt;
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        std::fs::set_permissions(file.path(), std::fs::Permissions::from_mode(0o644)).unwrap();
        let err = RoundtableConfig::load(&Some(file.path().to_path_buf())).unwrap_err();
        assert!(err.to_string().contains("permissive"));
    }
}
