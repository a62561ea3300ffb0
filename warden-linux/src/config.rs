//! Load and validate daemon config. File: ~/.config/linewarden/config.toml
//! or /etc/linewarden/config.toml; LINEWARDEN_* env vars override. Validated
//! once at startup and immutable afterwards; a config the daemon cannot
//! screen calls with is fatal.

use anyhow::Context;
use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub server: ServerConfig,
    pub device: DeviceConfig,
    #[serde(default)]
    pub modem: ModemSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Screening service base URL, e.g. "https://wall.example.net".
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeviceConfig {
    pub id: String,
    /// Bearer token for the service; also the payload-key secret.
    pub auth_token: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModemSettings {
    /// Serial device path (default /dev/ttyACM0).
    #[serde(default = "default_device")]
    pub device: String,
    /// Baud rate (default 57600).
    #[serde(default = "default_baud")]
    pub baud: u32,
    /// Reset/initialization command (default ATZ).
    #[serde(default = "default_init_command")]
    pub init_command: String,
    /// Vendor caller-ID enable variants, sent in order after init. The
    /// modem's dialect is unknown until a call arrives, so all of them go out.
    #[serde(default = "default_caller_id_commands")]
    pub caller_id_commands: Vec<String>,
}

fn default_device() -> String {
    "/dev/ttyACM0".to_string()
}
fn default_baud() -> u32 {
    57_600
}
fn default_init_command() -> String {
    "ATZ".to_string()
}
fn default_caller_id_commands() -> Vec<String> {
    vec![
        "AT+VCID=1".to_string(),
        "AT#CID=1".to_string(),
        "AT%CCID=1".to_string(),
    ]
}

impl Default for ModemSettings {
    fn default() -> Self {
        Self {
            device: default_device(),
            baud: default_baud(),
            init_command: default_init_command(),
            caller_id_commands: default_caller_id_commands(),
        }
    }
}

/// Load config: file, then env overrides, then validation.
pub fn load() -> anyhow::Result<Config> {
    let path = config_path().context(
        "no config file found (set LINEWARDEN_CONFIG, or place config.toml \
         in ~/.config/linewarden/ or /etc/linewarden/)",
    )?;
    let raw = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let mut cfg =
        parse(&raw).with_context(|| format!("failed to parse {}", path.display()))?;
    apply_env_overrides(&mut cfg);
    validate(&cfg)?;
    Ok(cfg)
}

fn parse(raw: &str) -> anyhow::Result<Config> {
    Ok(toml::from_str(raw)?)
}

fn validate(cfg: &Config) -> anyhow::Result<()> {
    anyhow::ensure!(!cfg.server.url.trim().is_empty(), "server.url is empty");
    anyhow::ensure!(!cfg.device.id.trim().is_empty(), "device.id is empty");
    anyhow::ensure!(
        !cfg.device.auth_token.trim().is_empty(),
        "device.auth_token is empty"
    );
    anyhow::ensure!(!cfg.modem.device.trim().is_empty(), "modem.device is empty");
    anyhow::ensure!(cfg.modem.baud > 0, "modem.baud must be non-zero");
    Ok(())
}

fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(url) = std::env::var("LINEWARDEN_SERVER_URL") {
        cfg.server.url = url;
    }
    if let Ok(id) = std::env::var("LINEWARDEN_DEVICE_ID") {
        cfg.device.id = id;
    }
    if let Ok(token) = std::env::var("LINEWARDEN_AUTH_TOKEN") {
        cfg.device.auth_token = token;
    }
    if let Ok(device) = std::env::var("LINEWARDEN_MODEM_DEVICE") {
        cfg.modem.device = device;
    }
}

fn config_path() -> Option<PathBuf> {
    if let Some(p) = std::env::var_os("LINEWARDEN_CONFIG") {
        return Some(PathBuf::from(p));
    }
    let mut candidates = Vec::new();
    if let Some(home) = std::env::var_os("HOME").map(PathBuf::from) {
        candidates.push(home.join(".config/linewarden/config.toml"));
    }
    candidates.push(PathBuf::from("/etc/linewarden/config.toml"));
    candidates.into_iter().find(|p| p.exists())
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
        [server]
        url = "https://wall.example.net"

        [device]
        id = "dev-1"
        auth_token = "token"
    "#;

    #[test]
    fn minimal_config_gets_modem_defaults() {
        let cfg = parse(MINIMAL).unwrap();
        assert_eq!(cfg.modem.device, "/dev/ttyACM0");
        assert_eq!(cfg.modem.baud, 57_600);
        assert_eq!(cfg.modem.init_command, "ATZ");
        assert_eq!(cfg.modem.caller_id_commands.len(), 3);
        validate(&cfg).unwrap();
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let raw = format!("{MINIMAL}\n[modem]\nbuad = 9600\n");
        assert!(parse(&raw).is_err());
    }

    #[test]
    fn empty_auth_token_fails_validation() {
        let raw = MINIMAL.replace("\"token\"", "\"\"");
        let cfg = parse(&raw).unwrap();
        assert!(validate(&cfg).is_err());
    }

    #[test]
    fn modem_section_overrides_defaults() {
        let raw = format!(
            "{MINIMAL}\n[modem]\ndevice = \"/dev/ttyUSB0\"\nbaud = 115200\n\
             caller_id_commands = [\"AT+VCID=1\"]\n"
        );
        let cfg = parse(&raw).unwrap();
        assert_eq!(cfg.modem.device, "/dev/ttyUSB0");
        assert_eq!(cfg.modem.baud, 115_200);
        assert_eq!(cfg.modem.caller_id_commands, vec!["AT+VCID=1"]);
    }
}
