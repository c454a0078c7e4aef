//! Loading, overriding and validating the bridge configuration.

use std::path::{Path, PathBuf};

use chatbridge::config::{
    load_config, read_config, resolve_config_path, Config, ConfigError, DEFAULT_CONFIG_PATH,
};

const FULL_CONFIG: &str = r##"
[irc]
server = "irc.libera.chat:6697"
use_tls = true
nick = "bridge"
channel = "#x64dbg"

[gitter]
nick = "bridge"
password = "gitter-token"
channel = "#x64dbg/x64dbg"

[telegram]
token = "123:abc"
admins = ["mrexodia", "@torusrxxx"]
group_id = -1001234

[xmpp]
server = "xmpp.example.org:5222"
jid = "bridge@example.org"
password = "secret"
muc = "x64dbg@conference.example.org"
nick = "bridge"

[logging]
dir = "/var/log/chatbridge"
"##;

fn no_env(_: &str) -> Option<String> {
    None
}

fn write_config(dir: &Path, contents: &str) -> PathBuf {
    let path = dir.join("config.toml");
    std::fs::write(&path, contents).expect("should write config");
    path
}

#[test]
fn full_config_parses_and_validates() {
    let config = Config::from_toml(FULL_CONFIG).expect("should parse");
    config.validate().expect("should validate");

    assert_eq!(config.irc.server, "irc.libera.chat:6697");
    assert!(config.irc.use_tls);
    assert_eq!(config.gitter.server, "irc.gitter.im:6697");
    assert_eq!(config.telegram.admins, vec!["mrexodia", "torusrxxx"]);
    assert_eq!(config.telegram.group_id, -1_001_234);
    assert_eq!(config.xmpp.reconnect_interval_secs, 3);
    assert_eq!(config.logging.dir, PathBuf::from("/var/log/chatbridge"));
    assert!(!config.image_upload_enabled());
}

#[test]
fn missing_telegram_token_is_reported() {
    let toml = FULL_CONFIG.replace("token = \"123:abc\"", "");
    let config = Config::from_toml(&toml).expect("should parse");
    let err = config.validate().expect_err("token is required");
    assert!(matches!(err, ConfigError::Missing("telegram.token")));
}

#[test]
fn empty_admin_list_is_rejected() {
    let toml = FULL_CONFIG.replace("admins = [\"mrexodia\", \"@torusrxxx\"]", "admins = \"\"");
    let config = Config::from_toml(&toml).expect("should parse");
    let err = config.validate().expect_err("admins are required");
    assert!(matches!(err, ConfigError::Missing("telegram.admins")));
}

#[test]
fn server_without_port_is_invalid() {
    let toml = FULL_CONFIG.replace("irc.libera.chat:6697", "irc.libera.chat");
    let config = Config::from_toml(&toml).expect("should parse");
    let err = config.validate().expect_err("port is required");
    assert!(matches!(
        err,
        ConfigError::Invalid {
            field: "irc.server",
            ..
        }
    ));
}

#[test]
fn bare_jid_is_invalid() {
    let toml = FULL_CONFIG.replace("jid = \"bridge@example.org\"", "jid = \"bridge\"");
    let config = Config::from_toml(&toml).expect("should parse");
    let err = config.validate().expect_err("jid needs a domain");
    assert!(matches!(err, ConfigError::Invalid { field: "xmpp.jid", .. }));
}

#[test]
fn unknown_type_is_a_parse_error() {
    let tmp = tempfile::tempdir().expect("should create temp dir");
    let path = write_config(tmp.path(), "[telegram]\ngroup_id = \"not a number\"\n");
    let err = read_config(&path).expect_err("should fail to parse");
    assert!(matches!(err, ConfigError::Parse { .. }));
}

#[test]
fn missing_file_is_a_read_error() {
    let tmp = tempfile::tempdir().expect("should create temp dir");
    let err = load_config(&tmp.path().join("absent.toml"), no_env).expect_err("no file");
    assert!(matches!(err, ConfigError::Read { .. }));
}

#[test]
fn load_applies_secret_overrides_before_validation() {
    let tmp = tempfile::tempdir().expect("should create temp dir");
    let toml = FULL_CONFIG.replace("password = \"gitter-token\"", "");
    let path = write_config(tmp.path(), &toml);

    assert!(load_config(&path, no_env).is_err());

    let config = load_config(&path, |key| {
        (key == "CHATBRIDGE_GITTER_PASSWORD").then(|| "from-env".to_owned())
    })
    .expect("override fills the gap");
    assert_eq!(config.gitter.password, "from-env");
}

#[test]
fn imgur_override_enables_uploads() {
    let mut config = Config::from_toml(FULL_CONFIG).expect("should parse");
    config.apply_overrides(|key| (key == "CHATBRIDGE_IMGUR_CLIENT_ID").then(|| "cid".to_owned()));
    assert!(config.image_upload_enabled());
}

#[test]
fn config_path_precedence() {
    assert_eq!(
        resolve_config_path(Some(PathBuf::from("/etc/bridge.toml")), |_| Some("/env.toml".to_owned())),
        PathBuf::from("/etc/bridge.toml")
    );
    assert_eq!(
        resolve_config_path(None, |_| Some("/env.toml".to_owned())),
        PathBuf::from("/env.toml")
    );
    assert_eq!(resolve_config_path(None, no_env), PathBuf::from(DEFAULT_CONFIG_PATH));
}
