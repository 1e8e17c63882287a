//! SMTP relay configuration, layered from defaults, a TOML settings file and
//! a flat key-value source in the environment.

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::path::Path;
use std::time::Duration;

/// Table holding the email settings in the TOML file.
pub const SECTION: &str = "email";

/// Prefix of the flat key-value environment source (`EMAILSERVICE_SMTPSERVER`, ...).
pub const ENV_PREFIX: &str = "EMAILSERVICE_";

const KEYS: &[&str] = &[
    "smtpServer",
    "smtpPort",
    "username",
    "password",
    "useSsl",
    "senderName",
    "senderEmail",
    "timeoutSecs",
    "helloName",
    "insecurePlaintext",
];

/// Connection, credential and sender settings for the SMTP relay.
///
/// Nothing is validated at load time. Missing values surface as connection
/// or authentication failures when a message is sent.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailConfig {
    pub smtp_server: String,
    pub smtp_port: u16,
    pub username: String,
    pub password: String,
    /// Implicit TLS when set, STARTTLS otherwise.
    #[serde(deserialize_with = "deserialize_flag")]
    pub use_ssl: bool,
    pub sender_name: String,
    pub sender_email: String,
    /// Applies to every SMTP step (connect, auth, data, quit).
    #[serde(
        rename = "timeoutSecs",
        serialize_with = "serialize_secs",
        deserialize_with = "deserialize_secs"
    )]
    pub timeout: Duration,
    /// EHLO name; the local hostname when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hello_name: Option<String>,
    /// Skip TLS entirely. Only for local development relays.
    #[serde(default, deserialize_with = "deserialize_flag")]
    pub insecure_plaintext: bool,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            smtp_server: "smtp.gmail.com".to_string(),
            smtp_port: 587,
            username: String::new(),
            password: String::new(),
            use_ssl: true,
            sender_name: "Email Service".to_string(),
            sender_email: String::new(),
            timeout: Duration::from_secs(30),
            hello_name: None,
            insecure_plaintext: false,
        }
    }
}

impl fmt::Debug for EmailConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmailConfig")
            .field("smtp_server", &self.smtp_server)
            .field("smtp_port", &self.smtp_port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("use_ssl", &self.use_ssl)
            .field("sender_name", &self.sender_name)
            .field("sender_email", &self.sender_email)
            .field("timeout", &self.timeout)
            .field("hello_name", &self.hello_name)
            .field("insecure_plaintext", &self.insecure_plaintext)
            .finish()
    }
}

impl EmailConfig {
    /// Load the configuration, optionally reading a TOML settings file.
    ///
    /// Precedence, lowest first: built-in defaults, the `[email]` table of the
    /// settings file, `EMAILSERVICE_*` environment variables. A missing
    /// settings file is treated as empty.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is not valid TOML or a value has the
    /// wrong type.
    pub fn load(settings_file: Option<&Path>) -> Result<Self, figment::Error> {
        Self::figment(settings_file).extract_inner(SECTION)
    }

    /// The layered provider stack used by [`EmailConfig::load`].
    #[must_use]
    pub fn figment(settings_file: Option<&Path>) -> Figment {
        let mut figment = Figment::new().merge(Serialized::default(SECTION, Self::default()));
        if let Some(path) = settings_file {
            figment = figment.merge(Toml::file(path));
        }
        figment.merge(
            Env::prefixed(ENV_PREFIX).map(|key| format!("{SECTION}.{}", canonical_key(key.as_str())).into()),
        )
    }
}

/// Environment keys arrive lowercased; restore the camelCase field name so
/// they merge over the defaults instead of sitting beside them.
fn canonical_key(key: &str) -> &str {
    KEYS.iter()
        .find(|k| k.eq_ignore_ascii_case(key))
        .copied()
        .unwrap_or(key)
}

/// Registry-style stores hand back flags as `1`/`0` or words.
#[derive(Deserialize)]
#[serde(untagged)]
enum Flag {
    Bool(bool),
    Int(i64),
    Text(String),
}

fn deserialize_flag<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    match Flag::deserialize(deserializer)? {
        Flag::Bool(b) => Ok(b),
        Flag::Int(n) => Ok(n != 0),
        Flag::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" | "" => Ok(false),
            other => Err(serde::de::Error::custom(format!("invalid flag value: {other}"))),
        },
    }
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn serialize_secs<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(value.as_secs())
}

fn deserialize_secs<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
    u64::deserialize(deserializer).map(Duration::from_secs)
}
