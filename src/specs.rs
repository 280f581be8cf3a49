//!
//! Deployment spec documents
//!
//! A spec declares an application and the entrypoints it can be started with.
//! ```yaml
//! appname: app
//! entrypoints:
//!   web:
//!     cmd: /bin/app --port 8080
//!     restart: always
//!     publish:
//!       - "8080/tcp"
//!     healthcheck:
//!       ports:
//!         - "8080"
//!       url: http://127.0.0.1:8080/healthz
//!       code: 200
//!     hook:
//!       after_start: ["/bin/app", "warmup"]
//!       force: true
//! volumes:
//!   data: /data:/var/lib/app
//! meta:
//!   team: infra
//! dns:
//!   - 10.0.0.53
//! ```
use crate::{Error, Result};
use serde::{de, Deserialize, Deserializer};
use std::collections::BTreeMap;

/// Encoding of a spec document
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SpecFormat {
    /// YAML, also used when nothing hints otherwise
    #[default]
    Yaml,
    /// JSON
    Json,
}

impl SpecFormat {
    /// Guess the format from a file name or URL path
    #[must_use]
    pub fn from_path(path: &str) -> Self {
        let ext = std::path::Path::new(path)
            .extension()
            .and_then(std::ffi::OsStr::to_str);
        match ext {
            Some(ext) if ext.eq_ignore_ascii_case("json") => Self::Json,
            _ => Self::Yaml,
        }
    }

    /// Guess the format from an HTTP `Content-Type` value
    #[must_use]
    pub fn from_content_type(content_type: &str) -> Option<Self> {
        let content_type = content_type.to_ascii_lowercase();
        if content_type.contains("json") {
            Some(Self::Json)
        } else if content_type.contains("yaml") {
            Some(Self::Yaml)
        } else {
            None
        }
    }
}

/// A parsed spec document
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Specs {
    /// Application name
    pub appname: String,
    /// Entrypoints by name
    pub entrypoints: BTreeMap<String, Entrypoint>,
    /// Volume declarations by alias
    #[serde(default)]
    pub volumes: BTreeMap<String, String>,
    /// Free form metadata
    #[serde(default)]
    pub meta: BTreeMap<String, String>,
    /// DNS servers
    #[serde(default)]
    pub dns: Vec<String>,
}

/// A named way of running the application
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Entrypoint {
    /// Command and arguments, either a list or a whitespace separated string
    #[serde(rename = "cmd", deserialize_with = "command")]
    pub command: Vec<String>,
    #[serde(default)]
    pub privileged: bool,
    /// Working directory
    #[serde(default)]
    pub dir: String,
    /// Passed to the core untouched
    #[serde(default)]
    pub log_config: String,
    /// Published ports as `<port>[/<protocol>]`, decoded when the request is built
    #[serde(default)]
    pub publish: Vec<String>,
    #[serde(default)]
    pub healthcheck: Option<HealthCheck>,
    #[serde(default)]
    pub hook: Option<Hook>,
    #[serde(rename = "restart", default)]
    pub restart_policy: String,
    /// Extra `/etc/hosts` entries as `host:ip`
    #[serde(rename = "hosts", default)]
    pub extra_hosts: Vec<String>,
}

/// TCP or HTTP probe
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HealthCheck {
    #[serde(default)]
    pub ports: Vec<String>,
    /// Empty means a TCP only check
    #[serde(default)]
    pub url: String,
    /// Expected HTTP status, only meaningful with `url`
    #[serde(default)]
    pub code: i32,
}

/// Lifecycle commands
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Hook {
    #[serde(default, deserialize_with = "tokens")]
    pub after_start: Vec<String>,
    #[serde(default, deserialize_with = "tokens")]
    pub before_stop: Vec<String>,
    /// Fail the deployment if a hook fails
    #[serde(default)]
    pub force: bool,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum CommandLine {
    Tokens(Vec<String>),
    Line(String),
}

fn tokens<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Vec<String>, D::Error> {
    Ok(match CommandLine::deserialize(deserializer)? {
        CommandLine::Tokens(tokens) => tokens,
        CommandLine::Line(line) => line.split_whitespace().map(str::to_string).collect(),
    })
}

fn command<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Vec<String>, D::Error> {
    let command = tokens(deserializer)?;
    if command.is_empty() {
        return Err(de::Error::custom("cmd must not be empty"));
    }
    Ok(command)
}

impl Specs {
    /// Decode a spec document
    pub fn parse(data: &[u8], format: SpecFormat) -> Result<Self> {
        let specs: Self = match format {
            SpecFormat::Yaml => {
                serde_yaml::from_slice(data).map_err(|e| Error::MalformedSpec(e.to_string()))?
            }
            SpecFormat::Json => {
                serde_json::from_slice(data).map_err(|e| Error::MalformedSpec(e.to_string()))?
            }
        };
        tracing::debug!(
            "parsed spec for {} with entrypoints {:?}",
            specs.appname,
            specs.entrypoints.keys().collect::<Vec<_>>()
        );
        Ok(specs)
    }
}
