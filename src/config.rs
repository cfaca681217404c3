//! Configuration management for the SDS data source.
//!
//! Two layers live here:
//!
//! 1. The persisted instance settings handed over by the host: the instance
//!    (proxy) URL, the JSON options blob ([`DataSourceOptions`]) and the
//!    secure fields. Secrets are write-only and sit behind [`ConfigStore`].
//! 2. Settings loading for the command-line front end, through multiple sources
//!    in order of precedence (later sources override earlier ones):
//!    - Default configuration (embedded in binary)
//!    - System-wide configuration file (`/etc/sds-datasource/config.toml`)
//!    - Local overrides (`config/local.toml`)
//!    - User-specified configuration file
//!    - Environment variables (prefixed with `SDS_`, nested keys separated by `__`)
//!    - Command-line arguments
//!
//! # Environment Variables
//!
//! - `SDS_URL` - instance (proxy) URL
//! - `SDS_OPTIONS__TYPE` - `OCS` or `EDS`
//! - `SDS_OPTIONS__OCS_TENANT` - OCS tenant id
//! - `SDS_OPTIONS__NAMESPACE` - namespace id
//! - `SDS_CLIENT_SECRET` - OCS client secret
//! - `SDS_ACCESS_TOKEN` - bearer token forwarded when `oauth_pass_thru` is on

use clap::Args;
use config::{Config, ConfigError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::RwLock;

use crate::error::SdsError;

const DEFAULT_CONFIG: &str = include_str!("../config/default.toml");
const DEFAULT_CONFIG_PATH: &str = "/etc/sds-datasource/config.toml";
const LOCAL_CONFIG_PATH: &str = "config/local.toml";

pub const DEFAULT_EDS_PORT: &str = "5590";
pub const DEFAULT_OCS_URL: &str = "https://dat-b.osisoft.com";
pub const DEFAULT_OCS_VERSION: &str = "v1";

/// Key of the OCS client secret among the secure fields.
pub const OCS_SECRET_KEY: &str = "ocsSecret";

const REDACTED: &str = "[redacted]";

/// The flavour of Sequential Data Store behind the data source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BackendKind {
    /// OSIsoft Cloud Services, multi-tenant.
    #[default]
    #[serde(rename = "OCS", alias = "ocs")]
    Ocs,
    /// Edge Data Store, single tenant on localhost.
    #[serde(rename = "EDS", alias = "eds")]
    Eds,
}

impl BackendKind {
    pub fn label(&self) -> &'static str {
        match self {
            BackendKind::Ocs => "OSIsoft Cloud Services",
            BackendKind::Eds => "Edge Data Store",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Ocs => f.write_str("OCS"),
            BackendKind::Eds => f.write_str("EDS"),
        }
    }
}

impl FromStr for BackendKind {
    type Err = SdsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "OCS" => Ok(BackendKind::Ocs),
            "EDS" => Ok(BackendKind::Eds),
            other => Err(SdsError::InvalidOption(format!("unknown backend type '{}'", other))),
        }
    }
}

/// Namespaces an Edge Data Store exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdsNamespace {
    Default,
    Diagnostics,
}

impl EdsNamespace {
    pub const ALL: [EdsNamespace; 2] = [EdsNamespace::Default, EdsNamespace::Diagnostics];

    pub fn as_str(&self) -> &'static str {
        match self {
            EdsNamespace::Default => "default",
            EdsNamespace::Diagnostics => "diagnostics",
        }
    }
}

impl FromStr for EdsNamespace {
    type Err = SdsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EdsNamespace::ALL
            .into_iter()
            .find(|ns| ns.as_str() == s)
            .ok_or_else(|| SdsError::InvalidOption(format!("unknown EDS namespace '{}'", s)))
    }
}

/// The JSON options blob persisted by the host for a data source instance.
///
/// Field names follow the host's camelCase keys. The snake_case spellings
/// written by older versions (`eds_port`, `ocs_url`, ...) are accepted too,
/// which also lets file and environment sources set them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataSourceOptions {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<BackendKind>,
    #[serde(default, alias = "eds_port", skip_serializing_if = "Option::is_none")]
    pub eds_port: Option<String>,
    #[serde(default, alias = "ocs_url", skip_serializing_if = "Option::is_none")]
    pub ocs_url: Option<String>,
    #[serde(default, alias = "ocs_version", skip_serializing_if = "Option::is_none")]
    pub ocs_version: Option<String>,
    #[serde(default, alias = "ocs_tenant", skip_serializing_if = "Option::is_none")]
    pub ocs_tenant: Option<String>,
    #[serde(default, alias = "ocs_client", skip_serializing_if = "Option::is_none")]
    pub ocs_client: Option<String>,
    #[serde(default, alias = "ocs_use_community", skip_serializing_if = "Option::is_none")]
    pub ocs_use_community: Option<bool>,
    #[serde(default, alias = "ocs_community", skip_serializing_if = "Option::is_none")]
    pub ocs_community: Option<String>,
    #[serde(default, alias = "oauth_pass_thru", skip_serializing_if = "Option::is_none")]
    pub oauth_pass_thru: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

/// Treats empty strings like missing values.
pub(crate) fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.is_empty())
}

impl DataSourceOptions {
    /// Fills in the defaults the configuration editor shows for unset fields.
    pub fn with_defaults(mut self) -> Self {
        let kind = *self.kind.get_or_insert(BackendKind::Ocs);
        if non_empty(&self.eds_port).is_none() {
            self.eds_port = Some(DEFAULT_EDS_PORT.to_string());
        }
        if non_empty(&self.ocs_url).is_none() {
            self.ocs_url = Some(DEFAULT_OCS_URL.to_string());
        }
        if non_empty(&self.ocs_version).is_none() {
            self.ocs_version = Some(DEFAULT_OCS_VERSION.to_string());
        }
        self.oauth_pass_thru.get_or_insert(false);
        if kind == BackendKind::Eds && non_empty(&self.namespace).is_none() {
            self.namespace = Some(EdsNamespace::Default.as_str().to_string());
        }
        self
    }

    /// Checks the options the editor constrains to a fixed set.
    pub fn validate(&self) -> Result<(), SdsError> {
        if self.kind == Some(BackendKind::Eds) {
            if let Some(namespace) = non_empty(&self.namespace) {
                namespace.parse::<EdsNamespace>()?;
            }
            if let Some(port) = non_empty(&self.eds_port) {
                port.parse::<u16>().map_err(|_| {
                    SdsError::InvalidOption(format!("EDS port '{}' is not a port number", port))
                })?;
            }
        }
        Ok(())
    }
}

/// Secure (write-only) options of an instance.
#[derive(Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecureOptions {
    #[serde(default)]
    pub ocs_secret: Option<String>,
}

impl fmt::Debug for SecureOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecureOptions")
            .field("ocs_secret", &self.ocs_secret.as_ref().map(|_| REDACTED))
            .finish()
    }
}

/// Instance settings as the host hands them to a data source.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceSettings {
    #[serde(default)]
    pub name: String,
    /// Instance (proxy) URL; requests to OCS are issued below it.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub json_data: DataSourceOptions,
    /// Which secure fields hold a value. The values themselves are never exposed.
    #[serde(default)]
    pub secure_json_fields: HashMap<String, bool>,
}

/// Host-owned configuration and secret storage.
pub trait ConfigStore: Send + Sync {
    /// Current settings. Secure values are reported only as configured flags.
    fn get(&self) -> InstanceSettings;

    /// Replaces the options; secure values left as `None` are kept.
    fn set(&self, options: DataSourceOptions, secure: SecureOptions);

    /// Replaces every stored secret value occurring in `text`.
    fn redact(&self, text: &str) -> String;

    /// Clears a secret so it has to be entered again.
    fn reset_secret(&self, key: &str);
}

/// In-process [`ConfigStore`], used by the command-line front end and tests.
#[derive(Default)]
pub struct InMemoryConfigStore {
    inner: RwLock<StoreState>,
}

#[derive(Default)]
struct StoreState {
    settings: InstanceSettings,
    secrets: HashMap<String, String>,
}

impl InMemoryConfigStore {
    pub fn new(settings: InstanceSettings) -> Self {
        Self {
            inner: RwLock::new(StoreState {
                settings,
                secrets: HashMap::new(),
            }),
        }
    }

    /// Stored secret value, for the transport layer only.
    pub fn secret(&self, key: &str) -> Option<String> {
        let state = self.inner.read().unwrap_or_else(|e| e.into_inner());
        state.secrets.get(key).cloned()
    }
}

impl ConfigStore for InMemoryConfigStore {
    fn get(&self) -> InstanceSettings {
        let state = self.inner.read().unwrap_or_else(|e| e.into_inner());
        let mut settings = state.settings.clone();
        settings.secure_json_fields = state
            .secrets
            .iter()
            .map(|(key, value)| (key.clone(), !value.is_empty()))
            .collect();
        settings
    }

    fn set(&self, options: DataSourceOptions, secure: SecureOptions) {
        let mut state = self.inner.write().unwrap_or_else(|e| e.into_inner());
        state.settings.json_data = options;
        if let Some(secret) = secure.ocs_secret {
            state.secrets.insert(OCS_SECRET_KEY.to_string(), secret);
        }
    }

    fn redact(&self, text: &str) -> String {
        let state = self.inner.read().unwrap_or_else(|e| e.into_inner());
        state
            .secrets
            .values()
            .filter(|secret| !secret.is_empty())
            .fold(text.to_string(), |acc, secret| acc.replace(secret.as_str(), REDACTED))
    }

    fn reset_secret(&self, key: &str) {
        let mut state = self.inner.write().unwrap_or_else(|e| e.into_inner());
        state.secrets.insert(key.to_string(), String::new());
    }
}

/// Connection arguments shared by every command of the front end.
#[derive(Args, Debug, Default)]
pub struct CliArgs {
    /// Path to the configuration file
    #[arg(short, long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Instance (proxy) URL
    #[arg(long, env = "SDS_URL", global = true)]
    pub url: Option<String>,

    /// Backend type (OCS or EDS)
    #[arg(long = "type", env = "SDS_TYPE", global = true)]
    pub kind: Option<String>,

    /// OCS tenant id
    #[arg(long, env = "SDS_TENANT", global = true)]
    pub tenant: Option<String>,

    /// Namespace id
    #[arg(long, env = "SDS_NAMESPACE", global = true)]
    pub namespace: Option<String>,

    /// OCS community id; enables community mode
    #[arg(long, env = "SDS_COMMUNITY", global = true)]
    pub community: Option<String>,

    /// EDS port
    #[arg(long, env = "SDS_EDS_PORT", global = true)]
    pub eds_port: Option<String>,

    /// OCS client secret
    #[arg(long, env = "SDS_CLIENT_SECRET", hide_env_values = true, global = true)]
    pub client_secret: Option<String>,

    /// Bearer token forwarded when OAuth pass-through is enabled
    #[arg(long, env = "SDS_ACCESS_TOKEN", hide_env_values = true, global = true)]
    pub access_token: Option<String>,
}

/// Complete front-end configuration.
#[derive(Deserialize)]
pub struct Settings {
    /// Instance name
    #[serde(default)]
    pub name: String,
    /// Instance (proxy) URL
    #[serde(default)]
    pub url: Option<String>,
    /// Persisted options blob
    #[serde(default)]
    pub options: DataSourceOptions,
    /// Client secret (not read from files)
    #[serde(skip)]
    pub client_secret: Option<String>,
    /// Pass-through bearer token (not read from files)
    #[serde(skip)]
    pub access_token: Option<String>,
}

impl Settings {
    /// Loads configuration from all available sources.
    pub fn new(cli: &CliArgs) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();

        // Load default configuration
        builder = builder.add_source(config::File::from_str(
            DEFAULT_CONFIG,
            config::FileFormat::Toml,
        ));

        // Load system configuration if it exists
        if let Ok(metadata) = std::fs::metadata(DEFAULT_CONFIG_PATH) {
            if metadata.is_file() {
                builder = builder.add_source(config::File::from(PathBuf::from(DEFAULT_CONFIG_PATH)));
            }
        }

        // Add local overrides
        builder = builder.add_source(config::File::from(PathBuf::from(LOCAL_CONFIG_PATH)).required(false));

        // Load user configuration if specified
        if let Some(ref config_path) = cli.config {
            builder = builder.add_source(config::File::from(config_path.clone()));
        }

        // Add environment variables (prefixed with SDS_)
        builder = builder.add_source(
            config::Environment::with_prefix("SDS")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        // Override with command line arguments
        if let Some(ref url) = cli.url {
            builder = builder.set_override("url", url.as_str())?;
        }
        if let Some(ref kind) = cli.kind {
            builder = builder.set_override("options.type", kind.to_ascii_uppercase())?;
        }
        if let Some(ref tenant) = cli.tenant {
            builder = builder.set_override("options.ocs_tenant", tenant.as_str())?;
        }
        if let Some(ref namespace) = cli.namespace {
            builder = builder.set_override("options.namespace", namespace.as_str())?;
        }
        if let Some(ref community) = cli.community {
            builder = builder
                .set_override("options.ocs_community", community.as_str())?
                .set_override("options.ocs_use_community", true)?;
        }
        if let Some(ref port) = cli.eds_port {
            builder = builder.set_override("options.eds_port", port.as_str())?;
        }

        let mut settings: Settings = builder.build()?.try_deserialize()?;

        settings.client_secret = Self::load_secret(cli.client_secret.as_ref(), "SDS_CLIENT_SECRET");
        settings.access_token = Self::load_secret(cli.access_token.as_ref(), "SDS_ACCESS_TOKEN");

        Ok(settings)
    }

    /// Priority order (highest to lowest):
    /// 1. Environment variables
    /// 2. Command line arguments
    fn load_secret(cli_value: Option<&String>, var: &str) -> Option<String> {
        env::var(var)
            .ok()
            .or_else(|| cli_value.cloned())
            .filter(|s| !s.is_empty())
    }

    /// The settings the data source is instantiated from.
    pub fn instance_settings(&self) -> InstanceSettings {
        let mut secure_json_fields = HashMap::new();
        if self.client_secret.is_some() {
            secure_json_fields.insert(OCS_SECRET_KEY.to_string(), true);
        }
        InstanceSettings {
            name: self.name.clone(),
            url: self.url.clone(),
            json_data: self.options.clone(),
            secure_json_fields,
        }
    }

    /// A [`ConfigStore`] seeded with these settings and the client secret.
    pub fn into_store(self) -> InMemoryConfigStore {
        let store = InMemoryConfigStore::new(self.instance_settings());
        store.set(
            self.options,
            SecureOptions {
                ocs_secret: self.client_secret,
            },
        );
        store
    }
}
