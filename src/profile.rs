//! Backend addressing resolved from instance settings.

use crate::config::{
    non_empty, BackendKind, InstanceSettings, DEFAULT_EDS_PORT, DEFAULT_OCS_URL, DEFAULT_OCS_VERSION,
};

/// Resolved connection configuration of a data source instance.
///
/// Built once from the persisted settings and never mutated afterwards; an
/// edited configuration produces a new profile.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionProfile {
    pub name: String,
    pub kind: BackendKind,
    /// Instance (proxy) URL, trimmed; empty when unset.
    pub base_url: String,
    /// Address of the OCS service the instance URL routes to.
    pub ocs_url: String,
    pub eds_port: String,
    pub ocs_version: String,
    pub tenant_id: String,
    pub namespace: String,
    pub community_mode: bool,
    pub community_id: String,
    pub oauth_pass_thru: bool,
}

impl Default for ConnectionProfile {
    fn default() -> Self {
        Self::from_settings(&InstanceSettings::default())
    }
}

impl ConnectionProfile {
    pub fn from_settings(settings: &InstanceSettings) -> Self {
        let options = &settings.json_data;
        let or_default = |value: &Option<String>, default: &str| {
            non_empty(value).unwrap_or(default).to_string()
        };

        Self {
            name: settings.name.clone(),
            kind: options.kind.unwrap_or_default(),
            base_url: settings
                .url
                .as_deref()
                .map(str::trim)
                .unwrap_or_default()
                .to_string(),
            ocs_url: or_default(&options.ocs_url, DEFAULT_OCS_URL),
            eds_port: or_default(&options.eds_port, DEFAULT_EDS_PORT),
            ocs_version: or_default(&options.ocs_version, DEFAULT_OCS_VERSION),
            tenant_id: or_default(&options.ocs_tenant, ""),
            namespace: or_default(&options.namespace, ""),
            community_mode: options.ocs_use_community.unwrap_or(false),
            community_id: or_default(&options.ocs_community, ""),
            oauth_pass_thru: options.oauth_pass_thru.unwrap_or(false),
        }
    }

    /// Community addressing only applies to OCS.
    pub fn uses_community(&self) -> bool {
        self.kind == BackendKind::Ocs && self.community_mode
    }

    /// Whether a namespace or community is configured to search streams in.
    pub fn has_scope(&self) -> bool {
        self.uses_community() || !self.namespace.is_empty()
    }

    /// URL enumerating the streams of the active namespace or community.
    pub fn listing_url(&self) -> String {
        match self.kind {
            BackendKind::Eds => format!(
                "http://localhost:{}/api/v1/tenants/default/namespaces/{}/streams",
                self.eds_port, self.namespace
            ),
            BackendKind::Ocs if self.community_mode => format!(
                "{}/ocs/api/{}/tenants/{}/search/communities/{}/streams",
                self.base_url, self.ocs_version, self.tenant_id, self.community_id
            ),
            BackendKind::Ocs => format!(
                "{}/ocs/api/{}/tenants/{}/namespaces/{}/streams",
                self.base_url, self.ocs_version, self.tenant_id, self.namespace
            ),
        }
    }
}
