//! URL resolution rules for each API family.
//!
//! Operations carry a path relative to their API. An [`ApiVersion`] turns that
//! path into a full URL: it picks the host, adds the API's route prefix and
//! version segment, and for account-scoped APIs inserts `/accounts/{id}`.
//!
//! Paths with a leading `/` are absolute within the API prefix and skip both
//! the version segment and the account segment.

use url::Url;

/// Host used when nothing more specific is known.
pub const DEFAULT_HOST: &str = "www.docusign.net";

/// How to turn a relative operation path into a fully-qualified URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApiVersion {
    /// Human-readable API name.
    pub name: &'static str,

    /// Route prefix, e.g. `/restapi`.
    pub prefix: &'static str,

    /// Version segment, e.g. `/v2.1`.
    pub version: &'static str,

    /// Whether relative paths live under `/accounts/{account_id}`.
    pub account_path: bool,

    /// Host this API is always served from, if it has its own.
    pub host: Option<&'static str>,

    /// Host used in the demo environment.
    pub demo_host: Option<&'static str>,
}

/// eSignature REST API v2.1.
pub const ESIGN_V21: ApiVersion = ApiVersion {
    name: "eSignature REST API v2.1",
    prefix: "/restapi",
    version: "/v2.1",
    account_path: true,
    host: None,
    demo_host: Some("demo.docusign.net"),
};

/// eSignature REST API v2.
pub const ESIGN_V2: ApiVersion = ApiVersion {
    name: "eSignature REST API v2",
    prefix: "/restapi",
    version: "/v2",
    account_path: true,
    host: None,
    demo_host: Some("demo.docusign.net"),
};

/// Organization administration API v2.1.
pub const ADMIN_V21: ApiVersion = ApiVersion {
    name: "Admin API v2.1",
    prefix: "/management",
    version: "/v2.1",
    account_path: false,
    host: Some("api.docusign.net"),
    demo_host: Some("api-d.docusign.net"),
};

/// Rooms API v2.
pub const ROOMS_V2: ApiVersion = ApiVersion {
    name: "Rooms API v2",
    prefix: "/restapi",
    version: "/v2",
    account_path: true,
    host: Some("rooms.docusign.com"),
    demo_host: Some("demo.rooms.docusign.com"),
};

/// Click API v1.
pub const CLICK_V1: ApiVersion = ApiVersion {
    name: "Click API v1",
    prefix: "/clickapi",
    version: "/v1",
    account_path: true,
    host: None,
    demo_host: Some("demo.docusign.net"),
};

/// Monitor API v2.
pub const MONITOR_V2: ApiVersion = ApiVersion {
    name: "Monitor API v2",
    prefix: "/api",
    version: "/v2.0",
    account_path: false,
    host: Some("lens.docusign.net"),
    demo_host: Some("lens-d.docusign.net"),
};

/// Inputs to host selection, highest priority first.
#[derive(Debug, Clone, Copy, Default)]
pub struct HostSelection<'a> {
    /// Explicit override; scheme and port are kept.
    pub override_url: Option<&'a Url>,

    /// Whether the credential targets the demo environment.
    pub demo: bool,

    /// Base URI reported for the selected account.
    pub base_uri: Option<&'a Url>,
}

impl ApiVersion {
    /// Look up a version by a short CLI-friendly name.
    pub fn by_name(name: &str) -> Option<&'static ApiVersion> {
        match name {
            "esign" | "esign-v2.1" => Some(&ESIGN_V21),
            "esign-v2" => Some(&ESIGN_V2),
            "admin" => Some(&ADMIN_V21),
            "rooms" => Some(&ROOMS_V2),
            "click" => Some(&CLICK_V1),
            "monitor" => Some(&MONITOR_V2),
            _ => None,
        }
    }

    /// Build the path portion of the URL for an operation path.
    pub fn resolve_path(&self, path: &str, account_id: &str) -> String {
        if path.starts_with('/') {
            return format!("{}{}", self.prefix, path);
        }

        let mut resolved = format!("{}{}", self.prefix, self.version);
        if self.account_path {
            resolved.push_str("/accounts/");
            resolved.push_str(account_id);
        }
        if !path.is_empty() {
            resolved.push('/');
            resolved.push_str(path);
        }
        resolved
    }

    /// Pick the scheme and host for a call.
    ///
    /// Priority: explicit override, demo host, the API's own host, the
    /// account's base URI, then [`DEFAULT_HOST`].
    pub fn select_base(&self, hosts: &HostSelection<'_>) -> Result<Url, url::ParseError> {
        if let Some(url) = hosts.override_url {
            return Ok(origin_of(url));
        }
        if hosts.demo {
            if let Some(host) = self.demo_host {
                return Url::parse(&format!("https://{}", host));
            }
        }
        if let Some(host) = self.host {
            return Url::parse(&format!("https://{}", host));
        }
        if let Some(url) = hosts.base_uri {
            return Ok(origin_of(url));
        }
        Url::parse(&format!("https://{}", DEFAULT_HOST))
    }

    /// Resolve an operation path and encoded query into a full URL.
    pub fn resolve_url(
        &self,
        path: &str,
        query: Option<&str>,
        account_id: &str,
        hosts: &HostSelection<'_>,
    ) -> Result<Url, url::ParseError> {
        let mut url = self.select_base(hosts)?;
        url.set_path(&self.resolve_path(path, account_id));
        url.set_query(query.filter(|q| !q.is_empty()));
        Ok(url)
    }
}

fn origin_of(url: &Url) -> Url {
    let mut origin = url.clone();
    origin.set_path("");
    origin.set_query(None);
    origin.set_fragment(None);
    origin
}
