//! Where the renderer reads its HTML input from.

use std::path::Path;

use serde::Deserialize;
use url::Url;

use crate::error::{RenderError, Result};

/// Route on the host application that serves stored HTML back by id.
pub const DEFAULT_CALLBACK_ROUTE: &str = "/plugin/Web2Print/temp-file/get";

/// How the renderer is pointed at the stored HTML.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum SourceMode {
    /// Pass the path of the stored HTML file.
    #[default]
    File,
    /// Pass a URL on the host application that serves the stored HTML.
    ///
    /// The host is resolved as: `hostname`, then `domain`, then the host header
    /// of the request that triggered the render.
    Callback {
        /// Hostname configured for rendering.
        #[serde(default)]
        hostname: Option<String>,
        /// Site-wide domain, used when no hostname is configured.
        #[serde(default)]
        domain: Option<String>,
        /// Path of the endpoint serving stored HTML.
        #[serde(default = "default_route")]
        route: String,
    },
}

fn default_route() -> String {
    DEFAULT_CALLBACK_ROUTE.to_string()
}

/// The request a render is performed on behalf of.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestOrigin {
    /// Value of the HTTP `Host` header.
    pub host: Option<String>,
    /// Whether the request was served over TLS.
    pub tls: bool,
}

impl RequestOrigin {
    /// An origin with a known host header.
    pub fn new(host: impl Into<String>, tls: bool) -> Self {
        Self {
            host: Some(host.into()),
            tls,
        }
    }
}

impl SourceMode {
    /// Build a callback source with the default route.
    pub fn callback(hostname: Option<String>, domain: Option<String>) -> Self {
        SourceMode::Callback {
            hostname,
            domain,
            route: default_route(),
        }
    }

    /// Compute the source reference for a stored document.
    pub fn reference(&self, id: &str, path: &Path, origin: Option<&RequestOrigin>) -> Result<String> {
        match self {
            SourceMode::File => path
                .to_str()
                .map(str::to_string)
                .ok_or_else(|| {
                    RenderError::Configuration(format!(
                        "input path {} is not valid UTF-8",
                        path.display()
                    ))
                }),
            SourceMode::Callback {
                hostname,
                domain,
                route,
            } => {
                let host = resolve_host(hostname.as_deref(), domain.as_deref(), origin)?;
                let tls = origin.is_some_and(|origin| origin.tls);
                callback_url(tls, &host, route, id)
            }
        }
    }
}

/// Pick the host for callback URLs. Blank values count as unset.
pub fn resolve_host(
    hostname: Option<&str>,
    domain: Option<&str>,
    origin: Option<&RequestOrigin>,
) -> Result<String> {
    [
        hostname,
        domain,
        origin.and_then(|origin| origin.host.as_deref()),
    ]
    .into_iter()
    .flatten()
    .map(str::trim)
    .find(|host| !host.is_empty())
    .map(str::to_string)
    .ok_or_else(|| {
        RenderError::Configuration(
            "no hostname, domain or request host available for the callback URL".to_string(),
        )
    })
}

/// `<scheme>://<host><route>?id=<id>`, with `https` iff `tls`.
pub fn callback_url(tls: bool, host: &str, route: &str, id: &str) -> Result<String> {
    let scheme = if tls { "https" } else { "http" };
    let route = route.trim_start_matches('/');
    let mut url = Url::parse(&format!("{scheme}://{host}/{route}"))
        .map_err(|e| RenderError::Configuration(format!("invalid callback URL: {e}")))?;
    url.query_pairs_mut().append_pair("id", id);
    Ok(url.to_string())
}
