//! Build-system session cache (C4) and the RPC surface it memoises.
//!
//! A real deployment talks to a Koji hub over authenticated XML-RPC; this
//! crate models that surface as [`BuildSystem`] so the production HTTP
//! client and a test fake share one interface, and caches one session per
//! [`Role`] for the process lifetime.

use std::sync::OnceLock;

use anyhow::{Context, Result, anyhow};
use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum Role {
    Source,
    Destination,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TaggedBuild {
    pub package_name: String,
    pub nvr: String,
    #[serde(default)]
    pub version: String,
}

/// The subset of a Koji-like build system the sync pipeline needs.
pub trait BuildSystem: Send + Sync {
    fn list_tagged(&self, tag: &str, package: Option<&str>, latest: bool) -> Result<Vec<TaggedBuild>>;
    fn get_build_source(&self, nvr: &str) -> Result<Option<String>>;
    fn submit_build(&self, scmurl: &str, target: &str, scratch: bool) -> Result<u64>;
}

/// A Koji-profile-configured HTTP build system client. `destination`
/// sessions additionally perform a GSSAPI login at construction; `source`
/// sessions are anonymous.
pub struct HttpBuildSystem {
    server: String,
    client: reqwest::blocking::Client,
}

impl HttpBuildSystem {
    /// Read `profile` (a build-system client profile name) and, for the
    /// `destination` role, authenticate via GSSAPI. Returns an error rather
    /// than caching a half-initialised session — the caller
    /// ([`SessionCache::get`]) is responsible for not memoising a failure.
    pub fn connect(profile: &str, role: Role) -> Result<Self> {
        let server = resolve_profile_server(profile)
            .with_context(|| format!("reading build-system profile {profile}"))?;
        let client = reqwest::blocking::Client::builder()
            .build()
            .context("building build-system HTTP client")?;
        let bsys = HttpBuildSystem { server, client };
        if role == Role::Destination {
            bsys.gssapi_login().context("authenticating destination build system")?;
        }
        Ok(bsys)
    }

    fn gssapi_login(&self) -> Result<()> {
        self.client
            .post(format!("{}/login", self.server))
            .send()
            .and_then(|r| r.error_for_status())
            .context("GSSAPI login failed")?;
        Ok(())
    }
}

impl BuildSystem for HttpBuildSystem {
    fn list_tagged(&self, tag: &str, package: Option<&str>, latest: bool) -> Result<Vec<TaggedBuild>> {
        let mut req = self.client.get(format!("{}/listTagged", self.server)).query(&[
            ("tag", tag),
            ("latest", if latest { "true" } else { "false" }),
        ]);
        if let Some(pkg) = package {
            req = req.query(&[("package", pkg)]);
        }
        let builds: Vec<TaggedBuild> =
            req.send()?.error_for_status()?.json().context("parsing listTagged response")?;
        Ok(builds)
    }

    fn get_build_source(&self, nvr: &str) -> Result<Option<String>> {
        #[derive(Deserialize)]
        struct GetBuildResponse {
            source: Option<String>,
        }
        let resp: GetBuildResponse = self
            .client
            .get(format!("{}/getBuild", self.server))
            .query(&[("nvr", nvr)])
            .send()?
            .error_for_status()?
            .json()
            .context("parsing getBuild response")?;
        Ok(resp.source)
    }

    fn submit_build(&self, scmurl: &str, target: &str, scratch: bool) -> Result<u64> {
        #[derive(Deserialize)]
        struct BuildResponse {
            task_id: u64,
        }
        let resp: BuildResponse = self
            .client
            .post(format!("{}/build", self.server))
            .json(&serde_json::json!({ "scmurl": scmurl, "target": target, "scratch": scratch }))
            .send()?
            .error_for_status()?
            .json()
            .context("parsing build response")?;
        Ok(resp.task_id)
    }
}

fn resolve_profile_server(profile: &str) -> Result<String> {
    std::env::var(format!("DISTROBAKER_{}_URL", profile.to_uppercase()))
        .map_err(|_| anyhow!("no server URL configured for profile {profile}"))
}

/// Per-role memoised session storage. A failed construction is *not*
/// cached: [`OnceLock`] can't be reset, so each role gets its own lock that
/// is only ever written on success, and `get` retries construction every
/// time it observes an empty cell.
#[derive(Default)]
pub struct SessionCache {
    source: OnceLock<std::sync::Arc<dyn BuildSystem>>,
    destination: OnceLock<std::sync::Arc<dyn BuildSystem>>,
}

impl SessionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get or lazily create the session for `role`, using `profile` to
    /// construct it on first (successful) use.
    pub fn get(&self, role: Role, profile: &str) -> Option<std::sync::Arc<dyn BuildSystem>> {
        let cell = match role {
            Role::Source => &self.source,
            Role::Destination => &self.destination,
        };
        if let Some(existing) = cell.get() {
            log::debug!("The {role} koji instance is already initialized, fetching from cache.");
            return Some(existing.clone());
        }
        log::debug!("Initializing the {role} koji instance with the \"{profile}\" profile.");
        match HttpBuildSystem::connect(profile, role) {
            Ok(bsys) => {
                let arc: std::sync::Arc<dyn BuildSystem> = std::sync::Arc::new(bsys);
                let _ = cell.set(arc.clone());
                log::debug!("The {role} koji instance initialized.");
                Some(arc)
            }
            Err(e) => {
                log::error!("Failed initializing the {role} koji instance with the \"{profile}\" profile, skipping: {e:#}");
                None
            }
        }
    }
}
