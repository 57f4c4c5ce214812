//! Configuration loader and schema (C3).
//!
//! The configuration lives in a YAML file at the tip of a dedicated git
//! repository (itself an SCM URL). Loading fetches that repository, parses
//! `distrobaker.yaml`, and validates it into a [`Configuration`] whose two
//! halves — [`MainConfig`] and the per-component overrides — replace the
//! running configuration together or not at all; see [`crate::state::Core`]
//! for the atomic swap.

pub mod expansion;

use std::collections::HashSet;

use indexmap::IndexMap;
use serde::Deserialize;

use crate::error::DistroBakerError;
use crate::retry;
use crate::scm::{self, ScmUrl};

/// The two component kinds this service tracks. Modules are acknowledged in
/// the schema and in [`Control::exclude`] but are not yet synced; see
/// [`crate::dispatch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum Namespace {
    Rpms,
    Modules,
}

pub const ALL_NAMESPACES: [Namespace; 2] = [Namespace::Rpms, Namespace::Modules];

#[derive(Debug, Clone)]
pub struct CacheEndpoint {
    pub url: String,
    pub cgi: String,
    pub path: String,
}

#[derive(Debug, Clone)]
pub struct Endpoint {
    pub scm: String,
    pub profile: String,
    pub mbs: String,
    pub cache: CacheEndpoint,
}

#[derive(Debug, Clone)]
pub struct Trigger {
    pub rpms: String,
    pub modules: String,
}

#[derive(Debug, Clone)]
pub struct BuildConfig {
    pub prefix: String,
    pub target: String,
    pub scratch: bool,
}

#[derive(Debug, Clone)]
pub struct GitIdentity {
    pub author: String,
    pub email: String,
    pub message: String,
}

#[derive(Debug, Clone, Default)]
pub struct Exclude {
    pub rpms: HashSet<String>,
    pub modules: HashSet<String>,
}

impl Exclude {
    pub fn for_ns(&self, ns: Namespace) -> &HashSet<String> {
        match ns {
            Namespace::Rpms => &self.rpms,
            Namespace::Modules => &self.modules,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Control {
    pub build: bool,
    pub merge: bool,
    pub strict: bool,
    pub exclude: Exclude,
}

#[derive(Debug, Clone)]
pub struct Template {
    pub source: String,
    pub destination: String,
}

#[derive(Debug, Clone)]
pub struct Defaults {
    pub cache: CacheTemplate,
    pub rpms: Template,
    pub modules: Template,
}

#[derive(Debug, Clone)]
pub struct CacheTemplate {
    pub source: String,
    pub destination: String,
}

impl Defaults {
    pub fn for_ns(&self, ns: Namespace) -> &Template {
        match ns {
            Namespace::Rpms => &self.rpms,
            Namespace::Modules => &self.modules,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MainConfig {
    pub source: Endpoint,
    pub destination: Endpoint,
    pub trigger: Trigger,
    pub build: BuildConfig,
    pub git: GitIdentity,
    pub control: Control,
    pub defaults: Defaults,
}

#[derive(Debug, Clone)]
pub struct ComponentCache {
    pub source: String,
    pub destination: String,
}

#[derive(Debug, Clone)]
pub struct ComponentConfig {
    pub source: String,
    pub destination: String,
    pub cache: ComponentCache,
}

pub type Comps = IndexMap<Namespace, IndexMap<String, ComponentConfig>>;

#[derive(Debug, Clone)]
pub struct Configuration {
    pub main: MainConfig,
    pub comps: Comps,
}

/// Split a component key into `(name, stream)`. `rpms` keys have no stream;
/// `modules` keys are `name:stream` per [`scm::split_module`].
pub fn component_name_stream(ns: Namespace, comp: &str) -> (String, String) {
    match ns {
        Namespace::Rpms => (comp.to_string(), String::new()),
        Namespace::Modules => {
            let m = scm::split_module(comp);
            (m.name, m.stream)
        }
    }
}

impl Configuration {
    pub fn component(&self, ns: Namespace, comp: &str) -> Option<&ComponentConfig> {
        self.comps.get(&ns).and_then(|m| m.get(comp))
    }

    pub fn is_excluded(&self, ns: Namespace, comp: &str) -> bool {
        self.main.control.exclude.for_ns(ns).contains(comp)
    }

    /// Resolve the effective source/destination SCM paths for `comp`,
    /// falling back to the expanded namespace template when there is no
    /// per-component override.
    pub fn component_source_destination(&self, ns: Namespace, comp: &str) -> (String, String) {
        if let Some(c) = self.component(ns, comp) {
            return (c.source.clone(), c.destination.clone());
        }
        let (name, stream) = component_name_stream(ns, comp);
        let tmpl = self.main.defaults.for_ns(ns);
        (
            expansion::expand(&tmpl.source, &name, &stream),
            expansion::expand(&tmpl.destination, &name, &stream),
        )
    }

    /// Resolve the effective source/destination lookaside cache names for
    /// `comp`.
    pub fn component_cache_names(&self, ns: Namespace, comp: &str) -> (String, String) {
        if let Some(c) = self.component(ns, comp) {
            return (c.cache.source.clone(), c.cache.destination.clone());
        }
        let (name, stream) = component_name_stream(ns, comp);
        (
            expansion::expand(&self.main.defaults.cache.source, &name, &stream),
            expansion::expand(&self.main.defaults.cache.destination, &name, &stream),
        )
    }
}

/// Resolve `ns/comp` against an endpoint's SCM root into an [`ScmUrl`],
/// reusing the `link`/`ns`/`comp` split for whatever `comp` contains.
pub fn resolve_endpoint_scmurl(base_scm: &str, ns: Namespace, component_path: &str) -> ScmUrl {
    let link = format!("{}/{ns}/{component_path}", base_scm.trim_end_matches('/'));
    scm::split_scmurl(&link)
}

// --- Raw YAML schema -------------------------------------------------
//
// Every field is optional here so that `validate_main` can report exactly
// which dotted path is missing, rather than a generic deserialization
// error pointing at a byte offset.

#[derive(Debug, Deserialize, Default)]
struct RawRoot {
    configuration: Option<RawConfiguration>,
    components: Option<RawComponents>,
}

#[derive(Debug, Deserialize, Default)]
struct RawConfiguration {
    source: Option<RawEndpoint>,
    destination: Option<RawEndpoint>,
    trigger: Option<RawTrigger>,
    build: Option<RawBuild>,
    git: Option<RawGit>,
    control: Option<RawControl>,
    defaults: Option<RawDefaults>,
}

#[derive(Debug, Deserialize, Default)]
struct RawEndpoint {
    scm: Option<String>,
    profile: Option<String>,
    mbs: Option<String>,
    cache: Option<RawCacheEndpoint>,
}

#[derive(Debug, Deserialize, Default)]
struct RawCacheEndpoint {
    url: Option<String>,
    cgi: Option<String>,
    path: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct RawTrigger {
    rpms: Option<String>,
    modules: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct RawBuild {
    prefix: Option<String>,
    target: Option<String>,
    scratch: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
struct RawGit {
    author: Option<String>,
    email: Option<String>,
    message: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct RawControl {
    build: Option<bool>,
    merge: Option<bool>,
    strict: Option<bool>,
    exclude: Option<RawExclude>,
}

#[derive(Debug, Deserialize, Default)]
struct RawExclude {
    rpms: Option<HashSet<String>>,
    modules: Option<HashSet<String>>,
}

#[derive(Debug, Deserialize, Default)]
struct RawDefaults {
    cache: Option<RawCacheTemplate>,
    rpms: Option<RawTemplate>,
    modules: Option<RawTemplate>,
}

#[derive(Debug, Deserialize, Default)]
struct RawCacheTemplate {
    source: Option<String>,
    destination: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct RawTemplate {
    source: Option<String>,
    destination: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct RawComponents {
    rpms: Option<IndexMap<String, RawComponentOverride>>,
    modules: Option<IndexMap<String, RawComponentOverride>>,
}

#[derive(Debug, Deserialize, Default)]
struct RawComponentOverride {
    source: Option<String>,
    destination: Option<String>,
    cache: Option<RawCacheTemplate>,
}

fn missing(key: impl Into<String>) -> DistroBakerError {
    DistroBakerError::ConfigValidation(key.into())
}

fn validate_endpoint(raw: Option<RawEndpoint>, key: &str) -> Result<Endpoint, DistroBakerError> {
    let raw = raw.ok_or_else(|| missing(key))?;
    let cache = raw.cache.ok_or_else(|| missing(format!("{key}.cache")))?;
    Ok(Endpoint {
        scm: raw.scm.ok_or_else(|| missing(format!("{key}.scm")))?,
        profile: raw.profile.ok_or_else(|| missing(format!("{key}.profile")))?,
        mbs: raw.mbs.ok_or_else(|| missing(format!("{key}.mbs")))?,
        cache: CacheEndpoint {
            url: cache.url.ok_or_else(|| missing(format!("{key}.cache.url")))?,
            cgi: cache.cgi.ok_or_else(|| missing(format!("{key}.cache.cgi")))?,
            path: cache.path.ok_or_else(|| missing(format!("{key}.cache.path")))?,
        },
    })
}

fn validate_template(raw: Option<RawTemplate>, key: &str) -> Result<Template, DistroBakerError> {
    let raw = raw.ok_or_else(|| missing(key))?;
    Ok(Template {
        source: raw.source.ok_or_else(|| missing(format!("{key}.source")))?,
        destination: raw.destination.ok_or_else(|| missing(format!("{key}.destination")))?,
    })
}

fn validate_cache_template(raw: Option<RawCacheTemplate>, key: &str) -> Result<CacheTemplate, DistroBakerError> {
    let raw = raw.ok_or_else(|| missing(key))?;
    Ok(CacheTemplate {
        source: raw.source.ok_or_else(|| missing(format!("{key}.source")))?,
        destination: raw.destination.ok_or_else(|| missing(format!("{key}.destination")))?,
    })
}

fn validate_main(cnf: RawConfiguration) -> Result<MainConfig, DistroBakerError> {
    let build = cnf.build.ok_or_else(|| missing("build"))?;
    let git = cnf.git.ok_or_else(|| missing("git"))?;
    let trigger = cnf.trigger.ok_or_else(|| missing("trigger"))?;
    let control = cnf.control.ok_or_else(|| missing("control"))?;
    let exclude = control.exclude.unwrap_or_default();
    let defaults = cnf.defaults.ok_or_else(|| missing("defaults"))?;

    Ok(MainConfig {
        source: validate_endpoint(cnf.source, "source")?,
        destination: validate_endpoint(cnf.destination, "destination")?,
        trigger: Trigger {
            rpms: trigger.rpms.ok_or_else(|| missing("trigger.rpms"))?,
            modules: trigger.modules.ok_or_else(|| missing("trigger.modules"))?,
        },
        build: BuildConfig {
            prefix: build.prefix.ok_or_else(|| missing("build.prefix"))?,
            target: build.target.ok_or_else(|| missing("build.target"))?,
            scratch: build.scratch.unwrap_or(false),
        },
        git: GitIdentity {
            author: git.author.ok_or_else(|| missing("git.author"))?,
            email: git.email.ok_or_else(|| missing("git.email"))?,
            message: git.message.ok_or_else(|| missing("git.message"))?,
        },
        control: Control {
            build: control.build.ok_or_else(|| missing("control.build"))?,
            merge: control.merge.ok_or_else(|| missing("control.merge"))?,
            strict: control.strict.ok_or_else(|| missing("control.strict"))?,
            exclude: Exclude {
                rpms: exclude.rpms.unwrap_or_default(),
                modules: exclude.modules.unwrap_or_default(),
            },
        },
        defaults: Defaults {
            cache: validate_cache_template(defaults.cache, "defaults.cache")?,
            rpms: validate_template(defaults.rpms, "defaults.rpms")?,
            modules: validate_template(defaults.modules, "defaults.modules")?,
        },
    })
}

fn expand_components(main: &MainConfig, raw: Option<RawComponents>) -> Comps {
    let mut comps: Comps = IndexMap::new();
    comps.insert(Namespace::Rpms, IndexMap::new());
    comps.insert(Namespace::Modules, IndexMap::new());

    let Some(raw) = raw else { return comps };

    for (ns, overrides) in [(Namespace::Rpms, raw.rpms), (Namespace::Modules, raw.modules)] {
        let Some(overrides) = overrides else { continue };
        for (key, o) in overrides {
            let (name, stream) = component_name_stream(ns, &key);
            let tmpl = main.defaults.for_ns(ns);
            let cache_tmpl = &main.defaults.cache;
            let source = o.source.unwrap_or_else(|| expansion::expand(&tmpl.source, &name, &stream));
            let destination =
                o.destination.unwrap_or_else(|| expansion::expand(&tmpl.destination, &name, &stream));
            let cache = o.cache.unwrap_or_default();
            let cache = ComponentCache {
                source: cache
                    .source
                    .unwrap_or_else(|| expansion::expand(&cache_tmpl.source, &name, &stream)),
                destination: cache
                    .destination
                    .unwrap_or_else(|| expansion::expand(&cache_tmpl.destination, &name, &stream)),
            };
            comps.entry(ns).or_default().insert(key, ComponentConfig { source, destination, cache });
        }
    }

    comps
}

/// Fetch `distrobaker.yaml` from the tip of `scmurl` and validate it into a
/// [`Configuration`]. Clone failures and malformed YAML are retried up to
/// `attempts` times via [`retry::retry`]; a schema violation is not
/// retried — it won't fix itself on a second attempt.
pub fn load_config(scmurl: &str, attempts: u32) -> Option<Configuration> {
    let url = scm::split_scmurl(scmurl);

    let contents = retry::retry(attempts, "load configuration", |_| -> anyhow::Result<String> {
        let dir = tempfile::tempdir()?;
        let repo = crate::git::Repository::shallow_clone(&url.link, url.ref_or_master(), dir.path())?;
        repo.read_file("distrobaker.yaml")
    })?;

    let raw: RawRoot = match serde_yaml::from_str(&contents) {
        Ok(r) => r,
        Err(e) => {
            log::error!("failed to parse configuration YAML: {e}");
            return None;
        }
    };

    let cnf = match raw.configuration {
        Some(c) => c,
        None => {
            log::error!("Configuration error: configuration missing.");
            return None;
        }
    };

    let main = match validate_main(cnf) {
        Ok(m) => m,
        Err(e) => return e.log_and_none(),
    };

    if main.control.strict {
        log::info!("Strict mode enabled; components outside the configuration will be ignored.");
    } else {
        log::info!("Strict mode disabled; components outside the configuration will use defaults.");
    }

    let comps = expand_components(&main, raw.components);
    Some(Configuration { main, comps })
}


#[cfg(test)]
mod tests {
    use super::*;

    pub(super) fn minimal_yaml() -> &'static str {
        r#"
configuration:
  source:
    scm: https://src.example.com
    profile: rawhide
    mbs: https://mbs.example.com
    cache:
      url: https://cache.example.com
      cgi: https://cache.example.com/lookaside.cgi
      path: /repo/pkgs
  destination:
    scm: https://dist.example.com
    profile: eln
    mbs: https://mbs-eln.example.com
    cache:
      url: https://dcache.example.com
      cgi: https://dcache.example.com/lookaside.cgi
      path: /repo/pkgs
  trigger:
    rpms: rawhide
    modules: rawhide
  build:
    prefix: eln
    target: eln
    scratch: false
  git:
    author: distrobaker
    email: distrobaker@example.com
    message: "Sync from rawhide"
  control:
    build: true
    merge: true
    strict: false
  defaults:
    cache:
      source: "%(component)s"
      destination: "%(component)s"
    rpms:
      source: "rpms/%(component)s"
      destination: "rpms/%(component)s"
    modules:
      source: "modules/%(component)s/%(stream)s"
      destination: "modules/%(component)s/%(stream)s"
"#
    }

    fn parse(yaml: &str) -> Result<MainConfig, DistroBakerError> {
        let raw: RawRoot = serde_yaml::from_str(yaml).unwrap();
        validate_main(raw.configuration.unwrap())
    }

    #[test]
    fn validates_a_complete_config() {
        let main = parse(minimal_yaml()).unwrap();
        assert_eq!(main.source.profile, "rawhide");
        assert_eq!(main.destination.profile, "eln");
        assert!(main.control.merge);
        assert!(!main.control.strict);
    }

    #[test]
    fn s2_missing_trigger_reports_dotted_path() {
        let yaml = minimal_yaml().replace(
            "trigger:\n    rpms: rawhide\n    modules: rawhide\n",
            "",
        );
        let err = parse(&yaml).unwrap_err();
        assert_eq!(err.to_string(), "Configuration error: trigger missing");
    }

    #[test]
    fn s2_missing_trigger_field_reports_dotted_path() {
        let yaml = minimal_yaml().replace("    rpms: rawhide\n", "");
        let err = parse(&yaml).unwrap_err();
        assert_eq!(err.to_string(), "Configuration error: trigger.rpms missing");
    }

    #[test]
    fn missing_control_booleans_are_required_not_defaulted() {
        let yaml = minimal_yaml().replace(
            "  control:\n    build: true\n    merge: true\n    strict: false\n",
            "  control:\n    merge: true\n    strict: false\n",
        );
        let err = parse(&yaml).unwrap_err();
        assert_eq!(err.to_string(), "Configuration error: control.build missing");
    }

    #[test]
    fn missing_nested_field_reports_full_path() {
        let yaml = minimal_yaml().replace("url: https://cache.example.com\n", "");
        let err = parse(&yaml).unwrap_err();
        assert_eq!(err.to_string(), "Configuration error: source.cache.url missing");
    }

    #[test]
    fn component_without_override_uses_template() {
        let raw: RawRoot = serde_yaml::from_str(minimal_yaml()).unwrap();
        let main = validate_main(raw.configuration.unwrap()).unwrap();
        let comps = expand_components(&main, None);
        let cnf = Configuration { main, comps };
        let (s, d) = cnf.component_source_destination(Namespace::Rpms, "gzip");
        assert_eq!(s, "rpms/gzip");
        assert_eq!(d, "rpms/gzip");
    }

    #[test]
    fn is_excluded_checks_namespace_set() {
        let raw: RawRoot = serde_yaml::from_str(minimal_yaml()).unwrap();
        let mut main = validate_main(raw.configuration.unwrap()).unwrap();
        main.control.exclude.rpms.insert("excluded-pkg".to_string());
        let comps = expand_components(&main, None);
        let cnf = Configuration { main, comps };
        assert!(cnf.is_excluded(Namespace::Rpms, "excluded-pkg"));
        assert!(!cnf.is_excluded(Namespace::Rpms, "gzip"));
        assert!(!cnf.is_excluded(Namespace::Modules, "excluded-pkg"));
    }
}
