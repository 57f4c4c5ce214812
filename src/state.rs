//! Shared process state: the atomically-swapped configuration plus the
//! memoized build-system sessions, bundled behind one handle that `main`
//! constructs once and every dispatch call borrows.

use std::sync::Arc;

use arc_swap::ArcSwapOption;

use crate::buildsys::{BuildSystem, Role, SessionCache};
use crate::cache::HttpLookasideCache;
use crate::config::{self, Configuration};

/// Process-wide state. `configuration` replaces atomically: a reader always
/// sees either the previous [`Configuration`] or the next one in full,
/// never a half-applied mix of `main` and `comps`.
pub struct Core {
    configuration: ArcSwapOption<Configuration>,
    sessions: SessionCache,
    attempts: u32,
    dry_run: bool,
}

impl Core {
    pub fn new(attempts: u32, dry_run: bool) -> Self {
        Core { configuration: ArcSwapOption::from(None), sessions: SessionCache::new(), attempts, dry_run }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn dry_run(&self) -> bool {
        self.dry_run
    }

    pub fn configuration(&self) -> Option<Arc<Configuration>> {
        self.configuration.load_full()
    }

    /// Reload the configuration from `scmurl` and, on success, swap it in
    /// atomically. Leaves the previous configuration in place on failure.
    pub fn reload(&self, scmurl: &str) -> bool {
        match config::load_config(scmurl, self.attempts) {
            Some(cnf) => {
                self.configuration.store(Some(Arc::new(cnf)));
                true
            }
            None => {
                log::error!("Failed to load the configuration from {scmurl}, keeping the previous one.");
                false
            }
        }
    }

    pub fn build_system(&self, role: Role) -> Option<Arc<dyn BuildSystem>> {
        let cnf = self.configuration()?;
        let profile = match role {
            Role::Source => &cnf.main.source.profile,
            Role::Destination => &cnf.main.destination.profile,
        };
        self.sessions.get(role, profile)
    }

    pub fn source_cache(&self) -> Option<HttpLookasideCache> {
        let cnf = self.configuration()?;
        Some(HttpLookasideCache::new(&cnf.main.source.cache.url, &cnf.main.source.cache.cgi))
    }

    pub fn destination_cache(&self) -> Option<HttpLookasideCache> {
        let cnf = self.configuration()?;
        Some(HttpLookasideCache::new(&cnf.main.destination.cache.url, &cnf.main.destination.cache.cgi))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_core_has_no_configuration() {
        let core = Core::new(3, true);
        assert!(core.configuration().is_none());
        assert!(core.build_system(Role::Source).is_none());
        assert!(core.source_cache().is_none());
    }

    #[test]
    fn reload_failure_keeps_previous_configuration() {
        let core = Core::new(1, true);
        core.configuration.store(Some(Arc::new(config::test_support::minimal_configuration())));
        assert!(!core.reload("file:///does/not/exist"));
        assert!(core.configuration().is_some());
    }
}
