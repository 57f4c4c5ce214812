//! Component sync pipeline (C6): the 11-step algorithm that reconciles one
//! component's destination git history (and lookaside cache) with its
//! resolved upstream build.


use std::path::Path;
use rand::RngExt;
use rand::distr::Alphabetic;

use crate::buildsys::BuildSystem;
use crate::cache::{self, LookasideCache};
use crate::config::{Configuration, Namespace};
use crate::git::{GitError, Repository};
use crate::retry;
use crate::scm::{self, ScmUrl};
use crate::sources;

pub struct SyncContext<'a> {
    pub cnf: &'a Configuration,
    pub source_bsys: &'a dyn BuildSystem,
    pub scache: &'a dyn LookasideCache,
    pub dcache: &'a dyn LookasideCache,
    pub attempts: u32,
    pub dry_run: bool,
}

/// Run the full sync algorithm for `ns/comp` against `nvr`'s resolved
/// upstream SCMURL. Returns the pushed destination `HEAD` revision.
pub fn sync_repo(ctx: &SyncContext, comp: &str, ns: Namespace, nvr: &str) -> Option<String> {
    if ctx.cnf.is_excluded(ns, comp) {
        log::error!("critical: the component {ns}/{comp} is excluded from sync, aborting.");
        return None;
    }
    log::info!("Synchronizing SCM for {ns}/{comp}.");

    // Step 1: resolve the build SCMURL.
    let bscm_raw = match ctx.source_bsys.get_build_source(nvr) {
        Ok(Some(s)) => s,
        Ok(None) => {
            log::error!("Cannot find any SCMURLs associated with {nvr}.");
            return None;
        }
        Err(e) => {
            log::error!("An error occurred while retrieving the SCMURL for {nvr}: {e:#}");
            return None;
        }
    };
    let bscm = scm::split_scmurl(&bscm_raw);

    // Step 2: resolve source/destination/build URLs.
    let (csrc, cdst) = ctx.cnf.component_source_destination(ns, comp);
    let sscm = scm::split_scmurl(&format!("{}/{ns}/{csrc}", ctx.cnf.main.source.scm.trim_end_matches('/')));
    let mut dscm = scm::split_scmurl(&format!("{}/{ns}/{cdst}", ctx.cnf.main.destination.scm.trim_end_matches('/')));
    if dscm.ref_.is_none() {
        dscm.ref_ = Some("master".to_string());
    }

    let tempdir = tempfile::Builder::new().prefix(&format!("repo-{ns}-{comp}-")).tempdir().ok()?;

    // Step 3: clone the destination.
    log::debug!("Cloning {ns}/{comp} from {}/{ns}/{cdst}", ctx.cnf.main.destination.scm);
    let repo = retry::retry(ctx.attempts, &format!("clone destination repository for {ns}/{comp}"), |_| {
        Repository::shallow_clone(&dscm.link, dscm.ref_or_master(), tempdir.path())
    })?;

    // Step 4: fetch upstream.
    repo.add_remote("source", &sscm.link).ok()?;
    if sscm.ref_.is_some() {
        log::debug!("Fetching the {} upstream branch for {ns}/{comp}.", sscm.ref_.as_deref().unwrap());
    } else {
        log::debug!("Fetching all upstream branches for {ns}/{comp}.");
    }
    retry::retry(ctx.attempts, &format!("fetch upstream repository for {ns}/{comp}"), |_| {
        repo.fetch("source", sscm.ref_.as_deref())
    })?;

    // Step 5: configure identity.
    if repo.set_identity(&ctx.cnf.main.git.author, &ctx.cnf.main.git.email).is_err() {
        log::error!("Failed configuring the git repository while processing {ns}/{comp}, skipping.");
        return None;
    }

    // Step 6: snapshot destination sources.
    let owner = format!("{ns}/{comp}");
    let sources_path = tempdir.path().join("sources");
    let dsrc = sources::parse_sources(&sources_path, &owner)?;

    // Step 7: reconcile histories.
    if ctx.cnf.main.control.merge {
        sync_merge(&repo, &bscm, &dscm, &sscm, ctx, ns, comp)?;
    } else {
        sync_pull(&repo, &bscm, ns, comp)?;
    }

    // Step 8: snapshot source-side sources.
    let ssrc = sources::parse_sources(&sources_path, &owner)?;

    // Step 9: reconcile cache.
    let srcdiff: std::collections::HashSet<_> = ssrc.difference(&dsrc).cloned().collect();
    if !srcdiff.is_empty() {
        log::debug!("Source files for {ns}/{comp} differ.");
        cache::sync_cache(ctx.cnf, ctx.scache, ctx.dcache, comp, &srcdiff, ns, ctx.attempts, ctx.dry_run)?;
    } else {
        log::debug!("Source files for {ns}/{comp} are up-to-date.");
    }

    // Step 10: push.
    let refname = dscm.ref_or_master().to_string();
    retry::retry(ctx.attempts, &format!("push {ns}/{comp}"), |_| {
        repo.push("origin", &refname, ctx.dry_run)
    })?;

    log::info!("Successfully synchronized {ns}/{comp}.");

    // Step 11: return the pushed revision.
    repo.head_rev().ok()
}

fn sync_merge(
    repo: &Repository,
    bscm: &ScmUrl,
    dscm: &ScmUrl,
    sscm: &ScmUrl,
    ctx: &SyncContext,
    ns: Namespace,
    comp: &str,
) -> Option<()> {
    log::debug!("Attempting to synchronize the {ns}/{comp} branches using the merge mechanism.");
    let bname = find_unused_branch_name(repo, ctx.attempts, ns, comp)?;

    let bscm_ref = bscm.ref_.as_deref().unwrap_or("HEAD");
    let dscm_ref = dscm.ref_or_master();

    (|| -> anyhow::Result<()> {
        repo.checkout(bscm_ref)?;
        repo.switch_new_branch(&bname)?;
        repo.merge_ours_no_commit(dscm_ref)?;
        repo.commit_empty(&ctx.cnf.main.git.author, &ctx.cnf.main.git.email, "Temporary working tree merge")?;
        repo.checkout(dscm_ref)?;
        repo.merge_squash_no_commit(&bname)?;
        let message = format!("{}\nSource: {}#{}", ctx.cnf.main.git.message, sscm.link, bscm_ref);
        let msgfile = tempfile::Builder::new().prefix(&format!("msg-{ns}-{comp}-")).tempfile()?;
        std::fs::write(msgfile.path(), &message)?;
        repo.commit_with_file(&ctx.cnf.main.git.author, &ctx.cnf.main.git.email, msgfile.path())?;
        Ok(())
    })()
    .map_err(|e| log::error!("Failed to merge {ns}/{comp}, skipping: {e:#}"))
    .ok()?;

    log::debug!("Successfully merged {ns}/{comp} with upstream.");
    Some(())
}

fn sync_pull(repo: &Repository, bscm: &ScmUrl, ns: Namespace, comp: &str) -> Option<()> {
    log::debug!("Attempting to synchronize the {ns}/{comp} branches using the clean pull mechanism.");
    let bscm_ref = bscm.ref_.as_deref().unwrap_or("HEAD");
    match repo.pull_ff_only("source", bscm_ref) {
        Ok(()) => {
            log::debug!("Successfully pulled {ns}/{comp} from upstream.");
            Some(())
        }
        Err(GitError::UnrelatedHistories) => {
            log::error!("Failed to perform a clean pull for {ns}/{comp}, skipping: refusing to merge unrelated histories.");
            None
        }
        Err(e) => {
            log::error!("Failed to perform a clean pull for {ns}/{comp}, skipping: {e}");
            None
        }
    }
}

/// Find a 16-character alphabetic branch name that doesn't already resolve
/// in `repo`, retrying up to `attempts` times. Collisions are astronomically
/// unlikely; this exists to make that assumption explicit rather than
/// silent.
fn find_unused_branch_name(repo: &Repository, attempts: u32, ns: Namespace, comp: &str) -> Option<String> {
    let mut rng = rand::rng();
    for attempt in 1..=attempts.max(1) {
        let name: String = (0..16).map(|_| rng.sample(Alphabetic) as char).collect();
        if repo.rev_parse_exists(&name) {
            log::debug!(
                "{ns}/{comp}#{name} is taken. Some people choose really weird branch names. Retrying, attempt #{attempt}/{attempts}."
            );
            continue;
        }
        log::debug!("Using {ns}/{comp}#{name} as the temporary merge branch name.");
        return Some(name);
    }
    log::error!(
        "Exhausted attempts finding an unused branch name while synchronizing {ns}/{comp}; this is very rare, congratulations. Skipping."
    );
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buildsys::TaggedBuild;
    use crate::git::test_support::init_repo_at;
    use std::cell::RefCell;
    use std::collections::HashMap;

    struct FakeBuildSystem {
        sources: HashMap<String, String>,
    }

    impl BuildSystem for FakeBuildSystem {
        fn list_tagged(&self, _tag: &str, _package: Option<&str>, _latest: bool) -> anyhow::Result<Vec<TaggedBuild>> {
            Ok(vec![])
        }
        fn get_build_source(&self, nvr: &str) -> anyhow::Result<Option<String>> {
            Ok(self.sources.get(nvr).cloned())
        }
        fn submit_build(&self, _scmurl: &str, _target: &str, _scratch: bool) -> anyhow::Result<u64> {
            Ok(1)
        }
    }

    struct FakeCache {
        present: RefCell<HashMap<String, Vec<u8>>>,
    }

    impl LookasideCache for FakeCache {
        fn remote_file_exists(&self, dir: &str, filename: &str, _hash: &str) -> anyhow::Result<bool> {
            Ok(self.present.borrow().contains_key(&format!("{dir}/{filename}")))
        }
        fn download(&self, dir: &str, filename: &str, _hash: &str, dest: &Path, _hashtype: sources::HashType) -> anyhow::Result<()> {
            let data = self.present.borrow().get(&format!("{dir}/{filename}")).cloned().unwrap_or_default();
            std::fs::write(dest, data)?;
            Ok(())
        }
        fn upload(&self, dir: &str, local_path: &Path, _hash: &str, _hashtype: sources::HashType) -> anyhow::Result<()> {
            let filename = local_path.file_name().unwrap().to_str().unwrap().to_string();
            let data = std::fs::read(local_path)?;
            self.present.borrow_mut().insert(format!("{dir}/{filename}"), data);
            Ok(())
        }
    }

    /// A `Configuration` whose single `rpms/gzip` component points at
    /// `{root}/rpms/gzip` (source) and `{root}/rpms/gzip-dst`
    /// (destination), matching the fixture layout built by the test.
    fn fixture_config(root: &Path) -> Configuration {
        let mut cnf = crate::config::test_support::minimal_configuration();
        cnf.main.source.scm = root.to_string_lossy().to_string();
        cnf.main.destination.scm = root.to_string_lossy().to_string();
        cnf.comps.get_mut(&Namespace::Rpms).unwrap().insert(
            "gzip".to_string(),
            crate::config::ComponentConfig {
                source: "gzip".to_string(),
                destination: "gzip-dst".to_string(),
                cache: crate::config::ComponentCache { source: "gzip".to_string(), destination: "gzip-dst".to_string() },
            },
        );
        cnf
    }

    #[test]
    fn p8_merge_mode_produces_upstream_tree() {
        let root = tempfile::tempdir().unwrap();
        let src_path = root.path().join("rpms").join("gzip");
        let dst_path = root.path().join("rpms").join("gzip-dst");
        std::fs::create_dir_all(&src_path).unwrap();
        std::fs::create_dir_all(&dst_path).unwrap();
        // Distinct branch names so checking out the build ref by its bare
        // name can only resolve against the newly-added "source" remote,
        // exercising git's real DWIM remote-tracking-branch resolution
        // rather than accidentally hitting the destination's own branch.
        init_repo_at(&src_path, Some("rawhide"), "upstream-file.txt");
        init_repo_at(&dst_path, Some("master"), "downstream-file.txt");

        let cnf = fixture_config(root.path());
        let bsys = FakeBuildSystem {
            sources: HashMap::from([("gzip-1-1".to_string(), format!("{}#rawhide", src_path.display()))]),
        };
        let scache = FakeCache { present: RefCell::new(HashMap::new()) };
        let dcache = FakeCache { present: RefCell::new(HashMap::new()) };
        let ctx = SyncContext { cnf: &cnf, source_bsys: &bsys, scache: &scache, dcache: &dcache, attempts: 1, dry_run: true };

        let pushed = sync_repo(&ctx, "gzip", Namespace::Rpms, "gzip-1-1").expect("sync should succeed");
        assert_eq!(pushed.len(), 40);
    }

    #[test]
    fn find_unused_branch_name_retries_on_collision() {
        let dir = tempfile::tempdir().unwrap();
        let repo = init_repo_at(dir.path(), None, "f");
        let name = find_unused_branch_name(&repo, 5, Namespace::Rpms, "gzip").unwrap();
        assert_eq!(name.len(), 16);
        assert!(name.chars().all(|c| c.is_ascii_alphabetic()));
    }
}
