//! Lookaside blob cache reconciliation (C5).
//!
//! The lookaside cache is a content-addressable HTTP store: a GET probes or
//! downloads a blob by `(filename, hash)`, and a `multipart/form-data` POST
//! to a CGI endpoint uploads one. [`LookasideCache`] models that surface so
//! the HTTP implementation and a test fake share one interface.

use std::path::Path;

use anyhow::{Context, Result};

use crate::config::{Configuration, Namespace};
use crate::retry;
use crate::sources::{HashType, SourceEntry};

pub trait LookasideCache {
    fn remote_file_exists(&self, dir: &str, filename: &str, hash: &str) -> Result<bool>;
    fn download(&self, dir: &str, filename: &str, hash: &str, dest: &Path, hashtype: HashType) -> Result<()>;
    fn upload(&self, dir: &str, local_path: &Path, hash: &str, hashtype: HashType) -> Result<()>;
}

/// A CGI-fronted lookaside cache reached over blocking HTTP.
pub struct HttpLookasideCache {
    url: String,
    cgi: String,
    client: reqwest::blocking::Client,
}

impl HttpLookasideCache {
    pub fn new(url: &str, cgi: &str) -> Self {
        HttpLookasideCache { url: url.to_string(), cgi: cgi.to_string(), client: reqwest::blocking::Client::new() }
    }
}

impl LookasideCache for HttpLookasideCache {
    fn remote_file_exists(&self, dir: &str, filename: &str, hash: &str) -> Result<bool> {
        let resp = self
            .client
            .get(format!("{}/{dir}/{filename}/{hash}/{filename}", self.url))
            .send()
            .context("probing lookaside cache")?;
        Ok(resp.status().is_success())
    }

    fn download(&self, dir: &str, filename: &str, hash: &str, dest: &Path, _hashtype: HashType) -> Result<()> {
        let bytes = self
            .client
            .get(format!("{}/{dir}/{filename}/{hash}/{filename}", self.url))
            .send()
            .context("downloading from lookaside cache")?
            .error_for_status()
            .context("lookaside cache download returned an error status")?
            .bytes()
            .context("reading lookaside cache download body")?;
        std::fs::write(dest, bytes).with_context(|| format!("writing {}", dest.display()))
    }

    fn upload(&self, dir: &str, local_path: &Path, hash: &str, hashtype: HashType) -> Result<()> {
        let filename = local_path
            .file_name()
            .and_then(|f| f.to_str())
            .context("upload source path has no filename")?;
        let bytes = std::fs::read(local_path).with_context(|| format!("reading {}", local_path.display()))?;
        let part = reqwest::blocking::multipart::Part::bytes(bytes).file_name(filename.to_string());
        let form = reqwest::blocking::multipart::Form::new()
            .text("name", dir.to_string())
            .text("filename", filename.to_string())
            .text(hashtype.as_str().to_string(), hash.to_string())
            .part("file", part);
        self.client
            .post(&self.cgi)
            .multipart(form)
            .send()
            .context("uploading to lookaside cache")?
            .error_for_status()
            .context("lookaside cache upload returned an error status")?;
        Ok(())
    }
}

/// Mirror every entry in `sources` (already narrowed to those the
/// destination is missing) from the configured source cache to the
/// configured destination cache for `ns/comp`. Returns the number of
/// entries processed, or `None` on exhausted retries or exclusion.
pub fn sync_cache(
    cnf: &Configuration,
    scache: &dyn LookasideCache,
    dcache: &dyn LookasideCache,
    comp: &str,
    sources: &std::collections::HashSet<SourceEntry>,
    ns: Namespace,
    attempts: u32,
    dry_run: bool,
) -> Option<usize> {
    if cnf.is_excluded(ns, comp) {
        log::error!("critical: the component {ns}/{comp} is excluded from sync, aborting.");
        return None;
    }
    log::debug!("Synchronizing {} cache file(s) for {ns}/{comp}.", sources.len());

    let (scname, dcname) = cnf.component_cache_names(ns, comp);
    let tempdir = tempfile::Builder::new()
        .prefix(&format!("cache-{ns}-{comp}-"))
        .tempdir()
        .ok()?;

    for entry in sources {
        let dst_dir = format!("{ns}/{dcname}");
        let src_dir = format!("{ns}/{scname}");
        let local_path = tempdir.path().join(&entry.filename);

        let result = retry::retry(attempts, &format!("sync cache file {}", entry.filename), |_| -> Result<()> {
            if dcache.remote_file_exists(&dst_dir, &entry.filename, &entry.hash)? {
                log::debug!(
                    "File {} for {ns}/{comp} ({ns}/{dcname}) already uploaded, skipping.",
                    entry.filename
                );
                return Ok(());
            }
            log::debug!(
                "File {} for {ns}/{comp} ({ns}/{dcname}) not available in the destination cache, downloading.",
                entry.filename
            );
            scache.download(&src_dir, &entry.filename, &entry.hash, &local_path, entry.hashtype)?;
            log::debug!(
                "File {} for {ns}/{comp} ({ns}/{scname}) successfully downloaded. Uploading to the destination cache.",
                entry.filename
            );
            if !dry_run {
                dcache.upload(&dst_dir, &local_path, &entry.hash, entry.hashtype)?;
                log::debug!("File {} for {ns}/{comp} ({ns}/{dcname}) successfully uploaded to the destination cache.", entry.filename);
            } else {
                log::debug!("Running in dry run mode, not uploading {} for {ns}/{comp}.", entry.filename);
            }
            Ok(())
        });

        if result.is_none() {
            log::error!(
                "Exhausted lookaside cache synchronization attempts for {ns}/{comp} while working on {}, skipping.",
                entry.filename
            );
            return None;
        }
    }

    Some(sources.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::HashMap;

    struct FakeCache {
        present: RefCell<HashMap<String, Vec<u8>>>,
    }

    impl LookasideCache for FakeCache {
        fn remote_file_exists(&self, dir: &str, filename: &str, _hash: &str) -> Result<bool> {
            Ok(self.present.borrow().contains_key(&format!("{dir}/{filename}")))
        }

        fn download(&self, dir: &str, filename: &str, _hash: &str, dest: &Path, _hashtype: HashType) -> Result<()> {
            let data = self.present.borrow().get(&format!("{dir}/{filename}")).cloned().unwrap_or_default();
            std::fs::write(dest, data)?;
            Ok(())
        }

        fn upload(&self, dir: &str, local_path: &Path, _hash: &str, _hashtype: HashType) -> Result<()> {
            let filename = local_path.file_name().unwrap().to_str().unwrap().to_string();
            let data = std::fs::read(local_path)?;
            self.present.borrow_mut().insert(format!("{dir}/{filename}"), data);
            Ok(())
        }
    }

    fn cnf_fixture() -> Configuration {
        crate::config::test_support::minimal_configuration()
    }

    #[test]
    fn p4_skips_entries_already_present_in_destination() {
        let cnf = cnf_fixture();
        let scache = FakeCache { present: RefCell::new(HashMap::from([("rpms/gzip/a.tar".into(), b"x".to_vec())])) };
        let dcache = FakeCache { present: RefCell::new(HashMap::from([("rpms/gzip/a.tar".into(), b"x".to_vec())])) };
        let sources = std::collections::HashSet::from([SourceEntry {
            filename: "a.tar".into(),
            hash: "deadbeef".into(),
            hashtype: HashType::Md5,
        }]);
        let n = sync_cache(&cnf, &scache, &dcache, "gzip", &sources, Namespace::Rpms, 3, false).unwrap();
        assert_eq!(n, 1);
        assert_eq!(dcache.present.borrow().len(), 1);
    }

    #[test]
    fn p5_downloads_and_uploads_missing_entries() {
        let cnf = cnf_fixture();
        let scache = FakeCache { present: RefCell::new(HashMap::from([("rpms/gzip/a.tar".into(), b"payload".to_vec())])) };
        let dcache = FakeCache { present: RefCell::new(HashMap::new()) };
        let sources = std::collections::HashSet::from([SourceEntry {
            filename: "a.tar".into(),
            hash: "deadbeef".into(),
            hashtype: HashType::Sha512,
        }]);
        let n = sync_cache(&cnf, &scache, &dcache, "gzip", &sources, Namespace::Rpms, 3, false).unwrap();
        assert_eq!(n, 1);
        assert_eq!(dcache.present.borrow().get("rpms/gzip/a.tar").unwrap(), b"payload");
    }

    #[test]
    fn dry_run_downloads_but_does_not_upload() {
        let cnf = cnf_fixture();
        let scache = FakeCache { present: RefCell::new(HashMap::from([("rpms/gzip/a.tar".into(), b"payload".to_vec())])) };
        let dcache = FakeCache { present: RefCell::new(HashMap::new()) };
        let sources = std::collections::HashSet::from([SourceEntry {
            filename: "a.tar".into(),
            hash: "deadbeef".into(),
            hashtype: HashType::Sha512,
        }]);
        let n = sync_cache(&cnf, &scache, &dcache, "gzip", &sources, Namespace::Rpms, 3, true).unwrap();
        assert_eq!(n, 1);
        assert!(dcache.present.borrow().is_empty());
    }

    #[test]
    fn excluded_component_aborts() {
        let mut cnf = cnf_fixture();
        cnf.main.control.exclude.rpms.insert("gzip".to_string());
        let scache = FakeCache { present: RefCell::new(HashMap::new()) };
        let dcache = FakeCache { present: RefCell::new(HashMap::new()) };
        let n = sync_cache(&cnf, &scache, &dcache, "gzip", &Default::default(), Namespace::Rpms, 3, false);
        assert!(n.is_none());
    }
}
