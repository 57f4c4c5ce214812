//! Dispatcher (C7): the two driven entry points (a single tag event, or a
//! batch of components) and the shared skip/dispatch decision between them.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;

use crate::buildsys::BuildSystem;
use crate::cache::LookasideCache;
use crate::config::{Configuration, Namespace};
use crate::scm;
use crate::sync::{self, SyncContext};

/// A message this service can act on: a Koji/Brew tag event. Anything else
/// is logged and dropped; the bus client (out of scope here) is assumed to
/// deserialize whatever it receives into this shape.
#[derive(Debug, Deserialize)]
pub struct Message {
    pub topic: String,
    pub body: MessageBody,
}

#[derive(Debug, Deserialize)]
pub struct MessageBody {
    pub name: String,
    pub version: String,
    pub release: String,
    pub tag: String,
}

static COMPONENT_SPEC: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?P<namespace>rpms|modules)/(?P<component>[A-Za-z0-9:._+-]+)$").unwrap());

pub struct Dispatcher<'a> {
    pub cnf: &'a Configuration,
    pub source_bsys: &'a dyn BuildSystem,
    pub dest_bsys: &'a dyn BuildSystem,
    pub scache: &'a dyn LookasideCache,
    pub dcache: &'a dyn LookasideCache,
    pub attempts: u32,
    pub dry_run: bool,
}

enum Decision {
    Skip,
    Unimplemented,
    Proceed,
}

impl Dispatcher<'_> {
    fn decide(&self, ns: Namespace, comp: &str) -> Decision {
        if ns == Namespace::Modules {
            log::warn!("The {ns}/{comp} component is a module; modules currently not implemented, skipping.");
            return Decision::Unimplemented;
        }
        if self.cnf.is_excluded(ns, comp) {
            log::info!("The {ns}/{comp} component is excluded from sync, skipping.");
            return Decision::Skip;
        }
        if self.cnf.main.control.strict && self.cnf.component(ns, comp).is_none() {
            log::info!("The {ns}/{comp} component not configured while the strict mode is enabled, ignoring.");
            return Decision::Skip;
        }
        Decision::Proceed
    }

    /// Run C6 then, on success, submit a build. Returns the build task id on
    /// full success.
    fn dispatch(&self, ns: Namespace, comp: &str, nvr: Option<&str>) -> Option<u64> {
        let nvr = match nvr {
            Some(n) => n.to_string(),
            None => get_build(self.source_bsys, self.cnf, comp, ns)?,
        };
        let ctx = SyncContext {
            cnf: self.cnf,
            source_bsys: self.source_bsys,
            scache: self.scache,
            dcache: self.dcache,
            attempts: self.attempts,
            dry_run: self.dry_run,
        };
        let reference = sync::sync_repo(&ctx, comp, ns, &nvr)?;
        build_comp(self.dest_bsys, self.cnf, comp, &reference, ns, self.dry_run)
    }

    /// Process a single tagging event. Only `buildsys.tag` topics are
    /// handled; everything else is dropped with a warning.
    pub fn process_message(&self, msg: &Message) -> Option<()> {
        log::debug!("Received a message with topic {}.", msg.topic);
        if !msg.topic.ends_with("buildsys.tag") {
            log::warn!("Unable to handle {} topics, ignoring.", msg.topic);
            return None;
        }
        log::debug!("Processing a tagging event message.");
        let comp = &msg.body.name;
        let nvr = format!("{}-{}-{}", msg.body.name, msg.body.version, msg.body.release);
        let tag = &msg.body.tag;
        log::debug!("Tagging event for {comp}, tag {tag} received.");

        if *tag == self.cnf.main.trigger.rpms {
            log::debug!("Message tag configured as an RPM trigger, processing.");
            if self.cnf.main.control.strict && self.cnf.component(Namespace::Rpms, comp).is_none() {
                log::debug!(
                    "RPM component {comp} not configured for sync and the strict mode is enabled, ignoring."
                );
                return None;
            }
            log::info!("Handling an RPM trigger for {comp}, tag {tag}.");
            match self.decide(Namespace::Rpms, comp) {
                Decision::Skip | Decision::Unimplemented => None,
                Decision::Proceed => match self.dispatch(Namespace::Rpms, comp, Some(&nvr)) {
                    Some(task) => {
                        log::info!("Build submission of rpms/{comp} complete, task {task}, trigger processed.");
                        Some(())
                    }
                    None => {
                        log::error!("Build submission of rpms/{comp} failed, aborting trigger.");
                        None
                    }
                },
            }
        } else if *tag == self.cnf.main.trigger.modules {
            log::error!("The message matches our module configuration but module building not implemented, ignoring.");
            None
        } else {
            log::debug!("Message tag not configured as a trigger, ignoring.");
            None
        }
    }

    /// Process an explicit set of `ns/comp` entries, or — if empty — every
    /// component currently tagged in the trigger tags.
    pub fn process_components(&self, compset: &mut HashSet<String>) {
        if compset.is_empty() {
            log::debug!("No components selected, gathering components from triggers.");
            if let Ok(tagged) = self.source_bsys.list_tagged(&self.cnf.main.trigger.rpms, None, true) {
                compset.extend(tagged.into_iter().map(|b| format!("rpms/{}", b.package_name)));
            }
            if let Ok(tagged) = self.source_bsys.list_tagged(&self.cnf.main.trigger.modules, None, true) {
                compset.extend(tagged.into_iter().map(|b| format!("modules/{}:{}", b.package_name, b.version)));
            }
        }
        log::info!("Processing {} component(s).", compset.len());
        let mut sorted: Vec<&String> = compset.iter().collect();
        sorted.sort_by_key(|s| s.to_lowercase());

        let mut processed = 0usize;
        for rec in sorted {
            let Some(caps) = COMPONENT_SPEC.captures(rec) else {
                log::error!("Cannot process {rec}; looks like garbage.");
                continue;
            };
            let ns_str = &caps["namespace"];
            let comp = caps["component"].to_string();
            log::info!("Processing {rec}.");

            let ns = match ns_str {
                "rpms" => Namespace::Rpms,
                "modules" => Namespace::Modules,
                _ => unreachable!("regex only matches rpms|modules"),
            };

            match self.decide(ns, &comp) {
                Decision::Skip | Decision::Unimplemented => {}
                Decision::Proceed => {
                    self.dispatch(ns, &comp, None);
                    log::info!("Done processing {rec}.");
                    processed += 1;
                }
            }
        }
        log::info!("Synchronized {processed} component(s), {} skipped.", compset.len() - processed);
    }
}

/// Get the latest build NVR tagged in `trigger.rpms` for `comp`. Modules are
/// not implemented.
pub fn get_build(bsys: &dyn BuildSystem, cnf: &Configuration, comp: &str, ns: Namespace) -> Option<String> {
    if ns != Namespace::Rpms {
        log::error!("Modules not implemented, cannot get the latest build for {ns}/{comp}.");
        return None;
    }
    match bsys.list_tagged(&cnf.main.trigger.rpms, Some(comp), true) {
        Ok(builds) if !builds.is_empty() => {
            log::debug!("Located the latest build for {ns}/{comp}: {}", builds[0].nvr);
            Some(builds[0].nvr.clone())
        }
        Ok(_) => {
            log::error!("Did not find any builds for {ns}/{comp}.");
            None
        }
        Err(e) => {
            log::error!("An error occurred while getting the latest build for {ns}/{comp}: {e:#}");
            None
        }
    }
}

/// Submit a build for `comp` at downstream revision `reference`. Modules and
/// unrecognised namespaces are a hard (unimplemented) refusal.
pub fn build_comp(
    bsys: &dyn BuildSystem,
    cnf: &Configuration,
    comp: &str,
    reference: &str,
    ns: Namespace,
    dry_run: bool,
) -> Option<u64> {
    if cnf.is_excluded(ns, comp) {
        log::error!("critical: the component {ns}/{comp} is excluded from sync, aborting.");
        return None;
    }
    log::info!("Processing build for {ns}/{comp}.");
    if ns != Namespace::Rpms {
        log::error!("critical: cannot build {ns}/{comp}; module building not implemented.");
        return None;
    }

    let buildcomp = match cnf.component(ns, comp) {
        Some(c) => scm::split_scmurl(&c.destination).comp.unwrap_or_else(|| comp.to_string()),
        None => comp.to_string(),
    };
    let scmurl = format!("{}/{ns}/{buildcomp}#{reference}", cnf.main.build.prefix);

    if dry_run {
        log::info!("Running in the dry mode, not submitting any builds for {ns}/{comp} ({scmurl}).");
        return Some(0);
    }

    match bsys.submit_build(&scmurl, &cnf.main.build.target, cnf.main.build.scratch) {
        Ok(task) => {
            log::debug!("Build submitted for {ns}/{comp}; task {task}; SCMURL: {scmurl}.");
            Some(task)
        }
        Err(e) => {
            log::error!("Failed submitting build for {ns}/{comp} ({scmurl}): {e:#}");
            None
        }
    }
}
