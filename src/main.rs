use std::collections::HashSet;

use clap::Parser;
use distrobaker::buildsys::Role;
use distrobaker::dispatch::{Dispatcher, Message};
use distrobaker::state::Core;

/// Syncs distribution git repositories and submits downstream builds.
#[derive(Debug, Parser)]
#[command(name = "distrobaker", version, about)]
struct Cli {
    /// Process a bounded batch and exit instead of idling for messages.
    #[arg(long)]
    once: bool,

    /// Restrict a `--once` run to these `ns/comp` entries (repeatable).
    /// With none given, every component currently tagged is processed.
    #[arg(long = "component", value_name = "NS/COMP")]
    components: Vec<String>,

    /// Number of attempts for retried operations.
    #[arg(long, env = "DISTROBAKER_RETRY", default_value_t = 3)]
    retry: u32,

    /// Suppress remote mutations (pushes, build submissions, cache uploads).
    #[arg(long, env = "DISTROBAKER_DRY_RUN")]
    dry_run: bool,
}

/// Production delivery of messages into [`Dispatcher::process_message`] is
/// an external collaborator (a fedora-messaging-equivalent bus client); this
/// trait is the seam a real consumer loop would implement. No production
/// implementation ships here; `--once` is how this crate is exercised.
trait MessageSource {
    fn next_message(&mut self) -> Option<Message>;
}

fn main() {
    env_logger::init();

    let cli = Cli::parse();

    let scmurl = match std::env::var("DISTROBAKERCONF") {
        Ok(v) if !v.is_empty() => v,
        _ => {
            log::error!("DISTROBAKER* variables not defined, exiting.");
            std::process::exit(1);
        }
    };
    let gituser = std::env::var("DISTROBAKERUSER").unwrap_or_default();
    let gitemail = std::env::var("DISTROBAKEREMAIL").unwrap_or_default();
    if gituser.is_empty() || gitemail.is_empty() {
        log::error!("DISTROBAKER* variables not defined, exiting.");
        std::process::exit(1);
    }

    log::info!("DistroBaker starting.");
    let core = Core::new(cli.retry, cli.dry_run);
    log::info!("Loading configuration.");
    if !core.reload(&scmurl) {
        log::error!("Failed to load the initial configuration, exiting.");
        std::process::exit(1);
    }
    log::info!("Configuration loaded.");

    if !cli.once {
        log::error!("No message bus consumer is wired into this build; pass --once to run a batch instead.");
        std::process::exit(1);
    }

    let cnf = core.configuration().expect("just loaded");
    let Some(source_bsys) = core.build_system(Role::Source) else {
        log::error!("Failed to initialize the source build system, exiting.");
        std::process::exit(1);
    };
    let Some(dest_bsys) = core.build_system(Role::Destination) else {
        log::error!("Failed to initialize the destination build system, exiting.");
        std::process::exit(1);
    };
    let Some(scache) = core.source_cache() else {
        log::error!("Failed to initialize the source lookaside cache, exiting.");
        std::process::exit(1);
    };
    let Some(dcache) = core.destination_cache() else {
        log::error!("Failed to initialize the destination lookaside cache, exiting.");
        std::process::exit(1);
    };

    let dispatcher = Dispatcher {
        cnf: &cnf,
        source_bsys: source_bsys.as_ref(),
        dest_bsys: dest_bsys.as_ref(),
        scache: &scache,
        dcache: &dcache,
        attempts: core.attempts(),
        dry_run: core.dry_run(),
    };

    let mut compset: HashSet<String> = cli.components.into_iter().collect();
    dispatcher.process_components(&mut compset);
}
