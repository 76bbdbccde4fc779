//! Kodidev - Main entry point.
//!
//! Resolves the target add-on's dependencies, then drives the
//! interactive navigation loop until the user exits.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::{error, warn};

use kodidev::addon::load_manifest;
use kodidev::env::{Environment, cleanup_home};
use kodidev::nav::{Display, Interact};
use kodidev::repo::{DEFAULT_LANGUAGE_PACK, LocalRepo, RemoteRepo, resolve};
use kodidev::sandbox::SandboxInvoker;
use kodidev::{logging, urls};

/// Execute a Kodi add-on outside of Kodi.
#[derive(Parser, Debug)]
#[command(name = "kodidev", version, about)]
struct Args {
    /// Path to the add-on directory (or its addon.xml) to execute.
    addon: PathBuf,

    /// Show debug logging output.
    #[arg(short, long)]
    debug: bool,

    /// Compact view, one line per listitem.
    #[arg(short, long)]
    compact: bool,

    /// Disable cropping of long lines of text.
    #[arg(short, long)]
    no_crop: bool,

    /// Comma separated list of preselected item indices.
    #[arg(short, long, value_delimiter = ',')]
    preselect: Vec<usize>,

    /// Content type hint passed to the add-on's first invocation.
    #[arg(short = 't', long)]
    content_type: Option<String>,

    /// Additional remote repository urls.
    #[arg(short = 'o', long = "custom-repos", num_args = 1..)]
    custom_repos: Vec<String>,

    /// Directories holding locally developed add-ons.
    #[arg(short, long = "local-repos", num_args = 1..)]
    local_repos: Vec<PathBuf>,

    /// Wipe the add-on cache before resolving.
    #[arg(long)]
    clean: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let env = match Environment::new(
        args.local_repos.clone(),
        args.custom_repos.clone(),
        args.clean,
    ) {
        Ok(env) => env,
        Err(e) => {
            eprintln!("failed to set up environment: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = logging::init(&env.cache_root, args.debug) {
        eprintln!("failed to initialize logging: {}", e);
    }

    let home = env.home.clone();
    let code = match run(&args, env) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    };
    cleanup_home(&home);
    code
}

fn run(args: &Args, env: Environment) -> kodidev::Result<()> {
    // Accept the add-on directory or its manifest file directly.
    let manifest_path = if args.addon.is_dir() {
        args.addon.join("addon.xml")
    } else {
        args.addon.clone()
    };
    let addon = load_manifest(&manifest_path)?;

    let mut local = LocalRepo::scan(&env);
    local.insert(addon.clone());

    let mut remote = RemoteRepo::new(&env);
    // A failed update pass must not break offline development setups.
    if let Err(e) = remote.refresh_if_stale(&mut local) {
        warn!("repository update check failed: {}", e);
    }

    // Resolution failures are fatal: without its dependencies the
    // add-on cannot be safely imported.
    resolve(&addon.dependencies, &mut local, &mut remote)?;

    // Localization table for $LOCALIZE[] substitution in labels.
    let strings = match local.get_mut(DEFAULT_LANGUAGE_PACK) {
        Some(pack) => pack.ensure_strings().clone(),
        None => Default::default(),
    };

    let display = Display::new(args.compact, args.no_crop, strings);
    let invoker = SandboxInvoker::new(env, local, remote);
    let mut interact = Interact::new(invoker, display, args.preselect.clone());

    let initial = urls::root_url(&addon.id, args.content_type.as_deref())?;
    let outcome = interact.start(initial);

    // Workers must not outlive the session, even when the loop errored.
    interact.into_invoker().shutdown();
    outcome
}
