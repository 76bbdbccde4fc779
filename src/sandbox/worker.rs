//! Worker-side execution.
//!
//! The worker process receives execute requests over stdio, builds the
//! emulated host environment and runs the add-on's entry point through
//! the configured interpreter. Whatever the add-on does, crashing
//! included, comes back to the controller as a result message.

use std::collections::HashMap;
use std::ffi::OsString;
use std::fs;
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use tracing::{debug, warn};

use crate::addon::{AddonDescriptor, ExtensionKind};
use crate::error::{Error, Result};
use crate::nav::NavigationState;
use crate::urls;
use super::message::{Message, parse_line, read_message, write_message};

/// The fixed capability set the sandbox offers a running add-on:
/// resolved search paths, the emulated special directory tree and the
/// profile directory. Constructed fresh per invocation and exported to
/// the add-on process through its environment.
pub struct HostSession {
    addon_id: String,
    special: HashMap<String, PathBuf>,
    search_paths: Vec<PathBuf>,
}

impl HostSession {
    /// Builds the session for one add-on and its resolved dependencies,
    /// creating every emulated host directory under `home`.
    pub fn new(
        addon: &AddonDescriptor,
        deps: &[AddonDescriptor],
        home: &Path,
    ) -> Result<Self> {
        let special = special_paths(home);
        for dir in special.values() {
            fs::create_dir_all(dir)?;
        }

        let session = Self {
            addon_id: addon.id.clone(),
            special,
            search_paths: search_paths(addon, deps),
        };
        fs::create_dir_all(session.profile_dir())?;
        Ok(session)
    }

    /// Import search paths in final precedence order.
    #[must_use]
    pub fn search_paths(&self) -> &[PathBuf] {
        &self.search_paths
    }

    /// The add-on's profile directory for saved settings.
    #[must_use]
    pub fn profile_dir(&self) -> PathBuf {
        self.special
            .get("addon_data")
            .cloned()
            .unwrap_or_default()
            .join(&self.addon_id)
    }

    /// Translates a `special://` url into a real path; anything else
    /// passes through unchanged.
    pub fn translate_path(&self, path: &str) -> Result<PathBuf> {
        let Some(rest) = path.strip_prefix("special://") else {
            return Ok(PathBuf::from(path));
        };
        let (name, tail) = rest.split_once('/').unwrap_or((rest, ""));
        let base = self
            .special
            .get(name)
            .ok_or_else(|| Error::InvalidUrl(path.to_string()))?;
        Ok(base.join(tail))
    }

    /// The special map serialized for the add-on's environment.
    fn special_json(&self) -> String {
        serde_json::to_string(&self.special).unwrap_or_default()
    }
}

/// The emulated host directory tree, keyed by `special://` name.
fn special_paths(home: &Path) -> HashMap<String, PathBuf> {
    let userdata = home.join("userdata");
    let temp = home.join("temp");

    let mut paths = HashMap::new();
    paths.insert("home".to_string(), home.to_path_buf());
    paths.insert("xbmc".to_string(), home.to_path_buf());
    paths.insert("userdata".to_string(), userdata.clone());
    paths.insert("profile".to_string(), userdata.clone());
    paths.insert("masterprofile".to_string(), userdata.clone());
    paths.insert(
        "videoplaylists".to_string(),
        userdata.join("playlists").join("video"),
    );
    paths.insert(
        "musicplaylists".to_string(),
        userdata.join("playlists").join("music"),
    );
    paths.insert("addon_data".to_string(), userdata.join("addon_data"));
    paths.insert("thumbnails".to_string(), userdata.join("Thumbnails"));
    paths.insert("database".to_string(), userdata.join("Database"));
    paths.insert("temp".to_string(), temp.clone());
    paths.insert("subtitles".to_string(), temp.clone());
    paths.insert("recordings".to_string(), temp.clone());
    paths.insert("screenshots".to_string(), temp.clone());
    paths.insert("logpath".to_string(), temp.clone());
    paths.insert("skin".to_string(), temp);
    paths
}

/// Builds the import search path list.
///
/// The host inserts paths by reversing the inherited list, appending
/// dependency libraries then the plugin itself, and reversing back; the
/// net effect is that the most specific path wins: plugin first, then
/// dependency libraries in reverse resolution order, then whatever was
/// inherited.
#[must_use]
pub fn search_paths(addon: &AddonDescriptor, deps: &[AddonDescriptor]) -> Vec<PathBuf> {
    let mut paths = Vec::new();

    match addon.kind {
        ExtensionKind::PluginSource => paths.push(addon.path.clone()),
        ExtensionKind::Module => paths.push(addon.library_path()),
    }

    for dep in deps.iter().rev() {
        if dep.kind == ExtensionKind::Module {
            paths.push(dep.library_path());
        }
    }

    paths
}

/// Joins the search paths with the inherited PYTHONPATH appended.
fn build_python_path(paths: &[PathBuf]) -> Result<OsString> {
    let mut all: Vec<PathBuf> = paths.to_vec();
    if let Some(inherited) = std::env::var_os("PYTHONPATH") {
        all.extend(std::env::split_paths(&inherited));
    }
    std::env::join_paths(all)
        .map_err(|e| Error::Io(io::Error::new(io::ErrorKind::InvalidInput, e)))
}

/// Runs one callback url against one add-on.
///
/// The add-on process speaks the channel protocol on its stdio: prompt
/// requests are relayed up through `controller_out` / answered from
/// `controller_in`, other output lines are logged verbatim, and the
/// final result message ends the invocation. An add-on that exits
/// without sending one fails the invocation.
pub fn execute_addon(
    addon: &AddonDescriptor,
    deps: &[AddonDescriptor],
    cache_root: &Path,
    home: &Path,
    interpreter: &str,
    raw_url: &str,
    controller_in: &mut impl BufRead,
    controller_out: &mut impl Write,
) -> Result<NavigationState> {
    let url = urls::parse(raw_url)?;
    let session = HostSession::new(addon, deps, home)?;
    let (base, handle, query) = urls::invocation_args(&url);

    let entry = addon.library_path();
    debug!("running {} via {}", entry.display(), interpreter);

    let mut child = Command::new(interpreter)
        .arg(&entry)
        .arg(&base)
        .arg(&handle)
        .arg(&query)
        .current_dir(&addon.path)
        .env("PYTHONPATH", build_python_path(session.search_paths())?)
        .env("KODIDEV_HOME", home)
        .env("KODIDEV_CACHE_ROOT", cache_root)
        .env("KODIDEV_ADDON_ID", &addon.id)
        .env("KODIDEV_PROFILE", session.profile_dir())
        .env("KODIDEV_SPECIAL", session.special_json())
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .spawn()?;

    let mut addon_stdin = child.stdin.take().ok_or_else(|| {
        Error::ChannelProtocol("add-on spawned without stdin".to_string())
    })?;
    let addon_stdout = child.stdout.take().ok_or_else(|| {
        Error::ChannelProtocol("add-on spawned without stdout".to_string())
    })?;

    let mut outcome: Option<(bool, Option<NavigationState>)> = None;
    for line in BufReader::new(addon_stdout).lines() {
        let line = line?;
        match parse_line(&line) {
            Some(Message::Prompt { text }) => {
                write_message(controller_out, &Message::Prompt { text })?;
                let reply = match read_message(controller_in)? {
                    Some(Message::PromptReply { text }) => text,
                    _ => String::new(),
                };
                write_message(&mut addon_stdin, &Message::PromptReply { text: reply })?;
            }
            Some(Message::Result { success, state }) => {
                outcome = Some((success, state));
                break;
            }
            Some(other) => {
                warn!("unexpected message from add-on: {:?}", other);
            }
            None => debug!("[{}] {}", addon.id, line),
        }
    }

    drop(addon_stdin);
    let status = child.wait()?;

    match outcome {
        Some((success, Some(mut state))) => {
            state.succeeded = success && state.succeeded;
            state.path = raw_url.to_string();
            Ok(state)
        }
        _ => {
            if !status.success() {
                warn!("add-on process exited with {}", status);
            }
            Err(Error::AddonRuntimeError(addon.id.clone()))
        }
    }
}

/// The worker's main loop: serve execute requests until stopped.
///
/// With `single_shot` the worker exits after its first invocation
/// instead of staying alive for reuse.
pub fn run(single_shot: bool) -> Result<()> {
    let stdin = io::stdin();
    let mut controller_in = stdin.lock();
    let stdout = io::stdout();
    let mut controller_out = stdout.lock();

    loop {
        let message = match read_message(&mut controller_in) {
            Ok(Some(message)) => message,
            Ok(None) => break,
            Err(e) => {
                warn!("worker channel error: {}", e);
                break;
            }
        };

        match message {
            Message::Stop => break,
            Message::Execute {
                addon,
                deps,
                cache_root,
                home,
                interpreter,
                url,
            } => {
                let reply = match execute_addon(
                    &addon,
                    &deps,
                    &cache_root,
                    &home,
                    &interpreter,
                    &url,
                    &mut controller_in,
                    &mut controller_out,
                ) {
                    Ok(state) => Message::Result {
                        success: state.succeeded,
                        state: Some(state),
                    },
                    Err(e) => {
                        warn!("invocation failed: {}", e);
                        Message::Result {
                            success: false,
                            state: None,
                        }
                    }
                };
                write_message(&mut controller_out, &reply)?;

                if single_shot {
                    break;
                }
            }
            other => warn!("unexpected controller message: {:?}", other),
        }
    }

    Ok(())
}
