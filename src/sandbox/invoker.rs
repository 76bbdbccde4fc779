//! Bridge between the navigation loop and the worker pool.
//!
//! Resolves the target add-on of each callback url, assembles the
//! execute message and hands it to the add-on's pinned worker. Prompt
//! requests relayed up from the add-on are answered on the terminal.

use std::collections::HashMap;
use std::io::{self, BufRead, Write};

use url::Url;

use crate::addon::AddonDescriptor;
use crate::env::Environment;
use crate::error::Result;
use crate::nav::{AddonInvoker, NavigationState};
use crate::repo::{LocalRepo, RemoteRepo, resolve};
use crate::urls;
use super::message::Message;
use super::runner::WorkerPool;

/// Production invoker backed by worker processes.
pub struct SandboxInvoker {
    env: Environment,
    local: LocalRepo,
    remote: RemoteRepo,
    pool: WorkerPool,
    /// Resolved dependency sets, one per add-on id already seen.
    dep_cache: HashMap<String, Vec<AddonDescriptor>>,
}

impl SandboxInvoker {
    /// Creates an invoker over an already-scanned local repository.
    #[must_use]
    pub fn new(env: Environment, local: LocalRepo, remote: RemoteRepo) -> Self {
        let reuse = env.reuse_workers;
        Self {
            env,
            local,
            remote,
            pool: WorkerPool::new(reuse),
            dep_cache: HashMap::new(),
        }
    }

    /// Read access to the merged local repository.
    #[must_use]
    pub fn local(&self) -> &LocalRepo {
        &self.local
    }

    /// Mutable access, for lazy settings/strings loading.
    pub fn local_mut(&mut self) -> &mut LocalRepo {
        &mut self.local
    }

    /// Stops every live worker. Also runs on drop via the pool.
    pub fn shutdown(&mut self) {
        self.pool.close();
    }

    /// Returns the resolved dependency set for an add-on, resolving and
    /// caching it on first request.
    fn dependencies_for(&mut self, addon: &AddonDescriptor) -> Result<Vec<AddonDescriptor>> {
        if let Some(deps) = self.dep_cache.get(&addon.id) {
            return Ok(deps.clone());
        }
        let deps = resolve(&addon.dependencies, &mut self.local, &mut self.remote)?;
        self.dep_cache.insert(addon.id.clone(), deps.clone());
        Ok(deps)
    }
}

impl AddonInvoker for SandboxInvoker {
    fn invoke(&mut self, url: &Url) -> Result<NavigationState> {
        let id = urls::addon_id(url);
        let addon = self.local.request(id)?.clone();
        let deps = self.dependencies_for(&addon)?;

        let message = Message::Execute {
            addon: addon.clone(),
            deps,
            cache_root: self.env.cache_root.clone(),
            home: self.env.home.clone(),
            interpreter: self.env.interpreter.clone(),
            url: url.to_string(),
        };

        let runner = self.pool.runner(&addon.id);
        runner.execute(message, &mut prompt_on_terminal)
    }
}

/// Answers a relayed add-on prompt from the terminal. EOF cancels.
fn prompt_on_terminal(text: &str) -> Option<String> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    let _ = write!(out, "{}", text);
    let _ = out.flush();

    let mut line = String::new();
    let stdin = io::stdin();
    match stdin.lock().read_line(&mut line) {
        Ok(0) | Err(_) => None,
        Ok(_) => Some(line.trim_end_matches(['\r', '\n']).to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::cleanup_home;
    use tempfile::TempDir;

    #[test]
    fn test_invoke_unknown_addon_fails_cleanly() {
        let dir = TempDir::new().unwrap();
        let env = Environment::with_cache_root(
            dir.path().join("cache"),
            Vec::new(),
            Vec::new(),
            false,
        )
        .unwrap();
        let home = env.home.clone();
        let remote = RemoteRepo::new(&env);
        let mut invoker = SandboxInvoker::new(env, LocalRepo::new(), remote);

        let url = urls::parse("plugin://plugin.video.unknown/").unwrap();
        assert!(invoker.invoke(&url).is_err());

        invoker.shutdown();
        cleanup_home(&home);
    }
}
