//! The navigation loop.
//!
//! Follows an add-on's self-referential callback urls: invoke, show the
//! resulting listing, let the user pick, repeat. A back-stack of
//! previous states supports the synthetic ".." entry; failed
//! invocations fall back to the parent listing instead of ending the
//! session.

use std::collections::VecDeque;

use tracing::{info, warn};
use url::Url;

use crate::error::Result;
use crate::urls;
use super::display::Display;
use super::state::{ListItem, NavigationState};

/// Executes one callback url against its target add-on.
///
/// The production implementation drives the worker pool; scripted tests
/// substitute canned results.
pub trait AddonInvoker {
    fn invoke(&mut self, url: &Url) -> Result<NavigationState>;
}

/// What the loop processes next.
enum Request {
    /// A fresh invocation.
    Url(Url),
    /// A state popped off the back-stack; no invocation needed.
    Back(NavigationState),
}

/// Interactive navigation session over one root add-on.
pub struct Interact<I> {
    invoker: I,
    display: Display,
    preselect: VecDeque<usize>,
    stack: Vec<NavigationState>,
}

impl<I: AddonInvoker> Interact<I> {
    /// Creates a session. `preselect` answers the first selections
    /// unattended, one index per navigation step.
    #[must_use]
    pub fn new(invoker: I, display: Display, preselect: Vec<usize>) -> Self {
        Self {
            invoker,
            display,
            preselect: preselect.into(),
            stack: Vec::new(),
        }
    }

    /// Consumes the session, handing back the invoker for shutdown.
    pub fn into_invoker(self) -> I {
        self.invoker
    }

    /// Drives navigation from an initial url until the user exits.
    pub fn start(&mut self, initial: Url) -> Result<()> {
        let mut request = Request::Url(initial);

        loop {
            let mut state = match request {
                Request::Url(url) => match self.invoker.invoke(&url) {
                    Ok(state) => state,
                    Err(e) => {
                        warn!("{}", e);
                        match self.handle_failed()? {
                            Some(previous) => previous,
                            None => break,
                        }
                    }
                },
                Request::Back(previous) => previous,
            };

            let items = self.build_items(&state);
            let selection = match self.preselect.pop_front() {
                Some(index) => Some(index),
                None => self.display.show(&items, &state.path)?,
            };

            request = match selection {
                None => break,
                Some(0) if !self.stack.is_empty() && !state.listitems.is_empty() => {
                    // The synthetic ".." entry.
                    match self.stack.pop() {
                        Some(previous) => Request::Back(previous),
                        None => break,
                    }
                }
                Some(index) => {
                    let Some(item) = items.get(index).cloned() else {
                        warn!("selection {} is out of range; stopping", index);
                        break;
                    };
                    let Some(path) = item.path.clone() else {
                        info!("selected entry has no target; stopping");
                        break;
                    };
                    match urls::parse(&path) {
                        Ok(next) => {
                            state.calling_item = Some(item);
                            self.stack.push(state);
                            Request::Url(next)
                        }
                        Err(_) => {
                            // A direct media url; nothing further to
                            // browse in a debugging session.
                            info!("reached playable target: {}", path);
                            break;
                        }
                    }
                }
            };
        }

        Ok(())
    }

    /// Builds the displayable entries for a state: either the listing
    /// with a synthetic ".." at the top, or the resolved item (merged
    /// with whatever triggered it) followed by its playlist.
    fn build_items(&self, state: &NavigationState) -> Vec<ListItem> {
        let mut items = Vec::new();

        if !state.listitems.is_empty() {
            if let Some(parent) = self.stack.last() {
                items.push(ListItem::back_entry(&parent.path));
            }
            items.extend(state.listitems.iter().cloned());
        } else if let Some(ref resolved) = state.resolved {
            let merged = match self.stack.last().and_then(|p| p.calling_item.as_ref()) {
                Some(base) => base.merged_with(resolved),
                None => resolved.clone(),
            };
            items.push(merged);
            items.extend(state.playlist.iter().cloned());
        }

        items
    }

    /// Reports a failed invocation and falls back to the parent listing
    /// when one exists. Unattended runs skip the acknowledgement prompt.
    fn handle_failed(&mut self) -> Result<Option<NavigationState>> {
        println!("Failed to execute add-on. Please check the log.");

        if self.preselect.is_empty() {
            let mut line = String::new();
            println!("Press enter to continue:");
            if std::io::stdin().read_line(&mut line)? == 0 {
                return Ok(None);
            }
        }

        Ok(self.stack.pop())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::collections::HashMap;

    /// Serves canned states per url and records invocations.
    struct ScriptedInvoker {
        responses: HashMap<String, NavigationState>,
        calls: Vec<String>,
    }

    impl ScriptedInvoker {
        fn new() -> Self {
            Self {
                responses: HashMap::new(),
                calls: Vec::new(),
            }
        }

        fn listing(mut self, url: &str, labels_and_paths: &[(&str, &str)]) -> Self {
            let mut state = NavigationState::default();
            state.succeeded = true;
            state.path = url.to_string();
            for (label, path) in labels_and_paths {
                let mut item = ListItem::with_label(*label);
                item.path = Some((*path).to_string());
                state.listitems.push(item);
            }
            self.responses.insert(url.to_string(), state);
            self
        }
    }

    impl AddonInvoker for ScriptedInvoker {
        fn invoke(&mut self, url: &Url) -> Result<NavigationState> {
            self.calls.push(url.to_string());
            self.responses
                .get(url.as_str())
                .cloned()
                .ok_or_else(|| Error::AddonRuntimeError("plugin.video.test".to_string()))
        }
    }

    fn display() -> Display {
        Display::new(true, false, HashMap::new())
    }

    const ROOT: &str = "plugin://plugin.video.test/";
    const CHILD: &str = "plugin://plugin.video.test/videos";

    #[test]
    fn test_preselect_walks_into_listing() {
        let invoker = ScriptedInvoker::new()
            .listing(ROOT, &[("Videos", CHILD)])
            .listing(CHILD, &[("Clip", "plugin://plugin.video.test/videos/1")]);

        // Select "Videos" (index 0 at the root: no back entry yet),
        // then the child's ".." entry, then stop via the out-of-range
        // guard so the test never touches stdin.
        let mut interact = Interact::new(invoker, display(), vec![0, 0, 99]);
        interact.start(urls::parse(ROOT).unwrap()).unwrap();

        let invoker = interact.into_invoker();
        // Root invoked, child invoked, then ".." popped back to the
        // root state without re-invoking.
        assert_eq!(invoker.calls, vec![ROOT.to_string(), CHILD.to_string()]);
    }

    #[test]
    fn test_back_entry_pops_stack() {
        let invoker = ScriptedInvoker::new()
            .listing(ROOT, &[("Videos", CHILD)])
            .listing(CHILD, &[("Clip", "plugin://plugin.video.test/videos/1")]);

        // Step into the child listing, then select its ".." entry
        // (index 0), then an out-of-range preselect stops the loop at
        // the restored parent.
        let mut interact = Interact::new(invoker, display(), vec![0, 0, 99]);
        interact.start(urls::parse(ROOT).unwrap()).unwrap();
        assert!(interact.stack.is_empty());
    }

    #[test]
    fn test_build_items_prepends_back_entry() {
        let invoker = ScriptedInvoker::new();
        let mut interact = Interact::new(invoker, display(), Vec::new());

        let mut parent = NavigationState::default();
        parent.path = ROOT.to_string();
        interact.stack.push(parent);

        let mut state = NavigationState::default();
        state.listitems.push(ListItem::with_label("Entry"));

        let items = interact.build_items(&state);
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].label, "..");
        assert_eq!(items[0].path.as_deref(), Some(ROOT));
    }

    #[test]
    fn test_build_items_merges_resolved_with_calling_item() {
        let invoker = ScriptedInvoker::new();
        let mut interact = Interact::new(invoker, display(), Vec::new());

        let mut calling = ListItem::with_label("Episode 1");
        calling.context.push(("Queue".to_string(), "q()".to_string()));
        let mut parent = NavigationState::default();
        parent.path = ROOT.to_string();
        parent.calling_item = Some(calling);
        interact.stack.push(parent);

        let mut resolved_item = ListItem::default();
        resolved_item.path = Some("https://cdn.example.com/1.mp4".to_string());
        let mut state = NavigationState::default();
        state.resolved = Some(resolved_item);
        state.playlist.push(ListItem::with_label("Episode 2"));

        let items = interact.build_items(&state);
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].label, "Episode 1");
        assert_eq!(
            items[0].path.as_deref(),
            Some("https://cdn.example.com/1.mp4")
        );
        assert!(items[0].context.is_empty());
        assert_eq!(items[1].label, "Episode 2");
    }

    #[test]
    fn test_failed_invocation_without_parent_terminates() {
        // No canned response: every invoke fails. Preselect keeps the
        // failure handler from blocking on stdin.
        let invoker = ScriptedInvoker::new();
        let mut interact = Interact::new(invoker, display(), vec![0]);
        interact.start(urls::parse(ROOT).unwrap()).unwrap();

        let invoker = interact.into_invoker();
        assert_eq!(invoker.calls.len(), 1);
    }

    #[test]
    fn test_playable_target_ends_session() {
        let invoker = ScriptedInvoker::new().listing(
            ROOT,
            &[("Clip", "https://cdn.example.com/clip.mp4")],
        );

        let mut interact = Interact::new(invoker, display(), vec![0]);
        interact.start(urls::parse(ROOT).unwrap()).unwrap();

        let invoker = interact.into_invoker();
        assert_eq!(invoker.calls, vec![ROOT.to_string()]);
    }
}
