//! Collision-safe target filenames with per-session numbering

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::debug;

use crate::utils::filename::{dotted_extension, sanitize_filename};

const DEFAULT_EXTENSION: &str = ".mp4";

/// Process-wide table of filename counters, keyed by session then base name.
///
/// A session may only number a base name (`clip(1)`, `clip(2)`, ...) after
/// it has itself claimed the bare name. Names left behind by earlier runs
/// or other sessions are never extended, they are skipped.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<String, HashMap<String, u32>>>,
}

impl SessionRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Decide the path to write `base_name` to, or `None` to skip.
    ///
    /// The bare name is handed out until a file exists there. Every numbered
    /// path is reserved: the session counter moves past it, so two callers
    /// never receive the same suffix. The existence check and the counter
    /// update happen under one lock shared by every session.
    pub fn resolve(
        &self,
        folder: &Path,
        base_name: &str,
        extension: &str,
        overwrite: bool,
        session: Option<&str>,
    ) -> Option<PathBuf> {
        let base = sanitize_filename(base_name);
        let ext = match dotted_extension(extension) {
            ext if ext.is_empty() => DEFAULT_EXTENSION.to_string(),
            ext => ext,
        };
        let bare = folder.join(format!("{}{}", base, ext));

        if overwrite {
            return Some(bare);
        }

        let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());

        if !bare.exists() {
            if let Some(key) = session {
                sessions
                    .entry(key.to_string())
                    .or_default()
                    .entry(base)
                    .or_insert(1);
            }
            return Some(bare);
        }

        let counters = sessions.get_mut(session?)?;
        let next = counters.get_mut(&base)?;

        let mut index = *next;
        loop {
            let candidate = folder.join(format!("{}({}){}", base, index, ext));
            if !candidate.exists() {
                *next = index + 1;
                debug!("Numbered {} as {}", bare.display(), candidate.display());
                return Some(candidate);
            }
            index += 1;
        }
    }

    /// Next suffix this session would try for `base_name`, if it owns the name
    #[cfg(test)]
    fn next_suffix(&self, session: &str, base_name: &str) -> Option<u32> {
        let sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        sessions
            .get(session)?
            .get(&sanitize_filename(base_name))
            .copied()
    }
}
