use anyhow::Result;
use std::collections::HashMap;

/// Assigns one event per parent directory for the duration of an import.
///
/// Keys are directories, not display names: two folders that normalize to
/// the same name still get separate events.
#[derive(Debug, Default)]
pub struct EventRegistry {
    by_dir: HashMap<String, i64>,
}

impl EventRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the event id for `parent_dir` and whether it was just created.
    /// `create` runs only on the first sighting of a directory.
    pub fn get_or_create<F>(&mut self, parent_dir: &str, name: &str, create: F) -> Result<(i64, bool)>
    where
        F: FnOnce(&str) -> Result<i64>,
    {
        if let Some(id) = self.by_dir.get(parent_dir) {
            return Ok((*id, false));
        }
        let id = create(name)?;
        self.by_dir.insert(parent_dir.to_string(), id);
        Ok((id, true))
    }
}

/// Directory part of a stored filename, `""` when there is none.
pub(crate) fn parent_dir(filename: &str) -> &str {
    match filename.rfind('/') {
        Some(0) => "/",
        Some(idx) => &filename[..idx],
        None => "",
    }
}
