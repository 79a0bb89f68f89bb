//! Scripts packaged into the binary.
//!
//! An application embeds its SQL with `include_str!` and registers each file
//! under the same relative path it would have on disk:
//!
//! ```ignore
//! let bundle = ScriptBundle::new()
//!     .with("sql/postgresql/001/schema-001.sql", include_str!("../sql/postgresql/001/schema-001.sql"));
//! ```

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::path::Path;

/// In-binary script resources keyed by forward-slash path
#[derive(Debug, Clone, Default)]
pub struct ScriptBundle {
    scripts: BTreeMap<String, Cow<'static, str>>,
}

impl ScriptBundle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style [`insert`](Self::insert)
    pub fn with(mut self, path: impl AsRef<Path>, code: impl Into<Cow<'static, str>>) -> Self {
        self.insert(path, code);
        self
    }

    pub fn insert(&mut self, path: impl AsRef<Path>, code: impl Into<Cow<'static, str>>) {
        self.scripts.insert(normalize(path.as_ref()), code.into());
    }

    pub fn get(&self, path: impl AsRef<Path>) -> Option<&str> {
        self.scripts
            .get(&normalize(path.as_ref()))
            .map(|code| code.as_ref())
    }

    pub fn len(&self) -> usize {
        self.scripts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scripts.is_empty()
    }
}

/// Resource key for a path: components joined by `/`, without `.` segments
pub(crate) fn normalize(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            std::path::Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}
