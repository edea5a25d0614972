use serde::{Deserialize, Serialize};
use std::fmt;

/// A content category that can be carried inside an export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    Uploads,
    Plugins,
    Themes,
}

impl ContentKind {
    pub const ALL: [ContentKind; 3] = [ContentKind::Uploads, ContentKind::Plugins, ContentKind::Themes];

    /// Directory name inside the site's content directory and prefix inside
    /// the archive.
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentKind::Uploads => "uploads",
            ContentKind::Plugins => "plugins",
            ContentKind::Themes => "themes",
        }
    }

    pub fn from_archive_path(path: &str) -> Option<ContentKind> {
        let head = path.split('/').next()?;
        ContentKind::ALL.into_iter().find(|k| k.as_str() == head)
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
