//! Completion marker naming
//!
//! A marker file records that an origin's rule succeeded. Markers live
//! under one root directory so a reset is a single recursive removal.
//! Only names are produced here; the build executor creates and removes
//! the files.

use std::path::Path;

/// Root directory holding every completion marker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkerNamespace {
    root: String,
}

impl MarkerNamespace {
    pub fn new(root: impl Into<String>) -> Self {
        let root: String = root.into();
        Self {
            root: root.trim_end_matches('/').to_string(),
        }
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    /// Marker path of `origin`, relative to the project directory
    ///
    /// `1.sql` -> `<root>/done.1`, `daily/users.sql` -> `<root>/daily/done.users`.
    /// Subdirectories are kept so distinct script paths never share a marker.
    pub fn marker(&self, origin: &str) -> String {
        let stem = origin.strip_suffix(".sql").unwrap_or(origin);
        match stem.rsplit_once('/') {
            Some((dir, name)) => format!("{}/{}/done.{}", self.root, dir, name),
            None => format!("{}/done.{}", self.root, stem),
        }
    }

    /// Directory that must exist before the marker of `origin` is touched
    pub fn marker_dir(&self, origin: &str) -> String {
        let stem = origin.strip_suffix(".sql").unwrap_or(origin);
        match stem.rsplit_once('/') {
            Some((dir, _)) => format!("{}/{}", self.root, dir),
            None => self.root.clone(),
        }
    }

    /// Whether the marker of `origin` exists below `project_dir`
    pub fn is_done(&self, project_dir: &Path, origin: &str) -> bool {
        project_dir.join(self.marker(origin)).is_file()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn marker_names() {
        let markers = MarkerNamespace::new(".bqrun/");
        assert_eq!(markers.root(), ".bqrun");
        assert_eq!(markers.marker("1.sql"), ".bqrun/done.1");
        assert_eq!(markers.marker("daily/users.sql"), ".bqrun/daily/done.users");
        assert_eq!(markers.marker("noext"), ".bqrun/done.noext");
    }

    #[test]
    fn nested_and_dotted_origins_get_distinct_markers() {
        let markers = MarkerNamespace::new(".bqrun");
        assert_eq!(markers.marker("a/b.sql"), ".bqrun/a/done.b");
        assert_eq!(markers.marker("a.b.sql"), ".bqrun/done.a.b");
        assert_ne!(markers.marker("a/b.sql"), markers.marker("a.b.sql"));
    }

    #[test]
    fn marker_directories() {
        let markers = MarkerNamespace::new(".bqrun");
        assert_eq!(markers.marker_dir("1.sql"), ".bqrun");
        assert_eq!(markers.marker_dir("daily/eu/users.sql"), ".bqrun/daily/eu");
    }

    #[test]
    fn missing_marker_is_not_done() {
        let markers = MarkerNamespace::new(".bqrun");
        assert!(!markers.is_done(Path::new("/nonexistent"), "1.sql"));
    }
}
