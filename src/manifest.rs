//! The fixed list of assets fetched at install time.

/// Assets pre-cached by the `precache` binary.
pub const DEFAULT_MANIFEST: &[&str] = &[
    "/",
    "/index.html",
    "/style.css",
    "/script.js",
    "/icons/horse-192-192.png",
    "/icons/horse-48-48.png",
    "/icons/horse-72-72.png",
    "/icons/horse-96-96.png",
    "/icons/horse-144-144.png",
    "/icons/horse-512-512.png",
];

/// An ordered list of resource identifiers (paths or absolute URLs).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    entries: Vec<String>,
}

impl Manifest {
    /// Builds a manifest from identifiers known at compile time.
    #[must_use]
    pub fn from_static(entries: &[&str]) -> Self {
        Self {
            entries: entries.iter().map(|e| (*e).to_string()).collect(),
        }
    }

    /// Returns the identifiers in order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(String::as_str)
    }

    /// Returns the number of identifiers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if there is nothing to pre-cache.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for Manifest {
    fn default() -> Self {
        Self::from_static(DEFAULT_MANIFEST)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_manifest_order() {
        let manifest = Manifest::default();
        assert_eq!(manifest.len(), 10);
        let entries: Vec<_> = manifest.iter().collect();
        assert_eq!(entries[0], "/");
        assert_eq!(entries[1], "/index.html");
        assert_eq!(entries[9], "/icons/horse-512-512.png");
    }

    #[test]
    fn empty_manifest() {
        let manifest = Manifest::from_static(&[]);
        assert!(manifest.is_empty());
    }
}
