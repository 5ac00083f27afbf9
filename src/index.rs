//! The corpus file index: which documents exist and how link names resolve.

use std::{
    collections::{BTreeMap, BTreeSet},
    path::{Component, Path, PathBuf},
};

use parking_lot::RwLock;

use crate::{error::Result, walker};

/// Read-only view of the files in one corpus.
pub trait FileIndex: Send + Sync {
    /// Canonical corpus root.
    fn root(&self) -> &Path;

    /// Absolute paths of all documents, in a stable order.
    fn list_documents(&self) -> Result<Vec<PathBuf>>;

    /// Pick up files added or removed since the index was built.
    fn refresh(&self) -> Result<()> {
        Ok(())
    }

    /// Resolve a link `name` written inside the document at `from`.
    ///
    /// Returns a root-relative path, the name itself for web URLs, or `None`.
    fn resolve_link(
        &self,
        name: &str,
        from: &Path,
        markdown_without_ext: bool,
    ) -> Option<PathBuf>;
}

#[derive(Debug, Default)]
struct Snapshot {
    /// Root-relative paths of every file.
    files: Vec<PathBuf>,
    /// File name -> root-relative folders containing a file of that name.
    by_name: BTreeMap<String, BTreeSet<PathBuf>>,
}

/// A [`FileIndex`] over a directory tree, built by walking the filesystem.
#[derive(Debug)]
pub struct VaultIndex {
    root: PathBuf,
    snapshot: RwLock<Snapshot>,
}

impl VaultIndex {
    pub fn open(root: &Path) -> Result<Self> {
        let index = Self {
            root: root.canonicalize()?,
            snapshot: RwLock::new(Snapshot::default()),
        };
        index.refresh()?;
        Ok(index)
    }

    pub fn len(&self) -> usize {
        self.snapshot.read().files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn by_name(&self, name: &str, from_folder: &Path) -> Option<PathBuf> {
        let snapshot = self.snapshot.read();
        let folders = snapshot.by_name.get(name)?;
        let folder = if folders.contains(from_folder) {
            from_folder
        } else {
            folders.first()?.as_path()
        };
        Some(folder.join(name))
    }

    fn by_path(&self, name: &str) -> Option<PathBuf> {
        let relative = normalize(Path::new(name))?;
        self.root.join(&relative).is_file().then_some(relative)
    }
}

impl FileIndex for VaultIndex {
    fn root(&self) -> &Path {
        &self.root
    }

    fn list_documents(&self) -> Result<Vec<PathBuf>> {
        Ok(self
            .snapshot
            .read()
            .files
            .iter()
            .map(|relative| self.root.join(relative))
            .collect())
    }

    /// Walk the tree again and replace the indexed file list.
    fn refresh(&self) -> Result<()> {
        let mut snapshot = Snapshot::default();
        for relative in walker::corpus_files(&self.root)? {
            if let Some(name) = relative.file_name() {
                let folder = relative
                    .parent()
                    .map(Path::to_path_buf)
                    .unwrap_or_default();
                snapshot
                    .by_name
                    .entry(name.to_string_lossy().to_string())
                    .or_default()
                    .insert(folder);
            }
            snapshot.files.push(relative);
        }
        tracing::debug!(
            root = %self.root.display(),
            files = snapshot.files.len(),
            "indexed corpus"
        );
        *self.snapshot.write() = snapshot;
        Ok(())
    }

    fn resolve_link(
        &self,
        name: &str,
        from: &Path,
        markdown_without_ext: bool,
    ) -> Option<PathBuf> {
        if name.starts_with("http://") || name.starts_with("https://") {
            return Some(PathBuf::from(name));
        }

        let name = name.trim();
        let name = match name.rsplit_once('#') {
            Some((target, _anchor)) => target,
            None => name,
        };
        if name.is_empty() {
            return None;
        }

        let from_folder = from
            .strip_prefix(&self.root)
            .unwrap_or(from)
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        let with_md = format!("{name}.md");

        let resolved = self
            .by_name(name, &from_folder)
            .or_else(|| {
                markdown_without_ext
                    .then(|| self.by_name(&with_md, &from_folder))
                    .flatten()
            })
            .or_else(|| self.by_path(name))
            .or_else(|| {
                markdown_without_ext.then(|| self.by_path(&with_md)).flatten()
            });

        if resolved.is_none() {
            tracing::debug!(link = name, "could not resolve link");
        }
        resolved
    }
}

/// Lexically normalize a relative path, refusing to climb above its start.
pub(crate) fn normalize(path: &Path) -> Option<PathBuf> {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    return None;
                }
            }
            Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> (tempfile::TempDir, VaultIndex) {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        std::fs::create_dir_all(root.join("a")).unwrap();
        std::fs::create_dir_all(root.join("b")).unwrap();
        std::fs::write(root.join("a/note.md"), "a").unwrap();
        std::fs::write(root.join("b/note.md"), "b").unwrap();
        std::fs::write(root.join("b/other.md"), "b").unwrap();
        std::fs::write(root.join("top.png"), "png").unwrap();
        let index = VaultIndex::open(root).unwrap();
        (tmp, index)
    }

    #[test]
    fn lists_every_file() {
        let (_tmp, index) = fixture();
        let docs = index.list_documents().unwrap();
        assert_eq!(docs.len(), 4);
        assert!(docs.iter().all(|d| d.starts_with(index.root())));
    }

    #[test]
    fn same_folder_wins() {
        let (_tmp, index) = fixture();
        let from = index.root().join("b/other.md");
        assert_eq!(
            index.resolve_link("note.md", &from, false),
            Some(PathBuf::from("b/note.md"))
        );
    }

    #[test]
    fn first_folder_otherwise() {
        let (_tmp, index) = fixture();
        let from = index.root().join("top.png");
        assert_eq!(
            index.resolve_link("note.md", &from, false),
            Some(PathBuf::from("a/note.md"))
        );
    }

    #[test]
    fn markdown_extension_is_optional_when_asked() {
        let (_tmp, index) = fixture();
        let from = index.root().join("b/other.md");
        assert_eq!(index.resolve_link("note", &from, false), None);
        assert_eq!(
            index.resolve_link("note", &from, true),
            Some(PathBuf::from("b/note.md"))
        );
    }

    #[test]
    fn anchors_are_dropped() {
        let (_tmp, index) = fixture();
        let from = index.root().join("b/other.md");
        assert_eq!(
            index.resolve_link("other#Heading", &from, true),
            Some(PathBuf::from("b/other.md"))
        );
    }

    #[test]
    fn root_relative_paths_resolve() {
        let (_tmp, index) = fixture();
        let from = index.root().join("top.png");
        assert_eq!(
            index.resolve_link("a/note", &from, true),
            Some(PathBuf::from("a/note.md"))
        );
        assert_eq!(index.resolve_link("../escape", &from, true), None);
    }

    #[test]
    fn web_links_pass_through() {
        let (_tmp, index) = fixture();
        let from = index.root().join("top.png");
        assert_eq!(
            index.resolve_link("https://example.com/x", &from, true),
            Some(PathBuf::from("https://example.com/x"))
        );
    }

    #[test]
    fn refresh_picks_up_new_files() {
        let (_tmp, index) = fixture();
        std::fs::write(index.root().join("new.md"), "new").unwrap();
        assert_eq!(index.len(), 4);
        index.refresh().unwrap();
        assert_eq!(index.len(), 5);
    }

    #[test]
    fn normalize_refuses_to_escape() {
        assert_eq!(
            normalize(Path::new("a/./b/../c")),
            Some(PathBuf::from("a/c"))
        );
        assert_eq!(normalize(Path::new("../x")), None);
        assert_eq!(normalize(Path::new("/abs")), None);
    }
}
