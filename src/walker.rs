use std::path::{Path, PathBuf};

use crate::error::Result;

/// List every regular file below `root`, as root-relative paths.
///
/// Names starting with `.` are skipped along with everything beneath them.
/// Symlinks to files are listed under the link's own path; linked
/// directories are never entered, which keeps the walk free of cycles.
pub fn corpus_files(root: &Path) -> Result<Vec<PathBuf>> {
    let root = root.canonicalize()?;
    let mut files = Vec::new();
    let mut pending = vec![PathBuf::new()];

    while let Some(folder) = pending.pop() {
        for entry in std::fs::read_dir(root.join(&folder))? {
            let entry = entry?;
            let name = entry.file_name();
            if name.to_string_lossy().starts_with('.') {
                continue;
            }
            let relative = folder.join(&name);

            let kind = entry.file_type()?;
            if kind.is_dir() {
                pending.push(relative);
            } else if kind.is_file() {
                files.push(relative);
            } else if kind.is_symlink() && entry.path().is_file() {
                // `is_file` follows the link; broken links read as false.
                files.push(relative);
            }
        }
    }

    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listed(root: &Path) -> Vec<String> {
        corpus_files(root)
            .unwrap()
            .iter()
            .map(|p| p.to_string_lossy().replace('\\', "/"))
            .collect()
    }

    fn touch(root: &Path, relative: &str) {
        let path = root.join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, relative).unwrap();
    }

    #[test]
    fn lists_all_extensions_in_order() {
        let tmp = tempfile::tempdir().unwrap();
        for name in ["z.md", "b/note.txt", "a.png", "b/a/deep.base"] {
            touch(tmp.path(), name);
        }
        assert_eq!(
            listed(tmp.path()),
            vec!["a.png", "b/a/deep.base", "b/note.txt", "z.md"]
        );
    }

    #[test]
    fn hidden_entries_are_skipped() {
        let tmp = tempfile::tempdir().unwrap();
        touch(tmp.path(), ".obsidian/workspace.json");
        touch(tmp.path(), ".draft.md");
        touch(tmp.path(), "kept.md");
        assert_eq!(listed(tmp.path()), vec!["kept.md"]);
    }

    #[test]
    fn empty_root() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(listed(tmp.path()).is_empty());
    }

    #[test]
    fn missing_root_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(corpus_files(&tmp.path().join("gone")).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn file_links_are_listed_and_folder_links_are_not() {
        let tmp = tempfile::tempdir().unwrap();
        touch(tmp.path(), "real/a.md");
        std::os::unix::fs::symlink(
            tmp.path().join("real/a.md"),
            tmp.path().join("alias.md"),
        )
        .unwrap();
        std::os::unix::fs::symlink(tmp.path(), tmp.path().join("loop"))
            .unwrap();
        std::os::unix::fs::symlink(
            tmp.path().join("nowhere"),
            tmp.path().join("broken.md"),
        )
        .unwrap();
        assert_eq!(listed(tmp.path()), vec!["alias.md", "real/a.md"]);
    }
}
