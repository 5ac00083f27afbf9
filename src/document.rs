//! Per-document property access with lazy content extraction.

use std::{
    collections::{BTreeMap, BTreeSet},
    path::{Path, PathBuf},
    sync::{Arc, OnceLock},
};

use crate::{
    error::{Error, Result},
    expr::Scope,
    index,
    markdown::{escape_html, hashtags, split_front_matter, wikilinks},
    messages::Severity,
    value::{Value, yaml_key},
    vault::Vault,
};

/// Files above this size are never read for tags, links or properties.
pub const MAX_FILE_SIZE: u64 = 1024 * 1024;

/// Front-matter key holding a card's cover image.
pub const COVER_KEY: &str = "cover";

#[derive(Debug, Default)]
struct Extracted {
    tags: BTreeSet<String>,
    links: BTreeSet<String>,
    front_matter: BTreeMap<String, Value>,
}

/// One document as seen by filters, formulas and view columns.
///
/// Content is read at most once, on the first access that needs tags, links
/// or front matter. Path-derived properties never touch the file.
#[derive(Debug)]
pub struct DocumentContext {
    vault: Arc<Vault>,
    real_path: PathBuf,
    relative: PathBuf,
    extracted: OnceLock<Extracted>,
}

impl DocumentContext {
    pub fn new(vault: Arc<Vault>, real_path: PathBuf) -> Result<Self> {
        let relative = real_path
            .strip_prefix(vault.root())
            .map_err(|_| Error::OutsideRoot(real_path.clone()))?
            .to_path_buf();
        Ok(Self {
            vault,
            real_path,
            relative,
            extracted: OnceLock::new(),
        })
    }

    pub fn vault(&self) -> &Vault {
        &self.vault
    }

    pub fn real_path(&self) -> &Path {
        &self.real_path
    }

    /// Path relative to the corpus root.
    pub fn path(&self) -> &Path {
        &self.relative
    }

    pub fn display_path(&self) -> String {
        self.relative.to_string_lossy().to_string()
    }

    /// Tags from front matter and inline hashtags, sorted.
    pub fn tags(&self) -> &BTreeSet<String> {
        &self.ensure_loaded().tags
    }

    /// Resolved link targets, root-relative, sorted.
    pub fn links(&self) -> &BTreeSet<String> {
        &self.ensure_loaded().links
    }

    pub fn front_matter(&self) -> &BTreeMap<String, Value> {
        &self.ensure_loaded().front_matter
    }

    /// Look up a property by dotted path.
    ///
    /// `render` asks for the form shown in a view cell: `file.name` becomes
    /// a link to the rendered page and `file` becomes its path.
    pub fn get_prop<S: AsRef<str>>(
        &self,
        path: &[S],
        render: bool,
    ) -> Result<Value> {
        let parts: Vec<&str> = path.iter().map(AsRef::as_ref).collect();
        match parts.as_slice() {
            ["file", field] => self.file_prop(field, render),
            ["file"] if render => Ok(Value::Str(self.display_path())),
            ["file"] => Ok(Value::Document(self.display_path())),
            [name] => self.front_matter_prop(name, render),
            _ => Err(Error::field(
                parts.join("."),
                "unsupported property path",
            )),
        }
    }

    fn file_prop(&self, field: &str, render: bool) -> Result<Value> {
        let value = match field {
            "folder" => {
                let parent = self.relative.parent().unwrap_or(Path::new(""));
                if parent.as_os_str().is_empty() {
                    Value::from(".")
                } else {
                    Value::from(parent.to_string_lossy().to_string())
                }
            }
            "path" => Value::Str(self.display_path()),
            "ext" => Value::Str(
                self.relative
                    .extension()
                    .map(|ext| ext.to_string_lossy().to_string())
                    .unwrap_or_default(),
            ),
            "tags" => strings(self.tags()),
            "links" => strings(self.links()),
            "name" => {
                let name = self
                    .relative
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_default();
                if render {
                    let url = self.vault.render_url(&self.relative);
                    Value::Str(format!(
                        "<a href=\"{url}\">{}</a>",
                        escape_html(&name)
                    ))
                } else {
                    Value::Str(name)
                }
            }
            other => {
                return Err(Error::field(
                    format!("file.{other}"),
                    "unknown file property",
                ));
            }
        };
        Ok(value)
    }

    fn front_matter_prop(&self, name: &str, render: bool) -> Result<Value> {
        let Some(value) = self.front_matter().get(name) else {
            return Ok(Value::from(""));
        };
        if render
            && name == COVER_KEY
            && let Value::Str(target) = value
        {
            return self.resolve_cover(target).map(Value::Str);
        }
        Ok(value.clone())
    }

    /// Cover paths are relative to the document's folder and come back
    /// relative to the corpus root; web URLs pass through.
    fn resolve_cover(&self, target: &str) -> Result<String> {
        if target.starts_with("http://") || target.starts_with("https://") {
            return Ok(target.to_string());
        }
        let folder = self.relative.parent().unwrap_or(Path::new(""));
        let joined = folder.join(target);
        let resolved = index::normalize(&joined)
            .ok_or_else(|| Error::OutsideRoot(joined.clone()))?;
        Ok(resolved.to_string_lossy().to_string())
    }

    fn ensure_loaded(&self) -> &Extracted {
        self.extracted.get_or_init(|| self.extract())
    }

    fn extract(&self) -> Extracted {
        if self.relative.extension().is_none_or(|ext| ext != "md") {
            return Extracted::default();
        }
        let Some(text) = self.read_text() else {
            return Extracted::default();
        };

        let (block, body) = split_front_matter(&text);
        let front_matter = match block {
            Some(block) => self.parse_front_matter(block),
            None => BTreeMap::new(),
        };

        let mut tags: BTreeSet<String> = hashtags(body).into_iter().collect();
        if let Some(declared) = front_matter.get("tags") {
            tags.extend(declared_tags(declared));
        }

        let index = self.vault.index();
        let links = wikilinks(body)
            .iter()
            .filter_map(|name| index.resolve_link(name, &self.real_path, true))
            .map(|path| path.to_string_lossy().to_string())
            .collect();

        Extracted {
            tags,
            links,
            front_matter,
        }
    }

    fn read_text(&self) -> Option<String> {
        let skip = |reason: String| {
            self.vault.notify(
                Severity::Warning,
                format!(
                    "could not read metadata from {}",
                    self.relative.display()
                ),
                reason,
            );
            None
        };

        match std::fs::metadata(&self.real_path) {
            Ok(meta) if meta.len() > MAX_FILE_SIZE => {
                return skip(format!(
                    "file is {} bytes, larger than {MAX_FILE_SIZE}",
                    meta.len()
                ));
            }
            Ok(_) => {}
            Err(e) => return skip(e.to_string()),
        }
        match std::fs::read(&self.real_path) {
            Ok(bytes) => match String::from_utf8(bytes) {
                Ok(text) => Some(text),
                Err(_) => skip("content is not valid UTF-8".to_string()),
            },
            Err(e) => skip(e.to_string()),
        }
    }

    fn parse_front_matter(&self, block: &str) -> BTreeMap<String, Value> {
        let parsed = serde_yaml::from_str::<serde_yaml::Value>(block);
        match parsed {
            Ok(serde_yaml::Value::Mapping(map)) => map
                .into_iter()
                .map(|(k, v)| (yaml_key(k), Value::from(v)))
                .collect(),
            Ok(serde_yaml::Value::Null) => BTreeMap::new(),
            Ok(other) => {
                self.bad_properties(format!(
                    "expected a mapping, found {}",
                    Value::from(other).type_name()
                ));
                BTreeMap::new()
            }
            Err(e) => {
                self.bad_properties(e.to_string());
                BTreeMap::new()
            }
        }
    }

    fn bad_properties(&self, reason: String) {
        self.vault.notify(
            Severity::Warning,
            format!("bad properties for file {}", self.relative.display()),
            reason,
        );
    }
}

impl Scope for DocumentContext {
    fn property(&self, path: &[String]) -> Result<Value> {
        self.get_prop(path, false)
    }

    fn tags(&self) -> Result<Vec<String>> {
        Ok(DocumentContext::tags(self).iter().cloned().collect())
    }
}

fn strings(set: &BTreeSet<String>) -> Value {
    Value::List(set.iter().cloned().map(Value::Str).collect())
}

/// The front-matter `tags` field, as a list or a comma separated string.
fn declared_tags(value: &Value) -> Vec<String> {
    let raw: Vec<String> = match value {
        Value::List(items) => items.iter().map(Value::to_string).collect(),
        Value::Str(s) => vec![s.clone()],
        Value::Null => Vec::new(),
        other => vec![other.to_string()],
    };
    raw.into_iter()
        .map(|t| t.trim().trim_start_matches('#').to_string())
        .filter(|t| !t.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::{config::CorpusConfig, expr::Expr, messages::MessageLog};

    struct Fixture {
        _tmp: tempfile::TempDir,
        vault: Arc<Vault>,
        log: Arc<MessageLog>,
    }

    impl Fixture {
        fn new(files: &[(&str, &str)]) -> Self {
            let tmp = tempfile::tempdir().unwrap();
            for (path, content) in files {
                let full = tmp.path().join(path);
                fs::create_dir_all(full.parent().unwrap()).unwrap();
                fs::write(full, content).unwrap();
            }
            let log = Arc::new(MessageLog::new());
            let vault = Arc::new(
                Vault::open("notes", CorpusConfig::at(tmp.path()), log.clone())
                    .unwrap(),
            );
            Self {
                _tmp: tmp,
                vault,
                log,
            }
        }

        fn doc(&self, relative: &str) -> DocumentContext {
            let path = self.vault.root().join(relative);
            DocumentContext::new(self.vault.clone(), path).unwrap()
        }
    }

    fn list(items: &[&str]) -> Value {
        Value::List(items.iter().map(|s| Value::from(*s)).collect())
    }

    #[test]
    fn path_properties() {
        let fx = Fixture::new(&[("dir/note.md", "body")]);
        let doc = fx.doc("dir/note.md");
        assert_eq!(
            doc.get_prop(&["file", "folder"], false).unwrap(),
            Value::from("dir")
        );
        assert_eq!(
            doc.get_prop(&["file", "path"], false).unwrap(),
            Value::from("dir/note.md")
        );
        assert_eq!(
            doc.get_prop(&["file", "ext"], false).unwrap(),
            Value::from("md")
        );
        assert_eq!(
            doc.get_prop(&["file", "name"], false).unwrap(),
            Value::from("note.md")
        );
    }

    #[test]
    fn root_folder_is_dot() {
        let fx = Fixture::new(&[("a.md", "")]);
        assert_eq!(
            fx.doc("a.md").get_prop(&["file", "folder"], false).unwrap(),
            Value::from(".")
        );
    }

    #[test]
    fn rendered_name_is_an_anchor() {
        let fx = Fixture::new(&[("a b.md", "")]);
        let rendered =
            fx.doc("a b.md").get_prop(&["file", "name"], true).unwrap();
        assert_eq!(
            rendered,
            Value::from("<a href=\"/renderer/notes/a%20b.md\">a b.md</a>")
        );
    }

    #[test]
    fn file_handle() {
        let fx = Fixture::new(&[("a.md", "")]);
        let doc = fx.doc("a.md");
        assert!(matches!(
            doc.get_prop(&["file"], false).unwrap(),
            Value::Document(ref p) if p == "a.md"
        ));
        assert!(matches!(
            doc.get_prop(&["file"], true).unwrap(),
            Value::Str(ref p) if p == "a.md"
        ));
    }

    #[test]
    fn tags_union_front_matter_and_inline() {
        let fx = Fixture::new(&[(
            "a.md",
            "---\ntags: [\"#one\", two]\n---\nSome #three and #two text\n",
        )]);
        assert_eq!(
            fx.doc("a.md").get_prop(&["file", "tags"], false).unwrap(),
            list(&["one", "three", "two"])
        );
    }

    #[test]
    fn front_matter_lookup() {
        let fx = Fixture::new(&[("a.md", "---\nprice: 5\nnext: \"\"\n---\n")]);
        let doc = fx.doc("a.md");
        assert_eq!(doc.get_prop(&["price"], false).unwrap(), Value::Int(5));
        assert_eq!(doc.get_prop(&["missing"], false).unwrap(), Value::from(""));
    }

    #[test]
    fn bad_front_matter_warns_and_keeps_tags() {
        let fx = Fixture::new(&[("a.md", "---\n: : [\n---\nbody #kept\n")]);
        let doc = fx.doc("a.md");
        assert!(doc.front_matter().is_empty());
        assert!(doc.tags().contains("kept"));
        assert_eq!(fx.log.matching("bad properties for file a.md").len(), 1);
    }

    #[test]
    fn non_markdown_is_not_read() {
        let fx = Fixture::new(&[("c.txt", "#tag")]);
        let doc = fx.doc("c.txt");
        assert!(doc.tags().is_empty());
        assert!(fx.log.is_empty());
    }

    #[test]
    fn oversized_file_degrades() {
        let big = "x".repeat(MAX_FILE_SIZE as usize + 1);
        let fx = Fixture::new(&[("big.md", big.as_str())]);
        let doc = fx.doc("big.md");
        assert!(doc.tags().is_empty());
        assert_eq!(fx.log.len(), 1);
    }

    #[test]
    fn invalid_utf8_degrades() {
        let fx = Fixture::new(&[]);
        fs::write(fx.vault.root().join("bin.md"), [0xff, 0xfe, 0x00]).unwrap();
        let doc = fx.doc("bin.md");
        assert!(doc.front_matter().is_empty());
        assert_eq!(fx.log.matching("could not read metadata").len(), 1);
    }

    #[test]
    fn links_resolve_through_the_index() {
        let fx = Fixture::new(&[
            ("a.md", "see [[b]] and [[sub/c|C]] and [[nowhere]]"),
            ("b.md", ""),
            ("sub/c.md", ""),
        ]);
        let doc = fx.doc("a.md");
        assert_eq!(
            doc.get_prop(&["file", "links"], false).unwrap(),
            list(&["b.md", "sub/c.md"])
        );
    }

    #[test]
    fn cover_is_rendered_root_relative() {
        let fx = Fixture::new(&[(
            "a.md",
            "---\ncover: img/./x.png\n---\n",
        )]);
        let doc = fx.doc("a.md");
        assert_eq!(
            doc.get_prop(&["cover"], true).unwrap(),
            Value::from("img/x.png")
        );
        assert_eq!(
            doc.get_prop(&["cover"], false).unwrap(),
            Value::from("img/./x.png")
        );
    }

    #[test]
    fn nested_cover_is_relative_to_its_folder() {
        let fx = Fixture::new(&[
            ("sub/a.md", "---
cover: img.png
---
"),
            ("sub/b.md", "---
cover: ../top.png
---
"),
            ("sub/c.md", "---
cover: ../../out.png
---
"),
            ("sub/d.md", "---
cover: https://x.org/i.png
---
"),
        ]);
        let cover = |name: &str| fx.doc(name).get_prop(&["cover"], true);
        assert_eq!(cover("sub/a.md").unwrap(), Value::from("sub/img.png"));
        assert_eq!(cover("sub/b.md").unwrap(), Value::from("top.png"));
        assert!(matches!(cover("sub/c.md"), Err(Error::OutsideRoot(_))));
        assert_eq!(
            cover("sub/d.md").unwrap(),
            Value::from("https://x.org/i.png")
        );
    }

    #[test]
    fn unsupported_paths_fail() {
        let fx = Fixture::new(&[("a.md", "")]);
        let doc = fx.doc("a.md");
        assert!(doc.get_prop(&["a", "b"], false).is_err());
        assert!(doc.get_prop(&["file", "a", "b"], false).is_err());
        assert!(doc.get_prop(&["file", "size"], false).is_err());
    }

    #[test]
    fn has_tag_sees_inline_hashtags() {
        let fx = Fixture::new(&[("a.md", "just an inline #x here")]);
        let doc = fx.doc("a.md");
        let expr = Expr::compile("file.hasTag(\"x\")").unwrap();
        assert!(expr.check(&doc).unwrap());
        let expr = Expr::compile("file.hasTag(\"#y\")").unwrap();
        assert!(!expr.check(&doc).unwrap());
    }

    #[test]
    fn tags_contains_without_hash() {
        let fx = Fixture::new(&[("a.md", "---\ntags: [tag1]\n---\n")]);
        let doc = fx.doc("a.md");
        let expr = Expr::compile("file.tags.contains(\"tag1\")").unwrap();
        assert!(expr.check(&doc).unwrap());
        let expr = Expr::compile("file.tags.contains(\"#tag1\")").unwrap();
        assert!(!expr.check(&doc).unwrap());
    }

    #[test]
    fn string_tags_are_one_tag() {
        let fx = Fixture::new(&[("a.md", "---\ntags: \"#a b, c\"\n---\n")]);
        let doc = fx.doc("a.md");
        assert_eq!(
            doc.tags().iter().collect::<Vec<_>>(),
            vec!["a b, c"]
        );
    }

    #[test]
    fn repeated_evaluation_is_stable() {
        let fx = Fixture::new(&[("a.md", "---\nprice: 2\n---\n#t [[a]]")]);
        let doc = fx.doc("a.md");
        for source in ["price * 3", "file.tags", "file.links", "file.name"] {
            let expr = Expr::compile(source).unwrap();
            let first = expr.evaluate(&doc).unwrap();
            assert_eq!(expr.evaluate(&doc).unwrap(), first, "{source}");
        }
        assert!(fx.log.is_empty());
    }
}
