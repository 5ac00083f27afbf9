//! Loading `.base` definition files.
//!
//! A definition is YAML with four optional sections:
//!
//! ```yaml
//! filters:
//!   and:
//!     - 'file.ext == "md"'
//!     - or: ['price > 3', 'file.hasTag("sale")']
//! formulas:
//!   double: "price * 2"
//! properties:
//!   formula.double: {displayName: Double}
//! views:
//!   - {type: table, name: All, order: [file.name, formula.double],
//!      sort: [{property: formula.double, direction: DESC}]}
//! ```

use std::{collections::BTreeMap, path::Path, sync::Arc};

use serde::{Deserialize, Serialize};
use serde_yaml::Value as Yaml;

use crate::{
    error::{Error, Result},
    expr::{Expr, Scope},
    filter::{FieldFilter, Filter},
    index,
    messages::Severity,
    value::Value,
    vault::Vault,
    view::{View, ViewKind},
};

/// A named expression, exposed to views as the `formula.<name>` column.
#[derive(Debug, Clone)]
pub struct Formula {
    source: String,
    expr: Expr,
}

impl Formula {
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn evaluate(&self, scope: &dyn Scope) -> Result<Value> {
        self.expr.evaluate(scope)
    }
}

/// Display metadata for one column.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PropertyMeta {
    #[serde(rename = "displayName", default)]
    pub display_name: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

#[derive(Debug)]
pub struct Definition {
    pub(crate) vault: Arc<Vault>,
    pub(crate) path: String,
    pub(crate) filter: Filter,
    pub(crate) formulas: BTreeMap<String, Formula>,
    pub(crate) properties: BTreeMap<String, PropertyMeta>,
    pub(crate) views: Vec<View>,
}

impl Definition {
    /// Read and parse a definition stored inside the corpus.
    pub fn load(vault: Arc<Vault>, path: &str) -> Result<Self> {
        let relative = index::normalize(Path::new(path))
            .ok_or_else(|| Error::OutsideRoot(path.into()))?;
        let full = vault.root().join(&relative);
        if !full.is_file() {
            return Err(Error::NotFound {
                kind: "definition",
                name: path.to_string(),
            });
        }
        let source = std::fs::read_to_string(&full)?;
        parse_definition(&source, &relative.to_string_lossy(), vault)
    }

    pub fn vault(&self) -> &Arc<Vault> {
        &self.vault
    }

    /// Corpus-relative path of the definition file.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Filter applied to every view.
    pub fn filter(&self) -> &Filter {
        &self.filter
    }

    pub fn formulas(&self) -> &BTreeMap<String, Formula> {
        &self.formulas
    }

    pub fn properties(&self) -> &BTreeMap<String, PropertyMeta> {
        &self.properties
    }

    pub fn views(&self) -> &[View] {
        &self.views
    }

    pub fn view(&self, name: &str) -> Result<&View> {
        self.views
            .iter()
            .find(|view| view.name == name)
            .ok_or_else(|| Error::NotFound {
                kind: "view",
                name: name.to_string(),
            })
    }

    /// Output key for a column: its `displayName`, or the column itself.
    pub fn display_name<'a>(&'a self, column: &'a str) -> &'a str {
        self.properties
            .get(column)
            .and_then(|meta| meta.display_name.as_deref())
            .unwrap_or(column)
    }
}

/// Parse definition text. `path` identifies the definition in cache keys
/// and diagnostics.
pub fn parse_definition(
    source: &str,
    path: &str,
    vault: Arc<Vault>,
) -> Result<Definition> {
    let root: Yaml = if source.trim().is_empty() {
        Yaml::Null
    } else {
        serde_yaml::from_str(source)?
    };
    let mut sections = match root {
        Yaml::Mapping(map) => map,
        Yaml::Null => serde_yaml::Mapping::new(),
        other => {
            return Err(Error::DefinitionParse(format!(
                "{path}: expected a mapping at the top level, found {}",
                Value::from(other).type_name()
            )));
        }
    };

    let filter = match sections.remove("filters") {
        Some(raw) => parse_filter(&raw, &vault)?,
        None => Filter::Trivial,
    };
    let formulas = match sections.remove("formulas") {
        Some(raw) => parse_formulas(raw, &vault)?,
        None => BTreeMap::new(),
    };
    let properties = match sections.remove("properties") {
        Some(raw) => parse_properties(raw, &vault)?,
        None => BTreeMap::new(),
    };
    let views = match sections.remove("views") {
        Some(raw) => parse_views(raw, &vault)?,
        None => Vec::new(),
    };

    tracing::debug!(
        definition = path,
        formulas = formulas.len(),
        views = views.len(),
        "parsed definition"
    );

    Ok(Definition {
        vault,
        path: path.to_string(),
        filter,
        formulas,
        properties,
        views,
    })
}

/// Build a filter tree from its YAML form.
///
/// A string is an expression; a single-key mapping `and`/`or` holds a list
/// of child filters. Anything else is rejected under a strict corpus and
/// otherwise matches everything.
pub fn parse_filter(raw: &Yaml, vault: &Vault) -> Result<Filter> {
    match raw {
        Yaml::Null => Ok(Filter::Trivial),
        Yaml::String(source) => Ok(Filter::Field(FieldFilter::new(source))),
        Yaml::Mapping(map) if map.len() == 1 => {
            let Some((key, value)) = map.iter().next() else {
                return Ok(Filter::Trivial);
            };
            let children = match value {
                Yaml::Sequence(items) => items,
                _ => {
                    return bad_shape(
                        vault,
                        format!(
                            "expected a list of filters under `{}`",
                            describe(key)
                        ),
                    )
                    .map(|()| Filter::Trivial);
                }
            };
            match key.as_str() {
                Some("and") => {
                    Ok(Filter::And(parse_children(children, vault)?))
                }
                Some("or") => Ok(Filter::Or(parse_children(children, vault)?)),
                _ => bad_shape(
                    vault,
                    format!("unknown filter operator `{}`", describe(key)),
                )
                .map(|()| Filter::Trivial),
            }
        }
        Yaml::Mapping(map) => {
            let keys: Vec<String> = map.keys().map(describe).collect();
            bad_shape(
                vault,
                format!(
                    "a filter mapping needs exactly one key, found [{}]",
                    keys.join(", ")
                ),
            )
            .map(|()| Filter::Trivial)
        }
        other => bad_shape(
            vault,
            format!("unsupported filter `{}`", describe(other)),
        )
        .map(|()| Filter::Trivial),
    }
}

fn parse_children(items: &[Yaml], vault: &Vault) -> Result<Vec<Filter>> {
    items.iter().map(|item| parse_filter(item, vault)).collect()
}

fn parse_formulas(
    raw: Yaml,
    vault: &Vault,
) -> Result<BTreeMap<String, Formula>> {
    let Yaml::Mapping(map) = raw else {
        bad_shape(vault, "`formulas` must be a mapping")?;
        return Ok(BTreeMap::new());
    };

    let mut formulas = BTreeMap::new();
    for (name, body) in map {
        let name = describe(&name);
        let source = match body {
            Yaml::String(s) => s,
            other => describe(&other),
        };
        let expr = match Expr::compile(&source) {
            Ok(expr) => expr,
            Err(err) if vault.strict_fields() => return Err(err.into()),
            Err(err) => {
                vault.notify(
                    Severity::Warning,
                    format!("could not compile formula `{name}`"),
                    err.to_string(),
                );
                Expr::constant("")
            }
        };
        formulas.insert(name, Formula { source, expr });
    }
    Ok(formulas)
}

fn parse_properties(
    raw: Yaml,
    vault: &Vault,
) -> Result<BTreeMap<String, PropertyMeta>> {
    if raw.is_null() {
        return Ok(BTreeMap::new());
    }
    match serde_yaml::from_value(raw) {
        Ok(properties) => Ok(properties),
        Err(err) => {
            bad_shape(vault, format!("bad `properties` section: {err}"))?;
            Ok(BTreeMap::new())
        }
    }
}

fn parse_views(raw: Yaml, vault: &Vault) -> Result<Vec<View>> {
    let items = match raw {
        Yaml::Sequence(items) => items,
        Yaml::Null => return Ok(Vec::new()),
        _ => {
            bad_shape(vault, "`views` must be a list")?;
            return Ok(Vec::new());
        }
    };

    let mut views = Vec::with_capacity(items.len());
    for (position, item) in items.into_iter().enumerate() {
        if let Some(view) = parse_view(item, position, vault)? {
            views.push(view);
        }
    }
    Ok(views)
}

fn parse_view(
    raw: Yaml,
    position: usize,
    vault: &Vault,
) -> Result<Option<View>> {
    let Yaml::Mapping(mut map) = raw else {
        bad_shape(vault, format!("view #{position} is not a mapping"))?;
        return Ok(None);
    };

    let Some(name) = map.remove("name").map(|n| describe(&n)) else {
        bad_shape(vault, format!("view #{position} has no name"))?;
        return Ok(None);
    };

    let kind = match map.remove("type") {
        None => ViewKind::Table,
        Some(kind) => match kind.as_str().and_then(ViewKind::parse) {
            Some(kind) => kind,
            None => {
                let message =
                    format!("unknown view type `{}`", describe(&kind));
                if vault.strict_definitions() {
                    return Err(Error::DefinitionParse(message));
                }
                vault.notify(
                    Severity::Warning,
                    format!("view {name} is shown as a table"),
                    message,
                );
                ViewKind::Table
            }
        },
    };

    let filter = match map.remove("filters") {
        Some(raw) => parse_filter(&raw, vault)?,
        None => Filter::Trivial,
    };

    let order = match map.remove("order") {
        Some(Yaml::Sequence(items)) => items.iter().map(describe).collect(),
        Some(Yaml::Null) | None => Vec::new(),
        Some(other) => {
            bad_shape(vault, format!("order of view {name} must be a list"))?;
            vec![describe(&other)]
        }
    };

    let sorts = match map.remove("sort") {
        Some(Yaml::Sequence(items)) => parse_sorts(&items, &name, vault)?,
        Some(Yaml::Null) | None => Vec::new(),
        Some(_) => {
            bad_shape(vault, format!("sort of view {name} must be a list"))?;
            Vec::new()
        }
    };

    Ok(Some(View {
        name,
        kind,
        filter,
        order,
        sorts,
    }))
}

/// `(property, direction)` pairs, kept verbatim; they are checked against
/// the view's columns when it is materialized.
fn parse_sorts(
    items: &[Yaml],
    view: &str,
    vault: &Vault,
) -> Result<Vec<(String, String)>> {
    let mut sorts = Vec::new();
    for item in items {
        let property = item.get("property").map(describe);
        let direction = item
            .get("direction")
            .map(describe)
            .unwrap_or_else(|| "ASC".to_string());
        match property {
            Some(property) => sorts.push((property, direction)),
            None => bad_shape(
                vault,
                format!(
                    "sort entry `{}` of view {view} has no property",
                    describe(item)
                ),
            )?,
        }
    }
    Ok(sorts)
}

/// Report a malformed section: an error for strict corpora, a warning
/// otherwise.
fn bad_shape(vault: &Vault, message: impl Into<String>) -> Result<()> {
    let message = message.into();
    if vault.strict_definitions() {
        return Err(Error::DefinitionParse(message));
    }
    vault.notify(Severity::Warning, "bad base definition", message);
    Ok(())
}

/// Scalars as plain text, anything else in compact YAML.
fn describe(value: &Yaml) -> String {
    match value {
        Yaml::String(s) => s.clone(),
        other => Value::from(other.clone()).to_string(),
    }
}
