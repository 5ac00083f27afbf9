//! Views and their materialization into rows.
//!
//! Materializing a view runs these steps:
//!
//! 1. Return the cached rows unless a refresh is forced.
//! 2. Rescan the corpus and gather documents passing both the definition
//!    filter and the view filter.
//! 3. Compute every needed column for every document, recording failures.
//! 4. Sort by the view's valid sort entries.
//! 5. Project onto the requested columns and store the result.

use std::{cmp::Ordering, fmt, sync::Arc};

use rayon::prelude::*;
use serde::{Serialize, Serializer, ser::SerializeMap};

use crate::{
    cache::{CacheKey, ViewCache},
    definition::Definition,
    document::{COVER_KEY, DocumentContext},
    error::{Error, Result},
    filter::Filter,
    messages::Severity,
    value::Value,
};

/// Cell failures beyond this count are only written to the log.
pub const MAX_VIEW_ERRORS: usize = 50;

/// `file.*` properties usable as columns.
const FILE_FIELDS: &[&str] =
    &["folder", "path", "ext", "tags", "links", "name"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewKind {
    Table,
    Cards,
}

impl ViewKind {
    pub fn parse(kind: &str) -> Option<Self> {
        match kind {
            "table" => Some(ViewKind::Table),
            "cards" => Some(ViewKind::Cards),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ViewKind::Table => "table",
            ViewKind::Cards => "cards",
        }
    }
}

impl fmt::Display for ViewKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct View {
    pub name: String,
    pub kind: ViewKind,
    pub filter: Filter,
    /// Requested columns, in display order.
    pub order: Vec<String>,
    /// `(property, direction)` pairs as written in the definition.
    pub sorts: Vec<(String, String)>,
}

/// One output row: column names and cells, in column order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    cells: Vec<(String, Value)>,
}

impl Row {
    /// Set a cell, replacing an existing one with the same key in place.
    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        let key = key.into();
        match self.cells.iter_mut().find(|(k, _)| *k == key) {
            Some((_, cell)) => *cell = value,
            None => self.cells.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.cells.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.cells.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.cells.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

impl Serialize for Row {
    fn serialize<S: Serializer>(
        &self,
        serializer: S,
    ) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.cells.len()))?;
        for (key, value) in &self.cells {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

/// Rows shared between the cache and its readers.
pub type Rows = Arc<Vec<Row>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Asc,
    Desc,
}

/// Columns computed for a view and which of them are shown.
#[derive(Debug)]
struct Layout {
    columns: Vec<String>,
    /// Indices into `columns` of the output columns, in output order.
    output: Vec<usize>,
}

impl Layout {
    fn new(view: &View, sorts: &[(String, Direction)]) -> Self {
        let mut layout = Self {
            columns: Vec::new(),
            output: Vec::new(),
        };
        for column in &view.order {
            layout.show(column);
        }
        for (column, _) in sorts {
            layout.intern(column);
        }
        if view.kind == ViewKind::Cards {
            layout.show(COVER_KEY);
        }
        layout
    }

    fn intern(&mut self, column: &str) -> usize {
        match self.index(column) {
            Some(index) => index,
            None => {
                self.columns.push(column.to_string());
                self.columns.len() - 1
            }
        }
    }

    fn show(&mut self, column: &str) {
        let index = self.intern(column);
        if !self.output.contains(&index) {
            self.output.push(index);
        }
    }

    fn index(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == column)
    }
}

/// Comparable form of a cell: numbers for numeric columns, text otherwise.
#[derive(Debug, Clone, PartialEq)]
enum SortValue {
    Number(f64),
    Text(String),
}

impl SortValue {
    fn of(cell: &Value, numeric: bool) -> Self {
        if numeric {
            let number = cell.as_f64().filter(|n| !n.is_nan()).unwrap_or(0.0);
            return SortValue::Number(number);
        }
        match cell {
            Value::Str(s) => SortValue::Text(s.clone()),
            Value::Null => SortValue::Text(String::new()),
            Value::Float(f) if f.is_nan() => SortValue::Text(String::new()),
            other => SortValue::Text(other.to_string()),
        }
    }

    fn compare(&self, other: &Self) -> Ordering {
        match (self, other) {
            (SortValue::Number(a), SortValue::Number(b)) => a.total_cmp(b),
            (SortValue::Text(a), SortValue::Text(b)) => a.cmp(b),
            (SortValue::Number(_), SortValue::Text(_)) => Ordering::Less,
            (SortValue::Text(_), SortValue::Number(_)) => Ordering::Greater,
        }
    }
}

impl Definition {
    /// Produce the rows of view `name`, from the cache when possible.
    pub fn materialize(
        &self,
        name: &str,
        cache: &ViewCache,
        force_refresh: bool,
    ) -> Result<Rows> {
        let view = self.view(name)?;
        let key = CacheKey::new(self.vault.name(), &self.path, &view.name);
        if !force_refresh && let Some(rows) = cache.get(&key) {
            tracing::debug!(view = %view.name, "view served from cache");
            return Ok(rows);
        }

        self.vault.index().refresh()?;
        let docs = self.gather(view)?;
        let sorts = self.valid_sorts(view)?;
        let layout = Layout::new(view, &sorts);
        let mut table = self.compute(&docs, &layout.columns)?;
        let numeric = normalize(&mut table, layout.columns.len());
        let sorts = self.sort_plan(view, &layout, &sorts);
        sort_table(&mut table, &numeric, &sorts);

        let rows: Vec<Row> = table
            .into_iter()
            .map(|mut cells| {
                let mut row = Row::default();
                for &index in &layout.output {
                    let column = &layout.columns[index];
                    let cell = std::mem::take(&mut cells[index]);
                    row.insert(self.display_name(column), cell);
                }
                row
            })
            .collect();

        tracing::info!(
            corpus = self.vault.name(),
            definition = %self.path,
            view = %view.name,
            rows = rows.len(),
            "materialized view"
        );

        let rows = Arc::new(rows);
        cache.put(key, Arc::clone(&rows));
        Ok(rows)
    }

    /// Documents passing the definition filter and the view filter, in
    /// corpus order.
    fn gather(&self, view: &View) -> Result<Vec<DocumentContext>> {
        let filter = self.filter.clone().and(view.filter.clone());
        let paths = self.vault.index().list_documents()?;
        let kept = paths
            .into_par_iter()
            .map(|path| -> Result<Option<DocumentContext>> {
                let doc = DocumentContext::new(Arc::clone(&self.vault), path)?;
                Ok(filter.check(&doc)?.then_some(doc))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(kept.into_iter().flatten().collect())
    }

    /// Compute every column for every document.
    ///
    /// Under a lenient corpus a failed cell becomes `""` and the failures
    /// are reported together once all documents are done.
    fn compute(
        &self,
        docs: &[DocumentContext],
        columns: &[String],
    ) -> Result<Vec<Vec<Value>>> {
        let strict = self.vault.strict_fields();
        let computed = docs
            .par_iter()
            .map(|doc| -> Result<(Vec<Value>, Vec<String>)> {
                let mut cells = Vec::with_capacity(columns.len());
                let mut problems = Vec::new();
                for column in columns {
                    match self.cell(doc, column) {
                        Ok(value) => cells.push(value),
                        Err(err) if strict => {
                            return Err(Error::Cell {
                                column: column.clone(),
                                document: doc.display_path(),
                                source: Box::new(err),
                            });
                        }
                        Err(err) => {
                            problems.push(format!(
                                "could not find value {column} from {}: {err}",
                                doc.display_path()
                            ));
                            cells.push(Value::from(""));
                        }
                    }
                }
                Ok((cells, problems))
            })
            .collect::<Result<Vec<_>>>()?;

        let mut table = Vec::with_capacity(computed.len());
        let mut problems = Vec::new();
        for (cells, doc_problems) in computed {
            table.push(cells);
            problems.extend(doc_problems);
        }
        self.report_problems(problems);
        Ok(table)
    }

    fn cell(&self, doc: &DocumentContext, column: &str) -> Result<Value> {
        match column.strip_prefix("formula.") {
            Some(id) => self
                .formulas
                .get(id)
                .ok_or_else(|| Error::field(column, "unknown formula"))?
                .evaluate(doc),
            None => {
                let path: Vec<&str> = column.split('.').collect();
                doc.get_prop(&path, true)
            }
        }
    }

    fn report_problems(&self, mut problems: Vec<String>) {
        if problems.is_empty() {
            return;
        }
        let mut use_log = true;
        if problems.len() > MAX_VIEW_ERRORS {
            for problem in &problems {
                tracing::warn!(corpus = self.vault.name(), "{problem}");
            }
            problems.truncate(MAX_VIEW_ERRORS);
            problems.push("... see system logs".to_string());
            use_log = false;
        }
        self.vault.notify_with(
            Severity::Warning,
            "problems during base rendering",
            problems.join("\n"),
            use_log,
        );
    }

    /// Sort entries naming a real column with an `ASC`/`DESC` direction.
    fn valid_sorts(&self, view: &View) -> Result<Vec<(String, Direction)>> {
        let mut valid = Vec::with_capacity(view.sorts.len());
        for (property, direction) in &view.sorts {
            let parsed = match direction.as_str() {
                "ASC" => Some(Direction::Asc),
                "DESC" => Some(Direction::Desc),
                _ => None,
            };
            match parsed {
                Some(direction) if self.is_column(property) => {
                    valid.push((property.clone(), direction));
                }
                _ => {
                    let message = format!(
                        "invalid sort ({property}, {direction}) in view {}",
                        view.name
                    );
                    if self.vault.strict_definitions() {
                        return Err(Error::SortSpec(message));
                    }
                    self.vault.notify(
                        Severity::Warning,
                        "sort entry dropped",
                        message,
                    );
                }
            }
        }
        Ok(valid)
    }

    fn is_column(&self, property: &str) -> bool {
        let parts: Vec<&str> = property.split('.').collect();
        match parts.as_slice() {
            ["formula", id] => self.formulas.contains_key(*id),
            ["file", field] => FILE_FIELDS.contains(field),
            [name] => !name.is_empty(),
            _ => false,
        }
    }

    /// Column indices and directions to sort by, falling back to the first
    /// output column when no valid entry remains.
    fn sort_plan(
        &self,
        view: &View,
        layout: &Layout,
        sorts: &[(String, Direction)],
    ) -> Vec<(usize, Direction)> {
        let plan: Vec<(usize, Direction)> = sorts
            .iter()
            .filter_map(|(column, dir)| Some((layout.index(column)?, *dir)))
            .collect();
        if !plan.is_empty() {
            return plan;
        }

        if !view.sorts.is_empty() {
            self.vault.notify(
                Severity::Warning,
                "view is not sorted",
                format!("no usable sort entry in view {}", view.name),
            );
        }
        let Some(&first) = layout.output.first() else {
            return Vec::new();
        };
        self.vault.notify(
            Severity::Info,
            format!("view {} has no sort", view.name),
            format!("sorting by {}", layout.columns[first]),
        );
        vec![(first, Direction::Asc)]
    }
}

/// Replace missing cells with NaN and flatten non-scalar cells to text.
///
/// Returns, per column, whether every cell is a number.
fn normalize(table: &mut [Vec<Value>], width: usize) -> Vec<bool> {
    let mut numeric = vec![true; width];
    for row in table.iter_mut() {
        for (index, cell) in row.iter_mut().enumerate() {
            *cell = match std::mem::take(cell) {
                Value::Null => Value::Float(f64::NAN),
                value if value.is_primitive() => value,
                other => Value::Str(other.to_string()),
            };
            if !cell.is_numeric() {
                numeric[index] = false;
            }
        }
    }
    numeric
}

/// Stable multi-key sort.
fn sort_table(
    table: &mut Vec<Vec<Value>>,
    numeric: &[bool],
    plan: &[(usize, Direction)],
) {
    if plan.is_empty() {
        return;
    }
    let mut keyed: Vec<(Vec<SortValue>, Vec<Value>)> = std::mem::take(table)
        .into_iter()
        .map(|cells| {
            let keys = plan
                .iter()
                .map(|&(index, _)| SortValue::of(&cells[index], numeric[index]))
                .collect();
            (keys, cells)
        })
        .collect();

    keyed.sort_by(|(a, _), (b, _)| {
        for (i, &(_, direction)) in plan.iter().enumerate() {
            let ordering = match direction {
                Direction::Asc => a[i].compare(&b[i]),
                Direction::Desc => b[i].compare(&a[i]),
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    });
    *table = keyed.into_iter().map(|(_, cells)| cells).collect();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strs(items: &[&str]) -> Vec<Vec<Value>> {
        items.iter().map(|s| vec![Value::from(*s)]).collect()
    }

    #[test]
    fn row_keeps_insertion_order() {
        let mut row = Row::default();
        row.insert("b", Value::Int(1));
        row.insert("a", Value::Int(2));
        row.insert("b", Value::Int(3));
        assert_eq!(row.keys().collect::<Vec<_>>(), vec!["b", "a"]);
        assert_eq!(row.get("b"), Some(&Value::Int(3)));
        assert_eq!(
            serde_json::to_string(&row).unwrap(),
            r#"{"b":3,"a":2}"#
        );
    }

    #[test]
    fn normalize_classifies_columns() {
        let mut table = vec![
            vec![Value::Int(2), Value::Null, Value::Bool(true)],
            vec![Value::Float(1.5), Value::Int(1), Value::List(vec![])],
        ];
        let numeric = normalize(&mut table, 3);
        assert_eq!(numeric, vec![true, true, false]);
        assert!(matches!(table[0][1], Value::Float(f) if f.is_nan()));
        assert_eq!(table[1][2], Value::from("[]"));
    }

    #[test]
    fn mixed_column_sorts_as_text() {
        let mut table = vec![
            vec![Value::Int(2)],
            vec![Value::from("x")],
            vec![Value::Int(1)],
        ];
        let numeric = normalize(&mut table, 1);
        assert_eq!(numeric, vec![false]);
        sort_table(&mut table, &numeric, &[(0, Direction::Asc)]);
        let sorted: Vec<String> =
            table.iter().map(|r| r[0].to_string()).collect();
        assert_eq!(sorted, vec!["1", "2", "x"]);
    }

    #[test]
    fn numeric_sort_maps_nan_to_zero() {
        let mut table = vec![
            vec![Value::Int(5)],
            vec![Value::Null],
            vec![Value::Float(-1.0)],
        ];
        let numeric = normalize(&mut table, 1);
        sort_table(&mut table, &numeric, &[(0, Direction::Asc)]);
        assert_eq!(table[0][0], Value::Float(-1.0));
        assert!(matches!(table[1][0], Value::Float(f) if f.is_nan()));
        assert_eq!(table[2][0], Value::Int(5));
    }

    #[test]
    fn multi_key_sort_is_stable() {
        let mut table = vec![
            vec![Value::from("b"), Value::Int(1), Value::from("first")],
            vec![Value::from("a"), Value::Int(1), Value::from("second")],
            vec![Value::from("b"), Value::Int(2), Value::from("third")],
            vec![Value::from("b"), Value::Int(1), Value::from("fourth")],
        ];
        let numeric = normalize(&mut table, 3);
        sort_table(
            &mut table,
            &numeric,
            &[(0, Direction::Desc), (1, Direction::Asc)],
        );
        let labels: Vec<String> =
            table.iter().map(|r| r[2].to_string()).collect();
        assert_eq!(labels, vec!["first", "fourth", "third", "second"]);
    }

    #[test]
    fn empty_plan_keeps_order() {
        let mut table = strs(&["b", "a"]);
        sort_table(&mut table, &[false], &[]);
        assert_eq!(table, strs(&["b", "a"]));
    }

    #[test]
    fn layout_adds_helper_columns() {
        let view = View {
            name: "v".into(),
            kind: ViewKind::Cards,
            filter: Filter::Trivial,
            order: vec!["file.name".into(), "file.name".into()],
            sorts: vec![],
        };
        let sorts = vec![("price".to_string(), Direction::Asc)];
        let layout = Layout::new(&view, &sorts);
        assert_eq!(layout.columns, vec!["file.name", "price", "cover"]);
        assert_eq!(layout.output, vec![0, 2]);
    }

    #[test]
    fn view_kind_names() {
        assert_eq!(ViewKind::parse("cards"), Some(ViewKind::Cards));
        assert_eq!(ViewKind::parse("board"), None);
        assert_eq!(ViewKind::Table.to_string(), "table");
    }
}
