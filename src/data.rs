use std::{
    borrow::Cow,
    fmt,
    hash::{Hash, Hasher},
};

use geo::Geometry;

use crate::geometry::crs::Crs;

/// A single attribute cell as read from a layer.
///
/// `Null` ("no value") is deliberately distinct from `Text("")`.
#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Text(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
}

impl Value {
    pub fn from_json(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Boolean(*b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Integer(i),
                None => n.as_f64().map(Value::Float).unwrap_or(Value::Null),
            },
            serde_json::Value::String(s) => Value::Text(s.clone()),
            other => Value::Text(other.to_string()),
        }
    }

    /// True for `Null` and for floating point NaN, which sources use as a
    /// missing-value marker.
    pub fn is_missing(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Float(f) => f.is_nan(),
            _ => false,
        }
    }

    /// Textual rendering, or `None` when the cell is missing.
    pub fn as_text(&self) -> Option<Cow<'_, str>> {
        match self {
            Value::Text(s) => Some(Cow::Borrowed(s.as_str())),
            Value::Integer(i) => Some(Cow::Owned(i.to_string())),
            Value::Float(f) if f.is_nan() => None,
            Value::Float(f) => Some(Cow::Owned(format_float(*f))),
            Value::Boolean(b) => Some(Cow::Owned(b.to_string())),
            Value::Null => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Coerces the cell into the nullable-text representation used for the
    /// canonical identity fields.
    pub fn into_nullable_text(self) -> Value {
        match self {
            Value::Text(s) => Value::Text(s),
            other => match other.as_text() {
                Some(text) => Value::Text(text.into_owned()),
                None => Value::Null,
            },
        }
    }
}

fn format_float(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{value:.1}")
    } else {
        value.to_string()
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Text(a), Value::Text(b)) => a == b,
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => float_bits(*a) == float_bits(*b),
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::Null => {}
            Value::Text(s) => s.hash(state),
            Value::Integer(i) => i.hash(state),
            Value::Float(f) => float_bits(*f).hash(state),
            Value::Boolean(b) => b.hash(state),
        }
    }
}

// All NaNs compare equal and -0.0 == 0.0, matching how duplicate detection
// treats missing and zero values.
fn float_bits(value: f64) -> u64 {
    if value.is_nan() {
        f64::NAN.to_bits()
    } else if value == 0.0 {
        0.0f64.to_bits()
    } else {
        value.to_bits()
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.as_text() {
            Some(text) => f.write_str(&text),
            None => f.write_str("<null>"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub values: Vec<Value>,
    pub geometry: Option<Geometry<f64>>,
}

impl Row {
    pub fn new(values: Vec<Value>, geometry: Option<Geometry<f64>>) -> Self {
        Self { values, geometry }
    }
}

/// In-memory attribute table with one geometry slot per row.
///
/// Column names never include the geometry column; it is carried separately
/// on each [`Row`].
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Row>,
    crs: Option<Crs>,
}

impl Table {
    pub fn new(columns: Vec<String>, crs: Option<Crs>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
            crs,
        }
    }

    pub fn with_rows(columns: Vec<String>, rows: Vec<Row>, crs: Option<Crs>) -> Self {
        Self { columns, rows, crs }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<Row> {
        self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn crs(&self) -> Option<&Crs> {
        self.crs.as_ref()
    }

    pub fn with_crs(mut self, crs: Option<Crs>) -> Table {
        self.crs = crs;
        self
    }

    pub fn push_row(&mut self, mut row: Row) {
        row.values.resize(self.columns.len(), Value::Null);
        self.rows.push(row);
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|column| column == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    pub fn value(&self, row: usize, column: usize) -> &Value {
        &self.rows[row].values[column]
    }

    /// Keeps the rows for which `keep` returns true, preserving order.
    pub fn retain_rows(self, mut keep: impl FnMut(&Row) -> bool) -> Table {
        let Table { columns, rows, crs } = self;
        let rows = rows.into_iter().filter(|row| keep(row)).collect();
        Table { columns, rows, crs }
    }

    /// Rewrites every geometry and records the CRS the result is expressed in.
    pub fn map_geometries<E>(
        self,
        crs: Option<Crs>,
        mut map: impl FnMut(Geometry<f64>) -> Result<Geometry<f64>, E>,
    ) -> Result<Table, E> {
        let mut rows = Vec::with_capacity(self.rows.len());
        for row in self.rows {
            let geometry = row.geometry.map(&mut map).transpose()?;
            rows.push(Row::new(row.values, geometry));
        }
        Ok(Table {
            columns: self.columns,
            rows,
            crs,
        })
    }

    pub fn rename_columns(mut self, renames: &[(usize, &str)]) -> Table {
        for (idx, name) in renames {
            if let Some(column) = self.columns.get_mut(*idx) {
                *column = name.to_string();
            }
        }
        self
    }

    /// Removes the columns whose names satisfy `drop`.
    pub fn drop_columns(self, mut drop: impl FnMut(&str) -> bool) -> Table {
        let keep: Vec<bool> = self.columns.iter().map(|column| !drop(column)).collect();
        let columns = self
            .columns
            .into_iter()
            .zip(&keep)
            .filter_map(|(column, keep)| keep.then_some(column))
            .collect();
        let rows = self
            .rows
            .into_iter()
            .map(|row| {
                let values = row
                    .values
                    .into_iter()
                    .zip(&keep)
                    .filter_map(|(value, keep)| keep.then_some(value))
                    .collect();
                Row::new(values, row.geometry)
            })
            .collect();
        Table {
            columns,
            rows,
            crs: self.crs,
        }
    }

    pub fn map_column(mut self, idx: usize, mut map: impl FnMut(Value) -> Value) -> Table {
        for row in &mut self.rows {
            let cell = std::mem::take(&mut row.values[idx]);
            row.values[idx] = map(cell);
        }
        self
    }

    /// Appends a column, or overwrites it when a column of that name exists.
    pub fn set_column(mut self, name: &str, mut value_for: impl FnMut(&Row) -> Value) -> Table {
        match self.column_index(name) {
            Some(idx) => {
                for row in &mut self.rows {
                    let value = value_for(row);
                    row.values[idx] = value;
                }
            }
            None => {
                self.columns.push(name.to_string());
                for row in &mut self.rows {
                    let value = value_for(row);
                    row.values.push(value);
                }
            }
        }
        self
    }
}
