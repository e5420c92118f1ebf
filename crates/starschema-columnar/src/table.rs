#![forbid(unsafe_code)]

use crate::bitmap::BitVec;
use crate::error::{ColumnarError, ColumnarResult};
use crate::stats::ColumnStats;
use crate::types::{ColumnType, Value};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableOptions {
    /// Rows per column chunk. Every column of a table is chunked at the same boundaries.
    pub page_size_rows: usize,
}

impl Default for TableOptions {
    fn default() -> Self {
        Self {
            page_size_rows: 65_536,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ColumnSchema {
    pub name: String,
    pub column_type: ColumnType,
}

impl ColumnSchema {
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
        }
    }
}

/// One page of a column. Validity is `None` when every slot in the page is valid.
#[derive(Clone, Debug)]
enum Chunk {
    Int {
        values: Vec<i64>,
        validity: Option<BitVec>,
    },
    Float {
        values: Vec<f64>,
        validity: Option<BitVec>,
    },
    Bool {
        values: BitVec,
        validity: Option<BitVec>,
    },
    Dict {
        indices: Vec<u32>,
        validity: Option<BitVec>,
    },
}

impl Chunk {
    fn len(&self) -> usize {
        match self {
            Chunk::Int { values, .. } => values.len(),
            Chunk::Float { values, .. } => values.len(),
            Chunk::Bool { values, .. } => values.len(),
            Chunk::Dict { indices, .. } => indices.len(),
        }
    }

    fn is_valid(&self, idx: usize) -> bool {
        if idx >= self.len() {
            return false;
        }
        let validity = match self {
            Chunk::Int { validity, .. }
            | Chunk::Float { validity, .. }
            | Chunk::Bool { validity, .. }
            | Chunk::Dict { validity, .. } => validity,
        };
        validity.as_ref().map_or(true, |v| v.get(idx))
    }

    fn get(&self, idx: usize, dictionary: &[Arc<str>]) -> Value {
        if !self.is_valid(idx) {
            return Value::Null;
        }
        match self {
            Chunk::Int { values, .. } => Value::Int(values[idx]),
            Chunk::Float { values, .. } => Value::Number(values[idx]),
            Chunk::Bool { values, .. } => Value::Boolean(values.get(idx)),
            Chunk::Dict { indices, .. } => dictionary
                .get(indices[idx] as usize)
                .map(|s| Value::String(s.clone()))
                .unwrap_or(Value::Null),
        }
    }

    fn get_f64(&self, idx: usize) -> Option<f64> {
        if !self.is_valid(idx) {
            return None;
        }
        match self {
            Chunk::Int { values, .. } => Some(values[idx] as f64),
            Chunk::Float { values, .. } => Some(values[idx]),
            Chunk::Bool { .. } | Chunk::Dict { .. } => None,
        }
    }

    fn get_i64(&self, idx: usize) -> Option<i64> {
        if !self.is_valid(idx) {
            return None;
        }
        match self {
            Chunk::Int { values, .. } => Some(values[idx]),
            _ => None,
        }
    }
}

#[derive(Clone, Debug)]
pub(crate) struct Column {
    schema: ColumnSchema,
    chunks: Vec<Chunk>,
    stats: ColumnStats,
    dictionary: Arc<Vec<Arc<str>>>,
    len: usize,
}

#[derive(Clone, Debug)]
pub struct ColumnarTable {
    name: String,
    schema: Vec<ColumnSchema>,
    columns: Vec<Column>,
    column_index: HashMap<String, usize>,
    rows: usize,
    options: TableOptions,
}

impl ColumnarTable {
    /// Build a table from whole columns. Every column must carry the same number of values.
    pub fn from_columns(
        name: impl Into<String>,
        columns: Vec<(ColumnSchema, Vec<Value>)>,
        options: TableOptions,
    ) -> ColumnarResult<Self> {
        let name = name.into();
        let expected = columns.first().map(|(_, values)| values.len()).unwrap_or(0);
        for (schema, values) in &columns {
            if values.len() != expected {
                return Err(ColumnarError::LengthMismatch {
                    table: name,
                    column: schema.name.clone(),
                    expected,
                    actual: values.len(),
                });
            }
        }

        let schema: Vec<ColumnSchema> = columns.iter().map(|(s, _)| s.clone()).collect();
        let mut builder = ColumnarTableBuilder::new(name, schema, options)?;
        for (col_idx, (_, values)) in columns.into_iter().enumerate() {
            for value in values {
                builder.builders[col_idx].push(&value);
            }
        }
        builder.rows = expected;
        Ok(builder.finalize())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schema(&self) -> &[ColumnSchema] {
        &self.schema
    }

    pub fn row_count(&self) -> usize {
        self.rows
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn options(&self) -> TableOptions {
        self.options
    }

    /// Case-sensitive position of a column in the schema.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.column_index.get(name).copied()
    }

    /// Resolve a column by name into a chunk-transparent view.
    pub fn column(&self, name: &str) -> ColumnarResult<ColumnView<'_>> {
        let idx = self
            .column_index(name)
            .ok_or_else(|| ColumnarError::ColumnNotFound {
                table: self.name.clone(),
                column: name.to_string(),
            })?;
        Ok(self.view(idx))
    }

    pub fn column_at(&self, idx: usize) -> Option<ColumnView<'_>> {
        (idx < self.columns.len()).then(|| self.view(idx))
    }

    pub fn get_cell(&self, row: usize, col: usize) -> Value {
        self.column_at(col)
            .map(|view| view.get(row))
            .unwrap_or(Value::Null)
    }

    fn view(&self, idx: usize) -> ColumnView<'_> {
        ColumnView {
            table: &self.name,
            column: &self.columns[idx],
            page_size: self.options.page_size_rows,
        }
    }
}

/// Read-only view over one column that hides chunk boundaries.
///
/// Every read is addressed by logical row index. Nothing is copied unless
/// [`ColumnView::to_values`] is called.
#[derive(Clone, Copy, Debug)]
pub struct ColumnView<'a> {
    table: &'a str,
    column: &'a Column,
    page_size: usize,
}

impl<'a> ColumnView<'a> {
    pub fn table_name(&self) -> &'a str {
        self.table
    }

    pub fn name(&self) -> &'a str {
        &self.column.schema.name
    }

    pub fn column_type(&self) -> ColumnType {
        self.column.schema.column_type
    }

    pub fn len(&self) -> usize {
        self.column.len
    }

    pub fn is_empty(&self) -> bool {
        self.column.len == 0
    }

    pub fn stats(&self) -> &'a ColumnStats {
        &self.column.stats
    }

    pub fn null_count(&self) -> usize {
        self.column.stats.null_count as usize
    }

    fn locate(&self, row: usize) -> Option<(&'a Chunk, usize)> {
        if row >= self.column.len {
            return None;
        }
        let chunk = self.column.chunks.get(row / self.page_size)?;
        Some((chunk, row % self.page_size))
    }

    pub fn is_valid(&self, row: usize) -> bool {
        self.locate(row)
            .is_some_and(|(chunk, idx)| chunk.is_valid(idx))
    }

    /// Read one slot. Nulls and out-of-range rows read as [`Value::Null`].
    pub fn get(&self, row: usize) -> Value {
        match self.locate(row) {
            Some((chunk, idx)) => chunk.get(idx, &self.column.dictionary),
            None => Value::Null,
        }
    }

    /// Numeric read; integers widen, non-numeric columns and nulls are `None`.
    pub fn get_f64(&self, row: usize) -> Option<f64> {
        let (chunk, idx) = self.locate(row)?;
        chunk.get_f64(idx)
    }

    pub fn get_i64(&self, row: usize) -> Option<i64> {
        let (chunk, idx) = self.locate(row)?;
        chunk.get_i64(idx)
    }

    pub fn iter(&self) -> impl Iterator<Item = Value> + 'a {
        let dictionary = self.column.dictionary.as_slice();
        self.column
            .chunks
            .iter()
            .flat_map(move |chunk| (0..chunk.len()).map(move |idx| chunk.get(idx, dictionary)))
    }

    pub fn iter_f64(&self) -> impl Iterator<Item = Option<f64>> + 'a {
        self.column
            .chunks
            .iter()
            .flat_map(|chunk| (0..chunk.len()).map(move |idx| chunk.get_f64(idx)))
    }

    /// Concatenate every chunk into one owned sequence.
    pub fn to_values(&self) -> Vec<Value> {
        let mut out = Vec::with_capacity(self.len());
        out.extend(self.iter());
        out
    }
}

/// Row-wise builder for [`ColumnarTable`].
pub struct ColumnarTableBuilder {
    name: String,
    schema: Vec<ColumnSchema>,
    options: TableOptions,
    builders: Vec<ColumnBuilder>,
    rows: usize,
}

impl ColumnarTableBuilder {
    pub fn new(
        name: impl Into<String>,
        schema: Vec<ColumnSchema>,
        options: TableOptions,
    ) -> ColumnarResult<Self> {
        let name = name.into();
        let mut seen = HashMap::with_capacity(schema.len());
        for (idx, col) in schema.iter().enumerate() {
            if seen.insert(col.name.as_str(), idx).is_some() {
                return Err(ColumnarError::DuplicateColumn {
                    table: name,
                    column: col.name.clone(),
                });
            }
        }

        let page_size = options.page_size_rows.max(1);
        let builders = schema
            .iter()
            .cloned()
            .map(|col| ColumnBuilder::new(col, page_size))
            .collect();

        Ok(Self {
            name,
            schema,
            options: TableOptions {
                page_size_rows: page_size,
            },
            builders,
            rows: 0,
        })
    }

    pub fn row_count(&self) -> usize {
        self.rows
    }

    pub fn append_row(&mut self, row: &[Value]) -> ColumnarResult<()> {
        if row.len() != self.builders.len() {
            return Err(ColumnarError::RowLengthMismatch {
                table: self.name.clone(),
                expected: self.builders.len(),
                actual: row.len(),
            });
        }

        for (builder, value) in self.builders.iter_mut().zip(row.iter()) {
            builder.push(value);
        }
        self.rows += 1;
        Ok(())
    }

    pub fn finalize(self) -> ColumnarTable {
        let columns: Vec<Column> = self.builders.into_iter().map(ColumnBuilder::finish).collect();
        let column_index = self
            .schema
            .iter()
            .enumerate()
            .map(|(idx, c)| (c.name.clone(), idx))
            .collect();

        log::debug!(
            "finalized columnar table {}: {} rows, {} columns",
            self.name,
            self.rows,
            columns.len()
        );

        ColumnarTable {
            name: self.name,
            schema: self.schema,
            columns,
            column_index,
            rows: self.rows,
            options: self.options,
        }
    }
}

enum Page {
    Int(Vec<i64>),
    Float(Vec<f64>),
    Bool(BitVec),
    Dict(Vec<u32>),
}

struct ColumnBuilder {
    schema: ColumnSchema,
    page_size: usize,
    page: Page,
    validity: BitVec,
    chunks: Vec<Chunk>,
    dictionary: Vec<Arc<str>>,
    dict_map: HashMap<Arc<str>, u32>,
    stats: ColumnStats,
    len: usize,
}

impl ColumnBuilder {
    fn new(schema: ColumnSchema, page_size: usize) -> Self {
        Self {
            page: Self::empty_page(schema.column_type, page_size),
            stats: ColumnStats {
                column_type: schema.column_type,
                ..ColumnStats::default()
            },
            schema,
            page_size,
            validity: BitVec::with_capacity_bits(page_size),
            chunks: Vec::new(),
            dictionary: Vec::new(),
            dict_map: HashMap::new(),
            len: 0,
        }
    }

    fn empty_page(column_type: ColumnType, page_size: usize) -> Page {
        match column_type {
            ColumnType::Int64 => Page::Int(Vec::with_capacity(page_size)),
            ColumnType::Float64 => Page::Float(Vec::with_capacity(page_size)),
            ColumnType::Boolean => Page::Bool(BitVec::with_capacity_bits(page_size)),
            ColumnType::String => Page::Dict(Vec::with_capacity(page_size)),
        }
    }

    fn intern(&mut self, s: &Arc<str>) -> u32 {
        if let Some(idx) = self.dict_map.get(s.as_ref()) {
            return *idx;
        }

        let idx = self.dictionary.len() as u32;
        self.dictionary.push(s.clone());
        self.dict_map.insert(s.clone(), idx);
        idx
    }

    /// Coerce a value into the column's type. `None` means the slot is stored as null.
    fn coerce(column_type: ColumnType, value: &Value) -> Option<Value> {
        match (column_type, value) {
            (ColumnType::Int64, Value::Int(_))
            | (ColumnType::Float64, Value::Number(_))
            | (ColumnType::String, Value::String(_))
            | (ColumnType::Boolean, Value::Boolean(_)) => Some(value.clone()),
            (ColumnType::Int64, Value::Number(v))
                if v.is_finite() && v.fract() == 0.0 && v.abs() < i64::MAX as f64 =>
            {
                Some(Value::Int(*v as i64))
            }
            (ColumnType::Float64, Value::Int(v)) => Some(Value::Number(*v as f64)),
            _ => None,
        }
    }

    /// Append one slot. A value that does not fit the column type is stored as null.
    fn push(&mut self, value: &Value) {
        match Self::coerce(self.schema.column_type, value) {
            Some(value) => {
                let dict_idx = match &value {
                    Value::String(s) => self.intern(s),
                    _ => 0,
                };
                match (&mut self.page, &value) {
                    (Page::Int(page), Value::Int(v)) => page.push(*v),
                    (Page::Float(page), Value::Number(v)) => page.push(*v),
                    (Page::Bool(page), Value::Boolean(v)) => page.push(*v),
                    (Page::Dict(page), _) => page.push(dict_idx),
                    _ => unreachable!("coerce returns values matching the column type"),
                }
                self.validity.push(true);
                self.stats.observe(&value);
            }
            None => {
                match &mut self.page {
                    Page::Int(page) => page.push(0),
                    Page::Float(page) => page.push(0.0),
                    Page::Bool(page) => page.push(false),
                    Page::Dict(page) => page.push(0),
                }
                self.validity.push(false);
                self.stats.null_count += 1;
            }
        }

        self.len += 1;
        if self.validity.len() == self.page_size {
            self.flush();
        }
    }

    fn flush(&mut self) {
        if self.validity.is_empty() {
            return;
        }

        let validity = std::mem::replace(
            &mut self.validity,
            BitVec::with_capacity_bits(self.page_size),
        );
        let validity = (!validity.all_true()).then_some(validity);
        let page = std::mem::replace(
            &mut self.page,
            Self::empty_page(self.schema.column_type, self.page_size),
        );

        self.chunks.push(match page {
            Page::Int(values) => Chunk::Int { values, validity },
            Page::Float(values) => Chunk::Float { values, validity },
            Page::Bool(values) => Chunk::Bool { values, validity },
            Page::Dict(indices) => Chunk::Dict { indices, validity },
        });
    }

    fn finish(mut self) -> Column {
        self.flush();
        Column {
            schema: self.schema,
            chunks: self.chunks,
            stats: self.stats,
            dictionary: Arc::new(self.dictionary),
            len: self.len,
        }
    }
}
