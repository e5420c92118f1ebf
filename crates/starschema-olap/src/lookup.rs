use crate::error::{OlapError, OlapResult};
use crate::value::Value;
use starschema_columnar::ColumnarTable;
use std::collections::HashMap;

/// What to do when a dimension key appears more than once.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DuplicateKeyPolicy {
    /// Fail the build with [`OlapError::DuplicateKey`].
    #[default]
    Reject,
    /// Keep the attributes of the last row carrying the key.
    LastWins,
}

/// Hash index from a dimension's surrogate key to a tuple of attribute values.
///
/// Built once per (dimension, key column, attribute set) and read-only afterwards, so it can be
/// shared across threads for a partitioned fact scan.
#[derive(Clone, Debug)]
pub struct LookupIndex {
    dimension: String,
    key_column: String,
    attribute_names: Vec<String>,
    entries: HashMap<Value, Box<[Value]>>,
    overwritten_keys: usize,
}

impl LookupIndex {
    pub fn build(
        dimension: &ColumnarTable,
        key_column: &str,
        attribute_columns: &[&str],
    ) -> OlapResult<Self> {
        Self::build_with_policy(
            dimension,
            key_column,
            attribute_columns,
            DuplicateKeyPolicy::Reject,
        )
    }

    pub fn build_with_policy(
        dimension: &ColumnarTable,
        key_column: &str,
        attribute_columns: &[&str],
        policy: DuplicateKeyPolicy,
    ) -> OlapResult<Self> {
        let keys = dimension.column(key_column)?;
        let attributes = attribute_columns
            .iter()
            .map(|name| dimension.column(name))
            .collect::<Result<Vec<_>, _>>()?;

        let mut entries = HashMap::with_capacity(dimension.row_count());
        let mut overwritten_keys = 0usize;
        for row in 0..dimension.row_count() {
            let key = Value::key_from(keys.get(row));
            if key.is_null() {
                return Err(OlapError::NullKey {
                    table: dimension.name().to_string(),
                    column: key_column.to_string(),
                    row,
                });
            }

            let tuple: Box<[Value]> = attributes
                .iter()
                .map(|column| Value::from(column.get(row)))
                .collect();

            if entries.insert(key.clone(), tuple).is_some() {
                match policy {
                    DuplicateKeyPolicy::Reject => {
                        return Err(OlapError::DuplicateKey {
                            table: dimension.name().to_string(),
                            column: key_column.to_string(),
                            key,
                        });
                    }
                    DuplicateKeyPolicy::LastWins => overwritten_keys += 1,
                }
            }
        }

        if overwritten_keys > 0 {
            log::warn!(
                "{}[{}]: {} duplicate keys overwritten by later rows",
                dimension.name(),
                key_column,
                overwritten_keys
            );
        }
        log::debug!(
            "built lookup index on {}[{}] with {} entries and {} attributes",
            dimension.name(),
            key_column,
            entries.len(),
            attributes.len()
        );

        Ok(Self {
            dimension: dimension.name().to_string(),
            key_column: key_column.to_string(),
            attribute_names: attribute_columns.iter().map(|s| s.to_string()).collect(),
            entries,
            overwritten_keys,
        })
    }

    /// Attribute tuple for `key`, in the order the attributes were requested.
    pub fn get(&self, key: &Value) -> Option<&[Value]> {
        self.entries.get(key).map(|tuple| &tuple[..])
    }

    pub fn contains_key(&self, key: &Value) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn dimension(&self) -> &str {
        &self.dimension
    }

    pub fn key_column(&self) -> &str {
        &self.key_column
    }

    pub fn attribute_names(&self) -> &[String] {
        &self.attribute_names
    }

    /// Keys replaced under [`DuplicateKeyPolicy::LastWins`]. Always zero for `Reject`.
    pub fn overwritten_keys(&self) -> usize {
        self.overwritten_keys
    }
}
