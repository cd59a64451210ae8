// Per-result column metadata and the schema table derived from it.
use serde::Serialize;

use crate::core::catalog::{LogicalKind, RuntimeType};
use crate::core::error::{Error, ErrorKind};

/// Column size reported for every schema row; the stream carries no widths.
pub const UNKNOWN_COLUMN_SIZE: i64 = -1;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ColumnDescriptor {
    name: String,
    ordinal: usize,
    kind: LogicalKind,
}

impl ColumnDescriptor {
    pub fn new(name: impl Into<String>, ordinal: usize, kind: LogicalKind) -> Self {
        Self {
            name: name.into(),
            ordinal,
            kind,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ordinal(&self) -> usize {
        self.ordinal
    }

    pub fn kind(&self) -> LogicalKind {
        self.kind
    }

    pub fn runtime_type(&self) -> RuntimeType {
        self.kind.runtime_type()
    }
}

/// First column whose name matches `name` exactly.
pub fn find_ordinal(columns: &[ColumnDescriptor], name: &str) -> Result<usize, Error> {
    columns
        .iter()
        .position(|column| column.name == name)
        .ok_or_else(|| {
            Error::new(ErrorKind::IndexOutOfRange)
                .with_message(format!("no column named '{name}'"))
        })
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SchemaColumn {
    pub column_name: String,
    pub column_ordinal: usize,
    pub column_size: i64,
    pub data_type: &'static str,
    pub data_type_name: &'static str,
}

/// Read-only description of one result's columns.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SchemaTable {
    /// Always [`SCHEMA_TABLE_NAME`].
    pub table_name: &'static str,
    pub columns: Vec<SchemaColumn>,
}

pub const SCHEMA_TABLE_NAME: &str = "SchemaTable";

impl SchemaTable {
    pub fn from_columns(columns: &[ColumnDescriptor]) -> Self {
        Self {
            table_name: SCHEMA_TABLE_NAME,
            columns: columns
                .iter()
                .map(|column| SchemaColumn {
                    column_name: column.name.clone(),
                    column_ordinal: column.ordinal,
                    column_size: UNKNOWN_COLUMN_SIZE,
                    data_type: column.runtime_type().name(),
                    data_type_name: column.kind.name(),
                })
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::{find_ordinal, ColumnDescriptor, SchemaTable, UNKNOWN_COLUMN_SIZE};
    use crate::core::catalog::LogicalKind;
    use crate::core::error::ErrorKind;

    fn columns() -> Vec<ColumnDescriptor> {
        vec![
            ColumnDescriptor::new("id", 0, LogicalKind::Int64),
            ColumnDescriptor::new("name", 1, LogicalKind::Text),
            ColumnDescriptor::new("id", 2, LogicalKind::Guid),
        ]
    }

    #[test]
    fn lookup_returns_first_exact_match() {
        let columns = columns();
        assert_eq!(find_ordinal(&columns, "id").expect("ordinal"), 0);
        assert_eq!(find_ordinal(&columns, "name").expect("ordinal"), 1);
        let err = find_ordinal(&columns, "ID").expect_err("case sensitive");
        assert_eq!(err.kind(), ErrorKind::IndexOutOfRange);
        assert!(err.message().expect("message").contains("'ID'"));
    }

    #[test]
    fn schema_table_reports_unknown_sizes() {
        let table = SchemaTable::from_columns(&columns());
        assert_eq!(table.table_name, "SchemaTable");
        assert_eq!(table.len(), 3);
        let row = &table.columns[1];
        assert_eq!(row.column_name, "name");
        assert_eq!(row.column_ordinal, 1);
        assert_eq!(row.column_size, UNKNOWN_COLUMN_SIZE);
        assert_eq!(row.data_type, "alloc::string::String");
        assert_eq!(row.data_type_name, "Text");

        let json = serde_json::to_value(&table).expect("json");
        assert_eq!(json["table_name"], "SchemaTable");
        assert_eq!(json["columns"][2]["data_type_name"], "Guid");
    }
}
