//! Table shapes known to the backup and their line encoding.
//!
//! Every supported table has a fixed column layout. Rows are decoded positionally from a
//! `SELECT *` result and rendered as one comma-separated, newline-terminated line. Values are
//! written verbatim, without quoting.

use std::fmt;

use sqlx::Row;
use sqlx::mysql::MySqlRow;

use crate::backup_error;
use crate::error::{BackupResult, ErrorKind};

/// Closed set of table shapes the backup can encode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TableKind {
    Users,
    Sales,
}

impl TableKind {
    /// Resolves a configured table name to its shape.
    pub fn from_name(name: &str) -> BackupResult<Self> {
        match name {
            "users" => Ok(TableKind::Users),
            "sales" => Ok(TableKind::Sales),
            other => Err(backup_error!(
                ErrorKind::UnknownTable,
                "Unknown table shape",
                format!("table `{other}` has no known column layout")
            )),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            TableKind::Users => "users",
            TableKind::Sales => "sales",
        }
    }

    /// Parameterized page query, binding `LIMIT` then `OFFSET`.
    pub fn select_page_sql(&self) -> &'static str {
        match self {
            TableKind::Users => "SELECT * FROM `users` LIMIT ? OFFSET ?",
            TableKind::Sales => "SELECT * FROM `sales` LIMIT ? OFFSET ?",
        }
    }

    /// Decodes a MySQL row into the record of this shape.
    pub fn decode_row(&self, row: &MySqlRow) -> BackupResult<TableRecord> {
        let record = match self {
            TableKind::Users => TableRecord::User(UserRecord {
                user_id: row.try_get(0)?,
                name: row.try_get(1)?,
            }),
            TableKind::Sales => TableRecord::Sale(SaleRecord {
                order_id: row.try_get(0)?,
                user_id: row.try_get(1)?,
                order_amount: row.try_get(2)?,
            }),
        };

        Ok(record)
    }
}

impl fmt::Display for TableKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UserRecord {
    pub user_id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SaleRecord {
    pub order_id: i64,
    pub user_id: i64,
    pub order_amount: f64,
}

/// A decoded row of any supported table.
#[derive(Debug, Clone, PartialEq)]
pub enum TableRecord {
    User(UserRecord),
    Sale(SaleRecord),
}

impl TableRecord {
    /// Shape this record belongs to.
    pub fn kind(&self) -> TableKind {
        match self {
            TableRecord::User(_) => TableKind::Users,
            TableRecord::Sale(_) => TableKind::Sales,
        }
    }

    /// Renders the record as a single newline-terminated line.
    pub fn to_line(&self) -> String {
        match self {
            TableRecord::User(user) => format!("{},{}\n", user.user_id, user.name),
            TableRecord::Sale(sale) => format!(
                "{},{},{:.2}\n",
                sale.order_id, sale.user_id, sale.order_amount
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_known_tables() {
        assert_eq!(TableKind::from_name("users").unwrap(), TableKind::Users);
        assert_eq!(TableKind::from_name("sales").unwrap(), TableKind::Sales);
    }

    #[test]
    fn rejects_unknown_tables() {
        let err = TableKind::from_name("orders").unwrap_err();

        assert_eq!(err.kind(), ErrorKind::UnknownTable);
        assert!(err.detail().unwrap().contains("orders"));
    }

    #[test]
    fn renders_users_line() {
        let record = TableRecord::User(UserRecord {
            user_id: 7,
            name: "Somchai".to_string(),
        });

        assert_eq!(record.to_line(), "7,Somchai\n");
        assert_eq!(record.kind(), TableKind::Users);
    }

    #[test]
    fn renders_sales_amount_with_two_decimals() {
        let record = TableRecord::Sale(SaleRecord {
            order_id: 1,
            user_id: 7,
            order_amount: 12.5,
        });

        assert_eq!(record.to_line(), "1,7,12.50\n");
    }

    #[test]
    fn select_binds_limit_before_offset() {
        assert_eq!(
            TableKind::Sales.select_page_sql(),
            "SELECT * FROM `sales` LIMIT ? OFFSET ?"
        );
    }
}
