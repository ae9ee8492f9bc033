//! Literal CREATE / DROP statements and the bounded reads run against generated tables.

use crate::config::AUDIT_COLUMN;
use crate::sql::{quoted, MappedColumn};

/// `CREATE TABLE "<name>" (<col>,<col>,...,"createddate" timestamp DEFAULT CURRENT_TIMESTAMP);`
/// Columns keep the order they are given in.
pub fn build_create(table: &str, columns: &[MappedColumn]) -> String {
    let mut parts: Vec<String> = columns.iter().map(MappedColumn::definition).collect();
    parts.push(format!("{} timestamp DEFAULT CURRENT_TIMESTAMP", quoted(AUDIT_COLUMN)));
    format!("CREATE TABLE {} ({});", quoted(table), parts.join(","))
}

/// Caller checks existence first.
pub fn build_drop(table: &str) -> String {
    format!("DROP TABLE {}", quoted(table))
}

pub fn build_row_check(table: &str) -> String {
    format!("SELECT 1 FROM {} LIMIT 1", quoted(table))
}

pub fn build_select_rows(table: &str, limit: u32) -> String {
    format!("SELECT * FROM {} LIMIT {}", quoted(table), limit)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ColumnSpec;
    use crate::sql::map_column;

    #[test]
    fn invoice_statement_is_exact() {
        let mut amount = ColumnSpec::new("Amount", "int");
        amount.is_nullable = true;
        let is_paid = ColumnSpec::new("IsPaid", "boolean");
        let cols = vec![map_column(&amount, None), map_column(&is_paid, None)];
        assert_eq!(
            build_create("Invoice", &cols),
            r#"CREATE TABLE "Invoice" ("Amount" integer,"IsPaid" boolean NOT NULL,"createddate" timestamp DEFAULT CURRENT_TIMESTAMP);"#
        );
    }

    #[test]
    fn empty_column_list_still_gets_audit_column() {
        assert_eq!(
            build_create("Empty", &[]),
            r#"CREATE TABLE "Empty" ("createddate" timestamp DEFAULT CURRENT_TIMESTAMP);"#
        );
    }

    #[test]
    fn column_order_is_preserved() {
        let cols: Vec<_> = ["z", "a", "m"]
            .iter()
            .map(|n| map_column(&ColumnSpec::new(*n, "int"), None))
            .collect();
        let sql = build_create("T", &cols);
        let z = sql.find("\"z\"").unwrap();
        let a = sql.find("\"a\"").unwrap();
        let m = sql.find("\"m\"").unwrap();
        assert!(z < a && a < m);
    }

    #[test]
    fn drop_and_row_queries() {
        assert_eq!(build_drop("Orders"), r#"DROP TABLE "Orders""#);
        assert_eq!(build_row_check("Orders"), r#"SELECT 1 FROM "Orders" LIMIT 1"#);
        assert_eq!(build_select_rows("Orders", 25), r#"SELECT * FROM "Orders" LIMIT 25"#);
    }
}
