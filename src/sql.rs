use std::str::FromStr;

use sqlparser::ast::{self, Expr, FromTable, ObjectNamePart, SetExpr, Statement, TableFactor, TableObject, Value, ValueWithSpan};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;
use thiserror::Error;

use crate::model::*;

/// Parsed command from SQL input.
#[derive(Debug, PartialEq)]
pub enum Command {
    InsertAppointments(Vec<Appointment>),
    InsertBlocks(Vec<Block>),
    InsertBookingItems(Vec<BookingItem>),
    SetStatus {
        kind: ConflictKind,
        id: String,
        status: Status,
    },
    Delete {
        kind: ConflictKind,
        id: String,
    },
    SelectAppointments {
        store_id: String,
    },
    SelectBlocks {
        store_id: String,
    },
    SelectBookingItems(ItemFilter),
    SelectConflicts(ConflictQuery),
}

#[derive(Debug, PartialEq)]
pub enum ItemFilter {
    Store(String),
    Appointment(String),
}

/// Parse exactly one statement.
pub fn parse_sql(sql: &str) -> Result<Command, SqlError> {
    let mut commands = parse_script(sql)?;
    if commands.len() > 1 {
        return Err(SqlError::Unsupported("more than one statement".into()));
    }
    Ok(commands.remove(0))
}

/// Parse a `;`-separated script, as sent over the simple query protocol.
pub fn parse_script(sql: &str) -> Result<Vec<Command>, SqlError> {
    let dialect = PostgreSqlDialect {};
    let stmts = Parser::parse_sql(&dialect, sql).map_err(|e| SqlError::Parse(e.to_string()))?;
    if stmts.is_empty() {
        return Err(SqlError::Empty);
    }
    stmts.iter().map(parse_statement).collect()
}

fn parse_statement(stmt: &Statement) -> Result<Command, SqlError> {
    match stmt {
        Statement::Insert(insert) => parse_insert(insert),
        Statement::Delete(delete) => parse_delete(delete),
        Statement::Query(query) => parse_select(query),
        other => Err(SqlError::Unsupported(format!("{other}"))),
    }
}

/// Table name for each record kind.
fn kind_table(table: &str) -> Option<ConflictKind> {
    match table {
        "appointments" => Some(ConflictKind::Appointment),
        "blocks" => Some(ConflictKind::Block),
        "booking_items" => Some(ConflictKind::BookingItem),
        _ => None,
    }
}

fn parse_insert(insert: &ast::Insert) -> Result<Command, SqlError> {
    let table = insert_table_name(insert)?;
    let rows = extract_insert_rows(insert)?;

    let row_err = |i: usize| move |e: SqlError| SqlError::Parse(format!("row {i}: {e}"));
    match table.as_str() {
        "appointments" => rows
            .iter()
            .enumerate()
            .map(|(i, row)| parse_appointment_row(row).map_err(row_err(i)))
            .collect::<Result<Vec<_>, _>>()
            .map(Command::InsertAppointments),
        "blocks" => rows
            .iter()
            .enumerate()
            .map(|(i, row)| parse_block_row(row).map_err(row_err(i)))
            .collect::<Result<Vec<_>, _>>()
            .map(Command::InsertBlocks),
        "booking_items" => rows
            .iter()
            .enumerate()
            .map(|(i, row)| parse_booking_item_row(row).map_err(row_err(i)))
            .collect::<Result<Vec<_>, _>>()
            .map(Command::InsertBookingItems),
        "status_changes" => {
            let [row] = rows.as_slice() else {
                return Err(SqlError::Unsupported("multi-row status change".into()));
            };
            if row.len() < 3 {
                return Err(SqlError::WrongArity("status_changes", 3, row.len()));
            }
            let kind_name = parse_string(&row[0])?;
            let kind = match kind_name.as_str() {
                "appointment" => ConflictKind::Appointment,
                "booking_item" => ConflictKind::BookingItem,
                _ => return Err(SqlError::Parse(format!("status does not apply to {kind_name}"))),
            };
            Ok(Command::SetStatus {
                kind,
                id: parse_string(&row[1])?,
                status: parse_status(&row[2])?,
            })
        }
        _ => Err(SqlError::UnknownTable(table)),
    }
}

// (id, store_id, staff_id, resource_id, scheduled_at, duration_minutes?, status?)
fn parse_appointment_row(values: &[Expr]) -> Result<Appointment, SqlError> {
    if values.len() < 5 {
        return Err(SqlError::WrongArity("appointments", 5, values.len()));
    }
    Ok(Appointment {
        id: parse_string(&values[0])?,
        store_id: parse_string(&values[1])?,
        staff_id: parse_string_or_null(&values[2])?,
        resource_id: parse_string_or_null(&values[3])?,
        scheduled_at: parse_timestamp_expr(&values[4])?,
        duration_minutes: match values.get(5) {
            Some(expr) => parse_i64_or_null(expr)?,
            None => None,
        },
        status: match values.get(6) {
            Some(expr) => parse_status(expr)?,
            None => Status::Confirmed,
        },
    })
}

// (id, store_id, staff_id, resource_id, start_at, end_at, reason?)
fn parse_block_row(values: &[Expr]) -> Result<Block, SqlError> {
    if values.len() < 6 {
        return Err(SqlError::WrongArity("blocks", 6, values.len()));
    }
    Ok(Block {
        id: parse_string(&values[0])?,
        store_id: parse_string(&values[1])?,
        staff_id: parse_string_or_null(&values[2])?,
        resource_id: parse_string_or_null(&values[3])?,
        span: Span {
            start: parse_timestamp_expr(&values[4])?,
            end: parse_timestamp_expr(&values[5])?,
        },
        reason: match values.get(6) {
            Some(expr) => parse_string_or_null(expr)?,
            None => None,
        },
    })
}

// (id, store_id, appointment_id, staff_id, resource_id, start_at, end_at, status?)
fn parse_booking_item_row(values: &[Expr]) -> Result<BookingItem, SqlError> {
    if values.len() < 7 {
        return Err(SqlError::WrongArity("booking_items", 7, values.len()));
    }
    Ok(BookingItem {
        id: parse_string(&values[0])?,
        store_id: parse_string(&values[1])?,
        appointment_id: parse_string(&values[2])?,
        staff_id: parse_string_or_null(&values[3])?,
        resource_id: parse_string_or_null(&values[4])?,
        span: Span {
            start: parse_timestamp_expr(&values[5])?,
            end: parse_timestamp_expr(&values[6])?,
        },
        status: match values.get(7) {
            Some(expr) => parse_status(expr)?,
            None => Status::Confirmed,
        },
    })
}

fn parse_delete(delete: &ast::Delete) -> Result<Command, SqlError> {
    let table = delete_table_name(delete)?;
    let id = extract_where_id(&delete.selection)?;
    let kind = kind_table(&table).ok_or(SqlError::UnknownTable(table))?;
    Ok(Command::Delete { kind, id })
}

fn parse_select(query: &ast::Query) -> Result<Command, SqlError> {
    let select = match query.body.as_ref() {
        SetExpr::Select(s) => s,
        _ => return Err(SqlError::Unsupported("non-SELECT query".into())),
    };

    if select.from.is_empty() {
        return Err(SqlError::Parse("SELECT without FROM".into()));
    }
    let table = table_factor_name(&select.from[0].relation)?;

    let mut filters = Filters::default();
    if let Some(selection) = &select.selection {
        collect_filters(selection, &mut filters)?;
    }

    let command = match table.as_str() {
        "appointments" => Ok(Command::SelectAppointments {
            store_id: filters.take_string("store_id")?,
        }),
        "blocks" => Ok(Command::SelectBlocks {
            store_id: filters.take_string("store_id")?,
        }),
        "booking_items" => {
            if filters.has("appointment_id") {
                Ok(Command::SelectBookingItems(ItemFilter::Appointment(
                    filters.take_string("appointment_id")?,
                )))
            } else {
                Ok(Command::SelectBookingItems(ItemFilter::Store(
                    filters.take_string("store_id")?,
                )))
            }
        }
        "conflicts" => {
            let store_id = filters.take_string("store_id")?;
            let start = filters.take_timestamp("start_at")?;
            let end = filters.take_timestamp("end_at")?;
            Ok(Command::SelectConflicts(ConflictQuery {
                store_id,
                staff_id: filters.take_optional_string("staff_id")?,
                resource_id: filters.take_optional_string("resource_id")?,
                window: Span { start, end },
                exclude_appointment_id: filters.take_optional_string("exclude_appointment_id")?,
            }))
        }
        _ => Err(SqlError::UnknownTable(table)),
    }?;
    filters.ensure_consumed()?;
    Ok(command)
}

/// `column = value` pairs from a WHERE clause joined by AND.
#[derive(Default)]
struct Filters(Vec<(String, Expr)>);

impl Filters {
    fn has(&self, column: &str) -> bool {
        self.0.iter().any(|(c, _)| c == column)
    }

    fn take(&mut self, column: &'static str) -> Option<Expr> {
        let pos = self.0.iter().position(|(c, _)| c == column)?;
        Some(self.0.swap_remove(pos).1)
    }

    fn take_string(&mut self, column: &'static str) -> Result<String, SqlError> {
        let expr = self.take(column).ok_or(SqlError::MissingFilter(column))?;
        parse_string(&expr)
    }

    fn take_optional_string(&mut self, column: &'static str) -> Result<Option<String>, SqlError> {
        match self.take(column) {
            Some(expr) => parse_string_or_null(&expr),
            None => Ok(None),
        }
    }

    fn take_timestamp(&mut self, column: &'static str) -> Result<Ms, SqlError> {
        let expr = self.take(column).ok_or(SqlError::MissingFilter(column))?;
        parse_timestamp_expr(&expr)
    }

    /// Every filter must have been taken; a leftover column is a typo or an
    /// unsupported filter, never something to drop.
    fn ensure_consumed(&self) -> Result<(), SqlError> {
        match self.0.first() {
            Some((column, _)) => Err(SqlError::UnknownFilter(column.clone())),
            None => Ok(()),
        }
    }
}

fn collect_filters(expr: &Expr, filters: &mut Filters) -> Result<(), SqlError> {
    match expr {
        Expr::BinaryOp {
            left,
            op: ast::BinaryOperator::And,
            right,
        } => {
            collect_filters(left, filters)?;
            collect_filters(right, filters)?;
        }
        Expr::BinaryOp {
            left,
            op: ast::BinaryOperator::Eq,
            right,
        } => {
            let column = expr_column_name(left)
                .ok_or_else(|| SqlError::Parse(format!("expected column, got {left}")))?;
            filters.0.push((column, right.as_ref().clone()));
        }
        Expr::Nested(inner) => collect_filters(inner, filters)?,
        other => {
            return Err(SqlError::Unsupported(format!(
                "filter {other}: only `column = value` joined by AND"
            )));
        }
    }
    Ok(())
}

// ── Helpers ───────────────────────────────────────────────────

fn object_name_last(name: &ast::ObjectName) -> Option<String> {
    name.0.last().and_then(|part| match part {
        ObjectNamePart::Identifier(ident) => Some(ident.value.to_lowercase()),
        _ => None,
    })
}

fn insert_table_name(insert: &ast::Insert) -> Result<String, SqlError> {
    match &insert.table {
        TableObject::TableName(name) => {
            object_name_last(name).ok_or_else(|| SqlError::Parse("empty table name".into()))
        }
        _ => Err(SqlError::Parse("unsupported table object in INSERT".into())),
    }
}

fn delete_table_name(delete: &ast::Delete) -> Result<String, SqlError> {
    let tables_with_joins = match &delete.from {
        FromTable::WithFromKeyword(t) | FromTable::WithoutKeyword(t) => t,
    };
    match tables_with_joins.first() {
        Some(first) => table_factor_name(&first.relation),
        None => Err(SqlError::Parse("DELETE without table".into())),
    }
}

fn table_factor_name(tf: &TableFactor) -> Result<String, SqlError> {
    match tf {
        TableFactor::Table { name, .. } => {
            object_name_last(name).ok_or_else(|| SqlError::Parse("empty table name".into()))
        }
        _ => Err(SqlError::Parse("complex table expression".into())),
    }
}

fn extract_insert_rows(insert: &ast::Insert) -> Result<Vec<Vec<Expr>>, SqlError> {
    let body = insert
        .source
        .as_ref()
        .ok_or(SqlError::Parse("no VALUES".into()))?;
    match body.body.as_ref() {
        SetExpr::Values(values) => {
            if values.rows.is_empty() {
                return Err(SqlError::Parse("empty VALUES".into()));
            }
            Ok(values.rows.clone())
        }
        _ => Err(SqlError::Parse("expected VALUES".into())),
    }
}

fn extract_where_id(selection: &Option<Expr>) -> Result<String, SqlError> {
    match selection {
        Some(Expr::BinaryOp {
            left,
            op: ast::BinaryOperator::Eq,
            right,
        }) if expr_column_name(left).as_deref() == Some("id") => parse_string(right),
        _ => Err(SqlError::MissingFilter("id")),
    }
}

fn expr_column_name(expr: &Expr) -> Option<String> {
    match expr {
        Expr::Identifier(ident) => Some(ident.value.to_lowercase()),
        Expr::CompoundIdentifier(parts) => parts.last().map(|i| i.value.to_lowercase()),
        _ => None,
    }
}

fn extract_value(expr: &Expr) -> Option<&Value> {
    match expr {
        Expr::Value(ValueWithSpan { value, .. }) => Some(value),
        _ => None,
    }
}

/// A quoted string, or a bare number taken as text.
fn parse_string(expr: &Expr) -> Result<String, SqlError> {
    match extract_value(expr) {
        Some(Value::SingleQuotedString(s) | Value::Number(s, _)) => Ok(s.clone()),
        Some(value) => Err(SqlError::Parse(format!("expected string, got {value}"))),
        None => Err(SqlError::Parse(format!("expected value, got {expr}"))),
    }
}

fn parse_string_or_null(expr: &Expr) -> Result<Option<String>, SqlError> {
    match extract_value(expr) {
        Some(Value::Null) => Ok(None),
        _ => parse_string(expr).map(Some),
    }
}

fn parse_i64_expr(expr: &Expr) -> Result<i64, SqlError> {
    if let Some(value) = extract_value(expr) {
        match value {
            Value::Number(s, _) | Value::SingleQuotedString(s) => s
                .trim()
                .parse()
                .map_err(|e| SqlError::Parse(format!("bad integer {s:?}: {e}"))),
            _ => Err(SqlError::Parse(format!("expected number, got {value}"))),
        }
    } else if let Expr::UnaryOp {
        op: ast::UnaryOperator::Minus,
        expr,
    } = expr
    {
        Ok(-parse_i64_expr(expr)?)
    } else {
        Err(SqlError::Parse(format!("expected value, got {expr}")))
    }
}

fn parse_i64_or_null(expr: &Expr) -> Result<Option<i64>, SqlError> {
    match extract_value(expr) {
        Some(Value::Null) => Ok(None),
        _ => parse_i64_expr(expr).map(Some),
    }
}

/// RFC 3339 string or integer unix milliseconds.
fn parse_timestamp_expr(expr: &Expr) -> Result<Ms, SqlError> {
    match extract_value(expr) {
        Some(Value::SingleQuotedString(s)) => Ok(parse_timestamp(s)?),
        _ => parse_i64_expr(expr),
    }
}

fn parse_status(expr: &Expr) -> Result<Status, SqlError> {
    match extract_value(expr) {
        Some(Value::Null) => Ok(Status::Confirmed),
        _ => Ok(Status::from_str(&parse_string(expr)?)?),
    }
}

// ── Errors ────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum SqlError {
    #[error("parse error: {0}")]
    Parse(String),
    #[error("empty query")]
    Empty,
    #[error("unsupported: {0}")]
    Unsupported(String),
    #[error("unknown table: {0}")]
    UnknownTable(String),
    #[error("{0}: expected at least {1} values, got {2}")]
    WrongArity(&'static str, usize, usize),
    #[error("missing filter: {0}")]
    MissingFilter(&'static str),
    #[error("unknown or repeated filter: {0}")]
    UnknownFilter(String),
    #[error(transparent)]
    Model(#[from] ModelError),
}

#[cfg(test)]
mod tests {
    use super::*;

    const T10: Ms = 1_772_359_200_000; // 2026-03-01T10:00:00Z

    #[test]
    fn parse_insert_appointment() {
        let sql = "INSERT INTO appointments (id, store_id, staff_id, resource_id, scheduled_at, duration_minutes, status) \
                   VALUES ('a1', 'store-1', 'alice', NULL, '2026-03-01T10:00:00Z', 45, 'pending')";
        let cmd = parse_sql(sql).unwrap();
        match cmd {
            Command::InsertAppointments(rows) => {
                assert_eq!(rows.len(), 1);
                let a = &rows[0];
                assert_eq!(a.id, "a1");
                assert_eq!(a.store_id, "store-1");
                assert_eq!(a.staff_id.as_deref(), Some("alice"));
                assert_eq!(a.resource_id, None);
                assert_eq!(a.scheduled_at, T10);
                assert_eq!(a.duration_minutes, Some(45));
                assert_eq!(a.status, Status::Pending);
            }
            _ => panic!("expected InsertAppointments, got {cmd:?}"),
        }
    }

    #[test]
    fn parse_insert_appointment_defaults() {
        let sql = "INSERT INTO appointments VALUES ('a1', 's', NULL, 'room-1', 1772359200000)";
        let cmd = parse_sql(sql).unwrap();
        let Command::InsertAppointments(rows) = cmd else {
            panic!("expected InsertAppointments, got {cmd:?}");
        };
        assert_eq!(rows[0].scheduled_at, T10);
        assert_eq!(rows[0].duration_minutes, None);
        assert_eq!(rows[0].status, Status::Confirmed);

        let sql = "INSERT INTO appointments VALUES ('a1', 's', 'x', NULL, 0, NULL, NULL)";
        let Command::InsertAppointments(rows) = parse_sql(sql).unwrap() else {
            panic!("expected InsertAppointments");
        };
        assert_eq!(rows[0].duration_minutes, None);
        assert_eq!(rows[0].status, Status::Confirmed);
    }

    #[test]
    fn parse_multi_row_blocks() {
        let sql = "INSERT INTO blocks (id, store_id, staff_id, resource_id, start_at, end_at, reason) VALUES \
                   ('b1', 's', 'alice', NULL, '2026-03-01T10:00:00Z', '2026-03-01T11:00:00Z', 'Lunch'), \
                   ('b2', 's', NULL, 'room-1', 1000, 2000, NULL)";
        let cmd = parse_sql(sql).unwrap();
        let Command::InsertBlocks(rows) = cmd else {
            panic!("expected InsertBlocks, got {cmd:?}");
        };
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].span, Span::new(T10, T10 + 3_600_000));
        assert_eq!(rows[0].reason.as_deref(), Some("Lunch"));
        assert_eq!(rows[1].resource_id.as_deref(), Some("room-1"));
        assert_eq!(rows[1].reason, None);
    }

    #[test]
    fn parse_insert_booking_item() {
        let sql = "INSERT INTO booking_items VALUES ('i1', 's', 'a1', 'alice', 'chair-2', 1000, 2000, 'cancelled')";
        let cmd = parse_sql(sql).unwrap();
        let Command::InsertBookingItems(rows) = cmd else {
            panic!("expected InsertBookingItems, got {cmd:?}");
        };
        assert_eq!(rows[0].appointment_id, "a1");
        assert_eq!(rows[0].span, Span::new(1000, 2000));
        assert_eq!(rows[0].status, Status::Cancelled);
    }

    #[test]
    fn row_errors_name_the_row() {
        let sql = "INSERT INTO blocks VALUES ('b1', 's', 'x', NULL, 1, 2), ('b2', 's', 'x', NULL, 'soon', 2)";
        let err = parse_sql(sql).unwrap_err().to_string();
        assert!(err.contains("row 1"), "{err}");
    }

    #[test]
    fn parse_status_change() {
        let sql = "INSERT INTO status_changes VALUES ('appointment', 'a1', 'no_show')";
        assert_eq!(
            parse_sql(sql).unwrap(),
            Command::SetStatus {
                kind: ConflictKind::Appointment,
                id: "a1".into(),
                status: Status::NoShow,
            }
        );

        let sql = "INSERT INTO status_changes VALUES ('block', 'b1', 'cancelled')";
        assert!(parse_sql(sql).is_err());
        let sql = "INSERT INTO status_changes VALUES ('booking_item', 'i1', 'lost')";
        assert!(matches!(parse_sql(sql), Err(SqlError::Model(_))));
    }

    #[test]
    fn parse_deletes() {
        for (table, kind) in [
            ("appointments", ConflictKind::Appointment),
            ("blocks", ConflictKind::Block),
            ("booking_items", ConflictKind::BookingItem),
        ] {
            let cmd = parse_sql(&format!("DELETE FROM {table} WHERE id = 'x1'")).unwrap();
            assert_eq!(cmd, Command::Delete { kind, id: "x1".into() });
        }
        assert!(matches!(
            parse_sql("DELETE FROM blocks WHERE store_id = 's'"),
            Err(SqlError::MissingFilter("id"))
        ));
    }

    #[test]
    fn parse_listings() {
        assert_eq!(
            parse_sql("SELECT * FROM appointments WHERE store_id = 's'").unwrap(),
            Command::SelectAppointments { store_id: "s".into() }
        );
        assert_eq!(
            parse_sql("SELECT * FROM booking_items WHERE appointment_id = 'a1'").unwrap(),
            Command::SelectBookingItems(ItemFilter::Appointment("a1".into()))
        );
        assert_eq!(
            parse_sql("SELECT * FROM booking_items WHERE store_id = 's'").unwrap(),
            Command::SelectBookingItems(ItemFilter::Store("s".into()))
        );
        assert!(matches!(
            parse_sql("SELECT * FROM blocks"),
            Err(SqlError::MissingFilter("store_id"))
        ));
    }

    #[test]
    fn parse_conflicts_query() {
        let sql = "SELECT * FROM conflicts WHERE store_id = 's' AND staff_id = 'alice' \
                   AND resource_id = 'room-1' AND start_at = '2026-03-01T10:00:00Z' \
                   AND end_at = '2026-03-01T11:00:00+00:00' AND exclude_appointment_id = 'a1'";
        let cmd = parse_sql(sql).unwrap();
        assert_eq!(
            cmd,
            Command::SelectConflicts(
                ConflictQuery::new("s", Span::new(T10, T10 + 3_600_000))
                    .staff("alice")
                    .resource("room-1")
                    .excluding("a1")
            )
        );
    }

    #[test]
    fn parse_conflicts_without_subjects() {
        let sql = "SELECT * FROM conflicts WHERE store_id = 's' AND start_at = 1000 AND end_at = 2000";
        let Command::SelectConflicts(query) = parse_sql(sql).unwrap() else {
            panic!("expected SelectConflicts");
        };
        assert!(query.subjects().is_empty());
        assert_eq!(query.window, Span::new(1000, 2000));

        let sql = "SELECT * FROM conflicts WHERE store_id = 's' AND start_at = 1000";
        assert!(matches!(parse_sql(sql), Err(SqlError::MissingFilter("end_at"))));
    }

    #[test]
    fn unknown_filters_are_rejected() {
        let sql = "SELECT * FROM conflicts WHERE store_id = 's' AND staf_id = 'alice' \
                   AND start_at = 1000 AND end_at = 2000";
        assert!(matches!(
            parse_sql(sql),
            Err(SqlError::UnknownFilter(column)) if column == "staf_id"
        ));

        let sql = "SELECT * FROM appointments WHERE store_id = 's' AND staff_id = 'x'";
        assert!(matches!(parse_sql(sql), Err(SqlError::UnknownFilter(_))));

        let sql = "SELECT * FROM blocks WHERE store_id = 's' AND store_id = 't'";
        assert!(matches!(parse_sql(sql), Err(SqlError::UnknownFilter(_))));
    }

    #[test]
    fn or_filters_rejected() {
        let sql = "SELECT * FROM appointments WHERE store_id = 'a' OR store_id = 'b'";
        assert!(matches!(parse_sql(sql), Err(SqlError::Unsupported(_))));
    }

    #[test]
    fn parse_unknown_table_errors() {
        assert!(matches!(
            parse_sql("INSERT INTO foobar VALUES ('x')"),
            Err(SqlError::UnknownTable(_))
        ));
        assert!(matches!(
            parse_sql("SELECT * FROM foobar WHERE store_id = 's'"),
            Err(SqlError::UnknownTable(_))
        ));
    }

    #[test]
    fn scripts_split_into_commands() {
        let sql = "DELETE FROM blocks WHERE id = 'b1'; SELECT * FROM blocks WHERE store_id = 's';";
        let commands = parse_script(sql).unwrap();
        assert_eq!(commands.len(), 2);
        assert!(matches!(commands[1], Command::SelectBlocks { .. }));
        assert!(matches!(parse_sql(sql), Err(SqlError::Unsupported(_))));
    }

    #[test]
    fn parse_empty_errors() {
        assert!(matches!(parse_sql(""), Err(SqlError::Empty)));
    }
}
