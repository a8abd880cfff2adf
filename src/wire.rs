use std::fmt::Debug;
use std::ops::Range;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use futures::stream;
use futures::Sink;
use pgwire::api::auth::cleartext::CleartextPasswordAuthStartupHandler;
use pgwire::api::auth::{AuthSource, DefaultServerParameterProvider, LoginInfo, Password, StartupHandler};
use pgwire::api::copy::CopyHandler;
use pgwire::api::portal::{Format, Portal};
use pgwire::api::query::{ExtendedQueryHandler, SimpleQueryHandler};
use pgwire::api::results::{
    DataRowEncoder, DescribePortalResponse, DescribeStatementResponse, FieldFormat, FieldInfo,
    QueryResponse, Response, Tag,
};
use pgwire::api::stmt::{QueryParser, StoredStatement};
use pgwire::api::store::PortalStore;
use pgwire::api::{ClientInfo, ClientPortalStore, NoopHandler, PgWireServerHandlers, Type};
use pgwire::error::{ErrorInfo, PgWireError, PgWireResult};
use pgwire::messages::PgWireBackendMessage;
use pgwire::tokio::TlsAcceptor;
use tokio::net::TcpStream;

use crate::engine::{Engine, EngineError};
use crate::model::*;
use crate::observability;
use crate::sql::{self, Command, ItemFilter, SqlError};

/// Serve one client connection until it closes.
pub async fn process_connection(
    socket: TcpStream,
    engine: Arc<Engine>,
    password: String,
    tls: Option<TlsAcceptor>,
) -> std::io::Result<()> {
    let factory = SlotguardFactory::new(engine, password);
    pgwire::tokio::process_socket(socket, tls, factory).await
}

pub struct SlotguardHandler {
    engine: Arc<Engine>,
    query_parser: Arc<SlotguardQueryParser>,
}

impl SlotguardHandler {
    pub fn new(engine: Arc<Engine>) -> Self {
        Self {
            engine,
            query_parser: Arc::new(SlotguardQueryParser),
        }
    }

    /// Run one command, recording query count and latency.
    async fn execute(&self, cmd: Command) -> PgWireResult<Response> {
        let label = observability::command_label(&cmd);
        let started = Instant::now();
        let result = self.execute_command(cmd).await;
        metrics::histogram!(observability::QUERY_DURATION_SECONDS, "command" => label)
            .record(started.elapsed().as_secs_f64());
        let status = if result.is_ok() { "ok" } else { "error" };
        metrics::counter!(observability::QUERIES_TOTAL, "command" => label, "status" => status)
            .increment(1);
        result
    }

    async fn execute_command(&self, cmd: Command) -> PgWireResult<Response> {
        let engine = &self.engine;
        match cmd {
            Command::InsertAppointments(rows) => {
                let count = rows.len();
                for appointment in rows {
                    engine.insert_appointment(appointment).await.map_err(engine_err)?;
                }
                Ok(Response::Execution(Tag::new("INSERT").with_rows(count)))
            }
            Command::InsertBlocks(rows) => {
                let count = rows.len();
                for block in rows {
                    engine.insert_block(block).await.map_err(engine_err)?;
                }
                Ok(Response::Execution(Tag::new("INSERT").with_rows(count)))
            }
            Command::InsertBookingItems(rows) => {
                let count = rows.len();
                for item in rows {
                    engine.insert_booking_item(item).await.map_err(engine_err)?;
                }
                Ok(Response::Execution(Tag::new("INSERT").with_rows(count)))
            }
            Command::SetStatus { kind, id, status } => {
                let updated = match kind {
                    ConflictKind::Appointment => engine.set_appointment_status(&id, status).await,
                    ConflictKind::BookingItem => engine.set_booking_item_status(&id, status).await,
                    ConflictKind::Block => Err(EngineError::Invalid("blocks have no status".into())),
                };
                updated.map_err(engine_err)?;
                Ok(Response::Execution(Tag::new("INSERT").with_rows(1)))
            }
            Command::Delete { kind, id } => {
                engine.delete_record(kind, &id).await.map_err(engine_err)?;
                Ok(Response::Execution(Tag::new("DELETE").with_rows(1)))
            }
            Command::SelectAppointments { store_id } => {
                let schema = Arc::new(appointments_schema());
                let rows: Vec<PgWireResult<_>> = engine
                    .list_appointments(&store_id)
                    .await
                    .iter()
                    .map(|a| {
                        let mut encoder = DataRowEncoder::new(schema.clone());
                        encoder.encode_field(&a.id)?;
                        encoder.encode_field(&a.store_id)?;
                        encoder.encode_field(&a.staff_id)?;
                        encoder.encode_field(&a.resource_id)?;
                        encoder.encode_field(&timestamp(a.scheduled_at)?)?;
                        encoder.encode_field(&timestamp(a.end())?)?;
                        encoder.encode_field(&a.duration_minutes)?;
                        encoder.encode_field(&a.status.as_str().to_string())?;
                        Ok(encoder.take_row())
                    })
                    .collect();
                Ok(Response::Query(QueryResponse::new(schema, stream::iter(rows))))
            }
            Command::SelectBlocks { store_id } => {
                let schema = Arc::new(blocks_schema());
                let rows: Vec<PgWireResult<_>> = engine
                    .list_blocks(&store_id)
                    .await
                    .iter()
                    .map(|b| {
                        let mut encoder = DataRowEncoder::new(schema.clone());
                        encoder.encode_field(&b.id)?;
                        encoder.encode_field(&b.store_id)?;
                        encoder.encode_field(&b.staff_id)?;
                        encoder.encode_field(&b.resource_id)?;
                        encoder.encode_field(&timestamp(b.span.start)?)?;
                        encoder.encode_field(&timestamp(b.span.end)?)?;
                        encoder.encode_field(&b.reason)?;
                        Ok(encoder.take_row())
                    })
                    .collect();
                Ok(Response::Query(QueryResponse::new(schema, stream::iter(rows))))
            }
            Command::SelectBookingItems(filter) => {
                let items = match filter {
                    ItemFilter::Store(store_id) => engine.list_booking_items(&store_id).await,
                    ItemFilter::Appointment(id) => engine.booking_items_of(&id).await,
                };
                let schema = Arc::new(booking_items_schema());
                let rows: Vec<PgWireResult<_>> = items
                    .iter()
                    .map(|i| {
                        let mut encoder = DataRowEncoder::new(schema.clone());
                        encoder.encode_field(&i.id)?;
                        encoder.encode_field(&i.store_id)?;
                        encoder.encode_field(&i.appointment_id)?;
                        encoder.encode_field(&i.staff_id)?;
                        encoder.encode_field(&i.resource_id)?;
                        encoder.encode_field(&timestamp(i.span.start)?)?;
                        encoder.encode_field(&timestamp(i.span.end)?)?;
                        encoder.encode_field(&i.status.as_str().to_string())?;
                        Ok(encoder.take_row())
                    })
                    .collect();
                Ok(Response::Query(QueryResponse::new(schema, stream::iter(rows))))
            }
            Command::SelectConflicts(query) => {
                let report = engine.check_conflicts(&query).await.map_err(engine_err)?;
                let schema = Arc::new(conflicts_schema());
                let rows: Vec<PgWireResult<_>> = report
                    .conflicts
                    .iter()
                    .map(|c| {
                        let mut encoder = DataRowEncoder::new(schema.clone());
                        encoder.encode_field(&c.kind.as_str().to_string())?;
                        encoder.encode_field(&c.id)?;
                        encoder.encode_field(&timestamp(c.start_at)?)?;
                        encoder.encode_field(&timestamp(c.end_at)?)?;
                        encoder.encode_field(&c.reason)?;
                        Ok(encoder.take_row())
                    })
                    .collect();
                Ok(Response::Query(QueryResponse::new(schema, stream::iter(rows))))
            }
        }
    }
}

// ── Result schemas ───────────────────────────────────────────────

fn text_field(name: &str) -> FieldInfo {
    FieldInfo::new(name.into(), None, None, Type::VARCHAR, FieldFormat::Text)
}

fn appointments_schema() -> Vec<FieldInfo> {
    vec![
        text_field("id"),
        text_field("store_id"),
        text_field("staff_id"),
        text_field("resource_id"),
        text_field("scheduled_at"),
        text_field("end_at"),
        FieldInfo::new("duration_minutes".into(), None, None, Type::INT8, FieldFormat::Text),
        text_field("status"),
    ]
}

fn blocks_schema() -> Vec<FieldInfo> {
    vec![
        text_field("id"),
        text_field("store_id"),
        text_field("staff_id"),
        text_field("resource_id"),
        text_field("start_at"),
        text_field("end_at"),
        text_field("reason"),
    ]
}

fn booking_items_schema() -> Vec<FieldInfo> {
    vec![
        text_field("id"),
        text_field("store_id"),
        text_field("appointment_id"),
        text_field("staff_id"),
        text_field("resource_id"),
        text_field("start_at"),
        text_field("end_at"),
        text_field("status"),
    ]
}

fn conflicts_schema() -> Vec<FieldInfo> {
    vec![
        text_field("type"),
        text_field("id"),
        text_field("start_at"),
        text_field("end_at"),
        text_field("reason"),
    ]
}

/// Result columns of a statement, judged from the table it selects from.
fn result_schema(sql: &str) -> Vec<FieldInfo> {
    let normalized = sql.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase();
    if !normalized.starts_with("select") {
        return vec![];
    }
    if normalized.contains("from conflicts") {
        conflicts_schema()
    } else if normalized.contains("from booking_items") {
        booking_items_schema()
    } else if normalized.contains("from appointments") {
        appointments_schema()
    } else if normalized.contains("from blocks") {
        blocks_schema()
    } else {
        vec![]
    }
}

#[async_trait]
impl SimpleQueryHandler for SlotguardHandler {
    async fn do_query<C>(
        &self,
        _client: &mut C,
        query: &str,
    ) -> PgWireResult<Vec<Response>>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let commands = sql::parse_script(query).map_err(sql_err)?;
        let mut responses = Vec::with_capacity(commands.len());
        for cmd in commands {
            responses.push(self.execute(cmd).await?);
        }
        Ok(responses)
    }
}

// ── Extended Query Protocol ──────────────────────────────────────

#[derive(Debug)]
pub struct SlotguardQueryParser;

#[async_trait]
impl QueryParser for SlotguardQueryParser {
    type Statement = String;

    async fn parse_sql<C>(
        &self,
        _client: &C,
        sql: &str,
        _types: &[Option<Type>],
    ) -> PgWireResult<String>
    where
        C: ClientInfo + Unpin + Send + Sync,
    {
        Ok(sql.to_string())
    }

    fn get_parameter_types(&self, stmt: &String) -> PgWireResult<Vec<Type>> {
        Ok(vec![Type::VARCHAR; count_params(stmt)])
    }

    fn get_result_schema(
        &self,
        stmt: &String,
        _column_format: Option<&Format>,
    ) -> PgWireResult<Vec<FieldInfo>> {
        Ok(result_schema(stmt))
    }
}

#[async_trait]
impl ExtendedQueryHandler for SlotguardHandler {
    type Statement = String;
    type QueryParser = SlotguardQueryParser;

    fn query_parser(&self) -> Arc<Self::QueryParser> {
        self.query_parser.clone()
    }

    async fn do_query<C>(
        &self,
        _client: &mut C,
        portal: &Portal<Self::Statement>,
        _max_rows: usize,
    ) -> PgWireResult<Response>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let sql = substitute_params(portal);
        let cmd = sql::parse_sql(&sql).map_err(sql_err)?;
        self.execute(cmd).await
    }

    async fn do_describe_statement<C>(
        &self,
        _client: &mut C,
        target: &StoredStatement<Self::Statement>,
    ) -> PgWireResult<DescribeStatementResponse>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let param_types = vec![Type::VARCHAR; count_params(&target.statement)];
        Ok(DescribeStatementResponse::new(
            param_types,
            result_schema(&target.statement),
        ))
    }

    async fn do_describe_portal<C>(
        &self,
        _client: &mut C,
        target: &Portal<Self::Statement>,
    ) -> PgWireResult<DescribePortalResponse>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        Ok(DescribePortalResponse::new(result_schema(
            &target.statement.statement,
        )))
    }
}

/// `$N` placeholders outside quoted literals, as (byte range, N).
fn placeholders(sql: &str) -> Vec<(Range<usize>, usize)> {
    let bytes = sql.as_bytes();
    let mut found = Vec::new();
    let mut in_literal = false;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'\'' => {
                // a doubled quote closes and reopens, which leaves the state unchanged
                in_literal = !in_literal;
                i += 1;
            }
            b'$' if !in_literal => {
                let start = i;
                i += 1;
                while i < bytes.len() && bytes[i].is_ascii_digit() {
                    i += 1;
                }
                if let Ok(n) = sql[start + 1..i].parse::<usize>() {
                    found.push((start..i, n));
                }
            }
            _ => i += 1,
        }
    }
    found
}

/// Highest `$N` placeholder in the statement.
fn count_params(sql: &str) -> usize {
    placeholders(sql).into_iter().map(|(_, n)| n).max().unwrap_or(0)
}

/// Splice bound values into the statement in one left-to-right pass, so
/// text inside a value is never read as a placeholder. Values are already
/// rendered as SQL literals. Placeholders without a value are kept as is.
fn bind_params(sql: &str, values: &[String]) -> String {
    let mut out = String::with_capacity(sql.len());
    let mut last = 0;
    for (range, n) in placeholders(sql) {
        let Some(value) = n.checked_sub(1).and_then(|i| values.get(i)) else {
            continue;
        };
        out.push_str(&sql[last..range.start]);
        out.push_str(value);
        last = range.end;
    }
    out.push_str(&sql[last..]);
    out
}

/// Text-format parameters of a portal rendered as quoted literals or `NULL`.
fn substitute_params(portal: &Portal<String>) -> String {
    let values: Vec<String> = portal
        .parameters
        .iter()
        .map(|param| match param {
            Some(bytes) => {
                let text = String::from_utf8_lossy(bytes);
                format!("'{}'", text.replace('\'', "''"))
            }
            None => "NULL".to_string(),
        })
        .collect();
    bind_params(&portal.statement.statement, &values)
}

// ── Auth & factory ───────────────────────────────────────────────

/// Single shared password for every user and database.
#[derive(Debug)]
pub struct PasswordAuthSource {
    password: String,
}

#[async_trait]
impl AuthSource for PasswordAuthSource {
    async fn get_password(&self, _login: &LoginInfo) -> PgWireResult<Password> {
        Ok(Password::new(None, self.password.as_bytes().to_vec()))
    }
}

pub struct SlotguardFactory {
    handler: Arc<SlotguardHandler>,
    auth_handler:
        Arc<CleartextPasswordAuthStartupHandler<PasswordAuthSource, DefaultServerParameterProvider>>,
    noop: Arc<NoopHandler>,
}

impl SlotguardFactory {
    pub fn new(engine: Arc<Engine>, password: String) -> Self {
        Self {
            handler: Arc::new(SlotguardHandler::new(engine)),
            auth_handler: Arc::new(CleartextPasswordAuthStartupHandler::new(
                PasswordAuthSource { password },
                DefaultServerParameterProvider::default(),
            )),
            noop: Arc::new(NoopHandler),
        }
    }
}

impl PgWireServerHandlers for SlotguardFactory {
    fn simple_query_handler(&self) -> Arc<impl SimpleQueryHandler> {
        self.handler.clone()
    }

    fn extended_query_handler(&self) -> Arc<impl ExtendedQueryHandler> {
        self.handler.clone()
    }

    fn startup_handler(&self) -> Arc<impl StartupHandler> {
        self.auth_handler.clone()
    }

    fn copy_handler(&self) -> Arc<impl CopyHandler> {
        self.noop.clone()
    }
}

// ── Errors ───────────────────────────────────────────────────────

fn timestamp(ms: Ms) -> PgWireResult<String> {
    format_timestamp(ms).map_err(|e| engine_err(e.into()))
}

fn engine_err(e: EngineError) -> PgWireError {
    PgWireError::UserError(Box::new(ErrorInfo::new(
        "ERROR".into(),
        "P0001".into(),
        e.to_string(),
    )))
}

fn sql_err(e: SqlError) -> PgWireError {
    PgWireError::UserError(Box::new(ErrorInfo::new(
        "ERROR".into(),
        "42601".into(),
        e.to_string(),
    )))
}
