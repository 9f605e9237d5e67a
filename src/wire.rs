use std::fmt::Debug;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use futures::Sink;
use futures::stream;
use pgwire::api::auth::cleartext::CleartextPasswordAuthStartupHandler;
use pgwire::api::auth::{DefaultServerParameterProvider, StartupHandler};
use pgwire::api::copy::CopyHandler;
use pgwire::api::portal::{Format, Portal};
use pgwire::api::query::{ExtendedQueryHandler, SimpleQueryHandler};
use pgwire::api::results::{
    DataRowEncoder, DescribePortalResponse, DescribeStatementResponse, FieldFormat, FieldInfo, QueryResponse,
    Response,
};
use pgwire::api::stmt::{QueryParser, StoredStatement};
use pgwire::api::store::PortalStore;
use pgwire::api::{ClientInfo, ClientPortalStore, NoopHandler, PgWireServerHandlers, Type};
use pgwire::error::{ErrorInfo, PgWireError, PgWireResult};
use pgwire::messages::PgWireBackendMessage;
use pgwire::tokio::TlsAcceptor;
use tokio::net::TcpStream;

use crate::auth::BaycheckAuthSource;
use crate::club::{Club, ClubError};
use crate::feed::FeedError;
use crate::model::*;
use crate::observability::{QUERIES_TOTAL, QUERY_DURATION_SECONDS, command_label};
use crate::sql::{self, Command, SqlError};
use crate::sweeper::ReviewBoard;

pub struct BaycheckHandler {
    club: Arc<Club>,
    board: Arc<ReviewBoard>,
    query_parser: Arc<BaycheckQueryParser>,
}

type Rows = Vec<PgWireResult<pgwire::messages::data::DataRow>>;

impl BaycheckHandler {
    pub fn new(club: Arc<Club>, board: Arc<ReviewBoard>) -> Self {
        Self {
            club,
            board,
            query_parser: Arc::new(BaycheckQueryParser),
        }
    }

    async fn run(&self, query: &str) -> PgWireResult<Response> {
        let cmd = sql::parse_sql(query).map_err(sql_err)?;
        let label = command_label(&cmd);
        let start = Instant::now();
        let result = self.execute_command(cmd).await;
        let status = if result.is_ok() { "ok" } else { "error" };
        metrics::counter!(QUERIES_TOTAL, "command" => label, "status" => status).increment(1);
        metrics::histogram!(QUERY_DURATION_SECONDS, "command" => label).record(start.elapsed().as_secs_f64());
        result
    }

    async fn execute_command(&self, cmd: Command) -> PgWireResult<Response> {
        match cmd {
            Command::SelectAvailability { candidate } => {
                let result = self.club.check(&candidate).await.map_err(feed_err)?;
                let schema = Arc::new(availability_schema());
                let mut encoder = DataRowEncoder::new(schema.clone());
                let span = candidate.interval.span;
                encoder.encode_field(&candidate.resource_id)?;
                encoder.encode_field(&candidate.interval.date.to_string())?;
                encoder.encode_field(&format_clock(span.start))?;
                encoder.encode_field(&format_clock(span.end))?;
                encoder.encode_field(&result.status_label())?;
                encoder.encode_field(&result.kind().map(|k| k.as_str()))?;
                encoder.encode_field(&result.reason())?;
                let rows: Rows = vec![Ok(encoder.take_row())];
                Ok(query_response(schema, rows))
            }
            Command::SelectSlots {
                resource_id,
                date,
                duration,
            } => {
                let slots = self.club.slots(resource_id, date, duration).await.map_err(club_err)?;
                let schema = Arc::new(slots_schema());
                let date = date.to_string();
                let rows: Rows = slots
                    .into_iter()
                    .map(|slot| {
                        let mut encoder = DataRowEncoder::new(schema.clone());
                        encoder.encode_field(&resource_id)?;
                        encoder.encode_field(&date)?;
                        encoder.encode_field(&format_clock(slot.span.start))?;
                        encoder.encode_field(&format_clock(slot.span.end))?;
                        encoder.encode_field(&slot.available)?;
                        Ok(encoder.take_row())
                    })
                    .collect();
                Ok(query_response(schema, rows))
            }
            Command::SelectFreeWindows {
                resource_id,
                date,
                min_duration,
            } => {
                let windows = self
                    .club
                    .free_windows(resource_id, date, min_duration)
                    .await
                    .map_err(feed_err)?;
                let schema = Arc::new(free_windows_schema());
                let date = date.to_string();
                let rows: Rows = windows
                    .into_iter()
                    .map(|span| {
                        let mut encoder = DataRowEncoder::new(schema.clone());
                        encoder.encode_field(&resource_id)?;
                        encoder.encode_field(&date)?;
                        encoder.encode_field(&format_clock(span.start))?;
                        encoder.encode_field(&format_clock(span.end))?;
                        Ok(encoder.take_row())
                    })
                    .collect();
                Ok(query_response(schema, rows))
            }
            Command::SelectClosures { date } => {
                let closures = self.club.closures_on(date).await.map_err(feed_err)?;
                let schema = Arc::new(closures_schema());
                let rows: Rows = closures
                    .into_iter()
                    .map(|c| {
                        let mut encoder = DataRowEncoder::new(schema.clone());
                        let ids: Vec<String> = c.affected.iter().map(ToString::to_string).collect();
                        encoder.encode_field(&c.id)?;
                        encoder.encode_field(&c.title)?;
                        encoder.encode_field(&c.start_date.to_string())?;
                        encoder.encode_field(&c.end_date.to_string())?;
                        encoder.encode_field(&c.window.map(|w| format_clock(w.start)))?;
                        encoder.encode_field(&c.window.map(|w| format_clock(w.end)))?;
                        encoder.encode_field(&ids.join(","))?;
                        Ok(encoder.take_row())
                    })
                    .collect();
                Ok(query_response(schema, rows))
            }
            Command::SelectResources => {
                let resources = self.club.resources().await.map_err(feed_err)?;
                let schema = Arc::new(resources_schema());
                let rows: Rows = resources
                    .into_iter()
                    .map(|r| {
                        let mut encoder = DataRowEncoder::new(schema.clone());
                        encoder.encode_field(&r.id)?;
                        encoder.encode_field(&r.name)?;
                        encoder.encode_field(&r.kind.as_str())?;
                        Ok(encoder.take_row())
                    })
                    .collect();
                Ok(query_response(schema, rows))
            }
            Command::SelectAffectedAreas { raw } => {
                let ids = self.club.resolve_areas(&raw).await.map_err(feed_err)?;
                let schema = Arc::new(affected_areas_schema());
                let rows: Rows = ids
                    .into_iter()
                    .map(|id| {
                        let mut encoder = DataRowEncoder::new(schema.clone());
                        encoder.encode_field(&id)?;
                        Ok(encoder.take_row())
                    })
                    .collect();
                Ok(query_response(schema, rows))
            }
            Command::SelectPendingReviews => {
                let schema = Arc::new(pending_reviews_schema());
                let rows: Rows = self
                    .board
                    .snapshot()
                    .into_iter()
                    .map(|r| {
                        let mut encoder = DataRowEncoder::new(schema.clone());
                        encoder.encode_field(&r.request_id)?;
                        encoder.encode_field(&r.resource_id)?;
                        encoder.encode_field(&r.interval.date.to_string())?;
                        encoder.encode_field(&format_clock(r.interval.span.start))?;
                        encoder.encode_field(&format_clock(r.interval.span.end))?;
                        encoder.encode_field(&r.requester)?;
                        encoder.encode_field(&r.result.status_label())?;
                        encoder.encode_field(&r.result.reason())?;
                        Ok(encoder.take_row())
                    })
                    .collect();
                Ok(query_response(schema, rows))
            }
        }
    }
}

fn query_response(schema: Arc<Vec<FieldInfo>>, rows: Rows) -> Response {
    Response::Query(QueryResponse::new(schema, stream::iter(rows)))
}

// ── Schemas ──────────────────────────────────────────────────────

fn field(name: &str, ty: Type) -> FieldInfo {
    FieldInfo::new(name.into(), None, None, ty, FieldFormat::Text)
}

fn availability_schema() -> Vec<FieldInfo> {
    vec![
        field("resource_id", Type::INT8),
        field("date", Type::VARCHAR),
        field("start_time", Type::VARCHAR),
        field("end_time", Type::VARCHAR),
        field("status", Type::VARCHAR),
        field("kind", Type::VARCHAR),
        field("reason", Type::VARCHAR),
    ]
}

fn slots_schema() -> Vec<FieldInfo> {
    vec![
        field("resource_id", Type::INT8),
        field("date", Type::VARCHAR),
        field("start_time", Type::VARCHAR),
        field("end_time", Type::VARCHAR),
        field("available", Type::BOOL),
    ]
}

fn free_windows_schema() -> Vec<FieldInfo> {
    vec![
        field("resource_id", Type::INT8),
        field("date", Type::VARCHAR),
        field("start_time", Type::VARCHAR),
        field("end_time", Type::VARCHAR),
    ]
}

fn closures_schema() -> Vec<FieldInfo> {
    vec![
        field("id", Type::INT8),
        field("title", Type::VARCHAR),
        field("start_date", Type::VARCHAR),
        field("end_date", Type::VARCHAR),
        field("start_time", Type::VARCHAR),
        field("end_time", Type::VARCHAR),
        field("resource_ids", Type::VARCHAR),
    ]
}

fn resources_schema() -> Vec<FieldInfo> {
    vec![
        field("id", Type::INT8),
        field("name", Type::VARCHAR),
        field("kind", Type::VARCHAR),
    ]
}

fn affected_areas_schema() -> Vec<FieldInfo> {
    vec![field("resource_id", Type::INT8)]
}

fn pending_reviews_schema() -> Vec<FieldInfo> {
    vec![
        field("request_id", Type::INT8),
        field("resource_id", Type::INT8),
        field("date", Type::VARCHAR),
        field("start_time", Type::VARCHAR),
        field("end_time", Type::VARCHAR),
        field("requester", Type::VARCHAR),
        field("status", Type::VARCHAR),
        field("reason", Type::VARCHAR),
    ]
}

/// Result columns for a statement, known before its parameters are bound.
fn schema_for(sql: &str) -> Vec<FieldInfo> {
    match sql::table_name(sql).as_deref() {
        Some("availability") => availability_schema(),
        Some("slots") => slots_schema(),
        Some("free_windows") => free_windows_schema(),
        Some("closures") => closures_schema(),
        Some("resources") => resources_schema(),
        Some("affected_areas") => affected_areas_schema(),
        Some("pending_reviews") => pending_reviews_schema(),
        _ => vec![],
    }
}

#[async_trait]
impl SimpleQueryHandler for BaycheckHandler {
    async fn do_query<C>(&self, _client: &mut C, query: &str) -> PgWireResult<Vec<Response>>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        Ok(vec![self.run(query).await?])
    }
}

// ── Extended Query Protocol ──────────────────────────────────────

#[derive(Debug)]
pub struct BaycheckQueryParser;

#[async_trait]
impl QueryParser for BaycheckQueryParser {
    type Statement = String;

    async fn parse_sql<C>(&self, _client: &C, sql: &str, _types: &[Option<Type>]) -> PgWireResult<String>
    where
        C: ClientInfo + Unpin + Send + Sync,
    {
        Ok(sql.to_string())
    }

    fn get_parameter_types(&self, stmt: &String) -> PgWireResult<Vec<Type>> {
        Ok(vec![Type::VARCHAR; count_params(stmt)])
    }

    fn get_result_schema(&self, stmt: &String, _column_format: Option<&Format>) -> PgWireResult<Vec<FieldInfo>> {
        Ok(schema_for(stmt))
    }
}

#[async_trait]
impl ExtendedQueryHandler for BaycheckHandler {
    type Statement = String;
    type QueryParser = BaycheckQueryParser;

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
        let sql = substitute_params(&portal.statement.statement, &portal.parameters);
        self.run(&sql).await
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
        Ok(DescribeStatementResponse::new(param_types, schema_for(&target.statement)))
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
        Ok(DescribePortalResponse::new(schema_for(&target.statement.statement)))
    }
}

/// Highest `$N` placeholder in the SQL string.
fn count_params(sql: &str) -> usize {
    let bytes = sql.as_bytes();
    let mut max = 0usize;
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] != b'$' {
            i += 1;
            continue;
        }
        i += 1;
        let start = i;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
        if let Ok(n) = sql[start..i].parse::<usize>() {
            max = max.max(n);
        }
    }
    max
}

/// Replace `$1, $2, ...` with the bound values as quoted literals.
///
/// Highest index first, so `$1` never clobbers the prefix of `$10`.
fn substitute_params<B: AsRef<[u8]>>(sql: &str, params: &[Option<B>]) -> String {
    let mut result = sql.to_string();
    for (i, param) in params.iter().enumerate().rev() {
        let placeholder = format!("${}", i + 1);
        let value = match param {
            Some(bytes) => {
                let text = String::from_utf8_lossy(bytes.as_ref());
                format!("'{}'", text.replace('\'', "''"))
            }
            None => "NULL".to_string(),
        };
        result = result.replace(&placeholder, &value);
    }
    result
}

// ── Factory ──────────────────────────────────────────────────────

pub struct BaycheckFactory {
    handler: Arc<BaycheckHandler>,
    auth_handler: Arc<CleartextPasswordAuthStartupHandler<BaycheckAuthSource, DefaultServerParameterProvider>>,
    noop: Arc<NoopHandler>,
}

impl BaycheckFactory {
    pub fn new(club: Arc<Club>, board: Arc<ReviewBoard>, password: String) -> Self {
        let auth_source = BaycheckAuthSource::new(password);
        let param_provider = DefaultServerParameterProvider::default();
        Self {
            handler: Arc::new(BaycheckHandler::new(club, board)),
            auth_handler: Arc::new(CleartextPasswordAuthStartupHandler::new(auth_source, param_provider)),
            noop: Arc::new(NoopHandler),
        }
    }
}

impl PgWireServerHandlers for BaycheckFactory {
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

/// Serve one client connection until it closes.
pub async fn process_connection(
    socket: TcpStream,
    club: Arc<Club>,
    board: Arc<ReviewBoard>,
    password: String,
    tls: Option<TlsAcceptor>,
) -> std::io::Result<()> {
    let factory = BaycheckFactory::new(club, board, password);
    pgwire::tokio::process_socket(socket, tls, factory).await
}

// ── Errors ───────────────────────────────────────────────────────

fn user_error(code: &str, message: String) -> PgWireError {
    PgWireError::UserError(Box::new(ErrorInfo::new("ERROR".into(), code.into(), message)))
}

fn feed_err(e: FeedError) -> PgWireError {
    tracing::warn!("backend unavailable: {e}");
    user_error("08006", e.to_string())
}

fn club_err(e: ClubError) -> PgWireError {
    match e {
        ClubError::Engine(e) => user_error("22023", e.to_string()),
        ClubError::Feed(e) => feed_err(e),
    }
}

fn sql_err(e: SqlError) -> PgWireError {
    match e {
        SqlError::Invalid(e) => user_error("22023", e.to_string()),
        other => user_error("42601", other.to_string()),
    }
}
