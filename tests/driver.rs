//! End to end tests of the driver core against a scripted wire client.

use pg_odbc::{
    CValue, Concurrency, Connection, ConnectionOptions, CursorType, Executed, Indicator,
    ParamBinding, ParamDataOutcome, RollbackPolicy, Statement, end_transaction,
    sqltypes::{CDataType, FetchOrientation, ParamDirection, SetPosOperation, SqlType},
    types::{ColumnInfo, Oid, PG_TYPE_INT4, PG_TYPE_OID, PG_TYPE_TEXT, PG_TYPE_TID},
    wire::{BindParam, LoMode, LoWhence, QueryResult, StatementDescription, WireClient, WireRow},
};

/// Wire double: every statement sent is recorded; responses come from
/// substring matchers for `send_query` and a FIFO for `bind_and_execute`.
/// Unmatched queries succeed with an empty command result.
#[derive(Default)]
struct ScriptedWire {
    sent: Vec<String>,
    matchers: Vec<(String, Vec<QueryResult>)>,
    bind_results: Vec<QueryResult>,
    bind_log: Vec<(String, Vec<BindParam>)>,
    parse_log: Vec<String>,
    fail_contains: Option<String>,
}

impl ScriptedWire {
    fn respond(&mut self, contains: &str, results: Vec<QueryResult>) {
        self.matchers.push((contains.to_string(), results));
    }

    fn respond_rows(&mut self, contains: &str, columns: Vec<ColumnInfo>, rows: Vec<WireRow>) {
        self.respond(contains, vec![QueryResult::tuples(columns, rows)]);
    }

    fn queue_bind_result(&mut self, result: QueryResult) {
        self.bind_results.push(result);
    }

    fn sent_matching(&self, contains: &str) -> Vec<&String> {
        self.sent.iter().filter(|s| s.contains(contains)).collect()
    }
}

impl WireClient for ScriptedWire {
    fn send_query(&mut self, sql: &str) -> Result<Vec<QueryResult>, pg_odbc::Error> {
        self.sent.push(sql.to_string());
        if let Some(marker) = &self.fail_contains {
            if sql.contains(marker.as_str()) {
                return Ok(vec![QueryResult::error("ERROR: simulated failure")]);
            }
        }
        for (matcher, results) in &self.matchers {
            if sql.contains(matcher.as_str()) {
                return Ok(results.clone());
            }
        }
        Ok(vec![QueryResult::command_ok("OK")])
    }

    fn parse_and_describe(
        &mut self,
        _plan_name: &str,
        sql: &str,
        _num_params: u16,
    ) -> Result<StatementDescription, pg_odbc::Error> {
        self.parse_log.push(sql.to_string());
        Ok(StatementDescription::default())
    }

    fn bind_and_execute(
        &mut self,
        plan_name: &str,
        params: &[BindParam],
    ) -> Result<QueryResult, pg_odbc::Error> {
        self.bind_log.push((plan_name.to_string(), params.to_vec()));
        if self.bind_results.is_empty() {
            Ok(QueryResult::command_ok("OK"))
        } else {
            Ok(self.bind_results.remove(0))
        }
    }

    fn cancel_request(&mut self) -> Result<(), pg_odbc::Error> {
        Ok(())
    }

    fn lo_creat(&mut self) -> Result<Oid, pg_odbc::Error> {
        Ok(4711)
    }

    fn lo_open(&mut self, _oid: Oid, _mode: LoMode) -> Result<i32, pg_odbc::Error> {
        Ok(1)
    }

    fn lo_read(&mut self, _fd: i32, _max: usize) -> Result<Vec<u8>, pg_odbc::Error> {
        Ok(Vec::new())
    }

    fn lo_write(&mut self, _fd: i32, data: &[u8]) -> Result<usize, pg_odbc::Error> {
        Ok(data.len())
    }

    fn lo_lseek64(&mut self, _fd: i32, _o: i64, _w: LoWhence) -> Result<i64, pg_odbc::Error> {
        Ok(0)
    }

    fn lo_tell64(&mut self, _fd: i32) -> Result<i64, pg_odbc::Error> {
        Ok(0)
    }

    fn lo_close(&mut self, _fd: i32) -> Result<(), pg_odbc::Error> {
        Ok(())
    }
}

fn connection(options: ConnectionOptions) -> Connection<ScriptedWire> {
    Connection::new(ScriptedWire::default(), options)
}

fn int_column(name: &str) -> ColumnInfo {
    ColumnInfo::new(name, PG_TYPE_INT4)
}

fn text_column(name: &str) -> ColumnInfo {
    ColumnInfo::new(name, PG_TYPE_TEXT)
}

fn int_rows(range: std::ops::RangeInclusive<i64>) -> Vec<WireRow> {
    range
        .map(|i| vec![Some(i.to_string().into_bytes())])
        .collect()
}

#[test]
fn prepared_select_with_parameter() {
    // Scenario: prepare SELECT with a marker, bind an integer, execute and
    // fetch the row back.
    let mut conn = connection(ConnectionOptions::default());
    let mut stmt = Statement::new(&mut conn);
    stmt.prepare("SELECT * FROM t WHERE id = ?").unwrap();
    stmt.bind_parameter(
        1,
        ParamDirection::Input,
        ParamBinding::single(CValue::Long(3)),
        SqlType::Integer,
        0,
        0,
    )
    .unwrap();

    conn.wire().queue_bind_result(QueryResult::tuples(
        vec![int_column("id"), text_column("name")],
        vec![vec![Some(b"3".to_vec()), Some(b"three".to_vec())]],
    ));

    assert_eq!(Executed::Done, stmt.execute(&mut conn).unwrap());

    // The plan was parsed with a dollar marker and bound with the value.
    assert_eq!(
        vec!["SELECT * FROM t WHERE id = $1::int4".to_string()],
        conn.wire().parse_log
    );
    let (plan, params) = conn.wire().bind_log[0].clone();
    assert!(plan.starts_with("_PLAN"));
    assert_eq!(1, params.len());
    assert_eq!(Some(b"3".to_vec()), params[0].value);
    assert_eq!(PG_TYPE_INT4, params[0].pg_type);

    assert_eq!(1, stmt.fetch(&mut conn).unwrap());
    let mut buf = [0u8; 4];
    let copied = stmt.get_data(&mut conn, 1, CDataType::SLong, &mut buf).unwrap();
    assert_eq!(Some(Indicator::Length(4)), copied.indicator());
    assert_eq!(3, i32::from_ne_bytes(buf));
}

#[test]
fn concat_escape_reaches_server_translated() {
    let mut conn = connection(ConnectionOptions::default());
    let mut stmt = Statement::new(&mut conn);
    stmt.prepare("SELECT {fn CONCAT(?,?)}").unwrap();
    for i in [1u16, 2] {
        stmt.bind_parameter(
            i,
            ParamDirection::Input,
            ParamBinding::single(CValue::Char(if i == 1 { b"foo".to_vec() } else { b"bar".to_vec() })),
            SqlType::Varchar,
            0,
            0,
        )
        .unwrap();
    }
    conn.wire().queue_bind_result(QueryResult::tuples(
        vec![text_column("concat")],
        vec![vec![Some(b"foobar".to_vec())]],
    ));
    stmt.execute(&mut conn).unwrap();

    assert_eq!(
        vec!["SELECT concat($1::text, $2::text)".to_string()],
        conn.wire().parse_log
    );
    let (_, params) = conn.wire().bind_log[0].clone();
    assert_eq!(Some(b"foo".to_vec()), params[0].value);
    assert_eq!(Some(b"bar".to_vec()), params[1].value);

    assert_eq!(1, stmt.fetch(&mut conn).unwrap());
    let mut buf = [0u8; 16];
    let copied = stmt.get_data(&mut conn, 1, CDataType::Char, &mut buf).unwrap();
    assert_eq!(Some(Indicator::Length(6)), copied.indicator());
    assert_eq!(b"foobar\0", &buf[..7]);
}

#[test]
fn concat_escape_inlines_without_server_side_prepare() {
    let mut options = ConnectionOptions::default();
    options.use_server_side_prepare = false;
    let mut conn = connection(options);
    let mut stmt = Statement::new(&mut conn);
    for i in [1u16, 2] {
        stmt.bind_parameter(
            i,
            ParamDirection::Input,
            ParamBinding::single(CValue::Char(if i == 1 { b"foo".to_vec() } else { b"bar".to_vec() })),
            SqlType::Varchar,
            0,
            0,
        )
        .unwrap();
    }
    stmt.exec_direct(&mut conn, "SELECT {fn CONCAT(?,?)}").unwrap();
    assert_eq!(
        1,
        conn.wire()
            .sent_matching("SELECT concat('foo'::text, 'bar'::text)")
            .len()
    );
}

#[test]
fn array_insert_accumulates_row_count() {
    // Scenario: insert many rows through column wise array binding.
    let mut conn = connection(ConnectionOptions::default());
    let mut stmt = Statement::new(&mut conn);
    stmt.prepare("INSERT INTO t (id) VALUES (?)").unwrap();
    let rows = 10_000;
    let values: Vec<CValue> = (0..rows).map(|i| CValue::Long(i as i32)).collect();
    stmt.bind_parameter(
        1,
        ParamDirection::Input,
        ParamBinding::array(values),
        SqlType::Integer,
        0,
        0,
    )
    .unwrap();
    for _ in 0..rows {
        conn.wire().queue_bind_result(QueryResult::command_ok("INSERT 0 1"));
    }
    stmt.execute(&mut conn).unwrap();
    assert_eq!(rows, conn.wire().bind_log.len());
    assert_eq!(rows as i64, stmt.row_count());
}

#[test]
fn scrollable_cursor_over_series() {
    // Scenario: scroll First / Relative(+100) / Last / Prior over 3210
    // buffered rows.
    let mut options = ConnectionOptions::default();
    options.use_server_side_prepare = false;
    let mut conn = connection(options);
    conn.wire().respond_rows(
        "generate_series",
        vec![int_column("n")],
        int_rows(1..=3210),
    );
    let mut stmt = Statement::new(&mut conn);
    stmt.options.cursor_type = CursorType::Static;
    stmt.bind_col(1, CDataType::SLong, 4).unwrap();
    stmt.exec_direct(&mut conn, "select * from generate_series(1, 3210)")
        .unwrap();

    let mut observed = Vec::new();
    for orientation in [
        FetchOrientation::First,
        FetchOrientation::Relative(100),
        FetchOrientation::Last,
        FetchOrientation::Prior,
    ] {
        assert_eq!(1, stmt.fetch_scroll(&mut conn, orientation).unwrap());
        let binding = stmt.col_binding(1).unwrap();
        let bytes = binding.row_slice(0).unwrap();
        observed.push(i32::from_ne_bytes(bytes.try_into().unwrap()));
    }
    assert_eq!(vec![1, 101, 3210, 3209], observed);
}

#[test]
fn multi_statement_query_produces_result_chain() {
    // Scenario: three statements, three result sets, visited in order.
    let mut conn = connection(ConnectionOptions::default());
    let mut stmt = Statement::new(&mut conn);
    stmt.prepare("SELECT 1; SELECT 'foo', 'bar'; SELECT 3").unwrap();
    conn.wire().queue_bind_result(QueryResult::tuples(
        vec![int_column("?column?")],
        vec![vec![Some(b"1".to_vec())]],
    ));
    conn.wire().queue_bind_result(QueryResult::tuples(
        vec![text_column("a"), text_column("b")],
        vec![vec![Some(b"foo".to_vec()), Some(b"bar".to_vec())]],
    ));
    conn.wire().queue_bind_result(QueryResult::tuples(
        vec![int_column("?column?")],
        vec![vec![Some(b"3".to_vec())]],
    ));
    stmt.execute(&mut conn).unwrap();

    assert_eq!(1, stmt.num_result_cols().unwrap());
    assert_eq!(1, stmt.fetch(&mut conn).unwrap());
    let mut buf = [0u8; 4];
    stmt.get_data(&mut conn, 1, CDataType::SLong, &mut buf).unwrap();
    assert_eq!(1, i32::from_ne_bytes(buf));

    assert!(stmt.more_results());
    assert_eq!(2, stmt.num_result_cols().unwrap());
    assert_eq!(1, stmt.fetch(&mut conn).unwrap());
    let mut text = [0u8; 8];
    stmt.get_data(&mut conn, 1, CDataType::Char, &mut text).unwrap();
    assert_eq!(b"foo\0", &text[..4]);

    assert!(stmt.more_results());
    assert_eq!(1, stmt.fetch(&mut conn).unwrap());
    stmt.get_data(&mut conn, 1, CDataType::SLong, &mut buf).unwrap();
    assert_eq!(3, i32::from_ne_bytes(buf));

    assert!(!stmt.more_results());
}

fn keyset_rows(n: usize) -> Vec<WireRow> {
    (1..=n)
        .map(|i| {
            vec![
                Some(i.to_string().into_bytes()),
                Some(format!("(0,{i})").into_bytes()),
                Some((1000 + i).to_string().into_bytes()),
            ]
        })
        .collect()
}

fn keyset_statement(
    conn: &mut Connection<ScriptedWire>,
    rows: usize,
) -> Statement {
    conn.wire().respond_rows(
        "from t",
        vec![
            int_column("id"),
            ColumnInfo::new("ctid", PG_TYPE_TID),
            ColumnInfo::new("oid", PG_TYPE_OID),
        ],
        keyset_rows(rows),
    );
    let mut stmt = Statement::new(conn);
    stmt.options.cursor_type = CursorType::KeysetDriven;
    stmt.options.concurrency = Concurrency::RowVersion;
    stmt.exec_direct(conn, "select id from t").unwrap();
    stmt
}

#[test]
fn keyset_cursor_supports_positioned_delete_and_rollback() {
    // Scenario: delete every row through the cursor inside a transaction,
    // then roll back; the cache shows all rows again.
    let mut options = ConnectionOptions::default();
    options.use_server_side_prepare = false;
    options.updatable_cursors = pg_odbc::UpdatableCursors::all();
    let mut conn = connection(options);
    conn.begin().unwrap();
    conn.wire().respond(
        "delete from",
        vec![QueryResult::command_ok("DELETE 1")],
    );
    let mut stmt = keyset_statement(&mut conn, 4);
    assert_eq!(4, stmt.current_result().unwrap().num_public_rows());

    // Delete first to last.
    stmt.options.row_array_size = 1;
    for _ in 0..4 {
        assert_eq!(1, stmt.fetch(&mut conn).unwrap());
        stmt.set_pos(&mut conn, 0, SetPosOperation::Delete, &[]).unwrap();
    }
    assert_eq!(0, stmt.current_result().unwrap().num_public_rows());
    assert_eq!(4, conn.wire().sent_matching("delete from \"t\" where ctid = ").len());

    // Rolling the transaction back restores every cached row.
    end_transaction(&mut conn, &mut [&mut stmt], false).unwrap();
    assert_eq!(4, stmt.current_result().unwrap().num_public_rows());
}

#[test]
fn positioned_update_rereads_the_row() {
    let mut options = ConnectionOptions::default();
    options.use_server_side_prepare = false;
    options.updatable_cursors = pg_odbc::UpdatableCursors::all();
    let mut conn = connection(options);
    conn.begin().unwrap();
    conn.wire().respond(
        "update \"t\" set",
        vec![QueryResult::command_ok("UPDATE 1")],
    );
    conn.wire().respond(
        "currtid2",
        vec![QueryResult::tuples(
            vec![
                int_column("id"),
                ColumnInfo::new("ctid", PG_TYPE_TID),
                ColumnInfo::new("oid", PG_TYPE_OID),
            ],
            vec![vec![
                Some(b"42".to_vec()),
                Some(b"(7,7)".to_vec()),
                Some(b"1001".to_vec()),
            ]],
        )],
    );
    let mut stmt = keyset_statement(&mut conn, 2);
    assert_eq!(1, stmt.fetch(&mut conn).unwrap());
    stmt.set_pos(
        &mut conn,
        0,
        SetPosOperation::Update,
        &[Some(CValue::Long(42))],
    )
    .unwrap();

    // The update addressed the row by its old tid.
    let updates = conn.wire().sent_matching("update \"t\" set \"id\" = 42 where ctid = '(0,1)' and oid = 1001");
    assert_eq!(1, updates.len());
    // The re-read refreshed tid and cached value.
    let res = stmt.current_result().unwrap();
    assert_eq!((7, 7), (res.keyset[0].block, res.keyset[0].offset));
    assert_eq!(Some(&b"42"[..]), res.value(0, 0));
}

#[test]
fn bookmarks_resolve_to_the_same_row() {
    let mut options = ConnectionOptions::default();
    options.use_server_side_prepare = false;
    let mut conn = connection(options);
    conn.wire()
        .respond_rows("from series", vec![int_column("n")], int_rows(1..=50));
    let mut stmt = Statement::new(&mut conn);
    stmt.options.cursor_type = CursorType::Static;
    stmt.options.use_bookmarks = true;
    stmt.exec_direct(&mut conn, "select n from series").unwrap();

    stmt.fetch_scroll(&mut conn, FetchOrientation::Absolute(20)).unwrap();
    let bookmark = stmt.bookmark(0).unwrap();

    // Move around, then come back through the bookmark.
    stmt.fetch_scroll(&mut conn, FetchOrientation::First).unwrap();
    stmt.fetch_scroll(&mut conn, FetchOrientation::Last).unwrap();
    stmt.fetch_scroll(&mut conn, FetchOrientation::Bookmark(bookmark)).unwrap();
    let mut buf = [0u8; 4];
    stmt.get_data(&mut conn, 1, CDataType::SLong, &mut buf).unwrap();
    assert_eq!(20, i32::from_ne_bytes(buf));

    // Column zero also serves the bookmark of the current row.
    let mut bm = [0u8; 4];
    stmt.get_data(&mut conn, 0, CDataType::Binary, &mut bm).unwrap();
    assert_eq!(bookmark as u32, u32::from_le_bytes(bm));
}

#[test]
fn declare_fetch_streams_in_chunks() {
    let mut options = ConnectionOptions::default();
    options.use_declare_fetch = true;
    options.fetch_size = 2;
    options.use_server_side_prepare = false;
    let mut conn = connection(options);
    conn.wire().respond(
        "declare",
        vec![QueryResult::command_ok("DECLARE CURSOR")],
    );
    conn.wire().respond_rows("fetch 2 in", vec![int_column("n")], int_rows(1..=2));

    let mut stmt = Statement::new(&mut conn);
    stmt.exec_direct(&mut conn, "select n from big").unwrap();

    // The select went out wrapped in a declare, inside a transaction.
    assert_eq!(1, conn.wire().sent_matching("declare \"SQL_CUR").len());
    assert!(conn.wire().sent[0].starts_with("BEGIN"));

    assert_eq!(1, stmt.fetch(&mut conn).unwrap());
    let mut buf = [0u8; 4];
    stmt.get_data(&mut conn, 1, CDataType::SLong, &mut buf).unwrap();
    assert_eq!(1, i32::from_ne_bytes(buf));
    assert_eq!(1, conn.wire().sent_matching("fetch 2 in \"SQL_CUR").len());
}

#[test]
fn failing_statement_rolls_back_to_savepoint() {
    let mut options = ConnectionOptions::default();
    options.rollback_policy = RollbackPolicy::Statement;
    options.use_server_side_prepare = false;
    let mut conn = connection(options);
    conn.set_autocommit(false);
    conn.begin().unwrap();
    conn.wire().fail_contains = Some("broken".to_string());

    let mut stmt = Statement::new(&mut conn);
    let err = stmt.exec_direct(&mut conn, "insert into broken values (1)");
    assert!(err.is_err());

    let sent = conn.wire().sent.clone();
    let svp_pos = sent.iter().position(|s| s.starts_with("SAVEPOINT _EXEC_SVP_"));
    let rb_pos = sent.iter().position(|s| s.starts_with("ROLLBACK TO _EXEC_SVP_"));
    assert!(svp_pos.is_some());
    assert!(rb_pos.is_some());
    assert!(svp_pos < rb_pos);
    // The transaction stays usable.
    assert!(conn.is_in_transaction());
    assert!(!conn.is_in_error_transaction());
    // The diagnostic carries the server text verbatim.
    assert!(
        stmt.diagnostics
            .record(1)
            .unwrap()
            .message
            .contains("simulated failure")
    );
}

#[test]
fn successful_statement_releases_savepoint() {
    let mut options = ConnectionOptions::default();
    options.rollback_policy = RollbackPolicy::Statement;
    options.use_server_side_prepare = false;
    let mut conn = connection(options);
    conn.set_autocommit(false);
    conn.begin().unwrap();

    let mut stmt = Statement::new(&mut conn);
    stmt.exec_direct(&mut conn, "insert into t values (1)").unwrap();
    assert_eq!(1, conn.wire().sent_matching("RELEASE _EXEC_SVP_").len());
}

#[test]
fn data_at_execution_round_trip() {
    let mut options = ConnectionOptions::default();
    options.use_server_side_prepare = false;
    let mut conn = connection(options);
    let mut stmt = Statement::new(&mut conn);
    stmt.prepare("insert into t (name) values (?)").unwrap();
    stmt.bind_parameter(
        1,
        ParamDirection::Input,
        ParamBinding::single(CValue::DataAtExec),
        SqlType::Varchar,
        0,
        0,
    )
    .unwrap();

    assert_eq!(Executed::NeedData, stmt.execute(&mut conn).unwrap());
    assert_eq!(ParamDataOutcome::NeedData(0), stmt.param_data(&mut conn).unwrap());
    stmt.put_data(&mut conn, b"foo", CDataType::Char).unwrap();
    stmt.put_data(&mut conn, b"bar", CDataType::Char).unwrap();
    assert_eq!(ParamDataOutcome::Executed, stmt.param_data(&mut conn).unwrap());

    assert_eq!(
        1,
        conn.wire()
            .sent_matching("insert into t (name) values ('foobar')")
            .len()
    );
}

#[test]
fn get_data_resumes_across_calls() {
    let mut options = ConnectionOptions::default();
    options.use_server_side_prepare = false;
    let mut conn = connection(options);
    conn.wire().respond_rows(
        "from docs",
        vec![text_column("body")],
        vec![vec![Some(b"hello world".to_vec())]],
    );
    let mut stmt = Statement::new(&mut conn);
    stmt.exec_direct(&mut conn, "select body from docs").unwrap();
    stmt.fetch(&mut conn).unwrap();

    let mut buf = [0u8; 7];
    let first = stmt.get_data(&mut conn, 1, CDataType::Char, &mut buf).unwrap();
    assert!(first.is_truncated());
    assert_eq!(Some(Indicator::Length(11)), first.indicator());
    assert_eq!(b"hello \0", &buf);

    let second = stmt.get_data(&mut conn, 1, CDataType::Char, &mut buf).unwrap();
    assert!(!second.is_truncated());
    assert_eq!(Some(Indicator::Length(5)), second.indicator());
    assert_eq!(b"world\0", &buf[..6]);
}

#[test]
fn multi_statement_disables_updatable_cursor() {
    let mut options = ConnectionOptions::default();
    options.use_server_side_prepare = false;
    options.updatable_cursors = pg_odbc::UpdatableCursors::all();
    let mut conn = connection(options);
    let mut stmt = Statement::new(&mut conn);
    stmt.options.cursor_type = CursorType::KeysetDriven;
    stmt.options.concurrency = Concurrency::RowVersion;
    stmt.exec_direct(&mut conn, "select a from t; select b from u")
        .unwrap();
    // Downgraded to read only, no keyset columns were injected.
    assert_eq!(Concurrency::ReadOnly, stmt.options.concurrency);
    assert!(conn.wire().sent_matching("ctid").is_empty());
}

#[test]
fn native_sql_translates_escapes() {
    let mut conn = connection(ConnectionOptions::default());
    let mut stmt = Statement::new(&mut conn);
    let translated = stmt
        .native_sql(&mut conn, "select {fn UCASE(name)}, {d '2011-04-22'} from t")
        .unwrap();
    assert_eq!("select upper(name), '2011-04-22'::date from t", translated);
}

#[test]
fn procedure_call_escape_forms() {
    let mut conn = connection(ConnectionOptions::default());
    let mut stmt = Statement::new(&mut conn);
    let translated = stmt.native_sql(&mut conn, "{call stow()}").unwrap();
    assert_eq!("SELECT * FROM stow()", translated);
    let translated = stmt.native_sql(&mut conn, "{call stow(1, 'x')}").unwrap();
    assert_eq!("SELECT * FROM stow(1, 'x')", translated);
}

#[test]
fn row_count_parses_command_tags() {
    let mut options = ConnectionOptions::default();
    options.use_server_side_prepare = false;
    let mut conn = connection(options);
    conn.wire().respond(
        "update t",
        vec![QueryResult::command_ok("UPDATE 7")],
    );
    let mut stmt = Statement::new(&mut conn);
    stmt.exec_direct(&mut conn, "update t set a = 1").unwrap();
    assert_eq!(7, stmt.row_count());
}

#[test]
fn describe_result_without_execution_uses_parse() {
    let mut conn = connection(ConnectionOptions::default());
    let mut stmt = Statement::new(&mut conn);
    stmt.prepare("select a, b from t").unwrap();
    let _ = stmt.describe_result(&mut conn).unwrap();
    // Described through Parse, nothing was executed.
    assert_eq!(1, conn.wire().parse_log.len());
    assert!(conn.wire().bind_log.is_empty());
}

#[test]
fn wchar_parameters_are_folded_to_utf8() {
    let mut options = ConnectionOptions::default();
    options.use_server_side_prepare = false;
    let mut conn = connection(options);
    let mut stmt = Statement::new(&mut conn);
    stmt.bind_parameter(
        1,
        ParamDirection::Input,
        ParamBinding::single(CValue::WChar(pg_odbc::U16String::from_str("grün"))),
        SqlType::WVarchar,
        0,
        0,
    )
    .unwrap();
    stmt.exec_direct(&mut conn, "insert into t values (?)").unwrap();
    assert_eq!(1, conn.wire().sent_matching("values ('grün')").len());
}

#[test]
fn empty_insert_rewrites_to_default_values() {
    let mut options = ConnectionOptions::default();
    options.use_server_side_prepare = false;
    let mut conn = connection(options);
    let mut stmt = Statement::new(&mut conn);
    stmt.exec_direct(&mut conn, "insert into t () values ()").unwrap();
    assert_eq!(1, conn.wire().sent_matching("DEFAULT VALUES").len());
}

#[test]
fn dollar_quoted_text_passes_untouched() {
    let mut options = ConnectionOptions::default();
    options.use_server_side_prepare = false;
    let mut conn = connection(options);
    let mut stmt = Statement::new(&mut conn);
    let body = "do $x$ begin ? { '\" end $x$";
    stmt.exec_direct(&mut conn, body).unwrap();
    assert_eq!(1, conn.wire().sent_matching(body).len());
}

#[test]
fn fetch_past_end_then_prior_returns_last_row() {
    let mut options = ConnectionOptions::default();
    options.use_server_side_prepare = false;
    let mut conn = connection(options);
    conn.wire().respond_rows("from t3", vec![int_column("n")], int_rows(1..=3));
    let mut stmt = Statement::new(&mut conn);
    stmt.options.cursor_type = CursorType::Static;
    stmt.exec_direct(&mut conn, "select n from t3").unwrap();

    for _ in 0..3 {
        assert_eq!(1, stmt.fetch(&mut conn).unwrap());
    }
    assert_eq!(0, stmt.fetch(&mut conn).unwrap());
    assert_eq!(
        1,
        stmt.fetch_scroll(&mut conn, FetchOrientation::Prior).unwrap()
    );
    let mut buf = [0u8; 4];
    stmt.get_data(&mut conn, 1, CDataType::SLong, &mut buf).unwrap();
    assert_eq!(3, i32::from_ne_bytes(buf));
}

#[test]
fn block_fetch_fills_bound_arrays() {
    let mut options = ConnectionOptions::default();
    options.use_server_side_prepare = false;
    let mut conn = connection(options);
    conn.wire().respond_rows("from t5", vec![int_column("n")], int_rows(1..=5));
    let mut stmt = Statement::new(&mut conn);
    stmt.options.cursor_type = CursorType::Static;
    stmt.options.row_array_size = 3;
    stmt.bind_col(1, CDataType::SLong, 4).unwrap();
    stmt.exec_direct(&mut conn, "select n from t5").unwrap();

    assert_eq!(3, stmt.fetch(&mut conn).unwrap());
    let binding = stmt.col_binding(1).unwrap();
    let values: Vec<i32> = (0..3)
        .map(|row| i32::from_ne_bytes(binding.row_slice(row).unwrap().try_into().unwrap()))
        .collect();
    assert_eq!(vec![1, 2, 3], values);

    // The final partial rowset reports the shorter fetch count.
    assert_eq!(2, stmt.fetch(&mut conn).unwrap());
    assert_eq!(2, stmt.last_fetch_count());
}
