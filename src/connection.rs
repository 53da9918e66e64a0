//! Connection context shared by all statements of one connection.
//!
//! All wire traffic of one connection serializes through `&mut self`;
//! statements receive the connection explicitly for every operation which
//! may cause a round trip. Locale and timezone are captured once at
//! creation into an immutable [`LocalContext`], there is no global mutable
//! state.

use chrono::{Datelike, Local, NaiveDate, Offset, TimeZone, Timelike};
use log::{debug, warn};

use crate::{
    convert::datetime::SimpleTime,
    diagnostics::Diagnostics,
    encoding::ClientEncoding,
    error::Error,
    options::ConnectionOptions,
    scanner::{StatementType, TableRef},
    wire::{QueryResult, WireClient},
};

/// Immutable snapshot of the process locale taken at connection creation.
#[derive(Clone, Copy, Debug)]
pub struct LocalContext {
    /// Offset of the local timezone from UTC in seconds.
    pub zone_offset_secs: i32,
    /// Local date at capture time.
    pub today: (i32, u32, u32),
    /// Local time of day at capture time.
    pub now: (u32, u32, u32),
}

impl LocalContext {
    pub fn capture() -> Self {
        let now = Local::now();
        LocalContext {
            zone_offset_secs: now.offset().fix().local_minus_utc(),
            today: (now.year(), now.month(), now.day()),
            now: (now.hour(), now.minute(), now.second()),
        }
    }

    /// Fixed context for tests.
    pub fn fixed(zone_offset_secs: i32, today: (i32, u32, u32)) -> Self {
        LocalContext {
            zone_offset_secs,
            today,
            now: (0, 0, 0),
        }
    }

    /// Shift a wall clock time carrying a `zone_hours` offset into the
    /// captured local zone. Only invoked for years >= 1970, earlier values
    /// are kept as wall clock time.
    pub fn shift_to_local(&self, st: &mut SimpleTime, zone_hours: i32) {
        let timediff = self.zone_offset_secs - zone_hours * 3600;
        if timediff == 0 {
            return;
        }
        let Some(date) = NaiveDate::from_ymd_opt(st.y, st.m, st.d) else {
            return;
        };
        let Some(datetime) = date.and_hms_opt(st.hh, st.mm, st.ss) else {
            return;
        };
        let shifted = datetime + chrono::Duration::seconds(timediff as i64);
        st.y = shifted.year();
        st.m = shifted.month();
        st.d = shifted.day();
        st.hh = shifted.hour();
        st.mm = shifted.minute();
        st.ss = shifted.second();
    }

    /// Current timestamp in the local zone, used to fill missing date
    /// parts of bare time values.
    pub fn fill_date(&self, st: &mut SimpleTime) {
        if st.y == 0 {
            st.y = self.today.0;
        }
        if st.m == 0 {
            st.m = self.today.1;
        }
        if st.d == 0 {
            st.d = self.today.2;
        }
    }

    /// UTC now expressed in the captured zone. Chrono is consulted once
    /// here so results stay stable within a connection.
    pub fn timestamp_now(&self) -> SimpleTime {
        let now = Local
            .timestamp_opt(chrono::Utc::now().timestamp(), 0)
            .single()
            .unwrap_or_else(|| Local::now());
        SimpleTime {
            y: now.year(),
            m: now.month(),
            d: now.day(),
            hh: now.hour(),
            mm: now.minute(),
            ss: now.second(),
            fr: 0,
            infinity: 0,
        }
    }
}

/// Transaction status of the connection as the driver tracks it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
enum TxStatus {
    #[default]
    Idle,
    InTransaction,
    InErrorTransaction,
}

/// One connection to a PostgreSQL server. Owns the wire client.
pub struct Connection<W> {
    wire: W,
    pub options: ConnectionOptions,
    pub encoding: ClientEncoding,
    pub local: LocalContext,
    pub diagnostics: Diagnostics,
    /// Library level autocommit. When on, the driver brackets multi step
    /// operations with explicit BEGIN/COMMIT.
    autocommit: bool,
    tx: TxStatus,
    dead: bool,
    /// Target of the most recent INSERT, consulted by the `@@identity`
    /// rewrite.
    pub last_insert_table: Option<TableRef>,
    /// Serial identifying statements for plan and savepoint names.
    next_statement_id: u32,
}

impl<W: WireClient> Connection<W> {
    pub fn new(wire: W, options: ConnectionOptions) -> Self {
        Connection {
            wire,
            options,
            encoding: ClientEncoding::Utf8,
            local: LocalContext::capture(),
            diagnostics: Diagnostics::new(),
            autocommit: true,
            tx: TxStatus::Idle,
            dead: false,
            last_insert_table: None,
            next_statement_id: 1,
        }
    }

    pub fn with_encoding(mut self, encoding: ClientEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn next_statement_id(&mut self) -> u32 {
        let id = self.next_statement_id;
        self.next_statement_id += 1;
        id
    }

    pub fn is_autocommit(&self) -> bool {
        self.autocommit
    }

    pub fn set_autocommit(&mut self, autocommit: bool) {
        self.autocommit = autocommit;
    }

    pub fn is_in_transaction(&self) -> bool {
        self.tx != TxStatus::Idle
    }

    pub fn is_in_error_transaction(&self) -> bool {
        self.tx == TxStatus::InErrorTransaction
    }

    pub fn is_dead(&self) -> bool {
        self.dead
    }

    /// Direct access to the wire client for collaborators which manage
    /// their own protocol exchange (large objects, cancel requests).
    pub fn wire(&mut self) -> &mut W {
        &mut self.wire
    }

    /// Send a query through the simple protocol, tracking the transaction
    /// state from what is sent and what comes back.
    pub fn send_query(&mut self, sql: &str) -> Result<Vec<QueryResult>, Error> {
        if self.dead {
            return Err(Error::Protocol("connection is dead".to_string()));
        }
        debug!("send_query: {sql}");
        let results = match self.wire.send_query(sql) {
            Ok(results) => results,
            Err(err) => {
                self.dead = true;
                return Err(err);
            }
        };
        self.track_transaction(sql, &results);
        Ok(results)
    }

    fn track_transaction(&mut self, sql: &str, results: &[QueryResult]) {
        let failed = results
            .iter()
            .any(|r| !r.status.maybe_successful());
        match StatementType::classify(sql) {
            StatementType::Transaction => {
                let first = sql.trim_start().to_ascii_uppercase();
                if first.starts_with("BEGIN") {
                    if !failed {
                        self.tx = TxStatus::InTransaction;
                    }
                } else if first.starts_with("COMMIT")
                    || first.starts_with("ROLLBACK") && !first.starts_with("ROLLBACK TO")
                    || first.starts_with("END")
                    || first.starts_with("ABORT")
                {
                    self.tx = TxStatus::Idle;
                } else if first.starts_with("ROLLBACK TO") && !failed {
                    // Savepoint rollback clears the error state.
                    if self.tx == TxStatus::InErrorTransaction {
                        self.tx = TxStatus::InTransaction;
                    }
                }
            }
            _ => {
                if failed && self.tx != TxStatus::Idle {
                    self.tx = TxStatus::InErrorTransaction;
                }
            }
        }
    }

    /// Extract the error from a failed result, if it failed.
    pub fn result_error(result: &QueryResult) -> Option<Error> {
        if result.status.maybe_successful() {
            None
        } else {
            Some(Error::Server(result.message.clone()))
        }
    }

    pub fn begin(&mut self) -> Result<(), Error> {
        if self.is_in_transaction() {
            return Ok(());
        }
        let results = self.send_query("BEGIN")?;
        if let Some(err) = results.first().and_then(Self::result_error) {
            return Err(err);
        }
        self.tx = TxStatus::InTransaction;
        Ok(())
    }

    pub fn commit(&mut self) -> Result<(), Error> {
        if !self.is_in_transaction() {
            return Ok(());
        }
        let results = self.send_query("COMMIT")?;
        if let Some(err) = results.first().and_then(Self::result_error) {
            return Err(err);
        }
        Ok(())
    }

    pub fn rollback(&mut self) -> Result<(), Error> {
        if !self.is_in_transaction() {
            return Ok(());
        }
        let results = self.send_query("ROLLBACK")?;
        if let Some(err) = results.first().and_then(Self::result_error) {
            return Err(err);
        }
        Ok(())
    }

    /// Roll the transaction back after an unrecoverable statement error.
    pub fn abort(&mut self) {
        if self.is_in_transaction() {
            if let Err(err) = self.rollback() {
                warn!("rollback after error failed: {err}");
            }
        }
    }

    /// Mark an error observed inside a transaction, respecting the rollback
    /// policy tracking.
    pub fn note_statement_error(&mut self) {
        if self.tx == TxStatus::InTransaction {
            self.tx = TxStatus::InErrorTransaction;
        }
    }

    /// Savepoint rollback succeeded, the transaction is usable again.
    pub fn note_savepoint_recovery(&mut self) {
        if self.tx == TxStatus::InErrorTransaction {
            self.tx = TxStatus::InTransaction;
        }
    }
}
