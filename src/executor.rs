//! Applying the bootstrap script.
//!
//! The executor runs every statement inside one transaction and either
//! commits all of them or rolls back on the first failure. The database
//! itself sits behind [`BootstrapTarget`] so the transaction discipline is
//! independent of the driver.
//!
//! Note that MySQL/MariaDB commit implicitly around DDL. On those engines
//! the rollback discards whatever the open transaction still holds; engines
//! with transactional DDL get full all-or-nothing behaviour.

use sqlx::mysql::{MySqlConnectOptions, MySqlConnection};
use sqlx::{Connection, Executor};
use tracing::{debug, info, warn};

use crate::error::ProvisionError;
use crate::script::BootstrapScript;
use crate::settings::DatabaseCoordinates;

/// Statements shown in error messages are cut to this many characters.
const STATEMENT_PREVIEW_LEN: usize = 80;

/// A database session able to run the bootstrap inside a transaction.
#[allow(async_fn_in_trait)]
pub trait BootstrapTarget {
    async fn begin(&mut self) -> Result<(), sqlx::Error>;
    async fn execute(&mut self, statement: &str) -> Result<(), sqlx::Error>;
    async fn commit(&mut self) -> Result<(), sqlx::Error>;
    async fn rollback(&mut self) -> Result<(), sqlx::Error>;
}

/// Run `script` against `target` atomically.
///
/// Returns the number of statements applied. On a statement failure the
/// transaction is rolled back and the failing statement is reported; a
/// rollback failure is logged but the statement error is what surfaces.
pub async fn apply_script<T: BootstrapTarget>(
    target: &mut T,
    script: &BootstrapScript,
) -> Result<usize, ProvisionError> {
    let statements = script.statements();

    target
        .begin()
        .await
        .map_err(|source| ProvisionError::Transaction {
            operation: "begin",
            source,
        })?;

    for (index, statement) in statements.iter().enumerate() {
        debug!(index, statement = %preview(statement), "executing bootstrap statement");
        if let Err(source) = target.execute(statement).await {
            if let Err(rollback_err) = target.rollback().await {
                warn!(error = %rollback_err, "rollback after failed statement also failed");
            }
            return Err(ProvisionError::Statement {
                index,
                statement: preview(statement),
                source,
            });
        }
    }

    target
        .commit()
        .await
        .map_err(|source| ProvisionError::Transaction {
            operation: "commit",
            source,
        })?;

    info!(statements = statements.len(), "bootstrap script committed");
    Ok(statements.len())
}

fn preview(statement: &str) -> String {
    let single_line = statement.split_whitespace().collect::<Vec<_>>().join(" ");
    if single_line.chars().count() <= STATEMENT_PREVIEW_LEN {
        single_line
    } else {
        let cut: String = single_line.chars().take(STATEMENT_PREVIEW_LEN).collect();
        format!("{}...", cut)
    }
}

// ---------------------------------------------------------------------------
// MySQL / MariaDB
// ---------------------------------------------------------------------------

/// A single MySQL connection used for the whole bootstrap.
///
/// Transaction control is sent as plain `START TRANSACTION` / `COMMIT` /
/// `ROLLBACK` statements instead of through `sqlx::Transaction`. A sqlx
/// transaction borrows the connection for its lifetime, which does not fit
/// the `&mut self` begin/execute/commit calls of [`BootstrapTarget`].
pub struct MySqlTarget {
    conn: MySqlConnection,
}

impl MySqlTarget {
    /// Open a connection. Failure here means nothing has been mutated.
    pub async fn connect(database: &DatabaseCoordinates) -> Result<Self, ProvisionError> {
        let options = MySqlConnectOptions::new()
            .host(&database.host)
            .port(database.port)
            .username(&database.username)
            .password(database.password.as_str())
            .database(&database.name);

        let conn = MySqlConnection::connect_with(&options)
            .await
            .map_err(ProvisionError::DatabaseConnection)?;
        info!(host = %database.host, port = database.port, database = %database.name, "connected to database");
        Ok(Self { conn })
    }

    /// Close the connection cleanly. Dropping the target also releases it.
    pub async fn close(self) -> Result<(), ProvisionError> {
        self.conn.close().await.map_err(|source| ProvisionError::Transaction {
            operation: "close",
            source,
        })
    }
}

impl BootstrapTarget for MySqlTarget {
    async fn begin(&mut self) -> Result<(), sqlx::Error> {
        self.conn.execute("START TRANSACTION").await.map(|_| ())
    }

    async fn execute(&mut self, statement: &str) -> Result<(), sqlx::Error> {
        // Plain &str runs unprepared; DDL and SET are not all preparable.
        self.conn.execute(statement).await.map(|_| ())
    }

    async fn commit(&mut self) -> Result<(), sqlx::Error> {
        self.conn.execute("COMMIT").await.map(|_| ())
    }

    async fn rollback(&mut self) -> Result<(), sqlx::Error> {
        self.conn.execute("ROLLBACK").await.map(|_| ())
    }
}
