//! Shell commands for per-site databases.
//!
//! Identifiers must already have passed
//! [`validate_db_identifier`](crate::site::validate_db_identifier); passwords
//! are generated alphanumerics. Every SQL script is passed through
//! [`shell::quote`](crate::shell::quote) as a whole.

use crate::shell::quote;
use crate::site::DbEngine;

/// Idempotently create the database and a user with full privileges on it.
pub fn create_command(engine: DbEngine, db_name: &str, db_user: &str, password: &str) -> String {
    match engine {
        DbEngine::Mariadb => {
            let sql = format!(
                "CREATE DATABASE IF NOT EXISTS `{db_name}` CHARACTER SET utf8mb4 COLLATE utf8mb4_unicode_ci; \
                 CREATE USER IF NOT EXISTS '{db_user}'@'localhost' IDENTIFIED BY '{password}'; \
                 GRANT ALL PRIVILEGES ON `{db_name}`.* TO '{db_user}'@'localhost'; \
                 FLUSH PRIVILEGES;"
            );
            format!("mysql -e {}", quote(&sql))
        }
        DbEngine::Postgres => {
            let role_check = format!("SELECT 1 FROM pg_roles WHERE rolname='{db_user}'");
            let create_role = format!("CREATE ROLE {db_user} LOGIN PASSWORD '{password}'");
            let db_check = format!("SELECT 1 FROM pg_database WHERE datname='{db_name}'");
            format!(
                "(sudo -u postgres psql -tAc {} | grep -q 1 || sudo -u postgres psql -v ON_ERROR_STOP=1 -c {}) && \
                 (sudo -u postgres psql -tAc {} | grep -q 1 || sudo -u postgres createdb -O {db_user} {db_name})",
                quote(&role_check),
                quote(&create_role),
                quote(&db_check),
            )
        }
    }
}

/// Drop the database and its user if they exist.
pub fn drop_command(engine: DbEngine, db_name: &str, db_user: &str) -> String {
    match engine {
        DbEngine::Mariadb => {
            let sql = format!(
                "DROP DATABASE IF EXISTS `{db_name}`; DROP USER IF EXISTS '{db_user}'@'localhost';"
            );
            format!("mysql -e {}", quote(&sql))
        }
        DbEngine::Postgres => format!(
            "sudo -u postgres dropdb --if-exists {db_name} && sudo -u postgres dropuser --if-exists {db_user}"
        ),
    }
}

/// Dump the database as plain SQL to `out_path`.
pub fn dump_command(engine: DbEngine, db_name: &str, out_path: &str) -> String {
    match engine {
        DbEngine::Mariadb => format!(
            "mysqldump --single-transaction --routines --triggers {db_name} > {}",
            quote(out_path)
        ),
        DbEngine::Postgres => format!(
            "sudo -u postgres pg_dump --clean --if-exists {db_name} > {}",
            quote(out_path)
        ),
    }
}

/// Load a plain SQL dump from `in_path` into the database.
pub fn restore_command(engine: DbEngine, db_name: &str, in_path: &str) -> String {
    match engine {
        DbEngine::Mariadb => format!("mysql {db_name} < {}", quote(in_path)),
        DbEngine::Postgres => format!(
            "sudo -u postgres psql -v ON_ERROR_STOP=1 {db_name} < {}",
            quote(in_path)
        ),
    }
}
