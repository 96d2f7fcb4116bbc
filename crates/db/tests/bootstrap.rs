use sqlx::PgPool;

/// Full bootstrap test: connect, migrate, verify schema.
#[sqlx::test(migrations = "../../db/migrations")]
#[ignore = "needs a PostgreSQL DATABASE_URL"]
async fn test_full_bootstrap(pool: PgPool) {
    hostwright_db::health_check(&pool).await.unwrap();

    let tables = [
        "website_statuses",
        "ssl_statuses",
        "cron_run_statuses",
        "backup_statuses",
        "operation_statuses",
        "server_health_statuses",
        "deployment_statuses",
    ];

    for table in tables {
        let count: (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM {table}"))
            .fetch_one(&pool)
            .await
            .unwrap_or_else(|e| panic!("{table} query failed: {e}"));
        assert!(count.0 > 0, "{table} should have seed data, got 0 rows");
    }
}

/// Seeded lookup ids must match the Rust status enums.
#[sqlx::test(migrations = "../../db/migrations")]
#[ignore = "needs a PostgreSQL DATABASE_URL"]
async fn test_status_ids_match_enums(pool: PgPool) {
    use hostwright_db::models::status::{BackupStatus, CronRunStatus, OperationStatus, WebsiteStatus};

    let checks: [(&str, i16, &str); 4] = [
        ("website_statuses", WebsiteStatus::Suspended.id(), WebsiteStatus::Suspended.name()),
        ("cron_run_statuses", CronRunStatus::Running.id(), CronRunStatus::Running.name()),
        ("backup_statuses", BackupStatus::InProgress.id(), BackupStatus::InProgress.name()),
        ("operation_statuses", OperationStatus::Cancelled.id(), OperationStatus::Cancelled.name()),
    ];
    for (table, id, name) in checks {
        let (db_name,): (String,) = sqlx::query_as(&format!("SELECT name FROM {table} WHERE id = $1"))
            .bind(id)
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(db_name, name, "{table} id {id}");
    }
}
