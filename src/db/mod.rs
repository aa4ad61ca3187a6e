pub mod audit_repository;
pub mod mock_audit_repository;
pub mod mock_stripe_event_log_repository;
pub mod postgres_audit_repository;
pub mod postgres_stripe_event_log_repository;
pub mod stripe_event_log_repository;

/// Schema under `migrations/`, embedded at build time and applied on startup.
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!();

#[cfg(test)]
mod tests {
    use super::MIGRATOR;

    #[test]
    fn embedded_migrations_create_every_auxiliary_table() {
        let migrations: Vec<_> = MIGRATOR.iter().collect();
        assert_eq!(migrations.len(), 1);
        assert_eq!(migrations[0].version, 1);

        let sql = migrations[0].sql.to_string();
        for table in ["events", "notifications", "stripe_event_log", "webhook_error_log"] {
            assert!(
                sql.contains(&format!("CREATE TABLE IF NOT EXISTS {table} (")),
                "missing table {table}"
            );
        }
    }
}
