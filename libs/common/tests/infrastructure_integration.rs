//! Integration tests for the database infrastructure
//!
//! These tests need a reachable PostgreSQL instance and only run when
//! `DATABASE_URL` is set.

use common::database::{DatabaseConfig, health_check, init_pool, run_migrations};
use sqlx::Row;

fn database_configured() -> bool {
    std::env::var("DATABASE_URL").is_ok()
}

/// Connect, migrate and verify the marketplace schema is in place
#[tokio::test]
async fn test_infrastructure_integration() -> Result<(), Box<dyn std::error::Error>> {
    if !database_configured() {
        eprintln!("DATABASE_URL not set; skipping");
        return Ok(());
    }

    let db_config = DatabaseConfig::from_env()?;
    let pool = init_pool(&db_config).await?;

    assert!(health_check(&pool).await?, "Database health check failed");

    // Running twice must be a no-op the second time
    run_migrations(&pool).await?;
    run_migrations(&pool).await?;

    let row = sqlx::query(
        "SELECT COUNT(*)::int4 AS tables FROM information_schema.tables \
         WHERE table_schema = current_schema() \
         AND table_name IN ('users', 'problems', 'quotes')",
    )
    .fetch_one(&pool)
    .await?;
    let tables: i32 = row.get("tables");
    assert_eq!(tables, 3, "Marketplace tables are missing");

    let row = sqlx::query(
        "SELECT COUNT(*)::int4 AS indexes FROM pg_indexes \
         WHERE indexname IN ('quotes_one_accepted_per_problem', 'quotes_one_active_per_provider')",
    )
    .fetch_one(&pool)
    .await?;
    let indexes: i32 = row.get("indexes");
    assert_eq!(indexes, 2, "Quote uniqueness indexes are missing");

    Ok(())
}

/// A problem cannot be open while pointing at an accepted quote
#[tokio::test]
async fn test_status_constraint_rejects_inconsistent_rows() -> Result<(), Box<dyn std::error::Error>>
{
    if !database_configured() {
        eprintln!("DATABASE_URL not set; skipping");
        return Ok(());
    }

    let pool = init_pool(&DatabaseConfig::from_env()?).await?;
    run_migrations(&pool).await?;

    let mut tx = pool.begin().await?;
    sqlx::query("INSERT INTO users (id, display_name) VALUES ('constraint-check', 'check')")
        .execute(&mut *tx)
        .await?;

    let result = sqlx::query(
        "INSERT INTO problems (id, title, description, category, location, estimated_budget, \
                               requester_id, status) \
         VALUES (gen_random_uuid(), 't', 'd', 'c', 'l', 10, 'constraint-check', 'closed')",
    )
    .execute(&mut *tx)
    .await;
    assert!(result.is_err(), "Closed problem without accepted quote was stored");
    tx.rollback().await?;

    Ok(())
}
