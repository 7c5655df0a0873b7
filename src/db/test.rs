// Repository tests against a real Postgres. `#[sqlx::test]` creates a fresh
// database per test from DATABASE_URL; the schema comes from run_migrations.

use axum::http::StatusCode;
use chrono::{Duration, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::recovery::MAX_RECOVERY_ATTEMPTS;
use super::Database;
use crate::error::AppError;
use crate::models::*;

async fn setup(pool: PgPool) -> anyhow::Result<Database> {
    let db = Database::from_pool(pool);
    db.run_migrations().await?;
    Ok(db)
}

fn new_product(name: &str, brand: Option<&str>, product_type: Option<&str>, quantity: i32) -> CreateProductRequest {
    CreateProductRequest {
        sku: None,
        name: name.to_string(),
        brand: brand.map(str::to_string),
        product_type: product_type.map(str::to_string),
        quantity,
        fragility: Fragility::NonFragile,
        category_id: None,
        location_id: None,
    }
}

fn new_user(role: UserRole, email: &str) -> CreateUserRequest {
    CreateUserRequest {
        role,
        name: "Ana".to_string(),
        surname: None,
        email: email.to_string(),
        confirm_email: email.to_string(),
    }
}

fn new_count(product_id: Uuid, physical_quantity: i32) -> NewVerification {
    NewVerification {
        product_id,
        physical_quantity,
        observations: None,
        employee_code: "48213".to_string(),
        report_id: None,
    }
}

// -----------------------------------------------------------------------------
// SCHEMA
// -----------------------------------------------------------------------------

#[sqlx::test(migrations = false)]
async fn migrations_can_run_again(pool: PgPool) -> anyhow::Result<()> {
    let db = setup(pool).await?;
    db.run_migrations().await?;
    assert!(db.health_check().await);
    Ok(())
}

#[sqlx::test(migrations = false)]
async fn bootstrap_admin_is_created_once(pool: PgPool) -> anyhow::Result<()> {
    let db = setup(pool).await?;

    assert!(db.ensure_bootstrap_admin(" Root@CITAPP.com ", "Root").await?);
    assert!(!db.ensure_bootstrap_admin("root@citapp.com", "Root").await?);

    let admins = db.active_admins().await?;
    assert_eq!(admins.len(), 1);
    assert_eq!(admins[0].email, "root@citapp.com");
    Ok(())
}

#[sqlx::test(migrations = false)]
async fn bootstrap_admin_skips_an_email_already_taken(pool: PgPool) -> anyhow::Result<()> {
    let db = setup(pool).await?;
    db.create_user(&new_user(UserRole::Employee, "boss@citapp.com"), "hash", Some("48213"))
        .await?;

    assert!(!db.ensure_bootstrap_admin("boss@citapp.com", "Boss").await?);
    assert!(db.active_admins().await?.is_empty());
    Ok(())
}

// -----------------------------------------------------------------------------
// PRODUCTS
// -----------------------------------------------------------------------------

#[sqlx::test(migrations = false)]
async fn equivalent_product_absorbs_quantity(pool: PgPool) -> anyhow::Result<()> {
    let db = setup(pool).await?;

    let (first, merged) = db
        .create_or_merge_product(&new_product("Safety Gloves", Some("Truper"), None, 5), "PROD-AAA111")
        .await?;
    assert!(!merged);

    let (second, merged) = db
        .create_or_merge_product(
            &new_product("  safety gloves ", Some("TRUPER"), Some("   "), 3),
            "PROD-BBB222",
        )
        .await?;
    assert!(merged);
    assert_eq!(second.id, first.id);
    assert_eq!(second.quantity, 8);
    assert_eq!(second.sku, "PROD-AAA111");

    let (_, total) = db.list_products(&ProductFilters::default(), 1, 20).await?;
    assert_eq!(total, 1);
    Ok(())
}

#[sqlx::test(migrations = false)]
async fn blank_brand_and_type_are_stored_as_null(pool: PgPool) -> anyhow::Result<()> {
    let db = setup(pool).await?;

    let (product, _) = db
        .create_or_merge_product(&new_product(" Cable ", Some("  "), Some(""), 1), "PROD-CAB001")
        .await?;
    assert_eq!(product.name, "Cable");
    assert_eq!(product.brand, None);
    assert_eq!(product.product_type, None);
    Ok(())
}

#[sqlx::test(migrations = false)]
async fn different_brand_is_a_different_product(pool: PgPool) -> anyhow::Result<()> {
    let db = setup(pool).await?;

    db.create_or_merge_product(&new_product("Cable", Some("Acme"), None, 1), "PROD-CAB001")
        .await?;
    let (_, merged) = db
        .create_or_merge_product(&new_product("Cable", None, Some("Acme"), 1), "PROD-CAB002")
        .await?;
    assert!(!merged);
    Ok(())
}

#[sqlx::test(migrations = false)]
async fn accented_names_merge_regardless_of_case(pool: PgPool) -> anyhow::Result<()> {
    let db = setup(pool).await?;

    db.create_or_merge_product(&new_product("CAFÉ", Some("ÑANDÚ"), None, 2), "PROD-CAF001")
        .await?;
    let (product, merged) = db
        .create_or_merge_product(&new_product("café", Some("ñandú\t"), None, 3), "PROD-CAF002")
        .await?;
    assert!(merged);
    assert_eq!(product.quantity, 5);
    Ok(())
}

#[sqlx::test(migrations = false)]
async fn concurrent_creates_insert_one_row(pool: PgPool) -> anyhow::Result<()> {
    let db = setup(pool).await?;

    let tasks: Vec<_> = (0..4)
        .map(|n| {
            let db = db.clone();
            tokio::spawn(async move {
                db.create_or_merge_product(
                    &new_product("Helmet", Some("3M"), None, 1),
                    &format!("PROD-HLM00{n}"),
                )
                .await
            })
        })
        .collect();

    let mut inserted = 0;
    for task in tasks {
        let (_, merged) = task.await??;
        if !merged {
            inserted += 1;
        }
    }
    assert_eq!(inserted, 1);

    let (items, total) = db.list_products(&ProductFilters::default(), 1, 20).await?;
    assert_eq!(total, 1);
    assert_eq!(items[0].product.quantity, 4);
    Ok(())
}

#[sqlx::test(migrations = false)]
async fn update_trims_names_and_keeps_merging(pool: PgPool) -> anyhow::Result<()> {
    let db = setup(pool).await?;

    let (product, _) = db
        .create_or_merge_product(&new_product("Drill", Some("Bosch"), None, 1), "PROD-DRL001")
        .await?;

    let update = UpdateProductRequest {
        brand: Some("Acme\t".to_string()),
        product_type: Some(" Power tool ".to_string()),
        ..Default::default()
    };
    let updated = db
        .update_product(product.id, &update)
        .await?
        .expect("product exists");
    assert_eq!(updated.brand.as_deref(), Some("Acme"));
    assert_eq!(updated.product_type.as_deref(), Some("Power tool"));
    assert_eq!(updated.name, "Drill");

    let (merged_into, merged) = db
        .create_or_merge_product(
            &new_product("drill", Some("ACME"), Some("power tool"), 2),
            "PROD-DRL002",
        )
        .await?;
    assert!(merged);
    assert_eq!(merged_into.id, product.id);
    assert_eq!(merged_into.quantity, 3);
    Ok(())
}

#[sqlx::test(migrations = false)]
async fn update_of_missing_product_is_none(pool: PgPool) -> anyhow::Result<()> {
    let db = setup(pool).await?;
    let update = UpdateProductRequest {
        quantity: Some(4),
        ..Default::default()
    };
    assert!(db.update_product(Uuid::new_v4(), &update).await?.is_none());
    Ok(())
}

#[sqlx::test(migrations = false)]
async fn huge_page_numbers_return_an_empty_page(pool: PgPool) -> anyhow::Result<()> {
    let db = setup(pool).await?;
    db.create_or_merge_product(&new_product("Tape", None, None, 1), "PROD-TAP001")
        .await?;

    let (items, total) = db
        .list_products(&ProductFilters::default(), i32::MAX, 100)
        .await?;
    assert!(items.is_empty());
    assert_eq!(total, 1);
    Ok(())
}

#[sqlx::test(migrations = false)]
async fn merge_keys_are_backfilled(pool: PgPool) -> anyhow::Result<()> {
    let db = setup(pool.clone()).await?;
    sqlx::query("INSERT INTO products (sku, name, brand) VALUES ('PROD-OLD001', ' Mask ', 'ACME')")
        .execute(&pool)
        .await?;

    db.run_migrations().await?;

    let (_, merged) = db
        .create_or_merge_product(&new_product("mask", Some("acme"), None, 1), "PROD-NEW001")
        .await?;
    assert!(merged);
    Ok(())
}

#[sqlx::test(migrations = false)]
async fn counted_products_cannot_be_deleted(pool: PgPool) -> anyhow::Result<()> {
    let db = setup(pool).await?;
    let (product, _) = db
        .create_or_merge_product(&new_product("Ladder", None, None, 2), "PROD-LAD001")
        .await?;
    db.insert_verification(&new_count(product.id, 2)).await?;

    let err = db
        .delete_product(product.id)
        .await
        .expect_err("product has counts");
    assert_eq!(err.classify().0, StatusCode::CONFLICT);

    assert!(!db.delete_product(Uuid::new_v4()).await?);
    Ok(())
}

// -----------------------------------------------------------------------------
// PASSWORD RECOVERY
// -----------------------------------------------------------------------------

#[sqlx::test(migrations = false)]
async fn recovery_needs_a_registered_email(pool: PgPool) -> anyhow::Result<()> {
    let db = setup(pool).await?;
    let expires_at = Utc::now() + Duration::minutes(15);

    assert!(!db.request_password_recovery("nobody@citapp.com", "123456", expires_at).await?);
    Ok(())
}

#[sqlx::test(migrations = false)]
async fn new_recovery_code_replaces_the_old_one(pool: PgPool) -> anyhow::Result<()> {
    let db = setup(pool).await?;
    db.create_user(&new_user(UserRole::Admin, "ana@citapp.com"), "old-hash", None)
        .await?;
    let expires_at = Utc::now() + Duration::minutes(15);

    assert!(db.request_password_recovery("ana@citapp.com", "111111", expires_at).await?);
    assert!(db.request_password_recovery("ANA@citapp.com", "222222", expires_at).await?);

    assert!(!db.check_recovery_code("ana@citapp.com", "111111").await?);
    assert!(!db.reset_password_with_code("ana@citapp.com", "111111", "new-hash").await?);

    assert!(db.check_recovery_code("ana@citapp.com", "222222").await?);
    assert!(db.reset_password_with_code("ana@citapp.com", "222222", "new-hash").await?);

    let ana = db.find_user_by_email("ana@citapp.com").await?.expect("user exists");
    assert_eq!(ana.password_hash, "new-hash");
    Ok(())
}

#[sqlx::test(migrations = false)]
async fn spent_recovery_code_cannot_be_reused(pool: PgPool) -> anyhow::Result<()> {
    let db = setup(pool).await?;
    db.create_user(&new_user(UserRole::Admin, "ana@citapp.com"), "old-hash", None)
        .await?;
    let expires_at = Utc::now() + Duration::minutes(15);
    db.request_password_recovery("ana@citapp.com", "333333", expires_at).await?;

    assert!(db.reset_password_with_code("ana@citapp.com", "333333", "first").await?);
    assert!(!db.check_recovery_code("ana@citapp.com", "333333").await?);
    assert!(!db.reset_password_with_code("ana@citapp.com", "333333", "second").await?);
    Ok(())
}

#[sqlx::test(migrations = false)]
async fn expired_recovery_code_is_refused(pool: PgPool) -> anyhow::Result<()> {
    let db = setup(pool).await?;
    db.create_user(&new_user(UserRole::Admin, "ana@citapp.com"), "old-hash", None)
        .await?;
    let expired = Utc::now() - Duration::minutes(1);
    db.request_password_recovery("ana@citapp.com", "444444", expired).await?;

    assert!(!db.check_recovery_code("ana@citapp.com", "444444").await?);
    assert!(!db.reset_password_with_code("ana@citapp.com", "444444", "new-hash").await?);
    Ok(())
}

#[sqlx::test(migrations = false)]
async fn recovery_code_locks_after_wrong_guesses(pool: PgPool) -> anyhow::Result<()> {
    let db = setup(pool).await?;
    db.create_user(&new_user(UserRole::Admin, "ana@citapp.com"), "old-hash", None)
        .await?;
    let expires_at = Utc::now() + Duration::minutes(15);
    db.request_password_recovery("ana@citapp.com", "555555", expires_at).await?;

    for _ in 0..MAX_RECOVERY_ATTEMPTS {
        assert!(!db.check_recovery_code("ana@citapp.com", "000000").await?);
    }
    assert!(!db.check_recovery_code("ana@citapp.com", "555555").await?);
    assert!(!db.reset_password_with_code("ana@citapp.com", "555555", "new-hash").await?);

    // A fresh code starts with a clean slate
    db.request_password_recovery("ana@citapp.com", "666666", expires_at).await?;
    assert!(db.check_recovery_code("ana@citapp.com", "666666").await?);
    Ok(())
}

// -----------------------------------------------------------------------------
// VERIFICATIONS
// -----------------------------------------------------------------------------

#[sqlx::test(migrations = false)]
async fn counts_snapshot_the_stock_at_submission(pool: PgPool) -> anyhow::Result<()> {
    let db = setup(pool).await?;
    let (product, _) = db
        .create_or_merge_product(&new_product("Rope", None, None, 10), "PROD-ROP001")
        .await?;

    let short = db
        .insert_verification(&new_count(product.id, 7))
        .await?
        .expect("product exists");
    assert_eq!(short.system_quantity, 10);
    assert!(!short.matches);

    let update = UpdateProductRequest {
        quantity: Some(7),
        ..Default::default()
    };
    db.update_product(product.id, &update).await?;

    let exact = db
        .insert_verification(&new_count(product.id, 7))
        .await?
        .expect("product exists");
    assert_eq!(exact.system_quantity, 7);
    assert!(exact.matches);

    let history = db.product_verifications(product.id).await?;
    assert_eq!(history.len(), 2);
    let first = history
        .iter()
        .find(|d| d.verification.id == short.id)
        .expect("first count listed");
    assert_eq!(first.verification.system_quantity, 10);
    assert_eq!(first.product_sku.as_deref(), Some("PROD-ROP001"));

    let stats = db.dashboard_stats().await?;
    assert_eq!(stats.total_verifications, 2);
    assert_eq!(stats.total_discrepancies, 1);
    Ok(())
}

#[sqlx::test(migrations = false)]
async fn count_of_missing_product_stores_nothing(pool: PgPool) -> anyhow::Result<()> {
    let db = setup(pool).await?;
    assert!(db.insert_verification(&new_count(Uuid::new_v4(), 1)).await?.is_none());
    assert!(db.all_verifications().await?.is_empty());
    Ok(())
}

#[sqlx::test(migrations = false)]
async fn duplicate_category_is_a_conflict(pool: PgPool) -> anyhow::Result<()> {
    let db = setup(pool).await?;
    let req = CreateCategoryRequest {
        name: "Tools".to_string(),
        description: None,
    };
    db.create_category(&req).await?;

    match db.create_category(&req).await {
        Err(err @ AppError::Database(_)) => {
            assert_eq!(err.classify().0, StatusCode::CONFLICT)
        }
        other => panic!("expected a unique violation, got {other:?}"),
    }
    Ok(())
}
