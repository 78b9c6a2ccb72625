//! End-to-end scenarios against a real server. Skipped unless `DATABASE_URL` is set.

use pgfluent::prelude::*;
use chrono::NaiveDate;
use pgfluent::qb::{Compiled, StatementKind};
use uuid::Uuid;

const SCHEMA: &str = "CREATE TEMP TABLE pgfluent_users (\
    id BIGSERIAL PRIMARY KEY, \
    email TEXT NOT NULL UNIQUE, \
    name TEXT, \
    score BIGINT NOT NULL DEFAULT 0, \
    token UUID, \
    born DATE)";

const TOKEN: &str = "6f1c2a0e-8d43-4b7a-9a57-2f0c1d9e3b44";

fn database_url(test: &str) -> Option<String> {
    match std::env::var("DATABASE_URL") {
        Ok(url) => Some(url),
        Err(_) => {
            eprintln!("DATABASE_URL is not set; skipping {test}");
            None
        }
    }
}

async fn seed<B: Backend>(db: &mut Database<B>) -> DbResult<()> {
    let ddl = Compiled::new(SCHEMA, Vec::new(), StatementKind::Update);
    assert!(db.run(&ddl).await.is_done(), "schema: {:?}", db.error());

    let id = db
        .table("pgfluent_users")
        .insert_get_id(&row! {
            "email" => "a@example.com",
            "name" => "a",
            "token" => Uuid::parse_str(TOKEN).expect("uuid literal"),
            "born" => NaiveDate::from_ymd_opt(1990, 4, 12).expect("date literal"),
        })
        .await?;
    assert_eq!(id, Outcome::Done(1));

    let inserted = db
        .table("pgfluent_users")
        .insert_many(&[
            row! { "email" => "b@example.com", "name" => "b" },
            row! { "email" => "c@example.com", "name" => "c" },
        ])
        .await?;
    assert_eq!(inserted, Outcome::Done(2));
    Ok(())
}

/// `tracks_transactions` is whether the backend reports an open transaction.
async fn scenario<B: Backend>(mut db: Database<B>, tracks_transactions: bool) -> DbResult<()> {
    seed(&mut db).await?;
    assert_eq!(db.table("pgfluent_users").count().await?, 3);

    // uuid and date cells bound from their Rust types.
    let by_token = db
        .table("pgfluent_users")
        .where_eq("token", Uuid::parse_str(TOKEN).expect("uuid literal"))
        .where_eq("born", NaiveDate::from_ymd_opt(1990, 4, 12).expect("date literal"))
        .first()
        .await?
        .expect("row with token");
    assert_eq!(by_token.try_get::<String>("email")?, "a@example.com");
    assert_eq!(by_token.try_get::<String>("token")?, TOKEN);
    assert_eq!(by_token.try_get::<String>("born")?, "1990-04-12");
    assert!(
        db.table("pgfluent_users")
            .where_op("born", ">", NaiveDate::from_ymd_opt(2000, 1, 1).expect("date literal"))
            .does_not_exist()
            .await?
    );

    // Upsert hits the unique email and rewrites only the listed column.
    let upserted = db
        .table("pgfluent_users")
        .upsert(
            &row! { "email" => "a@example.com", "name" => "renamed", "score" => 9 },
            &["email"],
            &["name"],
        )
        .await?;
    assert!(upserted.is_done());
    let row = db
        .table("pgfluent_users")
        .where_eq("email", "a@example.com")
        .first()
        .await?
        .expect("row a");
    assert_eq!(row.try_get::<String>("name")?, "renamed");
    assert_eq!(row.try_get::<i64>("score")?, 0);
    assert_eq!(db.table("pgfluent_users").count().await?, 3);

    // A new email inserts the whole row.
    let inserted = db
        .table("pgfluent_users")
        .upsert(
            &row! { "email" => "d@example.com", "name" => "d", "score" => 4 },
            &["email"],
            &["name"],
        )
        .await?;
    assert_eq!(inserted, Outcome::Done(1));
    assert_eq!(db.table("pgfluent_users").count().await?, 4);
    let row = db
        .table("pgfluent_users")
        .where_eq("email", "d@example.com")
        .first()
        .await?
        .expect("row d");
    assert_eq!(row.try_get::<String>("name")?, "d");
    assert_eq!(row.try_get::<i64>("score")?, 4);

    let updated = db
        .table("pgfluent_users")
        .batch_update_by_case(
            &[
                row! { "id" => 1, "name" => "one" },
                row! { "id" => 2, "name" => "two" },
            ],
            "id",
        )
        .await?;
    assert_eq!(updated, Outcome::Done(2));
    let names: Vec<String> = db
        .table("pgfluent_users")
        .select(["name"])
        .order_by("id", "asc")
        .get()
        .await?
        .iter()
        .map(|r| r.try_get::<String>("name"))
        .collect::<DbResult<_>>()?;
    assert_eq!(names, ["one", "two", "c", "d"]);

    let bumped = db
        .table("pgfluent_users")
        .where_eq("id", 3)
        .increment("score", 5)
        .await?;
    assert_eq!(bumped, Outcome::Done(1));
    assert_eq!(
        db.table("pgfluent_users").max("score").await?,
        Value::Int(5)
    );

    // Duplicate email: the server refuses, the caller gets a soft failure.
    let duplicate = db
        .table("pgfluent_users")
        .insert(&row! { "email" => "b@example.com" })
        .await?;
    assert!(duplicate.is_failed());
    assert!(db.error().is_some());

    db.begin_transaction().await?;
    assert_eq!(db.in_transaction(), tracks_transactions);
    db.rollback().await?;
    assert!(!db.in_transaction());

    let rolled_back: DbResult<()> = async {
        transaction!(db, {
            let _removed = db.table("pgfluent_users").where_eq("id", 1).delete().await?;
            Err(DbError::Other("abort".to_string()))
        })
    }
    .await;
    assert!(rolled_back.is_err());
    assert!(db.table("pgfluent_users").where_eq("id", 1).exists().await?);

    let deleted = db
        .table("pgfluent_users")
        .where_eq("email", "c@example.com")
        .limit(0, 1)
        .delete()
        .await?;
    assert_eq!(deleted, Outcome::Done(1));
    assert_eq!(db.table("pgfluent_users").count().await?, 3);

    let columns = db.describe_columns("pgfluent_users").await?;
    assert_eq!(columns.len(), 6);
    assert_eq!(db.primary_key_columns("pgfluent_users").await?, ["id"]);
    Ok(())
}

#[tokio::test]
async fn native_backend_scenario() -> DbResult<()> {
    let Some(url) = database_url("native_backend_scenario") else {
        return Ok(());
    };
    let backend = NativeBackend::connect_url(&url).await?;
    scenario(Database::new(backend), false).await
}

#[tokio::test]
async fn prepared_backend_scenario() -> DbResult<()> {
    let Some(url) = database_url("prepared_backend_scenario") else {
        return Ok(());
    };
    let backend = PreparedBackend::connect_url(&url).await?;
    scenario(Database::new(backend), true).await
}
