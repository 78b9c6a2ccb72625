//! Database facade behaviour against an in-memory recording backend.

use pgfluent::prelude::*;
use pgfluent::qb::Compiled;
use std::collections::VecDeque;

/// Scripted reply for the next `execute`.
enum Reply {
    Rows(Vec<Record>),
    Affected(u64),
    Fail(&'static str),
}

enum MockCursor {
    Rows(Vec<Record>),
    Affected(u64),
}

#[derive(Default)]
struct Recording {
    sent: Vec<Compiled>,
    script: VecDeque<Reply>,
    transactions: Vec<&'static str>,
    affected: u64,
    in_tx: bool,
}

impl Recording {
    fn with(script: impl IntoIterator<Item = Reply>) -> Self {
        Self {
            script: script.into_iter().collect(),
            ..Self::default()
        }
    }
}

impl Backend for Recording {
    type Cursor = MockCursor;

    fn name(&self) -> &'static str {
        "recording"
    }

    async fn execute(&mut self, compiled: &Compiled) -> DbResult<MockCursor> {
        self.sent.push(compiled.clone());
        match self.script.pop_front() {
            Some(Reply::Rows(rows)) => Ok(MockCursor::Rows(rows)),
            Some(Reply::Affected(n)) => Ok(MockCursor::Affected(n)),
            Some(Reply::Fail(message)) => Err(DbError::Native(message.to_string())),
            None => Ok(MockCursor::Rows(Vec::new())),
        }
    }

    async fn drain(
        &mut self,
        cursor: MockCursor,
        sink: &mut (dyn FnMut(Record) -> bool + Send),
    ) -> DbResult<usize> {
        let MockCursor::Rows(rows) = cursor else {
            return Ok(0);
        };
        let mut delivered = 0;
        for row in rows {
            delivered += 1;
            if !sink(row) {
                break;
            }
        }
        Ok(delivered)
    }

    async fn finish(&mut self, cursor: MockCursor) -> DbResult<u64> {
        self.affected = match cursor {
            MockCursor::Affected(n) => n,
            MockCursor::Rows(rows) => rows.len() as u64,
        };
        Ok(self.affected)
    }

    fn affected_rows(&self) -> u64 {
        self.affected
    }

    async fn begin(&mut self) -> DbResult<()> {
        self.transactions.push("BEGIN");
        self.in_tx = true;
        Ok(())
    }

    async fn commit(&mut self) -> DbResult<()> {
        self.transactions.push("COMMIT");
        self.in_tx = false;
        Ok(())
    }

    async fn rollback(&mut self) -> DbResult<()> {
        self.transactions.push("ROLLBACK");
        self.in_tx = false;
        Ok(())
    }

    fn in_transaction(&self) -> bool {
        self.in_tx
    }
}

fn record(pairs: &[(&str, Value)]) -> Record {
    pairs.iter().map(|(k, v)| (*k, v.clone())).collect()
}

#[tokio::test]
async fn delete_without_predicate_sends_nothing() {
    let mut db = Database::new(Recording::default());

    let err = db.table("users").delete().await.unwrap_err();
    assert!(err.is_guard());
    assert!(db.backend().sent.is_empty());
    assert_eq!(db.last_query(), None);

    let err = db.table("users").filter("").delete().await.unwrap_err();
    assert!(err.is_guard());
    assert!(db.backend().sent.is_empty());

    let err = db
        .table("users")
        .update(&row! { "name" => "x" })
        .await
        .unwrap_err();
    assert!(err.is_guard());
    assert!(db.backend().sent.is_empty());
}

#[tokio::test]
async fn get_compiles_one_select() {
    let rows = vec![record(&[("id", Value::Int(1))]), record(&[("id", Value::Int(2))])];
    let mut db = Database::new(Recording::with([Reply::Rows(rows)]));

    let got = db
        .table("users")
        .filter(("status", 1))
        .order_by("id", "desc")
        .limit(0, 10)
        .get()
        .await
        .unwrap();

    assert_eq!(got.len(), 2);
    let sent = &db.backend().sent;
    assert_eq!(sent.len(), 1);
    assert_eq!(
        sent[0].sql,
        "SELECT * FROM users WHERE status = $1 ORDER BY id DESC LIMIT 10"
    );
    assert_eq!(sent[0].bindings, vec![Value::Int(1)]);
    assert_eq!(db.last_query(), Some(sent[0].sql.as_str()));
}

#[tokio::test]
async fn first_injects_limit_one() {
    let rows = vec![record(&[("id", Value::Int(7))])];
    let mut db = Database::new(Recording::with([Reply::Rows(rows)]));

    let row = db
        .table("users")
        .where_eq("email", "a@b.c")
        .first()
        .await
        .unwrap()
        .unwrap();

    assert_eq!(row.try_get::<i64>("id").unwrap(), 7);
    assert_eq!(
        db.backend().sent[0].sql,
        "SELECT * FROM users WHERE email = $1 LIMIT 1"
    );
}

#[tokio::test]
async fn write_failures_are_soft() {
    let mut db = Database::new(Recording::with([Reply::Fail(
        "23505: duplicate key value violates unique constraint",
    )]));

    let outcome = db
        .table("users")
        .insert(&row! { "email" => "x@y.com" })
        .await
        .unwrap();

    assert!(outcome.is_failed());
    assert!(db.error().unwrap().contains("duplicate key"));
    assert_eq!(
        db.last_query(),
        Some("INSERT INTO users (email) VALUES ($1)")
    );
}

#[tokio::test]
async fn read_failures_propagate() {
    let mut db = Database::new(Recording::with([Reply::Fail("relation \"ghosts\" does not exist")]));

    let err = db.table("ghosts").get().await.unwrap_err();
    assert!(matches!(err, DbError::Native(_)));
    assert!(db.error().is_some());
}

#[tokio::test]
async fn error_is_cleared_by_the_next_statement() {
    let mut db = Database::new(Recording::with([Reply::Fail("boom"), Reply::Affected(1)]));

    let failed = db.table("t").where_eq("id", 1).delete().await.unwrap();
    assert!(failed.is_failed());
    assert_eq!(db.error(), Some("Native error: boom"));

    let done = db.table("t").where_eq("id", 2).delete().await.unwrap();
    assert_eq!(done, Outcome::Done(1));
    assert_eq!(db.error(), None);
    assert_eq!(db.affected_rows(), 1);
}

#[tokio::test]
async fn chains_on_one_handle_do_not_leak() {
    let mut db = Database::new(Recording::default());

    db.table("users")
        .where_eq("status", 1)
        .join_on("orders", "orders.user_id", "=", "users.id")
        .get()
        .await
        .unwrap();
    db.table("users").where_eq("email", "x").get().await.unwrap();

    let sent = &db.backend().sent;
    assert_eq!(sent[1].sql, "SELECT * FROM users WHERE email = $1");
    assert_eq!(sent[1].bindings, vec![Value::from("x")]);
}

#[tokio::test]
async fn aggregates_and_exists() {
    let mut db = Database::new(Recording::with([
        Reply::Rows(vec![record(&[("aggregate", Value::Int(3))])]),
        Reply::Rows(vec![record(&[("aggregate", Value::Float(2.5))])]),
        Reply::Rows(vec![record(&[("exists", Value::Bool(false))])]),
    ]));

    assert_eq!(db.table("users").count().await.unwrap(), 3);
    assert_eq!(db.table("users").avg("age").await.unwrap(), Value::Float(2.5));
    assert!(
        db.table("users")
            .where_eq("id", 9)
            .does_not_exist()
            .await
            .unwrap()
    );

    let sent = &db.backend().sent;
    assert_eq!(sent[0].sql, "SELECT COUNT(*) AS aggregate FROM users");
    assert_eq!(sent[1].sql, "SELECT AVG(age) AS aggregate FROM users");
    assert_eq!(
        sent[2].sql,
        "SELECT EXISTS(SELECT * FROM users WHERE id = $1) AS \"exists\""
    );
}

#[tokio::test]
async fn insert_get_id_reads_lastval() {
    let mut db = Database::new(Recording::with([
        Reply::Affected(1),
        Reply::Rows(vec![record(&[("id", Value::Int(42))])]),
    ]));

    let id = db
        .table("users")
        .insert_get_id(&row! { "email" => "x@y.com" })
        .await
        .unwrap();

    assert_eq!(id, Outcome::Done(42));
    assert_eq!(db.backend().sent[1].sql, "SELECT lastval() AS id");
}

#[tokio::test]
async fn each_stops_when_the_callback_says_so() {
    let rows = (1..=3).map(|i| record(&[("id", Value::Int(i))])).collect();
    let mut db = Database::new(Recording::with([Reply::Rows(rows)]));

    let mut seen = Vec::new();
    let delivered = db
        .table("users")
        .each(|row| {
            seen.push(row.try_get::<i64>("id").unwrap());
            seen.len() < 2
        })
        .await
        .unwrap();

    assert_eq!(delivered, 2);
    assert_eq!(seen, vec![1, 2]);
}

#[tokio::test]
async fn batch_update_reports_affected_rows() {
    let mut db = Database::new(Recording::with([Reply::Affected(2)]));
    let rows = [
        row! { "id" => 2, "name" => "a" },
        row! { "id" => 3, "name" => "b" },
    ];

    let outcome = db
        .table("users")
        .batch_update_by_case(&rows, "id")
        .await
        .unwrap();

    assert_eq!(outcome, Outcome::Done(2));
    let sent = &db.backend().sent;
    assert_eq!(sent.len(), 1);
    assert!(sent[0].sql.ends_with("WHERE id IN ($5, $6)"));
    assert_eq!(sent[0].bindings.len(), 6);
}

#[tokio::test]
async fn decrement_negates_the_amount() {
    let mut db = Database::new(Recording::with([Reply::Affected(1)]));

    let outcome = db
        .table("accounts")
        .where_eq("id", 1)
        .decrement("balance", 100)
        .await
        .unwrap();

    assert!(outcome.is_done());
    let sent = &db.backend().sent[0];
    assert_eq!(sent.sql, "UPDATE accounts SET balance = balance + $1 WHERE id = $2");
    assert_eq!(sent.bindings[0], Value::Int(-100));
}

#[tokio::test]
async fn relation_query_runs_only_when_asked() {
    let mut db = Database::new(Recording::default());
    db.registry_mut()
        .register_table(pgfluent::TableDescriptor::new("articles", "id"));

    let source = RelationSource::new("users", "id", 5);
    let relation = Relation::has_many("articles", "user_id");

    let query = db.related(&relation, &source).unwrap();
    assert_eq!(
        query.to_sql(),
        "SELECT articles.* FROM articles INNER JOIN users ON articles.user_id = users.id \
         WHERE users.id = $1"
    );
    drop(query);
    assert!(db.backend().sent.is_empty());

    db.related(&relation, &source)
        .unwrap()
        .order_by("articles.id", "asc")
        .get()
        .await
        .unwrap();
    assert_eq!(db.backend().sent.len(), 1);

    let missing = db.related(&Relation::has_many("ghosts", "user_id"), &source);
    assert!(matches!(missing, Err(DbError::UnknownTable(_))));
}

#[tokio::test]
async fn transaction_commits_on_ok() {
    let mut db = Database::new(Recording::with([Reply::Affected(1), Reply::Affected(1)]));

    let result: DbResult<u64> = async {
        transaction!(db, {
            let debited = db
                .table("accounts")
                .where_eq("id", 1)
                .decrement("balance", 10)
                .await?;
            assert!(debited.is_done());
            let credited = db
                .table("accounts")
                .where_eq("id", 2)
                .increment("balance", 10)
                .await?;
            Ok(credited.value().unwrap_or(0))
        })
    }
    .await;

    assert_eq!(result.unwrap(), 1);
    assert_eq!(db.backend().transactions, vec!["BEGIN", "COMMIT"]);
    assert!(!db.in_transaction());
}

#[tokio::test]
async fn transaction_rolls_back_on_err() {
    let mut db = Database::new(Recording::default());

    let result: DbResult<()> = async {
        transaction!(db, {
            let _removed = db.table("accounts").delete().await?;
            Ok(())
        })
    }
    .await;

    assert!(result.unwrap_err().is_guard());
    assert_eq!(db.backend().transactions, vec!["BEGIN", "ROLLBACK"]);
}

#[tokio::test]
async fn transaction_rolls_back_when_a_write_is_rejected() {
    let mut db = Database::new(Recording::with([
        Reply::Affected(1),
        Reply::Fail("23514: new row violates check constraint"),
    ]));

    let result: DbResult<()> = async {
        transaction!(db, {
            let debit = db
                .table("accounts")
                .where_eq("id", 1)
                .decrement("balance", 100)
                .await?;
            let credit = db
                .table("accounts")
                .where_eq("id", 2)
                .increment("balance", 100)
                .await?;
            if debit.is_failed() || credit.is_failed() {
                return Err(DbError::Other("transfer rejected".into()));
            }
            Ok(())
        })
    }
    .await;

    assert_eq!(result.unwrap_err().to_string(), "transfer rejected");
    assert_eq!(db.backend().transactions, vec!["BEGIN", "ROLLBACK"]);
    assert!(db.error().unwrap().contains("check constraint"));
}

#[tokio::test]
async fn catalog_rows_map_to_column_info() {
    let rows = vec![record(&[
        ("name", Value::from("id")),
        ("data_type", Value::from("bigint")),
        ("nullable", Value::Bool(false)),
        ("default_value", Value::from("nextval('users_id_seq'::regclass)")),
    ])];
    let mut db = Database::new(Recording::with([Reply::Rows(rows)]));

    let columns = db.describe_columns("users").await.unwrap();
    assert_eq!(columns.len(), 1);
    assert_eq!(columns[0].name, "id");
    assert!(!columns[0].nullable);
    assert_eq!(db.backend().sent[0].bindings, vec![Value::from("users")]);
}
