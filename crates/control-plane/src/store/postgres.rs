//! PostgreSQL-backed store.
//!
//! Objects live in a single JSONB table keyed by (kind, namespace, name).
//! Writes run in a transaction that locks the row, checks the caller's
//! `resource_version` and emits a `pg_notify` that is delivered on commit;
//! a background `PgListener` turns notifications into watch events.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgListener;
use sqlx::{Postgres, Transaction};
use tokio::sync::broadcast;

use crate::api::{ObjectKey, ObjectMeta};
use crate::db::pool::health_check;
use crate::db::DbPool;

use super::{
    apply_write, prepare_create, RawObject, Store, StoreError, StoreResult, WatchEvent,
    WatchEventType, WATCH_CAPACITY,
};

/// Channel used for change notifications.
pub const NOTIFY_CHANNEL: &str = "flowrun_objects";

const RECONNECT_DELAY: Duration = Duration::from_secs(1);

const SCHEMA_STATEMENTS: &[&str] = &[
    "CREATE SCHEMA IF NOT EXISTS flowrun",
    r#"
    CREATE TABLE IF NOT EXISTS flowrun.object (
        kind TEXT NOT NULL,
        namespace TEXT NOT NULL,
        name TEXT NOT NULL,
        uid TEXT NOT NULL,
        resource_version BIGINT NOT NULL,
        generation BIGINT NOT NULL,
        metadata JSONB NOT NULL,
        spec JSONB NOT NULL,
        status JSONB NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        PRIMARY KEY (kind, namespace, name)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS object_kind_idx ON flowrun.object (kind)",
];

/// Notification payload; objects are re-read by the listener.
#[derive(Debug, Serialize, Deserialize)]
struct Notification {
    #[serde(rename = "type")]
    event_type: WatchEventType,
    kind: String,
    namespace: String,
    name: String,
}

type Row = (serde_json::Value, serde_json::Value, serde_json::Value);

pub struct PgStore {
    pool: DbPool,
    events: broadcast::Sender<WatchEvent>,
}

impl PgStore {
    /// Create the schema if needed and start the change feed listener.
    pub async fn connect(pool: DbPool) -> StoreResult<Self> {
        init_schema(&pool).await?;

        let (events, _) = broadcast::channel(WATCH_CAPACITY);
        let store = Self { pool, events };
        store.spawn_listener().await?;

        Ok(store)
    }

    async fn spawn_listener(&self) -> StoreResult<()> {
        let listener = listen(&self.pool).await?;
        tokio::spawn(run_listener(self.pool.clone(), self.events.clone(), listener));

        tracing::info!(channel = NOTIFY_CHANNEL, "Listening for object changes");
        Ok(())
    }
}

async fn listen(pool: &DbPool) -> StoreResult<PgListener> {
    let mut listener = PgListener::connect_with(pool).await?;
    listener.listen(NOTIFY_CHANNEL).await?;
    Ok(listener)
}

/// Forward notifications until the process exits.
///
/// Notifications sent while the connection is down are gone, so after every
/// reconnect a resync marker goes out on the feed.
async fn run_listener(
    pool: DbPool,
    events: broadcast::Sender<WatchEvent>,
    mut listener: PgListener,
) {
    loop {
        match listener.try_recv().await {
            Ok(Some(notification)) => {
                if let Err(e) = forward(&pool, &events, notification.payload()).await {
                    tracing::warn!(error = %e, "Dropped change notification");
                }
                continue;
            }
            Ok(None) => tracing::warn!("Change feed connection lost"),
            Err(e) => tracing::warn!(error = %e, "Change feed interrupted"),
        }

        listener = reconnect(&pool).await;
        let _ = events.send(WatchEvent::resync());
        tracing::info!(channel = NOTIFY_CHANNEL, "Change feed reconnected, resync requested");
    }
}

async fn reconnect(pool: &DbPool) -> PgListener {
    loop {
        tokio::time::sleep(RECONNECT_DELAY).await;
        match listen(pool).await {
            Ok(listener) => return listener,
            Err(e) => tracing::warn!(error = %e, "Reconnecting change feed failed"),
        }
    }
}

/// Create the object table.
pub async fn init_schema(pool: &DbPool) -> StoreResult<()> {
    for statement in SCHEMA_STATEMENTS {
        sqlx::query(statement).execute(pool).await?;
    }
    Ok(())
}

async fn forward(
    pool: &DbPool,
    events: &broadcast::Sender<WatchEvent>,
    payload: &str,
) -> StoreResult<()> {
    let notification: Notification = serde_json::from_str(payload)?;
    let key = ObjectKey::new(notification.namespace, notification.name);

    let object = match notification.event_type {
        WatchEventType::Deleted => None,
        _ => fetch(pool, &notification.kind, &key).await?,
    };

    let _ = events.send(WatchEvent {
        event_type: notification.event_type,
        kind: notification.kind,
        key,
        object,
    });
    Ok(())
}

fn decode(kind: &str, (metadata, spec, status): Row) -> StoreResult<RawObject> {
    Ok(RawObject {
        kind: kind.to_string(),
        metadata: serde_json::from_value::<ObjectMeta>(metadata)?,
        spec,
        status,
    })
}

async fn fetch(pool: &DbPool, kind: &str, key: &ObjectKey) -> StoreResult<Option<RawObject>> {
    let row: Option<Row> = sqlx::query_as(
        r#"
        SELECT metadata, spec, status
        FROM flowrun.object
        WHERE kind = $1 AND namespace = $2 AND name = $3
        "#,
    )
    .bind(kind)
    .bind(&key.namespace)
    .bind(&key.name)
    .fetch_optional(pool)
    .await?;

    row.map(|r| decode(kind, r)).transpose()
}

async fn notify(
    tx: &mut Transaction<'_, Postgres>,
    event_type: WatchEventType,
    kind: &str,
    key: &ObjectKey,
) -> StoreResult<()> {
    let payload = serde_json::to_string(&Notification {
        event_type,
        kind: kind.to_string(),
        namespace: key.namespace.clone(),
        name: key.name.clone(),
    })?;

    sqlx::query("SELECT pg_notify($1, $2)")
        .bind(NOTIFY_CHANNEL)
        .bind(payload)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

impl PgStore {
    async fn write(&self, incoming: RawObject, status_only: bool) -> StoreResult<RawObject> {
        let kind = incoming.kind.clone();
        let key = incoming.key();
        let mut tx = self.pool.begin().await?;

        let row: Option<Row> = sqlx::query_as(
            r#"
            SELECT metadata, spec, status
            FROM flowrun.object
            WHERE kind = $1 AND namespace = $2 AND name = $3
            FOR UPDATE
            "#,
        )
        .bind(&kind)
        .bind(&key.namespace)
        .bind(&key.name)
        .fetch_optional(&mut *tx)
        .await?;

        let current = match row {
            Some(row) => decode(&kind, row)?,
            None => return Err(StoreError::NotFound { kind, key }),
        };

        let Some(next) = apply_write(&current, incoming, status_only)? else {
            tx.commit().await?;
            return Ok(current);
        };

        sqlx::query(
            r#"
            UPDATE flowrun.object
            SET resource_version = $4, generation = $5, metadata = $6, spec = $7, status = $8,
                updated_at = now()
            WHERE kind = $1 AND namespace = $2 AND name = $3
            "#,
        )
        .bind(&kind)
        .bind(&key.namespace)
        .bind(&key.name)
        .bind(next.metadata.resource_version)
        .bind(next.metadata.generation)
        .bind(serde_json::to_value(&next.metadata)?)
        .bind(&next.spec)
        .bind(&next.status)
        .execute(&mut *tx)
        .await?;

        notify(&mut tx, WatchEventType::Modified, &kind, &key).await?;
        tx.commit().await?;

        Ok(next)
    }
}

#[async_trait]
impl Store for PgStore {
    async fn get(&self, kind: &str, key: &ObjectKey) -> StoreResult<RawObject> {
        fetch(&self.pool, kind, key)
            .await?
            .ok_or_else(|| StoreError::NotFound {
                kind: kind.to_string(),
                key: key.clone(),
            })
    }

    async fn list(&self, kind: &str, namespace: Option<&str>) -> StoreResult<Vec<RawObject>> {
        let rows: Vec<Row> = sqlx::query_as(
            r#"
            SELECT metadata, spec, status
            FROM flowrun.object
            WHERE kind = $1 AND ($2::TEXT IS NULL OR namespace = $2)
            ORDER BY namespace, name
            "#,
        )
        .bind(kind)
        .bind(namespace)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(|r| decode(kind, r)).collect()
    }

    async fn create(&self, mut object: RawObject) -> StoreResult<RawObject> {
        prepare_create(&mut object)?;
        let key = object.key();
        let mut tx = self.pool.begin().await?;

        let inserted: Option<(String,)> = sqlx::query_as(
            r#"
            INSERT INTO flowrun.object
                (kind, namespace, name, uid, resource_version, generation, metadata, spec, status)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (kind, namespace, name) DO NOTHING
            RETURNING name
            "#,
        )
        .bind(&object.kind)
        .bind(&key.namespace)
        .bind(&key.name)
        .bind(&object.metadata.uid)
        .bind(object.metadata.resource_version)
        .bind(object.metadata.generation)
        .bind(serde_json::to_value(&object.metadata)?)
        .bind(&object.spec)
        .bind(&object.status)
        .fetch_optional(&mut *tx)
        .await?;

        if inserted.is_none() {
            return Err(StoreError::AlreadyExists {
                kind: object.kind,
                key,
            });
        }

        notify(&mut tx, WatchEventType::Added, &object.kind, &key).await?;
        tx.commit().await?;

        Ok(object)
    }

    async fn update(&self, object: RawObject) -> StoreResult<RawObject> {
        self.write(object, false).await
    }

    async fn update_status(&self, object: RawObject) -> StoreResult<RawObject> {
        self.write(object, true).await
    }

    async fn delete(&self, kind: &str, key: &ObjectKey) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;

        let deleted: Option<(String,)> = sqlx::query_as(
            r#"
            DELETE FROM flowrun.object
            WHERE kind = $1 AND namespace = $2 AND name = $3
            RETURNING name
            "#,
        )
        .bind(kind)
        .bind(&key.namespace)
        .bind(&key.name)
        .fetch_optional(&mut *tx)
        .await?;

        if deleted.is_none() {
            return Err(StoreError::NotFound {
                kind: kind.to_string(),
                key: key.clone(),
            });
        }

        notify(&mut tx, WatchEventType::Deleted, kind, key).await?;
        tx.commit().await?;
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<WatchEvent> {
        self.events.subscribe()
    }

    async fn ping(&self) -> bool {
        health_check(&self.pool).await
    }
}
