use sqlx::SqlitePool;

use crate::db::models::SosEventRow;
use crate::domain::SosEvent;
use crate::error::EngineResult;

/// Upserts the durable mirror of an in-memory SOS event (spec §4.G: "every
/// state transition is mirrored to a durable row before returning success").
pub async fn persist_sos_row(pool: &SqlitePool, event: &SosEvent) -> EngineResult<()> {
    let row = SosEventRow::from_event(event);

    sqlx::query(
        r#"
        INSERT INTO sos_events (id, user_id, triggered_at, state, lat, lng, countdown_deadline)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET state = excluded.state
        "#,
    )
    .bind(&row.id)
    .bind(&row.user_id)
    .bind(row.triggered_at)
    .bind(row.state)
    .bind(row.lat)
    .bind(row.lng)
    .bind(row.countdown_deadline)
    .execute(pool)
    .await?;

    Ok(())
}

/// Loads every event not yet in a terminal state, for startup replay.
pub async fn load_non_terminal(pool: &SqlitePool) -> EngineResult<Vec<SosEvent>> {
    let rows = sqlx::query_as::<_, SosEventRow>(
        "SELECT id, user_id, triggered_at, state, lat, lng, countdown_deadline \
         FROM sos_events WHERE state IN ('countdown', 'dispatching')",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(SosEvent::from).collect())
}
