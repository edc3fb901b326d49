use std::convert::Infallible;

use axum::{
    extract::{Query, State},
    response::sse::{Event, KeepAlive, Sse},
    Extension,
};
use futures::{stream, Stream};
use serde::Deserialize;
use tokio::sync::broadcast::error::RecvError;
use uuid::Uuid;

use crate::{
    middleware::auth::Claims,
    error::{Error, Result},
    realtime::{ChangeEvent, ChangeFilter, ChangeKind, Table},
    AppState,
};

/// SSE event name sent when the subscriber fell behind and events were dropped.
pub const LAGGED_EVENT: &str = "lagged";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RealtimeQuery {
    /// Comma separated table names; absent means every table.
    pub tables: Option<String>,
    /// `INSERT`, `UPDATE` or `DELETE`; absent means every kind.
    pub kind: Option<String>,
    /// Row filter `column = value`; both or neither.
    pub column: Option<String>,
    pub value: Option<String>,
}

pub fn parse_tables(raw: Option<&str>) -> Option<Vec<Table>> {
    let raw = raw?.trim();
    if raw.is_empty() {
        return None;
    }
    Some(raw.split(',').filter_map(Table::parse).collect())
}

/// One filter per requested table, each narrowed by the optional kind and
/// row filter.
pub fn build_filters(query: &RealtimeQuery) -> Result<Vec<ChangeFilter>> {
    let kind = match query.kind.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(raw) => Some(
            ChangeKind::parse(raw)
                .ok_or_else(|| Error::BadRequest(format!("Unknown event kind: {}", raw)))?,
        ),
    };
    let eq = match (query.column.as_deref(), query.value.as_deref()) {
        (None, None) => None,
        (Some(column), Some(value)) if !column.trim().is_empty() => {
            Some((column.trim().to_string(), value.to_string()))
        }
        _ => {
            return Err(Error::BadRequest(
                "Row filter needs both column and value".into(),
            ))
        }
    };
    let tables = parse_tables(query.tables.as_deref()).unwrap_or_else(|| Table::ALL.to_vec());

    Ok(tables
        .into_iter()
        .map(|table| {
            let mut filter = ChangeFilter::table(table);
            if let Some(kind) = kind {
                filter = filter.kind(kind);
            }
            if let Some((column, value)) = &eq {
                filter = filter.eq(column.as_str(), value);
            }
            filter
        })
        .collect())
}

fn deliverable(filters: &[ChangeFilter], event: &ChangeEvent, me: Uuid) -> bool {
    filters.iter().any(|filter| filter.matches(event)) && event.visible_to(me)
}

#[utoipa::path(
    get,
    path = "/api/realtime",
    params(
        ("tables" = Option<String>, Query, description = "Comma separated table names"),
        ("kind" = Option<String>, Query, description = "INSERT, UPDATE or DELETE"),
        ("column" = Option<String>, Query, description = "Row filter column"),
        ("value" = Option<String>, Query, description = "Row filter value")
    ),
    responses(
        (status = 200, description = "Server-sent change events"),
        (status = 400, description = "Unknown kind or incomplete row filter")
    )
)]
#[axum::debug_handler]
pub async fn stream_changes(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<RealtimeQuery>,
) -> Result<Sse<impl Stream<Item = std::result::Result<Event, Infallible>>>> {
    let filters = build_filters(&query)?;
    let me = claims.profile_id;
    let rx = state.bus.subscribe();
    tracing::debug!(profile_id = %me, ?filters, "realtime subscriber connected");

    let events = stream::unfold((rx, filters), move |(mut rx, filters)| async move {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    if !deliverable(&filters, &event, me) {
                        continue;
                    }
                    match Event::default().event(event.table.as_str()).json_data(&event) {
                        Ok(sse) => return Some((Ok(sse), (rx, filters))),
                        Err(e) => tracing::warn!(error = %e, "could not encode change event"),
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(profile_id = %me, skipped, "realtime subscriber lagged");
                    let notice = Event::default().event(LAGGED_EVENT).data(skipped.to_string());
                    return Some((Ok(notice), (rx, filters)));
                }
                Err(RecvError::Closed) => return None,
            }
        }
    });

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::realtime::ChangeKind;
    use serde_json::json;

    #[test]
    fn table_list_ignores_unknown_names() {
        assert_eq!(parse_tables(None), None);
        assert_eq!(parse_tables(Some("  ")), None);
        assert_eq!(
            parse_tables(Some("payments, wallets,bogus")),
            Some(vec![Table::Payments, Table::Wallets])
        );
    }

    fn query(tables: Option<&str>, kind: Option<&str>, column: Option<&str>, value: Option<&str>) -> RealtimeQuery {
        RealtimeQuery {
            tables: tables.map(String::from),
            kind: kind.map(String::from),
            column: column.map(String::from),
            value: value.map(String::from),
        }
    }

    #[test]
    fn only_requested_and_visible_rows_are_delivered() {
        let me = Uuid::new_v4();
        let mine = ChangeEvent {
            table: Table::Wallets,
            kind: ChangeKind::Update,
            new: json!({"user_id": me}),
            old: None,
        };
        let theirs = ChangeEvent {
            new: json!({"user_id": Uuid::new_v4()}),
            ..mine.clone()
        };

        let all = build_filters(&RealtimeQuery::default()).unwrap();
        assert!(deliverable(&all, &mine, me));
        assert!(!deliverable(&all, &theirs, me));
        let wallets = build_filters(&query(Some("wallets"), None, None, None)).unwrap();
        assert!(deliverable(&wallets, &mine, me));
        let payments = build_filters(&query(Some("payments"), None, None, None)).unwrap();
        assert!(!deliverable(&payments, &mine, me));
    }

    #[test]
    fn kind_and_row_filter_narrow_the_stream() {
        let me = Uuid::new_v4();
        let conversation = Uuid::new_v4();
        let insert = ChangeEvent {
            table: Table::Messages,
            kind: ChangeKind::Insert,
            new: json!({"receiver_id": me, "conversation_id": conversation}),
            old: None,
        };
        let elsewhere = ChangeEvent {
            new: json!({"receiver_id": me, "conversation_id": Uuid::new_v4()}),
            ..insert.clone()
        };
        let update = ChangeEvent {
            kind: ChangeKind::Update,
            ..insert.clone()
        };

        let conversation_id = conversation.to_string();
        let filters = build_filters(&query(
            Some("messages"),
            Some("insert"),
            Some("conversation_id"),
            Some(&conversation_id),
        ))
        .unwrap();
        assert!(deliverable(&filters, &insert, me));
        assert!(!deliverable(&filters, &elsewhere, me));
        assert!(!deliverable(&filters, &update, me));
    }

    #[test]
    fn malformed_filters_are_rejected() {
        assert!(matches!(
            build_filters(&query(None, Some("upsert"), None, None)),
            Err(Error::BadRequest(_))
        ));
        assert!(matches!(
            build_filters(&query(None, None, Some("payee_id"), None)),
            Err(Error::BadRequest(_))
        ));
    }
}
