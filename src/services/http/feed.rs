use std::convert::Infallible;

use axum::{
    extract::{Query, State},
    response::sse::{Event, KeepAlive, Sse},
};
use futures_util::stream::{self, Stream};
use tokio::sync::broadcast::error::RecvError;

use super::{AdminCaller, AppState};
use crate::models::feed::FeedFilter;

/// Server-sent change events, optionally restricted to one collection.
pub async fn subscribe(
    State(state): State<AppState>,
    AdminCaller(admin): AdminCaller,
    Query(filter): Query<FeedFilter>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    log::info!("Admin {} subscribed to the change feed", admin.id);
    let receiver = state.feed.subscribe();

    let events = stream::unfold(
        (receiver, filter.collection),
        |(mut receiver, collection)| async move {
            loop {
                let change = match receiver.recv().await {
                    Ok(change) => change,
                    Err(RecvError::Lagged(skipped)) => {
                        log::warn!("Feed subscriber lagged, skipped {} events", skipped);
                        continue;
                    }
                    Err(RecvError::Closed) => return None,
                };

                if collection.is_some_and(|wanted| wanted != change.collection) {
                    continue;
                }

                match Event::default()
                    .event(change.collection.as_str())
                    .json_data(&change)
                {
                    Ok(event) => return Some((Ok(event), (receiver, collection))),
                    Err(e) => log::error!("Could not encode change event: {}", e),
                }
            }
        },
    );

    Sse::new(events).keep_alive(KeepAlive::default())
}
