pub mod backup;
pub mod cache;
pub mod channels;
pub mod detection;
pub mod groups;
pub mod keywords;
pub mod leagues;
pub mod providers;
pub mod regular_tv;
pub mod scheduler;
pub mod settings;
pub mod teams;

use axum::response::sse::Event;
use futures::stream::Stream;
use tokio::sync::broadcast;

use crate::services::progress::{ProgressFrame, RunState};

/// Adapt a progress broadcast receiver into an SSE stream of `data: <json>`
/// frames, ending after a terminal complete/error frame. Lagged receivers
/// skip ahead instead of erroring.
pub(crate) fn progress_sse_stream(
    receiver: broadcast::Receiver<ProgressFrame>,
) -> impl Stream<Item = Result<Event, std::convert::Infallible>> {
    futures::stream::unfold(Some(receiver), |state| async move {
        let mut rx = state?;
        loop {
            match rx.recv().await {
                Ok(frame) => {
                    let done = matches!(frame.state, RunState::Complete | RunState::Error);
                    let json = serde_json::to_string(&frame).unwrap_or_default();
                    let event = Ok(Event::default().data(json));
                    return Some((event, if done { None } else { Some(rx) }));
                }
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    })
}
