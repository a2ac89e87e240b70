mod scenarios;

use crate::session::{TurnEvent, END_REASON};
use tokio::sync::mpsc;

/// Drain every event of one finished `call`.
pub(crate) async fn collect_events(mut events: mpsc::Receiver<TurnEvent>) -> Vec<TurnEvent> {
    let mut collected = Vec::new();
    while let Some(event) = events.recv().await {
        collected.push(event);
    }
    collected
}

/// The final message of a successful turn, checking the terminal events.
pub(crate) fn final_message(events: &[TurnEvent]) -> String {
    match events {
        [.., TurnEvent::Message(text), TurnEvent::End(reason)] => {
            assert_eq!(reason, END_REASON);
            text.clone()
        }
        other => panic!("unexpected events: {:?}", other),
    }
}
