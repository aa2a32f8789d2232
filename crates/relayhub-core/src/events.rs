use serde::Serialize;
use tokio::sync::broadcast;

use crate::logring::RequestLogEntry;
use crate::stats::TokenStatsEntry;
use relayhub_common::InterfaceType;

pub const EVENT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, Serialize)]
pub struct FallbackSwitch {
    pub interface_type: InterfaceType,
    pub from: String,
    pub to: Option<String>,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct TempDisabled {
    pub interface_type: InterfaceType,
    pub endpoint: String,
    pub until_ms: i64,
}

/// One-way lifecycle notifications for UI broadcast.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum Event {
    RequestLog(RequestLogEntry),
    TokenStats(Vec<TokenStatsEntry>),
    FallbackSwitch(FallbackSwitch),
    EndpointTempDisabled(TempDisabled),
}

/// Fan-out bus for lifecycle events.
///
/// Bounded broadcast channel; slow subscribers lag and drop, the producer
/// never blocks.
#[derive(Clone)]
pub struct EventHub {
    tx: broadcast::Sender<Event>,
}

impl EventHub {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    pub fn emit(&self, event: Event) {
        let _ = self.tx.send(event);
    }
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_emitted_events() {
        let hub = EventHub::new();
        let mut rx = hub.subscribe();
        hub.emit(Event::FallbackSwitch(FallbackSwitch {
            interface_type: InterfaceType::Claude,
            from: "a".to_string(),
            to: Some("b".to_string()),
            reason: "upstream 500".to_string(),
        }));
        match rx.recv().await.unwrap() {
            Event::FallbackSwitch(payload) => {
                assert_eq!(payload.from, "a");
                assert_eq!(payload.to.as_deref(), Some("b"));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn emit_without_subscribers_does_not_block() {
        let hub = EventHub::new();
        hub.emit(Event::EndpointTempDisabled(TempDisabled {
            interface_type: InterfaceType::Chat,
            endpoint: "a".to_string(),
            until_ms: 1,
        }));
    }

    #[test]
    fn events_serialize_with_type_and_payload() {
        let event = Event::EndpointTempDisabled(TempDisabled {
            interface_type: InterfaceType::Chat,
            endpoint: "a".to_string(),
            until_ms: 9,
        });
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "endpoint_temp_disabled");
        assert_eq!(json["payload"]["endpoint"], "a");
    }
}
