//! The relay core: endpoint routing, failure handling, and the forwarding
//! pipeline. The HTTP front-end and persistence live in sibling crates; this
//! crate only needs a byte-level view of requests and responses.

pub mod breaker;
pub mod client;
pub mod engine;
pub mod events;
pub mod executor;
pub mod logring;
pub mod router;
pub mod stats;
pub mod url;

pub use breaker::CircuitBreaker;
pub use client::{
    UpstreamBody, UpstreamClient, UpstreamFailure, UpstreamRequest, UpstreamResponse,
    WreqUpstreamClient,
};
pub use engine::{ClientRequest, EngineConfig, EngineResponse, ProxyEngine};
pub use events::{Event, EventHub, FallbackSwitch, TempDisabled};
pub use executor::{Executor, ForwardResult};
pub use logring::{RequestLog, RequestLogEntry};
pub use router::EndpointRouter;
pub use stats::{StatsRecord, StatsSink, TokenStatsEntry, TokenStatsMap};
