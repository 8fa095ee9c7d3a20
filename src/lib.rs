// Message bus clients (backend and device brokers)
pub mod bus;

// Configuration file, env overrides and validation
pub mod config;

// Backend event model and payload validation
pub mod event;

// Routing, transform and republish pipeline
pub mod relay;

// Topic classification and legacy tool mapping
pub mod router;

// Last-actor tracking and relay metrics
pub mod state;

// Connection health and reconnect policy
pub mod supervisor;

// Display policy (names, timestamps, labels)
pub mod transform;
