//! Service layer: validation, policy, orchestration.
//!
//! Services are the engine's API. Each one validates input shape, consults
//! the policy engine, delegates data access to repositories, and emits
//! audit events. They return plain serde data and never touch a transport;
//! HTTP and CLI adapters translate in and out of the response envelope.

pub mod audit;
pub mod corpus;
pub mod diarization;
pub mod export;
pub mod intake;
pub mod session;
pub mod transcription;
pub mod worker;
