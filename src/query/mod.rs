//! Stateless query composition over the four projections (spec §4.F).

pub mod responses;
pub mod service;

pub use responses::{AgentData, AgentPageResponse};
pub use service::QueryService;
