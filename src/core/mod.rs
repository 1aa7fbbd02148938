//! 核心编排层：错误类型、单轮状态与编排器

pub mod error;
pub mod orchestrator;
pub mod state;

pub use error::BridgeError;
pub use orchestrator::{
    clarification_message, create_orchestrator, enrich_query, TurnOrchestrator,
    ENRICHMENT_PREAMBLE,
};
pub use state::{TurnOutcome, TurnPhase};
