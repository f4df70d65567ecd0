//! token-sentinel - Solana token investigation and deterministic trust scoring
//!
//! This crate investigates a token address and publishes a single trust
//! verdict built from verified on-chain facts, market signals, a captured
//! snapshot of the project website and an external reasoning engine whose
//! opinion can only lower the score.

pub mod types;
pub mod oracle;

// Re-export main types for convenience
pub use oracle::{InvestigationError, InvestigationResult, InvestigatorBuilder, TokenInvestigator};
pub use types::{TokenAddress, Verdict, VisualReuse};
