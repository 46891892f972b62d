mod client;

pub use client::TmuxClient;

use async_trait::async_trait;

/// Answers whether the multiplexer session backing an agent still exists
#[async_trait]
pub trait SessionLivenessChecker: Send + Sync {
    /// Any probe failure must be reported as `false`
    async fn is_alive(&self, session_name: &str) -> bool;
}
