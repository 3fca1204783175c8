//! Engine-wide error type. `EngineError` has no HTTP framing — there is no
//! HTTP surface in this crate (spec §1 Non-goals). It is consumed by
//! `tracing::error!`/`tracing::warn!` call sites and component-internal
//! matches (spec §7's error-kind taxonomy: configuration / transient
//! infrastructure / provider transient / provider terminal / invariant
//! violation / contract violation).

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("smtp error: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),

    #[error("email message build error: {0}")]
    EmailBuild(#[from] lettre::error::Error),

    #[error("invalid email address: {0}")]
    InvalidEmailAddress(#[from] lettre::address::AddressError),

    #[error("push provider request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("render error: {0}")]
    Render(String),

    #[error("invariant violation: {0}")]
    Invariant(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

pub type EngineResult<T> = Result<T, EngineError>;

impl EngineError {
    /// True for errors that arise from infrastructure the engine should
    /// retry transparently (spec §7, error kind (b)) rather than surface as
    /// an invariant violation or configuration failure.
    pub fn is_transient_infrastructure(&self) -> bool {
        matches!(
            self,
            EngineError::Database(_) | EngineError::Request(_) | EngineError::Smtp(_)
        )
    }
}
