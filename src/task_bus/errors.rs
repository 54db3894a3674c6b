#[derive(Debug, thiserror::Error)]
pub enum TaskBusError {
    /// The api_key no longer matches the single currently-valid key for
    /// its user: a later `Register` superseded it (spec §4.3, §8 scenario 2).
    #[error("session invalidated: a newer agent registration superseded this api_key")]
    SessionInvalidated,
    #[error("token expired")]
    TokenExpired,
    #[error("unknown agent or task")]
    NotFound,
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}
