/// Errors produced by the `nestbox-core` crate.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum CoreError {
    /// A required create-request field was absent or empty.
    #[error("{field} is required")]
    MissingField { field: &'static str },
}
