use thiserror::Error;

/// Error kinds surfaced by the engines. Only `Parse` and `Io` are fatal at
/// startup; everything else is recoverable by changing the selection.
#[derive(Debug, Error)]
pub enum ExplorerError {
    /// Malformed input at load time: bad date strings, non-numeric or
    /// negative kwh cells.
    #[error("failed to parse {0}: {1}")]
    Parse(String, String),

    /// Inconsistent configuration or data: duplicate/conflicting per-date
    /// attributes, unknown meter id, missing columns, invalid household size.
    #[error("configuration error: {0}")]
    Config(String),

    /// The selected date range matched no rows. Normal empty-result state.
    #[error("no data for this selection")]
    EmptySelection,

    /// The model could not be fit for the current selection.
    #[error("model could not be fit: {0}")]
    Model(String),

    #[error(transparent)]
    Table(#[from] polars::prelude::PolarsError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ExplorerError>;
