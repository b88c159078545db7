use crate::claim::CellKey;
use crate::record::ShipId;

/// Alias for `Result<T, RegistryError>`.
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Errors produced when constructing ship records or mutating a registry.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// An insert reused an id already present in the registry. This is a
    /// caller bug, never silently ignored.
    #[error("duplicate ship id: {0}")]
    DuplicateId(ShipId),

    /// An insert's claim overlapped a cell already owned by another ship.
    /// Recoverable: assembly is not currently possible here and may be
    /// retried later.
    #[error("cell {cell} already claimed by ship {owner}")]
    CellConflict {
        /// The contested cell.
        cell: CellKey,
        /// The ship currently owning the cell.
        owner: ShipId,
    },

    /// A record was constructed without its required fields. Indicates a bug
    /// upstream.
    #[error("invalid ship record: {0}")]
    InvalidRecord(String),
}
