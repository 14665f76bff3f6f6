mod error;

pub use error::NetworkError;

/// Result alias for operations of the activation core.
pub type Result<T> = std::result::Result<T, NetworkError>;
