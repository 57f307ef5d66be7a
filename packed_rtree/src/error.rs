use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("node size must be at least 2, got {0}")]
    NodeSizeTooSmall(u16),

    #[error("number of items must be greater than 0")]
    EmptyTree,

    #[error("short read while decoding packed r-tree: expected {expected} bytes, got {actual}")]
    ShortRead { expected: usize, actual: usize },

    #[error("read_node callback failed: {0}")]
    ReadNode(String),
}

pub type Result<T> = std::result::Result<T, Error>;
