use thiserror::Error;

/// All error kinds the reader can raise, distinguishable by the caller
/// (spec §7). All are fatal to the current iterator; there are no retries
/// inside this crate.
#[derive(Error, Debug)]
pub enum Error {
    #[error("not a FlatGeobuf file: magic bytes mismatch")]
    NotAFlatGeobuf,

    #[error("invalid header size {0}, expected between 8 and 10485760 bytes")]
    InvalidHeaderSize(usize),

    #[error("corrupt index: {0}")]
    CorruptIndex(String),

    #[error("corrupt feature: {0}")]
    CorruptFeature(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("unsupported column type: {0}")]
    UnsupportedColumnType(String),

    #[error("invalid flatbuffer: {0}")]
    InvalidFlatbuffer(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("r-tree error: {0}")]
    Rtree(#[from] packed_rtree::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(feature = "http")]
impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Transport(e.to_string())
    }
}
