/// Error types for the user store.
///
/// One variant per error kind in the design's surface taxonomy. The HTTP
/// layer matches over this enum to pick a status code and message instead
/// of comparing strings.
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("account hash is malformed")]
    AddressMalformed,

    #[error("no store exists for this account")]
    BucketMissing,

    #[error("key not found")]
    KeyMissing,

    #[error("parent not found")]
    ParentMissing,

    #[error("parent is not a collection")]
    ParentNotCollection,

    #[error("incorrect body")]
    BodyMalformed,

    #[error("incorrect data")]
    DataMalformed,

    #[error("{0}")]
    StorageFault(String),
}

pub type StoreResult<T> = Result<T, StoreError>;
