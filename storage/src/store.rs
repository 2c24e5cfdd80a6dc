use bincode::ErrorKind as BincodeError;
use std::fmt;
use std::io;

use crate::article::CanonicalArticle;

/// Errors raised by the disk-backed stores.
#[derive(Debug)]
pub enum StoreError {
    Open(String),
    Get(String),
    Put(String),
    Serialize(Box<BincodeError>),
    Io(io::Error),
}

impl std::error::Error for StoreError {}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self {
            StoreError::Open(err) => write!(f, "Open error: {}", err),
            StoreError::Get(err) => write!(f, "Get error: {}", err),
            StoreError::Put(err) => write!(f, "Put error: {}", err),
            StoreError::Serialize(err) => write!(f, "Serialize error: {}", err),
            StoreError::Io(err) => write!(f, "I/O error: {}", err),
        }
    }
}

impl From<Box<BincodeError>> for StoreError {
    fn from(error: Box<BincodeError>) -> Self {
        StoreError::Serialize(error)
    }
}

impl From<io::Error> for StoreError {
    fn from(error: io::Error) -> Self {
        StoreError::Io(error)
    }
}

/// Random-access reads over a closed article store.
pub trait ArticleStoreRead {
    fn get(&self, title: &str) -> Result<Option<CanonicalArticle>, StoreError>;
}

/// Bulk writes while populating an article store.
pub trait ArticleStoreWrite {
    fn put(&mut self, article: &CanonicalArticle) -> Result<(), StoreError>;
    fn put_many(&mut self, articles: &[CanonicalArticle]) -> Result<(), StoreError>;
}
