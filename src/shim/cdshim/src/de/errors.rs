use std::fmt::Display;

use serde::de;
use thiserror::Error;

#[derive(Error, Clone, Debug, PartialEq)]
pub enum DeError {
    #[error("error from deserialization: {0}")]
    SerdeError(String),

    #[error("expecting values to contain a single entry")]
    ExpectSingleValue,

    #[error("expecting string")]
    ExpectString,

    #[error("expecting string of length one, received `{0}`")]
    ExpectChar(String),

    #[error("expecting boolean")]
    ExpectBoolean,

    #[error("expecting number")]
    ExpectNumber,

    #[error("expecting an integer in range, received {0}")]
    ExpectInteger(f64),

    #[error("needs an object to deserialize a struct")]
    ExpectObject,

    #[error("could not deserialize as datatype not supported")]
    DataTypeNotSupported,

    #[error("{key}: {error}")]
    Key { key: String, error: Box<DeError> },
}

impl DeError {
    /// Attaches the config key being read, innermost key last
    pub(crate) fn at(self, key: &str) -> DeError {
        DeError::Key {
            key: key.to_string(),
            error: Box::new(self),
        }
    }

    /// The error without any key context
    pub fn root(&self) -> &DeError {
        match self {
            DeError::Key { error, .. } => error.root(),
            e => e,
        }
    }
}

impl de::Error for DeError {
    fn custom<T: Display>(msg: T) -> Self {
        DeError::SerdeError(msg.to_string())
    }
}
