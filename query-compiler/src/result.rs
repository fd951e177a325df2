use crate::translator;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error, PartialEq)]
pub enum Error {
    #[error("translator error: {0}")]
    Translator(#[from] translator::Error),
}
