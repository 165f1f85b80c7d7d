pub mod analytics;
pub mod chat;
pub mod content;
pub mod currency;
pub mod feed;
pub mod ledger;
pub mod market;
pub mod signals;
pub mod transfers;
pub mod users;

#[derive(Debug, thiserror::Error)]
#[error("Unknown {kind}: {value}")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

impl ParseEnumError {
    pub fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}
