pub mod enums;
pub mod query;
pub mod record;
pub mod response;

pub use enums::*;
pub use query::*;
pub use record::*;
pub use response::*;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Invalid enum value for {field}: {value}")]
    InvalidEnum { field: String, value: String },
}
