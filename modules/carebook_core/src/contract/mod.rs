pub mod error;
pub mod model;

pub use error::{AdminError, AuthError};
pub use model::*;
