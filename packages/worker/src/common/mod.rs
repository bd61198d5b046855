pub mod error;

pub use error::FetchError;
