pub mod command;
pub mod device;
pub mod error;
#[cfg(feature = "headless")]
pub mod headless;
pub mod prelude;
pub mod resource;
pub mod sync;
pub mod traits;
pub mod util;

pub use error::DagalError;

pub type Result<T> = std::result::Result<T, DagalError>;
