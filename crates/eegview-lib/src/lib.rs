pub mod epochs;
pub mod error;
pub mod filter;
pub mod io;
pub mod layout;
pub mod montage;
pub mod plot;
pub mod reconstruct;
pub mod session;
pub mod spectrum;

pub use error::{EegError, Result, ValidationError};
pub use layout::DeviceLayout;
pub use reconstruct::{load_session, reconstruct};
pub use session::*;
