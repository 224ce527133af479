pub mod jwt;
pub mod session;

pub use jwt::JwtService;
pub use session::{Session, SessionError};
