//! Data Transfer Objects for REST responses.

pub mod device_dto;
pub mod session_dto;

pub use device_dto::*;
pub use session_dto::*;
