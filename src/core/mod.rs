pub mod api;
pub mod artifact;
pub mod decode;
pub mod error;
pub mod events;
pub mod model;
pub mod session;
pub mod validate;
