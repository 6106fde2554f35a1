mod auth_service_impl;
mod token_codec_jwt;
mod user_directory_fake;

pub use auth_service_impl::*;
pub use token_codec_jwt::*;
pub use user_directory_fake::*;
