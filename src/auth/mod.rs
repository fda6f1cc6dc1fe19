pub mod claims;
pub mod cookies;
pub mod extractors;
pub mod password;
pub mod tokens;
