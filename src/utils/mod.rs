pub mod crypto;
pub mod money;
pub mod validation;
