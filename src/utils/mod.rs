pub mod address_validator;
pub mod amount;

pub use address_validator::AddressValidator;
pub use amount::{from_base_units, parse_amount, to_base_units, to_u256_units, validate_amount};
