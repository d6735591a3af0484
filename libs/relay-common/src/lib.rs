pub mod id;
pub mod token;

pub use token::generate_opaque_token;
