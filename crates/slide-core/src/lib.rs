pub mod error;
pub mod function;
pub mod window;
