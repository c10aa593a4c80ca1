pub mod coords;
pub mod domain;
pub mod error;
pub mod protocol;
