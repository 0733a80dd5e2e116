//! Domain layer: request and result entities, errors, and the ports that
//! pluggable components implement.

pub mod entities;
pub mod errors;
pub mod ports;
