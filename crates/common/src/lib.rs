pub mod digest;
pub mod field;
pub mod hasher;
pub mod leaf;
pub mod params;
pub mod preimage;
pub mod witness;

#[macro_use]
extern crate log;

#[cfg(any(test, feature = "test_utils"))]
pub mod test_utils;
