//! Grid primitives shared by the simulation kernel.

pub mod position;

pub use position::{Direction, Position};
