//! Control algorithms for DiffTune
//!
//! Implements the geometric tracking controller:
//! - Reference trajectories
//! - Controller gains and their flattened parameter vector
//! - Position loop (thrust and desired attitude trajectory)
//! - Attitude loop (body moment)
//! - Composition with closed-form Jacobians

pub mod reference;
pub mod gains;
pub mod position;
pub mod attitude;
pub mod geometric;

pub use reference::*;
pub use gains::*;
pub use position::*;
pub use attitude::*;
pub use geometric::*;
