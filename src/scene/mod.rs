//! Scene-side inputs to shadow mapping

mod light;

pub use light::*;
