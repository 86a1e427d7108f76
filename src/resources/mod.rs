//! Resource management
//!
//! Materials and shadow maps live in slot-resident tables; textures live in
//! a layered library that materials refer to by layer.

mod material;
mod shadow;
mod texture;

pub use material::*;
pub use shadow::*;
pub use texture::*;
