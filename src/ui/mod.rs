//! Screen output and key handling.
//!
//! - **renderer**: full-frame composition, emitted as one write per frame
//! - **keymapper**: raw input bytes to keys, keys to session actions

pub mod keymapper;
pub mod renderer;

pub use keymapper::*;
pub use renderer::*;
