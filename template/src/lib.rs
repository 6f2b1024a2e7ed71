//! Sandbox entry point. `game.rs` is supplied per build.

mod simulo;

mod game {
    #![allow(unused_imports)]
    pub use crate::simulo::*;

    include!("game.rs");
}
