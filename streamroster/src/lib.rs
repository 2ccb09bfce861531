//! `Streamroster` — live-stream viewer roster collector library.

pub mod backend;
pub mod config;
pub mod engine;
pub mod normalize;
pub mod roster;
pub mod supervisor;
