//! Wire taxonomy for the streamroster feed protocol.
//!
//! The feed server pushes text frames over a WebSocket. A frame is either a
//! plain-text control sentinel (`clearViewers`, `disconnect`) or a JSON
//! object tagged by its `type` field. [`frame::classify`] turns a raw frame
//! into a typed [`frame::Frame`], failing closed on anything it does not
//! recognize.

pub mod frame;
pub mod platform;
