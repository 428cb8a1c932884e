//! Contains common, primitive types shared across the crate.
//!
//! This module defines the keyed ID type used to identify frames owned by a
//! `FrameCollection`. Using a slotmap key instead of a bare index prevents
//! stale-handle bugs when frames are added over the collection's lifetime.

use slotmap::new_key_type;

new_key_type! {
    /// Uniquely and safely identifies a frame owned by a `FrameCollection`.
    ///
    /// Keys are never reused, so a `FrameKey` held after its frame has been
    /// dropped simply fails to resolve instead of aliasing a newer frame.
    pub struct FrameKey;
}
