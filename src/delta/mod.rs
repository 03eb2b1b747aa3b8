//! 每帧差分存储
//!
//! 由编排器每帧分配，求值结束后丢弃。

mod bone_delta;
mod morph_delta;

pub use bone_delta::{BoneDelta, BoneDeltas};
pub use morph_delta::{BoneMorphDelta, MaterialMorphDelta, MorphDeltas, VertexMorphDelta};
