//! MMD Pose - MMD 姿势求值核心
//!
//! 提供：
//! - 骨骼变换求值（付与、可取消变换、层级排序）
//! - CCD IK 求解（角度限制、固定轴、局部轴、つま先IK）
//! - Morph 解析（顶点、UV、骨骼、材质、组）
//! - 顶点蒙皮（BDEF1/2/4 + SDEF 重算）
//! - 每帧编排（Morph → 物理前骨骼 → 物理钩子 → 物理后骨骼 → 蒙皮）

pub mod animation;
pub mod config;
pub mod delta;
pub mod math;
pub mod model;
pub mod morph;
pub mod physics;
pub mod skeleton;
pub mod skinning;

#[cfg(test)]
pub(crate) mod test_rigs;

pub use animation::Motion;
pub use delta::{BoneDelta, BoneDeltas, MorphDeltas};
pub use model::{FrameDeform, MmdModel};
pub use morph::{compute_morph_deltas, Morph, MorphKind};
pub use physics::{NoPhysics, PhysicsHook};
pub use skeleton::{
    apply_bone_matrices, compute_bone_deltas, compute_bone_deltas_with_sink, Bone, BoneFlags,
    BoneSet, IkDebugSink, NoopIkDebugSink,
};
pub use skinning::apply_skinning;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum MmdError {
    #[error("Invalid model: {0}")]
    InvalidModel(String),

    #[error("Unknown morph kind: {0}")]
    UnknownMorphKind(u8),

    #[error("Unknown material calc mode: {0}")]
    UnknownCalcMode(u8),

    #[error("Unknown physics mode: {0}")]
    UnknownPhysicsMode(u8),

    #[error("Physics error: {0}")]
    Physics(String),
}

pub type Result<T> = std::result::Result<T, MmdError>;
