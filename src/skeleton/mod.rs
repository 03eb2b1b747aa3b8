//! 骨骼系统
//!
//! 核心设计思想：
//! - BoneLink: 单个骨骼节点的静态数据
//! - BoneSet: 管理骨骼层次结构与逆向关系
//! - evaluator: 差分 → 单位矩阵 → 全局矩阵
//! - ik_solver: 在差分存储上执行 CCD IK

mod bone_link;
mod bone_set;
mod evaluator;
mod ik_solver;

pub use bone_link::{AppendConfig, BoneFlags, BoneLink, BoneTail, IkConfig, IkLink};
pub use bone_set::BoneSet;
pub use evaluator::{
    apply_bone_matrices, apply_bone_matrices_with_indexes, apply_global_matrices_with_indexes,
    compute_bone_deltas, compute_bone_deltas_with_sink,
};
pub use ik_solver::{IkDebugSink, IkLinkStep, NoopIkDebugSink};

pub(crate) use ik_solver::{apply_ik_deltas, IkPass};

// ============================================================================
// 类型别名
// ============================================================================

/// Bone 别名
pub type Bone = BoneLink;
