//! 物理钩子
//!
//! 刚体模拟本身由外部引擎完成，这里只定义求值核心与引擎交换骨骼矩阵的接口。
//! 每帧流程：[update_rigidbody_transform → step_simulation → get_rigidbody_bone_matrix]

use glam::Mat4;

use crate::skeleton::BoneLink;
use crate::{MmdError, Result};

/// 刚体物理模式（数值与 PMX 一致）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhysicsMode {
    /// 跟随骨骼（运动学刚体）
    FollowBone,
    /// 物理演算，结果覆盖骨骼
    Dynamic,
    /// 物理演算 + 骨骼位置对齐
    DynamicWithBone,
}

impl TryFrom<u8> for PhysicsMode {
    type Error = MmdError;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        match value {
            0 => Ok(PhysicsMode::FollowBone),
            1 => Ok(PhysicsMode::Dynamic),
            2 => Ok(PhysicsMode::DynamicWithBone),
            other => Err(MmdError::UnknownPhysicsMode(other)),
        }
    }
}

impl PhysicsMode {
    /// 物理步进前需要把骨骼矩阵推送给引擎
    #[inline]
    pub fn follows_bone(&self) -> bool {
        matches!(self, PhysicsMode::FollowBone | PhysicsMode::DynamicWithBone)
    }
}

/// 刚体描述（只保留求值核心关心的部分）
#[derive(Debug, Clone, PartialEq)]
pub struct RigidBody {
    pub name: String,
    /// 关联骨骼索引（-1 表示无）
    pub bone_index: i32,
    pub mode: PhysicsMode,
}

impl RigidBody {
    pub fn new(name: impl Into<String>, bone_index: i32, mode: PhysicsMode) -> Self {
        Self {
            name: name.into(),
            bone_index,
            mode,
        }
    }
}

/// 外部物理引擎接口
pub trait PhysicsHook {
    /// 推送跟随骨骼的刚体当前全局矩阵
    fn update_rigidbody_transform(
        &mut self,
        model_id: i64,
        bone: &BoneLink,
        global_matrix: Mat4,
        rigid_body: &RigidBody,
    ) -> Result<()>;

    /// 步进模拟
    fn step_simulation(&mut self, _model_id: i64) -> Result<()> {
        Ok(())
    }

    /// 读取动态刚体对应骨骼的新全局矩阵；None 表示不覆盖
    fn get_rigidbody_bone_matrix(&mut self, model_id: i64, rigid_body: &RigidBody) -> Result<Option<Mat4>>;
}

/// 无物理（不覆盖任何骨骼）
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPhysics;

impl PhysicsHook for NoPhysics {
    fn update_rigidbody_transform(&mut self, _: i64, _: &BoneLink, _: Mat4, _: &RigidBody) -> Result<()> {
        Ok(())
    }

    fn get_rigidbody_bone_matrix(&mut self, _: i64, _: &RigidBody) -> Result<Option<Mat4>> {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_from_u8() {
        assert_eq!(PhysicsMode::try_from(1).unwrap(), PhysicsMode::Dynamic);
        assert!(PhysicsMode::try_from(2).unwrap().follows_bone());
        assert!(!PhysicsMode::Dynamic.follows_bone());
        assert!(matches!(PhysicsMode::try_from(3), Err(MmdError::UnknownPhysicsMode(3))));
    }
}
