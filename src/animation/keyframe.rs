//! 动画关键帧
//!
//! 骨骼关键帧的各通道均可缺省，缺省通道不参与姿势合成。

use glam::{Quat, Vec3};

use super::interpolation::BoneKeyframeInterpolation;

/// 骨骼关键帧
#[derive(Clone, Debug, PartialEq)]
pub struct BoneKeyframe {
    pub frame_index: u32,
    pub position: Option<Vec3>,
    pub rotation: Option<Quat>,
    pub cancelable_position: Option<Vec3>,
    pub cancelable_rotation: Option<Quat>,
    pub scale: Option<Vec3>,
    pub cancelable_scale: Option<Vec3>,
    /// 到达本帧的插值曲线
    pub interpolation: BoneKeyframeInterpolation,
}

impl BoneKeyframe {
    pub fn new(frame_index: u32) -> Self {
        Self {
            frame_index,
            position: None,
            rotation: None,
            cancelable_position: None,
            cancelable_rotation: None,
            scale: None,
            cancelable_scale: None,
            interpolation: BoneKeyframeInterpolation::default(),
        }
    }

    pub fn with_position(mut self, position: Vec3) -> Self {
        self.position = Some(position);
        self
    }

    pub fn with_rotation(mut self, rotation: Quat) -> Self {
        self.rotation = Some(rotation);
        self
    }

    pub fn with_cancelable_position(mut self, position: Vec3) -> Self {
        self.cancelable_position = Some(position);
        self
    }

    pub fn with_cancelable_rotation(mut self, rotation: Quat) -> Self {
        self.cancelable_rotation = Some(rotation);
        self
    }

    pub fn with_scale(mut self, scale: Vec3) -> Self {
        self.scale = Some(scale);
        self
    }

    pub fn with_cancelable_scale(mut self, scale: Vec3) -> Self {
        self.cancelable_scale = Some(scale);
        self
    }

    pub fn with_interpolation(mut self, interpolation: BoneKeyframeInterpolation) -> Self {
        self.interpolation = interpolation;
        self
    }
}

/// Morph 关键帧
#[derive(Clone, Debug, PartialEq)]
pub struct MorphKeyframe {
    pub frame_index: u32,
    pub weight: f32,
}

impl MorphKeyframe {
    pub fn new(frame_index: u32, weight: f32) -> Self {
        Self { frame_index, weight }
    }
}

/// IK 启用关键帧（单个 IK 骨骼）
#[derive(Clone, Debug, PartialEq)]
pub struct IkKeyframe {
    pub frame_index: u32,
    pub enabled: bool,
}

impl IkKeyframe {
    pub fn new(frame_index: u32, enabled: bool) -> Self {
        Self { frame_index, enabled }
    }
}
