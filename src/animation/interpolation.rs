//! 关键帧插值参数

use glam::{Quat, Vec3};

use super::bezier_curve::BezierCurveFactory;

/// VMD 默认（线性）插值参数
pub const LINEAR_INTERPOLATION: [u8; 4] = [20, 20, 107, 107];

/// 两关键帧之间的插值系数
#[inline]
pub fn coefficient(prev_frame_index: u32, next_frame_index: u32, frame_index: u32) -> f32 {
    let interval = next_frame_index.saturating_sub(prev_frame_index);
    if interval == 0 {
        return 1.0;
    }
    (frame_index.saturating_sub(prev_frame_index) as f32 / interval as f32).clamp(0.0, 1.0)
}

#[inline]
pub fn lerp_f32(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

/// 逐分量插值
#[inline]
pub fn lerp_element_wise(a: Vec3, b: Vec3, t: Vec3) -> Vec3 {
    a + (b - a) * t
}

/// 单条插值曲线的控制点
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct KeyframeInterpolationPoint {
    pub bezier_control_point: [u8; 4],
}

impl KeyframeInterpolationPoint {
    pub fn new(parameters: &[u8; 4]) -> Self {
        Self {
            bezier_control_point: *parameters,
        }
    }

    /// 控制点位于对角线上即为线性
    #[inline]
    pub fn is_linear(&self) -> bool {
        let [x1, y1, x2, y2] = self.bezier_control_point;
        x1 == y1 && x2 == y2
    }

    /// 曲线值；线性时直接返回系数
    pub fn curve_value(&self, amount: f32, bezier_factory: &dyn BezierCurveFactory) -> f32 {
        if self.is_linear() {
            return amount;
        }
        bezier_factory.curve(self.bezier_control_point).value(amount)
    }
}

/// 骨骼关键帧的四条插值曲线
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BoneKeyframeInterpolation {
    pub translation_x: [u8; 4],
    pub translation_y: [u8; 4],
    pub translation_z: [u8; 4],
    pub rotation: [u8; 4],
}

impl Default for BoneKeyframeInterpolation {
    fn default() -> Self {
        Self {
            translation_x: LINEAR_INTERPOLATION,
            translation_y: LINEAR_INTERPOLATION,
            translation_z: LINEAR_INTERPOLATION,
            rotation: LINEAR_INTERPOLATION,
        }
    }
}

impl BoneKeyframeInterpolation {
    /// 平移三轴的曲线值
    pub fn translation_amounts(&self, amount: f32, factory: &dyn BezierCurveFactory) -> Vec3 {
        Vec3::new(
            KeyframeInterpolationPoint::new(&self.translation_x).curve_value(amount, factory),
            KeyframeInterpolationPoint::new(&self.translation_y).curve_value(amount, factory),
            KeyframeInterpolationPoint::new(&self.translation_z).curve_value(amount, factory),
        )
    }

    /// 旋转曲线值
    pub fn rotation_amount(&self, amount: f32, factory: &dyn BezierCurveFactory) -> f32 {
        KeyframeInterpolationPoint::new(&self.rotation).curve_value(amount, factory)
    }
}

/// 可缺省通道的平移插值（缺省侧以零补齐）
pub fn lerp_optional_vec3(prev: Option<Vec3>, next: Option<Vec3>, amounts: Vec3, neutral: Vec3) -> Option<Vec3> {
    match (prev, next) {
        (None, None) => None,
        (p, n) => Some(lerp_element_wise(p.unwrap_or(neutral), n.unwrap_or(neutral), amounts)),
    }
}

/// 可缺省通道的旋转插值（缺省侧以单位四元数补齐）
pub fn slerp_optional(prev: Option<Quat>, next: Option<Quat>, amount: f32) -> Option<Quat> {
    match (prev, next) {
        (None, None) => None,
        (p, n) => Some(p.unwrap_or(Quat::IDENTITY).slerp(n.unwrap_or(Quat::IDENTITY), amount)),
    }
}
