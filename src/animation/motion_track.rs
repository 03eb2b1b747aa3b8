//! 关键帧轨道
//!
//! 单个骨骼 / Morph / IK 骨骼的关键帧序列。
//! 骨骼轨道按曲线插值，Morph 轨道线性插值，IK 轨道为阶跃。

use std::collections::BTreeMap;

use glam::{Quat, Vec3};

use super::bezier_curve::BezierCurveFactory;
use super::interpolation::{coefficient, lerp_f32, lerp_optional_vec3, slerp_optional};
use super::keyframe::{BoneKeyframe, IkKeyframe, MorphKeyframe};

/// 带帧索引的关键帧
pub trait Keyframe {
    fn frame_index(&self) -> u32;
}

impl Keyframe for BoneKeyframe {
    fn frame_index(&self) -> u32 {
        self.frame_index
    }
}

impl Keyframe for MorphKeyframe {
    fn frame_index(&self) -> u32 {
        self.frame_index
    }
}

impl Keyframe for IkKeyframe {
    fn frame_index(&self) -> u32 {
        self.frame_index
    }
}

/// 采样帧两侧的关键帧
enum Neighbors<'a, K> {
    Exact(&'a K),
    Between(&'a K, &'a K),
    /// 在首帧之前或末帧之后，保持端点
    Hold(&'a K),
    Empty,
}

/// 按帧索引排序的关键帧序列
#[derive(Debug, Clone)]
pub struct Track<K> {
    keyframes: BTreeMap<u32, K>,
}

impl<K> Default for Track<K> {
    fn default() -> Self {
        Self {
            keyframes: BTreeMap::new(),
        }
    }
}

impl<K: Keyframe> Track<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// 插入关键帧，同一帧已有的关键帧被替换并返回
    pub fn insert(&mut self, keyframe: K) -> Option<K> {
        self.keyframes.insert(keyframe.frame_index(), keyframe)
    }

    pub fn remove(&mut self, frame_index: u32) -> Option<K> {
        self.keyframes.remove(&frame_index)
    }

    pub fn get(&self, frame_index: u32) -> Option<&K> {
        self.keyframes.get(&frame_index)
    }

    pub fn len(&self) -> usize {
        self.keyframes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keyframes.is_empty()
    }

    pub fn last_frame_index(&self) -> u32 {
        self.keyframes.keys().next_back().copied().unwrap_or(0)
    }

    pub fn iter(&self) -> impl Iterator<Item = &K> {
        self.keyframes.values()
    }

    /// 严格在采样帧之前 / 之后的最近关键帧索引
    pub fn closest_frame_indexes(&self, frame_index: u32) -> (Option<u32>, Option<u32>) {
        let prev = self.keyframes.range(..frame_index).next_back().map(|(k, _)| *k);
        let next = self.keyframes.range(frame_index.saturating_add(1)..).next().map(|(k, _)| *k);
        (prev, next)
    }

    fn neighbors(&self, frame_index: u32) -> Neighbors<'_, K> {
        if let Some(keyframe) = self.keyframes.get(&frame_index) {
            return Neighbors::Exact(keyframe);
        }
        let prev = self.keyframes.range(..frame_index).next_back().map(|(_, kf)| kf);
        let next = self.keyframes.range(frame_index.saturating_add(1)..).next().map(|(_, kf)| kf);
        match (prev, next) {
            (Some(prev), Some(next)) => Neighbors::Between(prev, next),
            (Some(edge), None) | (None, Some(edge)) => Neighbors::Hold(edge),
            (None, None) => Neighbors::Empty,
        }
    }
}

// ============================================================================
// 骨骼轨道
// ============================================================================

pub type BoneMotionTrack = Track<BoneKeyframe>;

/// 骨骼帧采样结果（缺省通道为 None）
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BoneFrame {
    pub position: Option<Vec3>,
    pub rotation: Option<Quat>,
    pub cancelable_position: Option<Vec3>,
    pub cancelable_rotation: Option<Quat>,
    pub scale: Option<Vec3>,
    pub cancelable_scale: Option<Vec3>,
}

impl From<&BoneKeyframe> for BoneFrame {
    fn from(kf: &BoneKeyframe) -> Self {
        Self {
            position: kf.position,
            rotation: kf.rotation,
            cancelable_position: kf.cancelable_position,
            cancelable_rotation: kf.cancelable_rotation,
            scale: kf.scale,
            cancelable_scale: kf.cancelable_scale,
        }
    }
}

impl BoneFrame {
    /// 所有通道均缺省
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// 平移类通道（含缩放）逐轴用 `translation`，旋转类通道用 `rotation`
    fn blend(&self, other: &Self, translation: Vec3, rotation: f32) -> Self {
        Self {
            position: lerp_optional_vec3(self.position, other.position, translation, Vec3::ZERO),
            rotation: slerp_optional(self.rotation, other.rotation, rotation),
            cancelable_position: lerp_optional_vec3(
                self.cancelable_position,
                other.cancelable_position,
                translation,
                Vec3::ZERO,
            ),
            cancelable_rotation: slerp_optional(self.cancelable_rotation, other.cancelable_rotation, rotation),
            scale: lerp_optional_vec3(self.scale, other.scale, translation, Vec3::ONE),
            cancelable_scale: lerp_optional_vec3(self.cancelable_scale, other.cancelable_scale, translation, Vec3::ONE),
        }
    }
}

impl Track<BoneKeyframe> {
    /// 整数帧采样；插值曲线取自后一关键帧
    pub fn seek(&self, frame_index: u32, curves: &dyn BezierCurveFactory) -> BoneFrame {
        match self.neighbors(frame_index) {
            Neighbors::Exact(kf) | Neighbors::Hold(kf) => BoneFrame::from(kf),
            Neighbors::Between(prev, next) => {
                let coef = coefficient(prev.frame_index, next.frame_index, frame_index);
                let translation = next.interpolation.translation_amounts(coef, curves);
                let rotation = next.interpolation.rotation_amount(coef, curves);
                BoneFrame::from(prev).blend(&BoneFrame::from(next), translation, rotation)
            }
            Neighbors::Empty => BoneFrame::default(),
        }
    }

    /// 小数帧采样：相邻两个整数帧的结果再线性混合
    pub fn seek_precisely(&self, frame_index: u32, amount: f32, curves: &dyn BezierCurveFactory) -> BoneFrame {
        let current = self.seek(frame_index, curves);
        if amount <= 0.0 {
            return current;
        }
        let following = self.seek(frame_index.saturating_add(1), curves);
        current.blend(&following, Vec3::splat(amount), amount)
    }
}

// ============================================================================
// Morph 轨道
// ============================================================================

pub type MorphMotionTrack = Track<MorphKeyframe>;

impl Track<MorphKeyframe> {
    /// 整数帧的比率（线性插值，无关键帧时为 0）
    pub fn seek(&self, frame_index: u32) -> f32 {
        match self.neighbors(frame_index) {
            Neighbors::Exact(kf) | Neighbors::Hold(kf) => kf.weight,
            Neighbors::Between(prev, next) => {
                lerp_f32(prev.weight, next.weight, coefficient(prev.frame_index, next.frame_index, frame_index))
            }
            Neighbors::Empty => 0.0,
        }
    }

    pub fn seek_precisely(&self, frame_index: u32, amount: f32) -> f32 {
        let current = self.seek(frame_index);
        if amount <= 0.0 {
            return current;
        }
        lerp_f32(current, self.seek(frame_index.saturating_add(1)), amount)
    }
}

// ============================================================================
// IK 轨道
// ============================================================================

pub type IkMotionTrack = Track<IkKeyframe>;

impl Track<IkKeyframe> {
    /// 前一关键帧的状态保持到下一关键帧，首帧之前默认启用
    pub fn is_enabled_at(&self, frame_index: u32) -> bool {
        self.keyframes
            .range(..=frame_index)
            .next_back()
            .map_or(true, |(_, kf)| kf.enabled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::animation::bezier_curve::BezierCurveCache;

    #[test]
    fn test_bone_track_linear_midpoint() {
        let cache = BezierCurveCache::new();
        let mut track = BoneMotionTrack::new();
        track.insert(BoneKeyframe::new(0).with_position(Vec3::ZERO));
        track.insert(
            BoneKeyframe::new(10)
                .with_position(Vec3::new(10.0, 0.0, 0.0))
                .with_rotation(Quat::from_rotation_y(1.0)),
        );

        let frame = track.seek(5, &cache);
        assert!(frame.position.unwrap().abs_diff_eq(Vec3::new(5.0, 0.0, 0.0), 1e-4));
        // 前一帧缺省旋转，从单位四元数插值
        assert!(frame.rotation.unwrap().abs_diff_eq(Quat::from_rotation_y(0.5), 1e-4));
        assert!(frame.scale.is_none());
    }

    #[test]
    fn test_bone_track_bezier_uses_next_keyframe_curve() {
        let cache = BezierCurveCache::new();
        let mut track = BoneMotionTrack::new();
        track.insert(BoneKeyframe::new(0).with_position(Vec3::ZERO));
        let mut next = BoneKeyframe::new(10).with_position(Vec3::splat(10.0));
        next.interpolation.translation_y = [127, 0, 127, 0];
        track.insert(next);

        let frame = track.seek(3, &cache).position.unwrap();
        assert!((frame.x - 3.0).abs() < 0.1);
        // Y 轴曲线起步慢
        assert!(frame.y < 1.0);
        assert!(!cache.is_empty());
    }

    #[test]
    fn test_bone_track_bezier_exact_on_short_interval() {
        let cache = BezierCurveCache::new();
        let mut track = BoneMotionTrack::new();
        track.insert(BoneKeyframe::new(0).with_position(Vec3::ZERO));
        let mut next = BoneKeyframe::new(2).with_position(Vec3::Y);
        next.interpolation.translation_y = [127, 0, 127, 0];
        track.insert(next);

        // x(t) = 1 - (1-t)³ = 0.5 → y = t³
        let t = 1.0 - 0.5_f32.cbrt();
        let y = track.seek(1, &cache).position.unwrap().y;
        assert!((y - t * t * t).abs() < 1e-4, "y={}", y);
        assert!((y - 0.00878).abs() < 1e-4);
    }

    #[test]
    fn test_bone_track_precise_fraction() {
        let cache = BezierCurveCache::new();
        let mut track = BoneMotionTrack::new();
        track.insert(BoneKeyframe::new(0).with_position(Vec3::ZERO));
        track.insert(BoneKeyframe::new(2).with_position(Vec3::new(0.0, 2.0, 0.0)));

        let frame = track.seek_precisely(0, 0.5, &cache);
        assert!(frame.position.unwrap().abs_diff_eq(Vec3::new(0.0, 0.5, 0.0), 1e-4));
    }

    #[test]
    fn test_bone_track_holds_ends() {
        let cache = BezierCurveCache::new();
        let mut track = BoneMotionTrack::new();
        track.insert(BoneKeyframe::new(5).with_position(Vec3::X));
        assert_eq!(track.seek(0, &cache).position, Some(Vec3::X));
        assert_eq!(track.seek(99, &cache).position, Some(Vec3::X));
        assert!(BoneMotionTrack::new().seek(3, &cache).is_empty());
    }

    #[test]
    fn test_morph_track_linear() {
        let mut track = MorphMotionTrack::new();
        track.insert(MorphKeyframe::new(0, 0.0));
        track.insert(MorphKeyframe::new(4, 1.0));
        assert!((track.seek(1) - 0.25).abs() < 1e-6);
        assert!((track.seek_precisely(1, 0.5) - 0.375).abs() < 1e-6);
        assert_eq!(track.closest_frame_indexes(2), (Some(0), Some(4)));
        assert_eq!(track.last_frame_index(), 4);
    }

    #[test]
    fn test_ik_track_step() {
        let mut track = IkMotionTrack::new();
        track.insert(IkKeyframe::new(10, false));
        track.insert(IkKeyframe::new(20, true));
        assert!(track.is_enabled_at(0));
        assert!(!track.is_enabled_at(10));
        assert!(!track.is_enabled_at(19));
        assert!(track.is_enabled_at(20));
    }
}
