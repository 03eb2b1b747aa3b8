//! Motion 核心数据结构
//!
//! 存储完整的动画数据，包括骨骼轨道、Morph 轨道和 IK 启用轨道

use std::collections::HashMap;

use super::bezier_curve::BezierCurveCache;
use super::keyframe::{BoneKeyframe, IkKeyframe, MorphKeyframe};
use super::motion_track::{BoneFrame, BoneMotionTrack, IkMotionTrack, MorphMotionTrack};

/// 某帧的 IK 启用状态
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IkFrameState {
    states: HashMap<String, bool>,
}

impl IkFrameState {
    /// 未出现在动画中的 IK 骨骼默认启用
    pub fn is_enabled(&self, name: &str) -> bool {
        self.states.get(name).copied().unwrap_or(true)
    }

    pub fn set(&mut self, name: impl Into<String>, enabled: bool) {
        self.states.insert(name.into(), enabled);
    }
}

/// 动画数据
#[derive(Debug, Clone, Default)]
pub struct Motion {
    pub name: String,
    /// 骨骼动画轨道（骨骼名称 -> 轨道）
    bone_tracks: HashMap<String, BoneMotionTrack>,
    /// Morph 动画轨道（Morph 名称 -> 轨道）
    morph_tracks: HashMap<String, MorphMotionTrack>,
    /// IK 动画轨道（IK 骨骼名称 -> 轨道）
    ik_tracks: HashMap<String, IkMotionTrack>,
    /// 贝塞尔曲线缓存
    bezier_cache: BezierCurveCache,
}

/// 小数帧拆分为 (整数帧, 帧内比例)
fn split_frame(frame: f32) -> (u32, f32) {
    if !frame.is_finite() || frame <= 0.0 {
        return (0, 0.0);
    }
    let index = frame.floor();
    (index as u32, frame - index)
}

impl Motion {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// 获取动画持续时间（最大帧索引）
    pub fn duration(&self) -> u32 {
        let bone_max = self.bone_tracks.values().map(|t| t.last_frame_index()).max().unwrap_or(0);
        let morph_max = self.morph_tracks.values().map(|t| t.last_frame_index()).max().unwrap_or(0);
        let ik_max = self.ik_tracks.values().map(|t| t.last_frame_index()).max().unwrap_or(0);
        bone_max.max(morph_max).max(ik_max)
    }

    // ========================================
    // 写入
    // ========================================

    /// 插入骨骼关键帧
    pub fn insert_bone_keyframe(&mut self, name: &str, keyframe: BoneKeyframe) {
        self.bone_tracks
            .entry(name.to_string())
            .or_default()
            .insert(keyframe);
    }

    /// 插入 Morph 关键帧
    pub fn insert_morph_keyframe(&mut self, name: &str, keyframe: MorphKeyframe) {
        self.morph_tracks
            .entry(name.to_string())
            .or_default()
            .insert(keyframe);
    }

    /// 插入 IK 关键帧
    pub fn insert_ik_keyframe(&mut self, name: &str, keyframe: IkKeyframe) {
        self.ik_tracks
            .entry(name.to_string())
            .or_default()
            .insert(keyframe);
    }

    /// 一次写入某帧的 (IK 骨骼名, 启用) 列表
    pub fn insert_ik_states(&mut self, frame_index: u32, states: &[(&str, bool)]) {
        for (name, enabled) in states {
            self.insert_ik_keyframe(name, IkKeyframe::new(frame_index, *enabled));
        }
    }

    // ========================================
    // 采样
    // ========================================

    pub fn has_bone_track(&self, name: &str) -> bool {
        self.bone_tracks.contains_key(name)
    }

    pub fn has_morph_track(&self, name: &str) -> bool {
        self.morph_tracks.contains_key(name)
    }

    /// 骨骼帧；没有该骨骼的轨道时为 None
    pub fn bone_frame(&self, name: &str, frame: f32) -> Option<BoneFrame> {
        let track = self.bone_tracks.get(name)?;
        let (index, amount) = split_frame(frame);
        Some(track.seek_precisely(index, amount, &self.bezier_cache))
    }

    /// Morph 比率；没有该 Morph 的轨道时为 None
    pub fn morph_ratio(&self, name: &str, frame: f32) -> Option<f32> {
        let track = self.morph_tracks.get(name)?;
        let (index, amount) = split_frame(frame);
        Some(track.seek_precisely(index, amount))
    }

    /// 单个 IK 骨骼的启用状态
    pub fn is_ik_enabled(&self, name: &str, frame: f32) -> bool {
        let (index, _) = split_frame(frame);
        self.ik_tracks
            .get(name)
            .map(|track| track.is_enabled_at(index))
            .unwrap_or(true)
    }

    /// 某帧全部 IK 骨骼的启用状态；没有 IK 轨道时为 None
    pub fn ik_frame(&self, frame: f32) -> Option<IkFrameState> {
        if self.ik_tracks.is_empty() {
            return None;
        }
        let (index, _) = split_frame(frame);
        let mut state = IkFrameState::default();
        for (name, track) in &self.ik_tracks {
            state.set(name.clone(), track.is_enabled_at(index));
        }
        Some(state)
    }
}
