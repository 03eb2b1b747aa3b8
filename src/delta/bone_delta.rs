//! 骨骼差分
//!
//! 每帧每骨骼的临时状态：动画/Morph 各通道 + 合成后的矩阵缓存。
//! 所有通道默认为 None（缺省，而非单位值）。

use glam::{Mat4, Quat, Vec3};

use crate::math::{fixed_axis_rotation, is_ident_quat, safe_inverse};
use crate::skeleton::{BoneLink, BoneSet};

/// 骨骼差分
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BoneDelta {
    pub bone_index: usize,

    // ========== 动画通道 ==========
    pub frame_position: Option<Vec3>,
    pub frame_rotation: Option<Quat>,
    pub frame_cancelable_position: Option<Vec3>,
    pub frame_cancelable_rotation: Option<Quat>,
    pub frame_scale: Option<Vec3>,
    pub frame_cancelable_scale: Option<Vec3>,
    pub frame_local_mat: Option<Mat4>,

    // ========== Morph 通道 ==========
    pub frame_morph_position: Option<Vec3>,
    pub frame_morph_rotation: Option<Quat>,
    pub frame_morph_cancelable_position: Option<Vec3>,
    pub frame_morph_cancelable_rotation: Option<Quat>,
    pub frame_morph_scale: Option<Vec3>,
    pub frame_morph_cancelable_scale: Option<Vec3>,
    pub frame_local_morph_mat: Option<Mat4>,

    // ========== 合成结果 ==========
    pub unit_matrix: Option<Mat4>,
    pub global_matrix: Option<Mat4>,
    pub local_matrix: Option<Mat4>,
    pub global_position: Option<Vec3>,
    /// IK 求解前的全局矩阵快照
    pub global_ik_off_matrix: Option<Mat4>,
}

impl BoneDelta {
    pub fn new(bone_index: usize) -> Self {
        Self {
            bone_index,
            ..Default::default()
        }
    }

    /// 由全局矩阵反推差分（物理覆盖用）
    ///
    /// 反推的平移/旋转经单位矩阵重组后可还原同一全局矩阵
    pub fn from_global_matrix(bones: &BoneSet, bone: &BoneLink, global: Mat4, parent_global: Option<Mat4>) -> Self {
        let parent_global = parent_global.unwrap_or(Mat4::IDENTITY);
        let unit = safe_inverse(&parent_global) * global;
        let frame_position = unit.w_axis.truncate() - bones.revert_offset(bone);
        let frame_rotation = Quat::from_mat4(&unit).normalize();
        let local = global * Mat4::from_translation(-bone.position);

        Self {
            bone_index: bone.index(),
            frame_position: Some(frame_position),
            frame_rotation: Some(frame_rotation),
            unit_matrix: Some(unit),
            global_matrix: Some(global),
            local_matrix: Some(local),
            global_position: Some(global.w_axis.truncate()),
            ..Default::default()
        }
    }

    // ========================================
    // 缺省填充访问器
    // ========================================

    #[inline]
    pub fn filled_frame_rotation(&self) -> Quat {
        self.frame_rotation.unwrap_or(Quat::IDENTITY)
    }

    #[inline]
    pub fn filled_frame_morph_rotation(&self) -> Quat {
        self.frame_morph_rotation.unwrap_or(Quat::IDENTITY)
    }

    #[inline]
    pub fn filled_global_matrix(&self) -> Mat4 {
        self.global_matrix.unwrap_or(Mat4::IDENTITY)
    }

    #[inline]
    pub fn filled_unit_matrix(&self) -> Mat4 {
        self.unit_matrix.unwrap_or(Mat4::IDENTITY)
    }

    /// 全局位置（未缓存时从全局矩阵读取）
    #[inline]
    pub fn filled_global_position(&self) -> Vec3 {
        self.global_position
            .unwrap_or_else(|| self.filled_global_matrix().w_axis.truncate())
    }

    /// 蒙皮矩阵（未缓存时由全局矩阵与初始位置计算）
    pub fn filled_local_matrix(&self, bone_position: Vec3) -> Mat4 {
        self.local_matrix
            .unwrap_or_else(|| self.filled_global_matrix() * Mat4::from_translation(-bone_position))
    }

    // ========================================
    // 通道合成
    // ========================================

    /// 动画旋转 × Morph 旋转，固定轴骨骼重新投影到固定轴
    pub fn total_rotation(&self, bone: &BoneLink) -> Option<Quat> {
        let mut rot = self.frame_rotation;
        if let Some(morph) = self.frame_morph_rotation.filter(|q| !is_ident_quat(*q)) {
            rot = Some(match rot {
                Some(r) => r * morph,
                None => morph,
            });
        }
        let rot = rot?;
        if bone.has_fixed_axis() {
            return Some(fixed_axis_rotation(rot, bone.fixed_axis));
        }
        Some(rot)
    }

    #[inline]
    pub fn filled_total_rotation(&self, bone: &BoneLink) -> Quat {
        self.total_rotation(bone).unwrap_or(Quat::IDENTITY)
    }

    /// 动画平移 + Morph 平移
    pub fn total_position(&self) -> Option<Vec3> {
        match (self.frame_position, self.frame_morph_position.filter(|p| *p != Vec3::ZERO)) {
            (Some(p), Some(m)) => Some(p + m),
            (Some(p), None) => Some(p),
            (None, m) => m,
        }
    }

    /// 动画缩放 × Morph 缩放
    pub fn total_scale(&self) -> Option<Vec3> {
        match (self.frame_scale, self.frame_morph_scale.filter(|s| *s != Vec3::ONE)) {
            (Some(s), Some(m)) => Some(s * m),
            (Some(s), None) => Some(s),
            (None, m) => m,
        }
    }

    /// 帧局部矩阵 × Morph 局部矩阵（单位矩阵视为缺省）
    pub fn total_local_mat(&self) -> Option<Mat4> {
        let frame = self.frame_local_mat.filter(|m| *m != Mat4::IDENTITY);
        let morph = self.frame_local_morph_mat.filter(|m| *m != Mat4::IDENTITY);
        match (frame, morph) {
            (Some(f), Some(m)) => Some(f * m),
            (Some(f), None) => Some(f),
            (None, m) => m,
        }
    }

    /// 自身可取消旋转（动画 × Morph，单位值视为缺省）
    pub fn cancelable_rotation(&self) -> Option<Quat> {
        let frame = self.frame_cancelable_rotation.filter(|q| !is_ident_quat(*q));
        let morph = self.frame_morph_cancelable_rotation.filter(|q| !is_ident_quat(*q));
        match (frame, morph) {
            (Some(f), Some(m)) => Some(f * m),
            (Some(f), None) => Some(f),
            (None, m) => m,
        }
    }

    /// 自身可取消平移（动画 + Morph，零值视为缺省）
    pub fn cancelable_position(&self) -> Option<Vec3> {
        let frame = self.frame_cancelable_position.filter(|p| *p != Vec3::ZERO);
        let morph = self.frame_morph_cancelable_position.filter(|p| *p != Vec3::ZERO);
        match (frame, morph) {
            (Some(f), Some(m)) => Some(f + m),
            (Some(f), None) => Some(f),
            (None, m) => m,
        }
    }

    /// 自身可取消缩放（动画 × Morph，零值视为缺省）
    pub fn cancelable_scale(&self) -> Option<Vec3> {
        let frame = self.frame_cancelable_scale.filter(|s| *s != Vec3::ZERO);
        let morph = self.frame_morph_cancelable_scale.filter(|s| *s != Vec3::ZERO);
        match (frame, morph) {
            (Some(f), Some(m)) => Some(f * m),
            (Some(f), None) => Some(f),
            (None, m) => m,
        }
    }

    /// 清除合成缓存（单位矩阵重建后调用）
    #[inline]
    pub fn invalidate_global(&mut self) {
        self.global_matrix = None;
        self.local_matrix = None;
        self.global_position = None;
    }
}

// ============================================================================
// 骨骼差分集合
// ============================================================================

/// 骨骼差分集合（按骨骼索引稀疏存放）
#[derive(Clone, Debug, Default)]
pub struct BoneDeltas {
    deltas: Vec<Option<BoneDelta>>,
}

impl BoneDeltas {
    pub fn new(bone_count: usize) -> Self {
        Self {
            deltas: vec![None; bone_count],
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.deltas.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.deltas.is_empty()
    }

    /// 以有符号索引取差分（越界或缺省返回 None）
    #[inline]
    pub fn get(&self, index: i32) -> Option<&BoneDelta> {
        if index < 0 {
            return None;
        }
        self.deltas.get(index as usize).and_then(Option::as_ref)
    }

    #[inline]
    pub fn get_by_index(&self, index: usize) -> Option<&BoneDelta> {
        self.deltas.get(index).and_then(Option::as_ref)
    }

    #[inline]
    pub fn get_mut(&mut self, index: usize) -> Option<&mut BoneDelta> {
        self.deltas.get_mut(index).and_then(Option::as_mut)
    }

    /// 取差分，不存在时插入空差分
    pub fn get_or_insert(&mut self, index: usize) -> Option<&mut BoneDelta> {
        let slot = self.deltas.get_mut(index)?;
        Some(slot.get_or_insert_with(|| BoneDelta::new(index)))
    }

    #[inline]
    pub fn contains(&self, index: i32) -> bool {
        self.get(index).is_some()
    }

    pub fn insert(&mut self, delta: BoneDelta) {
        let index = delta.bone_index;
        if let Some(slot) = self.deltas.get_mut(index) {
            *slot = Some(delta);
        }
    }

    /// 存在差分的骨骼索引（升序）
    pub fn indexes(&self) -> Vec<usize> {
        self.deltas
            .iter()
            .enumerate()
            .filter_map(|(i, d)| d.as_ref().map(|_| i))
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &BoneDelta> {
        self.deltas.iter().filter_map(Option::as_ref)
    }

    /// 全局位置（缺省骨骼为 None）
    #[inline]
    pub fn global_position(&self, index: usize) -> Option<Vec3> {
        self.get_by_index(index).map(BoneDelta::filled_global_position)
    }
}
