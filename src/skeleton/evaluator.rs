//! 骨骼姿势求值
//!
//! 按 (layer, index) 顺序把动画/Morph 差分合成为单位矩阵，再与父骨骼组合成全局矩阵。
//! 缺失的骨骼或差分一律视为单位贡献，不会 panic。

use std::collections::{BTreeSet, HashSet, VecDeque};

use glam::{Mat4, Quat, Vec3};

use super::bone_link::BoneLink;
use super::bone_set::BoneSet;
use super::ik_solver::{apply_ik_deltas, IkDebugSink, IkPass, NoopIkDebugSink};
use crate::animation::{BoneFrame, Motion};
use crate::config::get_config;
use crate::delta::{BoneDelta, BoneDeltas, BoneMorphDelta};
use crate::math::{is_ident_quat, scaled_rotation};
use crate::model::MmdModel;
use crate::morph::compute_bone_morph_deltas;

// ============================================================================
// 公共入口
// ============================================================================

/// 计算骨骼差分并合成矩阵
///
/// - `bone_names` 为空时处理全部骨骼，否则只处理指定骨骼及其依赖
/// - `include_ik` 为 true 时执行 IK
/// - `after_physics` 为 true 时只处理物理后变形骨骼
///
/// 返回 (差分存储, 求值顺序)
pub fn compute_bone_deltas(
    model: &MmdModel,
    motion: Option<&Motion>,
    frame: f32,
    bone_names: &[&str],
    include_ik: bool,
    after_physics: bool,
    remove_twist: bool,
) -> (BoneDeltas, Vec<usize>) {
    compute_bone_deltas_with_sink(
        model,
        motion,
        frame,
        bone_names,
        include_ik,
        after_physics,
        remove_twist,
        &mut NoopIkDebugSink,
    )
}

/// 同 [`compute_bone_deltas`]，IK 每步结果写入 `sink`
#[allow(clippy::too_many_arguments)]
pub fn compute_bone_deltas_with_sink(
    model: &MmdModel,
    motion: Option<&Motion>,
    frame: f32,
    bone_names: &[&str],
    include_ik: bool,
    after_physics: bool,
    remove_twist: bool,
    sink: &mut dyn IkDebugSink,
) -> (BoneDeltas, Vec<usize>) {
    let bones = &model.bones;
    let order = if after_physics {
        collect_after_physics_indexes(bones, bone_names)
    } else {
        collect_bone_indexes(bones, bone_names, include_ik)
    };

    let mut deltas = BoneDeltas::new(bones.len());
    let morph_deltas = compute_bone_morph_deltas(model, motion, frame);
    for &index in &order {
        let Some(bone) = bones.get(index) else {
            continue;
        };
        let Some(delta) = deltas.get_or_insert(index) else {
            continue;
        };
        if let Some(bone_frame) = motion.and_then(|m| m.bone_frame(&bone.name, frame)) {
            fill_frame_channels(delta, &bone_frame);
        }
        if let Some(morph) = morph_deltas.bone(index) {
            fill_morph_channels(delta, morph);
        }
    }

    apply_bone_matrices_with_indexes(bones, &mut deltas, &order);

    if include_ik {
        let pass = IkPass {
            model,
            motion,
            frame,
            after_physics,
            remove_twist,
        };
        apply_ik_deltas(&pass, &mut deltas, &order, sink);
        apply_bone_matrices_with_indexes(bones, &mut deltas, &order);
    }

    if get_config().debug_log {
        log::debug!(
            "[Deform] 帧 {:.2}: 求值骨骼数={}, IK={}, 物理后={}",
            frame,
            order.len(),
            include_ik,
            after_physics
        );
    }
    (deltas, order)
}

/// 对存储中的全部骨骼按 (layer, index) 顺序重建单位矩阵与全局矩阵
pub fn apply_bone_matrices(bones: &BoneSet, deltas: &mut BoneDeltas) {
    let mut indexes = deltas.indexes();
    bones.sort_by_layer(&mut indexes);
    apply_bone_matrices_with_indexes(bones, deltas, &indexes);
}

/// 按给定顺序重建单位矩阵与全局矩阵（调用方保证父先于子）
pub fn apply_bone_matrices_with_indexes(bones: &BoneSet, deltas: &mut BoneDeltas, indexes: &[usize]) {
    for &index in indexes {
        update_bone_delta(bones, deltas, index);
        apply_global_matrix(bones, deltas, index);
    }
}

/// 只重组全局矩阵（单位矩阵缺失时才重建，蒙皮矩阵延后计算）
pub fn apply_global_matrices_with_indexes(bones: &BoneSet, deltas: &mut BoneDeltas, indexes: &[usize]) {
    for &index in indexes {
        let needs_unit = deltas
            .get_by_index(index)
            .is_some_and(|d| d.unit_matrix.is_none());
        if needs_unit {
            update_bone_delta(bones, deltas, index);
        }
        apply_global_matrix_no_local(bones, deltas, index);
    }
}

// ============================================================================
// 通道填充
// ============================================================================

fn fill_frame_channels(delta: &mut BoneDelta, frame: &BoneFrame) {
    delta.frame_position = frame.position;
    delta.frame_rotation = frame.rotation;
    delta.frame_cancelable_position = frame.cancelable_position;
    delta.frame_cancelable_rotation = frame.cancelable_rotation;
    delta.frame_scale = frame.scale;
    delta.frame_cancelable_scale = frame.cancelable_scale;
}

fn fill_morph_channels(delta: &mut BoneDelta, morph: &BoneMorphDelta) {
    delta.frame_morph_position = morph.position;
    delta.frame_morph_rotation = morph.rotation;
    delta.frame_morph_cancelable_position = morph.cancelable_position;
    delta.frame_morph_cancelable_rotation = morph.cancelable_rotation;
    delta.frame_morph_scale = morph.scale;
    delta.frame_morph_cancelable_scale = morph.cancelable_scale;
    delta.frame_local_morph_mat = morph.local_mat;
}

// ============================================================================
// 求值对象收集
// ============================================================================

/// 收集求值骨骼：名称为空时全部，否则沿依赖关系 BFS 展开
fn collect_bone_indexes(bones: &BoneSet, bone_names: &[&str], include_ik: bool) -> Vec<usize> {
    if bone_names.is_empty() {
        return bones.deform_order().to_vec();
    }

    let mut visited = HashSet::new();
    for name in bone_names {
        let Some(start) = bones.index_of(name) else {
            continue;
        };
        add_related_indexes(bones, start, include_ik, &mut visited);
    }
    let mut indexes: Vec<usize> = visited.into_iter().collect();
    bones.sort_by_layer(&mut indexes);
    indexes
}

/// 从起点沿 父骨骼 / 付与源 / 付与子 / IK 关系 展开
fn add_related_indexes(bones: &BoneSet, start: usize, include_ik: bool, visited: &mut HashSet<usize>) {
    let mut queue = VecDeque::from([start]);
    while let Some(index) = queue.pop_front() {
        if !visited.insert(index) {
            continue;
        }
        let Some(bone) = bones.get(index) else {
            continue;
        };
        if let Some(parent) = bone.parent_id().filter(|&p| p < bones.len()) {
            queue.push_back(parent);
        }
        if let Some(source) = bone.append_parent().filter(|&p| bone.has_append() && p < bones.len()) {
            queue.push_back(source);
        }
        if include_ik {
            if let Some(ik) = bone.ik_config.as_ref().filter(|_| bone.is_ik()) {
                if bones.contains(ik.target_bone) {
                    queue.push_back(ik.target_bone as usize);
                }
                for link in &ik.links {
                    if bones.contains(link.bone_index) {
                        queue.push_back(link.bone_index as usize);
                    }
                }
            }
        }
        queue.extend(bones.effector_children_of(index));
        if include_ik {
            queue.extend(bones.ik_bones_targeting(index));
            queue.extend(bones.ik_bones_linking(index));
        }
    }
}

/// 收集物理后变形骨骼及其父链与 IK 依赖
fn collect_after_physics_indexes(bones: &BoneSet, bone_names: &[&str]) -> Vec<usize> {
    let mut selected = BTreeSet::new();
    let requested: Vec<&BoneLink> = if bone_names.is_empty() {
        bones.iter().filter(|b| b.is_after_physics()).collect()
    } else {
        bone_names
            .iter()
            .filter_map(|name| bones.find_by_name(name))
            .filter(|b| b.is_after_physics())
            .collect()
    };
    for bone in requested {
        add_bone_with_dependencies(bones, bone, true, &mut selected);
    }
    let mut indexes: Vec<usize> = selected.into_iter().collect();
    bones.sort_by_layer(&mut indexes);
    indexes
}

/// 骨骼自身 + 父链 + 付与源父链，`include_ik` 时再加 IK 目标与链接的父链
pub(crate) fn add_bone_with_dependencies(
    bones: &BoneSet,
    bone: &BoneLink,
    include_ik: bool,
    indexes: &mut BTreeSet<usize>,
) {
    add_bone_and_parents(bones, bone.index(), indexes);
    if let Some(source) = bone.append_parent().filter(|_| bone.has_append()) {
        add_bone_and_parents(bones, source, indexes);
    }
    if include_ik && bone.is_ik() {
        if let Some(ik) = &bone.ik_config {
            if let Some(target) = bone.ik_target() {
                add_bone_and_parents(bones, target, indexes);
            }
            for link in ik.links.iter().filter(|l| l.bone_index >= 0) {
                add_bone_and_parents(bones, link.bone_index as usize, indexes);
            }
        }
    }
}

fn add_bone_and_parents(bones: &BoneSet, start: usize, indexes: &mut BTreeSet<usize>) {
    let mut current = bones.get(start);
    while let Some(bone) = current {
        // 已存在说明父链也已加入
        if !indexes.insert(bone.index()) {
            break;
        }
        current = bone.parent_id().and_then(|p| bones.get(p));
    }
}

// ============================================================================
// 单位矩阵
// ============================================================================

/// 重建单位矩阵：局部矩阵 × 缩放 × 平移 × 旋转，再左乘初始偏移
pub(crate) fn update_bone_delta(bones: &BoneSet, deltas: &mut BoneDeltas, index: usize) {
    let Some(bone) = bones.get(index) else {
        return;
    };
    let Some(delta) = deltas.get_by_index(index) else {
        return;
    };
    let max_depth = get_config().max_effector_recursion;

    let mut unit = Mat4::IDENTITY;
    if let Some(local) = delta.total_local_mat() {
        unit *= local;
    }
    if let Some(scale) = total_scale(deltas, bone) {
        unit *= Mat4::from_scale(scale);
    }
    if let Some(position) = total_position(bones, deltas, bone, max_depth) {
        unit *= Mat4::from_translation(position);
    }
    if let Some(rotation) = total_rotation(bones, deltas, bone, max_depth) {
        unit *= Mat4::from_quat(rotation);
    }
    let unit = Mat4::from_translation(bones.revert_offset(bone)) * unit;

    if let Some(delta) = deltas.get_mut(index) {
        delta.unit_matrix = Some(unit);
        delta.invalidate_global();
    }
}

/// 付与旋转递归合成，深度超限或差分缺失时为 None
fn accumulate_rotation(bones: &BoneSet, deltas: &BoneDeltas, index: usize, depth: usize, factor: f32, max_depth: usize) -> Option<Quat> {
    if depth > max_depth {
        return None;
    }
    let bone = bones.get(index)?;
    let delta = deltas.get_by_index(index)?;
    let mut rotation = delta.total_rotation(bone);
    if bone.is_append_rotate() {
        if let Some(source) = bone.append_parent() {
            let effector = accumulate_rotation(bones, deltas, source, depth + 1, bone.append_rate(), max_depth);
            if let Some(effector) = effector {
                rotation = Some(match rotation {
                    Some(r) => r * effector,
                    None => effector,
                });
            }
        }
    }
    rotation.map(|r| scaled_rotation(r, factor))
}

/// 合成旋转 + 可取消旋转
fn total_rotation(bones: &BoneSet, deltas: &BoneDeltas, bone: &BoneLink, max_depth: usize) -> Option<Quat> {
    let delta = deltas.get_by_index(bone.index())?;
    let rotation = accumulate_rotation(bones, deltas, bone.index(), 0, 1.0, max_depth).unwrap_or(Quat::IDENTITY);
    let self_cancel = delta.cancelable_rotation();
    let parent_cancel = deltas.get(bone.parent_index).and_then(BoneDelta::cancelable_rotation);

    match (self_cancel, parent_cancel) {
        (None, None) => (!is_ident_quat(rotation)).then_some(rotation),
        (None, Some(parent)) => Some(rotation * parent.inverse()),
        (Some(own), None) => Some(rotation * own),
        (Some(own), Some(parent)) => Some(rotation * own * parent.inverse()),
    }
}

fn accumulate_position(bones: &BoneSet, deltas: &BoneDeltas, index: usize, depth: usize, max_depth: usize) -> Option<Vec3> {
    if depth > max_depth {
        return None;
    }
    let bone = bones.get(index)?;
    let delta = deltas.get_by_index(index)?;
    let position = delta.total_position();
    if bone.is_append_translate() {
        if let Some(source) = bone.append_parent() {
            if let Some(effector) = accumulate_position(bones, deltas, source, depth + 1, max_depth) {
                let effector = effector * bone.append_rate();
                return Some(position.map_or(effector, |p| p + effector));
            }
        }
    }
    position
}

/// 合成平移 + 自身可取消平移 − 父可取消平移
fn total_position(bones: &BoneSet, deltas: &BoneDeltas, bone: &BoneLink, max_depth: usize) -> Option<Vec3> {
    let delta = deltas.get_by_index(bone.index())?;
    let mut position = accumulate_position(bones, deltas, bone.index(), 0, max_depth).unwrap_or(Vec3::ZERO);
    if let Some(own) = delta.cancelable_position() {
        position += own;
    }
    if let Some(parent) = deltas.get(bone.parent_index).and_then(BoneDelta::cancelable_position) {
        position -= parent;
    }
    (position != Vec3::ZERO).then_some(position)
}

/// 合成缩放 × 自身可取消缩放 ÷ 父可取消缩放（不经付与传播）
fn total_scale(deltas: &BoneDeltas, bone: &BoneLink) -> Option<Vec3> {
    let delta = deltas.get_by_index(bone.index())?;
    let base = delta.total_scale();
    let own = delta.cancelable_scale();
    let parent = deltas.get(bone.parent_index).and_then(BoneDelta::cancelable_scale);

    let mut scale = base.unwrap_or(Vec3::ONE);
    if let Some(own) = own {
        scale *= own;
    }
    if let Some(parent) = parent {
        scale *= safe_recip(parent);
    }
    let has_scale = base.is_some_and(|s| s != Vec3::ONE);
    (has_scale || own.is_some() || parent.is_some()).then_some(scale)
}

/// 分量倒数，零分量保持 1
///
/// 逐分量处理：某一轴为零时只有该轴不取消，其余轴照常除去父缩放
fn safe_recip(v: Vec3) -> Vec3 {
    let recip = |x: f32| if x == 0.0 { 1.0 } else { 1.0 / x };
    Vec3::new(recip(v.x), recip(v.y), recip(v.z))
}

// ============================================================================
// 全局矩阵
// ============================================================================

/// 父矩阵：父骨骼为 IK 且有 IK 前快照时用快照，否则用父全局矩阵
fn parent_global_matrix(bones: &BoneSet, deltas: &BoneDeltas, bone: &BoneLink) -> Option<Mat4> {
    let parent = deltas.get(bone.parent_index)?;
    let parent_is_ik = bones.get_signed(bone.parent_index).is_some_and(BoneLink::is_ik);
    match parent.global_ik_off_matrix {
        Some(ik_off) if parent_is_ik => Some(ik_off),
        _ => parent.global_matrix,
    }
}

/// 组合全局矩阵并更新蒙皮矩阵与全局位置
fn apply_global_matrix(bones: &BoneSet, deltas: &mut BoneDeltas, index: usize) {
    compose_global(bones, deltas, index, true);
}

/// 组合全局矩阵（蒙皮矩阵留待之后计算）
fn apply_global_matrix_no_local(bones: &BoneSet, deltas: &mut BoneDeltas, index: usize) {
    compose_global(bones, deltas, index, false);
}

fn compose_global(bones: &BoneSet, deltas: &mut BoneDeltas, index: usize, with_local: bool) {
    let Some(bone) = bones.get(index) else {
        return;
    };
    let parent = parent_global_matrix(bones, deltas, bone);
    let Some(delta) = deltas.get_mut(index) else {
        return;
    };
    let unit = *delta.unit_matrix.get_or_insert(Mat4::IDENTITY);
    let global = match parent {
        Some(parent) if unit == Mat4::IDENTITY => parent,
        Some(parent) => parent * unit,
        None => unit,
    };
    delta.global_matrix = Some(global);
    if with_local {
        delta.local_matrix = Some(global * Mat4::from_translation(-bone.position));
        delta.global_position = Some(global.w_axis.truncate());
    } else {
        delta.local_matrix = None;
        delta.global_position = None;
    }
}
