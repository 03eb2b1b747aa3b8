//! IK 求解器 - CCD 迭代
//!
//! 设计原则：
//! - 直接在 BoneDeltas 上求解，链接结果写回 frame_rotation
//! - 支持全局轴 / 局部轴角度限制
//! - 单轴限制（膝盖等）把旋转轴吸附到限制轴
//! - つま先IK 首轮以关闭 IK 时的目标位置作为起点

use std::collections::{BTreeSet, VecDeque};
use std::f32::consts::FRAC_PI_2;

use glam::{Mat3, Quat, Vec3};

use super::bone_link::{BoneLink, IkConfig, IkLink};
use super::bone_set::BoneSet;
use super::evaluator::{
    add_bone_with_dependencies, apply_global_matrices_with_indexes, compute_bone_deltas, update_bone_delta,
};
use crate::animation::Motion;
use crate::config::get_config;
use crate::delta::BoneDeltas;
use crate::math::{
    axis_angle, is_finite_vec3, is_ident_quat, is_only_x, is_only_y, is_only_z, safe_inverse,
    separate_twist_by_axis, vector_angle, GIMBAL1_RAD,
};
use crate::model::MmdModel;

// ============================================================================
// 调试输出
// ============================================================================

/// 单个链接一步求解的结果
#[derive(Clone, Debug)]
pub struct IkLinkStep<'a> {
    pub ik_bone_name: &'a str,
    pub link_name: &'a str,
    pub loop_index: usize,
    pub link_index: usize,
    /// 写回的链接旋转
    pub rotation: Quat,
    pub axis: Vec3,
    pub angle: f32,
    /// 本步之后 IK 骨骼与目标的距离
    pub distance: f32,
}

/// IK 逐步结果的接收端
pub trait IkDebugSink {
    fn on_link_step(&mut self, _step: &IkLinkStep<'_>) {}
}

/// 不做任何事的接收端
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopIkDebugSink;

impl IkDebugSink for NoopIkDebugSink {}

// ============================================================================
// 求解上下文
// ============================================================================

/// 一次 IK 处理的只读上下文
pub(crate) struct IkPass<'a> {
    pub model: &'a MmdModel,
    pub motion: Option<&'a Motion>,
    pub frame: f32,
    /// 只处理物理后变形的 IK 骨骼（false 时跳过它们）
    pub after_physics: bool,
    pub remove_twist: bool,
}

/// 按求值顺序对每根 IK 骨骼求解
pub(crate) fn apply_ik_deltas(pass: &IkPass<'_>, deltas: &mut BoneDeltas, order: &[usize], sink: &mut dyn IkDebugSink) {
    let bones = &pass.model.bones;
    let debug = get_config().debug_log;

    for &index in order {
        let Some(bone) = bones.get(index) else {
            continue;
        };
        if !bone.is_ik() || bone.is_after_physics() != pass.after_physics {
            continue;
        }
        if let Some(motion) = pass.motion {
            if !motion.is_ik_enabled(&bone.name, pass.frame) {
                if debug {
                    log::trace!("[IK] {} 在帧 {:.2} 被关闭", bone.name, pass.frame);
                }
                continue;
            }
        }

        // IK 前的全局矩阵快照
        for chain_index in collect_ik_chain_indexes(bones, bone) {
            if let Some(delta) = deltas.get_mut(chain_index) {
                delta.global_ik_off_matrix = Some(delta.filled_global_matrix());
            }
        }
        apply_ik_for_bone(pass, deltas, bone, order, sink);
    }
}

/// IK 链：IK 骨骼、目标、链接以及它们的父链
fn collect_ik_chain_indexes(bones: &BoneSet, ik_bone: &BoneLink) -> Vec<usize> {
    let mut indexes = BTreeSet::new();
    add_bone_with_dependencies(bones, ik_bone, true, &mut indexes);
    let mut indexes: Vec<usize> = indexes.into_iter().collect();
    bones.sort_by_layer(&mut indexes);
    indexes
}

fn position_in(order: &[usize], index: usize) -> Option<usize> {
    order.iter().position(|&i| i == index)
}

/// 目标骨骼先于 IK 骨骼求值
fn is_target_before_ik(order: &[usize], target: usize, ik: usize) -> bool {
    match (position_in(order, target), position_in(order, ik)) {
        (Some(t), Some(i)) => t < i,
        _ => false,
    }
}

fn target_distance(deltas: &BoneDeltas, ik_index: usize, target: usize) -> f32 {
    match (deltas.global_position(ik_index), deltas.global_position(target)) {
        (Some(ik), Some(target)) => ik.distance(target),
        _ => f32::MAX,
    }
}

/// 单根 IK 骨骼的 CCD 求解
fn apply_ik_for_bone(
    pass: &IkPass<'_>,
    deltas: &mut BoneDeltas,
    ik_bone: &BoneLink,
    order: &[usize],
    sink: &mut dyn IkDebugSink,
) {
    let bones = &pass.model.bones;
    let Some(ik) = ik_bone.ik_config.as_ref() else {
        return;
    };
    if ik.links.is_empty() {
        return;
    }
    let Some(target) = ik_bone.ik_target().filter(|&t| t < bones.len()) else {
        return;
    };

    let config = get_config();
    let target_before = is_target_before_ik(order, target, ik_bone.index());
    let mut loop_count = ik.iterations.max(1) as usize;
    if target_before {
        loop_count += 1;
    }
    let single = ik.links.len() == 1;

    let ik_on_pos = deltas
        .global_position(ik_bone.index())
        .unwrap_or(ik_bone.position);
    let mut ik_pos = ik_on_pos;
    let mut use_toe_ik = false;
    if target_before && single && ik_bone.is_toe_ik() && pass.motion.is_some() {
        if let Some(target_bone) = bones.get(target) {
            // 关闭 IK 时的目标位置
            let (ik_off, _) = compute_bone_deltas(
                pass.model,
                pass.motion,
                pass.frame,
                &[target_bone.name.as_str()],
                false,
                false,
                false,
            );
            if let Some(pos) = ik_off.global_position(target) {
                ik_pos = pos;
                use_toe_ik = true;
            }
        }
    }

    let mut best_distance = f32::MAX;
    let mut best_rotations: Vec<(usize, Option<Quat>)> = Vec::new();

    for loop_index in 0..loop_count {
        for (link_index, link) in ik.links.iter().enumerate() {
            let Some(link_bone) = bones.get_signed(link.bone_index) else {
                continue;
            };
            if use_toe_ik && loop_index == 1 && link_index == 0 {
                ik_pos = ik_on_pos;
            }
            let Some(target_pos) = deltas.global_position(target) else {
                continue;
            };
            let Some(link_delta) = deltas.get_or_insert(link_bone.index()) else {
                continue;
            };
            let link_rotation = link_delta.filled_total_rotation(link_bone);
            let morph_rotation = link_delta.frame_morph_rotation.filter(|q| !is_ident_quat(*q));
            let link_inv = safe_inverse(&link_delta.filled_global_matrix());

            let target_local = link_inv.transform_point3(target_pos).normalize_or_zero();
            let ik_local = link_inv.transform_point3(ik_pos).normalize_or_zero();
            if target_local == Vec3::ZERO || ik_local == Vec3::ZERO {
                continue;
            }

            let unit_rad = ik.limit_angle * (link_index + 1) as f32;
            let angle = vector_angle(target_local, ik_local).min(unit_rad);
            let local_axes = bones.local_axes(link_bone);
            let mut axis = target_local.cross(ik_local).normalize_or_zero();
            if (!single || angle > GIMBAL1_RAD) && link.is_constrained() {
                axis = link_axis(link, axis, local_axes);
            }

            let input = IkStepInput {
                link_rotation,
                axis,
                angle,
                loop_index,
                loop_count,
                remove_twist: pass.remove_twist,
                fixed_axis: link_bone.has_fixed_axis().then_some(link_bone.fixed_axis),
                child_axis: bones.child_direction(link_bone),
                local_axes,
            };
            let Some(mut rotation) = solve_ik_step(link, &input) else {
                continue;
            };
            if let Some(morph) = morph_rotation {
                rotation *= morph.inverse();
            }

            if let Some(link_delta) = deltas.get_mut(link_bone.index()) {
                link_delta.frame_rotation = Some(rotation);
            }
            refresh_link(bones, deltas, link_bone.index());

            sink.on_link_step(&IkLinkStep {
                ik_bone_name: &ik_bone.name,
                link_name: &link_bone.name,
                loop_index,
                link_index,
                rotation,
                axis,
                angle,
                distance: target_distance(deltas, ik_bone.index(), target),
            });
        }

        let distance = target_distance(deltas, ik_bone.index(), target);
        if distance < best_distance {
            best_distance = distance;
            best_rotations = snapshot_link_rotations(deltas, ik);
        }
        if config.debug_log {
            log::trace!("[IK] {} loop={} distance={:.6}", ik_bone.name, loop_index, distance);
        }
        if distance <= config.ik_convergence_distance {
            break;
        }
    }

    // 结束时若比最佳姿势差则恢复
    if config.ik_restore_best_pose && !best_rotations.is_empty() {
        let distance = target_distance(deltas, ik_bone.index(), target);
        if distance > best_distance {
            for (index, rotation) in &best_rotations {
                if let Some(delta) = deltas.get_mut(*index) {
                    delta.frame_rotation = *rotation;
                }
                refresh_link(bones, deltas, *index);
            }
            if config.debug_log {
                log::debug!("[IK] {} 恢复最佳姿势 distance={:.6}", ik_bone.name, best_distance);
            }
        }
    }
}

fn snapshot_link_rotations(deltas: &BoneDeltas, ik: &IkConfig) -> Vec<(usize, Option<Quat>)> {
    ik.links
        .iter()
        .filter(|link| link.bone_index >= 0)
        .filter_map(|link| {
            let index = link.bone_index as usize;
            deltas.get_by_index(index).map(|d| (index, d.frame_rotation))
        })
        .collect()
}

/// 链接旋转改变后：重建它与付与子的单位矩阵，再按变形顺序重组所有后代的全局矩阵
fn refresh_link(bones: &BoneSet, deltas: &mut BoneDeltas, link: usize) {
    update_bone_delta(bones, deltas, link);

    let related = breadth_first(bones.len(), link, |i| bones.effector_children_of(i));
    for &index in related.iter().filter(|&&i| i != link) {
        update_bone_delta(bones, deltas, index);
    }

    let mut affected = vec![false; bones.len()];
    for &start in &related {
        for index in breadth_first(bones.len(), start, |i| bones.children_of(i)) {
            affected[index] = true;
        }
    }
    let recalc: Vec<usize> = bones
        .deform_order()
        .iter()
        .copied()
        .filter(|&i| affected[i])
        .collect();
    apply_global_matrices_with_indexes(bones, deltas, &recalc);
}

/// 从起点出发的广度优先遍历（含起点）
fn breadth_first<'a>(count: usize, start: usize, next: impl Fn(usize) -> &'a [usize]) -> Vec<usize> {
    let mut visited = vec![false; count];
    let mut out = Vec::new();
    let mut queue = VecDeque::from([start]);
    while let Some(index) = queue.pop_front() {
        if index >= count || visited[index] {
            continue;
        }
        visited[index] = true;
        out.push(index);
        queue.extend(next(index));
    }
    out
}

// ============================================================================
// 单步计算
// ============================================================================

/// 单个链接一步的输入
struct IkStepInput {
    link_rotation: Quat,
    axis: Vec3,
    angle: f32,
    loop_index: usize,
    loop_count: usize,
    remove_twist: bool,
    fixed_axis: Option<Vec3>,
    child_axis: Vec3,
    local_axes: (Vec3, Vec3, Vec3),
}

/// 一步求解：步进旋转 + 角度限制；输入无效时返回 None（链接保持不变）
fn solve_ik_step(link: &IkLink, input: &IkStepInput) -> Option<Quat> {
    let total = calc_ik_step(link, input)?;
    Some(apply_ik_limit(link, total, input))
}

/// 链接旋转 × 步进旋转
fn calc_ik_step(link: &IkLink, input: &IkStepInput) -> Option<Quat> {
    let mut angle = input.angle;
    let axis = input.axis;
    if !angle.is_finite() || !is_finite_vec3(axis) || axis == Vec3::ZERO || angle == 0.0 {
        return None;
    }

    let step = match input.fixed_axis.map(Vec3::normalize_or_zero).filter(|a| *a != Vec3::ZERO) {
        Some(fixed) if !link.is_constrained() => separate_twist_by_axis(axis_angle(axis, angle), fixed).0,
        Some(fixed) => {
            if axis.dot(fixed) < 0.0 {
                angle = -angle;
            }
            axis_angle(fixed, angle)
        }
        None => {
            let step = axis_angle(axis, angle);
            if input.remove_twist {
                separate_twist_by_axis(step, input.child_axis).1
            } else {
                step
            }
        }
    };
    Some(input.link_rotation * step)
}

fn apply_ik_limit(link: &IkLink, total: Quat, input: &IkStepInput) -> Quat {
    if link.has_limits {
        return solve_ik(
            total,
            link.limit_min,
            link.limit_max,
            (Vec3::X, Vec3::Y, Vec3::Z),
            input.loop_index,
            input.loop_count,
        );
    }
    if link.has_local_limits {
        return solve_ik(
            total,
            link.local_limit_min,
            link.local_limit_max,
            input.local_axes,
            input.loop_index,
            input.loop_count,
        );
    }
    total
}

/// 受限轴放中间的欧拉分解 → 逐轴限制 → 重组
///
/// X 轴受限用 Y·X·Z，Y 轴受限用 Z·Y·X，否则 X·Z·Y。
/// 分解与重组都在 `axes` 张成的基底下进行（全局限制时为单位基底）。
pub(crate) fn solve_ik(
    total: Quat,
    min: Vec3,
    max: Vec3,
    axes: (Vec3, Vec3, Vec3),
    loop_index: usize,
    loop_count: usize,
) -> Quat {
    let (axis_x, axis_y, axis_z) = axes;
    let basis = Mat3::from_cols(axis_x, axis_y, axis_z);
    let m = basis.transpose() * Mat3::from_quat(total) * basis;
    let (ax, ay, az) = (m.x_axis, m.y_axis, m.z_axis);
    let limit = |v: f32, lo: f32, hi: f32| ik_axis_value(v, lo, hi, loop_index, loop_count);

    if min.x > -FRAC_PI_2 && max.x < FRAC_PI_2 {
        let fx = clamp_gimbal((-az.y).clamp(-1.0, 1.0).asin());
        let inv = 1.0 / fx.cos();
        let fy = (az.x * inv).atan2(az.z * inv);
        let fz = (ax.y * inv).atan2(ay.y * inv);
        let (fx, fy, fz) = (limit(fx, min.x, max.x), limit(fy, min.y, max.y), limit(fz, min.z, max.z));
        return axis_angle(axis_y, fy) * axis_angle(axis_x, fx) * axis_angle(axis_z, fz);
    }
    if min.y > -FRAC_PI_2 && max.y < FRAC_PI_2 {
        let fy = clamp_gimbal((-ax.z).clamp(-1.0, 1.0).asin());
        let inv = 1.0 / fy.cos();
        let fx = (ay.z * inv).atan2(az.z * inv);
        let fz = (ax.y * inv).atan2(ax.x * inv);
        let (fx, fy, fz) = (limit(fx, min.x, max.x), limit(fy, min.y, max.y), limit(fz, min.z, max.z));
        return axis_angle(axis_z, fz) * axis_angle(axis_y, fy) * axis_angle(axis_x, fx);
    }
    let fz = clamp_gimbal(ay.x.clamp(-1.0, 1.0).asin());
    let inv = 1.0 / fz.cos();
    let fx = (ay.z * inv).atan2(ay.y * inv);
    let fy = (ax.x * inv).atan2(az.x * inv);
    let (fx, fy, fz) = (limit(fx, min.x, max.x), limit(fy, min.y, max.y), limit(fz, min.z, max.z));
    axis_angle(axis_x, fx) * axis_angle(axis_z, fz) * axis_angle(axis_y, fy)
}

/// 中间轴角度不超过万向节锁判定角
fn clamp_gimbal(v: f32) -> f32 {
    if v.abs() > GIMBAL1_RAD {
        GIMBAL1_RAD.copysign(v)
    } else {
        v
    }
}

/// 角度限制：前半轮允许以边界反射，否则截断到边界
fn ik_axis_value(value: f32, min: f32, max: f32, loop_index: usize, loop_count: usize) -> f32 {
    let in_loop = (loop_index as f32) < loop_count as f32 / 2.0;
    let mut v = value;
    if v < min {
        let reflected = 2.0 * min - v;
        v = if reflected <= max && in_loop { reflected } else { min };
    }
    if v > max {
        let reflected = 2.0 * max - v;
        v = if reflected >= min && in_loop { reflected } else { max };
    }
    v
}

/// 单轴限制的链接把旋转轴吸附到该轴（保留原轴方向的符号）
///
/// 局部限制时吸附到骨骼的局部轴
fn link_axis(link: &IkLink, axis: Vec3, local_axes: (Vec3, Vec3, Vec3)) -> Vec3 {
    let (min, max, (unit_x, unit_y, unit_z)) = if link.has_local_limits {
        (link.local_limit_min, link.local_limit_max, local_axes)
    } else {
        (link.limit_min, link.limit_max, (Vec3::X, Vec3::Y, Vec3::Z))
    };
    let signed = |unit: Vec3| if axis.dot(unit) >= 0.0 { unit } else { -unit };
    if is_only_x(min) || is_only_x(max) {
        return signed(unit_x);
    }
    if is_only_y(min) || is_only_y(max) {
        return signed(unit_y);
    }
    if is_only_z(min) || is_only_z(max) {
        return signed(unit_z);
    }
    axis
}
