//! Morph 解析
//!
//! 按帧采样 Morph 比率，把组 Morph 展开为叶子贡献后写入 MorphDeltas。
//! 材质贡献先全部乘算再全部加算，因此结果与 Morph 枚举顺序无关。

use std::collections::HashSet;

use glam::{Quat, Vec3, Vec4};

use super::{MaterialCalcMode, Morph, MorphKind, MorphOffset};
use crate::animation::Motion;
use crate::config::get_config;
use crate::delta::{BoneMorphDelta, MorphDeltas};
use crate::math::{is_ident_quat, scaled_rotation};
use crate::model::MmdModel;

/// 展开后的叶子贡献（Morph 索引, 最终比率）
type Contribution = (usize, f32);

/// 计算全部种类的 Morph 差分
///
/// `morph_names` 为 None 时处理全部 Morph
pub fn compute_morph_deltas(
    model: &MmdModel,
    motion: Option<&Motion>,
    frame: f32,
    morph_names: Option<&[&str]>,
) -> MorphDeltas {
    let mut deltas = MorphDeltas::new(model.vertices.len(), model.bones.len(), model.materials.len());
    let Some(motion) = motion else {
        return deltas;
    };

    let contributions = collect_contributions(model, motion, frame, morph_names);
    for &(index, ratio) in &contributions {
        if let Some(morph) = model.morphs.get(index as i32) {
            apply_leaf(morph, ratio, &mut deltas);
        }
    }
    apply_material_offsets(model, &contributions, &mut deltas);

    if get_config().debug_log {
        log::debug!(
            "[Morph] 帧 {:.2}: 叶子贡献={}, 顶点差分={}",
            frame,
            contributions.len(),
            deltas.has_vertex_deltas()
        );
    }
    deltas
}

/// 只计算骨骼 Morph 差分（骨骼求值使用）
pub fn compute_bone_morph_deltas(model: &MmdModel, motion: Option<&Motion>, frame: f32) -> MorphDeltas {
    let mut deltas = MorphDeltas::new(0, model.bones.len(), 0);
    let Some(motion) = motion else {
        return deltas;
    };

    for (index, ratio) in collect_contributions(model, motion, frame, None) {
        if let Some(morph) = model.morphs.get(index as i32).filter(|m| m.kind == MorphKind::Bone) {
            apply_leaf(morph, ratio, &mut deltas);
        }
    }
    deltas
}

/// 材质差分写入运行时材质（基础值 × mul + add）
pub fn apply_material_morph_deltas(model: &mut MmdModel, deltas: &MorphDeltas) {
    let MmdModel { materials, runtime, .. } = model;
    runtime.materials.clear();
    runtime.materials.extend(materials.iter().enumerate().map(|(i, material)| {
        match deltas.material(i) {
            Some(delta) => delta.apply(&material.params),
            None => material.params,
        }
    }));
}

// ============================================================================
// 展开
// ============================================================================

fn collect_contributions(
    model: &MmdModel,
    motion: &Motion,
    frame: f32,
    morph_names: Option<&[&str]>,
) -> Vec<Contribution> {
    let epsilon = get_config().morph_ratio_epsilon;
    let mut contributions = Vec::new();
    let mut visiting = HashSet::new();

    let mut visit = |morph: &Morph| {
        let Some(ratio) = motion.morph_ratio(&morph.name, frame) else {
            return;
        };
        if ratio.abs() < epsilon {
            return;
        }
        expand(model, morph, ratio, epsilon, &mut visiting, &mut contributions);
    };

    match morph_names {
        Some(names) => {
            for name in names {
                if let Some(morph) = model.morphs.find_by_name(name) {
                    visit(morph);
                }
            }
        }
        None => model.morphs.iter().for_each(visit),
    }
    contributions
}

/// 递归展开组 Morph；visiting 记录当前展开路径，遇到路径上的 Morph 即断环
fn expand(
    model: &MmdModel,
    morph: &Morph,
    ratio: f32,
    epsilon: f32,
    visiting: &mut HashSet<usize>,
    out: &mut Vec<Contribution>,
) {
    if morph.kind != MorphKind::Group {
        out.push((morph.index(), ratio));
        return;
    }

    visiting.insert(morph.index());
    for offset in &morph.offsets {
        let MorphOffset::Group(group) = offset else {
            continue;
        };
        let factor = ratio * group.factor;
        if factor.abs() < epsilon {
            continue;
        }
        let Some(child) = model.morphs.get(group.morph_index) else {
            continue;
        };
        if visiting.contains(&child.index()) {
            log::debug!("[Morph] 组 Morph 成环: '{}' -> '{}'", morph.name, child.name);
            continue;
        }
        expand(model, child, factor, epsilon, visiting, out);
    }
    visiting.remove(&morph.index());
}

// ============================================================================
// 叶子应用
// ============================================================================

fn apply_leaf(morph: &Morph, ratio: f32, deltas: &mut MorphDeltas) {
    for offset in &morph.offsets {
        match (morph.kind, offset) {
            (MorphKind::Vertex, MorphOffset::Vertex(off)) => {
                if let Some(delta) = deltas.vertex_mut(off.vertex_index) {
                    delta.position = Some(delta.position.unwrap_or(Vec3::ZERO) + off.position * ratio);
                }
            }
            (MorphKind::AfterVertex, MorphOffset::Vertex(off)) => {
                if let Some(delta) = deltas.vertex_mut(off.vertex_index) {
                    delta.after_position =
                        Some(delta.after_position.unwrap_or(Vec3::ZERO) + off.position * ratio);
                }
            }
            (MorphKind::Uv, MorphOffset::Uv(off)) => {
                if let Some(delta) = deltas.vertex_mut(off.vertex_index) {
                    delta.uv = Some(delta.uv.unwrap_or(Vec4::ZERO) + off.uv * ratio);
                }
            }
            (kind, MorphOffset::Uv(off)) if kind.extended_uv_channel().is_some() => {
                let channel = kind.extended_uv_channel().unwrap_or(0);
                if let Some(delta) = deltas.vertex_mut(off.vertex_index) {
                    let slot = &mut delta.extended_uvs[channel];
                    *slot = Some(slot.unwrap_or(Vec4::ZERO) + off.uv * ratio);
                }
            }
            (MorphKind::Bone, MorphOffset::Bone(off)) => {
                if let Some(delta) = deltas.bone_mut(off.bone_index) {
                    apply_bone_offset(delta, off, ratio);
                }
            }
            // 材质在全部叶子收集完后统一处理
            (MorphKind::Material, MorphOffset::Material(_)) => {}
            (kind, _) => {
                log::trace!("[Morph] '{}' ({:?}) 含不匹配的偏移，已忽略", morph.name, kind);
            }
        }
    }
}

fn apply_bone_offset(delta: &mut BoneMorphDelta, off: &super::BoneMorphOffset, ratio: f32) {
    if off.position != Vec3::ZERO {
        delta.position = Some(delta.position.unwrap_or(Vec3::ZERO) + off.position * ratio);
    }
    if !is_ident_quat(off.rotation) {
        let existing = delta.rotation.unwrap_or(Quat::IDENTITY);
        delta.rotation = Some(scaled_rotation(off.rotation, ratio).normalize() * existing);
    }
    if off.cancelable_position != Vec3::ZERO {
        delta.cancelable_position =
            Some(delta.cancelable_position.unwrap_or(Vec3::ZERO) + off.cancelable_position * ratio);
    }
    if !is_ident_quat(off.cancelable_rotation) {
        let existing = delta.cancelable_rotation.unwrap_or(Quat::IDENTITY);
        delta.cancelable_rotation = Some(scaled_rotation(off.cancelable_rotation, ratio).normalize() * existing);
    }
    if off.scale != Vec3::ZERO {
        delta.scale = Some(delta.scale.unwrap_or(Vec3::ONE) + off.scale * ratio);
    }
    if off.cancelable_scale != Vec3::ZERO {
        delta.cancelable_scale = Some(delta.cancelable_scale.unwrap_or(Vec3::ONE) + off.cancelable_scale * ratio);
    }
}

/// 材质：先乘算后加算
fn apply_material_offsets(model: &MmdModel, contributions: &[Contribution], deltas: &mut MorphDeltas) {
    let material_count = deltas.material_count();
    for mode in [MaterialCalcMode::Multiply, MaterialCalcMode::Add] {
        for &(index, ratio) in contributions {
            let Some(morph) = model.morphs.get(index as i32).filter(|m| m.kind == MorphKind::Material) else {
                continue;
            };
            for offset in &morph.offsets {
                let MorphOffset::Material(off) = offset else {
                    continue;
                };
                if off.calc_mode != mode {
                    continue;
                }
                // -1 表示全部材质
                let targets = if off.material_index < 0 {
                    0..material_count
                } else if (off.material_index as usize) < material_count {
                    off.material_index as usize..off.material_index as usize + 1
                } else {
                    continue;
                };
                for target in targets {
                    if let Some(delta) = deltas.material_mut(target) {
                        match mode {
                            MaterialCalcMode::Multiply => delta.multiply(&off.params, ratio),
                            MaterialCalcMode::Add => delta.accumulate(&off.params, ratio),
                        }
                    }
                }
            }
        }
    }
}
