//! 顶点蒙皮计算
//!
//! 线性混合蒙皮 + 顶点 Morph + SDEF 参数重算，结果写入模型的运行时缓冲。
//! 初始顶点数据不会被覆盖。

use glam::{Mat4, Vec3, Vec4};
use rayon::prelude::*;

use crate::config::get_config;
use crate::delta::{BoneDeltas, MorphDeltas, VertexMorphDelta};
use crate::math::{add_weighted, is_finite_vec3, project_point_on_segment};
use crate::model::{DeformBinding, DeformedVertex, MmdModel, SdefParams, Vertex};
use crate::skeleton::BoneSet;

/// 对全部顶点蒙皮 - 顶点数足够时使用 rayon 并行
pub fn apply_skinning(model: &mut MmdModel, bone_deltas: &BoneDeltas, morph_deltas: &MorphDeltas) {
    let MmdModel {
        vertices,
        bones,
        runtime,
        ..
    } = model;
    if runtime.vertices.len() != vertices.len() {
        runtime.vertices = vertices.iter().map(DeformedVertex::from_rest).collect();
    }

    let bones: &BoneSet = bones;
    let skin = |(out, (index, vertex)): (&mut DeformedVertex, (usize, &Vertex))| {
        skin_vertex(out, vertex, bones, bone_deltas, morph_deltas.vertex(index));
    };

    let config = get_config();
    let parallel = config.parallel_skinning && vertices.len() >= config.parallel_skinning_min_vertices;
    if parallel {
        runtime
            .vertices
            .par_iter_mut()
            .zip(vertices.par_iter().enumerate())
            .for_each(skin);
    } else {
        runtime
            .vertices
            .iter_mut()
            .zip(vertices.iter().enumerate())
            .for_each(skin);
    }

    if config.debug_log {
        log::debug!("[Skinning] 顶点数={}, 并行={}", vertices.len(), parallel);
    }
}

/// 骨骼蒙皮矩阵（骨骼或差分缺失时为单位矩阵）
fn skinning_matrix(bones: &BoneSet, deltas: &BoneDeltas, bone_index: i32) -> Mat4 {
    match (bones.get_signed(bone_index), deltas.get(bone_index)) {
        (Some(bone), Some(delta)) => delta.filled_local_matrix(bone.position),
        _ => Mat4::IDENTITY,
    }
}

/// 骨骼当前全局位置（差分缺失时为初始位置）
fn bone_global_position(bones: &BoneSet, deltas: &BoneDeltas, bone_index: i32) -> Vec3 {
    match (bones.get_signed(bone_index), deltas.get(bone_index)) {
        (_, Some(delta)) => delta.filled_global_position(),
        (Some(bone), None) => bone.position,
        (None, None) => Vec3::ZERO,
    }
}

/// 单个顶点蒙皮
fn skin_vertex(
    out: &mut DeformedVertex,
    vertex: &Vertex,
    bones: &BoneSet,
    deltas: &BoneDeltas,
    morph: Option<&VertexMorphDelta>,
) {
    let mut matrix = Mat4::ZERO;
    let mut total_weight = 0.0;
    for (bone_index, weight) in vertex.deform.weighted_bones() {
        add_weighted(&mut matrix, &skinning_matrix(bones, deltas, bone_index), weight);
        total_weight += weight;
    }
    if total_weight == 0.0 {
        matrix = Mat4::IDENTITY;
    }

    let position = vertex.position + morph.and_then(|m| m.position).unwrap_or(Vec3::ZERO);
    let mut skinned = matrix.transform_point3(position);
    if let Some(after) = morph.and_then(|m| m.after_position) {
        skinned += after;
    }
    out.position = skinned;
    out.normal = matrix.transform_vector3(vertex.normal).normalize_or_zero();

    if let DeformBinding::Sdef { bones: [b0, b1], .. } = vertex.deform {
        let p0 = bone_global_position(bones, deltas, b0);
        let p1 = bone_global_position(bones, deltas, b1);
        let c = project_point_on_segment(p0, p1, skinned);
        let params = SdefParams {
            c,
            r0: (p0 + c) * 0.5,
            r1: (p1 + c) * 0.5,
        };
        out.sdef = if is_finite_vec3(params.c) && is_finite_vec3(params.r0) && is_finite_vec3(params.r1) {
            Some(params)
        } else {
            Some(SdefParams {
                c: skinned,
                r0: skinned,
                r1: skinned,
            })
        };
    }

    out.uv = vertex.uv + morph.and_then(|m| m.uv).map(|uv| uv.truncate().truncate()).unwrap_or_default();
    out.extended_uvs.resize(vertex.extended_uvs.len(), Vec4::ZERO);
    for (channel, (dst, rest)) in out.extended_uvs.iter_mut().zip(&vertex.extended_uvs).enumerate() {
        let offset = morph
            .and_then(|m| m.extended_uvs.get(channel).copied().flatten())
            .unwrap_or(Vec4::ZERO);
        *dst = *rest + offset;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skeleton::compute_bone_deltas;
    use crate::test_rigs;
    use glam::{Quat, Vec2};

    fn rest_deltas(model: &MmdModel) -> BoneDeltas {
        compute_bone_deltas(model, None, 0.0, &[], false, false, false).0
    }

    #[test]
    fn test_bdef1_identity_keeps_rest_position() {
        let model = test_rigs::fk_chain();
        let deltas = rest_deltas(&model);
        let vertex = Vertex::new(Vec3::new(0.5, 0.2, 0.0), Vec3::Y, DeformBinding::Bdef1 { bone: 0 });
        let mut out = DeformedVertex::from_rest(&vertex);
        skin_vertex(&mut out, &vertex, &model.bones, &deltas, None);
        assert!(out.position.abs_diff_eq(vertex.position, 1e-6));
        assert!(out.normal.abs_diff_eq(Vec3::Y, 1e-6));
    }

    #[test]
    fn test_bdef2_blends_matrices() {
        let model = test_rigs::fk_chain();
        let mut deltas = rest_deltas(&model);
        if let Some(delta) = deltas.get_mut(1) {
            delta.local_matrix = Some(Mat4::from_translation(Vec3::new(0.0, 2.0, 0.0)));
        }
        let vertex = Vertex::new(
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::Z,
            DeformBinding::Bdef2 { bones: [0, 1], weight: 0.5 },
        );
        let mut out = DeformedVertex::from_rest(&vertex);
        skin_vertex(&mut out, &vertex, &model.bones, &deltas, None);
        assert!(out.position.abs_diff_eq(Vec3::new(1.0, 1.0, 0.0), 1e-5));
    }

    #[test]
    fn test_missing_bone_is_identity() {
        let model = test_rigs::fk_chain();
        let deltas = rest_deltas(&model);
        let vertex = Vertex::new(Vec3::ONE, Vec3::X, DeformBinding::Bdef1 { bone: 42 });
        let mut out = DeformedVertex::from_rest(&vertex);
        skin_vertex(&mut out, &vertex, &model.bones, &deltas, None);
        assert!(out.position.abs_diff_eq(Vec3::ONE, 1e-6));
    }

    #[test]
    fn test_vertex_morph_before_and_after_skinning() {
        let model = test_rigs::fk_chain();
        let mut deltas = rest_deltas(&model);
        // 骨骼 0 绕 Z 轴旋转 90 度
        if let Some(delta) = deltas.get_mut(0) {
            delta.local_matrix = Some(Mat4::from_quat(Quat::from_rotation_z(std::f32::consts::FRAC_PI_2)));
        }
        let vertex = Vertex::new(Vec3::ZERO, Vec3::X, DeformBinding::Bdef1 { bone: 0 })
            .with_uv(Vec2::new(0.25, 0.5))
            .with_extended_uvs(vec![Vec4::ZERO]);
        let morph = VertexMorphDelta {
            position: Some(Vec3::X),
            after_position: Some(Vec3::X),
            uv: Some(Vec4::new(0.25, 0.25, 9.0, 9.0)),
            extended_uvs: [Some(Vec4::ONE), None, None, None],
        };
        let mut out = DeformedVertex::from_rest(&vertex);
        skin_vertex(&mut out, &vertex, &model.bones, &deltas, Some(&morph));

        // 蒙皮前的 +X 被旋转到 +Y，蒙皮后的 +X 原样叠加
        assert!(out.position.abs_diff_eq(Vec3::new(1.0, 1.0, 0.0), 1e-5));
        assert!(out.normal.abs_diff_eq(Vec3::Y, 1e-5));
        assert!(out.uv.abs_diff_eq(Vec2::new(0.5, 0.75), 1e-6));
        assert_eq!(out.extended_uvs, vec![Vec4::ONE]);
    }

    #[test]
    fn test_sdef_center_projects_onto_bone_segment() {
        let model = test_rigs::fk_chain();
        let deltas = rest_deltas(&model);
        let vertex = Vertex::new(
            Vec3::new(0.5, 0.3, 0.0),
            Vec3::Y,
            DeformBinding::Sdef {
                bones: [0, 1],
                weight: 0.5,
                c: Vec3::ZERO,
                r0: Vec3::ZERO,
                r1: Vec3::ZERO,
            },
        );
        let mut out = DeformedVertex::from_rest(&vertex);
        skin_vertex(&mut out, &vertex, &model.bones, &deltas, None);
        let sdef = out.sdef.unwrap();
        // 腕 (0,0,0) → ひじ (1,0,0) 线段上的投影
        assert!(sdef.c.abs_diff_eq(Vec3::new(0.5, 0.0, 0.0), 1e-5));
        assert!(sdef.r0.abs_diff_eq(Vec3::new(0.25, 0.0, 0.0), 1e-5));
        assert!(sdef.r1.abs_diff_eq(Vec3::new(0.75, 0.0, 0.0), 1e-5));
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let vertex_count = 3000;
        let vertices: Vec<Vertex> = (0..vertex_count)
            .map(|i| {
                let t = i as f32 / vertex_count as f32;
                Vertex::new(
                    Vec3::new(t * 2.0, t, 0.1),
                    Vec3::Y,
                    DeformBinding::Bdef2 { bones: [1, 2], weight: t },
                )
            })
            .collect();
        let mut model = test_rigs::fk_chain().with_vertices(vertices.clone());
        let mut motion = crate::Motion::new("bend");
        motion.insert_bone_keyframe(
            "ひじ",
            crate::animation::BoneKeyframe::new(0).with_rotation(Quat::from_rotation_z(0.7)),
        );
        let (deltas, _) = compute_bone_deltas(&model, Some(&motion), 0.0, &[], false, false, false);
        let morphs = MorphDeltas::new(vertex_count, 0, 0);
        apply_skinning(&mut model, &deltas, &morphs);

        for (out, vertex) in model.runtime.vertices.iter().zip(&vertices) {
            let mut expected = DeformedVertex::from_rest(vertex);
            skin_vertex(&mut expected, vertex, &model.bones, &deltas, None);
            assert_eq!(out.position, expected.position);
            assert_eq!(out.normal, expected.normal);
        }
    }
}
