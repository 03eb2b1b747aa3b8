//! Morph 差分
//!
//! 顶点 / 骨骼 / 材质三个子存储，均按目标索引稀疏存放。

use glam::{Mat4, Quat, Vec3, Vec4};

use crate::model::MaterialParams;

/// 顶点 Morph 差分
#[derive(Clone, Debug, Default, PartialEq)]
pub struct VertexMorphDelta {
    /// 蒙皮前叠加的位置
    pub position: Option<Vec3>,
    /// 蒙皮后叠加的位置
    pub after_position: Option<Vec3>,
    /// 主 UV 偏移（只使用 xy）
    pub uv: Option<Vec4>,
    /// 追加 UV 1..4 偏移
    pub extended_uvs: [Option<Vec4>; 4],
}

impl VertexMorphDelta {
    /// 所有通道均可忽略
    pub fn is_zero(&self) -> bool {
        let near_zero3 = |v: &Option<Vec3>| v.map_or(true, |v| v.abs_diff_eq(Vec3::ZERO, 1e-4));
        let near_zero4 = |v: &Option<Vec4>| v.map_or(true, |v| v.abs_diff_eq(Vec4::ZERO, 1e-4));
        near_zero3(&self.position)
            && near_zero3(&self.after_position)
            && near_zero4(&self.uv)
            && self.extended_uvs.iter().all(near_zero4)
    }
}

/// 骨骼 Morph 差分
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BoneMorphDelta {
    pub position: Option<Vec3>,
    pub rotation: Option<Quat>,
    pub cancelable_position: Option<Vec3>,
    pub cancelable_rotation: Option<Quat>,
    /// 缩放倍率（1 + Σ 增量）
    pub scale: Option<Vec3>,
    pub cancelable_scale: Option<Vec3>,
    pub local_mat: Option<Mat4>,
}

/// 材质 Morph 差分
///
/// 结果 = 基础值 × mul + add
#[derive(Clone, Debug, PartialEq)]
pub struct MaterialMorphDelta {
    pub mul: MaterialParams,
    pub add: MaterialParams,
}

impl Default for MaterialMorphDelta {
    fn default() -> Self {
        Self {
            mul: MaterialParams::ONE,
            add: MaterialParams::ZERO,
        }
    }
}

impl MaterialMorphDelta {
    /// 乘算：mul *= lerp(1, offset, ratio)
    pub fn multiply(&mut self, offset: &MaterialParams, ratio: f32) {
        self.mul = self.mul.mul(&offset.lerp_from_one(ratio));
    }

    /// 加算：add += offset × ratio
    pub fn accumulate(&mut self, offset: &MaterialParams, ratio: f32) {
        self.add = self.add.add(&offset.scaled(ratio));
    }

    /// 作用到基础材质
    pub fn apply(&self, base: &MaterialParams) -> MaterialParams {
        base.mul(&self.mul).add(&self.add)
    }
}

// ============================================================================
// 集合
// ============================================================================

/// Morph 差分存储
#[derive(Clone, Debug, Default)]
pub struct MorphDeltas {
    vertices: Vec<Option<VertexMorphDelta>>,
    bones: Vec<Option<BoneMorphDelta>>,
    materials: Vec<Option<MaterialMorphDelta>>,
}

impl MorphDeltas {
    pub fn new(vertex_count: usize, bone_count: usize, material_count: usize) -> Self {
        Self {
            vertices: vec![None; vertex_count],
            bones: vec![None; bone_count],
            materials: vec![None; material_count],
        }
    }

    // ========== 顶点 ==========

    #[inline]
    pub fn vertex(&self, index: usize) -> Option<&VertexMorphDelta> {
        self.vertices.get(index).and_then(Option::as_ref)
    }

    /// 取顶点差分，不存在时插入（越界返回 None）
    pub fn vertex_mut(&mut self, index: i32) -> Option<&mut VertexMorphDelta> {
        if index < 0 {
            return None;
        }
        let slot = self.vertices.get_mut(index as usize)?;
        Some(slot.get_or_insert_with(VertexMorphDelta::default))
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    /// 是否存在非零顶点差分
    pub fn has_vertex_deltas(&self) -> bool {
        self.vertices.iter().flatten().any(|d| !d.is_zero())
    }

    // ========== 骨骼 ==========

    #[inline]
    pub fn bone(&self, index: usize) -> Option<&BoneMorphDelta> {
        self.bones.get(index).and_then(Option::as_ref)
    }

    pub fn bone_mut(&mut self, index: i32) -> Option<&mut BoneMorphDelta> {
        if index < 0 {
            return None;
        }
        let slot = self.bones.get_mut(index as usize)?;
        Some(slot.get_or_insert_with(BoneMorphDelta::default))
    }

    // ========== 材质 ==========

    #[inline]
    pub fn material(&self, index: usize) -> Option<&MaterialMorphDelta> {
        self.materials.get(index).and_then(Option::as_ref)
    }

    pub fn material_mut(&mut self, index: usize) -> Option<&mut MaterialMorphDelta> {
        let slot = self.materials.get_mut(index)?;
        Some(slot.get_or_insert_with(MaterialMorphDelta::default))
    }

    pub fn material_count(&self) -> usize {
        self.materials.len()
    }

    /// (材质索引, 差分) 列表
    pub fn materials(&self) -> impl Iterator<Item = (usize, &MaterialMorphDelta)> {
        self.materials
            .iter()
            .enumerate()
            .filter_map(|(i, d)| d.as_ref().map(|d| (i, d)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_material_mul_then_add() {
        let mut delta = MaterialMorphDelta::default();
        let mut offset = MaterialParams::ZERO;
        offset.diffuse = Vec4::splat(0.5);
        delta.multiply(&offset, 1.0);
        offset.diffuse = Vec4::splat(0.25);
        delta.accumulate(&offset, 1.0);

        let mut base = MaterialParams::default();
        base.diffuse = Vec4::splat(1.0);
        let result = delta.apply(&base);
        // 1.0 × 0.5 + 0.25
        assert!(result.diffuse.abs_diff_eq(Vec4::splat(0.75), 1e-6));
    }

    #[test]
    fn test_vertex_slot_bounds() {
        let mut deltas = MorphDeltas::new(2, 0, 0);
        assert!(deltas.vertex_mut(-1).is_none());
        assert!(deltas.vertex_mut(2).is_none());
        if let Some(d) = deltas.vertex_mut(1) {
            d.position = Some(Vec3::X);
        }
        assert!(deltas.has_vertex_deltas());
        assert!(deltas.vertex(0).is_none());
    }

    #[test]
    fn test_vertex_delta_zero() {
        let mut delta = VertexMorphDelta::default();
        assert!(delta.is_zero());
        delta.extended_uvs[2] = Some(Vec4::new(0.0, 0.1, 0.0, 0.0));
        assert!(!delta.is_zero());
    }
}
