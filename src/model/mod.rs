//! MMD 模型
//!
//! 初始数据（骨骼、顶点、材质、Morph、刚体）加载后只读；
//! 运行时缓冲每帧由 Morph 应用与蒙皮覆盖。

mod material;
mod runtime;
mod vertex;

pub use material::{Material, MaterialParams};
pub use runtime::FrameDeform;
pub use vertex::{DeformBinding, Vertex};

use glam::{Vec2, Vec3, Vec4};

use crate::morph::{Morph, MorphManager, MorphOffset};
use crate::physics::RigidBody;
use crate::skeleton::{BoneLink, BoneSet, BoneTail};
use crate::{MmdError, Result};

/// SDEF 参数（C / R0 / R1）
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct SdefParams {
    pub c: Vec3,
    pub r0: Vec3,
    pub r1: Vec3,
}

/// 蒙皮后的顶点
#[derive(Clone, Debug, PartialEq)]
pub struct DeformedVertex {
    pub position: Vec3,
    pub normal: Vec3,
    pub uv: Vec2,
    pub extended_uvs: Vec<Vec4>,
    /// SDEF 顶点的重算参数
    pub sdef: Option<SdefParams>,
}

impl DeformedVertex {
    /// 以初始数据初始化
    pub fn from_rest(vertex: &Vertex) -> Self {
        let sdef = match vertex.deform {
            DeformBinding::Sdef { c, r0, r1, .. } => Some(SdefParams { c, r0, r1 }),
            _ => None,
        };
        Self {
            position: vertex.position,
            normal: vertex.normal,
            uv: vertex.uv,
            extended_uvs: vertex.extended_uvs.clone(),
            sdef,
        }
    }
}

/// 运行时缓冲（每帧覆盖）
#[derive(Clone, Debug, Default)]
pub struct RuntimeState {
    pub vertices: Vec<DeformedVertex>,
    pub materials: Vec<MaterialParams>,
}

/// MMD 模型
#[derive(Clone, Debug)]
pub struct MmdModel {
    /// 物理钩子使用的模型 ID
    pub id: i64,
    pub name: String,
    pub bones: BoneSet,
    pub vertices: Vec<Vertex>,
    pub materials: Vec<Material>,
    pub morphs: MorphManager,
    pub rigid_bodies: Vec<RigidBody>,
    pub runtime: RuntimeState,
}

impl MmdModel {
    pub fn new(name: impl Into<String>, bones: Vec<BoneLink>) -> Result<Self> {
        Ok(Self {
            id: 0,
            name: name.into(),
            bones: BoneSet::new(bones)?,
            vertices: Vec::new(),
            materials: Vec::new(),
            morphs: MorphManager::new(),
            rigid_bodies: Vec::new(),
            runtime: RuntimeState::default(),
        })
    }

    pub fn with_id(mut self, id: i64) -> Self {
        self.id = id;
        self
    }

    pub fn with_vertices(mut self, vertices: Vec<Vertex>) -> Self {
        self.vertices = vertices;
        self.reset_runtime();
        self
    }

    pub fn with_materials(mut self, materials: Vec<Material>) -> Self {
        self.materials = materials;
        self.reset_runtime();
        self
    }

    pub fn with_morphs(mut self, morphs: Vec<Morph>) -> Self {
        self.morphs = MorphManager::from_morphs(morphs);
        self
    }

    pub fn with_rigid_bodies(mut self, rigid_bodies: Vec<RigidBody>) -> Self {
        self.rigid_bodies = rigid_bodies;
        self
    }

    /// 运行时缓冲恢复为初始数据
    pub fn reset_runtime(&mut self) {
        self.runtime.vertices = self.vertices.iter().map(DeformedVertex::from_rest).collect();
        self.runtime.materials = self.materials.iter().map(|m| m.params).collect();
    }

    // ========================================
    // 结构校验
    // ========================================

    /// 校验索引引用与父子环，返回发现的第一个问题
    pub fn validate(&self) -> Result<()> {
        let bone_count = self.bones.len() as i32;
        let in_range = |index: i32| index >= 0 && index < bone_count;

        for bone in self.bones.iter() {
            if bone.parent_index >= 0 && !in_range(bone.parent_index) {
                return Err(invalid(format!("骨骼 '{}' 的父骨骼索引 {} 越界", bone.name, bone.parent_index)));
            }
            if let Some(append) = &bone.append_config {
                if bone.has_append() && append.parent >= bone_count {
                    return Err(invalid(format!("骨骼 '{}' 的付与源索引 {} 越界", bone.name, append.parent)));
                }
            }
            if let Some(ik) = &bone.ik_config {
                if !in_range(ik.target_bone) {
                    return Err(invalid(format!("IK 骨骼 '{}' 的目标索引 {} 越界", bone.name, ik.target_bone)));
                }
                if let Some(link) = ik.links.iter().find(|l| !in_range(l.bone_index)) {
                    return Err(invalid(format!("IK 骨骼 '{}' 的链接索引 {} 越界", bone.name, link.bone_index)));
                }
            }
            if let BoneTail::Bone(tail) = bone.tail {
                if tail >= 0 && !in_range(tail) {
                    return Err(invalid(format!("骨骼 '{}' 的尾端索引 {} 越界", bone.name, tail)));
                }
            }
        }

        self.check_parent_cycles()?;

        for morph in self.morphs.iter() {
            for offset in &morph.offsets {
                if let MorphOffset::Group(group) = offset {
                    if self.morphs.get(group.morph_index).is_none() {
                        log::warn!("[Morph] 组 Morph '{}' 引用了不存在的 Morph {}", morph.name, group.morph_index);
                    }
                }
            }
        }

        log::info!(
            "[Deform] 模型 '{}' 校验通过: 骨骼={}, 顶点={}, Morph={}",
            self.name,
            self.bones.len(),
            self.vertices.len(),
            self.morphs.len()
        );
        Ok(())
    }

    /// 沿父链行走，步数超过骨骼数即成环
    fn check_parent_cycles(&self) -> Result<()> {
        let limit = self.bones.len();
        for bone in self.bones.iter() {
            let mut steps = 0;
            let mut current = bone.parent_id();
            while let Some(parent) = current {
                steps += 1;
                if steps > limit {
                    return Err(invalid(format!("骨骼 '{}' 的父链成环", bone.name)));
                }
                current = self.bones.get(parent).and_then(BoneLink::parent_id);
            }
        }
        Ok(())
    }
}

fn invalid(message: String) -> MmdError {
    log::warn!("[Deform] {}", message);
    MmdError::InvalidModel(message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skeleton::{IkConfig, IkLink};

    #[test]
    fn test_validate_ok() {
        let model = MmdModel::new(
            "chain",
            vec![
                BoneLink::new("センター"),
                BoneLink::new("上半身").with_parent(0),
            ],
        )
        .unwrap();
        assert!(model.validate().is_ok());
    }

    #[test]
    fn test_validate_out_of_range() {
        let model = MmdModel::new("bad", vec![BoneLink::new("a").with_parent(3)]).unwrap();
        assert!(matches!(model.validate(), Err(MmdError::InvalidModel(_))));

        let model = MmdModel::new(
            "bad_ik",
            vec![
                BoneLink::new("a"),
                BoneLink::new("IK").with_ik(IkConfig::new(0, 10, 1.0).with_link(IkLink::new(7))),
            ],
        )
        .unwrap();
        assert!(model.validate().is_err());
    }

    #[test]
    fn test_validate_cycle() {
        let model = MmdModel::new(
            "cycle",
            vec![BoneLink::new("a").with_parent(1), BoneLink::new("b").with_parent(0)],
        )
        .unwrap();
        assert!(model.validate().is_err());
    }

    #[test]
    fn test_runtime_reset_copies_rest() {
        let vertex = Vertex::new(Vec3::Y, Vec3::Z, DeformBinding::Bdef1 { bone: 0 });
        let model = MmdModel::new("m", vec![BoneLink::new("a")])
            .unwrap()
            .with_vertices(vec![vertex])
            .with_materials(vec![Material::new("mat", MaterialParams::default())]);
        assert_eq!(model.runtime.vertices.len(), 1);
        assert_eq!(model.runtime.vertices[0].position, Vec3::Y);
        assert_eq!(model.runtime.materials.len(), 1);
    }
}
