//! Morph 变形系统
//!
//! Morph 定义（种类 + 偏移列表）与按帧求值的解析器。

mod manager;
mod resolver;

pub use manager::MorphManager;
pub use resolver::{apply_material_morph_deltas, compute_bone_morph_deltas, compute_morph_deltas};

use glam::{Quat, Vec3, Vec4};

use crate::model::MaterialParams;
use crate::MmdError;

// ============================================================================
// 种类
// ============================================================================

/// Morph 种类（数值与 PMX 一致，物理后顶点为扩展值 9）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MorphKind {
    Group,
    Vertex,
    Bone,
    Uv,
    ExtendedUv1,
    ExtendedUv2,
    ExtendedUv3,
    ExtendedUv4,
    Material,
    /// 蒙皮后叠加的顶点 Morph
    AfterVertex,
}

impl TryFrom<u8> for MorphKind {
    type Error = MmdError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value {
            0 => MorphKind::Group,
            1 => MorphKind::Vertex,
            2 => MorphKind::Bone,
            3 => MorphKind::Uv,
            4 => MorphKind::ExtendedUv1,
            5 => MorphKind::ExtendedUv2,
            6 => MorphKind::ExtendedUv3,
            7 => MorphKind::ExtendedUv4,
            8 => MorphKind::Material,
            9 => MorphKind::AfterVertex,
            other => return Err(MmdError::UnknownMorphKind(other)),
        })
    }
}

impl MorphKind {
    /// 追加 UV 通道号（0 起始），非追加 UV 返回 None
    pub fn extended_uv_channel(&self) -> Option<usize> {
        match self {
            MorphKind::ExtendedUv1 => Some(0),
            MorphKind::ExtendedUv2 => Some(1),
            MorphKind::ExtendedUv3 => Some(2),
            MorphKind::ExtendedUv4 => Some(3),
            _ => None,
        }
    }
}

/// 材质 Morph 计算方式
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MaterialCalcMode {
    Multiply,
    Add,
}

impl TryFrom<u8> for MaterialCalcMode {
    type Error = MmdError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(MaterialCalcMode::Multiply),
            1 => Ok(MaterialCalcMode::Add),
            other => Err(MmdError::UnknownCalcMode(other)),
        }
    }
}

// ============================================================================
// 偏移
// ============================================================================

/// 顶点 Morph 偏移
#[derive(Clone, Debug, PartialEq)]
pub struct VertexMorphOffset {
    pub vertex_index: i32,
    pub position: Vec3,
}

/// UV Morph 偏移
#[derive(Clone, Debug, PartialEq)]
pub struct UvMorphOffset {
    pub vertex_index: i32,
    pub uv: Vec4,
}

/// 骨骼 Morph 偏移
#[derive(Clone, Debug, PartialEq)]
pub struct BoneMorphOffset {
    pub bone_index: i32,
    pub position: Vec3,
    pub rotation: Quat,
    pub cancelable_position: Vec3,
    pub cancelable_rotation: Quat,
    /// 缩放增量（0 为不变）
    pub scale: Vec3,
    pub cancelable_scale: Vec3,
}

impl BoneMorphOffset {
    pub fn new(bone_index: i32, position: Vec3, rotation: Quat) -> Self {
        Self {
            bone_index,
            position,
            rotation,
            cancelable_position: Vec3::ZERO,
            cancelable_rotation: Quat::IDENTITY,
            scale: Vec3::ZERO,
            cancelable_scale: Vec3::ZERO,
        }
    }
}

/// 材质 Morph 偏移
#[derive(Clone, Debug, PartialEq)]
pub struct MaterialMorphOffset {
    /// 目标材质索引（-1 表示全部材质）
    pub material_index: i32,
    pub calc_mode: MaterialCalcMode,
    pub params: MaterialParams,
}

/// 组 Morph 偏移
#[derive(Clone, Debug, PartialEq)]
pub struct GroupMorphOffset {
    pub morph_index: i32,
    pub factor: f32,
}

/// Morph 偏移
#[derive(Clone, Debug, PartialEq)]
pub enum MorphOffset {
    Vertex(VertexMorphOffset),
    Uv(UvMorphOffset),
    Bone(BoneMorphOffset),
    Material(MaterialMorphOffset),
    Group(GroupMorphOffset),
}

// ============================================================================
// Morph
// ============================================================================

/// Morph 定义
#[derive(Clone, Debug, PartialEq)]
pub struct Morph {
    pub name: String,
    /// 索引（由 MorphManager 分配）
    pub(crate) index: usize,
    /// 操作面板（眉/目/口/其他）
    pub panel: u8,
    pub kind: MorphKind,
    pub offsets: Vec<MorphOffset>,
}

impl Morph {
    pub fn new(name: impl Into<String>, kind: MorphKind) -> Self {
        Self {
            name: name.into(),
            index: 0,
            panel: 0,
            kind,
            offsets: Vec::new(),
        }
    }

    pub fn with_offset(mut self, offset: MorphOffset) -> Self {
        self.offsets.push(offset);
        self
    }

    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }
}
