//! 顶点与变形绑定

use glam::{Vec2, Vec3, Vec4};

/// 变形绑定
#[derive(Clone, Debug, PartialEq)]
pub enum DeformBinding {
    Bdef1 {
        bone: i32,
    },
    Bdef2 {
        bones: [i32; 2],
        /// 第一根骨骼的权重
        weight: f32,
    },
    Bdef4 {
        bones: [i32; 4],
        weights: [f32; 4],
    },
    Sdef {
        bones: [i32; 2],
        weight: f32,
        c: Vec3,
        r0: Vec3,
        r1: Vec3,
    },
}

impl DeformBinding {
    /// (骨骼索引, 权重) 列表
    pub fn weighted_bones(&self) -> impl Iterator<Item = (i32, f32)> + '_ {
        let pairs: [(i32, f32); 4] = match self {
            DeformBinding::Bdef1 { bone } => [(*bone, 1.0), (-1, 0.0), (-1, 0.0), (-1, 0.0)],
            DeformBinding::Bdef2 { bones, weight } | DeformBinding::Sdef { bones, weight, .. } => [
                (bones[0], *weight),
                (bones[1], 1.0 - *weight),
                (-1, 0.0),
                (-1, 0.0),
            ],
            DeformBinding::Bdef4 { bones, weights } => [
                (bones[0], weights[0]),
                (bones[1], weights[1]),
                (bones[2], weights[2]),
                (bones[3], weights[3]),
            ],
        };
        pairs.into_iter().filter(|(_, w)| *w != 0.0)
    }

    /// BDEF4 权重归一化
    pub fn normalized(self) -> Self {
        match self {
            DeformBinding::Bdef4 { bones, weights } => {
                let sum: f32 = weights.iter().sum();
                if sum <= f32::EPSILON {
                    return DeformBinding::Bdef4 { bones, weights };
                }
                DeformBinding::Bdef4 {
                    bones,
                    weights: weights.map(|w| w / sum),
                }
            }
            other => other,
        }
    }

    /// 全部引用的骨骼索引
    pub fn bone_indexes(&self) -> Vec<i32> {
        match self {
            DeformBinding::Bdef1 { bone } => vec![*bone],
            DeformBinding::Bdef2 { bones, .. } | DeformBinding::Sdef { bones, .. } => bones.to_vec(),
            DeformBinding::Bdef4 { bones, .. } => bones.to_vec(),
        }
    }
}

/// 顶点（初始数据）
#[derive(Clone, Debug, PartialEq)]
pub struct Vertex {
    pub position: Vec3,
    pub normal: Vec3,
    pub uv: Vec2,
    /// 追加 UV（0..=4 个）
    pub extended_uvs: Vec<Vec4>,
    pub deform: DeformBinding,
}

impl Vertex {
    pub fn new(position: Vec3, normal: Vec3, deform: DeformBinding) -> Self {
        Self {
            position,
            normal,
            uv: Vec2::ZERO,
            extended_uvs: Vec::new(),
            deform: deform.normalized(),
        }
    }

    pub fn with_uv(mut self, uv: Vec2) -> Self {
        self.uv = uv;
        self
    }

    pub fn with_extended_uvs(mut self, uvs: Vec<Vec4>) -> Self {
        self.extended_uvs = uvs;
        self
    }
}
