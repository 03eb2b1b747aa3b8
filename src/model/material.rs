//! 材质

use glam::{Vec3, Vec4};

/// 材质参数（材质 Morph 的乘算/加算对象）
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MaterialParams {
    pub diffuse: Vec4,
    /// xyz = 颜色, w = 强度
    pub specular: Vec4,
    pub ambient: Vec3,
    pub edge_color: Vec4,
    pub edge_size: f32,
    pub texture_factor: Vec4,
    pub sphere_texture_factor: Vec4,
    pub toon_texture_factor: Vec4,
}

impl MaterialParams {
    /// 全零（加算初值）
    pub const ZERO: Self = Self {
        diffuse: Vec4::ZERO,
        specular: Vec4::ZERO,
        ambient: Vec3::ZERO,
        edge_color: Vec4::ZERO,
        edge_size: 0.0,
        texture_factor: Vec4::ZERO,
        sphere_texture_factor: Vec4::ZERO,
        toon_texture_factor: Vec4::ZERO,
    };

    /// 全一（乘算初值）
    pub const ONE: Self = Self {
        diffuse: Vec4::ONE,
        specular: Vec4::ONE,
        ambient: Vec3::ONE,
        edge_color: Vec4::ONE,
        edge_size: 1.0,
        texture_factor: Vec4::ONE,
        sphere_texture_factor: Vec4::ONE,
        toon_texture_factor: Vec4::ONE,
    };

    /// 逐分量乘
    pub fn mul(&self, other: &Self) -> Self {
        Self {
            diffuse: self.diffuse * other.diffuse,
            specular: self.specular * other.specular,
            ambient: self.ambient * other.ambient,
            edge_color: self.edge_color * other.edge_color,
            edge_size: self.edge_size * other.edge_size,
            texture_factor: self.texture_factor * other.texture_factor,
            sphere_texture_factor: self.sphere_texture_factor * other.sphere_texture_factor,
            toon_texture_factor: self.toon_texture_factor * other.toon_texture_factor,
        }
    }

    /// 逐分量加
    pub fn add(&self, other: &Self) -> Self {
        Self {
            diffuse: self.diffuse + other.diffuse,
            specular: self.specular + other.specular,
            ambient: self.ambient + other.ambient,
            edge_color: self.edge_color + other.edge_color,
            edge_size: self.edge_size + other.edge_size,
            texture_factor: self.texture_factor + other.texture_factor,
            sphere_texture_factor: self.sphere_texture_factor + other.sphere_texture_factor,
            toon_texture_factor: self.toon_texture_factor + other.toon_texture_factor,
        }
    }

    /// 逐分量缩放
    pub fn scaled(&self, ratio: f32) -> Self {
        Self {
            diffuse: self.diffuse * ratio,
            specular: self.specular * ratio,
            ambient: self.ambient * ratio,
            edge_color: self.edge_color * ratio,
            edge_size: self.edge_size * ratio,
            texture_factor: self.texture_factor * ratio,
            sphere_texture_factor: self.sphere_texture_factor * ratio,
            toon_texture_factor: self.toon_texture_factor * ratio,
        }
    }

    /// 从 1 向自身插值：lerp(1, self, ratio)
    pub fn lerp_from_one(&self, ratio: f32) -> Self {
        Self::ONE.add(&self.add(&Self::ONE.scaled(-1.0)).scaled(ratio))
    }
}

impl Default for MaterialParams {
    fn default() -> Self {
        Self {
            diffuse: Vec4::ONE,
            specular: Vec4::new(0.0, 0.0, 0.0, 1.0),
            ambient: Vec3::splat(0.5),
            edge_color: Vec4::new(0.0, 0.0, 0.0, 1.0),
            edge_size: 1.0,
            texture_factor: Vec4::ONE,
            sphere_texture_factor: Vec4::ONE,
            toon_texture_factor: Vec4::ONE,
        }
    }
}

/// 材质
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Material {
    pub name: String,
    pub params: MaterialParams,
}

impl Material {
    pub fn new(name: impl Into<String>, params: MaterialParams) -> Self {
        Self {
            name: name.into(),
            params,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lerp_from_one() {
        let mut target = MaterialParams::ONE;
        target.diffuse = Vec4::new(0.0, 0.5, 1.0, 2.0);
        target.edge_size = 3.0;
        let half = target.lerp_from_one(0.5);
        assert!(half.diffuse.abs_diff_eq(Vec4::new(0.5, 0.75, 1.0, 1.5), 1e-6));
        assert!((half.edge_size - 2.0).abs() < 1e-6);
        assert_eq!(target.lerp_from_one(0.0), MaterialParams::ONE);
    }
}
