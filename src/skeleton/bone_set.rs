//! 骨骼集合
//!
//! 平坦数组保存所有骨骼，父子/付与/IK 关系只以索引相连。
//! 反向关系表在构建时一次性算出，求值期间只读。

use std::collections::HashMap;

use glam::Vec3;

use super::bone_link::{BoneLink, BoneTail};
use crate::{MmdError, Result};

/// 骨骼集合
#[derive(Clone, Debug, Default)]
pub struct BoneSet {
    bones: Vec<BoneLink>,
    name_to_index: HashMap<String, usize>,
    /// 父 → 子
    children: Vec<Vec<usize>>,
    /// 付与源 → 付与骨骼
    effector_children: Vec<Vec<usize>>,
    /// IK 目标 → IK 骨骼
    ik_targets: HashMap<usize, Vec<usize>>,
    /// IK 链接 → IK 骨骼
    ik_links: HashMap<usize, Vec<usize>>,
    /// 全部骨骼按 (layer, index) 排序
    deform_order: Vec<usize>,
}

impl BoneSet {
    /// 构建骨骼集合，索引按数组顺序分配
    pub fn new(mut bones: Vec<BoneLink>) -> Result<Self> {
        let mut name_to_index = HashMap::with_capacity(bones.len());
        for (i, bone) in bones.iter_mut().enumerate() {
            if bone.name.is_empty() {
                return Err(MmdError::InvalidModel(format!("bone {} has empty name", i)));
            }
            bone.index = i;
            if name_to_index.contains_key(&bone.name) {
                // 重名时保留先出现的骨骼
                log::warn!("[Bone] 重复的骨骼名: {} (index={})", bone.name, i);
                continue;
            }
            name_to_index.insert(bone.name.clone(), i);
        }

        let count = bones.len();
        let mut children = vec![Vec::new(); count];
        let mut effector_children = vec![Vec::new(); count];
        let mut ik_targets: HashMap<usize, Vec<usize>> = HashMap::new();
        let mut ik_links: HashMap<usize, Vec<usize>> = HashMap::new();

        for bone in &bones {
            if let Some(parent) = bone.parent_id().filter(|&p| p < count) {
                children[parent].push(bone.index);
            }
            if bone.has_append() {
                if let Some(source) = bone.append_parent().filter(|&p| p < count) {
                    effector_children[source].push(bone.index);
                }
            }
            if let (true, Some(ik)) = (bone.is_ik(), bone.ik_config.as_ref()) {
                if ik.target_bone >= 0 {
                    ik_targets.entry(ik.target_bone as usize).or_default().push(bone.index);
                }
                for link in ik.links.iter().filter(|l| l.bone_index >= 0) {
                    ik_links.entry(link.bone_index as usize).or_default().push(bone.index);
                }
            }
        }

        let mut set = Self {
            bones,
            name_to_index,
            children,
            effector_children,
            ik_targets,
            ik_links,
            deform_order: Vec::new(),
        };
        let mut order: Vec<usize> = (0..count).collect();
        set.sort_by_layer(&mut order);
        set.deform_order = order;
        Ok(set)
    }

    // ========================================
    // 查询
    // ========================================

    #[inline]
    pub fn len(&self) -> usize {
        self.bones.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bones.is_empty()
    }

    #[inline]
    pub fn get(&self, index: usize) -> Option<&BoneLink> {
        self.bones.get(index)
    }

    /// 以有符号索引取骨骼（负数返回 None）
    #[inline]
    pub fn get_signed(&self, index: i32) -> Option<&BoneLink> {
        if index < 0 {
            return None;
        }
        self.bones.get(index as usize)
    }

    #[inline]
    pub fn contains(&self, index: i32) -> bool {
        index >= 0 && (index as usize) < self.bones.len()
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.name_to_index.get(name).copied()
    }

    pub fn find_by_name(&self, name: &str) -> Option<&BoneLink> {
        self.index_of(name).and_then(|i| self.bones.get(i))
    }

    pub fn iter(&self) -> impl Iterator<Item = &BoneLink> {
        self.bones.iter()
    }

    pub fn as_slice(&self) -> &[BoneLink] {
        &self.bones
    }

    /// 全部骨骼的变形顺序
    #[inline]
    pub fn deform_order(&self) -> &[usize] {
        &self.deform_order
    }

    #[inline]
    pub fn children_of(&self, index: usize) -> &[usize] {
        self.children.get(index).map(Vec::as_slice).unwrap_or(&[])
    }

    #[inline]
    pub fn effector_children_of(&self, index: usize) -> &[usize] {
        self.effector_children.get(index).map(Vec::as_slice).unwrap_or(&[])
    }

    /// 以该骨骼为目标的 IK 骨骼
    #[inline]
    pub fn ik_bones_targeting(&self, index: usize) -> &[usize] {
        self.ik_targets.get(&index).map(Vec::as_slice).unwrap_or(&[])
    }

    /// 以该骨骼为链接的 IK 骨骼
    #[inline]
    pub fn ik_bones_linking(&self, index: usize) -> &[usize] {
        self.ik_links.get(&index).map(Vec::as_slice).unwrap_or(&[])
    }

    // ========================================
    // 排序
    // ========================================

    /// 按 (layer 升序, index 升序) 排序
    pub fn sort_by_layer(&self, indexes: &mut [usize]) {
        indexes.sort_by(|&a, &b| {
            let layer_a = self.bones.get(a).map(|bone| bone.layer).unwrap_or(0);
            let layer_b = self.bones.get(b).map(|bone| bone.layer).unwrap_or(0);
            layer_a.cmp(&layer_b).then(a.cmp(&b))
        });
    }

    // ========================================
    // 几何
    // ========================================

    /// 相对父骨骼的初始偏移
    pub fn revert_offset(&self, bone: &BoneLink) -> Vec3 {
        let parent_pos = self
            .get_signed(bone.parent_index)
            .map(|p| p.position)
            .unwrap_or(Vec3::ZERO);
        bone.position - parent_pos
    }

    /// 指向子骨骼（尾端）的方向
    pub fn child_direction(&self, bone: &BoneLink) -> Vec3 {
        match bone.tail {
            BoneTail::Bone(tail_index) => {
                if let Some(tail) = self.get_signed(tail_index) {
                    let dir = tail.position - bone.position;
                    if dir != Vec3::ZERO {
                        return dir.normalize();
                    }
                }
                Vec3::X
            }
            BoneTail::Offset(offset) => {
                if offset != Vec3::ZERO {
                    offset.normalize()
                } else {
                    Vec3::X
                }
            }
        }
    }

    /// 局部轴（用于局部角度限制）
    pub fn local_axes(&self, bone: &BoneLink) -> (Vec3, Vec3, Vec3) {
        let x_axis = if bone.has_fixed_axis() {
            bone.fixed_axis
        } else {
            self.child_direction(bone)
        };
        let x_axis = if x_axis == Vec3::ZERO { Vec3::X } else { x_axis.normalize() };
        let mut y_axis = x_axis.cross(Vec3::NEG_Z).normalize_or_zero();
        if y_axis == Vec3::ZERO {
            y_axis = Vec3::Y;
        }
        let mut z_axis = x_axis.cross(y_axis).normalize_or_zero();
        if z_axis == Vec3::ZERO {
            z_axis = Vec3::NEG_Z;
        }
        (x_axis, y_axis, z_axis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skeleton::IkConfig;
    use crate::skeleton::IkLink;

    fn sample_bones() -> Vec<BoneLink> {
        vec![
            BoneLink::new("センター").with_layer(1),
            BoneLink::new("上半身").with_parent(0),
            BoneLink::new("首").with_parent(1).with_position(Vec3::new(0.0, 2.0, 0.0)),
            BoneLink::new("足ＩＫ").with_ik(IkConfig::new(2, 10, 1.0).with_link(IkLink::new(1))),
            BoneLink::new("付与").with_append(1, 0.5, true, false),
        ]
    }

    #[test]
    fn test_layer_sort() {
        let set = BoneSet::new(sample_bones()).unwrap();
        // センター layer=1 排在最后
        assert_eq!(set.deform_order(), &[1, 2, 3, 4, 0]);
    }

    #[test]
    fn test_reverse_relations() {
        let set = BoneSet::new(sample_bones()).unwrap();
        assert_eq!(set.children_of(1), &[2]);
        assert_eq!(set.effector_children_of(1), &[4]);
        assert_eq!(set.ik_bones_targeting(2), &[3]);
        assert_eq!(set.ik_bones_linking(1), &[3]);
        assert!(set.ik_bones_linking(0).is_empty());
    }

    #[test]
    fn test_name_lookup_and_offset() {
        let set = BoneSet::new(sample_bones()).unwrap();
        let neck = set.find_by_name("首").unwrap();
        assert_eq!(neck.index(), 2);
        assert_eq!(set.revert_offset(neck), Vec3::new(0.0, 2.0, 0.0));
        assert!(set.get_signed(-1).is_none());
    }

    #[test]
    fn test_empty_name_rejected() {
        let result = BoneSet::new(vec![BoneLink::new("")]);
        assert!(matches!(result, Err(MmdError::InvalidModel(_))));
    }

    #[test]
    fn test_local_axes_orthogonal() {
        let bones = vec![
            BoneLink::new("a").with_tail(BoneTail::Offset(Vec3::new(1.0, 1.0, 0.0))),
        ];
        let set = BoneSet::new(bones).unwrap();
        let (x, y, z) = set.local_axes(set.get(0).unwrap());
        assert!(x.dot(y).abs() < 1e-6);
        assert!(x.dot(z).abs() < 1e-6);
        // 单位长度的右手基底
        for axis in [x, y, z] {
            assert!((axis.length() - 1.0).abs() < 1e-6);
        }
        assert!(x.cross(y).abs_diff_eq(z, 1e-6));
    }
}
