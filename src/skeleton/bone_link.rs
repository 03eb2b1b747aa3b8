//! 骨骼节点
//!
//! BoneLink 是骨骼系统的静态数据单元，每帧的动态状态保存在 BoneDelta 中。
//! 父子、付与、IK 关系都以索引表示（-1 表示无）。

use glam::Vec3;
use bitflags::bitflags;

// ============================================================================
// 骨骼标志
// ============================================================================

bitflags! {
    /// 骨骼标志位（与 PMX 位定义一致）
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct BoneFlags: u16 {
        /// 尾端以骨骼指定
        const TAIL_IS_BONE = 0x0001;
        /// 可旋转
        const ROTATABLE = 0x0002;
        /// 可移动
        const MOVABLE = 0x0004;
        /// 显示
        const VISIBLE = 0x0008;
        /// 可操作
        const OPERABLE = 0x0010;
        /// 是 IK 骨骼
        const IK = 0x0020;
        /// 附加变换使用本地坐标
        const APPEND_LOCAL = 0x0080;
        /// 附加旋转
        const APPEND_ROTATE = 0x0100;
        /// 附加平移
        const APPEND_TRANSLATE = 0x0200;
        /// 固定轴
        const FIXED_AXIS = 0x0400;
        /// 本地轴
        const LOCAL_AXIS = 0x0800;
        /// 物理后变形
        const DEFORM_AFTER_PHYSICS = 0x1000;
        /// 外部父
        const EXTERNAL_PARENT = 0x2000;
    }
}

// ============================================================================
// IK 配置
// ============================================================================

/// IK 链接信息
#[derive(Clone, Debug, Default)]
pub struct IkLink {
    /// 链接骨骼索引
    pub bone_index: i32,
    /// 是否有角度限制（全局轴）
    pub has_limits: bool,
    /// 角度下限 (弧度)
    pub limit_min: Vec3,
    /// 角度上限 (弧度)
    pub limit_max: Vec3,
    /// 是否有局部轴角度限制
    pub has_local_limits: bool,
    /// 局部轴角度下限 (弧度)
    pub local_limit_min: Vec3,
    /// 局部轴角度上限 (弧度)
    pub local_limit_max: Vec3,
}

impl IkLink {
    pub fn new(bone_index: i32) -> Self {
        Self {
            bone_index,
            ..Default::default()
        }
    }

    /// 设置全局轴角度限制
    pub fn with_limits(mut self, min: Vec3, max: Vec3) -> Self {
        self.has_limits = true;
        self.limit_min = min;
        self.limit_max = max;
        self
    }

    /// 设置局部轴角度限制
    pub fn with_local_limits(mut self, min: Vec3, max: Vec3) -> Self {
        self.has_local_limits = true;
        self.local_limit_min = min;
        self.local_limit_max = max;
        self
    }

    /// 是否受任意角度限制
    #[inline]
    pub fn is_constrained(&self) -> bool {
        self.has_limits || self.has_local_limits
    }
}

/// IK 配置
#[derive(Clone, Debug)]
pub struct IkConfig {
    /// 目标骨骼索引（被移动去接近 IK 骨骼的骨骼）
    pub target_bone: i32,
    /// 迭代次数
    pub iterations: u32,
    /// 单次迭代角度限制 (弧度)
    pub limit_angle: f32,
    /// IK 链接列表（靠近目标的在前）
    pub links: Vec<IkLink>,
}

impl IkConfig {
    pub fn new(target_bone: i32, iterations: u32, limit_angle: f32) -> Self {
        Self {
            target_bone,
            iterations,
            limit_angle,
            links: Vec::new(),
        }
    }

    pub fn with_link(mut self, link: IkLink) -> Self {
        self.links.push(link);
        self
    }
}

// ============================================================================
// 附加变换配置
// ============================================================================

/// 附加变换（付与）配置
#[derive(Clone, Debug, Default)]
pub struct AppendConfig {
    /// 付与源骨骼索引
    pub parent: i32,
    /// 付与比率（可为负）
    pub rate: f32,
}

/// 骨骼尾端
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum BoneTail {
    /// 指向另一根骨骼
    Bone(i32),
    /// 相对偏移
    Offset(Vec3),
}

impl Default for BoneTail {
    fn default() -> Self {
        BoneTail::Bone(-1)
    }
}

// ============================================================================
// 骨骼节点
// ============================================================================

/// 骨骼节点（静态数据，求值期间只读）
#[derive(Clone, Debug)]
pub struct BoneLink {
    /// 骨骼名称
    pub name: String,

    /// 骨骼索引（由 BoneSet 分配）
    pub(crate) index: usize,

    /// 父骨骼索引 (-1 表示根骨骼)
    pub parent_index: i32,

    /// 变换层级（用于排序）
    pub layer: i32,

    /// 骨骼标志
    pub flags: BoneFlags,

    /// 初始位置（世界空间）
    pub position: Vec3,

    /// 尾端
    pub tail: BoneTail,

    /// IK 配置
    pub ik_config: Option<IkConfig>,

    /// 附加变换配置
    pub append_config: Option<AppendConfig>,

    /// 固定轴方向
    pub fixed_axis: Vec3,

    /// 本地 X 轴
    pub local_axis_x: Vec3,

    /// 本地 Z 轴
    pub local_axis_z: Vec3,
}

impl BoneLink {
    /// 创建新骨骼
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            index: 0,
            parent_index: -1,
            layer: 0,
            flags: BoneFlags::ROTATABLE | BoneFlags::VISIBLE | BoneFlags::OPERABLE,
            position: Vec3::ZERO,
            tail: BoneTail::default(),
            ik_config: None,
            append_config: None,
            fixed_axis: Vec3::ZERO,
            local_axis_x: Vec3::X,
            local_axis_z: Vec3::Z,
        }
    }

    // ========================================
    // 构建辅助
    // ========================================

    pub fn with_position(mut self, position: Vec3) -> Self {
        self.position = position;
        self
    }

    pub fn with_parent(mut self, parent: i32) -> Self {
        self.parent_index = parent;
        self
    }

    pub fn with_layer(mut self, layer: i32) -> Self {
        self.layer = layer;
        self
    }

    pub fn with_flags(mut self, flags: BoneFlags) -> Self {
        self.flags |= flags;
        self
    }

    pub fn with_tail(mut self, tail: BoneTail) -> Self {
        if matches!(tail, BoneTail::Bone(_)) {
            self.flags |= BoneFlags::TAIL_IS_BONE;
        } else {
            self.flags -= BoneFlags::TAIL_IS_BONE;
        }
        self.tail = tail;
        self
    }

    pub fn with_ik(mut self, ik: IkConfig) -> Self {
        self.flags |= BoneFlags::IK;
        self.ik_config = Some(ik);
        self
    }

    /// 设置付与（rotate/translate 指定付与种类）
    pub fn with_append(mut self, parent: i32, rate: f32, rotate: bool, translate: bool) -> Self {
        if rotate {
            self.flags |= BoneFlags::APPEND_ROTATE;
        }
        if translate {
            self.flags |= BoneFlags::APPEND_TRANSLATE;
        }
        self.append_config = Some(AppendConfig { parent, rate });
        self
    }

    pub fn with_fixed_axis(mut self, axis: Vec3) -> Self {
        self.flags |= BoneFlags::FIXED_AXIS;
        self.fixed_axis = axis;
        self
    }

    pub fn with_local_axes(mut self, x: Vec3, z: Vec3) -> Self {
        self.flags |= BoneFlags::LOCAL_AXIS;
        self.local_axis_x = x;
        self.local_axis_z = z;
        self
    }

    // ========================================
    // 访问器
    // ========================================

    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }

    #[inline]
    pub fn parent_id(&self) -> Option<usize> {
        if self.parent_index >= 0 {
            Some(self.parent_index as usize)
        } else {
            None
        }
    }

    #[inline]
    pub fn is_root(&self) -> bool {
        self.parent_index < 0
    }

    /// 是 IK 骨骼（标志位与配置同时存在）
    #[inline]
    pub fn is_ik(&self) -> bool {
        self.flags.contains(BoneFlags::IK) && self.ik_config.is_some()
    }

    #[inline]
    pub fn is_after_physics(&self) -> bool {
        self.flags.contains(BoneFlags::DEFORM_AFTER_PHYSICS)
    }

    /// 付与源索引（未设置或为负时为 None）
    #[inline]
    pub fn append_parent(&self) -> Option<usize> {
        self.append_config
            .as_ref()
            .filter(|a| a.parent >= 0)
            .map(|a| a.parent as usize)
    }

    #[inline]
    pub fn append_rate(&self) -> f32 {
        self.append_config.as_ref().map(|a| a.rate).unwrap_or(0.0)
    }

    #[inline]
    pub fn is_append_rotate(&self) -> bool {
        self.flags.contains(BoneFlags::APPEND_ROTATE) && self.append_parent().is_some()
    }

    #[inline]
    pub fn is_append_translate(&self) -> bool {
        self.flags.contains(BoneFlags::APPEND_TRANSLATE) && self.append_parent().is_some()
    }

    #[inline]
    pub fn has_append(&self) -> bool {
        self.is_append_rotate() || self.is_append_translate()
    }

    #[inline]
    pub fn has_fixed_axis(&self) -> bool {
        self.flags.contains(BoneFlags::FIXED_AXIS) && self.fixed_axis != Vec3::ZERO
    }

    #[inline]
    pub fn has_local_axis(&self) -> bool {
        self.flags.contains(BoneFlags::LOCAL_AXIS)
    }

    /// IK 目标骨骼索引
    #[inline]
    pub fn ik_target(&self) -> Option<usize> {
        self.ik_config
            .as_ref()
            .filter(|ik| ik.target_bone >= 0)
            .map(|ik| ik.target_bone as usize)
    }

    /// つま先IK（名称判定）
    #[inline]
    pub fn is_toe_ik(&self) -> bool {
        self.name.contains("つま先ＩＫ") || self.name.contains("つま先IK")
    }
}
