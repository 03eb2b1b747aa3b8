//! 测试用的小型骨架与模型

use std::f32::consts::PI;

use glam::{Quat, Vec3, Vec4};

use crate::animation::{BoneKeyframe, Motion};
use crate::model::{DeformBinding, Material, MaterialParams, MmdModel, Vertex};
use crate::morph::{
    BoneMorphOffset, GroupMorphOffset, MaterialCalcMode, MaterialMorphOffset, Morph, MorphKind, MorphOffset,
    VertexMorphOffset,
};
use crate::skeleton::{BoneFlags, BoneLink, BoneTail, IkConfig, IkLink};

/// 测试日志初始化（RUST_LOG 控制输出）
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn model(name: &str, bones: Vec<BoneLink>) -> MmdModel {
    match MmdModel::new(name, bones) {
        Ok(model) => model,
        Err(e) => panic!("测试骨架 {} 构建失败: {}", name, e),
    }
}

fn bdef1(position: Vec3, bone: i32) -> Vertex {
    Vertex::new(position, Vec3::Y, DeformBinding::Bdef1 { bone })
}

/// 腕 → ひじ → 手首 沿 +X 排列
pub fn fk_chain() -> MmdModel {
    model(
        "fk_chain",
        vec![
            BoneLink::new("腕"),
            BoneLink::new("ひじ").with_parent(0).with_position(Vec3::new(1.0, 0.0, 0.0)),
            BoneLink::new("手首").with_parent(1).with_position(Vec3::new(2.0, 0.0, 0.0)),
        ],
    )
    .with_vertices(vec![
        bdef1(Vec3::new(0.5, 0.1, 0.0), 0),
        bdef1(Vec3::new(1.5, 0.1, 0.0), 1),
        bdef1(Vec3::new(2.5, 0.1, 0.0), 2),
    ])
    .with_materials(vec![Material::new("肌", MaterialParams::default())])
}

/// 付与先以 0.5 的比例追随付与元的旋转
pub fn effector_pair() -> MmdModel {
    model(
        "effector_pair",
        vec![
            BoneLink::new("付与元"),
            BoneLink::new("付与先").with_append(0, 0.5, true, false),
        ],
    )
}

/// 移動元 → 中継 → 末端，各以 0.5 的比例付与平移（末端为付与的付与）
pub fn translate_effector_chain() -> MmdModel {
    model(
        "translate_effector_chain",
        vec![
            BoneLink::new("移動元"),
            BoneLink::new("中継").with_append(0, 0.5, false, true),
            BoneLink::new("末端").with_append(1, 0.5, false, true),
        ],
    )
}

/// 子骨骼为物理后变形
pub fn cancel_pair() -> MmdModel {
    model(
        "cancel_pair",
        vec![
            BoneLink::new("親"),
            BoneLink::new("子")
                .with_parent(0)
                .with_position(Vec3::new(0.0, 1.0, 0.0))
                .with_flags(BoneFlags::DEFORM_AFTER_PHYSICS),
        ],
    )
}

/// 单链接 IK：腕 绕原点旋转，手首 追随 腕ＩＫ
pub fn single_link_ik() -> MmdModel {
    model(
        "single_link_ik",
        vec![
            BoneLink::new("センター"),
            BoneLink::new("腕").with_parent(0),
            BoneLink::new("手首").with_parent(1).with_position(Vec3::new(0.0, 1.0, 0.0)),
            BoneLink::new("腕ＩＫ")
                .with_parent(0)
                .with_position(Vec3::new(0.0, 1.0, 0.0))
                .with_ik(IkConfig::new(2, 10, 1.0).with_link(IkLink::new(1))),
        ],
    )
}

/// 腕ＩＫ 移到 (1, 0, 0)
pub fn single_link_ik_motion() -> Motion {
    let mut motion = Motion::new("reach");
    motion.insert_bone_keyframe("腕ＩＫ", BoneKeyframe::new(0).with_position(Vec3::new(1.0, -1.0, 0.0)));
    motion
}

/// 同 [`single_link_ik`]，但 腕 的子方向为 +Z，只允许绕局部 X 轴在 [-1, 0] 内旋转
pub fn local_limit_ik() -> MmdModel {
    model(
        "local_limit_ik",
        vec![
            BoneLink::new("センター"),
            BoneLink::new("腕").with_parent(0).with_tail(BoneTail::Offset(Vec3::Z)),
            BoneLink::new("手首").with_parent(1).with_position(Vec3::new(0.0, 1.0, 0.0)),
            BoneLink::new("腕ＩＫ")
                .with_parent(0)
                .with_position(Vec3::new(0.0, 1.0, 0.0))
                .with_ik(
                    IkConfig::new(2, 10, 2.0)
                        .with_link(IkLink::new(1).with_local_limits(Vec3::new(-1.0, 0.0, 0.0), Vec3::ZERO)),
                ),
        ],
    )
}

/// IK 骨骼排在目标之前、只迭代一次：一步求解即到达
///
/// 腕 的子方向为 (1, 1, 0)，并带有一个绕 X 轴旋转 0.4 的骨骼 Morph「捻り」
pub fn single_step_ik() -> MmdModel {
    model(
        "single_step_ik",
        vec![
            BoneLink::new("センター"),
            BoneLink::new("腕ＩＫ")
                .with_parent(0)
                .with_position(Vec3::new(0.0, 1.0, 0.0))
                .with_ik(IkConfig::new(3, 1, 4.0).with_link(IkLink::new(2))),
            BoneLink::new("腕")
                .with_parent(0)
                .with_tail(BoneTail::Offset(Vec3::new(1.0, 1.0, 0.0))),
            BoneLink::new("手首").with_parent(2).with_position(Vec3::new(0.0, 1.0, 0.0)),
        ],
    )
    .with_morphs(vec![Morph::new("捻り", MorphKind::Bone).with_offset(MorphOffset::Bone(
        BoneMorphOffset::new(2, Vec3::ZERO, Quat::from_rotation_x(0.4)),
    ))])
}

/// 左足 → 左ひざ → 左足首，ひざ 只能绕 X 轴向后弯
pub fn two_link_leg() -> MmdModel {
    model(
        "two_link_leg",
        vec![
            BoneLink::new("左足").with_position(Vec3::new(0.0, 2.0, 0.0)),
            BoneLink::new("左ひざ").with_parent(0).with_position(Vec3::new(0.0, 1.0, 0.0)),
            BoneLink::new("左足首").with_parent(1),
            BoneLink::new("左足ＩＫ").with_ik(
                IkConfig::new(2, 40, 2.0)
                    .with_link(IkLink::new(1).with_limits(Vec3::new(-PI, 0.0, 0.0), Vec3::new(-0.008727, 0.0, 0.0)))
                    .with_link(IkLink::new(0)),
            ),
        ],
    )
}

/// 左足首 → 左つま先，由 左つま先ＩＫ 驱动
pub fn toe_ik() -> MmdModel {
    model(
        "toe_ik",
        vec![
            BoneLink::new("左足首").with_position(Vec3::new(0.0, 1.0, 0.0)),
            BoneLink::new("左つま先").with_parent(0).with_position(Vec3::new(0.0, 0.0, -1.0)),
            BoneLink::new("左つま先ＩＫ")
                .with_position(Vec3::new(0.0, 0.0, -1.0))
                .with_ik(IkConfig::new(1, 3, 4.0).with_link(IkLink::new(0))),
        ],
    )
}

/// 各种 Morph 组合（組A ↔ 組B 互相引用成环）
pub fn morph_model() -> MmdModel {
    let vertex = |vertex_index: i32, position: Vec3| MorphOffset::Vertex(VertexMorphOffset { vertex_index, position });
    let group = |morph_index: i32, factor: f32| MorphOffset::Group(GroupMorphOffset { morph_index, factor });
    let material = |material_index: i32, calc_mode: MaterialCalcMode, params: MaterialParams| {
        MorphOffset::Material(MaterialMorphOffset {
            material_index,
            calc_mode,
            params,
        })
    };

    let morphs = vec![
        // 0
        Morph::new("上げ", MorphKind::Vertex).with_offset(vertex(0, Vec3::Y)),
        // 1
        Morph::new("後", MorphKind::AfterVertex).with_offset(vertex(1, Vec3::Z)),
        // 2
        Morph::new("組A", MorphKind::Group).with_offset(group(3, 0.5)),
        // 3
        Morph::new("組B", MorphKind::Group)
            .with_offset(group(2, 1.0))
            .with_offset(group(0, 0.5)),
        // 4
        Morph::new("材質加", MorphKind::Material).with_offset(material(
            -1,
            MaterialCalcMode::Add,
            MaterialParams {
                diffuse: Vec4::splat(0.25),
                ..MaterialParams::ZERO
            },
        )),
        // 5
        Morph::new("材質乗", MorphKind::Material).with_offset(material(
            0,
            MaterialCalcMode::Multiply,
            MaterialParams {
                diffuse: Vec4::splat(0.5),
                ..MaterialParams::ONE
            },
        )),
        // 6
        Morph::new("骨", MorphKind::Bone).with_offset(MorphOffset::Bone(BoneMorphOffset::new(
            0,
            Vec3::X,
            Quat::from_rotation_z(0.3),
        ))),
    ];

    model("morph_model", vec![BoneLink::new("センター")])
        .with_vertices(vec![bdef1(Vec3::ZERO, 0), bdef1(Vec3::X, 0)])
        .with_materials(vec![
            Material::new("顔", MaterialParams::default()),
            Material::new("髪", MaterialParams::default()),
        ])
        .with_morphs(morphs)
}
