//! 每帧编排
//!
//! Morph → 物理前骨骼（含 IK）→ 物理钩子 → 物理后骨骼 → 材质 Morph → 蒙皮

use std::collections::HashMap;

use glam::Mat4;

use super::MmdModel;
use crate::animation::Motion;
use crate::config::get_config;
use crate::delta::{BoneDelta, BoneDeltas, MorphDeltas};
use crate::morph::{apply_material_morph_deltas, compute_morph_deltas};
use crate::physics::{NoPhysics, PhysicsHook, PhysicsMode};
use crate::skeleton::{
    apply_bone_matrices_with_indexes, apply_ik_deltas, compute_bone_deltas, IkPass, NoopIkDebugSink,
};
use crate::skinning::apply_skinning;

/// 一帧的求值结果
#[derive(Clone, Debug)]
pub struct FrameDeform {
    pub bone_deltas: BoneDeltas,
    pub morph_deltas: MorphDeltas,
    /// 骨骼求值顺序
    pub order: Vec<usize>,
}

impl MmdModel {
    /// 求值一帧并写入运行时缓冲
    pub fn update_frame(&mut self, motion: Option<&Motion>, frame: f32, physics: &mut dyn PhysicsHook) -> FrameDeform {
        let morph_deltas = compute_morph_deltas(self, motion, frame, None);

        // 物理前：全部骨骼，物理后变形的 IK 留到后面
        let (mut bone_deltas, order) = compute_bone_deltas(self, motion, frame, &[], true, false, false);

        if !self.rigid_bodies.is_empty() {
            self.sync_physics(physics, &mut bone_deltas);
        }

        // 物理后：覆盖结果已折叠进存储，重新组合并求解物理后 IK
        if self.bones.iter().any(|b| b.is_after_physics()) || !self.rigid_bodies.is_empty() {
            apply_bone_matrices_with_indexes(&self.bones, &mut bone_deltas, &order);
            let pass = IkPass {
                model: self,
                motion,
                frame,
                after_physics: true,
                remove_twist: false,
            };
            apply_ik_deltas(&pass, &mut bone_deltas, &order, &mut NoopIkDebugSink);
            apply_bone_matrices_with_indexes(&self.bones, &mut bone_deltas, &order);
        }

        apply_material_morph_deltas(self, &morph_deltas);
        apply_skinning(self, &bone_deltas, &morph_deltas);

        if get_config().debug_log {
            log::debug!("[Deform] {} 帧 {:.2} 完成", self.name, frame);
        }
        FrameDeform {
            bone_deltas,
            morph_deltas,
            order,
        }
    }

    /// 不接物理引擎的求值
    pub fn update_frame_without_physics(&mut self, motion: Option<&Motion>, frame: f32) -> FrameDeform {
        self.update_frame(motion, frame, &mut NoPhysics)
    }

    /// 推送跟随骨骼的刚体 → 步进 → 读回动态刚体并折叠进差分存储
    fn sync_physics(&self, physics: &mut dyn PhysicsHook, deltas: &mut BoneDeltas) {
        for rigid_body in self.rigid_bodies.iter().filter(|rb| rb.mode.follows_bone()) {
            let Some(bone) = self.bones.get_signed(rigid_body.bone_index) else {
                continue;
            };
            let Some(global) = deltas.get_by_index(bone.index()).map(BoneDelta::filled_global_matrix) else {
                continue;
            };
            if let Err(e) = physics.update_rigidbody_transform(self.id, bone, global, rigid_body) {
                log::warn!("[Physics] 刚体 {} 同步失败: {}", rigid_body.name, e);
            }
        }

        if let Err(e) = physics.step_simulation(self.id) {
            log::warn!("[Physics] 模型 {} 步进失败: {}", self.name, e);
        }

        let mut overrides: HashMap<usize, Mat4> = HashMap::new();
        for rigid_body in self.rigid_bodies.iter().filter(|rb| rb.mode == PhysicsMode::Dynamic) {
            let Some(bone) = self.bones.get_signed(rigid_body.bone_index) else {
                continue;
            };
            match physics.get_rigidbody_bone_matrix(self.id, rigid_body) {
                Ok(Some(matrix)) => {
                    overrides.insert(bone.index(), matrix);
                }
                Ok(None) => {}
                Err(e) => log::warn!("[Physics] 刚体 {} 读取失败: {}", rigid_body.name, e),
            }
        }
        if overrides.is_empty() {
            return;
        }

        // 父先于子，父骨骼的覆盖矩阵优先
        for &index in self.bones.deform_order() {
            let Some(&global) = overrides.get(&index) else {
                continue;
            };
            let Some(bone) = self.bones.get(index) else {
                continue;
            };
            let parent_global = bone.parent_id().and_then(|parent| {
                overrides
                    .get(&parent)
                    .copied()
                    .or_else(|| deltas.get_by_index(parent).map(BoneDelta::filled_global_matrix))
            });
            deltas.insert(BoneDelta::from_global_matrix(&self.bones, bone, global, parent_global));
        }
        if get_config().debug_log {
            log::debug!("[Physics] {} 个骨骼被物理覆盖", overrides.len());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::animation::BoneKeyframe;
    use crate::physics::RigidBody;
    use crate::skeleton::BoneLink;
    use crate::test_rigs;
    use crate::{MmdError, Result};
    use glam::{Quat, Vec3};

    /// 记录推送并返回固定覆盖矩阵的物理引擎
    struct ScriptedPhysics {
        pushed: Vec<String>,
        steps: usize,
        override_matrix: Option<Mat4>,
        fail_push: bool,
    }

    impl PhysicsHook for ScriptedPhysics {
        fn update_rigidbody_transform(&mut self, _: i64, bone: &BoneLink, _: Mat4, _: &RigidBody) -> Result<()> {
            if self.fail_push {
                return Err(MmdError::Physics("push failed".into()));
            }
            self.pushed.push(bone.name.clone());
            Ok(())
        }

        fn step_simulation(&mut self, _: i64) -> Result<()> {
            self.steps += 1;
            Ok(())
        }

        fn get_rigidbody_bone_matrix(&mut self, _: i64, _: &RigidBody) -> Result<Option<Mat4>> {
            Ok(self.override_matrix)
        }
    }

    fn physics_model() -> MmdModel {
        test_rigs::init_logging();
        test_rigs::fk_chain().with_rigid_bodies(vec![
            RigidBody::new("腕剛体", 0, PhysicsMode::FollowBone),
            RigidBody::new("手首剛体", 2, PhysicsMode::Dynamic),
        ])
    }

    #[test]
    fn test_rest_frame_keeps_rest_vertices() {
        let mut model = test_rigs::fk_chain();
        let deform = model.update_frame_without_physics(None, 0.0);
        assert_eq!(deform.order.len(), model.bones.len());
        for (deformed, rest) in model.runtime.vertices.iter().zip(&model.vertices) {
            assert!(deformed.position.abs_diff_eq(rest.position, 1e-5));
        }
    }

    #[test]
    fn test_dynamic_override_replaces_global() {
        let mut model = physics_model();
        let target = Mat4::from_rotation_translation(Quat::from_rotation_z(0.3), Vec3::new(2.0, 1.0, 0.0));
        let mut physics = ScriptedPhysics {
            pushed: Vec::new(),
            steps: 0,
            override_matrix: Some(target),
            fail_push: false,
        };
        let deform = model.update_frame(None, 0.0, &mut physics);

        assert_eq!(physics.pushed, vec!["腕".to_string()]);
        assert_eq!(physics.steps, 1);
        let global = deform.bone_deltas.get_by_index(2).unwrap().filled_global_matrix();
        assert!(global.abs_diff_eq(target, 1e-4));
    }

    #[test]
    fn test_physics_errors_are_skipped() {
        let mut model = physics_model();
        let mut motion = Motion::new("arm");
        motion.insert_bone_keyframe("腕", BoneKeyframe::new(0).with_rotation(Quat::from_rotation_z(0.5)));
        let mut physics = ScriptedPhysics {
            pushed: Vec::new(),
            steps: 0,
            override_matrix: None,
            fail_push: true,
        };
        let deform = model.update_frame(Some(&motion), 0.0, &mut physics);
        let (expected, _) = compute_bone_deltas(&model, Some(&motion), 0.0, &[], true, false, false);
        for (a, b) in deform.bone_deltas.iter().zip(expected.iter()) {
            assert!(a.filled_global_matrix().abs_diff_eq(b.filled_global_matrix(), 1e-5));
        }
    }
}
