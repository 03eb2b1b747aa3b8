//! 姿势求值配置
//!
//! 所有参数扁平化，直接在代码中修改默认值即可。

use once_cell::sync::Lazy;
use std::sync::RwLock;

/// 求值配置（扁平化，不嵌套）
#[derive(Debug, Clone)]
pub struct DeformConfig {
    // ========== 付与 ==========
    /// 付与递归深度上限，默认 10
    pub max_effector_recursion: usize,

    // ========== IK ==========
    /// IK 收敛距离，小于等于此值时提前结束迭代，默认 1e-5
    pub ik_convergence_distance: f32,
    /// 迭代结束后是否恢复最佳姿势，默认 true
    pub ik_restore_best_pose: bool,

    // ========== Morph ==========
    /// Morph 比率阈值（绝对值低于此值视为 0），默认 1e-12
    pub morph_ratio_epsilon: f32,

    // ========== 蒙皮 ==========
    /// 是否使用 rayon 并行蒙皮，默认 true
    pub parallel_skinning: bool,
    /// 并行蒙皮的最小顶点数，默认 2048
    pub parallel_skinning_min_vertices: usize,

    // ========== 调试 ==========
    /// 是否输出逐帧调试日志，默认 false
    pub debug_log: bool,
}

impl Default for DeformConfig {
    fn default() -> Self {
        Self {
            // ====== 付与 ======
            // 付与链可能成环，深度上限保证终止
            max_effector_recursion: 10,

            // ====== IK ======
            ik_convergence_distance: 1e-5,
            ik_restore_best_pose: true,

            // ====== Morph ======
            morph_ratio_epsilon: 1e-12,

            // ====== 蒙皮 ======
            // 顶点少时线程调度开销大于收益
            parallel_skinning: true,
            parallel_skinning_min_vertices: 2048,

            // ====== 调试 ======
            debug_log: false,
        }
    }
}

/// 全局配置实例
static DEFORM_CONFIG: Lazy<RwLock<DeformConfig>> = Lazy::new(|| {
    RwLock::new(DeformConfig::default())
});

/// 获取当前配置（只读）
pub fn get_config() -> DeformConfig {
    DEFORM_CONFIG.read().unwrap_or_else(|e| e.into_inner()).clone()
}

/// 手动设置配置（用于运行时调试）
pub fn set_config(config: DeformConfig) {
    log::info!(
        "[Deform] 配置更新: effector_depth={}, ik_distance={}, parallel={}",
        config.max_effector_recursion,
        config.ik_convergence_distance,
        config.parallel_skinning
    );
    *DEFORM_CONFIG.write().unwrap_or_else(|e| e.into_inner()) = config;
}

/// 重置为默认配置
pub fn reset_config() {
    *DEFORM_CONFIG.write().unwrap_or_else(|e| e.into_inner()) = DeformConfig::default();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let config = DeformConfig::default();
        assert_eq!(config.max_effector_recursion, 10);
        assert!((config.ik_convergence_distance - 1e-5).abs() < 1e-9);
        assert!(config.ik_restore_best_pose);
        assert!(!config.debug_log);
    }

    #[test]
    fn test_global_config_is_readable() {
        // 其他测试不修改全局配置，这里只读
        let config = get_config();
        assert!(config.max_effector_recursion > 0);
    }
}
