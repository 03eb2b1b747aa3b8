//! Morph 管理器

use std::collections::HashMap;

use super::Morph;

/// Morph 管理器（平坦数组 + 名称索引）
#[derive(Clone, Debug, Default)]
pub struct MorphManager {
    morphs: Vec<Morph>,
    name_to_index: HashMap<String, usize>,
}

impl MorphManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// 从列表构建，索引按顺序分配
    pub fn from_morphs(morphs: Vec<Morph>) -> Self {
        let mut manager = Self::new();
        for morph in morphs {
            manager.add_morph(morph);
        }
        manager
    }

    /// 添加 Morph，返回分配的索引
    pub fn add_morph(&mut self, mut morph: Morph) -> usize {
        let index = self.morphs.len();
        morph.index = index;
        // 重名时保留先出现的 Morph
        self.name_to_index.entry(morph.name.clone()).or_insert(index);
        self.morphs.push(morph);
        index
    }

    /// 通过名称查找 Morph
    pub fn find_by_name(&self, name: &str) -> Option<&Morph> {
        self.name_to_index.get(name).and_then(|&i| self.morphs.get(i))
    }

    /// 以有符号索引取 Morph
    pub fn get(&self, index: i32) -> Option<&Morph> {
        if index < 0 {
            return None;
        }
        self.morphs.get(index as usize)
    }

    pub fn len(&self) -> usize {
        self.morphs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.morphs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Morph> {
        self.morphs.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::morph::MorphKind;

    #[test]
    fn test_index_and_lookup() {
        let manager = MorphManager::from_morphs(vec![
            Morph::new("まばたき", MorphKind::Vertex),
            Morph::new("あ", MorphKind::Vertex),
            Morph::new("まばたき", MorphKind::Bone),
        ]);
        assert_eq!(manager.len(), 3);
        assert_eq!(manager.find_by_name("あ").map(Morph::index), Some(1));
        // 重名取先出现者
        assert_eq!(manager.find_by_name("まばたき").map(|m| m.kind), Some(MorphKind::Vertex));
        assert!(manager.get(-1).is_none());
        assert_eq!(manager.get(2).map(Morph::index), Some(2));
    }
}
