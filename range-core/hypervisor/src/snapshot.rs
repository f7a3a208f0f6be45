//! 快照树查找
//!
//! 两个真实后端返回的快照结构不同（vSphere 是嵌套树，Proxmox 是带 parent
//! 的扁平列表），统一转换为 [`SnapshotNode`] 后按深度优先先序查找。
//! 同名快照出现在不同层级时，先序遍历遇到的第一个生效。

/// 快照树节点
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotNode<R> {
    /// 快照名称
    pub name: String,

    /// 后端引用（vSphere 的 moid、Proxmox 的快照名等）
    pub reference: R,

    /// 子快照
    pub children: Vec<SnapshotNode<R>>,
}

impl<R> SnapshotNode<R> {
    pub fn new(name: impl Into<String>, reference: R) -> Self {
        Self {
            name: name.into(),
            reference,
            children: Vec::new(),
        }
    }

    pub fn with_children(mut self, children: Vec<SnapshotNode<R>>) -> Self {
        self.children = children;
        self
    }
}

/// 在快照森林中按深度优先先序查找第一个同名快照
pub fn find_snapshot<'a, R>(
    roots: &'a [SnapshotNode<R>],
    name: &str,
) -> Option<&'a SnapshotNode<R>> {
    for node in roots {
        if node.name == name {
            return Some(node);
        }
        if let Some(found) = find_snapshot(&node.children, name) {
            return Some(found);
        }
    }
    None
}

/// 由 `(name, parent)` 扁平列表构建快照森林
///
/// 父快照不在列表中的条目视为根。子节点保持列表中的原始顺序。
pub fn build_tree<R: Clone>(entries: &[(String, Option<String>, R)]) -> Vec<SnapshotNode<R>> {
    fn children_of<R: Clone>(
        entries: &[(String, Option<String>, R)],
        parent: &str,
        depth: usize,
    ) -> Vec<SnapshotNode<R>> {
        // 环状 parent 数据不会导致无限递归
        if depth > entries.len() {
            return Vec::new();
        }
        entries
            .iter()
            .filter(|(_, p, _)| p.as_deref() == Some(parent))
            .map(|(name, _, reference)| {
                SnapshotNode::new(name.clone(), reference.clone())
                    .with_children(children_of(entries, name, depth + 1))
            })
            .collect()
    }

    let is_root = |parent: &Option<String>| match parent {
        None => true,
        Some(p) => !entries.iter().any(|(name, _, _)| name == p),
    };

    entries
        .iter()
        .filter(|(_, parent, _)| is_root(parent))
        .map(|(name, _, reference)| {
            SnapshotNode::new(name.clone(), reference.clone())
                .with_children(children_of(entries, name, 1))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tree() -> Vec<SnapshotNode<u32>> {
        vec![
            SnapshotNode::new("base", 1).with_children(vec![
                SnapshotNode::new("pre-ex", 2).with_children(vec![SnapshotNode::new("dup", 3)]),
                SnapshotNode::new("dup", 4),
            ]),
            SnapshotNode::new("dup", 5),
        ]
    }

    #[test]
    fn test_find_root_snapshot() {
        let tree = sample_tree();
        assert_eq!(find_snapshot(&tree, "base").map(|n| n.reference), Some(1));
    }

    #[test]
    fn test_find_nested_snapshot() {
        let tree = sample_tree();
        assert_eq!(find_snapshot(&tree, "pre-ex").map(|n| n.reference), Some(2));
    }

    #[test]
    fn test_duplicate_name_first_depth_first_hit_wins() {
        let tree = sample_tree();
        // 先序遍历: base -> pre-ex -> dup(3) -> dup(4) -> dup(5)
        assert_eq!(find_snapshot(&tree, "dup").map(|n| n.reference), Some(3));
    }

    #[test]
    fn test_missing_snapshot() {
        let tree = sample_tree();
        assert!(find_snapshot(&tree, "golden").is_none());
        assert!(find_snapshot::<u32>(&[], "base").is_none());
    }

    #[test]
    fn test_build_tree_from_flat_list() {
        let entries = vec![
            ("base".to_string(), None, "base".to_string()),
            ("child-b".to_string(), Some("base".to_string()), "child-b".to_string()),
            ("leaf".to_string(), Some("child-a".to_string()), "leaf".to_string()),
            ("child-a".to_string(), Some("base".to_string()), "child-a".to_string()),
            ("orphan".to_string(), Some("deleted".to_string()), "orphan".to_string()),
        ];

        let tree = build_tree(&entries);
        assert_eq!(tree.len(), 2);
        assert_eq!(tree[0].name, "base");
        assert_eq!(tree[1].name, "orphan");

        let children: Vec<_> = tree[0].children.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(children, vec!["child-b", "child-a"]);
        assert_eq!(tree[0].children[1].children[0].name, "leaf");
    }

    #[test]
    fn test_build_tree_tolerates_cycles() {
        let entries = vec![
            ("a".to_string(), Some("b".to_string()), 1),
            ("b".to_string(), Some("a".to_string()), 2),
        ];
        // 没有根，也不会无限递归
        assert!(build_tree(&entries).is_empty());
    }
}
