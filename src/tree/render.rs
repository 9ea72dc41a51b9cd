//! Box-drawing rendering of trees

use super::{NodeId, Tree, TreeNode};

pub(super) fn render<N: TreeNode>(tree: &Tree<N>) -> String {
    let mut out = String::new();
    if let Some(root) = tree.root() {
        write_node(tree, root, "", true, true, &mut out);
    }
    out
}

fn write_node<N: TreeNode>(
    tree: &Tree<N>,
    id: NodeId,
    prefix: &str,
    last: bool,
    is_root: bool,
    out: &mut String,
) {
    let Ok(node) = tree.get(id) else {
        return;
    };
    let label = match tree.key(id) {
        Some(key) if key != node.label() => format!("<{}> {}", key, node.label()),
        _ => node.label(),
    };

    let child_prefix = if is_root {
        out.push_str(&label);
        String::new()
    } else {
        out.push_str(prefix);
        out.push_str(if last { "└── " } else { "├── " });
        out.push_str(&label);
        format!("{}{}", prefix, if last { "    " } else { "│   " })
    };
    out.push('\n');

    let children = tree.children(id);
    for (i, child) in children.iter().enumerate() {
        write_node(tree, *child, &child_prefix, i + 1 == children.len(), false, out);
    }
}

#[cfg(test)]
mod tests {
    use crate::errors::ClauseResult;
    use crate::tree::{Tree, TreeNode};

    #[derive(Debug, Clone)]
    struct Label(&'static str);

    impl TreeNode for Label {
        fn check_child(&self, _child: &Self, _siblings: usize) -> ClauseResult<()> {
            Ok(())
        }

        fn label(&self) -> String {
            self.0.to_string()
        }
    }

    #[test]
    fn test_render_layout() {
        let mut tree = Tree::new();
        let root = tree.insert_root(Label("bool"), None).unwrap();
        let must = tree.insert(Label("must"), root, None).unwrap();
        tree.insert(Label("term"), must, None).unwrap();
        tree.insert(Label("filter"), root, None).unwrap();

        let rendered = tree.render();
        assert_eq!(
            rendered,
            "bool\n├── must\n│   └── term\n└── filter\n"
        );
    }

    #[test]
    fn test_render_empty() {
        let tree: Tree<Label> = Tree::new();
        assert!(tree.render().is_empty());
    }
}
