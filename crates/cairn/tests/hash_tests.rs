use cairn::{ContentHash, Leaf, PackageTree, TreeError, TreeNode, hash_tree};
use serde_json::json;

fn csv_leaf(digest: &str) -> Leaf {
    Leaf::new([digest]).with_metadata("format", "csv")
}

#[test]
fn test_hash_independent_of_insertion_order() {
    // Build the same logical tree twice, inserting children in opposite order
    let mut first = PackageTree::new();
    let raw = first.insert_group(first.root(), "raw").unwrap();
    first.insert_leaf(raw, "iris", csv_leaf("aaa")).unwrap();
    first.insert_leaf(raw, "wine", csv_leaf("bbb")).unwrap();
    first.insert_group(first.root(), "docs").unwrap();

    let mut second = PackageTree::new();
    second.insert_group(second.root(), "docs").unwrap();
    let raw = second.insert_group(second.root(), "raw").unwrap();
    second.insert_leaf(raw, "wine", csv_leaf("bbb")).unwrap();
    second.insert_leaf(raw, "iris", csv_leaf("aaa")).unwrap();

    assert_eq!(hash_tree(&first).unwrap(), hash_tree(&second).unwrap());
}

#[test]
fn test_arena_and_nested_forms_agree() {
    let mut arena = PackageTree::new();
    let raw = arena.insert_group(arena.root(), "raw").unwrap();
    arena.insert_leaf(raw, "iris", csv_leaf("aaa")).unwrap();

    let nested = TreeNode::group([(
        "raw",
        TreeNode::group([("iris", TreeNode::leaf(csv_leaf("aaa")))]),
    )]);
    let rebuilt = PackageTree::from_nested(&nested).unwrap();

    assert_eq!(hash_tree(&arena).unwrap(), hash_tree(&rebuilt).unwrap());
}

#[test]
fn test_structurally_different_trees_differ() {
    let trees = [
        TreeNode::group([("foo", TreeNode::group::<_, String>([]))]),
        TreeNode::group([("bar", TreeNode::group::<_, String>([]))]),
        TreeNode::group([("baz", TreeNode::group::<_, String>([]))]),
        TreeNode::group([("foo", TreeNode::leaf(Leaf::new(["aaa"])))]),
        TreeNode::group([("foo", TreeNode::leaf(Leaf::new(["aab"])))]),
        TreeNode::group([("foo", TreeNode::leaf(csv_leaf("aaa")))]),
    ];

    let hashes: Vec<ContentHash> = trees
        .iter()
        .map(|t| hash_tree(&PackageTree::from_nested(t).unwrap()).unwrap())
        .collect();

    for (i, a) in hashes.iter().enumerate() {
        for b in &hashes[i + 1..] {
            assert_ne!(a, b);
        }
    }
}

#[test]
fn test_hash_from_wire_json() {
    let contents = json!({
        "type": "GROUP",
        "children": {
            "raw": {
                "type": "LEAF",
                "hashes": ["aaa"],
                "metadata": {"format": "csv"}
            }
        }
    });

    let nested: TreeNode = serde_json::from_value(contents).unwrap();
    let tree = PackageTree::from_nested(&nested).unwrap();
    let expected = PackageTree::from_nested(&TreeNode::group([(
        "raw",
        TreeNode::leaf(csv_leaf("aaa")),
    )]))
    .unwrap();

    assert_eq!(hash_tree(&tree).unwrap(), hash_tree(&expected).unwrap());
}

#[test]
fn test_empty_tree_encoding() {
    use sha2::{Digest, Sha256};

    fn put_str(hasher: &mut Sha256, s: &str) {
        hasher.update((s.len() as u32).to_be_bytes());
        hasher.update(s.as_bytes());
    }

    let mut hasher = Sha256::new();
    put_str(&mut hasher, cairn::TREE_FORMAT);
    put_str(&mut hasher, "GROUP");
    hasher.update(0u32.to_be_bytes());
    let expected = ContentHash::from_bytes(hasher.finalize().into());

    assert_eq!(hash_tree(&PackageTree::new()).unwrap(), expected);
}

#[test]
fn test_malformed_tree_rejected() {
    let mut tree = PackageTree::new();
    let a = tree.insert_group(tree.root(), "a").unwrap();
    let b = tree.insert_group(a, "b").unwrap();
    tree.attach(b, "up", a).unwrap();

    assert!(matches!(hash_tree(&tree), Err(TreeError::Cycle(_))));
}
