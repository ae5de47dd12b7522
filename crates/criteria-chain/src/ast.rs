//! Syntax tree for chained element ids.

/// A node of a parsed element chain.
///
/// `(A.b:slice).c[x]` parses to
/// `Group([Id("A.b:slice"), Id("c[x]")])`; groups nest when the chain
/// crosses more than one extension or reference boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ChainNode {
    /// A plain element id (continuation ids are stored without their leading `.`).
    Id(String),
    /// A parenthesised chain followed by zero or more continuation ids.
    Group(Vec<ChainNode>),
}

impl ChainNode {
    /// Flattens the tree depth-first, left to right.
    pub fn flatten(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.collect_into(&mut out);
        out
    }

    fn collect_into(&self, out: &mut Vec<String>) {
        match self {
            ChainNode::Id(id) => out.push(id.clone()),
            ChainNode::Group(children) => {
                for child in children {
                    child.collect_into(out);
                }
            }
        }
    }

    /// Returns the number of ids in the chain.
    pub fn len(&self) -> usize {
        match self {
            ChainNode::Id(_) => 1,
            ChainNode::Group(children) => children.iter().map(ChainNode::len).sum(),
        }
    }

    /// Returns true if the chain holds no ids.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the nesting depth (a plain id has depth 0).
    pub fn depth(&self) -> usize {
        match self {
            ChainNode::Id(_) => 0,
            ChainNode::Group(children) => {
                1 + children.iter().map(ChainNode::depth).max().unwrap_or(0)
            }
        }
    }
}

/// A composite attribute id of the form `P.where(Q):slice.rest`.
///
/// The value side is `P:slice.rest`; the qualifier side is `Q`, the element
/// fixing the code/system pair that selects the repetition of `P`.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CompositeId {
    /// Id of the value-bearing element.
    pub value: String,
    /// Id of the sibling element that fixes the code.
    pub qualifier: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> ChainNode {
        ChainNode::Id(s.to_string())
    }

    #[test]
    fn test_flatten_plain_id() {
        assert_eq!(id("Condition.code").flatten(), vec!["Condition.code"]);
    }

    #[test]
    fn test_flatten_nested_groups() {
        let tree = ChainNode::Group(vec![
            ChainNode::Group(vec![id("Condition.extension:a"), id("extension:b")]),
            id("value[x]"),
        ]);
        assert_eq!(
            tree.flatten(),
            vec!["Condition.extension:a", "extension:b", "value[x]"]
        );
        assert_eq!(tree.len(), 3);
        assert_eq!(tree.depth(), 2);
        assert!(!tree.is_empty());
    }
}
