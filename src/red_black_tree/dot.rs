use core::fmt::{self, Write};

use super::{Color, KeyOrder, RedBlackTree, TREE};
use crate::shape::{LEFT, RIGHT};
use crate::storage::IndexedStorage;

/// Escapes double quotes so any `Display` output fits in a quoted DOT label.
struct Escaped<'a, W: ?Sized>(&'a mut W);

impl<W: Write + ?Sized> Write for Escaped<'_, W> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for (i, part) in s.split('"').enumerate() {
            if i > 0 {
                self.0.write_str("\\\"")?;
            }
            self.0.write_str(part)?;
        }
        Ok(())
    }
}

impl<K, V, O, KS, VS, CS> RedBlackTree<K, V, O, KS, VS, CS>
where
    K: fmt::Display,
    O: KeyOrder<K>,
    KS: IndexedStorage<K>,
    VS: IndexedStorage<V>,
    CS: IndexedStorage<Color>,
{
    /// Writes the tree as a Graphviz `digraph`: one node per occupied index labelled
    /// with its key and filled with its colour, and one edge per parent-child link.
    ///
    /// # Errors
    ///
    /// Returns the error of the underlying writer.
    ///
    /// # Examples
    ///
    /// ```
    /// use flatshape::RedBlackTree;
    ///
    /// let mut tree = RedBlackTree::new();
    /// tree.put(2, ())?;
    /// tree.put(1, ())?;
    ///
    /// let mut dot = String::new();
    /// tree.to_dot(&mut dot).unwrap();
    /// assert!(dot.starts_with("digraph RedBlackTree {"));
    /// assert!(dot.contains("n0 [label=\"2\", fillcolor=black];"));
    /// assert!(dot.contains("n1 [label=\"1\", fillcolor=red];"));
    /// assert!(dot.contains("n0 -> n1;"));
    /// # Ok::<(), flatshape::Error>(())
    /// ```
    pub fn to_dot<W: Write + ?Sized>(&self, out: &mut W) -> fmt::Result {
        writeln!(out, "digraph RedBlackTree {{")?;
        writeln!(out, "  node [style=filled, fontcolor=white];")?;
        for index in self.keys.non_null_indices() {
            let Some(key) = self.keys.get(index) else {
                continue;
            };
            let fill = match self.colors.get(index) {
                Some(Color::Red) => "red",
                _ => "black",
            };
            write!(out, "  n{index} [label=\"")?;
            write!(Escaped(&mut *out), "{key}")?;
            writeln!(out, "\", fillcolor={fill}];")?;
        }
        for index in self.keys.non_null_indices() {
            for branch in [LEFT, RIGHT] {
                if let Some(child) = TREE.child(index, branch)
                    && self.keys.has(child)
                {
                    writeln!(out, "  n{index} -> n{child};")?;
                }
            }
        }
        writeln!(out, "}}")
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use crate::RedBlackTree;
    use alloc::string::String;

    #[test]
    fn empty_tree_is_an_empty_graph() {
        let tree: RedBlackTree<i32, ()> = RedBlackTree::new();
        let mut dot = String::new();
        tree.to_dot(&mut dot).unwrap();
        assert_eq!(dot, "digraph RedBlackTree {\n  node [style=filled, fontcolor=white];\n}\n");
    }

    #[test]
    fn labels_are_escaped() {
        let mut tree = RedBlackTree::new();
        tree.put("say \"hi\"", 0).unwrap();
        let mut dot = String::new();
        tree.to_dot(&mut dot).unwrap();
        assert!(dot.contains(r#"n0 [label="say \"hi\"", fillcolor=black];"#));
    }
}
