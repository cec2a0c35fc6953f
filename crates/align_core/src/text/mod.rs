//! Text fragments and the (possibly hierarchical) text file they come
//! from.
//!
//! Parsing of concrete text formats is left to the callers; the engine
//! only consumes already-segmented fragments. Multilevel inputs
//! (paragraph > sentence > word) arrive as a tree of nodes.

use serde::{Deserialize, Serialize};

/// A single text fragment to be aligned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextFragment {
    /// Stable identifier of the fragment (e.g. `f000001`).
    pub identifier: String,
    /// Language code, if known.
    pub language: Option<String>,
    /// The lines the fragment text is split into.
    pub lines: Vec<String>,
    /// The lines after regex filtering/transliteration, used for rate
    /// computations and synthesis.
    pub filtered_lines: Vec<String>,
}

impl TextFragment {
    /// Create a fragment whose filtered lines equal its lines.
    pub fn new(identifier: impl Into<String>, lines: Vec<String>) -> Self {
        Self {
            identifier: identifier.into(),
            language: None,
            filtered_lines: lines.clone(),
            lines,
        }
    }

    /// The fragment text, lines joined by a single space.
    pub fn text(&self) -> String {
        self.lines.join(" ")
    }

    /// The filtered fragment text, lines joined by a single space.
    pub fn filtered_text(&self) -> String {
        self.filtered_lines.join(" ")
    }

    /// Number of characters over all lines, line separators excluded.
    pub fn chars(&self) -> usize {
        self.lines.iter().map(|line| line.chars().count()).sum()
    }

    /// Number of characters over all filtered lines.
    pub fn filtered_chars(&self) -> usize {
        self.filtered_lines
            .iter()
            .map(|line| line.chars().count())
            .sum()
    }
}

/// A fragment together with its finer-grained children.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextNode {
    /// The fragment at this level.
    pub fragment: TextFragment,
    /// Finer-grained fragments below it (empty for leaf levels).
    pub children: Vec<TextNode>,
}

impl TextNode {
    /// Create a leaf node.
    pub fn leaf(fragment: TextFragment) -> Self {
        Self {
            fragment,
            children: Vec::new(),
        }
    }

    /// Create a node with children.
    pub fn with_children(fragment: TextFragment, children: Vec<TextNode>) -> Self {
        Self { fragment, children }
    }
}

/// An ordered collection of text fragments, one level at a time.
///
/// For multilevel inputs the top-level nodes are the coarsest
/// granularity; [`TextFile::sub_files`] peels one level off.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextFile {
    /// Language of the whole file, if known.
    pub language: Option<String>,
    nodes: Vec<TextNode>,
}

impl TextFile {
    /// Build a single-level text file from a flat fragment list.
    pub fn new(fragments: Vec<TextFragment>) -> Self {
        Self {
            language: None,
            nodes: fragments.into_iter().map(TextNode::leaf).collect(),
        }
    }

    /// Build a (possibly multilevel) text file from nodes.
    pub fn from_nodes(nodes: Vec<TextNode>) -> Self {
        Self {
            language: None,
            nodes,
        }
    }

    /// Number of top-level fragments.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the file has no fragments.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// The top-level nodes.
    pub fn nodes(&self) -> &[TextNode] {
        &self.nodes
    }

    /// Iterate over the top-level fragments.
    pub fn fragments(&self) -> impl Iterator<Item = &TextFragment> {
        self.nodes.iter().map(|n| &n.fragment)
    }

    /// Total character count over the top-level fragments.
    pub fn chars(&self) -> usize {
        self.fragments().map(TextFragment::chars).sum()
    }

    /// Whether any top-level fragment carries finer-grained children.
    pub fn is_multilevel(&self) -> bool {
        self.nodes.iter().any(|n| !n.children.is_empty())
    }

    /// One sub-file per top-level node with non-empty children,
    /// paired with the index of the originating node.
    pub fn sub_files(&self) -> Vec<(usize, TextFile)> {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| !n.children.is_empty())
            .map(|(i, n)| {
                let mut sub = TextFile::from_nodes(n.children.clone());
                sub.language = self.language.clone();
                (i, sub)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frag(id: &str, text: &str) -> TextFragment {
        TextFragment::new(id, vec![text.to_string()])
    }

    #[test]
    fn chars_counts_without_separators() {
        let f = TextFragment::new("f001", vec!["abc".into(), "de".into()]);
        assert_eq!(f.chars(), 5);
        assert_eq!(f.text(), "abc de");
    }

    #[test]
    fn single_level_file_is_not_multilevel() {
        let file = TextFile::new(vec![frag("f001", "one"), frag("f002", "two")]);
        assert_eq!(file.len(), 2);
        assert!(!file.is_multilevel());
        assert_eq!(file.chars(), 6);
        assert!(file.sub_files().is_empty());
    }

    #[test]
    fn sub_files_peel_one_level() {
        let para = TextNode::with_children(
            frag("p001", "one two"),
            vec![TextNode::leaf(frag("p001s001", "one")), TextNode::leaf(frag("p001s002", "two"))],
        );
        let file = TextFile::from_nodes(vec![para, TextNode::leaf(frag("p002", "three"))]);
        assert!(file.is_multilevel());
        let subs = file.sub_files();
        assert_eq!(subs.len(), 1);
        assert_eq!(subs[0].0, 0);
        assert_eq!(subs[0].1.len(), 2);
    }
}
