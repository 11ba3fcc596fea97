use crate::selector::{Specificity, selector_specificity};
use crate::syntax::{AtRuleBlock, SyntaxKind, SyntaxModel, SyntaxNode};
use crate::types::{IdGenerator, LogicId, Origin, SyntaxId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogicKind {
    Root,
    File,
    AtRule { name: String, prelude: String },
    Selector,
    Declaration { important: bool },
}

#[derive(Debug, Clone, PartialEq)]
pub struct LogicMetadata {
    pub origin: Origin,
    pub source_name: String,
    pub specificity: Option<Specificity>,
    pub line: Option<u32>,
    pub readonly: bool,
    /// Backing node in the syntax model, if any.
    pub syntax: Option<SyntaxId>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LogicNode {
    pub id: LogicId,
    pub kind: LogicKind,
    pub label: String,
    pub value: Option<String>,
    pub metadata: LogicMetadata,
    pub children: Vec<LogicNode>,
}

impl LogicNode {
    fn root(origin: Origin, ids: &mut IdGenerator) -> Self {
        Self {
            id: LogicId::mint(ids),
            kind: LogicKind::Root,
            label: origin.root_label().to_string(),
            value: None,
            metadata: LogicMetadata {
                origin,
                source_name: String::new(),
                specificity: None,
                line: None,
                readonly: false,
                syntax: None,
            },
            children: Vec::new(),
        }
    }

    fn file(origin: Origin, source_name: &str, readonly: bool, ids: &mut IdGenerator) -> Self {
        Self {
            id: LogicId::mint(ids),
            kind: LogicKind::File,
            label: source_name.to_string(),
            value: None,
            metadata: LogicMetadata {
                origin,
                source_name: source_name.to_string(),
                specificity: None,
                line: None,
                readonly,
                syntax: None,
            },
            children: Vec::new(),
        }
    }

    /// Wraps a syntax node without its children.
    pub fn from_syntax(node: &SyntaxNode, ids: &mut IdGenerator) -> Self {
        let (kind, label, value, specificity) = match &node.kind {
            SyntaxKind::SelectorRule { selector } => (
                LogicKind::Selector,
                selector.clone(),
                None,
                Some(selector_specificity(selector)),
            ),
            SyntaxKind::AtRule { name, prelude, .. } => (
                LogicKind::AtRule {
                    name: name.clone(),
                    prelude: prelude.clone(),
                },
                at_rule_label(name, prelude),
                None,
                None,
            ),
            SyntaxKind::Declaration {
                property,
                value,
                important,
            } => (
                LogicKind::Declaration {
                    important: *important,
                },
                property.clone(),
                Some(value.clone()),
                None,
            ),
        };
        Self {
            id: LogicId::mint(ids),
            kind,
            label,
            value,
            metadata: LogicMetadata {
                origin: node.origin,
                source_name: node.source_name.clone(),
                specificity,
                line: node.line,
                readonly: node.readonly,
                syntax: Some(node.id),
            },
            children: Vec::new(),
        }
    }

    pub fn is_rule(&self) -> bool {
        matches!(self.kind, LogicKind::Selector | LogicKind::AtRule { .. })
    }

    pub fn is_selector(&self) -> bool {
        self.kind == LogicKind::Selector
    }

    pub fn is_declaration(&self) -> bool {
        matches!(self.kind, LogicKind::Declaration { .. })
    }

    pub fn declarations(&self) -> impl Iterator<Item = &LogicNode> + '_ {
        self.children.iter().filter(|child| child.is_declaration())
    }

    /// Condition text for at-rules: the prelude.
    pub fn condition(&self) -> Option<(&str, &str)> {
        match &self.kind {
            LogicKind::AtRule { name, prelude } => Some((name.as_str(), prelude.as_str())),
            _ => None,
        }
    }
}

pub fn at_rule_label(name: &str, prelude: &str) -> String {
    if prelude.is_empty() {
        format!("@{}", name)
    } else {
        format!("@{} {}", name, prelude)
    }
}

/// A selector node reached by a depth-first walk, with the at-rules and
/// selector rules that enclose it, outermost first.
#[derive(Debug, Clone)]
pub struct SelectorEntry<'a> {
    pub node: &'a LogicNode,
    pub at_rules: Vec<&'a LogicNode>,
    pub parents: Vec<&'a LogicNode>,
}

/// Where a node sits inside its file. Survives a rebuild from the same text,
/// unlike [`LogicId`]s.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodePath {
    pub origin: Origin,
    pub source_name: String,
    pub indices: Vec<usize>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LogicTree {
    pub roots: Vec<LogicNode>,
}

impl LogicTree {
    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    pub fn find(&self, id: LogicId) -> Option<&LogicNode> {
        find_in(&self.roots, id)
    }

    pub fn find_mut(&mut self, id: LogicId) -> Option<&mut LogicNode> {
        find_in_mut(&mut self.roots, id)
    }

    pub fn find_parent(&self, id: LogicId) -> Option<&LogicNode> {
        parent_in(&self.roots, id)
    }

    /// Every ancestor of the node, root first. Empty for roots and unknown ids.
    pub fn find_ancestors(&self, id: LogicId) -> Vec<&LogicNode> {
        let mut path = Vec::new();
        if path_to(&self.roots, id, &mut path) {
            path.pop();
            path
        } else {
            Vec::new()
        }
    }

    pub fn find_root(&self, origin: Origin) -> Option<&LogicNode> {
        self.roots.iter().find(|root| root.metadata.origin == origin)
    }

    pub fn find_file(&self, origin: Origin, source_name: &str) -> Option<&LogicNode> {
        self.find_root(origin)?
            .children
            .iter()
            .find(|file| file.kind == LogicKind::File && file.metadata.source_name == source_name)
    }

    /// Root for the origin, inserted at its canonical position when missing.
    pub fn find_or_create_root(&mut self, origin: Origin, ids: &mut IdGenerator) -> &mut LogicNode {
        let pos = match self.roots.iter().position(|root| root.metadata.origin == origin) {
            Some(pos) => pos,
            None => {
                let at = self
                    .roots
                    .iter()
                    .position(|root| root.metadata.origin > origin)
                    .unwrap_or(self.roots.len());
                self.roots.insert(at, LogicNode::root(origin, ids));
                at
            }
        };
        &mut self.roots[pos]
    }

    pub fn find_or_create_file(
        &mut self,
        origin: Origin,
        source_name: &str,
        readonly: bool,
        ids: &mut IdGenerator,
    ) -> &mut LogicNode {
        let root = self.find_or_create_root(origin, ids);
        let pos = match root.children.iter().position(|file| {
            file.kind == LogicKind::File && file.metadata.source_name == source_name
        }) {
            Some(pos) => pos,
            None => {
                root.children
                    .push(LogicNode::file(origin, source_name, readonly, ids));
                root.children.len() - 1
            }
        };
        &mut root.children[pos]
    }

    /// Path of a node below its file; `None` for roots, files and unknown ids.
    pub fn path_of(&self, id: LogicId) -> Option<NodePath> {
        let ancestors = self.find_ancestors(id);
        let file = *ancestors.get(1)?;
        let node = self.find(id)?;
        let chain: Vec<&LogicNode> = ancestors[2..].iter().copied().chain(std::iter::once(node)).collect();
        let mut parent = file;
        let mut indices = Vec::with_capacity(chain.len());
        for child in chain {
            indices.push(parent.children.iter().position(|candidate| candidate.id == child.id)?);
            parent = child;
        }
        Some(NodePath {
            origin: file.metadata.origin,
            source_name: file.metadata.source_name.clone(),
            indices,
        })
    }

    pub fn resolve(&self, path: &NodePath) -> Option<&LogicNode> {
        let mut node = self.find_file(path.origin, &path.source_name)?;
        for idx in &path.indices {
            node = node.children.get(*idx)?;
        }
        Some(node)
    }

    /// Detaches the node and returns it with its subtree.
    pub fn remove(&mut self, id: LogicId) -> Option<LogicNode> {
        remove_in(&mut self.roots, id)
    }

    pub fn files(&self) -> Vec<&LogicNode> {
        self.roots
            .iter()
            .flat_map(|root| root.children.iter())
            .filter(|file| file.kind == LogicKind::File)
            .collect()
    }

    pub fn selectors(&self) -> Vec<SelectorEntry<'_>> {
        let mut out = Vec::new();
        for file in self.files() {
            collect_selectors(&file.children, &mut Vec::new(), &mut Vec::new(), &mut out);
        }
        out
    }
}

fn find_in(nodes: &[LogicNode], id: LogicId) -> Option<&LogicNode> {
    for node in nodes {
        if node.id == id {
            return Some(node);
        }
        if let Some(found) = find_in(&node.children, id) {
            return Some(found);
        }
    }
    None
}

fn find_in_mut(nodes: &mut [LogicNode], id: LogicId) -> Option<&mut LogicNode> {
    for node in nodes.iter_mut() {
        if node.id == id {
            return Some(node);
        }
        if let Some(found) = find_in_mut(&mut node.children, id) {
            return Some(found);
        }
    }
    None
}

fn parent_in(nodes: &[LogicNode], id: LogicId) -> Option<&LogicNode> {
    for node in nodes {
        if node.children.iter().any(|child| child.id == id) {
            return Some(node);
        }
        if let Some(found) = parent_in(&node.children, id) {
            return Some(found);
        }
    }
    None
}

fn path_to<'a>(nodes: &'a [LogicNode], id: LogicId, path: &mut Vec<&'a LogicNode>) -> bool {
    for node in nodes {
        path.push(node);
        if node.id == id || path_to(&node.children, id, path) {
            return true;
        }
        path.pop();
    }
    false
}

fn remove_in(nodes: &mut Vec<LogicNode>, id: LogicId) -> Option<LogicNode> {
    if let Some(pos) = nodes.iter().position(|node| node.id == id) {
        return Some(nodes.remove(pos));
    }
    for node in nodes.iter_mut() {
        if let Some(removed) = remove_in(&mut node.children, id) {
            return Some(removed);
        }
    }
    None
}

fn collect_selectors<'a>(
    nodes: &'a [LogicNode],
    at_rules: &mut Vec<&'a LogicNode>,
    parents: &mut Vec<&'a LogicNode>,
    out: &mut Vec<SelectorEntry<'a>>,
) {
    for node in nodes {
        match node.kind {
            LogicKind::Selector => {
                out.push(SelectorEntry {
                    node,
                    at_rules: at_rules.clone(),
                    parents: parents.clone(),
                });
                parents.push(node);
                collect_selectors(&node.children, at_rules, parents, out);
                parents.pop();
            }
            LogicKind::AtRule { .. } => {
                at_rules.push(node);
                collect_selectors(&node.children, at_rules, parents, out);
                at_rules.pop();
            }
            LogicKind::Root | LogicKind::File | LogicKind::Declaration { .. } => {}
        }
    }
}

pub struct LogicTreeBuilder;

impl LogicTreeBuilder {
    pub fn build(model: &SyntaxModel, ids: &mut IdGenerator) -> LogicTree {
        let mut tree = LogicTree::default();
        for origin in Origin::ALL {
            tree.roots.push(LogicNode::root(origin, ids));
        }
        for syntax_id in model.top_level() {
            let Some(node) = model.node(*syntax_id) else {
                continue;
            };
            let logic = Self::map_node(model, node, ids);
            tree.find_or_create_file(node.origin, &node.source_name, node.readonly, ids)
                .children
                .push(logic);
        }
        tree.roots.retain(|root| !root.children.is_empty());
        tree
    }

    fn map_node(model: &SyntaxModel, node: &SyntaxNode, ids: &mut IdGenerator) -> LogicNode {
        let mut logic = LogicNode::from_syntax(node, ids);
        let descend = match &node.kind {
            SyntaxKind::SelectorRule { .. } => true,
            SyntaxKind::AtRule { block, .. } => *block == AtRuleBlock::Nested,
            SyntaxKind::Declaration { .. } => false,
        };
        if descend {
            for child in &node.children {
                if let Some(child) = model.node(*child) {
                    logic.children.push(Self::map_node(model, child, ids));
                }
            }
        }
        logic
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::SheetSource;
    use crate::syntax::SyntaxModelBuilder;

    fn model(sheets: &[SheetSource]) -> SyntaxModel {
        SyntaxModelBuilder::new().build(sheets).0
    }

    fn fixture() -> SyntaxModel {
        model(&[
            SheetSource::style_block(Some("page"), ".a { color: red; }\n@media (min-width: 600px) { #b .c { margin: 0; } }"),
            SheetSource::style_block(Some("vendor.css"), "div { display: block }").with_origin("external"),
            SheetSource::style_block(Some("page"), ".d { top: 0 }"),
            SheetSource::style_block(Some("theme.css"), "@font-face { font-family: X; src: url(x.woff) }")
                .with_origin("internal")
                .read_only(),
        ])
    }

    fn shape(nodes: &[LogicNode]) -> Vec<String> {
        let mut out = Vec::new();
        for node in nodes {
            out.push(node.label.clone());
            for child in shape(&node.children) {
                out.push(format!("  {}", child));
            }
        }
        out
    }

    #[test]
    fn roots_follow_canonical_order_and_files_group_sheets() {
        let mut ids = IdGenerator::new();
        let tree = LogicTreeBuilder::build(&fixture(), &mut ids);
        let roots: Vec<_> = tree.roots.iter().map(|root| root.label.as_str()).collect();
        assert_eq!(roots, vec!["EXTERNAL", "INTERNAL", "ON PAGE"]);

        let page = tree.find_file(Origin::OnPage, "page").expect("page file");
        let labels: Vec<_> = page.children.iter().map(|child| child.label.as_str()).collect();
        assert_eq!(labels, vec![".a", "@media (min-width: 600px)", ".d"]);
        assert!(tree.find_file(Origin::Internal, "theme.css").expect("theme").metadata.readonly);
        assert!(tree.find_file(Origin::OnPage, "theme.css").is_none());
    }

    #[test]
    fn selector_nodes_carry_specificity_and_declarations() {
        let mut ids = IdGenerator::new();
        let tree = LogicTreeBuilder::build(&fixture(), &mut ids);
        let entries = tree.selectors();
        let nested = entries
            .iter()
            .find(|entry| entry.node.label == "#b .c")
            .expect("nested selector");
        assert_eq!(nested.node.metadata.specificity, Some(Specificity(0, 1, 1, 0)));
        assert_eq!(nested.at_rules.len(), 1);
        assert_eq!(nested.at_rules[0].condition(), Some(("media", "(min-width: 600px)")));
        let decl = nested.node.declarations().next().expect("declaration");
        assert_eq!(decl.label, "margin");
        assert_eq!(decl.value.as_deref(), Some("0"));
        assert_eq!(decl.kind, LogicKind::Declaration { important: false });
        assert!(decl.metadata.syntax.is_some());
    }

    #[test]
    fn rebuilding_is_deterministic_apart_from_ids() {
        let syntax = fixture();
        let mut ids = IdGenerator::new();
        let first = LogicTreeBuilder::build(&syntax, &mut ids);
        let second = LogicTreeBuilder::build(&syntax, &mut ids);
        assert_eq!(shape(&first.roots), shape(&second.roots));
        assert_ne!(first.roots[0].id, second.roots[0].id);
    }

    #[test]
    fn lookup_helpers_navigate_the_tree() {
        let mut ids = IdGenerator::new();
        let mut tree = LogicTreeBuilder::build(&fixture(), &mut ids);
        let target = tree
            .selectors()
            .into_iter()
            .find(|entry| entry.node.label == "#b .c")
            .map(|entry| entry.node.id)
            .expect("target");
        let ancestors: Vec<_> = tree
            .find_ancestors(target)
            .iter()
            .map(|node| node.label.clone())
            .collect();
        assert_eq!(ancestors, vec!["ON PAGE", "page", "@media (min-width: 600px)"]);
        assert_eq!(
            tree.find_parent(target).map(|node| node.label.as_str()),
            Some("@media (min-width: 600px)")
        );

        tree.find_mut(target).expect("node").label = "#b .e".to_string();
        assert_eq!(tree.find(target).map(|node| node.label.as_str()), Some("#b .e"));

        let removed = tree.remove(target).expect("removed");
        assert_eq!(removed.children.len(), 1);
        assert!(tree.find(target).is_none());
        assert!(tree.find_ancestors(target).is_empty());
    }

    #[test]
    fn find_or_create_inserts_roots_in_order() {
        let mut ids = IdGenerator::new();
        let mut tree = LogicTreeBuilder::build(
            &model(&[SheetSource::style_block(Some("page"), ".a { color: red }")]),
            &mut ids,
        );
        let file = tree.find_or_create_file(Origin::External, "new.css", false, &mut ids);
        assert_eq!(file.kind, LogicKind::File);
        let file_id = file.id;
        tree.find_or_create_root(Origin::Inline, &mut ids);
        let roots: Vec<_> = tree.roots.iter().map(|root| root.metadata.origin).collect();
        assert_eq!(roots, vec![Origin::External, Origin::OnPage, Origin::Inline]);
        assert_eq!(
            tree.find_or_create_file(Origin::External, "new.css", false, &mut ids).id,
            file_id
        );
    }

    #[test]
    fn opaque_at_rules_stay_childless() {
        let mut ids = IdGenerator::new();
        let tree = LogicTreeBuilder::build(&fixture(), &mut ids);
        let theme = tree.find_file(Origin::Internal, "theme.css").expect("theme");
        assert_eq!(theme.children.len(), 1);
        assert_eq!(theme.children[0].label, "@font-face");
        assert!(theme.children[0].children.is_empty());
        assert!(tree.selectors().iter().all(|entry| entry.node.label != "@font-face"));
    }

    #[test]
    fn node_paths_survive_a_rebuild() {
        let syntax = fixture();
        let mut ids = IdGenerator::new();
        let first = LogicTreeBuilder::build(&syntax, &mut ids);
        let nested = first
            .selectors()
            .into_iter()
            .find(|entry| entry.node.label == "#b .c")
            .map(|entry| entry.node.id)
            .expect("nested selector");
        let path = first.path_of(nested).expect("path");
        assert_eq!(path.origin, Origin::OnPage);
        assert_eq!(path.source_name, "page");
        assert_eq!(path.indices, vec![1, 0]);

        let second = LogicTreeBuilder::build(&syntax, &mut ids);
        let found = second.resolve(&path).expect("resolved");
        assert_eq!(found.label, "#b .c");
        assert_ne!(found.id, nested);

        let file = first.find_file(Origin::OnPage, "page").expect("file").id;
        assert!(first.path_of(file).is_none());
    }
}
