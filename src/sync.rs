use crate::debug::DebugLogger;
use crate::document::StyleDocument;
use crate::error::InspectorError;
use crate::logic::{LogicNode, LogicTree};
use crate::syntax::{AtRuleBlock, SyntaxKind, SyntaxModel};
use crate::types::{Origin, SyntaxId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    /// Children re-derived in place, no parsing, trees stay as they are.
    Light,
    /// Text written back and both trees rebuilt from the document.
    Full,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncFailure {
    pub origin: Origin,
    pub source_name: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub written: Vec<(Origin, String)>,
    pub skipped_readonly: Vec<(Origin, String)>,
    pub failures: Vec<SyncFailure>,
    /// Set by a full sync: the caller must rebuild both trees.
    pub rebuild_required: bool,
}

impl SyncReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Keeps the syntax model and the document text in step with the Logic Tree.
#[derive(Default)]
pub struct TreeSynchronizer<'a> {
    debug: Option<&'a DebugLogger>,
}

impl<'a> TreeSynchronizer<'a> {
    pub fn new() -> Self {
        Self { debug: None }
    }

    pub(crate) fn with_debug(mut self, debug: Option<&'a DebugLogger>) -> Self {
        self.debug = debug;
        self
    }

    pub fn sync<D: StyleDocument>(
        &self,
        mode: SyncMode,
        tree: &LogicTree,
        model: &mut SyntaxModel,
        document: &mut D,
    ) -> SyncReport {
        match mode {
            SyncMode::Light => self.light_sync(tree, model, document),
            SyncMode::Full => self.full_sync(tree, model, document),
        }
    }

    /// Re-derives every rule's block from its Logic Tree children, then
    /// writes each file back. Node identities are untouched.
    pub fn light_sync<D: StyleDocument>(
        &self,
        tree: &LogicTree,
        model: &mut SyntaxModel,
        document: &mut D,
    ) -> SyncReport {
        relink(tree, model);
        let report = self.write_files(tree, model, document);
        if let Some(debug) = self.debug {
            debug.count("sync.light", 1);
        }
        report
    }

    /// Writes every file back and asks the caller for a rebuild.
    pub fn full_sync<D: StyleDocument>(
        &self,
        tree: &LogicTree,
        model: &mut SyntaxModel,
        document: &mut D,
    ) -> SyncReport {
        relink(tree, model);
        let mut report = self.write_files(tree, model, document);
        report.rebuild_required = true;
        if let Some(debug) = self.debug {
            debug.count("sync.full", 1);
        }
        report
    }

    fn write_files<D: StyleDocument>(
        &self,
        tree: &LogicTree,
        model: &SyntaxModel,
        document: &mut D,
    ) -> SyncReport {
        let mut report = SyncReport::default();
        for file in tree.files() {
            let origin = file.metadata.origin;
            let source_name = file.metadata.source_name.clone();
            if file.metadata.readonly {
                report.skipped_readonly.push((origin, source_name));
                continue;
            }
            let written = serialize_file(file, model)
                .and_then(|css| document.write_style_container(origin, &source_name, &css).map(|_| css));
            match written {
                Ok(css) => {
                    if let Some(debug) = self.debug {
                        debug.event(
                            "sync.file",
                            &[
                                ("origin", origin.marker().into()),
                                ("source", source_name.as_str().into()),
                                ("bytes", css.len().into()),
                            ],
                        );
                    }
                    report.written.push((origin, source_name));
                }
                Err(err) => {
                    log::warn!("could not write {} back: {}", source_name, err);
                    if let Some(debug) = self.debug {
                        debug.count("sync.failures", 1);
                        debug.event(
                            "sync.failure",
                            &[
                                ("origin", origin.marker().into()),
                                ("source", source_name.as_str().into()),
                                ("message", err.to_string().as_str().into()),
                            ],
                        );
                    }
                    report.failures.push(SyncFailure {
                        origin,
                        source_name,
                        message: err.to_string(),
                    });
                }
            }
        }
        report
    }
}

fn serialize_file(file: &LogicNode, model: &SyntaxModel) -> Result<String, InspectorError> {
    let ids: Vec<SyntaxId> = file
        .children
        .iter()
        .filter_map(|child| child.metadata.syntax)
        .collect();
    model.serialize(&ids)
}

/// Current CSS text of one file, or an empty string when it cannot be
/// produced.
pub fn render_file(tree: &LogicTree, model: &SyntaxModel, origin: Origin, source_name: &str) -> String {
    let Some(file) = tree.find_file(origin, source_name) else {
        return String::new();
    };
    match serialize_file(file, model) {
        Ok(css) => css,
        Err(err) => {
            log::warn!("could not render {}: {}", source_name, err);
            String::new()
        }
    }
}

/// Points every rule's syntax block at the syntax nodes of its current Logic
/// Tree children, in order. Children without a live syntax node drop out.
pub fn relink(tree: &LogicTree, model: &mut SyntaxModel) {
    for root in &tree.roots {
        relink_nodes(&root.children, model);
    }
}

fn relink_nodes(nodes: &[LogicNode], model: &mut SyntaxModel) {
    for node in nodes {
        if node.is_rule() {
            if let Some(syntax_id) = node.metadata.syntax {
                let owns_children = model.node(syntax_id).is_some_and(|syntax| match &syntax.kind {
                    SyntaxKind::SelectorRule { .. } => true,
                    SyntaxKind::AtRule { block, .. } => *block == AtRuleBlock::Nested,
                    SyntaxKind::Declaration { .. } => false,
                });
                if owns_children {
                    let children: Vec<SyntaxId> = node
                        .children
                        .iter()
                        .filter_map(|child| child.metadata.syntax)
                        .filter(|id| model.contains(*id))
                        .collect();
                    model.set_children(syntax_id, children);
                }
            }
        }
        relink_nodes(&node.children, model);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::html::HtmlDocument;
    use crate::logic::{LogicKind, LogicTreeBuilder};
    use crate::syntax::{SheetWarningKind, SyntaxModelBuilder};
    use crate::types::IdGenerator;

    const PAGE: &str = "<html><head>\
        <style id='main'>.a { color: red; margin: 0; }</style>\
        <style id='theme' data-location='internal' data-readonly='true'>.t { color: red; }</style>\
        <style id='extra'>.e { top: 0; }</style>\
        </head><body><p class='a'></p></body></html>";

    struct Session {
        doc: HtmlDocument,
        model: SyntaxModel,
        tree: LogicTree,
        ids: IdGenerator,
    }

    fn session() -> Session {
        let doc = HtmlDocument::parse(PAGE);
        let (model, _) = SyntaxModelBuilder::new().build(&doc.stylesheets());
        let mut ids = IdGenerator::new();
        let tree = LogicTreeBuilder::build(&model, &mut ids);
        Session { doc, model, tree, ids }
    }

    fn first_selector(tree: &LogicTree, label: &str) -> crate::types::LogicId {
        tree.selectors()
            .into_iter()
            .find(|entry| entry.node.label == label)
            .map(|entry| entry.node.id)
            .expect("selector present")
    }

    fn all_ids(nodes: &[LogicNode], out: &mut Vec<crate::types::LogicId>) {
        for node in nodes {
            out.push(node.id);
            all_ids(&node.children, out);
        }
    }

    #[test]
    fn light_sync_keeps_identities_and_writes_new_text() {
        let mut s = session();
        let rule = first_selector(&s.tree, ".a");
        let decl = s.tree.find(rule).expect("rule").children[0].clone();
        let syntax_id = decl.metadata.syntax.expect("backed");
        if let Some(node) = s.model.node_mut(syntax_id) {
            node.kind = SyntaxKind::Declaration {
                property: "color".to_string(),
                value: "blue".to_string(),
                important: false,
            };
        }
        s.tree.find_mut(decl.id).expect("decl").value = Some("blue".to_string());

        let mut before = Vec::new();
        all_ids(&s.tree.roots, &mut before);
        let report = TreeSynchronizer::new().light_sync(&s.tree, &mut s.model, &mut s.doc);
        let mut after = Vec::new();
        all_ids(&s.tree.roots, &mut after);

        assert_eq!(before, after);
        assert!(!report.rebuild_required);
        assert!(report.is_clean());
        assert_eq!(
            s.doc.style_text("main").as_deref(),
            Some(".a {\n  color: blue;\n  margin: 0;\n}\n")
        );
    }

    #[test]
    fn editing_one_rule_keeps_other_rules_as_written() {
        let mut doc = HtmlDocument::parse(
            "<html><head><style id='main'>.a { color: blue; width: banana; *zoom: 1; background: rgba(0,0,0,0.5); }\n.b { top: 0; }</style></head><body></body></html>",
        );
        let (mut model, report) = SyntaxModelBuilder::new().build(&doc.stylesheets());
        assert!(report.warnings.iter().any(|w| w.kind == SheetWarningKind::Recovered));
        let mut ids = IdGenerator::new();
        let tree = LogicTreeBuilder::build(&model, &mut ids);

        let rule = first_selector(&tree, ".b");
        let decl = tree.find(rule).expect("rule").children[0].clone();
        if let Some(node) = decl.metadata.syntax.and_then(|id| model.node_mut(id)) {
            node.kind = SyntaxKind::Declaration {
                property: "top".to_string(),
                value: "1px".to_string(),
                important: false,
            };
        }
        let report = TreeSynchronizer::new().light_sync(&tree, &mut model, &mut doc);
        assert!(report.is_clean());
        assert_eq!(
            doc.style_text("main").as_deref(),
            Some(".a {\n  color: blue;\n  width: banana;\n  *zoom: 1;\n  background: rgba(0,0,0,0.5);\n}\n.b {\n  top: 1px;\n}\n")
        );
    }

    #[test]
    fn light_sync_follows_logic_child_order() {
        let mut s = session();
        let rule = first_selector(&s.tree, ".a");
        s.tree.find_mut(rule).expect("rule").children.reverse();
        TreeSynchronizer::new().light_sync(&s.tree, &mut s.model, &mut s.doc);
        assert_eq!(
            s.doc.style_text("main").as_deref(),
            Some(".a {\n  margin: 0;\n  color: red;\n}\n")
        );
    }

    #[test]
    fn full_sync_surfaces_new_rules_after_rebuild() {
        let mut s = session();
        let before: Vec<String> = s.tree.selectors().iter().map(|e| e.node.label.clone()).collect();
        assert!(!before.contains(&".new".to_string()));

        let syntax = s.model.create(
            SyntaxKind::SelectorRule {
                selector: ".new".to_string(),
            },
            Origin::OnPage,
            "main",
            false,
        );
        let node = s.model.node(syntax).expect("created").clone();
        let logic = LogicNode::from_syntax(&node, &mut s.ids);
        s.tree
            .find_or_create_file(Origin::OnPage, "main", false, &mut s.ids)
            .children
            .push(logic);

        let report = TreeSynchronizer::new().full_sync(&s.tree, &mut s.model, &mut s.doc);
        assert!(report.rebuild_required);
        assert!(report.written.contains(&(Origin::OnPage, "main".to_string())));

        let (model, _) = SyntaxModelBuilder::new().build(&s.doc.stylesheets());
        let rebuilt = LogicTreeBuilder::build(&model, &mut s.ids);
        let entry = rebuilt
            .selectors()
            .into_iter()
            .find(|entry| entry.node.label == ".new")
            .map(|entry| entry.node.kind.clone());
        assert_eq!(entry, Some(LogicKind::Selector));
    }

    #[test]
    fn readonly_files_are_never_written() {
        let mut s = session();
        let rule = first_selector(&s.tree, ".t");
        s.tree.find_mut(rule).expect("rule").children.clear();
        let report = TreeSynchronizer::new().full_sync(&s.tree, &mut s.model, &mut s.doc);
        assert_eq!(report.skipped_readonly, vec![(Origin::Internal, "theme".to_string())]);
        assert_eq!(s.doc.style_text("theme").as_deref(), Some(".t { color: red; }"));
    }

    #[test]
    fn serialization_failure_leaves_that_file_alone() {
        let mut s = session();
        let rule = first_selector(&s.tree, ".e");
        let syntax = s.tree.find(rule).and_then(|node| node.metadata.syntax).expect("backed");
        s.model.remove_subtree(syntax);

        let report = TreeSynchronizer::new().light_sync(&s.tree, &mut s.model, &mut s.doc);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].source_name, "extra");
        assert_eq!(s.doc.style_text("extra").as_deref(), Some(".e { top: 0; }"));
        assert!(report.written.contains(&(Origin::OnPage, "main".to_string())));
        assert_eq!(render_file(&s.tree, &s.model, Origin::OnPage, "extra"), "");
        assert_eq!(
            render_file(&s.tree, &s.model, Origin::OnPage, "main"),
            ".a {\n  color: red;\n  margin: 0;\n}\n"
        );
    }
}
