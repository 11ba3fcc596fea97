//! Structural and declaration edits over the Logic Tree and Syntax Model.
//!
//! Every operation mutates both trees in step and returns an [`EditOutcome`]
//! naming the node it touched and the sync the caller must run afterwards.
//! Nothing here writes to the document.

use crate::cascade::{ElementGroup, RuleUid};
use crate::error::InspectorError;
use crate::inline::{DeclarationField, disabled_name, normalize_property_name};
use crate::logic::{LogicKind, LogicNode, LogicTree, at_rule_label};
use crate::selector::selector_specificity;
use crate::syntax::{
    AtRuleBlock, SyntaxKind, SyntaxModel, parse_at_rule_prelude, parse_declaration_value,
    parse_selector,
};
use crate::sync::SyncMode;
use crate::types::{IdGenerator, LogicId, Origin, PseudoState, SyntaxId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EditOutcome {
    /// Created or edited node. For deletions, the node that was removed.
    pub node: LogicId,
    pub sync: SyncMode,
}

impl EditOutcome {
    fn light(node: LogicId) -> Self {
        Self {
            node,
            sync: SyncMode::Light,
        }
    }

    fn full(node: LogicId) -> Self {
        Self {
            node,
            sync: SyncMode::Full,
        }
    }
}

/// Conditional at-rules a rule can be wrapped in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AtRuleKind {
    Media,
    Supports,
    Container,
}

impl AtRuleKind {
    pub fn name(self) -> &'static str {
        match self {
            AtRuleKind::Media => "media",
            AtRuleKind::Supports => "supports",
            AtRuleKind::Container => "container",
        }
    }

    pub fn default_prelude(self) -> &'static str {
        match self {
            AtRuleKind::Media => "(min-width: 0px)",
            AtRuleKind::Supports => "(display: block)",
            AtRuleKind::Container => "(min-width: 0px)",
        }
    }
}

fn not_found(id: LogicId) -> InspectorError {
    InspectorError::NodeNotFound(id.to_string())
}

fn editable(tree: &LogicTree, id: LogicId) -> Result<&LogicNode, InspectorError> {
    let node = tree.find(id).ok_or_else(|| not_found(id))?;
    if node.metadata.readonly {
        return Err(InspectorError::ReadOnly(node.label.clone()));
    }
    Ok(node)
}

fn backing(node: &LogicNode, model: &SyntaxModel) -> Result<SyntaxId, InspectorError> {
    node.metadata
        .syntax
        .filter(|id| model.contains(*id))
        .ok_or_else(|| InspectorError::NodeNotFound(format!("syntax node behind {}", node.id)))
}

/// Re-points a rule's syntax children at its Logic Tree children.
fn relink_rule(tree: &LogicTree, model: &mut SyntaxModel, rule_id: LogicId) {
    let Some(rule) = tree.find(rule_id) else {
        return;
    };
    let Some(syntax_id) = rule.metadata.syntax else {
        return;
    };
    let children = rule
        .children
        .iter()
        .filter_map(|child| child.metadata.syntax)
        .filter(|id| model.contains(*id))
        .collect();
    model.set_children(syntax_id, children);
}

/// Appends an empty rule to the end of `source_name`, creating the origin
/// root and the file node when missing.
pub fn add_rule(
    tree: &mut LogicTree,
    model: &mut SyntaxModel,
    ids: &mut IdGenerator,
    selector: &str,
    origin: Origin,
    source_name: &str,
) -> Result<EditOutcome, InspectorError> {
    if origin == Origin::Inline {
        return Err(InspectorError::UnsupportedEdit(
            "inline styles hold declarations, not rules".to_string(),
        ));
    }
    let source_name = source_name.trim();
    if source_name.is_empty() {
        return Err(InspectorError::UnsupportedEdit("source name is empty".to_string()));
    }
    if let Some(file) = tree.find_file(origin, source_name) {
        if file.metadata.readonly {
            return Err(InspectorError::ReadOnly(file.label.clone()));
        }
    }
    let selector = parse_selector(selector)?;

    let syntax_id = model.create(SyntaxKind::SelectorRule { selector }, origin, source_name, false);
    model.push_top_level(syntax_id);
    let node = model
        .node(syntax_id)
        .ok_or_else(|| InspectorError::NodeNotFound(syntax_id.to_string()))?;
    let logic = LogicNode::from_syntax(node, ids);
    let id = logic.id;
    tree.find_or_create_file(origin, source_name, false, ids)
        .children
        .push(logic);
    Ok(EditOutcome::full(id))
}

/// Removes a selector or at-rule together with everything nested in it.
pub fn delete_rule(
    tree: &mut LogicTree,
    model: &mut SyntaxModel,
    id: LogicId,
) -> Result<EditOutcome, InspectorError> {
    let node = editable(tree, id)?;
    if !node.is_rule() {
        return Err(InspectorError::UnsupportedEdit(format!("{} is not a rule", node.label)));
    }
    let syntax = node.metadata.syntax;
    tree.remove(id).ok_or_else(|| not_found(id))?;
    if let Some(syntax_id) = syntax {
        model.remove_subtree(syntax_id);
    }
    Ok(EditOutcome::full(id))
}

/// Puts a new conditional at-rule where the rule was and moves the rule
/// inside it. The returned node is the new at-rule.
pub fn wrap_in_at_rule(
    tree: &mut LogicTree,
    model: &mut SyntaxModel,
    ids: &mut IdGenerator,
    rule_id: LogicId,
    kind: AtRuleKind,
    prelude: Option<&str>,
) -> Result<EditOutcome, InspectorError> {
    let node = editable(tree, rule_id)?;
    if !node.is_rule() {
        return Err(InspectorError::UnsupportedEdit(format!("{} is not a rule", node.label)));
    }
    let rule_syntax = backing(node, model)?;
    let origin = node.metadata.origin;
    let source_name = node.metadata.source_name.clone();
    let parent_id = tree
        .find_parent(rule_id)
        .map(|parent| parent.id)
        .ok_or_else(|| not_found(rule_id))?;
    let prelude = parse_at_rule_prelude(kind.name(), prelude.unwrap_or(kind.default_prelude()))?;

    let wrapper = model.create(
        SyntaxKind::AtRule {
            name: kind.name().to_string(),
            prelude,
            block: AtRuleBlock::Nested,
        },
        origin,
        &source_name,
        false,
    );
    // Must run before the rule becomes the wrapper's child.
    model.replace_in_container(rule_syntax, wrapper);
    model.set_children(wrapper, vec![rule_syntax]);
    let mut logic = LogicNode::from_syntax(
        model
            .node(wrapper)
            .ok_or_else(|| InspectorError::NodeNotFound(wrapper.to_string()))?,
        ids,
    );
    let wrapper_id = logic.id;

    let parent = tree.find_mut(parent_id).ok_or_else(|| not_found(parent_id))?;
    let pos = parent
        .children
        .iter()
        .position(|child| child.id == rule_id)
        .ok_or_else(|| not_found(rule_id))?;
    logic.children.push(parent.children.remove(pos));
    parent.children.insert(pos, logic);
    Ok(EditOutcome::full(wrapper_id))
}

pub fn update_selector(
    tree: &mut LogicTree,
    model: &mut SyntaxModel,
    rule_id: LogicId,
    text: &str,
) -> Result<EditOutcome, InspectorError> {
    let node = editable(tree, rule_id)?;
    if !node.is_selector() {
        return Err(InspectorError::UnsupportedEdit(format!("{} is not a selector rule", node.label)));
    }
    let syntax_id = backing(node, model)?;
    let selector = parse_selector(text)?;

    if let Some(syntax) = model.node_mut(syntax_id) {
        syntax.kind = SyntaxKind::SelectorRule {
            selector: selector.clone(),
        };
    }
    let node = tree.find_mut(rule_id).ok_or_else(|| not_found(rule_id))?;
    node.metadata.specificity = Some(selector_specificity(&selector));
    node.label = selector;
    Ok(EditOutcome::full(rule_id))
}

/// Replaces the prelude of `@media`, `@supports`, `@container`, `@layer`
/// or `@scope`.
pub fn update_at_rule_condition(
    tree: &mut LogicTree,
    model: &mut SyntaxModel,
    id: LogicId,
    text: &str,
) -> Result<EditOutcome, InspectorError> {
    let node = editable(tree, id)?;
    let Some((name, _)) = node.condition() else {
        return Err(InspectorError::UnsupportedEdit(format!("{} is not an at-rule", node.label)));
    };
    let name = name.to_string();
    let syntax_id = backing(node, model)?;
    let prelude = parse_at_rule_prelude(&name, text)?;

    if let Some(SyntaxKind::AtRule { prelude: current, .. }) =
        model.node_mut(syntax_id).map(|syntax| &mut syntax.kind)
    {
        *current = prelude.clone();
    }
    let node = tree.find_mut(id).ok_or_else(|| not_found(id))?;
    node.label = at_rule_label(&name, &prelude);
    node.kind = LogicKind::AtRule { name, prelude };
    Ok(EditOutcome::light(id))
}

/// Adds a declaration after the rule's last declaration.
pub fn add_declaration(
    tree: &mut LogicTree,
    model: &mut SyntaxModel,
    ids: &mut IdGenerator,
    rule_id: LogicId,
    property: &str,
    value: &str,
) -> Result<EditOutcome, InspectorError> {
    let rule = editable(tree, rule_id)?;
    if !rule.is_selector() {
        return Err(InspectorError::UnsupportedEdit(format!(
            "{} cannot hold declarations",
            rule.label
        )));
    }
    backing(rule, model)?;
    let origin = rule.metadata.origin;
    let source_name = rule.metadata.source_name.clone();
    let (property, value) = parse_declaration_value(property, value)?;

    let syntax_id = model.create(
        SyntaxKind::Declaration {
            property,
            value,
            important: false,
        },
        origin,
        &source_name,
        false,
    );
    let logic = LogicNode::from_syntax(
        model
            .node(syntax_id)
            .ok_or_else(|| InspectorError::NodeNotFound(syntax_id.to_string()))?,
        ids,
    );
    let id = logic.id;
    let rule = tree.find_mut(rule_id).ok_or_else(|| not_found(rule_id))?;
    let pos = rule
        .children
        .iter()
        .rposition(|child| child.is_declaration())
        .map_or(0, |last| last + 1);
    rule.children.insert(pos, logic);
    relink_rule(tree, model, rule_id);
    Ok(EditOutcome::light(id))
}

fn declaration_parts(
    model: &SyntaxModel,
    syntax_id: SyntaxId,
) -> Result<(String, String, bool), InspectorError> {
    match model.node(syntax_id).map(|node| &node.kind) {
        Some(SyntaxKind::Declaration {
            property,
            value,
            important,
        }) => Ok((property.clone(), value.clone(), *important)),
        _ => Err(InspectorError::UnsupportedEdit(format!("{} is not a declaration", syntax_id))),
    }
}

fn editable_declaration(
    tree: &LogicTree,
    model: &SyntaxModel,
    id: LogicId,
) -> Result<(SyntaxId, String, String, bool), InspectorError> {
    let node = editable(tree, id)?;
    if !node.is_declaration() {
        return Err(InspectorError::UnsupportedEdit(format!("{} is not a declaration", node.label)));
    }
    let syntax_id = backing(node, model)?;
    let (property, value, important) = declaration_parts(model, syntax_id)?;
    Ok((syntax_id, property, value, important))
}

fn write_declaration(
    tree: &mut LogicTree,
    model: &mut SyntaxModel,
    id: LogicId,
    syntax_id: SyntaxId,
    property: String,
    value: String,
    important: bool,
) -> Result<(), InspectorError> {
    let node = tree.find_mut(id).ok_or_else(|| not_found(id))?;
    node.label = property.clone();
    node.value = Some(value.clone());
    node.kind = LogicKind::Declaration { important };
    if let Some(syntax) = model.node_mut(syntax_id) {
        syntax.kind = SyntaxKind::Declaration {
            property,
            value,
            important,
        };
    }
    Ok(())
}

fn is_property_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_')
}

/// Renames a declaration or replaces its value. A rename keeps the disabled
/// prefix. A value the property grammar rejects is parked as
/// `--disabled-<prop>` so the text survives.
pub fn update_declaration(
    tree: &mut LogicTree,
    model: &mut SyntaxModel,
    id: LogicId,
    field: DeclarationField,
    text: &str,
) -> Result<EditOutcome, InspectorError> {
    let (syntax_id, property, value, important) = editable_declaration(tree, model, id)?;
    let text = text.trim();
    let (name, value) = match field {
        DeclarationField::Property => {
            if !is_property_name(text) {
                return Err(InspectorError::InvalidDeclaration(format!(
                    "`{}` is not a property name",
                    text
                )));
            }
            let (renamed, _) = normalize_property_name(text);
            let (_, disabled) = normalize_property_name(&property);
            let name = if disabled { disabled_name(&renamed) } else { renamed };
            (name, value)
        }
        DeclarationField::Value => {
            if text.is_empty() || text.contains(['{', '}', ';']) {
                return Err(InspectorError::InvalidDeclaration(format!("{}: {}", property, text)));
            }
            (property, text.to_string())
        }
    };

    let (name, value, important) = match parse_declaration_value(&name, &value) {
        Ok((name, value)) => (name, value, important),
        Err(_) => {
            let parked = disabled_name(&normalize_property_name(&name).0);
            log::warn!("rejected {}: {}; preserving as {}", name, value, parked);
            (parked, value, important)
        }
    };
    write_declaration(tree, model, id, syntax_id, name, value, important)?;
    Ok(EditOutcome::light(id))
}

/// Flips a declaration between active and `--disabled-` form.
pub fn toggle_declaration(
    tree: &mut LogicTree,
    model: &mut SyntaxModel,
    id: LogicId,
) -> Result<EditOutcome, InspectorError> {
    let (syntax_id, property, value, important) = editable_declaration(tree, model, id)?;
    let (name, disabled) = normalize_property_name(&property);
    let property = if disabled { name } else { disabled_name(&name) };
    write_declaration(tree, model, id, syntax_id, property, value, important)?;
    Ok(EditOutcome::light(id))
}

pub fn set_declaration_important(
    tree: &mut LogicTree,
    model: &mut SyntaxModel,
    id: LogicId,
    important: bool,
) -> Result<EditOutcome, InspectorError> {
    let (syntax_id, property, value, _) = editable_declaration(tree, model, id)?;
    write_declaration(tree, model, id, syntax_id, property, value, important)?;
    Ok(EditOutcome::light(id))
}

pub fn delete_declaration(
    tree: &mut LogicTree,
    model: &mut SyntaxModel,
    id: LogicId,
) -> Result<EditOutcome, InspectorError> {
    let (syntax_id, ..) = editable_declaration(tree, model, id)?;
    let rule_id = tree.find_parent(id).map(|parent| parent.id);
    tree.remove(id).ok_or_else(|| not_found(id))?;
    model.remove_subtree(syntax_id);
    if let Some(rule_id) = rule_id {
        relink_rule(tree, model, rule_id);
    }
    Ok(EditOutcome::light(id))
}

/// Selector for `state` on the base of `selector` (the text before its
/// first `:`), and the target rule already carrying it, if any.
pub fn pseudo_state_rule(
    groups: &[ElementGroup],
    selector: &str,
    state: PseudoState,
) -> (String, Option<RuleUid>) {
    let base = selector.split(':').next().unwrap_or(selector).trim();
    let wanted = format!("{}:{}", base, state.name());
    let existing = groups
        .iter()
        .filter(|group| group.is_target)
        .flat_map(|group| group.rules.iter())
        .find(|rule| rule.selector == wanted)
        .map(|rule| rule.uid);
    (wanted, existing)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cascade::CascadeMatcher;
    use crate::document::{StyleDocument, ViewportEnvironment};
    use crate::html::HtmlDocument;
    use crate::logic::LogicTreeBuilder;
    use crate::selector::Specificity;
    use crate::sync::{TreeSynchronizer, render_file};
    use crate::syntax::SyntaxModelBuilder;
    use crate::types::ForcedPseudoStates;

    const PAGE: &str = "<html><head>\
        <style id='main'>.a { color: red; margin: 0; }\n.b { top: 0; }</style>\
        <style id='theme' data-location='internal' data-readonly='true'>.t { color: red; }</style>\
        </head><body><p class='a'></p></body></html>";

    struct Session {
        doc: HtmlDocument,
        model: SyntaxModel,
        tree: LogicTree,
        ids: IdGenerator,
    }

    impl Session {
        fn new() -> Self {
            let doc = HtmlDocument::parse(PAGE);
            let (model, _) = SyntaxModelBuilder::new().build(&doc.stylesheets());
            let mut ids = IdGenerator::new();
            let tree = LogicTreeBuilder::build(&model, &mut ids);
            Session { doc, model, tree, ids }
        }

        fn selector(&self, label: &str) -> LogicId {
            self.tree
                .selectors()
                .into_iter()
                .find(|entry| entry.node.label == label)
                .map(|entry| entry.node.id)
                .expect("selector present")
        }

        fn declaration(&self, rule: LogicId, label: &str) -> LogicId {
            self.tree
                .find(rule)
                .and_then(|node| node.children.iter().find(|child| child.label == label))
                .map(|child| child.id)
                .expect("declaration present")
        }

        fn main_css(&self) -> String {
            render_file(&self.tree, &self.model, Origin::OnPage, "main")
        }
    }

    #[test]
    fn add_rule_creates_missing_root_and_file() {
        let mut s = Session::new();
        assert!(s.tree.find_file(Origin::External, "extra.css").is_none());
        let outcome = add_rule(
            &mut s.tree,
            &mut s.model,
            &mut s.ids,
            " .new >  p ",
            Origin::External,
            "extra.css",
        )
        .expect("rule added");
        assert_eq!(outcome.sync, SyncMode::Full);

        let file = s.tree.find_file(Origin::External, "extra.css").expect("file created");
        assert_eq!(file.children.len(), 1);
        assert_eq!(file.children[0].id, outcome.node);
        assert_eq!(file.children[0].label, ".new > p");
        assert_eq!(s.tree.roots[0].metadata.origin, Origin::External);
        assert_eq!(
            render_file(&s.tree, &s.model, Origin::External, "extra.css"),
            ".new > p {\n}\n"
        );
    }

    #[test]
    fn add_rule_rejects_bad_input() {
        let mut s = Session::new();
        let err = add_rule(&mut s.tree, &mut s.model, &mut s.ids, "a[", Origin::OnPage, "main");
        assert!(matches!(err, Err(InspectorError::InvalidSelector(_))));
        let err = add_rule(&mut s.tree, &mut s.model, &mut s.ids, "a", Origin::Inline, "main");
        assert!(matches!(err, Err(InspectorError::UnsupportedEdit(_))));
        let err = add_rule(&mut s.tree, &mut s.model, &mut s.ids, "a", Origin::Internal, "theme");
        assert!(matches!(err, Err(InspectorError::ReadOnly(_))));
    }

    #[test]
    fn delete_rule_drops_both_trees() {
        let mut s = Session::new();
        let rule = s.selector(".a");
        let syntax = s.tree.find(rule).and_then(|node| node.metadata.syntax).expect("backed");
        let before = s.model.len();
        let outcome = delete_rule(&mut s.tree, &mut s.model, rule).expect("deleted");
        assert_eq!(outcome.sync, SyncMode::Full);
        assert!(s.tree.find(rule).is_none());
        assert!(!s.model.contains(syntax));
        assert_eq!(s.model.len(), before - 3);
        assert_eq!(s.main_css(), ".b {\n  top: 0;\n}\n");

        let decl = s.declaration(s.selector(".b"), "top");
        assert!(matches!(
            delete_rule(&mut s.tree, &mut s.model, decl),
            Err(InspectorError::UnsupportedEdit(_))
        ));
    }

    #[test]
    fn wrap_keeps_position_and_nests_the_rule() {
        let mut s = Session::new();
        let rule = s.selector(".a");
        let outcome = wrap_in_at_rule(
            &mut s.tree,
            &mut s.model,
            &mut s.ids,
            rule,
            AtRuleKind::Media,
            Some("(min-width: 600px)"),
        )
        .expect("wrapped");
        assert_eq!(outcome.sync, SyncMode::Full);

        let file = s.tree.find_file(Origin::OnPage, "main").expect("file");
        assert_eq!(file.children[0].id, outcome.node);
        assert_eq!(file.children[0].label, "@media (min-width: 600px)");
        assert_eq!(file.children[0].children[0].id, rule);
        assert_eq!(file.children[1].label, ".b");
        assert_eq!(
            s.main_css(),
            "@media (min-width: 600px) {\n  .a {\n    color: red;\n    margin: 0;\n  }\n}\n.b {\n  top: 0;\n}\n"
        );
        assert_eq!(s.model.top_level().len(), 3);

        let entry = s
            .tree
            .selectors()
            .into_iter()
            .find(|entry| entry.node.id == rule)
            .expect("still reachable");
        assert_eq!(entry.at_rules.len(), 1);
    }

    #[test]
    fn wrap_uses_default_prelude_and_rejects_bad_conditions() {
        let mut s = Session::new();
        let rule = s.selector(".b");
        let outcome = wrap_in_at_rule(&mut s.tree, &mut s.model, &mut s.ids, rule, AtRuleKind::Supports, None)
            .expect("wrapped");
        let wrapper = s.tree.find(outcome.node).expect("wrapper");
        assert_eq!(wrapper.condition(), Some(("supports", "(display: block)")));

        let rule = s.selector(".a");
        let err = wrap_in_at_rule(
            &mut s.tree,
            &mut s.model,
            &mut s.ids,
            rule,
            AtRuleKind::Media,
            Some("(min-width: 1px) { x"),
        );
        assert!(err.is_err());
        assert_eq!(s.tree.find_parent(rule).map(|p| p.kind.clone()), Some(LogicKind::File));
    }

    #[test]
    fn update_selector_recomputes_specificity() {
        let mut s = Session::new();
        let rule = s.selector(".a");
        let outcome = update_selector(&mut s.tree, &mut s.model, rule, "#main .a").expect("updated");
        assert_eq!(outcome.sync, SyncMode::Full);
        let node = s.tree.find(rule).expect("rule");
        assert_eq!(node.label, "#main .a");
        assert_eq!(node.metadata.specificity, Some(Specificity(0, 1, 1, 0)));
        assert!(s.main_css().starts_with("#main .a {\n"));

        assert!(update_selector(&mut s.tree, &mut s.model, rule, "}").is_err());
        assert_eq!(s.tree.find(rule).expect("rule").label, "#main .a");
    }

    #[test]
    fn at_rule_condition_edits_are_light() {
        let mut s = Session::new();
        let rule = s.selector(".a");
        let wrapper = wrap_in_at_rule(&mut s.tree, &mut s.model, &mut s.ids, rule, AtRuleKind::Media, None)
            .expect("wrapped")
            .node;
        let outcome =
            update_at_rule_condition(&mut s.tree, &mut s.model, wrapper, "print").expect("updated");
        assert_eq!(outcome.sync, SyncMode::Light);
        let node = s.tree.find(wrapper).expect("at-rule");
        assert_eq!(node.label, "@media print");
        assert!(s.main_css().starts_with("@media print {\n"));

        assert!(matches!(
            update_at_rule_condition(&mut s.tree, &mut s.model, rule, "print"),
            Err(InspectorError::UnsupportedEdit(_))
        ));
    }

    #[test]
    fn declaration_lifecycle() {
        let mut s = Session::new();
        let rule = s.selector(".b");
        let added = add_declaration(&mut s.tree, &mut s.model, &mut s.ids, rule, "--new-property", "inherit")
            .expect("added");
        assert_eq!(added.sync, SyncMode::Light);
        assert_eq!(s.main_css().lines().nth(6), Some("  --new-property: inherit;"));

        update_declaration(&mut s.tree, &mut s.model, added.node, DeclarationField::Property, "Color")
            .expect("renamed");
        update_declaration(&mut s.tree, &mut s.model, added.node, DeclarationField::Value, "#ff0000")
            .expect("value set");
        set_declaration_important(&mut s.tree, &mut s.model, added.node, true).expect("important");
        assert_eq!(
            s.main_css(),
            ".a {\n  color: red;\n  margin: 0;\n}\n.b {\n  top: 0;\n  color: #ff0000 !important;\n}\n"
        );

        let toggled = toggle_declaration(&mut s.tree, &mut s.model, added.node).expect("toggled");
        assert_eq!(toggled.sync, SyncMode::Light);
        assert_eq!(s.tree.find(added.node).map(|n| n.label.as_str()), Some("--disabled-color"));
        update_declaration(&mut s.tree, &mut s.model, added.node, DeclarationField::Property, "background")
            .expect("renamed while disabled");
        assert_eq!(s.tree.find(added.node).map(|n| n.label.as_str()), Some("--disabled-background"));
        toggle_declaration(&mut s.tree, &mut s.model, added.node).expect("toggled back");
        assert_eq!(s.tree.find(added.node).map(|n| n.label.as_str()), Some("background"));

        delete_declaration(&mut s.tree, &mut s.model, added.node).expect("deleted");
        assert_eq!(s.main_css(), ".a {\n  color: red;\n  margin: 0;\n}\n.b {\n  top: 0;\n}\n");
        assert!(s.tree.find(added.node).is_none());
    }

    #[test]
    fn rejected_values_are_parked_as_disabled() {
        let mut s = Session::new();
        let rule = s.selector(".a");
        let margin = s.declaration(rule, "margin");
        set_declaration_important(&mut s.tree, &mut s.model, margin, true).expect("important");
        update_declaration(&mut s.tree, &mut s.model, margin, DeclarationField::Value, "banana")
            .expect("parked");
        let node = s.tree.find(margin).expect("declaration");
        assert_eq!(node.label, "--disabled-margin");
        assert_eq!(node.value.as_deref(), Some("banana"));
        assert_eq!(node.kind, LogicKind::Declaration { important: true });

        toggle_declaration(&mut s.tree, &mut s.model, margin).expect("re-enabled");
        let node = s.tree.find(margin).expect("declaration");
        assert_eq!(node.label, "margin");
        assert_eq!(node.kind, LogicKind::Declaration { important: true });
        assert!(s.main_css().contains("  margin: banana !important;\n"));

        assert!(update_declaration(&mut s.tree, &mut s.model, margin, DeclarationField::Value, "0; x: y").is_err());
        assert!(
            update_declaration(&mut s.tree, &mut s.model, margin, DeclarationField::Property, "a: b").is_err()
        );
    }

    #[test]
    fn light_edits_keep_identities_through_sync() {
        let mut s = Session::new();
        let rule = s.selector(".a");
        let color = s.declaration(rule, "color");
        let outcome = update_declaration(&mut s.tree, &mut s.model, color, DeclarationField::Value, "blue")
            .expect("updated");
        let before = s.tree.clone();
        let report = TreeSynchronizer::new().sync(outcome.sync, &s.tree, &mut s.model, &mut s.doc);
        assert!(report.is_clean());
        assert_eq!(s.tree, before);
        assert_eq!(
            s.doc.style_text("main").as_deref(),
            Some(".a {\n  color: blue;\n  margin: 0;\n}\n.b {\n  top: 0;\n}\n")
        );
    }

    #[test]
    fn readonly_targets_are_refused() {
        let mut s = Session::new();
        let rule = s.selector(".t");
        let decl = s.declaration(rule, "color");
        assert!(matches!(
            update_selector(&mut s.tree, &mut s.model, rule, ".u"),
            Err(InspectorError::ReadOnly(_))
        ));
        assert!(matches!(
            delete_rule(&mut s.tree, &mut s.model, rule),
            Err(InspectorError::ReadOnly(_))
        ));
        assert!(matches!(
            add_declaration(&mut s.tree, &mut s.model, &mut s.ids, rule, "top", "0"),
            Err(InspectorError::ReadOnly(_))
        ));
        assert!(matches!(
            toggle_declaration(&mut s.tree, &mut s.model, decl),
            Err(InspectorError::ReadOnly(_))
        ));
        assert!(matches!(
            delete_declaration(&mut s.tree, &mut s.model, LogicId(9999)),
            Err(InspectorError::NodeNotFound(_))
        ));
    }

    #[test]
    fn pseudo_state_rule_finds_existing_target_rules() {
        let doc = HtmlDocument::parse(
            "<html><head><style>a { color: red; }\na:hover { color: blue; }</style></head>\
             <body><a id='x'>x</a></body></html>",
        );
        let (model, _) = SyntaxModelBuilder::new().build(&doc.stylesheets());
        let tree = LogicTreeBuilder::build(&model, &mut IdGenerator::new());
        let env = ViewportEnvironment::screen();
        let target = doc.select_first("#x").expect("target");

        let plain = CascadeMatcher::new(&tree, &env).find(&target);
        let (selector, existing) = pseudo_state_rule(&plain, "a", PseudoState::Focus);
        assert_eq!(selector, "a:focus");
        assert_eq!(existing, None);

        let forced = CascadeMatcher::new(&tree, &env)
            .forced(ForcedPseudoStates::new().with(PseudoState::Hover))
            .find(&target);
        let (selector, existing) = pseudo_state_rule(&forced, "a:focus", PseudoState::Hover);
        assert_eq!(selector, "a:hover");
        let hover = tree
            .selectors()
            .into_iter()
            .find(|entry| entry.node.label == "a:hover")
            .map(|entry| RuleUid::Logic(entry.node.id));
        assert_eq!(existing, hover);
    }
}
