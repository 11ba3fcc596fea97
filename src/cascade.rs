use std::fmt;

use crate::debug::DebugLogger;
use crate::document::{Environment, InspectElement, declaration_supported};
use crate::inline::{InlineDeclarationParser, normalize_property_name};
use crate::logic::{LogicKind, LogicNode, LogicTree, SelectorEntry};
use crate::selector::{
    Specificity, dynamic_states, selector_specificity, split_selector_list, strip_pseudos,
};
use crate::types::{ForcedPseudoStates, LogicId, Origin, Viewport};

/// Properties whose computed value passes from parent to child.
pub const INHERITED_PROPERTIES: &[&str] = &[
    "color",
    "font",
    "font-family",
    "font-size",
    "font-weight",
    "font-style",
    "font-variant",
    "line-height",
    "letter-spacing",
    "text-align",
    "text-indent",
    "text-transform",
    "white-space",
    "word-spacing",
    "text-shadow",
    "list-style",
    "list-style-type",
    "list-style-position",
    "list-style-image",
    "visibility",
    "cursor",
    "quotes",
    "border-collapse",
    "border-spacing",
    "caption-side",
    "pointer-events",
    "speak",
    "direction",
    "writing-mode",
];

pub const DEFAULT_STOP_TAGS: [&str; 2] = ["body", "html"];
pub const SELECTED_RULE_LABEL: &str = "Selected Rule";

pub fn is_inherited_property(prop: &str) -> bool {
    prop.starts_with("--") || INHERITED_PROPERTIES.contains(&prop)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuleUid {
    Logic(LogicId),
    InlineTarget,
    /// Inline rule of the ancestor this many levels above the target.
    InlineAncestor(usize),
}

impl RuleUid {
    pub fn logic_id(&self) -> Option<LogicId> {
        match self {
            RuleUid::Logic(id) => Some(*id),
            _ => None,
        }
    }

    pub fn is_inline(&self) -> bool {
        !matches!(self, RuleUid::Logic(_))
    }
}

impl fmt::Display for RuleUid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleUid::Logic(id) => write!(f, "{}", id),
            RuleUid::InlineTarget => f.write_str("inline-target"),
            RuleUid::InlineAncestor(depth) => write!(f, "inline-parent-{}", depth),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeclarationId {
    Logic(LogicId),
    Inline(usize),
}

impl fmt::Display for DeclarationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeclarationId::Logic(id) => write!(f, "{}", id),
            DeclarationId::Inline(idx) => write!(f, "inline-decl-{}", idx),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchedDeclaration {
    pub id: DeclarationId,
    pub prop: String,
    pub value: String,
    pub important: bool,
    pub disabled: bool,
    /// False when the property grammar rejects the value. Such declarations
    /// are shown as written but take no part in the cascade.
    pub valid: bool,
    pub overridden: bool,
}

impl MatchedDeclaration {
    pub fn new(id: DeclarationId, name: &str, value: String, important: bool) -> Self {
        let (prop, disabled) = normalize_property_name(name);
        Self {
            valid: declaration_supported(&prop, &value),
            id,
            prop,
            value,
            important,
            disabled,
            overridden: false,
        }
    }
}

/// An enclosing at-rule of a matched rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AtRuleContext {
    pub name: String,
    pub condition: String,
    pub logic_id: LogicId,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MatchedRule {
    pub uid: RuleUid,
    pub selector: String,
    pub declarations: Vec<MatchedDeclaration>,
    pub specificity: Specificity,
    pub context: Vec<AtRuleContext>,
    pub active: bool,
    pub origin: Origin,
    pub source_name: String,
    pub readonly: bool,
    pub line: Option<u32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ElementGroup {
    pub is_target: bool,
    pub tag_name: String,
    pub id: Option<String>,
    pub class_name: String,
    pub rules: Vec<MatchedRule>,
}

fn declarations_of(node: &LogicNode, inherited_only: bool) -> Vec<MatchedDeclaration> {
    node.declarations()
        .map(|decl| {
            MatchedDeclaration::new(
                DeclarationId::Logic(decl.id),
                &decl.label,
                decl.value.clone().unwrap_or_default(),
                matches!(decl.kind, LogicKind::Declaration { important: true }),
            )
        })
        .filter(|decl| !inherited_only || is_inherited_property(&decl.prop))
        .collect()
}

fn rule_from_node(
    node: &LogicNode,
    declarations: Vec<MatchedDeclaration>,
    specificity: Specificity,
    context: Vec<AtRuleContext>,
    active: bool,
) -> MatchedRule {
    MatchedRule {
        uid: RuleUid::Logic(node.id),
        selector: node.label.clone(),
        declarations,
        specificity,
        context,
        active,
        origin: node.metadata.origin,
        source_name: node.metadata.source_name.clone(),
        readonly: node.metadata.readonly,
        line: node.metadata.line,
    }
}

/// Resolves nesting: each enclosing selector list is combined with the
/// child, substituting `&` or joining with a descendant combinator.
fn resolve_selectors(parents: &[&LogicNode], label: &str) -> Vec<String> {
    let mut outer: Vec<String> = Vec::new();
    for parent in parents {
        outer = combine_nested(&outer, &parent.label);
    }
    combine_nested(&outer, label)
}

fn combine_nested(outer: &[String], label: &str) -> Vec<String> {
    let parts = split_selector_list(label);
    if outer.is_empty() {
        return parts;
    }
    let mut combined = Vec::with_capacity(outer.len() * parts.len());
    for parent in outer {
        for part in &parts {
            if part.contains('&') {
                combined.push(part.replace('&', parent));
            } else {
                combined.push(format!("{} {}", parent, part));
            }
        }
    }
    combined
}

/// The width a container condition requires, and whether the bound is
/// exclusive. Recognises `min-width: N` and `width >= N` / `width > N`.
pub fn container_min_width(condition: &str) -> Option<(f32, bool)> {
    let lowered = condition.to_ascii_lowercase();
    if let Some(pos) = lowered.find("min-width") {
        let rest = lowered[pos + "min-width".len()..].trim_start().strip_prefix(':')?;
        return leading_number(rest).map(|width| (width, false));
    }
    let mut search = 0usize;
    while let Some(found) = lowered[search..].find("width") {
        let start = search + found;
        let end = start + "width".len();
        let standalone = !lowered[..start]
            .chars()
            .next_back()
            .is_some_and(|ch| ch.is_ascii_alphanumeric() || ch == '-');
        if standalone {
            let rest = lowered[end..].trim_start();
            if let Some(value) = rest.strip_prefix(">=") {
                return leading_number(value).map(|width| (width, false));
            }
            if let Some(value) = rest.strip_prefix('>') {
                return leading_number(value).map(|width| (width, true));
            }
        }
        search = end;
    }
    None
}

fn leading_number(text: &str) -> Option<f32> {
    let text = text.trim_start();
    let end = text
        .find(|ch: char| !(ch.is_ascii_digit() || ch == '.'))
        .unwrap_or(text.len());
    text[..end].parse().ok()
}

/// One cascade query over a Logic Tree.
pub struct CascadeMatcher<'a> {
    tree: &'a LogicTree,
    environment: &'a dyn Environment,
    viewport: Viewport,
    forced: ForcedPseudoStates,
    stop_at: Vec<String>,
    debug: Option<&'a DebugLogger>,
}

impl<'a> CascadeMatcher<'a> {
    pub fn new(tree: &'a LogicTree, environment: &'a dyn Environment) -> Self {
        Self {
            tree,
            environment,
            viewport: Viewport::default(),
            forced: ForcedPseudoStates::new(),
            stop_at: DEFAULT_STOP_TAGS.iter().map(|tag| tag.to_string()).collect(),
            debug: None,
        }
    }

    pub fn viewport(mut self, viewport: Viewport) -> Self {
        self.viewport = viewport;
        self
    }

    pub fn forced(mut self, forced: ForcedPseudoStates) -> Self {
        self.forced = forced;
        self
    }

    pub fn stop_at(mut self, tags: Vec<String>) -> Self {
        self.stop_at = tags;
        self
    }

    pub(crate) fn with_debug(mut self, debug: Option<&'a DebugLogger>) -> Self {
        self.debug = debug;
        self
    }

    fn count(&self, key: &str) {
        if let Some(debug) = self.debug {
            debug.count(key, 1);
        }
    }

    /// Matched rules for the target and each ancestor up to the first
    /// stop tag, target first, each group sorted by descending specificity.
    pub fn find<E: InspectElement>(&self, target: &E) -> Vec<ElementGroup> {
        let entries = self.tree.selectors();
        let mut groups = Vec::new();
        let mut current = Some(target.clone());
        let mut depth = 0usize;
        while let Some(element) = current {
            let is_target = depth == 0;
            let mut rules = Vec::new();
            if let Some(mut inline) = InlineDeclarationParser::rule(&element, is_target, depth) {
                if !is_target {
                    inline
                        .declarations
                        .retain(|decl| is_inherited_property(&decl.prop));
                }
                if is_target || !inline.declarations.is_empty() {
                    rules.push(inline);
                }
            }
            for entry in &entries {
                if let Some(rule) = self.match_entry(&element, entry, is_target) {
                    rules.push(rule);
                }
            }
            // Stable: equal specificity keeps source order.
            rules.sort_by(|a, b| b.specificity.cmp(&a.specificity));

            let tag_name = element.tag_name();
            if let Some(debug) = self.debug {
                debug.event(
                    "cascade.element",
                    &[
                        ("tag", tag_name.as_str().into()),
                        ("target", is_target.into()),
                        ("rules", rules.len().into()),
                    ],
                );
            }
            if !rules.is_empty() {
                groups.push(ElementGroup {
                    is_target,
                    tag_name: tag_name.clone(),
                    id: element.element_id(),
                    class_name: element.class_name(),
                    rules,
                });
            }
            if self
                .stop_at
                .iter()
                .any(|tag| tag.eq_ignore_ascii_case(&tag_name))
            {
                break;
            }
            current = element.parent_element();
            depth += 1;
        }
        groups
    }

    fn match_entry<E: InspectElement>(
        &self,
        element: &E,
        entry: &SelectorEntry<'_>,
        is_target: bool,
    ) -> Option<MatchedRule> {
        let node = entry.node;
        let mut best: Option<Specificity> = None;
        for selector in resolve_selectors(&entry.parents, &node.label) {
            let states = dynamic_states(&selector);
            if !states.is_empty()
                && !(is_target && states.iter().any(|state| self.forced.is_forced(*state)))
            {
                self.count("cascade.rules_rejected_pseudo");
                continue;
            }
            match element.matches(&strip_pseudos(&selector)) {
                Ok(true) => {
                    let specificity = selector_specificity(&selector);
                    if best.is_none_or(|current| specificity > current) {
                        best = Some(specificity);
                    }
                }
                Ok(false) => {}
                Err(err) => {
                    log::debug!("selector {:?} does not compile: {}", selector, err);
                    self.count("cascade.selector_invalid");
                }
            }
        }
        let specificity = best?;

        let declarations = declarations_of(node, !is_target);
        if !is_target && declarations.is_empty() {
            return None;
        }
        let context: Vec<AtRuleContext> = entry
            .at_rules
            .iter()
            .filter_map(|at_rule| {
                let (name, condition) = at_rule.condition()?;
                Some(AtRuleContext {
                    name: name.to_ascii_lowercase(),
                    condition: condition.to_string(),
                    logic_id: at_rule.id,
                })
            })
            .collect();
        let active = context.iter().all(|ctx| self.condition_active(ctx));

        self.count("cascade.rules_matched");
        if let Some(debug) = self.debug {
            debug.event(
                "cascade.rule",
                &[
                    ("uid", node.id.to_string().as_str().into()),
                    ("selector", node.label.as_str().into()),
                    ("active", active.into()),
                    ("specificity", specificity.to_string().as_str().into()),
                ],
            );
        }
        Some(rule_from_node(node, declarations, specificity, context, active))
    }

    fn condition_active(&self, context: &AtRuleContext) -> bool {
        match context.name.as_str() {
            "media" => match self.environment.match_media(&context.condition, &self.viewport) {
                Ok(true) => {
                    self.count("css.media.matched");
                    true
                }
                Ok(false) => {
                    self.count("css.media.unmatched");
                    false
                }
                Err(err) => {
                    log::debug!("media condition {:?}: {}", context.condition, err);
                    self.count("css.media.unsupported");
                    false
                }
            },
            "supports" => self
                .environment
                .supports(&context.condition)
                .unwrap_or(true),
            "container" => match container_min_width(&context.condition) {
                Some((width, true)) => self.viewport.width > width,
                Some((width, false)) => self.viewport.width >= width,
                None => true,
            },
            _ => true,
        }
    }
}

/// The single-rule view used when a rule is picked directly in the tree.
pub fn explicit_rule_group(tree: &LogicTree, id: LogicId) -> Option<ElementGroup> {
    let node = tree.find(id)?;
    if !node.is_selector() {
        return None;
    }
    let specificity = node
        .metadata
        .specificity
        .unwrap_or_else(|| selector_specificity(&node.label));
    Some(ElementGroup {
        is_target: true,
        tag_name: SELECTED_RULE_LABEL.to_string(),
        id: None,
        class_name: String::new(),
        rules: vec![rule_from_node(
            node,
            declarations_of(node, false),
            specificity,
            Vec::new(),
            true,
        )],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{StyleDocument, ViewportEnvironment};
    use crate::error::InspectorError;
    use crate::html::{HtmlDocument, HtmlElement};
    use crate::logic::LogicTreeBuilder;
    use crate::syntax::SyntaxModelBuilder;
    use crate::types::{IdGenerator, PseudoState};

    fn setup(html: &str) -> (HtmlDocument, LogicTree) {
        let doc = HtmlDocument::parse(html);
        let (model, _) = SyntaxModelBuilder::new().build(&doc.stylesheets());
        let tree = LogicTreeBuilder::build(&model, &mut IdGenerator::new());
        (doc, tree)
    }

    fn target(doc: &HtmlDocument) -> HtmlElement {
        doc.select_first("#t").expect("target element")
    }

    fn selectors(group: &ElementGroup) -> Vec<&str> {
        group.rules.iter().map(|rule| rule.selector.as_str()).collect()
    }

    struct FailingEnvironment;

    impl Environment for FailingEnvironment {
        fn match_media(&self, _: &str, _: &Viewport) -> Result<bool, InspectorError> {
            Err(InspectorError::Parse {
                source_name: "@media".to_string(),
                message: "unavailable".to_string(),
            })
        }

        fn supports(&self, _: &str) -> Result<bool, InspectorError> {
            Err(InspectorError::Parse {
                source_name: "@supports".to_string(),
                message: "unavailable".to_string(),
            })
        }
    }

    #[test]
    fn target_rules_sort_by_specificity_with_inline_first() {
        let (doc, tree) = setup(
            "<style>p { margin: 0 } .x { color: red } #t { color: blue } .x { top: 0 }</style>\
             <p id='t' class='x' style='left: 0'></p>",
        );
        let env = ViewportEnvironment::screen();
        let groups = CascadeMatcher::new(&tree, &env).find(&target(&doc));
        assert!(groups[0].is_target);
        assert_eq!(groups[0].tag_name, "p");
        assert_eq!(groups[0].id.as_deref(), Some("t"));
        assert_eq!(selectors(&groups[0]), vec!["element.style", "#t", ".x", ".x", "p"]);
        assert_eq!(groups[0].rules[2].declarations[0].prop, "color");
        assert_eq!(groups[0].rules[3].declarations[0].prop, "top");
    }

    #[test]
    fn ancestors_only_surface_inherited_declarations() {
        let (doc, tree) = setup(
            "<style>.wrap { color: red; margin: 10px } .wrap { padding: 0 } div { --brand: red }</style>\
             <div class='wrap' style='cursor: pointer; width: 5px'><p id='t'></p></div>",
        );
        let env = ViewportEnvironment::screen();
        let groups = CascadeMatcher::new(&tree, &env).find(&target(&doc));
        assert_eq!(groups.len(), 1);
        let div = &groups[0];
        assert!(!div.is_target);
        assert_eq!(div.class_name, "wrap");
        assert_eq!(selectors(div), vec!["element.style", ".wrap", "div"]);
        let inline: Vec<_> = div.rules[0].declarations.iter().map(|d| d.prop.as_str()).collect();
        assert_eq!(inline, vec!["cursor"]);
        assert_eq!(div.rules[0].uid, RuleUid::InlineAncestor(1));
        let wrap: Vec<_> = div.rules[1].declarations.iter().map(|d| d.prop.as_str()).collect();
        assert_eq!(wrap, vec!["color"]);
    }

    #[test]
    fn unmatched_media_rules_stay_visible_but_inactive() {
        let (doc, tree) = setup(
            "<style>@media (min-width: 999999px) { p { color: red } } @media (min-width: 100px) { p { top: 0 } }</style><p id='t'></p>",
        );
        let env = ViewportEnvironment::screen();
        let groups = CascadeMatcher::new(&tree, &env)
            .viewport(Viewport::new(800.0, 600.0))
            .find(&target(&doc));
        let rules = &groups[0].rules;
        assert_eq!(rules.len(), 2);
        assert!(!rules[0].active);
        assert_eq!(rules[0].context[0].name, "media");
        assert_eq!(rules[0].context[0].condition, "(min-width: 999999px)");
        assert!(rules[1].active);
    }

    #[test]
    fn dynamic_states_need_forcing_on_the_target() {
        let (doc, tree) = setup(
            "<style>a:hover { color: red } div:hover a { top: 0 } a { margin: 0 }</style><div><a id='t'></a></div>",
        );
        let env = ViewportEnvironment::screen();
        let plain = CascadeMatcher::new(&tree, &env).find(&target(&doc));
        assert_eq!(selectors(&plain[0]), vec!["a"]);

        let forced = CascadeMatcher::new(&tree, &env)
            .forced(ForcedPseudoStates::new().with(PseudoState::Hover))
            .find(&target(&doc));
        assert_eq!(selectors(&forced[0]), vec!["div:hover a", "a:hover", "a"]);
        assert_eq!(forced[0].rules[1].specificity, Specificity(0, 0, 1, 1));
    }

    #[test]
    fn failing_evaluators_gate_media_closed_and_supports_open() {
        let (doc, tree) = setup(
            "<style>@supports (display: grid) { p { color: red } } @media screen { p { top: 0 } }</style><p id='t'></p>",
        );
        let groups = CascadeMatcher::new(&tree, &FailingEnvironment).find(&target(&doc));
        let by_selector: Vec<_> = groups[0]
            .rules
            .iter()
            .map(|rule| (rule.context[0].name.as_str(), rule.active))
            .collect();
        assert_eq!(by_selector, vec![("supports", true), ("media", false)]);
    }

    #[test]
    fn container_conditions_compare_against_viewport_width() {
        assert_eq!(container_min_width("(min-width: 400px)"), Some((400.0, false)));
        assert_eq!(container_min_width("card (width > 320px)"), Some((320.0, true)));
        assert_eq!(container_min_width("(width >= 12.5px)"), Some((12.5, false)));
        assert_eq!(container_min_width("(max-width: 400px)"), None);
        assert_eq!(container_min_width("style(--x: 1)"), None);

        let (doc, tree) = setup(
            "<style>@container (min-width: 400px) { p { color: red } }</style><p id='t'></p>",
        );
        let env = ViewportEnvironment::screen();
        let wide = CascadeMatcher::new(&tree, &env)
            .viewport(Viewport::new(800.0, 600.0))
            .find(&target(&doc));
        assert!(wide[0].rules[0].active);
        let narrow = CascadeMatcher::new(&tree, &env)
            .viewport(Viewport::new(300.0, 600.0))
            .find(&target(&doc));
        assert!(!narrow[0].rules[0].active);
    }

    #[test]
    fn selector_lists_report_the_best_matching_part() {
        let (doc, tree) = setup(
            "<style>span, #t, .x { color: red } #missing, p { top: 0 }</style><p id='t' class='x'></p>",
        );
        let env = ViewportEnvironment::screen();
        let groups = CascadeMatcher::new(&tree, &env).find(&target(&doc));
        assert_eq!(groups[0].rules[0].specificity, Specificity(0, 1, 0, 0));
        assert_eq!(groups[0].rules[1].specificity, Specificity(0, 0, 0, 1));
    }

    #[test]
    fn nested_rules_resolve_against_their_parents() {
        let (doc, tree) = setup(
            "<style>.card { color: red; .title { top: 0 } &.wide { left: 0 } }</style>\
             <div class='card wide' id='t'><p class='title'></p></div>",
        );
        let env = ViewportEnvironment::screen();
        let groups = CascadeMatcher::new(&tree, &env).find(&target(&doc));
        let props: Vec<_> = groups[0]
            .rules
            .iter()
            .flat_map(|rule| rule.declarations.iter().map(|d| d.prop.as_str()))
            .collect();
        assert_eq!(props, vec!["left", "color"]);
    }

    #[test]
    fn walk_stops_at_configured_tags() {
        let (doc, tree) = setup(
            "<style>* { color: red }</style><section><div><p id='t'></p></div></section>",
        );
        let env = ViewportEnvironment::screen();
        let default = CascadeMatcher::new(&tree, &env).find(&target(&doc));
        let tags: Vec<_> = default.iter().map(|group| group.tag_name.as_str()).collect();
        assert_eq!(tags, vec!["p", "div", "section", "body"]);

        let short = CascadeMatcher::new(&tree, &env)
            .stop_at(vec!["DIV".to_string()])
            .find(&target(&doc));
        assert_eq!(short.len(), 2);
    }

    #[test]
    fn uncompilable_selectors_do_not_match() {
        let (doc, tree) = setup("<style>p:has(> span) { color: red }</style><p id='t'><span></span></p>");
        let env = ViewportEnvironment::screen();
        let groups = CascadeMatcher::new(&tree, &env).find(&target(&doc));
        assert!(groups.is_empty());
    }

    #[test]
    fn explicit_rule_selection() {
        let (_, tree) = setup("<style>@media print { .a { color: red; margin: 0 } }</style>");
        let entries = tree.selectors();
        let id = entries[0].node.id;
        let group = explicit_rule_group(&tree, id).expect("selected rule");
        assert_eq!(group.tag_name, SELECTED_RULE_LABEL);
        assert!(group.is_target);
        assert_eq!(group.rules[0].uid, RuleUid::Logic(id));
        assert_eq!(group.rules[0].declarations.len(), 2);
        assert!(group.rules[0].context.is_empty());
        assert!(group.rules[0].active);
        assert!(explicit_rule_group(&tree, entries[0].at_rules[0].id).is_none());
    }

    #[test]
    fn ids_render_for_display() {
        assert_eq!(RuleUid::InlineAncestor(2).to_string(), "inline-parent-2");
        assert_eq!(RuleUid::InlineTarget.to_string(), "inline-target");
        assert_eq!(RuleUid::Logic(LogicId(7)).to_string(), "node-7");
        assert_eq!(DeclarationId::Inline(0).to_string(), "inline-decl-0");
        assert!(is_inherited_property("--brand"));
        assert!(!is_inherited_property("margin"));
    }
}
