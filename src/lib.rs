mod cascade;
mod debug;
mod document;
mod edit;
mod error;
mod html;
mod inline;
mod logic;
mod overrides;
mod selector;
mod sync;
mod syntax;
mod types;

pub use cascade::{
    AtRuleContext, CascadeMatcher, DEFAULT_STOP_TAGS, DeclarationId, ElementGroup,
    INHERITED_PROPERTIES, MatchedDeclaration, MatchedRule, RuleUid, SELECTED_RULE_LABEL,
    container_min_width, explicit_rule_group, is_inherited_property,
};
use debug::DebugLogger;
pub use document::{
    Environment, InspectElement, OwnerDescriptor, RuleAccess, SheetSource, StyleDocument,
    ViewportEnvironment,
};
pub use edit::{
    AtRuleKind, EditOutcome, add_declaration, add_rule, delete_declaration, delete_rule,
    pseudo_state_rule, set_declaration_important, toggle_declaration, update_at_rule_condition,
    update_declaration, update_selector, wrap_in_at_rule,
};
pub use error::InspectorError;
pub use html::{HtmlDocument, HtmlElement};
pub use inline::{
    DISABLED_PREFIX, DeclarationField, INLINE_SELECTOR, InlineDeclarationParser, InlineProperty,
    NEW_PROPERTY_NAME, NEW_PROPERTY_VALUE, add_inline_property, delete_inline_property,
    disabled_name, format_declarations, normalize_property_name, parse_declaration_list,
    toggle_inline_property, update_inline_property,
};
pub use logic::{
    LogicKind, LogicMetadata, LogicNode, LogicTree, LogicTreeBuilder, NodePath, SelectorEntry,
    at_rule_label,
};
pub use overrides::{calculate_overrides, winning_declaration};
pub use selector::{Specificity, dynamic_states, selector_specificity, split_selector_list, strip_pseudos};
pub use sync::{SyncFailure, SyncMode, SyncReport, TreeSynchronizer, relink, render_file};
pub use syntax::{
    AtRuleBlock, BuildReport, DEFAULT_IGNORED_OWNERS, EDITABLE_AT_RULES, SheetWarning,
    SheetWarningKind, SyntaxKind, SyntaxModel, SyntaxModelBuilder, SyntaxNode,
    parse_at_rule_prelude, parse_declaration_value, parse_selector,
};
pub use types::{
    ForcedPseudoStates, IdGenerator, LogicId, Origin, PseudoState, SyntaxId, Viewport,
};

/// Source name used by [`Inspector::add_rule`] for new on-page rules.
pub const DEFAULT_RULE_SOURCE: &str = "style";

/// An editing session over one document: both trees, the condition
/// environment and the inspection state.
pub struct Inspector<D: StyleDocument> {
    document: D,
    environment: Box<dyn Environment>,
    model: SyntaxModel,
    tree: LogicTree,
    logic_ids: IdGenerator,
    sheets: SyntaxModelBuilder,
    viewport: Viewport,
    forced: ForcedPseudoStates,
    stop_at: Vec<String>,
    last_sync: Option<SyncReport>,
    debug: Option<DebugLogger>,
}

pub struct InspectorBuilder {
    ignored_owners: Vec<String>,
    stop_at: Vec<String>,
    viewport: Viewport,
    environment: Option<Box<dyn Environment>>,
    strict_parsing: bool,
    debug_path: Option<std::path::PathBuf>,
}

impl Default for InspectorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl InspectorBuilder {
    pub fn new() -> Self {
        Self {
            ignored_owners: DEFAULT_IGNORED_OWNERS.iter().map(|id| id.to_string()).collect(),
            stop_at: DEFAULT_STOP_TAGS.iter().map(|tag| tag.to_string()).collect(),
            viewport: Viewport::default(),
            environment: None,
            strict_parsing: false,
            debug_path: None,
        }
    }

    /// Style owners with this id are editor tooling and never parsed.
    pub fn ignore_owner(mut self, id: impl Into<String>) -> Self {
        let id = id.into();
        if !self.ignored_owners.contains(&id) {
            self.ignored_owners.push(id);
        }
        self
    }

    pub fn stop_at_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.stop_at = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn viewport(mut self, viewport: Viewport) -> Self {
        self.viewport = viewport;
        self
    }

    pub fn environment(mut self, environment: Box<dyn Environment>) -> Self {
        self.environment = Some(environment);
        self
    }

    // Strict: one bad rule skips the whole sheet instead of just that rule.
    pub fn strict_parsing(mut self, strict: bool) -> Self {
        self.strict_parsing = strict;
        self
    }

    pub fn debug_path(mut self, path: impl Into<std::path::PathBuf>) -> Self {
        self.debug_path = Some(path.into());
        self
    }

    pub fn build<D: StyleDocument>(self, document: D) -> Result<Inspector<D>, InspectorError> {
        let stop_at: Vec<String> = self
            .stop_at
            .iter()
            .map(|tag| tag.trim().to_ascii_lowercase())
            .filter(|tag| !tag.is_empty())
            .collect();
        if stop_at.is_empty() {
            return Err(InspectorError::InvalidConfiguration(
                "stop_at_tags needs at least one tag".to_string(),
            ));
        }
        validate_viewport(&self.viewport)?;
        let debug = match self.debug_path {
            Some(path) => Some(DebugLogger::new(path)?),
            None => None,
        };
        let sheets = SyntaxModelBuilder::new()
            .ignored_owners(self.ignored_owners)
            .strict(self.strict_parsing)
            .with_debug(debug.clone());
        let mut inspector = Inspector {
            document,
            environment: self
                .environment
                .unwrap_or_else(|| Box::new(ViewportEnvironment::screen())),
            model: SyntaxModel::new(),
            tree: LogicTree::default(),
            logic_ids: IdGenerator::new(),
            sheets,
            viewport: self.viewport,
            forced: ForcedPseudoStates::new(),
            stop_at,
            last_sync: None,
            debug,
        };
        inspector.refresh();
        Ok(inspector)
    }
}

fn validate_viewport(viewport: &Viewport) -> Result<(), InspectorError> {
    let valid = |value: f32| value.is_finite() && value >= 0.0;
    if valid(viewport.width) && valid(viewport.height) {
        Ok(())
    } else {
        Err(InspectorError::InvalidConfiguration(format!(
            "viewport must be finite and non-negative, got {}x{}",
            viewport.width, viewport.height
        )))
    }
}

impl<D: StyleDocument> Inspector<D> {
    /// Re-reads every stylesheet and rebuilds both trees. Logic ids from
    /// before the call are no longer valid.
    pub fn refresh(&mut self) -> BuildReport {
        let report = self.sheets.build_into(&self.document.stylesheets(), &mut self.model);
        self.tree = LogicTreeBuilder::build(&self.model, &mut self.logic_ids);
        for warning in &report.warnings {
            log::debug!("{}: {}", warning.source_name, warning.message);
        }
        report
    }

    pub fn tree(&self) -> &LogicTree {
        &self.tree
    }

    pub fn model(&self) -> &SyntaxModel {
        &self.model
    }

    pub fn document(&self) -> &D {
        &self.document
    }

    /// Direct document access. Call [`Inspector::refresh`] after changing
    /// any stylesheet through it.
    pub fn document_mut(&mut self) -> &mut D {
        &mut self.document
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    pub fn set_viewport(&mut self, viewport: Viewport) -> Result<(), InspectorError> {
        validate_viewport(&viewport)?;
        self.viewport = viewport;
        Ok(())
    }

    pub fn forced_states(&self) -> &ForcedPseudoStates {
        &self.forced
    }

    pub fn forced_states_mut(&mut self) -> &mut ForcedPseudoStates {
        &mut self.forced
    }

    /// Report of the sync run by the most recent edit.
    pub fn last_sync(&self) -> Option<&SyncReport> {
        self.last_sync.as_ref()
    }

    /// Cascade for `element` with overridden declarations marked.
    pub fn matched_rules(&self, element: &D::Element) -> Vec<ElementGroup> {
        let mut groups = CascadeMatcher::new(&self.tree, self.environment.as_ref())
            .viewport(self.viewport)
            .forced(self.forced.clone())
            .stop_at(self.stop_at.clone())
            .with_debug(self.debug.as_ref())
            .find(element);
        calculate_overrides(&mut groups);
        groups
    }

    /// The selected rule on its own, as shown when it is picked in the tree.
    pub fn explicit_rule(&self, id: LogicId) -> Option<ElementGroup> {
        let mut group = explicit_rule_group(&self.tree, id)?;
        calculate_overrides(std::slice::from_mut(&mut group));
        Some(group)
    }

    /// Current CSS text of one file as the trees describe it.
    pub fn file_css(&self, origin: Origin, source_name: &str) -> String {
        render_file(&self.tree, &self.model, origin, source_name)
    }

    /// Writes the summary record and flushes the debug log, if one is open.
    pub fn flush_debug(&self) {
        if let Some(debug) = &self.debug {
            debug.summary("session");
            debug.flush();
        }
    }

    fn log_edit(&self, op: &str, outcome: &EditOutcome) {
        if let Some(debug) = &self.debug {
            let sync = match outcome.sync {
                SyncMode::Light => "light",
                SyncMode::Full => "full",
            };
            debug.event(
                &format!("edit.{}", op),
                &[("node", outcome.node.to_string().as_str().into()), ("sync", sync.into())],
            );
            debug.count(&format!("edit.{}", op), 1);
        }
    }

    /// Runs the sync an edit asked for. After a full sync the trees are
    /// rebuilt and the returned id is the edited node's new identity, found
    /// by its position in its file.
    fn apply(&mut self, op: &str, outcome: EditOutcome) -> Option<LogicId> {
        self.log_edit(op, &outcome);
        let path = match outcome.sync {
            SyncMode::Full => self.tree.path_of(outcome.node),
            SyncMode::Light => None,
        };
        let report = TreeSynchronizer::new().with_debug(self.debug.as_ref()).sync(
            outcome.sync,
            &self.tree,
            &mut self.model,
            &mut self.document,
        );
        let rebuild = report.rebuild_required;
        self.last_sync = Some(report);
        if !rebuild {
            return Some(outcome.node);
        }
        self.refresh();
        path.and_then(|path| self.tree.resolve(&path)).map(|node| node.id)
    }

    fn resolved(&self, id: Option<LogicId>) -> Result<LogicId, InspectorError> {
        id.ok_or_else(|| InspectorError::NodeNotFound("edited node did not survive the rebuild".to_string()))
    }

    /// Adds an empty on-page rule to the [`DEFAULT_RULE_SOURCE`] block.
    pub fn add_rule(&mut self, selector: &str) -> Result<LogicId, InspectorError> {
        self.add_rule_in(selector, Origin::OnPage, DEFAULT_RULE_SOURCE)
    }

    pub fn add_rule_in(
        &mut self,
        selector: &str,
        origin: Origin,
        source_name: &str,
    ) -> Result<LogicId, InspectorError> {
        let outcome = add_rule(
            &mut self.tree,
            &mut self.model,
            &mut self.logic_ids,
            selector,
            origin,
            source_name,
        )?;
        let id = self.apply("add_rule", outcome);
        self.resolved(id)
    }

    pub fn delete_rule(&mut self, rule: RuleUid) -> Result<(), InspectorError> {
        let Some(id) = rule.logic_id() else {
            return Err(InspectorError::UnsupportedEdit(format!(
                "{} cannot be deleted",
                INLINE_SELECTOR
            )));
        };
        let outcome = delete_rule(&mut self.tree, &mut self.model, id)?;
        self.apply("delete_rule", outcome);
        Ok(())
    }

    /// Returns the new at-rule.
    pub fn wrap_in_at_rule(
        &mut self,
        rule: LogicId,
        kind: AtRuleKind,
        prelude: Option<&str>,
    ) -> Result<LogicId, InspectorError> {
        let outcome = wrap_in_at_rule(
            &mut self.tree,
            &mut self.model,
            &mut self.logic_ids,
            rule,
            kind,
            prelude,
        )?;
        let id = self.apply("wrap_in_at_rule", outcome);
        self.resolved(id)
    }

    pub fn update_selector(&mut self, rule: LogicId, text: &str) -> Result<LogicId, InspectorError> {
        let outcome = update_selector(&mut self.tree, &mut self.model, rule, text)?;
        let id = self.apply("update_selector", outcome);
        self.resolved(id)
    }

    pub fn update_at_rule_condition(&mut self, id: LogicId, text: &str) -> Result<(), InspectorError> {
        let outcome = update_at_rule_condition(&mut self.tree, &mut self.model, id, text)?;
        self.apply("update_at_rule", outcome);
        Ok(())
    }

    /// Adds the `--new-property: inherit` placeholder to a rule. Returns the
    /// new declaration for stylesheet rules and `None` for inline styles.
    pub fn add_property(
        &mut self,
        element: &D::Element,
        rule: RuleUid,
    ) -> Result<Option<LogicId>, InspectorError> {
        match rule {
            RuleUid::Logic(id) => {
                let outcome = add_declaration(
                    &mut self.tree,
                    &mut self.model,
                    &mut self.logic_ids,
                    id,
                    NEW_PROPERTY_NAME,
                    NEW_PROPERTY_VALUE,
                )?;
                Ok(self.apply("add_property", outcome))
            }
            inline => {
                add_inline_property(&inline_owner(element, inline)?);
                Ok(None)
            }
        }
    }

    pub fn update_property(
        &mut self,
        element: &D::Element,
        rule: RuleUid,
        declaration: &MatchedDeclaration,
        field: DeclarationField,
        text: &str,
    ) -> Result<(), InspectorError> {
        match (rule, declaration.id) {
            (RuleUid::Logic(_), DeclarationId::Logic(id)) => {
                let outcome = update_declaration(&mut self.tree, &mut self.model, id, field, text)?;
                self.apply("update_property", outcome);
                Ok(())
            }
            (RuleUid::Logic(_), DeclarationId::Inline(_)) => Err(mismatch(declaration)),
            (inline, _) => {
                update_inline_property(&inline_owner(element, inline)?, &declaration.prop, field, text)
            }
        }
    }

    /// Returns whether the property is disabled afterwards.
    pub fn toggle_property(
        &mut self,
        element: &D::Element,
        rule: RuleUid,
        declaration: &MatchedDeclaration,
    ) -> Result<bool, InspectorError> {
        match (rule, declaration.id) {
            (RuleUid::Logic(_), DeclarationId::Logic(id)) => {
                let outcome = toggle_declaration(&mut self.tree, &mut self.model, id)?;
                self.apply("toggle_property", outcome);
                Ok(self
                    .tree
                    .find(id)
                    .is_some_and(|node| normalize_property_name(&node.label).1))
            }
            (RuleUid::Logic(_), DeclarationId::Inline(_)) => Err(mismatch(declaration)),
            (inline, _) => toggle_inline_property(&inline_owner(element, inline)?, &declaration.prop),
        }
    }

    pub fn set_property_important(
        &mut self,
        declaration: &MatchedDeclaration,
        important: bool,
    ) -> Result<(), InspectorError> {
        let DeclarationId::Logic(id) = declaration.id else {
            return Err(InspectorError::UnsupportedEdit(
                "inline declarations keep their priority".to_string(),
            ));
        };
        let outcome = set_declaration_important(&mut self.tree, &mut self.model, id, important)?;
        self.apply("set_important", outcome);
        Ok(())
    }

    pub fn delete_property(
        &mut self,
        element: &D::Element,
        rule: RuleUid,
        declaration: &MatchedDeclaration,
    ) -> Result<(), InspectorError> {
        match (rule, declaration.id) {
            (RuleUid::Logic(_), DeclarationId::Logic(id)) => {
                let outcome = delete_declaration(&mut self.tree, &mut self.model, id)?;
                self.apply("delete_property", outcome);
                Ok(())
            }
            (RuleUid::Logic(_), DeclarationId::Inline(_)) => Err(mismatch(declaration)),
            (inline, _) => delete_inline_property(&inline_owner(element, inline)?, &declaration.prop),
        }
    }

    /// Forces `state` on the target and returns the `<base>:<state>` rule,
    /// adding it to the on-page block when it does not exist yet.
    pub fn toggle_pseudo_rule(
        &mut self,
        element: &D::Element,
        selector: &str,
        state: PseudoState,
    ) -> Result<LogicId, InspectorError> {
        self.forced.force(state);
        let groups = self.matched_rules(element);
        match pseudo_state_rule(&groups, selector, state) {
            (_, Some(RuleUid::Logic(id))) => Ok(id),
            (wanted, _) => self.add_rule(&wanted),
        }
    }
}

fn mismatch(declaration: &MatchedDeclaration) -> InspectorError {
    InspectorError::UnsupportedEdit(format!(
        "declaration {} does not belong to a stylesheet rule",
        declaration.id
    ))
}

/// The element whose `style` attribute an inline rule reads.
fn inline_owner<E: InspectElement>(target: &E, rule: RuleUid) -> Result<E, InspectorError> {
    let depth = match rule {
        RuleUid::InlineTarget => 0,
        RuleUid::InlineAncestor(depth) => depth,
        RuleUid::Logic(id) => {
            return Err(InspectorError::UnsupportedEdit(format!("{} is not an inline rule", id)));
        }
    };
    let mut element = target.clone();
    for _ in 0..depth {
        element = element
            .parent_element()
            .ok_or_else(|| InspectorError::NodeNotFound(rule.to_string()))?;
    }
    Ok(element)
}
