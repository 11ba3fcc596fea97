use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use lightningcss::declaration::DeclarationBlock;
use lightningcss::rules::{CssRule, Location};
use lightningcss::stylesheet::{ParserOptions, PrinterOptions, StyleSheet};
use lightningcss::targets::{Features, Targets};
use lightningcss::traits::ToCss;

use crate::debug::DebugLogger;
use crate::document::{RuleAccess, SheetSource};
use crate::error::InspectorError;
use crate::document::declaration_supported;
use crate::inline::{
    InlineProperty, blank_comments, declaration_block_properties, normalize_property_name,
    scan_declarations,
};
use crate::types::{IdGenerator, Origin, SyntaxId};

pub const DEFAULT_IGNORED_OWNERS: [&str; 2] = ["editor-ui-styles", "vite-plugin-vue-devtools"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AtRuleBlock {
    /// `@import ...;` style rules without a block.
    Statement,
    /// Grouping rules whose block holds child rules.
    Nested,
    /// Block kept verbatim (`@font-face`, `@keyframes`, ...).
    Opaque(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyntaxKind {
    SelectorRule {
        selector: String,
    },
    AtRule {
        name: String,
        prelude: String,
        block: AtRuleBlock,
    },
    Declaration {
        property: String,
        value: String,
        important: bool,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct SyntaxNode {
    pub id: SyntaxId,
    pub kind: SyntaxKind,
    pub origin: Origin,
    pub source_name: String,
    pub readonly: bool,
    /// 1-based line of the rule in its sheet.
    pub line: Option<u32>,
    pub children: Vec<SyntaxId>,
}

impl SyntaxNode {
    pub fn is_rule(&self) -> bool {
        !matches!(self.kind, SyntaxKind::Declaration { .. })
    }
}

/// Arena holding every parsed node of every sheet. Top-level rules keep
/// document order.
#[derive(Debug, Clone, Default)]
pub struct SyntaxModel {
    nodes: HashMap<SyntaxId, SyntaxNode>,
    top_level: Vec<SyntaxId>,
    ids: IdGenerator,
}

impl SyntaxModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops every node. The id generator keeps counting.
    pub fn reset(&mut self) {
        self.nodes.clear();
        self.top_level.clear();
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: SyntaxId) -> Option<&SyntaxNode> {
        self.nodes.get(&id)
    }

    pub fn node_mut(&mut self, id: SyntaxId) -> Option<&mut SyntaxNode> {
        self.nodes.get_mut(&id)
    }

    pub fn contains(&self, id: SyntaxId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn top_level(&self) -> &[SyntaxId] {
        &self.top_level
    }

    pub fn push_top_level(&mut self, id: SyntaxId) {
        if !self.top_level.contains(&id) {
            self.top_level.push(id);
        }
    }

    /// Mints a node with no children and inserts it.
    pub fn create(
        &mut self,
        kind: SyntaxKind,
        origin: Origin,
        source_name: &str,
        readonly: bool,
    ) -> SyntaxId {
        let id = SyntaxId::mint(&mut self.ids);
        self.nodes.insert(
            id,
            SyntaxNode {
                id,
                kind,
                origin,
                source_name: source_name.to_string(),
                readonly,
                line: None,
                children: Vec::new(),
            },
        );
        id
    }

    pub fn set_children(&mut self, id: SyntaxId, children: Vec<SyntaxId>) -> bool {
        match self.nodes.get_mut(&id) {
            Some(node) => {
                node.children = children;
                true
            }
            None => false,
        }
    }

    pub fn parent_of(&self, id: SyntaxId) -> Option<SyntaxId> {
        self.nodes
            .values()
            .find(|node| node.children.contains(&id))
            .map(|node| node.id)
    }

    /// Puts `new` where `old` sits in its container. `old` stays in the
    /// arena so it can be re-parented.
    pub fn replace_in_container(&mut self, old: SyntaxId, new: SyntaxId) -> bool {
        if let Some(pos) = self.top_level.iter().position(|id| *id == old) {
            self.top_level[pos] = new;
            return true;
        }
        let Some(parent) = self.parent_of(old) else {
            return false;
        };
        match self.nodes.get_mut(&parent) {
            Some(node) => {
                for child in node.children.iter_mut().filter(|child| **child == old) {
                    *child = new;
                }
                true
            }
            None => false,
        }
    }

    /// Removes a node with all its descendants and unlinks it from its
    /// container. Returns whether anything was removed.
    pub fn remove_subtree(&mut self, id: SyntaxId) -> bool {
        if !self.nodes.contains_key(&id) {
            return false;
        }
        self.top_level.retain(|candidate| *candidate != id);
        if let Some(parent) = self.parent_of(id) {
            if let Some(node) = self.nodes.get_mut(&parent) {
                node.children.retain(|candidate| *candidate != id);
            }
        }
        let mut pending = vec![id];
        while let Some(next) = pending.pop() {
            if let Some(node) = self.nodes.remove(&next) {
                pending.extend(node.children);
            }
        }
        true
    }

    /// Canonical CSS text for the given nodes, in order.
    pub fn serialize(&self, ids: &[SyntaxId]) -> Result<String, InspectorError> {
        let mut out = String::new();
        for id in ids {
            self.write_node(*id, 0, &mut out)?;
        }
        Ok(out)
    }

    pub fn to_css(&self) -> Result<String, InspectorError> {
        self.serialize(&self.top_level)
    }

    fn write_node(&self, id: SyntaxId, depth: usize, out: &mut String) -> Result<(), InspectorError> {
        let node = self
            .node(id)
            .ok_or_else(|| InspectorError::NodeNotFound(id.to_string()))?;
        let indent = "  ".repeat(depth);
        match &node.kind {
            SyntaxKind::Declaration {
                property,
                value,
                important,
            } => {
                let flag = if *important { " !important" } else { "" };
                out.push_str(&format!("{indent}{property}: {value}{flag};\n"));
            }
            SyntaxKind::SelectorRule { selector } => {
                out.push_str(&format!("{indent}{selector} {{\n"));
                for child in &node.children {
                    self.write_node(*child, depth + 1, out)?;
                }
                out.push_str(&format!("{indent}}}\n"));
            }
            SyntaxKind::AtRule {
                name,
                prelude,
                block,
            } => {
                let head = if prelude.is_empty() {
                    format!("@{name}")
                } else {
                    format!("@{name} {prelude}")
                };
                match block {
                    AtRuleBlock::Statement => out.push_str(&format!("{indent}{head};\n")),
                    AtRuleBlock::Nested => {
                        out.push_str(&format!("{indent}{head} {{\n"));
                        for child in &node.children {
                            self.write_node(*child, depth + 1, out)?;
                        }
                        out.push_str(&format!("{indent}}}\n"));
                    }
                    AtRuleBlock::Opaque(body) => {
                        out.push_str(&format!("{indent}{head} {{\n"));
                        for line in body.lines().filter(|line| !line.trim().is_empty()) {
                            out.push_str(&format!("{indent}  {line}\n"));
                        }
                        out.push_str(&format!("{indent}}}\n"));
                    }
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SheetWarningKind {
    AccessDenied,
    ParseFailure,
    /// The parser skipped part of the sheet, or a declaration the property
    /// grammar rejects was kept as written.
    Recovered,
    UnknownOrigin,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetWarning {
    pub kind: SheetWarningKind,
    pub source_name: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildReport {
    pub sheets_parsed: usize,
    pub sheets_skipped: usize,
    pub rules: usize,
    pub warnings: Vec<SheetWarning>,
}

/// Printer settings shared by every rendering path: media ranges come out in
/// `min-`/`max-` form and nesting selectors stay as `&`.
pub(crate) fn printer_options() -> PrinterOptions<'static> {
    PrinterOptions {
        targets: Targets {
            browsers: None,
            include: Features::MediaRangeSyntax | Features::MediaIntervalSyntax,
            exclude: Features::empty(),
        },
        ..PrinterOptions::default()
    }
}

fn access_advisory(source_name: &str, href: &str) -> String {
    let mut message = format!(
        "cannot read the rules of stylesheet {}; the server must send CORS headers (Access-Control-Allow-Origin) for them to be inspected",
        if href.is_empty() { source_name } else { href }
    );
    if href.contains("fonts.googleapis.com") {
        message.push_str(". Tip: add crossorigin=\"anonymous\" to the <link> element");
    }
    message
}

pub struct SyntaxModelBuilder {
    ignored_owners: Vec<String>,
    strict: bool,
    advised: HashSet<String>,
    debug: Option<DebugLogger>,
}

impl Default for SyntaxModelBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SyntaxModelBuilder {
    pub fn new() -> Self {
        Self {
            ignored_owners: DEFAULT_IGNORED_OWNERS.iter().map(|id| id.to_string()).collect(),
            strict: false,
            advised: HashSet::new(),
            debug: None,
        }
    }

    pub fn ignore_owner(mut self, id: impl Into<String>) -> Self {
        let id = id.into();
        if !self.ignored_owners.contains(&id) {
            self.ignored_owners.push(id);
        }
        self
    }

    pub fn ignored_owners(mut self, ids: Vec<String>) -> Self {
        self.ignored_owners = ids;
        self
    }

    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub(crate) fn with_debug(mut self, debug: Option<DebugLogger>) -> Self {
        self.debug = debug;
        self
    }

    pub fn build(&mut self, sheets: &[SheetSource]) -> (SyntaxModel, BuildReport) {
        let mut model = SyntaxModel::new();
        let report = self.build_into(sheets, &mut model);
        (model, report)
    }

    /// Replaces the model's contents with the parsed sheets. Ids keep
    /// counting from wherever the model's generator was.
    pub fn build_into(&mut self, sheets: &[SheetSource], model: &mut SyntaxModel) -> BuildReport {
        model.reset();
        let mut report = BuildReport::default();
        let mut per_tag: HashMap<String, usize> = HashMap::new();
        for sheet in sheets {
            let counter = per_tag.entry(sheet.owner.tag_name.clone()).or_insert(0);
            *counter += 1;
            let source_name = sheet
                .owner
                .id
                .clone()
                .unwrap_or_else(|| format!("{}-{}", sheet.owner.tag_name, counter));

            if sheet
                .owner
                .id
                .as_ref()
                .is_some_and(|id| self.ignored_owners.contains(id))
            {
                self.log_skip(&source_name, "tooling");
                continue;
            }

            let origin = match sheet.origin_marker.as_deref() {
                Some(marker) => match Origin::from_marker(marker) {
                    Some(origin) => origin,
                    None => {
                        log::warn!("skipping stylesheet {}: unknown origin {:?}", source_name, marker);
                        self.log_skip(&source_name, "unknown_origin");
                        report.sheets_skipped += 1;
                        report.warnings.push(SheetWarning {
                            kind: SheetWarningKind::UnknownOrigin,
                            source_name: source_name.clone(),
                            message: format!("unknown origin marker {:?}", marker),
                        });
                        continue;
                    }
                },
                None if sheet.owner.tag_name == "style" => Origin::OnPage,
                None => Origin::Internal,
            };

            let text = match (&sheet.owner_text, &sheet.rules) {
                (Some(text), _) if !text.trim().is_empty() => text.clone(),
                (_, RuleAccess::Readable(rules)) => rules.join("\n"),
                (_, RuleAccess::Denied(href)) => {
                    report.sheets_skipped += 1;
                    let key = if href.is_empty() { source_name.clone() } else { href.clone() };
                    if self.advised.insert(key) {
                        let message = access_advisory(&source_name, href);
                        log::warn!("{}", message);
                        report.warnings.push(SheetWarning {
                            kind: SheetWarningKind::AccessDenied,
                            source_name: source_name.clone(),
                            message,
                        });
                    }
                    self.log_skip(&source_name, "access_denied");
                    continue;
                }
            };

            match self.parse_sheet(&text, origin, &source_name, sheet.readonly, model) {
                Ok((roots, recovered)) => {
                    for message in recovered {
                        log::debug!("{}: {}", source_name, message);
                        if let Some(debug) = &self.debug {
                            debug.count("css.parse.recovered", 1);
                            debug.event(
                                "css.parse.recovered",
                                &[("source", source_name.as_str().into()), ("message", message.as_str().into())],
                            );
                        }
                        report.warnings.push(SheetWarning {
                            kind: SheetWarningKind::Recovered,
                            source_name: source_name.clone(),
                            message,
                        });
                    }
                    report.sheets_parsed += 1;
                    report.rules += roots.len();
                    if let Some(debug) = &self.debug {
                        debug.count("css.sheets", 1);
                        debug.count("css.rules", roots.len() as u64);
                        debug.event(
                            "css.sheet",
                            &[
                                ("source", source_name.as_str().into()),
                                ("origin", origin.marker().into()),
                                ("rules", roots.len().into()),
                                ("readonly", sheet.readonly.into()),
                            ],
                        );
                    }
                    for id in roots {
                        model.push_top_level(id);
                    }
                }
                Err(err) => {
                    log::warn!("skipping stylesheet {}: {}", source_name, err);
                    self.log_skip(&source_name, "parse_error");
                    report.sheets_skipped += 1;
                    report.warnings.push(SheetWarning {
                        kind: SheetWarningKind::ParseFailure,
                        source_name: source_name.clone(),
                        message: err.to_string(),
                    });
                }
            }
        }
        report
    }

    fn log_skip(&self, source_name: &str, reason: &str) {
        if let Some(debug) = &self.debug {
            debug.count("css.sheets_skipped", 1);
            debug.event(
                "css.sheet.skipped",
                &[("source", source_name.into()), ("reason", reason.into())],
            );
        }
    }

    fn parse_sheet(
        &self,
        text: &str,
        origin: Origin,
        source_name: &str,
        readonly: bool,
        model: &mut SyntaxModel,
    ) -> Result<(Vec<SyntaxId>, Vec<String>), InspectorError> {
        let warnings = Arc::new(RwLock::new(Vec::new()));
        let options = ParserOptions {
            filename: source_name.to_string(),
            error_recovery: !self.strict,
            warnings: Some(warnings.clone()),
            ..ParserOptions::default()
        };
        let sheet = StyleSheet::parse(text, options).map_err(|err| InspectorError::Parse {
            source_name: source_name.to_string(),
            message: err.to_string(),
        })?;
        let mut recovered: Vec<String> = match warnings.read() {
            Ok(list) => list.iter().map(|warning| warning.to_string()).collect(),
            Err(_) => Vec::new(),
        };

        let scan = blank_comments(text);
        let mut converter = SheetConverter {
            ids: &mut model.ids,
            origin,
            source_name,
            readonly,
            source: text,
            scan: &scan,
            staged: Vec::new(),
            recovered: Vec::new(),
        };
        let mut roots = Vec::new();
        for rule in &sheet.rules.0 {
            roots.extend(converter.convert_rule(rule)?);
        }
        recovered.append(&mut converter.recovered);
        for node in converter.staged {
            model.nodes.insert(node.id, node);
        }
        Ok((roots, recovered))
    }
}

/// Turns one parsed sheet into staged nodes; nothing reaches the model
/// unless the whole sheet converts. Declarations and opaque at-rules are
/// taken from the source text so they write back as they were written.
struct SheetConverter<'a> {
    ids: &'a mut IdGenerator,
    origin: Origin,
    source_name: &'a str,
    readonly: bool,
    source: &'a str,
    /// `source` with comments blanked out, same byte offsets.
    scan: &'a str,
    staged: Vec<SyntaxNode>,
    recovered: Vec<String>,
}

impl<'a> SheetConverter<'a> {
    fn stage(&mut self, kind: SyntaxKind, line: Option<u32>, children: Vec<SyntaxId>) -> SyntaxId {
        let id = SyntaxId::mint(self.ids);
        self.staged.push(SyntaxNode {
            id,
            kind,
            origin: self.origin,
            source_name: self.source_name.to_string(),
            readonly: self.readonly,
            line,
            children,
        });
        id
    }

    fn printer_error(&self, err: lightningcss::error::PrinterError) -> InspectorError {
        InspectorError::Serialization {
            source_name: self.source_name.to_string(),
            message: err.to_string(),
        }
    }

    /// Declarations of a style rule as written. The flag is false when the
    /// block could not be located and the parsed form was used instead.
    fn rule_declarations(
        &mut self,
        loc: Location,
        block: &DeclarationBlock,
    ) -> Result<(Vec<SyntaxId>, bool), InspectorError> {
        let scan = self.scan;
        let body = byte_offset(self.source, loc).and_then(|offset| match rule_extent(scan, offset)? {
            Extent::Block { open, close } => Some(&scan[open + 1..close]),
            Extent::Statement { .. } => None,
        });
        let Some(body) = body else {
            return Ok((self.declarations(block)?, false));
        };
        let properties = scan_declarations(body);
        for property in &properties {
            let (name, disabled) = normalize_property_name(&property.name);
            if !disabled && !declaration_supported(&name, &property.value) {
                self.recovered.push(format!(
                    "line {}: `{}: {}` is not valid for the property and is kept as written",
                    loc.line + 1,
                    property.name,
                    property.value
                ));
            }
        }
        Ok((self.stage_declarations(properties), true))
    }

    fn declarations(&mut self, block: &DeclarationBlock) -> Result<Vec<SyntaxId>, InspectorError> {
        let properties = declaration_block_properties(block)?;
        Ok(self.stage_declarations(properties))
    }

    fn stage_declarations(&mut self, properties: Vec<InlineProperty>) -> Vec<SyntaxId> {
        let mut out = Vec::with_capacity(properties.len());
        for property in properties {
            out.push(self.stage(
                SyntaxKind::Declaration {
                    property: property.name,
                    value: property.value.trim().to_string(),
                    important: property.important,
                },
                None,
                Vec::new(),
            ));
        }
        out
    }

    fn nested(
        &mut self,
        name: &str,
        prelude: String,
        rules: &[CssRule<'_>],
        line: u32,
    ) -> Result<Vec<SyntaxId>, InspectorError> {
        let mut children = Vec::new();
        for rule in rules {
            children.extend(self.convert_rule(rule)?);
        }
        Ok(vec![self.stage(
            SyntaxKind::AtRule {
                name: name.to_string(),
                prelude,
                block: AtRuleBlock::Nested,
            },
            Some(line + 1),
            children,
        )])
    }

    fn convert_rule(&mut self, rule: &CssRule<'_>) -> Result<Vec<SyntaxId>, InspectorError> {
        match rule {
            CssRule::Style(style) => {
                let selector = style
                    .selectors
                    .to_css_string(printer_options())
                    .map_err(|err| self.printer_error(err))?;
                let (mut children, from_source) = self.rule_declarations(style.loc, &style.declarations)?;
                for nested in &style.rules.0 {
                    if from_source && matches!(nested, CssRule::NestedDeclarations(_)) {
                        continue;
                    }
                    children.extend(self.convert_rule(nested)?);
                }
                Ok(vec![self.stage(
                    SyntaxKind::SelectorRule { selector },
                    Some(style.loc.line + 1),
                    children,
                )])
            }
            CssRule::NestedDeclarations(nested) => self.declarations(&nested.declarations),
            CssRule::Media(media) => {
                let prelude = media
                    .query
                    .to_css_string(printer_options())
                    .map_err(|err| self.printer_error(err))?;
                self.nested("media", prelude, &media.rules.0, media.loc.line)
            }
            CssRule::Supports(supports) => {
                let prelude = supports
                    .condition
                    .to_css_string(printer_options())
                    .map_err(|err| self.printer_error(err))?;
                self.nested("supports", prelude, &supports.rules.0, supports.loc.line)
            }
            CssRule::Container(container) => {
                let mut parts = Vec::new();
                if let Some(name) = &container.name {
                    parts.push(name.to_css_string(printer_options()).map_err(|err| self.printer_error(err))?);
                }
                if let Some(condition) = &container.condition {
                    parts.push(
                        condition
                            .to_css_string(printer_options())
                            .map_err(|err| self.printer_error(err))?,
                    );
                }
                self.nested("container", parts.join(" "), &container.rules.0, container.loc.line)
            }
            CssRule::LayerBlock(layer) => {
                let prelude = match &layer.name {
                    Some(name) => name.to_css_string(printer_options()).map_err(|err| self.printer_error(err))?,
                    None => String::new(),
                };
                self.nested("layer", prelude, &layer.rules.0, layer.loc.line)
            }
            CssRule::StartingStyle(starting) => {
                self.nested("starting-style", String::new(), &starting.rules.0, starting.loc.line)
            }
            CssRule::Scope(scope) => {
                let head = match rule.to_css_string(printer_options()) {
                    Ok(text) => split_at_rule(&text).map(|(_, prelude, _)| prelude).unwrap_or_default(),
                    Err(err) => return Err(self.printer_error(err)),
                };
                self.nested("scope", head, &scope.rules.0, scope.loc.line)
            }
            CssRule::Ignored => Ok(Vec::new()),
            other => self.opaque(other),
        }
    }

    /// Source text of an at-rule, from its `@` through its `;` or `}`.
    fn written_at_rule(&self, loc: Location) -> Option<&'a str> {
        let (source, scan) = (self.source, self.scan);
        let offset = byte_offset(source, loc)?;
        let rest = scan.get(offset..)?;
        let offset = offset + (rest.len() - rest.trim_start().len());
        if !scan[offset..].starts_with('@') {
            return None;
        }
        let end = match rule_extent(scan, offset)? {
            Extent::Block { close, .. } => close,
            Extent::Statement { end } => end,
        };
        source.get(offset..=end)
    }

    fn opaque(&mut self, rule: &CssRule<'_>) -> Result<Vec<SyntaxId>, InspectorError> {
        let loc = rule_loc(rule);
        let text = match loc.and_then(|loc| self.written_at_rule(loc)) {
            Some(written) => written.to_string(),
            None => match rule.to_css_string(printer_options()) {
                Ok(text) => text,
                Err(err) => {
                    log::debug!("{}: dropping unprintable at-rule: {}", self.source_name, err);
                    return Ok(Vec::new());
                }
            },
        };
        let Some((name, prelude, block)) = split_at_rule(&text) else {
            return Ok(Vec::new());
        };
        let line = loc.map(|loc| loc.line + 1);
        Ok(vec![self.stage(
            SyntaxKind::AtRule {
                name,
                prelude,
                block,
            },
            line,
            Vec::new(),
        )])
    }
}

fn rule_loc(rule: &CssRule<'_>) -> Option<Location> {
    let loc = match rule {
        CssRule::Import(r) => r.loc,
        CssRule::Namespace(r) => r.loc,
        CssRule::LayerStatement(r) => r.loc,
        CssRule::FontFace(r) => r.loc,
        CssRule::Keyframes(r) => r.loc,
        CssRule::Page(r) => r.loc,
        CssRule::Property(r) => r.loc,
        CssRule::CounterStyle(r) => r.loc,
        CssRule::FontPaletteValues(r) => r.loc,
        CssRule::FontFeatureValues(r) => r.loc,
        CssRule::Viewport(r) => r.loc,
        CssRule::ViewTransition(r) => r.loc,
        CssRule::PositionTry(r) => r.loc,
        CssRule::Unknown(r) => r.loc,
        _ => return None,
    };
    Some(loc)
}

/// Byte offset of a parser location. Columns count UTF-16 units from 1.
fn byte_offset(source: &str, loc: Location) -> Option<usize> {
    let mut line_start = 0;
    for _ in 0..loc.line {
        line_start += source[line_start..].find('\n')? + 1;
    }
    let mut column = 1;
    for (idx, ch) in source[line_start..].char_indices() {
        if column >= loc.column {
            return Some(line_start + idx);
        }
        if ch == '\n' {
            return None;
        }
        column += ch.len_utf16() as u32;
    }
    None
}

enum Extent {
    /// Byte indices of the outer `{` and its matching `}`.
    Block { open: usize, close: usize },
    /// Byte index of the terminating `;`.
    Statement { end: usize },
}

/// Finds where the rule starting at `offset` ends. `text` must have its
/// comments blanked.
fn rule_extent(text: &str, offset: usize) -> Option<Extent> {
    let mut quote: Option<char> = None;
    let mut escaped = false;
    let mut parens = 0usize;
    let mut depth = 0usize;
    let mut open = None;
    for (idx, ch) in text.get(offset..)?.char_indices() {
        let idx = offset + idx;
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == q {
                quote = None;
            }
            continue;
        }
        match ch {
            '"' | '\'' => quote = Some(ch),
            '(' | '[' => parens += 1,
            ')' | ']' => parens = parens.saturating_sub(1),
            '{' => {
                open.get_or_insert(idx);
                depth += 1;
            }
            '}' => {
                let start = open?;
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(Extent::Block { open: start, close: idx });
                }
            }
            ';' if open.is_none() && parens == 0 => return Some(Extent::Statement { end: idx }),
            _ => {}
        }
    }
    None
}

/// Splits printed at-rule text into name, prelude and block.
fn split_at_rule(text: &str) -> Option<(String, String, AtRuleBlock)> {
    let text = text.trim();
    let rest = text.strip_prefix('@')?;
    let name_end = rest
        .find(|ch: char| ch.is_whitespace() || ch == '{' || ch == ';' || ch == '(')
        .unwrap_or(rest.len());
    let name = rest[..name_end].to_string();
    let after_name = &rest[name_end..];

    let mut quote: Option<char> = None;
    let mut parens = 0usize;
    let mut boundary = None;
    for (idx, ch) in after_name.char_indices() {
        match quote {
            Some(q) if ch == q => quote = None,
            Some(_) => {}
            None => match ch {
                '"' | '\'' => quote = Some(ch),
                '(' | '[' => parens += 1,
                ')' | ']' => parens = parens.saturating_sub(1),
                '{' | ';' if parens == 0 => {
                    boundary = Some((idx, ch));
                    break;
                }
                _ => {}
            },
        }
    }

    match boundary {
        Some((idx, '{')) => {
            let prelude = after_name[..idx].trim().to_string();
            let body_start = idx + 1;
            let body_end = after_name.rfind('}').filter(|end| *end >= body_start)?;
            let body = dedent(&after_name[body_start..body_end]);
            Some((name, prelude, AtRuleBlock::Opaque(body)))
        }
        Some((idx, _)) => Some((name, after_name[..idx].trim().to_string(), AtRuleBlock::Statement)),
        None => Some((name, after_name.trim().to_string(), AtRuleBlock::Statement)),
    }
}

/// Drops blank lines and the indent shared by the remaining ones.
fn dedent(body: &str) -> String {
    let lines: Vec<&str> = body.lines().filter(|line| !line.trim().is_empty()).collect();
    let indent = lines
        .iter()
        .map(|line| line.len() - line.trim_start().len())
        .min()
        .unwrap_or(0);
    lines
        .iter()
        .map(|line| line.get(indent..).unwrap_or(line.trim_start()).trim_end())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Validates a selector list and returns its canonical text.
pub fn parse_selector(text: &str) -> Result<String, InspectorError> {
    let text = text.trim();
    if text.is_empty() || text.contains(['{', '}', ';']) {
        return Err(InspectorError::InvalidSelector(text.to_string()));
    }
    let source = format!("{} {{}}", text);
    let rule = CssRule::parse_string(&source, ParserOptions::default())
        .map_err(|_| InspectorError::InvalidSelector(text.to_string()))?;
    match rule {
        CssRule::Style(style) => style
            .selectors
            .to_css_string(printer_options())
            .map_err(|_| InspectorError::InvalidSelector(text.to_string())),
        _ => Err(InspectorError::InvalidSelector(text.to_string())),
    }
}

/// Validates `property: value` and returns the normalized property name and
/// the value as written. Disabled and custom properties are not checked.
pub fn parse_declaration_value(property: &str, value: &str) -> Result<(String, String), InspectorError> {
    let property = property.trim();
    let value = value.trim();
    let invalid = || InspectorError::InvalidDeclaration(format!("{}: {}", property, value));
    if property.is_empty() || value.is_empty() || value.contains(['{', '}', ';']) {
        return Err(invalid());
    }
    let (name, disabled) = normalize_property_name(property);
    if disabled || name.starts_with("--") {
        return Ok((property.to_string(), value.to_string()));
    }
    if !declaration_supported(&name, value) {
        return Err(invalid());
    }
    Ok((name, value.to_string()))
}

/// At-rules whose condition can be edited in place.
pub const EDITABLE_AT_RULES: [&str; 5] = ["media", "supports", "container", "layer", "scope"];

/// Validates the prelude of a grouping at-rule and returns its canonical
/// text, e.g. `(width >= 600px)` for `media` prints as `(min-width: 600px)`.
pub fn parse_at_rule_prelude(name: &str, prelude: &str) -> Result<String, InspectorError> {
    let name = name.trim().to_ascii_lowercase();
    let prelude = prelude.trim();
    let invalid = || InspectorError::Parse {
        source_name: format!("@{}", name),
        message: format!("invalid condition `{}`", prelude),
    };
    if !EDITABLE_AT_RULES.contains(&name.as_str()) {
        return Err(InspectorError::UnsupportedEdit(format!("@{} has no editable condition", name)));
    }
    if prelude.contains(['{', '}', ';']) || (prelude.is_empty() && name != "layer" && name != "scope") {
        return Err(invalid());
    }
    let source = format!("@{} {} {{ a {{ color: red }} }}", name, prelude);
    let sheet = StyleSheet::parse(&source, ParserOptions::default()).map_err(|_| invalid())?;
    let [rule] = sheet.rules.0.as_slice() else {
        return Err(invalid());
    };
    if matches!(rule, CssRule::Unknown(_) | CssRule::Ignored) {
        return Err(invalid());
    }
    let text = rule.to_css_string(printer_options()).map_err(|_| invalid())?;
    match split_at_rule(&text) {
        Some((parsed, canonical, _)) if parsed == name => Ok(canonical),
        _ => Err(invalid()),
    }
}
