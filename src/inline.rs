use lightningcss::declaration::DeclarationBlock;
use lightningcss::properties::Property;
use lightningcss::stylesheet::{ParserOptions, PrinterOptions, StyleAttribute};
use lightningcss::traits::ToCss;

use crate::cascade::{DeclarationId, MatchedDeclaration, MatchedRule, RuleUid};
use crate::document::{InspectElement, declaration_supported};
use crate::error::InspectorError;
use crate::selector::Specificity;
use crate::types::Origin;

/// Name prefix that parks a declaration as an inert custom property.
pub const DISABLED_PREFIX: &str = "--disabled-";
pub const NEW_PROPERTY_NAME: &str = "--new-property";
pub const NEW_PROPERTY_VALUE: &str = "inherit";
pub const INLINE_SELECTOR: &str = "element.style";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineProperty {
    pub name: String,
    pub value: String,
    pub important: bool,
}

impl InlineProperty {
    pub fn new(name: &str, value: &str, important: bool) -> Self {
        Self {
            name: name.to_string(),
            value: value.to_string(),
            important,
        }
    }
}

/// Strips the disabled marker. Returns the property name and whether it was
/// disabled. Custom property names keep their case.
pub fn normalize_property_name(name: &str) -> (String, bool) {
    let name = name.trim();
    let (bare, disabled) = match name.strip_prefix(DISABLED_PREFIX) {
        Some(rest) if !rest.is_empty() => (rest, true),
        _ => (name, false),
    };
    if bare.starts_with("--") {
        (bare.to_string(), disabled)
    } else {
        (bare.to_ascii_lowercase(), disabled)
    }
}

pub fn disabled_name(property: &str) -> String {
    format!("{}{}", DISABLED_PREFIX, property)
}

/// Replaces comments with spaces so byte offsets into `text` stay valid.
pub(crate) fn blank_comments(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    let mut quote: Option<char> = None;
    while let Some(ch) = chars.next() {
        match quote {
            Some(q) => {
                out.push(ch);
                if ch == '\\' {
                    if let Some(escaped) = chars.next() {
                        out.push(escaped);
                    }
                } else if ch == q {
                    quote = None;
                }
            }
            None if ch == '/' && chars.peek() == Some(&'*') => {
                chars.next();
                out.push_str("  ");
                let mut prev = '\0';
                for inner in chars.by_ref() {
                    if inner == '\n' {
                        out.push('\n');
                    } else {
                        out.extend(std::iter::repeat_n(' ', inner.len_utf8()));
                    }
                    if prev == '*' && inner == '/' {
                        break;
                    }
                    prev = inner;
                }
            }
            None => {
                if ch == '"' || ch == '\'' {
                    quote = Some(ch);
                }
                out.push(ch);
            }
        }
    }
    out
}

fn split_important(value: &str) -> (&str, bool) {
    if let Some(bang) = value.rfind('!') {
        if value[bang + 1..].trim().eq_ignore_ascii_case("important") {
            return (value[..bang].trim_end(), true);
        }
    }
    (value, false)
}

fn declaration_from(segment: &str) -> Option<InlineProperty> {
    let (name, value) = segment.split_once(':')?;
    let name = name.trim();
    if name.is_empty() || name.contains(char::is_whitespace) {
        return None;
    }
    let (value, important) = split_important(value.trim());
    if value.is_empty() && !name.starts_with("--") {
        return None;
    }
    Some(InlineProperty::new(name, value, important))
}

/// Splits declaration-list text into declarations exactly as written,
/// including ones no property grammar accepts. Comments and nested rule
/// blocks are skipped.
pub fn scan_declarations(text: &str) -> Vec<InlineProperty> {
    let text = blank_comments(text);
    let mut out = Vec::new();
    let mut start = 0;
    let mut parens = 0usize;
    let mut braces = 0usize;
    let mut nested_rule = false;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for (idx, ch) in text.char_indices() {
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
                if braces == 0 && parens == 0 {
                    nested_rule = !text[start..idx].trim_start().starts_with("--");
                }
                braces += 1;
            }
            '}' => {
                braces = braces.saturating_sub(1);
                if braces == 0 && nested_rule {
                    nested_rule = false;
                    start = idx + 1;
                }
            }
            ';' if parens == 0 && braces == 0 => {
                out.extend(declaration_from(&text[start..idx]));
                start = idx + 1;
            }
            _ => {}
        }
    }
    if braces == 0 && !nested_rule {
        out.extend(declaration_from(&text[start..]));
    }
    out
}

/// Parses declaration-list text, keeping each value as written. Without
/// `recover` the whole list must parse; with it, declarations the property
/// grammar rejects are dropped the way a live `element.style` drops them.
pub fn parse_declaration_list(
    text: &str,
    recover: bool,
) -> Result<Vec<InlineProperty>, InspectorError> {
    if recover {
        return Ok(scan_declarations(text)
            .into_iter()
            .filter(|property| {
                let (name, disabled) = normalize_property_name(&property.name);
                disabled || declaration_supported(&name, &property.value)
            })
            .collect());
    }
    StyleAttribute::parse(text, ParserOptions::default()).map_err(|err| InspectorError::Parse {
        source_name: INLINE_SELECTOR.to_string(),
        message: err.to_string(),
    })?;
    Ok(scan_declarations(text))
}

pub(crate) fn declaration_block_properties(
    block: &DeclarationBlock,
) -> Result<Vec<InlineProperty>, InspectorError> {
    let mut out = Vec::with_capacity(block.len());
    for property in &block.declarations {
        out.push(render_property(property, false)?);
    }
    for property in &block.important_declarations {
        out.push(render_property(property, true)?);
    }
    Ok(out)
}

pub(crate) fn render_property(
    property: &Property,
    important: bool,
) -> Result<InlineProperty, InspectorError> {
    let serialization = |err: lightningcss::error::PrinterError| InspectorError::Serialization {
        source_name: INLINE_SELECTOR.to_string(),
        message: err.to_string(),
    };
    let name = property
        .property_id()
        .to_css_string(PrinterOptions::default())
        .map_err(serialization)?;
    let value = property
        .value_to_css_string(PrinterOptions::default())
        .map_err(serialization)?;
    Ok(InlineProperty {
        name,
        value,
        important,
    })
}

/// Renders properties as `style` attribute text.
pub fn format_declarations(properties: &[InlineProperty]) -> String {
    properties
        .iter()
        .map(|property| {
            if property.important {
                format!("{}: {} !important;", property.name, property.value)
            } else {
                format!("{}: {};", property.name, property.value)
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

pub struct InlineDeclarationParser;

impl InlineDeclarationParser {
    /// Declarations of the element's `style` attribute, falling back to the
    /// element's live inline style when the text does not parse.
    pub fn parse<E: InspectElement>(element: &E) -> Option<Vec<InlineProperty>> {
        let text = element.style_attribute()?;
        if text.trim().is_empty() {
            return None;
        }
        match parse_declaration_list(&text, false) {
            Ok(properties) => Some(properties),
            Err(err) => {
                log::debug!("inline style fell back to live enumeration: {}", err);
                Some(element.live_inline_style())
            }
        }
    }

    /// The synthetic `element.style` rule for an element. `None` when there
    /// is no style text, or for an ancestor with nothing declared.
    pub fn rule<E: InspectElement>(
        element: &E,
        is_target: bool,
        depth: usize,
    ) -> Option<MatchedRule> {
        let properties = Self::parse(element)?;
        if !is_target && properties.is_empty() {
            return None;
        }
        let declarations = properties
            .into_iter()
            .enumerate()
            .map(|(idx, property)| {
                MatchedDeclaration::new(
                    DeclarationId::Inline(idx),
                    &property.name,
                    property.value,
                    property.important,
                )
            })
            .collect();
        Some(MatchedRule {
            uid: if is_target {
                RuleUid::InlineTarget
            } else {
                RuleUid::InlineAncestor(depth)
            },
            selector: INLINE_SELECTOR.to_string(),
            declarations,
            specificity: Specificity::INLINE,
            context: Vec::new(),
            active: true,
            origin: Origin::Inline,
            source_name: INLINE_SELECTOR.to_string(),
            readonly: false,
            line: None,
        })
    }
}

/// Which half of an inline declaration an edit replaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclarationField {
    Property,
    Value,
}

// Edits work on the attribute text so declarations the grammar rejects
// survive a rewrite.
fn current_properties<E: InspectElement>(element: &E) -> Vec<InlineProperty> {
    element
        .style_attribute()
        .map(|text| scan_declarations(&text))
        .unwrap_or_default()
}

fn position_of(properties: &[InlineProperty], property: &str) -> Option<usize> {
    properties.iter().position(|candidate| {
        let (name, _) = normalize_property_name(&candidate.name);
        name == property
    })
}

/// Appends the `--new-property: inherit` placeholder.
pub fn add_inline_property<E: InspectElement>(element: &E) {
    let mut properties = current_properties(element);
    properties.push(InlineProperty::new(NEW_PROPERTY_NAME, NEW_PROPERTY_VALUE, false));
    element.set_style_attribute(&format_declarations(&properties));
}

/// Renames a property or replaces its value. A value the property grammar
/// rejects is kept as `--disabled-<prop>` so the text is not lost.
pub fn update_inline_property<E: InspectElement>(
    element: &E,
    property: &str,
    field: DeclarationField,
    new_text: &str,
) -> Result<(), InspectorError> {
    let mut properties = current_properties(element);
    let idx = position_of(&properties, property)
        .ok_or_else(|| InspectorError::NodeNotFound(format!("inline {}", property)))?;
    let existing = properties.remove(idx);
    let (name, value) = match field {
        DeclarationField::Property => {
            let renamed = new_text.trim();
            if renamed.is_empty() {
                return Err(InspectorError::InvalidDeclaration(
                    "property name is empty".to_string(),
                ));
            }
            (renamed.to_string(), existing.value.clone())
        }
        DeclarationField::Value => (property.to_string(), new_text.trim().to_string()),
    };
    properties.retain(|candidate| normalize_property_name(&candidate.name).0 != name);
    let replacement = if declaration_supported(&name, &value) {
        InlineProperty::new(&name, &value, existing.important)
    } else {
        log::warn!("rejected {}: {}; preserving as {}", name, value, disabled_name(&name));
        InlineProperty::new(&disabled_name(&name), &value, existing.important)
    };
    properties.insert(idx.min(properties.len()), replacement);
    element.set_style_attribute(&format_declarations(&properties));
    Ok(())
}

/// Flips a property between active and `--disabled-` form. Returns whether
/// the property is disabled afterwards.
pub fn toggle_inline_property<E: InspectElement>(
    element: &E,
    property: &str,
) -> Result<bool, InspectorError> {
    let mut properties = current_properties(element);
    let idx = position_of(&properties, property)
        .ok_or_else(|| InspectorError::NodeNotFound(format!("inline {}", property)))?;
    let (name, disabled) = normalize_property_name(&properties[idx].name);
    properties[idx].name = if disabled { name } else { disabled_name(&name) };
    element.set_style_attribute(&format_declarations(&properties));
    Ok(!disabled)
}

pub fn delete_inline_property<E: InspectElement>(
    element: &E,
    property: &str,
) -> Result<(), InspectorError> {
    let mut properties = current_properties(element);
    let idx = position_of(&properties, property)
        .ok_or_else(|| InspectorError::NodeNotFound(format!("inline {}", property)))?;
    properties.remove(idx);
    element.set_style_attribute(&format_declarations(&properties));
    Ok(())
}
