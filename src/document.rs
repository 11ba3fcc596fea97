use lightningcss::media_query::{
    MediaCondition, MediaFeature, MediaFeatureComparison, MediaFeatureId, MediaFeatureName,
    MediaFeatureValue, MediaList, MediaQuery, MediaType, Operator, Qualifier,
};
use lightningcss::properties::{Property, PropertyId};
use lightningcss::rules::CssRule;
use lightningcss::rules::supports::SupportsCondition;
use lightningcss::stylesheet::{ParserOptions, PrinterOptions, StyleSheet};
use lightningcss::traits::{Parse, ToCss};

use crate::error::InspectorError;
use crate::inline::InlineProperty;
use crate::types::{Origin, Viewport};

/// The element a stylesheet is attached to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnerDescriptor {
    pub tag_name: String,
    pub id: Option<String>,
}

/// What the sheet's rule list exposes when the owner has no text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleAccess {
    Readable(Vec<String>),
    /// Cross-origin protection; the payload is the sheet's URL or label.
    Denied(String),
}

/// One stylesheet as handed over by the acquisition step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetSource {
    pub owner: OwnerDescriptor,
    pub origin_marker: Option<String>,
    pub readonly: bool,
    pub owner_text: Option<String>,
    pub rules: RuleAccess,
}

impl SheetSource {
    /// An on-page `<style>` block with the given id and text.
    pub fn style_block(id: Option<&str>, text: &str) -> Self {
        Self {
            owner: OwnerDescriptor {
                tag_name: "style".to_string(),
                id: id.map(str::to_string),
            },
            origin_marker: None,
            readonly: false,
            owner_text: Some(text.to_string()),
            rules: RuleAccess::Readable(Vec::new()),
        }
    }

    pub fn with_origin(mut self, marker: &str) -> Self {
        self.origin_marker = Some(marker.to_string());
        self
    }

    pub fn read_only(mut self) -> Self {
        self.readonly = true;
        self
    }
}

/// Element handle used by the cascade. Handles are cheap clones of a
/// reference into the live document.
pub trait InspectElement: Clone {
    /// Lower-case tag name.
    fn tag_name(&self) -> String;
    fn element_id(&self) -> Option<String>;
    fn class_name(&self) -> String;
    fn style_attribute(&self) -> Option<String>;
    fn set_style_attribute(&self, text: &str);
    /// The declarations the live element reports for its inline style, with
    /// anything the engine rejected already dropped.
    fn live_inline_style(&self) -> Vec<InlineProperty>;
    fn parent_element(&self) -> Option<Self>;
    /// `Err` when the selector cannot be compiled.
    fn matches(&self, selector: &str) -> Result<bool, InspectorError>;
}

pub trait StyleDocument {
    type Element: InspectElement;

    fn stylesheets(&self) -> Vec<SheetSource>;

    /// Sets the text of the style container for `(origin, source_name)`,
    /// creating the container when none exists.
    fn write_style_container(
        &mut self,
        origin: Origin,
        source_name: &str,
        css: &str,
    ) -> Result<(), InspectorError>;
}

/// Condition evaluators. `Err` means the condition could not be evaluated.
pub trait Environment {
    fn match_media(&self, condition: &str, viewport: &Viewport) -> Result<bool, InspectorError>;
    fn supports(&self, condition: &str) -> Result<bool, InspectorError>;
}

/// Evaluates conditions against a viewport without a rendering engine.
#[derive(Debug, Clone, Copy, Default)]
pub struct ViewportEnvironment {
    prefer_print: bool,
}

impl ViewportEnvironment {
    pub fn screen() -> Self {
        Self {
            prefer_print: false,
        }
    }

    pub fn print() -> Self {
        Self { prefer_print: true }
    }
}

impl Environment for ViewportEnvironment {
    fn match_media(&self, condition: &str, viewport: &Viewport) -> Result<bool, InspectorError> {
        let text = format!("@media {} {{}}", condition);
        let rule = CssRule::parse_string(&text, ParserOptions::default()).map_err(|err| {
            InspectorError::Parse {
                source_name: "@media".to_string(),
                message: format!("{:?}", err.kind),
            }
        })?;
        match rule {
            CssRule::Media(media) => Ok(media_list_matches(&media.query, viewport, self.prefer_print)),
            _ => Err(InspectorError::Parse {
                source_name: "@media".to_string(),
                message: format!("not a media query: {}", condition),
            }),
        }
    }

    fn supports(&self, condition: &str) -> Result<bool, InspectorError> {
        let parsed = SupportsCondition::parse_string(condition).map_err(|err| {
            InspectorError::Parse {
                source_name: "@supports".to_string(),
                message: format!("{:?}", err.kind),
            }
        })?;
        supports_condition_matches(&parsed)
    }
}

pub(crate) fn media_list_matches(list: &MediaList, viewport: &Viewport, prefer_print: bool) -> bool {
    if list.media_queries.is_empty() {
        return true;
    }
    list.media_queries
        .iter()
        .any(|query| media_query_matches(query, viewport, prefer_print) == Some(true))
}

fn media_query_matches(query: &MediaQuery, viewport: &Viewport, prefer_print: bool) -> Option<bool> {
    let media_type_matches = if prefer_print {
        matches!(query.media_type, MediaType::All | MediaType::Print)
    } else {
        matches!(query.media_type, MediaType::All | MediaType::Screen)
    };
    let condition_matches = match &query.condition {
        Some(condition) => media_condition_matches(condition, viewport)?,
        None => true,
    };
    let result = media_type_matches && condition_matches;
    Some(match query.qualifier {
        Some(Qualifier::Not) => !result,
        _ => result,
    })
}

fn media_condition_matches(condition: &MediaCondition, viewport: &Viewport) -> Option<bool> {
    match condition {
        MediaCondition::Feature(feature) => media_feature_matches(feature, viewport),
        MediaCondition::Not(inner) => media_condition_matches(inner, viewport).map(|v| !v),
        MediaCondition::Operation {
            operator,
            conditions,
        } => {
            let mut values = Vec::with_capacity(conditions.len());
            for cond in conditions {
                values.push(media_condition_matches(cond, viewport)?);
            }
            Some(match operator {
                Operator::And => values.iter().all(|v| *v),
                Operator::Or => values.iter().any(|v| *v),
            })
        }
        MediaCondition::Unknown(_) => None,
    }
}

fn media_feature_matches(feature: &MediaFeature, viewport: &Viewport) -> Option<bool> {
    match feature {
        MediaFeature::Plain { name, value } => {
            media_feature_compare(name, MediaFeatureComparison::Equal, value, viewport)
        }
        MediaFeature::Range {
            name,
            operator,
            value,
        } => media_feature_compare(name, *operator, value, viewport),
        MediaFeature::Interval {
            name,
            start,
            start_operator,
            end,
            end_operator,
        } => {
            // `400px < width < 800px` reads value-first on the left side
            let left = media_feature_compare(name, flip(*start_operator), start, viewport)?;
            let right = media_feature_compare(name, *end_operator, end, viewport)?;
            Some(left && right)
        }
        MediaFeature::Boolean { .. } => None,
    }
}

fn media_feature_compare(
    name: &MediaFeatureName<MediaFeatureId>,
    operator: MediaFeatureComparison,
    value: &MediaFeatureValue,
    viewport: &Viewport,
) -> Option<bool> {
    let id = match name {
        MediaFeatureName::Standard(id) => id,
        _ => return None,
    };
    let (target, rhs) = match id {
        MediaFeatureId::Width | MediaFeatureId::DeviceWidth => {
            (viewport.width, media_length_px(value)?)
        }
        MediaFeatureId::Height | MediaFeatureId::DeviceHeight => {
            (viewport.height, media_length_px(value)?)
        }
        MediaFeatureId::AspectRatio | MediaFeatureId::DeviceAspectRatio => match value {
            MediaFeatureValue::Ratio(ratio) if ratio.1 != 0.0 && viewport.height > 0.0 => {
                (viewport.width / viewport.height, ratio.0 / ratio.1)
            }
            _ => return None,
        },
        MediaFeatureId::Orientation => {
            let wanted = match value {
                MediaFeatureValue::Ident(ident) => ident.0.to_ascii_lowercase(),
                _ => return None,
            };
            return match wanted.as_str() {
                "landscape" => Some(viewport.is_landscape()),
                "portrait" => Some(!viewport.is_landscape()),
                _ => None,
            };
        }
        _ => return None,
    };
    Some(match operator {
        MediaFeatureComparison::GreaterThan => target > rhs,
        MediaFeatureComparison::GreaterThanEqual => target >= rhs,
        MediaFeatureComparison::LessThan => target < rhs,
        MediaFeatureComparison::LessThanEqual => target <= rhs,
        MediaFeatureComparison::Equal => (target - rhs).abs() < f32::EPSILON,
    })
}

fn flip(operator: MediaFeatureComparison) -> MediaFeatureComparison {
    match operator {
        MediaFeatureComparison::GreaterThan => MediaFeatureComparison::LessThan,
        MediaFeatureComparison::GreaterThanEqual => MediaFeatureComparison::LessThanEqual,
        MediaFeatureComparison::LessThan => MediaFeatureComparison::GreaterThan,
        MediaFeatureComparison::LessThanEqual => MediaFeatureComparison::GreaterThanEqual,
        MediaFeatureComparison::Equal => MediaFeatureComparison::Equal,
    }
}

fn media_length_px(value: &MediaFeatureValue) -> Option<f32> {
    match value {
        MediaFeatureValue::Length(length) => length.to_px(),
        MediaFeatureValue::Number(number) if *number == 0.0 => Some(0.0),
        MediaFeatureValue::Integer(0) => Some(0.0),
        _ => None,
    }
}

const CSS_WIDE_KEYWORDS: [&str; 5] = ["inherit", "initial", "unset", "revert", "revert-layer"];

fn supports_condition_matches(condition: &SupportsCondition) -> Result<bool, InspectorError> {
    match condition {
        SupportsCondition::Not(inner) => Ok(!supports_condition_matches(inner)?),
        SupportsCondition::And(conditions) => {
            for cond in conditions {
                if !supports_condition_matches(cond)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        SupportsCondition::Or(conditions) => {
            for cond in conditions {
                if supports_condition_matches(cond)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        SupportsCondition::Declaration { property_id, value } => {
            let name = property_id
                .to_css_string(PrinterOptions::default())
                .map_err(|err| InspectorError::Parse {
                    source_name: "@supports".to_string(),
                    message: err.to_string(),
                })?;
            Ok(declaration_supported(&name, value.as_ref()))
        }
        SupportsCondition::Selector(selector) => {
            let text = format!("{} {{}}", selector.as_ref());
            Ok(StyleSheet::parse(&text, ParserOptions::default()).is_ok())
        }
        SupportsCondition::Unknown(raw) => Err(InspectorError::Parse {
            source_name: "@supports".to_string(),
            message: format!("unrecognized condition: {}", raw.as_ref()),
        }),
    }
}

/// Whether `name: value` is something the property grammar accepts.
pub(crate) fn declaration_supported(name: &str, value: &str) -> bool {
    let name = name.trim();
    let value = value.trim();
    if name.starts_with("--") {
        return true;
    }
    let property_id = PropertyId::from(name);
    if matches!(property_id, PropertyId::Custom(_)) {
        return false;
    }
    let lowered = value.to_ascii_lowercase();
    if CSS_WIDE_KEYWORDS.contains(&lowered.as_str()) {
        return true;
    }
    match Property::parse_string(property_id, value, ParserOptions::default()) {
        Ok(Property::Unparsed(_)) => lowered.contains("var(") || lowered.contains("env("),
        Ok(_) => true,
        Err(_) => false,
    }
}
