use kuchiki::traits::TendrilSink;
use kuchiki::{NodeData, NodeRef, Selectors};

use crate::document::{
    InspectElement, OwnerDescriptor, RuleAccess, SheetSource, StyleDocument,
};
use crate::error::InspectorError;
use crate::inline::{InlineProperty, parse_declaration_list};
use crate::types::Origin;

/// Parsed HTML document acting as the live page for the inspector.
#[derive(Debug, Clone)]
pub struct HtmlDocument {
    root: NodeRef,
}

/// Handle to one element of an [`HtmlDocument`].
#[derive(Debug, Clone, PartialEq)]
pub struct HtmlElement {
    node: NodeRef,
}

impl HtmlDocument {
    /// Parses the markup and gives every anonymous `<style>` block a stable
    /// `style-N` id so it can be written back later.
    pub fn parse(html: &str) -> Self {
        let document = Self {
            root: kuchiki::parse_html().one(html),
        };
        document.assign_style_ids();
        document
    }

    fn assign_style_ids(&self) {
        let mut counter = 0usize;
        for node in self.style_nodes() {
            if let Some(element) = node.as_element() {
                let mut attrs = element.attributes.borrow_mut();
                if attrs.get("id").map(str::is_empty).unwrap_or(true) {
                    counter += 1;
                    attrs.insert("id", format!("style-{counter}"));
                }
            }
        }
    }

    fn style_nodes(&self) -> Vec<NodeRef> {
        let mut out = Vec::new();
        if let Ok(styles) = self.root.select("style") {
            for style in styles {
                let node = style.as_node();
                if nested_in_svg(node) {
                    continue;
                }
                out.push(node.clone());
            }
        }
        out
    }

    pub fn select_first(&self, selector: &str) -> Option<HtmlElement> {
        self.root
            .select_first(selector)
            .ok()
            .map(|element| HtmlElement {
                node: element.as_node().clone(),
            })
    }

    pub fn select_all(&self, selector: &str) -> Vec<HtmlElement> {
        match self.root.select(selector) {
            Ok(found) => found
                .map(|element| HtmlElement {
                    node: element.as_node().clone(),
                })
                .collect(),
            Err(()) => Vec::new(),
        }
    }

    /// Text of the `<style>` block with the given id.
    pub fn style_text(&self, id: &str) -> Option<String> {
        self.find_style(id).map(|node| node.text_contents())
    }

    pub fn to_html(&self) -> String {
        self.root.to_string()
    }

    fn find_style(&self, id: &str) -> Option<NodeRef> {
        self.style_nodes().into_iter().find(|node| {
            node.as_element()
                .map(|element| element.attributes.borrow().get("id") == Some(id))
                .unwrap_or(false)
        })
    }

    fn create_style(&self, origin: Origin, source_name: &str) -> Result<NodeRef, InspectorError> {
        let fragment = kuchiki::parse_html().one("<style></style>");
        let created = fragment
            .select_first("style")
            .map_err(|_| InspectorError::Document("cannot create <style> element".to_string()))?
            .as_node()
            .clone();
        created.detach();
        if let Some(element) = created.as_element() {
            let mut attrs = element.attributes.borrow_mut();
            attrs.insert("id", source_name.to_string());
            attrs.insert("data-location", origin.marker().to_string());
        }
        let container = self
            .root
            .select_first("head")
            .or_else(|_| self.root.select_first("html"))
            .map(|element| element.as_node().clone())
            .unwrap_or_else(|_| self.root.clone());
        container.append(created.clone());
        Ok(created)
    }
}

fn nested_in_svg(node: &NodeRef) -> bool {
    node.ancestors().any(|ancestor| {
        if let NodeData::Element(el) = ancestor.data() {
            el.name.local.as_ref().eq_ignore_ascii_case("svg")
        } else {
            false
        }
    })
}

impl StyleDocument for HtmlDocument {
    type Element = HtmlElement;

    fn stylesheets(&self) -> Vec<SheetSource> {
        let mut sheets = Vec::new();
        let Ok(owners) = self.root.select("style, link") else {
            return sheets;
        };
        for owner in owners {
            let node = owner.as_node();
            if nested_in_svg(node) {
                continue;
            }
            let tag_name = owner.name.local.as_ref().to_ascii_lowercase();
            let attrs = owner.attributes.borrow();
            let descriptor = OwnerDescriptor {
                tag_name: tag_name.clone(),
                id: attrs.get("id").filter(|id| !id.is_empty()).map(str::to_string),
            };
            let origin_marker = attrs.get("data-location").map(str::to_string);
            let readonly = attrs.get("data-readonly") == Some("true");
            let sheet = if tag_name == "style" {
                SheetSource {
                    owner: descriptor,
                    origin_marker,
                    readonly,
                    owner_text: Some(node.text_contents()),
                    rules: RuleAccess::Readable(Vec::new()),
                }
            } else {
                let rel = attrs.get("rel").unwrap_or("").to_ascii_lowercase();
                if !rel.split_whitespace().any(|token| token == "stylesheet") {
                    continue;
                }
                // Fetching is the acquisition step's job; an un-inlined link
                // is as opaque as a cross-origin sheet.
                SheetSource {
                    owner: descriptor,
                    origin_marker,
                    readonly,
                    owner_text: None,
                    rules: RuleAccess::Denied(attrs.get("href").unwrap_or("").to_string()),
                }
            };
            sheets.push(sheet);
        }
        sheets
    }

    fn write_style_container(
        &mut self,
        origin: Origin,
        source_name: &str,
        css: &str,
    ) -> Result<(), InspectorError> {
        let node = match self.find_style(source_name) {
            Some(node) => node,
            None => self.create_style(origin, source_name)?,
        };
        let children: Vec<NodeRef> = node.children().collect();
        for child in children {
            child.detach();
        }
        node.append(NodeRef::new_text(css));
        Ok(())
    }
}

impl HtmlElement {
    fn attribute(&self, name: &str) -> Option<String> {
        self.node
            .as_element()
            .and_then(|element| element.attributes.borrow().get(name).map(str::to_string))
    }
}

impl InspectElement for HtmlElement {
    fn tag_name(&self) -> String {
        self.node
            .as_element()
            .map(|element| element.name.local.as_ref().to_ascii_lowercase())
            .unwrap_or_default()
    }

    fn element_id(&self) -> Option<String> {
        self.attribute("id").filter(|id| !id.is_empty())
    }

    fn class_name(&self) -> String {
        self.attribute("class").unwrap_or_default()
    }

    fn style_attribute(&self) -> Option<String> {
        self.attribute("style")
    }

    fn set_style_attribute(&self, text: &str) {
        if let Some(element) = self.node.as_element() {
            element
                .attributes
                .borrow_mut()
                .insert("style", text.to_string());
        }
    }

    fn live_inline_style(&self) -> Vec<InlineProperty> {
        match self.style_attribute() {
            Some(text) => parse_declaration_list(&text, true).unwrap_or_default(),
            None => Vec::new(),
        }
    }

    fn parent_element(&self) -> Option<Self> {
        let parent = self.node.parent()?;
        parent.as_element()?;
        Some(HtmlElement { node: parent })
    }

    fn matches(&self, selector: &str) -> Result<bool, InspectorError> {
        let compiled = Selectors::compile(selector)
            .map_err(|_| InspectorError::InvalidSelector(selector.to_string()))?;
        Ok(self
            .node
            .clone()
            .into_element_ref()
            .map(|element| compiled.matches(&element))
            .unwrap_or(false))
    }
}
