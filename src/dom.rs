use anyhow::Context as _;
use kuchiki::iter::NodeIterator as _;
use kuchiki::traits::TendrilSink as _;
use kuchiki::{ElementData, NodeDataRef, NodeRef};

/// A parsed, mutable HTML document.
pub struct Document {
    root: NodeRef,
}

impl Document {
    pub fn parse(html: &str) -> Self {
        Self {
            root: kuchiki::parse_html().one(html),
        }
    }

    pub fn root(&self) -> &NodeRef {
        &self.root
    }

    pub fn get_element_by_id(&self, id: &str) -> Option<Element> {
        find_by_id(&self.root, id)
    }

    pub fn query_selector(&self, selector: &str) -> Option<Element> {
        query_first(&self.root, selector)
    }

    pub fn body(&self) -> anyhow::Result<Element> {
        self.query_selector("body")
            .context("document has no <body>")
    }

    pub fn to_html(&self) -> anyhow::Result<String> {
        let mut out = Vec::new();
        self.root
            .serialize(&mut out)
            .context("serialize document")?;
        String::from_utf8(out).context("document html not utf-8")
    }
}

/// Handle to one element of a [`Document`].
///
/// Handles stay valid while the element is moved around or detached, like a
/// DOM node reference held by a script.
#[derive(Clone)]
pub struct Element(NodeDataRef<ElementData>);

impl Element {
    pub fn from_node(node: NodeRef) -> Option<Self> {
        node.into_element_ref().map(Self)
    }

    pub fn node(&self) -> &NodeRef {
        self.0.as_node()
    }

    pub fn tag(&self) -> String {
        self.0.name.local.to_string()
    }

    pub fn attr(&self, name: &str) -> Option<String> {
        self.0.attributes.borrow().get(name).map(|s| s.to_string())
    }

    pub fn has_attr(&self, name: &str) -> bool {
        self.0.attributes.borrow().contains(name)
    }

    pub fn set_attr(&self, name: &str, value: impl Into<String>) {
        self.0.attributes.borrow_mut().insert(name, value.into());
    }

    pub fn remove_attr(&self, name: &str) {
        self.0.attributes.borrow_mut().remove(name);
    }

    pub fn query_selector(&self, selector: &str) -> Option<Element> {
        query_first(self.node(), selector)
    }

    // Class list.

    pub fn classes(&self) -> Vec<String> {
        self.attr("class")
            .map(|c| c.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default()
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.classes().iter().any(|c| c == class)
    }

    pub fn add_class(&self, class: &str) {
        let mut classes = self.classes();
        if classes.iter().any(|c| c == class) {
            return;
        }
        classes.push(class.to_string());
        self.set_attr("class", classes.join(" "));
    }

    pub fn remove_class(&self, class: &str) {
        let classes = self.classes();
        if !classes.iter().any(|c| c == class) {
            return;
        }
        let kept: Vec<_> = classes.into_iter().filter(|c| c != class).collect();
        self.set_attr("class", kept.join(" "));
    }

    /// Flips `class` and returns whether it is present afterwards.
    pub fn toggle_class(&self, class: &str) -> bool {
        if self.has_class(class) {
            self.remove_class(class);
            false
        } else {
            self.add_class(class);
            true
        }
    }

    // Inline style.

    pub fn style_property(&self, property: &str) -> Option<String> {
        let style = self.attr("style")?;
        parse_style(&style)
            .into_iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(property))
            .map(|(_, value)| value)
    }

    pub fn set_style_property(&self, property: &str, value: &str) {
        let mut decls = self
            .attr("style")
            .map(|s| parse_style(&s))
            .unwrap_or_default();
        match decls
            .iter_mut()
            .find(|(name, _)| name.eq_ignore_ascii_case(property))
        {
            Some(decl) => decl.1 = value.to_string(),
            None => decls.push((property.to_string(), value.to_string())),
        }
        let style = decls
            .iter()
            .map(|(name, value)| format!("{name}: {value};"))
            .collect::<Vec<_>>()
            .join(" ");
        self.set_attr("style", style);
    }

    pub fn set_display(&self, display: &str) {
        self.set_style_property("display", display);
    }

    pub fn is_shown(&self) -> bool {
        self.style_property("display").as_deref() != Some("none")
    }

    // Content.

    pub fn text(&self) -> String {
        self.node().text_contents()
    }

    pub fn set_text(&self, text: &str) {
        self.clear_children();
        self.node().append(NodeRef::new_text(text));
    }

    pub fn inner_html(&self) -> anyhow::Result<String> {
        let mut out = Vec::new();
        for child in self.node().children() {
            child.serialize(&mut out).context("serialize child")?;
        }
        String::from_utf8(out).context("inner html not utf-8")
    }

    pub fn set_inner_html(&self, html: &str) {
        self.clear_children();
        for child in parse_fragment(html) {
            self.node().append(child);
        }
    }

    pub fn prepend(&self, node: NodeRef) {
        self.node().prepend(node);
    }

    pub fn replace_with(&self, node: NodeRef) {
        self.node().insert_before(node);
        self.node().detach();
    }

    fn clear_children(&self) {
        let children: Vec<_> = self.node().children().collect();
        for child in children {
            child.detach();
        }
    }

    // Form control state.

    pub fn value(&self) -> String {
        self.attr("value").unwrap_or_default()
    }

    pub fn set_value(&self, value: &str) {
        self.set_attr("value", value);
    }

    pub fn is_disabled(&self) -> bool {
        self.has_attr("disabled")
    }

    pub fn set_disabled(&self, disabled: bool) {
        set_flag(self, "disabled", disabled);
    }

    pub fn is_checked(&self) -> bool {
        self.has_attr("checked")
    }

    pub fn set_checked(&self, checked: bool) {
        set_flag(self, "checked", checked);
    }
}

/// Parses `html` as body content and returns the detached top-level nodes.
pub fn parse_fragment(html: &str) -> Vec<NodeRef> {
    let doc = kuchiki::parse_html().one(html);
    let Ok(body) = doc.select_first("body") else {
        return Vec::new();
    };
    let children: Vec<_> = body.as_node().children().collect();
    for child in &children {
        child.detach();
    }
    children
}

fn set_flag(el: &Element, name: &str, on: bool) {
    if on {
        el.set_attr(name, "");
    } else {
        el.remove_attr(name);
    }
}

fn find_by_id(root: &NodeRef, id: &str) -> Option<Element> {
    root.inclusive_descendants()
        .elements()
        .find(|el| el.attributes.borrow().get("id") == Some(id))
        .map(Element)
}

fn query_first(root: &NodeRef, selector: &str) -> Option<Element> {
    root.select_first(selector).ok().map(Element)
}

fn parse_style(style: &str) -> Vec<(String, String)> {
    style
        .split(';')
        .filter_map(|decl| {
            let (name, value) = decl.split_once(':')?;
            let name = name.trim();
            if name.is_empty() {
                return None;
            }
            Some((name.to_string(), value.trim().to_string()))
        })
        .collect()
}
