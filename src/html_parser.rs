//! A thin, typed view over an html5ever DOM.
//!
//! Only what link rewriting needs is exposed: element enumeration in document
//! order, the fixed set of URI-bearing attributes, `<base>` and
//! `<meta http-equiv="refresh">` detection, and serialization.

use std::fmt;
use std::io;
use std::sync::LazyLock;

use html5ever::serialize::{serialize, SerializeOpts};
use html5ever::tendril::{StrTendril, TendrilSink};
use html5ever::{parse_document, Attribute, LocalName, Namespace, QualName};
use markup5ever_rcdom::{Handle, NodeData, RcDom, SerializableHandle};
use regex::Regex;

/// Attributes whose value is a URI reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LinkAttribute {
    Action,
    Background,
    Cite,
    Classid,
    Codebase,
    Data,
    Formaction,
    Href,
    Icon,
    Longdesc,
    Manifest,
    Poster,
    Profile,
    Src,
    Usemap,
}

impl LinkAttribute {
    pub const ALL: [LinkAttribute; 15] = [
        LinkAttribute::Action,
        LinkAttribute::Background,
        LinkAttribute::Cite,
        LinkAttribute::Classid,
        LinkAttribute::Codebase,
        LinkAttribute::Data,
        LinkAttribute::Formaction,
        LinkAttribute::Href,
        LinkAttribute::Icon,
        LinkAttribute::Longdesc,
        LinkAttribute::Manifest,
        LinkAttribute::Poster,
        LinkAttribute::Profile,
        LinkAttribute::Src,
        LinkAttribute::Usemap,
    ];

    pub const COUNT: usize = Self::ALL.len();

    pub fn as_str(self) -> &'static str {
        match self {
            LinkAttribute::Action => "action",
            LinkAttribute::Background => "background",
            LinkAttribute::Cite => "cite",
            LinkAttribute::Classid => "classid",
            LinkAttribute::Codebase => "codebase",
            LinkAttribute::Data => "data",
            LinkAttribute::Formaction => "formaction",
            LinkAttribute::Href => "href",
            LinkAttribute::Icon => "icon",
            LinkAttribute::Longdesc => "longdesc",
            LinkAttribute::Manifest => "manifest",
            LinkAttribute::Poster => "poster",
            LinkAttribute::Profile => "profile",
            LinkAttribute::Src => "src",
            LinkAttribute::Usemap => "usemap",
        }
    }
}

impl fmt::Display for LinkAttribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `N; URL=target` with optional quotes around the target and an optional
/// `URL=` keyword.
static REFRESH_CONTENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)^\s*[^;]*;\s*(?:url\s*=\s*)?(?:"(?P<double>[^"]*)"|'(?P<single>[^']*)'|(?P<bare>.*?))\s*$"#)
        .expect("hardcoded regex pattern is valid")
});

/// The target of a `<meta http-equiv="refresh" content="N; URL=target">`.
///
/// Keeps the whole `content` value so the URL span can be swapped out while
/// the delay and the `URL=` spelling stay as they were.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshTarget {
    content: String,
    url_start: usize,
    url_end: usize,
}

impl RefreshTarget {
    pub fn parse(content: &str) -> Option<Self> {
        let captures = REFRESH_CONTENT.captures(content)?;
        let url = captures
            .name("double")
            .or_else(|| captures.name("single"))
            .or_else(|| captures.name("bare"))?;

        (url.start() < url.end()).then(|| Self {
            content: content.to_string(),
            url_start: url.start(),
            url_end: url.end(),
        })
    }

    pub fn url(&self) -> &str {
        &self.content[self.url_start..self.url_end]
    }

    /// The full `content` value with its URL replaced by `url`.
    pub fn with_url(&self, url: &str) -> String {
        format!(
            "{}{}{}",
            &self.content[..self.url_start],
            url,
            &self.content[self.url_end..]
        )
    }
}

/// How an element takes part in link rewriting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElementKind {
    /// `<base>`: never rewritten, never followed.
    Base,
    /// `<meta http-equiv="refresh">`, with its target when it names one.
    MetaRefresh(Option<RefreshTarget>),
    /// Anything else; its [`LinkAttribute`]s are candidates.
    Linking,
}

#[derive(Clone)]
pub struct Element(Handle);

impl Element {
    pub fn tag_name(&self) -> &str {
        match &self.0.data {
            NodeData::Element { name, .. } => &name.local,
            _ => "",
        }
    }

    pub fn attribute(&self, name: &str) -> Option<String> {
        match &self.0.data {
            NodeData::Element { attrs, .. } => attrs
                .borrow()
                .iter()
                .find(|attr| &*attr.name.local == name)
                .map(|attr| attr.value.to_string()),
            _ => None,
        }
    }

    pub fn set_attribute(&self, name: &str, value: &str) {
        if let NodeData::Element { attrs, .. } = &self.0.data {
            let mut attrs = attrs.borrow_mut();
            match attrs.iter_mut().find(|attr| &*attr.name.local == name) {
                Some(attr) => attr.value = StrTendril::from_slice(value),
                None => attrs.push(Attribute {
                    name: QualName::new(None, Namespace::from(""), LocalName::from(name)),
                    value: StrTendril::from_slice(value),
                }),
            }
        }
    }

    pub fn link(&self, attribute: LinkAttribute) -> Option<String> {
        self.attribute(attribute.as_str())
    }

    pub fn set_link(&self, attribute: LinkAttribute, value: &str) {
        self.set_attribute(attribute.as_str(), value);
    }

    /// Present link attributes with their raw values, in [`LinkAttribute::ALL`] order.
    pub fn links(&self) -> Vec<(LinkAttribute, String)> {
        LinkAttribute::ALL
            .iter()
            .filter_map(|attribute| {
                self.link(*attribute)
                    .filter(|value| !value.is_empty())
                    .map(|value| (*attribute, value))
            })
            .collect()
    }

    pub fn kind(&self) -> ElementKind {
        match self.tag_name() {
            "base" => ElementKind::Base,
            "meta"
                if self
                    .attribute("http-equiv")
                    .is_some_and(|equiv| equiv.trim().eq_ignore_ascii_case("refresh")) =>
            {
                ElementKind::MetaRefresh(
                    self.attribute("content")
                        .and_then(|content| RefreshTarget::parse(&content)),
                )
            }
            _ => ElementKind::Linking,
        }
    }
}

impl fmt::Debug for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}>", self.tag_name())
    }
}

pub struct HtmlDocument {
    dom: RcDom,
}

impl HtmlDocument {
    /// Parses `bytes` as UTF-8 HTML; invalid sequences are replaced.
    pub fn parse(bytes: &[u8]) -> io::Result<Self> {
        let dom = parse_document(RcDom::default(), Default::default())
            .from_utf8()
            .read_from(&mut &bytes[..])?;
        Ok(Self { dom })
    }

    /// Every element, in document order.
    pub fn elements(&self) -> Vec<Element> {
        let mut elements = Vec::new();
        collect_elements(&self.dom.document, &mut elements);
        elements
    }

    /// Elements with the given tag name, or all of them for `"*"`.
    pub fn elements_by_tag(&self, tag: &str) -> Vec<Element> {
        self.elements()
            .into_iter()
            .filter(|element| tag == "*" || element.tag_name().eq_ignore_ascii_case(tag))
            .collect()
    }

    /// `href` of the first `<base>` element that has one.
    pub fn base_href(&self) -> Option<String> {
        self.elements_by_tag("base")
            .iter()
            .find_map(|base| base.attribute("href"))
            .filter(|href| !href.trim().is_empty())
    }

    pub fn serialize(&self) -> io::Result<Vec<u8>> {
        let document: SerializableHandle = self.dom.document.clone().into();
        let mut output = Vec::new();
        serialize(&mut output, &document, SerializeOpts::default())?;
        Ok(output)
    }
}

fn collect_elements(node: &Handle, elements: &mut Vec<Element>) {
    for child in node.children.borrow().iter() {
        if let NodeData::Element { .. } = child.data {
            elements.push(Element(child.clone()));
        }
        collect_elements(child, elements);
    }
}
