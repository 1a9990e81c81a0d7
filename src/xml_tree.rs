//! A small element tree over an XML payload which addresses everything by its *local* name.
//!
//! EVTX renders records inside the `http://schemas.microsoft.com/win/2004/08/events/event`
//! namespace, and some producers add prefixes on top of that. Callers of this module never
//! see either: `<e:System>` and `<System xmlns="...">` are both reachable as `System`.

use crate::err::{LookupError, XmlTreeError, XmlTreeResult};

use hashbrown::HashMap;
use log::trace;
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

type FastMap<K, V> = HashMap<K, V, ahash::RandomState>;

/// Which sibling is retained when an element has several children with the same local name.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum DuplicateChildPolicy {
    /// The last child in document order replaces earlier ones.
    #[default]
    LastWins,
    /// The first child in document order is kept, later ones are dropped.
    FirstWins,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlNode {
    name: String,
    text: Option<String>,
    attributes: FastMap<String, String>,
    children: FastMap<String, XmlNode>,
}

struct OpenElement {
    node: XmlNode,
    /// Set once any child node was seen, comments included.
    text_closed: bool,
}

/// Drops everything up to and including the first `?>`.
///
/// Decoders sometimes leave an `<?xml ...?>` declaration (occasionally preceded by a BOM) in
/// front of the record, which is not part of the element we are interested in.
pub fn strip_processing_instruction(xml: &str) -> &str {
    match xml.find("?>") {
        Some(idx) => &xml[idx + 2..],
        None => xml,
    }
}

fn local_name(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

impl XmlNode {
    /// Parses `xml` into a tree, keeping the last of any same-named siblings.
    pub fn parse(xml: &str) -> XmlTreeResult<XmlNode> {
        Self::parse_with_policy(xml, DuplicateChildPolicy::default())
    }

    pub fn parse_with_policy(xml: &str, policy: DuplicateChildPolicy) -> XmlTreeResult<XmlNode> {
        let xml = strip_processing_instruction(xml).trim_start_matches('\u{feff}');
        let mut reader = Reader::from_str(xml);

        let mut stack: Vec<OpenElement> = Vec::new();
        let mut root: Option<XmlNode> = None;

        loop {
            let position = reader.buffer_position() as u64;
            let event = reader
                .read_event()
                .map_err(|e| XmlTreeError::malformed(e, position))?;

            match event {
                Event::Start(start) => {
                    ensure_single_root(&root, &stack, &start, position)?;
                    stack.push(OpenElement {
                        node: XmlNode::from_start(&start, position)?,
                        text_closed: false,
                    });
                }
                Event::Empty(start) => {
                    ensure_single_root(&root, &stack, &start, position)?;
                    let node = XmlNode::from_start(&start, position)?;
                    close_element(node, &mut stack, &mut root, policy);
                }
                Event::End(end) => {
                    let name = local_name(end.local_name().as_ref());
                    let open = match stack.pop() {
                        Some(open) if open.node.name == name => open,
                        _ => {
                            return Err(XmlTreeError::UnexpectedClosingTag {
                                found: name,
                                position,
                            });
                        }
                    };
                    close_element(open.node, &mut stack, &mut root, policy);
                }
                Event::Text(text) => {
                    if text.windows(3).any(|w| w == b"]]>") {
                        return Err(XmlTreeError::malformed(
                            "`]]>` is not allowed in character data",
                            position,
                        ));
                    }
                    let text = text
                        .unescape()
                        .map_err(|e| XmlTreeError::malformed(e, position))?;
                    push_text(&mut stack, &text, position)?;
                }
                Event::CData(cdata) => {
                    let text = String::from_utf8_lossy(&cdata);
                    push_text(&mut stack, &text, position)?;
                }
                // Comments and processing instructions end the leading text of their parent.
                Event::Comment(_) | Event::PI(_) => {
                    if let Some(open) = stack.last_mut() {
                        open.text_closed = true;
                    }
                }
                Event::Eof => break,
                // Declarations and doctypes carry no fields.
                _ => {}
            }
        }

        if let Some(open) = stack.pop() {
            return Err(XmlTreeError::UnclosedElement {
                name: open.node.name,
            });
        }

        root.ok_or(XmlTreeError::NoRootElement)
    }

    fn from_start(start: &BytesStart, position: u64) -> XmlTreeResult<XmlNode> {
        ensure_valid_name(start.name().as_ref(), "element", position)?;
        let mut attributes = FastMap::default();

        for attribute in start.attributes() {
            let attribute = attribute.map_err(|e| XmlTreeError::malformed(e, position))?;
            ensure_valid_name(attribute.key.as_ref(), "attribute", position)?;

            if attribute.value.contains(&b'<') {
                return Err(XmlTreeError::malformed(
                    format!(
                        "`<` is not allowed in the value of attribute `{}`",
                        String::from_utf8_lossy(attribute.key.as_ref())
                    ),
                    position,
                ));
            }

            // `xmlns` and `xmlns:prefix` only bind namespaces, which we discard.
            if attribute.key.as_namespace_binding().is_some() {
                continue;
            }

            let value = attribute
                .unescape_value()
                .map_err(|e| XmlTreeError::malformed(e, position))?;
            ensure_valid_chars(&value, position)?;

            attributes.insert(
                local_name(attribute.key.local_name().as_ref()),
                value.into_owned(),
            );
        }

        Ok(XmlNode {
            name: local_name(start.local_name().as_ref()),
            text: None,
            attributes,
            children: FastMap::default(),
        })
    }

    /// The local (unprefixed) tag name of this element.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Character data preceding the first child element, if any.
    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    pub fn child(&self, name: &str) -> Option<&XmlNode> {
        self.children.get(name)
    }

    pub fn children(&self) -> impl Iterator<Item = &XmlNode> {
        self.children.values()
    }

    /// Descends one local name at a time, starting below this node.
    ///
    /// An empty path resolves to `self`.
    pub fn navigate(&self, path: &[&str]) -> Result<&XmlNode, LookupError> {
        let mut current = self;

        for segment in path {
            current = current
                .child(segment)
                .ok_or_else(|| LookupError::new(path, *segment))?;
        }

        Ok(current)
    }
}

fn ensure_single_root(
    root: &Option<XmlNode>,
    stack: &[OpenElement],
    start: &BytesStart,
    position: u64,
) -> XmlTreeResult<()> {
    if root.is_some() && stack.is_empty() {
        return Err(XmlTreeError::MultipleRootElements {
            name: local_name(start.local_name().as_ref()),
            position,
        });
    }

    Ok(())
}

fn close_element(
    node: XmlNode,
    stack: &mut [OpenElement],
    root: &mut Option<XmlNode>,
    policy: DuplicateChildPolicy,
) {
    let Some(parent) = stack.last_mut() else {
        *root = Some(node);
        return;
    };

    parent.text_closed = true;
    let children = &mut parent.node.children;

    match policy {
        DuplicateChildPolicy::LastWins => {
            if let Some(replaced) = children.insert(node.name.clone(), node) {
                trace!("replaced duplicate child element `{}`", replaced.name);
            }
        }
        DuplicateChildPolicy::FirstWins => {
            children.entry(node.name.clone()).or_insert(node);
        }
    }
}

/// `NameStartChar` of the XML 1.0 (fifth edition) grammar.
fn is_name_start_char(c: char) -> bool {
    matches!(c,
        ':' | 'A'..='Z' | '_' | 'a'..='z'
        | '\u{C0}'..='\u{D6}' | '\u{D8}'..='\u{F6}' | '\u{F8}'..='\u{2FF}'
        | '\u{370}'..='\u{37D}' | '\u{37F}'..='\u{1FFF}' | '\u{200C}'..='\u{200D}'
        | '\u{2070}'..='\u{218F}' | '\u{2C00}'..='\u{2FEF}' | '\u{3001}'..='\u{D7FF}'
        | '\u{F900}'..='\u{FDCF}' | '\u{FDF0}'..='\u{FFFD}' | '\u{10000}'..='\u{EFFFF}')
}

fn is_name_char(c: char) -> bool {
    is_name_start_char(c)
        || matches!(c,
            '-' | '.' | '0'..='9' | '\u{B7}' | '\u{300}'..='\u{36F}' | '\u{203F}'..='\u{2040}')
}

fn ensure_valid_name(name: &[u8], kind: &str, position: u64) -> XmlTreeResult<()> {
    let name = String::from_utf8_lossy(name);
    let mut chars = name.chars();

    let valid = chars.next().is_some_and(is_name_start_char) && chars.all(is_name_char);
    if !valid {
        return Err(XmlTreeError::malformed(
            format!("`{}` is not a valid {} name", name, kind),
            position,
        ));
    }

    Ok(())
}

/// Rejects characters outside of the XML `Char` production, such as NUL.
fn ensure_valid_chars(text: &str, position: u64) -> XmlTreeResult<()> {
    let invalid = text.chars().find(|&c| {
        !matches!(c,
            '\t' | '\n' | '\r'
            | '\u{20}'..='\u{D7FF}' | '\u{E000}'..='\u{FFFD}' | '\u{10000}'..='\u{10FFFF}')
    });

    match invalid {
        Some(c) => Err(XmlTreeError::malformed(
            format!("character {:?} is not allowed in XML", c),
            position,
        )),
        None => Ok(()),
    }
}

fn push_text(stack: &mut [OpenElement], text: &str, position: u64) -> XmlTreeResult<()> {
    ensure_valid_chars(text, position)?;

    match stack.last_mut() {
        Some(open) => {
            if !open.text_closed {
                open.node.text.get_or_insert_with(String::new).push_str(text);
            }
            Ok(())
        }
        None if text.trim().is_empty() => Ok(()),
        None => Err(XmlTreeError::TextOutsideRoot { position }),
    }
}
