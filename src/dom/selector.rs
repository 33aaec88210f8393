use std::iter::Peekable;
use std::str::CharIndices;

use super::{Document, NodeId};

/// A list of compound CSS selectors (`tag#id.class[attr="value"]`), joined by commas.
///
/// Combinators and pseudo-classes are not supported; every target this crate
/// looks for is identified by a single element's own tag, classes and attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Selector {
    groups: Vec<Compound>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Compound {
    tag: Option<String>,
    id: Option<String>,
    classes: Vec<String>,
    attrs: Vec<AttrTest>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct AttrTest {
    name: String,
    value: Option<String>,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub(crate) enum SelectorError {
    #[error("empty selector group in `{0}`")]
    Empty(String),
    #[error("unexpected `{ch}` at offset {offset} in selector `{selector}`")]
    Unexpected {
        selector: String,
        ch: char,
        offset: usize,
    },
    #[error("combinators are not supported (offset {offset} in selector `{selector}`)")]
    Combinator { selector: String, offset: usize },
    #[error("unterminated attribute test in selector `{0}`")]
    Unterminated(String),
}

impl Selector {
    /// Start a single compound selector matching any element.
    pub(crate) fn compound() -> Self {
        Self {
            groups: vec![Compound::default()],
        }
    }

    /// Matches when any of the given selectors matches.
    pub(crate) fn any_of(selectors: impl IntoIterator<Item = Selector>) -> Self {
        Self {
            groups: selectors
                .into_iter()
                .flat_map(|selector| selector.groups)
                .collect(),
        }
    }

    pub(crate) fn tag(mut self, tag: &str) -> Self {
        self.last_group().tag = Some(tag.to_ascii_lowercase());
        self
    }

    pub(crate) fn id(mut self, id: &str) -> Self {
        self.last_group().id = Some(id.to_string());
        self
    }

    pub(crate) fn class(mut self, class: &str) -> Self {
        self.last_group().classes.push(class.to_string());
        self
    }

    pub(crate) fn attr(mut self, name: &str) -> Self {
        self.last_group().attrs.push(AttrTest {
            name: name.to_ascii_lowercase(),
            value: None,
        });
        self
    }

    pub(crate) fn attr_eq(mut self, name: &str, value: &str) -> Self {
        self.last_group().attrs.push(AttrTest {
            name: name.to_ascii_lowercase(),
            value: Some(value.to_string()),
        });
        self
    }

    fn last_group(&mut self) -> &mut Compound {
        if self.groups.is_empty() {
            self.groups.push(Compound::default());
        }
        let last = self.groups.len() - 1;
        &mut self.groups[last]
    }

    pub(crate) fn parse(raw: &str) -> Result<Self, SelectorError> {
        let mut groups = Vec::new();
        let mut current = Compound::default();
        let mut started = false;
        let mut chars = raw.char_indices().peekable();

        while let Some((offset, ch)) = chars.next() {
            match ch {
                ',' => {
                    if !started {
                        return Err(SelectorError::Empty(raw.to_string()));
                    }
                    groups.push(std::mem::take(&mut current));
                    started = false;
                }
                c if c.is_whitespace() => {
                    while chars.next_if(|(_, c)| c.is_whitespace()).is_some() {}
                    let at_boundary = matches!(chars.peek(), None | Some((_, ',')));
                    if started && !at_boundary {
                        return Err(SelectorError::Combinator {
                            selector: raw.to_string(),
                            offset,
                        });
                    }
                }
                '*' if !started => started = true,
                '.' => {
                    let name = read_ident(&mut chars);
                    if name.is_empty() {
                        return Err(unexpected(raw, ch, offset));
                    }
                    current.classes.push(name);
                    started = true;
                }
                '#' => {
                    let name = read_ident(&mut chars);
                    if name.is_empty() {
                        return Err(unexpected(raw, ch, offset));
                    }
                    current.id = Some(name);
                    started = true;
                }
                '[' => {
                    current.attrs.push(read_attr_test(raw, &mut chars)?);
                    started = true;
                }
                c if is_ident_char(c) && !started => {
                    let mut name = c.to_string();
                    name.push_str(&read_ident(&mut chars));
                    current.tag = Some(name.to_ascii_lowercase());
                    started = true;
                }
                c => return Err(unexpected(raw, c, offset)),
            }
        }

        if !started {
            return Err(SelectorError::Empty(raw.to_string()));
        }
        groups.push(current);
        Ok(Self { groups })
    }

    pub(crate) fn matches(&self, doc: &Document, node: NodeId) -> bool {
        self.groups.iter().any(|group| group.matches(doc, node))
    }
}

impl Compound {
    fn matches(&self, doc: &Document, node: NodeId) -> bool {
        if let Some(tag) = &self.tag
            && doc.tag(node) != tag
        {
            return false;
        }
        if let Some(id) = &self.id
            && doc.attr(node, "id") != Some(id.as_str())
        {
            return false;
        }
        if !self.classes.iter().all(|class| doc.has_class(node, class)) {
            return false;
        }
        self.attrs.iter().all(|test| match &test.value {
            Some(expected) => doc.attr(node, &test.name) == Some(expected.as_str()),
            None => doc.has_attr(node, &test.name),
        })
    }
}

fn unexpected(raw: &str, ch: char, offset: usize) -> SelectorError {
    SelectorError::Unexpected {
        selector: raw.to_string(),
        ch,
        offset,
    }
}

fn is_ident_char(ch: char) -> bool {
    ch.is_alphanumeric() || ch == '-' || ch == '_'
}

fn read_ident(chars: &mut Peekable<CharIndices<'_>>) -> String {
    let mut out = String::new();
    while let Some((_, ch)) = chars.next_if(|(_, c)| is_ident_char(*c)) {
        out.push(ch);
    }
    out
}

fn read_attr_test(
    raw: &str,
    chars: &mut Peekable<CharIndices<'_>>,
) -> Result<AttrTest, SelectorError> {
    let name = read_ident(chars);
    if name.is_empty() {
        return Err(SelectorError::Unterminated(raw.to_string()));
    }

    match chars.next() {
        Some((_, ']')) => Ok(AttrTest {
            name: name.to_ascii_lowercase(),
            value: None,
        }),
        Some((_, '=')) => {
            let quote = chars
                .peek()
                .map(|(_, c)| *c)
                .filter(|c| matches!(c, '"' | '\''));
            let value = match quote {
                Some(quote) => {
                    chars.next();
                    let mut value = String::new();
                    loop {
                        match chars.next() {
                            Some((_, c)) if c == quote => break,
                            Some((_, c)) => value.push(c),
                            None => return Err(SelectorError::Unterminated(raw.to_string())),
                        }
                    }
                    value
                }
                None => read_ident(chars),
            };
            match chars.next() {
                Some((_, ']')) => Ok(AttrTest {
                    name: name.to_ascii_lowercase(),
                    value: Some(value),
                }),
                Some((offset, c)) => Err(unexpected(raw, c, offset)),
                None => Err(SelectorError::Unterminated(raw.to_string())),
            }
        }
        Some((offset, c)) => Err(unexpected(raw, c, offset)),
        None => Err(SelectorError::Unterminated(raw.to_string())),
    }
}
