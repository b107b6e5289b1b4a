use std::fmt;

use serde::{Deserialize, Serialize};

const CLASS: &str = "class";
const STYLE: &str = "style";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassList {
    tokens: Vec<String>,
}

impl ClassList {
    pub fn parse(value: &str) -> Self {
        let mut list = Self::default();
        for token in value.split_whitespace() {
            list.add(token);
        }
        list
    }

    pub fn contains(&self, token: &str) -> bool {
        self.tokens.iter().any(|t| t == token)
    }

    pub fn add(&mut self, token: &str) -> bool {
        let token = token.trim();
        if token.is_empty() || self.contains(token) {
            return false;
        }
        self.tokens.push(token.to_string());
        true
    }

    pub fn remove(&mut self, token: &str) -> bool {
        let before = self.tokens.len();
        self.tokens.retain(|t| t != token);
        before != self.tokens.len()
    }

    /// Returns whether the token is present after the toggle.
    pub fn toggle(&mut self, token: &str) -> bool {
        if self.remove(token) {
            false
        } else {
            self.add(token)
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.tokens.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn same_tokens(&self, other: &ClassList) -> bool {
        self.len() == other.len() && self.iter().all(|t| other.contains(t))
    }
}

impl fmt::Display for ClassList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.tokens.join(" "))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StyleDecls {
    decls: Vec<(String, String)>,
}

impl StyleDecls {
    pub fn parse(value: &str) -> Self {
        let mut style = Self::default();
        for decl in value.split(';') {
            let Some((name, value)) = decl.split_once(':') else {
                continue;
            };
            let (name, value) = (name.trim(), value.trim());
            if name.is_empty() || value.is_empty() {
                continue;
            }
            style.set(name, value);
        }
        style
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.decls
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn set(&mut self, name: &str, value: &str) {
        match self.decls.iter_mut().find(|(n, _)| n == name) {
            Some(entry) => entry.1 = value.to_string(),
            None => self.decls.push((name.to_string(), value.to_string())),
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        let ix = self.decls.iter().position(|(n, _)| n == name)?;
        Some(self.decls.remove(ix).1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.decls.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.decls.is_empty()
    }

    pub fn same_decls(&self, other: &StyleDecls) -> bool {
        self.decls.len() == other.decls.len()
            && self.iter().all(|(n, v)| other.get(n) == Some(v))
    }
}

impl fmt::Display for StyleDecls {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (name, value) in self.iter() {
            if !first {
                f.write_str("; ")?;
            }
            write!(f, "{name}: {value}")?;
            first = false;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum AttrValue {
    Text(String),
    Class(ClassList),
    Style(StyleDecls),
}

impl AttrValue {
    fn parse(name: &str, value: &str) -> Self {
        match name {
            CLASS => AttrValue::Class(ClassList::parse(value)),
            STYLE => AttrValue::Style(StyleDecls::parse(value)),
            _ => AttrValue::Text(value.to_string()),
        }
    }

    fn is_empty_collection(&self) -> bool {
        match self {
            AttrValue::Text(_) => false,
            AttrValue::Class(list) => list.is_empty(),
            AttrValue::Style(style) => style.is_empty(),
        }
    }

    fn render(&self) -> String {
        match self {
            AttrValue::Text(text) => text.clone(),
            AttrValue::Class(list) => list.to_string(),
            AttrValue::Style(style) => style.to_string(),
        }
    }

    fn equivalent(&self, other: &AttrValue) -> bool {
        match (self, other) {
            (AttrValue::Text(a), AttrValue::Text(b)) => a == b,
            (AttrValue::Class(a), AttrValue::Class(b)) => a.same_tokens(b),
            (AttrValue::Style(a), AttrValue::Style(b)) => a.same_decls(b),
            _ => false,
        }
    }
}

/// Ordered attribute store of a node. `class` and `style` keep structured
/// values but render back to plain strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<(String, String)>", into = "Vec<(String, String)>")]
pub struct Attributes {
    entries: Vec<(String, AttrValue)>,
}

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|(n, _)| n == name)
    }

    pub fn get(&self, name: &str) -> Option<String> {
        self.entry(name).map(AttrValue::render)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, String)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.render()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }

    pub fn set(&mut self, name: &str, value: &str) {
        let value = AttrValue::parse(name, value);
        if value.is_empty_collection() {
            self.remove(name);
            return;
        }
        match self.entries.iter_mut().find(|(n, _)| n == name) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name.to_string(), value)),
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        let ix = self.entries.iter().position(|(n, _)| n == name)?;
        Some(self.entries.remove(ix).1.render())
    }

    pub fn class_list(&self) -> Option<&ClassList> {
        match self.entry(CLASS) {
            Some(AttrValue::Class(list)) => Some(list),
            _ => None,
        }
    }

    pub fn has_class(&self, token: &str) -> bool {
        self.class_list().is_some_and(|list| list.contains(token))
    }

    pub fn add_class(&mut self, token: &str) -> bool {
        self.with_class_list(|list| list.add(token))
    }

    pub fn remove_class(&mut self, token: &str) -> bool {
        self.with_class_list(|list| list.remove(token))
    }

    pub fn toggle_class(&mut self, token: &str) -> bool {
        self.with_class_list(|list| list.toggle(token));
        self.has_class(token)
    }

    pub fn style(&self, property: &str) -> Option<&str> {
        match self.entry(STYLE) {
            Some(AttrValue::Style(style)) => style.get(property),
            _ => None,
        }
    }

    pub fn set_style(&mut self, property: &str, value: &str) {
        self.with_style(|style| {
            if value.is_empty() {
                style.remove(property);
            } else {
                style.set(property, value);
            }
        });
    }

    pub fn remove_style(&mut self, property: &str) -> Option<String> {
        self.with_style(|style| style.remove(property))
    }

    /// Order-insensitive comparison; class tokens and style declarations
    /// compare as sets.
    pub fn equivalent(&self, other: &Attributes) -> bool {
        self.len() == other.len()
            && self.entries.iter().all(|(name, value)| {
                other
                    .entry(name)
                    .is_some_and(|other_value| value.equivalent(other_value))
            })
    }

    fn entry(&self, name: &str) -> Option<&AttrValue> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    fn with_class_list<R>(&mut self, f: impl FnOnce(&mut ClassList) -> R) -> R {
        let ix = match self.entries.iter().position(|(n, _)| n == CLASS) {
            Some(ix) => ix,
            None => {
                self.entries
                    .push((CLASS.to_string(), AttrValue::Class(ClassList::default())));
                self.entries.len() - 1
            }
        };
        if !matches!(self.entries[ix].1, AttrValue::Class(_)) {
            let parsed = ClassList::parse(&self.entries[ix].1.render());
            self.entries[ix].1 = AttrValue::Class(parsed);
        }
        let AttrValue::Class(list) = &mut self.entries[ix].1 else {
            unreachable!("class entry was normalized above");
        };
        let result = f(list);
        if self.entries[ix].1.is_empty_collection() {
            self.entries.remove(ix);
        }
        result
    }

    fn with_style<R>(&mut self, f: impl FnOnce(&mut StyleDecls) -> R) -> R {
        let ix = match self.entries.iter().position(|(n, _)| n == STYLE) {
            Some(ix) => ix,
            None => {
                self.entries
                    .push((STYLE.to_string(), AttrValue::Style(StyleDecls::default())));
                self.entries.len() - 1
            }
        };
        if !matches!(self.entries[ix].1, AttrValue::Style(_)) {
            let parsed = StyleDecls::parse(&self.entries[ix].1.render());
            self.entries[ix].1 = AttrValue::Style(parsed);
        }
        let AttrValue::Style(style) = &mut self.entries[ix].1 else {
            unreachable!("style entry was normalized above");
        };
        let result = f(style);
        if self.entries[ix].1.is_empty_collection() {
            self.entries.remove(ix);
        }
        result
    }
}

impl From<Vec<(String, String)>> for Attributes {
    fn from(pairs: Vec<(String, String)>) -> Self {
        let mut attrs = Attributes::new();
        for (name, value) in pairs {
            attrs.set(&name, &value);
        }
        attrs
    }
}

impl From<Attributes> for Vec<(String, String)> {
    fn from(attrs: Attributes) -> Self {
        attrs
            .iter()
            .map(|(name, value)| (name.to_string(), value))
            .collect()
    }
}

impl<const N: usize> From<[(&str, &str); N]> for Attributes {
    fn from(pairs: [(&str, &str); N]) -> Self {
        let mut attrs = Attributes::new();
        for (name, value) in pairs {
            attrs.set(name, value);
        }
        attrs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_insertion_order() {
        let mut attrs = Attributes::new();
        attrs.set("href", "/a");
        attrs.set("class", "x y");
        attrs.set("title", "t");
        attrs.set("href", "/b");
        let names: Vec<_> = attrs.names().collect();
        assert_eq!(names, vec!["href", "class", "title"]);
        assert_eq!(attrs.get("href").as_deref(), Some("/b"));
    }

    #[test]
    fn class_list_dedupes_and_toggles() {
        let mut attrs = Attributes::from([("class", "a  b a")]);
        assert_eq!(attrs.get("class").as_deref(), Some("a b"));
        assert!(!attrs.toggle_class("a"));
        assert!(attrs.toggle_class("c"));
        assert_eq!(attrs.get("class").as_deref(), Some("b c"));
        attrs.remove_class("b");
        attrs.remove_class("c");
        assert!(!attrs.contains("class"));
    }

    #[test]
    fn style_declarations_round_trip() {
        let mut attrs = Attributes::from([("style", "color: red;margin-left:4px;")]);
        assert_eq!(attrs.style("margin-left"), Some("4px"));
        attrs.set_style("color", "blue");
        assert_eq!(
            attrs.get("style").as_deref(),
            Some("color: blue; margin-left: 4px")
        );
        attrs.remove_style("color");
        attrs.remove_style("margin-left");
        assert!(attrs.is_empty());
    }

    #[test]
    fn equality_is_order_sensitive_but_equivalence_is_not() {
        let a = Attributes::from([("class", "x y"), ("id", "1")]);
        let b = Attributes::from([("id", "1"), ("class", "y x")]);
        assert_ne!(a, b);
        assert!(a.equivalent(&b));
        assert!(!a.equivalent(&Attributes::from([("id", "1")])));
    }

    #[test]
    fn serializes_as_ordered_pairs() {
        let attrs = Attributes::from([("b", "2"), ("a", "1")]);
        let json = serde_json::to_value(&attrs).unwrap();
        assert_eq!(json, serde_json::json!([["b", "2"], ["a", "1"]]));
        let back: Attributes = serde_json::from_value(json).unwrap();
        assert_eq!(back, attrs);
    }
}
