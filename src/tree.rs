//! Segment trie backing each per-method routing table.
//!
//! Every node has at most one child per distinct static literal, at most one
//! parameter child, and at most one wildcard child. Lookup tries them in that
//! order at every depth and backtracks when a branch dead-ends, so precedence
//! is always static > parameter > wildcard regardless of registration order.
//!
//! Terminal nodes store an index into the router's route table rather than the
//! handler itself; the router owns routes so names can point at them too.

use std::collections::HashMap;

use crate::error::Error;
use crate::path::{Pattern, Segment};

#[derive(Debug)]
pub(crate) struct Node {
    segment: Segment,
    statics: HashMap<String, Node>,
    param: Option<Box<Node>>,
    wildcard: Option<Box<Node>>,
    route: Option<usize>,
}

/// What [`Node::insert`] did at the terminal node.
#[derive(Debug, Eq, PartialEq)]
pub(crate) enum Inserted {
    New,
    /// The same pattern was registered before; holds the displaced route.
    Replaced(usize),
}

impl Default for Node {
    fn default() -> Self {
        Self::new(Segment::Static(String::new()))
    }
}

impl Node {
    fn new(segment: Segment) -> Self {
        Self { segment, statics: HashMap::new(), param: None, wildcard: None, route: None }
    }

    /// Walks `pattern` from this node, creating children as needed, and marks
    /// the last one terminal for `route`.
    ///
    /// Two patterns that place differently named placeholders at the same
    /// position are rejected: the trie has a single parameter (and wildcard)
    /// child per node, so only one name can be bound there.
    pub(crate) fn insert(
        &mut self,
        pattern: &Pattern,
        route: usize,
        case_sensitive: bool,
    ) -> Result<Inserted, Error> {
        let mut node = self;
        for segment in pattern.segments() {
            node = match segment {
                Segment::Static(literal) => {
                    let key = fold(literal, case_sensitive);
                    node.statics
                        .entry(key)
                        .or_insert_with(|| Node::new(segment.clone()))
                }
                Segment::Param(name) => {
                    let child = node.param.get_or_insert_with(|| Box::new(Node::new(segment.clone())));
                    check_name(&child.segment, name, pattern)?;
                    &mut **child
                }
                Segment::Wildcard(name) => {
                    let child = node.wildcard.get_or_insert_with(|| Box::new(Node::new(segment.clone())));
                    check_name(&child.segment, name, pattern)?;
                    &mut **child
                }
            };
        }

        Ok(match node.route.replace(route) {
            Some(previous) => Inserted::Replaced(previous),
            None => Inserted::New,
        })
    }

    /// Resolves request `segments` to a route index, pushing captured
    /// placeholders onto `params` in path order.
    pub(crate) fn find<'n>(
        &'n self,
        segments: &[&str],
        case_sensitive: bool,
        params: &mut Vec<(&'n str, String)>,
    ) -> Option<usize> {
        let Some((head, rest)) = segments.split_first() else {
            return self.route;
        };

        if let Some(child) = self.statics.get(fold(head, case_sensitive).as_str()) {
            if let Some(found) = child.find(rest, case_sensitive, params) {
                return Some(found);
            }
        }

        if let Some(child) = &self.param {
            if !head.is_empty() {
                params.push((child.name(), (*head).to_owned()));
                if let Some(found) = child.find(rest, case_sensitive, params) {
                    return Some(found);
                }
                params.pop();
            }
        }

        if let Some(child) = &self.wildcard {
            let tail = segments.join("/");
            if let (Some(found), false) = (child.route, tail.is_empty()) {
                params.push((child.name(), tail));
                return Some(found);
            }
        }

        None
    }

    fn name(&self) -> &str {
        match &self.segment {
            Segment::Param(name) | Segment::Wildcard(name) | Segment::Static(name) => name,
        }
    }
}

fn check_name(existing: &Segment, incoming: &str, pattern: &Pattern) -> Result<(), Error> {
    match existing {
        Segment::Param(name) | Segment::Wildcard(name) if name != incoming => Err(Error::conflict(
            pattern.as_str(),
            format!("placeholder `{incoming}` sits where `{name}` is already registered"),
        )),
        _ => Ok(()),
    }
}

fn fold(literal: &str, case_sensitive: bool) -> String {
    if case_sensitive { literal.to_owned() } else { literal.to_lowercase() }
}
