//! Finite state machines compiled from expanded production bodies.
//!
//! Construction happens in two passes. The first lowers the operator tree
//! into an arena where optional, repeated, sequenced, and alternated groups
//! are joined with epsilon states, and repeats loop through an explicit
//! back-edge state holding the index of the repeated entry. The second pass
//! resolves back-edges, splices every epsilon state out by replacing the
//! edges into it with its own successors, and compacts the arena in
//! depth-first order. What remains are the start state, the finish state,
//! and one state per reference or literal.

use crate::grammar::Operator;
use std::collections::HashMap;
use std::fmt;

/// Index of a state within its machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StateId(usize);

impl StateId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// What a state matches
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateKind {
    Start,
    Finish,

    /// A reference to a production or primitive, with its optional label
    Reference { name: String, label: Option<String> },

    /// Literal text, matched as a string value
    Literal(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct State {
    kind: StateKind,
    next: Vec<StateId>,
}

impl State {
    pub fn kind(&self) -> &StateKind {
        &self.kind
    }

    /// Successor states in grammar order
    pub fn next(&self) -> &[StateId] {
        &self.next
    }
}

/// A compiled production body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fsm {
    states: Vec<State>,
}

impl Fsm {
    /// Compile an expanded operator tree. `None` compiles a body that
    /// matches nothing, so the machine goes from start straight to finish.
    ///
    /// ```
    /// use simis::{Fsm, Operator};
    ///
    /// let fsm = Fsm::new(Some(&Operator::repeat(Operator::reference("foo"))));
    /// assert_eq!(fsm.to_string(), "start -> 1:foo -> {^1, finish}");
    /// ```
    pub fn new(op: Option<&Operator>) -> Fsm {
        let mut builder = Builder::default();
        let start = builder.push(Node::Start);
        let finish = builder.push(Node::Finish);
        if let Some(op) = op {
            let entry = builder.build(op);
            builder.nodes[start].next.push(entry);
        }
        builder.link_dangling(start, finish);
        builder.simplify(start)
    }

    pub fn start(&self) -> StateId {
        StateId(0)
    }

    pub fn state(&self, id: StateId) -> &State {
        &self.states[id.0]
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Returns true if the state completes the production
    pub fn is_finish(&self, id: StateId) -> bool {
        matches!(self.state(id).kind, StateKind::Finish)
    }

    /// Returns true if the production may complete directly after the state
    pub fn can_finish(&self, id: StateId) -> bool {
        self.state(id).next.iter().any(|&x| self.is_finish(x))
    }

    fn indegrees(&self) -> Vec<usize> {
        let mut result = vec![0; self.states.len()];
        for state in &self.states {
            for next in &state.next {
                result[next.0] += 1;
            }
        }
        result
    }

    fn render(
        &self,
        f: &mut fmt::Formatter,
        id: StateId,
        indegrees: &[usize],
        labels: &mut HashMap<StateId, usize>,
    ) -> fmt::Result {
        let state = self.state(id);
        if indegrees[id.0] > 1 && state.kind != StateKind::Finish {
            if let Some(n) = labels.get(&id) {
                return write!(f, "^{}", n);
            }

            let n = labels.len() + 1;
            labels.insert(id, n);
            write!(f, "{}:", n)?;
        }

        match &state.kind {
            StateKind::Start => f.write_str("start")?,
            StateKind::Finish => f.write_str("finish")?,
            StateKind::Reference {
                name,
                label: Some(label),
            } => write!(f, "{},{}", name, label)?,
            StateKind::Reference { name, label: None } => f.write_str(name)?,
            StateKind::Literal(text) => write!(f, "{:?}", text)?,
        }

        match state.next.as_slice() {
            [] => Ok(()),
            [next] => {
                f.write_str(" -> ")?;
                self.render(f, *next, indegrees, labels)
            }
            branches => {
                f.write_str(" -> {")?;
                for (i, next) in branches.iter().enumerate() {
                    if i != 0 {
                        f.write_str(", ")?;
                    }
                    self.render(f, *next, indegrees, labels)?;
                }
                f.write_str("}")
            }
        }
    }
}

impl fmt::Display for Fsm {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let indegrees = self.indegrees();
        let mut labels = HashMap::new();
        self.render(f, self.start(), &indegrees, &mut labels)
    }
}

#[derive(Debug, Clone)]
enum Node {
    Start,
    Finish,
    Reference { name: String, label: Option<String> },
    Literal(String),
    Epsilon,
    BackEdge(usize),
}

#[derive(Debug)]
struct BuildState {
    node: Node,
    next: Vec<usize>,
}

#[derive(Debug, Default)]
struct Builder {
    nodes: Vec<BuildState>,
}

impl Builder {
    fn push(&mut self, node: Node) -> usize {
        self.nodes.push(BuildState {
            node,
            next: Vec::new(),
        });
        self.nodes.len() - 1
    }

    /// Lower an operator and return the index of its entry state. Exits are
    /// left without successors for the caller to link.
    fn build(&mut self, op: &Operator) -> usize {
        match op {
            Operator::Reference(name) => self.push(Node::Reference {
                name: name.clone(),
                label: None,
            }),
            Operator::NamedReference(name, label) => self.push(Node::Reference {
                name: name.clone(),
                label: Some(label.clone()),
            }),
            Operator::Literal(text) => self.push(Node::Literal(text.clone())),
            Operator::Optional(inner) => {
                let split = self.push(Node::Epsilon);
                let entry = self.build(inner);
                let exit = self.push(Node::Epsilon);
                self.link_dangling(entry, exit);
                self.nodes[split].next = vec![entry, exit];
                split
            }
            Operator::Repeat(inner) => {
                let split = self.push(Node::Epsilon);
                let entry = self.build(inner);
                let repeat = self.push(Node::Epsilon);
                self.link_dangling(entry, repeat);
                let back = self.push(Node::BackEdge(entry));
                let exit = self.push(Node::Epsilon);
                self.nodes[repeat].next = vec![back, exit];
                self.nodes[split].next = vec![entry];
                split
            }
            Operator::And(left, right) => {
                let split = self.push(Node::Epsilon);
                let left = self.build(left);
                let right = self.build(right);
                self.link_dangling(left, right);
                self.nodes[split].next = vec![left];
                split
            }
            Operator::Or(left, right) => {
                let split = self.push(Node::Epsilon);
                let left = self.build(left);
                let right = self.build(right);
                self.nodes[split].next = vec![left, right];
                split
            }
        }
    }

    /// Point every state reachable from `from` that has no successors at
    /// `to`. Back-edges are never dangling.
    fn link_dangling(&mut self, from: usize, to: usize) {
        let mut seen = vec![false; self.nodes.len()];
        let mut pending = vec![from];
        let mut dangling = Vec::new();
        while let Some(id) = pending.pop() {
            if std::mem::replace(&mut seen[id], true) {
                continue;
            }

            let state = &self.nodes[id];
            if matches!(state.node, Node::BackEdge(_)) {
                continue;
            }

            if state.next.is_empty() {
                dangling.push(id);
            } else {
                pending.extend(state.next.iter().copied());
            }
        }

        for id in dangling {
            self.nodes[id].next.push(to);
        }
    }

    fn resolve(&self, id: usize) -> usize {
        match self.nodes[id].node {
            Node::BackEdge(target) => target,
            _ => id,
        }
    }

    /// Successors of `id` with epsilon states spliced out, in order and
    /// without duplicates
    fn closure(&self, id: usize, seen: &mut Vec<bool>, out: &mut Vec<usize>) {
        for &next in &self.nodes[id].next {
            let next = self.resolve(next);
            match self.nodes[next].node {
                Node::Epsilon => {
                    if !std::mem::replace(&mut seen[next], true) {
                        self.closure(next, seen, out);
                    }
                }
                _ => {
                    if !out.contains(&next) {
                        out.push(next);
                    }
                }
            }
        }
    }

    fn simplify(self, start: usize) -> Fsm {
        let successors: Vec<Vec<usize>> = (0..self.nodes.len())
            .map(|id| {
                let mut out = Vec::new();
                if !matches!(self.nodes[id].node, Node::Epsilon | Node::BackEdge(_)) {
                    let mut seen = vec![false; self.nodes.len()];
                    self.closure(id, &mut seen, &mut out);
                }
                out
            })
            .collect();

        // number the surviving states in depth first order
        let mut order = Vec::new();
        let mut remap: Vec<Option<usize>> = vec![None; self.nodes.len()];
        let mut pending = vec![start];
        while let Some(id) = pending.pop() {
            if remap[id].is_some() {
                continue;
            }

            remap[id] = Some(order.len());
            order.push(id);
            pending.extend(successors[id].iter().rev().filter(|x| remap[**x].is_none()));
        }

        let states = order
            .into_iter()
            .map(|id| {
                let kind = match &self.nodes[id].node {
                    Node::Start => StateKind::Start,
                    Node::Finish => StateKind::Finish,
                    Node::Reference { name, label } => StateKind::Reference {
                        name: name.clone(),
                        label: label.clone(),
                    },
                    Node::Literal(text) => StateKind::Literal(text.clone()),
                    Node::Epsilon | Node::BackEdge(_) => {
                        unreachable!("epsilon states are spliced out")
                    }
                };

                let next = successors[id]
                    .iter()
                    .filter_map(|x| remap[*x])
                    .map(StateId)
                    .collect();

                State { kind, next }
            })
            .collect();

        Fsm { states }
    }
}
