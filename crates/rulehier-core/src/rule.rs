//! Rule templates and their instantiations.
//!
//! A template is a head `p(X,Y)` and a body path starting at one head variable.
//! Body terms are renamed once when the template is built: the chain reads
//! `X|Y, V1, V2, ...` and ends at the other head variable (closed rules) or at
//! a fresh `V<n>` (open rules).

use crate::error::RuleParseError;
use crate::stats::Measures;
use rulehier_graph::{Direction, EntityId, Pair, PathStep};
use std::fmt;

/// Position of a template in a target's template list.
pub type TemplateId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuleKind {
    /// Tail variable equals the head's other argument.
    Closed,
    /// Tail variable is free; only instantiations predict anything.
    Open,
}

impl RuleKind {
    pub fn header(self) -> &'static str {
        match self {
            RuleKind::Closed => "CAR",
            RuleKind::Open => "OAR",
        }
    }

    pub fn from_header(header: &str) -> Result<Self, RuleParseError> {
        match header.trim() {
            "CAR" => Ok(RuleKind::Closed),
            "OAR" => Ok(RuleKind::Open),
            other => Err(RuleParseError::UnknownHeader(other.to_string())),
        }
    }
}

/// One body atom, stored along the path: `from` is the term reached so far,
/// `to` the term this hop reaches.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Atom {
    pub predicate: String,
    pub direction: Direction,
    pub from: String,
    pub to: String,
}

impl Atom {
    /// `(subject, object)` argument order as written.
    pub fn args(&self) -> (&str, &str) {
        match self.direction {
            Direction::Outgoing => (&self.from, &self.to),
            Direction::Incoming => (&self.to, &self.from),
        }
    }

    fn write_with(&self, f: &mut impl fmt::Write, rename: impl Fn(&str) -> Option<String>) -> fmt::Result {
        let (a, b) = self.args();
        let a = rename(a).unwrap_or_else(|| a.to_string());
        let b = rename(b).unwrap_or_else(|| b.to_string());
        write!(f, "{}({a},{b})", self.predicate)
    }
}

impl fmt::Display for Atom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_with(f, |_| None)
    }
}

/// A variablized rule.
///
/// Identity is the head predicate plus the canonical body; two templates with
/// the same text compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Template {
    pub kind: RuleKind,
    pub head_predicate: String,
    /// The body path starts at `X` (subject side) rather than `Y`.
    pub from_subject: bool,
    pub body: Vec<Atom>,
}

impl Template {
    /// Build a template from its path hops, naming body terms canonically.
    pub fn new(
        kind: RuleKind,
        head_predicate: impl Into<String>,
        from_subject: bool,
        steps: impl IntoIterator<Item = (String, Direction)>,
    ) -> Self {
        let (start, end) = if from_subject { ("X", "Y") } else { ("Y", "X") };
        let steps: Vec<_> = steps.into_iter().collect();
        let n = steps.len();
        let body = steps
            .into_iter()
            .enumerate()
            .map(|(i, (predicate, direction))| {
                let from = if i == 0 { start.to_string() } else { format!("V{i}") };
                let to = if i + 1 == n && kind == RuleKind::Closed {
                    end.to_string()
                } else {
                    format!("V{}", i + 1)
                };
                Atom {
                    predicate,
                    direction,
                    from,
                    to,
                }
            })
            .collect();
        Self {
            kind,
            head_predicate: head_predicate.into(),
            from_subject,
            body,
        }
    }

    /// Parse `<id>\t<CAR|OAR>\t<rule>`; further tab fields are ignored.
    pub fn parse_line(line: &str) -> Result<Self, RuleParseError> {
        let mut fields = line.split('\t');
        let (Some(_), Some(header), Some(rule)) = (fields.next(), fields.next(), fields.next()) else {
            return Err(RuleParseError::MissingFields(line.to_string()));
        };
        Self::parse_rule(RuleKind::from_header(header)?, rule)
    }

    /// Parse `p(X,Y) <- q(X,V1), r(V1,Y)`.
    pub fn parse_rule(kind: RuleKind, text: &str) -> Result<Self, RuleParseError> {
        let (head, body) = text
            .split_once("<-")
            .ok_or_else(|| RuleParseError::MissingArrow(text.to_string()))?;

        let (head_predicate, hx, hy) = parse_atom(head)?;
        if hx != "X" || hy != "Y" {
            return Err(RuleParseError::BadHead(head.trim().to_string()));
        }

        let atoms = split_atoms(body)
            .into_iter()
            .map(parse_atom)
            .collect::<Result<Vec<_>, _>>()?;
        let Some((_, a0, b0)) = atoms.first() else {
            return Err(RuleParseError::EmptyBody);
        };

        let from_subject = if a0 == "X" || b0 == "X" {
            true
        } else if a0 == "Y" || b0 == "Y" {
            false
        } else {
            return Err(RuleParseError::BrokenChain {
                index: 0,
                expected: "X".into(),
            });
        };

        let mut current = if from_subject { "X" } else { "Y" }.to_string();
        let mut steps = Vec::with_capacity(atoms.len());
        for (index, (predicate, a, b)) in atoms.into_iter().enumerate() {
            let (direction, next) = if a == current {
                (Direction::Outgoing, b)
            } else if b == current {
                (Direction::Incoming, a)
            } else {
                return Err(RuleParseError::BrokenChain {
                    index,
                    expected: current,
                });
            };
            steps.push((predicate, direction));
            current = next;
        }

        let end = if from_subject { "Y" } else { "X" };
        match kind {
            RuleKind::Closed if current != end => {
                return Err(RuleParseError::BadTail {
                    expected: end.to_string(),
                    found: current,
                })
            }
            RuleKind::Open if current == "X" || current == "Y" => {
                return Err(RuleParseError::BadTail {
                    expected: "a free variable".to_string(),
                    found: current,
                })
            }
            _ => {}
        }

        Ok(Self::new(kind, head_predicate, from_subject, steps))
    }

    /// Number of body atoms.
    pub fn len(&self) -> usize {
        self.body.len()
    }

    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }

    pub fn is_closed(&self) -> bool {
        self.kind == RuleKind::Closed
    }

    /// `<CAR|OAR>\t<rule>`, the template's identity in persisted files.
    pub fn index_string(&self) -> String {
        format!("{}\t{}", self.kind.header(), self)
    }

    pub fn path_steps(&self) -> Vec<PathStep<'_>> {
        self.body
            .iter()
            .map(|atom| PathStep::new(&atom.predicate, atom.direction))
            .collect()
    }

    /// `self`'s body is a positional prefix of `other`'s.
    pub fn is_prefix_of(&self, other: &Template) -> bool {
        self.len() <= other.len() && self.body.iter().zip(&other.body).all(|(a, b)| a == b)
    }

    /// The prediction a closed-rule grounding `(start, end)` makes.
    pub fn prediction(&self, grounding: Pair) -> Pair {
        if self.from_subject {
            grounding
        } else {
            grounding.reversed()
        }
    }

    /// A head-anchored prediction for one grounding start.
    pub fn anchored_prediction(&self, original: EntityId, anchor: EntityId) -> Pair {
        if self.from_subject {
            Pair::new(original, anchor)
        } else {
            Pair::new(anchor, original)
        }
    }

    /// `R(e,Y) <- R(Y,e)` style both-anchored instantiations that only restate
    /// the head fact.
    pub fn is_trivial_instantiation(&self, head: EntityId, tail: EntityId) -> bool {
        head == tail && self.len() == 1 && self.body[0].predicate == self.head_predicate
    }

    /// Rule text with the head's anchored argument and optionally the body
    /// tail bound to entity names.
    pub fn instantiated_text(&self, head_anchor: &str, tail_anchor: Option<&str>) -> String {
        Instantiated {
            template: self,
            head_anchor,
            tail_anchor,
        }
        .to_string()
    }
}

/// Display form of a template bound at its anchors.
struct Instantiated<'a> {
    template: &'a Template,
    head_anchor: &'a str,
    tail_anchor: Option<&'a str>,
}

impl fmt::Display for Instantiated<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let template = self.template;
        let (a, b) = if template.from_subject {
            ("X", self.head_anchor)
        } else {
            (self.head_anchor, "Y")
        };
        write!(f, "{}({a},{b}) <- ", template.head_predicate)?;
        let tail_var = template.body.last().map(|atom| atom.to.as_str());
        for (i, atom) in template.body.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            atom.write_with(f, |term| match self.tail_anchor {
                Some(tail) if Some(term) == tail_var => Some(tail.to_string()),
                _ => None,
            })?;
        }
        Ok(())
    }
}

impl fmt::Display for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(X,Y) <- ", self.head_predicate)?;
        for (i, atom) in self.body.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{atom}")?;
        }
        Ok(())
    }
}

/// Split a body on the commas that separate atoms.
fn split_atoms(body: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, c) in body.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                out.push(&body[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    out.push(&body[start..]);
    out.into_iter().filter(|s| !s.trim().is_empty()).collect()
}

/// `pred(a,b)` -> `(pred, a, b)`
fn parse_atom(text: &str) -> Result<(String, String, String), RuleParseError> {
    let text = text.trim();
    let malformed = || RuleParseError::MalformedAtom(text.to_string());
    let inner = text.strip_suffix(')').ok_or_else(malformed)?;
    let open = inner.rfind('(').ok_or_else(malformed)?;
    let predicate = inner[..open].trim();
    let (a, b) = inner[open + 1..].split_once(',').ok_or_else(malformed)?;
    let (a, b) = (a.trim(), b.trim());
    if predicate.is_empty() || a.is_empty() || b.is_empty() {
        return Err(malformed());
    }
    Ok((predicate.to_string(), a.to_string(), b.to_string()))
}

// ============================================================================
// Instantiations
// ============================================================================

/// How an instantiated rule is bound to entities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Anchoring {
    /// The head's free argument is bound.
    Head { anchor: EntityId },
    /// The head's free argument and the body tail are both bound.
    Both { head: EntityId, tail: EntityId },
}

impl Anchoring {
    /// Record type tag in the rule index.
    pub fn tag(&self) -> u8 {
        match self {
            Anchoring::Head { .. } => 0,
            Anchoring::Both { .. } => 2,
        }
    }

    pub fn head_anchor(&self) -> EntityId {
        match *self {
            Anchoring::Head { anchor } => anchor,
            Anchoring::Both { head, .. } => head,
        }
    }
}

/// The compact record kept for each qualified instantiation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InsRuleSummary {
    pub anchoring: Anchoring,
    pub measures: Measures,
}

impl InsRuleSummary {
    pub fn new(anchoring: Anchoring, measures: Measures) -> Self {
        Self {
            anchoring,
            measures,
        }
    }

    /// `0,<anchor>,<measures>` or `2,<head>,<tail>,<measures>`.
    pub fn to_record(&self) -> String {
        let mut out = match self.anchoring {
            Anchoring::Head { anchor } => format!("0,{anchor}"),
            Anchoring::Both { head, tail } => format!("2,{head},{tail}"),
        };
        for value in self.measures.columns() {
            out.push(',');
            out.push_str(&crate::persist::format_measure(value));
        }
        out
    }

    pub fn parse_record(record: &str) -> Result<Self, RuleParseError> {
        let bad = || RuleParseError::BadRecord(record.to_string());
        let fields: Vec<&str> = record.trim().split(',').collect();
        let id = |s: &str| s.trim().parse::<EntityId>().map_err(|_| bad());
        let (anchoring, rest) = match fields.first().copied() {
            Some("0") if fields.len() == 8 => (Anchoring::Head { anchor: id(fields[1])? }, &fields[2..]),
            Some("2") if fields.len() == 9 => (
                Anchoring::Both {
                    head: id(fields[1])?,
                    tail: id(fields[2])?,
                },
                &fields[3..],
            ),
            _ => return Err(bad()),
        };
        let mut columns = [0.0; 6];
        for (slot, field) in columns.iter_mut().zip(rest) {
            *slot = field.trim().parse::<f64>().map_err(|_| bad())?;
        }
        Ok(Self::new(anchoring, Measures::from_columns(columns)))
    }
}
