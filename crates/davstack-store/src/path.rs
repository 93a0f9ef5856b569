use std::fmt;

use smallvec::SmallVec;

/// One step into the state tree.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Segment {
    Key(String),
    Index(usize),
}

impl Segment {
    pub fn as_key(&self) -> Option<&str> {
        match self {
            Segment::Key(k) => Some(k),
            Segment::Index(_) => None,
        }
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Key(k) => f.write_str(k),
            Segment::Index(i) => write!(f, "{i}"),
        }
    }
}

/// `Some(i)` only for the canonical decimal form of `i`; `"007"`, `"+1"` and
/// `"00"` stay keys.
pub(crate) fn canonical_index(s: &str) -> Option<usize> {
    s.parse::<usize>().ok().filter(|i| i.to_string() == s)
}

impl From<&str> for Segment {
    fn from(s: &str) -> Self {
        match canonical_index(s) {
            Some(i) => Segment::Index(i),
            None => Segment::Key(s.to_string()),
        }
    }
}

impl From<String> for Segment {
    fn from(s: String) -> Self {
        match canonical_index(&s) {
            Some(i) => Segment::Index(i),
            None => Segment::Key(s),
        }
    }
}

impl From<usize> for Segment {
    fn from(i: usize) -> Self {
        Segment::Index(i)
    }
}

/// Location inside a state tree. The empty path is the root.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Path(SmallVec<[Segment; 4]>);

impl Path {
    pub fn root() -> Self {
        Self::default()
    }

    /// Dotted form: `"todos.0.title"`. Numeric segments become indices and
    /// empty segments are skipped, so `""` is the root.
    pub fn parse(dotted: &str) -> Self {
        Self(
            dotted
                .split('.')
                .filter(|s| !s.is_empty())
                .map(Segment::from)
                .collect(),
        )
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn segments(&self) -> &[Segment] {
        &self.0
    }

    pub fn last(&self) -> Option<&Segment> {
        self.0.last()
    }

    pub fn push(&mut self, segment: impl Into<Segment>) {
        self.0.push(segment.into());
    }

    pub fn child(&self, segment: impl Into<Segment>) -> Path {
        let mut next = self.clone();
        next.push(segment);
        next
    }

    pub fn join(&self, other: &Path) -> Path {
        let mut next = self.clone();
        next.0.extend(other.0.iter().cloned());
        next
    }

    /// Splits off the final segment.
    pub fn split_last(&self) -> Option<(Path, &Segment)> {
        let (last, rest) = self.0.split_last()?;
        Some((Path(rest.iter().cloned().collect()), last))
    }

    pub fn starts_with(&self, prefix: &Path) -> bool {
        self.0.starts_with(&prefix.0)
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_root() {
            return f.write_str("root");
        }
        for (i, segment) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            write!(f, "{segment}")?;
        }
        Ok(())
    }
}

impl From<&str> for Path {
    fn from(s: &str) -> Self {
        Path::parse(s)
    }
}

impl From<String> for Path {
    fn from(s: String) -> Self {
        Path::parse(&s)
    }
}

impl From<&Path> for Path {
    fn from(p: &Path) -> Self {
        p.clone()
    }
}

impl From<usize> for Path {
    fn from(i: usize) -> Self {
        Path(SmallVec::from_iter([Segment::Index(i)]))
    }
}

impl<const N: usize> From<[&str; N]> for Path {
    fn from(parts: [&str; N]) -> Self {
        Path(parts.into_iter().map(Segment::from).collect())
    }
}

impl FromIterator<Segment> for Path {
    fn from_iter<I: IntoIterator<Item = Segment>>(iter: I) -> Self {
        Path(iter.into_iter().collect())
    }
}
