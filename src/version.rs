//! Ebuild version parsing and ordering.
//!
//! Implements the domain's version grammar: a dot-separated numeric core, an
//! optional trailing letter, zero or more `_alpha|_beta|_pre|_rc|_p[N]`
//! suffixes, and an optional `-rN` revision. Ordering follows [PMS 3.3]:
//! numeric components compare as integers unless either side has a leading
//! zero (then they compare as zero-padded decimal fractions), suffixes order
//! `_alpha < _beta < _pre < _rc < (none) < _p`, and revision is the final
//! tiebreak.
//!
//! [PMS 3.3]: https://projects.gentoo.org/pms/latest/pms.html#x1-180003.3

use std::cmp::Ordering;
use std::fmt;

use crate::error::{Error, Result};

/// Version comparison operator, as it appears prefixing an atom.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Less,
    LessOrEqual,
    Equal,
    GreaterOrEqual,
    Greater,
    /// `~` — same base version, any revision.
    Approximate,
    /// `=*` — version-string prefix match.
    EqualGlob,
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Operator::Less => "<",
            Operator::LessOrEqual => "<=",
            Operator::Equal => "=",
            Operator::GreaterOrEqual => ">=",
            Operator::Greater => ">",
            Operator::Approximate => "~",
            Operator::EqualGlob => "=",
        };
        write!(f, "{s}")
    }
}

/// One `_alpha|_beta|_pre|_rc|_p` suffix component, with its numeric tail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Suffix {
    pub kind: SuffixKind,
    pub num: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SuffixKind {
    Alpha,
    Beta,
    Pre,
    Rc,
    /// The implicit "no suffix" rank, used only during comparison to slot
    /// between `_rc` and `_p`; never produced by the parser.
    None,
    P,
}

impl SuffixKind {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "alpha" => Some(Self::Alpha),
            "beta" => Some(Self::Beta),
            "pre" => Some(Self::Pre),
            "rc" => Some(Self::Rc),
            "p" => Some(Self::P),
            _ => None,
        }
    }
}

impl fmt::Display for SuffixKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SuffixKind::Alpha => "alpha",
            SuffixKind::Beta => "beta",
            SuffixKind::Pre => "pre",
            SuffixKind::Rc => "rc",
            SuffixKind::None => "",
            SuffixKind::P => "p",
        };
        write!(f, "{s}")
    }
}

/// A parsed ebuild version, e.g. `1.2.3b_rc1-r2`.
#[derive(Debug, Clone, Eq)]
pub struct Version {
    /// Operator present when this version was parsed out of an atom (e.g.
    /// `>=1.2`). `None` for a bare CPV version.
    pub op: Option<Operator>,
    /// Dot-separated numeric components, kept as their original string form
    /// so leading zeros can be re-derived for comparison and display.
    pub numbers: Vec<String>,
    pub letter: Option<char>,
    pub suffixes: Vec<Suffix>,
    pub revision: u64,
    /// Set when this version came from an `=*` glob atom.
    pub glob: bool,
}

impl Version {
    pub fn parse(s: &str) -> Result<Self> {
        let (op, rest) = split_operator(s);
        let (body, glob) = match rest.strip_suffix('*') {
            Some(b) => (b, true),
            None => (rest, false),
        };
        let (body, revision) = split_revision(body)?;
        let (numbers, letter, suffixes) = parse_body(body)?;
        Ok(Version {
            op,
            numbers,
            letter,
            suffixes,
            revision,
            glob,
        })
    }

    /// The base version: numeric components + letter, no suffixes or
    /// revision. Used by the `~` operator.
    pub fn base(&self) -> (Vec<String>, Option<char>) {
        (self.numbers.clone(), self.letter)
    }

    fn numbers_value(&self, i: usize) -> Option<&str> {
        self.numbers.get(i).map(|s| s.as_str())
    }

    fn cmp_numbers(&self, other: &Self) -> Ordering {
        let len = self.numbers.len().max(other.numbers.len());
        for i in 0..len {
            let a = self.numbers_value(i).unwrap_or("0");
            let b = other.numbers_value(i).unwrap_or("0");
            let ord = cmp_component(a, b);
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    }

    fn cmp_suffixes(&self, other: &Self) -> Ordering {
        let len = self.suffixes.len().max(other.suffixes.len());
        let none = Suffix {
            kind: SuffixKind::None,
            num: 0,
        };
        for i in 0..len {
            let a = self.suffixes.get(i).copied().unwrap_or(none);
            let b = other.suffixes.get(i).copied().unwrap_or(none);
            let ord = a.kind.cmp(&b.kind).then(a.num.cmp(&b.num));
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    }
}

/// Compare one numeric component. A component with a leading `0` (and more
/// than one digit) is compared as a zero-padded decimal fraction (string
/// comparison after right-padding with `0`s to equal length); otherwise the
/// components compare as integers.
fn cmp_component(a: &str, b: &str) -> Ordering {
    let a_fraction = a.len() > 1 && a.starts_with('0');
    let b_fraction = b.len() > 1 && b.starts_with('0');
    if a_fraction || b_fraction {
        let width = a.len().max(b.len());
        let mut a_padded = a.to_string();
        let mut b_padded = b.to_string();
        while a_padded.len() < width {
            a_padded.push('0');
        }
        while b_padded.len() < width {
            b_padded.push('0');
        }
        a_padded.cmp(&b_padded)
    } else {
        let av: u64 = a.parse().unwrap_or(0);
        let bv: u64 = b.parse().unwrap_or(0);
        av.cmp(&bv)
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl std::hash::Hash for Version {
    /// Mirrors `cmp`/`eq`: a leading-zero component compares as a decimal
    /// fraction where trailing zeros don't matter, so hash the trimmed form
    /// rather than the raw digit string, to keep equal versions' hashes equal.
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        for n in &self.numbers {
            if n.len() > 1 && n.starts_with('0') {
                n.trim_end_matches('0').hash(state);
            } else {
                n.hash(state);
            }
        }
        self.letter.hash(state);
        self.suffixes.hash(state);
        self.revision.hash(state);
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.cmp_numbers(other)
            .then_with(|| self.letter.cmp(&other.letter))
            .then_with(|| self.cmp_suffixes(other))
            .then_with(|| self.revision.cmp(&other.revision))
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Version {
    /// The numbers/letter/suffix/revision/glob portion, with no leading
    /// operator. Atoms interleave the package key between the operator and
    /// this body (`>=cat/pkg-1.2`), so [`fmt::Display`] for [`Atom`] formats
    /// this piece directly instead of the full `Version` display.
    pub fn fmt_body(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.numbers.join("."))?;
        if let Some(l) = self.letter {
            write!(f, "{l}")?;
        }
        for s in &self.suffixes {
            write!(f, "_{}{}", s.kind, s.num)?;
        }
        if self.revision != 0 {
            write!(f, "-r{}", self.revision)?;
        }
        if self.glob {
            write!(f, "*")?;
        }
        Ok(())
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(op) = self.op {
            write!(f, "{op}")?;
        }
        self.fmt_body(f)
    }
}

/// Splits `key-version` at the rightmost `-` whose remainder parses as a
/// full version. A version's own `-rN` revision contains a dash, so the
/// naive rightmost split can land inside it (`cat/pkg-4-r1` naively splits
/// to `r1`, which isn't a version on its own); this retries progressively
/// further left until the remainder parses cleanly.
pub fn rsplit_version(s: &str) -> Option<(&str, &str)> {
    let mut idx = s.len();
    while let Some(pos) = s[..idx].rfind('-') {
        let ver_str = &s[pos + 1..];
        if ver_str.chars().next().is_some_and(|c| c.is_ascii_digit()) && Version::parse(ver_str).is_ok() {
            return Some((&s[..pos], ver_str));
        }
        idx = pos;
    }
    None
}

fn split_operator(s: &str) -> (Option<Operator>, &str) {
    for (prefix, op) in [
        ("<=", Operator::LessOrEqual),
        (">=", Operator::GreaterOrEqual),
        ("<", Operator::Less),
        (">", Operator::Greater),
        ("~", Operator::Approximate),
        ("=", Operator::Equal),
    ] {
        if let Some(rest) = s.strip_prefix(prefix) {
            return (Some(op), rest);
        }
    }
    (None, s)
}

fn split_revision(s: &str) -> Result<(&str, u64)> {
    match s.rfind("-r") {
        Some(idx) if s[idx + 2..].chars().all(|c| c.is_ascii_digit()) && s.len() > idx + 2 => {
            let rev: u64 = s[idx + 2..]
                .parse()
                .map_err(|_| Error::MalformedVersion(s.to_string()))?;
            Ok((&s[..idx], rev))
        }
        _ => Ok((s, 0)),
    }
}

fn parse_body(body: &str) -> Result<(Vec<String>, Option<char>, Vec<Suffix>)> {
    if body.is_empty() {
        return Err(Error::MalformedVersion(body.to_string()));
    }
    let mut parts = body.split('_');
    let numeric_and_letter = parts.next().unwrap();

    let mut chars = numeric_and_letter.chars().peekable();
    let mut numeric_str = String::new();
    while let Some(&c) = chars.peek() {
        if c.is_ascii_digit() || c == '.' {
            numeric_str.push(c);
            chars.next();
        } else {
            break;
        }
    }
    if numeric_str.is_empty() {
        return Err(Error::MalformedVersion(body.to_string()));
    }
    let numbers: Vec<String> = numeric_str.split('.').map(|s| s.to_string()).collect();
    for n in &numbers {
        if n.is_empty() || !n.chars().all(|c| c.is_ascii_digit()) {
            return Err(Error::MalformedVersion(body.to_string()));
        }
    }

    let letter = match chars.next() {
        Some(c) if c.is_ascii_lowercase() => {
            if chars.next().is_some() {
                return Err(Error::MalformedVersion(body.to_string()));
            }
            Some(c)
        }
        Some(_) => return Err(Error::MalformedVersion(body.to_string())),
        None => None,
    };

    let mut suffixes = Vec::new();
    for part in parts {
        let split_at = part.find(|c: char| c.is_ascii_digit()).unwrap_or(part.len());
        let (kind_str, num_str) = part.split_at(split_at);
        let kind = SuffixKind::parse(kind_str)
            .ok_or_else(|| Error::MalformedVersion(format!("unknown suffix {kind_str}")))?;
        let num: u64 = if num_str.is_empty() {
            0
        } else {
            num_str
                .parse()
                .map_err(|_| Error::MalformedVersion(body.to_string()))?
        };
        suffixes.push(Suffix { kind, num });
    }

    Ok((numbers, letter, suffixes))
}

/// Evaluate whether `candidate` satisfies the constraint `op constraint`.
///
/// See [PMS 8.3.2](https://projects.gentoo.org/pms/latest/pms.html#x1-830008.3.2).
pub fn version_matches(candidate: &Version, op: Operator, constraint: &Version) -> bool {
    match op {
        Operator::Less => candidate < constraint,
        Operator::LessOrEqual => candidate <= constraint,
        Operator::Equal => candidate == constraint,
        Operator::GreaterOrEqual => candidate >= constraint,
        Operator::Greater => candidate > constraint,
        Operator::Approximate => candidate.base() == constraint.base(),
        Operator::EqualGlob => glob_matches(candidate, constraint),
    }
}

fn glob_matches(candidate: &Version, constraint: &Version) -> bool {
    if candidate.numbers.len() < constraint.numbers.len() {
        return false;
    }
    for (c, p) in candidate.numbers.iter().zip(constraint.numbers.iter()) {
        if c != p {
            return false;
        }
    }
    match constraint.letter {
        Some(cl) => candidate.letter == Some(cl),
        None => true,
    }
}
