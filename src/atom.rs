//! Atom parsing and matching.
//!
//! Grammar (per EAPI): `[blocker][op]cat/pkg[-ver][:slot[/subslot][=|*]][use-deps][::repo]`.
//! See [PMS 8.2](https://projects.gentoo.org/pms/latest/pms.html#x1-800008.2).

use std::fmt;

use crate::cpv::Cpn;
use crate::eapi::Eapi;
use crate::error::{Error, Result};
use crate::version::{Operator, Version};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Blocker {
    #[default]
    None,
    /// `!atom` — allowed to coexist during an upgrade, must not coexist after.
    Weak,
    /// `!!atom` — must never coexist.
    Strong,
}

impl fmt::Display for Blocker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Blocker::None => Ok(()),
            Blocker::Weak => write!(f, "!"),
            Blocker::Strong => write!(f, "!!"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlotOperator {
    /// `:*` — accept any slot.
    Star,
    /// `:=` or `:slot=` — rebuild trigger on slot/subslot change.
    Equal,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SlotDep {
    pub slot: Option<String>,
    pub subslot: Option<String>,
    pub op: Option<SlotOperator>,
}

/// One USE-flag predicate inside `[...]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum UseDep {
    /// `flag` — must be enabled.
    Enabled(String),
    /// `-flag` — must be disabled.
    Disabled(String),
    /// `flag?` — if the parent package has `flag` enabled, target must too.
    Conditional(String),
    /// `!flag?` — if the parent package has `flag` disabled, target must be enabled.
    ConditionalInverse(String),
    /// `flag=` — target must match the parent's state for `flag`.
    Equal(String),
    /// `!flag=` — target must be the opposite of the parent's state for `flag`.
    EqualInverse(String),
    /// `flag(+)` / `flag(-)` with no conditional form — EAPI 4+ default
    /// used when the target package does not declare `flag` in `IUSE`.
    DefaultEnabled(String),
    DefaultDisabled(String),
}

impl UseDep {
    pub fn flag(&self) -> &str {
        match self {
            UseDep::Enabled(f)
            | UseDep::Disabled(f)
            | UseDep::Conditional(f)
            | UseDep::ConditionalInverse(f)
            | UseDep::Equal(f)
            | UseDep::EqualInverse(f)
            | UseDep::DefaultEnabled(f)
            | UseDep::DefaultDisabled(f) => f,
        }
    }
}

impl fmt::Display for UseDep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UseDep::Enabled(flag) => write!(f, "{flag}"),
            UseDep::Disabled(flag) => write!(f, "-{flag}"),
            UseDep::Conditional(flag) => write!(f, "{flag}?"),
            UseDep::ConditionalInverse(flag) => write!(f, "!{flag}?"),
            UseDep::Equal(flag) => write!(f, "{flag}="),
            UseDep::EqualInverse(flag) => write!(f, "!{flag}="),
            UseDep::DefaultEnabled(flag) => write!(f, "{flag}(+)"),
            UseDep::DefaultDisabled(flag) => write!(f, "{flag}(-)"),
        }
    }
}

/// An immutable, structured atom.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Atom {
    pub cpn: Cpn,
    pub version: Option<Version>,
    pub slot_dep: Option<SlotDep>,
    pub use_deps: Vec<UseDep>,
    pub repo: Option<String>,
    pub blocker: Blocker,
}

impl Atom {
    pub fn parse(s: &str, eapi: Eapi) -> Result<Self> {
        let (blocker, rest) = if let Some(r) = s.strip_prefix("!!") {
            (Blocker::Strong, r)
        } else if let Some(r) = s.strip_prefix('!') {
            (Blocker::Weak, r)
        } else {
            (Blocker::None, s)
        };

        let (rest, repo) = match rest.rsplit_once("::") {
            Some((body, repo)) => (body, Some(repo.to_string())),
            None => (rest, None),
        };

        let (rest, use_deps) = extract_use_deps(rest, eapi)?;

        let (rest, slot_dep) = extract_slot_dep(rest, eapi)?;

        let (op, rest) = split_operator(rest);

        let (cpn, version) = if let Some(op) = op {
            let (key, ver_str) = crate::version::rsplit_version(rest).ok_or_else(|| {
                Error::MalformedAtom(format!("operator requires a version in {s:?}"))
            })?;
            let cpn = Cpn::parse(key)?;
            let mut version = Version::parse(ver_str)?;
            if version.glob && op != Operator::Equal {
                return Err(Error::MalformedAtom(format!(
                    "glob version requires '=' operator in {s:?}"
                )));
            }
            version.op = Some(if version.glob { Operator::EqualGlob } else { op });
            (cpn, Some(version))
        } else {
            (Cpn::parse(rest)?, None)
        };

        if let Some(ref sd) = slot_dep {
            if sd.subslot.is_some() && !eapi.supports_subslots() {
                return Err(Error::MalformedAtom(format!(
                    "sub-slots require EAPI >= 5 in {s:?}"
                )));
            }
            if sd.op.is_some() && !eapi.supports_slot_operators() {
                return Err(Error::MalformedAtom(format!(
                    "slot operators require EAPI >= 5 in {s:?}"
                )));
            }
        }

        for ud in &use_deps {
            let is_default = matches!(ud, UseDep::DefaultEnabled(_) | UseDep::DefaultDisabled(_));
            if is_default && !eapi.supports_use_dep_defaults() {
                return Err(Error::MalformedAtom(format!(
                    "use-dep defaults require EAPI >= 4 in {s:?}"
                )));
            }
        }

        Ok(Atom {
            cpn,
            version,
            slot_dep,
            use_deps,
            repo,
            blocker,
        })
    }

    pub fn key(&self) -> String {
        self.cpn.to_string()
    }

    /// Whether this atom matches a concrete package, given its resolved USE
    /// state. `enabled_use` is `None` when the package's USE configuration
    /// has not been computed (e.g. it's still an unconfigured repository
    /// view) — in that case only non-defaulting use-deps still constrain
    /// the match, per §4.2.
    pub fn matches(&self, pkg: &dyn super::repo::tree::MatchablePackage) -> bool {
        if pkg.cpn() != &self.cpn {
            return false;
        }
        if let Some(ref v) = self.version {
            let op = v.op.unwrap_or(Operator::Equal);
            if !crate::version::version_matches(pkg.version(), op, v) {
                return false;
            }
        }
        if let Some(ref sd) = self.slot_dep {
            if let Some(ref slot) = sd.slot {
                if pkg.slot() != Some(slot.as_str()) {
                    return false;
                }
            }
            if let Some(ref subslot) = sd.subslot {
                if pkg.subslot() != Some(subslot.as_str()) {
                    return false;
                }
            }
        }
        if let Some(ref repo) = self.repo {
            if pkg.repo_id() != Some(repo.as_str()) {
                return false;
            }
        }
        for ud in &self.use_deps {
            if !use_dep_matches(ud, pkg.enabled_use()) {
                return false;
            }
        }
        true
    }
}

fn use_dep_matches(ud: &UseDep, enabled: Option<&std::collections::HashSet<String>>) -> bool {
    let is_enabled = |flag: &str| enabled.map(|s| s.contains(flag)).unwrap_or(false);
    match ud {
        UseDep::Enabled(flag) => enabled.is_none() || is_enabled(flag),
        UseDep::Disabled(flag) => enabled.is_none() || !is_enabled(flag),
        UseDep::Conditional(_) | UseDep::ConditionalInverse(_) | UseDep::Equal(_) | UseDep::EqualInverse(_) => {
            // Resolved eagerly against the parent's USE state before the
            // dependency is ever turned into an atom match, per §4.2; an
            // atom still carrying one of these at match time is treated as
            // satisfied unless the target's USE state is known.
            match enabled {
                None => true,
                Some(set) => match ud {
                    UseDep::Conditional(flag) | UseDep::Equal(flag) => set.contains(flag),
                    UseDep::ConditionalInverse(flag) | UseDep::EqualInverse(flag) => {
                        !set.contains(flag)
                    }
                    _ => unreachable!(),
                },
            }
        }
        UseDep::DefaultEnabled(flag) => enabled.is_none() || is_enabled(flag),
        UseDep::DefaultDisabled(flag) => enabled.is_none() || !is_enabled(flag),
    }
}

impl fmt::Display for Atom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.blocker)?;
        if let Some(ref v) = self.version {
            if let Some(op) = v.op {
                write!(f, "{op}")?;
            }
            write!(f, "{}-", self.cpn)?;
            v.fmt_body(f)?;
        } else {
            write!(f, "{}", self.cpn)?;
        }
        if let Some(ref sd) = self.slot_dep {
            write!(f, ":")?;
            match (&sd.slot, &sd.subslot) {
                (Some(s), Some(sub)) => write!(f, "{s}/{sub}")?,
                (Some(s), None) => write!(f, "{s}")?,
                (None, None) => {}
                (None, Some(_)) => unreachable!("subslot without slot"),
            }
            match sd.op {
                Some(SlotOperator::Star) => write!(f, "*")?,
                Some(SlotOperator::Equal) => write!(f, "=")?,
                None => {}
            }
        }
        if !self.use_deps.is_empty() {
            write!(f, "[")?;
            for (i, ud) in self.use_deps.iter().enumerate() {
                if i > 0 {
                    write!(f, ",")?;
                }
                write!(f, "{ud}")?;
            }
            write!(f, "]")?;
        }
        if let Some(ref repo) = self.repo {
            write!(f, "::{repo}")?;
        }
        Ok(())
    }
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

fn extract_use_deps(s: &str, eapi: Eapi) -> Result<(&str, Vec<UseDep>)> {
    let Some(open) = s.find('[') else {
        return Ok((s, Vec::new()));
    };
    if !s.ends_with(']') {
        return Err(Error::MalformedAtom(format!("unterminated use-deps in {s:?}")));
    }
    let body = &s[open + 1..s.len() - 1];
    let mut deps = Vec::new();
    if !body.is_empty() {
        for part in body.split(',') {
            deps.push(parse_use_dep(part, eapi)?);
        }
    }
    Ok((&s[..open], deps))
}

fn parse_use_dep(part: &str, _eapi: Eapi) -> Result<UseDep> {
    // `-flag` (disabled) and `!flag` (conditional/equal inverse) are
    // distinct, mutually exclusive prefixes: `-` only pairs with the plain
    // or `(+)`/`(-)` default forms, `!` only with `?`/`=`.
    let (disabled, negate, rest) = match (part.strip_prefix('-'), part.strip_prefix('!')) {
        (Some(r), _) => (true, false, r),
        (_, Some(r)) => (false, true, r),
        _ => (false, false, part),
    };
    let (rest, default) = if let Some(r) = rest.strip_suffix("(+)") {
        (r, Some(true))
    } else if let Some(r) = rest.strip_suffix("(-)") {
        (r, Some(false))
    } else {
        (rest, None)
    };

    let (flag, suffix) = if let Some(f) = rest.strip_suffix('?') {
        (f, Some('?'))
    } else if let Some(f) = rest.strip_suffix('=') {
        (f, Some('='))
    } else {
        (rest, None)
    };

    if flag.is_empty() {
        return Err(Error::MalformedAtom(format!("empty use-dep flag in {part:?}")));
    }
    let flag = flag.to_string();

    Ok(match (suffix, negate, disabled) {
        (Some('?'), false, false) => UseDep::Conditional(flag),
        (Some('?'), true, false) => UseDep::ConditionalInverse(flag),
        (Some('='), false, false) => UseDep::Equal(flag),
        (Some('='), true, false) => UseDep::EqualInverse(flag),
        (None, false, false) => match default {
            Some(true) => UseDep::DefaultEnabled(flag),
            Some(false) => UseDep::DefaultDisabled(flag),
            None => UseDep::Enabled(flag),
        },
        (None, false, true) => UseDep::Disabled(flag),
        _ => return Err(Error::MalformedAtom(format!("malformed use-dep {part:?}"))),
    })
}

fn extract_slot_dep(s: &str, _eapi: Eapi) -> Result<(&str, Option<SlotDep>)> {
    let Some(idx) = s.find(':') else {
        return Ok((s, None));
    };
    let (body, slot_part) = (&s[..idx], &s[idx + 1..]);

    if slot_part == "*" {
        return Ok((
            body,
            Some(SlotDep {
                slot: None,
                subslot: None,
                op: Some(SlotOperator::Star),
            }),
        ));
    }
    if slot_part == "=" {
        return Ok((
            body,
            Some(SlotDep {
                slot: None,
                subslot: None,
                op: Some(SlotOperator::Equal),
            }),
        ));
    }

    let (slot_part, op) = match slot_part.strip_suffix('=') {
        Some(rest) => (rest, Some(SlotOperator::Equal)),
        None => (slot_part, None),
    };

    if slot_part.is_empty() {
        return Err(Error::MalformedAtom(format!("empty slot in {s:?}")));
    }

    let (slot, subslot) = match slot_part.split_once('/') {
        Some((slot, subslot)) => (slot.to_string(), Some(subslot.to_string())),
        None => (slot_part.to_string(), None),
    };

    Ok((
        body,
        Some(SlotDep {
            slot: Some(slot),
            subslot,
            op,
        }),
    ))
}
