//! P/T 网静态结构元素：库所、迁移与（可含 ω 的）标识。
use std::cmp::Ordering;
use std::fmt;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::net::ids::PlaceId;
use crate::net::index_vec::IndexVec;

pub type Weight = u64;

/// Token count of a single place. `Omega` stands for "unboundedly many" and
/// orders above every finite count.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Tokens {
    Finite(Weight),
    Omega,
}

impl Tokens {
    pub const OMEGA: Tokens = Tokens::Omega;

    pub fn is_omega(self) -> bool {
        matches!(self, Tokens::Omega)
    }

    pub fn finite(self) -> Option<Weight> {
        match self {
            Tokens::Finite(count) => Some(count),
            Tokens::Omega => None,
        }
    }

    /// Whether this many tokens satisfy an input arc of weight `required`.
    pub fn satisfies(self, required: Weight) -> bool {
        match self {
            Tokens::Finite(count) => count >= required,
            Tokens::Omega => true,
        }
    }
}

impl From<Weight> for Tokens {
    fn from(value: Weight) -> Self {
        Tokens::Finite(value)
    }
}

impl fmt::Debug for Tokens {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl fmt::Display for Tokens {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tokens::Finite(count) => write!(f, "{count}"),
            Tokens::Omega => f.write_str("ω"),
        }
    }
}

// 有限值序列化为整数，ω 序列化为字符串 "omega"。
impl Serialize for Tokens {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Tokens::Finite(count) => serializer.serialize_u64(*count),
            Tokens::Omega => serializer.serialize_str("omega"),
        }
    }
}

impl<'de> Deserialize<'de> for Tokens {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct TokensVisitor;

        impl Visitor<'_> for TokensVisitor {
            type Value = Tokens;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a nonnegative token count or \"omega\"")
            }

            fn visit_u64<E: de::Error>(self, value: u64) -> Result<Tokens, E> {
                Ok(Tokens::Finite(value))
            }

            fn visit_i64<E: de::Error>(self, value: i64) -> Result<Tokens, E> {
                u64::try_from(value)
                    .map(Tokens::Finite)
                    .map_err(|_| E::invalid_value(de::Unexpected::Signed(value), &self))
            }

            fn visit_str<E: de::Error>(self, value: &str) -> Result<Tokens, E> {
                match value {
                    "omega" | "ω" => Ok(Tokens::Omega),
                    other => Err(E::invalid_value(de::Unexpected::Str(other), &self)),
                }
            }
        }

        deserializer.deserialize_any(TokensVisitor)
    }
}

#[derive(Clone, Serialize, Deserialize, PartialEq, Eq, Hash, Debug)]
pub struct Place {
    pub name: String,
    pub tokens: Weight,
}

impl Place {
    pub fn new(name: impl Into<String>, tokens: Weight) -> Self {
        Self {
            name: name.into(),
            tokens,
        }
    }
}

#[derive(Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Transition {
    pub name: String,
}

impl Transition {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl fmt::Debug for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Transition").field(&self.name).finish()
    }
}

/// Token distribution over all places. Equality is component-wise, with
/// `Omega` equal only to `Omega`.
#[derive(Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Marking(pub IndexVec<PlaceId, Tokens>);

impl Marking {
    pub fn new(tokens: IndexVec<PlaceId, Tokens>) -> Self {
        Self(tokens)
    }

    pub fn from_counts(counts: &[Weight]) -> Self {
        Self(counts.iter().copied().map(Tokens::Finite).collect())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (PlaceId, Tokens)> + '_ {
        self.0.iter_enumerated().map(|(place, tokens)| (place, *tokens))
    }

    pub fn tokens(&self, place: PlaceId) -> Tokens {
        self.0[place]
    }

    pub fn tokens_mut(&mut self, place: PlaceId) -> &mut Tokens {
        &mut self.0[place]
    }

    pub fn has_omega(&self) -> bool {
        self.0.iter().any(|tokens| tokens.is_omega())
    }

    pub fn omega_places(&self) -> impl Iterator<Item = PlaceId> + '_ {
        self.iter()
            .filter(|(_, tokens)| tokens.is_omega())
            .map(|(place, _)| place)
    }

    /// Largest finite count in this marking, ignoring ω places.
    pub fn max_finite(&self) -> Weight {
        self.0
            .iter()
            .filter_map(|tokens| tokens.finite())
            .max()
            .unwrap_or(0)
    }
}

impl fmt::Debug for Marking {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl fmt::Display for Marking {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (idx, tokens) in self.0.iter().enumerate() {
            if idx > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{tokens}")?;
        }
        f.write_str("]")
    }
}

/// 分量序：`M1 >= M2` 当且仅当每个库所都有 `M1[p] >= M2[p]`（ω 大于任何有限值）。
impl PartialOrd for Marking {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        if self.len() != other.len() {
            return None;
        }
        let mut less = false;
        let mut greater = false;
        for (left, right) in self.0.iter().zip(other.0.iter()) {
            match left.cmp(right) {
                Ordering::Less => less = true,
                Ordering::Greater => greater = true,
                Ordering::Equal => {}
            }
        }
        match (less, greater) {
            (true, true) => None,
            (true, false) => Some(Ordering::Less),
            (false, true) => Some(Ordering::Greater),
            (false, false) => Some(Ordering::Equal),
        }
    }
}
