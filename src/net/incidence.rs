//! 库所 × 迁移的稠密矩阵封装，承载 `F`、`Hᵗ` 以及 `C = Hᵗ - F`。
use std::fmt;

use serde::Serialize;
use smallvec::SmallVec;

use crate::net::ids::{PlaceId, TransitionId};
use crate::net::index_vec::{Idx, IndexVec};

pub(crate) type SmallRow<T> = SmallVec<[T; 8]>;

/// Row-per-place matrix; column `t` is the effect/requirement of transition `t`.
#[derive(Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Incidence<T> {
    rows: IndexVec<PlaceId, SmallRow<T>>,
    cols: usize,
}

impl<T> Incidence<T>
where
    T: Copy,
{
    pub fn new(places: usize, transitions: usize, default: T) -> Self {
        let rows = (0..places)
            .map(|_| SmallRow::from_elem(default, transitions))
            .collect();
        Self {
            rows,
            cols: transitions,
        }
    }

    pub fn places(&self) -> usize {
        self.rows.len()
    }

    pub fn transitions(&self) -> usize {
        self.cols
    }

    pub fn set(&mut self, place: PlaceId, transition: TransitionId, value: T) {
        self.rows[place][transition.index()] = value;
    }

    pub fn get(&self, place: PlaceId, transition: TransitionId) -> T {
        self.rows[place][transition.index()]
    }

    pub fn rows(&self) -> &IndexVec<PlaceId, SmallRow<T>> {
        &self.rows
    }

    pub fn row(&self, place: PlaceId) -> &[T] {
        &self.rows[place]
    }

    /// Entries of column `transition`, one per place.
    pub fn column(&self, transition: TransitionId) -> impl Iterator<Item = (PlaceId, T)> + '_ {
        self.rows
            .iter_enumerated()
            .map(move |(place, row)| (place, row[transition.index()]))
    }
}

impl<T> fmt::Debug for Incidence<T>
where
    T: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Incidence")
            .field("rows", &self.rows)
            .field("cols", &self.cols)
            .finish()
    }
}

impl<T> fmt::Display for Incidence<T>
where
    T: fmt::Display,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for row in self.rows.iter() {
            f.write_str("[")?;
            for (idx, value) in row.iter().enumerate() {
                if idx > 0 {
                    f.write_str(" ")?;
                }
                write!(f, "{value:>3}")?;
            }
            writeln!(f, "]")?;
        }
        Ok(())
    }
}

impl Incidence<u64> {
    /// `self - other` element-wise as signed values.
    pub fn difference(&self, other: &Self) -> Incidence<i64> {
        assert_eq!(self.places(), other.places());
        assert_eq!(self.transitions(), other.transitions());
        let rows = self
            .rows
            .iter()
            .zip(other.rows.iter())
            .map(|(left, right)| {
                left.iter()
                    .zip(right.iter())
                    .map(|(l, r)| *l as i64 - *r as i64)
                    .collect::<SmallRow<_>>()
            })
            .collect();
        Incidence {
            rows,
            cols: self.cols,
        }
    }
}
