//! Iteration protocol used by systematic exploration.
//!
//! Every node exposes `next`/`reset`/`has_next`/`is_reset`. Composite nodes do not own
//! an iterator of their own: they build a [`Chain`] over mutable borrows of their
//! children for the duration of a single call. The enumeration order is a product
//! odometer where the last child varies fastest.

use crate::{JattackError, JattackResult};

pub trait Itr {
    /// Advances by one combination. Fails with `Exhausted` when `has_next()` is false.
    fn next(&mut self) -> JattackResult<()>;

    fn reset(&mut self);

    fn has_next(&self) -> bool;

    fn is_reset(&self) -> bool;
}

impl<T: Itr + ?Sized> Itr for &mut T {
    fn next(&mut self) -> JattackResult<()> {
        (**self).next()
    }

    fn reset(&mut self) {
        (**self).reset()
    }

    fn has_next(&self) -> bool {
        (**self).has_next()
    }

    fn is_reset(&self) -> bool {
        (**self).is_reset()
    }
}

/// Cursor over an ordered list of `len` choices.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LitItr {
    len: usize,
    pos: Option<usize>,
}

impl LitItr {
    pub fn new(len: usize) -> Self {
        Self { len, pos: None }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Position of the current choice; `None` at reset.
    pub fn pos(&self) -> Option<usize> {
        self.pos
    }
}

impl Itr for LitItr {
    fn next(&mut self) -> JattackResult<()> {
        if !self.has_next() {
            return Err(JattackError::Exhausted);
        }
        self.pos = Some(self.pos.map_or(0, |p| p + 1));
        Ok(())
    }

    fn reset(&mut self) {
        self.pos = None;
    }

    fn has_next(&self) -> bool {
        match self.pos {
            None => self.len > 0,
            Some(p) => p + 1 < self.len,
        }
    }

    fn is_reset(&self) -> bool {
        self.pos.is_none()
    }
}

/// Integer range iterator. From reset it yields `low, low + 1, ..., high - 2`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeItr {
    low: i64,
    high: i64,
    cursor: i64,
    current: Option<i64>,
}

impl RangeItr {
    pub fn new(low: i64, high: i64) -> JattackResult<Self> {
        if low >= high {
            return Err(JattackError::InvalidArgument(format!(
                "range low {low} must be less than high {high}"
            )));
        }
        Ok(Self {
            low,
            high,
            cursor: low,
            current: None,
        })
    }

    /// Last yielded value; `None` at reset.
    pub fn current(&self) -> Option<i64> {
        self.current
    }
}

impl Itr for RangeItr {
    fn next(&mut self) -> JattackResult<()> {
        if !self.has_next() {
            return Err(JattackError::Exhausted);
        }
        self.current = Some(self.cursor);
        self.cursor += 1;
        Ok(())
    }

    fn reset(&mut self) {
        self.cursor = self.low;
        self.current = None;
    }

    fn has_next(&self) -> bool {
        self.cursor < self.high - 1
    }

    fn is_reset(&self) -> bool {
        self.current.is_none()
    }
}

/// Iterator of a node without internal choice: one implicit position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImItr {
    reset: bool,
}

impl Default for ImItr {
    fn default() -> Self {
        Self { reset: true }
    }
}

impl Itr for ImItr {
    fn next(&mut self) -> JattackResult<()> {
        if !self.has_next() {
            return Err(JattackError::Exhausted);
        }
        self.reset = false;
        Ok(())
    }

    fn reset(&mut self) {
        self.reset = true;
    }

    fn has_next(&self) -> bool {
        self.reset
    }

    fn is_reset(&self) -> bool {
        self.reset
    }
}

/// Cross product of two iterators; `right` cycles fully for each position of `left`.
pub struct Comb<L, R> {
    left: L,
    right: R,
}

impl<L: Itr, R: Itr> Comb<L, R> {
    pub fn new(left: L, right: R) -> Self {
        Self { left, right }
    }
}

impl<L: Itr, R: Itr> Itr for Comb<L, R> {
    fn next(&mut self) -> JattackResult<()> {
        if !self.has_next() {
            return Err(JattackError::Exhausted);
        }
        if self.left.has_next() && !self.right.has_next() {
            self.right.reset();
            self.left.next()?;
        }
        self.right.next()?;
        if self.left.is_reset() {
            self.left.next()?;
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.left.reset();
        self.right.reset();
    }

    fn has_next(&self) -> bool {
        self.left.has_next() || self.right.has_next()
    }

    fn is_reset(&self) -> bool {
        self.right.is_reset()
    }
}

/// Left-nested combination `Comb(Comb(c0, c1), c2)...` over borrowed children.
pub struct Chain<'a, 'b> {
    itrs: &'a mut [&'b mut dyn Itr],
}

impl<'a, 'b> Chain<'a, 'b> {
    pub fn new(itrs: &'a mut [&'b mut dyn Itr]) -> Self {
        Self { itrs }
    }
}

impl Itr for Chain<'_, '_> {
    fn next(&mut self) -> JattackResult<()> {
        match self.itrs.split_last_mut() {
            None => Err(JattackError::InvalidArgument("empty chain".to_string())),
            Some((last, [])) => last.next(),
            Some((last, init)) => Comb::new(Chain::new(init), &mut **last).next(),
        }
    }

    fn reset(&mut self) {
        for itr in self.itrs.iter_mut() {
            itr.reset();
        }
    }

    fn has_next(&self) -> bool {
        self.itrs.iter().any(|itr| itr.has_next())
    }

    fn is_reset(&self) -> bool {
        self.itrs.last().map_or(true, |itr| itr.is_reset())
    }
}

/// Read-only view of a chain, for `has_next`/`is_reset` through shared borrows.
pub fn chain_has_next(itrs: &[&dyn Itr]) -> bool {
    itrs.iter().any(|itr| itr.has_next())
}

pub fn chain_is_reset(itrs: &[&dyn Itr]) -> bool {
    itrs.last().map_or(true, |itr| itr.is_reset())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn positions(itrs: &[LitItr]) -> Vec<usize> {
        itrs.iter().map(|i| i.pos().unwrap_or(usize::MAX)).collect()
    }

    #[test]
    fn chain_enumerates_product_with_last_fastest() {
        let mut itrs = vec![LitItr::new(2), LitItr::new(3), LitItr::new(2)];
        let mut seen = Vec::new();
        loop {
            let (a, rest) = itrs.split_at_mut(1);
            let (b, c) = rest.split_at_mut(1);
            let mut parts: [&mut dyn Itr; 3] = [&mut a[0], &mut b[0], &mut c[0]];
            let mut chain = Chain::new(&mut parts);
            if !chain.has_next() {
                break;
            }
            chain.next().unwrap();
            seen.push(positions(&itrs));
        }
        let mut expected = Vec::new();
        for x in 0..2 {
            for y in 0..3 {
                for z in 0..2 {
                    expected.push(vec![x, y, z]);
                }
            }
        }
        assert_eq!(seen, expected);
    }

    #[test]
    fn next_after_exhaustion_fails() {
        let mut a = LitItr::new(1);
        let mut b = ImItr::default();
        let mut parts: [&mut dyn Itr; 2] = [&mut a, &mut b];
        let mut chain = Chain::new(&mut parts);
        chain.next().unwrap();
        assert!(!chain.has_next());
        assert!(matches!(chain.next(), Err(JattackError::Exhausted)));
        chain.reset();
        assert!(chain.is_reset());
        assert!(chain.has_next());
    }

    #[test]
    fn range_yields_high_minus_low_minus_one_values() {
        assert!(RangeItr::new(3, 3).is_err());
        assert!(RangeItr::new(4, 3).is_err());
        let mut r = RangeItr::new(-2, 3).unwrap();
        let mut got = Vec::new();
        while r.has_next() {
            r.next().unwrap();
            got.push(r.current().unwrap());
        }
        assert_eq!(got, vec![-2, -1, 0, 1]);
        assert!(r.next().is_err());
    }

    #[test]
    fn immutable_iterator_has_one_position() {
        let mut im = ImItr::default();
        assert!(im.is_reset() && im.has_next());
        im.next().unwrap();
        assert!(!im.has_next());
        im.reset();
        assert!(im.has_next());
    }

    #[test]
    fn single_child_chain_passes_through() {
        let mut a = LitItr::new(3);
        let mut parts: [&mut dyn Itr; 1] = [&mut a];
        let mut chain = Chain::new(&mut parts);
        chain.next().unwrap();
        chain.next().unwrap();
        drop(chain);
        assert_eq!(a.pos(), Some(1));
    }
}
