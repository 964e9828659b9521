//! Fixed-arity pair of per-channel values.
//!
//! Everything that exists once per output device (the endpoints, their
//! buffers, routers and live handles) is held in a [`ChannelPair`]. The pair
//! cannot grow or shrink: it is built from exactly two values and exposes no
//! insert, remove or clear operations.

use std::fmt;

use crate::PipeError;

/// The role an output plays in the split.
///
/// The first output is the right speaker and renders channel 0 of the
/// capture; the second output is the left speaker and renders channel 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelRole {
    /// First slot, renders capture channel 0.
    Right,
    /// Second slot, renders capture channel 1.
    Left,
}

impl ChannelRole {
    /// Both roles in slot order.
    pub const ALL: [ChannelRole; 2] = [ChannelRole::Right, ChannelRole::Left];

    /// Returns the interleaved capture channel this role extracts.
    #[must_use]
    pub const fn channel_index(self) -> usize {
        match self {
            Self::Right => 0,
            Self::Left => 1,
        }
    }

    /// Returns a lowercase label for logs and thread names.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Right => "right",
            Self::Left => "left",
        }
    }
}

impl fmt::Display for ChannelRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An ordered pair of values, always exactly two.
///
/// # Example
///
/// ```
/// use stereo_split::ChannelPair;
///
/// let pair = ChannelPair::try_from_iter(vec!["right", "left"]).unwrap();
/// assert_eq!(*pair.first(), "right");
/// assert_eq!(*pair.left(), "left");
/// assert_eq!(pair.len(), 2);
///
/// assert!(ChannelPair::try_from_iter(vec!["only one"]).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelPair<T> {
    first: T,
    second: T,
}

impl<T> ChannelPair<T> {
    /// Creates a pair from its two values, in slot order.
    pub const fn new(first: T, second: T) -> Self {
        Self { first, second }
    }

    /// Creates a pair from any sequence of exactly two values.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfiguration` if the sequence does not hold exactly
    /// two elements.
    pub fn try_from_iter<I: IntoIterator<Item = T>>(iter: I) -> Result<Self, PipeError> {
        let items: Vec<T> = iter.into_iter().collect();
        let count = items.len();
        let [first, second]: [T; 2] = items.try_into().map_err(|_| {
            PipeError::invalid_configuration(format!(
                "two devices are needed for a channel split, got {count}"
            ))
        })?;
        Ok(Self::new(first, second))
    }

    /// Returns the first value.
    pub const fn first(&self) -> &T {
        &self.first
    }

    /// Returns the second value.
    pub const fn second(&self) -> &T {
        &self.second
    }

    /// Returns the value for the right role (the first slot).
    pub const fn right(&self) -> &T {
        &self.first
    }

    /// Returns the value for the left role (the second slot).
    pub const fn left(&self) -> &T {
        &self.second
    }

    /// Returns the value for the given role.
    pub const fn get(&self, role: ChannelRole) -> &T {
        match role {
            ChannelRole::Right => &self.first,
            ChannelRole::Left => &self.second,
        }
    }

    /// Always 2.
    #[allow(clippy::len_without_is_empty, clippy::unused_self)]
    #[must_use]
    pub const fn len(&self) -> usize {
        2
    }

    /// Returns true if either slot holds `value`.
    pub fn contains(&self, value: &T) -> bool
    where
        T: PartialEq,
    {
        self.first == *value || self.second == *value
    }

    /// Iterates over the values in slot order.
    pub fn iter(&self) -> std::array::IntoIter<&T, 2> {
        [&self.first, &self.second].into_iter()
    }

    /// Iterates over `(role, value)` in slot order.
    pub fn iter_roles(&self) -> impl Iterator<Item = (ChannelRole, &T)> {
        ChannelRole::ALL.into_iter().zip(self.iter())
    }

    /// Borrows both values.
    pub const fn as_ref(&self) -> ChannelPair<&T> {
        ChannelPair::new(&self.first, &self.second)
    }

    /// Mutably borrows both values.
    pub fn as_mut(&mut self) -> ChannelPair<&mut T> {
        ChannelPair::new(&mut self.first, &mut self.second)
    }

    /// Applies `f` to each value, passing the slot role along.
    pub fn map<U, F>(self, mut f: F) -> ChannelPair<U>
    where
        F: FnMut(ChannelRole, T) -> U,
    {
        let first = f(ChannelRole::Right, self.first);
        let second = f(ChannelRole::Left, self.second);
        ChannelPair::new(first, second)
    }

    /// Pairs each value with the value in the same slot of `other`.
    pub fn zip<U>(self, other: ChannelPair<U>) -> ChannelPair<(T, U)> {
        ChannelPair::new((self.first, other.first), (self.second, other.second))
    }

    /// Splits into the two values, in slot order.
    pub fn into_inner(self) -> (T, T) {
        (self.first, self.second)
    }

    /// Applies `f` to both values concurrently.
    ///
    /// The second slot runs on the calling thread while the first runs on a
    /// scoped thread; both have finished when this returns. A panic on
    /// either side is resumed on the caller.
    pub fn par_map<U, F>(self, f: F) -> ChannelPair<U>
    where
        T: Send,
        U: Send,
        F: Fn(ChannelRole, T) -> U + Sync,
    {
        let Self { first, second } = self;
        let f = &f;
        std::thread::scope(|scope| {
            let handle = scope.spawn(move || f(ChannelRole::Right, first));
            let second = f(ChannelRole::Left, second);
            let first = match handle.join() {
                Ok(value) => value,
                Err(payload) => std::panic::resume_unwind(payload),
            };
            ChannelPair::new(first, second)
        })
    }
}

impl<T, E> ChannelPair<Result<T, E>> {
    /// Turns a pair of results into a result of a pair.
    ///
    /// When both sides failed, the first slot's error is returned.
    ///
    /// # Errors
    ///
    /// Returns the first error found in slot order.
    pub fn transpose(self) -> Result<ChannelPair<T>, E> {
        match (self.first, self.second) {
            (Ok(first), Ok(second)) => Ok(ChannelPair::new(first, second)),
            (Err(e), _) | (_, Err(e)) => Err(e),
        }
    }
}

impl<A, B> ChannelPair<(A, B)> {
    /// Splits a pair of tuples into a tuple of pairs.
    pub fn unzip(self) -> (ChannelPair<A>, ChannelPair<B>) {
        let (first_a, first_b) = self.first;
        let (second_a, second_b) = self.second;
        (
            ChannelPair::new(first_a, second_a),
            ChannelPair::new(first_b, second_b),
        )
    }
}

impl<T> TryFrom<Vec<T>> for ChannelPair<T> {
    type Error = PipeError;

    fn try_from(values: Vec<T>) -> Result<Self, Self::Error> {
        Self::try_from_iter(values)
    }
}

impl<T> From<[T; 2]> for ChannelPair<T> {
    fn from([first, second]: [T; 2]) -> Self {
        Self::new(first, second)
    }
}

impl<T> IntoIterator for ChannelPair<T> {
    type Item = T;
    type IntoIter = std::array::IntoIter<T, 2>;

    fn into_iter(self) -> Self::IntoIter {
        [self.first, self.second].into_iter()
    }
}

impl<'a, T> IntoIterator for &'a ChannelPair<T> {
    type Item = &'a T;
    type IntoIter = std::array::IntoIter<&'a T, 2>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
