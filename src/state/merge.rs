// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Partial-update merge.
//!
//! Printers send incremental reports: a message that only carries the bed
//! temperature says nothing about the fan speeds. [`Merge`] applies such a
//! report onto the last known snapshot following one rule: a value equal to
//! its type's default means "not present in this message" and leaves the
//! stored value alone.
//!
//! - Scalars ([`String`], [`f64`], [`i64`], [`bool`]) overwrite when non-default.
//! - Collections ([`Vec`]) are whole values: replaced when non-empty, never
//!   merged element by element.
//! - Nested groups recurse, so a group carrying one field keeps the others.
//!
//! A printer reporting a genuine zero (a fan at 0%) is indistinguishable
//! from an absent field and is therefore not applied. This is a property of
//! the wire protocol; see [`RawReport`](super::RawReport).

/// Applies a partial update onto `self`.
///
/// # Examples
///
/// ```
/// use bambu_pool::state::Merge;
///
/// let mut temp = 60.0_f64;
/// temp.merge(0.0);
/// assert_eq!(temp, 60.0);
/// temp.merge(65.5);
/// assert_eq!(temp, 65.5);
///
/// let mut cols = vec!["FF0000FF".to_string()];
/// cols.merge(Vec::new());
/// assert_eq!(cols.len(), 1);
/// ```
pub trait Merge {
    /// Merges `incoming` into `self`, keeping fields `incoming` does not set.
    fn merge(&mut self, incoming: Self);
}

macro_rules! impl_scalar_merge {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Merge for $ty {
                #[allow(clippy::float_cmp)]
                fn merge(&mut self, incoming: Self) {
                    if incoming != <$ty>::default() {
                        *self = incoming;
                    }
                }
            }
        )*
    };
}

impl_scalar_merge!(String, f64, i64, bool);

impl<T> Merge for Vec<T> {
    fn merge(&mut self, incoming: Self) {
        if !incoming.is_empty() {
            *self = incoming;
        }
    }
}

/// Implements [`Merge`] for a struct by merging every listed field.
///
/// The incoming value is destructured without `..`, so adding a field to the
/// struct without listing it here is a compile error.
macro_rules! merge_fields {
    ($ty:ident { $($field:ident),* $(,)? }) => {
        impl $crate::state::Merge for $ty {
            fn merge(&mut self, incoming: Self) {
                let $ty { $($field),* } = incoming;
                $( $crate::state::Merge::merge(&mut self.$field, $field); )*
            }
        }
    };
}

pub(crate) use merge_fields;

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default, Clone, PartialEq)]
    struct Inner {
        a: i64,
        b: String,
    }

    merge_fields!(Inner { a, b });

    #[derive(Debug, Default, Clone, PartialEq)]
    struct Outer {
        inner: Inner,
        list: Vec<i64>,
        flag: bool,
    }

    merge_fields!(Outer { inner, list, flag });

    #[test]
    fn scalars_ignore_defaults() {
        let mut s = "kept".to_string();
        s.merge(String::new());
        assert_eq!(s, "kept");
        s.merge("new".to_string());
        assert_eq!(s, "new");

        let mut n = 5_i64;
        n.merge(0);
        assert_eq!(n, 5);

        let mut b = true;
        b.merge(false);
        assert!(b);
    }

    #[test]
    fn nested_groups_recurse() {
        let mut stored = Outer {
            inner: Inner {
                a: 1,
                b: "x".to_string(),
            },
            list: vec![1, 2],
            flag: true,
        };

        stored.merge(Outer {
            inner: Inner {
                a: 9,
                b: String::new(),
            },
            ..Outer::default()
        });

        assert_eq!(stored.inner.a, 9);
        assert_eq!(stored.inner.b, "x");
        assert_eq!(stored.list, vec![1, 2]);
        assert!(stored.flag);
    }

    #[test]
    fn collections_are_replaced_wholesale() {
        let mut stored = Outer {
            list: vec![1, 2, 3],
            ..Outer::default()
        };
        stored.merge(Outer {
            list: vec![7],
            ..Outer::default()
        });
        assert_eq!(stored.list, vec![7]);
    }

    #[test]
    fn empty_update_is_identity() {
        let original = Outer {
            inner: Inner {
                a: 3,
                b: "y".to_string(),
            },
            list: vec![4],
            flag: true,
        };
        let mut merged = original.clone();
        merged.merge(Outer::default());
        assert_eq!(merged, original);
    }
}
