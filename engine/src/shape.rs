//! Shape and permutation helpers shared by operators and rewrite rules.

use crate::error::ShapeError;
use crate::tensor::Shape;

/// Right-aligned broadcast of two shapes.
///
/// Dimensions are compatible when equal or when either is 1.
pub fn infer_broadcast(lhs: &[usize], rhs: &[usize]) -> Result<Shape, ShapeError> {
    let rank = lhs.len().max(rhs.len());
    let mut out = vec![0; rank];

    for (i, slot) in out.iter_mut().enumerate() {
        let l = dim_from_right(lhs, rank - 1 - i);
        let r = dim_from_right(rhs, rank - 1 - i);
        *slot = match (l, r) {
            (l, r) if l == r => l,
            (1, r) => r,
            (l, 1) => l,
            _ => {
                return Err(ShapeError::Broadcast {
                    lhs: lhs.to_vec(),
                    rhs: rhs.to_vec(),
                })
            }
        };
    }

    Ok(out)
}

// Missing leading axes act as 1.
fn dim_from_right(shape: &[usize], from_right: usize) -> usize {
    if from_right < shape.len() {
        shape[shape.len() - 1 - from_right]
    } else {
        1
    }
}

/// Whether `perm` is a bijection over `0..rank`.
pub fn is_valid_permutation(perm: &[usize], rank: usize) -> bool {
    if perm.len() != rank {
        return false;
    }
    let mut seen = vec![false; rank];
    for &axis in perm {
        if axis >= rank || seen[axis] {
            return false;
        }
        seen[axis] = true;
    }
    true
}

/// Whether transposing by `first` and then by `second` is the identity.
///
/// With the transpose convention `out[i] = in[perm[i]]`, the composite maps
/// output axis `i` to input axis `first[second[i]]`.
pub fn composes_to_identity(first: &[usize], second: &[usize]) -> bool {
    first.len() == second.len()
        && second
            .iter()
            .enumerate()
            .all(|(i, &axis)| first.get(axis) == Some(&i))
}

/// Identity on all but the last two axes, which are swapped.
pub fn is_last_two_swap(perm: &[usize]) -> bool {
    let n = perm.len();
    if n < 2 {
        return false;
    }
    perm[..n - 2].iter().enumerate().all(|(i, &axis)| axis == i)
        && perm[n - 2] == n - 1
        && perm[n - 1] == n - 2
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_broadcast() {
        assert_eq!(infer_broadcast(&[2, 1, 4], &[3, 1]).unwrap(), vec![2, 3, 4]);
        assert_eq!(infer_broadcast(&[], &[5]).unwrap(), vec![5]);
        assert_eq!(infer_broadcast(&[], &[]).unwrap(), Vec::<usize>::new());
        assert_eq!(infer_broadcast(&[7, 1], &[1, 0]).unwrap(), vec![7, 0]);
        assert!(matches!(
            infer_broadcast(&[2, 3], &[4, 3]),
            Err(ShapeError::Broadcast { .. })
        ));
    }

    #[test]
    fn test_permutation_validity() {
        assert!(is_valid_permutation(&[2, 0, 1], 3));
        assert!(!is_valid_permutation(&[0, 0, 1], 3));
        assert!(!is_valid_permutation(&[0, 3, 1], 3));
        assert!(!is_valid_permutation(&[0, 1], 3));
    }

    #[test]
    fn test_composition() {
        assert!(composes_to_identity(&[1, 0], &[1, 0]));
        // A 3-cycle followed by its inverse.
        assert!(composes_to_identity(&[1, 2, 0], &[2, 0, 1]));
        assert!(!composes_to_identity(&[1, 2, 0], &[1, 2, 0]));
        assert!(!composes_to_identity(&[0, 1], &[0, 1, 2]));
    }

    #[test]
    fn test_last_two_swap() {
        assert!(is_last_two_swap(&[1, 0]));
        assert!(is_last_two_swap(&[0, 1, 3, 2]));
        assert!(!is_last_two_swap(&[1, 0, 2]));
        assert!(!is_last_two_swap(&[0, 1]));
        assert!(!is_last_two_swap(&[0]));
    }
}
