//! C3 linearization for method resolution order (spec §3 invariant (c):
//! "Class MRO is computed by C3 linearisation and cached once").
//!
//! Grounded directly on the teacher's `compute_mro`/`merge`/
//! `strip_generic_params` in `tugtool-python/src/mro.rs`: same algorithm,
//! same recursive-with-visited-set shape, generalized from a
//! `HashMap<String, Vec<String>>` hierarchy (a refactor tool's view of
//! classes, keyed by the name it might rename) to a `ClassId`-keyed one — the
//! evaluator already has class identity by the time it asks for an MRO, and
//! generic parameters are stripped earlier, on `ClassType` construction,
//! rather than string-split out of a base name here.

use std::collections::{HashMap, HashSet};

use thiserror::Error;

use crate::types::ClassId;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MroError {
    #[error("inconsistent hierarchy for class {0:?}: cannot compute a linearization")]
    InconsistentHierarchy(ClassId),
    #[error("cyclic inheritance involving class {0:?}")]
    Cycle(ClassId),
}

pub type MroResult<T> = Result<T, MroError>;

/// Computes the MRO for `class`, given each class's direct bases. A class
/// absent from `bases_of` is treated as having no bases (implicit `object`),
/// matching the teacher's "base class not found -> treat as external, just
/// itself" behaviour.
pub fn compute_mro(class: ClassId, bases_of: &HashMap<ClassId, Vec<ClassId>>) -> MroResult<Vec<ClassId>> {
    let mut visiting = HashSet::new();
    compute_mro_inner(class, bases_of, &mut visiting)
}

fn compute_mro_inner(
    class: ClassId,
    bases_of: &HashMap<ClassId, Vec<ClassId>>,
    visiting: &mut HashSet<ClassId>,
) -> MroResult<Vec<ClassId>> {
    if !visiting.insert(class) {
        return Err(MroError::Cycle(class));
    }

    let bases = match bases_of.get(&class) {
        Some(b) if !b.is_empty() => b,
        _ => {
            visiting.remove(&class);
            return Ok(vec![class]);
        }
    };

    let mut sequences = Vec::new();
    for &base in bases {
        if bases_of.contains_key(&base) {
            sequences.push(compute_mro_inner(base, bases_of, visiting)?);
        } else {
            sequences.push(vec![base]);
        }
    }
    sequences.push(bases.clone());

    let merged = merge(sequences).ok_or(MroError::InconsistentHierarchy(class))?;
    visiting.remove(&class);

    let mut mro = vec![class];
    mro.extend(merged);
    Ok(mro)
}

/// C3 merge: repeatedly takes the first head that doesn't appear in the tail
/// of any other sequence, until every sequence is consumed.
fn merge(mut sequences: Vec<Vec<ClassId>>) -> Option<Vec<ClassId>> {
    let mut result = Vec::new();
    loop {
        sequences.retain(|seq| !seq.is_empty());
        if sequences.is_empty() {
            return Some(result);
        }
        let candidate = sequences.iter().map(|seq| seq[0]).find(|head| {
            !sequences.iter().any(|seq| seq.len() > 1 && seq[1..].contains(head))
        })?;
        result.push(candidate);
        for seq in &mut sequences {
            if seq.first() == Some(&candidate) {
                seq.remove(0);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cid(n: u32) -> ClassId {
        ClassId(n)
    }

    #[test]
    fn single_class_no_bases() {
        let hierarchy = HashMap::from([(cid(0), vec![])]);
        assert_eq!(compute_mro(cid(0), &hierarchy).unwrap(), vec![cid(0)]);
    }

    #[test]
    fn diamond_inheritance_matches_python_order() {
        // D(B, C), B(A), C(A), A() — MRO should be D, B, C, A.
        let (a, b, c, d) = (cid(0), cid(1), cid(2), cid(3));
        let hierarchy = HashMap::from([
            (d, vec![b, c]),
            (b, vec![a]),
            (c, vec![a]),
            (a, vec![]),
        ]);
        assert_eq!(compute_mro(d, &hierarchy).unwrap(), vec![d, b, c, a]);
    }

    #[test]
    fn classic_python_example_k1_k2_k3() {
        let (o, a, b, c, d, e, k1, k2, k3, z) =
            (cid(0), cid(1), cid(2), cid(3), cid(4), cid(5), cid(6), cid(7), cid(8), cid(9));
        let hierarchy = HashMap::from([
            (o, vec![]),
            (a, vec![o]),
            (b, vec![o]),
            (c, vec![o]),
            (d, vec![o]),
            (e, vec![o]),
            (k1, vec![a, b, c]),
            (k2, vec![d, b, e]),
            (k3, vec![d, a]),
            (z, vec![k1, k2, k3]),
        ]);
        assert_eq!(
            compute_mro(z, &hierarchy).unwrap(),
            vec![z, k1, k2, k3, d, a, b, c, e, o]
        );
    }

    #[test]
    fn inconsistent_hierarchy_is_an_error() {
        let (a, b, x, y, z) = (cid(0), cid(1), cid(2), cid(3), cid(4));
        let hierarchy = HashMap::from([
            (a, vec![]),
            (b, vec![]),
            (x, vec![a, b]),
            (y, vec![b, a]),
            (z, vec![x, y]),
        ]);
        assert!(matches!(compute_mro(z, &hierarchy), Err(MroError::InconsistentHierarchy(_))));
    }

    #[test]
    fn direct_self_inheritance_is_a_cycle() {
        let a = cid(0);
        let hierarchy = HashMap::from([(a, vec![a])]);
        assert!(matches!(compute_mro(a, &hierarchy), Err(MroError::Cycle(_))));
    }

    #[test]
    fn missing_base_is_treated_as_external_and_kept() {
        let (child, external) = (cid(0), cid(1));
        let hierarchy = HashMap::from([(child, vec![external])]);
        assert_eq!(compute_mro(child, &hierarchy).unwrap(), vec![child, external]);
    }
}
