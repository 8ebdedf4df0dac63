//! The link-time uniqueness pass: decides the final emitted name for every
//! traversed ref. Root-module declarations keep their names; colliding
//! declarations from other modules are numbered.

use std::collections::HashSet;

use crate::registry::ParsedRegistry;
use crate::traverse::FoundRef;

/// Fill `FoundRef::rename` for every ref whose final name differs from its
/// declared name. `refs` must be in traversal delivery order with one entry
/// per distinct ref (see [`crate::traverse::collect_refs`]).
pub fn assign_unique_names(refs: &mut [FoundRef], reg: &ParsedRegistry, root: usize) {
    let mut taken: HashSet<String> = reg
        .text_module(root)
        .map(|m| {
            m.decl_order
                .iter()
                .map(|&decl| m.decl_name(decl).to_string())
                .collect()
        })
        .unwrap_or_default();

    for found in refs.iter_mut() {
        if found.module() == root && matches!(found, FoundRef::Text(_)) {
            continue;
        }
        let declared = declared_name(reg, found);
        let base = found.proposed_name().to_string();
        let mut candidate = base.clone();
        let mut n = 0;
        while taken.contains(&candidate) {
            candidate = format!("{base}{n}");
            n += 1;
        }
        taken.insert(candidate.clone());
        if candidate != declared {
            found.set_rename(candidate);
        }
    }
}

fn declared_name(reg: &ParsedRegistry, found: &FoundRef) -> String {
    match found {
        FoundRef::Text(r) => reg
            .text_module(r.module)
            .map(|m| m.decl_name(r.decl).to_string())
            .unwrap_or_default(),
        FoundRef::Gen(r) => r.name.clone(),
    }
}
