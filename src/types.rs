//! Type expressions.
//!
//! Grounded in the DESIGN NOTES recommendation: rather than the original C's
//! raw-pointer union-find (`struct TypeExp` with a `var_instance` pointer and
//! a scratch `var_temp_other` pointer), type nodes live in an arena `Vec`
//! addressed by [`TypeId`]; the union-find `instance` link is `Option<TypeId>`
//! and the scratch pointer used by generalize/instantiate is a parallel
//! side-table cleared by every public operation before it returns.

pub type TypeId = usize;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeKind {
    Error,
    /// A unification variable. `instance` is the union-find link.
    Var { instance: Option<TypeId> },
    /// A universally-quantified variable: never unified against, copied to a
    /// fresh `Var` on every instantiation.
    GenericVar,
    Func { from: TypeId, to: TypeId },
    Int,
    Bool,
    Tuple { first: TypeId, rest: TypeId },
    TupleFinal { first: TypeId },
}

/// Owns every type node created during one type-check pass.
pub struct TypeArena {
    kinds: Vec<TypeKind>,
    /// Scratch link used by generalize/instantiate; `None` on entry to and
    /// exit from every public operation (spec.md §3 invariant).
    scratch: Vec<Option<TypeId>>,
    int_id: TypeId,
    bool_id: TypeId,
    error_id: TypeId,
}

impl Default for TypeArena {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeArena {
    pub fn new() -> Self {
        let mut arena = TypeArena {
            kinds: Vec::new(),
            scratch: Vec::new(),
            int_id: 0,
            bool_id: 0,
            error_id: 0,
        };
        arena.error_id = arena.push(TypeKind::Error);
        arena.int_id = arena.push(TypeKind::Int);
        arena.bool_id = arena.push(TypeKind::Bool);
        arena
    }

    fn push(&mut self, kind: TypeKind) -> TypeId {
        self.kinds.push(kind);
        self.scratch.push(None);
        self.kinds.len() - 1
    }

    pub fn kind(&self, id: TypeId) -> &TypeKind {
        &self.kinds[id]
    }

    pub fn error(&self) -> TypeId {
        self.error_id
    }

    pub fn int(&self) -> TypeId {
        self.int_id
    }

    pub fn bool(&self) -> TypeId {
        self.bool_id
    }

    pub fn is_error(&self, id: TypeId) -> bool {
        matches!(self.kinds[id], TypeKind::Error)
    }

    pub fn new_var(&mut self) -> TypeId {
        self.push(TypeKind::Var { instance: None })
    }

    pub fn new_func(&mut self, from: TypeId, to: TypeId) -> TypeId {
        self.push(TypeKind::Func { from, to })
    }

    pub fn new_tuple(&mut self, first: TypeId, rest: TypeId) -> TypeId {
        self.push(TypeKind::Tuple { first, rest })
    }

    pub fn new_tuple_final(&mut self, first: TypeId) -> TypeId {
        self.push(TypeKind::TupleFinal { first })
    }

    /// Follow `Var.instance` links to the ultimate target.
    pub fn prune(&self, mut id: TypeId) -> TypeId {
        loop {
            match self.kinds[id] {
                TypeKind::Var { instance: Some(next) } => id = next,
                _ => return id,
            }
        }
    }

    fn bind(&mut self, var: TypeId, target: TypeId) {
        self.kinds[var] = TypeKind::Var { instance: Some(target) };
    }

    /// Is `a` identical to `b`, or to any (transitive) child of `b`?
    pub fn occurs(&self, a: TypeId, b: TypeId) -> bool {
        if a == b {
            return true;
        }
        match self.kinds[b] {
            TypeKind::Func { from, to } => self.occurs(a, from) || self.occurs(a, to),
            TypeKind::Tuple { first, rest } => self.occurs(a, first) || self.occurs(a, rest),
            TypeKind::TupleFinal { first } => self.occurs(a, first),
            _ => false,
        }
    }

    pub fn is_non_generic(&self, a: TypeId, non_generics: &NonGenericSet) -> bool {
        non_generics.0.iter().any(|&t| self.occurs(a, t))
    }

    fn clear_scratch(&mut self, id: TypeId) {
        let pruned = self.prune(id);
        match self.kinds[pruned] {
            TypeKind::Var { .. } | TypeKind::GenericVar => {
                self.scratch[pruned] = None;
            }
            TypeKind::Func { from, to } => {
                self.clear_scratch(from);
                self.clear_scratch(to);
            }
            TypeKind::Tuple { first, rest } => {
                self.clear_scratch(first);
                self.clear_scratch(rest);
            }
            TypeKind::TupleFinal { first } => self.clear_scratch(first),
            TypeKind::Error | TypeKind::Int | TypeKind::Bool => {}
        }
    }

    /// Copy `ty`, replacing each reachable `GenericVar` with a fresh `Var`.
    /// Other nodes are shared, not copied.
    pub fn instantiate(&mut self, ty: TypeId) -> TypeId {
        let result = self.instantiate_impl(ty);
        self.clear_scratch(ty);
        result
    }

    fn instantiate_impl(&mut self, ty: TypeId) -> TypeId {
        let pruned = self.prune(ty);
        match self.kinds[pruned] {
            TypeKind::GenericVar => {
                if let Some(fresh) = self.scratch[pruned] {
                    return fresh;
                }
                let fresh = self.new_var();
                self.scratch[pruned] = Some(fresh);
                fresh
            }
            TypeKind::Func { from, to } => {
                let new_from = self.instantiate_impl(from);
                let new_to = self.instantiate_impl(to);
                if new_from == from && new_to == to {
                    pruned
                } else {
                    self.new_func(new_from, new_to)
                }
            }
            TypeKind::Tuple { first, rest } => {
                let new_first = self.instantiate_impl(first);
                let new_rest = self.instantiate_impl(rest);
                if new_first == first && new_rest == rest {
                    pruned
                } else {
                    self.new_tuple(new_first, new_rest)
                }
            }
            TypeKind::TupleFinal { first } => {
                let new_first = self.instantiate_impl(first);
                if new_first == first {
                    pruned
                } else {
                    self.new_tuple_final(new_first)
                }
            }
            TypeKind::Var { .. } | TypeKind::Error | TypeKind::Int | TypeKind::Bool => pruned,
        }
    }

    /// Copy `ty`, replacing each free `Var` that is not non-generic with a
    /// fresh `GenericVar`. `ty` itself is left untouched.
    pub fn generalize(&mut self, ty: TypeId, non_generics: &NonGenericSet) -> TypeId {
        let result = self.generalize_impl(ty, non_generics);
        self.clear_scratch(ty);
        result
    }

    fn generalize_impl(&mut self, ty: TypeId, non_generics: &NonGenericSet) -> TypeId {
        let pruned = self.prune(ty);
        match self.kinds[pruned] {
            TypeKind::Var { .. } => {
                if let Some(existing) = self.scratch[pruned] {
                    return existing;
                }
                if self.is_non_generic(pruned, non_generics) {
                    self.scratch[pruned] = Some(pruned);
                    return pruned;
                }
                let fresh = self.push(TypeKind::GenericVar);
                self.scratch[pruned] = Some(fresh);
                fresh
            }
            TypeKind::Func { from, to } => {
                let new_from = self.generalize_impl(from, non_generics);
                let new_to = self.generalize_impl(to, non_generics);
                if new_from == from && new_to == to {
                    pruned
                } else {
                    self.new_func(new_from, new_to)
                }
            }
            TypeKind::Tuple { first, rest } => {
                let new_first = self.generalize_impl(first, non_generics);
                let new_rest = self.generalize_impl(rest, non_generics);
                if new_first == first && new_rest == rest {
                    pruned
                } else {
                    self.new_tuple(new_first, new_rest)
                }
            }
            TypeKind::TupleFinal { first } => {
                let new_first = self.generalize_impl(first, non_generics);
                if new_first == first {
                    pruned
                } else {
                    self.new_tuple_final(new_first)
                }
            }
            TypeKind::Error | TypeKind::Int | TypeKind::Bool | TypeKind::GenericVar => pruned,
        }
    }

    /// Unify `a` and `b`. On a mismatch, invokes `on_error` with a
    /// human-readable description of the rule that failed (see
    /// [`crate::typechecker::UnifyRule`]).
    pub fn unify(&mut self, a: TypeId, b: TypeId, mut on_error: impl FnMut(&str)) {
        self.unify_impl(a, b, &mut on_error)
    }

    fn unify_impl(&mut self, a: TypeId, b: TypeId, on_error: &mut dyn FnMut(&str)) {
        let mut a = self.prune(a);
        let mut b = self.prune(b);

        if self.is_error(a) || self.is_error(b) {
            return;
        }

        if matches!(self.kinds[b], TypeKind::Var { .. }) {
            std::mem::swap(&mut a, &mut b);
        }

        if matches!(self.kinds[a], TypeKind::Var { .. }) {
            if a == b {
                return;
            }
            if self.occurs(a, b) {
                on_error("self-recursive type");
            } else {
                self.bind(a, b);
            }
            return;
        }

        if std::mem::discriminant(&self.kinds[a]) != std::mem::discriminant(&self.kinds[b]) {
            on_error("mismatched types");
            return;
        }

        match (self.kinds[a].clone(), self.kinds[b].clone()) {
            (TypeKind::Func { from: af, to: at }, TypeKind::Func { from: bf, to: bt }) => {
                self.unify_impl(af, bf, on_error);
                self.unify_impl(at, bt, on_error);
            }
            (TypeKind::Tuple { first: af, rest: ar }, TypeKind::Tuple { first: bf, rest: br }) => {
                self.unify_impl(af, bf, on_error);
                self.unify_impl(ar, br, on_error);
            }
            (TypeKind::TupleFinal { first: af }, TypeKind::TupleFinal { first: bf }) => {
                self.unify_impl(af, bf, on_error);
            }
            _ => {}
        }
    }
}

/// Non-generic set: the types whose free variables are currently
/// monomorphic (lambda parameters, `let rec` self-types).
#[derive(Debug, Clone, Default)]
pub struct NonGenericSet(Vec<TypeId>);

impl NonGenericSet {
    pub fn new() -> Self {
        NonGenericSet(Vec::new())
    }

    /// Returns an extended copy with `ty` added; the receiver is untouched,
    /// matching the environment-chain style of the rest of the inferencer.
    pub fn extended(&self, ty: TypeId) -> Self {
        let mut next = self.0.clone();
        next.push(ty);
        NonGenericSet(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prune_follows_instance_chain() {
        let mut arena = TypeArena::new();
        let v1 = arena.new_var();
        let v2 = arena.new_var();
        arena.bind(v1, v2);
        arena.bind(v2, arena.int());
        assert_eq!(arena.prune(v1), arena.int());
    }

    #[test]
    fn occurs_check_detects_self_reference() {
        let mut arena = TypeArena::new();
        let v = arena.new_var();
        let func = arena.new_func(arena.int(), v);
        assert!(arena.occurs(v, func));
        assert!(!arena.occurs(arena.int(), arena.bool()));
    }

    #[test]
    fn instantiate_gives_fresh_variables_per_call() {
        let mut arena = TypeArena::new();
        let v = arena.new_var();
        let generic = arena.generalize(v, &NonGenericSet::new());
        let a = arena.instantiate(generic);
        let b = arena.instantiate(generic);
        assert_ne!(a, b);
    }

    #[test]
    fn generalize_keeps_non_generic_variables_monomorphic() {
        let mut arena = TypeArena::new();
        let v = arena.new_var();
        let non_generics = NonGenericSet::new().extended(v);
        let generalized = arena.generalize(v, &non_generics);
        assert_eq!(arena.prune(generalized), arena.prune(v));
    }

    #[test]
    fn unify_binds_variable_to_concrete_type() {
        let mut arena = TypeArena::new();
        let v = arena.new_var();
        let mut errored = false;
        arena.unify(v, arena.int(), |_| errored = true);
        assert!(!errored);
        assert_eq!(arena.prune(v), arena.int());
    }

    #[test]
    fn unify_reports_self_recursive_type() {
        let mut arena = TypeArena::new();
        let v = arena.new_var();
        let func = arena.new_func(arena.int(), v);
        let mut errored = false;
        arena.unify(v, func, |_| errored = true);
        assert!(errored);
    }
}
