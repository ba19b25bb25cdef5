//! Loading stack used for construction cycle detection.

use parking_lot::Mutex;

use crate::{DiError, DiResult, TypeKey};

/// Entry on the container's loading stack, popped on drop.
///
/// The stack is shared by the whole container, so construction must not run
/// concurrently from several threads; errors and panics unwind through the
/// guards and leave the stack empty once the top-level call returns.
pub(crate) struct LoadingGuard<'a> {
    stack: &'a Mutex<Vec<TypeKey>>,
    ty: TypeKey,
}

impl<'a> LoadingGuard<'a> {
    /// Pushes `ty`. Fails with `Circular` when `ty` is already being built,
    /// naming every entry from its first occurrence back to itself.
    pub(crate) fn enter<F>(
        stack: &'a Mutex<Vec<TypeKey>>,
        ty: TypeKey,
        max_depth: usize,
        describe: F,
    ) -> DiResult<Self>
    where
        F: Fn(TypeKey) -> String,
    {
        let mut loading = stack.lock();
        if let Some(start) = loading.iter().position(|t| *t == ty) {
            let chain = loading[start..]
                .iter()
                .chain(std::iter::once(&ty))
                .map(|t| describe(*t))
                .collect();
            return Err(DiError::Circular(chain));
        }
        if loading.len() >= max_depth {
            return Err(DiError::DepthExceeded(loading.len()));
        }
        loading.push(ty);
        Ok(Self { stack, ty })
    }
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        let mut loading = self.stack.lock();
        if let Some(last) = loading.pop() {
            debug_assert_eq!(last, self.ty);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key_of_type;

    struct A;
    struct B;

    fn name(ty: TypeKey) -> String {
        ty.short_name().to_owned()
    }

    #[test]
    fn reentry_reports_cycle_from_first_occurrence() {
        let stack = Mutex::new(Vec::new());
        let _root = LoadingGuard::enter(&stack, key_of_type::<u8>(), 8, name).unwrap();
        let _a = LoadingGuard::enter(&stack, key_of_type::<A>(), 8, name).unwrap();
        let _b = LoadingGuard::enter(&stack, key_of_type::<B>(), 8, name).unwrap();

        let err = LoadingGuard::enter(&stack, key_of_type::<A>(), 8, name).err().unwrap();
        assert_eq!(err, DiError::Circular(vec!["A".into(), "B".into(), "A".into()]));
        assert_eq!(stack.lock().len(), 3);
    }

    #[test]
    fn guards_pop_on_drop_and_depth_is_capped() {
        let stack = Mutex::new(Vec::new());
        {
            let _a = LoadingGuard::enter(&stack, key_of_type::<A>(), 1, name).unwrap();
            let err = LoadingGuard::enter(&stack, key_of_type::<B>(), 1, name).err().unwrap();
            assert_eq!(err, DiError::DepthExceeded(1));
        }
        assert!(stack.lock().is_empty());
    }
}
