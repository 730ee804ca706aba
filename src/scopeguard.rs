/// Runs `cleanup` when dropped, including while unwinding.
#[must_use]
pub(crate) struct ScopeGuard<F>
where
    F: FnOnce(),
{
    cleanup: Option<F>,
}

impl<F> ScopeGuard<F>
where
    F: FnOnce(),
{
    pub(crate) fn new(func: F) -> ScopeGuard<F> {
        ScopeGuard {
            cleanup: Some(func),
        }
    }
}

impl<F> Drop for ScopeGuard<F>
where
    F: FnOnce(),
{
    fn drop(&mut self) {
        if let Some(f) = self.cleanup.take() {
            f();
        }
    }
}
