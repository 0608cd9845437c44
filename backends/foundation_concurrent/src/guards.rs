/// `RunOnDrop` runs a function when it gets dropped, like go's `defer`.
///
/// Work items hold one to count themselves finished whether they run,
/// fail or are discarded unrun during teardown.
pub struct RunOnDrop<F: FnOnce()>(Option<F>);

impl<F: FnOnce()> RunOnDrop<F> {
    pub fn new(f: F) -> Self {
        Self(Some(f))
    }
}

impl<F: FnOnce()> Drop for RunOnDrop<F> {
    fn drop(&mut self) {
        if let Some(cb) = self.0.take() {
            cb();
        }
    }
}
