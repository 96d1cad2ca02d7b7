//! Scope - pairs `Handler::open` with exactly one `Handler::close`

use super::Handler;
use crate::error::CoinResult;
use std::fmt;
use std::ops::{Deref, DerefMut};

/// Guard over an open handler. Closes on drop (early return, `?`, unwinding) unless
/// [`Scope::exit`] already did. While the guard lives the handler is mutably borrowed,
/// so the same instance cannot be entered twice at once.
pub struct Scope<'h, H: Handler + ?Sized> {
    handler: &'h mut H,
    open: bool,
}

impl<'h, H: Handler + ?Sized> Scope<'h, H> {
    pub fn enter(handler: &'h mut H) -> CoinResult<Self> {
        tracing::debug!(handler = handler.name(), "opening handler scope");
        if let Err(e) = handler.open() {
            // release whatever a partial open acquired
            if let Err(close_err) = handler.close() {
                tracing::warn!(handler = handler.name(), error = %close_err, "close after failed open");
            }
            return Err(e);
        }
        Ok(Self { handler, open: true })
    }

    /// Close now and report the close error instead of logging it.
    pub fn exit(mut self) -> CoinResult<()> { self.release() }

    fn release(&mut self) -> CoinResult<()> {
        if !self.open { return Ok(()); }
        self.open = false;
        tracing::debug!(handler = self.handler.name(), "closing handler scope");
        self.handler.close()
    }
}

impl<H: Handler + ?Sized> Deref for Scope<'_, H> {
    type Target = H;
    fn deref(&self) -> &H { self.handler }
}

impl<H: Handler + ?Sized> DerefMut for Scope<'_, H> {
    fn deref_mut(&mut self) -> &mut H { self.handler }
}

impl<H: Handler + ?Sized> fmt::Debug for Scope<'_, H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope").field("handler", &self.handler.name()).field("open", &self.open).finish()
    }
}

impl<H: Handler + ?Sized> Drop for Scope<'_, H> {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            tracing::warn!(handler = self.handler.name(), error = %e, "handler close failed");
        }
    }
}

/// Run `f` inside a scope. The body's error wins over a close error.
pub fn scoped<H, T, F>(handler: &mut H, f: F) -> CoinResult<T>
where
    H: Handler + ?Sized,
    F: FnOnce(&mut H) -> CoinResult<T>,
{
    let mut scope = Scope::enter(handler)?;
    let result = f(&mut *scope);
    let closed = scope.exit();
    match (result, closed) {
        (Ok(v), Ok(())) => Ok(v),
        (Ok(_), Err(e)) => Err(e),
        (Err(e), Ok(())) => Err(e),
        (Err(e), Err(close_err)) => {
            tracing::warn!(error = %close_err, "handler close failed after error");
            Err(e)
        }
    }
}

impl<H: Handler + ?Sized> Handler for Box<H> {
    fn name(&self) -> &str { (**self).name() }
    fn open(&mut self) -> CoinResult<()> { (**self).open() }
    fn close(&mut self) -> CoinResult<()> { (**self).close() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoinError;

    #[derive(Default)]
    struct Counting { connected: bool, opens: usize, closes: usize, fail_open: bool }

    impl Handler for Counting {
        fn name(&self) -> &str { "Counting" }
        fn open(&mut self) -> CoinResult<()> {
            if self.fail_open { return Err(CoinError::connection("refused")); }
            if !self.connected { self.connected = true; self.opens += 1; }
            Ok(())
        }
        fn close(&mut self) -> CoinResult<()> {
            if self.connected { self.connected = false; self.closes += 1; }
            Ok(())
        }
    }

    #[test]
    fn test_drop_closes() {
        let mut h = Counting::default();
        {
            let scope = Scope::enter(&mut h).unwrap();
            assert!(scope.connected);
        }
        assert_eq!((h.opens, h.closes, h.connected), (1, 1, false));
    }

    #[test]
    fn test_exit_then_drop_closes_once() {
        let mut h = Counting::default();
        let scope = Scope::enter(&mut h).unwrap();
        scope.exit().unwrap();
        assert_eq!(h.closes, 1);
        h.close().unwrap();
        assert_eq!(h.closes, 1);
    }

    #[test]
    fn test_error_path_still_closes() {
        let mut h = Counting::default();
        let res: CoinResult<()> = scoped(&mut h, |_| Err(CoinError::validation("bad amount")));
        assert!(matches!(res, Err(CoinError::Validation(_))));
        assert_eq!((h.opens, h.closes), (1, 1));
    }

    #[test]
    fn test_failed_open_propagates() {
        let mut h = Counting { fail_open: true, ..Default::default() };
        assert!(Scope::enter(&mut h).err().map(|e| e.is_connection()).unwrap_or(false));
        assert_eq!(h.opens, 0);
    }

    #[test]
    fn test_debug_shows_handler_and_state() {
        let mut h = Counting::default();
        let scope = Scope::enter(&mut h).unwrap();
        assert_eq!(format!("{:?}", scope), r#"Scope { handler: "Counting", open: true }"#);
    }

    #[test]
    fn test_boxed_handler_scope() {
        let mut boxed: Box<dyn Handler> = Box::new(Counting::default());
        let name = scoped(&mut boxed, |h| Ok(h.name().to_string())).unwrap();
        assert_eq!(name, "Counting");
    }
}
