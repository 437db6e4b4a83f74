//! Bridges to external cancellation primitives.

use tokio_util::sync::CancellationToken;

use crate::promise::Promise;

/// A void promise wired to a [`CancellationToken`].
///
/// Cancelling the promise, directly or through its chain, fires
/// `token.cancel()`, so work guarded by the token observes chain
/// cancellation. The promise itself stays under the producer's control;
/// the token is only ever written, never read.
pub fn from_cancellation_token(token: CancellationToken) -> Promise<()> {
    let promise = Promise::named("FromCancellationToken");
    promise.on_cancel(move || {
        token.cancel();
        Ok(())
    });
    promise
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_fires_token() {
        let token = CancellationToken::new();
        let promise = from_cancellation_token(token.clone());
        assert!(!token.is_cancelled());
        promise.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_resolution_leaves_token_alone() {
        let token = CancellationToken::new();
        let promise = from_cancellation_token(token.clone());
        promise.resolve(());
        assert!(!token.is_cancelled());
    }

    #[test]
    fn test_chain_cancellation_reaches_token() {
        let token = CancellationToken::new();
        let promise = from_cancellation_token(token.clone());
        let leaf = promise.then_do(|()| Ok(()));
        leaf.cancel();
        assert!(token.is_cancelled());
    }
}
